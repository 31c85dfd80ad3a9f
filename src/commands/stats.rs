use anyhow::Result;
use chrono::Utc;
use std::path::Path;

use dnstrail::{config, store::Store};

/// Execute the stats command: print aggregate statistics straight from
/// the store for the requested window.
pub async fn execute(config_path: &Path, hours: u32) -> Result<()> {
    let cfg = config::load_config(config_path)?;

    println!("dnstrail Statistics");
    println!("===================\n");

    let store = Store::connect(&cfg.database.path).await?;
    let since = Utc::now().timestamp() - i64::from(hours) * 3600;

    let total_rows = store.row_count().await?;
    let summary = store.summary(since).await?;

    println!("Store: {} ({} rows total)\n", cfg.database.path, total_rows);
    println!("Last {hours}h:");
    println!("  Queries:        {}", summary.total_queries);
    println!(
        "  Blocked:        {} ({:.1}%)",
        summary.blocked_queries, summary.blocked_percentage
    );
    println!("  Unique domains: {}", summary.unique_domains);
    println!("  Unique clients: {}", summary.unique_clients);

    let top = store.top_domains(since, cfg.query.top_limit, false).await?;
    if !top.is_empty() {
        println!("\nTop domains:");
        for row in &top {
            println!("  {:>6}  {}", row.count, row.domain);
        }
    }

    let blocked = store.top_domains(since, cfg.query.top_limit, true).await?;
    if !blocked.is_empty() {
        println!("\nTop blocked:");
        for row in &blocked {
            println!("  {:>6}  {}", row.count, row.domain);
        }
    }

    store.close().await;
    Ok(())
}
