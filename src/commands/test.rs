use anyhow::Result;
use std::path::Path;

use dnstrail::config;

/// Execute the test command: validate the configuration file and print a
/// summary of the effective settings.
pub fn execute(config_path: &Path) -> Result<()> {
    let cfg = config::load_config(config_path)?;

    println!("✓ Configuration test successful");
    println!();
    println!("Configuration Summary:");
    println!("  Log source:     {}", cfg.ingest.log_path);
    println!("  Database:       {}", cfg.database.path);
    println!(
        "  Batching:       {} events / {}s",
        cfg.ingest.batch_size, cfg.ingest.batch_interval_secs
    );
    println!("  Buffer:         {} events max", cfg.ingest.buffer_capacity);
    println!("  Poll interval:  {}ms", cfg.ingest.poll_interval_ms);
    println!("  Retention:      {} days", cfg.retention.days);
    println!(
        "  Query API:      {}:{} (window {}s)",
        cfg.server.host, cfg.server.port, cfg.query.window_secs
    );

    Ok(())
}
