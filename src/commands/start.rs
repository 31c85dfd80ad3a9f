use anyhow::Result;
use std::path::Path;

use dnstrail::{config, server};

/// Execute the start command: load configuration and run the monitor
/// until a shutdown signal arrives.
pub async fn execute(config_path: &Path) -> Result<()> {
    let cfg = config::load_config(config_path)?;
    server::run(cfg).await
}
