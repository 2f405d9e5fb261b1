/// Check command functionality
pub mod check;
/// Show-config command functionality
pub mod show_config;
/// Watch command functionality
pub mod watch;

use crate::config::Config;
use crate::{ConnectionManager, MongoDriver};
use anyhow::Context;
use std::path::Path;
use std::sync::Arc;

/// Build a manager over the MongoDB driver from the resolved configuration
pub fn build_manager(config_path: Option<&Path>) -> anyhow::Result<ConnectionManager> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    let options = config
        .connection_options()
        .context("Failed to resolve connection options")?;
    Ok(ConnectionManager::new(Arc::new(MongoDriver::new()), options))
}
