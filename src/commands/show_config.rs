use crate::config::{Config, ConnectionOptions};
use anyhow::Context;
use std::fmt::Write as _;
use std::path::Path;

/// Print the resolved connection options
#[allow(clippy::disallowed_methods)]
pub fn handle_show_config(config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = Config::load(config_path).context("Failed to load configuration")?;
    let options = config
        .connection_options()
        .context("Failed to resolve connection options")?;

    println!("📋 Connection options");
    print!("{}", render_options(&options));
    Ok(())
}

/// Render options as indented lines with the password masked
#[must_use]
pub fn render_options(options: &ConnectionOptions) -> String {
    let optional = |flag: Option<bool>| flag.map_or_else(|| "driver default".to_string(), |f| f.to_string());

    let mut out = String::new();
    let _ = writeln!(out, "   URI: {}", options.redacted_uri());
    let _ = writeln!(
        out,
        "   Pool size: {}..={}",
        options.min_pool_size, options.max_pool_size
    );
    let _ = writeln!(out, "   Socket timeout: {:?}", options.socket_timeout);
    let _ = writeln!(
        out,
        "   Server selection timeout: {:?}",
        options.server_selection_timeout
    );
    let _ = writeln!(out, "   Address family: {:?}", options.address_family);
    let _ = writeln!(out, "   Buffer commands: {}", options.buffer_commands);
    let _ = writeln!(out, "   TLS: {}", options.tls.enabled);
    let _ = writeln!(
        out,
        "   Allow invalid certificates: {}",
        optional(options.tls.allow_invalid_certificates)
    );
    let _ = writeln!(
        out,
        "   Allow invalid hostnames: {}",
        optional(options.tls.allow_invalid_hostnames)
    );
    out
}
