use crate::health::HealthReport;
use std::fmt::Write as _;
use std::path::Path;

/// Connect once and print a health summary
///
/// Returns an error when the connection cannot be established.
#[allow(clippy::disallowed_methods)]
pub async fn handle_check(config_path: Option<&Path>) -> anyhow::Result<()> {
    let manager = super::build_manager(config_path)?;
    println!("🔍 insightlink check");
    println!("====================");
    println!("   Target: {}", manager.options().redacted_uri());

    let result = manager.connect().await;
    print!("{}", render_health(&manager.health()));

    if let Err(e) = result {
        println!("❌ {}", e.user_message());
        return Err(e.into());
    }
    println!("✅ Connection established");
    Ok(())
}

/// Render a health report as indented lines
#[must_use]
pub fn render_health(report: &HealthReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "   Status: {}", report.status);
    let _ = writeln!(out, "   State: {}", report.state);
    let _ = writeln!(out, "   Driver active: {}", report.driver_active);
    if let Some(session) = &report.session {
        let _ = writeln!(out, "   Host: {}", session.host);
        let database = if session.database.is_empty() {
            "(none)"
        } else {
            session.database.as_str()
        };
        let _ = writeln!(out, "   Database: {database}");
    }
    let stats = &report.stats;
    let _ = writeln!(
        out,
        "   Attempts: {} (TLS retries: {})",
        stats.attempts, stats.tls_retries
    );
    if let Some(last_error) = &stats.last_error {
        let _ = writeln!(out, "   Last error: {last_error}");
    }
    out
}
