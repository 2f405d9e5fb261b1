use crate::manager::ConnectionState;
use chrono::Utc;
use std::path::Path;
use tracing::info;

/// Connect, then print every state transition until Ctrl-C
#[allow(clippy::disallowed_methods)]
pub async fn handle_watch(config_path: Option<&Path>) -> anyhow::Result<()> {
    let manager = super::build_manager(config_path)?;
    let mut states = manager.watch_state();

    manager.connect().await?;
    if let Some(session) = manager.session() {
        println!(
            "✅ Connected to {} ({})",
            session.host,
            if session.database.is_empty() {
                "no default database"
            } else {
                session.database.as_str()
            }
        );
    }
    let _ = states.borrow_and_update();
    println!("👀 Watching connection state, press Ctrl-C to stop");

    let interrupted = tokio::signal::ctrl_c();
    tokio::pin!(interrupted);

    loop {
        tokio::select! {
            _ = &mut interrupted => {
                info!("Interrupted, stopping watch");
                break;
            }
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = *states.borrow_and_update();
                println!("{} {} {}", Utc::now().format("%H:%M:%S"), marker(state), state);
            }
        }
    }

    let stats = manager.stats();
    println!(
        "Events: {} errors, {} disconnects, {} reconnects",
        stats.error_events, stats.disconnect_events, stats.reconnect_events
    );
    Ok(())
}

const fn marker(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Connected => "🟢",
        ConnectionState::Connecting => "🟡",
        ConnectionState::Disconnected => "🔴",
    }
}
