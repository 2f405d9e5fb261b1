use insightlink::cli::{Cli, Commands};
use insightlink::commands::{check, show_config, watch};
use std::process;
use tracing_subscriber::EnvFilter;

// Allow println in main CLI binary
#[allow(clippy::disallowed_methods)]
fn main() {
    init_logging();

    let cli = Cli::parse();
    tracing::debug!("insightlink CLI initialized");
    let config_path = cli.config.as_deref();

    let result = match cli.command {
        Some(Commands::Check) => block_on(check::handle_check(config_path)),
        Some(Commands::Watch) => block_on(watch::handle_watch(config_path)),
        Some(Commands::ShowConfig) => show_config::handle_show_config(config_path),
        None => {
            println!("insightlink - Use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn block_on<F>(future: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = anyhow::Result<()>>,
{
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(future)
}

/// Initialize logging based on environment variables
fn init_logging() {
    // Default to INFO level, can be overridden by RUST_LOG environment variable
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("insightlink=info,warn"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}
