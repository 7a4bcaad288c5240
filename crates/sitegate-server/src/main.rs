use clap::Parser;

use sitegate_server::SitegateServer;
use sitegate_server::config::loader::{DEFAULT_CONFIG_PATH, load_config};

#[derive(Debug, Parser)]
#[command(name = "sitegate-server", version, about = "Sitegate account service")]
struct Cli {
    /// Configuration file; must exist when given (default: optional sitegate.toml)
    #[arg(long, env = "SITEGATE_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine.
    if let Err(e) = dotenvy::dotenv() {
        if !e.not_found() {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref()).map_err(anyhow::Error::msg)?;
    sitegate_server::observability::init_tracing(&cfg.logging.level);

    tracing::info!(
        path = cli.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH),
        issuer = %cfg.auth.issuer,
        "Configuration loaded"
    );

    let server = SitegateServer::build(cfg).await?;
    server.run().await
}
