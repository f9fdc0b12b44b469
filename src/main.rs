use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "snackshop", about = "Offline-first SnackShop client runtime")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the client runtime (default)
    Run,
    /// Show configuration and cache diagnostics
    Doctor,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = snackshop_app::Configuration::create()?;

    match cli.command {
        Some(Commands::Doctor) => snackshop_app::run_doctor(config).await,
        Some(Commands::Run) | None => snackshop_app::run_app(config).await,
    }
}
