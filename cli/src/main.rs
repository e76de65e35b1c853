use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod util;

#[derive(Parser)]
#[command(
    name = "formgate",
    version,
    about = "Formgate CLI: replay conditional-field manifests and exercise SSO redirects"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a page manifest, apply input changes, print the resulting visibility
    Replay(commands::page::ReplayArgs),
    /// Report manifest declarations that reference missing elements
    Check(commands::page::CheckArgs),
    /// Simulate a click on a link through the SSO interceptor
    Click(commands::sso::ClickArgs),
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logs on stderr; stdout carries command output
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "formgate_cli=info,formgate_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Replay(args) => commands::page::replay(args),
        Commands::Check(args) => commands::page::check(args),
        Commands::Click(args) => commands::sso::click(args, util::load_settings()).await,
    };

    std::process::exit(code);
}
