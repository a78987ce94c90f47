use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use headwire::app::AppContext;
use headwire::cli::{commands, Cli, Commands};
use headwire::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let ctx = AppContext::new(config).await?;

    match cli.command {
        Commands::Refresh => commands::refresh(&ctx).await?,
        Commands::Run => commands::run(&ctx).await?,
        Commands::Stats { json } => commands::stats(&ctx, json).await?,
        Commands::History { days, date } => commands::history(&ctx, days, date).await?,
        Commands::Clear => commands::clear(&ctx).await?,
        Commands::Summary { url, title } => commands::summary(&ctx, &url, title.as_deref()).await?,
    }

    Ok(())
}
