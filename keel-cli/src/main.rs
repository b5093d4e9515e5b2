use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use keel_cli::cli::{Cli, Commands};
use keel_cli::commands;
use keel_cli::error::CliError;
use keel_cli::logging::init_tracing;
use keel_cli::output::OutputWriter;
use keel_core::config::KeelConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // config 명령은 깨진 설정 파일도 다뤄야 하므로 로깅은 기본값으로 대체
    let general = KeelConfig::load(&cli.config)
        .await
        .map(|config| config.general)
        .unwrap_or_default();
    init_tracing(&general, cli.log_level.as_deref())?;

    tracing::info!(config = %cli.config.display(), "keel starting");

    let writer = OutputWriter::new(cli.output);
    if let Err(e) = dispatch(cli, &writer).await {
        eprintln!("{} {e}", "error:".red().bold());
        std::process::exit(e.exit_code());
    }
    Ok(())
}

async fn dispatch(cli: Cli, writer: &OutputWriter) -> Result<(), CliError> {
    match cli.command {
        Commands::Config(args) => commands::config::execute(args, &cli.config, writer).await,
        Commands::Upgrade(args) => {
            let config = KeelConfig::load(&cli.config).await?;
            commands::upgrade::execute(args, &config, writer).await
        }
        Commands::Verify(args) => {
            let config = KeelConfig::load(&cli.config).await?;
            commands::verify::execute(args, &config, writer).await
        }
    }
}
