use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use guardian_core::config::AppConfig;
use guardian_core::lifecycle;
use guardian_vision::VoiceCommand;

mod cli;
mod runtime;
mod simulated;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    lifecycle::init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate {
            duration_secs,
            seed_faces,
        } => {
            let config = AppConfig::load_or_default(cli.config.as_deref());
            lifecycle::log_startup();
            let summary = runtime::simulate(config, duration_secs.map(Duration::from_secs), seed_faces).await?;
            lifecycle::log_shutdown();
            println!("{}", serde_json::to_string(&summary)?);
        }

        Commands::Say { text, priority } => {
            let config = AppConfig::load_or_default(cli.config.as_deref());
            let stats = runtime::say(&config, &text, priority)?;
            tracing::debug!("Queue stats: {stats:?}");
        }

        Commands::CheckConfig => {
            // An explicit file must load and validate.
            let config = match cli.config.as_deref() {
                Some(path) => {
                    AppConfig::load(path).with_context(|| format!("invalid config {}", path.display()))?
                }
                None => AppConfig::load_or_default(None),
            };
            config.validate()?;
            print!("{}", toml::to_string(&config)?);
        }

        Commands::Commands => {
            for (keyword, command) in VoiceCommand::keywords() {
                println!("{keyword:<16} {}", command.feature());
            }
        }
    }

    Ok(())
}
