use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use security_event_log::{config, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    // Fall back to defaults for tracing if the file is broken; the command reports the error
    let logging = config::load_config(&args.config)
        .map(|cfg| cfg.logging)
        .unwrap_or_default();
    init_tracing(&logging.level, &logging.format);

    match args.command {
        cli::Commands::Emit {
            level,
            category,
            action,
            details,
            user,
            ip,
            prometheus,
        } => {
            let request = commands::emit::EmitRequest {
                level,
                category,
                action,
                details,
                user,
                ip,
                prometheus,
            };
            commands::emit::execute(&args.config, request).await?;
        }
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(&args.config)?,
            cli::ConfigCommands::Validate => commands::config::validate(&args.config)?,
        },
        cli::Commands::Version => {
            println!("security-event-log v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
