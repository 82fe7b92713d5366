use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "security-event-log", version, about = "Security event logger")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "security-log.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Record one security event through the configured sink
    Emit {
        /// Severity: info, warn, error, critical
        #[arg(short, long, default_value = "info")]
        level: String,

        /// Event category (auth, upload, access, validation, system)
        #[arg(long, default_value = "system")]
        category: String,

        /// Event action, e.g. failed_login
        action: String,

        /// JSON object with event details
        #[arg(short, long, default_value = "{}")]
        details: String,

        /// Acting user id
        #[arg(short, long)]
        user: Option<String>,

        /// Client address
        #[arg(long)]
        ip: Option<String>,

        /// Also print Prometheus metrics
        #[arg(long)]
        prometheus: bool,
    },

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Display the effective configuration
    Show,

    /// Validate configuration file
    Validate,
}
