use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "global-services")]
#[command(about = "Manage the shared global containers of a multi-site host")]
#[command(version)]
pub struct Cli {
    /// Installation root (defaults to $GLOBAL_SERVICES_ROOT, then /opt/hosting)
    #[arg(short, long, global = true)]
    pub root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a global service, creating its container if needed
    Enable {
        /// Service name (nginx-proxy, db, redis, cron, newrelic-daemon)
        service: String,
    },
    /// Stop a global service through compose
    Disable {
        /// Service name
        service: String,
    },
    /// Start an existing global service container
    Start {
        /// Service name
        service: String,
    },
    /// Stop a global service container
    Stop {
        /// Service name
        service: String,
    },
    /// Restart a global service container
    Restart {
        /// Service name
        service: String,
    },
    /// Reload a service's configuration in place (proxy and database only)
    Reload {
        /// Service name
        service: String,
    },
    /// Regenerate the compose file and restart whatever was running
    Refresh {
        /// Only refresh this service (defaults to all)
        service: Option<String>,
    },
    /// Apply pending migrations
    Migrate {
        /// List migrations with their status instead of applying them
        #[arg(long)]
        list: bool,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}
