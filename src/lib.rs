//! # Global Services
//!
//! Manages the shared "global" containers of a multi-site host (reverse
//! proxy, database, cache, cron and telemetry daemon) and migrates their
//! configuration and containers across upgrades.
//!
//! ## Features
//!
//! - **Service commands**: enable, disable, start, stop, restart, reload and refresh a
//!   whitelisted global service
//! - **Desired-state config**: the compose file is computed from settings and persisted
//!   options, with the database password and network subnets allocated once
//! - **Revertable migrations**: ordered, timestamped migrations whose steps roll back
//!   in reverse order when one of them fails
//! - **Docker facade**: every engine interaction goes through a [`docker::DockerClient`]
//!   over a swappable [`exec::CommandRunner`]
//!
//! ## Quick Start
//!
//! ```no_run
//! use global_services::{DockerClient, MigrationRunner, Parser, ShellRunner, StateStore};
//!
//! # fn example() -> Result<(), global_services::Error> {
//! let parser = Parser::new();
//! let settings = parser.load_settings(parser.resolve_root(None))?;
//! let store = StateStore::open(&settings.state_db())?;
//! let runner = ShellRunner::new();
//! let docker = DockerClient::new(&runner, &settings.names);
//!
//! // Bring an existing installation up to date
//! MigrationRunner::new(&settings, &store, &docker).run()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Execution Model
//!
//! Everything runs sequentially on the calling thread. Only one process is
//! expected to operate on an installation at a time; the state database
//! holds an advisory lock and warns when another process has it.

pub mod compose;
pub mod config;
pub mod docker;
pub mod error;
pub mod exec;
pub mod migrations;
pub mod network;
pub mod services;
pub mod sites;
pub mod state;
pub mod steps;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use compose::ConfigGenerator;
pub use config::{GlobalNames, GlobalService, Parser, Platform, Settings};
pub use docker::{ContainerStatus, DockerClient};
pub use error::{Error, Result};
pub use exec::{CommandOutput, CommandRunner, ShellCommand, ShellRunner};
pub use migrations::{MigrationRunner, MigrationStatus};
pub use services::{EnableOutcome, GlobalServices};
pub use state::{OptionStore, StateStore};
pub use steps::{MigrationStep, RevertableStepProcessor};
