// Allow unused_assignments at module level because thiserror's generated code
// for struct variants triggers false positive warnings - the fields ARE used
// in the Display impl but rustc's lint pass doesn't see this.
#![allow(unused_assignments)]

use crate::docker::DockerError;
use miette::Diagnostic;
use std::io;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Docker error: {0}")]
    #[diagnostic(
        code(global_services::docker::error),
        help("Check that Docker is running with `docker ps`")
    )]
    Docker(#[from] DockerError),

    #[error("Command error: {0}")]
    #[diagnostic(code(global_services::exec::error))]
    Command(String),

    #[error("Filesystem error: {0}")]
    #[diagnostic(code(global_services::filesystem::error))]
    Filesystem(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Database error: {0}")]
    #[diagnostic(
        code(global_services::database::error),
        help("Check permissions on the state database under the root directory")
    )]
    Database(#[from] rusqlite::Error),

    #[error("Unknown global service '{name}'. Valid services: {}", .valid.join(", "))]
    #[diagnostic(code(global_services::service::unknown))]
    UnknownService { name: String, valid: Vec<String> },

    #[error("Cannot create/start proxy container. Please make sure port {http} and {https} are free.")]
    #[diagnostic(
        code(global_services::proxy::ports_occupied),
        help("Find what's using the ports with: lsof -i :{http} -i :{https}")
    )]
    PortsOccupied { http: u16, https: u16 },

    #[error("Ports of current running proxy ({running}) and ports specified in config ({configured}) don't match.")]
    #[diagnostic(code(global_services::proxy::port_mismatch))]
    PortMismatch { running: String, configured: String },

    #[error("Reload is not supported for service '{0}'")]
    ReloadUnsupported(String),

    #[error("Container '{0}' has not been created yet")]
    #[diagnostic(
        code(global_services::service::not_created),
        help("Create and start it with: global-services enable <service>")
    )]
    NotCreated(String),

    #[error("Unable to create network {name}: {reason}")]
    Network { name: String, reason: String },

    #[error("No free /16 subnet left in {0}")]
    SubnetExhausted(String),

    #[error("Step '{step}' failed: {reason}")]
    #[diagnostic(code(global_services::step::failed))]
    StepFailed {
        step: String,
        reason: String,
        rollback_failures: usize,
    },

    #[error("Migration {identifier} ({name}) failed: {source}")]
    #[diagnostic(
        code(global_services::migration::failed),
        help("Fix the underlying problem and run `global-services migrate` again; applied migrations are not repeated")
    )]
    MigrationFailed {
        identifier: String,
        name: String,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns a helpful suggestion for resolving this error, if available.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Error::UnknownService { valid, .. } => Some(format!(
                "Pick one of: {}",
                valid.join(", ")
            )),
            Error::PortsOccupied { http, https } => Some(format!(
                "Stop whatever listens on port {} or {}, or change proxy_80_port/proxy_443_port in config.yml.",
                http, https
            )),
            Error::PortMismatch { .. } => Some(
                "Restore the ports in config.yml or recreate the proxy with `global-services refresh nginx-proxy`."
                    .to_string(),
            ),
            Error::NotCreated(_) => {
                Some("Create the container first with `global-services enable <service>`.".to_string())
            }
            Error::Docker(_) | Error::Network { .. } => {
                Some("Check that Docker is running: docker ps".to_string())
            }
            Error::MigrationFailed { .. } | Error::StepFailed { .. } => Some(
                "Completed steps were rolled back. Fix the cause and re-run `global-services migrate`."
                    .to_string(),
            ),
            Error::Database(e) => {
                // rusqlite exposes the sqlite error code only through the message here.
                let err_str = e.to_string();
                if err_str.contains("database is locked") {
                    Some("Another global-services process may be running. Wait for it to finish.".to_string())
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// Formats the error with its suggestion (if any) for user-friendly display.
    pub fn with_suggestion(&self) -> String {
        match self.suggestion() {
            Some(suggestion) => format!("{}\n\nHint: {}", self, suggestion),
            None => self.to_string(),
        }
    }

    /// Wrap this error as the cause of a failed migration.
    pub fn in_migration(self, identifier: &str, name: &str) -> Self {
        Error::MigrationFailed {
            identifier: identifier.to_string(),
            name: name.to_string(),
            source: Box::new(self),
        }
    }
}
