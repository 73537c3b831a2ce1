use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the fixed global services shared by every hosted site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GlobalService {
    NginxProxy,
    Db,
    Redis,
    Cron,
    NewrelicDaemon,
}

impl GlobalService {
    /// All services in the order they appear in the compose file.
    pub const ALL: [GlobalService; 5] = [
        GlobalService::NginxProxy,
        GlobalService::Db,
        GlobalService::Redis,
        GlobalService::Cron,
        GlobalService::NewrelicDaemon,
    ];

    /// The whitelisted token accepted on the command line.
    pub fn token(self) -> &'static str {
        match self {
            GlobalService::NginxProxy => "nginx-proxy",
            GlobalService::Db => "db",
            GlobalService::Redis => "redis",
            GlobalService::Cron => "cron",
            GlobalService::NewrelicDaemon => "newrelic-daemon",
        }
    }

    /// Compose service key, e.g. `global-db`.
    pub fn compose_service(self) -> String {
        format!("global-{}", self.token())
    }

    /// Command run inside the container to reload configuration, if the
    /// service supports it.
    pub fn reload_command(self) -> Option<&'static str> {
        match self {
            GlobalService::NginxProxy => Some("nginx -t && nginx -s reload"),
            GlobalService::Db => Some("mysqladmin -uroot -p\"$MYSQL_ROOT_PASSWORD\" reload"),
            _ => None,
        }
    }

    pub fn tokens() -> Vec<String> {
        Self::ALL.iter().map(|s| s.token().to_string()).collect()
    }
}

impl fmt::Display for GlobalService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for GlobalService {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        // Accept both `db` and the compose key `global-db`.
        let token = s.strip_prefix("global-").unwrap_or(s);
        Self::ALL
            .iter()
            .copied()
            .find(|svc| svc.token() == token)
            .ok_or_else(|| Error::UnknownService {
                name: s.to_string(),
                valid: Self::tokens(),
            })
    }
}

/// Container, network and label names of the global stack.
///
/// Container naming changed across releases: installs older than the
/// container rename still run `<legacy_prefix>-global-<token>` containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalNames {
    /// Compose project name; the compose file lives in a directory of this name.
    pub project: String,
    pub frontend_network: String,
    pub backend_network: String,
    /// `key=value` label put on networks and volumes we create.
    pub vendor_label: String,
    /// Label key carrying the owning service on managed volumes.
    pub owner_label_key: String,
    pub legacy_prefix: String,
}

impl Default for GlobalNames {
    fn default() -> Self {
        Self {
            project: "services".to_string(),
            frontend_network: "global-frontend-network".to_string(),
            backend_network: "global-backend-network".to_string(),
            vendor_label: "org.label-schema.vendor=global-services".to_string(),
            owner_label_key: "io.global-services.owner".to_string(),
            legacy_prefix: "gs".to_string(),
        }
    }
}

impl GlobalNames {
    /// Container created by compose for a service, e.g. `services_global-db_1`.
    pub fn container(&self, service: GlobalService) -> String {
        format!("{}_{}_1", self.project, service.compose_service())
    }

    /// Container name used before the rename migration, e.g. `gs-global-db`.
    pub fn legacy_container(&self, service: GlobalService) -> String {
        format!("{}-{}", self.legacy_prefix, service.compose_service())
    }

    /// Standalone cron scheduler that predates the `global-cron` service.
    pub fn legacy_cron_container(&self) -> String {
        format!("{}-cron-scheduler", self.legacy_prefix)
    }

    /// Temporary stand-in kept up while the real container is swapped.
    pub fn support_container(&self, service: GlobalService) -> String {
        format!("{}-support", self.container(service))
    }

    /// Map a legacy container name back to its service.
    pub fn service_for_legacy(&self, container: &str) -> Option<GlobalService> {
        GlobalService::ALL
            .iter()
            .copied()
            .find(|svc| self.legacy_container(*svc) == container)
    }
}
