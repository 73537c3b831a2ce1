use crate::config::{GlobalService, Platform};
use crate::error::Result;
use crate::network::Subnet;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One volume entry of a global service.
///
/// By default the entry is a managed named volume (`<owner>_<name>`) mounted
/// at `container_path`; `host_path` is where the data would live on disk.
/// A `skip_volume` entry is always a plain bind mount of `host_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeMount {
    pub name: String,
    pub host_path: PathBuf,
    pub container_path: String,
    pub skip_darwin: bool,
    pub skip_linux: bool,
    pub skip_volume: bool,
}

impl VolumeMount {
    pub fn managed(
        name: impl Into<String>,
        host_path: impl Into<PathBuf>,
        container_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            host_path: host_path.into(),
            container_path: container_path.into(),
            skip_darwin: false,
            skip_linux: false,
            skip_volume: false,
        }
    }

    /// Never back this entry by a named volume.
    pub fn bind_only(mut self) -> Self {
        self.skip_volume = true;
        self
    }

    pub fn skip_on_darwin(mut self) -> Self {
        self.skip_darwin = true;
        self
    }

    pub fn skip_on_linux(mut self) -> Self {
        self.skip_linux = true;
        self
    }

    pub fn applies_to(&self, platform: Platform) -> bool {
        match platform {
            Platform::Darwin => !self.skip_darwin,
            Platform::Linux => !self.skip_linux,
        }
    }

    /// Whether this entry is rendered as a named volume on `platform`.
    pub fn is_named_on(&self, platform: Platform) -> bool {
        self.applies_to(platform) && !self.skip_volume && !platform.is_darwin()
    }

    /// The compose `volumes:` line for this entry, if it applies.
    pub fn mount_spec(&self, platform: Platform) -> Option<String> {
        if !self.applies_to(platform) {
            return None;
        }
        let source = if self.is_named_on(platform) {
            self.name.clone()
        } else {
            self.host_path.display().to_string()
        };
        Some(format!("{}:{}", source, self.container_path))
    }
}

/// Everything compose needs to run one global service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalServiceDescriptor {
    pub service: GlobalService,
    pub container_name: String,
    pub image: String,
    pub restart: String,
    pub ports: Vec<String>,
    pub environment: Vec<String>,
    pub volumes: Vec<VolumeMount>,
    pub networks: Vec<String>,
    pub command: Option<Vec<String>>,
}

impl GlobalServiceDescriptor {
    /// Compose service key; also the owner label of the service's volumes.
    pub fn compose_service(&self) -> String {
        self.service.compose_service()
    }

    pub fn env(&self, key: &str) -> Option<&str> {
        self.environment.iter().find_map(|entry| {
            entry
                .split_once('=')
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v)
        })
    }
}

/// A global network and the attributes it is created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkDescriptor {
    pub name: String,
    pub labels: Vec<String>,
    pub subnet: Subnet,
}

/// The full desired configuration of the global stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    pub platform: Platform,
    pub services: Vec<GlobalServiceDescriptor>,
    pub networks: Vec<NetworkDescriptor>,
}

impl DesiredState {
    pub fn service(&self, service: GlobalService) -> Option<&GlobalServiceDescriptor> {
        self.services.iter().find(|d| d.service == service)
    }

    pub fn network(&self, name: &str) -> Option<&NetworkDescriptor> {
        self.networks.iter().find(|n| n.name == name)
    }

    pub fn to_compose(&self) -> ComposeFile {
        let mut services = BTreeMap::new();
        let mut volumes = BTreeMap::new();

        for descriptor in &self.services {
            let owner = descriptor.compose_service();
            for volume in &descriptor.volumes {
                if volume.is_named_on(self.platform) {
                    volumes.insert(
                        volume.name.clone(),
                        ComposeVolume {
                            name: format!("{}_{}", owner, volume.name),
                            external: true,
                        },
                    );
                }
            }

            services.insert(
                owner,
                ComposeService {
                    container_name: descriptor.container_name.clone(),
                    image: descriptor.image.clone(),
                    restart: descriptor.restart.clone(),
                    command: descriptor.command.clone(),
                    ports: descriptor.ports.clone(),
                    environment: descriptor.environment.clone(),
                    volumes: descriptor
                        .volumes
                        .iter()
                        .filter_map(|v| v.mount_spec(self.platform))
                        .collect(),
                    networks: descriptor.networks.clone(),
                },
            );
        }

        let networks = self
            .networks
            .iter()
            .map(|n| {
                (
                    n.name.clone(),
                    ComposeNetwork {
                        name: n.name.clone(),
                        external: true,
                    },
                )
            })
            .collect();

        ComposeFile {
            version: "3.5".to_string(),
            services,
            networks,
            volumes,
        }
    }

    /// Render as compose YAML.
    pub fn render(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.to_compose())?)
    }
}

/// Serialized shape of `docker-compose.yml`.
#[derive(Debug, Clone, Serialize)]
pub struct ComposeFile {
    pub version: String,
    pub services: BTreeMap<String, ComposeService>,
    pub networks: BTreeMap<String, ComposeNetwork>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub volumes: BTreeMap<String, ComposeVolume>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComposeService {
    pub container_name: String,
    pub image: String,
    pub restart: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<String>,
}

/// Networks are created up front with their subnet, so compose only
/// references them.
#[derive(Debug, Clone, Serialize)]
pub struct ComposeNetwork {
    pub name: String,
    pub external: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComposeVolume {
    pub name: String,
    pub external: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mount_spec_follows_platform_flags() {
        let data = VolumeMount::managed("db_data", "/srv/mariadb/data", "/var/lib/mysql");
        let conf = VolumeMount::managed("db_conf", "/srv/mariadb/conf", "/etc/mysql").skip_on_darwin();
        let my_cnf = VolumeMount::managed("db_conf", "/srv/mariadb/conf/my.cnf", "/etc/mysql/my.cnf")
            .skip_on_linux()
            .bind_only();

        assert_eq!(data.mount_spec(Platform::Linux).unwrap(), "db_data:/var/lib/mysql");
        assert_eq!(
            data.mount_spec(Platform::Darwin).unwrap(),
            "/srv/mariadb/data:/var/lib/mysql"
        );
        assert_eq!(conf.mount_spec(Platform::Darwin), None);
        assert_eq!(my_cnf.mount_spec(Platform::Linux), None);
        assert_eq!(
            my_cnf.mount_spec(Platform::Darwin).unwrap(),
            "/srv/mariadb/conf/my.cnf:/etc/mysql/my.cnf"
        );
    }

    #[test]
    fn env_lookup_splits_on_first_equals() {
        let descriptor = GlobalServiceDescriptor {
            service: GlobalService::Db,
            container_name: "db".to_string(),
            image: "easyengine/mariadb:v4.7.0".to_string(),
            restart: "always".to_string(),
            ports: vec![],
            environment: vec!["MYSQL_ROOT_PASSWORD=a=b".to_string()],
            volumes: vec![],
            networks: vec![],
            command: None,
        };
        assert_eq!(descriptor.env("MYSQL_ROOT_PASSWORD"), Some("a=b"));
        assert_eq!(descriptor.env("MYSQL"), None);
    }
}
