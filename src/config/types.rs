use super::names::{GlobalNames, GlobalService};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Used when neither `--root` nor the environment names a root directory.
pub const DEFAULT_ROOT: &str = "/opt/hosting";

/// Environment variable overriding the root directory.
pub const ROOT_ENV_VAR: &str = "GLOBAL_SERVICES_ROOT";

/// Host platform class. Darwin cannot use managed named volumes for every
/// mount, so some volume entries are skipped or swapped per platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Darwin,
}

impl Platform {
    pub fn detect() -> Self {
        if cfg!(target_os = "macos") {
            Platform::Darwin
        } else {
            Platform::Linux
        }
    }

    pub fn is_darwin(self) -> bool {
        self == Platform::Darwin
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::detect()
    }
}

/// Image tag per image repository.
///
/// Entries read from `config.yml` are layered over the defaults, so pinning
/// one image leaves the others on their default tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ImageVersions(pub BTreeMap<String, String>);

impl<'de> Deserialize<'de> for ImageVersions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let overrides = BTreeMap::<String, String>::deserialize(deserializer)?;
        let mut versions = Self::default();
        versions.0.extend(overrides);
        Ok(versions)
    }
}

impl Default for ImageVersions {
    fn default() -> Self {
        let mut map = BTreeMap::new();
        for service in GlobalService::ALL {
            map.insert(Self::repository(service), "v4.7.0".to_string());
        }
        Self(map)
    }
}

impl ImageVersions {
    /// Image repository for a global service.
    pub fn repository(service: GlobalService) -> String {
        let image = match service {
            GlobalService::Db => "mariadb",
            other => other.token(),
        };
        format!("easyengine/{}", image)
    }

    /// Full `repository:tag` reference; unknown repositories resolve to `latest`.
    pub fn reference(&self, service: GlobalService) -> String {
        let repo = Self::repository(service);
        let tag = self.0.get(&repo).map(String::as_str).unwrap_or("latest");
        format!("{}:{}", repo, tag)
    }
}

/// Runtime settings: root directory layout plus values from `config.yml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    #[serde(skip)]
    pub root_dir: PathBuf,
    pub proxy_80_port: u16,
    pub proxy_443_port: u16,
    pub platform: Platform,
    pub images: ImageVersions,
    pub version: String,
    #[serde(skip)]
    pub names: GlobalNames,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(DEFAULT_ROOT),
            proxy_80_port: 80,
            proxy_443_port: 443,
            platform: Platform::default(),
            images: ImageVersions::default(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            names: GlobalNames::default(),
        }
    }
}

impl Settings {
    /// Defaults rooted at `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root.into(),
            ..Self::default()
        }
    }

    /// Directory holding the global compose file and service data.
    pub fn service_dir(&self) -> PathBuf {
        self.root_dir.join(&self.names.project)
    }

    pub fn compose_file(&self) -> PathBuf {
        self.service_dir().join("docker-compose.yml")
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.root_dir.join(".backup")
    }

    /// Backup path mirroring `path` (which must live under the root).
    pub fn backup_path_for(&self, path: &Path, suffix: &str) -> PathBuf {
        let relative = path.strip_prefix(&self.root_dir).unwrap_or(path);
        let mut name = self.backup_dir().join(relative).into_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }

    pub fn state_db(&self) -> PathBuf {
        self.root_dir.join("db").join("state.db")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root_dir.join("config.yml")
    }

    pub fn db_conf_dir(&self) -> PathBuf {
        self.service_dir().join("mariadb").join("conf")
    }

    pub fn cron_config(&self) -> PathBuf {
        self.service_dir().join("cron").join("config.ini")
    }

    pub fn proxy_ports(&self) -> (u16, u16) {
        (self.proxy_80_port, self.proxy_443_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted() {
        let settings = Settings::with_root("/srv/h");
        assert_eq!(
            settings.compose_file(),
            PathBuf::from("/srv/h/services/docker-compose.yml")
        );
        assert_eq!(
            settings.backup_path_for(&settings.compose_file(), ".backup"),
            PathBuf::from("/srv/h/.backup/services/docker-compose.yml.backup")
        );
    }

    #[test]
    fn image_reference_uses_configured_tag() {
        let mut images = ImageVersions::default();
        images
            .0
            .insert("easyengine/mariadb".to_string(), "v9".to_string());
        assert_eq!(images.reference(GlobalService::Db), "easyengine/mariadb:v9");

        images.0.clear();
        assert_eq!(
            images.reference(GlobalService::Redis),
            "easyengine/redis:latest"
        );
    }
}
