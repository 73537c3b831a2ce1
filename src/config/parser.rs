use super::types::{Settings, DEFAULT_ROOT, ROOT_ENV_VAR};
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub struct Parser;

impl Parser {
    pub fn new() -> Self {
        Self
    }

    /// Resolve the root directory: explicit flag, then environment, then default.
    pub fn resolve_root(&self, explicit: Option<PathBuf>) -> PathBuf {
        if let Some(root) = explicit {
            return root;
        }
        match std::env::var(ROOT_ENV_VAR) {
            Ok(value) if !value.trim().is_empty() => PathBuf::from(value),
            _ => PathBuf::from(DEFAULT_ROOT),
        }
    }

    /// Load `config.yml` under `root`. A missing file yields defaults.
    pub fn load_settings<P: AsRef<Path>>(&self, root: P) -> Result<Settings> {
        let root = root.as_ref();
        let path = root.join("config.yml");

        let mut settings = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|e| {
                Error::Config(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            self.parse_settings(&content)?
        } else {
            tracing::debug!("No config file at {}, using defaults", path.display());
            Settings::default()
        };

        settings.root_dir = root.to_path_buf();
        Ok(settings)
    }

    /// Parse settings from YAML. An empty document yields defaults.
    pub fn parse_settings(&self, content: &str) -> Result<Settings> {
        if content.trim().is_empty() {
            return Ok(Settings::default());
        }
        serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse YAML config: {}", e)))
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}
