//! Hosted sites, as far as the global stack needs to know about them.
//!
//! Site records are owned by the wider platform; migrations only read them
//! to find sites that depend on a global service and to pause/resume sites
//! while shared networks are recreated.

use crate::docker::DockerClient;
use crate::error::{Error, Result};
use crate::exec::ShellCommand;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::info;

/// Host name sites use to reach the shared database.
pub const GLOBAL_DB_HOST: &str = "global-db";
/// Host name sites use to reach the shared cache.
pub const GLOBAL_CACHE_HOST: &str = "global-redis";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteType {
    Html,
    Php,
    WordPress,
}

impl SiteType {
    pub fn as_str(self) -> &'static str {
        match self {
            SiteType::Html => "html",
            SiteType::Php => "php",
            SiteType::WordPress => "wp",
        }
    }

    /// Stop the site's containers.
    pub fn disable(self, site: &Site, docker: &DockerClient) -> Result<()> {
        info!("Disabling {} site {}", self, site.url);
        if docker.compose_stop(&site.fs_path, &[])? {
            Ok(())
        } else {
            Err(Error::Command(format!("Unable to disable site {}", site.url)))
        }
    }

    /// Bring the site's containers back up.
    pub fn enable(self, site: &Site, docker: &DockerClient) -> Result<()> {
        info!("Enabling {} site {}", self, site.url);
        if docker.compose_up(&site.fs_path, &[])? {
            Ok(())
        } else {
            Err(Error::Command(format!("Unable to enable site {}", site.url)))
        }
    }
}

impl fmt::Display for SiteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SiteType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "html" => Ok(SiteType::Html),
            "php" => Ok(SiteType::Php),
            "wp" | "wordpress" => Ok(SiteType::WordPress),
            other => Err(Error::Config(format!("Unknown site type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub url: String,
    pub site_type: SiteType,
    pub enabled: bool,
    pub db_host: Option<String>,
    pub cache_host: Option<String>,
    pub fs_path: PathBuf,
}

impl Site {
    pub fn uses_global_db(&self) -> bool {
        self.db_host.as_deref() == Some(GLOBAL_DB_HOST)
    }

    pub fn uses_global_cache(&self) -> bool {
        self.cache_host.as_deref() == Some(GLOBAL_CACHE_HOST)
    }

    /// Point the site's WordPress config at the shared cache host.
    pub fn update_cache_host(&self, docker: &DockerClient) -> Result<()> {
        if !self.fs_path.is_dir() {
            return Err(Error::Filesystem(format!(
                "{} path not exists",
                self.fs_path.display()
            )));
        }
        let commands = [
            format!(
                "wp config set RT_WP_NGINX_HELPER_REDIS_HOSTNAME {} --add=true --type=constant",
                GLOBAL_CACHE_HOST
            ),
            format!(
                "wp config set --type=variable redis_server \"array('host'=> '{}','port'=> 6379,)\" --raw",
                GLOBAL_CACHE_HOST
            ),
        ];
        let program = docker.compose_command()?.program();
        for command in commands {
            let line = format!(
                "{} exec -T --user=www-data php {}",
                program, command
            );
            if !docker
                .runner()
                .exec(&ShellCommand::new(line).in_dir(&self.fs_path))?
            {
                return Err(Error::Command(format!(
                    "Unable to update cache host of {}",
                    self.url
                )));
            }
        }
        info!("{} updated cache-host successfully", self.url);
        Ok(())
    }
}
