//! Versioned changes to the global stack.
//!
//! Every entry in [`registry`] carries a timestamp identifier; the
//! [`MigrationRunner`] applies them in identifier order, once each. A
//! migration decides whether it applies when it is built, from the state of
//! the installation at that moment. On a brand-new installation every
//! historical migration skips itself.

mod containers;
mod database;
mod refresh;
mod runner;

pub use runner::{MigrationReport, MigrationRunner, MigrationStatus};

use crate::compose::ConfigGenerator;
use crate::config::Settings;
use crate::docker::DockerClient;
use crate::error::{Error, Result};
use crate::services::GlobalServices;
use crate::state::StateStore;
use crate::steps::backup_restore;
use std::path::{Path, PathBuf};

/// Everything a migration may look at or change.
pub struct MigrationContext<'a> {
    pub settings: &'a Settings,
    pub store: &'a StateStore,
    pub docker: &'a DockerClient<'a>,
    /// No migration had ever been recorded when the run started.
    pub first_execution: bool,
}

impl<'a> MigrationContext<'a> {
    pub fn services(&self) -> GlobalServices<'a> {
        GlobalServices::new(self.settings, self.store, self.docker)
    }

    pub fn generator(&self) -> ConfigGenerator<'a> {
        ConfigGenerator::new(self.settings, self.store, self.docker)
    }

    pub fn service_dir(&self) -> PathBuf {
        self.settings.service_dir()
    }
}

/// One unit of infrastructure evolution.
///
/// Applicability is settled when the value is built; `up` is only called on
/// applicable migrations.
pub trait Migration {
    fn is_applicable(&self) -> bool;

    fn up(&self, ctx: &MigrationContext<'_>) -> Result<()>;

    /// Best-effort cleanup after `up` failed. Most migrations have nothing
    /// to undo beyond what their steps already rolled back.
    fn down(&self, _ctx: &MigrationContext<'_>) -> Result<()> {
        Ok(())
    }
}

pub type BuildFn = fn(&MigrationContext<'_>) -> Result<Box<dyn Migration>>;

/// A registered migration: its identity plus how to build it.
#[derive(Clone)]
pub struct MigrationEntry {
    pub identifier: &'static str,
    pub name: &'static str,
    build: BuildFn,
}

impl MigrationEntry {
    pub fn new(identifier: &'static str, name: &'static str, build: BuildFn) -> Self {
        Self {
            identifier,
            name,
            build,
        }
    }

    pub fn build(&self, ctx: &MigrationContext<'_>) -> Result<Box<dyn Migration>> {
        (self.build)(ctx)
    }
}

impl std::fmt::Debug for MigrationEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationEntry")
            .field("identifier", &self.identifier)
            .field("name", &self.name)
            .finish()
    }
}

fn boxed<M: Migration + 'static>(migration: Result<M>) -> Result<Box<dyn Migration>> {
    migration.map(|m| Box::new(m) as Box<dyn Migration>)
}

/// Every known migration, oldest first.
pub fn registry() -> Vec<MigrationEntry> {
    vec![
        MigrationEntry::new("20181121091115", "add-db-conf", |ctx| {
            boxed(database::AddDbConf::new(ctx))
        }),
        MigrationEntry::new("20181203191120", "rc1-db-fix", |ctx| {
            boxed(database::Rc1DbFix::new(ctx))
        }),
        MigrationEntry::new("20181204100620", "save-db-password", |ctx| {
            boxed(database::SaveDbPassword::new(ctx))
        }),
        MigrationEntry::new("20181225063950", "rename-global-containers", |ctx| {
            boxed(containers::RenameGlobalContainers::new(ctx))
        }),
        MigrationEntry::new("20190110064350", "add-cron-service", |ctx| {
            boxed(containers::AddCronService::new(ctx))
        }),
        MigrationEntry::new("20190213102815", "add-telemetry-volume", |ctx| {
            boxed(refresh::AddTelemetryVolume::new(ctx))
        }),
        MigrationEntry::new("20201103094726", "configure-my-cnf", |ctx| {
            boxed(database::ConfigureMyCnf::new(ctx))
        }),
        MigrationEntry::new("20201103184813", "remove-sysctl", |ctx| {
            boxed(refresh::RemoveSysctl::new(ctx))
        }),
        MigrationEntry::new("20210802191554", "add-subnet-ip", |ctx| {
            boxed(refresh::AddSubnetIp::new(ctx))
        }),
        MigrationEntry::new("20211611191554", "refresh-compose", |ctx| {
            boxed(refresh::RefreshCompose::new(ctx))
        }),
        MigrationEntry::new("20230112183952", "global-cron", |ctx| {
            boxed(containers::GlobalCron::new(ctx))
        }),
    ]
}

/// The database root password written in an existing compose file.
pub(crate) fn compose_db_password(compose_file: &Path) -> Result<Option<String>> {
    let contents = std::fs::read_to_string(compose_file)?;
    let doc: serde_yaml::Value = serde_yaml::from_str(&contents)?;
    let environment = &doc["services"]["global-db"]["environment"];

    let password = match environment {
        serde_yaml::Value::Sequence(entries) => entries.iter().find_map(|entry| {
            entry
                .as_str()
                .and_then(|e| e.strip_prefix("MYSQL_ROOT_PASSWORD="))
                .map(str::to_string)
        }),
        serde_yaml::Value::Mapping(_) => environment["MYSQL_ROOT_PASSWORD"]
            .as_str()
            .map(str::to_string),
        _ => None,
    };
    Ok(password.filter(|p| !p.trim().is_empty()))
}

/// Put a backed-up file back in place, then `compose up -d` the given
/// compose services (all of them when `services` is empty).
pub(crate) fn restore_and_up(
    ctx: &MigrationContext<'_>,
    backup: &Path,
    live: &Path,
    services: &[String],
) -> Result<()> {
    backup_restore(backup, live)?;
    if ctx.docker.compose_up(&ctx.service_dir(), services)? {
        Ok(())
    } else {
        Err(Error::Command(format!(
            "Unable to bring up restored services in {}",
            ctx.service_dir().display()
        )))
    }
}
