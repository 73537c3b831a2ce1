use super::{registry, MigrationContext, MigrationEntry};
use crate::config::Settings;
use crate::docker::DockerClient;
use crate::error::Result;
use crate::state::StateStore;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Outcome of one runner invocation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Identifiers whose `up` ran.
    pub applied: Vec<String>,
    /// Identifiers recorded without running because they did not apply.
    pub skipped: Vec<String>,
}

impl MigrationReport {
    pub fn is_empty(&self) -> bool {
        self.applied.is_empty() && self.skipped.is_empty()
    }
}

/// A registered migration and whether it has been recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub identifier: String,
    pub name: String,
    pub applied: bool,
}

/// Applies pending migrations in identifier order.
pub struct MigrationRunner<'a> {
    settings: &'a Settings,
    store: &'a StateStore,
    docker: &'a DockerClient<'a>,
    entries: Vec<MigrationEntry>,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(settings: &'a Settings, store: &'a StateStore, docker: &'a DockerClient<'a>) -> Self {
        Self::with_entries(settings, store, docker, registry())
    }

    /// Runner over an explicit set of migrations.
    pub fn with_entries(
        settings: &'a Settings,
        store: &'a StateStore,
        docker: &'a DockerClient<'a>,
        mut entries: Vec<MigrationEntry>,
    ) -> Self {
        entries.sort_by(|a, b| a.identifier.cmp(b.identifier));
        Self {
            settings,
            store,
            docker,
            entries,
        }
    }

    /// Apply every pending migration.
    ///
    /// Each migration is recorded right after it succeeds or skips. The
    /// first failure stops the run: its `down` is attempted, the error is
    /// returned, and no later migration is built.
    pub fn run(&self) -> Result<MigrationReport> {
        let already: BTreeSet<String> = self.store.applied_identifiers()?;
        let ctx = MigrationContext {
            settings: self.settings,
            store: self.store,
            docker: self.docker,
            first_execution: already.is_empty(),
        };
        if ctx.first_execution {
            info!("First execution, historical migrations will be skipped");
        }

        let mut report = MigrationReport::default();
        for entry in &self.entries {
            if already.contains(entry.identifier) {
                debug!("Migration {} already applied", entry.identifier);
                continue;
            }

            let migration = entry
                .build(&ctx)
                .map_err(|e| e.in_migration(entry.identifier, entry.name))?;

            if migration.is_applicable() {
                info!("Running migration {} ({})", entry.identifier, entry.name);
                if let Err(e) = migration.up(&ctx) {
                    if let Err(down_err) = migration.down(&ctx) {
                        warn!(
                            "Cleanup of migration {} failed: {}",
                            entry.identifier, down_err
                        );
                    }
                    return Err(e.in_migration(entry.identifier, entry.name));
                }
                report.applied.push(entry.identifier.to_string());
            } else {
                debug!("Skipping migration {} ({})", entry.identifier, entry.name);
                report.skipped.push(entry.identifier.to_string());
            }

            self.store.record_migration(entry.identifier, entry.name)?;
        }

        info!(
            "Migrations done: {} applied, {} skipped",
            report.applied.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// Every registered migration with its recorded state.
    pub fn list(&self) -> Result<Vec<MigrationStatus>> {
        let applied = self.store.applied_identifiers()?;
        Ok(self
            .entries
            .iter()
            .map(|entry| MigrationStatus {
                identifier: entry.identifier.to_string(),
                name: entry.name.to_string(),
                applied: applied.contains(entry.identifier),
            })
            .collect())
    }
}
