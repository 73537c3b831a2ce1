use super::{restore_and_up, Migration, MigrationContext};
use crate::config::GlobalService;
use crate::error::{Error, Result};
use crate::state::{OptionStore, DB_PASSWORD_KEY};
use crate::steps::{backup_restore, MigrationStep, RevertableStepProcessor};
use tracing::{debug, info};

/// Services that get a temporary stand-in while their container is swapped.
const SUPPORTED: [GlobalService; 2] = [GlobalService::Db, GlobalService::Redis];

/// Start stand-ins for the database and cache on the backend network under
/// the service aliases, so sites keep resolving them during the swap.
fn enable_support_containers(ctx: &MigrationContext<'_>) -> Result<()> {
    ctx.services().boot_global_networks()?;
    let names = &ctx.settings.names;
    for service in SUPPORTED {
        let container = names.support_container(service);
        ctx.docker.rm_force(std::slice::from_ref(&container))?;

        let env = match (service, ctx.store.get(DB_PASSWORD_KEY)?) {
            (GlobalService::Db, Some(password)) => {
                format!("-e MYSQL_ROOT_PASSWORD={} ", password)
            }
            _ => String::new(),
        };
        let args = format!(
            "--name {} --network {} --network-alias {} {}{}",
            container,
            names.backend_network,
            service.compose_service(),
            env,
            ctx.settings.images.reference(service)
        );
        if !ctx.docker.run_detached(&args)? {
            return Err(Error::Command(format!(
                "Unable to start support container {}",
                container
            )));
        }
    }
    Ok(())
}

fn disable_support_containers(ctx: &MigrationContext<'_>) -> Result<()> {
    let containers: Vec<String> = SUPPORTED
        .iter()
        .map(|s| ctx.settings.names.support_container(*s))
        .collect();
    if ctx.docker.rm_force(&containers)? {
        Ok(())
    } else {
        Err(Error::Command("Unable to remove support containers".to_string()))
    }
}

fn remove_containers(ctx: &MigrationContext<'_>, containers: &[String]) -> Result<()> {
    if ctx.docker.rm_force(containers)? {
        Ok(())
    } else {
        Err(Error::Command(format!(
            "Unable to remove {}",
            containers.join(", ")
        )))
    }
}

/// Move the proxy, database and cache from the legacy container names to
/// compose-managed ones.
pub struct RenameGlobalContainers {
    skip: bool,
    /// Legacy containers running when the migration was built.
    running: Vec<String>,
}

impl RenameGlobalContainers {
    pub fn new(ctx: &MigrationContext<'_>) -> Result<Self> {
        if ctx.first_execution {
            return Ok(Self {
                skip: true,
                running: Vec::new(),
            });
        }
        let mut running = Vec::new();
        for service in [
            GlobalService::NginxProxy,
            GlobalService::Redis,
            GlobalService::Db,
        ] {
            let legacy = ctx.settings.names.legacy_container(service);
            if ctx.docker.is_running(&legacy)? {
                running.push(legacy);
            }
        }
        Ok(Self {
            skip: false,
            running,
        })
    }
}

impl Migration for RenameGlobalContainers {
    fn is_applicable(&self) -> bool {
        !self.skip
    }

    fn up(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let dir = ctx.service_dir();
        let compose = ctx.settings.compose_file();
        let backup = ctx.settings.backup_path_for(&compose, ".backup");
        let renamed: Vec<GlobalService> = self
            .running
            .iter()
            .filter_map(|c| ctx.settings.names.service_for_legacy(c))
            .collect();
        let services = ctx.services();

        let mut processor = RevertableStepProcessor::new();

        for site in ctx.store.sites()?.into_iter().filter(|s| s.uses_global_cache()) {
            let name = format!("update-cache-host-{}", site.url);
            processor.add_step(MigrationStep::new(name, move || {
                site.update_cache_host(ctx.docker)
            }));
        }

        processor
            .add_step(
                MigrationStep::new("backup-global-compose-file", || {
                    backup_restore(&compose, &backup)
                })
                .with_reverse(|| restore_and_up(ctx, &backup, &compose, &[])),
            )
            .add_step(MigrationStep::new("generate-global-compose-file", || {
                ctx.generator().generate().map(drop)
            }))
            .add_step(
                MigrationStep::new("create-support-containers", || {
                    enable_support_containers(ctx)
                })
                .with_reverse(|| disable_support_containers(ctx)),
            )
            .add_step(MigrationStep::new("remove-legacy-containers", || {
                remove_containers(ctx, &self.running)
            }))
            .add_step(
                MigrationStep::new("start-renamed-containers", || {
                    services.boot_global_networks()?;
                    services.up(&renamed)
                })
                .with_reverse(|| {
                    if ctx.docker.compose_stop(&dir, &[])? && ctx.docker.compose_rm(&dir, &[])? {
                        Ok(())
                    } else {
                        Err(Error::Command(
                            "Unable to remove renamed global containers".to_string(),
                        ))
                    }
                }),
            )
            .add_step(MigrationStep::new("remove-support-containers", || {
                disable_support_containers(ctx)
            }));

        processor.execute()
    }
}

/// Replace the standalone cron scheduler with the `global-cron` service.
pub struct AddCronService {
    skip: bool,
    legacy_running: bool,
}

impl AddCronService {
    pub fn new(ctx: &MigrationContext<'_>) -> Result<Self> {
        if ctx.first_execution {
            return Ok(Self {
                skip: true,
                legacy_running: false,
            });
        }
        let legacy_running = ctx
            .docker
            .is_running(&ctx.settings.names.legacy_cron_container())?;
        Ok(Self {
            skip: false,
            legacy_running,
        })
    }
}

impl Migration for AddCronService {
    fn is_applicable(&self) -> bool {
        !self.skip
    }

    fn up(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let compose = ctx.settings.compose_file();
        let backup = ctx.settings.backup_path_for(&compose, ".backup");
        let legacy = ctx.settings.names.legacy_cron_container();
        let services = ctx.services();

        let mut processor = RevertableStepProcessor::new();
        processor
            .add_step(
                MigrationStep::new("backup-global-compose-file", || {
                    backup_restore(&compose, &backup)
                })
                .with_reverse(|| backup_restore(&backup, &compose)),
            )
            .add_step(MigrationStep::new("generate-global-compose-file", || {
                ctx.generator().generate().map(drop)
            }));

        if self.legacy_running {
            processor
                .add_step(MigrationStep::new("enable-global-cron-service", || {
                    services.up(&[GlobalService::Cron])
                }))
                .add_step(MigrationStep::new("remove-legacy-cron-scheduler", || {
                    remove_containers(ctx, std::slice::from_ref(&legacy))
                }));
        } else {
            debug!("{} not running, global-cron left disabled", legacy);
        }

        processor.execute()
    }
}

/// Move cron jobs onto the compose-managed `global-cron` service, removing
/// the legacy scheduler container.
pub struct GlobalCron {
    skip: bool,
    running: Vec<String>,
}

impl GlobalCron {
    pub fn new(ctx: &MigrationContext<'_>) -> Result<Self> {
        if ctx.first_execution {
            return Ok(Self {
                skip: true,
                running: Vec::new(),
            });
        }
        let legacy = ctx.settings.names.legacy_cron_container();
        let running = if ctx.docker.is_running(&legacy)? {
            vec![legacy]
        } else {
            Vec::new()
        };
        Ok(Self {
            skip: false,
            running,
        })
    }

    /// Compose services the legacy containers were started from.
    fn legacy_services(&self, ctx: &MigrationContext<'_>) -> Vec<String> {
        let prefix = format!("{}-", ctx.settings.names.legacy_prefix);
        self.running
            .iter()
            .map(|c| c.strip_prefix(&prefix).unwrap_or(c).to_string())
            .collect()
    }
}

impl Migration for GlobalCron {
    fn is_applicable(&self) -> bool {
        !self.skip
    }

    fn up(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let dir = ctx.service_dir();
        let compose = ctx.settings.compose_file();
        let compose_backup = ctx.settings.backup_path_for(&compose, ".bak");
        let cron_config = ctx.settings.cron_config();
        let cron_backup = ctx.settings.backup_path_for(&cron_config, ".bak");
        let legacy_services = self.legacy_services(ctx);
        let services = ctx.services();

        let restore = |backup: &std::path::Path, live: &std::path::Path| -> Result<()> {
            if legacy_services.is_empty() {
                return backup_restore(backup, live);
            }
            restore_and_up(ctx, backup, live, &legacy_services)
        };

        let mut processor = RevertableStepProcessor::new();
        processor
            .add_step(
                MigrationStep::new("backup-global-compose-file", || {
                    backup_restore(&compose, &compose_backup)
                })
                .with_reverse(|| restore(&compose_backup, &compose)),
            )
            .add_step(MigrationStep::new("generate-global-compose-file", || {
                ctx.generator().generate().map(drop)
            }))
            .add_step(MigrationStep::new("remove-legacy-cron-containers", || {
                remove_containers(ctx, &self.running)
            }))
            .add_step(
                MigrationStep::new("backup-cron-config", || {
                    if cron_config.is_file() {
                        backup_restore(&cron_config, &cron_backup)
                    } else {
                        debug!("No cron config at {}", cron_config.display());
                        Ok(())
                    }
                })
                .with_reverse(|| {
                    if cron_backup.is_file() {
                        restore(&cron_backup, &cron_config)
                    } else {
                        Ok(())
                    }
                }),
            )
            .add_step(
                MigrationStep::new("start-global-cron", || {
                    services.up(&[GlobalService::Cron])?;
                    info!("global-cron started");
                    Ok(())
                })
                .with_reverse(|| {
                    if ctx
                        .docker
                        .compose_stop(&dir, &[GlobalService::Cron.compose_service()])?
                    {
                        Ok(())
                    } else {
                        Err(Error::Command("Unable to stop global-cron".to_string()))
                    }
                }),
            );

        processor.execute()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GlobalNames, Settings};
    use crate::docker::DockerClient;
    use crate::state::StateStore;
    use crate::testing::ScriptedRunner;
    use std::fs;

    #[test]
    fn rename_rolls_back_when_legacy_removal_fails() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            platform: crate::config::Platform::Linux,
            ..Settings::with_root(dir.path())
        };
        fs::create_dir_all(settings.service_dir()).unwrap();
        fs::write(settings.compose_file(), "old: true\n").unwrap();
        let runner = ScriptedRunner::new();
        runner.running("gs-global-db");
        runner.running("gs-global-redis");
        runner.fail("docker rm -f gs-global");
        let names = GlobalNames::default();
        let docker = DockerClient::new(&runner, &names);
        let store = StateStore::open_in_memory().unwrap();
        let ctx = MigrationContext {
            settings: &settings,
            store: &store,
            docker: &docker,
            first_execution: false,
        };

        let migration = RenameGlobalContainers::new(&ctx).unwrap();
        assert!(migration.is_applicable());
        let err = migration.up(&ctx).unwrap_err();

        assert!(matches!(
            err,
            Error::StepFailed { ref step, .. } if step == "remove-legacy-containers"
        ));
        assert!(runner.ran("docker rm -f gs-global-redis gs-global-db"));

        let commands = runner.commands();
        let support_rm = format!(
            "docker rm -f {} {}",
            names.support_container(GlobalService::Db),
            names.support_container(GlobalService::Redis)
        );
        let remove_support = commands.iter().position(|c| *c == support_rm).unwrap();
        let restore_up = commands
            .iter()
            .position(|c| c == "docker compose up -d")
            .unwrap();
        assert!(remove_support < restore_up);
        assert!(!runner.ran("up -d global-"));
        assert_eq!(
            fs::read_to_string(settings.compose_file()).unwrap(),
            "old: true\n"
        );
    }

    #[test]
    fn add_cron_service_only_swaps_running_scheduler() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::with_root(dir.path());
        fs::create_dir_all(settings.service_dir()).unwrap();
        fs::write(settings.compose_file(), "services: {}\n").unwrap();
        let runner = ScriptedRunner::new();
        runner.running("gs-cron-scheduler");
        let names = GlobalNames::default();
        let docker = DockerClient::new(&runner, &names);
        let store = StateStore::open_in_memory().unwrap();
        let ctx = MigrationContext {
            settings: &settings,
            store: &store,
            docker: &docker,
            first_execution: false,
        };

        let migration = AddCronService::new(&ctx).unwrap();
        migration.up(&ctx).unwrap();

        let up = runner.position("up -d global-cron").unwrap();
        let rm = runner.position("docker rm -f gs-cron-scheduler").unwrap();
        assert!(up < rm);
        assert!(settings
            .backup_path_for(&settings.compose_file(), ".backup")
            .exists());
    }

    #[test]
    fn global_cron_restores_and_restarts_scheduler_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::with_root(dir.path());
        fs::create_dir_all(settings.service_dir()).unwrap();
        fs::write(settings.compose_file(), "old: true\n").unwrap();
        let runner = ScriptedRunner::new();
        runner.running("gs-cron-scheduler");
        runner.fail("up -d global-cron");
        let names = GlobalNames::default();
        let docker = DockerClient::new(&runner, &names);
        let store = StateStore::open_in_memory().unwrap();
        let ctx = MigrationContext {
            settings: &settings,
            store: &store,
            docker: &docker,
            first_execution: false,
        };

        let migration = GlobalCron::new(&ctx).unwrap();
        let err = migration.up(&ctx).unwrap_err();

        assert!(matches!(err, Error::StepFailed { ref step, .. } if step == "start-global-cron"));
        assert_eq!(
            fs::read_to_string(settings.compose_file()).unwrap(),
            "old: true\n"
        );
        assert!(runner.ran("up -d cron-scheduler"));
        assert!(!runner.ran("stop global-cron"));
    }
}
