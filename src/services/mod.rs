//! Lifecycle operations on the global services.
//!
//! [`GlobalServices`] backs the `enable`/`disable`/`start`/`stop`/`restart`/
//! `reload`/`refresh` commands and is reused by migrations that need to
//! regenerate the compose file or bring services back up.

mod proxy;

pub use proxy::{port_is_free, version_header};

use crate::compose::ConfigGenerator;
use crate::config::{GlobalService, Settings};
use crate::docker::{ContainerStatus, DockerClient};
use crate::error::{Error, Result};
use crate::state::OptionStore;
use std::fs;
use tracing::{debug, info};

/// Default `my.cnf` seeded on darwin, where it is bind-mounted.
const DEFAULT_MY_CNF: &str = "[mysqld]
bind-address = 0.0.0.0
character-set-server = utf8mb4
collation-server = utf8mb4_unicode_ci
max_allowed_packet = 64M

!includedir /etc/mysql/conf.d/
";

/// What `enable` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableOutcome {
    AlreadyRunning,
    Started,
}

/// Operations on the fixed set of global services.
pub struct GlobalServices<'a> {
    settings: &'a Settings,
    store: &'a dyn OptionStore,
    docker: &'a DockerClient<'a>,
}

impl<'a> GlobalServices<'a> {
    pub fn new(
        settings: &'a Settings,
        store: &'a dyn OptionStore,
        docker: &'a DockerClient<'a>,
    ) -> Self {
        Self {
            settings,
            store,
            docker,
        }
    }

    pub fn generator(&self) -> ConfigGenerator<'a> {
        ConfigGenerator::new(self.settings, self.store, self.docker)
    }

    fn container(&self, service: GlobalService) -> String {
        self.settings.names.container(service)
    }

    /// Container name of a service that must already exist.
    fn existing_container(&self, service: GlobalService) -> Result<(String, ContainerStatus)> {
        let container = self.container(service);
        match self.docker.container_status(&container)? {
            ContainerStatus::Absent => Err(Error::NotCreated(container)),
            status => Ok((container, status)),
        }
    }

    // ========================================================================
    // Shared building blocks
    // ========================================================================

    /// Write the compose file if it does not exist yet.
    pub fn ensure_compose_file(&self) -> Result<()> {
        if !self.settings.compose_file().exists() {
            self.generator().generate()?;
        }
        Ok(())
    }

    /// Create the frontend and backend networks with their persisted subnets
    /// when they are missing.
    pub fn boot_global_networks(&self) -> Result<()> {
        let (frontend, backend) = self.generator().ensure_subnets()?;
        let names = &self.settings.names;
        for (name, subnet) in [
            (&names.backend_network, backend),
            (&names.frontend_network, frontend),
        ] {
            if self.docker.network_exists(name)? {
                continue;
            }
            if !self.docker.create_network(name, Some(&subnet))? {
                return Err(Error::Network {
                    name: name.clone(),
                    reason: format!("docker network create failed for subnet {}", subnet),
                });
            }
        }
        Ok(())
    }

    /// Names of `services` whose container is running right now.
    pub fn snapshot_running(&self, services: &[GlobalService]) -> Result<Vec<GlobalService>> {
        let mut running = Vec::new();
        for &service in services {
            if self.docker.is_running(&self.container(service))? {
                running.push(service);
            }
        }
        debug!("Running global services: {:?}", running);
        Ok(running)
    }

    /// `compose up -d` the given services.
    pub fn up(&self, services: &[GlobalService]) -> Result<()> {
        if services.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = services.iter().map(|s| s.compose_service()).collect();
        if self.docker.compose_up(&self.settings.service_dir(), &keys)? {
            Ok(())
        } else {
            Err(Error::Command(format!(
                "Unable to start {}",
                keys.join(", ")
            )))
        }
    }

    /// Regenerate the compose file and bring back up whichever of
    /// `services` were running before. Returns that set.
    pub fn refresh_running(&self, services: &[GlobalService]) -> Result<Vec<GlobalService>> {
        let running = self.snapshot_running(services)?;
        self.generator().generate()?;
        if !running.is_empty() {
            self.boot_global_networks()?;
            for service in &running {
                info!("Restarting {} with the refreshed configuration", service);
                self.up(std::slice::from_ref(service))?;
            }
        }
        Ok(running)
    }

    fn seed_darwin_my_cnf(&self) -> Result<()> {
        let path = self.settings.db_conf_dir().join("my.cnf");
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, DEFAULT_MY_CNF)?;
        debug!("Seeded {}", path.display());
        Ok(())
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Start a service, creating its container if needed. A running
    /// service is left untouched.
    pub fn enable(&self, service: GlobalService) -> Result<EnableOutcome> {
        if service == GlobalService::NginxProxy {
            return Ok(if self.proxy_check()? {
                EnableOutcome::Started
            } else {
                EnableOutcome::AlreadyRunning
            });
        }

        let container = self.container(service);
        if self.docker.is_running(&container)? {
            return Ok(EnableOutcome::AlreadyRunning);
        }

        self.boot_global_networks()?;
        self.ensure_compose_file()?;
        if service == GlobalService::Db && self.settings.platform.is_darwin() {
            self.seed_darwin_my_cnf()?;
        }

        let create = self
            .docker
            .compose_up_command(&self.settings.service_dir(), &[service.compose_service()])?;
        if !self.docker.boot_container(&container, &create)? {
            return Err(Error::Command(format!("Unable to start {}", container)));
        }
        Ok(EnableOutcome::Started)
    }

    /// Stop a service through compose.
    pub fn disable(&self, service: GlobalService) -> Result<()> {
        if self
            .docker
            .compose_stop(&self.settings.service_dir(), &[service.compose_service()])?
        {
            Ok(())
        } else {
            Err(Error::Command(format!("Unable to disable {}", service)))
        }
    }

    pub fn start(&self, service: GlobalService) -> Result<()> {
        if service == GlobalService::NginxProxy {
            self.proxy_check()?;
            return Ok(());
        }
        let (container, _) = self.existing_container(service)?;
        self.lifecycle("start", &container, self.docker.start(&container)?)
    }

    pub fn stop(&self, service: GlobalService) -> Result<()> {
        let (container, _) = self.existing_container(service)?;
        self.lifecycle("stop", &container, self.docker.stop(&container)?)
    }

    pub fn restart(&self, service: GlobalService) -> Result<()> {
        let (container, _) = self.existing_container(service)?;
        self.lifecycle("restart", &container, self.docker.restart(&container)?)
    }

    fn lifecycle(&self, verb: &str, container: &str, ok: bool) -> Result<()> {
        if ok {
            Ok(())
        } else {
            Err(Error::Command(format!("Unable to {} {}", verb, container)))
        }
    }

    /// Run the service's reload command inside its container.
    pub fn reload(&self, service: GlobalService) -> Result<()> {
        let command = service
            .reload_command()
            .ok_or_else(|| Error::ReloadUnsupported(service.to_string()))?;
        let (container, status) = self.existing_container(service)?;
        if status != ContainerStatus::Running {
            return Err(Error::Command(format!(
                "{} is not running, start it before reloading",
                container
            )));
        }
        let output = self.docker.exec_sh(&container, command)?;
        if output.success() {
            Ok(())
        } else {
            Err(Error::Command(format!(
                "Reload of {} failed: {}",
                service,
                output.stderr.trim()
            )))
        }
    }

    /// Regenerate the compose file, restarting only what was running.
    pub fn refresh(&self, services: &[GlobalService]) -> Result<Vec<GlobalService>> {
        self.refresh_running(services)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GlobalNames, Platform};
    use crate::exec::CommandOutput;
    use crate::state::StateStore;
    use crate::testing::ScriptedRunner;

    struct Fixture {
        _dir: tempfile::TempDir,
        settings: Settings,
        store: StateStore,
        runner: ScriptedRunner,
        names: GlobalNames,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings {
            platform: Platform::Linux,
            ..Settings::with_root(dir.path())
        };
        Fixture {
            _dir: dir,
            settings,
            store: StateStore::open_in_memory().unwrap(),
            runner: ScriptedRunner::new(),
            names: GlobalNames::default(),
        }
    }

    #[test]
    fn enable_running_service_is_a_no_op() {
        let f = fixture();
        f.runner.running("services_global-redis_1");
        let docker = DockerClient::new(&f.runner, &f.names);
        let services = GlobalServices::new(&f.settings, &f.store, &docker);

        let outcome = services.enable(GlobalService::Redis).unwrap();

        assert_eq!(outcome, EnableOutcome::AlreadyRunning);
        assert_eq!(f.runner.commands().len(), 1);
        assert!(!f.settings.compose_file().exists());
    }

    #[test]
    fn enable_creates_absent_service() {
        let f = fixture();
        f.runner.fail("docker network inspect global-");
        let docker = DockerClient::new(&f.runner, &f.names);
        let services = GlobalServices::new(&f.settings, &f.store, &docker);

        let outcome = services.enable(GlobalService::Db).unwrap();

        assert_eq!(outcome, EnableOutcome::Started);
        assert!(f.settings.compose_file().exists());
        assert!(f.runner.ran("docker network create"));
        assert!(f.runner.ran("docker compose up -d global-db"));
    }

    #[test]
    fn reload_is_refused_without_a_command() {
        let f = fixture();
        let docker = DockerClient::new(&f.runner, &f.names);
        let services = GlobalServices::new(&f.settings, &f.store, &docker);

        assert!(matches!(
            services.reload(GlobalService::Redis),
            Err(Error::ReloadUnsupported(_))
        ));
        assert!(f.runner.commands().is_empty());
    }

    #[test]
    fn reload_execs_inside_running_container() {
        let f = fixture();
        f.runner.running("services_global-nginx-proxy_1");
        let docker = DockerClient::new(&f.runner, &f.names);
        let services = GlobalServices::new(&f.settings, &f.store, &docker);

        services.reload(GlobalService::NginxProxy).unwrap();
        assert!(f
            .runner
            .ran("docker exec services_global-nginx-proxy_1 sh -c 'nginx -t && nginx -s reload'"));
    }

    #[test]
    fn stop_requires_existing_container() {
        let f = fixture();
        let docker = DockerClient::new(&f.runner, &f.names);
        let services = GlobalServices::new(&f.settings, &f.store, &docker);

        assert!(matches!(
            services.stop(GlobalService::Cron),
            Err(Error::NotCreated(name)) if name == "services_global-cron_1"
        ));
        assert!(!f.runner.ran("docker stop"));
    }

    #[test]
    fn refresh_restarts_only_previously_running() {
        let f = fixture();
        f.runner.running("services_global-db_1");
        let docker = DockerClient::new(&f.runner, &f.names);
        let services = GlobalServices::new(&f.settings, &f.store, &docker);

        let restarted = services
            .refresh(&[GlobalService::Db, GlobalService::Redis])
            .unwrap();

        assert_eq!(restarted, vec![GlobalService::Db]);
        assert!(f.settings.compose_file().exists());
        assert!(f.runner.ran("up -d global-db"));
        assert!(!f.runner.ran("up -d global-redis"));
    }

    #[test]
    fn network_creation_failure_is_fatal() {
        let f = fixture();
        f.runner.fail("docker network inspect global-backend-network");
        f.runner
            .respond("docker network create", CommandOutput::failed(1, "pool overlaps"));
        let docker = DockerClient::new(&f.runner, &f.names);
        let services = GlobalServices::new(&f.settings, &f.store, &docker);

        assert!(matches!(
            services.boot_global_networks(),
            Err(Error::Network { name, .. }) if name == "global-backend-network"
        ));
    }
}
