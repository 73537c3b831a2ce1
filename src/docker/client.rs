//! Docker CLI facade.
//!
//! All Docker CLI interactions go through `DockerClient`, which provides
//! consistent error mapping to [`DockerError`] and a single point where
//! `docker` command lines are built.

use super::DockerError;
use crate::compose::VolumeMount;
use crate::config::GlobalNames;
use crate::error::{Error, Result};
use crate::exec::{shell_quote, CommandOutput, CommandRunner, ShellCommand};
use crate::network::{parse_subnet_list, Subnet};
use std::cell::OnceCell;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Lifecycle state of a named container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Running,
    /// Created or exited, but not running.
    Stopped,
    Absent,
}

/// Docker Compose command type (v1 or v2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComposeCommand {
    V2, // docker compose
    V1, // docker-compose
}

impl ComposeCommand {
    /// Detect which docker compose command is available
    fn detect(runner: &dyn CommandRunner) -> Result<ComposeCommand> {
        // Try docker compose (v2) first
        if runner.exec(&ShellCommand::new("docker compose version"))? {
            return Ok(ComposeCommand::V2);
        }

        // Try docker-compose (v1) as fallback
        if runner.exec(&ShellCommand::new("docker-compose --version"))? {
            return Ok(ComposeCommand::V1);
        }

        Err(DockerError::ComposeUnavailable.into())
    }

    pub fn program(&self) -> &'static str {
        match self {
            ComposeCommand::V2 => "docker compose",
            ComposeCommand::V1 => "docker-compose",
        }
    }
}

/// Container-domain wrapper around a [`CommandRunner`].
pub struct DockerClient<'a> {
    runner: &'a dyn CommandRunner,
    names: &'a GlobalNames,
    compose: OnceCell<ComposeCommand>,
}

impl<'a> DockerClient<'a> {
    pub fn new(runner: &'a dyn CommandRunner, names: &'a GlobalNames) -> Self {
        Self {
            runner,
            names,
            compose: OnceCell::new(),
        }
    }

    pub fn runner(&self) -> &'a dyn CommandRunner {
        self.runner
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn run(&self, line: String) -> Result<CommandOutput> {
        self.runner.run(&ShellCommand::new(line))
    }

    fn run_success(&self, line: String) -> Result<CommandOutput> {
        let output = self.run(line.clone())?;
        if output.success() {
            Ok(output)
        } else {
            Err(DockerError::cmd_failed(line, output.stderr.trim(), output.exit_code).into())
        }
    }

    /// The compose program (cached after first detection).
    pub fn compose_command(&self) -> Result<ComposeCommand> {
        if let Some(cmd) = self.compose.get() {
            return Ok(*cmd);
        }
        let detected = ComposeCommand::detect(self.runner)?;
        debug!("Using compose command `{}`", detected.program());
        Ok(*self.compose.get_or_init(|| detected))
    }

    fn compose(&self, dir: &Path, args: &str) -> Result<ShellCommand> {
        let program = self.compose_command()?.program();
        Ok(ShellCommand::new(format!("{} {}", program, args)).in_dir(dir))
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn container_status(&self, container: &str) -> Result<ContainerStatus> {
        let output = self.run(format!(
            "docker inspect -f '{{{{.State.Status}}}}' {}",
            container
        ))?;
        let state = output.stdout_trimmed();
        Ok(if !output.success() || state.is_empty() {
            ContainerStatus::Absent
        } else if state == "running" {
            ContainerStatus::Running
        } else {
            ContainerStatus::Stopped
        })
    }

    pub fn is_running(&self, container: &str) -> Result<bool> {
        Ok(self.container_status(container)? == ContainerStatus::Running)
    }

    /// Get port mappings for a container.
    /// Returns a map from container port (e.g. "80/tcp") to host port (e.g. "8080").
    pub fn inspect_ports(&self, container: &str) -> Result<BTreeMap<String, String>> {
        let line = format!(
            "docker inspect --format='{{{{json .NetworkSettings.Ports}}}}' {}",
            container
        );
        let output = self.run_success(line.clone())?;

        let ports_json: serde_json::Value = serde_json::from_str(output.stdout_trimmed())
            .map_err(|e| DockerError::UnexpectedOutput {
                command: line,
                detail: e.to_string(),
            })?;

        let mut mappings = BTreeMap::new();
        if let Some(ports_obj) = ports_json.as_object() {
            for (container_port, bindings) in ports_obj {
                let host_port = bindings
                    .as_array()
                    .and_then(|b| b.first())
                    .and_then(|first| first.get("HostPort"))
                    .and_then(|v| v.as_str());
                if let Some(host_port) = host_port {
                    mappings.insert(container_port.clone(), host_port.to_string());
                }
            }
        }
        Ok(mappings)
    }

    // ========================================================================
    // Networks
    // ========================================================================

    pub fn network_exists(&self, name: &str) -> Result<bool> {
        self.runner
            .exec(&ShellCommand::new(format!("docker network inspect {}", name)))
    }

    pub fn create_network(&self, name: &str, subnet: Option<&Subnet>) -> Result<bool> {
        let subnet_arg = subnet
            .map(|s| format!(" --subnet {}", s))
            .unwrap_or_default();
        info!("Creating network {}", name);
        self.runner.exec(&ShellCommand::new(format!(
            "docker network create --label {}{} {}",
            shell_quote(&self.names.vendor_label),
            subnet_arg,
            name
        )))
    }

    pub fn remove_network(&self, name: &str) -> Result<bool> {
        self.runner
            .exec(&ShellCommand::new(format!("docker network rm {}", name)))
    }

    /// Every IPv4 subnet used by any docker network on this host.
    pub fn network_subnets(&self) -> Result<Vec<Subnet>> {
        let output = self.run_success(
            "docker network inspect $(docker network ls -q) --format '{{range .IPAM.Config}}{{.Subnet}} {{end}}'"
                .to_string(),
        )?;
        Ok(parse_subnet_list(&output.stdout))
    }

    // ========================================================================
    // Volumes
    // ========================================================================

    /// Names of volumes whose owner label equals `owner`.
    pub fn volumes_by_label(&self, owner: &str) -> Result<Vec<String>> {
        let output = self.run_success(format!(
            "docker volume ls -q --filter label={}={}",
            self.names.owner_label_key, owner
        ))?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub fn create_volume(&self, name: &str, owner: &str) -> Result<bool> {
        self.runner.exec(&ShellCommand::new(format!(
            "docker volume create --label {} --label {}={} {}",
            shell_quote(&self.names.vendor_label),
            self.names.owner_label_key,
            owner,
            name
        )))
    }

    /// Create `<owner>_<name>` volumes for every entry that is not a plain
    /// bind mount. With `link_host_paths`, each host path becomes a symlink
    /// to the volume's mountpoint.
    pub fn create_volumes(
        &self,
        owner: &str,
        volumes: &[VolumeMount],
        link_host_paths: bool,
    ) -> Result<bool> {
        let mut seen = HashSet::new();
        for volume in volumes.iter().filter(|v| !v.skip_volume) {
            if !seen.insert(volume.name.as_str()) {
                continue;
            }
            let full_name = format!("{}_{}", owner, volume.name);
            if !self.create_volume(&full_name, owner)? {
                return Ok(false);
            }
            if link_host_paths {
                self.link_volume(&full_name, &volume.host_path)?;
            }
        }
        Ok(true)
    }

    fn link_volume(&self, volume: &str, host_path: &Path) -> Result<()> {
        let output = self.run_success(format!(
            "docker volume inspect --format '{{{{.Mountpoint}}}}' {}",
            volume
        ))?;
        let mountpoint = output.stdout_trimmed();
        if host_path.symlink_metadata().is_ok() {
            return Ok(());
        }
        if let Some(parent) = host_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::os::unix::fs::symlink(mountpoint, host_path).map_err(|e| {
            Error::Filesystem(format!(
                "Failed to link {} to {}: {}",
                host_path.display(),
                mountpoint,
                e
            ))
        })
    }

    // ========================================================================
    // Container lifecycle
    // ========================================================================

    /// Start a stopped container, or create it with `create` when absent.
    pub fn boot_container(&self, container: &str, create: &ShellCommand) -> Result<bool> {
        match self.container_status(container)? {
            ContainerStatus::Running => Ok(true),
            ContainerStatus::Stopped => {
                info!("Starting container {}", container);
                self.runner
                    .exec(&ShellCommand::new(format!("docker start {}", container)))
            }
            ContainerStatus::Absent => {
                info!("Creating container {}", container);
                self.runner.exec(create)
            }
        }
    }

    pub fn start(&self, container: &str) -> Result<bool> {
        self.runner
            .exec(&ShellCommand::new(format!("docker start {}", container)))
    }

    pub fn stop(&self, container: &str) -> Result<bool> {
        self.runner
            .exec(&ShellCommand::new(format!("docker stop {}", container)))
    }

    pub fn restart(&self, container: &str) -> Result<bool> {
        self.runner
            .exec(&ShellCommand::new(format!("docker restart {}", container)))
    }

    /// Force-remove containers. Missing containers are not an error.
    pub fn rm_force(&self, containers: &[String]) -> Result<bool> {
        if containers.is_empty() {
            return Ok(true);
        }
        let output = self.run(format!("docker rm -f {}", containers.join(" ")))?;
        if output.success() || output.stderr.contains("No such container") {
            return Ok(true);
        }
        debug!("docker rm -f failed: {}", output.stderr.trim());
        Ok(false)
    }

    /// Run a shell snippet inside a running container.
    pub fn exec_sh(&self, container: &str, script: &str) -> Result<CommandOutput> {
        self.run(format!(
            "docker exec {} sh -c {}",
            container,
            shell_quote(script)
        ))
    }

    /// Run a detached container from raw `docker run` arguments.
    pub fn run_detached(&self, args: &str) -> Result<bool> {
        self.runner
            .exec(&ShellCommand::new(format!("docker run -d {}", args)))
    }

    // ========================================================================
    // Compose
    // ========================================================================

    /// The command that creates and starts compose services in `dir`.
    pub fn compose_up_command(&self, dir: &Path, services: &[String]) -> Result<ShellCommand> {
        self.compose(dir, &format!("up -d {}", services.join(" ")).trim_end())
    }

    pub fn compose_up(&self, dir: &Path, services: &[String]) -> Result<bool> {
        let command = self.compose_up_command(dir, services)?;
        self.runner.exec(&command)
    }

    pub fn compose_stop(&self, dir: &Path, services: &[String]) -> Result<bool> {
        let command = self.compose(dir, format!("stop {}", services.join(" ")).trim_end())?;
        self.runner.exec(&command)
    }

    pub fn compose_rm(&self, dir: &Path, services: &[String]) -> Result<bool> {
        let command = self.compose(dir, format!("rm -f {}", services.join(" ")).trim_end())?;
        self.runner.exec(&command)
    }

    pub fn compose_down(&self, dir: &Path) -> Result<bool> {
        let command = self.compose(dir, "down")?;
        self.runner.exec(&command)
    }

    /// `compose exec -T` a shell snippet in a compose service.
    pub fn compose_exec(&self, dir: &Path, service: &str, script: &str) -> Result<bool> {
        let command = self.compose(
            dir,
            &format!("exec -T {} sh -c {}", service, shell_quote(script)),
        )?;
        self.runner.exec(&command)
    }

    /// Run a one-off compose service container with extra arguments.
    pub fn compose_run_detached(
        &self,
        dir: &Path,
        container_name: &str,
        service: &str,
        extra: &str,
    ) -> Result<bool> {
        let command = self.compose(
            dir,
            format!("run -d --name={} {} {}", container_name, service, extra).trim_end(),
        )?;
        self.runner.exec(&command)
    }
}
