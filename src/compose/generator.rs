use super::descriptor::{DesiredState, GlobalServiceDescriptor, NetworkDescriptor, VolumeMount};
use crate::config::{GlobalService, Settings};
use crate::docker::DockerClient;
use crate::error::{Error, Result};
use crate::network::{next_free_slash16, Subnet};
use crate::state::{OptionStore, BACKEND_SUBNET_KEY, DB_PASSWORD_KEY, FRONTEND_SUBNET_KEY};
use std::fs;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info};

/// Generate a random 32-character alphanumeric password.
pub fn generate_password() -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::thread_rng();
    (0..32)
        .map(|_| {
            let idx = rng.gen_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

/// Computes the desired global configuration and materialises it.
pub struct ConfigGenerator<'a> {
    settings: &'a Settings,
    store: &'a dyn OptionStore,
    docker: &'a DockerClient<'a>,
}

impl<'a> ConfigGenerator<'a> {
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

    fn stored_subnet(&self, key: &str) -> Result<Option<Subnet>> {
        match self.store.get(key)? {
            Some(value) if !value.trim().is_empty() => Ok(Some(value.trim().parse()?)),
            _ => Ok(None),
        }
    }

    /// Frontend and backend subnets, allocating and persisting whichever is
    /// missing. Once both are stored they are returned unchanged.
    pub fn ensure_subnets(&self) -> Result<(Subnet, Subnet)> {
        let frontend = self.stored_subnet(FRONTEND_SUBNET_KEY)?;
        let backend = self.stored_subnet(BACKEND_SUBNET_KEY)?;
        if let (Some(frontend), Some(backend)) = (frontend, backend) {
            return Ok((frontend, backend));
        }

        let mut taken = self.docker.network_subnets()?;
        taken.extend(frontend);
        taken.extend(backend);

        let frontend = match frontend {
            Some(subnet) => subnet,
            None => self.allocate(FRONTEND_SUBNET_KEY, &mut taken)?,
        };
        let backend = match backend {
            Some(subnet) => subnet,
            None => self.allocate(BACKEND_SUBNET_KEY, &mut taken)?,
        };
        Ok((frontend, backend))
    }

    fn allocate(&self, key: &str, taken: &mut Vec<Subnet>) -> Result<Subnet> {
        let subnet = next_free_slash16(taken)?;
        self.store.set(key, &subnet.to_string())?;
        info!("Allocated subnet {} ({})", subnet, key);
        taken.push(subnet);
        Ok(subnet)
    }

    /// The stored database root password, generating and storing one only
    /// when none exists yet.
    pub fn db_password(&self) -> Result<String> {
        if let Some(password) = self.store.get(DB_PASSWORD_KEY)? {
            if !password.is_empty() {
                return Ok(password);
            }
        }
        let password = generate_password();
        self.store.set(DB_PASSWORD_KEY, &password)?;
        debug!("Generated new global database password");
        Ok(password)
    }

    /// Compute the desired state, allocating subnets and the password on
    /// first use.
    pub fn desired_state(&self) -> Result<DesiredState> {
        let (frontend, backend) = self.ensure_subnets()?;
        let password = self.db_password()?;
        Ok(build_desired_state(
            self.settings,
            frontend,
            backend,
            &password,
            host_ids(),
        ))
    }

    /// Create labelled volumes (non-darwin) and write the compose file.
    pub fn generate(&self) -> Result<DesiredState> {
        let desired = self.desired_state()?;
        if !self.settings.platform.is_darwin() {
            self.ensure_volumes(&desired)?;
        }

        let path = self.settings.compose_file();
        write_atomic(&path, &desired.render()?)?;
        info!("Wrote global compose file {}", path.display());
        Ok(desired)
    }

    fn ensure_volumes(&self, desired: &DesiredState) -> Result<()> {
        for descriptor in &desired.services {
            let mounts: Vec<VolumeMount> = descriptor
                .volumes
                .iter()
                .filter(|v| v.applies_to(desired.platform))
                .cloned()
                .collect();
            if !mounts.iter().any(|v| v.is_named_on(desired.platform)) {
                continue;
            }

            let owner = descriptor.compose_service();
            if !self.docker.volumes_by_label(&owner)?.is_empty() {
                continue;
            }
            if !self.docker.create_volumes(&owner, &mounts, false)? {
                return Err(Error::Command(format!(
                    "Unable to create volumes for {}",
                    owner
                )));
            }
        }
        Ok(())
    }
}

fn host_ids() -> (u32, u32) {
    (
        nix::unistd::geteuid().as_raw(),
        nix::unistd::getegid().as_raw(),
    )
}

/// Pure desired-state computation from already-resolved inputs.
pub(crate) fn build_desired_state(
    settings: &Settings,
    frontend: Subnet,
    backend: Subnet,
    password: &str,
    (uid, gid): (u32, u32),
) -> DesiredState {
    let names = &settings.names;
    let dir = settings.service_dir();
    let (http, https) = settings.proxy_ports();

    let descriptor = |service: GlobalService| GlobalServiceDescriptor {
        service,
        container_name: names.container(service),
        image: settings.images.reference(service),
        restart: "always".to_string(),
        ports: Vec::new(),
        environment: Vec::new(),
        volumes: Vec::new(),
        networks: Vec::new(),
        command: None,
    };

    let proxy_dir = dir.join("nginx-proxy");
    let proxy = GlobalServiceDescriptor {
        ports: vec![format!("{}:80", http), format!("{}:443", https)],
        environment: vec![
            format!("LOCAL_USER_ID={}", uid),
            format!("LOCAL_GROUP_ID={}", gid),
        ],
        volumes: vec![
            VolumeMount::managed("certs", proxy_dir.join("certs"), "/etc/nginx/certs"),
            VolumeMount::managed("dhparam", proxy_dir.join("dhparam"), "/etc/nginx/dhparam"),
            VolumeMount::managed("confd", proxy_dir.join("conf.d"), "/etc/nginx/conf.d"),
            VolumeMount::managed("htpasswd", proxy_dir.join("htpasswd"), "/etc/nginx/htpasswd"),
            VolumeMount::managed("vhostd", proxy_dir.join("vhost.d"), "/etc/nginx/vhost.d"),
            VolumeMount::managed("html", proxy_dir.join("html"), "/usr/share/nginx/html"),
            VolumeMount::managed("nginx_proxy_logs", proxy_dir.join("logs"), "/var/log/nginx"),
            VolumeMount::managed("docker_sock", "/var/run/docker.sock", "/tmp/docker.sock:ro")
                .bind_only(),
        ],
        networks: vec![names.frontend_network.clone()],
        ..descriptor(GlobalService::NginxProxy)
    };

    let db_dir = dir.join("mariadb");
    let db = GlobalServiceDescriptor {
        environment: vec![format!("MYSQL_ROOT_PASSWORD={}", password)],
        volumes: vec![
            VolumeMount::managed("db_data", db_dir.join("data"), "/var/lib/mysql"),
            VolumeMount::managed("db_conf", db_dir.join("conf"), "/etc/mysql").skip_on_darwin(),
            VolumeMount::managed("db_conf", db_dir.join("conf").join("my.cnf"), "/etc/mysql/my.cnf")
                .skip_on_linux()
                .bind_only(),
            VolumeMount::managed("db_logs", db_dir.join("logs"), "/var/log/mysql"),
        ],
        networks: vec![names.backend_network.clone()],
        ..descriptor(GlobalService::Db)
    };

    let redis_dir = dir.join("redis");
    let redis = GlobalServiceDescriptor {
        command: Some(vec![
            "redis-server".to_string(),
            "/usr/local/etc/redis/redis.conf".to_string(),
        ]),
        volumes: vec![
            VolumeMount::managed("redis_data", redis_dir.join("data"), "/data").skip_on_darwin(),
            VolumeMount::managed("redis_conf", redis_dir.join("conf"), "/usr/local/etc/redis")
                .skip_on_darwin(),
            VolumeMount::managed("redis_logs", redis_dir.join("logs"), "/var/log/redis"),
        ],
        networks: vec![names.backend_network.clone()],
        ..descriptor(GlobalService::Redis)
    };

    let cron = GlobalServiceDescriptor {
        command: Some(vec![
            "daemon".to_string(),
            "--config".to_string(),
            "/etc/ofelia/config.ini".to_string(),
        ]),
        volumes: vec![
            VolumeMount::managed("docker_sock", "/var/run/docker.sock", "/var/run/docker.sock:ro")
                .bind_only(),
            VolumeMount::managed("cron_config", dir.join("cron"), "/etc/ofelia:ro").bind_only(),
        ],
        ..descriptor(GlobalService::Cron)
    };

    let newrelic = GlobalServiceDescriptor {
        volumes: vec![VolumeMount::managed(
            "newrelic_sock",
            dir.join("newrelic").join("sock"),
            "/run/newrelic",
        )
        .skip_on_darwin()],
        networks: vec![names.backend_network.clone()],
        ..descriptor(GlobalService::NewrelicDaemon)
    };

    let network = |name: &str, subnet: Subnet| NetworkDescriptor {
        name: name.to_string(),
        labels: vec![names.vendor_label.clone()],
        subnet,
    };

    DesiredState {
        platform: settings.platform,
        services: vec![proxy, db, redis, cron, newrelic],
        networks: vec![
            network(&names.frontend_network, frontend),
            network(&names.backend_network, backend),
        ],
    }
}

/// Write `contents` to `path` through a synced temp file and rename.
pub(crate) fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    let mut file = fs::File::create(&temp_path)
        .map_err(|e| Error::Filesystem(format!("Failed to create temp file: {}", e)))?;
    file.write_all(contents.as_bytes())
        .map_err(|e| Error::Filesystem(format!("Failed to write temp file: {}", e)))?;
    file.sync_all()
        .map_err(|e| Error::Filesystem(format!("Failed to sync temp file: {}", e)))?;
    drop(file);

    fs::rename(&temp_path, path)
        .map_err(|e| Error::Filesystem(format!("Failed to rename temp file: {}", e)))?;
    Ok(())
}
