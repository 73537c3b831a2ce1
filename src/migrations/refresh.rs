use super::{Migration, MigrationContext};
use crate::config::GlobalService;
use crate::error::{Error, Result};
use tracing::{info, warn};

/// Create the labelled socket volume the telemetry daemon shares with sites.
pub struct AddTelemetryVolume {
    skip: bool,
}

impl AddTelemetryVolume {
    pub fn new(ctx: &MigrationContext<'_>) -> Result<Self> {
        Ok(Self {
            skip: ctx.first_execution || ctx.settings.platform.is_darwin(),
        })
    }
}

impl Migration for AddTelemetryVolume {
    fn is_applicable(&self) -> bool {
        !self.skip
    }

    fn up(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let owner = GlobalService::NewrelicDaemon.compose_service();
        let volume = format!("{}_newrelic_sock", owner);
        if ctx.docker.create_volume(&volume, &owner)? {
            Ok(())
        } else {
            Err(Error::Command(format!("Unable to create volume {}", volume)))
        }
    }
}

/// Regenerate the compose file without the sysctl overrides.
pub struct RemoveSysctl {
    skip: bool,
}

impl RemoveSysctl {
    pub fn new(ctx: &MigrationContext<'_>) -> Result<Self> {
        Ok(Self {
            skip: ctx.first_execution,
        })
    }
}

impl Migration for RemoveSysctl {
    fn is_applicable(&self) -> bool {
        !self.skip
    }

    fn up(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        ctx.services()
            .refresh_running(&[
                GlobalService::NginxProxy,
                GlobalService::Db,
                GlobalService::Redis,
                GlobalService::NewrelicDaemon,
            ])
            .map(drop)
    }
}

/// Recreate the global networks with fixed, persisted subnets.
///
/// Sites are taken down first since their containers hold endpoints on the
/// networks being removed, and brought back afterwards.
pub struct AddSubnetIp {
    skip: bool,
}

impl AddSubnetIp {
    pub fn new(ctx: &MigrationContext<'_>) -> Result<Self> {
        Ok(Self {
            skip: ctx.first_execution,
        })
    }
}

impl Migration for AddSubnetIp {
    fn is_applicable(&self) -> bool {
        !self.skip
    }

    fn up(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let services = ctx.services();
        let names = &ctx.settings.names;

        let enabled: Vec<_> = ctx.store.sites()?.into_iter().filter(|s| s.enabled).collect();
        for site in &enabled {
            site.site_type.disable(site, ctx.docker)?;
        }

        ctx.generator().ensure_subnets()?;
        let running = services.snapshot_running(&[
            GlobalService::NginxProxy,
            GlobalService::Db,
            GlobalService::Redis,
        ])?;

        let dir = ctx.service_dir();
        if !ctx.docker.compose_down(&dir)? {
            warn!("compose down in {} reported failure", dir.display());
        }
        for network in [&names.frontend_network, &names.backend_network] {
            if !ctx.docker.remove_network(network)? {
                warn!("Unable to remove network {}", network);
            }
        }

        ctx.generator().generate()?;
        services.boot_global_networks()?;
        for service in &running {
            services.up(std::slice::from_ref(service))?;
        }

        for site in &enabled {
            site.site_type.enable(site, ctx.docker)?;
        }
        info!(
            "Recreated global networks, {} site(s) re-enabled",
            enabled.len()
        );
        Ok(())
    }
}

/// Regenerate the compose file for proxy, database and cache.
pub struct RefreshCompose {
    skip: bool,
}

impl RefreshCompose {
    pub fn new(ctx: &MigrationContext<'_>) -> Result<Self> {
        Ok(Self {
            skip: ctx.first_execution,
        })
    }
}

impl Migration for RefreshCompose {
    fn is_applicable(&self) -> bool {
        !self.skip
    }

    fn up(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        ctx.generator().ensure_subnets()?;
        ctx.services()
            .refresh_running(&[
                GlobalService::NginxProxy,
                GlobalService::Db,
                GlobalService::Redis,
            ])
            .map(drop)
    }
}
