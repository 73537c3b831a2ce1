use super::{compose_db_password, Migration, MigrationContext};
use crate::config::GlobalService;
use crate::error::{Error, Result};
use crate::exec::{poll_until_success, shell_quote, CommandRunner, ShellCommand};
use crate::state::{OptionStore, DB_PASSWORD_KEY};
use crate::steps::{backup_restore, MigrationStep, RevertableStepProcessor};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

const DB_CONF_URL: &str = "https://raw.githubusercontent.com/EasyEngine/dockerfiles/v4.0.0/mariadb/ee.cnf";
const ROOT_LOGIN_CHECK: &str = "mysql -uroot -p\"$MYSQL_ROOT_PASSWORD\" -e\"exit\"";
const READY_ATTEMPTS: u32 = 60;

/// Ship the tuned database config to installs whose sites use the global
/// database.
pub struct AddDbConf {
    skip: bool,
}

impl AddDbConf {
    pub fn new(ctx: &MigrationContext<'_>) -> Result<Self> {
        let skip = ctx.first_execution || !ctx.store.sites()?.iter().any(|s| s.uses_global_db());
        Ok(Self { skip })
    }
}

impl Migration for AddDbConf {
    fn is_applicable(&self) -> bool {
        !self.skip
    }

    fn up(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let conf_path = ctx.settings.db_conf_dir().join("conf.d").join("ee.cnf");
        let downloaded = ctx.settings.backup_path_for(&conf_path, "");
        if let Some(parent) = downloaded.parent() {
            fs::create_dir_all(parent)?;
        }

        let download = ShellCommand::new(format!(
            "curl -fsSL --max-time 600 {} -o {}",
            DB_CONF_URL,
            shell_quote(&downloaded.to_string_lossy())
        ));
        ctx.docker
            .runner()
            .require(&download, "Unable to download the database config")?;

        // The database picks the file up on its next restart.
        let mut processor = RevertableStepProcessor::new();
        processor.add_step(MigrationStep::new("add-db-conf-to-global-db", || {
            backup_restore(&downloaded, &conf_path)
        }));
        processor.execute()
    }
}

/// Repair installs whose database root password drifted from the one in the
/// compose file.
pub struct Rc1DbFix {
    skip: bool,
}

impl Rc1DbFix {
    pub fn new(ctx: &MigrationContext<'_>) -> Result<Self> {
        if ctx.first_execution || !ctx.settings.compose_file().exists() {
            return Ok(Self { skip: true });
        }
        let container = ctx.settings.names.container(GlobalService::Db);
        let login_works = ctx.docker.is_running(&container)?
            && ctx.docker.exec_sh(&container, ROOT_LOGIN_CHECK)?.success();
        Ok(Self { skip: login_works })
    }
}

impl Migration for Rc1DbFix {
    fn is_applicable(&self) -> bool {
        !self.skip
    }

    fn up(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let password = compose_db_password(&ctx.settings.compose_file())?.ok_or_else(|| {
            Error::Config("No MYSQL_ROOT_PASSWORD in the global compose file".to_string())
        })?;
        let dir = ctx.service_dir();
        let service = GlobalService::Db.compose_service();
        let container = ctx.settings.names.container(GlobalService::Db);

        if !ctx.docker.compose_stop(&dir, std::slice::from_ref(&service))? {
            warn!("compose stop {} reported failure", service);
        }
        if !ctx.docker.compose_rm(&dir, std::slice::from_ref(&service))? {
            warn!("compose rm {} reported failure", service);
        }
        if !ctx
            .docker
            .compose_run_detached(&dir, &container, &service, "--skip-grant-tables")?
        {
            return Err(Error::Command(format!(
                "Unable to start {} without grant tables",
                container
            )));
        }

        let ready = ShellCommand::new(format!(
            "docker exec {} sh -c {}",
            container,
            shell_quote(ROOT_LOGIN_CHECK)
        ));
        poll_until_success(
            ctx.docker.runner(),
            &ready,
            READY_ATTEMPTS,
            Duration::from_secs(1),
        )?;

        let reset = format!(
            "mysql -e \"FLUSH PRIVILEGES; ALTER USER 'root'@'localhost' IDENTIFIED BY '{}';\"",
            password.replace('\'', "''")
        );
        let output = ctx.docker.exec_sh(&container, &reset)?;
        if !output.success() {
            return Err(Error::Command(format!(
                "Unable to reset database root password: {}",
                output.stderr.trim()
            )));
        }

        ctx.docker.rm_force(std::slice::from_ref(&container))?;
        ctx.services().up(&[GlobalService::Db])?;
        info!("Database root password reset to the configured one");
        Ok(())
    }

    fn down(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let container = ctx.settings.names.container(GlobalService::Db);
        ctx.docker.rm_force(&[container])?;
        ctx.services().up(&[GlobalService::Db])
    }
}

/// Persist the database password of installs that predate the option store.
pub struct SaveDbPassword {
    skip: bool,
}

impl SaveDbPassword {
    pub fn new(ctx: &MigrationContext<'_>) -> Result<Self> {
        Ok(Self {
            skip: ctx.first_execution || !ctx.settings.compose_file().exists(),
        })
    }
}

impl Migration for SaveDbPassword {
    fn is_applicable(&self) -> bool {
        !self.skip
    }

    fn up(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        match compose_db_password(&ctx.settings.compose_file())? {
            Some(password) => {
                ctx.store.set(DB_PASSWORD_KEY, &password)?;
                debug!("Saved global database password");
                Ok(())
            }
            None => Err(Error::Config(
                "No MYSQL_ROOT_PASSWORD in the global compose file".to_string(),
            )),
        }
    }
}

/// Drop the symlinked `my.cnf` layout in favour of the image defaults.
pub struct ConfigureMyCnf {
    skip: bool,
}

impl ConfigureMyCnf {
    pub fn new(ctx: &MigrationContext<'_>) -> Result<Self> {
        Ok(Self {
            skip: ctx.first_execution,
        })
    }
}

impl Migration for ConfigureMyCnf {
    fn is_applicable(&self) -> bool {
        !self.skip
    }

    fn up(&self, ctx: &MigrationContext<'_>) -> Result<()> {
        let conf_dir = ctx.settings.db_conf_dir();
        let my_cnf = conf_dir.join("my.cnf");
        let is_link = fs::symlink_metadata(&my_cnf)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if !is_link {
            debug!("{} is not a symlink, nothing to do", my_cnf.display());
            return Ok(());
        }

        let target = fs::read_link(&my_cnf)?;
        let target: PathBuf = if target.is_absolute() {
            target
        } else {
            conf_dir.join(target)
        };
        if let Err(e) = fs::remove_file(&target) {
            warn!("Unable to remove {}: {}", target.display(), e);
        }
        fs::remove_file(&my_cnf)?;

        let extra_dir = conf_dir.join("mariadb.conf.d");
        if extra_dir.is_dir() {
            for entry in fs::read_dir(&extra_dir)? {
                let path = entry?.path();
                if path.extension().is_some_and(|ext| ext == "cnf") {
                    fs::remove_file(&path)?;
                }
            }
        }
        info!("Removed symlinked my.cnf");
        Ok(())
    }
}
