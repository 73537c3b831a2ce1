use crate::output::UserOutput;
use global_services::{EnableOutcome, GlobalService, GlobalServices};

/// The single-service subcommands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Enable,
    Disable,
    Start,
    Stop,
    Restart,
    Reload,
}

impl ServiceAction {
    fn past_tense(self) -> &'static str {
        match self {
            ServiceAction::Enable => "enabled",
            ServiceAction::Disable => "disabled",
            ServiceAction::Start => "started",
            ServiceAction::Stop => "stopped",
            ServiceAction::Restart => "restarted",
            ServiceAction::Reload => "reloaded",
        }
    }
}

pub fn run_service(
    services: &GlobalServices<'_>,
    action: ServiceAction,
    name: &str,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    // Validate before touching docker.
    let service: GlobalService = name.parse()?;

    match action {
        ServiceAction::Enable => {
            if services.enable(service)? == EnableOutcome::AlreadyRunning {
                out.status(&format!("Global service {} is already running", service));
                return Ok(());
            }
        }
        ServiceAction::Disable => services.disable(service)?,
        ServiceAction::Start => services.start(service)?,
        ServiceAction::Stop => services.stop(service)?,
        ServiceAction::Restart => services.restart(service)?,
        ServiceAction::Reload => services.reload(service)?,
    }

    out.success(&format!("Global service {} {}", service, action.past_tense()));
    Ok(())
}

pub fn run_refresh(
    services: &GlobalServices<'_>,
    name: Option<&str>,
    out: &dyn UserOutput,
) -> anyhow::Result<()> {
    let selection = match name {
        Some(name) => vec![name.parse::<GlobalService>()?],
        None => GlobalService::ALL.to_vec(),
    };

    out.status("Regenerating global services configuration...");
    let restarted = services.refresh(&selection)?;
    if restarted.is_empty() {
        out.warning("Nothing was running, configuration written without restarting");
    } else {
        let list: Vec<String> = restarted.iter().map(ToString::to_string).collect();
        out.success(&format!("Refreshed {}", list.join(", ")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::QuietOutput;
    use global_services::{DockerClient, Error, GlobalNames, Settings, ShellRunner, StateStore};

    #[test]
    fn unknown_service_fails_before_any_command() {
        let settings = Settings::with_root("/nonexistent-root");
        let store = StateStore::open_in_memory().unwrap();
        let runner = ShellRunner::new();
        let names = GlobalNames::default();
        let docker = DockerClient::new(&runner, &names);
        let services = GlobalServices::new(&settings, &store, &docker);

        let err = run_service(&services, ServiceAction::Enable, "mongo", &QuietOutput).unwrap_err();
        match err.downcast_ref::<Error>() {
            Some(Error::UnknownService { name, valid }) => {
                assert_eq!(name, "mongo");
                assert!(valid.contains(&"db".to_string()));
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let err = run_refresh(&services, Some("postgres"), &QuietOutput).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::UnknownService { .. })
        ));
    }

    #[test]
    fn past_tense_messages() {
        assert_eq!(ServiceAction::Enable.past_tense(), "enabled");
        assert_eq!(ServiceAction::Reload.past_tense(), "reloaded");
    }
}
