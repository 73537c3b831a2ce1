mod cli;
mod commands;
mod output;

use clap::{CommandFactory, Parser};
use cli::{Cli, Commands};
use commands::ServiceAction;
use global_services::{
    DockerClient, Error as GsError, GlobalServices, MigrationRunner, Parser as ConfigParser,
    ShellRunner, StateStore,
};

fn main() {
    if let Err(e) = run() {
        if let Some(gs_error) = e.downcast_ref::<GsError>() {
            eprintln!("Error: {}", gs_error.with_suggestion());
        } else {
            eprintln!("Error: {:#}", e);
        }
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose)?;

    // ── Commands that need no installation ──────────────────────────
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = Cli::command();
        let bin_name = cmd.get_name().to_string();
        clap_complete::generate(*shell, &mut cmd, bin_name, &mut std::io::stdout());
        return Ok(());
    }

    // ── Load settings and state ─────────────────────────────────────
    let parser = ConfigParser::new();
    let root = parser.resolve_root(cli.root.clone());
    let settings = parser.load_settings(&root)?;
    tracing::debug!("Using installation root {}", settings.root_dir.display());

    let store = StateStore::open(&settings.state_db())?;
    tracing::debug!("Using state database {}", store.path().display());
    let shell = ShellRunner::new();
    let docker = DockerClient::new(&shell, &settings.names);
    let out = &output::CliOutput;

    let service_action = |action: ServiceAction, name: &str| {
        let services = GlobalServices::new(&settings, &store, &docker);
        commands::run_service(&services, action, name, out)
    };

    match &cli.command {
        Commands::Enable { service } => service_action(ServiceAction::Enable, service),
        Commands::Disable { service } => service_action(ServiceAction::Disable, service),
        Commands::Start { service } => service_action(ServiceAction::Start, service),
        Commands::Stop { service } => service_action(ServiceAction::Stop, service),
        Commands::Restart { service } => service_action(ServiceAction::Restart, service),
        Commands::Reload { service } => service_action(ServiceAction::Reload, service),
        Commands::Refresh { service } => {
            let services = GlobalServices::new(&settings, &store, &docker);
            commands::run_refresh(&services, service.as_deref(), out)
        }
        Commands::Migrate { list } => {
            let runner = MigrationRunner::new(&settings, &store, &docker);
            commands::run_migrate(&runner, *list, out)
        }
        Commands::Completions { .. } => Ok(()),
    }
}

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}
