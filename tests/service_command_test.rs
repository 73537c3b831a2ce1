mod common;

use common::{linux_root, names, ScriptedRunner};
use global_services::{
    DockerClient, EnableOutcome, Error, GlobalService, GlobalServices, StateStore,
};

#[test]
fn test_enable_running_service_changes_nothing() {
    let (_dir, settings) = linux_root();
    let runner = ScriptedRunner::new();
    runner.running("services_global-db_1");
    let names = names();
    let docker = DockerClient::new(&runner, &names);
    let store = StateStore::open_in_memory().unwrap();
    let services = GlobalServices::new(&settings, &store, &docker);

    let outcome = services.enable(GlobalService::Db).unwrap();

    assert_eq!(outcome, EnableOutcome::AlreadyRunning);
    assert!(runner.mutations().is_empty(), "{:?}", runner.mutations());
    assert!(!settings.compose_file().exists());
}

#[test]
fn test_enable_absent_service_boots_networks_then_creates_container() {
    let (_dir, settings) = linux_root();
    let runner = ScriptedRunner::new();
    runner.fail("docker network inspect global-");
    let names = names();
    let docker = DockerClient::new(&runner, &names);
    let store = StateStore::open_in_memory().unwrap();
    let services = GlobalServices::new(&settings, &store, &docker);

    let outcome = services.enable(GlobalService::Redis).unwrap();

    assert_eq!(outcome, EnableOutcome::Started);
    assert!(settings.compose_file().exists());
    let commands = runner.commands();
    let network = commands
        .iter()
        .position(|c| c.starts_with("docker network create"))
        .unwrap();
    let up = commands
        .iter()
        .position(|c| c.contains("up -d global-redis"))
        .unwrap();
    assert!(network < up);
    assert!(!runner.ran("up -d global-db"));
}

#[test]
fn test_lifecycle_on_missing_container_is_not_created() {
    let (_dir, settings) = linux_root();
    let runner = ScriptedRunner::new();
    let names = names();
    let docker = DockerClient::new(&runner, &names);
    let store = StateStore::open_in_memory().unwrap();
    let services = GlobalServices::new(&settings, &store, &docker);

    let err = services.stop(GlobalService::Redis).unwrap_err();
    assert!(matches!(err, Error::NotCreated(ref c) if c == "services_global-redis_1"));
    assert!(err.suggestion().is_some());
    assert!(!runner.ran("docker stop"));
}

#[test]
fn test_reload_only_for_proxy_and_db() {
    let (_dir, settings) = linux_root();
    let runner = ScriptedRunner::new();
    runner.running("services_global-db_1");
    let names = names();
    let docker = DockerClient::new(&runner, &names);
    let store = StateStore::open_in_memory().unwrap();
    let services = GlobalServices::new(&settings, &store, &docker);

    assert!(matches!(
        services.reload(GlobalService::Redis),
        Err(Error::ReloadUnsupported(_))
    ));
    services.reload(GlobalService::Db).unwrap();
    assert!(runner.ran("docker exec services_global-db_1 sh -c"));
}

#[test]
fn test_refresh_restarts_only_what_was_running() {
    let (_dir, settings) = linux_root();
    let runner = ScriptedRunner::new();
    runner.running("services_global-redis_1");
    let names = names();
    let docker = DockerClient::new(&runner, &names);
    let store = StateStore::open_in_memory().unwrap();
    let services = GlobalServices::new(&settings, &store, &docker);

    let restarted = services.refresh(&GlobalService::ALL).unwrap();

    assert_eq!(restarted, vec![GlobalService::Redis]);
    assert!(settings.compose_file().exists());
    assert!(runner.ran("up -d global-redis"));
    assert!(!runner.ran("up -d global-db"));
    assert!(!runner.ran("up -d global-nginx-proxy"));
}
