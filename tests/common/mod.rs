//! Shared fixtures for integration tests.
#![allow(dead_code)]

use global_services::{
    CommandOutput, CommandRunner, GlobalNames, Platform, Result, Settings, ShellCommand,
};
use std::cell::RefCell;
use std::time::Duration;
use tempfile::TempDir;

/// Records every command line and answers from substring rules.
///
/// The most recently added matching rule wins; anything unmatched succeeds
/// with empty output.
#[derive(Default)]
pub struct ScriptedRunner {
    rules: RefCell<Vec<(String, CommandOutput)>>,
    log: RefCell<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, pattern: &str, output: CommandOutput) -> &Self {
        self.rules.borrow_mut().push((pattern.to_string(), output));
        self
    }

    pub fn stdout(&self, pattern: &str, stdout: &str) -> &Self {
        self.respond(pattern, CommandOutput::ok(stdout))
    }

    pub fn fail(&self, pattern: &str) -> &Self {
        self.respond(pattern, CommandOutput::failed(1, "scripted failure"))
    }

    /// Report `container` as running to `docker inspect`.
    pub fn running(&self, container: &str) -> &Self {
        self.stdout(
            &format!("docker inspect -f '{{{{.State.Status}}}}' {}", container),
            "running\n",
        )
    }

    pub fn commands(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.log.borrow().iter().any(|c| c.contains(pattern))
    }

    /// Commands that change engine state, as opposed to queries.
    pub fn mutations(&self) -> Vec<String> {
        const MUTATING: [&str; 9] = [
            " up ", " stop", " rm", " run ", " start ", " restart", " down", " create", " exec ",
        ];
        self.commands()
            .into_iter()
            .filter(|c| MUTATING.iter().any(|m| c.contains(m)))
            .collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &ShellCommand) -> Result<CommandOutput> {
        let line = command.line().to_string();
        self.log.borrow_mut().push(line.clone());
        let output = self
            .rules
            .borrow()
            .iter()
            .rev()
            .find(|(pattern, _)| line.contains(pattern.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput::ok(""));
        Ok(output)
    }

    fn pause(&self, _interval: Duration) {}
}

/// A throwaway installation root with linux settings.
pub fn linux_root() -> (TempDir, Settings) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let settings = Settings {
        platform: Platform::Linux,
        ..Settings::with_root(dir.path())
    };
    (dir, settings)
}

pub fn names() -> GlobalNames {
    GlobalNames::default()
}
