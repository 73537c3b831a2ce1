//! Test doubles shared by unit tests.

use crate::error::Result;
use crate::exec::{CommandOutput, CommandRunner, ShellCommand};
use std::cell::RefCell;
use std::time::Duration;

struct Rule {
    pattern: String,
    exact: bool,
    output: CommandOutput,
}

impl Rule {
    fn matches(&self, line: &str) -> bool {
        if self.exact {
            line == self.pattern
        } else {
            line.contains(self.pattern.as_str())
        }
    }
}

/// Records every command and answers from substring rules.
///
/// Rules added later win over earlier ones. Unmatched commands succeed with
/// empty output, which the docker facade reads as "absent"/"nothing".
#[derive(Default)]
pub struct ScriptedRunner {
    rules: RefCell<Vec<Rule>>,
    log: RefCell<Vec<String>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, pattern: &str, output: CommandOutput) -> &Self {
        self.rules.borrow_mut().push(Rule {
            pattern: pattern.to_string(),
            exact: false,
            output,
        });
        self
    }

    /// Answer only the command line equal to `line`.
    pub fn respond_exact(&self, line: &str, output: CommandOutput) -> &Self {
        self.rules.borrow_mut().push(Rule {
            pattern: line.to_string(),
            exact: true,
            output,
        });
        self
    }

    pub fn stdout(&self, pattern: &str, stdout: &str) -> &Self {
        self.respond(pattern, CommandOutput::ok(stdout))
    }

    pub fn fail(&self, pattern: &str) -> &Self {
        self.respond(pattern, CommandOutput::failed(1, "scripted failure"))
    }

    /// Make `docker inspect` report `container` as running.
    pub fn running(&self, container: &str) -> &Self {
        self.respond_exact(
            &format!("docker inspect -f '{{{{.State.Status}}}}' {}", container),
            CommandOutput::ok("running\n"),
        )
    }

    pub fn commands(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    pub fn ran(&self, pattern: &str) -> bool {
        self.position(pattern).is_some()
    }

    pub fn position(&self, pattern: &str) -> Option<usize> {
        self.log.borrow().iter().position(|c| c.contains(pattern))
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &ShellCommand) -> Result<CommandOutput> {
        let line = command.line().to_string();
        self.log.borrow_mut().push(line.clone());
        let rules = self.rules.borrow();
        let output = rules
            .iter()
            .rev()
            .find(|rule| rule.matches(&line))
            .map(|rule| rule.output.clone())
            .unwrap_or_else(|| CommandOutput::ok(""));
        Ok(output)
    }

    fn pause(&self, _interval: Duration) {}
}
