use crate::error::{Error, Result};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// A forward or compensating action with its arguments already bound.
pub type Action<'a> = Box<dyn Fn() -> Result<()> + 'a>;

/// A named unit of work with an optional compensating action.
///
/// The reverse action only has to restore the prior state; it need not be
/// the literal inverse of the forward one. A step without a reverse keeps its
/// effect when later steps are rolled back.
pub struct MigrationStep<'a> {
    name: String,
    forward: Action<'a>,
    reverse: Option<Action<'a>>,
}

impl<'a> MigrationStep<'a> {
    pub fn new(name: impl Into<String>, forward: impl Fn() -> Result<()> + 'a) -> Self {
        Self {
            name: name.into(),
            forward: Box::new(forward),
            reverse: None,
        }
    }

    pub fn with_reverse(mut self, reverse: impl Fn() -> Result<()> + 'a) -> Self {
        self.reverse = Some(Box::new(reverse));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn has_reverse(&self) -> bool {
        self.reverse.is_some()
    }
}

impl fmt::Debug for MigrationStep<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep")
            .field("name", &self.name)
            .field("has_reverse", &self.has_reverse())
            .finish()
    }
}

/// Executes one sequence of steps, unwinding completed steps on failure.
///
/// An instance covers exactly one run: [`execute`](Self::execute) consumes it.
#[derive(Debug, Default)]
pub struct RevertableStepProcessor<'a> {
    steps: Vec<MigrationStep<'a>>,
    /// Number of leading steps whose forward action succeeded.
    completed: usize,
}

impl<'a> RevertableStepProcessor<'a> {
    pub fn new() -> Self {
        Self {
            steps: Vec::new(),
            completed: 0,
        }
    }

    pub fn add_step(&mut self, step: MigrationStep<'a>) -> &mut Self {
        self.steps.push(step);
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order.
    ///
    /// On the first failure no further forward action runs; reverse actions
    /// of the completed steps run newest first and their own failures are
    /// only counted. The result is [`Error::StepFailed`] for the step that
    /// broke the run.
    pub fn execute(mut self) -> Result<()> {
        let total = self.steps.len();
        for (index, step) in self.steps.iter().enumerate() {
            info!("Executing step {}/{}: {}", index + 1, total, step.name);
            match (step.forward)() {
                Ok(()) => self.completed = index + 1,
                Err(e) => {
                    error!("Step '{}' failed: {}", step.name, e);
                    let step_name = step.name.clone();
                    let rollback_failures = self.rollback();
                    return Err(Error::StepFailed {
                        step: step_name,
                        reason: e.to_string(),
                        rollback_failures,
                    });
                }
            }
        }
        debug!("All {} steps completed", total);
        Ok(())
    }

    /// Compensate completed steps in reverse order. Returns how many
    /// reverse actions failed.
    fn rollback(&self) -> usize {
        let mut failures = 0;
        for step in self.steps[..self.completed].iter().rev() {
            let Some(reverse) = &step.reverse else {
                debug!("Step '{}' has no reverse action, keeping its effect", step.name);
                continue;
            };
            info!("Rolling back step: {}", step.name);
            if let Err(e) = reverse() {
                warn!("Rollback of step '{}' failed: {}", step.name, e);
                failures += 1;
            }
        }
        if failures > 0 {
            warn!("{} rollback action(s) failed; manual cleanup may be needed", failures);
        }
        failures
    }
}

/// Copy `source` over `destination`, creating parent directories.
///
/// Used both to take a backup and to restore it.
pub fn backup_restore(source: &Path, destination: &Path) -> Result<()> {
    if !source.is_file() {
        return Err(Error::Filesystem(format!(
            "{} does not exist",
            source.display()
        )));
    }
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(source, destination).map_err(|e| {
        Error::Filesystem(format!(
            "Failed to copy {} to {}: {}",
            source.display(),
            destination.display(),
            e
        ))
    })?;
    debug!("Copied {} to {}", source.display(), destination.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn step<'a>(
        log: &'a RefCell<Vec<String>>,
        name: &'static str,
        ok: bool,
    ) -> MigrationStep<'a> {
        MigrationStep::new(name, move || {
            log.borrow_mut().push(format!("up:{}", name));
            if ok {
                Ok(())
            } else {
                Err(Error::Command(format!("{} broke", name)))
            }
        })
    }

    fn reversible<'a>(
        log: &'a RefCell<Vec<String>>,
        name: &'static str,
        ok: bool,
    ) -> MigrationStep<'a> {
        step(log, name, ok).with_reverse(move || {
            log.borrow_mut().push(format!("down:{}", name));
            Ok(())
        })
    }

    #[test]
    fn all_steps_succeed_without_rollback() {
        let log = RefCell::new(Vec::new());
        let mut processor = RevertableStepProcessor::new();
        processor
            .add_step(reversible(&log, "a", true))
            .add_step(reversible(&log, "b", true));

        processor.execute().unwrap();
        assert_eq!(*log.borrow(), vec!["up:a", "up:b"]);
    }

    #[test]
    fn failure_rolls_back_completed_steps_newest_first() {
        let log = RefCell::new(Vec::new());
        let mut processor = RevertableStepProcessor::new();
        processor
            .add_step(reversible(&log, "a", true))
            .add_step(step(&log, "b", true))
            .add_step(reversible(&log, "c", true))
            .add_step(reversible(&log, "d", false))
            .add_step(reversible(&log, "e", true));

        let err = processor.execute().unwrap_err();

        assert!(matches!(
            err,
            Error::StepFailed { step: ref failed, rollback_failures: 0, .. } if failed == "d"
        ));
        assert_eq!(
            *log.borrow(),
            vec!["up:a", "up:b", "up:c", "up:d", "down:c", "down:a"]
        );
    }

    #[test]
    fn failing_reverse_does_not_stop_rollback() {
        let log = RefCell::new(Vec::new());
        let mut processor = RevertableStepProcessor::new();
        processor
            .add_step(reversible(&log, "a", true))
            .add_step(step(&log, "b", true).with_reverse(|| {
                Err(Error::Command("cannot undo".to_string()))
            }))
            .add_step(step(&log, "c", false));

        match processor.execute() {
            Err(Error::StepFailed {
                rollback_failures, ..
            }) => assert_eq!(rollback_failures, 1),
            other => panic!("expected step failure, got {:?}", other),
        }
        assert_eq!(*log.borrow(), vec!["up:a", "up:b", "up:c", "down:a"]);
    }

    #[test]
    fn backup_restore_copies_and_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("services").join("docker-compose.yml");
        fs::create_dir_all(source.parent().unwrap()).unwrap();
        fs::write(&source, "version: '3.5'\n").unwrap();
        let backup = dir.path().join(".backup").join("services").join("docker-compose.yml.bak");

        backup_restore(&source, &backup).unwrap();
        assert_eq!(fs::read_to_string(&backup).unwrap(), "version: '3.5'\n");

        assert!(matches!(
            backup_restore(&dir.path().join("missing"), &backup),
            Err(Error::Filesystem(_))
        ));
    }
}
