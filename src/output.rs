/// Where command modules send console messages.
///
/// Diagnostics go through `tracing`; this trait carries only what the
/// operator is meant to read.
pub trait UserOutput {
    /// Progress or listing line on stdout.
    fn status(&self, message: &str);

    /// Completed operation, e.g. "Global service db enabled".
    fn success(&self, message: &str);

    /// Something worth noticing that did not stop the command.
    fn warning(&self, message: &str);

    /// A failure summary printed before the error propagates to `main`.
    fn error(&self, message: &str);
}

/// Console output with ANSI colours on the success and problem lines.
pub struct CliOutput;

impl UserOutput for CliOutput {
    fn status(&self, message: &str) {
        println!("{}", message);
    }

    fn success(&self, message: &str) {
        println!("\x1b[32m{}\x1b[0m", message);
    }

    fn warning(&self, message: &str) {
        eprintln!("\x1b[33mWarning: {}\x1b[0m", message);
    }

    fn error(&self, message: &str) {
        eprintln!("\x1b[31m{}\x1b[0m", message);
    }
}

/// Drops every message.
pub struct QuietOutput;

impl UserOutput for QuietOutput {
    fn status(&self, _message: &str) {}
    fn success(&self, _message: &str) {}
    fn warning(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
}

/// Keeps messages with their kind so tests can assert on them.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingOutput {
    lines: std::cell::RefCell<Vec<(&'static str, String)>>,
}

#[cfg(test)]
impl RecordingOutput {
    pub fn lines(&self, kind: &str) -> Vec<String> {
        self.lines
            .borrow()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, line)| line.clone())
            .collect()
    }

    fn push(&self, kind: &'static str, message: &str) {
        self.lines.borrow_mut().push((kind, message.to_string()));
    }
}

#[cfg(test)]
impl UserOutput for RecordingOutput {
    fn status(&self, message: &str) {
        self.push("status", message);
    }

    fn success(&self, message: &str) {
        self.push("success", message);
    }

    fn warning(&self, message: &str) {
        self.push("warning", message);
    }

    fn error(&self, message: &str) {
        self.push("error", message);
    }
}
