//! Child process invocations.
//!
//! A `ChildSpec` is the fully resolved invocation of one external process:
//! program, arguments and the environment entries attached to it. Specs are
//! plain values so the launchers can be exercised without spawning
//! anything.

use thiserror::Error;
use tokio::process::{Child, Command};

/// Errors that can occur when spawning a child process.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// The program could not be started.
    #[error("Failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// One external process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildSpec {
    /// Program name or path.
    pub program: String,
    /// Arguments, in order.
    pub args: Vec<String>,
    /// Environment entries set on the child only.
    pub env: Vec<(String, String)>,
}

impl ChildSpec {
    /// Creates a spec for the given program with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Attaches an environment entry to the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Looks up an attached environment entry.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Shell-style rendering of the invocation, for logging.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }

    /// Spawns the process. The child inherits the supervisor's stdio so
    /// the server's own access and error logs pass straight through.
    ///
    /// # Errors
    ///
    /// Returns `SpawnError::Spawn` if the program cannot be started, most
    /// commonly because it is not installed.
    pub fn spawn(&self) -> Result<Child, SpawnError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        cmd.spawn().map_err(|source| SpawnError::Spawn {
            program: self.program.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_accumulates() {
        let spec = ChildSpec::new("uvicorn")
            .arg("api.main:app")
            .args(["--host", "127.0.0.1"])
            .env("API_CONFIG", ".config.toml");

        assert_eq!(spec.program, "uvicorn");
        assert_eq!(spec.args, vec!["api.main:app", "--host", "127.0.0.1"]);
        assert_eq!(spec.env_value("API_CONFIG"), Some(".config.toml"));
        assert_eq!(spec.env_value("OTHER"), None);
    }

    #[test]
    fn test_command_line_rendering() {
        let spec = ChildSpec::new("rq").args(["worker", "--url", "redis://localhost:6379/0"]);
        assert_eq!(
            spec.command_line(),
            "rq worker --url redis://localhost:6379/0"
        );
    }

    #[test]
    fn test_spawn_error_display() {
        let err = SpawnError::Spawn {
            program: "gunicorn".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(err.to_string().contains("gunicorn"));
    }
}
