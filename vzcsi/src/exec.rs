//! External command execution.
//!
//! Cluster authentication, cluster mounting, attribute tagging, lease revoke
//! and every ploop operation shell out to a tool.  They all go through the
//! [`CommandRunner`] capability so tests can record the exact invocations
//! without real binaries.

use std::fmt;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::error::CsiError;

/// A program invocation: argv plus optional stdin payload.
#[derive(Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Written to the child's stdin, which is then closed.  Never logged.
    pub stdin: Option<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandSpec({self})")
    }
}

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs external programs to completion.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `spec` and wait for it.  A non-zero exit is a
    /// [`CsiError::CommandFailed`] carrying the child's stderr.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CsiError>;
}

/// [`CommandRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    #[instrument(skip_all, fields(command = %spec))]
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CsiError> {
        let failed = |reason: String| CsiError::CommandFailed {
            command: spec.to_string(),
            reason,
        };

        let mut child = tokio::process::Command::new(&spec.program)
            .args(&spec.args)
            .stdin(if spec.stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| failed(format!("spawn: {e}")))?;

        if let (Some(input), Some(mut pipe)) = (spec.stdin.as_ref(), child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .await
                .map_err(|e| failed(format!("write stdin: {e}")))?;
            // Dropping the pipe closes it so the child sees EOF.
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| failed(format!("wait: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            let detail = stderr.trim();
            return Err(failed(match output.status.code() {
                Some(code) if detail.is_empty() => format!("exit status {code}"),
                Some(code) => format!("exit status {code}: {detail}"),
                None => format!("terminated by signal: {detail}"),
            }));
        }

        debug!("command succeeded");
        Ok(CommandOutput { stdout, stderr })
    }
}
