//! Canonical formatting through an external Go formatter.
//!
//! Rewritten files are piped through `gofmt` so the output reads like any
//! other file in the Go tree. A missing formatter binary downgrades to a
//! warning; a formatter that runs and rejects the input is an error.

use std::io::{ErrorKind, Write};
use std::process::{Command, Stdio};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum FormatError {
    #[error("formatter command is empty")]
    EmptyCommand,

    #[error("failed to run formatter `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("formatter `{program}` exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("formatter `{program}` produced non-UTF-8 output")]
    InvalidOutput { program: String },
}

/// Result of a formatting attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatOutcome {
    /// The formatter ran and produced this text
    Formatted(String),
    /// Formatting is disabled or the formatter is not installed
    Skipped,
}

/// A source formatter reading stdin and writing stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Formatter {
    command: Option<Vec<String>>,
}

impl Formatter {
    /// Plain `gofmt`.
    pub fn gofmt() -> Self {
        Self::from_command(["gofmt"])
    }

    /// An explicit command line, program first.
    pub fn from_command<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: Some(command.into_iter().map(Into::into).collect()),
        }
    }

    /// Never format.
    pub fn disabled() -> Self {
        Self { command: None }
    }

    /// Format `source`.
    pub fn format(&self, source: &str) -> Result<FormatOutcome, FormatError> {
        let Some(command) = &self.command else {
            return Ok(FormatOutcome::Skipped);
        };
        let (program, args) = command.split_first().ok_or(FormatError::EmptyCommand)?;

        let spawned = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(program = %program, "formatter not found, keeping unformatted output");
                return Ok(FormatOutcome::Skipped);
            }
            Err(source) => {
                return Err(FormatError::Spawn {
                    program: program.clone(),
                    source,
                })
            }
        };

        // Feed stdin from a separate thread so a large file cannot fill the
        // stdout pipe while we are still writing.
        let stdin = child.stdin.take();
        let input = source.to_string();
        let writer = std::thread::spawn(move || -> std::io::Result<()> {
            if let Some(mut stdin) = stdin {
                stdin.write_all(input.as_bytes())?;
            }
            Ok(())
        });

        let output = child.wait_with_output().map_err(|source| FormatError::Spawn {
            program: program.clone(),
            source,
        })?;
        let write_result = writer.join().unwrap_or_else(|_| {
            Err(std::io::Error::new(
                ErrorKind::BrokenPipe,
                "formatter stdin writer panicked",
            ))
        });

        if !output.status.success() {
            return Err(FormatError::Failed {
                program: program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        write_result.map_err(|source| FormatError::Spawn {
            program: program.clone(),
            source,
        })?;

        let formatted = String::from_utf8(output.stdout).map_err(|_| FormatError::InvalidOutput {
            program: program.clone(),
        })?;
        debug!(program = %program, bytes = formatted.len(), "formatted source");
        Ok(FormatOutcome::Formatted(formatted))
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::gofmt()
    }
}
