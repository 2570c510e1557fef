//! Asynchronous external-command execution.

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, warn};
use tokio::process::Command;

/// Result of one external command invocation.
///
/// `output` carries whatever text the tool produced even when the process
/// exited nonzero: ddcutil reports domain errors such as "No monitor
/// detected" on stdout while signaling failure only through the exit code,
/// and callers need that text to classify the failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub succeeded: bool,
    pub output: String,
}

impl RunOutcome {
    pub fn failed() -> Self {
        Self {
            succeeded: false,
            output: String::new(),
        }
    }
}

/// Seam for running external commands, so discovery and write paths can be
/// exercised against scripted outputs in tests.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `argv` and captures its output. Never returns an error: a
    /// spawn or pipe fault degrades to a failed, empty outcome.
    async fn run(&self, argv: Vec<String>) -> RunOutcome;
}

/// Production runner backed by `tokio::process`.
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    async fn try_run(argv: &[String]) -> Result<RunOutcome> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("empty command line"))?;

        let out = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await?;

        let stdout = String::from_utf8_lossy(&out.stdout).into_owned();
        if out.status.success() {
            return Ok(RunOutcome {
                succeeded: true,
                output: stdout,
            });
        }

        let stderr = String::from_utf8_lossy(&out.stderr).into_owned();
        debug!("{program} exited with {:?}", out.status.code());
        Ok(RunOutcome {
            succeeded: false,
            output: if stderr.is_empty() { stdout } else { stderr },
        })
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, argv: Vec<String>) -> RunOutcome {
        match Self::try_run(&argv).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Failed to run {argv:?}: {e}");
                RunOutcome::failed()
            }
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scripted runner: replies keyed by the joined command line,
    /// everything else degrades to a failed outcome. Replies may carry a
    /// delay to model a slow bus.
    pub struct ScriptedRunner {
        replies: HashMap<String, (Duration, RunOutcome)>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedRunner {
        pub fn new() -> Self {
            Self {
                replies: HashMap::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn reply(self, argv: Vec<String>, succeeded: bool, output: &str) -> Self {
            self.reply_after(argv, Duration::ZERO, succeeded, output)
        }

        pub fn reply_after(
            mut self,
            argv: Vec<String>,
            delay: Duration,
            succeeded: bool,
            output: &str,
        ) -> Self {
            self.replies.insert(
                argv.join(" "),
                (
                    delay,
                    RunOutcome {
                        succeeded,
                        output: output.to_string(),
                    },
                ),
            );
            self
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, argv: Vec<String>) -> RunOutcome {
            let key = argv.join(" ");
            self.calls.lock().unwrap().push(key.clone());
            match self.replies.get(&key) {
                Some((delay, outcome)) => {
                    if !delay.is_zero() {
                        tokio::time::sleep(*delay).await;
                    }
                    outcome.clone()
                }
                None => RunOutcome::failed(),
            }
        }
    }
}
