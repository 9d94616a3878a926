//! Bounded-attempt shell command runner.
//!
//! Every external side effect in the provisioning pipeline goes through the
//! [`CommandRunner`] trait so that the core logic can be exercised against
//! recording test doubles. The real [`ShellRunner`] retries failed commands a
//! bounded number of times with a fixed inter-attempt sleep, and can arm a
//! watchdog thread that kills a command still in flight past a caller-supplied
//! timeout. The watchdog is always cancelled and joined before the caller
//! resumes, so at most one external call is outstanding at a time.

use std::io::Read;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info};

/// Errors surfaced by a command runner.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The command could not be spawned at all.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command exhausted its attempts without succeeding.
    #[error(
        "command {program} failed after {attempts} attempt(s), \
         exit code {code:?}, stderr: {stderr}"
    )]
    Failed {
        program: String,
        attempts: u32,
        code: Option<i32>,
        stderr: String,
    },

    /// An empty argv was supplied.
    #[error("empty command line")]
    EmptyCommand,
}

/// Captured output of a finished command.
#[derive(Debug, Clone, Default)]
pub struct CmdOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
    /// True when the watchdog killed the command.
    pub timed_out: bool,
}

impl CmdOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Per-call execution policy.
#[derive(Debug, Clone)]
pub struct RunOpts {
    /// Total attempts before giving up.
    pub attempts: u32,
    /// Sleep between attempts.
    pub retry_wait: Duration,
    /// Watchdog timeout for a single attempt; `None` means wait forever.
    pub timeout: Option<Duration>,
    /// Suppress the per-invocation info log.
    pub quiet: bool,
}

impl Default for RunOpts {
    fn default() -> Self {
        Self {
            attempts: 1,
            retry_wait: Duration::from_secs(5),
            timeout: None,
            quiet: false,
        }
    }
}

impl RunOpts {
    /// One attempt, no timeout. Destructive provisioning calls use this.
    pub fn once() -> Self {
        Self::default()
    }

    /// Five attempts with the default sleep. Detection and probe calls
    /// retry by default.
    pub fn probe() -> Self {
        Self {
            attempts: 5,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts.max(1);
        self
    }

    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }
}

/// Seam for running external commands.
pub trait CommandRunner {
    /// Run a command, retrying per `opts`. Returns the output of the last
    /// attempt whether or not it succeeded; only spawn failures are errors.
    fn run(&self, argv: &[&str], opts: &RunOpts) -> Result<CmdOutput, CommandError>;

    /// Run a command and treat a non-zero final exit status as an error.
    fn run_checked(&self, argv: &[&str], opts: &RunOpts) -> Result<CmdOutput, CommandError> {
        let output = self.run(argv, opts)?;
        if output.success() {
            Ok(output)
        } else {
            Err(CommandError::Failed {
                program: argv.first().unwrap_or(&"").to_string(),
                attempts: opts.attempts,
                code: output.code,
                stderr: output.stderr,
            })
        }
    }
}

/// Real command runner backed by `std::process::Command`.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }

    fn run_once(
        &self,
        argv: &[&str],
        timeout: Option<Duration>,
    ) -> Result<CmdOutput, CommandError> {
        let (program, args) = argv.split_first().ok_or(CommandError::EmptyCommand)?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        let mut stdout_pipe = child.stdout.take();
        let mut stderr_pipe = child.stderr.take();

        let child = Arc::new(Mutex::new(child));
        let timed_out = Arc::new(AtomicBool::new(false));

        // Arm the watchdog. It waits for either a cancel message or the
        // timeout; on timeout it kills the child, which unblocks the pipe
        // reads below.
        let watchdog = timeout.map(|limit| {
            let (cancel_tx, cancel_rx) = mpsc::channel::<()>();
            let child = Arc::clone(&child);
            let flag = Arc::clone(&timed_out);
            let handle = thread::spawn(move || {
                if cancel_rx.recv_timeout(limit).is_err() {
                    flag.store(true, Ordering::SeqCst);
                    let mut child = child.lock().unwrap_or_else(|e| e.into_inner());
                    error!(pid = child.id(), "killing timed out process");
                    // The process can exit in the window before the kill
                    // lands; that race is harmless.
                    let _ = child.kill();
                }
            });
            (cancel_tx, handle)
        });

        let mut stdout = String::new();
        if let Some(pipe) = stdout_pipe.as_mut() {
            let _ = pipe.read_to_string(&mut stdout);
        }
        let mut stderr = String::new();
        if let Some(pipe) = stderr_pipe.as_mut() {
            let _ = pipe.read_to_string(&mut stderr);
        }

        // Poll for exit instead of a blocking wait: the watchdog needs the
        // same lock to deliver its kill, and a child that closed its pipes
        // but kept running would otherwise pin the lock here until it exits
        // on its own.
        let status = loop {
            let polled = {
                let mut child = child.lock().unwrap_or_else(|e| e.into_inner());
                child.try_wait()
            };
            match polled {
                Ok(Some(status)) => break Ok(status),
                Ok(None) => thread::sleep(Duration::from_millis(20)),
                Err(e) => break Err(e),
            }
        };

        // Cancel and join the watchdog before returning so no timer thread
        // outlives the call.
        if let Some((cancel_tx, handle)) = watchdog {
            let _ = cancel_tx.send(());
            let _ = handle.join();
        }

        let code = match status {
            Ok(status) => status.code(),
            Err(_) => None,
        };

        Ok(CmdOutput {
            stdout: stdout.trim().to_string(),
            stderr: stderr.trim().to_string(),
            code,
            timed_out: timed_out.load(Ordering::SeqCst),
        })
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, argv: &[&str], opts: &RunOpts) -> Result<CmdOutput, CommandError> {
        if !opts.quiet {
            info!(cmd = %argv.join(" "), "running command");
        }

        let attempts = opts.attempts.max(1);
        let mut last = CmdOutput::default();
        for attempt in 1..=attempts {
            let output = self.run_once(argv, opts.timeout)?;
            if output.success() {
                return Ok(output);
            }
            if !opts.quiet {
                if output.timed_out {
                    info!(
                        cmd = %argv.join(" "),
                        attempt,
                        timeout = ?opts.timeout,
                        "command timed out"
                    );
                } else {
                    info!(
                        cmd = %argv.join(" "),
                        attempt,
                        code = ?output.code,
                        stderr = %output.stderr,
                        "command failed"
                    );
                }
            }
            last = output;
            if attempt < attempts {
                debug!(wait = ?opts.retry_wait, "sleeping before retry");
                thread::sleep(opts.retry_wait);
            }
        }
        Ok(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_on_success() {
        let runner = ShellRunner::new();
        let out = runner
            .run(&["echo", "hello"], &RunOpts::once())
            .unwrap();
        assert!(out.success());
        assert_eq!(out.stdout, "hello");
    }

    #[test]
    fn reports_failure_exit_code() {
        let runner = ShellRunner::new();
        let out = runner.run(&["false"], &RunOpts::once()).unwrap();
        assert!(!out.success());
        assert_eq!(out.code, Some(1));
    }

    #[test]
    fn run_checked_surfaces_failure() {
        let runner = ShellRunner::new();
        let err = runner.run_checked(&["false"], &RunOpts::once());
        assert!(matches!(err, Err(CommandError::Failed { .. })));
    }

    #[test]
    fn retries_are_bounded() {
        let runner = ShellRunner::new();
        let opts = RunOpts {
            attempts: 3,
            retry_wait: Duration::from_millis(1),
            timeout: None,
            quiet: true,
        };
        let out = runner.run(&["false"], &opts).unwrap();
        assert!(!out.success());
    }

    #[test]
    fn watchdog_kills_overrunning_command() {
        let runner = ShellRunner::new();
        let opts = RunOpts::once()
            .with_timeout(Duration::from_millis(100))
            .quiet();
        let out = runner.run(&["sleep", "30"], &opts).unwrap();
        assert!(out.timed_out);
        assert!(!out.success());
    }

    #[test]
    fn watchdog_kills_child_that_closed_its_pipes() {
        // A helper that daemonizes closes stdout/stderr while it keeps
        // running; the kill must still land at the timeout, not when the
        // child finally exits on its own.
        let runner = ShellRunner::new();
        let opts = RunOpts::once()
            .with_timeout(Duration::from_millis(200))
            .quiet();
        let started = std::time::Instant::now();
        let out = runner
            .run(&["bash", "-c", "exec >/dev/null 2>&1; sleep 30"], &opts)
            .unwrap();
        assert!(out.timed_out);
        assert!(!out.success());
        assert!(
            started.elapsed() < Duration::from_secs(5),
            "kill did not land near the timeout: {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn empty_argv_is_an_error() {
        let runner = ShellRunner::new();
        assert!(matches!(
            runner.run(&[], &RunOpts::once()),
            Err(CommandError::EmptyCommand)
        ));
    }
}
