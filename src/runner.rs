//! External command execution.
//!
//! All shell-outs go through the [`Runner`] trait so components can be
//! exercised in tests with a scripted fake instead of real system tools.

use std::io::{self, Read};
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::Duration;

use wait_timeout::ChildExt;

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    #[cfg(test)]
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
            code: Some(0),
        }
    }

    #[cfg(test)]
    pub fn err(code: i32, stderr: &str) -> Self {
        Self {
            stdout: Vec::new(),
            stderr: stderr.as_bytes().to_vec(),
            code: Some(code),
        }
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            stdout: output.stdout,
            stderr: output.stderr,
            code: output.status.code(),
        }
    }
}

/// Runs external commands. One implementation shells out for real, the test
/// fake replays scripted responses.
pub trait Runner {
    /// Run to completion and capture output. A non-zero exit is not an error
    /// here; callers interpret the exit code.
    fn output(&self, cmd: &str, args: &[&str]) -> io::Result<CommandOutput>;

    /// Like [`Runner::output`] but with a deadline. Returns `Ok(None)` when
    /// the deadline passed (the child is killed).
    fn output_timeout(
        &self,
        cmd: &str,
        args: &[&str],
        limit: Duration,
    ) -> io::Result<Option<CommandOutput>>;
}

/// The real thing.
pub struct SystemRunner;

impl Runner for SystemRunner {
    fn output(&self, cmd: &str, args: &[&str]) -> io::Result<CommandOutput> {
        log::debug!("run: {} {}", cmd, args.join(" "));
        let output = Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .output()?;
        Ok(output.into())
    }

    fn output_timeout(
        &self,
        cmd: &str,
        args: &[&str],
        limit: Duration,
    ) -> io::Result<Option<CommandOutput>> {
        log::debug!("probe: {} {}", cmd, args.join(" "));
        let mut child = Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain pipes on separate threads so a chatty child cannot fill the
        // pipe buffer and stall before the deadline check.
        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();
        let stdout_reader = thread::spawn(move || drain(stdout_pipe));
        let stderr_reader = thread::spawn(move || drain(stderr_pipe));

        match child.wait_timeout(limit)? {
            Some(status) => Ok(Some(CommandOutput {
                stdout: stdout_reader.join().unwrap_or_default(),
                stderr: stderr_reader.join().unwrap_or_default(),
                code: status.code(),
            })),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                let _ = stdout_reader.join();
                let _ = stderr_reader.join();
                Ok(None)
            }
        }
    }
}

fn drain<R: Read>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        let _ = pipe.read_to_end(&mut buf);
    }
    buf
}

/// Join a command and its arguments for display and for fake-runner keys.
pub fn render(cmd: &str, args: &[&str]) -> String {
    if args.is_empty() {
        cmd.to_string()
    } else {
        format!("{} {}", cmd, args.join(" "))
    }
}
