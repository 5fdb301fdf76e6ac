//! Child processes with timeouts and bounded output.
//!
//! [`ProcessRunner`] is the seam between the command executor and the OS
//! shell; tests substitute a recording runner that never spawns anything.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Stdout followed by stderr, lossily decoded, with truncation notices.
    pub fn combined_text(&self) -> String {
        let mut buf = String::from_utf8_lossy(&self.stdout).into_owned();
        if self.stdout_truncated > 0 {
            buf.push_str(&format!("\n[stdout truncated {} bytes]\n", self.stdout_truncated));
        }
        if !self.stderr.is_empty() {
            if !buf.is_empty() && !buf.ends_with('\n') {
                buf.push('\n');
            }
            buf.push_str(&String::from_utf8_lossy(&self.stderr));
        }
        if self.stderr_truncated > 0 {
            buf.push_str(&format!("\n[stderr truncated {} bytes]\n", self.stderr_truncated));
        }
        buf
    }
}

/// Outcome of one shell invocation that did launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// `None` when the process was killed by a signal or by the timeout.
    pub exit_code: Option<i32>,
    pub success: bool,
    /// Combined stdout and stderr.
    pub output: String,
    pub timed_out: bool,
}

/// Launches a command line through the platform shell.
///
/// `Err` means the process could not be started or observed; every process
/// that ran, including one that timed out, yields `Ok`.
pub trait ProcessRunner: Send + Sync {
    fn run_shell(&self, command_line: &str) -> Result<ProcessOutcome>;
}

/// Runs command lines with `sh -c` (or `cmd /C` on Windows).
#[derive(Debug, Clone)]
pub struct ShellRunner {
    pub timeout: Duration,
    pub output_limit_bytes: usize,
}

impl ShellRunner {
    pub fn new(timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            timeout,
            output_limit_bytes,
        }
    }
}

impl ProcessRunner for ShellRunner {
    #[instrument(skip_all, fields(command_line = %command_line))]
    fn run_shell(&self, command_line: &str) -> Result<ProcessOutcome> {
        let output = run_command_with_timeout(
            shell_command(command_line),
            None,
            self.timeout,
            self.output_limit_bytes,
        )
        .with_context(|| format!("run `{command_line}`"))?;
        Ok(ProcessOutcome {
            exit_code: output.status.code(),
            success: output.status.success() && !output.timed_out,
            output: output.combined_text(),
            timed_out: output.timed_out,
        })
    }
}

#[cfg(windows)]
pub fn shell_command(command_line: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command_line);
    cmd
}

#[cfg(not(windows))]
pub fn shell_command(command_line: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command_line);
    cmd
}

/// Run a command with a timeout and capture stdout/stderr without risking pipe deadlocks.
///
/// Stdin is fed and output is drained on helper threads while the child runs.
/// `output_limit_bytes` bounds what is kept per stream; the rest is discarded
/// while the pipe keeps draining.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    // Own process group so a timeout also reaches grandchildren holding the pipes.
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdin_handle = match stdin {
        Some(input) => {
            let mut child_stdin = child
                .stdin
                .take()
                .ok_or_else(|| anyhow!("stdin was not piped"))?;
            let input = input.to_vec();
            Some(thread::spawn(move || {
                // The child may exit without reading everything; a broken pipe is not ours to report.
                if let Err(e) = child_stdin.write_all(&input) {
                    debug!(err = %e, "stdin closed early");
                }
            }))
        }
        None => None,
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(
                timeout_secs = timeout.as_secs(),
                "command timed out, killing"
            );
            timed_out = true;
            kill_process_group(&mut child)?;
            child.wait().context("wait command after kill")?
        }
    };

    if let Some(handle) = stdin_handle
        && handle.join().is_err()
    {
        warn!("stdin writer thread panicked");
    }
    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

/// Kill `child` and, on Unix, every process in its group.
fn kill_process_group(child: &mut Child) -> Result<()> {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        if let Ok(pid) = i32::try_from(child.id()) {
            match killpg(Pid::from_raw(pid), Signal::SIGKILL) {
                Ok(()) => return Ok(()),
                Err(err) => debug!(err = %err, "process group kill failed; killing child only"),
            }
        }
    }
    child.kill().context("kill command")
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn runner() -> ShellRunner {
        ShellRunner::new(Duration::from_secs(10), 1_000)
    }

    #[test]
    fn captures_stdout_and_stderr() {
        let outcome = runner()
            .run_shell("echo out; echo err 1>&2")
            .expect("run");
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.output.contains("out"));
        assert!(outcome.output.contains("err"));
    }

    #[test]
    fn reports_non_zero_exit() {
        let outcome = runner().run_shell("exit 7").expect("run");
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(7));
    }

    #[test]
    fn kills_on_timeout() {
        let runner = ShellRunner::new(Duration::from_millis(200), 1_000);
        let outcome = runner.run_shell("sleep 2").expect("run");
        assert!(outcome.timed_out);
        assert!(!outcome.success);
    }

    #[test]
    fn timeout_reaches_grandchildren() {
        let runner = ShellRunner::new(Duration::from_millis(200), 1_000);
        let started = std::time::Instant::now();
        let outcome = runner.run_shell("sleep 4; echo done").expect("run");
        assert!(outcome.timed_out);
        assert!(!outcome.output.contains("done"));
        assert!(started.elapsed() < Duration::from_secs(3));

        let started = std::time::Instant::now();
        let outcome = runner.run_shell("sleep 4 | cat").expect("run");
        assert!(outcome.timed_out);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn bounds_captured_output() {
        let runner = ShellRunner::new(Duration::from_secs(10), 16);
        let outcome = runner
            .run_shell("printf '%0100d' 0")
            .expect("run");
        assert!(outcome.output.contains("[stdout truncated 84 bytes]"));
    }

    #[test]
    fn feeds_stdin() {
        let output = run_command_with_timeout(
            shell_command("cat"),
            Some(b"hello from stdin"),
            Duration::from_secs(10),
            1_000,
        )
        .expect("run");
        assert_eq!(output.stdout, b"hello from stdin");
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let err = run_command_with_timeout(
            Command::new("pilot-definitely-not-a-program"),
            None,
            Duration::from_secs(1),
            100,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("spawn command"));
    }
}
