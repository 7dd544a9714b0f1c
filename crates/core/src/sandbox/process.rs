use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use wait_timeout::ChildExt;

use super::context::CancelToken;
use super::SandboxError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// How a bounded wait ended.
#[derive(Debug)]
pub(crate) enum WaitOutcome {
    Exited(CommandOutput),
    TimedOut,
    Cancelled,
}

/// Run a short helper command (`info`, `kill`, `rm`, ...) with a hard bound.
pub fn run_command(program: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput, SandboxError> {
    let mut command = Command::new(program);
    command.args(args);
    match run_bounded(&mut command, timeout, None, || {})? {
        WaitOutcome::Exited(output) => Ok(output),
        WaitOutcome::TimedOut | WaitOutcome::Cancelled => {
            Err(SandboxError::Timeout { limit: timeout })
        }
    }
}

/// Spawn `command` and wait until it exits, `timeout` elapses, or `cancel` trips.
///
/// Stdout and stderr are drained on their own threads so a chatty child can't
/// block on a full pipe. `on_abort` runs before the child is killed.
pub(crate) fn run_bounded(
    command: &mut Command,
    timeout: Duration,
    cancel: Option<&CancelToken>,
    on_abort: impl FnOnce(),
) -> Result<WaitOutcome, SandboxError> {
    let program = command.get_program().to_string_lossy().to_string();
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = command.spawn().map_err(|source| SandboxError::Launch {
        program: program.clone(),
        source,
    })?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match wait(&mut child, timeout, cancel) {
        Ok(Some(status)) => status,
        Ok(None) => {
            on_abort();
            let _ = child.kill();
            let _ = child.wait();
            collect(stdout);
            collect(stderr);
            return Ok(if cancel.is_some_and(CancelToken::is_cancelled) {
                WaitOutcome::Cancelled
            } else {
                WaitOutcome::TimedOut
            });
        }
        Err(source) => {
            let _ = child.kill();
            let _ = child.wait();
            return Err(SandboxError::Launch { program, source });
        }
    };

    Ok(WaitOutcome::Exited(CommandOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout: collect(stdout),
        stderr: collect(stderr),
    }))
}

fn wait(
    child: &mut Child,
    timeout: Duration,
    cancel: Option<&CancelToken>,
) -> std::io::Result<Option<ExitStatus>> {
    let started = Instant::now();
    loop {
        let left = timeout.saturating_sub(started.elapsed());
        if left.is_zero() {
            return Ok(None);
        }
        if let Some(status) = child.wait_timeout(left.min(POLL_INTERVAL))? {
            return Ok(Some(status));
        }
        if cancel.is_some_and(CancelToken::is_cancelled) {
            return Ok(None);
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut pipe| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = pipe.read_to_end(&mut buf);
            buf
        })
    })
}

fn collect(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|buf| String::from_utf8_lossy(&buf).into_owned())
        .unwrap_or_default()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_captures_output_and_exit_code() {
        let out = run_command("sh", &["-c", "echo out; echo err >&2; exit 3"], Duration::from_secs(10))
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
    }

    #[test]
    fn test_timeout_kills_child() {
        let started = Instant::now();
        let err = run_command("sleep", &["30"], Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, SandboxError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[test]
    fn test_cancel_stops_wait_and_runs_abort_hook() {
        let token = CancelToken::new();
        let trip = token.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(150));
            trip.cancel();
        });
        let mut aborted = false;
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let outcome = run_bounded(&mut cmd, Duration::from_secs(20), Some(&token), || {
            aborted = true;
        })
        .unwrap();
        assert!(matches!(outcome, WaitOutcome::Cancelled));
        assert!(aborted);
    }

    #[test]
    fn test_missing_program_is_launch_error() {
        let err = run_command("/nonexistent/vulnhunter-runtime", &[], Duration::from_secs(1))
            .unwrap_err();
        assert!(matches!(err, SandboxError::Launch { .. }));
    }
}
