//! Process invoker
//!
//! Spawns the tool for one [`InvocationDescriptor`], feeds stdin, buffers
//! stdout/stderr in full and enforces the timeout. The deadline covers both
//! the child's exit and draining its pipes, so a grandchild that inherited
//! them cannot stall the session.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use crate::error::{Failure, FailureKind};
use crate::matrix::InvocationDescriptor;

/// How often a running child is polled
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Everything a finished child left behind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Captured {
    /// `None` when the child was terminated by a signal
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// What happened to one invocation
#[derive(Debug)]
pub enum Outcome {
    Completed(Captured),
    /// Killed at the deadline, or its pipes were still open then; any
    /// output is discarded
    TimedOut(Duration),
    /// The child could not be started or waited on
    Error(Failure),
}

/// Runs descriptors in a fixed working directory
#[derive(Debug, Clone)]
pub struct Invoker {
    pub workdir: PathBuf,
    pub poll_interval: Duration,
}

impl Invoker {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn run(&self, desc: &InvocationDescriptor) -> Outcome {
        tracing::debug!(argv = ?desc.argv, timeout = ?desc.timeout, stdin = desc.stdin.is_some(), "spawning");

        let mut cmd = Command::new(desc.program());
        cmd.args(desc.args());
        cmd.current_dir(&self.workdir);
        cmd.stdin(if desc.stdin.is_some() { Stdio::piped() } else { Stdio::null() });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => return Outcome::Error(Failure::spawn(desc.program(), &e)),
        };

        // The child may exit without reading everything; a broken pipe is fine.
        // The writer is never joined.
        if let (Some(mut pipe), Some(bytes)) = (child.stdin.take(), desc.stdin.clone()) {
            thread::spawn(move || {
                let _ = pipe.write_all(&bytes);
            });
        }
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let start = Instant::now();
        let deadline = start + desc.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        tracing::debug!(program = desc.program(), timeout = ?desc.timeout, "killed at deadline");
                        return Outcome::TimedOut(desc.timeout);
                    }
                    thread::sleep(self.poll_interval);
                }
                Err(e) => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Outcome::Error(Failure::new(
                        FailureKind::Io,
                        format!("failed to wait for '{}': {}", desc.program(), e),
                    ));
                }
            }
        };

        let (exit_code, signal) = split_status(status);
        tracing::debug!(?exit_code, ?signal, elapsed = ?start.elapsed(), "child finished");

        let stdout = collect(stdout, "stdout", deadline);
        let stderr = collect(stderr, "stderr", deadline);
        let (Some(stdout), Some(stderr)) = (stdout, stderr) else {
            // Reader threads are detached; whoever holds the pipes may outlive us.
            tracing::debug!(program = desc.program(), timeout = ?desc.timeout, "pipes still open at deadline");
            return Outcome::TimedOut(desc.timeout);
        };

        Outcome::Completed(Captured {
            exit_code,
            signal,
            stdout,
            stderr,
        })
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> Receiver<std::io::Result<Vec<u8>>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = Vec::new();
        let result = pipe.read_to_end(&mut buf).map(|_| buf);
        let _ = tx.send(result);
    });
    rx
}

/// Wait for one stream until `deadline`. `None` means it was still open.
fn collect(rx: Option<Receiver<std::io::Result<Vec<u8>>>>, stream: &str, deadline: Instant) -> Option<Vec<u8>> {
    let Some(rx) = rx else {
        return Some(Vec::new());
    };
    match rx.recv_timeout(deadline.saturating_duration_since(Instant::now())) {
        Ok(Ok(buf)) => Some(buf),
        Ok(Err(e)) => {
            tracing::warn!(stream, error = %e, "failed to read child output");
            Some(Vec::new())
        }
        Err(RecvTimeoutError::Timeout) => None,
        Err(RecvTimeoutError::Disconnected) => {
            tracing::warn!(stream, "output reader panicked");
            Some(Vec::new())
        }
    }
}

#[cfg(unix)]
fn split_status(status: ExitStatus) -> (Option<i32>, Option<i32>) {
    use std::os::unix::process::ExitStatusExt;
    (status.code(), status.signal())
}

#[cfg(not(unix))]
fn split_status(status: ExitStatus) -> (Option<i32>, Option<i32>) {
    (status.code(), None)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str, stdin: Option<&[u8]>, timeout: Duration) -> InvocationDescriptor {
        InvocationDescriptor::new(
            vec!["sh".into(), "-c".into(), script.into()],
            stdin.map(|b| b.to_vec()),
            timeout,
        )
    }

    fn completed(o: Outcome) -> Captured {
        match o {
            Outcome::Completed(c) => c,
            other => panic!("expected completion, got {:?}", other),
        }
    }

    #[test]
    fn test_captures_stdout_stderr_and_code() {
        let inv = Invoker::new(".");
        let c = completed(inv.run(&sh("printf out; printf err >&2; exit 3", None, Duration::from_secs(5))));
        assert_eq!(c.exit_code, Some(3));
        assert_eq!(c.stdout, b"out");
        assert_eq!(c.stderr, b"err");
    }

    #[test]
    fn test_stdin_payload_is_delivered() {
        let inv = Invoker::new(".");
        let c = completed(inv.run(&sh("cat", Some(b"hi\nthere"), Duration::from_secs(5))));
        assert_eq!(c.exit_code, Some(0));
        assert_eq!(c.stdout, b"hi\nthere");
    }

    #[test]
    fn test_no_stdin_reads_eof() {
        let inv = Invoker::new(".");
        let c = completed(inv.run(&sh("cat", None, Duration::from_secs(5))));
        assert_eq!(c.exit_code, Some(0));
        assert!(c.stdout.is_empty());
    }

    #[test]
    fn test_large_output_does_not_block() {
        let inv = Invoker::new(".");
        let big = vec![b'x'; 1 << 20];
        let c = completed(inv.run(&sh("cat; cat >&2 </dev/null", Some(&big), Duration::from_secs(10))));
        assert_eq!(c.stdout.len(), 1 << 20);
    }

    #[test]
    fn test_ignored_stdin_is_not_an_error() {
        let inv = Invoker::new(".");
        let big = vec![b'x'; 1 << 20];
        let c = completed(inv.run(&sh("exit 0", Some(&big), Duration::from_secs(5))));
        assert_eq!(c.exit_code, Some(0));
    }

    #[test]
    fn test_timeout_kills_child() {
        let inv = Invoker::new(".");
        let start = Instant::now();
        let o = inv.run(&sh("exec sleep 10", None, Duration::from_millis(200)));
        assert!(matches!(o, Outcome::TimedOut(d) if d == Duration::from_millis(200)));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_deadline_covers_inherited_pipes() {
        let inv = Invoker::new(".");
        let start = Instant::now();
        let o = inv.run(&sh("sleep 5 & exit 0", None, Duration::from_millis(500)));
        assert!(matches!(o, Outcome::TimedOut(d) if d == Duration::from_millis(500)));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_background_job_with_closed_pipes_completes() {
        let inv = Invoker::new(".");
        let c = completed(inv.run(&sh("sleep 5 >/dev/null 2>&1 & printf done", None, Duration::from_secs(2))));
        assert_eq!(c.exit_code, Some(0));
        assert_eq!(c.stdout, b"done");
    }

    #[test]
    fn test_signal_has_no_exit_code() {
        let inv = Invoker::new(".");
        let c = completed(inv.run(&sh("kill -9 $$", None, Duration::from_secs(5))));
        assert_eq!(c.exit_code, None);
        assert_eq!(c.signal, Some(9));
    }

    #[test]
    fn test_spawn_failure() {
        let inv = Invoker::new(".");
        let d = InvocationDescriptor::new(
            vec!["./definitely-not-a-tool-here".into()],
            None,
            Duration::from_secs(1),
        );
        match inv.run(&d) {
            Outcome::Error(f) => assert_eq!(f.kind, FailureKind::SpawnFailed),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_runs_in_workdir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "inside").unwrap();
        let inv = Invoker::new(dir.path());
        let c = completed(inv.run(&sh("cat a.txt", None, Duration::from_secs(5))));
        assert_eq!(c.stdout, b"inside");
    }
}
