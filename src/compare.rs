//! Outcome comparator
//!
//! Judges one [`Outcome`] against its [`TestCase`]. Checks run in a fixed
//! order and the first failing one decides the verdict:
//!
//! 1. exit code equals the expected code
//! 2. a non-zero expected code comes with something on stderr
//! 3. stdout equals the expected bytes exactly
//! 4. stderr is non-empty if the case asks for an error message
//! 5. every declared output file exists with exactly the expected content

use std::path::Path;
use similar::TextDiff;
use crate::case::TestCase;
use crate::error::{Failure, FailureKind};
use crate::invoke::{Captured, Outcome};

/// Pass or fail, nothing in between
#[derive(Debug, Clone)]
pub enum Verdict {
    Pass,
    Fail(Failure),
}

impl Verdict {
    pub fn is_pass(&self) -> bool {
        matches!(self, Verdict::Pass)
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Verdict::Pass => None,
            Verdict::Fail(f) => Some(f),
        }
    }
}

impl From<Result<(), Failure>> for Verdict {
    fn from(r: Result<(), Failure>) -> Self {
        match r {
            Ok(()) => Verdict::Pass,
            Err(f) => Verdict::Fail(f),
        }
    }
}

/// Judge an outcome. Output files are looked up relative to `workdir`.
pub fn judge(case: &TestCase, outcome: &Outcome, workdir: &Path) -> Verdict {
    match outcome {
        Outcome::TimedOut(after) => Verdict::Fail(Failure::timeout(after.as_secs_f64())),
        Outcome::Error(f) => Verdict::Fail(f.clone()),
        Outcome::Completed(captured) => check_captured(case, captured, workdir).into(),
    }
}

fn check_captured(case: &TestCase, c: &Captured, workdir: &Path) -> Result<(), Failure> {
    if c.exit_code != Some(case.expected_exit) {
        let message = match (c.exit_code, c.signal) {
            (Some(code), _) => format!("exited with error {} (expected {})", code, case.expected_exit),
            (None, Some(sig)) => format!("killed by signal {} (expected exit code {})", sig, case.expected_exit),
            (None, None) => format!("exited with unknown status (expected {})", case.expected_exit),
        };
        let mut failure = Failure::new(FailureKind::ExitCode, message);
        if !c.stderr.is_empty() {
            failure = failure.with_detail(format!("stderr: {}", String::from_utf8_lossy(&c.stderr)));
        }
        return Err(failure);
    }

    if case.expected_exit != 0 && c.stderr.is_empty() {
        return Err(Failure::new(
            FailureKind::SilentError,
            "exited with error, but stderr is empty",
        ));
    }

    if c.stdout != case.expected_stdout {
        return Err(Failure::new(FailureKind::StdoutMismatch, "output differs from expected")
            .with_detail(diff("expected stdout", "actual stdout", &case.expected_stdout, &c.stdout)));
    }

    if case.expects_error_message && c.stderr.is_empty() {
        return Err(Failure::new(
            FailureKind::MissingErrorMessage,
            "some error message was expected but not given",
        ));
    }

    for expected in &case.outputs {
        let actual = match std::fs::read(workdir.join(&expected.name)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Failure::new(FailureKind::OutputFileMissing, "output file was not created")
                    .with_file(expected.name.as_str()));
            }
            Err(e) => return Err(Failure::from(e).with_file(expected.name.as_str())),
        };
        if actual != expected.content {
            return Err(Failure::new(FailureKind::OutputFileMismatch, "output file differs from expected")
                .with_file(expected.name.as_str())
                .with_detail(diff("expected", "actual", &expected.content, &actual)));
        }
    }

    Ok(())
}

/// Unified diff of two byte strings, decoded lossily for display
fn diff(old_name: &str, new_name: &str, old: &[u8], new: &[u8]) -> String {
    let old = String::from_utf8_lossy(old);
    let new = String::from_utf8_lossy(new);
    if old == new {
        // Differs only in invalid UTF-8 bytes
        return "contents differ in non-UTF-8 bytes".to_string();
    }
    TextDiff::from_lines(&*old, &*new)
        .unified_diff()
        .header(old_name, new_name)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn done(code: i32, stdout: &str, stderr: &str) -> Outcome {
        Outcome::Completed(Captured {
            exit_code: Some(code),
            signal: None,
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
        })
    }

    fn kind(v: Verdict) -> FailureKind {
        match v {
            Verdict::Fail(f) => f.kind,
            Verdict::Pass => panic!("expected a failure"),
        }
    }

    #[test]
    fn test_pass_on_exact_stdout() {
        let case = TestCase::new("print", "hi");
        assert!(judge(&case, &done(0, "hi", ""), Path::new(".")).is_pass());
    }

    #[test]
    fn test_stdout_is_byte_exact() {
        let case = TestCase::new("print", "hi");
        assert_eq!(kind(judge(&case, &done(0, "hi\n", ""), Path::new("."))), FailureKind::StdoutMismatch);
        let case = TestCase::new("print", "a\r\nb");
        assert_eq!(kind(judge(&case, &done(0, "a\nb", ""), Path::new("."))), FailureKind::StdoutMismatch);
    }

    #[test]
    fn test_exit_code_checked_first() {
        let case = TestCase::new("print", "hi");
        let v = judge(&case, &done(2, "nope", "syntax error"), Path::new("."));
        let f = v.failure().unwrap();
        assert_eq!(f.kind, FailureKind::ExitCode);
        assert_eq!(f.message, "exited with error 2 (expected 0)");
        assert_eq!(f.detail.as_deref(), Some("stderr: syntax error"));
    }

    #[test]
    fn test_signal_never_matches() {
        let case = TestCase::new("x", "");
        let o = Outcome::Completed(Captured { exit_code: None, signal: Some(11), stdout: vec![], stderr: vec![] });
        let v = judge(&case, &o, Path::new("."));
        assert_eq!(v.failure().unwrap().message, "killed by signal 11 (expected exit code 0)");
    }

    #[test]
    fn test_nonzero_exit_requires_stderr() {
        let case = TestCase::new("bad", "").exit(3);
        assert_eq!(kind(judge(&case, &done(3, "", ""), Path::new("."))), FailureKind::SilentError);
        assert!(judge(&case, &done(3, "", "cannot open"), Path::new(".")).is_pass());
    }

    #[test]
    fn test_silent_error_precedes_stdout() {
        let case = TestCase::new("bad", "").exit(5);
        assert_eq!(kind(judge(&case, &done(5, "junk", ""), Path::new("."))), FailureKind::SilentError);
    }

    #[test]
    fn test_zero_exit_tolerates_stderr() {
        let case = TestCase::new("warn", "ok");
        assert!(judge(&case, &done(0, "ok", "warning: something"), Path::new(".")).is_pass());
    }

    #[test]
    fn test_error_message_required() {
        let case = TestCase::new("warn", "ok").error_message();
        assert_eq!(kind(judge(&case, &done(0, "ok", ""), Path::new("."))), FailureKind::MissingErrorMessage);
        assert!(judge(&case, &done(0, "ok", "warning"), Path::new(".")).is_pass());
    }

    #[test]
    fn test_output_files() {
        let dir = tempfile::tempdir().unwrap();
        let case = TestCase::new("write", "")
            .output("one.txt", "1")
            .output("two.txt", "2");

        let v = judge(&case, &done(0, "", ""), dir.path());
        let f = v.failure().unwrap();
        assert_eq!(f.kind, FailureKind::OutputFileMissing);
        assert_eq!(f.file.as_deref(), Some("one.txt"));

        std::fs::write(dir.path().join("one.txt"), "1").unwrap();
        std::fs::write(dir.path().join("two.txt"), "3").unwrap();
        let v = judge(&case, &done(0, "", ""), dir.path());
        let f = v.failure().unwrap();
        assert_eq!(f.kind, FailureKind::OutputFileMismatch);
        assert_eq!(f.file.as_deref(), Some("two.txt"));
        assert!(f.detail.as_deref().unwrap().contains("-2"));

        std::fs::write(dir.path().join("two.txt"), "2").unwrap();
        assert!(judge(&case, &done(0, "", ""), dir.path()).is_pass());
    }

    #[test]
    fn test_output_files_checked_after_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let case = TestCase::new("write", "x").output("gone.txt", "1");
        assert_eq!(kind(judge(&case, &done(0, "y", ""), dir.path())), FailureKind::StdoutMismatch);
    }

    #[test]
    fn test_timeout_and_error_fail() {
        let case = TestCase::new("slow", "");
        let v = judge(&case, &Outcome::TimedOut(Duration::from_millis(500)), Path::new("."));
        assert_eq!(v.failure().unwrap().to_string(), "timed out after 0.5s");

        let err = Failure::new(FailureKind::SpawnFailed, "failed to execute './srek'");
        assert_eq!(kind(judge(&case, &Outcome::Error(err), Path::new("."))), FailureKind::SpawnFailed);
    }

    #[test]
    fn test_stdout_diff_detail() {
        let case = TestCase::new("print", "a\nb\n");
        let v = judge(&case, &done(0, "a\nc\n", ""), Path::new("."));
        let detail = v.failure().unwrap().detail.clone().unwrap();
        assert!(detail.contains("--- expected stdout"));
        assert!(detail.contains("+++ actual stdout"));
        assert!(detail.contains("-b"));
        assert!(detail.contains("+c"));
    }
}
