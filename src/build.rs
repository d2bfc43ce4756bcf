//! Build controller
//!
//! Rebuilds the tool between phases. The result is reported but never
//! changes what the session does next.

use std::fmt;
use std::path::Path;
use std::process::Command;

/// How a build command ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    Succeeded,
    /// Non-zero exit, or `None` when killed by a signal
    Failed(Option<i32>),
    /// The command could not be started
    Unavailable(String),
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildStatus::Succeeded => write!(f, "build finished"),
            BuildStatus::Failed(Some(code)) => write!(f, "build failed with exit code {}", code),
            BuildStatus::Failed(None) => write!(f, "build terminated by signal"),
            BuildStatus::Unavailable(e) => write!(f, "build could not start: {}", e),
        }
    }
}

/// Something that can rebuild the tool
pub trait BuildController {
    fn build(&self, command: &str, workdir: &Path) -> BuildStatus;
}

/// Runs build commands through the platform shell, output going to the terminal
pub struct ShellBuild;

impl BuildController for ShellBuild {
    fn build(&self, command: &str, workdir: &Path) -> BuildStatus {
        let mut cmd = shell(command);
        cmd.current_dir(workdir);
        match cmd.status() {
            Ok(status) if status.success() => BuildStatus::Succeeded,
            Ok(status) => BuildStatus::Failed(status.code()),
            Err(e) => BuildStatus::Unavailable(e.to_string()),
        }
    }
}

#[cfg(not(windows))]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    cmd
}

#[cfg(windows)]
fn shell(command: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").arg(command);
    cmd
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_shell_build_statuses() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(ShellBuild.build("true", dir.path()), BuildStatus::Succeeded);
        assert_eq!(ShellBuild.build("exit 4", dir.path()), BuildStatus::Failed(Some(4)));
    }

    #[test]
    fn test_shell_build_runs_in_workdir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(ShellBuild.build("touch built", dir.path()), BuildStatus::Succeeded);
        assert!(dir.path().join("built").exists());
    }

    #[test]
    fn test_status_display() {
        assert_eq!(BuildStatus::Failed(Some(2)).to_string(), "build failed with exit code 2");
        assert_eq!(BuildStatus::Succeeded.to_string(), "build finished");
    }
}
