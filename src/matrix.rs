//! Run-mode matrix
//!
//! A run mode is one point in {input delivery} x {invocation style}. Given a
//! test case, a mode and the current phase, [`Expander::expand`] decides
//! whether the pair applies and, if it does, builds the concrete
//! [`InvocationDescriptor`].

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use crate::case::{InputPath, TestCase};
use crate::error::{Failure, FailureKind};

/// Flag that makes the tool read its command-language payload from a file
pub const SCRIPT_FLAG: &str = "--file=";

/// Timeout for a plain invocation
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for an invocation under the memory checker
pub const MEMCHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Default memory-checking wrapper
pub const VALGRIND_CMD: &[&str] = &[
    "valgrind",
    "--leak-check=full",
    "--show-leak-kinds=all",
    "--error-exitcode=1",
    "-q",
];

/// How input files reach the tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Delivery {
    /// Paths are passed as positional operands
    Files,
    /// Contents are concatenated and piped to stdin
    Stdin,
}

/// How the command-language payload reaches the tool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Style {
    /// Payload is a positional argument
    Literal,
    /// Payload is written to a file passed with [`SCRIPT_FLAG`]
    Script,
}

/// One point in the delivery x style matrix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunMode {
    pub delivery: Delivery,
    pub style: Style,
}

impl RunMode {
    /// Every mode, in the order a phase runs them
    pub const ALL: [RunMode; 4] = [
        RunMode { delivery: Delivery::Files, style: Style::Literal },
        RunMode { delivery: Delivery::Stdin, style: Style::Literal },
        RunMode { delivery: Delivery::Files, style: Style::Script },
        RunMode { delivery: Delivery::Stdin, style: Style::Script },
    ];

    pub fn new(delivery: Delivery, style: Style) -> Self {
        Self { delivery, style }
    }

    /// Whether the case allows this mode at all
    pub fn applies_to(&self, case: &TestCase) -> bool {
        (self.delivery == Delivery::Files || case.stdin_applicable)
            && (self.style == Style::Literal || case.script_applicable)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.delivery, self.style) {
            (Delivery::Files, Style::Literal) => Ok(()),
            (Delivery::Stdin, Style::Literal) => write!(f, "stdin"),
            (Delivery::Files, Style::Script) => write!(f, "script"),
            (Delivery::Stdin, Style::Script) => write!(f, "stdin, script"),
        }
    }
}

/// One build configuration of the tool and the way it is run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phase {
    pub name: String,
    /// Shell command that rebuilds the tool before this phase
    pub build: Option<String>,
    /// Memory-checker argv prepended to every invocation
    pub wrapper: Vec<String>,
}

impl Phase {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            build: None,
            wrapper: Vec::new(),
        }
    }

    pub fn build(mut self, command: impl Into<String>) -> Self {
        self.build = Some(command.into());
        self
    }

    pub fn wrapper<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.wrapper = argv.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_memcheck(&self) -> bool {
        !self.wrapper.is_empty()
    }

    /// Status-line tag, e.g. `valgrind, stdin, script`
    pub fn tag(&self, mode: RunMode) -> String {
        let mode = mode.to_string();
        if mode.is_empty() {
            self.name.clone()
        } else {
            format!("{}, {}", self.name, mode)
        }
    }
}

/// Default and memory-checker timeouts; a per-case override beats both
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub default: Duration,
    pub memcheck: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            default: DEFAULT_TIMEOUT,
            memcheck: MEMCHECK_TIMEOUT,
        }
    }
}

impl Timeouts {
    pub fn effective(&self, case: &TestCase, phase: &Phase) -> Duration {
        match case.timeout {
            Some(t) => t,
            None if phase.is_memcheck() => self.memcheck,
            None => self.default,
        }
    }
}

/// A concrete, ready-to-spawn invocation
#[derive(Debug)]
pub struct InvocationDescriptor {
    /// Full argv; `argv[0]` is the program to spawn
    pub argv: Vec<String>,
    pub stdin: Option<Vec<u8>>,
    pub timeout: Duration,
    /// Whether `argv` starts with the memory-checker wrapper
    pub wrapped: bool,
    /// Kept alive until the descriptor is dropped, then deleted
    script: Option<NamedTempFile>,
}

impl InvocationDescriptor {
    /// A descriptor for an arbitrary argv, without wrapper or script file
    pub fn new(argv: Vec<String>, stdin: Option<Vec<u8>>, timeout: Duration) -> Self {
        Self {
            argv,
            stdin,
            timeout,
            wrapped: false,
            script: None,
        }
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    /// Location of the per-invocation script file, if one was written
    pub fn script_path(&self) -> Option<&Path> {
        self.script.as_ref().map(|f| f.path())
    }
}

/// Result of expanding one (case, mode) pair
#[derive(Debug)]
pub enum Expansion {
    /// The case opts out of this mode
    NotApplicable,
    Ready(InvocationDescriptor),
    /// The pair applies but the invocation could not be prepared
    Unbuildable(Failure),
}

/// Builds invocation descriptors for one tool
#[derive(Debug, Clone)]
pub struct Expander {
    /// Tool binary as it is placed on the command line
    pub tool: String,
    /// Directory inputs are resolved against
    pub workdir: PathBuf,
    pub timeouts: Timeouts,
    /// Where script files are created; the system temp dir if unset
    pub script_dir: Option<PathBuf>,
}

impl Expander {
    pub fn new(tool: impl Into<String>, workdir: impl Into<PathBuf>) -> Self {
        Self {
            tool: tool.into(),
            workdir: workdir.into(),
            timeouts: Timeouts::default(),
            script_dir: None,
        }
    }

    pub fn expand(&self, case: &TestCase, mode: RunMode, phase: &Phase) -> Expansion {
        if !mode.applies_to(case) {
            return Expansion::NotApplicable;
        }

        let mut argv: Vec<String> = phase.wrapper.clone();
        argv.push(self.tool.clone());
        argv.extend(case.options.iter().cloned());

        let mut script = None;
        match mode.style {
            Style::Script => {
                let payload = case.cmdline.as_deref().unwrap_or("");
                let file = match self.write_script(payload) {
                    Ok(f) => f,
                    Err(e) => {
                        return Expansion::Unbuildable(
                            Failure::new(FailureKind::Io, format!("cannot write script file: {}", e)),
                        )
                    }
                };
                argv.push(format!("{}{}", SCRIPT_FLAG, file.path().display()));
                script = Some(file);
            }
            Style::Literal => {
                if let Some(ref cmdline) = case.cmdline {
                    argv.push(cmdline.clone());
                }
            }
        }

        let stdin = match mode.delivery {
            Delivery::Files => {
                argv.extend(case.inputs.iter().map(|i| i.as_str().to_string()));
                None
            }
            Delivery::Stdin => match self.stdin_payload(&case.inputs) {
                Ok(bytes) => Some(bytes),
                Err(failure) => return Expansion::Unbuildable(failure),
            },
        };

        Expansion::Ready(InvocationDescriptor {
            argv,
            stdin,
            timeout: self.timeouts.effective(case, phase),
            wrapped: phase.is_memcheck(),
            script,
        })
    }

    /// Concatenate every readable input; sentinels are skipped
    fn stdin_payload(&self, inputs: &[InputPath]) -> Result<Vec<u8>, Failure> {
        let mut payload = Vec::new();
        for input in inputs {
            let InputPath::Regular(name) = input else {
                continue;
            };
            let path = self.workdir.join(name);
            let bytes = std::fs::read(&path).map_err(|e| {
                Failure::new(FailureKind::InputUnreadable, format!("cannot read input for stdin: {}", e))
                    .with_file(name.as_str())
            })?;
            payload.extend_from_slice(&bytes);
        }
        Ok(payload)
    }

    fn write_script(&self, payload: &str) -> std::io::Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("emx-conform-script-");
        let mut file = match self.script_dir {
            Some(ref dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        file.write_all(payload.as_bytes())?;
        file.flush()?;
        Ok(file)
    }
}
