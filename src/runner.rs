//! Session driver
//!
//! Walks phases, then run modes, then test cases, strictly in catalogue
//! order. Each (case, mode) pair is expanded, invoked, judged and cleaned
//! up before the next one starts.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use regex::Regex;
use crate::build::{BuildController, BuildStatus, ShellBuild};
use crate::case::{Catalogue, TestCase};
use crate::compare::{judge, Verdict};
use crate::error::HarnessError;
use crate::invoke::Invoker;
use crate::matrix::{Expander, Expansion, Phase, RunMode, Timeouts, VALGRIND_CMD};
use crate::report::{Aggregator, Record, Reporter, Summary};

/// Command that produces the plain build
pub const REBUILD_CMD: &str = "make rebuild";

/// Command that produces the sanitizer build
pub const SANITIZED_CMD: &str = "make build-sanitized";

/// Configuration for a session
pub struct RunConfig {
    /// Tool binary; a relative path with a directory part is taken from `workdir`
    pub tool: String,
    /// Directory the tool runs in; inputs and outputs are relative to it
    pub workdir: PathBuf,
    pub phases: Vec<Phase>,
    /// Build command run after the last phase, skipped when the last phase
    /// build was this same command or no phase built anything
    pub restore: Option<String>,
    /// Run build commands at all
    pub builds: bool,
    /// Modes to run in each phase, in order
    pub modes: Vec<RunMode>,
    pub timeouts: Timeouts,
    /// Only run cases whose name matches this regex
    pub filter: Option<String>,
    /// Where script files go; the system temp dir when `None`
    pub script_dir: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            tool: "./srek".into(),
            workdir: PathBuf::from("."),
            phases: default_phases(),
            restore: Some(REBUILD_CMD.into()),
            builds: true,
            modes: RunMode::ALL.to_vec(),
            timeouts: Timeouts::default(),
            filter: None,
            script_dir: None,
        }
    }
}

/// release, valgrind, sanitized
pub fn default_phases() -> Vec<Phase> {
    vec![
        Phase::new("release").build(REBUILD_CMD),
        Phase::new("valgrind").wrapper(VALGRIND_CMD.iter().copied()),
        Phase::new("sanitized").build(SANITIZED_CMD),
    ]
}

/// Deletes a case's declared output files when dropped
struct OutputGuard {
    paths: Vec<PathBuf>,
}

impl OutputGuard {
    fn new(workdir: &Path, case: &TestCase) -> Self {
        Self {
            paths: case.outputs.iter().map(|o| workdir.join(&o.name)).collect(),
        }
    }
}

impl Drop for OutputGuard {
    fn drop(&mut self) {
        for path in &self.paths {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                // A missing output has already been judged
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove output file"),
            }
        }
    }
}

/// The harness
pub struct Harness {
    config: RunConfig,
    filter: Option<Regex>,
    expander: Expander,
    invoker: Invoker,
    builder: Box<dyn BuildController>,
}

impl Harness {
    /// Create a harness that builds through the shell
    pub fn new(config: RunConfig) -> Result<Self, HarnessError> {
        Self::with_builder(config, Box::new(ShellBuild))
    }

    /// Create a harness with a custom build controller
    pub fn with_builder(mut config: RunConfig, builder: Box<dyn BuildController>) -> Result<Self, HarnessError> {
        let workdir = config.workdir.canonicalize().map_err(|source| HarnessError::Workdir {
            path: config.workdir.clone(),
            source,
        })?;
        if !workdir.is_dir() {
            return Err(HarnessError::Workdir {
                path: config.workdir.clone(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "not a directory"),
            });
        }
        config.workdir = workdir;

        let filter = config.filter.as_deref().map(Regex::new).transpose()?;

        let mut expander = Expander::new(resolve_tool(&config.tool, &config.workdir), &config.workdir);
        expander.timeouts = config.timeouts;
        expander.script_dir = config.script_dir.clone();
        let invoker = Invoker::new(&config.workdir);

        Ok(Self {
            config,
            filter,
            expander,
            invoker,
            builder,
        })
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Cases this harness would run, after filtering
    pub fn select(&self, catalogue: &Catalogue) -> Catalogue {
        match self.filter {
            Some(ref re) => catalogue.filtered(re),
            None => catalogue.clone(),
        }
    }

    /// Run every phase, then the restore build, and report the summary
    pub fn run(&self, catalogue: &Catalogue, reporter: &mut dyn Reporter) -> Summary {
        let selected = self.select(catalogue);
        let mut agg = Aggregator::new();
        let mut last_build: Option<&str> = None;

        for phase in &self.config.phases {
            if let Some(ref command) = phase.build {
                self.rebuild(&phase.name, command, reporter);
                last_build = Some(command.as_str());
            }
            tracing::info!(phase = %phase.name, cases = selected.len(), "phase started");
            self.run_phase(phase, selected.cases(), &mut agg, reporter);
        }

        match (self.config.restore.as_deref(), last_build) {
            (Some(command), Some(last)) if command != last => self.rebuild("restore", command, reporter),
            (Some(command), _) => tracing::debug!(command, "restore build not needed"),
            (None, _) => {}
        }

        let summary = agg.summary();
        reporter.summary(&summary);
        summary
    }

    /// Run every configured mode of one phase over `cases`
    pub fn run_phase(&self, phase: &Phase, cases: &[TestCase], agg: &mut Aggregator, reporter: &mut dyn Reporter) {
        for &mode in &self.config.modes {
            let tag = phase.tag(mode);
            reporter.mode_started(&tag);
            for case in cases {
                self.run_one(case, mode, phase, &tag, agg, reporter);
            }
        }
    }

    /// Evaluate and record one pair. Returns the invocation index, or
    /// `None` if the case does not apply to `mode`.
    pub fn run_one(
        &self,
        case: &TestCase,
        mode: RunMode,
        phase: &Phase,
        tag: &str,
        agg: &mut Aggregator,
        reporter: &mut dyn Reporter,
    ) -> Option<usize> {
        let start = Instant::now();
        let Some(verdict) = self.evaluate(case, mode, phase) else {
            agg.skip();
            reporter.not_applicable(tag, case);
            return None;
        };
        let index = agg.record(&case.name, &verdict);
        tracing::debug!(index, case = %case.name, tag, pass = verdict.is_pass(), "evaluated");
        reporter.invocation(&Record {
            index,
            tag,
            case,
            verdict: &verdict,
            elapsed: start.elapsed(),
        });
        Some(index)
    }

    /// Expand, invoke, judge. Output files and the script file are gone when
    /// this returns, whatever the verdict.
    pub fn evaluate(&self, case: &TestCase, mode: RunMode, phase: &Phase) -> Option<Verdict> {
        if !mode.applies_to(case) {
            return None;
        }
        let _outputs = OutputGuard::new(&self.config.workdir, case);

        let desc = match self.expander.expand(case, mode, phase) {
            Expansion::NotApplicable => return None,
            Expansion::Unbuildable(failure) => return Some(Verdict::Fail(failure)),
            Expansion::Ready(desc) => desc,
        };
        let outcome = self.invoker.run(&desc);
        Some(judge(case, &outcome, &self.config.workdir))
    }

    fn rebuild(&self, label: &str, command: &str, reporter: &mut dyn Reporter) {
        if !self.config.builds {
            tracing::debug!(label, command, "builds disabled");
            return;
        }
        tracing::info!(label, command, "building");
        let started = Instant::now();
        let status = self.builder.build(command, &self.config.workdir);
        match status {
            BuildStatus::Succeeded => {
                tracing::info!(label, elapsed = ?started.elapsed(), "build finished")
            }
            ref other => tracing::warn!(label, status = %other, "build did not succeed; continuing"),
        }
        reporter.build(label, command, &status);
    }
}

/// Anchor a relative tool path with a directory part to `workdir`
fn resolve_tool(tool: &str, workdir: &Path) -> String {
    let path = Path::new(tool);
    if path.is_relative() && path.components().count() > 1 {
        workdir.join(path).to_string_lossy().into_owned()
    } else {
        tool.to_string()
    }
}

/// Builder API for convenient harness construction
pub struct HarnessBuilder {
    config: RunConfig,
    builder: Option<Box<dyn BuildController>>,
}

impl HarnessBuilder {
    /// Start building a harness for the given tool
    pub fn new(tool: impl Into<String>) -> Self {
        Self {
            config: RunConfig {
                tool: tool.into(),
                ..Default::default()
            },
            builder: None,
        }
    }

    /// Directory the tool runs in
    pub fn workdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.workdir = dir.into();
        self
    }

    /// Replace the phase plan
    pub fn phases(mut self, phases: Vec<Phase>) -> Self {
        self.config.phases = phases;
        self
    }

    /// Build command after the last phase, or none
    pub fn restore(mut self, command: Option<String>) -> Self {
        self.config.restore = command;
        self
    }

    /// Enable or disable all build commands
    pub fn builds(mut self, enabled: bool) -> Self {
        self.config.builds = enabled;
        self
    }

    /// Modes to run, in order
    pub fn modes(mut self, modes: Vec<RunMode>) -> Self {
        self.config.modes = modes;
        self
    }

    pub fn timeouts(mut self, timeouts: Timeouts) -> Self {
        self.config.timeouts = timeouts;
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeouts.default = timeout;
        self
    }

    /// Only run cases whose name matches this regex
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.config.filter = Some(filter.into());
        self
    }

    /// Directory for script files
    pub fn script_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.script_dir = Some(dir.into());
        self
    }

    /// Use a custom build controller
    pub fn build_controller(mut self, builder: Box<dyn BuildController>) -> Self {
        self.builder = Some(builder);
        self
    }

    /// Build and return the harness
    pub fn build(self) -> Result<Harness, HarnessError> {
        match self.builder {
            Some(builder) => Harness::with_builder(self.config, builder),
            None => Harness::new(self.config),
        }
    }
}
