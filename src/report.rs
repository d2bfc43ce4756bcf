//! Result aggregation and reporting
//!
//! [`Aggregator`] is the only state that lives for the whole session. It is
//! an ordinary value owned by the driver and lent to each phase, so a
//! parallel driver can keep one per worker and [`Aggregator::merge`] them.

use std::io::Write;
use std::time::Duration;
use crate::build::BuildStatus;
use crate::case::TestCase;
use crate::compare::Verdict;

/// A failed invocation as listed in the final report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureEntry {
    pub index: usize,
    pub name: String,
}

/// Session-wide counters
#[derive(Debug, Default, Clone)]
pub struct Aggregator {
    passed: usize,
    failed: usize,
    skipped: usize,
    next_index: usize,
    failures: Vec<FailureEntry>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one evaluated (case, mode) pair; returns its invocation index
    pub fn record(&mut self, name: &str, verdict: &Verdict) -> usize {
        let index = self.next_index;
        self.next_index += 1;
        if verdict.is_pass() {
            self.passed += 1;
        } else {
            self.failed += 1;
            self.failures.push(FailureEntry {
                index,
                name: name.to_string(),
            });
        }
        index
    }

    /// Count a pair the case declared not applicable; takes no index
    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    /// Append another accumulator's results after this one's, renumbering them
    pub fn merge(&mut self, other: Aggregator) {
        let offset = self.next_index;
        self.passed += other.passed;
        self.failed += other.failed;
        self.skipped += other.skipped;
        self.next_index += other.next_index;
        self.failures.extend(other.failures.into_iter().map(|f| FailureEntry {
            index: f.index + offset,
            name: f.name,
        }));
    }

    pub fn summary(&self) -> Summary {
        Summary {
            passed: self.passed,
            failed: self.failed,
            skipped: self.skipped,
            failures: self.failures.clone(),
        }
    }
}

/// Final tally of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Summary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failures: Vec<FailureEntry>,
}

impl Summary {
    /// Number of evaluated invocations
    pub fn total(&self) -> usize {
        self.passed + self.failed
    }

    /// Percentage of passing invocations, `None` when nothing ran
    pub fn success_rate(&self) -> Option<f64> {
        match self.total() {
            0 => None,
            total => Some(self.passed as f64 / total as f64 * 100.0),
        }
    }

    pub fn success_text(&self) -> String {
        match self.success_rate() {
            Some(rate) => format!("{:.2} %", rate),
            None => "N/A".to_string(),
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Process exit status for this result
    pub fn exit_code(&self) -> u8 {
        if self.all_passed() { 0 } else { 1 }
    }
}

/// One evaluated invocation, as handed to a [`Reporter`]
#[derive(Debug)]
pub struct Record<'a> {
    pub index: usize,
    /// e.g. `release, stdin`
    pub tag: &'a str,
    pub case: &'a TestCase,
    pub verdict: &'a Verdict,
    pub elapsed: Duration,
}

/// Receives session events as they happen
pub trait Reporter {
    fn mode_started(&mut self, _tag: &str) {}

    fn build(&mut self, _label: &str, _command: &str, _status: &BuildStatus) {}

    fn invocation(&mut self, record: &Record<'_>);

    fn not_applicable(&mut self, _tag: &str, _case: &TestCase) {}

    fn summary(&mut self, _summary: &Summary) {}
}

/// Discards everything
pub struct NullReporter;

impl Reporter for NullReporter {
    fn invocation(&mut self, _record: &Record<'_>) {}
}

/// Plain-text status lines and summary
pub struct ConsoleReporter<W: Write> {
    out: W,
    /// Print failure details (diffs, stderr) under each failing line
    pub verbose: bool,
}

impl ConsoleReporter<std::io::Stdout> {
    pub fn stdout(verbose: bool) -> Self {
        Self::new(std::io::stdout(), verbose)
    }
}

impl<W: Write> ConsoleReporter<W> {
    pub fn new(out: W, verbose: bool) -> Self {
        Self { out, verbose }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn banner(&mut self, title: &str) {
        let _ = writeln!(self.out, "\n{:*^80}", format!(" {} ", title));
    }
}

impl<W: Write> Reporter for ConsoleReporter<W> {
    fn mode_started(&mut self, tag: &str) {
        self.banner(&format!("Running {}", tag));
    }

    fn build(&mut self, label: &str, command: &str, status: &BuildStatus) {
        self.banner(&format!("Building {}", label));
        let _ = writeln!(self.out, "$ {}", command);
        let _ = writeln!(self.out, "{}", status);
    }

    fn invocation(&mut self, r: &Record<'_>) {
        let _ = write!(self.out, "[{}] [#{}] Testcase: {} ... ", r.tag, r.index, r.case.name);
        match r.verdict {
            Verdict::Pass if self.verbose => {
                let _ = writeln!(self.out, "Passed ({}ms)", r.elapsed.as_millis());
            }
            Verdict::Pass => {
                let _ = writeln!(self.out, "Passed");
            }
            Verdict::Fail(f) => {
                let _ = writeln!(self.out, "Failed: {}", f);
                if self.verbose {
                    if let Some(ref detail) = f.detail {
                        for line in detail.lines() {
                            let _ = writeln!(self.out, "      {}", line);
                        }
                    }
                }
            }
        }
    }

    fn not_applicable(&mut self, tag: &str, case: &TestCase) {
        let _ = writeln!(self.out, "[{}] Testcase: {} ... Not applicable", tag, case.name);
    }

    fn summary(&mut self, s: &Summary) {
        self.banner("Results");
        let _ = writeln!(self.out, "Passed: {}", s.passed);
        let _ = writeln!(self.out, "Failed: {}", s.failed);
        let _ = writeln!(self.out, "Skipped: {}", s.skipped);
        let _ = writeln!(self.out, "Success: {}", s.success_text());

        if !s.failures.is_empty() {
            let _ = writeln!(self.out, "\nThe following testcases failed:");
            for f in &s.failures {
                let _ = writeln!(self.out, "[#{}] {}", f.index, f.name);
            }
        }
        let _ = self.out.flush();
    }
}
