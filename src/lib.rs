//! emx-conform: a conformance harness for command-line text tools
//!
//! Drives a tool-under-test through a catalogue of test cases, across a
//! matrix of build phases and run modes, and checks that every invocation
//! behaves exactly as recorded.
//!
//! # Overview
//!
//! ```text
//! for phase in phases            (rebuild the tool if the phase says so)
//!   for mode in modes            files|stdin x literal|script
//!     for case in catalogue
//!       expand  -> argv, stdin, timeout
//!       invoke  -> exit code, stdout, stderr   (or timeout)
//!       judge   -> pass / fail with a reason
//!       record  -> aggregator
//!       cleanup -> declared output files, script file
//! ```
//!
//! # Catalogue
//!
//! A JSON array of records:
//!
//! ```json
//! [
//!   { "name": "print", "cmdline": "p", "files": ["a.txt"], "expectedout": "hi" },
//!   { "name": "dir input", "cmdline": "p", "files": ["."], "expectederr": 3,
//!     "expectedout": "", "stdin_test_not_applicable": true }
//! ]
//! ```
//!
//! # Run modes
//!
//! | Mode | Payload | Inputs |
//! |------|---------|--------|
//! | files | positional argument | positional operands, sentinels included |
//! | stdin | positional argument | concatenated on stdin, sentinels skipped |
//! | script | `--file=<tmp>` | positional operands |
//! | stdin, script | `--file=<tmp>` | concatenated on stdin |

mod build;
mod case;
mod compare;
mod error;
mod invoke;
mod logging;
mod matrix;
mod report;
mod runner;

pub use build::{BuildController, BuildStatus, ShellBuild};
pub use case::{Catalogue, ExpectedFile, InputPath, RawRecord, TestCase, MISSING_SENTINEL_PREFIX, UNREADABLE_SENTINEL};
pub use compare::{judge, Verdict};
pub use error::{Failure, FailureKind, HarnessError, LoadError};
pub use invoke::{Captured, Invoker, Outcome};
pub use logging::init_logging;
pub use matrix::{
    Delivery, Expander, Expansion, InvocationDescriptor, Phase, RunMode, Style, Timeouts,
    DEFAULT_TIMEOUT, MEMCHECK_TIMEOUT, SCRIPT_FLAG, VALGRIND_CMD,
};
pub use report::{Aggregator, ConsoleReporter, FailureEntry, NullReporter, Record, Reporter, Summary};
pub use runner::{default_phases, Harness, HarnessBuilder, RunConfig, REBUILD_CMD, SANITIZED_CMD};
