//! emx-conform CLI
//!
//! Run a test catalogue against a tool across build phases and run modes.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use emx_conform::{
    init_logging, Catalogue, ConsoleReporter, HarnessBuilder, Phase, Timeouts, REBUILD_CMD,
    SANITIZED_CMD, VALGRIND_CMD,
};

/// Exit status when the catalogue or the configuration is unusable
const FATAL: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "emx-conform")]
#[command(author = "nzinfo <li.monan@gmail.com>")]
#[command(version)]
#[command(about = "Run a conformance catalogue against a command-line tool")]
struct Cli {
    /// Test catalogue (JSON array of test cases)
    #[arg(default_value = "testcases.json")]
    catalogue: PathBuf,

    /// Tool under test
    #[arg(short = 't', long, default_value = "./srek")]
    tool: String,

    /// Directory the tool runs in; inputs and outputs are relative to it
    #[arg(short = 'C', long, default_value = ".")]
    workdir: PathBuf,

    /// Only run test cases whose name matches this regex
    #[arg(short = 'f', long)]
    filter: Option<String>,

    /// Only run the named phase (repeatable): release, valgrind, sanitized
    #[arg(long = "phase")]
    phases: Vec<String>,

    /// Do not run any build command
    #[arg(long)]
    no_build: bool,

    /// Skip the memory-checker phase
    #[arg(long)]
    no_memcheck: bool,

    /// Skip the sanitizer phase
    #[arg(long)]
    no_sanitized: bool,

    /// Command producing the plain build
    #[arg(long, default_value = REBUILD_CMD)]
    rebuild_cmd: String,

    /// Command producing the sanitizer build
    #[arg(long, default_value = SANITIZED_CMD)]
    sanitized_cmd: String,

    /// Memory-checker command line, split on whitespace
    #[arg(long)]
    memcheck_cmd: Option<String>,

    /// Default per-invocation timeout in seconds
    #[arg(long, default_value_t = 5.0)]
    timeout: f64,

    /// Per-invocation timeout under the memory checker, in seconds
    #[arg(long, default_value_t = 30.0)]
    memcheck_timeout: f64,

    /// List the catalogue and exit
    #[arg(long)]
    list: bool,

    /// Show failure details and debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(cli.verbose, cli.quiet) {
        eprintln!("failed to initialize logging: {}", e);
    }

    let catalogue = match Catalogue::load(&cli.catalogue) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("FATAL ERROR: {}", e);
            return ExitCode::from(FATAL);
        }
    };

    if cli.list {
        for (i, case) in catalogue.iter().enumerate() {
            println!("[{}] {}", i, case.name);
        }
        println!("Found {} testcase(s)", catalogue.len());
        return ExitCode::SUCCESS;
    }

    let phases = match plan(&cli) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(FATAL);
        }
    };
    let timeouts = match (secs(cli.timeout), secs(cli.memcheck_timeout)) {
        (Some(default), Some(memcheck)) => Timeouts { default, memcheck },
        _ => {
            eprintln!("error: timeouts must be non-negative numbers of seconds");
            return ExitCode::from(FATAL);
        }
    };

    let mut builder = HarnessBuilder::new(cli.tool.clone())
        .workdir(cli.workdir.clone())
        .phases(phases)
        .restore(Some(cli.rebuild_cmd.clone()))
        .builds(!cli.no_build)
        .timeouts(timeouts);
    if let Some(ref filter) = cli.filter {
        builder = builder.filter(filter.clone());
    }

    let harness = match builder.build() {
        Ok(h) => h,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::from(FATAL);
        }
    };

    let mut reporter = ConsoleReporter::stdout(cli.verbose);
    let summary = harness.run(&catalogue, &mut reporter);
    ExitCode::from(summary.exit_code())
}

/// Phases to run, in order
fn plan(cli: &Cli) -> anyhow::Result<Vec<Phase>> {
    let wrapper: Vec<String> = match cli.memcheck_cmd {
        Some(ref cmd) => cmd.split_whitespace().map(String::from).collect(),
        None => VALGRIND_CMD.iter().map(|s| s.to_string()).collect(),
    };
    if wrapper.is_empty() {
        anyhow::bail!("--memcheck-cmd must not be empty");
    }

    let mut phases = vec![Phase::new("release").build(cli.rebuild_cmd.clone())];
    if !cli.no_memcheck {
        phases.push(Phase::new("valgrind").wrapper(wrapper));
    }
    if !cli.no_sanitized {
        phases.push(Phase::new("sanitized").build(cli.sanitized_cmd.clone()));
    }

    if !cli.phases.is_empty() {
        for name in &cli.phases {
            if !phases.iter().any(|p| &p.name == name) {
                anyhow::bail!("unknown or disabled phase: {}", name);
            }
        }
        phases.retain(|p| cli.phases.contains(&p.name));
    }

    Ok(phases)
}

fn secs(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value).ok()
}
