//! tagbench CLI
//!
//! Runs the tag reference benchmark:
//! - `list` prints the scenario catalog
//! - `run` executes scenarios and prints one `key=value` block per scenario
//! - `queries` compares round-trip counts for every encoding and strategy

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tagbench_core::ScenarioGroup;
use tracing_subscriber::EnvFilter;

mod bench;

#[derive(Parser)]
#[command(name = "tagbench")]
#[command(
    author,
    version,
    about = "Benchmark generic versus explicit polymorphic tag references"
)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv statement trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the scenario catalog.
    List {
        /// Only show one group (inserts|serialization|queries).
        #[arg(long)]
        group: Option<ScenarioGroup>,
    },

    /// Run scenarios and report latency and round trips.
    Run(RunArgs),

    /// Print round-trip counts for every encoding and strategy side by side.
    Queries {
        /// Entities seeded per kind.
        #[arg(long, default_value_t = 10)]
        per_kind: usize,
    },
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    /// Scenario to run (repeatable). Defaults to the whole catalog.
    #[arg(long = "scenario")]
    scenarios: Vec<String>,

    /// Only run scenarios of this group.
    #[arg(long)]
    group: Option<ScenarioGroup>,

    /// JSON `BenchConfig` to start from.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Entities seeded per kind.
    #[arg(long)]
    per_kind: Option<usize>,

    /// Measured iterations per scenario.
    #[arg(long)]
    iterations: Option<usize>,

    /// Unmeasured iterations per scenario.
    #[arg(long)]
    warmup: Option<usize>,

    /// Keep scenario stores as SQLite files in this directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Write the suite report as JSON.
    #[arg(long)]
    out_json: Option<PathBuf>,
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,tagbench={level},tagbench_core={level},tagbench_store={level}"
        ))
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::List { group } => bench::cmd_list(group),
        Commands::Run(args) => bench::cmd_run(&args),
        Commands::Queries { per_kind } => bench::cmd_queries(per_kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_flags() {
        let cli = Cli::try_parse_from([
            "tagbench",
            "-vv",
            "run",
            "--scenario",
            "query_generic",
            "--scenario",
            "query_explicit",
            "--group",
            "queries",
            "--per-kind",
            "5",
            "--out-json",
            "report.json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        let Commands::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.scenarios, vec!["query_generic", "query_explicit"]);
        assert_eq!(args.group, Some(ScenarioGroup::Queries));
        assert_eq!(args.per_kind, Some(5));
        assert_eq!(args.out_json, Some(PathBuf::from("report.json")));
    }

    #[test]
    fn test_rejects_unknown_group() {
        assert!(Cli::try_parse_from(["tagbench", "list", "--group", "writes"]).is_err());
    }
}
