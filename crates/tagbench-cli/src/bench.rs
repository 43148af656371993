//! Subcommand implementations.
//!
//! Output follows one block per scenario:
//!
//! ```text
//! bench/serialize_generic_batched
//!   group=serialization encoding=generic strategy=batched_deferred
//!   rows=400 iterations=20 queries=106
//!   latency_us min=812 mean=901.4 p50=880 p99=1210 max=1302
//! ```

use crate::RunArgs;
use anyhow::{anyhow, Result};
use colored::Colorize;
use std::fs;
use tagbench_core::fixtures::{insert_tags, seed};
use tagbench_core::{
    measure, resolve_batch, run_suite, BenchConfig, Encoding, KindRegistry, LoadPlan, Satellite,
    SatelliteRequest, Scenario, ScenarioGroup, ScenarioReport, Strategy,
};
use tagbench_store::{Kind, Store};

pub fn cmd_list(group: Option<ScenarioGroup>) -> Result<()> {
    for scenario in Scenario::catalog()
        .into_iter()
        .filter(|scenario| group.map_or(true, |g| scenario.group == g))
    {
        let strategy = scenario
            .strategy()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let marker = if scenario.expect_fault {
            " (expected fault)".yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "{:<40} group={} encoding={} strategy={}{}",
            scenario.name.bold(),
            scenario.group,
            scenario.encoding,
            strategy,
            marker
        );
    }
    Ok(())
}

/// Start from the JSON config if given, then apply flag overrides.
fn resolve_config(args: &RunArgs) -> Result<BenchConfig> {
    let mut config = match &args.config {
        Some(path) => BenchConfig::from_json_file(path)
            .map_err(|err| anyhow!("failed to load {}: {err}", path.display()))?,
        None => BenchConfig::default(),
    };
    if let Some(per_kind) = args.per_kind {
        config.per_kind = per_kind;
    }
    if let Some(iterations) = args.iterations {
        config.iterations = iterations;
    }
    if let Some(warmup) = args.warmup {
        config.warmup = warmup;
    }
    if let Some(dir) = &args.data_dir {
        config.data_dir = Some(dir.clone());
    }
    config.validate()?;
    Ok(config)
}

fn select_scenarios(args: &RunArgs) -> Result<Vec<Scenario>> {
    let selected = if args.scenarios.is_empty() {
        Scenario::catalog()
    } else {
        args.scenarios
            .iter()
            .map(|name| Scenario::by_name(name))
            .collect::<Result<Vec<_>, _>>()?
    };
    let selected: Vec<_> = selected
        .into_iter()
        .filter(|scenario| args.group.map_or(true, |g| scenario.group == g))
        .collect();
    if selected.is_empty() {
        return Err(anyhow!("no scenario matches the given --scenario/--group"));
    }
    Ok(selected)
}

pub fn cmd_run(args: &RunArgs) -> Result<()> {
    let config = resolve_config(args)?;
    let scenarios = select_scenarios(args)?;
    let registry = KindRegistry::standard();

    println!("bench");
    println!(
        "  per_kind={} iterations={} warmup={} missing_extras={} dangling_refs={} unregistered_refs={} empty_explicit={}",
        config.per_kind,
        config.iterations,
        config.warmup,
        config.missing_extras,
        config.dangling_refs,
        config.unregistered_refs,
        config.empty_explicit
    );

    let suite = run_suite(&scenarios, &registry, &config)?;
    for report in &suite.scenarios {
        print_report(report);
    }

    if let Some(out) = &args.out_json {
        if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(out, suite.to_json_pretty()?)?;
        eprintln!("{} {}", "wrote".green().bold(), out.display().to_string().bold());
    }
    Ok(())
}

fn print_report(report: &ScenarioReport) {
    println!("bench/{}", report.name);
    println!(
        "  group={} encoding={} strategy={}",
        report.group,
        report.encoding,
        report
            .strategy
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    if let Some(fault) = &report.fault {
        println!("  {}={fault}", "fault".yellow().bold());
        return;
    }

    let queries = if report.stable_queries() {
        report.queries_max.to_string()
    } else {
        format!("{}..{}", report.queries_min, report.queries_max)
            .red()
            .to_string()
    };
    println!(
        "  rows={} iterations={} queries={}",
        report.rows, report.iterations, queries
    );
    if report.output_bytes > 0 {
        println!("  output_bytes={}", report.output_bytes);
    }
    let latency = &report.latency;
    println!(
        "  latency_us min={} mean={:.1} p50={} p99={} max={}",
        latency.min_us, latency.mean_us, latency.p50_us, latency.p99_us, latency.max_us
    );
    for statement in &report.statements {
        println!("    {statement}");
    }
}

pub fn cmd_queries(per_kind: usize) -> Result<()> {
    let config = BenchConfig {
        per_kind,
        ..BenchConfig::default()
    };
    let registry = KindRegistry::standard();
    let extra_on_b = SatelliteRequest::OnKind(Kind::ProfileB, Satellite::ExtraData);

    println!("queries");
    println!("  per_kind={per_kind} kinds={}", Kind::ALL.len());
    println!(
        "  {:<10} {:<18} {:>12} {:>12}",
        "encoding", "strategy", "plain", "extra_on_b"
    );
    for encoding in Encoding::ALL {
        let store = Store::open(config.store.clone())?;
        let seeded = seed(&store, &registry, &config)?;
        insert_tags(&store, &seeded, &config, encoding)?;

        for strategy in Strategy::ALL {
            let plain = LoadPlan::new(strategy);
            let with_extra = LoadPlan::new(strategy).with_satellite(extra_on_b);
            let plain = measure(&store, || resolve_batch(&store, &registry, encoding, &plain))?;
            let extra = measure(&store, || resolve_batch(&store, &registry, encoding, &with_extra))?;
            println!(
                "  {:<10} {:<18} {:>12} {:>12}",
                encoding.to_string(),
                strategy.to_string(),
                plain.queries,
                extra.queries
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_flags_override_json_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bench.json");
        fs::write(&path, r#"{"per_kind": 40, "iterations": 3, "missing_extras": 5}"#).unwrap();

        let args = RunArgs {
            config: Some(path),
            per_kind: Some(8),
            ..RunArgs::default()
        };
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.per_kind, 8);
        assert_eq!(config.iterations, 3);
        assert_eq!(config.missing_extras, 5);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let args = RunArgs {
            iterations: Some(0),
            ..RunArgs::default()
        };
        assert!(resolve_config(&args).is_err());
    }

    #[test]
    fn test_select_scenarios() {
        let args = RunArgs {
            group: Some(ScenarioGroup::Inserts),
            ..RunArgs::default()
        };
        let names: Vec<_> = select_scenarios(&args)
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["insert_generic", "insert_explicit"]);

        let args = RunArgs {
            scenarios: vec!["query_generic".to_string()],
            group: Some(ScenarioGroup::Inserts),
            ..RunArgs::default()
        };
        assert!(select_scenarios(&args).is_err());

        let args = RunArgs {
            scenarios: vec!["missing".to_string()],
            ..RunArgs::default()
        };
        assert!(select_scenarios(&args).is_err());
    }

    #[test]
    fn test_run_writes_json_report() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("reports").join("suite.json");
        let args = RunArgs {
            scenarios: vec!["query_explicit_batched".to_string()],
            per_kind: Some(3),
            iterations: Some(1),
            warmup: Some(0),
            out_json: Some(out.clone()),
            ..RunArgs::default()
        };
        cmd_run(&args).unwrap();

        let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(out).unwrap()).unwrap();
        assert_eq!(json["scenarios"][0]["name"], "query_explicit_batched");
        assert_eq!(json["scenarios"][0]["queries_max"], 6);
        assert_eq!(json["config"]["per_kind"], 3);
    }
}
