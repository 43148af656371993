//! Query-count and latency harness.
//!
//! Every scenario runs on a fresh store. Round trips are counted through a
//! scoped [`QueryCapture`](tagbench_store::QueryCapture), wall time is
//! recorded per iteration into an HDR histogram.

use crate::config::BenchConfig;
use crate::fixtures;
use crate::loading::{resolve_batch, serialize_batch, LoadPlan, SatelliteRequest, Strategy};
use crate::reference::Encoding;
use crate::registry::{KindRegistry, Satellite};
use crate::serializer;
use crate::{TagError, TagResult};
use hdrhistogram::Histogram;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tagbench_store::{Kind, Store};

/// Statements kept in a query-count report.
const STATEMENT_SAMPLE: usize = 25;

/// Highest latency tracked, in microseconds.
const MAX_TRACKED_US: u64 = 60_000_000;

// ============================================================================
// Measurement
// ============================================================================

#[derive(Debug, Clone)]
pub struct Measured<T> {
    pub result: T,
    pub queries: u64,
    pub statements: Vec<String>,
    pub elapsed: Duration,
}

/// Run `op` under a query capture on `store`. The result and any error are
/// passed through untouched.
pub fn measure<T, E>(store: &Store, op: impl FnOnce() -> Result<T, E>) -> Result<Measured<T>, E> {
    let capture = store.capture();
    let start = Instant::now();
    let result = op()?;
    let elapsed = start.elapsed();
    let captured = capture.finish();
    Ok(Measured {
        result,
        queries: captured.count,
        statements: captured.statements,
        elapsed,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencySummary {
    pub samples: u64,
    pub min_us: u64,
    pub mean_us: f64,
    pub p50_us: u64,
    pub p99_us: u64,
    pub max_us: u64,
}

pub struct LatencyRecorder {
    histogram: Histogram<u64>,
}

impl LatencyRecorder {
    pub fn new() -> TagResult<Self> {
        Ok(Self {
            histogram: Histogram::new_with_bounds(1, MAX_TRACKED_US, 3)?,
        })
    }

    pub fn record(&mut self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.histogram.saturating_record(micros.clamp(1, MAX_TRACKED_US));
    }

    pub fn summary(&self) -> LatencySummary {
        if self.histogram.is_empty() {
            return LatencySummary::default();
        }
        LatencySummary {
            samples: self.histogram.len(),
            min_us: self.histogram.min(),
            mean_us: self.histogram.mean(),
            p50_us: self.histogram.value_at_quantile(0.50),
            p99_us: self.histogram.value_at_quantile(0.99),
            max_us: self.histogram.max(),
        }
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioGroup {
    Inserts,
    Serialization,
    Queries,
}

impl ScenarioGroup {
    pub const fn name(self) -> &'static str {
        match self {
            ScenarioGroup::Inserts => "inserts",
            ScenarioGroup::Serialization => "serialization",
            ScenarioGroup::Queries => "queries",
        }
    }
}

impl fmt::Display for ScenarioGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScenarioGroup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inserts" => Ok(ScenarioGroup::Inserts),
            "serialization" => Ok(ScenarioGroup::Serialization),
            "queries" => Ok(ScenarioGroup::Queries),
            other => Err(format!(
                "unknown group '{other}' (expected inserts|serialization|queries)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioMode {
    /// Time the bulk insert of the tag batch.
    Insert,
    /// Resolve and serialize the whole batch to JSON.
    Serialize,
    /// Resolve the batch and keep the issued statements.
    QueryCount,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scenario {
    pub name: &'static str,
    pub group: ScenarioGroup,
    pub mode: ScenarioMode,
    pub encoding: Encoding,
    /// `None` for insert scenarios.
    pub plan: Option<LoadPlan>,
    /// The plan is invalid for the batch and must fault.
    pub expect_fault: bool,
}

impl Scenario {
    fn insert(name: &'static str, encoding: Encoding) -> Self {
        Self {
            name,
            group: ScenarioGroup::Inserts,
            mode: ScenarioMode::Insert,
            encoding,
            plan: None,
            expect_fault: false,
        }
    }

    fn read(name: &'static str, mode: ScenarioMode, encoding: Encoding, plan: LoadPlan) -> Self {
        let group = match mode {
            ScenarioMode::QueryCount => ScenarioGroup::Queries,
            _ => ScenarioGroup::Serialization,
        };
        Self {
            name,
            group,
            mode,
            encoding,
            plan: Some(plan),
            expect_fault: false,
        }
    }

    /// Every named scenario, in run order.
    pub fn catalog() -> Vec<Scenario> {
        use Encoding::{Explicit, Generic};
        use ScenarioMode::{QueryCount as Query, Serialize as Ser};
        use Strategy::{BatchedDeferred, Naive, SingleJoin};

        let extra_on_b = SatelliteRequest::OnKind(Kind::ProfileB, Satellite::ExtraData);
        let plain = LoadPlan::new;
        let with_extra = |strategy| LoadPlan::new(strategy).with_satellite(extra_on_b);

        let mut faulting = Scenario::read(
            "generic_batched_extra_everywhere",
            Ser,
            Generic,
            LoadPlan::new(BatchedDeferred)
                .with_satellite(SatelliteRequest::Everywhere(Satellite::ExtraData)),
        );
        faulting.expect_fault = true;

        vec![
            Scenario::insert("insert_generic", Generic),
            Scenario::insert("insert_explicit", Explicit),
            Scenario::read("serialize_generic", Ser, Generic, plain(Naive)),
            Scenario::read("serialize_generic_single_join", Ser, Generic, plain(SingleJoin)),
            Scenario::read("serialize_generic_batched", Ser, Generic, plain(BatchedDeferred)),
            Scenario::read(
                "serialize_generic_batched_with_extra",
                Ser,
                Generic,
                with_extra(BatchedDeferred),
            ),
            Scenario::read("serialize_explicit", Ser, Explicit, plain(Naive)),
            Scenario::read(
                "serialize_explicit_single_join",
                Ser,
                Explicit,
                with_extra(SingleJoin),
            ),
            Scenario::read(
                "serialize_explicit_batched",
                Ser,
                Explicit,
                with_extra(BatchedDeferred),
            ),
            Scenario::read("query_generic", Query, Generic, plain(Naive)),
            Scenario::read("query_generic_single_join", Query, Generic, plain(SingleJoin)),
            Scenario::read("query_generic_batched", Query, Generic, plain(BatchedDeferred)),
            Scenario::read("query_explicit", Query, Explicit, plain(Naive)),
            Scenario::read(
                "query_explicit_single_join",
                Query,
                Explicit,
                with_extra(SingleJoin),
            ),
            Scenario::read(
                "query_explicit_batched",
                Query,
                Explicit,
                with_extra(BatchedDeferred),
            ),
            faulting,
        ]
    }

    pub fn by_name(name: &str) -> TagResult<Scenario> {
        Self::catalog()
            .into_iter()
            .find(|scenario| scenario.name == name)
            .ok_or_else(|| TagError::UnknownScenario(name.to_string()))
    }

    pub fn strategy(&self) -> Option<Strategy> {
        self.plan.as_ref().map(|plan| plan.strategy)
    }
}

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub group: ScenarioGroup,
    pub encoding: Encoding,
    pub strategy: Option<Strategy>,
    /// Tags written (insert) or resolved (reads) per iteration.
    pub rows: usize,
    pub iterations: usize,
    pub queries_min: u64,
    pub queries_max: u64,
    /// Serialized JSON size per iteration; zero for other modes.
    pub output_bytes: usize,
    pub latency: LatencySummary,
    /// Statement sample from the first measured iteration (query-count mode).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statements: Vec<String>,
    /// Fault raised by an expected-fault scenario.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<String>,
}

impl ScenarioReport {
    fn new(scenario: &Scenario) -> Self {
        Self {
            name: scenario.name.to_string(),
            group: scenario.group,
            encoding: scenario.encoding,
            strategy: scenario.strategy(),
            rows: 0,
            iterations: 0,
            queries_min: 0,
            queries_max: 0,
            output_bytes: 0,
            latency: LatencySummary::default(),
            statements: Vec::new(),
            fault: None,
        }
    }

    /// Whether every iteration issued the same number of round trips.
    pub fn stable_queries(&self) -> bool {
        self.queries_min == self.queries_max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub config: BenchConfig,
    pub scenarios: Vec<ScenarioReport>,
}

impl SuiteReport {
    pub fn to_json_pretty(&self) -> TagResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Open a fresh store for `name`, replacing any file left by a previous run.
fn fresh_store(config: &BenchConfig, name: &str) -> TagResult<Store> {
    let mut store_config = config.store.clone();
    if let Some(dir) = &config.data_dir {
        let path = dir.join(format!("{name}.sqlite3"));
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        store_config.path = Some(path);
    }
    Ok(Store::open(store_config)?)
}

struct Tally {
    latency: LatencyRecorder,
    queries_min: u64,
    queries_max: u64,
    iterations: usize,
}

impl Tally {
    fn new() -> TagResult<Self> {
        Ok(Self {
            latency: LatencyRecorder::new()?,
            queries_min: u64::MAX,
            queries_max: 0,
            iterations: 0,
        })
    }

    fn record<T>(&mut self, measured: &Measured<T>) {
        self.latency.record(measured.elapsed);
        self.queries_min = self.queries_min.min(measured.queries);
        self.queries_max = self.queries_max.max(measured.queries);
        self.iterations += 1;
    }

    fn finish(self, report: &mut ScenarioReport) {
        report.iterations = self.iterations;
        report.queries_min = if self.iterations == 0 { 0 } else { self.queries_min };
        report.queries_max = self.queries_max;
        report.latency = self.latency.summary();
    }
}

pub fn run_scenario(
    scenario: &Scenario,
    registry: &KindRegistry,
    config: &BenchConfig,
) -> TagResult<ScenarioReport> {
    let mut report = ScenarioReport::new(scenario);
    let outcome = match &scenario.plan {
        None => run_insert(scenario, registry, config, &mut report),
        Some(plan) => run_read(scenario, plan, registry, config, &mut report),
    };

    match outcome {
        Ok(()) if scenario.expect_fault => {
            return Err(TagError::ExpectedFault(scenario.name.to_string()));
        }
        Ok(()) => {}
        Err(err @ TagError::MissingSatelliteRelation { .. }) if scenario.expect_fault => {
            tracing::info!(scenario = scenario.name, error = %err, "scenario faulted as expected");
            report.fault = Some(err.to_string());
            return Ok(report);
        }
        Err(err) => return Err(err),
    }

    tracing::info!(
        scenario = scenario.name,
        rows = report.rows,
        iterations = report.iterations,
        queries = report.queries_max,
        p50_us = report.latency.p50_us,
        "scenario finished"
    );
    Ok(report)
}

fn run_insert(
    scenario: &Scenario,
    registry: &KindRegistry,
    config: &BenchConfig,
    report: &mut ScenarioReport,
) -> TagResult<()> {
    let mut tally = Tally::new()?;
    for iteration in 0..config.warmup + config.iterations {
        let store = fresh_store(config, scenario.name)?;
        let seeded = fixtures::seed(&store, registry, config)?;
        let measured = measure(&store, || {
            fixtures::insert_tags(&store, &seeded, config, scenario.encoding)
        })?;
        report.rows = measured.result;
        if iteration >= config.warmup {
            tally.record(&measured);
        }
    }
    tally.finish(report);
    Ok(())
}

fn run_read(
    scenario: &Scenario,
    plan: &LoadPlan,
    registry: &KindRegistry,
    config: &BenchConfig,
    report: &mut ScenarioReport,
) -> TagResult<()> {
    let store = fresh_store(config, scenario.name)?;
    let seeded = fixtures::seed(&store, registry, config)?;
    fixtures::insert_tags(&store, &seeded, config, scenario.encoding)?;

    let mut tally = Tally::new()?;
    for iteration in 0..config.warmup + config.iterations {
        let measured = match scenario.mode {
            ScenarioMode::QueryCount => measure(&store, || {
                resolve_batch(&store, registry, scenario.encoding, plan).map(|rows| (rows.len(), 0))
            })?,
            _ => measure(&store, || {
                let records = serialize_batch(&store, registry, scenario.encoding, plan)?;
                let bytes = serializer::to_json_bytes(&records)?;
                Ok::<_, TagError>((records.len(), bytes.len()))
            })?,
        };
        (report.rows, report.output_bytes) = measured.result;
        if scenario.mode == ScenarioMode::QueryCount && report.statements.is_empty() {
            report.statements = measured
                .statements
                .iter()
                .take(STATEMENT_SAMPLE)
                .cloned()
                .collect();
        }
        if iteration >= config.warmup {
            tally.record(&measured);
        }
    }
    tally.finish(report);
    Ok(())
}

/// Run `scenarios` in order with one shared configuration.
pub fn run_suite(
    scenarios: &[Scenario],
    registry: &KindRegistry,
    config: &BenchConfig,
) -> TagResult<SuiteReport> {
    config.validate()?;
    let reports = scenarios
        .iter()
        .map(|scenario| run_scenario(scenario, registry, config))
        .collect::<TagResult<Vec<_>>>()?;
    Ok(SuiteReport {
        config: config.clone(),
        scenarios: reports,
    })
}
