//! Polymorphic tag references and the strategies that resolve them.
//!
//! ```text
//!   tag batch ──► Strategy ──► Resolver ──► Resolved ──► OutputRecord
//!                  │              │
//!                  │              └── KindRegistry (discriminant → fetcher,
//!                  │                                 satellite relations)
//!                  └── Preloaded (BatchedDeferred only: one grouped fetch
//!                                 per kind, built before any row resolves)
//! ```
//!
//! Two encodings are compared:
//! - **generic** tags carry `(kind_id, entity_id)` and dispatch through the
//!   registry at read time;
//! - **explicit** tags carry one nullable link per kind.
//!
//! Every strategy produces the same multiset of [`OutputRecord`]s; they only
//! differ in how many store round trips they issue. The [`harness`] measures
//! exactly that.

pub mod config;
pub mod fixtures;
pub mod harness;
pub mod loading;
pub mod reference;
pub mod registry;
pub mod resolver;
pub mod serializer;

#[cfg(test)]
mod tests;

pub use config::BenchConfig;
pub use fixtures::Seeded;
pub use harness::{
    measure, run_scenario, run_suite, LatencyRecorder, LatencySummary, Measured, Scenario,
    ScenarioGroup, ScenarioMode, ScenarioReport, SuiteReport,
};
pub use loading::{
    resolve_batch, resolve_explicit_batch, resolve_generic_batch, serialize_batch, LoadPlan,
    Preloaded, SatelliteRequest, Strategy,
};
pub use reference::{Encoding, RefTarget, Reference};
pub use registry::{KindEntry, KindRegistry, Satellite};
pub use resolver::{LoadedContext, Resolved, ResolvedEntity, Resolver};
pub use serializer::{serialize, serialize_all, OutputRecord};

use tagbench_store::{Kind, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum TagError {
    #[error("cannot find satellite relation '{relation}' on kind '{kind}'")]
    MissingSatelliteRelation { relation: Satellite, kind: Kind },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("histogram error: {0}")]
    Histogram(#[from] hdrhistogram::CreationError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown scenario '{0}'")]
    UnknownScenario(String),

    #[error("scenario '{0}' completed but was expected to fault")]
    ExpectedFault(String),
}

pub type TagResult<T> = Result<T, TagError>;
