//! Benchmark configuration.

use crate::{TagError, TagResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tagbench_store::StoreConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    /// Entities seeded per kind.
    pub per_kind: usize,
    /// Measured iterations per scenario.
    pub iterations: usize,
    /// Unmeasured iterations run first.
    pub warmup: usize,
    /// The last `missing_extras` `profile_b` rows get no extension.
    pub missing_extras: usize,
    /// Extra generic tags pointing past the last id of each kind.
    pub dangling_refs: usize,
    /// Extra generic tags whose kind has no registry entry.
    pub unregistered_refs: usize,
    /// Extra explicit tags with no link populated.
    pub empty_explicit: usize,
    /// Directory for file-backed scenario stores. `None` keeps them in memory.
    pub data_dir: Option<PathBuf>,
    pub store: StoreConfig,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            per_kind: 100,
            iterations: 20,
            warmup: 1,
            missing_extras: 0,
            dangling_refs: 0,
            unregistered_refs: 0,
            empty_explicit: 0,
            data_dir: None,
            store: StoreConfig::default(),
        }
    }
}

impl BenchConfig {
    pub fn from_json_file(path: &Path) -> TagResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: BenchConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TagResult<()> {
        if self.iterations == 0 {
            return Err(TagError::Config("iterations must be at least 1".to_string()));
        }
        if self.missing_extras > self.per_kind {
            return Err(TagError::Config(format!(
                "missing_extras ({}) exceeds per_kind ({})",
                self.missing_extras, self.per_kind
            )));
        }
        if self.store.insert_chunk_rows == 0 {
            return Err(TagError::Config(
                "store.insert_chunk_rows must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
