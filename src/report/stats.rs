//! Stats report: label counts plus passthrough partition metrics.

use crate::cluster::PartitionMetrics;
use crate::data::ClassificationTable;
use crate::data::io::create_writer;
use crate::error::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// Key holding the number of classified cells.
pub const TOTAL_KEY: &str = "Total";

/// Summary written at the end of a run.
///
/// Keys serialize in insertion order: `stats` lists the distinct labels
/// sorted by name, then [`TOTAL_KEY`]; `metrics` follows tag column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub stats: IndexMap<String, usize>,
    pub metrics: IndexMap<String, PartitionMetrics>,
}

/// Count cells per label and attach the per-tag metrics.
pub fn write_stats(
    table: &ClassificationTable,
    metrics: IndexMap<String, PartitionMetrics>,
) -> StatsReport {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for label in table.iter() {
        *counts.entry(label.hash_id.as_str().to_string()).or_insert(0) += 1;
    }

    let mut stats: IndexMap<String, usize> = counts.into_iter().collect();
    stats.insert(TOTAL_KEY.to_string(), table.len());

    StatsReport { stats, metrics }
}

impl StatsReport {
    pub fn total(&self) -> usize {
        self.stats.get(TOTAL_KEY).copied().unwrap_or(0)
    }

    /// Cells carrying `label`, 0 if absent.
    pub fn count(&self, label: &str) -> usize {
        self.stats.get(label).copied().unwrap_or(0)
    }

    /// Tags whose partition metrics are flagged as degraded.
    pub fn degraded_tags(&self) -> Vec<&str> {
        self.metrics
            .iter()
            .filter(|(_, m)| m.is_degraded())
            .map(|(tag, _)| tag.as_str())
            .collect()
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write as JSON for `.json` paths, YAML otherwise.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let text = if is_json { self.to_json()? } else { self.to_yaml()? };

        let mut writer = create_writer(path)?;
        writer.write_all(text.as_bytes())?;
        writer.finish()
    }
}
