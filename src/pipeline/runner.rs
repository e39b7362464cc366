//! Pipeline runner: partition, classify and summarise one matrix.

use crate::classify::{classify_dominant_tag, classify_positive_set, ClassificationPolicy};
use crate::cluster::{partition_values, PartitionMetrics, PartitionResult};
use crate::data::{CellLabel, ClassificationTable, CountMatrix, HashId};
use crate::error::{DemuxError, Result};
use crate::filter::{filter_low_count, LowCountFilterResult};
use crate::normalize::normalize;
use crate::observe::DemuxObserver;
use crate::pipeline::DemuxConfig;
use crate::report::{write_stats, StatsReport};
use indexmap::IndexMap;
use rayon::prelude::*;

/// Output of one demultiplexing run.
#[derive(Debug, Clone)]
pub struct DemuxResult {
    /// One label per input cell, in input order.
    pub table: ClassificationTable,
    /// Per-tag partition metrics, in column order. Empty for dominant-tag runs.
    pub metrics: IndexMap<String, PartitionMetrics>,
    /// Low-count filter outcome, for dominant-tag runs.
    pub filter: Option<LowCountFilterResult>,
}

impl DemuxResult {
    /// Label counts plus metrics.
    pub fn report(&self) -> StatsReport {
        write_stats(&self.table, self.metrics.clone())
    }
}

impl DemuxConfig {
    /// Run the configured policy on `matrix`.
    pub fn run(&self, matrix: &CountMatrix, observer: &dyn DemuxObserver) -> Result<DemuxResult> {
        demux(matrix, self, observer)
    }
}

/// Dispatch on `config.policy`.
pub fn demux(
    matrix: &CountMatrix,
    config: &DemuxConfig,
    observer: &dyn DemuxObserver,
) -> Result<DemuxResult> {
    match config.policy {
        ClassificationPolicy::PositiveSet => demux_positive_set(matrix, config, observer),
        ClassificationPolicy::DominantTag => demux_dominant_tag(matrix, config, observer),
    }
}

fn ensure_not_empty(matrix: &CountMatrix) -> Result<()> {
    if matrix.n_cells() == 0 || matrix.n_tags() == 0 {
        return Err(DemuxError::EmptyData(format!(
            "Cannot demultiplex a {} x {} matrix",
            matrix.n_cells(),
            matrix.n_tags()
        )));
    }
    Ok(())
}

/// Policy A: partition every tag column across all cells, then vote.
///
/// The matrix is used as given (already normalized upstream).
pub fn demux_positive_set(
    matrix: &CountMatrix,
    config: &DemuxConfig,
    observer: &dyn DemuxObserver,
) -> Result<DemuxResult> {
    config.validate()?;
    ensure_not_empty(matrix)?;
    let params = config.cluster_params();

    observer.info(&format!(
        "Running {} on {} cells x {} tags",
        config.method,
        matrix.n_cells(),
        matrix.n_tags()
    ));

    let partitions: Vec<PartitionResult> = (0..matrix.n_tags())
        .into_par_iter()
        .map(|j| partition_values(&matrix.column(j), config.method, &params))
        .collect::<Result<Vec<_>>>()?;

    let mut metrics = IndexMap::with_capacity(matrix.n_tags());
    for (tag, partition) in matrix.tag_ids().iter().zip(&partitions) {
        if partition.metrics.is_degraded() {
            observer.warn(&format!(
                "Tag {} collapsed to a single group; metrics are degraded",
                tag
            ));
        }
        let n_positive = partition.positive_mask().iter().filter(|&&m| m == 1).count();
        observer.debug(&format!("{}: {} positive cells", tag, n_positive));
        metrics.insert(tag.clone(), partition.metrics.clone());
    }

    let table = classify_positive_set(
        matrix.cell_ids(),
        matrix.tag_ids(),
        &partitions,
        config.label_width,
    )?;

    Ok(DemuxResult {
        table,
        metrics,
        filter: None,
    })
}

/// Policy B: drop the unmapped column, set low-count cells aside, normalize,
/// partition each cell's own tag values, then call by the dominant tag.
///
/// Cells removed by the low-count filter are `Negative` and are merged back
/// in their original position.
pub fn demux_dominant_tag(
    matrix: &CountMatrix,
    config: &DemuxConfig,
    observer: &dyn DemuxObserver,
) -> Result<DemuxResult> {
    config.validate()?;
    observer.info(&format!(
        "Loaded HTO UMI count matrix ({} x {})",
        matrix.n_cells(),
        matrix.n_tags()
    ));

    let raw = matrix.without_tag(&config.unmapped_tag)?;
    if raw.n_tags() < matrix.n_tags() {
        observer.debug(&format!("Dropped tag column '{}'", config.unmapped_tag));
    }
    ensure_not_empty(&raw)?;

    let filter = filter_low_count(&raw, config.min_total_count)?;
    if filter.n_filtered() > 0 {
        observer.info(&format!(
            "{} cells with total count <= {} set to Negative",
            filter.n_filtered(),
            config.min_total_count
        ));
    }
    let kept = raw.subset_cells(&filter.kept)?;

    let mut called: Vec<Option<HashId>> = vec![None; raw.n_cells()];
    if kept.n_cells() > 0 {
        observer.info(&format!("Computing {}...", config.normalization));
        let normalized = normalize(&kept, config.normalization)?;

        observer.info(&format!("Running {} per cell...", config.method));
        let params = config.cluster_params();
        let partitions: Vec<PartitionResult> = (0..normalized.n_cells())
            .into_par_iter()
            .map(|i| partition_values(&normalized.row(i), config.method, &params))
            .collect::<Result<Vec<_>>>()?;

        let n_degraded = partitions.iter().filter(|p| p.metrics.is_degraded()).count();
        if n_degraded > 0 {
            observer.warn(&format!(
                "{} cells have uniform tag values; their split is degraded",
                n_degraded
            ));
        }

        let row_groups: Vec<Vec<usize>> = partitions.into_iter().map(|p| p.labels).collect();
        let kept_table = classify_dominant_tag(&kept, &row_groups)?;
        for (&row, label) in filter.kept.iter().zip(kept_table.labels()) {
            called[row] = Some(label.hash_id.clone());
        }
    }

    let labels: Vec<CellLabel> = raw
        .cell_ids()
        .iter()
        .zip(called)
        .map(|(cell_id, hash_id)| {
            CellLabel::new(cell_id.clone(), hash_id.unwrap_or(HashId::Negative))
        })
        .collect();
    let table = ClassificationTable::new(labels, false);

    Ok(DemuxResult {
        table,
        metrics: IndexMap::new(),
        filter: Some(filter),
    })
}
