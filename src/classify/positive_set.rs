//! Positive-set voting.
//!
//! Each tag was partitioned across all cells. A cell's label depends only on
//! how many tags placed it in their signal group.

use crate::cluster::PartitionResult;
use crate::data::{CellLabel, ClassificationTable, HashId};
use crate::error::{DemuxError, Result};

/// First `width` characters of a tag name; `0` keeps the whole name.
pub fn truncate_label(name: &str, width: usize) -> String {
    if width == 0 {
        name.to_string()
    } else {
        name.chars().take(width).collect()
    }
}

/// Label one cell from the tags it was positive for, in column order.
///
/// Returns the label and the doublet info (empty unless `Doublet`).
pub fn call_positive_set(positive_tags: &[&str], label_width: usize) -> (HashId, Vec<String>) {
    match positive_tags {
        [] => (HashId::Negative, Vec::new()),
        [single] => (HashId::Tag(truncate_label(single, label_width)), Vec::new()),
        many => (
            HashId::Doublet,
            many.iter().map(|t| t.to_string()).collect(),
        ),
    }
}

/// Classify every cell from one column partition per tag.
///
/// `partitions[j]` must hold the partition of tag `tag_ids[j]` over all
/// `cell_ids`.
pub fn classify_positive_set(
    cell_ids: &[String],
    tag_ids: &[String],
    partitions: &[PartitionResult],
    label_width: usize,
) -> Result<ClassificationTable> {
    if partitions.len() != tag_ids.len() {
        return Err(DemuxError::ShapeMismatch {
            what: "tag partitions".to_string(),
            expected: tag_ids.len(),
            actual: partitions.len(),
        });
    }
    for partition in partitions {
        if partition.labels.len() != cell_ids.len() {
            return Err(DemuxError::ShapeMismatch {
                what: "partition labels".to_string(),
                expected: cell_ids.len(),
                actual: partition.labels.len(),
            });
        }
    }

    let labels = cell_ids
        .iter()
        .enumerate()
        .map(|(i, cell_id)| {
            let positive: Vec<&str> = tag_ids
                .iter()
                .zip(partitions)
                .filter(|(_, p)| p.is_positive(i))
                .map(|(tag, _)| tag.as_str())
                .collect();
            let (hash_id, info) = call_positive_set(&positive, label_width);
            CellLabel::new(cell_id.clone(), hash_id).with_doublet_info(info)
        })
        .collect();

    Ok(ClassificationTable::new(labels, true))
}
