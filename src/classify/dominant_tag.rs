//! Dominant-tag group membership.
//!
//! Each cell's own tag values were split into two groups. The call walks four
//! stages: find the tag with the largest raw count, read that tag's group,
//! count the tags sharing the group, then label. Two or more tags in the
//! dominant tag's group make a `Doublet`; this policy never records which tags
//! were involved.

use crate::data::count_matrix::argmax_first;
use crate::data::{CellLabel, ClassificationTable, CountMatrix, HashId};
use crate::error::{DemuxError, Result};

/// Tag label under the whitelist naming convention: text before the first
/// `-`, with `_` turned into `-` (`HTO_301-ACCCACCAGTAAGAC` -> `HTO-301`).
pub fn legacy_tag_name(name: &str) -> String {
    name.split('-').next().unwrap_or(name).replace('_', "-")
}

/// One cell's progress through the dominant-tag call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallState {
    /// Nothing inspected yet.
    Start,
    /// Column holding the largest raw count.
    Dominant { idmax: usize },
    /// Group the dominant tag was assigned to for this cell.
    Grouped { idmax: usize, group: usize },
    /// Number of tags in that same group, dominant tag included.
    Counted { idmax: usize, members: usize },
    /// Final label.
    Labelled(HashId),
}

impl CallState {
    /// Advance one stage.
    ///
    /// `counts` are the cell's raw values and `groups` its per-tag group ids,
    /// both in column order; `tag_names` are the output labels per column.
    pub fn step(self, counts: &[f64], groups: &[usize], tag_names: &[String]) -> Result<Self> {
        match self {
            Self::Start => {
                if counts.is_empty() {
                    return Err(DemuxError::EmptyData(
                        "Cell has no tag values".to_string(),
                    ));
                }
                Ok(Self::Dominant {
                    idmax: argmax_first(counts.iter().copied()),
                })
            }
            Self::Dominant { idmax } => {
                let group = *groups.get(idmax).ok_or_else(|| DemuxError::ShapeMismatch {
                    what: "cell group assignment".to_string(),
                    expected: counts.len(),
                    actual: groups.len(),
                })?;
                Ok(Self::Grouped { idmax, group })
            }
            Self::Grouped { idmax, group } => Ok(Self::Counted {
                idmax,
                members: groups.iter().filter(|&&g| g == group).count(),
            }),
            Self::Counted { idmax, members } => {
                if members >= 2 {
                    Ok(Self::Labelled(HashId::Doublet))
                } else {
                    let name = tag_names.get(idmax).ok_or_else(|| DemuxError::ShapeMismatch {
                        what: "tag names".to_string(),
                        expected: counts.len(),
                        actual: tag_names.len(),
                    })?;
                    Ok(Self::Labelled(HashId::Tag(name.clone())))
                }
            }
            Self::Labelled(label) => Ok(Self::Labelled(label)),
        }
    }
}

/// Run every stage for one cell.
pub fn call_dominant_tag(counts: &[f64], groups: &[usize], tag_names: &[String]) -> Result<HashId> {
    if counts.len() != groups.len() {
        return Err(DemuxError::ShapeMismatch {
            what: "cell group assignment".to_string(),
            expected: counts.len(),
            actual: groups.len(),
        });
    }
    let mut state = CallState::Start;
    loop {
        state = state.step(counts, groups, tag_names)?;
        if let CallState::Labelled(label) = state {
            return Ok(label);
        }
    }
}

/// Classify every cell of `counts` from its own row partition.
///
/// `row_groups[i]` holds the group id of each tag for cell `i`.
pub fn classify_dominant_tag(
    counts: &CountMatrix,
    row_groups: &[Vec<usize>],
) -> Result<ClassificationTable> {
    if row_groups.len() != counts.n_cells() {
        return Err(DemuxError::ShapeMismatch {
            what: "row partitions".to_string(),
            expected: counts.n_cells(),
            actual: row_groups.len(),
        });
    }
    let tag_names: Vec<String> = counts.tag_ids().iter().map(|t| legacy_tag_name(t)).collect();

    let labels = counts
        .cell_ids()
        .iter()
        .zip(row_groups)
        .enumerate()
        .map(|(i, (cell_id, groups))| {
            let hash_id = call_dominant_tag(&counts.row(i), groups, &tag_names)?;
            Ok(CellLabel::new(cell_id.clone(), hash_id))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ClassificationTable::new(labels, false))
}
