//! Per-cell hashtag calls and their tabular output.

use crate::data::io::{create_writer, delimiter_for, finish_csv, open_reader};
use crate::error::{DemuxError, Result};
use crate::observe::DemuxObserver;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Label assigned to a cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HashId {
    /// No tag reliably detected.
    Negative,
    /// More than one tag detected.
    Doublet,
    /// Exactly one tag detected; holds the (possibly shortened) tag label.
    Tag(String),
}

impl HashId {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Negative => "Negative",
            Self::Doublet => "Doublet",
            Self::Tag(name) => name,
        }
    }

    pub fn is_singlet(&self) -> bool {
        matches!(self, Self::Tag(_))
    }
}

impl fmt::Display for HashId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Call for one cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellLabel {
    pub cell_id: String,
    pub hash_id: HashId,
    /// Co-positive tags, in column order, when `hash_id` is `Doublet` and the
    /// calling policy records them. Empty otherwise.
    pub doublet_info: Vec<String>,
}

impl CellLabel {
    pub fn new(cell_id: impl Into<String>, hash_id: HashId) -> Self {
        Self {
            cell_id: cell_id.into(),
            hash_id,
            doublet_info: Vec::new(),
        }
    }

    pub fn with_doublet_info(mut self, tags: Vec<String>) -> Self {
        self.doublet_info = tags;
        self
    }

    /// `Doublet_Info` cell text: tags joined by ", ".
    pub fn doublet_info_text(&self) -> String {
        self.doublet_info.join(", ")
    }
}

/// One label per input cell, in input row order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationTable {
    labels: Vec<CellLabel>,
    /// Whether the `Doublet_Info` column is part of this table's output.
    with_doublet_info: bool,
}

impl ClassificationTable {
    pub fn new(labels: Vec<CellLabel>, with_doublet_info: bool) -> Self {
        Self {
            labels,
            with_doublet_info,
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[CellLabel] {
        &self.labels
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellLabel> {
        self.labels.iter()
    }

    pub fn has_doublet_info(&self) -> bool {
        self.with_doublet_info
    }

    /// The label column, in row order.
    pub fn hash_ids(&self) -> Vec<&HashId> {
        self.labels.iter().map(|l| &l.hash_id).collect()
    }

    /// Label for a cell id, if present.
    pub fn get(&self, cell_id: &str) -> Option<&CellLabel> {
        self.labels.iter().find(|l| l.cell_id == cell_id)
    }

    /// Write as a delimited table indexed by cell id.
    ///
    /// Columns: index, `hashID`, and `Doublet_Info` when the policy records it.
    pub fn write_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter_for(path))
            .from_writer(create_writer(path)?);

        if self.with_doublet_info {
            writer.write_record(["", "hashID", "Doublet_Info"])?;
        } else {
            writer.write_record(["CB", "hashID"])?;
        }

        for label in &self.labels {
            if self.with_doublet_info {
                writer.write_record([
                    label.cell_id.as_str(),
                    label.hash_id.as_str(),
                    label.doublet_info_text().as_str(),
                ])?;
            } else {
                writer.write_record([label.cell_id.as_str(), label.hash_id.as_str()])?;
            }
        }
        finish_csv(writer)
    }
}

/// Inner-join the calls onto a dense gene-expression table and write the result.
///
/// The expression table's first column is the cell id. Output keeps its columns
/// and row order and appends `hashID`. Cells present on only one side are
/// dropped. Returns the number of rows written.
pub fn merge_expression<P: AsRef<Path>, Q: AsRef<Path>>(
    table: &ClassificationTable,
    expression_path: P,
    output_path: Q,
    observer: &dyn DemuxObserver,
) -> Result<usize> {
    let expression_path = expression_path.as_ref();
    let output_path = output_path.as_ref();

    let calls: HashMap<&str, &HashId> = table
        .iter()
        .map(|l| (l.cell_id.as_str(), &l.hash_id))
        .collect();

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_for(expression_path))
        .has_headers(true)
        .from_reader(open_reader(expression_path)?);
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter_for(output_path))
        .from_writer(create_writer(output_path)?);

    let header = reader.headers()?.clone();
    if header.is_empty() {
        return Err(DemuxError::EmptyData(
            "Expression table has no header".to_string(),
        ));
    }
    let n_genes = header.len() - 1;
    let mut out_header: Vec<&str> = header.iter().collect();
    out_header.push("hashID");
    writer.write_record(&out_header)?;

    let mut n_input = 0usize;
    let mut n_written = 0usize;
    for record in reader.records() {
        let record = record?;
        n_input += 1;
        let Some(hash_id) = calls.get(&record[0]) else {
            continue;
        };
        let mut row: Vec<&str> = record.iter().collect();
        row.push(hash_id.as_str());
        writer.write_record(&row)?;
        n_written += 1;
    }
    finish_csv(writer)?;

    observer.info(&format!(
        "Loaded transcript count matrix ({} x {})",
        n_input, n_genes
    ));
    observer.info(&format!(
        "Merged transcript count matrix with hashtag ({} x {})",
        n_written,
        n_genes + 1
    ));
    if n_written < n_input || n_written < table.len() {
        observer.debug(&format!(
            "Inner join dropped {} expression rows and {} classified cells",
            n_input - n_written,
            table.len().saturating_sub(n_written)
        ));
    }
    Ok(n_written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observe::NullObserver;
    use std::io::Write as _;
    use tempfile::tempdir;

    fn create_test_table(with_info: bool) -> ClassificationTable {
        ClassificationTable::new(
            vec![
                CellLabel::new("c1", HashId::Tag("HTO_1".into())),
                CellLabel::new("c2", HashId::Negative),
                CellLabel::new("c3", HashId::Doublet)
                    .with_doublet_info(vec!["HTO_1".into(), "HTO_2".into()]),
            ],
            with_info,
        )
    }

    #[test]
    fn test_hash_id_display() {
        assert_eq!(HashId::Negative.to_string(), "Negative");
        assert_eq!(HashId::Doublet.to_string(), "Doublet");
        assert_eq!(HashId::Tag("HTO-301".into()).to_string(), "HTO-301");
        assert!(HashId::Tag("x".into()).is_singlet());
    }

    #[test]
    fn test_write_tsv_with_doublet_info() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("classification.tsv");
        create_test_table(true).write_tsv(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "\thashID\tDoublet_Info");
        assert_eq!(lines[1], "c1\tHTO_1\t");
        assert_eq!(lines[2], "c2\tNegative\t");
        assert_eq!(lines[3], "c3\tDoublet\tHTO_1, HTO_2");
    }

    #[test]
    fn test_write_tsv_without_doublet_info() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("final-classification.tsv");
        create_test_table(false).write_tsv(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().next().unwrap(), "CB\thashID");
        assert_eq!(content.lines().count(), 4);
    }

    #[test]
    fn test_merge_expression_inner_join() {
        let dir = tempdir().unwrap();
        let genes = dir.path().join("genes.csv");
        let mut file = std::fs::File::create(&genes).unwrap();
        writeln!(file, ",GAPDH,ACTB").unwrap();
        writeln!(file, "c3,5,7").unwrap();
        writeln!(file, "c9,1,1").unwrap();
        writeln!(file, "c1,2,0").unwrap();
        drop(file);

        let out = dir.path().join("final-matrix.tsv");
        let n = merge_expression(&create_test_table(false), &genes, &out, &NullObserver).unwrap();
        assert_eq!(n, 2);

        let content = std::fs::read_to_string(&out).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines[0], "\tGAPDH\tACTB\thashID");
        assert_eq!(lines[1], "c3\t5\t7\tDoublet");
        assert_eq!(lines[2], "c1\t2\t0\tHTO_1");
    }
}
