//! Dense cell × hashtag matrix of HTO counts or normalized values.

use crate::data::io::{create_writer, delimiter_for, find_in_dir, finish_csv, open_reader};
use crate::error::{DemuxError, Result};
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::collections::HashSet;
use std::io::{BufRead, Read};
use std::path::Path;

/// Cells (rows) × hashtags (columns).
///
/// Values are raw non-negative counts or real numbers produced by an upstream
/// normalization. Row and column identifiers are each unique and the matrix is
/// fully dense.
#[derive(Debug, Clone)]
pub struct CountMatrix {
    /// Dense values (cells × tags).
    data: DMatrix<f64>,
    /// Cell identifiers (row names).
    cell_ids: Vec<String>,
    /// Hashtag names (column names).
    tag_ids: Vec<String>,
}

fn check_unique(ids: &[String], kind: &str) -> Result<()> {
    let mut seen = HashSet::with_capacity(ids.len());
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(DemuxError::DuplicateId {
                kind: kind.to_string(),
                id: id.clone(),
            });
        }
    }
    Ok(())
}

impl CountMatrix {
    /// Create a new CountMatrix, checking shape and identifier uniqueness.
    pub fn new(data: DMatrix<f64>, cell_ids: Vec<String>, tag_ids: Vec<String>) -> Result<Self> {
        let (nrows, ncols) = data.shape();
        if nrows != cell_ids.len() {
            return Err(DemuxError::ShapeMismatch {
                what: "cell identifiers".to_string(),
                expected: nrows,
                actual: cell_ids.len(),
            });
        }
        if ncols != tag_ids.len() {
            return Err(DemuxError::ShapeMismatch {
                what: "tag identifiers".to_string(),
                expected: ncols,
                actual: tag_ids.len(),
            });
        }
        check_unique(&cell_ids, "cell")?;
        check_unique(&tag_ids, "tag")?;
        Ok(Self {
            data,
            cell_ids,
            tag_ids,
        })
    }

    /// Build from row-major values, one inner vector per cell.
    pub fn from_rows(rows: &[Vec<f64>], cell_ids: Vec<String>, tag_ids: Vec<String>) -> Result<Self> {
        let n_tags = tag_ids.len();
        for (i, row) in rows.iter().enumerate() {
            if row.len() != n_tags {
                return Err(DemuxError::ShapeMismatch {
                    what: format!("row {}", i),
                    expected: n_tags,
                    actual: row.len(),
                });
            }
        }
        let data = DMatrix::from_fn(rows.len(), n_tags, |i, j| rows[i][j]);
        Self::new(data, cell_ids, tag_ids)
    }

    /// Load a dense table: header is an index name followed by tag names,
    /// each following line is a cell id followed by one value per tag.
    ///
    /// Tab separated unless the file name ends in `.csv` (optionally `.gz`).
    pub fn from_table<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let reader = open_reader(path)?;
        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(delimiter_for(path))
            .has_headers(true)
            .from_reader(reader);

        let header = csv_reader.headers()?.clone();
        if header.len() < 2 {
            return Err(DemuxError::EmptyData(
                "Table must have at least one tag column".to_string(),
            ));
        }
        let tag_ids: Vec<String> = header.iter().skip(1).map(|s| s.to_string()).collect();

        let mut cell_ids = Vec::new();
        let mut values = Vec::new();
        for (row_idx, record) in csv_reader.records().enumerate() {
            let record = record?;
            if record.len() != tag_ids.len() + 1 {
                return Err(DemuxError::ShapeMismatch {
                    what: format!("row {}", row_idx),
                    expected: tag_ids.len() + 1,
                    actual: record.len(),
                });
            }
            cell_ids.push(record[0].to_string());
            for (col_idx, field) in record.iter().skip(1).enumerate() {
                let value: f64 = field.trim().parse().map_err(|_| DemuxError::InvalidValue {
                    value: field.to_string(),
                    row: row_idx,
                    col: col_idx,
                })?;
                values.push(value);
            }
        }

        if cell_ids.is_empty() {
            return Err(DemuxError::EmptyData("No cells in table".to_string()));
        }

        let data = DMatrix::from_row_slice(cell_ids.len(), tag_ids.len(), &values);
        Self::new(data, cell_ids, tag_ids)
    }

    /// Load a 10x-style directory: `matrix.mtx`, `barcodes.tsv`, `features.tsv`,
    /// each optionally gzipped. The Matrix Market file is tags × cells and is
    /// transposed on load.
    pub fn from_mtx_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let (shape, entries) = read_mtx_entries(open_reader(find_in_dir(dir, "matrix.mtx"))?)?;

        let cell_ids = read_id_list(&find_in_dir(dir, "barcodes.tsv"))?;
        let tag_ids = read_id_list(&find_in_dir(dir, "features.tsv"))?;

        let (n_tags, n_cells) = shape;
        if n_cells != cell_ids.len() {
            return Err(DemuxError::ShapeMismatch {
                what: "barcodes".to_string(),
                expected: n_cells,
                actual: cell_ids.len(),
            });
        }
        if n_tags != tag_ids.len() {
            return Err(DemuxError::ShapeMismatch {
                what: "features".to_string(),
                expected: n_tags,
                actual: tag_ids.len(),
            });
        }

        let mut data = DMatrix::zeros(n_cells, n_tags);
        for (tag, cell, value) in entries {
            data[(cell, tag)] += value;
        }

        Self::new(data, cell_ids, tag_ids)
    }

    /// Get the value at (cell, tag).
    #[inline]
    pub fn get(&self, cell: usize, tag: usize) -> f64 {
        self.data[(cell, tag)]
    }

    /// Number of cells (rows).
    #[inline]
    pub fn n_cells(&self) -> usize {
        self.data.nrows()
    }

    /// Number of tags (columns).
    #[inline]
    pub fn n_tags(&self) -> usize {
        self.data.ncols()
    }

    #[inline]
    pub fn cell_ids(&self) -> &[String] {
        &self.cell_ids
    }

    #[inline]
    pub fn tag_ids(&self) -> &[String] {
        &self.tag_ids
    }

    #[inline]
    pub fn data(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Values of one cell across all tags.
    pub fn row(&self, cell: usize) -> Vec<f64> {
        self.data.row(cell).iter().copied().collect()
    }

    /// Values of one tag across all cells.
    pub fn column(&self, tag: usize) -> Vec<f64> {
        self.data.column(tag).iter().copied().collect()
    }

    /// Total signal per cell.
    pub fn row_totals(&self) -> Vec<f64> {
        (0..self.n_cells())
            .into_par_iter()
            .map(|i| self.data.row(i).sum())
            .collect()
    }

    /// Index of the largest value per cell; the first column wins ties.
    pub fn row_argmax(&self) -> Vec<usize> {
        (0..self.n_cells())
            .map(|i| argmax_first(self.data.row(i).iter().copied()))
            .collect()
    }

    /// Keep only the given cells (by index), in the given order.
    pub fn subset_cells(&self, indices: &[usize]) -> Result<Self> {
        for &idx in indices {
            if idx >= self.n_cells() {
                return Err(DemuxError::Pipeline(format!(
                    "Cell index {} out of bounds",
                    idx
                )));
            }
        }
        let data = self.data.select_rows(indices);
        let cell_ids = indices.iter().map(|&i| self.cell_ids[i].clone()).collect();
        Self::new(data, cell_ids, self.tag_ids.clone())
    }

    /// Keep cells listed in `whitelist`, preserving matrix order.
    ///
    /// Returns the subset together with whitelist entries absent from the matrix.
    pub fn subset_whitelist(&self, whitelist: &[String]) -> Result<(Self, Vec<String>)> {
        let wanted: HashSet<&str> = whitelist.iter().map(|s| s.as_str()).collect();
        let keep: Vec<usize> = self
            .cell_ids
            .iter()
            .enumerate()
            .filter(|(_, id)| wanted.contains(id.as_str()))
            .map(|(i, _)| i)
            .collect();
        let present: HashSet<&str> = self.cell_ids.iter().map(|s| s.as_str()).collect();
        let missing = whitelist
            .iter()
            .filter(|id| !present.contains(id.as_str()))
            .cloned()
            .collect();
        Ok((self.subset_cells(&keep)?, missing))
    }

    /// Drop the tag column called `name`, if there is one.
    pub fn without_tag(&self, name: &str) -> Result<Self> {
        match self.tag_ids.iter().position(|t| t == name) {
            None => Ok(self.clone()),
            Some(drop) => {
                let keep: Vec<usize> = (0..self.n_tags()).filter(|&j| j != drop).collect();
                let data = self.data.select_columns(&keep);
                let tag_ids = keep.iter().map(|&j| self.tag_ids[j].clone()).collect();
                Self::new(data, self.cell_ids.clone(), tag_ids)
            }
        }
    }

    /// Same identifiers, new values (e.g. after normalization).
    pub fn with_data(&self, data: DMatrix<f64>) -> Result<Self> {
        Self::new(data, self.cell_ids.clone(), self.tag_ids.clone())
    }

    /// Write in the layout read by [`CountMatrix::from_table`], with
    /// `index_name` as the first header field.
    pub fn write_table<P: AsRef<Path>>(&self, path: P, index_name: &str) -> Result<()> {
        let path = path.as_ref();
        let mut writer = csv::WriterBuilder::new()
            .delimiter(delimiter_for(path))
            .from_writer(create_writer(path)?);

        let mut header = Vec::with_capacity(self.n_tags() + 1);
        header.push(index_name.to_string());
        header.extend(self.tag_ids.iter().cloned());
        writer.write_record(&header)?;

        for (i, cell_id) in self.cell_ids.iter().enumerate() {
            let mut record = Vec::with_capacity(self.n_tags() + 1);
            record.push(cell_id.clone());
            record.extend(self.data.row(i).iter().map(|v| v.to_string()));
            writer.write_record(&record)?;
        }
        finish_csv(writer)
    }
}

type MtxEntries = ((usize, usize), Vec<(usize, usize, f64)>);

/// Matrix Market triplets as f64. Count matrices are usually declared
/// `integer`, which sprs only reads into an integer matrix.
fn read_mtx_entries<R: BufRead>(mut reader: R) -> Result<MtxEntries> {
    let mut header = String::new();
    reader.read_line(&mut header)?;
    let is_integer = header.to_ascii_lowercase().contains("integer");
    let mut reader = header.as_bytes().chain(reader);

    if is_integer {
        let triplets: sprs::TriMat<i64> = sprs::io::read_matrix_market_from_bufread(&mut reader)
            .map_err(|e| DemuxError::MatrixMarket(e.to_string()))?;
        Ok(collect_triplets(&triplets, |v| v as f64))
    } else {
        let triplets: sprs::TriMat<f64> = sprs::io::read_matrix_market_from_bufread(&mut reader)
            .map_err(|e| DemuxError::MatrixMarket(e.to_string()))?;
        Ok(collect_triplets(&triplets, |v| v))
    }
}

fn collect_triplets<N: Copy>(triplets: &sprs::TriMat<N>, to_f64: impl Fn(N) -> f64) -> MtxEntries {
    let entries = triplets
        .row_inds()
        .iter()
        .zip(triplets.col_inds())
        .zip(triplets.data())
        .map(|((&row, &col), &value)| (row, col, to_f64(value)))
        .collect();
    (triplets.shape(), entries)
}

/// First index of the maximum; NaN values never win.
pub(crate) fn argmax_first<I: IntoIterator<Item = f64>>(values: I) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, v) in values.into_iter().enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}

/// First column of every non-empty line, as in 10x barcode/feature lists.
pub fn read_id_list(path: &Path) -> Result<Vec<String>> {
    let reader = open_reader(path)?;
    let mut ids = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let first = line.split('\t').next().unwrap_or_default();
        ids.push(first.trim().to_string());
    }
    Ok(ids)
}
