//! Data structures for hashtag demultiplexing.

pub mod classification;
pub mod count_matrix;
pub mod io;

pub use classification::{merge_expression, CellLabel, ClassificationTable, HashId};
pub use count_matrix::{read_id_list, CountMatrix};
