//! Cell filtering ahead of clustering.

pub mod low_count;

pub use low_count::{filter_low_count, filter_low_count_with_matrix, LowCountFilterResult};
