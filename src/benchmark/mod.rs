//! Synthetic hashtag data for tests and benchmarks.

mod generate;

pub use generate::{
    generate_bimodal, generate_counts, generate_gamma_values, BimodalConfig, CountsConfig,
    SyntheticHto,
};
