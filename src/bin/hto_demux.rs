//! hto-demux - Hashtag Oligo Demultiplexing CLI
//!
//! Command-line interface for calling single cells as singlet, doublet or
//! negative from their HTO counts.

use clap::{Parser, Subcommand};
use hto_demux::benchmark::{generate_bimodal, generate_counts, BimodalConfig, CountsConfig};
use hto_demux::classify::ClassificationPolicy;
use hto_demux::cluster::ClusterMethod;
use hto_demux::data::{merge_expression, read_id_list, CountMatrix};
use hto_demux::error::Result;
use hto_demux::normalize::NormalizationMode;
use hto_demux::observe::{DemuxObserver, LogObserver};
use hto_demux::pipeline::{DemuxConfig, DemuxResult};
use std::path::{Path, PathBuf};

/// Hashtag oligo demultiplexing
#[derive(Parser)]
#[command(name = "hto-demux")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Positive-set calling on an already normalized cell x HTO table
    Dsb {
        /// Dense table: first column cell id, one column per HTO
        #[arg(short, long)]
        input: PathBuf,

        /// Partitioning method: kmeans or gmm
        #[arg(short, long, default_value = "kmeans")]
        method: String,

        /// Keep only cells listed in this file (one id per line)
        #[arg(short, long)]
        whitelist: Option<PathBuf>,

        /// Characters of the tag name kept in singlet labels (0 = all)
        #[arg(long, default_value = "5")]
        label_width: usize,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Dominant-tag calling on a raw HTO UMI count directory
    Counts {
        /// Directory with matrix.mtx(.gz), barcodes.tsv(.gz), features.tsv(.gz)
        #[arg(long)]
        hto_umi_count_dir: PathBuf,

        /// Dense cell x gene table to join the calls onto
        #[arg(long)]
        dense_count_matrix: Option<PathBuf>,

        /// Partitioning method: kmeans or gmm
        #[arg(short, long, default_value = "kmeans")]
        method: String,

        /// 1 = CLR, 2 = noise-floor CLR, 3 = ratio rescue
        #[arg(short, long, default_value = "1")]
        normalization: u8,

        /// Cells with total count at or below this are Negative
        #[arg(long, default_value = "0")]
        min_total_count: u64,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Run from a YAML configuration file
    Run {
        /// Path to configuration YAML
        #[arg(short, long)]
        config: PathBuf,

        /// Dense table, or a Matrix Market directory
        #[arg(short, long)]
        input: PathBuf,

        /// Dense cell x gene table to join the calls onto
        #[arg(long)]
        dense_count_matrix: Option<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
    },

    /// Write an example configuration YAML
    Example {
        /// Output path
        #[arg(short, long, default_value = "hto-demux.yaml")]
        output: PathBuf,
    },

    /// Write a synthetic HTO table with known labels
    Simulate {
        /// Output table path (.tsv, .csv, optionally .gz)
        #[arg(short, long)]
        output: PathBuf,

        /// Raw UMI counts (dominant-tag input) instead of normalized values
        #[arg(long)]
        counts: bool,

        /// Number of cells
        #[arg(long, default_value = "1000")]
        cells: usize,

        /// Number of tags
        #[arg(long, default_value = "3")]
        tags: usize,

        /// Random seed
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_target(false)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Dsb {
            input,
            method,
            whitelist,
            label_width,
            seed,
            output_dir,
        } => cmd_dsb(
            &input,
            &method,
            whitelist.as_deref(),
            label_width,
            seed,
            &output_dir,
        ),

        Commands::Counts {
            hto_umi_count_dir,
            dense_count_matrix,
            method,
            normalization,
            min_total_count,
            seed,
            output_dir,
        } => cmd_counts(
            &hto_umi_count_dir,
            dense_count_matrix.as_deref(),
            &method,
            normalization,
            min_total_count,
            seed,
            &output_dir,
        ),

        Commands::Run {
            config,
            input,
            dense_count_matrix,
            output_dir,
        } => cmd_run(&config, &input, dense_count_matrix.as_deref(), &output_dir),

        Commands::Example { output } => cmd_example(&output),

        Commands::Simulate {
            output,
            counts,
            cells,
            tags,
            seed,
        } => cmd_simulate(&output, counts, cells, tags, seed),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_matrix(input: &Path) -> Result<CountMatrix> {
    if input.is_dir() {
        CountMatrix::from_mtx_dir(input)
    } else {
        CountMatrix::from_table(input)
    }
}

/// Write calls, optional expression join, and stats; nothing is written if
/// the run failed earlier.
fn write_outputs(
    result: &DemuxResult,
    config: &DemuxConfig,
    expression: Option<&Path>,
    output_dir: &Path,
    observer: &dyn DemuxObserver,
) -> Result<()> {
    std::fs::create_dir_all(output_dir)?;

    let (classification_name, merged_name) = match config.policy {
        ClassificationPolicy::PositiveSet => ("classification.tsv.gz", "matrix.tsv.gz"),
        ClassificationPolicy::DominantTag => {
            ("final-classification.tsv.gz", "final-matrix.tsv.gz")
        }
    };

    let classification_path = output_dir.join(classification_name);
    log::info!("Writing calls to {:?}...", classification_path);
    result.table.write_tsv(&classification_path)?;

    if let Some(expression) = expression {
        let merged_path = output_dir.join(merged_name);
        log::info!("Writing the full dense count matrix with hashtag...");
        merge_expression(&result.table, expression, &merged_path, observer)?;
    }

    let report = result.report();
    let stats_path = output_dir.join("stats.yml");
    report.write(&stats_path)?;

    log::info!("Done! {} cells classified", report.total());
    for (label, count) in &report.stats {
        log::info!("  {}: {}", label, count);
    }
    Ok(())
}

fn cmd_dsb(
    input: &Path,
    method: &str,
    whitelist: Option<&Path>,
    label_width: usize,
    seed: u64,
    output_dir: &Path,
) -> Result<()> {
    let config = DemuxConfig::new()
        .method(method.parse::<ClusterMethod>()?)
        .policy(ClassificationPolicy::PositiveSet)
        .label_width(label_width)
        .seed(seed);
    config.validate()?;
    let observer = LogObserver;

    log::info!("Loading {:?}...", input);
    let mut matrix = CountMatrix::from_table(input)?;
    log::info!(
        "Loaded {} cells x {} tags",
        matrix.n_cells(),
        matrix.n_tags()
    );

    if let Some(whitelist) = whitelist {
        let ids = read_id_list(whitelist)?;
        let (subset, missing) = matrix.subset_whitelist(&ids)?;
        if !missing.is_empty() {
            log::warn!("{} whitelisted cells are not in the matrix", missing.len());
        }
        log::info!("Kept {} whitelisted cells", subset.n_cells());
        matrix = subset;
    }

    let result = config.run(&matrix, &observer)?;
    write_outputs(&result, &config, None, output_dir, &observer)
}

fn cmd_counts(
    count_dir: &Path,
    expression: Option<&Path>,
    method: &str,
    normalization: u8,
    min_total_count: u64,
    seed: u64,
    output_dir: &Path,
) -> Result<()> {
    let config = DemuxConfig::new()
        .method(method.parse::<ClusterMethod>()?)
        .policy(ClassificationPolicy::DominantTag)
        .normalization(NormalizationMode::try_from(normalization)?)
        .min_total_count(min_total_count)
        .seed(seed);
    config.validate()?;
    let observer = LogObserver;

    let matrix = CountMatrix::from_mtx_dir(count_dir)?;
    let result = config.run(&matrix, &observer)?;
    write_outputs(&result, &config, expression, output_dir, &observer)
}

fn cmd_run(
    config_path: &Path,
    input: &Path,
    expression: Option<&Path>,
    output_dir: &Path,
) -> Result<()> {
    log::info!("Loading configuration from {:?}...", config_path);
    let config_str = std::fs::read_to_string(config_path)?;
    let config = DemuxConfig::from_yaml(&config_str)?;
    let observer = LogObserver;

    log::info!("Loading data...");
    let matrix = load_matrix(input)?;
    log::info!(
        "Running {} / {} on {} cells x {} tags",
        config.policy,
        config.method,
        matrix.n_cells(),
        matrix.n_tags()
    );
    let result = config.run(&matrix, &observer)?;
    write_outputs(&result, &config, expression, output_dir, &observer)
}

fn cmd_example(output_path: &Path) -> Result<()> {
    let config = DemuxConfig::new()
        .method(ClusterMethod::KMeans)
        .policy(ClassificationPolicy::DominantTag)
        .normalization(NormalizationMode::Clr)
        .min_total_count(0);
    let yaml = config.to_yaml()?;

    std::fs::write(output_path, &yaml)?;
    eprintln!("Wrote example configuration to {:?}", output_path);
    eprintln!();
    eprintln!("Contents:");
    println!("{}", yaml);

    Ok(())
}

fn cmd_simulate(output: &Path, counts: bool, cells: usize, tags: usize, seed: u64) -> Result<()> {
    let data = if counts {
        generate_counts(&CountsConfig {
            n_cells: cells,
            n_tags: tags,
            seed,
            ..Default::default()
        })?
    } else {
        generate_bimodal(
            &BimodalConfig::new()
                .with_dimensions(cells, tags)
                .with_seed(seed),
        )?
    };

    data.matrix.write_table(output, "barcode")?;
    eprintln!(
        "Wrote {} cells x {} tags to {:?}",
        data.matrix.n_cells(),
        data.matrix.n_tags(),
        output
    );
    Ok(())
}
