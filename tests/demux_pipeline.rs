//! Integration tests for the demultiplexing pipelines.

use hto_demux::cluster::PartitionMetrics;
use hto_demux::data::io::create_writer;
use hto_demux::prelude::*;
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;

fn bimodal_fixture() -> SyntheticHto {
    generate_bimodal(&BimodalConfig::default()).unwrap()
}

#[test]
fn test_positive_set_end_to_end() {
    let data = bimodal_fixture();

    for method in [ClusterMethod::KMeans, ClusterMethod::Gmm] {
        let result = DemuxConfig::new()
            .method(method)
            .run(&data.matrix, &NullObserver)
            .unwrap();
        let report = result.report();

        assert_eq!(report.total(), 1000, "{}", method);
        assert!(report.count("Negative") > 0, "{}", method);
        assert!(report.count("Doublet") > 0, "{}", method);
        assert!(
            report.stats.keys().any(|k| k.starts_with("HTO_")),
            "{}",
            method
        );
        for tag in ["HTO_0", "HTO_1", "HTO_2"] {
            assert!(report.metrics.contains_key(tag), "{} missing {}", method, tag);
        }

        // every label is Negative, Doublet, or an input tag name
        for label in result.table.iter() {
            let id = label.hash_id.as_str();
            assert!(
                id == "Negative" || id == "Doublet" || data.matrix.tag_ids().iter().any(|t| t == id),
                "unexpected label {}",
                id
            );
        }

        // components three standard deviations apart are almost always recovered
        let agreement = data.agreement(result.table.hash_ids());
        assert!(agreement > 0.98, "{} agreement {}", method, agreement);
    }
}

#[test]
fn test_positive_set_metric_shapes() {
    let data = bimodal_fixture();

    let kmeans = DemuxConfig::new().run(&data.matrix, &NullObserver).unwrap();
    for metrics in kmeans.metrics.values() {
        match metrics {
            PartitionMetrics::Centroid(m) => {
                let s = m.silhouette_score.unwrap();
                assert!((-1.0..=1.0).contains(&s));
                assert!(s > 0.5);
                assert!(m.davies_bouldin_index.unwrap() >= 0.0);
            }
            other => panic!("expected centroid metrics, got {:?}", other),
        }
    }

    let gmm = DemuxConfig::new()
        .method(ClusterMethod::Gmm)
        .run(&data.matrix, &NullObserver)
        .unwrap();
    for metrics in gmm.metrics.values() {
        assert!(matches!(metrics, PartitionMetrics::Distribution(_)));
    }
}

#[test]
fn test_positive_set_is_idempotent() {
    let data = bimodal_fixture();
    let config = DemuxConfig::new();

    let first = config.run(&data.matrix, &NullObserver).unwrap();
    let second = config.run(&data.matrix, &NullObserver).unwrap();
    assert_eq!(first.table.hash_ids(), second.table.hash_ids());
    assert_eq!(first.metrics, second.metrics);
}

#[test]
fn test_gmm_log_likelihood_on_skewed_values() {
    let values = hto_demux::benchmark::generate_gamma_values(1000, 2.0, 2.0, 42).unwrap();
    let result = partition_values(&values, ClusterMethod::Gmm, &ClusterParams::default()).unwrap();
    match result.metrics {
        PartitionMetrics::Distribution(m) => {
            assert!(m.log_likelihood <= 0.0);
            assert!(m.bic.is_finite());
        }
        other => panic!("expected distribution metrics, got {:?}", other),
    }

    let result =
        partition_values(&values, ClusterMethod::KMeans, &ClusterParams::default()).unwrap();
    match result.metrics {
        PartitionMetrics::Centroid(m) => {
            assert!((-1.0..=1.0).contains(&m.silhouette_score.unwrap()));
        }
        other => panic!("expected centroid metrics, got {:?}", other),
    }
}

#[test]
fn test_dominant_tag_end_to_end() {
    let data = generate_counts(&CountsConfig::default()).unwrap();
    let config = DemuxConfig::new().policy(ClassificationPolicy::DominantTag);

    let result = config.run(&data.matrix, &NullObserver).unwrap();
    assert_eq!(result.table.len(), 500);
    assert!(result.metrics.is_empty());
    assert!(!result.table.has_doublet_info());

    let agreement = data.agreement(result.table.hash_ids());
    assert!(agreement > 0.95, "agreement {}", agreement);

    let report = result.report();
    assert_eq!(report.total(), 500);
    assert!(report.count("HTO-301") > 0);
    assert!(report.count("Doublet") > 0);
}

#[test]
fn test_dominant_tag_with_gmm_covers_every_cell() {
    let data = generate_counts(&CountsConfig {
        n_cells: 120,
        ..Default::default()
    })
    .unwrap();
    let result = DemuxConfig::new()
        .policy(ClassificationPolicy::DominantTag)
        .method(ClusterMethod::Gmm)
        .run(&data.matrix, &NullObserver)
        .unwrap();

    assert_eq!(result.table.len(), 120);
    let ids: Vec<&str> = result.table.iter().map(|l| l.cell_id.as_str()).collect();
    assert_eq!(ids, data.matrix.cell_ids().iter().map(String::as_str).collect::<Vec<_>>());
}

#[test]
fn test_low_count_cells_are_negative() {
    let data = generate_counts(&CountsConfig {
        n_cells: 200,
        ..Default::default()
    })
    .unwrap();
    let threshold = 400;
    let result = DemuxConfig::new()
        .policy(ClassificationPolicy::DominantTag)
        .min_total_count(threshold)
        .run(&data.matrix, &NullObserver)
        .unwrap();

    let raw = data.matrix.without_tag("unmapped").unwrap();
    let totals = raw.row_totals();
    let filter = result.filter.as_ref().unwrap();
    for (i, label) in result.table.iter().enumerate() {
        if totals[i] <= threshold as f64 {
            assert_eq!(label.hash_id, HashId::Negative, "cell {}", i);
            assert!(filter.filtered.contains(&i));
        } else {
            assert!(filter.kept.contains(&i));
        }
    }
    assert_eq!(filter.n_before(), 200);
}

fn write_count_dir(dir: &Path) {
    // 3 tags + unmapped, 4 cells: HTO_301, HTO_302, doublet, empty
    let mut mtx = create_writer(dir.join("matrix.mtx.gz")).unwrap();
    writeln!(mtx, "%%MatrixMarket matrix coordinate integer general").unwrap();
    writeln!(mtx, "4 4 10").unwrap();
    for (tag, cell, value) in [
        (1, 1, 250),
        (2, 1, 3),
        (3, 1, 2),
        (1, 2, 4),
        (2, 2, 310),
        (3, 2, 1),
        (1, 3, 190),
        (2, 3, 205),
        (3, 3, 6),
        (4, 4, 11),
    ] {
        writeln!(mtx, "{} {} {}", tag, cell, value).unwrap();
    }
    mtx.finish().unwrap();

    let mut barcodes = create_writer(dir.join("barcodes.tsv.gz")).unwrap();
    for cb in ["AAACCTGA", "AAACCTGC", "AAACCTGG", "AAACCTGT"] {
        writeln!(barcodes, "{}", cb).unwrap();
    }
    barcodes.finish().unwrap();

    let mut features = create_writer(dir.join("features.tsv.gz")).unwrap();
    for tag in [
        "HTO_301-ACCCACCAGTAAGAC",
        "HTO_302-GGTCGAGAGCATTCA",
        "HTO_303-CTTGCCGCATGTCAT",
        "unmapped",
    ] {
        writeln!(features, "{}", tag).unwrap();
    }
    features.finish().unwrap();
}

#[test]
fn test_count_dir_with_expression_join() {
    let dir = tempdir().unwrap();
    write_count_dir(dir.path());

    let matrix = CountMatrix::from_mtx_dir(dir.path()).unwrap();
    let config = DemuxConfig::new().policy(ClassificationPolicy::DominantTag);
    let observer = RecordingObserver::new();
    let result = config.run(&matrix, &observer).unwrap();

    let ids: Vec<&str> = result.table.iter().map(|l| l.hash_id.as_str()).collect();
    assert_eq!(ids, vec!["HTO-301", "HTO-302", "Doublet", "Negative"]);

    let class_path = dir.path().join("final-classification.tsv.gz");
    result.table.write_tsv(&class_path).unwrap();
    let reloaded = hto_demux::data::io::open_reader(&class_path).unwrap();
    let lines: Vec<String> = std::io::BufRead::lines(reloaded).map(|l| l.unwrap()).collect();
    assert_eq!(lines[0], "CB\thashID");
    assert_eq!(lines[3], "AAACCTGG\tDoublet");

    // gene table misses one classified cell and has one unknown cell
    let genes = dir.path().join("genes.csv");
    std::fs::write(
        &genes,
        "cell,CD3E,MS4A1\nAAACCTGC,5,0\nTTTTTTTT,1,1\nAAACCTGA,0,7\nAAACCTGG,2,2\n",
    )
    .unwrap();
    let merged = dir.path().join("final-matrix.tsv.gz");
    let n = merge_expression(&result.table, &genes, &merged, &observer).unwrap();
    assert_eq!(n, 3);

    let reader = hto_demux::data::io::open_reader(&merged).unwrap();
    let lines: Vec<String> = std::io::BufRead::lines(reader).map(|l| l.unwrap()).collect();
    assert_eq!(lines[0], "cell\tCD3E\tMS4A1\thashID");
    assert_eq!(lines[1], "AAACCTGC\t5\t0\tHTO-302");
    assert_eq!(lines[2], "AAACCTGA\t0\t7\tHTO-301");
    assert_eq!(lines[3], "AAACCTGG\t2\t2\tDoublet");
    assert_eq!(lines.len(), 4);
    assert!(observer.warnings().is_empty());
}

#[test]
fn test_outputs_written_as_files() {
    let dir = tempdir().unwrap();
    let data = bimodal_fixture();
    let result = DemuxConfig::new().run(&data.matrix, &NullObserver).unwrap();

    let class_path = dir.path().join("classification.tsv.gz");
    result.table.write_tsv(&class_path).unwrap();
    let reader = hto_demux::data::io::open_reader(&class_path).unwrap();
    let lines: Vec<String> = std::io::BufRead::lines(reader).map(|l| l.unwrap()).collect();
    assert_eq!(lines[0], "\thashID\tDoublet_Info");
    assert_eq!(lines.len(), 1001);

    let stats_path = dir.path().join("stats.yml");
    result.report().write(&stats_path).unwrap();
    let text = std::fs::read_to_string(&stats_path).unwrap();
    let value: serde_yaml::Value = serde_yaml::from_str(&text).unwrap();
    assert_eq!(value["stats"]["Total"].as_u64(), Some(1000));
    for tag in ["HTO_0", "HTO_1", "HTO_2"] {
        assert!(value["metrics"][tag]["silhouette_score"].is_f64());
    }
    assert!(text.find("stats:").unwrap() < text.find("metrics:").unwrap());
}

#[test]
fn test_table_input_roundtrip_through_pipeline() {
    let dir = tempdir().unwrap();
    let data = generate_bimodal(&BimodalConfig::new().with_dimensions(200, 3)).unwrap();
    let path = dir.path().join("dsb.tsv");
    data.matrix.write_table(&path, "barcode").unwrap();

    let loaded = CountMatrix::from_table(&path).unwrap();
    let config = DemuxConfig::new();
    let from_file = config.run(&loaded, &NullObserver).unwrap();
    let in_memory = config.run(&data.matrix, &NullObserver).unwrap();
    assert_eq!(from_file.table.hash_ids(), in_memory.table.hash_ids());
}

#[test]
fn test_configuration_errors() {
    assert!(matches!(
        "hdbscan".parse::<ClusterMethod>(),
        Err(DemuxError::Configuration(_))
    ));
    assert!(matches!(
        NormalizationMode::try_from(0u8),
        Err(DemuxError::Configuration(_))
    ));
    assert!(matches!(
        DemuxConfig::from_yaml("method: spectral\n"),
        Err(DemuxError::Configuration(_))
    ));
    assert!(matches!(
        DemuxConfig::from_yaml("policy: dominant_tag\nnormalization: 9\n"),
        Err(DemuxError::Configuration(_))
    ));
}

#[test]
fn test_shape_mismatch_aborts_before_output() {
    let dir = tempdir().unwrap();
    write_count_dir(dir.path());
    // one barcode too many
    let mut barcodes = create_writer(dir.path().join("barcodes.tsv.gz")).unwrap();
    for cb in ["A", "C", "G", "T", "N"] {
        writeln!(barcodes, "{}", cb).unwrap();
    }
    barcodes.finish().unwrap();

    assert!(matches!(
        CountMatrix::from_mtx_dir(dir.path()),
        Err(DemuxError::ShapeMismatch { .. })
    ));

    let ragged = dir.path().join("ragged.tsv");
    std::fs::write(&ragged, "barcode\tHTO_0\tHTO_1\nc1\t0.5\t1.0\nc2\t0.1\n").unwrap();
    assert!(CountMatrix::from_table(&ragged).is_err());
}

#[test]
fn test_degenerate_tag_is_reported() {
    let rows: Vec<Vec<f64>> = (0..50)
        .map(|i| vec![0.7, if i % 2 == 0 { 3.0 } else { 0.0 }])
        .collect();
    let matrix = CountMatrix::from_rows(
        &rows,
        (0..50).map(|i| format!("c{}", i)).collect(),
        vec!["HTO_flat".into(), "HTO_real".into()],
    )
    .unwrap();
    let observer = RecordingObserver::new();
    let result = DemuxConfig::new().run(&matrix, &observer).unwrap();

    assert_eq!(result.table.len(), 50);
    let report = result.report();
    assert_eq!(report.degraded_tags(), vec!["HTO_flat"]);
    assert!(observer.warnings().iter().any(|w| w.contains("HTO_flat")));
    assert!(report.to_yaml().unwrap().contains("silhouette_score: null"));
}
