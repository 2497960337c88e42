//! End-to-end haplotype grouping and QGL calling over synthetic panels.

use std::path::{Path, PathBuf};

use clap::Parser;

use hapcall::config::Config;
use hapcall::data::pba::{dirac, Base};
use hapcall::io::pba::{PbaHeader, PbaWriter, PBA_VERSION};
use hapcall::pipelines::GroupingPipeline;

// --- Helpers ---

fn write_readset(dir: &Path, id: &str, chrom: &str, bytes: Vec<u8>) -> PathBuf {
    let path = dir.join(format!("{}.pba", id));
    let header = PbaHeader {
        version: PBA_VERSION,
        experiment_id: "synthetic".to_string(),
        reference_id: "testref".to_string(),
        readset_id: id.to_string(),
    };
    let mut writer = PbaWriter::create(&path, &header).expect("create PBA");
    writer.write_chrom(chrom, &bytes).expect("write chrom");
    writer.finish().expect("finish PBA");
    path
}

/// Six founders over `n_loci` loci: founders 1-3 all dirac-A, founders 4-6
/// all dirac-C. Inter-trio differential equals the bin length.
fn two_trio_panel(dir: &Path, n_loci: usize) -> Vec<PathBuf> {
    (0..6)
        .map(|i| {
            let base = if i < 3 { Base::A } else { Base::C };
            write_readset(
                dir,
                &format!("F{}", i + 1),
                "chr1",
                vec![dirac(base); n_loci],
            )
        })
        .collect()
}

fn grouping_config(founders: &[PathBuf], out: &Path, extra: &[(&str, &str)]) -> Config {
    let mut args = vec!["hapcall".to_string()];
    for path in founders {
        args.push("--founder".to_string());
        args.push(path.display().to_string());
    }
    args.push("--out".to_string());
    args.push(out.display().to_string());
    args.push("--threads".to_string());
    args.push("2".to_string());
    for (flag, value) in extra {
        args.push(flag.to_string());
        args.push(value.to_string());
    }
    let config = Config::parse_from(&args);
    config.validate().expect("valid config");
    config
}

fn read_group_founders(path: &Path) -> Vec<String> {
    let mut reader = csv::Reader::from_path(path).expect("open groups csv");
    reader
        .records()
        .map(|r| r.expect("csv row")[6].to_string())
        .collect()
}

// --- Tests ---

#[test]
fn two_trios_converge_to_two_groups() {
    let dir = tempfile::tempdir().unwrap();
    let n_loci = 30;

    let founders = two_trio_panel(dir.path(), n_loci);
    let out = dir.path().join("run");
    let config = grouping_config(
        &founders,
        &out,
        &[
            ("--bin-size", "30"),
            ("--min-centroid", "1"),
            ("--max-centroid", "5"),
            ("--max-groups", "3"),
        ],
    );
    let mut pipeline = GroupingPipeline::new(config);
    let summary = pipeline.run().expect("pipeline run");

    assert_eq!(summary.bins_total, 1);
    assert_eq!(summary.bins_completed, 1);
    assert_eq!(summary.bins_no_data, 0);

    // Neither six singletons nor one collapsed group: two trios.
    let groups = read_group_founders(&pipeline.groups_path());
    assert_eq!(groups.len(), 2);
    assert!(groups.contains(&"F1;F2;F3".to_string()));
    assert!(groups.contains(&"F4;F5;F6".to_string()));
}

#[test]
fn qgl_accepts_group_exclusive_alleles() {
    let dir = tempfile::tempdir().unwrap();
    let n_loci = 10;

    // 8 members pure A against 2 members pure C.
    let founders: Vec<PathBuf> = (0..10)
        .map(|i| {
            let base = if i < 8 { Base::A } else { Base::C };
            write_readset(
                dir.path(),
                &format!("F{}", i + 1),
                "chr1",
                vec![dirac(base); n_loci],
            )
        })
        .collect();

    let out = dir.path().join("run");
    let config = grouping_config(&founders, &out, &[("--bin-size", "10")]);
    let mut pipeline = GroupingPipeline::new(config);
    let summary = pipeline.run().expect("pipeline run");

    assert_eq!(summary.bins_completed, 1);
    assert_eq!(summary.qgl_loci, n_loci);

    let mut reader = csv::Reader::from_path(pipeline.qgl_path()).expect("open qgl csv");
    let headers = reader.headers().expect("headers").clone();
    let a_group = headers.iter().position(|h| h == "AlleleAGroup").unwrap();
    let a_score = headers.iter().position(|h| h == "AlleleAFbeta").unwrap();
    let c_group = headers.iter().position(|h| h == "AlleleCGroup").unwrap();
    let counts = headers
        .iter()
        .position(|h| h == "GroupMemberCounts")
        .unwrap();

    let rows: Vec<csv::StringRecord> =
        reader.records().map(|r| r.expect("csv row")).collect();
    assert_eq!(rows.len(), n_loci);
    for row in &rows {
        // The 8-member group claims A, the 2-member group claims C, and
        // both calls are essentially perfect.
        assert_ne!(row[a_group].to_string(), row[c_group].to_string());
        assert!(row[a_score].parse::<f64>().unwrap() >= 0.99);
        let member_counts = row[counts].to_string();
        assert!(member_counts == "8;2" || member_counts == "2;8");
    }
}

#[test]
fn noise_threshold_suppresses_qgl_calls() {
    let dir = tempfile::tempdir().unwrap();
    let n_loci = 10;

    let founders: Vec<PathBuf> = (0..10)
        .map(|i| {
            let base = if i < 8 { Base::A } else { Base::C };
            write_readset(
                dir.path(),
                &format!("F{}", i + 1),
                "chr1",
                vec![dirac(base); n_loci],
            )
        })
        .collect();

    let out = dir.path().join("run");
    // The 2-member group falls below the member floor; with only one
    // surviving group nothing is attributable.
    let config = grouping_config(
        &founders,
        &out,
        &[("--bin-size", "10"), ("--min-group-members", "3")],
    );
    let mut pipeline = GroupingPipeline::new(config);
    let summary = pipeline.run().expect("pipeline run");

    assert_eq!(summary.bins_completed, 1);
    assert_eq!(summary.qgl_loci, 0);
}

#[test]
fn bin_spec_csv_drives_grouping() {
    let dir = tempfile::tempdir().unwrap();
    let n_loci = 40;

    let founders = two_trio_panel(dir.path(), n_loci);

    let bins_path = dir.path().join("bins.csv");
    std::fs::write(
        &bins_path,
        "Chrom,StartLoci,Length,MinCentroidDistance,MaxCentroidDistance,MaxNumHaplotypeGroups\n\
         chr1,0,20,1,10,4\n\
         chr1,20,20,1,10,4\n\
         chrUnknown,0,20,1,10,4\n\
         chr1,1000,20,1,10,4\n",
    )
    .unwrap();

    let out = dir.path().join("run");
    let config = grouping_config(
        &founders,
        &out,
        &[("--bins", bins_path.to_str().unwrap())],
    );
    let mut pipeline = GroupingPipeline::new(config);
    let summary = pipeline.run().expect("pipeline run");

    // The unknown-chromosome and out-of-range rows are excluded, never fatal.
    assert_eq!(summary.bins_total, 2);
    assert_eq!(summary.bins_completed, 2);

    let groups = read_group_founders(&pipeline.groups_path());
    assert_eq!(groups.len(), 4);
}

#[test]
fn seeded_grouping_reproduces_previous_run() {
    let dir = tempfile::tempdir().unwrap();
    let n_loci = 30;

    let founders = two_trio_panel(dir.path(), n_loci);
    let out1 = dir.path().join("first");
    let config = grouping_config(&founders, &out1, &[("--bin-size", "30")]);
    let mut first = GroupingPipeline::new(config);
    first.run().expect("first run");
    let first_groups = read_group_founders(&first.groups_path());

    // Feed the first run's group file back in as the seed.
    let out2 = dir.path().join("second");
    let config = grouping_config(
        &founders,
        &out2,
        &[
            ("--bin-size", "30"),
            ("--groups-in", first.groups_path().to_str().unwrap()),
        ],
    );
    let mut second = GroupingPipeline::new(config);
    let summary = second.run().expect("second run");

    assert_eq!(summary.bins_completed, 1);
    assert_eq!(read_group_founders(&second.groups_path()), first_groups);
}
