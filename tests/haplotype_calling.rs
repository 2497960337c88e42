//! End-to-end progeny assignment over synthetic PBA panels.

use std::path::{Path, PathBuf};

use clap::Parser;

use hapcall::config::Config;
use hapcall::data::pba::{dirac, pack, Base};
use hapcall::io::pba::{PbaFile, PbaHeader, PbaWriter, PBA_VERSION};
use hapcall::pipelines::HaplotypingPipeline;

// --- Helpers ---

/// Builds one synthetic PBA readset file, one chromosome at a time.
struct SyntheticPbaBuilder {
    readset_id: String,
    chroms: Vec<(String, Vec<u8>)>,
}

impl SyntheticPbaBuilder {
    fn new(readset_id: &str) -> Self {
        Self {
            readset_id: readset_id.to_string(),
            chroms: Vec::new(),
        }
    }

    fn chrom(mut self, name: &str, n_loci: usize, byte_at: impl Fn(usize) -> u8) -> Self {
        let bytes = (0..n_loci).map(byte_at).collect();
        self.chroms.push((name.to_string(), bytes));
        self
    }

    fn write(self, dir: &Path) -> PathBuf {
        let path = dir.join(format!("{}.pba", self.readset_id));
        let header = PbaHeader {
            version: PBA_VERSION,
            experiment_id: "synthetic".to_string(),
            reference_id: "testref".to_string(),
            readset_id: self.readset_id,
        };
        let mut writer = PbaWriter::create(&path, &header).expect("create PBA");
        for (name, bytes) in &self.chroms {
            writer.write_chrom(name, bytes).expect("write chrom");
        }
        writer.finish().expect("finish PBA");
        path
    }
}

/// The four-founder reference scenario: founder 1 dirac-A, founders 2-3
/// dirac-C, founder 4 dirac-G at even loci; everyone dirac-T at odd loci.
fn scenario_founders(dir: &Path, n_loci: usize) -> Vec<PathBuf> {
    let bases = [Base::A, Base::C, Base::C, Base::G];
    bases
        .iter()
        .enumerate()
        .map(|(i, &base)| {
            SyntheticPbaBuilder::new(&format!("F{}", i + 1))
                .chrom("chr1", n_loci, move |locus| {
                    if locus % 2 == 0 {
                        dirac(base)
                    } else {
                        dirac(Base::T)
                    }
                })
                .write(dir)
        })
        .collect()
}

fn assignment_config(founders: &[PathBuf], progeny: &[PathBuf], out: &Path) -> Config {
    let mut args = vec!["hapcall".to_string()];
    for path in founders {
        args.push("--founder".to_string());
        args.push(path.display().to_string());
    }
    for path in progeny {
        args.push("--progeny".to_string());
        args.push(path.display().to_string());
    }
    args.push("--out".to_string());
    args.push(out.display().to_string());
    args.push("--threads".to_string());
    args.push("2".to_string());
    let config = Config::parse_from(&args);
    config.validate().expect("valid config");
    config
}

fn read_call_rows(path: &Path) -> Vec<(String, String, u32, String, String)> {
    let mut reader = csv::Reader::from_path(path).expect("open calls csv");
    reader
        .records()
        .map(|r| {
            let r = r.expect("csv row");
            (
                r[0].to_string(),
                r[1].to_string(),
                r[2].parse().unwrap(),
                r[3].to_string(),
                r[4].to_string(),
            )
        })
        .collect()
}

// --- Tests ---

#[test]
fn monoallelic_progeny_assigns_unique_founder() {
    let dir = tempfile::tempdir().unwrap();
    let n_loci = 40;

    let founders = scenario_founders(dir.path(), n_loci);
    // Progeny carries dirac-A everywhere: only founder 1 can explain it.
    let progeny = vec![SyntheticPbaBuilder::new("P1")
        .chrom("chr1", n_loci, |_| dirac(Base::A))
        .write(dir.path())];

    let out = dir.path().join("run");
    let config = assignment_config(&founders, &progeny, &out);
    let mut pipeline = HaplotypingPipeline::new(config);
    let summary = pipeline.run().expect("pipeline run");

    // Even loci discriminate (A and G are unique there); odd loci are all-T
    // and carry no discriminating power.
    assert_eq!(summary.chroms_processed, 1);
    assert_eq!(summary.stacks_emitted, (n_loci / 2) as u64);
    assert_eq!(summary.aligns_accepted, (n_loci / 2) as u64);

    let rows = read_call_rows(&pipeline.calls_path());
    assert_eq!(rows.len(), n_loci / 2);
    for (readset, chrom, locus, founders, call) in &rows {
        assert_eq!(readset, "P1");
        assert_eq!(chrom, "chr1");
        assert_eq!(locus % 2, 0);
        assert_eq!(founders, "F1");
        assert_eq!(call, "mono");
    }
}

#[test]
fn heterozygous_progeny_unions_two_unique_founders() {
    let dir = tempfile::tempdir().unwrap();
    let n_loci = 20;

    let founders = scenario_founders(dir.path(), n_loci);
    // A/G het progeny at every locus: founders 1 and 4 jointly explain it.
    let progeny = vec![SyntheticPbaBuilder::new("P1")
        .chrom("chr1", n_loci, |_| pack(2, 0, 2, 0))
        .write(dir.path())];

    let out = dir.path().join("run");
    let config = assignment_config(&founders, &progeny, &out);
    let mut pipeline = HaplotypingPipeline::new(config);
    let summary = pipeline.run().expect("pipeline run");

    assert_eq!(summary.aligns_accepted, (n_loci / 2) as u64);
    let rows = read_call_rows(&pipeline.calls_path());
    for (_, _, _, founders, call) in &rows {
        assert_eq!(founders, "F1;F4");
        assert_eq!(call, "het");
    }
}

#[test]
fn unknown_allele_rejects_every_locus() {
    let dir = tempfile::tempdir().unwrap();
    let n_loci = 20;

    let founders = scenario_founders(dir.path(), n_loci);
    // No founder carries a lone T at even loci; T progeny is introgression.
    let progeny = vec![SyntheticPbaBuilder::new("P1")
        .chrom("chr1", n_loci, |locus| {
            if locus % 2 == 0 {
                dirac(Base::T)
            } else {
                0
            }
        })
        .write(dir.path())];

    let out = dir.path().join("run");
    let config = assignment_config(&founders, &progeny, &out);
    let mut pipeline = HaplotypingPipeline::new(config);
    let summary = pipeline.run().expect("pipeline run");

    assert_eq!(summary.aligns_accepted, 0);
    assert_eq!(summary.aligns_rejected, (n_loci / 2) as u64);
    assert!(read_call_rows(&pipeline.calls_path()).is_empty());
}

#[test]
fn multiple_progeny_process_independently() {
    let dir = tempfile::tempdir().unwrap();
    let n_loci = 30;

    let founders = scenario_founders(dir.path(), n_loci);
    let progeny = vec![
        SyntheticPbaBuilder::new("P1")
            .chrom("chr1", n_loci, |_| dirac(Base::A))
            .write(dir.path()),
        SyntheticPbaBuilder::new("P2")
            .chrom("chr1", n_loci, |_| dirac(Base::G))
            .write(dir.path()),
    ];

    let out = dir.path().join("run");
    let config = assignment_config(&founders, &progeny, &out);
    let mut pipeline = HaplotypingPipeline::new(config);
    let summary = pipeline.run().expect("pipeline run");

    // Each progeny resolves the 15 even loci independently.
    assert_eq!(summary.aligns_accepted, n_loci as u64);
    let rows = read_call_rows(&pipeline.calls_path());
    let p1_founders: Vec<_> = rows
        .iter()
        .filter(|(readset, ..)| readset == "P1")
        .map(|(_, _, _, founders, _)| founders.clone())
        .collect();
    let p2_founders: Vec<_> = rows
        .iter()
        .filter(|(readset, ..)| readset == "P2")
        .map(|(_, _, _, founders, _)| founders.clone())
        .collect();
    assert!(p1_founders.iter().all(|f| f == "F1"));
    assert!(p2_founders.iter().all(|f| f == "F4"));
}

#[test]
fn pba_round_trip_preserves_normalised_bytes() {
    let dir = tempfile::tempdir().unwrap();

    // Raw panel mixing conformant, promotable, and garbage bytes.
    let raw: Vec<u8> = vec![
        dirac(Base::A),
        0x02,             // lone moderate T: promoted to dirac on load
        pack(2, 2, 0, 0), // conformant heterozygous call
        pack(3, 1, 0, 0), // dirac plus trailing field: zeroed on load
        0x00,
    ];
    let path = SyntheticPbaBuilder::new("RT")
        .chrom("chr1", raw.len(), |locus| raw[locus])
        .write(dir.path());

    // The file itself preserves the raw bytes bit-exactly.
    let file = PbaFile::open(&path).expect("open PBA");
    assert_eq!(file.chrom_data(&file.chroms()[0]), raw.as_slice());

    // Loading normalises once; writing the result and reloading changes
    // nothing further.
    let expected = vec![dirac(Base::A), 0x03, pack(2, 2, 0, 0), 0x00, 0x00];
    let mut readset = hapcall::data::Readset::open(
        &path,
        hapcall::data::ReadsetType::Founder,
        |_, _| Ok(Some(hapcall::data::ChromIdx::new(0))),
    )
    .expect("open readset");
    readset
        .load_chrom(hapcall::data::ChromIdx::new(0))
        .expect("load");
    let normalised = readset
        .chrom_pba(hapcall::data::ChromIdx::new(0))
        .unwrap()
        .to_vec();
    assert_eq!(normalised, expected);

    let path2 = SyntheticPbaBuilder::new("RT2")
        .chrom("chr1", normalised.len(), |locus| normalised[locus])
        .write(dir.path());
    let mut readset2 = hapcall::data::Readset::open(
        &path2,
        hapcall::data::ReadsetType::Founder,
        |_, _| Ok(Some(hapcall::data::ChromIdx::new(0))),
    )
    .expect("open readset");
    let stats = readset2
        .load_chrom(hapcall::data::ChromIdx::new(0))
        .expect("load");
    assert_eq!(stats.promoted, 0);
    assert_eq!(stats.zeroed, 0);
    assert_eq!(
        readset2.chrom_pba(hapcall::data::ChromIdx::new(0)).unwrap(),
        expected.as_slice()
    );
}

#[test]
fn chromosome_filter_trims_readsets() {
    let dir = tempfile::tempdir().unwrap();
    let n_loci = 10;

    let founders: Vec<PathBuf> = [Base::A, Base::C]
        .iter()
        .enumerate()
        .map(|(i, &base)| {
            SyntheticPbaBuilder::new(&format!("F{}", i + 1))
                .chrom("chr1", n_loci, move |_| dirac(base))
                .chrom("chrM", n_loci, move |_| dirac(base))
                .write(dir.path())
        })
        .collect();
    let progeny = vec![SyntheticPbaBuilder::new("P1")
        .chrom("chr1", n_loci, |_| dirac(Base::A))
        .chrom("chrM", n_loci, |_| dirac(Base::A))
        .write(dir.path())];

    let out = dir.path().join("run");
    let mut config = assignment_config(&founders, &progeny, &out);
    config.exclude_chroms = Some("^chrM$".to_string());

    let mut pipeline = HaplotypingPipeline::new(config);
    let summary = pipeline.run().expect("pipeline run");

    // Only chr1 processes; with two founders split A/C every locus has two
    // unique alleles and the A progeny resolves to F1 throughout.
    assert_eq!(summary.chroms_processed, 1);
    let rows = read_call_rows(&pipeline.calls_path());
    assert!(rows.iter().all(|(_, chrom, ..)| chrom == "chr1"));
    assert_eq!(rows.len(), n_loci);
}
