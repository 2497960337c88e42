//! # Configuration Logic
//!
//! CLI argument parsing and validation. The run mode is inferred from the
//! arguments: supplying a bin specification (or a uniform bin size) selects
//! haplotype grouping, otherwise progeny assignment runs.

use std::path::PathBuf;

use clap::Parser;
use regex::Regex;

use crate::data::registry::ChromFilter;
use crate::error::{HapError, Result};
use crate::model::passes::HetImputeParams;
use crate::model::qgl::QglParams;

/// Founder haplotype calling over packed base allele (PBA) panels
#[derive(Parser, Debug, Clone)]
#[command(name = "hapcall", version, about)]
pub struct Config {
    /// Founder PBA file (repeatable)
    #[arg(long = "founder", value_name = "PBA", required = true)]
    pub founders: Vec<PathBuf>,

    /// Progeny PBA file (repeatable)
    #[arg(long = "progeny", value_name = "PBA")]
    pub progeny: Vec<PathBuf>,

    /// Control PBA file: loaded and reported, excluded from calling (repeatable)
    #[arg(long = "control", value_name = "PBA")]
    pub controls: Vec<PathBuf>,

    /// Genome sizes or BED file validating PBA chromosome lengths
    #[arg(long = "genome-sizes", value_name = "FILE")]
    pub genome_sizes: Option<PathBuf>,

    /// Output path prefix for reports and tracks
    #[arg(long, value_name = "PREFIX")]
    pub out: PathBuf,

    /// Experiment identifier stamped into reports
    #[arg(long = "experiment-id", default_value = "hapcall")]
    pub experiment_id: String,

    /// Only process chromosomes matching this regex
    #[arg(long = "include-chroms", value_name = "REGEX")]
    pub include_chroms: Option<String>,

    /// Skip chromosomes matching this regex (wins over --include-chroms)
    #[arg(long = "exclude-chroms", value_name = "REGEX")]
    pub exclude_chroms: Option<String>,

    /// Worker threads; 0 uses all logical CPUs
    #[arg(long, default_value_t = 0)]
    pub threads: usize,

    /// Reject stack loci at which any founder lacks coverage
    #[arg(long = "founders-must-align")]
    pub founders_must_align: bool,

    /// Haplotype-group bin specification CSV; selects grouping mode
    #[arg(long = "bins", value_name = "CSV")]
    pub bins: Option<PathBuf>,

    /// Uniform bin size in loci; selects grouping mode without a CSV
    #[arg(long = "bin-size", value_name = "LOCI")]
    pub bin_size: Option<u32>,

    /// Previously generated haplotype-group CSV seeding the grouping run
    #[arg(long = "groups-in", value_name = "CSV")]
    pub groups_in: Option<PathBuf>,

    /// Minimum centroid distance for uniform bins
    #[arg(long = "min-centroid", default_value_t = 1)]
    pub min_centroid: u32,

    /// Maximum centroid distance for uniform bins
    #[arg(long = "max-centroid", default_value_t = 100)]
    pub max_centroid: u32,

    /// Target maximum haplotype-group count for uniform bins
    #[arg(long = "max-groups", default_value_t = 8)]
    pub max_groups: u32,

    /// Clustering refinement phases
    #[arg(long, default_value_t = 3)]
    pub phases: usize,

    /// Fβ weighting of recall against precision
    #[arg(long = "fbeta", default_value_t = 1.0)]
    pub fbeta: f64,

    /// Minimum Fβ accepting a group-specific allele
    #[arg(long = "min-fbeta", default_value_t = 0.75)]
    pub min_fbeta: f64,

    /// Groups below this member count are noise
    #[arg(long = "min-group-members", default_value_t = 2)]
    pub min_group_members: usize,

    /// Groups below this share of the founder panel are noise
    #[arg(long = "min-group-proportion", default_value_t = 0.05)]
    pub min_group_proportion: f64,

    /// Nearest resolved loci examined by heterozygosity imputation
    #[arg(long = "het-window", default_value_t = 19)]
    pub het_window: usize,

    /// Minimum alternation runs before the heterozygosity test applies
    #[arg(long = "het-min-runs", default_value_t = 3)]
    pub het_min_runs: usize,

    /// Minimum window loci before the heterozygosity test applies
    #[arg(long = "het-min-window", default_value_t = 6)]
    pub het_min_window: usize,

    /// Two-tailed significance level for the runs test
    #[arg(long = "het-alpha", default_value_t = 0.05)]
    pub het_alpha: f64,

    /// Maximum genomic distance for corrective-pass neighbours
    #[arg(long = "max-correction-distance", default_value_t = 1_000_000)]
    pub max_correction_distance: u32,

    /// Relative tolerance for merging adjacent WIG spans
    #[arg(long = "wig-merge-tol", default_value_t = 0.05)]
    pub wig_merge_tol: f64,
}

impl Config {
    /// Parse the process arguments and validate them
    pub fn parse_and_validate() -> Result<Self> {
        let config = Self::parse();
        config.validate()?;
        Ok(config)
    }

    /// Validate argument consistency and input existence
    pub fn validate(&self) -> Result<()> {
        for path in self
            .founders
            .iter()
            .chain(&self.progeny)
            .chain(&self.controls)
            .chain(&self.genome_sizes)
            .chain(&self.bins)
            .chain(&self.groups_in)
        {
            if !path.exists() {
                return Err(HapError::FileNotFound {
                    path: path.clone(),
                });
            }
        }

        if self.is_grouping_mode() {
            if self.bins.is_some() && self.bin_size.is_some() {
                return Err(HapError::config(
                    "--bins and --bin-size are mutually exclusive",
                ));
            }
            if self.bin_size == Some(0) {
                return Err(HapError::config("--bin-size must be positive"));
            }
            if self.min_centroid > self.max_centroid {
                return Err(HapError::config(format!(
                    "--min-centroid {} exceeds --max-centroid {}",
                    self.min_centroid, self.max_centroid
                )));
            }
            if self.max_groups == 0 {
                return Err(HapError::config("--max-groups must be positive"));
            }
        } else if self.progeny.is_empty() {
            return Err(HapError::config(
                "assignment mode needs at least one --progeny readset",
            ));
        }

        if self.phases == 0 {
            return Err(HapError::config("--phases must be positive"));
        }
        if !(0.0..=1.0).contains(&self.min_fbeta) {
            return Err(HapError::config("--min-fbeta must lie in [0, 1]"));
        }
        if self.fbeta <= 0.0 {
            return Err(HapError::config("--fbeta must be positive"));
        }
        if !(0.0..1.0).contains(&self.het_alpha) || self.het_alpha == 0.0 {
            return Err(HapError::config("--het-alpha must lie in (0, 1)"));
        }
        if !(0.0..=1.0).contains(&self.min_group_proportion) {
            return Err(HapError::config(
                "--min-group-proportion must lie in [0, 1]",
            ));
        }
        if self.wig_merge_tol < 0.0 {
            return Err(HapError::config("--wig-merge-tol must be non-negative"));
        }

        // Compile the filters now so a bad pattern fails before any loading.
        self.chrom_filter()?;
        Ok(())
    }

    /// Whether this run performs haplotype grouping rather than assignment
    pub fn is_grouping_mode(&self) -> bool {
        self.bins.is_some() || self.bin_size.is_some()
    }

    /// Thread count after the logical-CPU cap
    pub fn nthreads(&self) -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        match self.threads {
            0 => cpus,
            n => n.min(cpus),
        }
    }

    /// Build the chromosome include/exclude predicate
    pub fn chrom_filter(&self) -> Result<ChromFilter> {
        let compile = |pattern: &Option<String>, which: &str| -> Result<Option<Regex>> {
            pattern
                .as_deref()
                .map(|p| {
                    Regex::new(p).map_err(|e| {
                        HapError::config(format!("invalid {} pattern: {}", which, e))
                    })
                })
                .transpose()
        };
        Ok(ChromFilter::new(
            compile(&self.include_chroms, "--include-chroms")?,
            compile(&self.exclude_chroms, "--exclude-chroms")?,
        ))
    }

    pub fn het_params(&self) -> HetImputeParams {
        HetImputeParams {
            window_loci: self.het_window,
            max_distance: self.max_correction_distance,
            min_runs: self.het_min_runs,
            min_window: self.het_min_window,
            alpha: self.het_alpha,
        }
    }

    pub fn qgl_params(&self) -> QglParams {
        QglParams {
            beta: self.fbeta,
            min_fbeta: self.min_fbeta,
            min_members: self.min_group_members,
            min_proportion: self.min_group_proportion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args(dir: &std::path::Path) -> Vec<String> {
        let founder = dir.join("f.pba");
        std::fs::write(&founder, b"stub").unwrap();
        vec![
            "hapcall".to_string(),
            "--founder".to_string(),
            founder.display().to_string(),
            "--out".to_string(),
            dir.join("out").display().to_string(),
        ]
    }

    #[test]
    fn test_mode_detection() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = base_args(dir.path());
        args.extend(["--bin-size".to_string(), "1000".to_string()]);
        let config = Config::parse_from(&args);
        assert!(config.is_grouping_mode());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_assignment_mode_requires_progeny() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::parse_from(base_args(dir.path()));
        assert!(!config.is_grouping_mode());
        assert!(matches!(
            config.validate(),
            Err(HapError::Config { .. })
        ));
    }

    #[test]
    fn test_missing_input_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = base_args(dir.path());
        args.extend([
            "--progeny".to_string(),
            dir.path().join("absent.pba").display().to_string(),
        ]);
        let config = Config::parse_from(&args);
        assert!(matches!(
            config.validate(),
            Err(HapError::FileNotFound { .. })
        ));
    }

    #[test]
    fn test_centroid_bounds_checked() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = base_args(dir.path());
        args.extend([
            "--bin-size".to_string(),
            "1000".to_string(),
            "--min-centroid".to_string(),
            "10".to_string(),
            "--max-centroid".to_string(),
            "5".to_string(),
        ]);
        let config = Config::parse_from(&args);
        assert!(matches!(config.validate(), Err(HapError::Config { .. })));
    }

    #[test]
    fn test_bad_regex_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = base_args(dir.path());
        args.extend([
            "--progeny".to_string(),
            args[2].clone(),
            "--include-chroms".to_string(),
            "chr[".to_string(),
        ]);
        let config = Config::parse_from(&args);
        assert!(matches!(config.validate(), Err(HapError::Config { .. })));
    }
}
