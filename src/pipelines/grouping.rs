//! # Haplotype Grouping Pipeline
//!
//! The grouping path. Bins come from a specification CSV or from uniform
//! tiling of the accepted chromosomes; workers claim bins atomically and
//! run the clustering engine plus the QGL caller over each, and the merged
//! results stream out as group/QGL reports and a WIG track.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tracing::{info, info_span, warn};

use crate::config::Config;
use crate::data::founder_bits::FounderSet;
use crate::data::registry::GenomeRegistry;
use crate::data::{ChromIdx, ReadsetIdx};
use crate::error::Result;
use crate::io::bins::{read_bin_specs, read_group_rows, GroupRow, QglRow, ReportWriter};
use crate::io::wig::{WigSpan, WigWriter};
use crate::model::grouping::{BinState, ClusterEngine, HGBinSpec};
use crate::model::qgl::{assign_qgl_rows, call_bin, QGLLoci};
use crate::data::pba::BASES;
use crate::utils::threading::{build_thread_pool, CappedWarnings, PoolCoordinator};
use crate::utils::workspace::ClusterWorkspace;

use super::{
    build_registry, founder_names, free_chrom, load_chrom_parallel, with_suffix, LoadTotals,
    PanelIndex,
};

/// Run totals for the grouping path
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GroupingSummary {
    pub bins_total: usize,
    pub bins_completed: usize,
    pub bins_no_data: usize,
    pub qgl_loci: usize,
}

/// Seed groupings loaded from a previous run, keyed by bin geometry
type SeedMap = HashMap<(ChromIdx, u32, u32), Vec<FounderSet>>;

/// Haplotype grouping pipeline
pub struct GroupingPipeline {
    config: Config,
}

impl GroupingPipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn groups_path(&self) -> PathBuf {
        with_suffix(&self.config.out, "groups.csv")
    }

    pub fn qgl_path(&self) -> PathBuf {
        with_suffix(&self.config.out, "qgl.csv")
    }

    pub fn wig_path(&self) -> PathBuf {
        with_suffix(&self.config.out, "groups.wig")
    }

    pub fn run(&mut self) -> Result<GroupingSummary> {
        let (mut registry, panel) = build_registry(&self.config)?;
        let pool = build_thread_pool(self.config.nthreads())?;
        let bin_warnings = CappedWarnings::default();

        let bins = self.build_bins(&registry, &panel, &bin_warnings)?;
        let seeds = self.load_seeds(&registry, &panel, &bin_warnings)?;
        let mut summary = GroupingSummary {
            bins_total: bins.len(),
            ..GroupingSummary::default()
        };

        let mut groups_out = ReportWriter::<GroupRow>::create(&self.groups_path())?;
        let mut qgl_out = ReportWriter::<QglRow>::create(&self.qgl_path())?;
        let mut wig = WigWriter::create(
            &self.wig_path(),
            "haplotype_groups",
            self.config.wig_merge_tol,
        )?;

        let mut qgl_records: Vec<QGLLoci> = Vec::new();
        let chroms: Vec<ChromIdx> = registry.accepted_chroms().collect();

        for chrom in chroms {
            let chrom_bins: Vec<&HGBinSpec> = bins.iter().filter(|b| b.chrom == chrom).collect();
            if chrom_bins.is_empty() {
                continue;
            }
            let chrom_name = registry.chrom_name(chrom).to_string();
            let span = info_span!("chromosome", chrom = %chrom_name).entered();

            let has_founder_data = panel
                .founders
                .iter()
                .any(|&id| registry.readset(id).has_chrom(chrom));
            if !has_founder_data {
                for bin in &chrom_bins {
                    if bin.try_claim() {
                        bin.complete_no_chromosome();
                    }
                }
                summary.bins_no_data += chrom_bins.len();
                drop(span);
                continue;
            }

            let mut wanted = vec![false; registry.readsets().len()];
            for &id in &panel.founders {
                wanted[id.as_usize()] = true;
            }
            let totals = LoadTotals::default();
            load_chrom_parallel(&pool, registry.readsets_mut(), &wanted, chrom, &totals)?;

            let chrom_len = registry.chrom_length(chrom);
            let zeros = vec![0u8; chrom_len as usize];
            let founder_slices: Vec<&[u8]> = panel
                .founders
                .iter()
                .map(|&id| registry.readset(id).chrom_pba(chrom).unwrap_or(&zeros))
                .collect();

            let chrom_qgl =
                self.process_bins(&pool, &founder_slices, &chrom_bins, &seeds)?;
            qgl_records.extend(chrom_qgl);

            // Merge results into reports while the bin states are fresh.
            let mut spans = Vec::new();
            for bin in &chrom_bins {
                match bin.state() {
                    BinState::CompletedSuccess => summary.bins_completed += 1,
                    BinState::CompletedNoChromosome => summary.bins_no_data += 1,
                    _ => {}
                }
                if let Some(result) = bin.take_result() {
                    for (group_idx, group) in result.groups.iter().enumerate() {
                        groups_out.write(&GroupRow {
                            experiment: self.config.experiment_id.clone(),
                            chrom: chrom_name.clone(),
                            start: bin.start,
                            length: bin.length,
                            centroid: result.centroid_distance,
                            group: group_idx as u32,
                            founders: founder_names(
                                &registry,
                                &panel.founders,
                                group.iter(),
                            ),
                        })?;
                    }
                    spans.push(WigSpan {
                        chrom: chrom_name.clone(),
                        start: bin.start + 1,
                        length: bin.length,
                        value: result.n_groups() as f64,
                    });
                }
            }
            wig.write_spans(&spans)?;

            free_chrom(&mut registry, chrom);
            drop(span);
        }

        assign_qgl_rows(&mut qgl_records);
        summary.qgl_loci = qgl_records.len();
        for record in &qgl_records {
            qgl_out.write(&qgl_row(&self.config.experiment_id, &registry, record))?;
        }

        groups_out.finish()?;
        qgl_out.finish()?;
        wig.finish()?;

        info!(
            bins = summary.bins_total,
            completed = summary.bins_completed,
            no_data = summary.bins_no_data,
            qgl_loci = summary.qgl_loci,
            "grouping run complete"
        );
        Ok(summary)
    }

    /// Bin construction: a specification CSV wins, otherwise accepted
    /// chromosomes are tiled uniformly. Out-of-range or unknown-chromosome
    /// rows are warned about and excluded, never fatal.
    fn build_bins(
        &self,
        registry: &GenomeRegistry,
        panel: &PanelIndex,
        warnings: &CappedWarnings,
    ) -> Result<Vec<HGBinSpec>> {
        let mut bins = Vec::new();

        if let Some(path) = &self.config.bins {
            for row in read_bin_specs(path)? {
                let Some(chrom) = registry.chrom_by_name(&row.chrom) else {
                    warnings.warn(|| format!("bin chromosome {} is unknown", row.chrom));
                    continue;
                };
                if !registry.chrom_accepted(chrom) {
                    continue;
                }
                let chrom_len = registry.chrom_length(chrom);
                if row.start >= chrom_len || row.start + row.length > chrom_len {
                    warnings.warn(|| {
                        format!(
                            "bin {}:{}+{} lies outside the {} locus chromosome",
                            row.chrom, row.start, row.length, chrom_len
                        )
                    });
                    continue;
                }
                bins.push(HGBinSpec::new(
                    chrom,
                    row.start,
                    row.length,
                    row.min_centroid,
                    row.max_centroid,
                    row.max_groups,
                ));
            }
        } else if let Some(bin_size) = self.config.bin_size {
            for chrom in registry.accepted_chroms() {
                let chrom_len = registry.chrom_length(chrom);
                let carried = panel
                    .founders
                    .iter()
                    .any(|&id| registry.readset(id).has_chrom(chrom));
                if chrom_len == 0 || !carried {
                    continue;
                }
                let mut start = 0u32;
                while start < chrom_len {
                    let length = bin_size.min(chrom_len - start);
                    bins.push(HGBinSpec::new(
                        chrom,
                        start,
                        length,
                        self.config.min_centroid,
                        self.config.max_centroid,
                        self.config.max_groups,
                    ));
                    start += length;
                }
            }
        }

        Ok(bins)
    }

    /// Resolve a previous run's group file into per-bin seed groupings
    fn load_seeds(
        &self,
        registry: &GenomeRegistry,
        panel: &PanelIndex,
        warnings: &CappedWarnings,
    ) -> Result<SeedMap> {
        let Some(path) = &self.config.groups_in else {
            return Ok(SeedMap::new());
        };

        let ordinal_of: HashMap<&str, u32> = panel
            .founders
            .iter()
            .enumerate()
            .map(|(ordinal, &id)| (registry.readset(id).id(), ordinal as u32))
            .collect();
        let n_founders = panel.founders.len();

        let mut seeds = SeedMap::new();
        'rows: for row in read_group_rows(path)? {
            let Some(chrom) = registry.chrom_by_name(&row.chrom) else {
                warnings.warn(|| format!("seed group chromosome {} is unknown", row.chrom));
                continue;
            };
            let mut group = FounderSet::new(n_founders);
            for id in row.founders.split(';').filter(|s| !s.is_empty()) {
                let Some(&ordinal) = ordinal_of.get(id) else {
                    warnings.warn(|| format!("seed group names unknown founder {}", id));
                    continue 'rows;
                };
                group.insert(ReadsetIdx::new(ordinal));
            }
            seeds
                .entry((chrom, row.start, row.length))
                .or_default()
                .push(group);
        }

        // A seed only helps if it covers the whole panel; drop the rest.
        seeds.retain(|key, groups| {
            let complete = crate::data::founder_bits::is_partition(groups, n_founders);
            if !complete {
                warn!(
                    start = key.1,
                    length = key.2,
                    "seed grouping does not partition the founder panel; ignored"
                );
            }
            complete
        });

        Ok(seeds)
    }

    /// Worker claim loop over one chromosome's bins
    fn process_bins(
        &self,
        pool: &rayon::ThreadPool,
        founder_slices: &[&[u8]],
        chrom_bins: &[&HGBinSpec],
        seeds: &SeedMap,
    ) -> Result<Vec<QGLLoci>> {
        let engine = ClusterEngine::new(founder_slices, self.config.phases);
        let qgl_params = self.config.qgl_params();
        let next_bin = AtomicUsize::new(0);
        let coordinator = PoolCoordinator::new();
        let results: Mutex<Vec<QGLLoci>> = Mutex::new(Vec::new());
        let n_workers = pool.current_num_threads().max(1);

        pool.install(|| {
            rayon::scope(|scope| {
                for _ in 0..n_workers {
                    scope.spawn(|_| {
                        coordinator.register_start();
                        let mut ws = ClusterWorkspace::new();

                        loop {
                            if coordinator.terminate_requested() {
                                break;
                            }
                            let idx = next_bin.fetch_add(1, Ordering::SeqCst);
                            if idx >= chrom_bins.len() {
                                break;
                            }
                            let bin = chrom_bins[idx];
                            if !bin.try_claim() {
                                continue;
                            }

                            let seed = seeds
                                .get(&(bin.chrom, bin.start, bin.length))
                                .map(|groups| groups.as_slice());
                            match engine.cluster_bin_seeded(bin, seed, &mut ws) {
                                Some(result) => {
                                    let records =
                                        call_bin(&result, founder_slices, &qgl_params);
                                    if !records.is_empty() {
                                        results.lock().unwrap().extend(records);
                                    }
                                    bin.complete(result);
                                }
                                None => bin.complete_no_chromosome(),
                            }
                        }

                        coordinator.register_completion();
                    });
                }
            });
        });

        coordinator.verify_all_done(n_workers)?;
        let mut records = results.into_inner().unwrap();
        records.sort_by_key(|r| (r.chrom, r.locus));
        Ok(records)
    }
}

/// Flatten one QGL record into its report row
fn qgl_row(experiment: &str, registry: &GenomeRegistry, record: &QGLLoci) -> QglRow {
    let call = |base: crate::data::pba::Base| {
        record.alleles[base.index()]
            .map(|c| (Some(c.group as u32), Some(c.fbeta)))
            .unwrap_or((None, None))
    };
    let [a, c, g, t] = BASES.map(call);

    QglRow {
        experiment: experiment.to_string(),
        row: record.row,
        chrom: registry.chrom_name(record.chrom).to_string(),
        locus: record.locus,
        n_groups: record.n_groups as u32,
        a_group: a.0,
        a_score: a.1,
        c_group: c.0,
        c_score: c.1,
        g_group: g.0,
        g_score: g.1,
        t_group: t.0,
        t_score: t.1,
        member_counts: record
            .member_counts
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(";"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_output_paths() {
        let dir = tempfile::tempdir().unwrap();
        let founder = dir.path().join("f.pba");
        std::fs::write(&founder, b"stub").unwrap();

        let config = Config::parse_from([
            "hapcall",
            "--founder",
            founder.to_str().unwrap(),
            "--out",
            "/tmp/run2",
            "--bin-size",
            "1000",
        ]);
        let pipeline = GroupingPipeline::new(config);
        assert_eq!(pipeline.groups_path(), PathBuf::from("/tmp/run2.groups.csv"));
        assert_eq!(pipeline.qgl_path(), PathBuf::from("/tmp/run2.qgl.csv"));
        assert_eq!(pipeline.wig_path(), PathBuf::from("/tmp/run2.groups.wig"));
    }
}
