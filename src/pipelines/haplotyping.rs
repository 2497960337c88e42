//! # Progeny Haplotype Assignment Pipeline
//!
//! The standard calling path. Per accepted chromosome: founder and progeny
//! PBAs load in parallel, allele stacks are generated over disjoint locus
//! ranges, each progeny is assigned and corrected independently, reports
//! stream out, and the chromosome's buffers are released before the next
//! chromosome loads.

use std::path::PathBuf;
use std::sync::atomic::Ordering;

use rayon::prelude::*;
use tracing::{info, info_span};

use crate::config::Config;
use crate::data::registry::GenomeRegistry;
use crate::data::{ChromIdx, ReadsetIdx};
use crate::error::Result;
use crate::io::bins::{HaplotypeCallRow, ReportWriter};
use crate::io::wig::{WigSpan, WigWriter};
use crate::model::assign::{assign_locus, AssignStats, ProgenyFounderAlign};
use crate::model::passes::{impute_heterozygous_runs, smooth_outliers};
use crate::model::stack::{assign_stack_ids, AlleleStack, StackBuilder, StackStats};
use crate::utils::threading::{build_thread_pool, CappedWarnings};

use super::{
    build_registry, founder_names, free_chrom, load_chrom_parallel, with_suffix, LoadTotals,
    PanelIndex,
};

/// Run totals for the assignment path
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HaplotypingSummary {
    pub chroms_processed: usize,
    pub loci_scanned: u64,
    pub stacks_emitted: u64,
    pub aligns_accepted: u64,
    pub aligns_rejected: u64,
    pub het_rewrites: u64,
    pub outliers_smoothed: u64,
}

/// Progeny assignment pipeline
pub struct HaplotypingPipeline {
    config: Config,
}

impl HaplotypingPipeline {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Output path for the per-locus haplotype call report
    pub fn calls_path(&self) -> PathBuf {
        with_suffix(&self.config.out, "haplotypes.csv")
    }

    /// Output path for the assignment coverage track
    pub fn wig_path(&self) -> PathBuf {
        with_suffix(&self.config.out, "calls.wig")
    }

    pub fn run(&mut self) -> Result<HaplotypingSummary> {
        let (mut registry, panel) = build_registry(&self.config)?;
        let pool = build_thread_pool(self.config.nthreads())?;

        let mut calls = ReportWriter::<HaplotypeCallRow>::create(&self.calls_path())?;
        let mut wig = WigWriter::create(
            &self.wig_path(),
            "haplotype_calls",
            self.config.wig_merge_tol,
        )?;

        let mut summary = HaplotypingSummary::default();
        let load_warnings = CappedWarnings::default();
        let chroms: Vec<ChromIdx> = registry.accepted_chroms().collect();

        for chrom in chroms {
            let has_founder_data = panel
                .founders
                .iter()
                .any(|&id| registry.readset(id).has_chrom(chrom));
            if !has_founder_data || registry.chrom_length(chrom) == 0 {
                continue;
            }

            let chrom_name = registry.chrom_name(chrom).to_string();
            let span = info_span!("chromosome", chrom = %chrom_name).entered();

            self.process_chrom(
                &pool,
                &mut registry,
                &panel,
                chrom,
                &chrom_name,
                &mut calls,
                &mut wig,
                &load_warnings,
                &mut summary,
            )?;

            free_chrom(&mut registry, chrom);
            summary.chroms_processed += 1;
            drop(span);
        }

        calls.finish()?;
        wig.finish()?;

        info!(
            chroms = summary.chroms_processed,
            stacks = summary.stacks_emitted,
            accepted = summary.aligns_accepted,
            rejected = summary.aligns_rejected,
            het_rewrites = summary.het_rewrites,
            smoothed = summary.outliers_smoothed,
            "assignment run complete"
        );
        Ok(summary)
    }

    #[allow(clippy::too_many_arguments)]
    fn process_chrom(
        &self,
        pool: &rayon::ThreadPool,
        registry: &mut GenomeRegistry,
        panel: &PanelIndex,
        chrom: ChromIdx,
        chrom_name: &str,
        calls: &mut ReportWriter<HaplotypeCallRow>,
        wig: &mut WigWriter,
        load_warnings: &CappedWarnings,
        summary: &mut HaplotypingSummary,
    ) -> Result<()> {
        let chrom_len = registry.chrom_length(chrom);

        // Phase 1: every founder and progeny PBA for this chromosome loads
        // before any stack or assignment work starts.
        let mut wanted = vec![false; registry.readsets().len()];
        for &id in panel.founders.iter().chain(&panel.progeny) {
            wanted[id.as_usize()] = true;
        }
        let totals = LoadTotals::default();
        load_chrom_parallel(pool, registry.readsets_mut(), &wanted, chrom, &totals)?;
        let zeroed = totals.zeroed.load(Ordering::Relaxed);
        if zeroed > 0 {
            load_warnings.warn(|| {
                format!(
                    "{}: {} non-conformant PBA bytes zeroed during load",
                    chrom_name, zeroed
                )
            });
        }

        // Phase 2: allele stacks over disjoint locus ranges.
        let zeros = vec![0u8; chrom_len as usize];
        let founder_slices: Vec<&[u8]> = panel
            .founders
            .iter()
            .map(|&id| registry.readset(id).chrom_pba(chrom).unwrap_or(&zeros))
            .collect();

        let stack_stats = StackStats::default();
        let builder = StackBuilder::new(&founder_slices, self.config.founders_must_align);
        let n_ranges = (pool.current_num_threads() * 4).max(1) as u32;
        let range_len = chrom_len.div_ceil(n_ranges).max(1);

        let mut stacks: Vec<AlleleStack> = pool.install(|| {
            (0..n_ranges)
                .into_par_iter()
                .map(|range_idx| {
                    let start = range_idx * range_len;
                    let end = (start + range_len).min(chrom_len);
                    builder.build_range(chrom, start, end, &stack_stats)
                })
                .collect::<Vec<_>>()
                .into_iter()
                .flatten()
                .collect()
        });
        assign_stack_ids(&mut stacks);

        let (scanned, _, _, emitted) = stack_stats.snapshot();
        summary.loci_scanned += scanned;
        summary.stacks_emitted += emitted;
        info!(stacks = stacks.len(), "allele stacks generated");

        // Phase 3: per-progeny assignment and corrective passes.
        let assign_stats = AssignStats::default();
        let het_params = self.config.het_params();
        let max_distance = self.config.max_correction_distance;
        let n_founders = founder_slices.len();

        type ProgenyResult = (ReadsetIdx, Vec<ProgenyFounderAlign>, usize, usize);
        let per_progeny: Vec<ProgenyResult> = pool.install(|| {
            panel
                .progeny
                .par_iter()
                .map(|&progeny_id| {
                    let readset = registry.readset(progeny_id);
                    let mut aligns: Vec<ProgenyFounderAlign> = stacks
                        .iter()
                        .filter_map(|stack| {
                            let byte = readset.pba_at(chrom, stack.locus).unwrap_or(0);
                            assign_locus(byte, stack, &assign_stats)
                        })
                        .collect();

                    let het = impute_heterozygous_runs(&mut aligns, n_founders, &het_params)?;
                    let smoothed = smooth_outliers(&mut aligns, max_distance);
                    Ok((progeny_id, aligns, het, smoothed))
                })
                .collect::<Result<Vec<_>>>()
        })?;

        summary.aligns_accepted += assign_stats.accepted();
        summary.aligns_rejected += assign_stats.rejected();

        // Phase 4: reports. Spans cover each stack locus with the count of
        // progeny whose call was accepted there; adjacent near-equal spans
        // merge in the emitter.
        let mut accepted_at = vec![0u32; stacks.len()];
        for (progeny_id, aligns, het, smoothed) in &per_progeny {
            summary.het_rewrites += *het as u64;
            summary.outliers_smoothed += *smoothed as u64;

            let readset_id = registry.readset(*progeny_id).id().to_string();
            for align in aligns {
                accepted_at[align.stack_id as usize] += 1;
                calls.write(&HaplotypeCallRow {
                    readset: readset_id.clone(),
                    chrom: chrom_name.to_string(),
                    locus: align.locus,
                    founders: founder_names(registry, &panel.founders, align.membership.iter()),
                    call: match align.membership.count() {
                        1 => "mono".to_string(),
                        _ => "het".to_string(),
                    },
                })?;
            }
        }

        let spans: Vec<WigSpan> = stacks
            .iter()
            .zip(&accepted_at)
            .map(|(stack, &count)| WigSpan {
                chrom: chrom_name.to_string(),
                start: stack.locus + 1,
                length: 1,
                value: count as f64,
            })
            .collect();
        wig.write_spans(&spans)?;

        Ok(())
    }
}
