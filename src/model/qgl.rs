//! # QGL Calling
//!
//! Given haplotype groups and raw founder allele counts, computes
//! Fβ-weighted precision/recall per (group, allele) and accepts an allele
//! as group-specific only above a configured threshold. Small groups are
//! protected from the head start large groups would otherwise enjoy by
//! log-scaling the counts entering precision.

use crate::data::pba::{self, Base, BASES};
use crate::data::ChromIdx;
use crate::model::grouping::HaplotypeGroup;

/// Index of the no-coverage bucket in per-group tallies
const NO_ALLELE: usize = 4;

/// QGL acceptance parameters; all defaults are calibration points
#[derive(Clone, Copy, Debug)]
pub struct QglParams {
    /// Fβ weighting of recall against precision
    pub beta: f64,
    /// Minimum Fβ for a group-specific allele call
    pub min_fbeta: f64,
    /// Groups below this member count are noise
    pub min_members: usize,
    /// Groups below this share of the founder panel are noise
    pub min_proportion: f64,
}

impl Default for QglParams {
    fn default() -> Self {
        Self {
            beta: 1.0,
            min_fbeta: 0.75,
            min_members: 2,
            min_proportion: 0.05,
        }
    }
}

/// One accepted group-specific allele
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GroupAlleleCall {
    pub group: usize,
    pub fbeta: f64,
}

/// A locus at which at least one allele is confidently attributable to a
/// haplotype group
#[derive(Clone, Debug)]
pub struct QGLLoci {
    /// Report row provenance, assigned by the caller when records merge
    pub row: u64,
    pub chrom: ChromIdx,
    pub locus: u32,
    /// Haplotype-group count in effect at this locus
    pub n_groups: usize,
    /// Accepted call per allele value, indexed by [`Base`]
    pub alleles: [Option<GroupAlleleCall>; 4],
    /// Member count per group, for reporting
    pub member_counts: Vec<usize>,
    /// Raw allele tallies per group (A,C,G,T plus the no-allele bucket)
    pub allele_counts: Vec<[u32; 5]>,
}

/// Fβ measure of one precision/recall pair
fn f_beta(beta: f64, precision: f64, recall: f64) -> f64 {
    let b2 = beta * beta;
    let denom = b2 * precision + recall;
    if denom == 0.0 {
        return 0.0;
    }
    (1.0 + b2) * precision * recall / denom
}

/// Call group-specific alleles over every locus of a clustered bin.
///
/// Bins whose surviving (non-noise) group count is below two carry no
/// attributable signal and yield nothing.
pub fn call_bin(
    group_result: &HaplotypeGroup,
    founders: &[&[u8]],
    params: &QglParams,
) -> Vec<QGLLoci> {
    let n_groups = group_result.n_groups();
    let n_founders = group_result.n_founders;
    let member_counts: Vec<usize> = group_result.groups.iter().map(|g| g.count()).collect();

    let surviving: Vec<bool> = member_counts
        .iter()
        .map(|&count| {
            count >= params.min_members
                && (count as f64) >= params.min_proportion * n_founders as f64
        })
        .collect();
    if surviving.iter().filter(|&&s| s).count() < 2 {
        return Vec::new();
    }

    let max_size = member_counts
        .iter()
        .zip(&surviving)
        .filter(|(_, &s)| s)
        .map(|(&c, _)| c)
        .max()
        .unwrap_or(0);
    let scale: Vec<f64> = member_counts
        .iter()
        .map(|&count| {
            if count == 0 {
                0.0
            } else {
                (1.0 + max_size as f64 / count as f64).log2()
            }
        })
        .collect();

    let mut records = Vec::new();
    let end = group_result.start.saturating_add(group_result.length);

    for locus in group_result.start..end {
        // Per-group tallies; a member with several alleles credits all of
        // them, a member without coverage credits the no-allele bucket.
        let mut counts = vec![[0u32; 5]; n_groups];
        for (group_idx, group) in group_result.groups.iter().enumerate() {
            for member in group.iter() {
                let byte = founders
                    .get(member.as_usize())
                    .and_then(|f| f.get(locus as usize))
                    .copied()
                    .unwrap_or(0);
                if pba::has_coverage(byte) {
                    for (base, _) in pba::present_alleles(byte) {
                        counts[group_idx][base.index()] += 1;
                    }
                } else {
                    counts[group_idx][NO_ALLELE] += 1;
                }
            }
        }

        let mut alleles: [Option<GroupAlleleCall>; 4] = [None; 4];
        for base in BASES {
            let scaled_total: f64 = (0..n_groups)
                .filter(|&g| surviving[g])
                .map(|g| counts[g][base.index()] as f64 * scale[g])
                .sum();
            if scaled_total == 0.0 {
                continue;
            }

            // First group to qualify claims the allele exclusively.
            for group_idx in 0..n_groups {
                if !surviving[group_idx] {
                    continue;
                }
                let raw = counts[group_idx][base.index()] as f64;
                let recall = raw / member_counts[group_idx] as f64;
                let precision = raw * scale[group_idx] / scaled_total;
                let score = f_beta(params.beta, precision, recall);
                if score >= params.min_fbeta {
                    alleles[base.index()] = Some(GroupAlleleCall {
                        group: group_idx,
                        fbeta: score,
                    });
                    break;
                }
            }
        }

        if alleles.iter().any(|a| a.is_some()) {
            records.push(QGLLoci {
                row: 0,
                chrom: group_result.chrom,
                locus,
                n_groups,
                alleles,
                member_counts: member_counts.clone(),
                allele_counts: counts,
            });
        }
    }

    records
}

/// Renumber QGL records sequentially once per-bin results are merged
pub fn assign_qgl_rows(records: &mut [QGLLoci]) {
    for (i, record) in records.iter_mut().enumerate() {
        record.row = i as u64;
    }
}
