//! # Haplotype Group Clustering Engine
//!
//! For a genomic bin, builds an all-pairs founder differential matrix and
//! binary-searches the centroid distance whose greedy grouping best matches
//! the target group count. Grouping is refined over phases: phase 0 fills
//! missing founder alignments with the all-founder consensus, later phases
//! with the founder's current group consensus, until the grouping
//! reproduces itself bit-for-bit or the phase limit is reached.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use crate::data::founder_bits::FounderSet;
use crate::data::pba::{self, Base, BASES};
use crate::data::ChromIdx;
use crate::utils::workspace::ClusterWorkspace;

/// Processing state of one bin. A bin is claimed exactly once and is never
/// reprocessed out of a completed state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum BinState {
    Unprocessed = 0,
    InProgress = 1,
    CompletedNoChromosome = 2,
    CompletedSuccess = 3,
}

/// A genomic window over which one clustering computation runs
#[derive(Debug)]
pub struct HGBinSpec {
    pub chrom: ChromIdx,
    pub start: u32,
    pub length: u32,
    pub min_centroid: u32,
    pub max_centroid: u32,
    pub max_groups: u32,
    state: AtomicU8,
    result: Mutex<Option<HaplotypeGroup>>,
}

impl HGBinSpec {
    pub fn new(
        chrom: ChromIdx,
        start: u32,
        length: u32,
        min_centroid: u32,
        max_centroid: u32,
        max_groups: u32,
    ) -> Self {
        Self {
            chrom,
            start,
            length,
            min_centroid,
            max_centroid,
            max_groups,
            state: AtomicU8::new(BinState::Unprocessed as u8),
            result: Mutex::new(None),
        }
    }

    /// Claim the bin for processing. Exactly one caller wins.
    pub fn try_claim(&self) -> bool {
        self.state
            .compare_exchange(
                BinState::Unprocessed as u8,
                BinState::InProgress as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn state(&self) -> BinState {
        match self.state.load(Ordering::Acquire) {
            0 => BinState::Unprocessed,
            1 => BinState::InProgress,
            2 => BinState::CompletedNoChromosome,
            _ => BinState::CompletedSuccess,
        }
    }

    /// Complete with a clustering result
    pub fn complete(&self, group: HaplotypeGroup) {
        *self.result.lock().unwrap() = Some(group);
        self.state
            .store(BinState::CompletedSuccess as u8, Ordering::Release);
    }

    /// Complete without data (chromosome absent or empty bin)
    pub fn complete_no_chromosome(&self) {
        self.state
            .store(BinState::CompletedNoChromosome as u8, Ordering::Release);
    }

    /// Take the result out after processing has finished
    pub fn take_result(&self) -> Option<HaplotypeGroup> {
        self.result.lock().unwrap().take()
    }
}

/// One-locus consensus-allele cache: modal allele per group, recomputed
/// whenever the queried locus changes.
#[derive(Clone, Debug, Default)]
struct ConsensusCache {
    key: Option<(ChromIdx, u32)>,
    per_group: Vec<Option<Base>>,
}

/// Clustering result for one bin: a partition of the founder panel
#[derive(Debug)]
pub struct HaplotypeGroup {
    pub chrom: ChromIdx,
    pub start: u32,
    pub length: u32,
    pub n_founders: usize,
    /// The centroid distance the search actually settled on
    pub centroid_distance: u32,
    /// Founder-membership bitsets, one per group; exactly partitions the panel
    pub groups: Vec<FounderSet>,
    cache: ConsensusCache,
}

impl HaplotypeGroup {
    pub fn new(
        chrom: ChromIdx,
        start: u32,
        length: u32,
        n_founders: usize,
        centroid_distance: u32,
        groups: Vec<FounderSet>,
    ) -> Self {
        Self {
            chrom,
            start,
            length,
            n_founders,
            centroid_distance,
            groups,
            cache: ConsensusCache::default(),
        }
    }

    pub fn n_groups(&self) -> usize {
        self.groups.len()
    }

    /// Group index holding a founder ordinal
    pub fn group_of(&self, founder: usize) -> Option<usize> {
        self.groups
            .iter()
            .position(|g| g.contains(crate::data::ReadsetIdx::new(founder as u32)))
    }

    /// Consensus allele for a founder at a locus: the modal direct allele
    /// among its group's members, served through the one-locus cache.
    pub fn consensus_for(
        &mut self,
        founder: usize,
        locus: u32,
        founders: &[&[u8]],
    ) -> Option<Base> {
        let group_idx = self.group_of(founder)?;
        if self.cache.key != Some((self.chrom, locus)) {
            self.cache.key = Some((self.chrom, locus));
            self.cache.per_group = self
                .groups
                .iter()
                .map(|group| {
                    consensus_allele(group.iter().map(|f| f.as_usize()), founders, locus)
                })
                .collect();
        }
        self.cache.per_group[group_idx]
    }
}

/// Modal direct allele among `members` at a locus; ties break to the
/// lowest base so the result is deterministic.
fn consensus_allele(
    members: impl Iterator<Item = usize>,
    founders: &[&[u8]],
    locus: u32,
) -> Option<Base> {
    let mut counts = [0u32; 4];
    for member in members {
        let byte = founders
            .get(member)
            .and_then(|f| f.get(locus as usize))
            .copied()
            .unwrap_or(0);
        if let Some(base) = pba::single_dirac(byte) {
            counts[base.index()] += 1;
        }
    }
    let best = *counts.iter().max().unwrap();
    if best == 0 {
        return None;
    }
    BASES
        .into_iter()
        .find(|base| counts[base.index()] == best)
}

/// Greedy grouping at a candidate centroid distance: repeatedly take the
/// largest cluster of not-yet-grouped founders (ties to the lower summed
/// differential, then the lower ordinal) until the panel is consumed.
fn greedy_groups(diff: &[u32], n: usize, distance: u32, ungrouped: &mut [bool]) -> Vec<FounderSet> {
    ungrouped.fill(true);
    let mut remaining = n;
    let mut groups = Vec::new();

    while remaining > 0 {
        let mut best_seed = usize::MAX;
        let mut best_size = 0usize;
        let mut best_sum = u64::MAX;

        for seed in 0..n {
            if !ungrouped[seed] {
                continue;
            }
            let mut size = 0usize;
            let mut sum = 0u64;
            for other in 0..n {
                if ungrouped[other] && diff[seed * n + other] <= distance {
                    size += 1;
                    sum += diff[seed * n + other] as u64;
                }
            }
            if size > best_size || (size == best_size && sum < best_sum) {
                best_seed = seed;
                best_size = size;
                best_sum = sum;
            }
        }

        let mut group = FounderSet::new(n);
        for other in 0..n {
            if ungrouped[other] && diff[best_seed * n + other] <= distance {
                group.insert(crate::data::ReadsetIdx::new(other as u32));
                ungrouped[other] = false;
                remaining -= 1;
            }
        }
        groups.push(group);
    }

    groups
}

/// Clustering engine over one chromosome's founder PBA slices
pub struct ClusterEngine<'a> {
    founders: &'a [&'a [u8]],
    /// Maximum refinement phases before accepting the current grouping
    max_phases: usize,
}

impl<'a> ClusterEngine<'a> {
    pub fn new(founders: &'a [&'a [u8]], max_phases: usize) -> Self {
        Self {
            founders,
            max_phases: max_phases.max(1),
        }
    }

    /// Cluster one bin. Returns `None` when no founder carries any direct
    /// allele inside the bin (a completed-no-data bin).
    pub fn cluster_bin(&self, bin: &HGBinSpec, ws: &mut ClusterWorkspace) -> Option<HaplotypeGroup> {
        self.cluster_bin_seeded(bin, None, ws)
    }

    /// Cluster one bin, optionally seeding refinement with a grouping from
    /// a previous run. A seeded bin skips the panel-consensus phase and
    /// refines from group consensus immediately.
    pub fn cluster_bin_seeded(
        &self,
        bin: &HGBinSpec,
        seed: Option<&[FounderSet]>,
        ws: &mut ClusterWorkspace,
    ) -> Option<HaplotypeGroup> {
        let n = self.founders.len();
        if n == 0 || !self.bin_has_data(bin) {
            return None;
        }

        let mut prev: Option<(u32, Vec<FounderSet>)> =
            seed.map(|groups| (bin.min_centroid, groups.to_vec()));

        for _ in 0..self.max_phases {
            self.build_diff_matrix(bin, prev.as_ref().map(|(_, g)| g.as_slice()), ws);

            let (distance, groups) = self.centroid_search(bin, ws);
            let converged = prev
                .as_ref()
                .map(|(_, prev_groups)| *prev_groups == groups)
                .unwrap_or(false);
            prev = Some((distance, groups));
            if converged {
                break;
            }
        }

        let (distance, groups) = prev.expect("at least one clustering phase runs");
        Some(HaplotypeGroup::new(
            bin.chrom,
            bin.start,
            bin.length,
            n,
            distance,
            groups,
        ))
    }

    fn bin_has_data(&self, bin: &HGBinSpec) -> bool {
        let end = bin.start.saturating_add(bin.length);
        (bin.start..end).any(|locus| {
            self.founders.iter().any(|f| {
                f.get(locus as usize)
                    .copied()
                    .map(|byte| pba::single_dirac(byte).is_some())
                    .unwrap_or(false)
            })
        })
    }

    /// Fill the N x N founder differential matrix.
    ///
    /// A founder without a direct allele at a locus contributes the
    /// all-founder consensus on the first pass and its current group's
    /// consensus once a prior grouping exists.
    fn build_diff_matrix(
        &self,
        bin: &HGBinSpec,
        prev_groups: Option<&[FounderSet]>,
        ws: &mut ClusterWorkspace,
    ) {
        let n = self.founders.len();
        ws.reset(n);

        if let Some(groups) = prev_groups {
            for (group_idx, group) in groups.iter().enumerate() {
                for founder in group.iter() {
                    ws.group_of[founder.as_usize()] = group_idx;
                }
            }
        }

        let end = bin.start.saturating_add(bin.length);
        for locus in bin.start..end {
            let panel_consensus = if prev_groups.is_none() {
                consensus_allele(0..n, self.founders, locus)
            } else {
                None
            };
            let group_consensus: Vec<Option<Base>> = match prev_groups {
                Some(groups) => groups
                    .iter()
                    .map(|group| {
                        consensus_allele(group.iter().map(|f| f.as_usize()), self.founders, locus)
                    })
                    .collect(),
                None => Vec::new(),
            };

            for founder in 0..n {
                let byte = self.founders[founder]
                    .get(locus as usize)
                    .copied()
                    .unwrap_or(0);
                ws.eff[founder] = match pba::single_dirac(byte) {
                    Some(base) => Some(base),
                    None if prev_groups.is_none() => panel_consensus,
                    None => group_consensus
                        .get(ws.group_of[founder])
                        .copied()
                        .flatten(),
                };
            }

            for a in 0..n {
                let Some(allele_a) = ws.eff[a] else { continue };
                for b in (a + 1)..n {
                    let Some(allele_b) = ws.eff[b] else { continue };
                    if allele_a != allele_b {
                        ws.bump_diff(n, a, b);
                    }
                }
            }
        }
    }

    /// Binary-search the centroid distance over the bin's bounds.
    ///
    /// A candidate producing more groups than the target is too small and
    /// pushes the search upward; a compliant candidate is recorded and the
    /// search continues downward, preferring the finest compliant
    /// partition. When nothing in range complies, the upper bound's
    /// grouping is used as-is.
    fn centroid_search(&self, bin: &HGBinSpec, ws: &mut ClusterWorkspace) -> (u32, Vec<FounderSet>) {
        let n = self.founders.len();
        if bin.min_centroid == bin.max_centroid {
            let groups = greedy_groups(&ws.diff, n, bin.min_centroid, &mut ws.ungrouped);
            return (bin.min_centroid, groups);
        }

        let target = bin.max_groups as usize;
        let mut lo = bin.min_centroid as i64;
        let mut hi = bin.max_centroid as i64;
        let mut best: Option<(u32, Vec<FounderSet>)> = None;

        while lo <= hi {
            let mid = ((lo + hi) / 2) as u32;
            let groups = greedy_groups(&ws.diff, n, mid, &mut ws.ungrouped);
            if groups.len() > target {
                lo = mid as i64 + 1;
            } else {
                best = Some((mid, groups));
                hi = mid as i64 - 1;
            }
        }

        best.unwrap_or_else(|| {
            let groups = greedy_groups(&ws.diff, n, bin.max_centroid, &mut ws.ungrouped);
            (bin.max_centroid, groups)
        })
    }
}
