//! # Allele Stacks
//!
//! An [`AlleleStack`] records, for one (chromosome, locus), which founders
//! carry which allele. Stacks are emitted only where founders are
//! informatively diverse: at least one allele must be carried by exactly one
//! founder, otherwise the locus has no discriminating power and is skipped.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::data::founder_bits::FounderSet;
use crate::data::pba::{self, Base};
use crate::data::{ChromIdx, ReadsetIdx};

/// Per-(chromosome, locus) founder allele record
#[derive(Clone, Debug)]
pub struct AlleleStack {
    /// Sequential ID, assigned once the per-chromosome scan is merged
    pub id: u32,
    pub chrom: ChromIdx,
    pub locus: u32,
    /// Founders considered by the scan
    pub n_founders: usize,
    /// Founders credited with an allele at this locus
    pub processed: FounderSet,
    /// Founder membership per allele value, indexed by [`Base`]
    pub members: [FounderSet; 4],
    /// Founder count per allele value
    pub counts: [u32; 4],
}

impl AlleleStack {
    /// Founder-membership set for one allele
    pub fn founders_for(&self, base: Base) -> &FounderSet {
        &self.members[base.index()]
    }

    /// Founder count for one allele
    pub fn count_for(&self, base: Base) -> u32 {
        self.counts[base.index()]
    }

    /// Whether an allele uniquely identifies a founder here
    pub fn is_unique(&self, base: Base) -> bool {
        self.count_for(base) == 1
    }
}

/// Chromosome-scoped stack-scan statistics, shared across worker threads
#[derive(Debug, Default)]
pub struct StackStats {
    pub loci_scanned: AtomicU64,
    pub rejected_uncovered: AtomicU64,
    pub rejected_no_unique: AtomicU64,
    pub stacks_emitted: AtomicU64,
}

impl StackStats {
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.loci_scanned.load(Ordering::Relaxed),
            self.rejected_uncovered.load(Ordering::Relaxed),
            self.rejected_no_unique.load(Ordering::Relaxed),
            self.stacks_emitted.load(Ordering::Relaxed),
        )
    }
}

/// Builds allele stacks over one chromosome's founder PBA slices.
///
/// Founder slices must all come from the same chromosome and are indexed by
/// founder ordinal (position within the founder panel, not registry index).
pub struct StackBuilder<'a> {
    founders: &'a [&'a [u8]],
    /// Reject any locus at which a founder lacks coverage
    require_all_aligned: bool,
}

impl<'a> StackBuilder<'a> {
    pub fn new(founders: &'a [&'a [u8]], require_all_aligned: bool) -> Self {
        Self {
            founders,
            require_all_aligned,
        }
    }

    pub fn n_founders(&self) -> usize {
        self.founders.len()
    }

    /// Scan one locus.
    ///
    /// Each founder is credited to an allele only for a lone dirac field;
    /// ambiguous founders (two or more fields set) are excluded, not
    /// guessed. The locus is accepted only if some allele ends up carried
    /// by exactly one founder.
    pub fn build_stack(
        &self,
        chrom: ChromIdx,
        locus: u32,
        stats: &StackStats,
    ) -> Option<AlleleStack> {
        stats.loci_scanned.fetch_add(1, Ordering::Relaxed);

        let n = self.founders.len();
        let mut processed = FounderSet::new(n);
        let mut members = [
            FounderSet::new(n),
            FounderSet::new(n),
            FounderSet::new(n),
            FounderSet::new(n),
        ];
        let mut counts = [0u32; 4];

        for (ordinal, founder) in self.founders.iter().enumerate() {
            // A short slice is a failed read for this founder; abort the locus.
            let byte = *founder.get(locus as usize)?;

            if self.require_all_aligned && !pba::has_coverage(byte) {
                stats.rejected_uncovered.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            if let Some(base) = pba::single_dirac(byte) {
                let founder_idx = ReadsetIdx::new(ordinal as u32);
                processed.insert(founder_idx);
                members[base.index()].insert(founder_idx);
                counts[base.index()] += 1;
            }
        }

        let has_unique = counts.iter().any(|&c| c == 1);
        if !has_unique {
            stats.rejected_no_unique.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        stats.stacks_emitted.fetch_add(1, Ordering::Relaxed);
        Some(AlleleStack {
            id: 0,
            chrom,
            locus,
            n_founders: n,
            processed,
            members,
            counts,
        })
    }

    /// Scan a locus range, appending accepted stacks in position order
    pub fn build_range(
        &self,
        chrom: ChromIdx,
        start: u32,
        end: u32,
        stats: &StackStats,
    ) -> Vec<AlleleStack> {
        (start..end)
            .filter_map(|locus| self.build_stack(chrom, locus, stats))
            .collect()
    }
}

/// Renumber stacks sequentially after the per-range scans are merged.
///
/// Stacks must already be sorted by (chromosome, locus).
pub fn assign_stack_ids(stacks: &mut [AlleleStack]) {
    for (i, stack) in stacks.iter_mut().enumerate() {
        stack.id = i as u32;
    }
}

/// Binary-search a sorted stack array for a (chromosome, locus) key
pub fn find_stack(stacks: &[AlleleStack], chrom: ChromIdx, locus: u32) -> Option<&AlleleStack> {
    stacks
        .binary_search_by_key(&(chrom, locus), |s| (s.chrom, s.locus))
        .ok()
        .map(|i| &stacks[i])
}
