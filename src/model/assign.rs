//! # Progeny Assignment Engine
//!
//! Compares a progeny's PBA byte against the allele stack at the same locus
//! and produces a founder-membership bitset. Progeny are modelled as
//! diploid: a call can implicate at most two founders, and anything noisier
//! is rejected rather than guessed.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::data::founder_bits::FounderSet;
use crate::data::pba::{self, CONF_LOW};
use crate::model::stack::AlleleStack;

/// Why a progeny locus was rejected
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RejectCause {
    /// No read coverage at the locus
    NoCoverage,
    /// Some allele slot sits at confidence 1, statistically too weak
    LowConfidence,
    /// An allele no founder carries: introgression or noise
    UnknownAllele,
    /// More than two allele slots accepted
    TooManyAlleles,
    /// The implied founder set exceeds the two diploid contributors
    TooManyFounders,
    /// No accepted allele uniquely identifies a founder
    NonInformative,
}

/// Outcome of assigning one progeny locus
#[derive(Clone, Debug, PartialEq)]
pub enum MembershipResult {
    /// A single dominant allele resolved the locus
    Monoallelic(FounderSet),
    /// Two moderate-or-better alleles resolved jointly
    Biallelic(FounderSet),
    Rejected(RejectCause),
}

/// Per (progeny, chromosome, locus) assignment record.
///
/// Later corrective passes may overwrite the membership bitset but never
/// the stack/locus identity.
#[derive(Clone, Debug, PartialEq)]
pub struct ProgenyFounderAlign {
    pub stack_id: u32,
    pub locus: u32,
    pub raw_pba: u8,
    pub membership: FounderSet,
}

/// Assignment statistics, shared across worker threads
#[derive(Debug, Default)]
pub struct AssignStats {
    pub accepted_mono: AtomicU64,
    pub accepted_bi: AtomicU64,
    pub rejected_no_coverage: AtomicU64,
    pub rejected_low_confidence: AtomicU64,
    pub rejected_unknown_allele: AtomicU64,
    pub rejected_too_many: AtomicU64,
    pub rejected_non_informative: AtomicU64,
}

impl AssignStats {
    pub fn record(&self, result: &MembershipResult) {
        let counter = match result {
            MembershipResult::Monoallelic(_) => &self.accepted_mono,
            MembershipResult::Biallelic(_) => &self.accepted_bi,
            MembershipResult::Rejected(RejectCause::NoCoverage) => &self.rejected_no_coverage,
            MembershipResult::Rejected(RejectCause::LowConfidence) => {
                &self.rejected_low_confidence
            }
            MembershipResult::Rejected(RejectCause::UnknownAllele) => {
                &self.rejected_unknown_allele
            }
            MembershipResult::Rejected(RejectCause::TooManyAlleles)
            | MembershipResult::Rejected(RejectCause::TooManyFounders) => &self.rejected_too_many,
            MembershipResult::Rejected(RejectCause::NonInformative) => {
                &self.rejected_non_informative
            }
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn accepted(&self) -> u64 {
        self.accepted_mono.load(Ordering::Relaxed) + self.accepted_bi.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected_no_coverage.load(Ordering::Relaxed)
            + self.rejected_low_confidence.load(Ordering::Relaxed)
            + self.rejected_unknown_allele.load(Ordering::Relaxed)
            + self.rejected_too_many.load(Ordering::Relaxed)
            + self.rejected_non_informative.load(Ordering::Relaxed)
    }
}

/// Assign one progeny PBA byte against the stack at the same locus.
pub fn assign(progeny_pba: u8, stack: &AlleleStack) -> MembershipResult {
    if !pba::has_coverage(progeny_pba) {
        return MembershipResult::Rejected(RejectCause::NoCoverage);
    }

    let present: Vec<_> = pba::present_alleles(progeny_pba).collect();

    // A single low-confidence slot poisons the whole byte.
    if present.iter().any(|&(_, conf)| conf == CONF_LOW) {
        return MembershipResult::Rejected(RejectCause::LowConfidence);
    }
    // Every allele the progeny shows must exist somewhere in the panel.
    if present
        .iter()
        .any(|&(base, _)| stack.count_for(base) == 0)
    {
        return MembershipResult::Rejected(RejectCause::UnknownAllele);
    }
    if present.len() > 2 {
        return MembershipResult::Rejected(RejectCause::TooManyAlleles);
    }
    // At least one accepted allele must uniquely identify a founder,
    // otherwise the locus contributes nothing.
    if !present.iter().any(|&(base, _)| stack.is_unique(base)) {
        return MembershipResult::Rejected(RejectCause::NonInformative);
    }

    let mut membership = FounderSet::new(stack.n_founders);
    for &(base, _) in &present {
        membership.union_with(stack.founders_for(base));
    }
    if membership.count() > 2 {
        return MembershipResult::Rejected(RejectCause::TooManyFounders);
    }

    if present.len() == 1 {
        MembershipResult::Monoallelic(membership)
    } else {
        MembershipResult::Biallelic(membership)
    }
}

/// Assign one locus and materialise an alignment record only on acceptance
pub fn assign_locus(
    progeny_pba: u8,
    stack: &AlleleStack,
    stats: &AssignStats,
) -> Option<ProgenyFounderAlign> {
    let result = assign(progeny_pba, stack);
    stats.record(&result);
    match result {
        MembershipResult::Monoallelic(membership) | MembershipResult::Biallelic(membership) => {
            Some(ProgenyFounderAlign {
                stack_id: stack.id,
                locus: stack.locus,
                raw_pba: progeny_pba,
                membership,
            })
        }
        MembershipResult::Rejected(_) => None,
    }
}
