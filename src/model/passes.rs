//! # Corrective Passes over Assignment Sequences
//!
//! Two windowed passes run after raw progeny assignment, per readset and per
//! chromosome, in position order:
//!
//! - **Heterozygosity-run imputation** rewrites single-founder calls as
//!   two-founder calls where the local alternation pattern between the two
//!   commonest founders looks like true heterozygosity rather than
//!   single-founder sampling noise.
//! - **Outlier smoothing** replaces isolated single-founder calls that
//!   disagree with both resolved neighbours.
//!
//! Both passes only ever overwrite the membership bitset of an alignment,
//! never its stack or locus identity.

use statrs::distribution::{ContinuousCDF, Normal};

use crate::data::founder_bits::FounderSet;
use crate::data::ReadsetIdx;
use crate::error::{HapError, Result};
use crate::model::assign::ProgenyFounderAlign;

/// Heterozygosity-run imputation thresholds.
///
/// The numeric defaults are empirically chosen calibration points, not
/// derived values; callers may tune them.
#[derive(Clone, Copy, Debug)]
pub struct HetImputeParams {
    /// Nearest resolved loci examined around the target
    pub window_loci: usize,
    /// Maximum genomic distance a window locus may sit from the target
    pub max_distance: u32,
    /// Minimum alternation runs before the test applies
    pub min_runs: usize,
    /// Minimum window loci before the test applies
    pub min_window: usize,
    /// Two-tailed significance level for the runs test
    pub alpha: f64,
}

impl Default for HetImputeParams {
    fn default() -> Self {
        Self {
            window_loci: 19,
            max_distance: 1_000_000,
            min_runs: 3,
            min_window: 6,
            alpha: 0.05,
        }
    }
}

/// Wald-Wolfowitz runs test: probability of seeing `runs` alternation runs
/// in a random interleaving of `n1` and `n2` symbols (two-tailed, normal
/// approximation).
fn runs_test_p(n1: usize, n2: usize, runs: usize) -> Result<f64> {
    let n1 = n1 as f64;
    let n2 = n2 as f64;
    let n = n1 + n2;
    if n1 == 0.0 || n2 == 0.0 || n < 2.0 {
        return Ok(0.0);
    }
    let mean = 2.0 * n1 * n2 / n + 1.0;
    let var = 2.0 * n1 * n2 * (2.0 * n1 * n2 - n) / (n * n * (n - 1.0));
    if var <= 0.0 {
        return Ok(0.0);
    }
    let z = (runs as f64 - mean) / var.sqrt();
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| HapError::algorithm(format!("runs test normal: {}", e)))?;
    Ok(2.0 * (1.0 - normal.cdf(z.abs())))
}

/// Count maximal runs of identical founders in a call sequence
fn count_runs(calls: &[ReadsetIdx]) -> usize {
    if calls.is_empty() {
        return 0;
    }
    1 + calls.windows(2).filter(|w| w[0] != w[1]).count()
}

/// Indices of the nearest resolved single-founder loci around `target`,
/// symmetric by genomic proximity, capped at `window_loci` and
/// `max_distance`. The target itself is excluded.
fn window_indices(
    sole: &[Option<ReadsetIdx>],
    loci: &[u32],
    target: usize,
    params: &HetImputeParams,
) -> Vec<usize> {
    let mut picked = Vec::with_capacity(params.window_loci);
    let mut left = target;
    let mut right = target + 1;

    // Walk candidate cursors past unresolved loci; loci are position-sorted,
    // so the first out-of-range candidate exhausts that side.
    let mut next_left = |left: &mut usize| -> Option<usize> {
        while *left > 0 {
            *left -= 1;
            if sole[*left].is_some() {
                if loci[target].abs_diff(loci[*left]) > params.max_distance {
                    return None;
                }
                return Some(*left);
            }
        }
        None
    };
    let mut next_right = |right: &mut usize| -> Option<usize> {
        while *right < sole.len() {
            let idx = *right;
            *right += 1;
            if sole[idx].is_some() {
                if loci[idx].abs_diff(loci[target]) > params.max_distance {
                    return None;
                }
                return Some(idx);
            }
        }
        None
    };

    let mut cand_left = next_left(&mut left);
    let mut cand_right = next_right(&mut right);

    while picked.len() < params.window_loci {
        match (cand_left, cand_right) {
            (Some(l), Some(r)) => {
                if loci[target].abs_diff(loci[l]) <= loci[r].abs_diff(loci[target]) {
                    picked.push(l);
                    cand_left = next_left(&mut left);
                } else {
                    picked.push(r);
                    cand_right = next_right(&mut right);
                }
            }
            (Some(l), None) => {
                picked.push(l);
                cand_left = next_left(&mut left);
            }
            (None, Some(r)) => {
                picked.push(r);
                cand_right = next_right(&mut right);
            }
            (None, None) => break,
        }
    }

    picked.sort_unstable();
    picked
}

/// Heterozygosity-run imputation.
///
/// Decisions are computed against a snapshot taken at pass start and applied
/// afterwards, so already-rewritten loci never feed later decisions within
/// the same pass. Returns the number of rewritten loci.
pub fn impute_heterozygous_runs(
    aligns: &mut [ProgenyFounderAlign],
    n_founders: usize,
    params: &HetImputeParams,
) -> Result<usize> {
    let sole: Vec<Option<ReadsetIdx>> =
        aligns.iter().map(|a| a.membership.sole_member()).collect();
    let loci: Vec<u32> = aligns.iter().map(|a| a.locus).collect();

    let mut rewrites: Vec<(usize, ReadsetIdx, ReadsetIdx)> = Vec::new();

    for target in 0..aligns.len() {
        let Some(own) = sole[target] else { continue };

        let window = window_indices(&sole, &loci, target, params);
        if window.len() < params.min_window {
            continue;
        }

        // Frequency census over the window, target included.
        let mut freq: Vec<(ReadsetIdx, usize)> = Vec::new();
        let mut credit = |founder: ReadsetIdx| {
            match freq.iter_mut().find(|(f, _)| *f == founder) {
                Some((_, count)) => *count += 1,
                None => freq.push((founder, 1)),
            }
        };
        credit(own);
        for &idx in &window {
            credit(sole[idx].unwrap());
        }
        freq.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        if freq.len() < 2 {
            continue;
        }
        let (fa, _) = freq[0];
        let (fb, _) = freq[1];
        if own != fa && own != fb {
            continue;
        }

        // Alternation structure of the Fa/Fb calls in position order.
        let mut calls: Vec<(u32, ReadsetIdx)> = window
            .iter()
            .map(|&idx| (loci[idx], sole[idx].unwrap()))
            .chain(std::iter::once((loci[target], own)))
            .filter(|&(_, f)| f == fa || f == fb)
            .collect();
        calls.sort_unstable_by_key(|&(locus, _)| locus);
        let sequence: Vec<ReadsetIdx> = calls.iter().map(|&(_, f)| f).collect();

        let runs = count_runs(&sequence);
        if runs < params.min_runs {
            continue;
        }
        let n1 = sequence.iter().filter(|&&f| f == fa).count();
        let n2 = sequence.len() - n1;

        // A pattern the runs test cannot distinguish from a random
        // interleaving of the two founders is read as true heterozygosity.
        if runs_test_p(n1, n2, runs)? >= params.alpha {
            rewrites.push((target, fa, fb));
        }
    }

    let n_rewrites = rewrites.len();
    for (idx, fa, fb) in rewrites {
        let mut membership = FounderSet::new(n_founders);
        membership.insert(fa);
        membership.insert(fb);
        aligns[idx].membership = membership;
    }
    Ok(n_rewrites)
}

/// Outlier smoothing.
///
/// Single-founder loci disagreeing with every resolved neighbour within
/// `max_distance` are replaced by the nearer neighbour's call. Applied
/// strictly read-then-write in position order; multi-founder calls are
/// never touched. Running the pass twice yields the run-once result.
pub fn smooth_outliers(aligns: &mut [ProgenyFounderAlign], max_distance: u32) -> usize {
    let mut corrected = 0;

    for i in 0..aligns.len() {
        if aligns[i].membership.count() != 1 {
            continue;
        }
        let locus = aligns[i].locus;

        let left = i
            .checked_sub(1)
            .filter(|&l| locus.abs_diff(aligns[l].locus) <= max_distance);
        let right = (i + 1 < aligns.len())
            .then_some(i + 1)
            .filter(|&r| aligns[r].locus.abs_diff(locus) <= max_distance);

        let disagrees =
            |n: usize, aligns: &[ProgenyFounderAlign]| aligns[n].membership != aligns[i].membership;

        let replacement = match (left, right) {
            (None, None) => None,
            (Some(l), None) => disagrees(l, aligns).then_some(l),
            (None, Some(r)) => disagrees(r, aligns).then_some(r),
            (Some(l), Some(r)) => {
                if disagrees(l, aligns) && disagrees(r, aligns) {
                    let left_dist = locus.abs_diff(aligns[l].locus);
                    let right_dist = aligns[r].locus.abs_diff(locus);
                    Some(if left_dist <= right_dist { l } else { r })
                } else {
                    None
                }
            }
        };

        if let Some(n) = replacement {
            aligns[i].membership = aligns[n].membership.clone();
            corrected += 1;
        }
    }

    corrected
}
