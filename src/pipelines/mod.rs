//! # Pipeline Module
//!
//! High-level orchestration of the two calling paths: progeny haplotype
//! assignment and haplotype grouping. Coordinates registration, parallel
//! per-chromosome PBA loading, the worker pools, and report emission.

pub mod grouping;
pub mod haplotyping;

pub use grouping::{GroupingPipeline, GroupingSummary};
pub use haplotyping::{HaplotypingPipeline, HaplotypingSummary};

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::Config;
use crate::data::readset::{Readset, ReadsetType};
use crate::data::registry::GenomeRegistry;
use crate::data::{ChromIdx, ReadsetIdx};
use crate::error::{HapError, Result};
use crate::io::genome_sizes::load_genome_sizes;
use crate::utils::threading::PoolCoordinator;

/// Build a registry, seed it from the genome sizes file if configured, and
/// register every readset. Founders are registered first so founder panel
/// ordinals coincide with registry indices.
pub(crate) fn build_registry(config: &Config) -> Result<(GenomeRegistry, PanelIndex)> {
    let mut registry = GenomeRegistry::new(config.chrom_filter()?);

    if let Some(path) = &config.genome_sizes {
        for (name, length) in load_genome_sizes(path)? {
            let chrom = registry.add_chrom(&name);
            if registry.chrom_accepted(chrom) {
                registry.set_chrom_length(chrom, length)?;
            }
        }
    }

    let founders = register_readsets(&mut registry, &config.founders, ReadsetType::Founder)?;
    let progeny = register_readsets(&mut registry, &config.progeny, ReadsetType::Progeny)?;
    let controls = register_readsets(&mut registry, &config.controls, ReadsetType::Control)?;

    info!(
        founders = founders.len(),
        progeny = progeny.len(),
        controls = controls.len(),
        chroms = registry.n_chroms(),
        "panel registered"
    );

    Ok((
        registry,
        PanelIndex {
            founders,
            progeny,
            controls,
        },
    ))
}

/// Registry handles for the three readset roles
pub(crate) struct PanelIndex {
    pub founders: Vec<ReadsetIdx>,
    pub progeny: Vec<ReadsetIdx>,
    pub controls: Vec<ReadsetIdx>,
}

fn register_readsets(
    registry: &mut GenomeRegistry,
    paths: &[PathBuf],
    ty: ReadsetType,
) -> Result<Vec<ReadsetIdx>> {
    let mut indices = Vec::with_capacity(paths.len());
    for path in paths {
        let readset = Readset::open(path, ty, |name, length| {
            let chrom = registry.add_chrom(name);
            if !registry.chrom_accepted(chrom) {
                return Ok(None);
            }
            registry.set_chrom_length(chrom, length)?;
            Ok(Some(chrom))
        })?;
        debug!(id = readset.id(), ty = ty.label(), "readset opened");
        indices.push(registry.add_readset(readset)?);
    }
    Ok(indices)
}

/// Aggregate byte-normalisation totals for one parallel load
#[derive(Debug, Default)]
pub(crate) struct LoadTotals {
    pub promoted: AtomicU64,
    pub zeroed: AtomicU64,
}

/// Load one chromosome for every masked readset, fanning contiguous readset
/// slices out over the pool. All loads complete (or the run dies) before
/// any downstream work sees the chromosome.
pub(crate) fn load_chrom_parallel(
    pool: &rayon::ThreadPool,
    readsets: &mut [Readset],
    wanted: &[bool],
    chrom: ChromIdx,
    totals: &LoadTotals,
) -> Result<()> {
    let n_threads = pool.current_num_threads().max(1);
    let chunk = readsets.len().div_ceil(n_threads).max(1);
    let n_chunks = readsets.len().div_ceil(chunk);
    if n_chunks == 0 {
        return Ok(());
    }

    let coordinator = PoolCoordinator::new();
    let first_error: Mutex<Option<HapError>> = Mutex::new(None);

    pool.install(|| {
        readsets
            .par_chunks_mut(chunk)
            .enumerate()
            .for_each(|(chunk_idx, slice)| {
                coordinator.register_start();
                for (offset, readset) in slice.iter_mut().enumerate() {
                    if coordinator.terminate_requested() {
                        break;
                    }
                    let idx = chunk_idx * chunk + offset;
                    if !wanted[idx] || !readset.has_chrom(chrom) {
                        continue;
                    }
                    match readset.load_chrom(chrom) {
                        Ok(stats) => {
                            totals.promoted.fetch_add(stats.promoted, Ordering::Relaxed);
                            totals.zeroed.fetch_add(stats.zeroed, Ordering::Relaxed);
                        }
                        Err(e) => {
                            let mut slot = first_error.lock().unwrap();
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                            coordinator.request_terminate();
                            break;
                        }
                    }
                }
                coordinator.register_completion();
            });
    });

    if let Some(error) = first_error.into_inner().unwrap() {
        return Err(error);
    }
    coordinator.verify_all_done(n_chunks)
}

/// Free one chromosome's buffers across all loaded readsets
pub(crate) fn free_chrom(registry: &mut GenomeRegistry, chrom: ChromIdx) {
    for readset in registry.readsets_mut() {
        readset.free_chrom(chrom);
    }
}

/// Derive an output path from the run prefix
pub(crate) fn with_suffix(prefix: &std::path::Path, suffix: &str) -> PathBuf {
    PathBuf::from(format!("{}.{}", prefix.display(), suffix))
}

/// Semicolon-joined readset IDs for a founder-ordinal bitset
pub(crate) fn founder_names(
    registry: &GenomeRegistry,
    founder_ids: &[ReadsetIdx],
    members: impl Iterator<Item = ReadsetIdx>,
) -> String {
    members
        .map(|ordinal| registry.readset(founder_ids[ordinal.as_usize()]).id())
        .collect::<Vec<_>>()
        .join(";")
}
