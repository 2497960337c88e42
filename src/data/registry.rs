//! # Genome Registry
//!
//! Interns chromosome and readset names to small integer IDs and owns the
//! reference chromosome length table. All other components refer to
//! chromosomes and readsets by [`ChromIdx`] / [`ReadsetIdx`] handles.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use crate::data::founder_bits::MAX_FOUNDER_READSETS;
use crate::data::readset::{Readset, ReadsetType};
use crate::data::{ChromIdx, ReadsetIdx};
use crate::error::{HapError, Result};

/// Regex-based chromosome accept/reject predicate.
///
/// The verdict for each newly-seen chromosome name is computed once and
/// cached by the registry.
#[derive(Clone, Debug, Default)]
pub struct ChromFilter {
    include: Option<Regex>,
    exclude: Option<Regex>,
}

impl ChromFilter {
    pub fn new(include: Option<Regex>, exclude: Option<Regex>) -> Self {
        Self { include, exclude }
    }

    /// Accept a chromosome name. Exclusion wins over inclusion; with no
    /// include pattern every non-excluded name is accepted.
    fn accept(&self, name: &str) -> bool {
        if let Some(exclude) = &self.exclude {
            if exclude.is_match(name) {
                return false;
            }
        }
        match &self.include {
            Some(include) => include.is_match(name),
            None => true,
        }
    }
}

/// Per-chromosome registry entry
#[derive(Clone, Debug)]
struct ChromEntry {
    name: Arc<str>,
    /// Reference length in loci; 0 until a sizes file or PBA supplies it
    length: u32,
    /// Cached filter verdict
    accepted: bool,
}

/// The genome registry: chromosome and readset tables for one run
#[derive(Debug, Default)]
pub struct GenomeRegistry {
    chroms: Vec<ChromEntry>,
    chrom_by_name: HashMap<Arc<str>, ChromIdx>,
    readsets: Vec<Readset>,
    readset_by_id: HashMap<Arc<str>, ReadsetIdx>,
    filter: ChromFilter,
}

impl GenomeRegistry {
    pub fn new(filter: ChromFilter) -> Self {
        Self {
            filter,
            ..Default::default()
        }
    }

    /// Intern a chromosome name, computing the filter verdict on first sight
    pub fn add_chrom(&mut self, name: &str) -> ChromIdx {
        if let Some(&idx) = self.chrom_by_name.get(name) {
            return idx;
        }
        let name: Arc<str> = name.into();
        let accepted = self.filter.accept(&name);
        let idx = ChromIdx::new(self.chroms.len() as u16);
        self.chroms.push(ChromEntry {
            name: name.clone(),
            length: 0,
            accepted,
        });
        self.chrom_by_name.insert(name, idx);
        idx
    }

    /// Record the reference length for a chromosome.
    ///
    /// A later conflicting length is an error: PBA panels must agree with
    /// the reference assembly they were called against.
    pub fn set_chrom_length(&mut self, chrom: ChromIdx, length: u32) -> Result<()> {
        let entry = &mut self.chroms[chrom.as_usize()];
        if entry.length != 0 && entry.length != length {
            return Err(HapError::invalid_data(format!(
                "chromosome {} length {} conflicts with previously registered {}",
                entry.name, length, entry.length
            )));
        }
        entry.length = length;
        Ok(())
    }

    /// Look up a chromosome by name
    pub fn chrom_by_name(&self, name: &str) -> Option<ChromIdx> {
        self.chrom_by_name.get(name).copied()
    }

    /// Chromosome name for an index
    pub fn chrom_name(&self, chrom: ChromIdx) -> &str {
        &self.chroms[chrom.as_usize()].name
    }

    /// Reference length in loci (0 if never registered)
    pub fn chrom_length(&self, chrom: ChromIdx) -> u32 {
        self.chroms[chrom.as_usize()].length
    }

    /// Cached include/exclude verdict
    pub fn chrom_accepted(&self, chrom: ChromIdx) -> bool {
        self.chroms[chrom.as_usize()].accepted
    }

    /// Number of interned chromosomes
    pub fn n_chroms(&self) -> usize {
        self.chroms.len()
    }

    /// Iterate accepted chromosomes in interning order
    pub fn accepted_chroms(&self) -> impl Iterator<Item = ChromIdx> + '_ {
        self.chroms
            .iter()
            .enumerate()
            .filter(|(_, e)| e.accepted)
            .map(|(i, _)| ChromIdx::new(i as u16))
    }

    /// Register a readset, enforcing unique IDs and the founder cap
    pub fn add_readset(&mut self, readset: Readset) -> Result<ReadsetIdx> {
        if self.readset_by_id.contains_key(readset.id()) {
            return Err(HapError::invalid_data(format!(
                "duplicate readset ID {}",
                readset.id()
            )));
        }
        if readset.readset_type() == ReadsetType::Founder
            && self.n_founders() >= MAX_FOUNDER_READSETS
        {
            return Err(HapError::invalid_data(format!(
                "founder panel exceeds the {} readset cap",
                MAX_FOUNDER_READSETS
            )));
        }
        let idx = ReadsetIdx::new(self.readsets.len() as u32);
        self.readset_by_id.insert(readset.id_arc(), idx);
        self.readsets.push(readset);
        Ok(idx)
    }

    /// Look up a readset by its ID string
    pub fn readset_by_id(&self, id: &str) -> Option<ReadsetIdx> {
        self.readset_by_id.get(id).copied()
    }

    pub fn readset(&self, idx: ReadsetIdx) -> &Readset {
        &self.readsets[idx.as_usize()]
    }

    pub fn readset_mut(&mut self, idx: ReadsetIdx) -> &mut Readset {
        &mut self.readsets[idx.as_usize()]
    }

    /// All readsets, in registration order
    pub fn readsets(&self) -> &[Readset] {
        &self.readsets
    }

    /// Mutable access to the readset table for parallel loading
    pub fn readsets_mut(&mut self) -> &mut [Readset] {
        &mut self.readsets
    }

    /// Indices of readsets of one type, in registration order
    pub fn readsets_of_type(&self, ty: ReadsetType) -> Vec<ReadsetIdx> {
        self.readsets
            .iter()
            .enumerate()
            .filter(|(_, r)| r.readset_type() == ty)
            .map(|(i, _)| ReadsetIdx::new(i as u32))
            .collect()
    }

    pub fn n_founders(&self) -> usize {
        self.readsets
            .iter()
            .filter(|r| r.readset_type() == ReadsetType::Founder)
            .count()
    }

    /// Release every loaded chromosome buffer and forget all readsets and
    /// chromosomes. The filter survives a reset.
    pub fn reset(&mut self) {
        self.chroms.clear();
        self.chrom_by_name.clear();
        self.readsets.clear();
        self.readset_by_id.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chrom_interning() {
        let mut registry = GenomeRegistry::new(ChromFilter::default());
        let chr1 = registry.add_chrom("chr1");
        let chr2 = registry.add_chrom("chr2");
        assert_ne!(chr1, chr2);
        assert_eq!(registry.add_chrom("chr1"), chr1);
        assert_eq!(registry.chrom_name(chr2), "chr2");
        assert_eq!(registry.chrom_by_name("chr1"), Some(chr1));
        assert_eq!(registry.n_chroms(), 2);
    }

    #[test]
    fn test_chrom_length_conflict() {
        let mut registry = GenomeRegistry::new(ChromFilter::default());
        let chr1 = registry.add_chrom("chr1");
        registry.set_chrom_length(chr1, 5000).unwrap();
        assert_eq!(registry.chrom_length(chr1), 5000);
        assert!(registry.set_chrom_length(chr1, 4999).is_err());
        assert!(registry.set_chrom_length(chr1, 5000).is_ok());
    }

    #[test]
    fn test_filter_verdict_cached() {
        let filter = ChromFilter::new(
            Some(Regex::new(r"^chr\d+$").unwrap()),
            Some(Regex::new(r"^chrM").unwrap()),
        );
        let mut registry = GenomeRegistry::new(filter);
        let chr1 = registry.add_chrom("chr1");
        let chr_m = registry.add_chrom("chrM");
        let scaffold = registry.add_chrom("scaffold_12");

        assert!(registry.chrom_accepted(chr1));
        assert!(!registry.chrom_accepted(chr_m));
        assert!(!registry.chrom_accepted(scaffold));

        let accepted: Vec<_> = registry.accepted_chroms().collect();
        assert_eq!(accepted, vec![chr1]);
    }

    #[test]
    fn test_reset_clears_tables_keeps_filter() {
        let filter = ChromFilter::new(None, Some(Regex::new(r"^chrM").unwrap()));
        let mut registry = GenomeRegistry::new(filter);
        registry.add_chrom("chr1");
        registry.add_chrom("chrM");

        registry.reset();
        assert_eq!(registry.n_chroms(), 0);
        assert!(registry.readsets().is_empty());

        // The filter survives and still applies to re-interned names.
        let chr_m = registry.add_chrom("chrM");
        assert!(!registry.chrom_accepted(chr_m));
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let filter = ChromFilter::new(
            Some(Regex::new(r"chr").unwrap()),
            Some(Regex::new(r"chrUn").unwrap()),
        );
        let mut registry = GenomeRegistry::new(filter);
        let chr_un = registry.add_chrom("chrUn_KI270302v1");
        assert!(!registry.chrom_accepted(chr_un));
    }
}
