//! # Readsets and the PBA Store
//!
//! A [`Readset`] is one loaded genome sample: its identity, role, source
//! file, and per-chromosome metadata. Chromosome allele buffers are loaded
//! on demand and explicitly released once a chromosome has been processed,
//! bounding peak memory to one chromosome's worth of loci per readset.

use std::path::Path;
use std::sync::Arc;

use crate::data::pba;
use crate::data::ChromIdx;
use crate::error::{HapError, Result};
use crate::io::pba::PbaFile;

/// Role of a readset within a run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadsetType {
    /// Reference panel genome defining distinguishable haplotypes
    Founder,
    /// Sampled genome assigned to founders locus by locus
    Progeny,
    /// Loaded and reported but excluded from stacks and grouping
    Control,
}

impl ReadsetType {
    pub fn label(self) -> &'static str {
        match self {
            ReadsetType::Founder => "founder",
            ReadsetType::Progeny => "progeny",
            ReadsetType::Control => "control",
        }
    }
}

/// Per (readset, chromosome) record
#[derive(Debug)]
pub struct ChromMetadata {
    /// Registry chromosome handle
    pub chrom: ChromIdx,
    /// Locus count
    pub length: u32,
    /// File offset where the PBA bytes begin
    pub data_offset: u64,
    /// Lazily loaded allele bytes, present only between load and free
    buffer: Option<Vec<u8>>,
}

/// Byte-level validation outcome for one chromosome load
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadStats {
    /// Loci promoted from a lone moderate call to a dirac
    pub promoted: u64,
    /// Non-conformant loci zeroed
    pub zeroed: u64,
}

/// One loaded genome sample
#[derive(Debug)]
pub struct Readset {
    id: Arc<str>,
    ty: ReadsetType,
    file: PbaFile,
    chroms: Vec<ChromMetadata>,
}

impl Readset {
    /// Open a PBA file as a readset of the given type.
    ///
    /// `register` is called once per chromosome record with its name and
    /// length; it returns the registry handle for accepted chromosomes and
    /// `None` for chromosomes trimmed by the include/exclude filter.
    pub fn open<F>(path: &Path, ty: ReadsetType, mut register: F) -> Result<Self>
    where
        F: FnMut(&str, u32) -> Result<Option<ChromIdx>>,
    {
        let file = PbaFile::open(path)?;
        let id: Arc<str> = file.header().readset_id.as_str().into();
        if id.is_empty() {
            return Err(HapError::pba(format!(
                "{} carries an empty ReadsetID tag",
                path.display()
            )));
        }

        let mut chroms = Vec::with_capacity(file.chroms().len());
        for record in file.chroms() {
            if let Some(chrom) = register(&record.name, record.length)? {
                chroms.push(ChromMetadata {
                    chrom,
                    length: record.length,
                    data_offset: record.data_offset,
                    buffer: None,
                });
            }
        }

        Ok(Self {
            id,
            ty,
            file,
            chroms,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn id_arc(&self) -> Arc<str> {
        self.id.clone()
    }

    pub fn readset_type(&self) -> ReadsetType {
        self.ty
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Chromosome records surviving the filter, in file order
    pub fn chrom_metadata(&self) -> &[ChromMetadata] {
        &self.chroms
    }

    fn meta_index(&self, chrom: ChromIdx) -> Option<usize> {
        self.chroms.iter().position(|m| m.chrom == chrom)
    }

    /// Whether this readset carries the chromosome at all
    pub fn has_chrom(&self, chrom: ChromIdx) -> bool {
        self.meta_index(chrom).is_some()
    }

    /// Load and normalise one chromosome's PBA bytes.
    ///
    /// Every byte is normalised exactly once on load: lone moderate calls
    /// are promoted to diracs and non-conformant bytes are zeroed, so all
    /// downstream code sees conformant bytes only. Reloading an
    /// already-loaded chromosome is a no-op.
    pub fn load_chrom(&mut self, chrom: ChromIdx) -> Result<LoadStats> {
        let idx = self.meta_index(chrom).ok_or_else(|| {
            HapError::invalid_data(format!(
                "readset {} has no record for chromosome index {}",
                self.id,
                chrom.as_usize()
            ))
        })?;
        if self.chroms[idx].buffer.is_some() {
            return Ok(LoadStats::default());
        }

        let mut buffer = self
            .file
            .data_slice(self.chroms[idx].data_offset, self.chroms[idx].length)
            .to_vec();

        let mut stats = LoadStats::default();
        for byte in buffer.iter_mut() {
            let normalised = pba::normalise(*byte);
            if normalised != *byte {
                if normalised == 0 {
                    stats.zeroed += 1;
                } else {
                    stats.promoted += 1;
                }
                *byte = normalised;
            }
        }

        self.chroms[idx].buffer = Some(buffer);
        Ok(stats)
    }

    /// Loaded PBA bytes for a chromosome, if resident
    pub fn chrom_pba(&self, chrom: ChromIdx) -> Option<&[u8]> {
        self.meta_index(chrom)
            .and_then(|i| self.chroms[i].buffer.as_deref())
    }

    /// PBA byte at one locus, if the chromosome is resident and in range
    #[inline]
    pub fn pba_at(&self, chrom: ChromIdx, locus: u32) -> Option<u8> {
        self.chrom_pba(chrom)
            .and_then(|bytes| bytes.get(locus as usize).copied())
    }

    /// Release a chromosome's buffer
    pub fn free_chrom(&mut self, chrom: ChromIdx) {
        if let Some(idx) = self.meta_index(chrom) {
            self.chroms[idx].buffer = None;
        }
    }

    /// Release every resident buffer
    pub fn free_all(&mut self) {
        for meta in &mut self.chroms {
            meta.buffer = None;
        }
    }

    /// Resident buffer memory in bytes
    pub fn resident_bytes(&self) -> usize {
        self.chroms
            .iter()
            .filter_map(|m| m.buffer.as_ref().map(|b| b.len()))
            .sum()
    }
}
