//! # PBA File Format Support
//!
//! Reading and writing of PBA (packed base allele) panel files.
//!
//! PBA format structure:
//! - Header region, 500 bytes reserved:
//!   - Literal bytes `"Type:PbA\n"`
//!   - `Version:<int>\n`
//!   - `ExperimentID:<str>\n`
//!   - `ReferenceID:<str>\n`
//!   - `ReadsetID:<str>\0` (NUL-terminated, last tag)
//!   - Zero padding to offset 500
//! - Per chromosome record, concatenated until EOF:
//!   - 1 byte name length N
//!   - N bytes chromosome name
//!   - 4-byte little-endian signed chromosome length L
//!   - L raw PBA bytes, one per locus

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use memmap2::Mmap;

use crate::error::{HapError, Result};

/// Leading magic tag
const MAGIC: &[u8] = b"Type:PbA\n";

/// Reserved header region size in bytes
pub const HEADER_SIZE: usize = 500;

/// Current format version
pub const PBA_VERSION: i32 = 1;

/// Identity tags carried in a PBA header
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PbaHeader {
    pub version: i32,
    pub experiment_id: String,
    pub reference_id: String,
    pub readset_id: String,
}

/// Directory entry for one chromosome record within a PBA file
#[derive(Clone, Debug)]
pub struct PbaChromRecord {
    pub name: String,
    /// Locus count (record byte length)
    pub length: u32,
    /// File offset where the PBA bytes begin
    pub data_offset: u64,
}

/// Memory-mapped PBA file with a parsed header and chromosome directory.
///
/// Opening scans the chromosome records once to build the directory; the
/// allele bytes themselves are only touched when a chromosome is loaded.
#[derive(Debug)]
pub struct PbaFile {
    path: PathBuf,
    mmap: Mmap,
    header: PbaHeader,
    chroms: Vec<PbaChromRecord>,
}

impl PbaFile {
    /// Open and index a PBA file
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(HapError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let file = File::open(path)
            .with_context(|| format!("Failed to open PBA file {}", path.display()))
            .map_err(|e| HapError::pba(e.to_string()))?;
        // Safety: the mapping is read-only and the file is not expected to
        // be truncated while a run holds it open.
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to map PBA file {}", path.display()))
            .map_err(|e| HapError::pba(e.to_string()))?;

        let header = parse_header(&mmap)?;
        let chroms = scan_chrom_directory(&mmap)?;

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
            header,
            chroms,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn header(&self) -> &PbaHeader {
        &self.header
    }

    /// Chromosome records in file order
    pub fn chroms(&self) -> &[PbaChromRecord] {
        &self.chroms
    }

    /// Raw PBA bytes for one chromosome record
    pub fn chrom_data(&self, record: &PbaChromRecord) -> &[u8] {
        self.data_slice(record.data_offset, record.length)
    }

    /// Raw PBA bytes at a recorded (offset, length) pair
    pub fn data_slice(&self, offset: u64, length: u32) -> &[u8] {
        let start = offset as usize;
        &self.mmap[start..start + length as usize]
    }
}

/// Parse the fixed 500-byte header region
fn parse_header(data: &[u8]) -> Result<PbaHeader> {
    if data.len() < HEADER_SIZE {
        return Err(HapError::pba(format!(
            "file shorter than the {} byte header region",
            HEADER_SIZE
        )));
    }
    if &data[..MAGIC.len()] != MAGIC {
        return Err(HapError::pba("missing Type:PbA magic tag"));
    }

    let mut cursor = MAGIC.len();
    let version_text = read_tag(data, &mut cursor, "Version", b'\n')?;
    let version: i32 = version_text
        .parse()
        .map_err(|_| HapError::pba(format!("non-numeric Version tag '{}'", version_text)))?;
    let experiment_id = read_tag(data, &mut cursor, "ExperimentID", b'\n')?;
    let reference_id = read_tag(data, &mut cursor, "ReferenceID", b'\n')?;
    let readset_id = read_tag(data, &mut cursor, "ReadsetID", b'\0')?;

    Ok(PbaHeader {
        version,
        experiment_id,
        reference_id,
        readset_id,
    })
}

/// Read one `Name:<value>` tag terminated by `terminator`
fn read_tag(data: &[u8], cursor: &mut usize, name: &str, terminator: u8) -> Result<String> {
    let prefix = format!("{}:", name);
    let rest = &data[*cursor..HEADER_SIZE];
    if !rest.starts_with(prefix.as_bytes()) {
        return Err(HapError::pba(format!("missing {} header tag", name)));
    }
    let value_start = *cursor + prefix.len();
    let value_end = data[value_start..HEADER_SIZE]
        .iter()
        .position(|&b| b == terminator)
        .map(|p| value_start + p)
        .ok_or_else(|| HapError::pba(format!("unterminated {} header tag", name)))?;

    *cursor = value_end + 1;
    String::from_utf8(data[value_start..value_end].to_vec())
        .map_err(|_| HapError::pba(format!("non-UTF8 {} header tag", name)))
}

/// Scan chromosome records from the end of the header region to EOF
fn scan_chrom_directory(data: &[u8]) -> Result<Vec<PbaChromRecord>> {
    let mut chroms = Vec::new();
    let mut offset = HEADER_SIZE;

    while offset < data.len() {
        let name_len = data[offset] as usize;
        offset += 1;
        if name_len == 0 || offset + name_len + 4 > data.len() {
            return Err(HapError::pba(format!(
                "truncated chromosome record at offset {}",
                offset - 1
            )));
        }
        let name = String::from_utf8(data[offset..offset + name_len].to_vec())
            .map_err(|_| HapError::pba("non-UTF8 chromosome name"))?;
        offset += name_len;

        let length = i32::from_le_bytes([
            data[offset],
            data[offset + 1],
            data[offset + 2],
            data[offset + 3],
        ]);
        offset += 4;
        if length < 0 {
            return Err(HapError::pba(format!(
                "negative length for chromosome {}",
                name
            )));
        }
        let length = length as u32;
        if offset + length as usize > data.len() {
            return Err(HapError::pba(format!(
                "chromosome {} data extends past EOF",
                name
            )));
        }

        chroms.push(PbaChromRecord {
            name,
            length,
            data_offset: offset as u64,
        });
        offset += length as usize;
    }

    Ok(chroms)
}

/// Streaming PBA writer
pub struct PbaWriter {
    writer: BufWriter<File>,
}

impl PbaWriter {
    /// Create a PBA file and write its header region
    pub fn create(path: &Path, header: &PbaHeader) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create PBA file {}", path.display()))
            .map_err(|e| HapError::pba(e.to_string()))?;
        let mut writer = BufWriter::new(file);

        let mut region = Vec::with_capacity(HEADER_SIZE);
        region.extend_from_slice(MAGIC);
        region.extend_from_slice(format!("Version:{}\n", header.version).as_bytes());
        region.extend_from_slice(format!("ExperimentID:{}\n", header.experiment_id).as_bytes());
        region.extend_from_slice(format!("ReferenceID:{}\n", header.reference_id).as_bytes());
        region.extend_from_slice(format!("ReadsetID:{}\0", header.readset_id).as_bytes());
        if region.len() > HEADER_SIZE {
            return Err(HapError::pba(format!(
                "header tags overflow the {} byte header region",
                HEADER_SIZE
            )));
        }
        region.resize(HEADER_SIZE, 0);
        writer.write_all(&region)?;

        Ok(Self { writer })
    }

    /// Append one chromosome record
    pub fn write_chrom(&mut self, name: &str, pba: &[u8]) -> Result<()> {
        if name.is_empty() || name.len() > u8::MAX as usize {
            return Err(HapError::pba(format!(
                "chromosome name '{}' length must be 1..=255",
                name
            )));
        }
        if pba.len() > i32::MAX as usize {
            return Err(HapError::pba(format!(
                "chromosome {} exceeds the i32 locus limit",
                name
            )));
        }
        self.writer.write_all(&[name.len() as u8])?;
        self.writer.write_all(name.as_bytes())?;
        self.writer.write_all(&(pba.len() as i32).to_le_bytes())?;
        self.writer.write_all(pba)?;
        Ok(())
    }

    /// Flush and close
    pub fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
