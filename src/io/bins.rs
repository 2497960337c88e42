//! # CSV Record Streams
//!
//! Bin specifications and previously generated haplotype-group files in;
//! haplotype-group, QGL, and per-locus haplotype call reports out. The core
//! treats these as opaque record streams: all resolution of names to
//! registry handles happens in the pipelines.

use std::fs::File;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{HapError, Result};

/// One haplotype-group bin specification row
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct BinSpecRow {
    #[serde(rename = "Chrom")]
    pub chrom: String,
    #[serde(rename = "StartLoci")]
    pub start: u32,
    #[serde(rename = "Length")]
    pub length: u32,
    #[serde(rename = "MinCentroidDistance")]
    pub min_centroid: u32,
    #[serde(rename = "MaxCentroidDistance")]
    pub max_centroid: u32,
    #[serde(rename = "MaxNumHaplotypeGroups")]
    pub max_groups: u32,
}

/// One haplotype-group result row: a single group of one bin.
///
/// Founder membership is written as a `;`-joined list of readset IDs so
/// group files remain portable across runs.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct GroupRow {
    #[serde(rename = "ExperimentID")]
    pub experiment: String,
    #[serde(rename = "Chrom")]
    pub chrom: String,
    #[serde(rename = "StartLoci")]
    pub start: u32,
    #[serde(rename = "Length")]
    pub length: u32,
    #[serde(rename = "CentroidDistance")]
    pub centroid: u32,
    #[serde(rename = "GroupID")]
    pub group: u32,
    #[serde(rename = "Founders")]
    pub founders: String,
}

/// One QGL report row: a locus with at least one group-specific allele
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct QglRow {
    #[serde(rename = "ExperimentID")]
    pub experiment: String,
    #[serde(rename = "RowID")]
    pub row: u64,
    #[serde(rename = "Chrom")]
    pub chrom: String,
    #[serde(rename = "Loci")]
    pub locus: u32,
    #[serde(rename = "NumHaplotypeGroups")]
    pub n_groups: u32,
    #[serde(rename = "AlleleAGroup")]
    pub a_group: Option<u32>,
    #[serde(rename = "AlleleAFbeta")]
    pub a_score: Option<f64>,
    #[serde(rename = "AlleleCGroup")]
    pub c_group: Option<u32>,
    #[serde(rename = "AlleleCFbeta")]
    pub c_score: Option<f64>,
    #[serde(rename = "AlleleGGroup")]
    pub g_group: Option<u32>,
    #[serde(rename = "AlleleGFbeta")]
    pub g_score: Option<f64>,
    #[serde(rename = "AlleleTGroup")]
    pub t_group: Option<u32>,
    #[serde(rename = "AlleleTFbeta")]
    pub t_score: Option<f64>,
    #[serde(rename = "GroupMemberCounts")]
    pub member_counts: String,
}

/// One per-locus haplotype call row for a progeny readset
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct HaplotypeCallRow {
    #[serde(rename = "ReadsetID")]
    pub readset: String,
    #[serde(rename = "Chrom")]
    pub chrom: String,
    #[serde(rename = "Loci")]
    pub locus: u32,
    #[serde(rename = "Founders")]
    pub founders: String,
    #[serde(rename = "Call")]
    pub call: String,
}

/// Read bin specifications from a headered CSV file
pub fn read_bin_specs(path: &Path) -> Result<Vec<BinSpecRow>> {
    if !path.exists() {
        return Err(HapError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        let row: BinSpecRow = result?;
        if row.length == 0 {
            return Err(HapError::invalid_data(format!(
                "bin at {}:{} has zero length",
                row.chrom, row.start
            )));
        }
        if row.min_centroid > row.max_centroid {
            return Err(HapError::invalid_data(format!(
                "bin at {}:{} has MinCentroidDistance {} above MaxCentroidDistance {}",
                row.chrom, row.start, row.min_centroid, row.max_centroid
            )));
        }
        rows.push(row);
    }
    Ok(rows)
}

/// Read a previously generated haplotype-group file
pub fn read_group_rows(path: &Path) -> Result<Vec<GroupRow>> {
    if !path.exists() {
        return Err(HapError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for result in reader.deserialize() {
        rows.push(result?);
    }
    Ok(rows)
}

/// Typed CSV report writer over a created file
pub struct ReportWriter<T: Serialize> {
    writer: csv::Writer<File>,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Serialize> ReportWriter<T> {
    pub fn create(path: &Path) -> Result<Self> {
        let writer = csv::Writer::from_path(path)?;
        Ok(Self {
            writer,
            _marker: std::marker::PhantomData,
        })
    }

    pub fn write(&mut self, row: &T) -> Result<()> {
        self.writer.serialize(row)?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
