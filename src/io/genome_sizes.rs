//! # Genome Size Loading
//!
//! Reads the chromosome name to length mapping used to validate PBA
//! chromosome lengths. Accepts two tab-separated layouts: a two-column
//! sizes file (`chrom<TAB>length`) or BED records (`chrom<TAB>start<TAB>end`),
//! where the largest end coordinate seen for a chromosome wins.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use crate::error::{HapError, Result};

/// Load chromosome lengths, preserving first-seen order
pub fn load_genome_sizes(path: &Path) -> Result<Vec<(String, u32)>> {
    if !path.exists() {
        return Err(HapError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .comment(Some(b'#'))
        .flexible(true)
        .from_reader(file);

    let mut order: Vec<String> = Vec::new();
    let mut lengths: HashMap<String, u32> = HashMap::new();

    for (line, record) in reader.records().enumerate() {
        let record = record?;
        if record.len() < 2 {
            return Err(HapError::parse(line + 1, "expected at least 2 columns"));
        }
        let chrom = record[0].trim().to_string();
        if chrom.is_empty() {
            return Err(HapError::parse(line + 1, "empty chromosome name"));
        }

        let end: u32 = if record.len() >= 3 {
            // BED record: chrom, start, end
            record[2].trim().parse().map_err(|_| {
                HapError::parse(line + 1, format!("non-numeric end '{}'", &record[2]))
            })?
        } else {
            record[1].trim().parse().map_err(|_| {
                HapError::parse(line + 1, format!("non-numeric length '{}'", &record[1]))
            })?
        };

        match lengths.get_mut(&chrom) {
            Some(existing) => *existing = (*existing).max(end),
            None => {
                order.push(chrom.clone());
                lengths.insert(chrom, end);
            }
        }
    }

    Ok(order
        .into_iter()
        .map(|chrom| {
            let length = lengths[&chrom];
            (chrom, length)
        })
        .collect())
}
