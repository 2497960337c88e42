//! # WIG Track Emission
//!
//! Fixed-span wiggle output for genome-browser inspection of per-bin and
//! per-window values. The emitter's only intelligence is span merging:
//! adjacent spans whose values differ by less than a relative tolerance are
//! coalesced before writing, keeping browser tracks compact.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::Result;

/// Default relative tolerance for merging adjacent spans
pub const DEFAULT_MERGE_TOL: f64 = 0.05;

/// One value over a genomic span; `start` is 1-based as WIG requires
#[derive(Clone, Debug, PartialEq)]
pub struct WigSpan {
    pub chrom: String,
    pub start: u32,
    pub length: u32,
    pub value: f64,
}

impl WigSpan {
    fn end(&self) -> u32 {
        self.start + self.length
    }
}

/// Whether two values are within the relative merge tolerance
fn within_tolerance(a: f64, b: f64, tol: f64) -> bool {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        return true;
    }
    (a - b).abs() <= tol * scale
}

/// Merge adjacent same-chromosome, contiguous spans whose values are within
/// `tol` of each other. The merged value is the length-weighted mean.
pub fn merge_spans(spans: &[WigSpan], tol: f64) -> Vec<WigSpan> {
    let mut merged: Vec<WigSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        if let Some(last) = merged.last_mut() {
            if last.chrom == span.chrom
                && last.end() == span.start
                && within_tolerance(last.value, span.value, tol)
            {
                let total = (last.length + span.length) as f64;
                last.value = (last.value * last.length as f64
                    + span.value * span.length as f64)
                    / total;
                last.length += span.length;
                continue;
            }
        }
        merged.push(span.clone());
    }
    merged
}

/// WIG track writer
pub struct WigWriter {
    writer: BufWriter<File>,
    merge_tol: f64,
}

impl WigWriter {
    /// Create a WIG file and write its track declaration
    pub fn create(path: &Path, track_name: &str, merge_tol: f64) -> Result<Self> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writeln!(
            writer,
            "track type=wiggle_0 name=\"{}\" autoScale=on",
            track_name
        )?;
        Ok(Self { writer, merge_tol })
    }

    /// Merge and write a chromosome's worth of spans.
    ///
    /// Spans must arrive in position order; each surviving span is written
    /// as its own variableStep block so arbitrary span lengths coexist.
    pub fn write_spans(&mut self, spans: &[WigSpan]) -> Result<()> {
        for span in merge_spans(spans, self.merge_tol) {
            writeln!(
                self.writer,
                "variableStep chrom={} span={}",
                span.chrom, span.length
            )?;
            writeln!(self.writer, "{} {:.4}", span.start, span.value)?;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
