//! # I/O Module
//!
//! File reading/writing boundaries: the PBA panel format, genome size
//! tables, CSV record streams, and WIG track emission.

pub mod bins;
pub mod genome_sizes;
pub mod pba;
pub mod wig;
