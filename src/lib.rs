//! # hapcall Library Root
//!
//! Founder haplotype calling over packed base allele (PBA) genotype panels.
//!
//! ## Module Structure
//! ```text
//! hapcall
//! ├── data        # Registry, readsets, PBA byte semantics, founder bitsets
//! ├── io          # PBA panel format, genome sizes, CSV streams, WIG tracks
//! ├── model       # Stacks, assignment, corrective passes, grouping, QGL
//! ├── pipelines   # High-level orchestration (assignment, grouping)
//! └── utils       # Threading and workspace helpers
//! ```

pub mod config;
pub mod data;
pub mod error;
pub mod io;
pub mod model;
pub mod pipelines;
pub mod utils;
