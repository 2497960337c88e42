//! # Model Module
//!
//! The haplotype-calling algorithms.
//!
//! ## Core Engines
//! - `stack`: allele-stack scan over the founder panel, keeping only loci
//!   that discriminate between founders
//! - `assign`: progeny-to-founder membership assignment against stacks
//! - `passes`: windowed corrective passes over assignment sequences
//! - `grouping`: per-bin founder clustering by centroid-distance search
//! - `qgl`: Fβ-gated group-specific allele calling

pub mod assign;
pub mod grouping;
pub mod passes;
pub mod qgl;
pub mod stack;

pub use assign::{assign, AssignStats, MembershipResult, ProgenyFounderAlign, RejectCause};
pub use grouping::{BinState, ClusterEngine, HGBinSpec, HaplotypeGroup};
pub use qgl::{call_bin, QGLLoci, QglParams};
pub use stack::{AlleleStack, StackBuilder, StackStats};
