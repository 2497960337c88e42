//! # Utilities Module
//!
//! Cross-cutting helpers that don't belong in domain-specific modules.
//!
//! ## Sub-modules
//! - `threading`: thread-pool construction and pool coordination state
//! - `workspace`: pre-allocated buffers for the per-bin clustering loop

pub mod threading;
pub mod workspace;
