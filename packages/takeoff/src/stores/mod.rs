//! Storage implementations for the takeoff core.
//!
//! Available backends:
//! - `StandardsStore` - Read-only standards catalog loaded from JSON files
//! - `MemoryVectorIndex` - In-memory vector index (always available)

pub mod catalog;
pub mod memory;

pub use catalog::{default_abbreviations, CatalogStats, StandardsStore};
pub use memory::MemoryVectorIndex;
