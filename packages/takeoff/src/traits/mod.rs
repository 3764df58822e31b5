//! Core trait abstractions for the takeoff core.
//!
//! These traits define the interfaces that applications implement
//! to provide AI, extraction, vector storage and web search capabilities.

pub mod ai;
pub mod extractor;
pub mod searcher;
pub mod vector;
