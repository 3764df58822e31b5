//! Data types shared across retrieval, validation and runs.

pub mod config;
pub mod item;
pub mod page;
pub mod report;
pub mod standard;
pub mod validation;
