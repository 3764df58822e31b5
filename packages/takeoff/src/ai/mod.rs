//! AI implementations for the takeoff core.
//!
//! Reference implementations of the `AI` and `Extractor` traits.
//! Users can use these directly or implement their own.

mod openai;

pub use openai::OpenAI;
