//! Credential handling.

mod credentials;

pub use credentials::{ApiKeys, SecretString, OPENAI_API_KEY, TAVILY_API_KEY};
