//! API key handling.
//!
//! Keys are wrapped in `secrecy` so they never show up in logs, debug output
//! or error messages.

use std::fmt;

use secrecy::{ExposeSecret, SecretBox};

use crate::error::{Result, TakeoffError};

/// Environment variable holding the OpenAI key.
pub const OPENAI_API_KEY: &str = "OPENAI_API_KEY";

/// Environment variable holding the Tavily key.
pub const TAVILY_API_KEY: &str = "TAVILY_API_KEY";

/// A secret string that won't be logged or displayed.
pub struct SecretString(SecretBox<str>);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretBox::new(value.into().into_boxed_str()))
    }

    /// Expose the secret value.
    ///
    /// Only call this when building the request that needs it.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// `Authorization` header value for bearer-token APIs.
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.expose())
    }

    pub fn is_empty(&self) -> bool {
        self.expose().trim().is_empty()
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Keys for the hosted collaborators.
#[derive(Clone, Debug, Default)]
pub struct ApiKeys {
    pub openai: Option<SecretString>,
    pub tavily: Option<SecretString>,
}

impl ApiKeys {
    /// Read keys through a lookup function; blank values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |name: &str| {
            lookup(name)
                .map(SecretString::from)
                .filter(|secret| !secret.is_empty())
        };
        Self {
            openai: read(OPENAI_API_KEY),
            tavily: read(TAVILY_API_KEY),
        }
    }

    /// Read keys from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn require_openai(&self) -> Result<&SecretString> {
        self.openai
            .as_ref()
            .ok_or_else(|| missing_key(OPENAI_API_KEY))
    }

    pub fn require_tavily(&self) -> Result<&SecretString> {
        self.tavily
            .as_ref()
            .ok_or_else(|| missing_key(TAVILY_API_KEY))
    }
}

fn missing_key(name: &str) -> TakeoffError {
    TakeoffError::Config(format!("{name} not set").into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_not_in_debug_or_display() {
        let secret = SecretString::new("sk-super-secret-key");
        assert_eq!(format!("{secret:?}"), "[REDACTED]");
        assert_eq!(format!("{secret}"), "[REDACTED]");
        assert_eq!(secret.expose(), "sk-super-secret-key");
        assert_eq!(secret.bearer(), "Bearer sk-super-secret-key");
    }

    #[test]
    fn test_keys_from_lookup() {
        let keys = ApiKeys::from_lookup(|name| match name {
            OPENAI_API_KEY => Some("sk-test".to_string()),
            TAVILY_API_KEY => Some("   ".to_string()),
            _ => None,
        });
        assert_eq!(keys.require_openai().unwrap().expose(), "sk-test");
        assert!(keys.tavily.is_none());

        let err = keys.require_tavily().unwrap_err();
        assert!(err.to_string().contains("TAVILY_API_KEY"));
        assert!(!format!("{keys:?}").contains("sk-test"));
    }
}
