//! The correlated instrument pair the engine compares.

use serde::{Deserialize, Serialize};

/// `primary` is the side reported as `Leader::Primary` in echo-chamber metrics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentPair {
    pub primary: String,
    pub secondary: String,
}

impl InstrumentPair {
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            secondary: secondary.into(),
        }
    }

    pub fn symbols(&self) -> [&str; 2] {
        [self.primary.as_str(), self.secondary.as_str()]
    }
}

impl Default for InstrumentPair {
    fn default() -> Self {
        Self::new(DEFAULT_PRIMARY, DEFAULT_SECONDARY)
    }
}

pub const DEFAULT_PRIMARY: &str = "ES";
pub const DEFAULT_SECONDARY: &str = "NQ";
