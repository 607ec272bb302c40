//! Calculation settings owned by a [`Document`](crate::Document)

use serde::{Deserialize, Serialize};

/// What numeric aggregates (SUM, AVERAGE, MAX, MIN) do with text cells
/// reached through a cell or range reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TextPolicy {
    /// Ignore text cells, as if they were not in the range
    #[default]
    Skip,
    /// Fail the aggregate with a type mismatch
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CalcConfig {
    pub text_in_aggregates: TextPolicy,
}

impl CalcConfig {
    pub fn with_text_policy(mut self, policy: TextPolicy) -> Self {
        self.text_in_aggregates = policy;
        self
    }
}
