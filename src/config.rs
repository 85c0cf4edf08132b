use crate::error::Result;
use crate::matcher::{FuzzyMatcher, DEFAULT_MATCH_TOLERANCE};
use crate::schema::{Granularity, SourceKind};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Knobs for a metrics run. Every field has a default, so `{}` is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetricsOptions {
    /// Plan allow-list. `None` or an empty list disables plan filtering.
    pub plans: Option<Vec<String>>,

    pub exclude_sources: Vec<SourceKind>,

    /// Relative tolerance on average line amounts when pairing cancellations with subscriptions.
    pub match_tolerance: f64,

    /// Forces a bucket size instead of deriving it from the window length.
    pub granularity: Option<Granularity>,
}

impl Default for MetricsOptions {
    fn default() -> Self {
        Self {
            plans: None,
            exclude_sources: Vec::new(),
            match_tolerance: DEFAULT_MATCH_TOLERANCE,
            granularity: None,
        }
    }
}

impl MetricsOptions {
    pub fn validate(&self) -> Result<()> {
        FuzzyMatcher::new(self.match_tolerance)?;
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}
