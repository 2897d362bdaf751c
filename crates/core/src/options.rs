//! Per-request options
//!
//! Options ride along on queries and transforms. The two recognized flags
//! shape the response envelope; everything else is passed through opaquely
//! for concrete sources (e.g. a remote adapter reading URL overrides).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Options recognized on a per-request basis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestOptions {
    /// Return the full `{data, details, transforms}` envelope instead of bare data
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub full_response: bool,
    /// Opt in to transport-specific metadata in `details`
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub include_details: bool,
    /// Source-specific options, passed through opaquely
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl RequestOptions {
    /// Options requesting the full response envelope
    pub fn full() -> Self {
        Self {
            full_response: true,
            ..Default::default()
        }
    }

    /// Enable `include_details`, builder style
    pub fn with_details(mut self) -> Self {
        self.include_details = true;
        self
    }

    /// Attach a pass-through option, builder style
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Read a pass-through option
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}
