//! Hints: request-scoped data shared between listeners and performers
//!
//! A `beforeX` listener may pre-supply data through the shared hints value;
//! the concrete `_x` handler decides what to do with it (the in-memory
//! source short-circuits evaluation when query data is already hinted).

use orrery_core::{QueryData, Transform, UpdateData};
use serde_json::Value;

/// Hints for the query pipeline
#[derive(Debug, Clone, Default)]
pub struct QueryHints {
    /// Pre-supplied answer; a performer may return it instead of evaluating
    pub data: Option<QueryData>,
    /// Pre-supplied transport details
    pub details: Option<Value>,
}

/// Hints for the update pipeline
#[derive(Debug, Clone, Default)]
pub struct UpdateHints {
    /// Pre-supplied answer
    pub data: Option<UpdateData>,
    /// Pre-supplied transport details
    pub details: Option<Value>,
}

/// Hints for the sync pipeline
#[derive(Debug, Clone, Default)]
pub struct SyncHints {
    /// Pre-supplied transport details
    pub details: Option<Value>,
}

/// Hints for the push pipeline
#[derive(Debug, Clone, Default)]
pub struct PushHints {
    /// Pre-supplied applied transforms
    pub transforms: Option<Vec<Transform>>,
    /// Pre-supplied transport details
    pub details: Option<Value>,
}

/// Hints for the pull pipeline
#[derive(Debug, Clone, Default)]
pub struct PullHints {
    /// Pre-supplied fetched transforms
    pub transforms: Option<Vec<Transform>>,
    /// Pre-supplied transport details
    pub details: Option<Value>,
}
