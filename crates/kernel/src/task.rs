//! Tasks and task outcomes
//!
//! A task is a `{type, data}` envelope: the tag names the request kind and
//! `data` carries the serialized request, so pending work survives a restart
//! through the bucket. Performing a task yields a [`TaskOutcome`], the
//! uniform envelope the pipelines read their typed results from.

use orrery_core::{QueryData, Result, Transform, UpdateData};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One unit of queued work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Request kind, e.g. `"query"`, `"update"`, `"sync"`
    #[serde(rename = "type")]
    pub kind: String,
    /// Serialized request payload
    pub data: Value,
}

impl Task {
    /// Create a task from a kind and an already-serialized payload
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Create a task by serializing a request
    pub fn from_request<T: Serialize>(kind: impl Into<String>, request: &T) -> Result<Self> {
        Ok(Self::new(kind, serde_json::to_value(request)?))
    }

    /// Deserialize the payload back into a request
    pub fn request<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

/// Uniform result envelope of a performed task
///
/// Each pipeline reads its slice: queryable takes `query_data`, updatable
/// takes `update_data` plus `transforms`, pushable and pullable take
/// `transforms`. `details` carries transport metadata when the request opted
/// in.
#[derive(Debug, Clone, Default)]
pub struct TaskOutcome {
    /// Query answer, present for performed queries
    pub query_data: Option<QueryData>,
    /// Update answer, present for performed updates
    pub update_data: Option<UpdateData>,
    /// Transforms applied while performing the task
    pub transforms: Vec<Transform>,
    /// Transport-specific metadata
    pub details: Option<Value>,
}

impl TaskOutcome {
    /// An empty outcome
    pub fn none() -> Self {
        Self::default()
    }

    /// An outcome carrying a query answer
    pub fn query(data: QueryData) -> Self {
        Self {
            query_data: Some(data),
            ..Default::default()
        }
    }

    /// An outcome carrying an update answer and its applied transforms
    pub fn update(data: UpdateData, transforms: Vec<Transform>) -> Self {
        Self {
            update_data: Some(data),
            transforms,
            ..Default::default()
        }
    }

    /// An outcome carrying transforms only (sync, push, pull)
    pub fn transforms(transforms: Vec<Transform>) -> Self {
        Self {
            transforms,
            ..Default::default()
        }
    }

    /// Attach transport details, builder style
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// Performs queued tasks during drains and retries
///
/// Concrete sources implement this by matching on the task kind and
/// re-hydrating the request from the task payload. The pipelines perform
/// freshly pushed tasks with their own closures (which carry live hints);
/// this trait covers tasks replayed from persistence or re-run via `retry`.
pub trait TaskPerformer: Send + Sync {
    /// Perform one task
    fn perform(&self, task: &Task) -> Result<TaskOutcome>;
}
