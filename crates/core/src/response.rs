//! Response envelopes
//!
//! Query and update results share a positional-alignment rule: a batch with
//! N expressions (or operations) answers with N results in the same order.
//! Single-element batches answer with the bare result.
//!
//! Full-response mode wraps the data with `details` (transport metadata,
//! opted in via `includeDetails`) and the transforms that were applied.

use crate::record::Record;
use crate::transform::Transform;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One expression's answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryResult {
    /// A single record (`findRecord`, present `findRelatedRecord`)
    Record(Box<Record>),
    /// A collection (`findRecords`, `findRelatedRecords`)
    Records(Vec<Record>),
    /// No data (`findRelatedRecord` with a cleared link, 304 responses)
    None,
}

impl QueryResult {
    /// Get the single record, if this result holds one
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            QueryResult::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Get the collection, if this result holds one
    pub fn as_records(&self) -> Option<&[Record]> {
        match self {
            QueryResult::Records(records) => Some(records),
            _ => None,
        }
    }

    /// Check whether this result holds no data
    pub fn is_none(&self) -> bool {
        matches!(self, QueryResult::None)
    }
}

impl From<Record> for QueryResult {
    fn from(record: Record) -> Self {
        QueryResult::Record(Box::new(record))
    }
}

impl From<Option<Record>> for QueryResult {
    fn from(record: Option<Record>) -> Self {
        match record {
            Some(record) => QueryResult::Record(Box::new(record)),
            None => QueryResult::None,
        }
    }
}

impl From<Vec<Record>> for QueryResult {
    fn from(records: Vec<Record>) -> Self {
        QueryResult::Records(records)
    }
}

/// A query's answer: bare for one expression, positional for a batch
#[derive(Debug, Clone, PartialEq)]
pub enum QueryData {
    /// Single-expression answer
    Single(QueryResult),
    /// Multi-expression answers, aligned with the query's expressions
    Batch(Vec<QueryResult>),
}

impl QueryData {
    /// Wrap positional results, collapsing a one-element batch
    pub fn from_results(mut results: Vec<QueryResult>, single: bool) -> Self {
        if single && results.len() == 1 {
            QueryData::Single(results.remove(0))
        } else {
            QueryData::Batch(results)
        }
    }

    /// The first (or only) result
    pub fn first(&self) -> Option<&QueryResult> {
        match self {
            QueryData::Single(result) => Some(result),
            QueryData::Batch(results) => results.first(),
        }
    }

    /// Flatten to positional results
    pub fn into_results(self) -> Vec<QueryResult> {
        match self {
            QueryData::Single(result) => vec![result],
            QueryData::Batch(results) => results,
        }
    }
}

/// An update's answer: the primary record per operation, positionally aligned
///
/// `None` entries correspond to operations that yield no primary record
/// (e.g. `removeRecord`).
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateData {
    /// Single-operation answer
    Single(Option<Record>),
    /// Multi-operation answers
    Batch(Vec<Option<Record>>),
}

impl UpdateData {
    /// Wrap positional results, collapsing a one-element batch
    pub fn from_results(mut results: Vec<Option<Record>>, single: bool) -> Self {
        if single && results.len() == 1 {
            UpdateData::Single(results.remove(0))
        } else {
            UpdateData::Batch(results)
        }
    }

    /// The first (or only) primary record
    pub fn first(&self) -> Option<&Record> {
        match self {
            UpdateData::Single(record) => record.as_ref(),
            UpdateData::Batch(records) => records.first().and_then(Option::as_ref),
        }
    }

    /// Flatten to positional results
    pub fn into_results(self) -> Vec<Option<Record>> {
        match self {
            UpdateData::Single(record) => vec![record],
            UpdateData::Batch(records) => records,
        }
    }
}

/// The full `{data, details, transforms}` response envelope
#[derive(Debug, Clone, PartialEq)]
pub struct FullResponse<T> {
    /// The primary data
    pub data: T,
    /// Transport-specific metadata, present when `includeDetails` was set
    pub details: Option<Value>,
    /// Transforms applied while fulfilling the request
    pub transforms: Vec<Transform>,
}

impl<T> FullResponse<T> {
    /// Wrap bare data with no details or transforms
    pub fn of(data: T) -> Self {
        Self {
            data,
            details: None,
            transforms: Vec::new(),
        }
    }
}
