//! Query expressions
//!
//! The closed expression set: `findRecord`, `findRecords`,
//! `findRelatedRecord`, `findRelatedRecords`. Collection-shaped expressions
//! accept `filter`, `sort`, and `page` modifiers, applied in that order.

use crate::record::RecordIdentity;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Comparison operators for attribute filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeComparison {
    /// Exact value equality
    Equal,
    /// Numeric greater-than
    Gt,
    /// Numeric greater-than-or-equal
    Gte,
    /// Numeric less-than
    Lt,
    /// Numeric less-than-or-equal
    Lte,
}

/// Set operators for to-many relationship filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetComparison {
    /// The record's related set equals the given set (unordered)
    Equal,
    /// The given set is a subset of the record's related set
    All,
    /// The intersection is non-empty
    Some,
    /// The intersection is empty
    None,
}

/// Match target for a to-one relationship filter
///
/// `Absent` matches an explicit null link or a missing one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RelatedRecordMatch {
    /// Match one specific identity
    One(RecordIdentity),
    /// Match any identity in the list
    Any(Vec<RecordIdentity>),
    /// Match records whose link is null or missing
    Absent,
}

/// A filter clause; multiple clauses are conjunctive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FilterSpecifier {
    /// Compare an attribute against a value
    Attribute {
        /// Attribute name
        attribute: String,
        /// Comparison operator
        op: AttributeComparison,
        /// Comparison value
        value: Value,
    },
    /// Match the target of a to-one relationship
    RelatedRecord {
        /// Relationship name
        relation: String,
        /// Match target
        record: RelatedRecordMatch,
    },
    /// Set-compare the membership of a to-many relationship
    RelatedRecords {
        /// Relationship name
        relation: String,
        /// Set operator
        op: SetComparison,
        /// Comparison set
        records: Vec<RecordIdentity>,
    },
}

/// Direction of one sort key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SortOrder {
    /// Ascending (the default)
    #[default]
    #[serde(rename = "ascending")]
    Ascending,
    /// Descending
    #[serde(rename = "descending")]
    Descending,
}

/// One sort key: attribute plus direction
///
/// Records lacking the attribute sort after those that have it, regardless of
/// direction; ties break by later keys, then by insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortSpecifier {
    /// Attribute to sort by
    pub attribute: String,
    /// Direction, ascending by default
    #[serde(default)]
    pub order: SortOrder,
}

impl SortSpecifier {
    /// Parse a sort field: a leading `-` means descending
    ///
    /// `"name"` sorts ascending; `"-name"` sorts descending.
    pub fn parse(field: &str) -> Self {
        match field.strip_prefix('-') {
            Some(attribute) => Self {
                attribute: attribute.to_string(),
                order: SortOrder::Descending,
            },
            None => Self {
                attribute: field.to_string(),
                order: SortOrder::Ascending,
            },
        }
    }
}

/// Pagination window: offset first, then limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageSpecifier {
    /// Records to skip (default 0)
    #[serde(default)]
    pub offset: usize,
    /// Maximum records to return (default unlimited)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl PageSpecifier {
    /// Create a page window
    pub fn new(offset: usize, limit: Option<usize>) -> Self {
        Self { offset, limit }
    }
}

/// A declarative read request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum QueryExpression {
    /// Look up a single record by identity; missing raises `RecordNotFound`
    FindRecord {
        /// Identity to look up
        record: RecordIdentity,
    },

    /// Enumerate records by type, or resolve a list of identities
    ///
    /// With `records` set, only the identities that exist are returned
    /// (missing ones are silently skipped). With `type` set, the whole
    /// collection is enumerated and filter/sort/page apply in that order.
    FindRecords {
        /// Model type to enumerate
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
        /// Specific identities to resolve
        #[serde(default, skip_serializing_if = "Option::is_none")]
        records: Option<Vec<RecordIdentity>>,
        /// Conjunctive filter clauses
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        filter: Vec<FilterSpecifier>,
        /// Sort keys, applied lexicographically
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        sort: Vec<SortSpecifier>,
        /// Pagination window
        #[serde(default, skip_serializing_if = "Option::is_none")]
        page: Option<PageSpecifier>,
    },

    /// Resolve the target of a to-one relationship
    FindRelatedRecord {
        /// Identity of the record owning the relationship
        record: RecordIdentity,
        /// Relationship name
        relationship: String,
    },

    /// Resolve the membership of a to-many relationship
    FindRelatedRecords {
        /// Identity of the record owning the relationship
        record: RecordIdentity,
        /// Relationship name
        relationship: String,
        /// Conjunctive filter clauses
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        filter: Vec<FilterSpecifier>,
        /// Sort keys
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        sort: Vec<SortSpecifier>,
        /// Pagination window
        #[serde(default, skip_serializing_if = "Option::is_none")]
        page: Option<PageSpecifier>,
    },
}

impl QueryExpression {
    /// The canonical tag for this expression
    pub fn op(&self) -> &'static str {
        match self {
            QueryExpression::FindRecord { .. } => "findRecord",
            QueryExpression::FindRecords { .. } => "findRecords",
            QueryExpression::FindRelatedRecord { .. } => "findRelatedRecord",
            QueryExpression::FindRelatedRecords { .. } => "findRelatedRecords",
        }
    }

    /// Check whether this expression yields a collection
    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            QueryExpression::FindRecords { .. } | QueryExpression::FindRelatedRecords { .. }
        )
    }
}
