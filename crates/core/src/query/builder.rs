//! Fluent query builder
//!
//! `QueryBuilder` constructs term objects that convert into canonical
//! expressions. Collection terms expose chained `filter`/`sort`/`page`
//! modifiers.
//!
//! # Example
//!
//! ```ignore
//! let q = QueryBuilder;
//! let expr = q
//!     .find_records("planet")
//!     .sort("name")
//!     .page(1, Some(2))
//!     .into_expression();
//! ```

use crate::query::expression::{
    AttributeComparison, FilterSpecifier, PageSpecifier, QueryExpression, RelatedRecordMatch,
    SetComparison, SortSpecifier,
};
use crate::record::RecordIdentity;
use serde_json::Value;

/// Entry point for composing query expressions
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryBuilder;

impl QueryBuilder {
    /// Start a `findRecord` term
    pub fn find_record(&self, record: RecordIdentity) -> FindRecordTerm {
        FindRecordTerm { record }
    }

    /// Start a `findRecords` term enumerating a type
    pub fn find_records(&self, kind: impl Into<String>) -> FindRecordsTerm {
        FindRecordsTerm {
            kind: Some(kind.into()),
            records: None,
            filter: Vec::new(),
            sort: Vec::new(),
            page: None,
        }
    }

    /// Start a `findRecords` term resolving specific identities
    ///
    /// Missing identities are silently skipped at evaluation.
    pub fn find_records_by_identity(&self, records: Vec<RecordIdentity>) -> FindRecordsTerm {
        FindRecordsTerm {
            kind: None,
            records: Some(records),
            filter: Vec::new(),
            sort: Vec::new(),
            page: None,
        }
    }

    /// Start a `findRelatedRecord` term
    pub fn find_related_record(
        &self,
        record: RecordIdentity,
        relationship: impl Into<String>,
    ) -> FindRelatedRecordTerm {
        FindRelatedRecordTerm {
            record,
            relationship: relationship.into(),
        }
    }

    /// Start a `findRelatedRecords` term
    pub fn find_related_records(
        &self,
        record: RecordIdentity,
        relationship: impl Into<String>,
    ) -> FindRelatedRecordsTerm {
        FindRelatedRecordsTerm {
            record,
            relationship: relationship.into(),
            filter: Vec::new(),
            sort: Vec::new(),
            page: None,
        }
    }
}

/// Term for `findRecord`
#[derive(Debug, Clone)]
pub struct FindRecordTerm {
    record: RecordIdentity,
}

impl FindRecordTerm {
    /// Finish the term
    pub fn into_expression(self) -> QueryExpression {
        QueryExpression::FindRecord {
            record: self.record,
        }
    }
}

/// Term for `findRelatedRecord`
#[derive(Debug, Clone)]
pub struct FindRelatedRecordTerm {
    record: RecordIdentity,
    relationship: String,
}

impl FindRelatedRecordTerm {
    /// Finish the term
    pub fn into_expression(self) -> QueryExpression {
        QueryExpression::FindRelatedRecord {
            record: self.record,
            relationship: self.relationship,
        }
    }
}

/// Term for `findRecords` with chained modifiers
#[derive(Debug, Clone)]
pub struct FindRecordsTerm {
    kind: Option<String>,
    records: Option<Vec<RecordIdentity>>,
    filter: Vec<FilterSpecifier>,
    sort: Vec<SortSpecifier>,
    page: Option<PageSpecifier>,
}

impl FindRecordsTerm {
    /// Append a raw filter clause
    pub fn filter(mut self, specifier: FilterSpecifier) -> Self {
        self.filter.push(specifier);
        self
    }

    /// Append an attribute filter clause
    pub fn filter_attribute(
        self,
        attribute: impl Into<String>,
        op: AttributeComparison,
        value: impl Into<Value>,
    ) -> Self {
        self.filter(FilterSpecifier::Attribute {
            attribute: attribute.into(),
            op,
            value: value.into(),
        })
    }

    /// Append a to-one relationship filter clause
    pub fn filter_related_record(
        self,
        relation: impl Into<String>,
        record: RelatedRecordMatch,
    ) -> Self {
        self.filter(FilterSpecifier::RelatedRecord {
            relation: relation.into(),
            record,
        })
    }

    /// Append a to-many relationship filter clause
    pub fn filter_related_records(
        self,
        relation: impl Into<String>,
        op: SetComparison,
        records: Vec<RecordIdentity>,
    ) -> Self {
        self.filter(FilterSpecifier::RelatedRecords {
            relation: relation.into(),
            op,
            records,
        })
    }

    /// Append a sort key; a leading `-` means descending
    pub fn sort(mut self, field: &str) -> Self {
        self.sort.push(SortSpecifier::parse(field));
        self
    }

    /// Set the pagination window
    pub fn page(mut self, offset: usize, limit: Option<usize>) -> Self {
        self.page = Some(PageSpecifier::new(offset, limit));
        self
    }

    /// Finish the term
    pub fn into_expression(self) -> QueryExpression {
        QueryExpression::FindRecords {
            kind: self.kind,
            records: self.records,
            filter: self.filter,
            sort: self.sort,
            page: self.page,
        }
    }
}

/// Term for `findRelatedRecords` with chained modifiers
#[derive(Debug, Clone)]
pub struct FindRelatedRecordsTerm {
    record: RecordIdentity,
    relationship: String,
    filter: Vec<FilterSpecifier>,
    sort: Vec<SortSpecifier>,
    page: Option<PageSpecifier>,
}

impl FindRelatedRecordsTerm {
    /// Append a raw filter clause
    pub fn filter(mut self, specifier: FilterSpecifier) -> Self {
        self.filter.push(specifier);
        self
    }

    /// Append an attribute filter clause
    pub fn filter_attribute(
        self,
        attribute: impl Into<String>,
        op: AttributeComparison,
        value: impl Into<Value>,
    ) -> Self {
        self.filter(FilterSpecifier::Attribute {
            attribute: attribute.into(),
            op,
            value: value.into(),
        })
    }

    /// Append a sort key; a leading `-` means descending
    pub fn sort(mut self, field: &str) -> Self {
        self.sort.push(SortSpecifier::parse(field));
        self
    }

    /// Set the pagination window
    pub fn page(mut self, offset: usize, limit: Option<usize>) -> Self {
        self.page = Some(PageSpecifier::new(offset, limit));
        self
    }

    /// Finish the term
    pub fn into_expression(self) -> QueryExpression {
        QueryExpression::FindRelatedRecords {
            record: self.record,
            relationship: self.relationship,
            filter: self.filter,
            sort: self.sort,
            page: self.page,
        }
    }
}

impl From<FindRecordTerm> for QueryExpression {
    fn from(term: FindRecordTerm) -> Self {
        term.into_expression()
    }
}

impl From<FindRecordsTerm> for QueryExpression {
    fn from(term: FindRecordsTerm) -> Self {
        term.into_expression()
    }
}

impl From<FindRelatedRecordTerm> for QueryExpression {
    fn from(term: FindRelatedRecordTerm) -> Self {
        term.into_expression()
    }
}

impl From<FindRelatedRecordsTerm> for QueryExpression {
    fn from(term: FindRelatedRecordsTerm) -> Self {
        term.into_expression()
    }
}
