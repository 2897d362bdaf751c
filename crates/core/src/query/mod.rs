//! Queries: identified batches of expressions
//!
//! A query carries an id, one or more expressions, and per-request options.
//! `build_query` normalizes every accepted input shape into a canonical
//! `Query`, mirroring `build_transform` on the mutation side.

pub mod builder;
pub mod expression;
pub mod modifiers;

pub use builder::{
    FindRecordTerm, FindRecordsTerm, FindRelatedRecordTerm, FindRelatedRecordsTerm, QueryBuilder,
};
pub use expression::{
    AttributeComparison, FilterSpecifier, PageSpecifier, QueryExpression, RelatedRecordMatch,
    SetComparison, SortOrder, SortSpecifier,
};
pub use modifiers::{apply_modifiers, matches_filter};

use crate::options::RequestOptions;
use crate::Result;
use serde::{Deserialize, Serialize};

/// An identified, ordered batch of query expressions
///
/// Multi-expression queries answer with an array aligned positionally with
/// `expressions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// Unique query id
    pub id: String,
    /// Expressions evaluated as a batch
    pub expressions: Vec<QueryExpression>,
    /// Per-request options
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<RequestOptions>,
}

impl Query {
    /// Create a query with a fresh uuid id
    pub fn new(expressions: Vec<QueryExpression>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            expressions,
            options: None,
        }
    }

    /// Create a query with a caller-chosen id
    pub fn with_id(id: impl Into<String>, expressions: Vec<QueryExpression>) -> Self {
        Self {
            id: id.into(),
            expressions,
            options: None,
        }
    }

    /// Attach options, builder style
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Check whether this query carries a single expression
    pub fn is_single(&self) -> bool {
        self.expressions.len() == 1
    }
}

/// Input shapes accepted by [`build_query`]
#[derive(Debug, Clone)]
pub enum QueryInput {
    /// A single expression
    Expression(QueryExpression),
    /// A batch of expressions
    Expressions(Vec<QueryExpression>),
    /// A fully-formed query
    Query(Query),
}

impl From<QueryExpression> for QueryInput {
    fn from(expr: QueryExpression) -> Self {
        QueryInput::Expression(expr)
    }
}

impl From<Vec<QueryExpression>> for QueryInput {
    fn from(exprs: Vec<QueryExpression>) -> Self {
        QueryInput::Expressions(exprs)
    }
}

impl From<Query> for QueryInput {
    fn from(query: Query) -> Self {
        QueryInput::Query(query)
    }
}

impl From<FindRecordTerm> for QueryInput {
    fn from(term: FindRecordTerm) -> Self {
        QueryInput::Expression(term.into_expression())
    }
}

impl From<FindRecordsTerm> for QueryInput {
    fn from(term: FindRecordsTerm) -> Self {
        QueryInput::Expression(term.into_expression())
    }
}

impl From<FindRelatedRecordTerm> for QueryInput {
    fn from(term: FindRelatedRecordTerm) -> Self {
        QueryInput::Expression(term.into_expression())
    }
}

impl From<FindRelatedRecordsTerm> for QueryInput {
    fn from(term: FindRelatedRecordsTerm) -> Self {
        QueryInput::Expression(term.into_expression())
    }
}

/// Normalize any accepted input into a canonical query
///
/// A fully-formed query with an id is returned unchanged when no overrides
/// are given. An empty expression batch is rejected as
/// `QueryExpressionParse`.
pub fn build_query(
    input: impl Into<QueryInput>,
    options: Option<RequestOptions>,
    id: Option<String>,
) -> Result<Query> {
    let mut query = match input.into() {
        QueryInput::Query(query) => {
            if options.is_none() && id.is_none() {
                return Ok(query);
            }
            query
        }
        QueryInput::Expression(expr) => Query::new(vec![expr]),
        QueryInput::Expressions(exprs) => Query::new(exprs),
    };

    if query.expressions.is_empty() {
        return Err(crate::Error::query_expression_parse(
            "a query requires at least one expression",
        ));
    }

    if let Some(id) = id {
        query.id = id;
    }
    if let Some(options) = options {
        query.options = Some(options);
    }
    Ok(query)
}
