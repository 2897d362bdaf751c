//! Query evaluation against the record store
//!
//! Resolves each expression kind against a store snapshot and hands
//! collection refinement (filter, then sort, then page) to the shared
//! modifier semantics in `orrery_core::query::modifiers` - the same rules a
//! remote source applies client-side when a request form cannot carry them.

use crate::store::RecordStore;
use orrery_core::query::modifiers::apply_modifiers;
use orrery_core::query::QueryExpression;
use orrery_core::{Error, QueryResult, Record, RelationshipData, Result};

/// Evaluate one expression
pub fn evaluate(store: &RecordStore, expression: &QueryExpression) -> Result<QueryResult> {
    match expression {
        QueryExpression::FindRecord { record } => {
            let found = store
                .get(record)
                .cloned()
                .ok_or_else(|| Error::record_not_found(record.clone()))?;
            Ok(QueryResult::Record(Box::new(found)))
        }
        QueryExpression::FindRecords {
            kind,
            records,
            filter,
            sort,
            page,
        } => {
            let collection: Vec<Record> = match (records, kind) {
                (Some(identities), _) => identities
                    .iter()
                    .filter_map(|identity| store.get(identity).cloned())
                    .collect(),
                (None, Some(kind)) => store.of_type(kind).cloned().collect(),
                (None, None) => {
                    return Err(Error::query_expression_parse(
                        "findRecords requires a type or a list of identities",
                    ))
                }
            };
            Ok(QueryResult::Records(apply_modifiers(
                collection, filter, sort, page,
            )))
        }
        QueryExpression::FindRelatedRecord {
            record,
            relationship,
        } => {
            let owner = store
                .get(record)
                .ok_or_else(|| Error::record_not_found(record.clone()))?;
            match owner.relationship_data(relationship) {
                None | Some(RelationshipData::None) => Ok(QueryResult::None),
                Some(RelationshipData::One(target)) => {
                    let found = store.get(target).cloned().ok_or_else(|| {
                        Error::related_record_not_found(record.clone(), relationship.clone())
                    })?;
                    Ok(QueryResult::Record(Box::new(found)))
                }
                Some(RelationshipData::Many(_)) => Err(Error::query_expression_parse(format!(
                    "findRelatedRecord on to-many relationship {}.{}",
                    record.kind, relationship
                ))),
            }
        }
        QueryExpression::FindRelatedRecords {
            record,
            relationship,
            filter,
            sort,
            page,
        } => {
            let owner = store
                .get(record)
                .ok_or_else(|| Error::record_not_found(record.clone()))?;
            let members: Vec<Record> = match owner.relationship_data(relationship) {
                None | Some(RelationshipData::None) => Vec::new(),
                Some(RelationshipData::Many(identities)) => identities
                    .iter()
                    .filter_map(|identity| store.get(identity).cloned())
                    .collect(),
                Some(RelationshipData::One(_)) => {
                    return Err(Error::query_expression_parse(format!(
                        "findRelatedRecords on to-one relationship {}.{}",
                        record.kind, relationship
                    )))
                }
            };
            Ok(QueryResult::Records(apply_modifiers(
                members, filter, sort, page,
            )))
        }
    }
}
