//! Collection modifiers: filter, sort, page
//!
//! The refinement semantics of collection expressions, applied in that fixed
//! order. These operate on plain record collections with no knowledge of
//! where the candidates came from - the cache's query engine runs them over
//! store snapshots, and the remote adapter runs them client-side when a
//! request form cannot carry them in the URL.
//!
//! Filter clauses are conjunctive. Sorting is a stable lexicographic
//! multi-key sort: records lacking a sort attribute order after those that
//! have it regardless of direction, and final ties keep the collection's
//! incoming order. Pagination applies offset first, then limit; an offset
//! beyond the collection yields an empty result.

use crate::query::expression::{
    AttributeComparison, FilterSpecifier, PageSpecifier, RelatedRecordMatch, SetComparison,
    SortOrder, SortSpecifier,
};
use crate::record::{Record, RecordIdentity, RelationshipData};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashSet;

/// Refine a collection: filter, then sort, then page
pub fn apply_modifiers(
    mut records: Vec<Record>,
    filter: &[FilterSpecifier],
    sort: &[SortSpecifier],
    page: &Option<PageSpecifier>,
) -> Vec<Record> {
    if !filter.is_empty() {
        records.retain(|record| filter.iter().all(|clause| matches_filter(record, clause)));
    }
    if !sort.is_empty() {
        sort_records(&mut records, sort);
    }
    if let Some(page) = page {
        records = paginate(records, page);
    }
    records
}

/// Evaluate one filter clause against one record
pub fn matches_filter(record: &Record, clause: &FilterSpecifier) -> bool {
    match clause {
        FilterSpecifier::Attribute {
            attribute,
            op,
            value,
        } => match record.attribute(attribute) {
            // An absent attribute never matches.
            None => false,
            Some(actual) => match op {
                AttributeComparison::Equal => actual == value,
                AttributeComparison::Gt => numeric_cmp(actual, value)
                    .is_some_and(|ordering| ordering == Ordering::Greater),
                AttributeComparison::Gte => {
                    numeric_cmp(actual, value).is_some_and(|ordering| ordering != Ordering::Less)
                }
                AttributeComparison::Lt => {
                    numeric_cmp(actual, value).is_some_and(|ordering| ordering == Ordering::Less)
                }
                AttributeComparison::Lte => numeric_cmp(actual, value)
                    .is_some_and(|ordering| ordering != Ordering::Greater),
            },
        },
        FilterSpecifier::RelatedRecord { relation, record: target } => {
            let data = record.relationship_data(relation);
            match target {
                RelatedRecordMatch::Absent => {
                    matches!(data, None | Some(RelationshipData::None))
                }
                RelatedRecordMatch::One(identity) => {
                    data.and_then(RelationshipData::as_one) == Some(identity)
                }
                RelatedRecordMatch::Any(identities) => data
                    .and_then(RelationshipData::as_one)
                    .is_some_and(|linked| identities.contains(linked)),
            }
        }
        FilterSpecifier::RelatedRecords {
            relation,
            op,
            records,
        } => {
            let members: HashSet<&RecordIdentity> = record
                .relationship_data(relation)
                .map(|data| data.identities().into_iter().collect())
                .unwrap_or_default();
            let given: HashSet<&RecordIdentity> = records.iter().collect();
            match op {
                SetComparison::Equal => members == given,
                SetComparison::All => given.is_subset(&members),
                SetComparison::Some => !given.is_disjoint(&members),
                SetComparison::None => given.is_disjoint(&members),
            }
        }
    }
}

/// Numeric ordering when both sides are numbers; `None` otherwise
fn numeric_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => None,
    }
}

fn sort_records(records: &mut [Record], sort: &[SortSpecifier]) {
    records.sort_by(|a, b| {
        for key in sort {
            let ordering = match (a.attribute(&key.attribute), b.attribute(&key.attribute)) {
                (None, None) => Ordering::Equal,
                // Missing attributes sort last regardless of direction.
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (Some(a_value), Some(b_value)) => {
                    let ordering = compare_values(a_value, b_value);
                    match key.order {
                        SortOrder::Ascending => ordering,
                        SortOrder::Descending => ordering.reverse(),
                    }
                }
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        // Stable sort: final ties keep the incoming order.
        Ordering::Equal
    });
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => numeric_cmp(a, b).unwrap_or(Ordering::Equal),
        (Value::String(a), Value::String(b)) => a.cmp(b),
        (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
        // Mixed or structured values compare by canonical rendering.
        _ => a.to_string().cmp(&b.to_string()),
    }
}

fn paginate(records: Vec<Record>, page: &PageSpecifier) -> Vec<Record> {
    if page.offset >= records.len() {
        return Vec::new();
    }
    let mut windowed: Vec<Record> = records.into_iter().skip(page.offset).collect();
    if let Some(limit) = page.limit {
        windowed.truncate(limit);
    }
    windowed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn planets() -> Vec<Record> {
        [
            ("jupiter", "Jupiter", 5),
            ("earth", "Earth", 3),
            ("venus", "Venus", 2),
            ("mars", "Mars", 4),
        ]
        .into_iter()
        .map(|(id, name, sequence)| {
            Record::new("planet", id)
                .with_attribute("name", name)
                .with_attribute("sequence", sequence)
        })
        .collect()
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(Record::id).collect()
    }

    #[test]
    fn test_filter_then_sort_then_page() {
        let refined = apply_modifiers(
            planets(),
            &[FilterSpecifier::Attribute {
                attribute: "sequence".into(),
                op: AttributeComparison::Gte,
                value: json!(3),
            }],
            &[SortSpecifier::parse("name")],
            &Some(PageSpecifier::new(1, Some(2))),
        );
        // gte 3 keeps jupiter, earth, mars; sorted: earth, jupiter, mars.
        assert_eq!(ids(&refined), vec!["jupiter", "mars"]);
    }

    #[test]
    fn test_no_modifiers_is_identity() {
        let refined = apply_modifiers(planets(), &[], &[], &None);
        assert_eq!(ids(&refined), vec!["jupiter", "earth", "venus", "mars"]);
    }

    #[test]
    fn test_numeric_filter_excludes_non_numbers() {
        let records = vec![
            Record::new("planet", "a").with_attribute("sequence", 3),
            Record::new("planet", "b").with_attribute("sequence", "three"),
        ];
        let refined = apply_modifiers(
            records,
            &[FilterSpecifier::Attribute {
                attribute: "sequence".into(),
                op: AttributeComparison::Gte,
                value: json!(1),
            }],
            &[],
            &None,
        );
        assert_eq!(ids(&refined), vec!["a"]);
    }

    #[test]
    fn test_missing_attribute_sorts_last_both_directions() {
        let mut records = planets();
        records.push(Record::new("planet", "nameless"));

        let ascending = apply_modifiers(records.clone(), &[], &[SortSpecifier::parse("name")], &None);
        assert_eq!(ids(&ascending).last(), Some(&"nameless"));

        let descending = apply_modifiers(records, &[], &[SortSpecifier::parse("-name")], &None);
        assert_eq!(ids(&descending).last(), Some(&"nameless"));
    }

    #[test]
    fn test_offset_beyond_collection_is_empty() {
        let refined = apply_modifiers(planets(), &[], &[], &Some(PageSpecifier::new(10, Some(5))));
        assert!(refined.is_empty());
    }
}
