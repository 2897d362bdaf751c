//! Operation processors
//!
//! One processor per member of the closed operation set, dispatched by tag.
//! Each processor:
//!
//! 1. Validates the target against the schema and the store.
//! 2. Computes the inverse operation (the one that undoes this) from the
//!    pre-state.
//! 3. Applies the mutation and keeps the inverse index in step.
//! 4. Synthesizes mirror operations for schema-declared inverse
//!    relationships and applies them recursively.
//!
//! Mirror ordering is fixed: the forward operation applies first, then its
//! mirrors in relationship-declaration order. Recursion terminates because
//! every processor is guarded by a state check - an operation that would not
//! change the store is a no-op and synthesizes nothing.
//!
//! Every applied `(operation, inverse)` pair is pushed onto the shared
//! `applied` list as it happens, so a caller can roll back a partially
//! applied batch even when a later operation fails.

use crate::inverse::InverseIndex;
use crate::store::RecordStore;
use orrery_core::schema::{RelationshipDef, RelationshipKind, Schema};
use orrery_core::{
    Error, KeyMap, Record, RecordIdentity, RecordOperation, RecordRelationship, RelationshipData,
    Result,
};

/// Shared context for a patch batch
pub struct ProcessorContext<'a> {
    /// Schema consulted for model and relationship declarations
    pub schema: &'a Schema,
    /// KeyMap fed with every applied record's keys, when configured
    pub key_map: Option<&'a KeyMap>,
    /// Whether mirror operations may create missing targets as placeholders
    pub allow_create_placeholders: bool,
}

/// An `(applied operation, inverse operation)` pair
pub type AppliedPair = (RecordOperation, RecordOperation);

/// A pre-resolved back-link: the inverse relationship on a mirror target
struct BackLink {
    target: RecordIdentity,
    inverse: String,
    kind: RelationshipKind,
}

fn back_link(ctx: &ProcessorContext<'_>, target: &RecordIdentity, inverse: &str) -> Result<BackLink> {
    let def = ctx.schema.relationship_def(&target.kind, inverse)?;
    Ok(BackLink {
        target: target.clone(),
        inverse: inverse.to_string(),
        kind: def.kind,
    })
}

/// Apply one operation (and its mirrors) to the store
///
/// Returns the primary record after application, or `None` for removals and
/// for no-ops on missing targets. Applied pairs are appended to `applied` in
/// application order.
pub fn apply_operation(
    store: &mut RecordStore,
    index: &mut InverseIndex,
    ctx: &ProcessorContext<'_>,
    op: &RecordOperation,
    applied: &mut Vec<AppliedPair>,
) -> Result<Option<Record>> {
    match op {
        RecordOperation::AddRecord { record } => add_record(store, index, ctx, record, applied),
        RecordOperation::UpdateRecord { record } => {
            update_record(store, index, ctx, record, applied)
        }
        RecordOperation::RemoveRecord { record } => remove_record(store, index, ctx, record, applied),
        RecordOperation::ReplaceKey { record, key, value } => {
            replace_key(store, ctx, record, key, value, applied)
        }
        RecordOperation::ReplaceAttribute {
            record,
            attribute,
            value,
        } => replace_attribute(store, ctx, record, attribute, value, applied),
        RecordOperation::AddToRelatedRecords {
            record,
            relationship,
            related_record,
        } => add_to_related_records(store, index, ctx, record, relationship, related_record, applied),
        RecordOperation::RemoveFromRelatedRecords {
            record,
            relationship,
            related_record,
        } => remove_from_related_records(
            store,
            index,
            ctx,
            record,
            relationship,
            related_record,
            applied,
        ),
        RecordOperation::ReplaceRelatedRecords {
            record,
            relationship,
            related_records,
        } => replace_related_records(
            store,
            index,
            ctx,
            record,
            relationship,
            related_records,
            applied,
        ),
        RecordOperation::ReplaceRelatedRecord {
            record,
            relationship,
            related_record,
        } => replace_related_record(
            store,
            index,
            ctx,
            record,
            relationship,
            related_record.as_ref(),
            applied,
        ),
    }
}

// =============================================================================
// Index maintenance
// =============================================================================

fn index_add_record(index: &mut InverseIndex, record: &Record) {
    for (rel_name, rel) in &record.relationships {
        for target in rel.data.identities() {
            index.add(target, &record.identity, rel_name);
        }
    }
}

fn index_remove_record(index: &mut InverseIndex, record: &Record) {
    for (rel_name, rel) in &record.relationships {
        for target in rel.data.identities() {
            index.remove(target, &record.identity, rel_name);
        }
    }
}

// =============================================================================
// Shape checks
// =============================================================================

fn check_linkage_shape(
    identity: &RecordIdentity,
    rel_name: &str,
    def: &RelationshipDef,
    data: &RelationshipData,
) -> Result<()> {
    let ok = match (def.kind, data) {
        (RelationshipKind::HasOne, RelationshipData::Many(_)) => false,
        (RelationshipKind::HasMany, RelationshipData::One(_)) => false,
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(Error::operation_not_allowed(format!(
            "linkage shape of {} does not match the declared arity of {}.{}",
            identity, identity.kind, rel_name
        )))
    }
}

fn require_has_many(
    ctx: &ProcessorContext<'_>,
    identity: &RecordIdentity,
    rel_name: &str,
) -> Result<RelationshipDef> {
    let def = ctx.schema.relationship_def(&identity.kind, rel_name)?;
    if def.is_has_many() {
        Ok(def)
    } else {
        Err(Error::operation_not_allowed(format!(
            "{}.{} is a to-one relationship; expected to-many",
            identity.kind, rel_name
        )))
    }
}

fn require_has_one(
    ctx: &ProcessorContext<'_>,
    identity: &RecordIdentity,
    rel_name: &str,
) -> Result<RelationshipDef> {
    let def = ctx.schema.relationship_def(&identity.kind, rel_name)?;
    if def.is_has_many() {
        Err(Error::operation_not_allowed(format!(
            "{}.{} is a to-many relationship; expected to-one",
            identity.kind, rel_name
        )))
    } else {
        Ok(def)
    }
}

fn to_many_members(data: Option<&RelationshipData>) -> Result<Vec<RecordIdentity>> {
    match data {
        None | Some(RelationshipData::None) => Ok(Vec::new()),
        Some(RelationshipData::Many(members)) => Ok(members.clone()),
        Some(RelationshipData::One(_)) => Err(Error::operation_not_allowed(
            "to-many relationship holds a to-one linkage",
        )),
    }
}

// =============================================================================
// Mirror synthesis
// =============================================================================

/// Operations establishing the back-link `target.inverse -> source`
///
/// A missing target becomes a placeholder when the context allows it;
/// otherwise the mirror is skipped and only the forward edge is recorded.
fn back_link_add_ops(
    store: &RecordStore,
    ctx: &ProcessorContext<'_>,
    link: &BackLink,
    source: &RecordIdentity,
) -> Vec<RecordOperation> {
    let mut ops = Vec::new();
    if !store.contains(&link.target) {
        if !ctx.allow_create_placeholders {
            return ops;
        }
        ops.push(RecordOperation::AddRecord {
            record: Record::from_identity(link.target.clone()),
        });
    }
    match link.kind {
        RelationshipKind::HasMany => ops.push(RecordOperation::AddToRelatedRecords {
            record: link.target.clone(),
            relationship: link.inverse.clone(),
            related_record: source.clone(),
        }),
        RelationshipKind::HasOne => ops.push(RecordOperation::ReplaceRelatedRecord {
            record: link.target.clone(),
            relationship: link.inverse.clone(),
            related_record: Some(source.clone()),
        }),
    }
    ops
}

/// Operations dropping the back-link `target.inverse -> source`
fn back_link_remove_ops(
    store: &RecordStore,
    link: &BackLink,
    source: &RecordIdentity,
) -> Vec<RecordOperation> {
    let Some(target) = store.get(&link.target) else {
        return Vec::new();
    };
    match link.kind {
        RelationshipKind::HasMany => {
            if target
                .relationship_data(&link.inverse)
                .is_some_and(|data| data.includes(source))
            {
                vec![RecordOperation::RemoveFromRelatedRecords {
                    record: link.target.clone(),
                    relationship: link.inverse.clone(),
                    related_record: source.clone(),
                }]
            } else {
                Vec::new()
            }
        }
        RelationshipKind::HasOne => {
            if target
                .relationship_data(&link.inverse)
                .and_then(RelationshipData::as_one)
                == Some(source)
            {
                vec![RecordOperation::ReplaceRelatedRecord {
                    record: link.target.clone(),
                    relationship: link.inverse.clone(),
                    related_record: None,
                }]
            } else {
                Vec::new()
            }
        }
    }
}

fn apply_mirrors(
    store: &mut RecordStore,
    index: &mut InverseIndex,
    ctx: &ProcessorContext<'_>,
    mirrors: Vec<RecordOperation>,
    applied: &mut Vec<AppliedPair>,
) -> Result<()> {
    for mirror in mirrors {
        apply_operation(store, index, ctx, &mirror, applied)?;
    }
    Ok(())
}

// =============================================================================
// Processors
// =============================================================================

fn add_record(
    store: &mut RecordStore,
    index: &mut InverseIndex,
    ctx: &ProcessorContext<'_>,
    record: &Record,
    applied: &mut Vec<AppliedPair>,
) -> Result<Option<Record>> {
    let identity = record.identity.clone();
    ctx.schema.model(&identity.kind)?;
    if store.contains(&identity) {
        return Err(Error::record_already_exists(identity));
    }

    // Resolve every back-link before mutating, so schema errors cannot leave
    // an unrecorded partial application behind.
    let mut links: Vec<BackLink> = Vec::new();
    for (rel_name, rel) in &record.relationships {
        let def = ctx.schema.relationship_def(&identity.kind, rel_name)?;
        check_linkage_shape(&identity, rel_name, &def, &rel.data)?;
        if let Some(inverse) = &def.inverse {
            for target in rel.data.identities() {
                links.push(back_link(ctx, target, inverse)?);
            }
        }
    }

    store.put(record.clone());
    index_add_record(index, record);
    if let Some(key_map) = ctx.key_map {
        key_map.push_record(record);
    }
    applied.push((
        RecordOperation::AddRecord {
            record: record.clone(),
        },
        RecordOperation::RemoveRecord {
            record: identity.clone(),
        },
    ));

    for link in &links {
        let mirrors = back_link_add_ops(store, ctx, link, &identity);
        apply_mirrors(store, index, ctx, mirrors, applied)?;
    }

    Ok(store.get(&identity).cloned())
}

fn update_record(
    store: &mut RecordStore,
    index: &mut InverseIndex,
    ctx: &ProcessorContext<'_>,
    record: &Record,
    applied: &mut Vec<AppliedPair>,
) -> Result<Option<Record>> {
    let identity = record.identity.clone();
    ctx.schema.model(&identity.kind)?;
    let current = store
        .get(&identity)
        .cloned()
        .ok_or_else(|| Error::record_not_found(identity.clone()))?;

    // Diff the relationship linkage per declared inverse: targets dropped by
    // the replacement lose their back-link, new targets gain one.
    let mut removals: Vec<BackLink> = Vec::new();
    let mut additions: Vec<BackLink> = Vec::new();
    let mut rel_names: Vec<String> = current.relationships.keys().cloned().collect();
    for name in record.relationships.keys() {
        if !rel_names.iter().any(|existing| existing == name) {
            rel_names.push(name.clone());
        }
    }
    for rel_name in &rel_names {
        let def = ctx.schema.relationship_def(&identity.kind, rel_name)?;
        if let Some(rel) = record.relationships.get(rel_name) {
            check_linkage_shape(&identity, rel_name, &def, &rel.data)?;
        }
        let Some(inverse) = &def.inverse else {
            continue;
        };
        let old_targets: Vec<RecordIdentity> = current
            .relationship_data(rel_name)
            .map(|data| data.identities().into_iter().cloned().collect())
            .unwrap_or_default();
        let new_targets: Vec<RecordIdentity> = record
            .relationship_data(rel_name)
            .map(|data| data.identities().into_iter().cloned().collect())
            .unwrap_or_default();
        for target in &old_targets {
            if !new_targets.contains(target) {
                removals.push(back_link(ctx, target, inverse)?);
            }
        }
        for target in &new_targets {
            if !old_targets.contains(target) {
                additions.push(back_link(ctx, target, inverse)?);
            }
        }
    }

    index_remove_record(index, &current);
    store.put(record.clone());
    index_add_record(index, record);
    if let Some(key_map) = ctx.key_map {
        key_map.push_record(record);
    }
    applied.push((
        RecordOperation::UpdateRecord {
            record: record.clone(),
        },
        RecordOperation::UpdateRecord { record: current },
    ));

    for link in &removals {
        let mirrors = back_link_remove_ops(store, link, &identity);
        apply_mirrors(store, index, ctx, mirrors, applied)?;
    }
    for link in &additions {
        let mirrors = back_link_add_ops(store, ctx, link, &identity);
        apply_mirrors(store, index, ctx, mirrors, applied)?;
    }

    Ok(store.get(&identity).cloned())
}

fn remove_record(
    store: &mut RecordStore,
    index: &mut InverseIndex,
    ctx: &ProcessorContext<'_>,
    identity: &RecordIdentity,
    applied: &mut Vec<AppliedPair>,
) -> Result<Option<Record>> {
    ctx.schema.model(&identity.kind)?;
    let Some(current) = store.get(identity).cloned() else {
        // Removing an absent record is a no-op.
        return Ok(None);
    };

    // Snapshot referrers and their arities before touching the store.
    let incoming = index.links_to(identity);
    let mut cascades: Vec<RecordOperation> = Vec::new();
    for link in &incoming {
        let def = ctx.schema.relationship_def(&link.record.kind, &link.relationship)?;
        let cascade = match def.kind {
            RelationshipKind::HasOne => RecordOperation::ReplaceRelatedRecord {
                record: link.record.clone(),
                relationship: link.relationship.clone(),
                related_record: None,
            },
            RelationshipKind::HasMany => RecordOperation::RemoveFromRelatedRecords {
                record: link.record.clone(),
                relationship: link.relationship.clone(),
                related_record: identity.clone(),
            },
        };
        cascades.push(cascade);
    }

    store.remove(identity);
    index_remove_record(index, &current);
    applied.push((
        RecordOperation::RemoveRecord {
            record: identity.clone(),
        },
        RecordOperation::AddRecord { record: current },
    ));

    apply_mirrors(store, index, ctx, cascades, applied)?;

    Ok(None)
}

fn replace_key(
    store: &mut RecordStore,
    ctx: &ProcessorContext<'_>,
    identity: &RecordIdentity,
    key: &str,
    value: &str,
    applied: &mut Vec<AppliedPair>,
) -> Result<Option<Record>> {
    ctx.schema.key_def(&identity.kind, key)?;
    let current = store
        .get(identity)
        .cloned()
        .ok_or_else(|| Error::record_not_found(identity.clone()))?;

    if current.key(key) == Some(value) {
        return Ok(Some(current));
    }

    // A previously absent key has no expressible key-level inverse; fall back
    // to restoring the whole prior record.
    let inverse = match current.key(key) {
        Some(old) => RecordOperation::ReplaceKey {
            record: identity.clone(),
            key: key.to_string(),
            value: old.to_string(),
        },
        None => RecordOperation::UpdateRecord {
            record: current.clone(),
        },
    };

    let mut updated = current;
    updated.keys.insert(key.to_string(), value.to_string());
    store.put(updated.clone());
    if let Some(key_map) = ctx.key_map {
        key_map.insert(&identity.kind, key, value, &identity.id);
    }
    applied.push((
        RecordOperation::ReplaceKey {
            record: identity.clone(),
            key: key.to_string(),
            value: value.to_string(),
        },
        inverse,
    ));

    Ok(Some(updated))
}

fn replace_attribute(
    store: &mut RecordStore,
    ctx: &ProcessorContext<'_>,
    identity: &RecordIdentity,
    attribute: &str,
    value: &serde_json::Value,
    applied: &mut Vec<AppliedPair>,
) -> Result<Option<Record>> {
    ctx.schema.attribute_def(&identity.kind, attribute)?;
    let current = store
        .get(identity)
        .cloned()
        .ok_or_else(|| Error::record_not_found(identity.clone()))?;

    if current.attribute(attribute) == Some(value) {
        return Ok(Some(current));
    }

    let inverse = match current.attribute(attribute) {
        Some(old) => RecordOperation::ReplaceAttribute {
            record: identity.clone(),
            attribute: attribute.to_string(),
            value: old.clone(),
        },
        None => RecordOperation::UpdateRecord {
            record: current.clone(),
        },
    };

    let mut updated = current;
    updated
        .attributes
        .insert(attribute.to_string(), value.clone());
    store.put(updated.clone());
    applied.push((
        RecordOperation::ReplaceAttribute {
            record: identity.clone(),
            attribute: attribute.to_string(),
            value: value.clone(),
        },
        inverse,
    ));

    Ok(Some(updated))
}

#[allow(clippy::too_many_arguments)]
fn add_to_related_records(
    store: &mut RecordStore,
    index: &mut InverseIndex,
    ctx: &ProcessorContext<'_>,
    identity: &RecordIdentity,
    relationship: &str,
    related: &RecordIdentity,
    applied: &mut Vec<AppliedPair>,
) -> Result<Option<Record>> {
    let def = require_has_many(ctx, identity, relationship)?;
    let current = store
        .get(identity)
        .cloned()
        .ok_or_else(|| Error::record_not_found(identity.clone()))?;

    let mut members = to_many_members(current.relationship_data(relationship))?;
    if members.contains(related) {
        // Already linked; applying again would only echo mirrors forever.
        return Ok(Some(current));
    }

    let entry_existed = current.relationships.contains_key(relationship);
    let inverse = if entry_existed {
        RecordOperation::RemoveFromRelatedRecords {
            record: identity.clone(),
            relationship: relationship.to_string(),
            related_record: related.clone(),
        }
    } else {
        RecordOperation::UpdateRecord {
            record: current.clone(),
        }
    };

    let link = match &def.inverse {
        Some(inverse_name) => Some(back_link(ctx, related, inverse_name)?),
        None => None,
    };

    members.push(related.clone());
    let mut updated = current;
    set_linkage(&mut updated, relationship, RelationshipData::Many(members));
    store.put(updated.clone());
    index.add(related, identity, relationship);
    applied.push((
        RecordOperation::AddToRelatedRecords {
            record: identity.clone(),
            relationship: relationship.to_string(),
            related_record: related.clone(),
        },
        inverse,
    ));

    if let Some(link) = &link {
        let mirrors = back_link_add_ops(store, ctx, link, identity);
        apply_mirrors(store, index, ctx, mirrors, applied)?;
    }

    Ok(store.get(identity).cloned())
}

#[allow(clippy::too_many_arguments)]
fn remove_from_related_records(
    store: &mut RecordStore,
    index: &mut InverseIndex,
    ctx: &ProcessorContext<'_>,
    identity: &RecordIdentity,
    relationship: &str,
    related: &RecordIdentity,
    applied: &mut Vec<AppliedPair>,
) -> Result<Option<Record>> {
    let def = require_has_many(ctx, identity, relationship)?;
    let Some(current) = store.get(identity).cloned() else {
        // Shrinking a relationship of an absent record is a no-op; this arm
        // absorbs mirror echoes during removals.
        return Ok(None);
    };

    let members = to_many_members(current.relationship_data(relationship))?;
    if !members.contains(related) {
        return Ok(Some(current));
    }

    let link = match &def.inverse {
        Some(inverse_name) => Some(back_link(ctx, related, inverse_name)?),
        None => None,
    };

    let remaining: Vec<RecordIdentity> = members.into_iter().filter(|m| m != related).collect();
    let mut updated = current;
    set_linkage(&mut updated, relationship, RelationshipData::Many(remaining));
    store.put(updated.clone());
    index.remove(related, identity, relationship);
    applied.push((
        RecordOperation::RemoveFromRelatedRecords {
            record: identity.clone(),
            relationship: relationship.to_string(),
            related_record: related.clone(),
        },
        RecordOperation::AddToRelatedRecords {
            record: identity.clone(),
            relationship: relationship.to_string(),
            related_record: related.clone(),
        },
    ));

    if let Some(link) = &link {
        let mirrors = back_link_remove_ops(store, link, identity);
        apply_mirrors(store, index, ctx, mirrors, applied)?;
    }

    Ok(store.get(identity).cloned())
}

#[allow(clippy::too_many_arguments)]
fn replace_related_records(
    store: &mut RecordStore,
    index: &mut InverseIndex,
    ctx: &ProcessorContext<'_>,
    identity: &RecordIdentity,
    relationship: &str,
    related: &[RecordIdentity],
    applied: &mut Vec<AppliedPair>,
) -> Result<Option<Record>> {
    let def = require_has_many(ctx, identity, relationship)?;
    let current = store
        .get(identity)
        .cloned()
        .ok_or_else(|| Error::record_not_found(identity.clone()))?;

    let old_members = to_many_members(current.relationship_data(relationship))?;
    let mut new_members: Vec<RecordIdentity> = Vec::new();
    for member in related {
        if !new_members.contains(member) {
            new_members.push(member.clone());
        }
    }
    let entry_existed = current.relationships.contains_key(relationship);
    if entry_existed && old_members == new_members {
        return Ok(Some(current));
    }

    let inverse = if entry_existed {
        RecordOperation::ReplaceRelatedRecords {
            record: identity.clone(),
            relationship: relationship.to_string(),
            related_records: old_members.clone(),
        }
    } else {
        RecordOperation::UpdateRecord {
            record: current.clone(),
        }
    };

    let mut removals: Vec<BackLink> = Vec::new();
    let mut additions: Vec<BackLink> = Vec::new();
    if let Some(inverse_name) = &def.inverse {
        for member in &old_members {
            if !new_members.contains(member) {
                removals.push(back_link(ctx, member, inverse_name)?);
            }
        }
        for member in &new_members {
            if !old_members.contains(member) {
                additions.push(back_link(ctx, member, inverse_name)?);
            }
        }
    }

    let mut updated = current;
    set_linkage(
        &mut updated,
        relationship,
        RelationshipData::Many(new_members.clone()),
    );
    store.put(updated.clone());
    for member in &old_members {
        if !new_members.contains(member) {
            index.remove(member, identity, relationship);
        }
    }
    for member in &new_members {
        if !old_members.contains(member) {
            index.add(member, identity, relationship);
        }
    }
    applied.push((
        RecordOperation::ReplaceRelatedRecords {
            record: identity.clone(),
            relationship: relationship.to_string(),
            related_records: new_members,
        },
        inverse,
    ));

    for link in &removals {
        let mirrors = back_link_remove_ops(store, link, identity);
        apply_mirrors(store, index, ctx, mirrors, applied)?;
    }
    for link in &additions {
        let mirrors = back_link_add_ops(store, ctx, link, identity);
        apply_mirrors(store, index, ctx, mirrors, applied)?;
    }

    Ok(store.get(identity).cloned())
}

#[allow(clippy::too_many_arguments)]
fn replace_related_record(
    store: &mut RecordStore,
    index: &mut InverseIndex,
    ctx: &ProcessorContext<'_>,
    identity: &RecordIdentity,
    relationship: &str,
    related: Option<&RecordIdentity>,
    applied: &mut Vec<AppliedPair>,
) -> Result<Option<Record>> {
    let def = require_has_one(ctx, identity, relationship)?;
    let Some(current) = store.get(identity).cloned() else {
        // Clearing a to-one link of an absent record is a no-op; this arm
        // absorbs cascade echoes during removals.
        if related.is_none() {
            return Ok(None);
        }
        return Err(Error::record_not_found(identity.clone()));
    };

    let entry_existed = current.relationships.contains_key(relationship);
    let old_target = current
        .relationship_data(relationship)
        .and_then(RelationshipData::as_one)
        .cloned();
    if entry_existed && old_target.as_ref() == related {
        return Ok(Some(current));
    }

    let inverse = if entry_existed {
        RecordOperation::ReplaceRelatedRecord {
            record: identity.clone(),
            relationship: relationship.to_string(),
            related_record: old_target.clone(),
        }
    } else {
        RecordOperation::UpdateRecord {
            record: current.clone(),
        }
    };

    let mut removal: Option<BackLink> = None;
    let mut addition: Option<BackLink> = None;
    if let Some(inverse_name) = &def.inverse {
        if let Some(old) = &old_target {
            removal = Some(back_link(ctx, old, inverse_name)?);
        }
        if let Some(new) = related {
            addition = Some(back_link(ctx, new, inverse_name)?);
        }
    }

    let mut updated = current;
    let data = match related {
        Some(new) => RelationshipData::One(new.clone()),
        None => RelationshipData::None,
    };
    set_linkage(&mut updated, relationship, data);
    store.put(updated.clone());
    if let Some(old) = &old_target {
        index.remove(old, identity, relationship);
    }
    if let Some(new) = related {
        index.add(new, identity, relationship);
    }
    applied.push((
        RecordOperation::ReplaceRelatedRecord {
            record: identity.clone(),
            relationship: relationship.to_string(),
            related_record: related.cloned(),
        },
        inverse,
    ));

    if let Some(link) = &removal {
        let mirrors = back_link_remove_ops(store, link, identity);
        apply_mirrors(store, index, ctx, mirrors, applied)?;
    }
    if let Some(link) = &addition {
        let mirrors = back_link_add_ops(store, ctx, link, identity);
        apply_mirrors(store, index, ctx, mirrors, applied)?;
    }

    Ok(store.get(identity).cloned())
}

fn set_linkage(record: &mut Record, relationship: &str, data: RelationshipData) {
    match record.relationships.get_mut(relationship) {
        Some(rel) => rel.data = data,
        None => {
            record
                .relationships
                .insert(relationship.to_string(), RecordRelationship::new(data));
        }
    }
}
