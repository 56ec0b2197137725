//! Entity-level diff of domain files.
//!
//! The engine never reads domain file formats itself. A [`DomainParser`]
//! turns a file into an [`EntityMap`] of string-keyed entities, and
//! [`semantic_diff`] compares two such maps blindly: entities are matched
//! by id, then field by field.

#![allow(clippy::missing_errors_doc)]

use std::collections::BTreeMap;

use bimgit_store::{ObjectId, ObjectStore, StoreError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::tree;

/// One entity as seen by the diff: its class and stringified fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainEntity {
    pub class: String,
    pub fields: BTreeMap<String, String>,
}

impl DomainEntity {
    /// An entity with no fields.
    #[must_use]
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }
}

/// `entity_id → entity`, ordered by id.
pub type EntityMap = BTreeMap<String, DomainEntity>;

/// Errors from a [`DomainParser`].
#[derive(Debug, Error)]
pub enum ParseError {
    /// The parser does not handle this kind of file.
    #[error("unsupported file `{path}`")]
    Unsupported { path: String },

    /// The file could not be parsed.
    #[error("malformed `{path}`: {message}")]
    Malformed { path: String, message: String },

    /// Reading the file from the repository failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Capability that turns a file at a commit into an [`EntityMap`].
///
/// Implementations own their format knowledge (and usually a handle to the
/// repository for reading the bytes). The engine only calls `parse` for
/// paths that exist at the given commit.
pub trait DomainParser: Send + Sync {
    fn parse(&self, commit: &ObjectId, path: &str) -> Result<EntityMap, ParseError>;
}

/// Identity of an added or removed entity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EntitySummary {
    pub entity_id: String,
    pub class: String,
}

/// A single changed field. `None` means the field is absent on that side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub old: Option<String>,
    pub new: Option<String>,
}

/// An entity present on both sides with differing content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DomainEntityDiff {
    pub entity_id: String,
    /// Class on the new side.
    pub class: String,
    /// Set when the class itself changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_class: Option<String>,
    pub changes: Vec<FieldChange>,
}

/// Result of [`semantic_diff`]. All lists are ordered by entity id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SemanticDiff {
    pub added: Vec<EntitySummary>,
    pub removed: Vec<EntitySummary>,
    pub modified: Vec<DomainEntityDiff>,
    pub unchanged_count: usize,
}

impl SemanticDiff {
    /// `true` if nothing was added, removed or modified.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }
}

/// Compare two entity maps.
#[must_use]
pub fn semantic_diff(from: &EntityMap, to: &EntityMap) -> SemanticDiff {
    let mut out = SemanticDiff::default();
    for (id, old) in from {
        let Some(new) = to.get(id) else {
            out.removed.push(EntitySummary {
                entity_id: id.clone(),
                class: old.class.clone(),
            });
            continue;
        };
        let changes = field_changes(&old.fields, &new.fields);
        if changes.is_empty() && old.class == new.class {
            out.unchanged_count += 1;
            continue;
        }
        out.modified.push(DomainEntityDiff {
            entity_id: id.clone(),
            class: new.class.clone(),
            previous_class: (old.class != new.class).then(|| old.class.clone()),
            changes,
        });
    }
    out.added = to
        .iter()
        .filter(|(id, _)| !from.contains_key(*id))
        .map(|(id, entity)| EntitySummary {
            entity_id: id.clone(),
            class: entity.class.clone(),
        })
        .collect();
    out
}

fn field_changes(
    old: &BTreeMap<String, String>,
    new: &BTreeMap<String, String>,
) -> Vec<FieldChange> {
    let mut names: Vec<&String> = old.keys().chain(new.keys()).collect();
    names.sort();
    names.dedup();
    names
        .into_iter()
        .filter_map(|name| {
            let before = old.get(name);
            let after = new.get(name);
            (before != after).then(|| FieldChange {
                field: name.clone(),
                old: before.cloned(),
                new: after.cloned(),
            })
        })
        .collect()
}

/// Semantic diff of the file at `path` between two commits.
///
/// A side where the path does not exist contributes an empty map, so a
/// newly added file reports every entity as added.
#[instrument(skip_all, fields(from = %from.short(), to = %to.short(), path = %path))]
pub fn semantic_diff_at(
    store: &dyn ObjectStore,
    parser: &dyn DomainParser,
    from: &ObjectId,
    to: &ObjectId,
    path: &str,
) -> Result<SemanticDiff, ParseError> {
    let from_map = parse_side(store, parser, from, path)?;
    let to_map = parse_side(store, parser, to, path)?;
    if from_map.is_none() && to_map.is_none() {
        return Err(StoreError::not_found(format!(
            "file `{path}` in {} or {}",
            from.short(),
            to.short()
        ))
        .into());
    }
    let result = semantic_diff(&from_map.unwrap_or_default(), &to_map.unwrap_or_default());
    debug!(
        added = result.added.len(),
        removed = result.removed.len(),
        modified = result.modified.len(),
        "semantic diff"
    );
    Ok(result)
}

fn parse_side(
    store: &dyn ObjectStore,
    parser: &dyn DomainParser,
    commit: &ObjectId,
    path: &str,
) -> Result<Option<EntityMap>, ParseError> {
    let root = store.get_commit(commit)?.tree;
    match tree::lookup(store, &root, path)? {
        Some(entry) if entry.mode.is_file() => Ok(Some(parser.parse(commit, path)?)),
        _ => Ok(None),
    }
}
