//! Persistent tree editing.
//!
//! Trees are immutable; an edit produces a new root id and leaves every
//! prior tree untouched. Unchanged subtrees keep their ids, so successive
//! commits share structure.
//!
//! # Algorithm
//!
//! 1. Split the edit path into segments.
//! 2. Walk down from the root, keeping each visited level's entry list
//!    (missing directories start out empty when inserting).
//! 3. Apply the change at the leaf level.
//! 4. Rewrite ancestors bottom-up, one `put_tree` per level, each returning
//!    the id that the level above records for it.
//!
//! The walk is a loop over segments, so path depth never grows the call
//! stack.
//!
//! # Policies
//!
//! - A file where a directory is needed (or the reverse) is a
//!   [`StoreError::PathConflict`].
//! - Removing the last entry of a directory keeps the now-empty directory;
//!   parents are never pruned implicitly.
//! - Removing a path that does not exist is [`StoreError::NotFound`].

#![allow(clippy::missing_errors_doc)]

use std::collections::BTreeMap;

use bimgit_store::{EntryMode, ObjectId, ObjectStore, StoreError, TreeEntry, validate_entry_name};

/// Flat view of a tree: full slash-separated path → (mode, blob id).
pub type FlatTree = BTreeMap<String, (EntryMode, ObjectId)>;

// ---------------------------------------------------------------------------
// TreeEdit
// ---------------------------------------------------------------------------

/// An edit applied to a tree by path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TreeEdit {
    /// Insert or replace the entry at `path`. Missing intermediate
    /// directories are created.
    Upsert {
        /// Slash-separated path relative to the tree root.
        path: String,
        /// Mode of the new entry.
        mode: EntryMode,
        /// Blob (or subtree, for [`EntryMode::Directory`]) to store.
        id: ObjectId,
    },
    /// Remove the entry at `path`. A directory is removed with its whole
    /// subtree.
    Remove {
        /// Slash-separated path relative to the tree root.
        path: String,
    },
}

impl TreeEdit {
    /// Upsert a regular file.
    #[must_use]
    pub fn file(path: impl Into<String>, id: ObjectId) -> Self {
        Self::Upsert {
            path: path.into(),
            mode: EntryMode::File,
            id,
        }
    }

    /// Remove a path.
    #[must_use]
    pub fn remove(path: impl Into<String>) -> Self {
        Self::Remove { path: path.into() }
    }

    /// The path this edit targets.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Upsert { path, .. } | Self::Remove { path } => path,
        }
    }
}

// ---------------------------------------------------------------------------
// Paths
// ---------------------------------------------------------------------------

/// Split a repository path into validated segments.
///
/// Leading and trailing slashes are ignored, so `""` and `"/"` both name the
/// root and yield no segments.
pub fn split_path(path: &str) -> Result<Vec<&str>, StoreError> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let segments: Vec<&str> = trimmed.split('/').collect();
    for segment in &segments {
        validate_entry_name(segment).map_err(|_| StoreError::InvalidPath {
            path: path.to_owned(),
            reason: format!("bad segment {segment:?}"),
        })?;
    }
    Ok(segments)
}

// ---------------------------------------------------------------------------
// Editing
// ---------------------------------------------------------------------------

/// Apply one edit to `root` (`None` = empty tree) and return the new root.
pub fn apply_edit(
    store: &dyn ObjectStore,
    root: Option<ObjectId>,
    edit: &TreeEdit,
) -> Result<ObjectId, StoreError> {
    let segments = split_path(edit.path())?;
    let Some((leaf, dirs)) = segments.split_last() else {
        return Err(StoreError::InvalidPath {
            path: edit.path().to_owned(),
            reason: "edit path names the root".to_owned(),
        });
    };

    // Walk down, remembering every level above the leaf directory.
    let mut ancestors: Vec<Vec<TreeEntry>> = Vec::with_capacity(dirs.len());
    let mut current = match root {
        Some(id) => store.get_tree(&id)?,
        None => Vec::new(),
    };
    for (depth, segment) in dirs.iter().enumerate() {
        let next = match current.iter().find(|e| e.name == *segment) {
            Some(entry) if entry.mode.is_dir() => store.get_tree(&entry.id)?,
            Some(_) => {
                return Err(StoreError::PathConflict {
                    path: dirs[..=depth].join("/"),
                    message: "is a file, expected a directory".to_owned(),
                });
            }
            None => match edit {
                TreeEdit::Upsert { .. } => Vec::new(),
                TreeEdit::Remove { path } => {
                    return Err(StoreError::not_found(format!("path `{path}`")));
                }
            },
        };
        ancestors.push(std::mem::replace(&mut current, next));
    }

    match edit {
        TreeEdit::Upsert { mode, id, .. } => {
            if let Some(existing) = current.iter_mut().find(|e| e.name == *leaf) {
                if existing.mode.is_dir() != mode.is_dir() {
                    let what = if existing.mode.is_dir() {
                        "is a directory, expected a file"
                    } else {
                        "is a file, expected a directory"
                    };
                    return Err(StoreError::PathConflict {
                        path: segments.join("/"),
                        message: what.to_owned(),
                    });
                }
                existing.mode = *mode;
                existing.id = *id;
            } else {
                current.push(TreeEntry {
                    name: (*leaf).to_owned(),
                    mode: *mode,
                    id: *id,
                });
            }
        }
        TreeEdit::Remove { path } => {
            let index = current
                .iter()
                .position(|e| e.name == *leaf)
                .ok_or_else(|| StoreError::not_found(format!("path `{path}`")))?;
            current.remove(index);
        }
    }

    // Unwind: rewrite each ancestor with the new id of its child.
    let mut child = store.put_tree(&current)?;
    for (segment, mut entries) in dirs.iter().zip(ancestors).rev() {
        if let Some(existing) = entries.iter_mut().find(|e| e.name == *segment) {
            existing.id = child;
        } else {
            entries.push(TreeEntry::dir(*segment, child));
        }
        child = store.put_tree(&entries)?;
    }
    Ok(child)
}

/// Apply a batch of edits in order. With no edits, returns `root` (or the
/// empty tree).
pub fn apply_edits(
    store: &dyn ObjectStore,
    root: Option<ObjectId>,
    edits: &[TreeEdit],
) -> Result<ObjectId, StoreError> {
    let mut current = match root {
        Some(id) => id,
        None => store.put_tree(&[])?,
    };
    for edit in edits {
        current = apply_edit(store, Some(current), edit)?;
    }
    Ok(current)
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Find the entry at `path` below `root`. `Ok(None)` if any segment is
/// missing or a file sits where a directory is needed.
///
/// An empty path has no entry; callers treat it as the root itself.
pub fn lookup(
    store: &dyn ObjectStore,
    root: &ObjectId,
    path: &str,
) -> Result<Option<TreeEntry>, StoreError> {
    let segments = split_path(path)?;
    let Some((leaf, dirs)) = segments.split_last() else {
        return Ok(None);
    };
    let mut tree = *root;
    for segment in dirs {
        match store.get_tree(&tree)?.into_iter().find(|e| e.name == *segment) {
            Some(entry) if entry.mode.is_dir() => tree = entry.id,
            _ => return Ok(None),
        }
    }
    Ok(store
        .get_tree(&tree)?
        .into_iter()
        .find(|e| e.name == *leaf))
}

/// List every file below `root` with its full path. Empty directories
/// contribute nothing.
pub fn flatten(store: &dyn ObjectStore, root: &ObjectId) -> Result<FlatTree, StoreError> {
    let mut out = FlatTree::new();
    let mut stack = vec![(String::new(), *root)];
    while let Some((prefix, tree)) = stack.pop() {
        for entry in store.get_tree(&tree)? {
            let path = join_path(&prefix, &entry.name);
            if entry.mode.is_dir() {
                stack.push((path, entry.id));
            } else {
                out.insert(path, (entry.mode, entry.id));
            }
        }
    }
    Ok(out)
}

/// Join a directory prefix and an entry name.
#[must_use]
pub fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_owned()
    } else {
        format!("{prefix}/{name}")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
