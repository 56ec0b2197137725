//! Creating commits and advancing branches.
//!
//! Every commit follows the same sequence: check that the branch head is the
//! first parent, build the new tree from the first parent's tree, write the
//! commit object, then compare-and-swap the branch from that parent to the
//! new commit. A concurrent writer that moved the branch in between makes the
//! final swap fail with [`StoreError::BranchConflict`]; the objects already
//! written stay behind as unreferenced garbage.

#![allow(clippy::missing_errors_doc)]

use bimgit_store::{BranchName, Commit, EntryMode, ObjectId, ObjectStore, Signature, StoreError};
use tracing::{debug, info, instrument};

use crate::tree::{self, TreeEdit};

/// Create a commit on `branch` and advance the branch to it.
///
/// `parents[0]` (or absence, when `parents` is empty) must match the
/// current head of `branch`. Merge commits pass the other side as
/// `parents[1]`.
#[instrument(skip_all, fields(branch = %branch, edits = edits.len()))]
pub fn commit(
    store: &dyn ObjectStore,
    branch: &BranchName,
    parents: &[ObjectId],
    edits: &[TreeEdit],
    author: &Signature,
    message: &str,
) -> Result<ObjectId, StoreError> {
    let expected = parents.first().copied();
    let actual = store.read_branch(branch)?;
    if actual != expected {
        return Err(StoreError::BranchConflict {
            branch: branch.to_string(),
            expected,
            actual,
        });
    }

    let base_tree = match expected {
        Some(first) => Some(store.get_commit(&first)?.tree),
        None => None,
    };
    for other in parents.iter().skip(1) {
        store.get_commit(other)?;
    }

    let tree = tree::apply_edits(store, base_tree, edits)?;
    let id = write_commit(store, tree, parents, author, message)?;
    store.update_branch(branch, id, expected)?;
    info!(commit = %id.short(), "committed");
    Ok(id)
}

/// Write a commit object for an already-built tree without moving a branch.
pub fn write_commit(
    store: &dyn ObjectStore,
    tree: ObjectId,
    parents: &[ObjectId],
    author: &Signature,
    message: &str,
) -> Result<ObjectId, StoreError> {
    let id = store.put_commit(&Commit {
        tree,
        parents: parents.to_vec(),
        author: author.clone(),
        message: message.to_owned(),
    })?;
    debug!(commit = %id.short(), tree = %tree.short(), parents = parents.len(), "wrote commit");
    Ok(id)
}

/// Store `content` at `path` on top of the current head of `branch`.
///
/// Creates the branch (with a root commit) if it does not exist yet.
pub fn commit_file(
    store: &dyn ObjectStore,
    branch: &BranchName,
    path: &str,
    content: &[u8],
    author: &Signature,
    message: &str,
) -> Result<ObjectId, StoreError> {
    let head = store.read_branch(branch)?;
    let mode = match head {
        Some(head) => existing_file_mode(store, &head, path)?,
        None => EntryMode::File,
    };
    let blob = store.put_blob(content)?;
    let edit = TreeEdit::Upsert {
        path: path.to_owned(),
        mode,
        id: blob,
    };
    let parents: Vec<ObjectId> = head.into_iter().collect();
    commit(store, branch, &parents, &[edit], author, message)
}

/// Remove the file at `path` on top of the current head of `branch`.
///
/// Directories are refused with [`StoreError::PathConflict`]; use
/// [`commit`] with [`TreeEdit::Remove`] to drop a whole subtree.
pub fn delete_file(
    store: &dyn ObjectStore,
    branch: &BranchName,
    path: &str,
    author: &Signature,
    message: &str,
) -> Result<ObjectId, StoreError> {
    let head = store
        .read_branch(branch)?
        .ok_or_else(|| StoreError::not_found(format!("branch `{branch}`")))?;
    let tree = store.get_commit(&head)?.tree;
    match tree::lookup(store, &tree, path)? {
        Some(entry) if entry.mode.is_dir() => {
            return Err(StoreError::PathConflict {
                path: path.to_owned(),
                message: "is a directory".to_owned(),
            });
        }
        Some(_) => {}
        None => return Err(StoreError::not_found(format!("path `{path}`"))),
    }
    commit(
        store,
        branch,
        &[head],
        &[TreeEdit::remove(path)],
        author,
        message,
    )
}

/// Keep the executable bit when overwriting an existing file.
fn existing_file_mode(
    store: &dyn ObjectStore,
    head: &ObjectId,
    path: &str,
) -> Result<EntryMode, StoreError> {
    let tree = store.get_commit(head)?.tree;
    Ok(match tree::lookup(store, &tree, path)? {
        Some(entry) if entry.mode == EntryMode::Executable => EntryMode::Executable,
        _ => EntryMode::File,
    })
}
