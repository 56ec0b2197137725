//! The [`Repository`] handle: one store plus every engine operation.
//!
//! A handle is cheap to share across threads (`&Repository` is `Send` +
//! `Sync`). Any number of readers and writers may work concurrently; writers
//! to the same branch race on compare-and-swap and the loser gets
//! [`StoreError::BranchConflict`].

#![allow(clippy::missing_errors_doc)]

use std::path::{Path, PathBuf};

use bimgit_store::{BranchName, FsStore, MemStore, ObjectId, ObjectStore, Signature, StoreError};

use crate::commit;
use crate::diff::{self, DiffOptions, DiffStats, FileStatusDelta};
use crate::history::{self, BranchInfo, Log, TreeListing};
use crate::merge::{self, ConflictResolver, MergeOptions, MergeOutcome};
use crate::semantic::{self, DomainParser, EntityMap, ParseError, SemanticDiff};
use crate::tree::TreeEdit;

/// A version-controlled repository.
pub struct Repository {
    store: Box<dyn ObjectStore>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repository")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Create (or re-open) an on-disk repository at `path`.
pub fn init_repo(path: &Path) -> Result<Repository, StoreError> {
    Repository::init(path)
}

/// Open an existing on-disk repository at `path`.
pub fn open_repo(path: &Path) -> Result<Repository, StoreError> {
    Repository::open(path)
}

impl Repository {
    /// See [`init_repo`].
    pub fn init(path: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            store: Box::new(FsStore::init(path)?),
            path: Some(path.to_path_buf()),
        })
    }

    /// See [`open_repo`].
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            store: Box::new(FsStore::open(path)?),
            path: Some(path.to_path_buf()),
        })
    }

    /// Wrap any store.
    pub fn with_store(store: impl ObjectStore + 'static) -> Self {
        Self {
            store: Box::new(store),
            path: None,
        }
    }

    /// A repository held entirely in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_store(MemStore::new())
    }

    /// Root directory for on-disk repositories.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &dyn ObjectStore {
        self.store.as_ref()
    }

    /// Resolve a revision: a branch name, or a 64-character hex commit id.
    pub fn resolve_rev(&self, rev: &str) -> Result<ObjectId, StoreError> {
        if ObjectId::is_hex_id(rev) {
            let id: ObjectId = rev.parse()?;
            self.store.get_commit(&id)?;
            return Ok(id);
        }
        let branch = BranchName::new(rev)?;
        self.store
            .read_branch(&branch)?
            .ok_or_else(|| StoreError::not_found(format!("branch `{branch}`")))
    }

    /// Head of `branch`, `None` if it does not exist.
    pub fn head(&self, branch: &BranchName) -> Result<Option<ObjectId>, StoreError> {
        self.store.read_branch(branch)
    }

    // -- blobs --------------------------------------------------------------

    pub fn put_blob(&self, data: &[u8]) -> Result<ObjectId, StoreError> {
        self.store.put_blob(data)
    }

    pub fn get_blob(&self, id: &ObjectId) -> Result<Vec<u8>, StoreError> {
        self.store.get_blob(id)
    }

    // -- commits ------------------------------------------------------------

    /// See [`commit::commit`].
    pub fn commit(
        &self,
        branch: &BranchName,
        parents: &[ObjectId],
        edits: &[TreeEdit],
        author: &Signature,
        message: &str,
    ) -> Result<ObjectId, StoreError> {
        commit::commit(self.store(), branch, parents, edits, author, message)
    }

    pub fn commit_file(
        &self,
        branch: &BranchName,
        path: &str,
        content: &[u8],
        author: &Signature,
        message: &str,
    ) -> Result<ObjectId, StoreError> {
        commit::commit_file(self.store(), branch, path, content, author, message)
    }

    pub fn delete_file(
        &self,
        branch: &BranchName,
        path: &str,
        author: &Signature,
        message: &str,
    ) -> Result<ObjectId, StoreError> {
        commit::delete_file(self.store(), branch, path, author, message)
    }

    // -- history ------------------------------------------------------------

    pub fn log(&self, branch: &BranchName, limit: usize) -> Result<Log<'_>, StoreError> {
        history::log(self.store(), branch, limit)
    }

    pub fn list_tree(&self, commit: &ObjectId, path: &str) -> Result<Vec<TreeListing>, StoreError> {
        history::list_tree(self.store(), commit, path)
    }

    pub fn content_at(&self, commit: &ObjectId, path: &str) -> Result<Vec<u8>, StoreError> {
        history::content_at(self.store(), commit, path)
    }

    pub fn list_branches(&self) -> Result<Vec<BranchInfo>, StoreError> {
        history::list_branches(self.store())
    }

    pub fn create_branch(
        &self,
        name: &BranchName,
        from: &BranchName,
    ) -> Result<BranchInfo, StoreError> {
        history::create_branch(self.store(), name, from)
    }

    pub fn merge_base(&self, a: &ObjectId, b: &ObjectId) -> Result<ObjectId, StoreError> {
        history::merge_base(self.store(), a, b)
    }

    pub fn is_ancestor(&self, ancestor: &ObjectId, descendant: &ObjectId) -> Result<bool, StoreError> {
        history::is_ancestor(self.store(), ancestor, descendant)
    }

    /// Write the snapshot of `commit` into `dest`; returns the file count.
    pub fn checkout(&self, commit: &ObjectId, dest: &Path) -> Result<usize, StoreError> {
        history::checkout(self.store(), commit, dest)
    }

    // -- diff ---------------------------------------------------------------

    pub fn diff(&self, from: &ObjectId, to: &ObjectId) -> Result<Vec<FileStatusDelta>, StoreError> {
        diff::diff(self.store(), from, to)
    }

    pub fn diff_with(
        &self,
        from: &ObjectId,
        to: &ObjectId,
        options: DiffOptions,
    ) -> Result<Vec<FileStatusDelta>, StoreError> {
        diff::diff_with(self.store(), from, to, options)
    }

    pub fn diff_stats(&self, from: &ObjectId, to: &ObjectId) -> Result<DiffStats, StoreError> {
        diff::diff_stats(self.store(), from, to)
    }

    /// See [`semantic::semantic_diff`].
    #[must_use]
    pub fn semantic_diff(&self, from: &EntityMap, to: &EntityMap) -> SemanticDiff {
        semantic::semantic_diff(from, to)
    }

    pub fn semantic_diff_at(
        &self,
        parser: &dyn DomainParser,
        from: &ObjectId,
        to: &ObjectId,
        path: &str,
    ) -> Result<SemanticDiff, ParseError> {
        semantic::semantic_diff_at(self.store(), parser, from, to, path)
    }

    // -- merge --------------------------------------------------------------

    /// See [`merge::merge`].
    pub fn merge(
        &self,
        source: &BranchName,
        target: &BranchName,
        author: &Signature,
        message: Option<&str>,
        resolver: Option<&dyn ConflictResolver>,
        options: &MergeOptions,
    ) -> Result<MergeOutcome, StoreError> {
        merge::merge(self.store(), source, target, author, message, resolver, options)
    }
}
