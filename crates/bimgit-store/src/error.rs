//! Error types for store and engine operations.
//!
//! [`StoreError`] is the single error type returned by every
//! [`ObjectStore`](crate::ObjectStore) method and by the engine built on
//! top of it. Variants are rich enough that callers can branch on the
//! failure cause (missing object, CAS mismatch, path clash) without parsing
//! messages.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::ObjectId;

/// Errors returned by object store and engine operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A requested repository, branch, commit, object, or path was not found.
    #[error("not found: {message}")]
    NotFound {
        /// Human-readable description of what was missing.
        message: String,
    },

    /// A path segment that must be a directory is a file, or the reverse.
    #[error("path conflict at `{path}`: {message}")]
    PathConflict {
        /// The path at which the clash was detected.
        path: String,
        /// Details about the clash.
        message: String,
    },

    /// A path or tree entry name is malformed.
    #[error("invalid path `{path}`: {reason}")]
    InvalidPath {
        /// The rejected path or segment.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A branch update failed because the branch head did not match the
    /// expected value (compare-and-swap / optimistic concurrency failure).
    ///
    /// The caller should re-read the branch and retry the whole
    /// read-modify-write sequence.
    #[error(
        "branch conflict on `{branch}`: expected {}, found {}",
        describe_head(.expected.as_ref()),
        describe_head(.actual.as_ref())
    )]
    BranchConflict {
        /// The branch that could not be updated.
        branch: String,
        /// The head the caller expected (`None` = branch must not exist).
        expected: Option<ObjectId>,
        /// The head actually observed (`None` = branch absent or locked).
        actual: Option<ObjectId>,
    },

    /// Two commits share no ancestor.
    #[error("no common ancestor between {a} and {b}")]
    NoCommonAncestor {
        /// First commit.
        a: ObjectId,
        /// Second commit.
        b: ObjectId,
    },

    /// An object id string could not be parsed.
    #[error("invalid object id `{value}`: {reason}")]
    InvalidObjectId {
        /// The raw value that failed validation.
        value: String,
        /// Why validation failed.
        reason: String,
    },

    /// A branch name failed validation.
    #[error("invalid branch name `{value}`: {reason}")]
    InvalidBranchName {
        /// The rejected name.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A tree could not be written (duplicate names, bad entries).
    #[error("invalid tree: {message}")]
    InvalidTree {
        /// What was wrong with the entry list.
        message: String,
    },

    /// A stored object failed to decode or did not match its id.
    #[error("corrupt object {id}: {message}")]
    Corrupt {
        /// The object id being read.
        id: String,
        /// What failed.
        message: String,
    },

    /// The directory is not a bimgit repository.
    #[error("not a bimgit repository: {}", path.display())]
    NotARepository {
        /// The directory that was opened.
        path: PathBuf,
    },

    /// An I/O error from the storage medium.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Shorthand for a [`StoreError::NotFound`] with a formatted message.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Return `true` for [`StoreError::NotFound`].
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Return `true` for [`StoreError::BranchConflict`].
    #[must_use]
    pub const fn is_branch_conflict(&self) -> bool {
        matches!(self, Self::BranchConflict { .. })
    }
}

fn describe_head(head: Option<&ObjectId>) -> String {
    head.map_or_else(|| "<absent>".to_owned(), ObjectId::to_string)
}
