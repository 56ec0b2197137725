//! The bimgit version-control engine.
//!
//! Everything here works against the [`ObjectStore`] trait from
//! `bimgit-store`:
//!
//! - [`tree`]: persistent tree edits and path lookup.
//! - [`commit`]: commit creation with compare-and-swap branch updates.
//! - [`history`]: log, listings, file contents, merge base, checkout,
//!   branches.
//! - [`diff`]: file-level diff and line statistics.
//! - [`semantic`]: entity-level diff driven by a [`DomainParser`].
//! - [`merge`]: three-way merge with an optional [`ConflictResolver`].
//!
//! [`Repository`] bundles a store with all of the above.

pub mod commit;
pub mod diff;
pub mod history;
pub mod merge;
pub mod repository;
pub mod semantic;
pub mod tree;

pub use bimgit_store::{
    BranchName, Commit, EntryMode, FsStore, MemStore, ObjectId, ObjectStore, Signature,
    StoreError, TreeEntry,
};
pub use diff::{DiffOptions, DiffStats, FileStatus, FileStatusDelta};
pub use history::{BranchInfo, CommitInfo, EntryKind, Log, TreeListing};
pub use merge::{
    CommandResolver, ConflictResolver, MergeFailure, MergeOptions, MergeOutcome, ToolError,
};
pub use repository::{Repository, init_repo, open_repo};
pub use semantic::{
    DomainEntity, DomainEntityDiff, DomainParser, EntityMap, EntitySummary, FieldChange,
    ParseError, SemanticDiff,
};
pub use tree::TreeEdit;
