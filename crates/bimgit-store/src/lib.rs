//! Content-addressed object storage for bimgit.
//!
//! This crate defines the [`ObjectStore`] trait, the single interface
//! through which the engine reads and writes blobs, trees, commits and
//! branch refs, together with two backends and the shared error type.
//!
//! # Crate layout
//!
//! - [`store`]: the [`ObjectStore`] trait.
//! - [`types`]: value types used in trait signatures ([`ObjectId`],
//!   [`BranchName`], [`TreeEntry`], [`Commit`], etc.).
//! - [`codec`]: canonical object encoding and SHA-256 hashing.
//! - [`error`]: the [`StoreError`] enum returned by every operation.

pub mod codec;
pub mod error;
pub mod store;
pub mod types;

mod fs_store;
mod mem_store;

pub use fs_store::{FORMAT_MARKER, FsStore};
pub use mem_store::MemStore;

// Re-export the trait and commonly used types at the crate root:
// `use bimgit_store::{ObjectStore, ObjectId, StoreError};`
pub use error::StoreError;
pub use store::ObjectStore;
pub use types::{
    BRANCH_REF_PREFIX, BranchName, Commit, EntryMode, OBJECT_ID_LEN, ObjectId, ObjectKind,
    Signature, TreeEntry, validate_entry_name,
};
