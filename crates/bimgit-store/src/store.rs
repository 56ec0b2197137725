//! The [`ObjectStore`] trait: the single boundary between the engine and
//! the storage medium.
//!
//! Backends implement four raw primitives (framed object read/write, branch
//! read, branch compare-and-swap, branch listing). Typed accessors for blobs,
//! trees and commits are provided methods so every backend hashes and
//! encodes objects identically.
//!
//! | Group        | Methods                                             |
//! |--------------|-----------------------------------------------------|
//! | Raw objects  | `write_object`, `read_object`, `has_object`         |
//! | Blobs        | `put_blob`, `get_blob`                              |
//! | Trees        | `put_tree`, `get_tree`                              |
//! | Commits      | `put_commit`, `get_commit`                          |
//! | Branches     | `read_branch`, `update_branch`, `list_branches`     |

use crate::codec;
use crate::error::StoreError;
use crate::types::{BranchName, Commit, ObjectId, ObjectKind, TreeEntry};

/// Content-addressed storage for blobs, trees and commits, plus branch refs.
///
/// # Object safety
///
/// The trait is object-safe; the engine holds it as `Box<dyn ObjectStore>`
/// or borrows it as `&dyn ObjectStore`.
///
/// # Concurrency
///
/// Object writes are idempotent and may race freely. Branch updates are
/// compare-and-swap: [`update_branch`](Self::update_branch) never blocks and
/// never retries; it reports [`StoreError::BranchConflict`] instead.
pub trait ObjectStore: Send + Sync {
    // -----------------------------------------------------------------------
    // Raw objects
    // -----------------------------------------------------------------------

    /// Store an object body of the given kind and return its id.
    ///
    /// Must be idempotent: writing an object that already exists stores
    /// nothing new.
    fn write_object(&self, kind: ObjectKind, body: &[u8]) -> Result<ObjectId, StoreError>;

    /// Read an object's kind and body.
    ///
    /// Returns [`StoreError::NotFound`] if the id is unknown.
    fn read_object(&self, id: &ObjectId) -> Result<(ObjectKind, Vec<u8>), StoreError>;

    /// Return `true` if an object with this id exists.
    fn has_object(&self, id: &ObjectId) -> Result<bool, StoreError>;

    // -----------------------------------------------------------------------
    // Branches
    // -----------------------------------------------------------------------

    /// Read a branch head, `None` if the branch does not exist.
    fn read_branch(&self, name: &BranchName) -> Result<Option<ObjectId>, StoreError>;

    /// Point `name` at `new` if and only if its current head equals
    /// `expected` (`None` = the branch must not exist yet).
    ///
    /// `new` must be an existing commit. On mismatch returns
    /// [`StoreError::BranchConflict`] and leaves the branch untouched.
    fn update_branch(
        &self,
        name: &BranchName,
        new: ObjectId,
        expected: Option<ObjectId>,
    ) -> Result<(), StoreError>;

    /// All branches and their heads, sorted by name.
    fn list_branches(&self) -> Result<Vec<(BranchName, ObjectId)>, StoreError>;

    // -----------------------------------------------------------------------
    // Typed accessors (provided)
    // -----------------------------------------------------------------------

    /// Store a blob. Identical bytes always yield the identical id.
    fn put_blob(&self, data: &[u8]) -> Result<ObjectId, StoreError> {
        self.write_object(ObjectKind::Blob, data)
    }

    /// Read a blob's bytes.
    fn get_blob(&self, id: &ObjectId) -> Result<Vec<u8>, StoreError> {
        read_kind(self, id, ObjectKind::Blob)
    }

    /// Store a tree. Entries are validated and sorted by name first.
    fn put_tree(&self, entries: &[TreeEntry]) -> Result<ObjectId, StoreError> {
        let canonical = codec::canonical_entries(entries)?;
        self.write_object(ObjectKind::Tree, &codec::encode_tree(&canonical))
    }

    /// Read a tree's entries, sorted by name.
    fn get_tree(&self, id: &ObjectId) -> Result<Vec<TreeEntry>, StoreError> {
        let body = read_kind(self, id, ObjectKind::Tree)?;
        codec::decode_tree(id, &body)
    }

    /// Store a commit object. Does not move any branch.
    fn put_commit(&self, commit: &Commit) -> Result<ObjectId, StoreError> {
        self.write_object(ObjectKind::Commit, &codec::encode_commit(commit))
    }

    /// Read a commit object.
    fn get_commit(&self, id: &ObjectId) -> Result<Commit, StoreError> {
        let body = read_kind(self, id, ObjectKind::Commit)?;
        codec::decode_commit(id, &body)
    }
}

fn read_kind<S: ObjectStore + ?Sized>(
    store: &S,
    id: &ObjectId,
    want: ObjectKind,
) -> Result<Vec<u8>, StoreError> {
    let (kind, body) = store.read_object(id)?;
    if kind == want {
        Ok(body)
    } else {
        Err(StoreError::not_found(format!("{want} {id} (object is a {kind})")))
    }
}

/// Check that `id` names a commit; used by backends before moving a branch.
pub(crate) fn ensure_commit<S: ObjectStore + ?Sized>(
    store: &S,
    id: &ObjectId,
) -> Result<(), StoreError> {
    read_kind(store, id, ObjectKind::Commit).map(|_| ())
}
