//! An in-memory [`ObjectStore`] for tests and embedders that keep
//! repositories in process.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, PoisonError, RwLock};

use crate::codec;
use crate::error::StoreError;
use crate::store::{self, ObjectStore};
use crate::types::{BranchName, ObjectId, ObjectKind};

/// Objects and branches held in memory. Same semantics as
/// [`FsStore`](crate::FsStore), minus persistence.
#[derive(Debug, Default)]
pub struct MemStore {
    objects: RwLock<HashMap<ObjectId, (ObjectKind, Vec<u8>)>>,
    branches: Mutex<BTreeMap<BranchName, ObjectId>>,
}

impl MemStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct objects stored.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl ObjectStore for MemStore {
    fn write_object(&self, kind: ObjectKind, body: &[u8]) -> Result<ObjectId, StoreError> {
        let id = codec::hash_object(kind, body);
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_insert_with(|| (kind, body.to_vec()));
        Ok(id)
    }

    fn read_object(&self, id: &ObjectId) -> Result<(ObjectKind, Vec<u8>), StoreError> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("object {id}")))
    }

    fn has_object(&self, id: &ObjectId) -> Result<bool, StoreError> {
        Ok(self
            .objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id))
    }

    fn read_branch(&self, name: &BranchName) -> Result<Option<ObjectId>, StoreError> {
        Ok(self
            .branches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .copied())
    }

    fn update_branch(
        &self,
        name: &BranchName,
        new: ObjectId,
        expected: Option<ObjectId>,
    ) -> Result<(), StoreError> {
        store::ensure_commit(self, &new)?;
        let mut branches = self.branches.lock().unwrap_or_else(PoisonError::into_inner);
        let actual = branches.get(name).copied();
        if actual != expected {
            return Err(StoreError::BranchConflict {
                branch: name.to_string(),
                expected,
                actual,
            });
        }
        branches.insert(name.clone(), new);
        Ok(())
    }

    fn list_branches(&self) -> Result<Vec<(BranchName, ObjectId)>, StoreError> {
        Ok(self
            .branches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, id)| (name.clone(), *id))
            .collect())
    }
}
