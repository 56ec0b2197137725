//! The on-disk [`ObjectStore`] implementation.
//!
//! # Layout
//!
//! ```text
//! <root>/
//! ├── FORMAT                 "bimgit-v1"
//! ├── objects/
//! │   └── ab/cdef…           framed objects ("<kind> <len>\0" + body)
//! └── refs/heads/
//!     └── <branch>           head commit id, hex + "\n"
//! ```
//!
//! Objects are written to a temp file in the target directory, fsynced, then
//! renamed into place, so a reader never sees a partial object. Branch
//! updates take a `<ref>.lock` file created with `create_new`; the lock is
//! renamed over the ref on success.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::codec;
use crate::error::StoreError;
use crate::store::{self, ObjectStore};
use crate::types::{BRANCH_REF_PREFIX, BranchName, ObjectId, ObjectKind};

/// Contents of the `FORMAT` marker file.
pub const FORMAT_MARKER: &str = "bimgit-v1";

/// A repository stored as loose files under a root directory.
#[derive(Debug)]
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Create (or re-initialize) a repository at `path`.
    ///
    /// Existing objects and branches are kept; re-running `init` is a no-op.
    ///
    /// # Errors
    /// Returns [`StoreError::Io`] if the directories cannot be created.
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn init(path: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(path.join("objects"))?;
        fs::create_dir_all(path.join(BRANCH_REF_PREFIX))?;
        let marker = path.join("FORMAT");
        if !marker.exists() {
            fs::write(&marker, format!("{FORMAT_MARKER}\n"))?;
        }
        info!("initialized repository");
        Ok(Self {
            root: path.to_path_buf(),
        })
    }

    /// Open an existing repository at exactly `path`.
    ///
    /// # Errors
    /// Returns [`StoreError::NotARepository`] if the `FORMAT` marker is
    /// missing or unrecognized.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let marker = fs::read_to_string(path.join("FORMAT")).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StoreError::NotARepository {
                    path: path.to_path_buf(),
                }
            } else {
                StoreError::Io(e)
            }
        })?;
        if marker.trim() != FORMAT_MARKER {
            return Err(StoreError::NotARepository {
                path: path.to_path_buf(),
            });
        }
        Ok(Self {
            root: path.to_path_buf(),
        })
    }

    /// The repository root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, id: &ObjectId) -> PathBuf {
        let hex = id.to_string();
        self.root.join("objects").join(&hex[..2]).join(&hex[2..])
    }

    fn ref_path(&self, name: &BranchName) -> PathBuf {
        self.root.join(BRANCH_REF_PREFIX).join(name.as_str())
    }

    fn read_ref_file(path: &Path, name: &BranchName) -> Result<Option<ObjectId>, StoreError> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let id = contents.trim().parse().map_err(|_| StoreError::Corrupt {
                    id: name.ref_name(),
                    message: format!("ref holds {:?}", contents.trim()),
                })?;
                Ok(Some(id))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    fn collect_branches(
        dir: &Path,
        prefix: &str,
        out: &mut Vec<(BranchName, ObjectId)>,
    ) -> Result<(), StoreError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(StoreError::Io(e)),
        };
        for entry in entries {
            let entry = entry?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let full = format!("{prefix}{file_name}");
            if entry.file_type()?.is_dir() {
                Self::collect_branches(&entry.path(), &format!("{full}/"), out)?;
                continue;
            }
            let Ok(name) = BranchName::new(&full) else {
                // lock files and stray temp files
                continue;
            };
            if let Some(id) = Self::read_ref_file(&entry.path(), &name)? {
                out.push((name, id));
            }
        }
        Ok(())
    }
}

impl ObjectStore for FsStore {
    fn write_object(&self, kind: ObjectKind, body: &[u8]) -> Result<ObjectId, StoreError> {
        let id = codec::hash_object(kind, body);
        let path = self.object_path(&id);
        if path.exists() {
            return Ok(id);
        }
        let dir = path.parent().ok_or_else(|| StoreError::not_found("object directory"))?;
        fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(&codec::header(kind, body.len()))?;
        tmp.write_all(body)?;
        tmp.as_file().sync_all()?;
        match tmp.persist_noclobber(&path) {
            Ok(_) => {}
            // Another writer stored the same object first.
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => return Err(StoreError::Io(e.error)),
        }
        debug!(%id, %kind, len = body.len(), "wrote object");
        Ok(id)
    }

    fn read_object(&self, id: &ObjectId) -> Result<(ObjectKind, Vec<u8>), StoreError> {
        let framed = fs::read(self.object_path(id)).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StoreError::not_found(format!("object {id}"))
            } else {
                StoreError::Io(e)
            }
        })?;
        let (kind, body) = codec::split_framed(id, &framed)?;
        if codec::hash_object(kind, body) != *id {
            return Err(StoreError::Corrupt {
                id: id.to_string(),
                message: "content does not match id".to_owned(),
            });
        }
        Ok((kind, body.to_vec()))
    }

    fn has_object(&self, id: &ObjectId) -> Result<bool, StoreError> {
        Ok(self.object_path(id).is_file())
    }

    fn read_branch(&self, name: &BranchName) -> Result<Option<ObjectId>, StoreError> {
        Self::read_ref_file(&self.ref_path(name), name)
    }

    #[instrument(skip_all, fields(branch = %name, new = %new.short()))]
    fn update_branch(
        &self,
        name: &BranchName,
        new: ObjectId,
        expected: Option<ObjectId>,
    ) -> Result<(), StoreError> {
        store::ensure_commit(self, &new)?;

        let path = self.ref_path(name);
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let lock_path = lock_path_for(&path);
        let lock = match OpenOptions::new().write(true).create_new(true).open(&lock_path) {
            Ok(file) => LockFile {
                file,
                path: lock_path,
                committed: false,
            },
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                // Someone else is mid-update; report the head we can see.
                return Err(StoreError::BranchConflict {
                    branch: name.to_string(),
                    expected,
                    actual: Self::read_ref_file(&path, name)?,
                });
            }
            Err(e) => return Err(StoreError::Io(e)),
        };

        let actual = Self::read_ref_file(&path, name)?;
        if actual != expected {
            return Err(StoreError::BranchConflict {
                branch: name.to_string(),
                expected,
                actual,
            });
        }
        lock.commit(&path, &new)?;
        info!(old = ?actual, "branch updated");
        Ok(())
    }

    fn list_branches(&self) -> Result<Vec<(BranchName, ObjectId)>, StoreError> {
        let mut out = Vec::new();
        Self::collect_branches(&self.root.join(BRANCH_REF_PREFIX), "", &mut out)?;
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".lock");
    path.with_file_name(name)
}

/// A held `<ref>.lock`; removed on drop unless renamed over the ref.
struct LockFile {
    file: File,
    path: PathBuf,
    committed: bool,
}

impl LockFile {
    fn commit(mut self, target: &Path, id: &ObjectId) -> Result<(), StoreError> {
        writeln!(self.file, "{id}")?;
        self.file.sync_all()?;
        fs::rename(&self.path, target)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.path);
        }
    }
}
