//! Reading history: commit log, tree listings, file contents, ancestry and
//! branches.

#![allow(clippy::missing_errors_doc)]

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fs;
use std::path::Path;

use bimgit_store::{BranchName, Commit, EntryMode, ObjectId, ObjectStore, StoreError};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::tree;

// ---------------------------------------------------------------------------
// Log
// ---------------------------------------------------------------------------

/// One commit as reported by [`log`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CommitInfo {
    pub id: ObjectId,
    pub tree: ObjectId,
    /// Message with surrounding whitespace trimmed.
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    pub parents: Vec<ObjectId>,
}

impl CommitInfo {
    fn new(id: ObjectId, commit: Commit) -> Self {
        Self {
            id,
            tree: commit.tree,
            message: commit.message.trim().to_owned(),
            author_name: commit.author.name,
            author_email: commit.author.email,
            timestamp: commit.author.timestamp,
            parents: commit.parents,
        }
    }
}

#[derive(Clone)]
struct Queued {
    timestamp: i64,
    seq: u64,
    id: ObjectId,
    commit: Commit,
}

// Newest first; among equal timestamps, the commit discovered first.
impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

/// Lazy walk over the commits reachable from a branch head, newest first.
///
/// Each commit is yielded once, even when reachable through several merge
/// parents. The walk reads commits on demand, so taking a prefix of a long
/// history costs only that prefix. [`restart`](Self::restart) rewinds to the
/// head captured at creation; cloning gives an independent cursor.
#[derive(Clone)]
pub struct Log<'a> {
    store: &'a dyn ObjectStore,
    start: Option<ObjectId>,
    limit: usize,
    pending_start: Option<ObjectId>,
    queue: BinaryHeap<Queued>,
    seen: HashSet<ObjectId>,
    seq: u64,
    emitted: usize,
}

impl<'a> Log<'a> {
    /// Walk from `start` (`None` yields nothing), stopping after `limit`
    /// commits.
    #[must_use]
    pub fn new(store: &'a dyn ObjectStore, start: Option<ObjectId>, limit: usize) -> Self {
        Self {
            store,
            start,
            limit,
            pending_start: start,
            queue: BinaryHeap::new(),
            seen: HashSet::new(),
            seq: 0,
            emitted: 0,
        }
    }

    /// Rewind to the first commit.
    pub fn restart(&mut self) {
        self.pending_start = self.start;
        self.queue.clear();
        self.seen.clear();
        self.seq = 0;
        self.emitted = 0;
    }

    fn enqueue(&mut self, id: ObjectId) -> Result<(), StoreError> {
        if !self.seen.insert(id) {
            return Ok(());
        }
        let commit = self.store.get_commit(&id)?;
        self.queue.push(Queued {
            timestamp: commit.author.timestamp,
            seq: self.seq,
            id,
            commit,
        });
        self.seq += 1;
        Ok(())
    }
}

impl Iterator for Log<'_> {
    type Item = Result<CommitInfo, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.emitted >= self.limit {
            return None;
        }
        if let Some(start) = self.pending_start.take() {
            if let Err(e) = self.enqueue(start) {
                return Some(Err(e));
            }
        }
        let item = self.queue.pop()?;
        for parent in &item.commit.parents {
            if let Err(e) = self.enqueue(*parent) {
                return Some(Err(e));
            }
        }
        self.emitted += 1;
        Some(Ok(CommitInfo::new(item.id, item.commit)))
    }
}

/// Log of `branch`, at most `limit` commits. A missing branch yields an
/// empty log.
pub fn log<'a>(
    store: &'a dyn ObjectStore,
    branch: &BranchName,
    limit: usize,
) -> Result<Log<'a>, StoreError> {
    let head = store.read_branch(branch)?;
    Ok(Log::new(store, head, limit))
}

// ---------------------------------------------------------------------------
// Trees and contents
// ---------------------------------------------------------------------------

/// Kind of a listed tree entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    File,
    Dir,
}

/// One entry of a directory listing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TreeListing {
    pub name: String,
    pub kind: EntryKind,
    pub mode: EntryMode,
    /// Blob size in bytes; `None` for directories.
    pub size: Option<u64>,
    pub id: ObjectId,
}

/// List the directory at `path` in `commit` (`""` = root), sorted by name.
pub fn list_tree(
    store: &dyn ObjectStore,
    commit: &ObjectId,
    path: &str,
) -> Result<Vec<TreeListing>, StoreError> {
    let dir = resolve_dir(store, commit, path)?;
    store
        .get_tree(&dir)?
        .into_iter()
        .map(|entry| {
            let (kind, size) = if entry.mode.is_dir() {
                (EntryKind::Dir, None)
            } else {
                (EntryKind::File, Some(blob_size(store, &entry.id)?))
            };
            Ok(TreeListing {
                name: entry.name,
                kind,
                mode: entry.mode,
                size,
                id: entry.id,
            })
        })
        .collect()
}

/// The bytes of the file at `path` in `commit`.
pub fn content_at(
    store: &dyn ObjectStore,
    commit: &ObjectId,
    path: &str,
) -> Result<Vec<u8>, StoreError> {
    let root = store.get_commit(commit)?.tree;
    match tree::lookup(store, &root, path)? {
        Some(entry) if entry.mode.is_file() => store.get_blob(&entry.id),
        Some(_) => Err(StoreError::not_found(format!(
            "file `{path}` in {} (it is a directory)",
            commit.short()
        ))),
        None => Err(StoreError::not_found(format!(
            "file `{path}` in {}",
            commit.short()
        ))),
    }
}

pub(crate) fn blob_size(store: &dyn ObjectStore, id: &ObjectId) -> Result<u64, StoreError> {
    let (_, body) = store.read_object(id)?;
    Ok(body.len() as u64)
}

fn resolve_dir(
    store: &dyn ObjectStore,
    commit: &ObjectId,
    path: &str,
) -> Result<ObjectId, StoreError> {
    let root = store.get_commit(commit)?.tree;
    if tree::split_path(path)?.is_empty() {
        return Ok(root);
    }
    match tree::lookup(store, &root, path)? {
        Some(entry) if entry.mode.is_dir() => Ok(entry.id),
        _ => Err(StoreError::not_found(format!(
            "directory `{path}` in {}",
            commit.short()
        ))),
    }
}

/// Materialize the snapshot of `commit` into `dest`.
///
/// `dest` is created if needed. Existing files at the same paths are
/// overwritten; nothing else in `dest` is touched. Empty directories are
/// created as well.
#[instrument(skip_all, fields(commit = %commit.short(), dest = %dest.display()))]
pub fn checkout(store: &dyn ObjectStore, commit: &ObjectId, dest: &Path) -> Result<usize, StoreError> {
    let root = store.get_commit(commit)?.tree;
    fs::create_dir_all(dest)?;
    let mut files = 0;
    let mut stack = vec![(dest.to_path_buf(), root)];
    while let Some((dir, tree_id)) = stack.pop() {
        for entry in store.get_tree(&tree_id)? {
            let target = dir.join(&entry.name);
            if entry.mode.is_dir() {
                fs::create_dir_all(&target)?;
                stack.push((target, entry.id));
                continue;
            }
            fs::write(&target, store.get_blob(&entry.id)?)?;
            #[cfg(unix)]
            if entry.mode == EntryMode::Executable {
                use std::os::unix::fs::PermissionsExt;
                fs::set_permissions(&target, fs::Permissions::from_mode(0o755))?;
            }
            files += 1;
        }
    }
    info!(files, "checked out");
    Ok(files)
}

// ---------------------------------------------------------------------------
// Ancestry
// ---------------------------------------------------------------------------

struct Node {
    timestamp: i64,
    parents: Vec<ObjectId>,
}

fn ancestry(store: &dyn ObjectStore, from: ObjectId) -> Result<HashMap<ObjectId, Node>, StoreError> {
    let mut nodes = HashMap::new();
    let mut stack = vec![from];
    while let Some(id) = stack.pop() {
        if nodes.contains_key(&id) {
            continue;
        }
        let commit = store.get_commit(&id)?;
        stack.extend(commit.parents.iter().copied());
        nodes.insert(
            id,
            Node {
                timestamp: commit.author.timestamp,
                parents: commit.parents,
            },
        );
    }
    Ok(nodes)
}

/// Best common ancestor of `a` and `b`.
///
/// Among common ancestors that are not themselves ancestors of another
/// common ancestor, picks the newest by timestamp, then the smallest id.
#[instrument(skip_all, fields(a = %a.short(), b = %b.short()))]
pub fn merge_base(
    store: &dyn ObjectStore,
    a: &ObjectId,
    b: &ObjectId,
) -> Result<ObjectId, StoreError> {
    if a == b {
        store.get_commit(a)?;
        return Ok(*a);
    }
    let from_a = ancestry(store, *a)?;
    let from_b = ancestry(store, *b)?;
    let common: Vec<ObjectId> = from_a
        .keys()
        .filter(|id| from_b.contains_key(id))
        .copied()
        .collect();
    if common.is_empty() {
        return Err(StoreError::NoCommonAncestor { a: *a, b: *b });
    }

    // Everything strictly below a common ancestor is dominated. A walk stops
    // at nodes already marked, so each node is visited once overall.
    let mut dominated = HashSet::new();
    for id in &common {
        let mut stack: Vec<ObjectId> = from_a[id].parents.clone();
        while let Some(p) = stack.pop() {
            if dominated.insert(p) {
                stack.extend(from_a[&p].parents.iter().copied());
            }
        }
    }

    let best = common
        .iter()
        .filter(|id| !dominated.contains(*id))
        .max_by(|x, y| {
            from_a[*x]
                .timestamp
                .cmp(&from_a[*y].timestamp)
                .then_with(|| y.cmp(x))
        })
        .copied()
        .ok_or(StoreError::NoCommonAncestor { a: *a, b: *b })?;
    debug!(base = %best.short(), candidates = common.len(), "merge base");
    Ok(best)
}

/// `true` if `ancestor` is reachable from `descendant` (a commit is its own
/// ancestor).
pub fn is_ancestor(
    store: &dyn ObjectStore,
    ancestor: &ObjectId,
    descendant: &ObjectId,
) -> Result<bool, StoreError> {
    let mut seen = HashSet::new();
    let mut stack = vec![*descendant];
    while let Some(id) = stack.pop() {
        if id == *ancestor {
            return Ok(true);
        }
        if seen.insert(id) {
            stack.extend(store.get_commit(&id)?.parents);
        }
    }
    Ok(false)
}

// ---------------------------------------------------------------------------
// Branches
// ---------------------------------------------------------------------------

/// A branch with a summary of its head commit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BranchInfo {
    pub name: BranchName,
    pub head: ObjectId,
    pub message: String,
    pub timestamp: i64,
}

/// All branches, sorted by name.
pub fn list_branches(store: &dyn ObjectStore) -> Result<Vec<BranchInfo>, StoreError> {
    store
        .list_branches()?
        .into_iter()
        .map(|(name, head)| {
            let commit = store.get_commit(&head)?;
            Ok(BranchInfo {
                name,
                head,
                message: commit.message,
                timestamp: commit.author.timestamp,
            })
        })
        .collect()
}

/// Create `name` pointing at the head of `from`.
#[instrument(skip_all, fields(name = %name, from = %from))]
pub fn create_branch(
    store: &dyn ObjectStore,
    name: &BranchName,
    from: &BranchName,
) -> Result<BranchInfo, StoreError> {
    let head = store
        .read_branch(from)?
        .ok_or_else(|| StoreError::not_found(format!("branch `{from}`")))?;
    store.update_branch(name, head, None)?;
    let commit = store.get_commit(&head)?;
    info!(head = %head.short(), "branch created");
    Ok(BranchInfo {
        name: name.clone(),
        head,
        message: commit.message,
        timestamp: commit.author.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use bimgit_store::{MemStore, ObjectKind, Signature, TreeEntry, codec};

    use super::*;
    use crate::commit::{commit, commit_file, write_commit};

    fn branch(name: &str) -> BranchName {
        BranchName::new(name).unwrap()
    }

    fn sig(ts: i64) -> Signature {
        Signature::new("Ada", "ada@example.com", ts)
    }

    fn ids(log: Log<'_>) -> Vec<ObjectId> {
        log.map(|r| r.unwrap().id).collect()
    }

    #[test]
    fn log_is_newest_first_and_limited() {
        let store = MemStore::new();
        let main = branch("main");
        let c1 = commit_file(&store, &main, "a", b"1", &sig(10), "one").unwrap();
        let c2 = commit_file(&store, &main, "a", b"2", &sig(20), "two").unwrap();
        let c3 = commit_file(&store, &main, "a", b"3", &sig(30), "three").unwrap();

        assert_eq!(ids(log(&store, &main, 10).unwrap()), vec![c3, c2, c1]);
        assert_eq!(ids(log(&store, &main, 2).unwrap()), vec![c3, c2]);
        assert!(ids(log(&store, &main, 0).unwrap()).is_empty());
    }

    #[test]
    fn log_of_missing_branch_is_empty() {
        let store = MemStore::new();
        assert!(ids(log(&store, &branch("ghost"), 5).unwrap()).is_empty());
    }

    #[test]
    fn log_restart_and_clone() {
        let store = MemStore::new();
        let main = branch("main");
        let c1 = commit_file(&store, &main, "a", b"1", &sig(1), "one").unwrap();
        let c2 = commit_file(&store, &main, "a", b"2", &sig(2), "two").unwrap();

        let mut walk = log(&store, &main, 10).unwrap();
        assert_eq!(walk.next().unwrap().unwrap().id, c2);
        let fork = walk.clone();
        assert_eq!(walk.next().unwrap().unwrap().id, c1);
        assert!(walk.next().is_none());
        assert_eq!(ids(fork), vec![c1]);

        walk.restart();
        assert_eq!(ids(walk), vec![c2, c1]);
    }

    #[test]
    fn log_visits_merge_ancestors_once() {
        let store = MemStore::new();
        let main = branch("main");
        let side = branch("side");
        let base = commit_file(&store, &main, "a", b"0", &sig(1), "base").unwrap();
        create_branch(&store, &side, &main).unwrap();
        let m1 = commit_file(&store, &main, "a", b"m", &sig(2), "main").unwrap();
        let s1 = commit_file(&store, &side, "b", b"s", &sig(3), "side").unwrap();
        let merged = commit(&store, &main, &[m1, s1], &[], &sig(4), "merge").unwrap();

        assert_eq!(ids(log(&store, &main, 10).unwrap()), vec![merged, s1, m1, base]);
    }

    #[test]
    fn listing_and_contents() {
        let store = MemStore::new();
        let main = branch("main");
        commit_file(&store, &main, "models/a.ifc", b"abc", &sig(1), "a").unwrap();
        let c = commit_file(&store, &main, "readme", b"hi", &sig(2), "r").unwrap();

        let root = list_tree(&store, &c, "").unwrap();
        let names: Vec<_> = root.iter().map(|e| (e.name.as_str(), e.kind, e.size)).collect();
        assert_eq!(
            names,
            vec![("models", EntryKind::Dir, None), ("readme", EntryKind::File, Some(2))]
        );
        assert_eq!(list_tree(&store, &c, "models").unwrap()[0].size, Some(3));
        assert!(list_tree(&store, &c, "readme").unwrap_err().is_not_found());

        assert_eq!(content_at(&store, &c, "models/a.ifc").unwrap(), b"abc");
        assert!(content_at(&store, &c, "models").unwrap_err().is_not_found());
        assert!(content_at(&store, &c, "nope").unwrap_err().is_not_found());
    }

    #[test]
    fn merge_base_of_diverged_branches() {
        let store = MemStore::new();
        let main = branch("main");
        let side = branch("side");
        let c1 = commit_file(&store, &main, "a", b"0", &sig(1), "base").unwrap();
        create_branch(&store, &side, &main).unwrap();
        let c2 = commit_file(&store, &side, "a", b"s", &sig(2), "side").unwrap();
        let c3 = commit_file(&store, &main, "a", b"m", &sig(3), "main").unwrap();

        assert_eq!(merge_base(&store, &c2, &c3).unwrap(), c1);
        assert_eq!(merge_base(&store, &c1, &c3).unwrap(), c1);
        assert_eq!(merge_base(&store, &c3, &c3).unwrap(), c3);
        assert!(is_ancestor(&store, &c1, &c2).unwrap());
        assert!(!is_ancestor(&store, &c2, &c3).unwrap());
    }

    #[test]
    fn unrelated_roots_have_no_common_ancestor() {
        let store = MemStore::new();
        let a = commit_file(&store, &branch("a"), "x", b"1", &sig(1), "a").unwrap();
        let b = commit_file(&store, &branch("b"), "x", b"1", &sig(1), "b").unwrap();
        assert!(matches!(
            merge_base(&store, &a, &b),
            Err(StoreError::NoCommonAncestor { .. })
        ));
    }

    #[test]
    fn equal_timestamps_follow_discovery_order() {
        let store = MemStore::new();
        let main = branch("main");
        let c1 = commit_file(&store, &main, "a", b"1", &sig(5), "one").unwrap();
        let c2 = commit_file(&store, &main, "a", b"2", &sig(5), "two").unwrap();
        let c3 = commit_file(&store, &main, "a", b"3", &sig(5), "three").unwrap();
        assert_eq!(ids(log(&store, &main, 10).unwrap()), vec![c3, c2, c1]);
    }

    #[test]
    fn tied_merge_parents_follow_parent_order() {
        let store = MemStore::new();
        let main = branch("main");
        let side = branch("side");
        let base = commit_file(&store, &main, "a", b"0", &sig(5), "base").unwrap();
        create_branch(&store, &side, &main).unwrap();
        let m1 = commit_file(&store, &main, "a", b"m", &sig(5), "main").unwrap();
        let s1 = commit_file(&store, &side, "b", b"s", &sig(5), "side").unwrap();

        let on_main = commit(&store, &main, &[m1, s1], &[], &sig(5), "merge").unwrap();
        assert_eq!(ids(log(&store, &main, 10).unwrap()), vec![on_main, m1, s1, base]);

        let on_side = commit(&store, &side, &[s1, m1], &[], &sig(5), "merge").unwrap();
        assert_eq!(ids(log(&store, &side, 10).unwrap()), vec![on_side, s1, m1, base]);
    }

    #[test]
    fn checkout_refuses_tree_with_escaping_name() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemStore::new();
        let blob = store.put_blob(b"outside").unwrap();
        let inner = store.put_tree(&[TreeEntry::file("evil.txt", blob)]).unwrap();
        let crafted = codec::encode_tree(&[TreeEntry::dir("..", inner)]);
        let root = store.write_object(ObjectKind::Tree, &crafted).unwrap();
        let c = write_commit(&store, root, &[], &sig(1), "crafted").unwrap();

        let dest = dir.path().join("out");
        let err = checkout(&store, &c, &dest).unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }), "{err}");
        assert!(!dir.path().join("evil.txt").exists());
        assert!(list_tree(&store, &c, "").is_err());
    }

    #[test]
    fn create_branch_cases() {
        let store = MemStore::new();
        let main = branch("main");
        let c = commit_file(&store, &main, "a", b"1", &sig(7), "first").unwrap();

        let info = create_branch(&store, &branch("feature/x"), &main).unwrap();
        assert_eq!(info.head, c);
        assert_eq!(info.message, "first");
        assert!(
            create_branch(&store, &branch("feature/x"), &main)
                .unwrap_err()
                .is_branch_conflict()
        );
        assert!(
            create_branch(&store, &branch("y"), &branch("ghost"))
                .unwrap_err()
                .is_not_found()
        );

        let names: Vec<String> = list_branches(&store)
            .unwrap()
            .into_iter()
            .map(|b| b.name.to_string())
            .collect();
        assert_eq!(names, ["feature/x", "main"]);
    }
}
