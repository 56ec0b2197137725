//! File-level diff between two commits.
//!
//! The walk descends both trees in lock-step and skips any pair of subtrees
//! with equal ids, so cost scales with what changed rather than with the
//! size of the snapshot.

#![allow(clippy::missing_errors_doc)]

use bimgit_store::{ObjectId, ObjectStore, StoreError, TreeEntry};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::history::blob_size;
use crate::tree::join_path;

/// How a file changed between two commits.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Added,
    Deleted,
    Modified,
    Renamed,
    /// Reserved for copy detection; never produced today.
    Copied,
}

/// One changed file.
///
/// For additions, deletions and modifications `old_path` and `new_path` are
/// the same. Only renames give them different values.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileStatusDelta {
    pub old_path: String,
    pub new_path: String,
    pub status: FileStatus,
    /// Size on the old side; 0 for additions.
    pub old_size: u64,
    /// Size on the new side; 0 for deletions.
    pub new_size: u64,
    pub old_id: Option<ObjectId>,
    pub new_id: Option<ObjectId>,
}

impl FileStatusDelta {
    /// The path to show for this change (the new path, except for deletions).
    #[must_use]
    pub fn path(&self) -> &str {
        if self.status == FileStatus::Deleted {
            &self.old_path
        } else {
            &self.new_path
        }
    }
}

/// Diff tuning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DiffOptions {
    /// Pair deletions with additions of identical content into renames.
    pub detect_renames: bool,
}

/// Line-level summary of a diff.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DiffStats {
    pub files_changed: usize,
    pub insertions: usize,
    pub deletions: usize,
}

/// File-level changes from `from` to `to`, sorted by path.
pub fn diff(
    store: &dyn ObjectStore,
    from: &ObjectId,
    to: &ObjectId,
) -> Result<Vec<FileStatusDelta>, StoreError> {
    diff_with(store, from, to, DiffOptions::default())
}

/// [`diff`] with explicit options.
#[instrument(skip_all, fields(from = %from.short(), to = %to.short()))]
pub fn diff_with(
    store: &dyn ObjectStore,
    from: &ObjectId,
    to: &ObjectId,
    options: DiffOptions,
) -> Result<Vec<FileStatusDelta>, StoreError> {
    let old_tree = store.get_commit(from)?.tree;
    let new_tree = store.get_commit(to)?.tree;
    let mut deltas = diff_trees(store, old_tree, new_tree)?;
    if options.detect_renames {
        pair_renames(&mut deltas);
    }
    deltas.sort_by(|a, b| a.path().cmp(b.path()));
    debug!(changes = deltas.len(), "diff");
    Ok(deltas)
}

fn diff_trees(
    store: &dyn ObjectStore,
    old: ObjectId,
    new: ObjectId,
) -> Result<Vec<FileStatusDelta>, StoreError> {
    let mut out = Vec::new();
    let mut stack = vec![(String::new(), Some(old), Some(new))];
    while let Some((prefix, old, new)) = stack.pop() {
        if old == new {
            continue;
        }
        let old_entries = match old {
            Some(id) => store.get_tree(&id)?,
            None => Vec::new(),
        };
        let new_entries = match new {
            Some(id) => store.get_tree(&id)?,
            None => Vec::new(),
        };

        // Both lists are sorted by name; merge-join them.
        let mut o = old_entries.into_iter().peekable();
        let mut n = new_entries.into_iter().peekable();
        loop {
            let (left, right) = match (o.peek(), n.peek()) {
                (None, None) => break,
                (Some(_), None) => (o.next(), None),
                (None, Some(_)) => (None, n.next()),
                (Some(a), Some(b)) => match a.name.cmp(&b.name) {
                    std::cmp::Ordering::Less => (o.next(), None),
                    std::cmp::Ordering::Greater => (None, n.next()),
                    std::cmp::Ordering::Equal => (o.next(), n.next()),
                },
            };
            let name = left
                .as_ref()
                .or(right.as_ref())
                .map(|e| e.name.clone())
                .unwrap_or_default();
            let path = join_path(&prefix, &name);
            compare_entries(store, &path, left, right, &mut stack, &mut out)?;
        }
    }
    Ok(out)
}

type Pending = Vec<(String, Option<ObjectId>, Option<ObjectId>)>;

fn compare_entries(
    store: &dyn ObjectStore,
    path: &str,
    old: Option<TreeEntry>,
    new: Option<TreeEntry>,
    stack: &mut Pending,
    out: &mut Vec<FileStatusDelta>,
) -> Result<(), StoreError> {
    let split = |entry: Option<TreeEntry>| match entry {
        Some(e) if e.mode.is_dir() => (Some(e.id), None),
        Some(e) => (None, Some(e)),
        None => (None, None),
    };
    let (old_dir, old_file) = split(old);
    let (new_dir, new_file) = split(new);

    if old_dir.is_some() || new_dir.is_some() {
        stack.push((path.to_owned(), old_dir, new_dir));
    }
    match (old_file, new_file) {
        (Some(a), Some(b)) => {
            if a.id != b.id || a.mode != b.mode {
                out.push(FileStatusDelta {
                    old_path: path.to_owned(),
                    new_path: path.to_owned(),
                    status: FileStatus::Modified,
                    old_size: blob_size(store, &a.id)?,
                    new_size: blob_size(store, &b.id)?,
                    old_id: Some(a.id),
                    new_id: Some(b.id),
                });
            }
        }
        (Some(a), None) => out.push(FileStatusDelta {
            old_path: path.to_owned(),
            new_path: path.to_owned(),
            status: FileStatus::Deleted,
            old_size: blob_size(store, &a.id)?,
            new_size: 0,
            old_id: Some(a.id),
            new_id: None,
        }),
        (None, Some(b)) => out.push(FileStatusDelta {
            old_path: path.to_owned(),
            new_path: path.to_owned(),
            status: FileStatus::Added,
            old_size: 0,
            new_size: blob_size(store, &b.id)?,
            old_id: None,
            new_id: Some(b.id),
        }),
        (None, None) => {}
    }
    Ok(())
}

/// Turn each deletion whose content reappears as an addition into a rename.
/// Pairing is by exact content; the first addition in path order wins.
fn pair_renames(deltas: &mut Vec<FileStatusDelta>) {
    deltas.sort_by(|a, b| a.path().cmp(b.path()));
    let mut consumed = vec![false; deltas.len()];
    let mut renamed = Vec::new();
    for (d, deleted) in deltas.iter().enumerate() {
        if deleted.status != FileStatus::Deleted {
            continue;
        }
        let partner = deltas
            .iter()
            .enumerate()
            .find(|(a, added)| {
                !consumed[*a]
                    && added.status == FileStatus::Added
                    && added.new_id == deleted.old_id
            })
            .map(|(a, _)| a);
        if let Some(a) = partner {
            consumed[a] = true;
            consumed[d] = true;
            renamed.push(FileStatusDelta {
                old_path: deleted.old_path.clone(),
                new_path: deltas[a].new_path.clone(),
                status: FileStatus::Renamed,
                old_size: deleted.old_size,
                new_size: deltas[a].new_size,
                old_id: deleted.old_id,
                new_id: deltas[a].new_id,
            });
        }
    }
    let mut i = 0;
    deltas.retain(|_| {
        let keep = !consumed[i];
        i += 1;
        keep
    });
    deltas.extend(renamed);
}

/// Count changed files and inserted/deleted lines. Binary files count as
/// changed but contribute no lines.
#[instrument(skip_all, fields(from = %from.short(), to = %to.short()))]
pub fn diff_stats(
    store: &dyn ObjectStore,
    from: &ObjectId,
    to: &ObjectId,
) -> Result<DiffStats, StoreError> {
    let deltas = diff(store, from, to)?;
    let mut stats = DiffStats {
        files_changed: deltas.len(),
        ..DiffStats::default()
    };
    for delta in &deltas {
        let old = read_text(store, delta.old_id.as_ref())?;
        let new = read_text(store, delta.new_id.as_ref())?;
        let (Some(old), Some(new)) = (old, new) else {
            continue;
        };
        let patch = diffy::create_patch(&old, &new);
        for hunk in patch.hunks() {
            for line in hunk.lines() {
                match line {
                    diffy::Line::Insert(_) => stats.insertions += 1,
                    diffy::Line::Delete(_) => stats.deletions += 1,
                    diffy::Line::Context(_) => {}
                }
            }
        }
    }
    Ok(stats)
}

/// Blob as text; `Some("")` for an absent side, `None` for binary content.
fn read_text(store: &dyn ObjectStore, id: Option<&ObjectId>) -> Result<Option<String>, StoreError> {
    let Some(id) = id else {
        return Ok(Some(String::new()));
    };
    let bytes = store.get_blob(id)?;
    if bytes.contains(&0) {
        return Ok(None);
    }
    Ok(String::from_utf8(bytes).ok())
}

#[cfg(test)]
mod tests {
    use bimgit_store::{BranchName, MemStore, Signature};

    use super::*;
    use crate::commit::{commit, commit_file, delete_file};
    use crate::tree::TreeEdit;

    fn main() -> BranchName {
        BranchName::new("main").unwrap()
    }

    fn sig(ts: i64) -> Signature {
        Signature::new("Ada", "ada@example.com", ts)
    }

    #[test]
    fn same_commit_has_empty_diff() {
        let store = MemStore::new();
        let c = commit_file(&store, &main(), "a", b"1", &sig(1), "a").unwrap();
        assert!(diff(&store, &c, &c).unwrap().is_empty());
    }

    #[test]
    fn reports_added_modified_deleted() {
        let store = MemStore::new();
        commit_file(&store, &main(), "keep/x", b"x", &sig(1), "x").unwrap();
        commit_file(&store, &main(), "edit", b"old", &sig(2), "e").unwrap();
        let c1 = commit_file(&store, &main(), "gone", b"bye", &sig(3), "g").unwrap();
        commit_file(&store, &main(), "edit", b"newer", &sig(4), "e2").unwrap();
        commit_file(&store, &main(), "dir/new", b"n", &sig(5), "n").unwrap();
        let c2 = delete_file(&store, &main(), "gone", &sig(6), "rm").unwrap();

        let deltas = diff(&store, &c1, &c2).unwrap();
        let summary: Vec<_> = deltas
            .iter()
            .map(|d| (d.path(), d.status, d.old_size, d.new_size))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("dir/new", FileStatus::Added, 0, 1),
                ("edit", FileStatus::Modified, 3, 5),
                ("gone", FileStatus::Deleted, 3, 0),
            ]
        );
    }

    #[test]
    fn file_replaced_by_directory() {
        let store = MemStore::new();
        let c1 = commit_file(&store, &main(), "thing", b"file", &sig(1), "f").unwrap();
        let blob = store.put_blob(b"nested").unwrap();
        let c2 = commit(
            &store,
            &main(),
            &[c1],
            &[TreeEdit::remove("thing"), TreeEdit::file("thing/inner", blob)],
            &sig(2),
            "swap",
        )
        .unwrap();
        let deltas = diff(&store, &c1, &c2).unwrap();
        let paths: Vec<_> = deltas.iter().map(|d| (d.path(), d.status)).collect();
        assert_eq!(
            paths,
            vec![("thing", FileStatus::Deleted), ("thing/inner", FileStatus::Added)]
        );
    }

    #[test]
    fn renames_only_when_requested() {
        let store = MemStore::new();
        let c1 = commit_file(&store, &main(), "old.ifc", b"same", &sig(1), "a").unwrap();
        let blob = store.put_blob(b"same").unwrap();
        let c2 = commit(
            &store,
            &main(),
            &[c1],
            &[TreeEdit::remove("old.ifc"), TreeEdit::file("new.ifc", blob)],
            &sig(2),
            "mv",
        )
        .unwrap();

        assert_eq!(diff(&store, &c1, &c2).unwrap().len(), 2);
        let renamed = diff_with(&store, &c1, &c2, DiffOptions { detect_renames: true }).unwrap();
        assert_eq!(renamed.len(), 1);
        assert_eq!(renamed[0].status, FileStatus::Renamed);
        assert_eq!(renamed[0].old_path, "old.ifc");
        assert_eq!(renamed[0].new_path, "new.ifc");
    }

    #[test]
    fn stats_count_lines() {
        let store = MemStore::new();
        let c1 = commit_file(&store, &main(), "a.txt", b"one\ntwo\nthree\n", &sig(1), "a").unwrap();
        let c2 =
            commit_file(&store, &main(), "a.txt", b"one\n2\nthree\nfour\n", &sig(2), "b").unwrap();
        let stats = diff_stats(&store, &c1, &c2).unwrap();
        assert_eq!(
            stats,
            DiffStats {
                files_changed: 1,
                insertions: 2,
                deletions: 1
            }
        );
    }

    #[test]
    fn binary_files_have_no_line_counts() {
        let store = MemStore::new();
        let c1 = commit_file(&store, &main(), "a.bin", b"\0\x01", &sig(1), "a").unwrap();
        let c2 = commit_file(&store, &main(), "a.bin", b"\0\x02", &sig(2), "b").unwrap();
        let stats = diff_stats(&store, &c1, &c2).unwrap();
        assert_eq!(stats.files_changed, 1);
        assert_eq!(stats.insertions + stats.deletions, 0);
    }
}
