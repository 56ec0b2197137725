//! Branch merging.
//!
//! `merge(source, target)` moves through a fixed sequence:
//!
//! 1. Resolve both heads; a missing branch is [`MergeFailure::BranchNotFound`].
//! 2. Find the merge base; none is [`MergeFailure::NoCommonAncestor`].
//! 3. Base is the source head: [`MergeOutcome::UpToDate`].
//! 4. Base is the target head: [`MergeOutcome::FastForward`], a ref move with
//!    no new objects.
//! 5. Otherwise a three-way merge over the flattened trees.
//! 6. Domain files changed on both sides go to the [`ConflictResolver`].
//! 7. Anything still conflicted: [`MergeOutcome::Conflict`], refs untouched.
//! 8. Write the merged tree and a two-parent commit, then CAS the target.
//!
//! Expected outcomes (conflicts, missing branches, unrelated histories) are
//! values; `Err` is reserved for storage failures and lost CAS races.

mod resolve;

use std::collections::BTreeSet;
use std::time::Duration;

use bimgit_store::{BranchName, ObjectId, ObjectStore, Signature, StoreError};
use glob::{MatchOptions, Pattern, PatternError};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::commit::write_commit;
use crate::history;
use crate::tree::{self, FlatTree, TreeEdit};

pub use resolve::{CommandResolver, ConflictResolver, ToolError};

/// Default domain-file pattern.
pub const DEFAULT_DOMAIN_PATTERN: &str = "*.ifc";

/// Default time allowed for one resolver run.
pub const DEFAULT_RESOLVER_TIMEOUT: Duration = Duration::from_secs(300);

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why a merge could not be attempted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum MergeFailure {
    BranchNotFound { branch: String },
    NoCommonAncestor,
}

/// Result of [`merge`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MergeOutcome {
    /// The target already contains the source.
    UpToDate,
    /// The target was moved forward to the source head.
    FastForward { new_head: ObjectId },
    /// A merge commit was created on the target.
    Merged { commit: ObjectId },
    /// Paths that could not be merged, sorted. Nothing was changed.
    Conflict { paths: Vec<String> },
    /// The merge could not be attempted.
    Error(MergeFailure),
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Merge tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeOptions {
    /// Paths offered to the resolver. Matched case-insensitively against
    /// the full path and against the file name.
    pub domain_files: Vec<Pattern>,
    /// Limit for a single resolver run.
    pub resolver_timeout: Duration,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            domain_files: Pattern::new(DEFAULT_DOMAIN_PATTERN).into_iter().collect(),
            resolver_timeout: DEFAULT_RESOLVER_TIMEOUT,
        }
    }
}

impl MergeOptions {
    /// Options with the given domain patterns.
    ///
    /// # Errors
    /// Returns the first pattern that fails to parse.
    pub fn with_domain_files<S: AsRef<str>>(patterns: &[S]) -> Result<Self, PatternError> {
        Ok(Self {
            domain_files: patterns
                .iter()
                .map(|p| Pattern::new(p.as_ref()))
                .collect::<Result<_, _>>()?,
            ..Self::default()
        })
    }

    /// `true` if `path` matches any domain pattern.
    #[must_use]
    pub fn is_domain_file(&self, path: &str) -> bool {
        let options = MatchOptions {
            case_sensitive: false,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        let name = path.rsplit('/').next().unwrap_or(path);
        self.domain_files
            .iter()
            .any(|p| p.matches_with(path, options) || p.matches_with(name, options))
    }
}

// ---------------------------------------------------------------------------
// Three-way merge
// ---------------------------------------------------------------------------

struct ThreeWay {
    merged: FlatTree,
    conflicts: BTreeSet<String>,
}

fn three_way(base: &FlatTree, ours: &FlatTree, theirs: &FlatTree) -> ThreeWay {
    let paths: BTreeSet<&String> = base.keys().chain(ours.keys()).chain(theirs.keys()).collect();
    let mut merged = FlatTree::new();
    let mut conflicts = BTreeSet::new();
    for path in paths {
        let b = base.get(path);
        let o = ours.get(path);
        let t = theirs.get(path);
        let pick = if o == t || t == b {
            o
        } else if o == b {
            t
        } else {
            conflicts.insert(path.clone());
            continue;
        };
        if let Some(entry) = pick {
            merged.insert(path.clone(), *entry);
        }
    }

    // Cleanly merged paths can still clash: a file on one side where the
    // other side now has a directory.
    let clashes: Vec<(String, String)> = merged
        .keys()
        .flat_map(|path| {
            path.match_indices('/')
                .map(|(i, _)| &path[..i])
                .filter(|prefix| merged.contains_key(*prefix))
                .map(|prefix| (prefix.to_owned(), path.clone()))
                .collect::<Vec<_>>()
        })
        .collect();
    for (file, nested) in clashes {
        merged.remove(&file);
        merged.remove(&nested);
        conflicts.insert(file);
        conflicts.insert(nested);
    }
    ThreeWay { merged, conflicts }
}

fn resolve_conflicts(
    store: &dyn ObjectStore,
    resolver: &dyn ConflictResolver,
    options: &MergeOptions,
    sides: [&FlatTree; 3],
    result: &mut ThreeWay,
) -> Result<(), StoreError> {
    let [base, ours, theirs] = sides;
    let candidates: Vec<String> = result
        .conflicts
        .iter()
        .filter(|path| options.is_domain_file(path))
        .cloned()
        .collect();
    for path in candidates {
        let (Some(&(mode, ours_id)), Some(&(_, theirs_id))) = (ours.get(&path), theirs.get(&path))
        else {
            continue;
        };
        let base_bytes = match base.get(&path) {
            Some((_, id)) => store.get_blob(id)?,
            None => Vec::new(),
        };
        let ours_bytes = store.get_blob(&ours_id)?;
        let theirs_bytes = store.get_blob(&theirs_id)?;
        match resolver.resolve(
            &path,
            &base_bytes,
            &ours_bytes,
            &theirs_bytes,
            options.resolver_timeout,
        ) {
            Ok(bytes) => {
                let blob = store.put_blob(&bytes)?;
                info!(path = %path, "conflict resolved by merge tool");
                result.conflicts.remove(&path);
                result.merged.insert(path, (mode, blob));
            }
            Err(e) => warn!(path = %path, error = %e, "merge tool could not resolve conflict"),
        }
    }
    Ok(())
}

/// Rewrite `ours_tree` so its files equal `merged`.
fn build_merged_tree(
    store: &dyn ObjectStore,
    ours_tree: ObjectId,
    ours: &FlatTree,
    merged: &FlatTree,
) -> Result<ObjectId, StoreError> {
    let removals: Vec<TreeEdit> = ours
        .keys()
        .filter(|path| !merged.contains_key(*path))
        .map(TreeEdit::remove)
        .collect();
    let mut root = tree::apply_edits(store, Some(ours_tree), &removals)?;

    for (path, &(mode, id)) in merged {
        if ours.get(path) == Some(&(mode, id)) {
            continue;
        }
        // A directory emptied by the removals above may sit where a file
        // now goes.
        if let Some(existing) = tree::lookup(store, &root, path)? {
            if existing.mode.is_dir() {
                root = tree::apply_edit(store, Some(root), &TreeEdit::remove(path.clone()))?;
            }
        }
        root = tree::apply_edit(
            store,
            Some(root),
            &TreeEdit::Upsert {
                path: path.clone(),
                mode,
                id,
            },
        )?;
    }
    Ok(root)
}

// ---------------------------------------------------------------------------
// merge
// ---------------------------------------------------------------------------

/// Merge `source` into `target`.
///
/// `message` defaults to `Merge branch '<source>' into <target>`.
#[instrument(skip_all, fields(source = %source, target = %target))]
pub fn merge(
    store: &dyn ObjectStore,
    source: &BranchName,
    target: &BranchName,
    author: &Signature,
    message: Option<&str>,
    resolver: Option<&dyn ConflictResolver>,
    options: &MergeOptions,
) -> Result<MergeOutcome, StoreError> {
    let Some(source_head) = store.read_branch(source)? else {
        return Ok(MergeOutcome::Error(MergeFailure::BranchNotFound {
            branch: source.to_string(),
        }));
    };
    let Some(target_head) = store.read_branch(target)? else {
        return Ok(MergeOutcome::Error(MergeFailure::BranchNotFound {
            branch: target.to_string(),
        }));
    };

    let base = match history::merge_base(store, &source_head, &target_head) {
        Ok(base) => base,
        Err(StoreError::NoCommonAncestor { .. }) => {
            return Ok(MergeOutcome::Error(MergeFailure::NoCommonAncestor));
        }
        Err(e) => return Err(e),
    };
    if base == source_head {
        info!("already up to date");
        return Ok(MergeOutcome::UpToDate);
    }
    if base == target_head {
        store.update_branch(target, source_head, Some(target_head))?;
        info!(head = %source_head.short(), "fast-forward");
        return Ok(MergeOutcome::FastForward {
            new_head: source_head,
        });
    }

    let ours_tree = store.get_commit(&target_head)?.tree;
    let base_files = tree::flatten(store, &store.get_commit(&base)?.tree)?;
    let ours_files = tree::flatten(store, &ours_tree)?;
    let theirs_files = tree::flatten(store, &store.get_commit(&source_head)?.tree)?;

    let mut result = three_way(&base_files, &ours_files, &theirs_files);
    if let Some(resolver) = resolver {
        resolve_conflicts(
            store,
            resolver,
            options,
            [&base_files, &ours_files, &theirs_files],
            &mut result,
        )?;
    }
    if !result.conflicts.is_empty() {
        let paths: Vec<String> = result.conflicts.into_iter().collect();
        info!(conflicts = paths.len(), "merge has conflicts");
        return Ok(MergeOutcome::Conflict { paths });
    }

    let tree = build_merged_tree(store, ours_tree, &ours_files, &result.merged)?;
    let message = message.map_or_else(
        || format!("Merge branch '{source}' into {target}"),
        ToOwned::to_owned,
    );
    let commit = write_commit(store, tree, &[target_head, source_head], author, &message)?;
    store.update_branch(target, commit, Some(target_head))?;
    info!(commit = %commit.short(), "merged");
    Ok(MergeOutcome::Merged { commit })
}
