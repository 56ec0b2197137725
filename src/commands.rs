//! Subcommand implementations for the `bimgit` binary.

use std::fmt::Write as _;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use serde::Serialize;
use tracing::info;

use bimgit::config::{BimgitConfig, CONFIG_FILE, DEFAULT_CONFIG_TOML};
use bimgit::engine::{
    BranchName, ConflictResolver, DiffOptions, EntryKind, FileStatus, FileStatusDelta,
    MergeOutcome, ObjectId, Repository, init_repo, open_repo,
};

use crate::format::OutputFormat;

/// Everything a command needs besides its own arguments.
pub struct Context {
    pub repo_path: PathBuf,
    pub config: BimgitConfig,
    pub format: OutputFormat,
}

impl Context {
    fn open(&self) -> Result<Repository> {
        open_repo(&self.repo_path)
            .with_context(|| format!("opening repository at {}", self.repo_path.display()))
    }

    fn branch(&self, name: Option<&str>) -> Result<BranchName> {
        let name = name.unwrap_or(&self.config.repo.default_branch);
        BranchName::new(name).with_context(|| format!("bad branch name '{name}'"))
    }
}

#[derive(Serialize)]
struct InitOutput<'a> {
    path: &'a Path,
    config_written: bool,
}

#[derive(Serialize)]
struct BlobOutput {
    id: ObjectId,
    size: usize,
}

#[derive(Serialize)]
struct CommitOutput<'a> {
    branch: &'a BranchName,
    commit: ObjectId,
}

#[derive(Serialize)]
struct CheckoutOutput<'a> {
    commit: ObjectId,
    dir: &'a Path,
    files: usize,
}

pub fn init(ctx: &Context) -> Result<()> {
    init_repo(&ctx.repo_path)
        .with_context(|| format!("initializing repository at {}", ctx.repo_path.display()))?;
    let config_path = ctx.repo_path.join(CONFIG_FILE);
    let config_written = !config_path.exists();
    if config_written {
        std::fs::write(&config_path, DEFAULT_CONFIG_TOML)
            .with_context(|| format!("writing {}", config_path.display()))?;
    }
    let out = InitOutput {
        path: &ctx.repo_path,
        config_written,
    };
    ctx.format.emit(&out, || {
        format!("Initialized repository in {}", ctx.repo_path.display())
    })
}

pub fn put(ctx: &Context, file: &Path) -> Result<()> {
    let repo = ctx.open()?;
    let data = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let id = repo.put_blob(&data)?;
    let out = BlobOutput {
        id,
        size: data.len(),
    };
    ctx.format.emit(&out, || id.to_string())
}

pub fn add(ctx: &Context, branch: &str, path: &str, file: &Path, message: &str) -> Result<()> {
    let repo = ctx.open()?;
    let branch = ctx.branch(Some(branch))?;
    let data = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let author = ctx.config.author.signature();
    let commit = repo.commit_file(&branch, path, &data, &author, message)?;
    let out = CommitOutput {
        branch: &branch,
        commit,
    };
    ctx.format
        .emit(&out, || format!("[{branch} {}] {message}", commit.short()))
}

pub fn rm(ctx: &Context, branch: &str, path: &str, message: &str) -> Result<()> {
    let repo = ctx.open()?;
    let branch = ctx.branch(Some(branch))?;
    let author = ctx.config.author.signature();
    let commit = repo.delete_file(&branch, path, &author, message)?;
    let out = CommitOutput {
        branch: &branch,
        commit,
    };
    ctx.format
        .emit(&out, || format!("[{branch} {}] {message}", commit.short()))
}

pub fn log(ctx: &Context, branch: Option<&str>, max_count: usize) -> Result<()> {
    let repo = ctx.open()?;
    let branch = ctx.branch(branch)?;
    let commits = repo.log(&branch, max_count)?.collect::<Result<Vec<_>, _>>()?;
    ctx.format.emit(&commits, || {
        let mut text = String::new();
        for c in &commits {
            let subject = c.message.lines().next().unwrap_or_default();
            let _ = writeln!(
                text,
                "{} {} {} <{}>  {subject}",
                c.id.short(),
                c.timestamp,
                c.author_name,
                c.author_email
            );
        }
        text.trim_end().to_owned()
    })
}

pub fn ls(ctx: &Context, rev: &str, path: &str) -> Result<()> {
    let repo = ctx.open()?;
    let commit = repo.resolve_rev(rev)?;
    let entries = repo.list_tree(&commit, path)?;
    ctx.format.emit(&entries, || {
        let mut text = String::new();
        for e in &entries {
            let (kind, suffix) = match e.kind {
                EntryKind::Dir => ("dir ", "/"),
                EntryKind::File => ("file", ""),
            };
            let size = e.size.map(|s| s.to_string()).unwrap_or_default();
            let _ = writeln!(text, "{kind} {size:>10} {}{suffix}", e.name);
        }
        text.trim_end().to_owned()
    })
}

pub fn cat(ctx: &Context, rev: &str, path: &str) -> Result<()> {
    let repo = ctx.open()?;
    let commit = repo.resolve_rev(rev)?;
    let bytes = repo.content_at(&commit, path)?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&bytes).context("writing to stdout")?;
    stdout.flush().context("writing to stdout")?;
    Ok(())
}

pub fn branch_list(ctx: &Context) -> Result<()> {
    let repo = ctx.open()?;
    let branches = repo.list_branches()?;
    ctx.format.emit(&branches, || {
        let mut text = String::new();
        for b in &branches {
            let subject = b.message.lines().next().unwrap_or_default();
            let _ = writeln!(text, "{:<24} {}  {subject}", b.name.as_str(), b.head.short());
        }
        text.trim_end().to_owned()
    })
}

pub fn branch_create(ctx: &Context, name: &str, from: Option<&str>) -> Result<()> {
    let repo = ctx.open()?;
    let name = ctx.branch(Some(name))?;
    let from = ctx.branch(from)?;
    let info = repo.create_branch(&name, &from)?;
    ctx.format.emit(&info, || {
        format!("Created branch '{}' at {}", info.name, info.head.short())
    })
}

fn status_letter(status: FileStatus) -> char {
    match status {
        FileStatus::Added => 'A',
        FileStatus::Deleted => 'D',
        FileStatus::Modified => 'M',
        FileStatus::Renamed => 'R',
        FileStatus::Copied => 'C',
    }
}

fn render_delta(delta: &FileStatusDelta) -> String {
    match delta.status {
        FileStatus::Renamed | FileStatus::Copied => format!(
            "{}  {} -> {}",
            status_letter(delta.status),
            delta.old_path,
            delta.new_path
        ),
        _ => format!("{}  {}", status_letter(delta.status), delta.path()),
    }
}

pub fn diff(ctx: &Context, from: &str, to: &str, renames: bool, stat: bool) -> Result<()> {
    let repo = ctx.open()?;
    let from = repo.resolve_rev(from)?;
    let to = repo.resolve_rev(to)?;
    if stat {
        let stats = repo.diff_stats(&from, &to)?;
        return ctx.format.emit(&stats, || {
            format!(
                "{} file(s) changed, {} insertion(s)(+), {} deletion(s)(-)",
                stats.files_changed, stats.insertions, stats.deletions
            )
        });
    }
    let deltas = repo.diff_with(
        &from,
        &to,
        DiffOptions {
            detect_renames: renames,
        },
    )?;
    ctx.format.emit(&deltas, || {
        deltas.iter().map(render_delta).collect::<Vec<_>>().join("\n")
    })
}

pub fn merge(ctx: &Context, source: &str, target: &str, message: Option<&str>) -> Result<()> {
    let repo = ctx.open()?;
    let source = ctx.branch(Some(source))?;
    let target = ctx.branch(Some(target))?;
    let options = ctx.config.merge.options()?;
    let resolver = ctx.config.merge.command_resolver();
    if let Some(r) = &resolver {
        info!(program = r.program(), "merge tool configured");
    }
    let author = ctx.config.author.signature();
    let outcome = repo.merge(
        &source,
        &target,
        &author,
        message,
        resolver.as_ref().map(|r| r as &dyn ConflictResolver),
        &options,
    )?;

    ctx.format.emit(&outcome, || match &outcome {
        MergeOutcome::UpToDate => "Already up to date.".to_owned(),
        MergeOutcome::FastForward { new_head } => {
            format!("Fast-forward {target} to {}", new_head.short())
        }
        MergeOutcome::Merged { commit } => {
            format!("Merged {source} into {target}: {}", commit.short())
        }
        MergeOutcome::Conflict { paths } => {
            let mut text = String::from("Merge stopped on conflicts:");
            for p in paths {
                let _ = write!(text, "\n  {p}");
            }
            text
        }
        MergeOutcome::Error(reason) => format!("Cannot merge: {reason:?}"),
    })?;

    match outcome {
        MergeOutcome::Conflict { paths } => {
            bail!("merge of '{source}' into '{target}' has {} conflict(s)", paths.len())
        }
        MergeOutcome::Error(reason) => bail!("merge of '{source}' into '{target}' failed: {reason:?}"),
        _ => Ok(()),
    }
}

pub fn checkout(ctx: &Context, rev: &str, dir: &Path) -> Result<()> {
    let repo = ctx.open()?;
    let commit = repo.resolve_rev(rev)?;
    let files = repo.checkout(&commit, dir)?;
    let out = CheckoutOutput { commit, dir, files };
    ctx.format.emit(&out, || {
        format!("Checked out {} ({files} files) into {}", commit.short(), dir.display())
    })
}
