use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use bimgit::config::BimgitConfig;
use bimgit::telemetry;

mod commands;
mod format;

use commands::Context;
use format::OutputFormat;

/// Version control for building-model files
///
/// bimgit stores snapshots of large domain files (IFC models and the like)
/// as content-addressed blobs, trees and commits. Branches move only by
/// compare-and-swap, so concurrent writers never lose each other's work.
///
/// QUICK START:
///
///   bimgit -C site.repo init
///   bimgit -C site.repo add main models/site.ifc ./site.ifc -m "initial model"
///   bimgit -C site.repo branch create facade --from main
///   bimgit -C site.repo merge facade main
///
/// A <REV> is a branch name or a 64-character commit id.
#[derive(Parser)]
#[command(name = "bimgit")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'bimgit <command> --help' for more information on a specific command.")]
struct Cli {
    /// Repository directory
    #[arg(short = 'C', long = "repo", env = "BIMGIT_REPO", default_value = ".", global = true)]
    repo: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a repository (safe to run again)
    Init,

    /// Store a file as a blob and print its id
    Put {
        file: PathBuf,
    },

    /// Commit a local file at PATH on BRANCH
    ///
    /// Creates the branch if it does not exist yet.
    Add {
        branch: String,
        path: String,
        file: PathBuf,
        #[arg(short, long)]
        message: String,
    },

    /// Commit the removal of PATH on BRANCH
    Rm {
        branch: String,
        path: String,
        #[arg(short, long)]
        message: String,
    },

    /// Show commit history, newest first
    Log {
        /// Defaults to the configured default branch
        branch: Option<String>,
        /// Maximum number of commits
        #[arg(short = 'n', long = "max-count", default_value_t = 20)]
        max_count: usize,
    },

    /// List a directory at a revision
    Ls {
        rev: String,
        #[arg(default_value = "")]
        path: String,
    },

    /// Write a file at a revision to stdout
    Cat {
        rev: String,
        path: String,
    },

    /// List or create branches
    #[command(subcommand)]
    Branch(BranchCommands),

    /// Show changed files between two revisions
    Diff {
        from: String,
        to: String,
        /// Pair deleted and added files with identical content
        #[arg(long)]
        renames: bool,
        /// Show line counts instead of the file list
        #[arg(long)]
        stat: bool,
    },

    /// Merge SOURCE into TARGET
    ///
    /// Exits non-zero when the merge stops on conflicts; no branch moves in
    /// that case.
    Merge {
        source: String,
        target: String,
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Write the snapshot of a revision into a directory
    Checkout {
        rev: String,
        dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum BranchCommands {
    /// List branches with their head commits
    List,
    /// Create a branch at the head of another
    Create {
        name: String,
        /// Source branch (defaults to the configured default branch)
        #[arg(long)]
        from: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = BimgitConfig::load_repo(&cli.repo);
    let level = config
        .as_ref()
        .map_or_else(|_| "info".to_owned(), |c| c.log.level.clone());
    let _telemetry = telemetry::init(&level);

    let ctx = Context {
        repo_path: cli.repo,
        config: config?,
        format: OutputFormat::from_json_flag(cli.json),
    };

    match cli.command {
        Commands::Init => commands::init(&ctx),
        Commands::Put { file } => commands::put(&ctx, &file),
        Commands::Add {
            branch,
            path,
            file,
            message,
        } => commands::add(&ctx, &branch, &path, &file, &message),
        Commands::Rm {
            branch,
            path,
            message,
        } => commands::rm(&ctx, &branch, &path, &message),
        Commands::Log { branch, max_count } => commands::log(&ctx, branch.as_deref(), max_count),
        Commands::Ls { rev, path } => commands::ls(&ctx, &rev, &path),
        Commands::Cat { rev, path } => commands::cat(&ctx, &rev, &path),
        Commands::Branch(BranchCommands::List) => commands::branch_list(&ctx),
        Commands::Branch(BranchCommands::Create { name, from }) => {
            commands::branch_create(&ctx, &name, from.as_deref())
        }
        Commands::Diff {
            from,
            to,
            renames,
            stat,
        } => commands::diff(&ctx, &from, &to, renames, stat),
        Commands::Merge {
            source,
            target,
            message,
        } => commands::merge(&ctx, &source, &target, message.as_deref()),
        Commands::Checkout { rev, dir } => commands::checkout(&ctx, &rev, &dir),
    }
}
