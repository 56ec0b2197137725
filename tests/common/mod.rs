//! Shared test helpers for bimgit CLI tests.
//!
//! Every test works in its own temp directory. The repository lives in
//! `<dir>/repo` and scratch input files in `<dir>/input`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

/// A temp dir with an initialized repository inside it.
pub struct TestRepo {
    pub dir: TempDir,
}

impl TestRepo {
    pub fn path(&self) -> PathBuf {
        self.dir.path().join("repo")
    }

    /// Write a scratch file under `<dir>/input` and return its path.
    pub fn input(&self, name: &str, content: &str) -> PathBuf {
        let path = self.dir.path().join("input").join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        path
    }

    /// Commit `content` at `path` on `branch` through the CLI.
    pub fn add(&self, branch: &str, path: &str, content: &str, message: &str) -> String {
        let file = self.input("staged", content);
        bimgit_ok(
            &self.path(),
            &["add", branch, path, &file.display().to_string(), "-m", message],
        )
    }
}

/// Create a temp dir and run `bimgit init` in it.
pub fn setup_repo() -> TestRepo {
    let repo = TestRepo {
        dir: TempDir::new().expect("failed to create temp dir"),
    };
    bimgit_ok(&repo.path(), &["init"]);
    repo
}

/// Run bimgit against the repository at `repo`.
pub fn bimgit_in(repo: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_bimgit"))
        .arg("-C")
        .arg(repo)
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("BIMGIT_REPO")
        .output()
        .expect("failed to execute bimgit")
}

/// Run bimgit and assert it succeeds. Returns stdout as string.
pub fn bimgit_ok(repo: &Path, args: &[&str]) -> String {
    let out = bimgit_in(repo, args);
    let stderr = String::from_utf8_lossy(&out.stderr);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(
        out.status.success(),
        "bimgit {} failed:\nstdout: {stdout}\nstderr: {stderr}",
        args.join(" "),
    );
    stdout.to_string()
}

/// Run bimgit and assert it fails. Returns stderr as string.
pub fn bimgit_fails(repo: &Path, args: &[&str]) -> String {
    let out = bimgit_in(repo, args);
    assert!(
        !out.status.success(),
        "Expected bimgit {} to fail, but it succeeded.\nstdout: {}",
        args.join(" "),
        String::from_utf8_lossy(&out.stdout),
    );
    String::from_utf8_lossy(&out.stderr).to_string()
}

/// Run bimgit with `--json` and parse stdout.
pub fn bimgit_json(repo: &Path, args: &[&str]) -> serde_json::Value {
    let mut full = vec!["--json"];
    full.extend_from_slice(args);
    let stdout = bimgit_ok(repo, &full);
    serde_json::from_str(&stdout)
        .unwrap_or_else(|e| panic!("bad JSON from bimgit {}: {e}\n{stdout}", args.join(" ")))
}
