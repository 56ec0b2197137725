//! End-to-end tests for the `bimgit` binary.
//!
//! Each test creates an isolated temp repository.

mod common;

use common::{bimgit_fails, bimgit_in, bimgit_json, bimgit_ok, setup_repo};

#[test]
fn init_writes_default_config_and_is_idempotent() {
    let repo = setup_repo();
    let config = std::fs::read_to_string(repo.path().join("config.toml")).unwrap();
    assert!(config.contains("default_branch = \"main\""));

    std::fs::write(
        repo.path().join("config.toml"),
        "[author]\nname = \"Site Office\"\n",
    )
    .unwrap();
    let out = bimgit_json(&repo.path(), &["init"]);
    assert_eq!(out["config_written"], false);
    let config = std::fs::read_to_string(repo.path().join("config.toml")).unwrap();
    assert!(config.contains("Site Office"), "init must not overwrite config");
}

#[test]
fn add_then_cat_and_log() {
    let repo = setup_repo();
    repo.add("main", "models/site.ifc", "ISO-10303-21;\n", "initial model");
    repo.add("main", "models/site.ifc", "ISO-10303-21;\nWALL;\n", "add wall");

    let content = bimgit_ok(&repo.path(), &["cat", "main", "models/site.ifc"]);
    assert_eq!(content, "ISO-10303-21;\nWALL;\n");

    let log = bimgit_json(&repo.path(), &["log"]);
    let commits = log.as_array().unwrap();
    assert_eq!(commits.len(), 2);
    assert_eq!(commits[0]["message"], "add wall");
    assert_eq!(commits[1]["message"], "initial model");
    assert_eq!(commits[0]["parents"][0], commits[1]["id"]);

    let limited = bimgit_json(&repo.path(), &["log", "main", "-n", "1"]);
    assert_eq!(limited.as_array().unwrap().len(), 1);

    let text = bimgit_ok(&repo.path(), &["log", "main"]);
    assert!(text.lines().next().unwrap().ends_with("add wall"));
}

#[test]
fn log_of_missing_branch_is_empty() {
    let repo = setup_repo();
    let log = bimgit_json(&repo.path(), &["log", "ghost"]);
    assert_eq!(log, serde_json::json!([]));
    assert_eq!(bimgit_ok(&repo.path(), &["log", "ghost"]), "");
}

#[test]
fn cat_by_commit_id_reads_old_snapshot() {
    let repo = setup_repo();
    repo.add("main", "a.txt", "one\n", "first");
    let first = bimgit_json(&repo.path(), &["log"])[0]["id"]
        .as_str()
        .unwrap()
        .to_owned();
    repo.add("main", "a.txt", "two\n", "second");

    assert_eq!(bimgit_ok(&repo.path(), &["cat", &first, "a.txt"]), "one\n");
    assert_eq!(bimgit_ok(&repo.path(), &["cat", "main", "a.txt"]), "two\n");
}

#[test]
fn ls_lists_dirs_and_files() {
    let repo = setup_repo();
    repo.add("main", "models/site.ifc", "abc", "one");
    repo.add("main", "README", "hello", "two");

    let root = bimgit_json(&repo.path(), &["ls", "main"]);
    let names: Vec<&str> = root
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["README", "models"]);
    assert_eq!(root[1]["kind"], "dir");
    assert!(root[1]["size"].is_null());

    let text = bimgit_ok(&repo.path(), &["ls", "main", "models"]);
    assert!(text.contains("site.ifc"));
    assert!(text.contains('3'));
}

#[test]
fn rm_removes_and_missing_path_fails() {
    let repo = setup_repo();
    repo.add("main", "a.txt", "a", "add a");
    repo.add("main", "b.txt", "b", "add b");
    bimgit_ok(&repo.path(), &["rm", "main", "a.txt", "-m", "drop a"]);

    let stderr = bimgit_fails(&repo.path(), &["cat", "main", "a.txt"]);
    assert!(stderr.contains("not found"), "{stderr}");
    bimgit_fails(&repo.path(), &["rm", "main", "a.txt", "-m", "again"]);
}

#[test]
fn put_prints_content_address() {
    let repo = setup_repo();
    let file = repo.input("blob.bin", "same bytes");
    let first = bimgit_ok(&repo.path(), &["put", &file.display().to_string()]);
    let second = bimgit_ok(&repo.path(), &["put", &file.display().to_string()]);
    assert_eq!(first, second);
    assert_eq!(first.trim().len(), 64);
}

#[test]
fn branch_create_and_list() {
    let repo = setup_repo();
    repo.add("main", "a.txt", "a", "base");
    bimgit_ok(&repo.path(), &["branch", "create", "facade"]);

    let branches = bimgit_json(&repo.path(), &["branch", "list"]);
    let list = branches.as_array().unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0]["name"], "facade");
    assert_eq!(list[1]["name"], "main");
    assert_eq!(list[0]["head"], list[1]["head"]);

    let stderr = bimgit_fails(&repo.path(), &["branch", "create", "facade"]);
    assert!(stderr.contains("facade"), "{stderr}");
}

#[test]
fn diff_reports_status_and_stats() {
    let repo = setup_repo();
    repo.add("main", "keep.txt", "k\n", "base");
    repo.add("main", "edit.txt", "a\nb\n", "base 2");
    bimgit_ok(&repo.path(), &["branch", "create", "work"]);
    repo.add("work", "edit.txt", "a\nc\nd\n", "edit");
    repo.add("work", "new.txt", "n\n", "new");

    let text = bimgit_ok(&repo.path(), &["diff", "main", "work"]);
    assert_eq!(text, "M  edit.txt\nA  new.txt\n");

    let stats = bimgit_json(&repo.path(), &["diff", "main", "work", "--stat"]);
    assert_eq!(stats["files_changed"], 2);
    assert_eq!(stats["insertions"], 3);
    assert_eq!(stats["deletions"], 1);
}

#[test]
fn diff_detects_renames_on_request() {
    let repo = setup_repo();
    repo.add("main", "old.ifc", "model", "base");
    bimgit_ok(&repo.path(), &["branch", "create", "work"]);
    bimgit_ok(&repo.path(), &["rm", "work", "old.ifc", "-m", "rm"]);
    repo.add("work", "new.ifc", "model", "re-add");

    let plain = bimgit_ok(&repo.path(), &["diff", "main", "work"]);
    assert_eq!(plain, "A  new.ifc\nD  old.ifc\n");
    let renamed = bimgit_ok(&repo.path(), &["diff", "main", "work", "--renames"]);
    assert_eq!(renamed, "R  old.ifc -> new.ifc\n");
}

#[test]
fn merge_fast_forward_then_up_to_date() {
    let repo = setup_repo();
    repo.add("main", "a.txt", "a", "base");
    bimgit_ok(&repo.path(), &["branch", "create", "feature"]);
    repo.add("feature", "b.txt", "b", "feature work");

    let out = bimgit_json(&repo.path(), &["merge", "feature", "main"]);
    assert_eq!(out["outcome"], "fast_forward");
    assert_eq!(bimgit_ok(&repo.path(), &["cat", "main", "b.txt"]), "b");

    let again = bimgit_json(&repo.path(), &["merge", "feature", "main"]);
    assert_eq!(again["outcome"], "up_to_date");
}

#[test]
fn merge_clean_three_way_creates_merge_commit() {
    let repo = setup_repo();
    repo.add("main", "a.txt", "a", "base");
    bimgit_ok(&repo.path(), &["branch", "create", "feature"]);
    repo.add("feature", "f.txt", "f", "feature");
    repo.add("main", "m.txt", "m", "main");

    let out = bimgit_json(&repo.path(), &["merge", "feature", "main"]);
    assert_eq!(out["outcome"], "merged");

    let log = bimgit_json(&repo.path(), &["log", "main", "-n", "1"]);
    assert_eq!(log[0]["message"], "Merge branch 'feature' into main");
    assert_eq!(log[0]["parents"].as_array().unwrap().len(), 2);
    assert_eq!(bimgit_ok(&repo.path(), &["cat", "main", "f.txt"]), "f");
    assert_eq!(bimgit_ok(&repo.path(), &["cat", "main", "m.txt"]), "m");
}

#[test]
fn merge_conflict_exits_nonzero_and_leaves_branches() {
    let repo = setup_repo();
    repo.add("main", "model.ifc", "v1", "base");
    bimgit_ok(&repo.path(), &["branch", "create", "feature"]);
    repo.add("feature", "model.ifc", "theirs", "feature edit");
    repo.add("main", "model.ifc", "ours", "main edit");
    let before = bimgit_json(&repo.path(), &["branch", "list"]);

    let out = bimgit_in(&repo.path(), &["--json", "merge", "feature", "main"]);
    assert!(!out.status.success());
    let report: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(report["outcome"], "conflict");
    assert_eq!(report["paths"][0], "model.ifc");

    assert_eq!(bimgit_json(&repo.path(), &["branch", "list"]), before);
}

#[cfg(unix)]
#[test]
fn merge_tool_resolves_domain_conflict() {
    let repo = setup_repo();
    std::fs::write(
        repo.path().join("config.toml"),
        "[merge.resolver]\ncommand = \"sh\"\nargs = [\"-c\", \"cat \\\"$2\\\" \\\"$3\\\" > \\\"$5\\\"\", \"tool\"]\n",
    )
    .unwrap();
    repo.add("main", "model.ifc", "v1\n", "base");
    bimgit_ok(&repo.path(), &["branch", "create", "feature"]);
    repo.add("feature", "model.ifc", "theirs\n", "feature edit");
    repo.add("main", "model.ifc", "ours\n", "main edit");

    let out = bimgit_json(&repo.path(), &["merge", "feature", "main"]);
    assert_eq!(out["outcome"], "merged");
    assert_eq!(
        bimgit_ok(&repo.path(), &["cat", "main", "model.ifc"]),
        "ours\ntheirs\n"
    );
}

#[test]
fn merge_unknown_branch_fails() {
    let repo = setup_repo();
    repo.add("main", "a.txt", "a", "base");
    let stderr = bimgit_fails(&repo.path(), &["merge", "ghost", "main"]);
    assert!(stderr.contains("BranchNotFound"), "{stderr}");
}

#[test]
fn checkout_writes_snapshot() {
    let repo = setup_repo();
    repo.add("main", "models/site.ifc", "abc", "one");
    repo.add("main", "README", "hello", "two");

    let dest = repo.dir.path().join("out");
    let out = bimgit_json(
        &repo.path(),
        &["checkout", "main", &dest.display().to_string()],
    );
    assert_eq!(out["files"], 2);
    assert_eq!(
        std::fs::read_to_string(dest.join("models/site.ifc")).unwrap(),
        "abc"
    );
    assert_eq!(std::fs::read_to_string(dest.join("README")).unwrap(), "hello");
}

#[test]
fn bad_config_is_reported() {
    let repo = setup_repo();
    std::fs::write(repo.path().join("config.toml"), "[repo]\ncolour = 1\n").unwrap();
    let stderr = bimgit_fails(&repo.path(), &["log"]);
    assert!(stderr.contains("config.toml"), "{stderr}");
}

#[test]
fn commands_outside_a_repository_fail() {
    let dir = tempfile::tempdir().unwrap();
    let stderr = bimgit_fails(&dir.path().join("nowhere"), &["log"]);
    assert!(stderr.contains("opening repository"), "{stderr}");
}
