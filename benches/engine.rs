//! Engine benchmarks on the in-memory store.
//!
//! # Running
//!
//! ```bash
//! cargo bench --bench engine
//! # With a custom filter:
//! cargo bench --bench engine -- merge
//! ```

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};

use bimgit::engine::{BranchName, MergeOptions, ObjectId, Repository, Signature};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn branch(name: &str) -> BranchName {
    BranchName::new(name).expect("branch name")
}

fn sig() -> Signature {
    Signature::new("bench", "bench@localhost", 1_700_000_000)
}

/// A repository whose `main` holds `n` files spread over 10 directories.
fn populated(n: usize) -> (Repository, ObjectId) {
    let repo = Repository::in_memory();
    let main = branch("main");
    let mut head = None;
    for i in 0..n {
        let path = format!("dir{}/file{i}.txt", i % 10);
        let content = format!("line {i}\n");
        head = Some(
            repo.commit_file(&main, &path, content.as_bytes(), &sig(), "seed")
                .expect("commit"),
        );
    }
    (repo, head.expect("at least one file"))
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_commit_file(c: &mut Criterion) {
    let mut group = c.benchmark_group("commit_file");
    for &n in &[10_usize, 100, 1000] {
        let (repo, _) = populated(n);
        let main = branch("main");
        let mut i = 0_u64;
        group.bench_with_input(BenchmarkId::new("existing_files", n), &n, |b, _| {
            b.iter(|| {
                i += 1;
                repo.commit_file(&main, "dir0/hot.txt", &i.to_le_bytes(), &sig(), "bump")
                    .expect("commit")
            });
        });
    }
    group.finish();
}

fn bench_log(c: &mut Criterion) {
    let mut group = c.benchmark_group("log");
    for &n in &[100_usize, 1000] {
        let (repo, _) = populated(n);
        let main = branch("main");
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::new("commits", n), &n, |b, _| {
            b.iter(|| repo.log(&main, usize::MAX).expect("log").count());
        });
    }
    group.finish();
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");
    for &n in &[100_usize, 1000] {
        let (repo, first) = populated(n);
        let main = branch("main");
        let last = repo
            .commit_file(&main, "dir3/changed.txt", b"changed\n", &sig(), "change")
            .expect("commit");
        group.bench_with_input(BenchmarkId::new("one_change", n), &n, |b, _| {
            b.iter(|| repo.diff(&first, &last).expect("diff"));
        });
    }
    group.finish();
}

fn bench_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge");
    let options = MergeOptions::default();
    for &n in &[100_usize, 1000] {
        let (repo, _) = populated(n);
        let main = branch("main");
        let feature = branch("feature");
        repo.create_branch(&feature, &main).expect("branch");
        repo.commit_file(&feature, "dir1/feature.txt", b"f\n", &sig(), "feature")
            .expect("commit");
        repo.commit_file(&main, "dir2/main.txt", b"m\n", &sig(), "main")
            .expect("commit");
        let main_head = repo.head(&main).expect("head").expect("main exists");

        group.bench_with_input(BenchmarkId::new("three_way", n), &n, |b, _| {
            b.iter(|| {
                let current = repo.head(&main).expect("head");
                repo.store()
                    .update_branch(&main, main_head, current)
                    .expect("reset main");
                repo.merge(&feature, &main, &sig(), None, None, &options)
                    .expect("merge")
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_commit_file, bench_log, bench_diff, bench_merge);
criterion_main!(benches);
