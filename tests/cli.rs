mod common;

use std::process::Command;

use anyhow::Result;
use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use rstest::*;

use common::*;

macro_rules! cargo_run {
    ($cmd:expr, $($args:expr),*) => {
        {
            let mut cmd = Command::cargo_bin($cmd)?;
            $(cmd.arg($args);)*
            cmd.assert()
        }
    };
}

#[fixture]
fn dataset() -> assert_fs::TempDir {
    let dir = assert_fs::TempDir::new().unwrap();
    write_abc_corpus(&dir.path().join("data"));
    dir
}

#[rstest]
fn build_then_search(dataset: assert_fs::TempDir) -> Result<()> {
    let conf_dir = dataset.child("conf");
    let data = dataset.child("data");
    let query = dataset.child("query.png");
    frames_abc().0.save(query.path())?;

    cargo_run!("anisearch", "-c", conf_dir.path(), "build", "-w", "128", data.path())
        .success()
        .stdout(predicate::str::contains("\"added_frames\":3"));
    conf_dir.child("index.bin").assert(predicate::path::is_file());
    conf_dir.child("metadata.bin").assert(predicate::path::is_file());

    cargo_run!("anisearch", "-c", conf_dir.path(), "search", "-k", "1", query.path())
        .success()
        .stdout(predicate::str::contains("1\t100.00\tShow S01E01\t00:00"))
        .stdout(predicate::str::contains("Other Show").not());

    Ok(())
}

#[rstest]
#[case::flat("flat")]
#[case::hnsw("hnsw")]
fn search_json(dataset: assert_fs::TempDir, #[case] index: &str) -> Result<()> {
    let conf_dir = dataset.child("conf");
    let query = dataset.child("query.png");
    frames_abc().1.save(query.path())?;

    cargo_run!("anisearch", "-c", conf_dir.path(), "build", "-w", "128", dataset.child("data").path())
        .success();
    cargo_run!(
        "anisearch",
        "-c",
        conf_dir.path(),
        "search",
        "--index",
        index,
        "--output-format",
        "json",
        query.path()
    )
    .success()
    .stdout(predicate::str::contains("\"rank\": 1"))
    .stdout(predicate::str::contains("\"episode\": 2"))
    .stdout(predicate::str::contains("\"timings\""));

    Ok(())
}

#[rstest]
fn incremental_build_and_stats(dataset: assert_fs::TempDir) -> Result<()> {
    let conf_dir = dataset.child("conf");
    let data = dataset.child("data");

    cargo_run!("anisearch", "-c", conf_dir.path(), "build", "-w", "128", data.path()).success();
    write_episode(data.path(), "Show S01E03", &[&frames_abc().2]);
    cargo_run!("anisearch", "-c", conf_dir.path(), "build", "-w", "128", data.path())
        .success()
        .stdout(predicate::str::contains("\"added_frames\":1"))
        .stdout(predicate::str::contains("\"unchanged_sources\":3"));

    cargo_run!("anisearch", "-c", conf_dir.path(), "stats")
        .success()
        .stdout(predicate::str::contains("index_size      : 4"))
        .stdout(predicate::str::contains("frame_width     : 128"));

    // 构建参数不一致时拒绝追加
    cargo_run!("anisearch", "-c", conf_dir.path(), "build", "-w", "256", data.path()).failure();

    Ok(())
}

#[test]
fn search_without_index() -> Result<()> {
    let conf_dir = assert_fs::TempDir::new()?;
    let query = conf_dir.child("query.png");
    frames_abc().0.save(query.path())?;

    cargo_run!("anisearch", "-c", conf_dir.path(), "search", query.path()).failure();
    cargo_run!("anisearch", "-c", conf_dir.path(), "stats").failure();

    Ok(())
}
