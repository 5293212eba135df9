//! Whole invocations through `run_app`.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use dupecatalog::catalog::Catalog;
use dupecatalog::cli::Cli;
use dupecatalog::error::ExitCode;
use tempfile::{tempdir, TempDir};

fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    File::create(path).unwrap().write_all(content).unwrap();
}

/// Run one command line against a catalog and config inside `dir`.
fn run(dir: &TempDir, host: &str, args: &[&str]) -> ExitCode {
    let catalog = dir.path().join("catalog.db");
    let config = dir.path().join("config.toml");
    let mut argv = vec![
        "dupecatalog".to_string(),
        "--quiet".to_string(),
        "--catalog".to_string(),
        catalog.display().to_string(),
        "--config".to_string(),
        config.display().to_string(),
        "--host".to_string(),
        host.to_string(),
    ];
    argv.extend(args.iter().map(|a| (*a).to_string()));

    let cli = Cli::try_parse_from(argv).unwrap();
    dupecatalog::run_app(cli).unwrap()
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

#[test]
fn test_scan_then_files() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    write_file(&data.join("a.txt"), b"a");
    write_file(&data.join("b/c.txt"), b"c");

    assert_eq!(run(&dir, "hostA", &["scan", &path_arg(&data)]), ExitCode::Success);
    assert_eq!(run(&dir, "hostA", &["files", &path_arg(&data)]), ExitCode::Success);

    let catalog = Catalog::open(&dir.path().join("catalog.db")).unwrap();
    let stats = catalog.stats().unwrap();
    assert_eq!(stats.files, 2);
    assert_eq!(stats.computers, 1);
}

#[test]
fn test_resolution_exit_codes() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    write_file(&data.join("one.txt"), b"unique");

    let code = run(&dir, "hostA", &["neighbors", &path_arg(&data)]);
    assert_eq!(code, ExitCode::NoDuplicates);

    write_file(&data.join("two.txt"), b"unique");
    let code = run(&dir, "hostA", &["-o", "json", "neighbors", &path_arg(&data)]);
    assert_eq!(code, ExitCode::Success);
    assert!(data.join("one.txt").exists() && data.join("two.txt").exists());
}

#[test]
fn test_kill_from_pc_across_invocations() {
    let dir = tempdir().unwrap();
    let disk_a = dir.path().join("a");
    let disk_b = dir.path().join("b");
    write_file(&disk_a.join("dup.bin"), b"payload");
    write_file(&disk_b.join("dup.bin"), b"payload");

    assert_eq!(run(&dir, "hostB", &["scan", &path_arg(&disk_b)]), ExitCode::Success);
    let code = run(
        &dir,
        "hostA",
        &["kill-from-pc", "--delete", &path_arg(&disk_a)],
    );

    assert_eq!(code, ExitCode::Success);
    assert!(!disk_a.join("dup.bin").exists());
    assert!(disk_b.join("dup.bin").exists());

    let catalog = Arc::new(Catalog::open(&dir.path().join("catalog.db")).unwrap());
    let names: Vec<_> = catalog
        .computers()
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert!(names.contains(&"hostA".to_string()));
    assert!(names.contains(&"hostB".to_string()));
    assert_eq!(catalog.stats().unwrap().tombstoned, 1);
}

#[test]
fn test_bad_path_is_skipped() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    write_file(&data.join("a.txt"), b"a");
    let missing = dir.path().join("missing");

    let code = run(&dir, "hostA", &["scan", &path_arg(&missing), &path_arg(&data)]);
    assert_eq!(code, ExitCode::PartialSuccess);

    let catalog = Catalog::open(&dir.path().join("catalog.db")).unwrap();
    assert_eq!(catalog.stats().unwrap().files, 1);
}

#[test]
fn test_config_file_settings_apply() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    write_file(&data.join("keep.txt"), b"keep");
    write_file(&data.join("drop.tmp"), b"drop");
    fs::write(
        dir.path().join("config.toml"),
        "ignore_patterns = [\"*.tmp\"]\nio_threads = 2\n",
    )
    .unwrap();

    assert_eq!(run(&dir, "hostA", &["scan", &path_arg(&data)]), ExitCode::Success);

    let catalog = Catalog::open(&dir.path().join("catalog.db")).unwrap();
    assert_eq!(catalog.stats().unwrap().files, 1);
}
