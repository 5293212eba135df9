//! Duplicate queries over a populated catalog, without deletion.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use dupecatalog::catalog::Catalog;
use dupecatalog::duplicates::Scope;
use dupecatalog::engine::{Engine, EngineOptions};
use dupecatalog::output::CommandResult;
use dupecatalog::error::ExitCode;
use tempfile::{tempdir, TempDir};

fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    File::create(path).unwrap().write_all(content).unwrap();
}

fn engine(catalog: &Arc<Catalog>, host: &str) -> Engine {
    Engine::new(
        Arc::clone(catalog),
        host,
        EngineOptions::default(),
        Arc::new(AtomicBool::new(false)),
        None,
    )
    .unwrap()
}

fn setup() -> (TempDir, Arc<Catalog>) {
    (tempdir().unwrap(), Arc::new(Catalog::open_in_memory().unwrap()))
}

#[test]
fn test_neighbors_reports_each_extra_copy() {
    let (dir, catalog) = setup();
    let photos = dir.path().join("photos");
    write_file(&photos.join("img.jpg"), b"jpeg bytes");
    write_file(&photos.join("img (1).jpg"), b"jpeg bytes");
    write_file(&photos.join("img (2).jpg"), b"jpeg bytes");
    write_file(&photos.join("other.jpg"), b"different");
    // Same content in another directory is not a neighbor.
    write_file(&dir.path().join("elsewhere/img.jpg"), b"jpeg bytes");

    let engine = engine(&catalog, "hostA");
    engine.scan(dir.path()).unwrap();
    let outcome = engine.list_neighbors(&photos, false).unwrap();
    let report = &outcome.report;

    assert_eq!(report.scope, Scope::SameDirectory);
    assert_eq!(report.match_count(), 2);
    assert_eq!(report.duplicate_bytes, 20);

    // One copy is never offered for removal.
    let originals: Vec<_> = report.matches.iter().map(|m| m.original.id).collect();
    for m in &report.matches {
        assert_eq!(m.candidate.directory_path, m.original.directory_path);
        assert!(!originals.contains(&m.candidate.id));
    }
}

#[test]
fn test_prune_originals_lie_outside_root() {
    let (dir, catalog) = setup();
    let library = dir.path().join("library");
    let import = dir.path().join("import");
    write_file(&library.join("song.flac"), b"flac data");
    write_file(&import.join("a/song.flac"), b"flac data");
    write_file(&import.join("b/song-copy.flac"), b"flac data");
    write_file(&import.join("unique.flac"), b"only here");

    let engine = engine(&catalog, "hostA");
    engine.scan(dir.path()).unwrap();
    let outcome = engine.list_duplicates(&import, false).unwrap();
    let report = &outcome.report;

    assert_eq!(report.scope, Scope::Prune);
    assert_eq!(report.match_count(), 2);
    let import_key = import.canonicalize().unwrap();
    for m in &report.matches {
        assert!(m.candidate.full_path().starts_with(&import_key));
        assert!(!m.original.full_path().starts_with(&import_key));
    }
}

#[test]
fn test_prune_without_outside_copy_is_empty() {
    let (dir, catalog) = setup();
    let import = dir.path().join("import");
    // Copies only inside the root are neighbors, not prune matches.
    write_file(&import.join("x.txt"), b"twin");
    write_file(&import.join("y.txt"), b"twin");

    let engine = engine(&catalog, "hostA");
    engine.scan(dir.path()).unwrap();
    let outcome = engine.list_duplicates(&import, false).unwrap();

    assert!(outcome.report.is_empty());
    assert_eq!(
        CommandResult::Resolution(outcome).exit_code(),
        ExitCode::NoDuplicates
    );
}

#[test]
fn test_cross_host_needs_another_computer() {
    let (dir, catalog) = setup();
    let mine = dir.path().join("mine");
    let theirs = dir.path().join("theirs");
    write_file(&mine.join("report.pdf"), b"pdf content");
    write_file(&mine.join("local-only.pdf"), b"local");
    write_file(&mine.join("local-twin.pdf"), b"local");
    write_file(&theirs.join("report.pdf"), b"pdf content");

    let host_a = engine(&catalog, "hostA");
    let host_b = engine(&catalog, "hostB");
    host_a.scan(&mine).unwrap();

    // Local copies alone never count.
    assert!(host_a.kill_from_pc(&mine, false).unwrap().report.is_empty());

    host_b.scan(&theirs).unwrap();
    let outcome = host_a.kill_from_pc(&mine, false).unwrap();
    let report = &outcome.report;

    assert_eq!(report.scope, Scope::CrossHost);
    assert_eq!(report.match_count(), 1);
    let m = &report.matches[0];
    assert_eq!(m.candidate.file_name, "report.pdf");
    assert_eq!(m.candidate.computer_id, host_a.computer().id);
    assert_eq!(m.original.computer_id, host_b.computer().id);
}

#[test]
fn test_remote_tombstones_do_not_match() {
    let (dir, catalog) = setup();
    let mine = dir.path().join("mine");
    let theirs = dir.path().join("theirs");
    write_file(&mine.join("a.txt"), b"content");
    write_file(&theirs.join("a.txt"), b"content");

    let host_a = engine(&catalog, "hostA");
    let host_b = engine(&catalog, "hostB");
    host_a.scan(&mine).unwrap();
    host_b.scan(&theirs).unwrap();
    fs::remove_file(theirs.join("a.txt")).unwrap();
    host_b.update(&theirs).unwrap();

    assert!(host_a.kill_from_pc(&mine, false).unwrap().report.is_empty());
}

#[test]
fn test_refresh_before_resolve_sees_new_files() {
    let (dir, catalog) = setup();
    let root = dir.path().join("dir");
    write_file(&root.join("one.txt"), b"same");

    let engine = engine(&catalog, "hostA");
    engine.scan(&root).unwrap();
    write_file(&root.join("two.txt"), b"same");

    let outcome = engine.list_neighbors(&root, false).unwrap();
    let refresh = outcome.refresh.as_ref().unwrap();
    assert_eq!(refresh.files_added, 1);
    assert_eq!(outcome.report.match_count(), 1);
}

#[test]
fn test_resolution_without_refresh_uses_catalog_only() {
    let (dir, catalog) = setup();
    let root = dir.path().join("dir");
    write_file(&root.join("one.txt"), b"same");

    let options = EngineOptions {
        refresh_before_resolve: false,
        ..EngineOptions::default()
    };
    let engine = Engine::new(
        Arc::clone(&catalog),
        "hostA",
        options,
        Arc::new(AtomicBool::new(false)),
        None,
    )
    .unwrap();
    engine.scan(&root).unwrap();
    write_file(&root.join("two.txt"), b"same");

    let outcome = engine.list_neighbors(&root, false).unwrap();
    assert!(outcome.refresh.is_none());
    assert!(outcome.report.is_empty());
}

#[test]
fn test_removed_file_is_not_reported() {
    let (dir, catalog) = setup();
    let root = dir.path().join("dir");
    write_file(&root.join("x.txt"), b"same");
    write_file(&root.join("y.txt"), b"same");

    let engine = engine(&catalog, "hostA");
    engine.scan(&root).unwrap();
    fs::remove_file(root.join("x.txt")).unwrap();

    let outcome = engine.list_neighbors(&root, false).unwrap();
    assert_eq!(outcome.refresh.as_ref().unwrap().files_tombstoned, 1);
    assert!(outcome.report.is_empty());
    assert_eq!(outcome.report.duplicate_bytes, 0);
}

#[test]
fn test_modified_copy_no_longer_matches() {
    let (dir, catalog) = setup();
    let root = dir.path().join("dir");
    write_file(&root.join("x.txt"), b"same");
    write_file(&root.join("y.txt"), b"same");

    let engine = engine(&catalog, "hostA");
    assert_eq!(engine.list_neighbors(&root, false).unwrap().report.match_count(), 1);

    write_file(&root.join("x.txt"), b"rewritten with other content");

    let outcome = engine.list_neighbors(&root, false).unwrap();
    assert_eq!(outcome.refresh.as_ref().unwrap().files_rehashed, 1);
    assert!(outcome.report.is_empty());
}
