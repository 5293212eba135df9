//! Resolution commands with deletion enabled.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use dupecatalog::actions::{DeleteConfig, DeleteOutcome, Deleter};
use dupecatalog::catalog::{Catalog, NewFile};
use dupecatalog::engine::{Engine, EngineOptions};
use tempfile::{tempdir, TempDir};

fn write_file(path: &Path, content: &[u8]) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    File::create(path).unwrap().write_all(content).unwrap();
}

fn engine_with(catalog: &Arc<Catalog>, host: &str, options: EngineOptions) -> Engine {
    Engine::new(
        Arc::clone(catalog),
        host,
        options,
        Arc::new(AtomicBool::new(false)),
        None,
    )
    .unwrap()
}

fn engine(catalog: &Arc<Catalog>, host: &str) -> Engine {
    engine_with(catalog, host, EngineOptions::default())
}

fn setup() -> (TempDir, Arc<Catalog>) {
    (tempdir().unwrap(), Arc::new(Catalog::open_in_memory().unwrap()))
}

#[test]
fn test_kill_from_pc_removes_only_local_copies() {
    let (dir, catalog) = setup();
    let disk_a = dir.path().join("hostA-disk");
    let disk_b = dir.path().join("hostB-disk");
    write_file(&disk_a.join("old/holiday.mov"), b"movie frames");
    write_file(&disk_a.join("keep.txt"), b"only on A");
    write_file(&disk_b.join("archive/holiday.mov"), b"movie frames");

    let host_a = engine(&catalog, "hostA");
    let host_b = engine(&catalog, "hostB");
    host_a.scan(&disk_a).unwrap();
    host_b.scan(&disk_b).unwrap();

    let outcome = host_a.kill_from_pc(&disk_a, true).unwrap();
    assert_eq!(outcome.report.match_count(), 1);
    let candidate_id = outcome.report.matches[0].candidate.id;
    let original_id = outcome.report.matches[0].original.id;

    let deletion = outcome.deletion.as_ref().unwrap();
    assert_eq!(deletion.success_count(), 1);
    assert_eq!(deletion.bytes_freed, 12);
    assert!(deletion.all_succeeded());

    // The file is gone, its row is a tombstone and the emptied folder is cleaned.
    assert!(!disk_a.join("old/holiday.mov").exists());
    assert!(!disk_a.join("old").exists());
    assert!(disk_a.join("keep.txt").exists());
    assert!(catalog.file(candidate_id).unwrap().unwrap().is_deleted);

    // The other computer is untouched.
    assert!(disk_b.join("archive/holiday.mov").exists());
    assert!(!catalog.file(original_id).unwrap().unwrap().is_deleted);

    // Running again finds nothing left to do.
    let again = host_a.kill_from_pc(&disk_a, true).unwrap();
    assert!(again.report.is_empty());
    assert_eq!(again.deletion.unwrap().success_count(), 0);
}

#[test]
fn test_prune_never_deletes_outside_root() {
    let (dir, catalog) = setup();
    let library = dir.path().join("library");
    let import = dir.path().join("import");
    write_file(&library.join("a.jpg"), b"photo a");
    write_file(&library.join("b.jpg"), b"photo b");
    write_file(&import.join("a.jpg"), b"photo a");
    write_file(&import.join("nested/b.jpg"), b"photo b");
    write_file(&import.join("new.jpg"), b"photo new");

    let host = engine(&catalog, "hostA");
    host.scan(dir.path()).unwrap();
    let outcome = host.list_duplicates(&import, true).unwrap();

    assert_eq!(outcome.deletion.as_ref().unwrap().success_count(), 2);
    assert!(library.join("a.jpg").exists());
    assert!(library.join("b.jpg").exists());
    assert!(!import.join("a.jpg").exists());
    assert!(!import.join("nested").exists());
    assert!(import.join("new.jpg").exists());
}

#[test]
fn test_neighbors_delete_leaves_one_copy() {
    let (dir, catalog) = setup();
    let root = dir.path().join("downloads");
    for name in ["setup.exe", "setup (1).exe", "setup (2).exe", "setup (3).exe"] {
        write_file(&root.join(name), b"installer");
    }

    let host = engine(&catalog, "hostA");
    let outcome = host.list_neighbors(&root, true).unwrap();

    assert_eq!(outcome.deletion.as_ref().unwrap().success_count(), 3);
    assert!(outcome.housekeeping.is_none());
    let left = fs::read_dir(&root).unwrap().count();
    assert_eq!(left, 1);
    assert_eq!(host.print_files(&root).unwrap().files.len(), 1);
}

#[cfg(unix)]
#[test]
fn test_neighbors_delete_keeps_linked_target() {
    let (dir, catalog) = setup();
    let root = dir.path().join("dir");
    write_file(&root.join("a.txt"), b"the only copy");
    std::os::unix::fs::symlink(root.join("a.txt"), root.join("b.txt")).unwrap();

    let options = EngineOptions {
        walker: dupecatalog::scanner::WalkerConfig {
            follow_symlinks: true,
            ..Default::default()
        },
        io_threads: 1,
        ..EngineOptions::default()
    };
    let host = engine_with(&catalog, "hostA", options);
    let outcome = host.list_neighbors(&root, true).unwrap();

    assert!(outcome.report.is_empty());
    assert!(root.join("a.txt").exists());
    assert_eq!(fs::read(root.join("b.txt")).unwrap(), b"the only copy");
    assert_eq!(host.print_files(&root).unwrap().files.len(), 1);
}

#[cfg(unix)]
#[test]
fn test_link_row_to_its_original_is_not_deleted() {
    let (dir, catalog) = setup();
    let root = dir.path().join("dir");
    write_file(&root.join("a.txt"), b"the only copy");
    std::os::unix::fs::symlink(root.join("a.txt"), root.join("b.txt")).unwrap();

    let options = EngineOptions {
        refresh_before_resolve: false,
        ..EngineOptions::default()
    };
    let host = engine_with(&catalog, "hostA", options);
    host.scan(&root).unwrap();

    // A catalog written by an older walk may still hold a row for the link.
    let real = host.print_files(&root).unwrap().files.remove(0);
    catalog
        .insert_file(&NewFile {
            file_name: "b.txt".to_string(),
            directory_path: real.directory_path.clone(),
            computer_id: real.computer_id,
            content_hash: real.content_hash.clone(),
            size_bytes: real.size_bytes,
            last_modified: real.last_modified,
            last_checked: real.last_checked,
        })
        .unwrap();

    let outcome = host.list_neighbors(&root, true).unwrap();
    assert_eq!(outcome.report.match_count(), 1);

    let deletion = outcome.deletion.as_ref().unwrap();
    assert_eq!(deletion.success_count(), 0);
    assert_eq!(deletion.failure_count(), 1);
    assert!(root.join("a.txt").exists());
    assert_eq!(fs::read(root.join("b.txt")).unwrap(), b"the only copy");
}

#[test]
fn test_keep_empty_dirs_option() {
    let (dir, catalog) = setup();
    let library = dir.path().join("library");
    let import = dir.path().join("import");
    write_file(&library.join("x"), b"same bytes");
    write_file(&import.join("deep/x"), b"same bytes");

    let options = EngineOptions {
        remove_empty_dirs: false,
        ..EngineOptions::default()
    };
    let host = engine_with(&catalog, "hostA", options);
    host.scan(dir.path()).unwrap();
    let outcome = host.list_duplicates(&import, true).unwrap();

    assert!(outcome.housekeeping.is_none());
    assert!(!import.join("deep/x").exists());
    assert!(import.join("deep").is_dir());
}

#[test]
fn test_changed_local_original_blocks_deletion() {
    let (dir, catalog) = setup();
    let library = dir.path().join("library");
    let import = dir.path().join("import");
    write_file(&library.join("doc.txt"), b"original text");
    write_file(&import.join("doc.txt"), b"original text");

    let options = EngineOptions {
        refresh_before_resolve: false,
        ..EngineOptions::default()
    };
    let host = engine_with(&catalog, "hostA", options);
    host.scan(dir.path()).unwrap();
    write_file(&library.join("doc.txt"), b"edited since the scan");

    let outcome = host.list_duplicates(&import, true).unwrap();
    let deletion = outcome.deletion.as_ref().unwrap();

    assert_eq!(deletion.success_count(), 0);
    assert_eq!(deletion.failure_count(), 1);
    assert!(import.join("doc.txt").exists());
    assert!(outcome.has_failures());
}

#[test]
fn test_deleting_already_absent_file_is_noop() {
    let (dir, catalog) = setup();
    let path = dir.path().join("ghost.txt");
    write_file(&path, b"boo");

    let host = engine(&catalog, "hostA");
    host.scan(dir.path()).unwrap();
    let record = host.print_files(dir.path()).unwrap().files.remove(0);
    fs::remove_file(&path).unwrap();

    let deleter = Deleter::new(Arc::clone(&catalog), DeleteConfig::default());
    let outcome = deleter.delete(&record).unwrap();
    assert!(matches!(outcome, DeleteOutcome::AlreadyRemoved(_)));
    assert!(catalog.file(record.id).unwrap().unwrap().is_deleted);

    // A second attempt changes nothing.
    let again = deleter.delete(&record).unwrap();
    assert!(matches!(again, DeleteOutcome::AlreadyRemoved(_)));
}

#[test]
fn test_interrupted_engine_deletes_nothing() {
    let (dir, catalog) = setup();
    let root = dir.path().join("dir");
    write_file(&root.join("a"), b"dup");
    write_file(&root.join("b"), b"dup");

    let host = engine(&catalog, "hostA");
    host.scan(&root).unwrap();

    let flag = Arc::new(AtomicBool::new(true));
    let stopped = Engine::new(
        Arc::clone(&catalog),
        "hostA",
        EngineOptions::default(),
        Arc::clone(&flag),
        None,
    )
    .unwrap();
    let outcome = stopped.list_neighbors(&root, true).unwrap();

    assert!(outcome.interrupted());
    assert!(outcome.deletion.is_none());
    assert!(root.join("a").exists() && root.join("b").exists());
}
