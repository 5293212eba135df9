//! Scan and update passes against a shared catalog.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dupecatalog::catalog::{Catalog, FileRecord};
use dupecatalog::engine::{Engine, EngineOptions};
use dupecatalog::scanner::ScanMode;
use filetime::FileTime;
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

fn row(engine: &Engine, path: &Path) -> FileRecord {
    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    engine
        .catalog()
        .find_file(
            engine.computer().id,
            path.parent().unwrap().to_str().unwrap(),
            path.file_name().unwrap().to_str().unwrap(),
        )
        .unwrap()
        .expect("file should be cataloged")
}

#[test]
fn test_scan_catalogs_whole_tree() {
    let (dir, catalog) = setup();
    write_file(&dir.path().join("a.txt"), b"alpha");
    write_file(&dir.path().join("sub/b.txt"), b"beta");
    write_file(&dir.path().join("sub/deeper/c.txt"), b"gamma");
    write_file(&dir.path().join("empty.bin"), b"");

    let engine = engine(&catalog, "hostA");
    let summary = engine.scan(dir.path()).unwrap();

    assert_eq!(summary.mode, Some(ScanMode::Scan));
    assert_eq!(summary.files_seen, 4);
    assert_eq!(summary.files_added, 4);
    assert_eq!(summary.folders_seen, 3);
    assert!(!summary.has_errors());

    let a = row(&engine, &dir.path().join("a.txt"));
    assert_eq!(a.size_bytes, 5);
    assert_eq!(a.content_hash.as_deref().map(str::len), Some(64));

    // Empty files are cataloged but never hashed.
    let empty = row(&engine, &dir.path().join("empty.bin"));
    assert!(empty.content_hash.is_none());
    assert!(!empty.is_matchable());

    let stats = catalog.stats().unwrap();
    assert_eq!(stats.files, 4);
    assert_eq!(stats.computers, 1);
}

#[test]
fn test_rescan_is_idempotent() {
    let (dir, catalog) = setup();
    for i in 0..5 {
        write_file(&dir.path().join(format!("f{i}.dat")), format!("data {i}").as_bytes());
    }

    let engine = engine(&catalog, "hostA");
    let first = engine.scan(dir.path()).unwrap();
    assert_eq!(first.files_hashed, 5);
    let before: Vec<_> = (0..5)
        .map(|i| row(&engine, &dir.path().join(format!("f{i}.dat"))))
        .collect();

    let second = engine.scan(dir.path()).unwrap();
    assert_eq!(second.files_hashed, 0);
    assert_eq!(second.files_unchanged, 5);
    assert_eq!(second.files_added, 0);

    for (i, old) in before.iter().enumerate() {
        let new = row(&engine, &dir.path().join(format!("f{i}.dat")));
        assert_eq!(new.id, old.id);
        assert_eq!(new.content_hash, old.content_hash);
        assert!(new.last_checked >= old.last_checked);
    }
}

#[test]
fn test_modified_file_is_rehashed() {
    let (dir, catalog) = setup();
    let path = dir.path().join("doc.txt");
    write_file(&path, b"version one");

    let engine = engine(&catalog, "hostA");
    engine.scan(dir.path()).unwrap();
    let old = row(&engine, &path);

    // Same size, different content, clearly different mtime.
    write_file(&path, b"version two");
    let later = SystemTime::now() + Duration::from_secs(120);
    filetime::set_file_mtime(&path, FileTime::from_system_time(later)).unwrap();

    let summary = engine.scan(dir.path()).unwrap();
    assert_eq!(summary.files_rehashed, 1);
    assert_eq!(summary.files_hashed, 1);

    let new = row(&engine, &path);
    assert_eq!(new.id, old.id);
    assert_ne!(new.content_hash, old.content_hash);
    assert_ne!(new.last_modified, old.last_modified);
}

#[test]
fn test_update_tombstones_and_revives() {
    let (dir, catalog) = setup();
    let keep = dir.path().join("keep.txt");
    let gone = dir.path().join("sub/gone.txt");
    write_file(&keep, b"keep");
    write_file(&gone, b"gone");

    let engine = engine(&catalog, "hostA");
    engine.scan(dir.path()).unwrap();
    let gone_row = row(&engine, &gone);
    fs::remove_file(&gone).unwrap();

    // A plain scan leaves the vanished file alone.
    let scan = engine.scan(dir.path()).unwrap();
    assert_eq!(scan.files_tombstoned, 0);
    assert!(!catalog.file(gone_row.id).unwrap().unwrap().is_deleted);

    let update = engine.update(dir.path()).unwrap();
    assert_eq!(update.mode, Some(ScanMode::Update));
    assert_eq!(update.files_tombstoned, 1);
    assert!(catalog.file(gone_row.id).unwrap().unwrap().is_deleted);
    assert!(!row(&engine, &keep).is_deleted);

    // Tombstones stay put while the file is absent.
    let again = engine.update(dir.path()).unwrap();
    assert_eq!(again.files_tombstoned, 0);
    assert!(catalog.file(gone_row.id).unwrap().unwrap().is_deleted);

    // Recreating the file reuses and revives the row.
    write_file(&gone, b"back again");
    let revived = engine.scan(dir.path()).unwrap();
    assert_eq!(revived.files_rehashed, 1);
    let record = catalog.file(gone_row.id).unwrap().unwrap();
    assert!(!record.is_deleted);
    assert_eq!(record.size_bytes, 10);
}

#[test]
fn test_update_of_subtree_leaves_siblings() {
    let (dir, catalog) = setup();
    let a = dir.path().join("a/file.txt");
    let b = dir.path().join("b/file.txt");
    write_file(&a, b"a");
    write_file(&b, b"b");

    let engine = engine(&catalog, "hostA");
    engine.scan(dir.path()).unwrap();
    let b_row = row(&engine, &b);
    fs::remove_file(&b).unwrap();

    let summary = engine.update(&dir.path().join("a")).unwrap();
    assert_eq!(summary.files_tombstoned, 0);
    assert!(!catalog.file(b_row.id).unwrap().unwrap().is_deleted);
}

#[test]
fn test_hosts_have_separate_rows() {
    let (dir, catalog) = setup();
    write_file(&dir.path().join("shared.txt"), b"shared");

    let host_a = engine(&catalog, "hostA");
    let host_b = engine(&catalog, "hostB");
    host_a.scan(dir.path()).unwrap();
    host_b.scan(dir.path()).unwrap();

    let a = row(&host_a, &dir.path().join("shared.txt"));
    let b = row(&host_b, &dir.path().join("shared.txt"));
    assert_ne!(a.id, b.id);
    assert_ne!(a.computer_id, b.computer_id);
    assert_eq!(a.content_hash, b.content_hash);
    assert_eq!(catalog.stats().unwrap().computers, 2);
}

#[test]
fn test_ignore_patterns_skip_files() {
    let (dir, catalog) = setup();
    write_file(&dir.path().join("keep.txt"), b"keep");
    write_file(&dir.path().join("skip.log"), b"skip");

    let mut options = EngineOptions::default();
    options.walker.ignore_patterns = vec!["*.log".to_string()];
    let engine = Engine::new(
        Arc::clone(&catalog),
        "hostA",
        options,
        Arc::new(AtomicBool::new(false)),
        None,
    )
    .unwrap();

    let summary = engine.scan(dir.path()).unwrap();
    assert_eq!(summary.files_seen, 1);
    let listing = engine.print_files(dir.path()).unwrap();
    assert_eq!(listing.files.len(), 1);
    assert_eq!(listing.files[0].file_name, "keep.txt");
}

#[test]
fn test_catalog_persists_across_opens() {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data");
    write_file(&data.join("x.txt"), b"persist");
    let db = dir.path().join("catalog.db");

    {
        let catalog = Arc::new(Catalog::open(&db).unwrap());
        engine(&catalog, "hostA").scan(&data).unwrap();
    }

    let catalog = Arc::new(Catalog::open(&db).unwrap());
    let engine = engine(&catalog, "hostA");
    let summary = engine.scan(&data).unwrap();
    assert_eq!(summary.files_unchanged, 1);
    assert_eq!(summary.files_hashed, 0);
    assert_eq!(engine.print_files(&data).unwrap().files.len(), 1);
}
