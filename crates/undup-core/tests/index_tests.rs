use std::fs::{self, File};
use std::io::Write;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use undup_core::{hasher, ChecksumKind, DedupIndex, Error};

fn write_file(path: &Path, content: &[u8]) {
    File::create(path).unwrap().write_all(content).unwrap();
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn same_inode(a: &Path, b: &Path) -> bool {
    fs::metadata(a).unwrap().ino() == fs::metadata(b).unwrap().ino()
}

fn open_index() -> DedupIndex {
    DedupIndex::open_in_memory(ChecksumKind::Sha1).unwrap()
}

/// Two files, same content, registered but never merged: discovery returns
/// them in insertion order; merging links them on disk and in the index.
#[test]
fn test_end_to_end_discover_then_merge() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    write_file(&a, b"same content");
    write_file(&b, b"same content");

    let index = open_index();
    let checksum = hasher::file_checksum(&a, ChecksumKind::Sha1).unwrap();
    index.database().upsert_record(&path_str(&a), &checksum, false).unwrap();
    index.database().upsert_record(&path_str(&b), &checksum, false).unwrap();

    let records = index.find_duplicates(&checksum).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].path, path_str(&a));
    assert_eq!(records[1].path, path_str(&b));
    assert!(!records[0].is_linked && !records[1].is_linked);

    index.merge(&path_str(&a), &path_str(&b)).unwrap();
    assert!(same_inode(&a, &b));

    let records = index.find_duplicates(&checksum).unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.is_linked));
}

#[test]
fn test_merge_rejects_checksum_mismatch_and_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    write_file(&a, b"one");
    write_file(&b, b"two");

    let index = open_index();
    index.database().upsert_record(&path_str(&a), "h1", false).unwrap();
    index.database().upsert_record(&path_str(&b), "h2", false).unwrap();

    let err = index.merge(&path_str(&a), &path_str(&b)).unwrap_err();
    assert!(matches!(err, Error::ChecksumMismatch { .. }));

    // Neither the records nor the files changed.
    assert!(!index.database().record(&path_str(&a)).unwrap().unwrap().is_linked);
    assert!(!index.database().record(&path_str(&b)).unwrap().unwrap().is_linked);
    assert!(!same_inode(&a, &b));
    assert_eq!(fs::read(&b).unwrap(), b"two");
}

#[test]
fn test_merge_rejects_symlink_records() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a");
    write_file(&a, b"content");
    let link = dir.path().join("lnk");
    std::os::unix::fs::symlink(&a, &link).unwrap();

    let index = open_index();
    index.database().upsert_record(&path_str(&a), "h1", false).unwrap();
    index.database().upsert_record(&path_str(&link), "h1", true).unwrap();

    let err = index.merge(&path_str(&a), &path_str(&link)).unwrap_err();
    assert!(matches!(err, Error::SymlinkNotMergeable(_)));
    let err = index.merge(&path_str(&link), &path_str(&a)).unwrap_err();
    assert!(matches!(err, Error::SymlinkNotMergeable(_)));
}

#[test]
fn test_merge_missing_record_is_not_found() {
    let index = open_index();
    index.database().upsert_record("/a", "h1", false).unwrap();

    let err = index.merge("/a", "/gone").unwrap_err();
    assert!(matches!(err, Error::RecordNotFound(p) if p == "/gone"));
}

#[test]
fn test_symlink_records_never_reported_as_duplicates() {
    let index = open_index();
    index.database().upsert_record("/a", "h1", false).unwrap();
    index.database().upsert_record("/b", "h1", false).unwrap();
    index.database().upsert_record("/c", "h1", true).unwrap();

    let records = index.find_duplicates("h1").unwrap();
    assert!(records.iter().all(|r| r.path != "/c"));
}

#[test]
fn test_upsert_hardlinks_against_existing_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    write_file(&a, b"dup");
    write_file(&b, b"dup");

    let index = open_index();
    index.upsert(&a).unwrap();
    index.upsert(&b).unwrap();

    assert!(same_inode(&a, &b));
    assert!(index.database().record(&path_str(&a)).unwrap().unwrap().is_linked);
    assert!(index.database().record(&path_str(&b)).unwrap().unwrap().is_linked);
}

#[test]
fn test_upsert_skips_missing_path() {
    let index = open_index();
    index.upsert(Path::new("/no/such/file")).unwrap();
    assert!(index.database().record("/no/such/file").unwrap().is_none());
}

#[test]
fn test_update_all_hashes_links_and_flags_symlinks() {
    let dir = tempfile::tempdir().unwrap();
    let sub = dir.path().join("sub");
    fs::create_dir(&sub).unwrap();
    let a = dir.path().join("a.txt");
    let b = sub.join("b.txt");
    let unique = dir.path().join("unique.txt");
    let ignored = dir.path().join("skip.tmp");
    write_file(&a, b"dup content");
    write_file(&b, b"dup content");
    write_file(&unique, b"unique content");
    write_file(&ignored, b"dup content");
    let link = dir.path().join("lnk");
    std::os::unix::fs::symlink(&a, &link).unwrap();

    let index = open_index();
    let result = index
        .update_all(dir.path(), &["*.tmp".to_string()])
        .unwrap();

    assert_eq!(result.files_scanned, 4);
    assert_eq!(result.files_hashed, 4);
    assert_eq!(result.duplicate_groups, 1);
    assert_eq!(result.files_linked, 1);

    assert!(same_inode(&a, &b));
    assert!(index.database().record(&path_str(&ignored)).unwrap().is_none());

    let link_record = index.database().record(&path_str(&link)).unwrap().unwrap();
    assert!(link_record.is_symlink);

    // The symlink shares the duplicates' checksum but is never merged.
    let checksum = hasher::file_checksum(&a, ChecksumKind::Sha1).unwrap();
    let dupes = index.find_duplicates(&checksum).unwrap();
    let paths: Vec<&str> = dupes.iter().map(|r| r.path.as_str()).collect();
    assert!(!paths.contains(&path_str(&link).as_str()));
}

#[test]
fn test_update_all_links_duplicates_across_separate_scans() {
    let dir = tempfile::tempdir().unwrap();
    let root_a = dir.path().join("root_a");
    let root_b = dir.path().join("root_b");
    fs::create_dir(&root_a).unwrap();
    fs::create_dir(&root_b).unwrap();
    let x = root_a.join("x.txt");
    let y = root_b.join("y.txt");
    write_file(&x, b"shared content");
    write_file(&y, b"shared content");

    let index = open_index();
    let first = index.update_all(&root_a, &[]).unwrap();
    assert_eq!(first.duplicate_groups, 0);
    assert_eq!(first.files_linked, 0);

    // The second scan only sees root B, but its file duplicates a record
    // registered by the first scan and must be linked against it.
    let second = index.update_all(&root_b, &[]).unwrap();
    assert_eq!(second.duplicate_groups, 1);
    assert_eq!(second.files_linked, 1);
    assert!(same_inode(&x, &y));
    assert!(index.database().record(&path_str(&y)).unwrap().unwrap().is_linked);
}

#[test]
fn test_open_rejects_store_with_unknown_checksum_type() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("undup.db");
    let db_path = db_path.to_str().unwrap();
    {
        let db = undup_core::Database::open(db_path).unwrap();
        db.connection()
            .execute("INSERT INTO versioning (chksum_type) VALUES ('blake3')", [])
            .unwrap();
    }

    let err = DedupIndex::open(db_path, ChecksumKind::Sha1).unwrap_err();
    assert!(matches!(err, Error::UnknownChecksumType(t) if t == "blake3"));
}

#[test]
fn test_update_all_is_stable_across_reruns() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    write_file(&a, b"dup");
    write_file(&b, b"dup");

    let index = open_index();
    let first = index.update_all(dir.path(), &[]).unwrap();
    assert_eq!(first.files_linked, 1);

    // Everything already shares an inode; nothing left to link.
    let second = index.update_all(dir.path(), &[]).unwrap();
    assert_eq!(second.files_linked, 0);
    assert!(same_inode(&a, &b));
}

#[test]
fn test_vacuum_drops_only_stale_entries() {
    let dir = tempfile::tempdir().unwrap();
    let kept = dir.path().join("kept");
    write_file(&kept, b"content");

    let index = open_index();
    index.database().upsert_record(&path_str(&kept), "h1", false).unwrap();
    index.database().upsert_record("/gone/file", "h2", false).unwrap();

    let removed = index.vacuum().unwrap();
    assert_eq!(removed, 1);
    assert!(index.database().record(&path_str(&kept)).unwrap().is_some());
    assert!(index.database().record("/gone/file").unwrap().is_none());
}

#[test]
fn test_rename_rewrites_directory_prefix() {
    let index = open_index();
    index.database().upsert_record("/old/a", "h1", false).unwrap();
    index.database().upsert_record("/old/b", "h2", false).unwrap();

    let updated = index.rename("/old", "/new").unwrap();
    assert_eq!(updated, 2);
    assert!(index.database().record("/new/a").unwrap().is_some());
}

fn sweep_fixture(dir: &Path) -> (PathBuf, PathBuf, PathBuf, DedupIndex) {
    let a = dir.join("keep/a.txt");
    let b = dir.join("dupes/b.txt");
    fs::create_dir_all(a.parent().unwrap()).unwrap();
    fs::create_dir_all(b.parent().unwrap()).unwrap();
    write_file(&a, b"shared");
    write_file(&b, b"shared");

    let index = open_index();
    let checksum = hasher::file_checksum(&a, ChecksumKind::Sha1).unwrap();
    index.database().upsert_record(&path_str(&a), &checksum, false).unwrap();
    index.database().upsert_record(&path_str(&b), &checksum, false).unwrap();

    let dupdir = dir.join("overflow");
    (a, b, dupdir, index)
}

#[test]
fn test_sweep_moves_non_anchor_duplicates() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b, dupdir, index) = sweep_fixture(dir.path());

    let moved = index.sweep(&dupdir, false).unwrap();
    assert_eq!(moved, 1);

    // Anchor untouched, duplicate relocated under the sweep dir with its
    // uncommon subdirectory structure, record dropped.
    assert!(a.exists());
    assert!(!b.exists());
    assert!(dupdir.join("dupes/b.txt").exists());
    assert!(index.database().record(&path_str(&b)).unwrap().is_none());
    assert!(index.database().record(&path_str(&a)).unwrap().is_some());
}

#[test]
fn test_sweep_with_symlink_keeps_record_and_links_back() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b, dupdir, index) = sweep_fixture(dir.path());

    let moved = index.sweep(&dupdir, true).unwrap();
    assert_eq!(moved, 1);

    assert!(b.symlink_metadata().unwrap().file_type().is_symlink());
    assert_eq!(fs::read(&b).unwrap(), b"shared");
    assert_eq!(fs::canonicalize(&b).unwrap(), fs::canonicalize(&a).unwrap());

    let record = index.database().record(&path_str(&b)).unwrap().unwrap();
    assert!(record.is_symlink);
}

#[test]
fn test_sweep_refuses_non_empty_dupdir() {
    let dir = tempfile::tempdir().unwrap();
    let (_, _, dupdir, index) = sweep_fixture(dir.path());
    fs::create_dir_all(&dupdir).unwrap();
    write_file(&dupdir.join("occupied"), b"x");

    let err = index.sweep(&dupdir, false).unwrap_err();
    assert!(matches!(err, Error::SweepDirNotEmpty(_)));
}
