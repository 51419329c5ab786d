use dashmap::DashSet;
use rayon::prelude::*;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::error::Error;
use crate::fsops;
use crate::hasher::{self, ChecksumKind};
use crate::scanner;
use crate::storage::models::FileRecord;
use crate::storage::{queries, Database};

/// The deduplication index: the mapping from filesystem path to content
/// fingerprint and link state, plus the operations that merge duplicate
/// content. Merge and link passes run inside a single SQLite transaction, so
/// no reader ever observes a half-merged state.
#[derive(Debug)]
pub struct DedupIndex {
    db: Database,
    checksum: ChecksumKind,
}

/// Outcome of a full `update_all` pass.
#[derive(Debug)]
pub struct UpdateResult {
    pub scan_duration: Duration,
    pub hash_duration: Duration,
    pub db_duration: Duration,
    pub files_scanned: usize,
    pub files_hashed: usize,
    pub duplicate_groups: usize,
    pub files_linked: usize,
}

impl DedupIndex {
    /// Open (creating if needed) the index at `db_path`. `preferred` selects
    /// the digest algorithm for a new store; an existing store keeps the
    /// algorithm recorded when it was created.
    pub fn open(db_path: &str, preferred: ChecksumKind) -> Result<Self, Error> {
        Self::from_database(Database::open(db_path)?, preferred)
    }

    pub fn open_in_memory(preferred: ChecksumKind) -> Result<Self, Error> {
        Self::from_database(Database::open_in_memory()?, preferred)
    }

    fn from_database(db: Database, preferred: ChecksumKind) -> Result<Self, Error> {
        let checksum = match db.checksum_kind()? {
            Some(kind) => kind,
            None => {
                db.set_checksum_kind(preferred)?;
                preferred
            }
        };
        debug!("Index opened with {} checksums", checksum.as_str());
        Ok(Self { db, checksum })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn checksum_kind(&self) -> ChecksumKind {
        self.checksum
    }

    /// Hash `path` and insert or refresh its record, then hard-link it
    /// against any same-checksum files on a different inode. A path that no
    /// longer exists (typically a broken symlink) is logged and skipped.
    pub fn upsert(&self, path: &Path) -> Result<(), Error> {
        let Ok(meta) = path.symlink_metadata() else {
            error!("Path {} does not exist; skipping update", path.display());
            return Ok(());
        };
        let is_symlink = meta.file_type().is_symlink();
        if is_symlink && !path.exists() {
            error!("Path {} does not exist; skipping update", path.display());
            return Ok(());
        }
        let checksum = hasher::file_checksum(path, self.checksum)?;
        let key = path_key(path);

        let tx = self.db.connection().unchecked_transaction()?;
        queries::upsert_record(&tx, &key, &checksum, is_symlink)?;
        if !is_symlink {
            hardlink_group(&tx, &checksum)?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Walk `root`, hash every candidate file in parallel, and refresh the
    /// whole index in one transaction, hard-linking freshly confirmed
    /// duplicate groups along the way.
    pub fn update_all(&self, root: &Path, ignore_globs: &[String]) -> Result<UpdateResult, Error> {
        info!("Updating all checksums under {}", root.display());

        let scan_start = Instant::now();
        let files = scanner::collect_files(root, ignore_globs);
        let scan_duration = scan_start.elapsed();
        let files_scanned = files.len();
        debug!(
            "Scan completed in {:.2}s — {} candidate files",
            scan_duration.as_secs_f64(),
            files_scanned,
        );

        let hash_start = Instant::now();
        let hashed = hash_files(&files, self.checksum);
        let hash_duration = hash_start.elapsed();

        let seen: DashSet<String> = DashSet::new();
        hashed.par_iter().for_each(|(_, checksum, is_symlink)| {
            if !is_symlink {
                seen.insert(checksum.clone());
            }
        });
        debug!(
            "Hash completed in {:.2}s — {} files hashed",
            hash_duration.as_secs_f64(),
            hashed.len(),
        );

        let db_start = Instant::now();
        let tx = self.db.connection().unchecked_transaction()?;
        for (path, checksum, is_symlink) in &hashed {
            queries::upsert_record(&tx, path, checksum, *is_symlink)?;
        }

        // Link every checksum touched by this scan against the whole index,
        // not just against files from the same pass: duplicates of records
        // registered by an earlier scan of another root count too.
        let mut duplicate_groups = 0;
        let mut files_linked = 0;
        for checksum in seen.iter() {
            let (members, linked) = hardlink_group(&tx, checksum.key())?;
            if members > 1 {
                duplicate_groups += 1;
            }
            files_linked += linked;
        }
        tx.commit()?;
        let db_duration = db_start.elapsed();
        info!(
            "Done updating all checksums — {} groups, {} files linked",
            duplicate_groups, files_linked,
        );

        Ok(UpdateResult {
            scan_duration,
            hash_duration,
            db_duration,
            files_scanned,
            files_hashed: hashed.len(),
            duplicate_groups,
            files_linked,
        })
    }

    /// All non-symlink records sharing `checksum`, linked anchors first.
    pub fn find_duplicates(&self, checksum: &str) -> Result<Vec<FileRecord>, Error> {
        Ok(self.db.find_duplicates(checksum)?)
    }

    /// Redirect `duplicate`'s storage to share `anchor`'s content and mark
    /// both records linked, atomically. The stored checksums are re-compared
    /// inside the transaction: content that changed between discovery and
    /// merge surfaces as `ChecksumMismatch` and nothing is modified.
    pub fn merge(&self, anchor: &str, duplicate: &str) -> Result<(), Error> {
        let tx = self.db.connection().unchecked_transaction()?;

        let anchor_rec = queries::get_record(&tx, anchor)?
            .ok_or_else(|| Error::RecordNotFound(anchor.to_string()))?;
        let dup_rec = queries::get_record(&tx, duplicate)?
            .ok_or_else(|| Error::RecordNotFound(duplicate.to_string()))?;

        if anchor_rec.is_symlink {
            return Err(Error::SymlinkNotMergeable(anchor_rec.path));
        }
        if dup_rec.is_symlink {
            return Err(Error::SymlinkNotMergeable(dup_rec.path));
        }
        if anchor_rec.checksum != dup_rec.checksum {
            return Err(Error::ChecksumMismatch {
                anchor: anchor_rec.path,
                duplicate: dup_rec.path,
            });
        }

        fsops::hard_link(Path::new(anchor), Path::new(duplicate))?;
        queries::set_linked(&tx, anchor, true)?;
        queries::set_linked(&tx, duplicate, true)?;
        tx.commit()?;

        info!("Merged {} into {}", duplicate, anchor);
        Ok(())
    }

    pub fn remove(&self, path: &str) -> Result<(), Error> {
        self.db.remove_record(path)?;
        Ok(())
    }

    /// Rewrite the path prefix `old` to `new`, covering directory renames.
    pub fn rename(&self, old: &str, new: &str) -> Result<usize, Error> {
        Ok(self.db.rename_path(old, new)?)
    }

    /// Drop records whose paths no longer exist on disk. Returns the number
    /// of records removed.
    pub fn vacuum(&self) -> Result<usize, Error> {
        info!("Vacuuming index");
        let stale: Vec<String> = self
            .db
            .all_paths()?
            .into_iter()
            .filter(|path| !Path::new(path).exists())
            .collect();

        let tx = self.db.connection().unchecked_transaction()?;
        for path in &stale {
            info!("Removing entry for {}; file does not exist", path);
            queries::remove_record(&tx, path)?;
        }
        tx.commit()?;
        info!("Vacuum complete — {} entries removed", stale.len());
        Ok(stale.len())
    }

    /// Move every non-anchor duplicate into `dupdir`, reconstructing the
    /// subdirectory structure not shared with `dupdir`. With `do_symlink`,
    /// the vacated path is symlinked back to the anchor and its record kept
    /// (flagged as a symlink); otherwise the record is removed. Refuses a
    /// non-empty `dupdir`. Returns the number of files moved.
    pub fn sweep(&self, dupdir: &Path, do_symlink: bool) -> Result<usize, Error> {
        if dupdir.exists() && fs::read_dir(dupdir)?.next().is_some() {
            return Err(Error::SweepDirNotEmpty(dupdir.display().to_string()));
        }
        info!("Sweeping duplicates into {}", dupdir.display());

        let records = self.db.duplicate_records()?;
        let tx = self.db.connection().unchecked_transaction()?;
        let mut moved = 0;

        for group in group_by_checksum(&records) {
            // The symlink flag can be stale; trust the filesystem.
            let live: Vec<&FileRecord> = group
                .iter()
                .filter(|r| {
                    let p = Path::new(&r.path);
                    p.exists() && !p.is_symlink()
                })
                .copied()
                .collect();
            if live.len() < 2 {
                continue;
            }

            let anchor = Path::new(&live[0].path);
            for record in &live[1..] {
                let src = Path::new(&record.path);
                let dst = fsops::dst_with_subdirectory(src, dupdir)?;
                fsops::move_file(src, &dst, !do_symlink)?;
                if do_symlink {
                    queries::set_symlink(&tx, &record.path, true)?;
                    fsops::symlink(anchor, src)?;
                } else {
                    queries::remove_record(&tx, &record.path)?;
                }
                moved += 1;
            }
        }
        tx.commit()?;
        info!("Sweep complete — {} files moved", moved);
        Ok(moved)
    }
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Hash candidates in parallel. Unreadable paths (broken symlinks, races
/// with deletion) are logged and skipped, matching single-path upsert.
fn hash_files(files: &[PathBuf], kind: ChecksumKind) -> Vec<(String, String, bool)> {
    files
        .par_iter()
        .filter_map(|path| {
            let meta = path.symlink_metadata().ok()?;
            let is_symlink = meta.file_type().is_symlink();
            match hasher::file_checksum(path, kind) {
                Ok(checksum) => Some((path_key(path), checksum, is_symlink)),
                Err(e) => {
                    error!("Unable to update checksum for {}: {}", path.display(), e);
                    None
                }
            }
        })
        .collect()
}

/// Hard-link every member of the duplicate group for `checksum` against its
/// anchor. The anchor is the first record in linked-first, oldest-first
/// order whose path still exists — preferring an existing, already-linked
/// entry avoids constantly re-linking files. Members already sharing the
/// anchor's inode are left untouched. Returns the group size found in the
/// index and the number of files newly linked.
fn hardlink_group(conn: &rusqlite::Connection, checksum: &str) -> Result<(usize, usize), Error> {
    let records = queries::find_duplicates(conn, checksum)?;
    if records.len() < 2 {
        return Ok((records.len(), 0));
    }

    let Some(anchor_idx) = records.iter().position(|r| Path::new(&r.path).exists()) else {
        return Ok((records.len(), 0));
    };
    let anchor = &records[anchor_idx];
    let anchor_path = Path::new(&anchor.path);
    let anchor_ino = fs::metadata(anchor_path)?.ino();

    let mut linked = 0;
    for (i, record) in records.iter().enumerate() {
        if i == anchor_idx {
            continue;
        }
        let path = Path::new(&record.path);
        if !path.exists() {
            // stale entry; vacuum's job
            continue;
        }
        if fs::metadata(path)?.ino() == anchor_ino {
            continue;
        }
        fsops::hard_link(anchor_path, path)?;
        queries::set_linked(conn, &record.path, true)?;
        linked += 1;
    }
    if linked > 0 && !anchor.is_linked {
        queries::set_linked(conn, &anchor.path, true)?;
    }
    Ok((records.len(), linked))
}

/// Split records already ordered by checksum into per-checksum groups.
fn group_by_checksum(records: &[FileRecord]) -> Vec<Vec<&FileRecord>> {
    let mut groups: Vec<Vec<&FileRecord>> = Vec::new();
    for record in records {
        match groups.last_mut() {
            Some(group) if group[0].checksum == record.checksum => group.push(record),
            _ => groups.push(vec![record]),
        }
    }
    groups
}
