use rusqlite::{params, Connection, OptionalExtension, Result};
use tracing::debug;

use super::models::FileRecord;
use super::sqlite::Database;
use crate::error::Error;
use crate::hasher::ChecksumKind;

impl Database {
    // ── File records ─────────────────────────────────────────────

    /// Insert or replace the record for `path`. Resets the link flag: only a
    /// merge marks a record linked. `ON CONFLICT DO UPDATE` keeps the rowid,
    /// so insertion order survives re-scans.
    pub fn upsert_record(&self, path: &str, checksum: &str, is_symlink: bool) -> Result<()> {
        upsert_record(self.connection(), path, checksum, is_symlink)
    }

    /// Batch upsert inside a single transaction.
    pub fn upsert_records(&self, rows: &[(String, String, bool)]) -> Result<usize> {
        let tx = self.connection().unchecked_transaction()?;
        let mut count = 0;
        {
            let mut stmt = tx.prepare_cached(UPSERT_SQL)?;
            for (path, checksum, is_symlink) in rows {
                count += stmt.execute(params![path, checksum, is_symlink])?;
            }
        }
        tx.commit()?;
        debug!("Upserted {} file records", count);
        Ok(count)
    }

    pub fn record(&self, path: &str) -> Result<Option<FileRecord>> {
        get_record(self.connection(), path)
    }

    /// All non-symlink records sharing `checksum`, linked anchors first,
    /// then insertion order. Re-invoking restarts the query.
    pub fn find_duplicates(&self, checksum: &str) -> Result<Vec<FileRecord>> {
        find_duplicates(self.connection(), checksum)
    }

    pub fn remove_record(&self, path: &str) -> Result<usize> {
        self.connection()
            .execute("DELETE FROM files WHERE path = ?1", params![path])
    }

    /// Prefix rewrite for renames. `old` and `new` may be directories; every
    /// path under `old` is rewritten.
    pub fn rename_path(&self, old: &str, new: &str) -> Result<usize> {
        let like = format!("{old}%");
        self.connection().execute(
            "UPDATE files SET path = replace(path, ?1, ?2) WHERE path LIKE ?3",
            params![old, new, like],
        )
    }

    pub fn all_paths(&self) -> Result<Vec<String>> {
        let mut stmt = self.connection().prepare("SELECT path FROM files")?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>>>()?;
        Ok(paths)
    }

    /// Non-symlink records whose checksum occurs more than once, grouped for
    /// a sweep pass: ordered by checksum, linked anchors first within each
    /// group, then insertion order.
    pub fn duplicate_records(&self) -> Result<Vec<FileRecord>> {
        let mut stmt = self.connection().prepare(
            "SELECT path, chksum, symlink, link FROM files \
             WHERE symlink = 0 AND chksum IN ( \
                 SELECT chksum FROM files WHERE symlink = 0 \
                 GROUP BY chksum HAVING COUNT(chksum) > 1) \
             ORDER BY chksum, link DESC, rowid ASC",
        )?;
        let records = stmt
            .query_map([], map_record)?
            .collect::<Result<Vec<_>>>()?;
        Ok(records)
    }

    // ── Versioning ───────────────────────────────────────────────

    /// Digest algorithm the store was created with, if recorded yet. A
    /// recorded type this build does not know is an error, not a fresh
    /// store: silently re-recording would rewrite every checksum under the
    /// wrong algorithm on the next scan.
    pub fn checksum_kind(&self) -> std::result::Result<Option<ChecksumKind>, Error> {
        let kind: Option<String> = self
            .connection()
            .query_row("SELECT chksum_type FROM versioning", [], |row| row.get(0))
            .optional()?;
        kind.map(|k| k.parse()).transpose()
    }

    /// Record the digest algorithm for a new store. A store that already
    /// has one keeps it; the algorithm is fixed at creation.
    pub fn set_checksum_kind(&self, kind: ChecksumKind) -> Result<()> {
        self.connection().execute(
            "INSERT INTO versioning (chksum_type) \
             SELECT ?1 WHERE NOT EXISTS (SELECT 1 FROM versioning)",
            params![kind.as_str()],
        )?;
        Ok(())
    }
}

const UPSERT_SQL: &str = "INSERT INTO files (path, chksum, symlink, link) \
     VALUES (?1, ?2, ?3, 0) \
     ON CONFLICT(path) DO UPDATE SET \
         chksum = excluded.chksum, \
         symlink = excluded.symlink, \
         link = 0";

// Connection-level helpers, shared between `Database` methods and the
// transactions the index opens for merge and link passes.

pub(crate) fn upsert_record(
    conn: &Connection,
    path: &str,
    checksum: &str,
    is_symlink: bool,
) -> Result<()> {
    conn.execute(UPSERT_SQL, params![path, checksum, is_symlink])?;
    Ok(())
}

pub(crate) fn get_record(conn: &Connection, path: &str) -> Result<Option<FileRecord>> {
    conn.query_row(
        "SELECT path, chksum, symlink, link FROM files WHERE path = ?1",
        params![path],
        map_record,
    )
    .optional()
}

pub(crate) fn find_duplicates(conn: &Connection, checksum: &str) -> Result<Vec<FileRecord>> {
    let mut stmt = conn.prepare_cached(
        "SELECT path, chksum, symlink, link FROM files \
         WHERE chksum = ?1 AND symlink = 0 \
         ORDER BY link DESC, rowid ASC",
    )?;
    let records = stmt
        .query_map(params![checksum], map_record)?
        .collect::<Result<Vec<_>>>()?;
    Ok(records)
}

pub(crate) fn set_linked(conn: &Connection, path: &str, linked: bool) -> Result<usize> {
    conn.execute(
        "UPDATE files SET link = ?1 WHERE path = ?2",
        params![linked, path],
    )
}

pub(crate) fn set_symlink(conn: &Connection, path: &str, symlink: bool) -> Result<usize> {
    conn.execute(
        "UPDATE files SET symlink = ?1 WHERE path = ?2",
        params![symlink, path],
    )
}

pub(crate) fn remove_record(conn: &Connection, path: &str) -> Result<usize> {
    conn.execute("DELETE FROM files WHERE path = ?1", params![path])
}

fn map_record(row: &rusqlite::Row<'_>) -> Result<FileRecord> {
    Ok(FileRecord {
        path: row.get(0)?,
        checksum: row.get(1)?,
        is_symlink: row.get(2)?,
        is_linked: row.get(3)?,
    })
}
