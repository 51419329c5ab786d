//! Additive schema migrations, versioned through `PRAGMA user_version`.
//!
//! Version history:
//!   1 — base `files(path, chksum)` table plus the `versioning` table
//!   2 — `symlink` flag on `files`
//!   3 — `link` flag on `files` and the `csum_idx` checksum index
//!
//! Each step runs inside its own transaction: a failure rolls the step back
//! completely and leaves the pre-migration schema and data in place. SQLite
//! supports native `ALTER TABLE ... ADD COLUMN` with a constant default, so
//! no table rebuild is needed. Steps are idempotent — an already-present
//! column or index is detected and skipped, which keeps re-running a
//! migration against an up-to-date store a no-op.

use rusqlite::{params, Connection, Result};
use tracing::{debug, info};

/// Schema version the code expects. `Database::open` migrates up to this.
pub const SCHEMA_VERSION: i64 = 3;

pub fn schema_version(conn: &Connection) -> Result<i64> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

/// Bring the store up to [`SCHEMA_VERSION`], one transactional step at a time.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    let mut version = schema_version(conn)?;
    if version >= SCHEMA_VERSION {
        debug!("Schema already at version {}", version);
        return Ok(());
    }

    while version < SCHEMA_VERSION {
        let target = version + 1;
        let tx = conn.transaction()?;
        apply_step(&tx, target)?;
        tx.pragma_update(None, "user_version", target)?;
        tx.commit()?;
        info!("Schema migrated to version {}", target);
        version = target;
    }
    Ok(())
}

/// Apply the single step that brings the schema to `target`. Exposed so the
/// caller controls the enclosing transaction; `migrate` is the usual entry.
pub fn apply_step(conn: &Connection, target: i64) -> Result<()> {
    match target {
        1 => {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS files (
                     path   TEXT NOT NULL PRIMARY KEY,
                     chksum TEXT NOT NULL
                 );
                 CREATE TABLE IF NOT EXISTS versioning (
                     chksum_type TEXT NOT NULL
                 );",
            )?;
        }
        2 => {
            if column_exists(conn, "files", "symlink")? {
                debug!("Column 'symlink' already present; skipping");
            } else {
                conn.execute_batch(
                    "ALTER TABLE files ADD COLUMN symlink INTEGER NOT NULL DEFAULT 0;",
                )?;
            }
        }
        3 => {
            if column_exists(conn, "files", "link")? {
                debug!("Column 'link' already present; skipping");
            } else {
                conn.execute_batch(
                    "ALTER TABLE files ADD COLUMN link INTEGER NOT NULL DEFAULT 0;",
                )?;
            }
            conn.execute_batch("CREATE INDEX IF NOT EXISTS csum_idx ON files (chksum);")?;
        }
        other => {
            return Err(rusqlite::Error::InvalidParameterName(format!(
                "no migration step for schema version {other}"
            )));
        }
    }
    Ok(())
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM pragma_table_info(?1) WHERE name = ?2",
        params![table, column],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}
