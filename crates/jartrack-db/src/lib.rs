pub mod migration;
pub mod ops;
pub mod query;
pub mod schema;

use rusqlite::Connection;
use std::path::Path;

/// Open (or create) the jartrack database at `path` and bring its schema
/// up to date.
///
/// The store is the pipeline's only shared mutable resource: the decompile
/// engine opens one connection per service batch and they all write under
/// short transactions. WAL mode plus a busy timeout lets those writers
/// queue instead of failing each other.
pub fn open_db(path: &Path) -> anyhow::Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA busy_timeout=5000;
         PRAGMA foreign_keys=ON;",
    )?;
    migration::run_migrations(&conn)?;
    Ok(conn)
}

/// Open an in-memory database for testing. Single-connection, so only the
/// foreign-key enforcement matters.
pub fn open_memory_db() -> anyhow::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;
    migration::run_migrations(&conn)?;
    Ok(conn)
}
