//! Schema migrations.
//!
//! The schema grew in two steps, mirroring how the pipeline is layered:
//! v1 is the artifact inventory the collectors write, v2 adds the
//! content-addressed source store and the diff cache the later stages
//! need. Each step runs once, inside its own transaction, and records its
//! version in `schema_version`, so a half-applied step never survives a
//! crash.

use rusqlite::Connection;

use crate::schema;

type MigrationStep = fn(&Connection) -> anyhow::Result<()>;

/// Ordered migration steps; append-only.
const MIGRATIONS: &[(i64, MigrationStep)] = &[
    (1, artifact_inventory),
    (2, source_store),
];

/// Bring the schema up to date, applying any steps newer than what the
/// database has recorded.
pub fn run_migrations(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(schema::CREATE_SCHEMA_VERSION)?;
    let applied = applied_version(conn)?;

    for (version, step) in MIGRATIONS {
        if *version <= applied {
            continue;
        }
        let tx = conn.unchecked_transaction()?;
        step(&tx)?;
        tx.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
            [*version],
        )?;
        tx.commit()?;
        tracing::info!(version, "applied schema migration");
    }

    Ok(())
}

fn applied_version(conn: &Connection) -> anyhow::Result<i64> {
    Ok(conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?)
}

/// v1: services and the per-service jar/class observations (S1–S3 write
/// these; nothing downstream exists yet).
fn artifact_inventory(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(schema::CREATE_SERVICES)?;
    conn.execute_batch(schema::CREATE_JAR_FILES)?;
    conn.execute_batch(schema::CREATE_CLASS_FILES)?;
    Ok(())
}

/// v2: the split source model (identities + content-addressed versions),
/// jar links, the diff cache, and the lookup indexes the read path needs.
fn source_store(conn: &Connection) -> anyhow::Result<()> {
    conn.execute_batch(schema::CREATE_JAVA_SOURCE_FILES)?;
    conn.execute_batch(schema::CREATE_JAVA_SOURCE_FILE_VERSIONS)?;
    conn.execute_batch(schema::CREATE_JAVA_SOURCE_IN_JAR_FILES)?;
    conn.execute_batch(schema::CREATE_DIFF_CACHE)?;
    conn.execute_batch(schema::CREATE_DIFF_SUMMARIES)?;
    conn.execute_batch(schema::CREATE_INDEXES)?;
    Ok(())
}
