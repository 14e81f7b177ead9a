//! Fleet-wide version assignment.
//!
//! A version is an equivalence class of binary size for one artifact name.
//! Distinct sizes are numbered 1..K in order of first appearance; ties on
//! the first-seen time break on ascending size, then on the first service
//! name observed, so renumbering is deterministic. Numbers only grow: a
//! size seen later gets the next integer, and nothing is renumbered when a
//! service goes away.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::collections::BTreeMap;

use jartrack_core::error::JartrackError;
use jartrack_db::ops;

/// One artifact row's contribution to the grouping.
#[derive(Debug, Clone)]
pub struct Observation {
    pub file_size: i64,
    pub observed_at: DateTime<Utc>,
    pub service_name: String,
}

/// Order distinct sizes into version numbers 1..K.
pub fn order_versions(observations: &[Observation]) -> Vec<(i64, i64)> {
    let mut per_size: BTreeMap<i64, (DateTime<Utc>, String)> = BTreeMap::new();
    for obs in observations {
        match per_size.get_mut(&obs.file_size) {
            Some(first_seen) => {
                if (obs.observed_at, obs.service_name.as_str())
                    < (first_seen.0, first_seen.1.as_str())
                {
                    *first_seen = (obs.observed_at, obs.service_name.clone());
                }
            }
            None => {
                per_size.insert(
                    obs.file_size,
                    (obs.observed_at, obs.service_name.clone()),
                );
            }
        }
    }

    let mut sizes: Vec<(i64, (DateTime<Utc>, String))> = per_size.into_iter().collect();
    sizes.sort_by(|a, b| {
        a.1 .0
            .cmp(&b.1 .0)
            .then(a.0.cmp(&b.0))
            .then(a.1 .1.cmp(&b.1 .1))
    });

    sizes
        .into_iter()
        .enumerate()
        .map(|(index, (size, _))| (size, (index + 1) as i64))
        .collect()
}

/// Outcome of one assignment pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AssignReport {
    pub names: usize,
    pub rows_updated: usize,
    pub labels_applied: usize,
}

impl AssignReport {
    pub fn merge(&mut self, other: AssignReport) {
        self.names += other.names;
        self.rows_updated += other.rows_updated;
        self.labels_applied += other.labels_applied;
    }
}

/// Assign versions for the given jar names. Each name is one transaction:
/// readers see the old numbering or the new one, never a mix. Grouping is
/// always fleet-wide regardless of how the name list was selected.
pub fn assign_jar_versions(conn: &Connection, names: &[String]) -> anyhow::Result<AssignReport> {
    let mut report = AssignReport::default();
    for name in names {
        let tx = conn.unchecked_transaction()?;
        let observations: Vec<Observation> = ops::list_jar_observations(&tx, name)?
            .into_iter()
            .map(|(file_size, observed_at, service_name)| Observation {
                file_size,
                observed_at,
                service_name,
            })
            .collect();
        if observations.is_empty() {
            continue;
        }

        let ordered = order_versions(&observations);
        for (size, version_no) in &ordered {
            report.rows_updated += ops::set_jar_version_for_size(&tx, name, *size, *version_no)?;
        }
        ops::set_jar_last_version(&tx, name, ordered.len() as i64)?;
        report.labels_applied += label_jar_sources(&tx, name)?;
        verify_assignment(&tx, "jar_files", "jar_name", name)?;
        tx.commit()?;

        tracing::info!(jar = %name, versions = ordered.len(), "assigned jar versions");
        report.names += 1;
    }
    Ok(report)
}

/// Assign versions for the given class full names.
pub fn assign_class_versions(conn: &Connection, names: &[String]) -> anyhow::Result<AssignReport> {
    let mut report = AssignReport::default();
    for name in names {
        let tx = conn.unchecked_transaction()?;
        let observations: Vec<Observation> = ops::list_class_observations(&tx, name)?
            .into_iter()
            .map(|(file_size, observed_at, service_name)| Observation {
                file_size,
                observed_at,
                service_name,
            })
            .collect();
        if observations.is_empty() {
            continue;
        }

        let ordered = order_versions(&observations);
        for (size, version_no) in &ordered {
            report.rows_updated +=
                ops::set_class_version_for_size(&tx, name, *size, *version_no)?;
        }
        ops::set_class_last_version(&tx, name, ordered.len() as i64)?;
        report.labels_applied += label_class_sources(&tx, name)?;
        verify_assignment(&tx, "class_files", "class_full_name", name)?;
        tx.commit()?;

        tracing::info!(class = %name, versions = ordered.len(), "assigned class versions");
        report.names += 1;
    }
    Ok(report)
}

/// Propagate `jar:{name}@{v}` tokens to every source version reachable
/// through this jar name's link rows. A blob unchanged across versions
/// accumulates several tokens.
fn label_jar_sources(conn: &Connection, jar_name: &str) -> anyhow::Result<usize> {
    let mut applied = 0;
    for jar in ops::list_jar_files_by_name(conn, jar_name)? {
        let Some(version_no) = jar.version_no else {
            continue;
        };
        let token = format!("jar:{jar_name}@{version_no}");
        for version_id in ops::list_links_for_jar(conn, &jar.id)? {
            if ops::add_version_label(conn, &version_id, &token)? {
                applied += 1;
            }
        }
    }
    Ok(applied)
}

/// Post-assignment check of the compactness invariant: for one name, the
/// distinct version numbers are exactly 1..K and map one-to-one onto the
/// distinct sizes. A violation aborts before commit.
fn verify_assignment(
    conn: &Connection,
    table: &str,
    name_column: &str,
    name: &str,
) -> anyhow::Result<()> {
    let sql = format!(
        "SELECT COUNT(DISTINCT version_no), COALESCE(MAX(version_no), 0),
                COUNT(DISTINCT file_size), COALESCE(MAX(last_version_no), 0)
         FROM {table} WHERE {name_column} = ?1"
    );
    let (distinct_versions, max_version, distinct_sizes, last_version): (i64, i64, i64, i64) =
        conn.query_row(&sql, rusqlite::params![name], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
        })?;

    if distinct_versions != max_version
        || distinct_versions != distinct_sizes
        || last_version != max_version
    {
        return Err(JartrackError::Invariant {
            message: format!(
                "{table} {name}: {distinct_versions} versions, max {max_version}, \
                 {distinct_sizes} sizes, last_version_no {last_version}"
            ),
        }
        .into());
    }
    Ok(())
}

fn label_class_sources(conn: &Connection, class_full_name: &str) -> anyhow::Result<usize> {
    let mut applied = 0;
    for class in ops::list_class_files_by_name(conn, class_full_name)? {
        let (Some(version_no), Some(version_id)) =
            (class.version_no, class.java_source_file_version_id.as_ref())
        else {
            continue;
        };
        let token = format!("class:{class_full_name}@{version_no}");
        if ops::add_version_label(conn, version_id, &token)? {
            applied += 1;
        }
    }
    Ok(applied)
}

/// Fleet-wide version statistics for the summary printout.
#[derive(Debug, Default, Clone)]
pub struct VersionStats {
    pub jar_rows: i64,
    pub jar_names: i64,
    pub jar_rows_versioned: i64,
    pub class_rows: i64,
    pub class_names: i64,
    pub class_rows_versioned: i64,
}

pub fn version_statistics(conn: &Connection) -> anyhow::Result<VersionStats> {
    let count = |sql: &str| -> anyhow::Result<i64> {
        Ok(conn.query_row(sql, [], |row| row.get(0))?)
    };
    Ok(VersionStats {
        jar_rows: count("SELECT COUNT(*) FROM jar_files")?,
        jar_names: count("SELECT COUNT(DISTINCT jar_name) FROM jar_files")?,
        jar_rows_versioned: count("SELECT COUNT(*) FROM jar_files WHERE version_no IS NOT NULL")?,
        class_rows: count("SELECT COUNT(*) FROM class_files")?,
        class_names: count("SELECT COUNT(DISTINCT class_full_name) FROM class_files")?,
        class_rows_versioned: count(
            "SELECT COUNT(*) FROM class_files WHERE version_no IS NOT NULL",
        )?,
    })
}
