//! Read-only query surface consumed by the HTTP layer.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;
use sha2::{Digest, Sha256};

use jartrack_core::models::artifact::ArtifactKind;
use jartrack_core::models::source::SourceVersion;

use crate::ops;

/// One matched name with fleet-wide aggregates.
#[derive(Debug, Clone, Serialize)]
pub struct SearchItem {
    pub name: String,
    pub file_count: i64,
    pub version_count: i64,
    pub service_count: i64,
    pub services: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SearchResult {
    pub jars: Vec<SearchItem>,
    pub classes: Vec<SearchItem>,
}

/// One assigned version of an artifact name.
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub version_no: i64,
    pub file_size: i64,
    pub earliest_time: Option<DateTime<Utc>>,
    pub latest_time: Option<DateTime<Utc>>,
    pub service_count: i64,
    pub services: Vec<String>,
    pub file_count: i64,
    /// sha-256 over the concatenation of the sorted per-file content hashes
    /// of this version's source set.
    pub source_hash: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VersionHistory {
    pub item_name: String,
    pub item_type: ArtifactKind,
    pub versions: Vec<VersionInfo>,
}

/// A source version paired with the identity it belongs to.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
    pub class_full_name: String,
    pub version: SourceVersion,
}

/// File view returned by `sources()`.
#[derive(Debug, Clone, Serialize)]
pub struct SourceFileView {
    pub class_full_name: String,
    pub file_hash: String,
    pub line_count: i64,
    pub file_content: String,
}

/// Substring search over jar names and class full names.
pub fn search(
    conn: &Connection,
    query: &str,
    kinds: &[ArtifactKind],
) -> anyhow::Result<SearchResult> {
    let pattern = format!("%{query}%");
    let mut result = SearchResult::default();

    if kinds.contains(&ArtifactKind::Jar) {
        let mut stmt = conn.prepare(
            "SELECT jar_name, COUNT(*), COUNT(DISTINCT version_no), COUNT(DISTINCT service_id)
             FROM jar_files WHERE jar_name LIKE ?1
             GROUP BY jar_name ORDER BY jar_name",
        )?;
        let rows = stmt.query_map(params![pattern], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;
        for row in rows.filter_map(|r| r.ok()) {
            let (name, file_count, version_count, service_count) = row;
            let services = services_using_jar(conn, &name)?;
            result.jars.push(SearchItem {
                name,
                file_count,
                version_count,
                service_count,
                services,
            });
        }
    }

    if kinds.contains(&ArtifactKind::Class) {
        let mut stmt = conn.prepare(
            "SELECT class_full_name, COUNT(*), COUNT(DISTINCT version_no), COUNT(DISTINCT service_id)
             FROM class_files WHERE class_full_name LIKE ?1
             GROUP BY class_full_name ORDER BY class_full_name",
        )?;
        let rows = stmt.query_map(params![pattern], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;
        for row in rows.filter_map(|r| r.ok()) {
            let (name, file_count, version_count, service_count) = row;
            let services = services_using_class(conn, &name)?;
            result.classes.push(SearchItem {
                name,
                file_count,
                version_count,
                service_count,
                services,
            });
        }
    }

    Ok(result)
}

fn services_using_jar(conn: &Connection, jar_name: &str) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT s.service_name FROM services s
         JOIN jar_files jf ON jf.service_id = s.id
         WHERE jf.jar_name = ?1 ORDER BY s.service_name",
    )?;
    let rows = stmt.query_map(params![jar_name], |row| row.get::<_, String>(0))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn services_using_class(conn: &Connection, class_full_name: &str) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT s.service_name FROM services s
         JOIN class_files cf ON cf.service_id = s.id
         WHERE cf.class_full_name = ?1 ORDER BY s.service_name",
    )?;
    let rows = stmt.query_map(params![class_full_name], |row| row.get::<_, String>(0))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Version history of one artifact name, with per-version aggregates.
pub fn versions(
    conn: &Connection,
    kind: ArtifactKind,
    name: &str,
) -> anyhow::Result<VersionHistory> {
    let (table, name_column) = match kind {
        ArtifactKind::Jar => ("jar_files", "jar_name"),
        ArtifactKind::Class => ("class_files", "class_full_name"),
    };
    let sql = format!(
        "SELECT version_no, file_size,
                MIN(COALESCE(last_modified, created_at)),
                MAX(COALESCE(last_modified, created_at)),
                COUNT(*), COUNT(DISTINCT service_id)
         FROM {table}
         WHERE {name_column} = ?1 AND version_no IS NOT NULL
         GROUP BY version_no ORDER BY version_no"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![name], |row| {
        Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, i64>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, i64>(4)?,
            row.get::<_, i64>(5)?,
        ))
    })?;

    let mut versions = Vec::new();
    for row in rows.filter_map(|r| r.ok()) {
        let (version_no, file_size, earliest, latest, file_count, service_count) = row;
        let services = services_for_version(conn, kind, name, version_no)?;
        let source_hash = aggregate_source_hash(conn, kind, name, version_no)?;
        versions.push(VersionInfo {
            version_no,
            file_size,
            earliest_time: DateTime::parse_from_rfc3339(&earliest)
                .map(|dt| dt.with_timezone(&Utc))
                .ok(),
            latest_time: DateTime::parse_from_rfc3339(&latest)
                .map(|dt| dt.with_timezone(&Utc))
                .ok(),
            service_count,
            services,
            file_count,
            source_hash,
        });
    }

    Ok(VersionHistory {
        item_name: name.to_string(),
        item_type: kind,
        versions,
    })
}

fn services_for_version(
    conn: &Connection,
    kind: ArtifactKind,
    name: &str,
    version_no: i64,
) -> anyhow::Result<Vec<String>> {
    let sql = match kind {
        ArtifactKind::Jar => {
            "SELECT DISTINCT s.service_name FROM services s
             JOIN jar_files jf ON jf.service_id = s.id
             WHERE jf.jar_name = ?1 AND jf.version_no = ?2 ORDER BY s.service_name"
        }
        ArtifactKind::Class => {
            "SELECT DISTINCT s.service_name FROM services s
             JOIN class_files cf ON cf.service_id = s.id
             WHERE cf.class_full_name = ?1 AND cf.version_no = ?2 ORDER BY s.service_name"
        }
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![name, version_no], |row| row.get::<_, String>(0))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// The source versions reachable from one `(name, version_no)` endpoint:
/// everything linked through jar rows for a JAR, the pointed-to version for
/// a class.
pub fn resolve_version_set(
    conn: &Connection,
    kind: ArtifactKind,
    name: &str,
    version_no: i64,
) -> anyhow::Result<Vec<ResolvedSource>> {
    let sql = match kind {
        ArtifactKind::Jar => {
            "SELECT DISTINCT sf.class_full_name, sv.id
             FROM java_source_file_versions sv
             JOIN java_source_files sf ON sf.id = sv.java_source_file_id
             JOIN java_source_in_jar_files l ON l.java_source_file_version_id = sv.id
             JOIN jar_files jf ON jf.id = l.jar_file_id
             WHERE jf.jar_name = ?1 AND jf.version_no = ?2
             ORDER BY sf.class_full_name"
        }
        ArtifactKind::Class => {
            "SELECT DISTINCT sf.class_full_name, sv.id
             FROM java_source_file_versions sv
             JOIN java_source_files sf ON sf.id = sv.java_source_file_id
             JOIN class_files cf ON cf.java_source_file_version_id = sv.id
             WHERE cf.class_full_name = ?1 AND cf.version_no = ?2
             ORDER BY sf.class_full_name"
        }
    };
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![name, version_no], |row| {
        let class_full_name: String = row.get(0)?;
        let id_str: String = row.get(1)?;
        Ok((class_full_name, id_str))
    })?;

    let mut resolved = Vec::new();
    for row in rows.filter_map(|r| r.ok()) {
        let (class_full_name, id_str) = row;
        if let Ok(uuid) = uuid::Uuid::parse_str(&id_str) {
            let id = jartrack_core::models::source::SourceVersionId::from_uuid(uuid);
            if let Some(version) = ops::get_source_version_by_id(conn, &id)? {
                resolved.push(ResolvedSource {
                    class_full_name,
                    version,
                });
            }
        }
    }
    Ok(resolved)
}

/// sha-256 of the concatenation of the sorted per-file hashes of a version's
/// source set.
pub fn aggregate_source_hash(
    conn: &Connection,
    kind: ArtifactKind,
    name: &str,
    version_no: i64,
) -> anyhow::Result<String> {
    let mut hashes: Vec<String> = resolve_version_set(conn, kind, name, version_no)?
        .into_iter()
        .map(|r| r.version.file_hash)
        .collect();
    hashes.sort();
    let mut hasher = Sha256::new();
    for hash in &hashes {
        hasher.update(hash.as_bytes());
    }
    Ok(hex::encode(hasher.finalize()))
}

/// File paths and contents for one version of one artifact.
pub fn sources(
    conn: &Connection,
    kind: ArtifactKind,
    name: &str,
    version_no: i64,
) -> anyhow::Result<Vec<SourceFileView>> {
    Ok(resolve_version_set(conn, kind, name, version_no)?
        .into_iter()
        .map(|r| SourceFileView {
            class_full_name: r.class_full_name,
            file_hash: r.version.file_hash,
            line_count: r.version.line_count,
            file_content: r.version.file_content,
        })
        .collect())
}
