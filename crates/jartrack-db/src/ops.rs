use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use jartrack_core::models::artifact::{ClassFile, ClassFileId, JarFile, JarFileId};
use jartrack_core::models::diff::{ChangeType, DiffSummary, FileChange};
use jartrack_core::models::service::{Service, ServiceId};
use jartrack_core::models::source::{
    SourceIdentity, SourceIdentityId, SourceVersion, SourceVersionId,
};

// ── Helpers ──

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn fmt_dt(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn opt_dt(dt: &Option<DateTime<Utc>>) -> Option<String> {
    dt.as_ref().map(fmt_dt)
}

fn parse_opt_dt(s: Option<String>) -> Option<DateTime<Utc>> {
    s.map(|s| parse_dt(&s))
}

fn parse_labels(s: &str) -> Vec<String> {
    serde_json::from_str(s).unwrap_or_default()
}

fn encode_labels(labels: &[String]) -> String {
    serde_json::to_string(labels).unwrap_or_else(|_| "[]".to_string())
}

// ── Services ──

pub fn insert_service(conn: &Connection, service: &Service) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO services (id, service_name, environment, host, port, username, password, server_base_path, jar_path, classes_path, jar_decompile_output_dir, class_decompile_output_dir, description, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            service.id.0.to_string(),
            service.service_name,
            service.environment,
            service.host,
            service.port,
            service.username,
            service.password,
            service.server_base_path,
            service.jar_path,
            service.classes_path,
            service.jar_decompile_output_dir,
            service.class_decompile_output_dir,
            service.description,
            fmt_dt(&service.created_at),
            fmt_dt(&service.updated_at),
        ],
    )?;
    Ok(())
}

pub fn update_service(conn: &Connection, service: &Service) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE services SET host = ?1, port = ?2, username = ?3, password = ?4, server_base_path = ?5, jar_path = ?6, classes_path = ?7, jar_decompile_output_dir = ?8, class_decompile_output_dir = ?9, description = ?10, updated_at = ?11
         WHERE id = ?12",
        params![
            service.host,
            service.port,
            service.username,
            service.password,
            service.server_base_path,
            service.jar_path,
            service.classes_path,
            service.jar_decompile_output_dir,
            service.class_decompile_output_dir,
            service.description,
            fmt_dt(&Utc::now()),
            service.id.0.to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_service(
    conn: &Connection,
    service_name: &str,
    environment: &str,
) -> anyhow::Result<Option<Service>> {
    let mut stmt = conn.prepare(
        "SELECT id, service_name, environment, host, port, username, password, server_base_path, jar_path, classes_path, jar_decompile_output_dir, class_decompile_output_dir, description, created_at, updated_at
         FROM services WHERE service_name = ?1 AND environment = ?2",
    )?;
    let mut rows = stmt.query(params![service_name, environment])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_service(row)?)),
        None => Ok(None),
    }
}

pub fn get_service_by_id(conn: &Connection, id: &ServiceId) -> anyhow::Result<Option<Service>> {
    let mut stmt = conn.prepare(
        "SELECT id, service_name, environment, host, port, username, password, server_base_path, jar_path, classes_path, jar_decompile_output_dir, class_decompile_output_dir, description, created_at, updated_at
         FROM services WHERE id = ?1",
    )?;
    let mut rows = stmt.query(params![id.0.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_service(row)?)),
        None => Ok(None),
    }
}

pub fn list_services(conn: &Connection) -> anyhow::Result<Vec<Service>> {
    let mut stmt = conn.prepare(
        "SELECT id, service_name, environment, host, port, username, password, server_base_path, jar_path, classes_path, jar_decompile_output_dir, class_decompile_output_dir, description, created_at, updated_at
         FROM services ORDER BY service_name, environment",
    )?;
    let rows = stmt.query_map([], |row| row_to_service(row))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn list_services_for_environment(
    conn: &Connection,
    environment: &str,
) -> anyhow::Result<Vec<Service>> {
    let mut stmt = conn.prepare(
        "SELECT id, service_name, environment, host, port, username, password, server_base_path, jar_path, classes_path, jar_decompile_output_dir, class_decompile_output_dir, description, created_at, updated_at
         FROM services WHERE environment = ?1 ORDER BY service_name",
    )?;
    let rows = stmt.query_map(params![environment], |row| row_to_service(row))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

fn row_to_service(row: &rusqlite::Row) -> rusqlite::Result<Service> {
    let id_str: String = row.get(0)?;
    let port: i64 = row.get(4)?;
    let created_str: String = row.get(13)?;
    let updated_str: String = row.get(14)?;

    Ok(Service {
        id: ServiceId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
        service_name: row.get(1)?,
        environment: row.get(2)?,
        host: row.get(3)?,
        port: port as u16,
        username: row.get(5)?,
        password: row.get(6)?,
        server_base_path: row.get(7)?,
        jar_path: row.get(8)?,
        classes_path: row.get(9)?,
        jar_decompile_output_dir: row.get(10)?,
        class_decompile_output_dir: row.get(11)?,
        description: row.get(12)?,
        created_at: parse_dt(&created_str),
        updated_at: parse_dt(&updated_str),
    })
}

// ── Jar files ──

pub fn insert_jar_file(conn: &Connection, jar: &JarFile) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO jar_files (id, service_id, jar_name, file_size, last_modified, is_third_party, file_path, decompile_path, version_no, last_version_no, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            jar.id.0.to_string(),
            jar.service_id.0.to_string(),
            jar.jar_name,
            jar.file_size,
            opt_dt(&jar.last_modified),
            jar.is_third_party as i32,
            jar.file_path.as_ref().map(|p| p.to_string_lossy().to_string()),
            jar.decompile_path.as_ref().map(|p| p.to_string_lossy().to_string()),
            jar.version_no,
            jar.last_version_no,
            fmt_dt(&jar.created_at),
            fmt_dt(&jar.updated_at),
        ],
    )?;
    Ok(())
}

pub fn update_jar_listing(
    conn: &Connection,
    id: &JarFileId,
    file_size: i64,
    last_modified: Option<DateTime<Utc>>,
    is_third_party: bool,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE jar_files SET file_size = ?1, last_modified = ?2, is_third_party = ?3, updated_at = ?4 WHERE id = ?5",
        params![
            file_size,
            opt_dt(&last_modified),
            is_third_party as i32,
            fmt_dt(&Utc::now()),
            id.0.to_string(),
        ],
    )?;
    Ok(())
}

pub fn update_jar_paths(
    conn: &Connection,
    id: &JarFileId,
    file_path: &std::path::Path,
    decompile_path: &std::path::Path,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE jar_files SET file_path = ?1, decompile_path = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            file_path.to_string_lossy().to_string(),
            decompile_path.to_string_lossy().to_string(),
            fmt_dt(&Utc::now()),
            id.0.to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_jar_file(
    conn: &Connection,
    service_id: &ServiceId,
    jar_name: &str,
) -> anyhow::Result<Option<JarFile>> {
    let mut stmt = conn.prepare(
        "SELECT id, service_id, jar_name, file_size, last_modified, is_third_party, file_path, decompile_path, version_no, last_version_no, created_at, updated_at
         FROM jar_files WHERE service_id = ?1 AND jar_name = ?2",
    )?;
    let mut rows = stmt.query(params![service_id.0.to_string(), jar_name])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_jar_file(row)?)),
        None => Ok(None),
    }
}

pub fn list_jar_files_for_service(
    conn: &Connection,
    service_id: &ServiceId,
) -> anyhow::Result<Vec<JarFile>> {
    let mut stmt = conn.prepare(
        "SELECT id, service_id, jar_name, file_size, last_modified, is_third_party, file_path, decompile_path, version_no, last_version_no, created_at, updated_at
         FROM jar_files WHERE service_id = ?1 ORDER BY jar_name",
    )?;
    let rows = stmt.query_map(params![service_id.0.to_string()], |row| {
        row_to_jar_file(row)
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn list_jar_files_by_name(conn: &Connection, jar_name: &str) -> anyhow::Result<Vec<JarFile>> {
    let mut stmt = conn.prepare(
        "SELECT id, service_id, jar_name, file_size, last_modified, is_third_party, file_path, decompile_path, version_no, last_version_no, created_at, updated_at
         FROM jar_files WHERE jar_name = ?1 ORDER BY last_modified, file_size",
    )?;
    let rows = stmt.query_map(params![jar_name], |row| row_to_jar_file(row))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn list_jar_names(conn: &Connection) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT DISTINCT jar_name FROM jar_files ORDER BY jar_name")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn list_jar_names_for_service(
    conn: &Connection,
    service_id: &ServiceId,
) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT jar_name FROM jar_files WHERE service_id = ?1 ORDER BY jar_name",
    )?;
    let rows = stmt.query_map(params![service_id.0.to_string()], |row| {
        row.get::<_, String>(0)
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// One row of grouping input for the version assigner: size, effective
/// observation time (falls back to row creation time), owning service name.
pub fn list_jar_observations(
    conn: &Connection,
    jar_name: &str,
) -> anyhow::Result<Vec<(i64, DateTime<Utc>, String)>> {
    let mut stmt = conn.prepare(
        "SELECT jf.file_size, COALESCE(jf.last_modified, jf.created_at), s.service_name
         FROM jar_files jf JOIN services s ON s.id = jf.service_id
         WHERE jf.jar_name = ?1",
    )?;
    let rows = stmt.query_map(params![jar_name], |row| {
        let size: i64 = row.get(0)?;
        let ts: String = row.get(1)?;
        let service: String = row.get(2)?;
        Ok((size, ts, service))
    })?;
    Ok(rows
        .filter_map(|r| r.ok())
        .map(|(size, ts, service)| (size, parse_dt(&ts), service))
        .collect())
}

pub fn set_jar_version_for_size(
    conn: &Connection,
    jar_name: &str,
    file_size: i64,
    version_no: i64,
) -> anyhow::Result<usize> {
    let updated = conn.execute(
        "UPDATE jar_files SET version_no = ?1, updated_at = ?2 WHERE jar_name = ?3 AND file_size = ?4",
        params![version_no, fmt_dt(&Utc::now()), jar_name, file_size],
    )?;
    Ok(updated)
}

pub fn set_jar_last_version(
    conn: &Connection,
    jar_name: &str,
    last_version_no: i64,
) -> anyhow::Result<usize> {
    let updated = conn.execute(
        "UPDATE jar_files SET last_version_no = ?1, updated_at = ?2 WHERE jar_name = ?3",
        params![last_version_no, fmt_dt(&Utc::now()), jar_name],
    )?;
    Ok(updated)
}

fn row_to_jar_file(row: &rusqlite::Row) -> rusqlite::Result<JarFile> {
    let id_str: String = row.get(0)?;
    let service_id_str: String = row.get(1)?;
    let last_modified: Option<String> = row.get(4)?;
    let is_third_party: i32 = row.get(5)?;
    let file_path: Option<String> = row.get(6)?;
    let decompile_path: Option<String> = row.get(7)?;
    let created_str: String = row.get(10)?;
    let updated_str: String = row.get(11)?;

    Ok(JarFile {
        id: JarFileId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
        service_id: ServiceId::from_uuid(Uuid::parse_str(&service_id_str).unwrap_or_default()),
        jar_name: row.get(2)?,
        file_size: row.get(3)?,
        last_modified: parse_opt_dt(last_modified),
        is_third_party: is_third_party != 0,
        file_path: file_path.map(Into::into),
        decompile_path: decompile_path.map(Into::into),
        version_no: row.get(8)?,
        last_version_no: row.get(9)?,
        created_at: parse_dt(&created_str),
        updated_at: parse_dt(&updated_str),
    })
}

// ── Class files ──

pub fn insert_class_file(conn: &Connection, class: &ClassFile) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO class_files (id, service_id, class_full_name, file_size, last_modified, file_path, decompile_path, java_source_file_version_id, version_no, last_version_no, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            class.id.0.to_string(),
            class.service_id.0.to_string(),
            class.class_full_name,
            class.file_size,
            opt_dt(&class.last_modified),
            class.file_path.as_ref().map(|p| p.to_string_lossy().to_string()),
            class.decompile_path.as_ref().map(|p| p.to_string_lossy().to_string()),
            class.java_source_file_version_id.as_ref().map(|id| id.0.to_string()),
            class.version_no,
            class.last_version_no,
            fmt_dt(&class.created_at),
            fmt_dt(&class.updated_at),
        ],
    )?;
    Ok(())
}

pub fn update_class_listing(
    conn: &Connection,
    id: &ClassFileId,
    file_size: i64,
    last_modified: Option<DateTime<Utc>>,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE class_files SET file_size = ?1, last_modified = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            file_size,
            opt_dt(&last_modified),
            fmt_dt(&Utc::now()),
            id.0.to_string(),
        ],
    )?;
    Ok(())
}

pub fn update_class_paths(
    conn: &Connection,
    id: &ClassFileId,
    file_path: &std::path::Path,
    decompile_path: &std::path::Path,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE class_files SET file_path = ?1, decompile_path = ?2, updated_at = ?3 WHERE id = ?4",
        params![
            file_path.to_string_lossy().to_string(),
            decompile_path.to_string_lossy().to_string(),
            fmt_dt(&Utc::now()),
            id.0.to_string(),
        ],
    )?;
    Ok(())
}

pub fn set_class_source_version(
    conn: &Connection,
    id: &ClassFileId,
    version_id: &SourceVersionId,
) -> anyhow::Result<()> {
    conn.execute(
        "UPDATE class_files SET java_source_file_version_id = ?1, updated_at = ?2 WHERE id = ?3",
        params![
            version_id.0.to_string(),
            fmt_dt(&Utc::now()),
            id.0.to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_class_file(
    conn: &Connection,
    service_id: &ServiceId,
    class_full_name: &str,
) -> anyhow::Result<Option<ClassFile>> {
    let mut stmt = conn.prepare(
        "SELECT id, service_id, class_full_name, file_size, last_modified, file_path, decompile_path, java_source_file_version_id, version_no, last_version_no, created_at, updated_at
         FROM class_files WHERE service_id = ?1 AND class_full_name = ?2",
    )?;
    let mut rows = stmt.query(params![service_id.0.to_string(), class_full_name])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_class_file(row)?)),
        None => Ok(None),
    }
}

pub fn list_class_files_for_service(
    conn: &Connection,
    service_id: &ServiceId,
) -> anyhow::Result<Vec<ClassFile>> {
    let mut stmt = conn.prepare(
        "SELECT id, service_id, class_full_name, file_size, last_modified, file_path, decompile_path, java_source_file_version_id, version_no, last_version_no, created_at, updated_at
         FROM class_files WHERE service_id = ?1 ORDER BY class_full_name",
    )?;
    let rows = stmt.query_map(params![service_id.0.to_string()], |row| {
        row_to_class_file(row)
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn list_class_files_by_name(
    conn: &Connection,
    class_full_name: &str,
) -> anyhow::Result<Vec<ClassFile>> {
    let mut stmt = conn.prepare(
        "SELECT id, service_id, class_full_name, file_size, last_modified, file_path, decompile_path, java_source_file_version_id, version_no, last_version_no, created_at, updated_at
         FROM class_files WHERE class_full_name = ?1 ORDER BY last_modified, file_size",
    )?;
    let rows = stmt.query_map(params![class_full_name], |row| row_to_class_file(row))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn list_class_names(conn: &Connection) -> anyhow::Result<Vec<String>> {
    let mut stmt =
        conn.prepare("SELECT DISTINCT class_full_name FROM class_files ORDER BY class_full_name")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn list_class_names_for_service(
    conn: &Connection,
    service_id: &ServiceId,
) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT class_full_name FROM class_files WHERE service_id = ?1 ORDER BY class_full_name",
    )?;
    let rows = stmt.query_map(params![service_id.0.to_string()], |row| {
        row.get::<_, String>(0)
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

pub fn list_class_observations(
    conn: &Connection,
    class_full_name: &str,
) -> anyhow::Result<Vec<(i64, DateTime<Utc>, String)>> {
    let mut stmt = conn.prepare(
        "SELECT cf.file_size, COALESCE(cf.last_modified, cf.created_at), s.service_name
         FROM class_files cf JOIN services s ON s.id = cf.service_id
         WHERE cf.class_full_name = ?1",
    )?;
    let rows = stmt.query_map(params![class_full_name], |row| {
        let size: i64 = row.get(0)?;
        let ts: String = row.get(1)?;
        let service: String = row.get(2)?;
        Ok((size, ts, service))
    })?;
    Ok(rows
        .filter_map(|r| r.ok())
        .map(|(size, ts, service)| (size, parse_dt(&ts), service))
        .collect())
}

pub fn set_class_version_for_size(
    conn: &Connection,
    class_full_name: &str,
    file_size: i64,
    version_no: i64,
) -> anyhow::Result<usize> {
    let updated = conn.execute(
        "UPDATE class_files SET version_no = ?1, updated_at = ?2 WHERE class_full_name = ?3 AND file_size = ?4",
        params![version_no, fmt_dt(&Utc::now()), class_full_name, file_size],
    )?;
    Ok(updated)
}

pub fn set_class_last_version(
    conn: &Connection,
    class_full_name: &str,
    last_version_no: i64,
) -> anyhow::Result<usize> {
    let updated = conn.execute(
        "UPDATE class_files SET last_version_no = ?1, updated_at = ?2 WHERE class_full_name = ?3",
        params![last_version_no, fmt_dt(&Utc::now()), class_full_name],
    )?;
    Ok(updated)
}

pub fn delete_class_file(conn: &Connection, id: &ClassFileId) -> anyhow::Result<()> {
    conn.execute(
        "DELETE FROM class_files WHERE id = ?1",
        params![id.0.to_string()],
    )?;
    Ok(())
}

fn row_to_class_file(row: &rusqlite::Row) -> rusqlite::Result<ClassFile> {
    let id_str: String = row.get(0)?;
    let service_id_str: String = row.get(1)?;
    let last_modified: Option<String> = row.get(4)?;
    let file_path: Option<String> = row.get(5)?;
    let decompile_path: Option<String> = row.get(6)?;
    let version_id_str: Option<String> = row.get(7)?;
    let created_str: String = row.get(10)?;
    let updated_str: String = row.get(11)?;

    Ok(ClassFile {
        id: ClassFileId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
        service_id: ServiceId::from_uuid(Uuid::parse_str(&service_id_str).unwrap_or_default()),
        class_full_name: row.get(2)?,
        file_size: row.get(3)?,
        last_modified: parse_opt_dt(last_modified),
        file_path: file_path.map(Into::into),
        decompile_path: decompile_path.map(Into::into),
        java_source_file_version_id: version_id_str
            .and_then(|s| Uuid::parse_str(&s).ok())
            .map(SourceVersionId::from_uuid),
        version_no: row.get(8)?,
        last_version_no: row.get(9)?,
        created_at: parse_dt(&created_str),
        updated_at: parse_dt(&updated_str),
    })
}

// ── Source identities ──

pub fn get_identity(
    conn: &Connection,
    class_full_name: &str,
) -> anyhow::Result<Option<SourceIdentity>> {
    let mut stmt = conn
        .prepare("SELECT id, class_full_name, created_at FROM java_source_files WHERE class_full_name = ?1")?;
    let mut rows = stmt.query(params![class_full_name])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_identity(row)?)),
        None => Ok(None),
    }
}

/// Insert the identity if missing; either way return the stored row.
pub fn get_or_insert_identity(
    conn: &Connection,
    class_full_name: &str,
) -> anyhow::Result<SourceIdentity> {
    if let Some(existing) = get_identity(conn, class_full_name)? {
        return Ok(existing);
    }
    let identity = SourceIdentity::new(class_full_name.to_string());
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO java_source_files (id, class_full_name, created_at) VALUES (?1, ?2, ?3)",
        params![
            identity.id.0.to_string(),
            identity.class_full_name,
            fmt_dt(&identity.created_at),
        ],
    )?;
    if inserted == 1 {
        return Ok(identity);
    }
    // Lost a race with a concurrent insert; the row exists now.
    get_identity(conn, class_full_name)?
        .ok_or_else(|| anyhow::anyhow!("identity vanished after conflict: {class_full_name}"))
}

fn row_to_identity(row: &rusqlite::Row) -> rusqlite::Result<SourceIdentity> {
    let id_str: String = row.get(0)?;
    let created_str: String = row.get(2)?;
    Ok(SourceIdentity {
        id: SourceIdentityId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
        class_full_name: row.get(1)?,
        created_at: parse_dt(&created_str),
    })
}

// ── Source versions ──

pub fn get_source_version(
    conn: &Connection,
    identity_id: &SourceIdentityId,
    file_hash: &str,
) -> anyhow::Result<Option<SourceVersion>> {
    let mut stmt = conn.prepare(
        "SELECT id, java_source_file_id, version_labels, file_path, file_content, file_size, file_hash, line_count, created_at, updated_at
         FROM java_source_file_versions WHERE java_source_file_id = ?1 AND file_hash = ?2",
    )?;
    let mut rows = stmt.query(params![identity_id.0.to_string(), file_hash])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_source_version(row)?)),
        None => Ok(None),
    }
}

pub fn get_source_version_by_id(
    conn: &Connection,
    id: &SourceVersionId,
) -> anyhow::Result<Option<SourceVersion>> {
    let mut stmt = conn.prepare(
        "SELECT id, java_source_file_id, version_labels, file_path, file_content, file_size, file_hash, line_count, created_at, updated_at
         FROM java_source_file_versions WHERE id = ?1",
    )?;
    let mut rows = stmt.query(params![id.0.to_string()])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_source_version(row)?)),
        None => Ok(None),
    }
}

/// Insert a content-addressed version, reusing the stored row when the
/// `(identity, hash)` pair already exists. The unique constraint is the
/// authority; a conflicting insert falls back to one re-read.
pub fn insert_or_get_source_version(
    conn: &Connection,
    version: &SourceVersion,
) -> anyhow::Result<SourceVersion> {
    if let Some(existing) = get_source_version(conn, &version.java_source_file_id, &version.file_hash)? {
        return Ok(existing);
    }
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO java_source_file_versions (id, java_source_file_id, version_labels, file_path, file_content, file_size, file_hash, line_count, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            version.id.0.to_string(),
            version.java_source_file_id.0.to_string(),
            encode_labels(&version.version_labels),
            version.file_path,
            version.file_content,
            version.file_size,
            version.file_hash,
            version.line_count,
            fmt_dt(&version.created_at),
            fmt_dt(&version.updated_at),
        ],
    )?;
    if inserted == 1 {
        return Ok(version.clone());
    }
    get_source_version(conn, &version.java_source_file_id, &version.file_hash)?.ok_or_else(|| {
        anyhow::anyhow!(
            "source version vanished after conflict: {}",
            version.file_hash
        )
    })
}

pub fn list_versions_for_identity(
    conn: &Connection,
    identity_id: &SourceIdentityId,
) -> anyhow::Result<Vec<SourceVersion>> {
    let mut stmt = conn.prepare(
        "SELECT id, java_source_file_id, version_labels, file_path, file_content, file_size, file_hash, line_count, created_at, updated_at
         FROM java_source_file_versions WHERE java_source_file_id = ?1 ORDER BY created_at",
    )?;
    let rows = stmt.query_map(params![identity_id.0.to_string()], |row| {
        row_to_source_version(row)
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Add a version token to the stored label set, keeping it sorted and
/// duplicate-free.
pub fn add_version_label(
    conn: &Connection,
    id: &SourceVersionId,
    label: &str,
) -> anyhow::Result<bool> {
    let current: Option<String> = conn
        .query_row(
            "SELECT version_labels FROM java_source_file_versions WHERE id = ?1",
            params![id.0.to_string()],
            |row| row.get(0),
        )
        .ok();
    let Some(current) = current else {
        return Ok(false);
    };
    let mut labels = parse_labels(&current);
    if labels.iter().any(|l| l == label) {
        return Ok(false);
    }
    labels.push(label.to_string());
    labels.sort();
    conn.execute(
        "UPDATE java_source_file_versions SET version_labels = ?1 WHERE id = ?2",
        params![encode_labels(&labels), id.0.to_string()],
    )?;
    Ok(true)
}

pub fn delete_source_version(conn: &Connection, id: &SourceVersionId) -> anyhow::Result<()> {
    conn.execute(
        "DELETE FROM java_source_file_versions WHERE id = ?1",
        params![id.0.to_string()],
    )?;
    Ok(())
}

/// Drop the identity when its last version is gone. Returns true if deleted.
pub fn delete_identity_if_empty(
    conn: &Connection,
    id: &SourceIdentityId,
) -> anyhow::Result<bool> {
    let remaining: i64 = conn.query_row(
        "SELECT COUNT(*) FROM java_source_file_versions WHERE java_source_file_id = ?1",
        params![id.0.to_string()],
        |row| row.get(0),
    )?;
    if remaining > 0 {
        return Ok(false);
    }
    conn.execute(
        "DELETE FROM java_source_files WHERE id = ?1",
        params![id.0.to_string()],
    )?;
    Ok(true)
}

fn row_to_source_version(row: &rusqlite::Row) -> rusqlite::Result<SourceVersion> {
    let id_str: String = row.get(0)?;
    let identity_id_str: String = row.get(1)?;
    let labels_str: String = row.get(2)?;
    let created_str: String = row.get(8)?;
    let updated_str: String = row.get(9)?;

    Ok(SourceVersion {
        id: SourceVersionId::from_uuid(Uuid::parse_str(&id_str).unwrap_or_default()),
        java_source_file_id: SourceIdentityId::from_uuid(
            Uuid::parse_str(&identity_id_str).unwrap_or_default(),
        ),
        version_labels: parse_labels(&labels_str),
        file_path: row.get(3)?,
        file_content: row.get(4)?,
        file_size: row.get(5)?,
        file_hash: row.get(6)?,
        line_count: row.get(7)?,
        created_at: parse_dt(&created_str),
        updated_at: parse_dt(&updated_str),
    })
}

// ── Jar-source links ──

/// Returns true when a new link row was created.
pub fn link_jar_source(
    conn: &Connection,
    jar_file_id: &JarFileId,
    version_id: &SourceVersionId,
) -> anyhow::Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO java_source_in_jar_files (jar_file_id, java_source_file_version_id, created_at)
         VALUES (?1, ?2, ?3)",
        params![
            jar_file_id.0.to_string(),
            version_id.0.to_string(),
            fmt_dt(&Utc::now()),
        ],
    )?;
    Ok(inserted == 1)
}

pub fn list_links_for_jar(
    conn: &Connection,
    jar_file_id: &JarFileId,
) -> anyhow::Result<Vec<SourceVersionId>> {
    let mut stmt = conn.prepare(
        "SELECT java_source_file_version_id FROM java_source_in_jar_files WHERE jar_file_id = ?1",
    )?;
    let rows = stmt.query_map(params![jar_file_id.0.to_string()], |row| {
        row.get::<_, String>(0)
    })?;
    Ok(rows
        .filter_map(|r| r.ok())
        .filter_map(|s| Uuid::parse_str(&s).ok())
        .map(SourceVersionId::from_uuid)
        .collect())
}

// ── Orphans ──

/// A source version referenced by no live class file and no jar link.
#[derive(Debug, Clone)]
pub struct OrphanVersion {
    pub identity_id: SourceIdentityId,
    pub class_full_name: String,
    pub version_id: SourceVersionId,
}

pub fn list_orphan_versions(conn: &Connection) -> anyhow::Result<Vec<OrphanVersion>> {
    let mut stmt = conn.prepare(
        "SELECT sf.id, sf.class_full_name, sv.id
         FROM java_source_file_versions sv
         JOIN java_source_files sf ON sf.id = sv.java_source_file_id
         WHERE sv.id NOT IN (SELECT java_source_file_version_id FROM java_source_in_jar_files)
           AND sv.id NOT IN (SELECT java_source_file_version_id FROM class_files
                             WHERE java_source_file_version_id IS NOT NULL)
         ORDER BY sf.class_full_name",
    )?;
    let rows = stmt.query_map([], |row| {
        let identity_str: String = row.get(0)?;
        let class_full_name: String = row.get(1)?;
        let version_str: String = row.get(2)?;
        Ok((identity_str, class_full_name, version_str))
    })?;
    Ok(rows
        .filter_map(|r| r.ok())
        .map(|(identity_str, class_full_name, version_str)| OrphanVersion {
            identity_id: SourceIdentityId::from_uuid(
                Uuid::parse_str(&identity_str).unwrap_or_default(),
            ),
            class_full_name,
            version_id: SourceVersionId::from_uuid(
                Uuid::parse_str(&version_str).unwrap_or_default(),
            ),
        })
        .collect())
}

// ── Diff cache ──

pub fn get_diff_summary(
    conn: &Connection,
    kind: &str,
    name: &str,
    from_version: i64,
    to_version: i64,
) -> anyhow::Result<Option<(DiffSummary, DateTime<Utc>)>> {
    let mut stmt = conn.prepare(
        "SELECT total_files, files_changed, insertions, deletions, created_at
         FROM diff_summaries
         WHERE artifact_kind = ?1 AND artifact_name = ?2 AND from_version = ?3 AND to_version = ?4",
    )?;
    let mut rows = stmt.query(params![kind, name, from_version, to_version])?;
    match rows.next()? {
        Some(row) => {
            let insertions: i64 = row.get(2)?;
            let deletions: i64 = row.get(3)?;
            let created_str: String = row.get(4)?;
            Ok(Some((
                DiffSummary {
                    total_files: row.get(0)?,
                    files_changed: row.get(1)?,
                    insertions,
                    deletions,
                    net_change: insertions - deletions,
                },
                parse_dt(&created_str),
            )))
        }
        None => Ok(None),
    }
}

pub fn list_diff_files(
    conn: &Connection,
    kind: &str,
    name: &str,
    from_version: i64,
    to_version: i64,
) -> anyhow::Result<Vec<(FileChange, String)>> {
    let mut stmt = conn.prepare(
        "SELECT file_path, change_type, additions, deletions, change_percentage, size_before, size_after, unified_diff
         FROM diff_cache
         WHERE artifact_kind = ?1 AND artifact_name = ?2 AND from_version = ?3 AND to_version = ?4
         ORDER BY file_path",
    )?;
    let rows = stmt.query_map(params![kind, name, from_version, to_version], |row| {
        let change_str: String = row.get(1)?;
        Ok((
            FileChange {
                file_path: row.get(0)?,
                change_type: change_str.parse().unwrap_or(ChangeType::Modified),
                additions: row.get(2)?,
                deletions: row.get(3)?,
                change_percentage: row.get(4)?,
                size_before: row.get(5)?,
                size_after: row.get(6)?,
            },
            row.get::<_, String>(7)?,
        ))
    })?;
    Ok(rows.filter_map(|r| r.ok()).collect())
}

/// Replace the cached diff for one `(kind, name, from, to)` key in a single
/// transaction.
pub fn replace_diff(
    conn: &Connection,
    kind: &str,
    name: &str,
    from_version: i64,
    to_version: i64,
    files: &[(FileChange, String)],
    summary: &DiffSummary,
) -> anyhow::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "DELETE FROM diff_cache
         WHERE artifact_kind = ?1 AND artifact_name = ?2 AND from_version = ?3 AND to_version = ?4",
        params![kind, name, from_version, to_version],
    )?;
    tx.execute(
        "DELETE FROM diff_summaries
         WHERE artifact_kind = ?1 AND artifact_name = ?2 AND from_version = ?3 AND to_version = ?4",
        params![kind, name, from_version, to_version],
    )?;
    let now = fmt_dt(&Utc::now());
    for (change, unified) in files {
        tx.execute(
            "INSERT INTO diff_cache (id, artifact_kind, artifact_name, from_version, to_version, file_path, change_type, additions, deletions, change_percentage, size_before, size_after, unified_diff, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                Uuid::now_v7().to_string(),
                kind,
                name,
                from_version,
                to_version,
                change.file_path,
                change.change_type.to_string(),
                change.additions,
                change.deletions,
                change.change_percentage,
                change.size_before,
                change.size_after,
                unified,
                now,
            ],
        )?;
    }
    tx.execute(
        "INSERT INTO diff_summaries (artifact_kind, artifact_name, from_version, to_version, total_files, files_changed, insertions, deletions, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            kind,
            name,
            from_version,
            to_version,
            summary.total_files,
            summary.files_changed,
            summary.insertions,
            summary.deletions,
            now,
        ],
    )?;
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_memory_db;
    use jartrack_core::models::service::{Service, ServiceSpec};

    fn test_service(name: &str) -> Service {
        Service::from_spec(ServiceSpec {
            service_name: name.to_string(),
            environment: "production".to_string(),
            host: "10.0.0.1".to_string(),
            port: 22,
            username: String::new(),
            password: String::new(),
            server_base_path: String::new(),
            jar_path: "lib".to_string(),
            classes_path: "classes".to_string(),
            jar_decompile_output_dir: "out/lib".to_string(),
            class_decompile_output_dir: "out/classes".to_string(),
            description: None,
        })
    }

    #[test]
    fn test_service_crud() {
        let conn = open_memory_db().unwrap();
        let mut svc = test_service("gateway");
        insert_service(&conn, &svc).unwrap();

        let found = get_service(&conn, "gateway", "production").unwrap().unwrap();
        assert_eq!(found.service_name, "gateway");
        assert_eq!(found.port, 22);

        svc.host = "10.0.0.9".to_string();
        update_service(&conn, &svc).unwrap();
        let found = get_service_by_id(&conn, &svc.id).unwrap().unwrap();
        assert_eq!(found.host, "10.0.0.9");

        assert_eq!(list_services(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_service_unique_per_environment() {
        let conn = open_memory_db().unwrap();
        insert_service(&conn, &test_service("gateway")).unwrap();
        assert!(insert_service(&conn, &test_service("gateway")).is_err());

        let mut staging = test_service("gateway");
        staging.environment = "staging".to_string();
        insert_service(&conn, &staging).unwrap();
    }

    #[test]
    fn test_jar_file_crud() {
        let conn = open_memory_db().unwrap();
        let svc = test_service("gateway");
        insert_service(&conn, &svc).unwrap();

        let jar = JarFile::new(svc.id.clone(), "dsop_api.jar".to_string(), 1024, None, false);
        insert_jar_file(&conn, &jar).unwrap();

        let found = get_jar_file(&conn, &svc.id, "dsop_api.jar").unwrap().unwrap();
        assert_eq!(found.file_size, 1024);
        assert!(!found.is_third_party);

        update_jar_listing(&conn, &jar.id, 2048, None, false).unwrap();
        let found = get_jar_file(&conn, &svc.id, "dsop_api.jar").unwrap().unwrap();
        assert_eq!(found.file_size, 2048);

        set_jar_version_for_size(&conn, "dsop_api.jar", 2048, 1).unwrap();
        set_jar_last_version(&conn, "dsop_api.jar", 1).unwrap();
        let found = get_jar_file(&conn, &svc.id, "dsop_api.jar").unwrap().unwrap();
        assert_eq!(found.version_no, Some(1));
        assert_eq!(found.last_version_no, Some(1));
    }

    #[test]
    fn test_source_version_dedup_on_conflict() {
        let conn = open_memory_db().unwrap();
        let identity = get_or_insert_identity(&conn, "com.x.Y").unwrap();

        let v1 = SourceVersion::from_content(
            identity.id.clone(),
            None,
            "package com.x; class Y {}",
            25,
        );
        let stored = insert_or_get_source_version(&conn, &v1).unwrap();
        assert_eq!(stored.id, v1.id);

        // Same content again: the stored row wins, no duplicate.
        let v2 = SourceVersion::from_content(
            identity.id.clone(),
            None,
            "package com.x; class Y {}",
            25,
        );
        let reused = insert_or_get_source_version(&conn, &v2).unwrap();
        assert_eq!(reused.id, v1.id);
        assert_eq!(list_versions_for_identity(&conn, &identity.id).unwrap().len(), 1);
    }

    #[test]
    fn test_identity_reused_across_calls() {
        let conn = open_memory_db().unwrap();
        let a = get_or_insert_identity(&conn, "com.x.Y").unwrap();
        let b = get_or_insert_identity(&conn, "com.x.Y").unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn test_version_labels_are_a_set() {
        let conn = open_memory_db().unwrap();
        let identity = get_or_insert_identity(&conn, "com.x.Y").unwrap();
        let v = insert_or_get_source_version(
            &conn,
            &SourceVersion::from_content(identity.id.clone(), None, "class Y {}", 10),
        )
        .unwrap();

        assert!(add_version_label(&conn, &v.id, "jar:foo.jar@2").unwrap());
        assert!(add_version_label(&conn, &v.id, "jar:foo.jar@1").unwrap());
        assert!(!add_version_label(&conn, &v.id, "jar:foo.jar@1").unwrap());

        let stored = get_source_version_by_id(&conn, &v.id).unwrap().unwrap();
        assert_eq!(stored.version_labels, vec!["jar:foo.jar@1", "jar:foo.jar@2"]);
    }

    #[test]
    fn test_orphan_listing() {
        let conn = open_memory_db().unwrap();
        let svc = test_service("gateway");
        insert_service(&conn, &svc).unwrap();

        let jar = JarFile::new(svc.id.clone(), "dsop_api.jar".to_string(), 1024, None, false);
        insert_jar_file(&conn, &jar).unwrap();

        let identity = get_or_insert_identity(&conn, "com.x.Linked").unwrap();
        let linked = insert_or_get_source_version(
            &conn,
            &SourceVersion::from_content(identity.id.clone(), None, "class Linked {}", 15),
        )
        .unwrap();
        link_jar_source(&conn, &jar.id, &linked.id).unwrap();

        let orphan_identity = get_or_insert_identity(&conn, "com.x.Gone").unwrap();
        insert_or_get_source_version(
            &conn,
            &SourceVersion::from_content(orphan_identity.id.clone(), None, "class Gone {}", 13),
        )
        .unwrap();

        let orphans = list_orphan_versions(&conn).unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].class_full_name, "com.x.Gone");
    }

    #[test]
    fn test_diff_cache_replace_roundtrip() {
        let conn = open_memory_db().unwrap();
        let change = FileChange {
            file_path: "com.x.Y".to_string(),
            change_type: ChangeType::Modified,
            additions: 1,
            deletions: 1,
            change_percentage: 100.0,
            size_before: 10,
            size_after: 12,
        };
        let summary = DiffSummary {
            total_files: 1,
            files_changed: 1,
            insertions: 1,
            deletions: 1,
            net_change: 0,
        };
        replace_diff(
            &conn,
            "jar",
            "foo.jar",
            1,
            2,
            &[(change.clone(), "@@ -1 +1 @@".to_string())],
            &summary,
        )
        .unwrap();

        let (stored, _) = get_diff_summary(&conn, "jar", "foo.jar", 1, 2).unwrap().unwrap();
        assert_eq!(stored, summary);

        let files = list_diff_files(&conn, "jar", "foo.jar", 1, 2).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].0.change_type, ChangeType::Modified);
        assert_eq!(files[0].1, "@@ -1 +1 @@");

        // Replacing again leaves exactly one generation.
        replace_diff(&conn, "jar", "foo.jar", 1, 2, &[(change, String::new())], &summary).unwrap();
        assert_eq!(list_diff_files(&conn, "jar", "foo.jar", 1, 2).unwrap().len(), 1);
    }
}
