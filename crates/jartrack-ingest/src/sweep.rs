//! Orphan sweeper: drop source versions no artifact references anymore.
//!
//! Reference-driven, never name-driven: a version survives exactly when a
//! live class file points at it or a jar link reaches it.

use rusqlite::Connection;
use std::collections::BTreeMap;

use jartrack_core::models::source::{SourceIdentityId, SourceVersionId};
use jartrack_db::ops;

#[derive(Debug, Default, Clone)]
pub struct SweepReport {
    /// Orphan version count per identity, as found before any deletion.
    pub by_identity: Vec<(String, usize)>,
    pub versions_deleted: usize,
    pub identities_deleted: usize,
    pub executed: bool,
}

impl SweepReport {
    pub fn orphans_found(&self) -> usize {
        self.by_identity.iter().map(|(_, count)| count).sum()
    }
}

/// Find orphaned source versions; delete them when `execute` is set.
/// Deletion runs one transaction per identity so a failure cannot leave a
/// half-swept identity behind.
pub fn sweep_orphans(conn: &Connection, execute: bool) -> anyhow::Result<SweepReport> {
    let orphans = ops::list_orphan_versions(conn)?;

    let mut grouped: BTreeMap<String, (SourceIdentityId, Vec<SourceVersionId>)> = BTreeMap::new();
    for orphan in orphans {
        grouped
            .entry(orphan.class_full_name.clone())
            .or_insert_with(|| (orphan.identity_id.clone(), Vec::new()))
            .1
            .push(orphan.version_id);
    }

    let mut report = SweepReport {
        by_identity: grouped
            .iter()
            .map(|(name, (_, versions))| (name.clone(), versions.len()))
            .collect(),
        executed: execute,
        ..SweepReport::default()
    };

    if !execute {
        return Ok(report);
    }

    for (class_full_name, (identity_id, versions)) in grouped {
        let tx = conn.unchecked_transaction()?;
        for version_id in &versions {
            ops::delete_source_version(&tx, version_id)?;
        }
        let identity_gone = ops::delete_identity_if_empty(&tx, &identity_id)?;
        tx.commit()?;

        report.versions_deleted += versions.len();
        if identity_gone {
            report.identities_deleted += 1;
        }
        tracing::info!(
            identity = %class_full_name,
            versions = versions.len(),
            identity_removed = identity_gone,
            "swept orphaned source versions"
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jartrack_core::models::artifact::{ClassFile, JarFile};
    use jartrack_core::models::service::{Service, ServiceSpec};
    use jartrack_core::models::source::SourceVersion;
    use jartrack_db::open_memory_db;

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
    fn test_dry_run_reports_but_keeps_rows() {
        let conn = open_memory_db().unwrap();
        let identity = ops::get_or_insert_identity(&conn, "com.x.Gone").unwrap();
        ops::insert_or_get_source_version(
            &conn,
            &SourceVersion::from_content(identity.id.clone(), None, "class Gone {}", 13),
        )
        .unwrap();

        let report = sweep_orphans(&conn, false).unwrap();
        assert_eq!(report.by_identity, vec![("com.x.Gone".to_string(), 1)]);
        assert_eq!(report.versions_deleted, 0);
        assert!(!report.executed);
        assert!(ops::get_identity(&conn, "com.x.Gone").unwrap().is_some());
    }

    #[test]
    fn test_execute_removes_version_and_empty_identity() {
        let conn = open_memory_db().unwrap();
        let identity = ops::get_or_insert_identity(&conn, "com.x.Gone").unwrap();
        ops::insert_or_get_source_version(
            &conn,
            &SourceVersion::from_content(identity.id.clone(), None, "class Gone {}", 13),
        )
        .unwrap();

        let report = sweep_orphans(&conn, true).unwrap();
        assert_eq!(report.versions_deleted, 1);
        assert_eq!(report.identities_deleted, 1);
        assert!(ops::get_identity(&conn, "com.x.Gone").unwrap().is_none());
        assert!(ops::list_orphan_versions(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_referenced_versions_survive() {
        let conn = open_memory_db().unwrap();
        let service = test_service("a");
        ops::insert_service(&conn, &service).unwrap();

        // One version held by a jar link.
        let jar = JarFile::new(service.id.clone(), "dsop_api.jar".to_string(), 1, None, false);
        ops::insert_jar_file(&conn, &jar).unwrap();
        let linked_identity = ops::get_or_insert_identity(&conn, "com.x.Linked").unwrap();
        let linked = ops::insert_or_get_source_version(
            &conn,
            &SourceVersion::from_content(linked_identity.id.clone(), None, "class L {}", 10),
        )
        .unwrap();
        ops::link_jar_source(&conn, &jar.id, &linked.id).unwrap();

        // One version held by a class pointer.
        let class = ClassFile::new(service.id.clone(), "com.x.Held".to_string(), 1, None);
        ops::insert_class_file(&conn, &class).unwrap();
        let held_identity = ops::get_or_insert_identity(&conn, "com.x.Held").unwrap();
        let held = ops::insert_or_get_source_version(
            &conn,
            &SourceVersion::from_content(held_identity.id.clone(), None, "class H {}", 10),
        )
        .unwrap();
        ops::set_class_source_version(&conn, &class.id, &held.id).unwrap();

        let report = sweep_orphans(&conn, true).unwrap();
        assert_eq!(report.orphans_found(), 0);
        assert!(ops::get_identity(&conn, "com.x.Linked").unwrap().is_some());
        assert!(ops::get_identity(&conn, "com.x.Held").unwrap().is_some());
    }

    #[test]
    fn test_identity_with_surviving_sibling_version_stays() {
        let conn = open_memory_db().unwrap();
        let service = test_service("a");
        ops::insert_service(&conn, &service).unwrap();
        let jar = JarFile::new(service.id.clone(), "dsop_api.jar".to_string(), 1, None, false);
        ops::insert_jar_file(&conn, &jar).unwrap();

        let identity = ops::get_or_insert_identity(&conn, "com.x.Y").unwrap();
        let kept = ops::insert_or_get_source_version(
            &conn,
            &SourceVersion::from_content(identity.id.clone(), None, "class Y { int a; }", 18),
        )
        .unwrap();
        ops::link_jar_source(&conn, &jar.id, &kept.id).unwrap();
        ops::insert_or_get_source_version(
            &conn,
            &SourceVersion::from_content(identity.id.clone(), None, "class Y { int b; }", 18),
        )
        .unwrap();

        let report = sweep_orphans(&conn, true).unwrap();
        assert_eq!(report.versions_deleted, 1);
        assert_eq!(report.identities_deleted, 0);
        assert_eq!(
            ops::list_versions_for_identity(&conn, &identity.id).unwrap().len(),
            1
        );
    }
}
