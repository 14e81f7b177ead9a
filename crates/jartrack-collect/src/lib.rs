//! Fleet collector: directory listings → `jar_files` / `class_files` rows.

pub mod registry;

use rusqlite::Connection;

use jartrack_core::error::JartrackError;
use jartrack_core::models::artifact::{ClassFile, JarFile};
use jartrack_core::models::service::Service;
use jartrack_db::ops;
use jartrack_transport::Transport;

/// Per-service outcome of one collection pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollectStats {
    pub inserted: usize,
    pub updated: usize,
    /// Malformed listing lines skipped with a warning.
    pub skipped_lines: usize,
}

/// A JAR is internal when its name starts with a configured prefix;
/// everything else is third-party.
pub fn is_third_party(jar_name: &str, internal_prefixes: &[String]) -> bool {
    let lower = jar_name.to_lowercase();
    !internal_prefixes
        .iter()
        .any(|prefix| lower.starts_with(&prefix.to_lowercase()))
}

/// Fully-qualified class name for a `.class` path below the classes root:
/// `/` becomes `.`, the suffix is stripped, inner-class `$` separators stay.
pub fn derive_class_full_name(relative_path: &str) -> Option<String> {
    let stripped = relative_path.strip_suffix(".class")?;
    if stripped.is_empty() {
        return None;
    }
    Some(stripped.replace('/', "."))
}

/// Collect JAR metadata for one service. A transport failure surfaces
/// before any write, leaving prior rows untouched.
pub fn collect_jars_for_service(
    conn: &Connection,
    service: &Service,
    transport: &dyn Transport,
    internal_prefixes: &[String],
) -> Result<CollectStats, JartrackError> {
    let jar_dir = service.render_path(&service.jar_path)?;
    let listing = transport.list(&jar_dir, false)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| JartrackError::Database(e.to_string()))?;

    let mut stats = CollectStats {
        skipped_lines: listing.malformed,
        ..CollectStats::default()
    };

    for entry in &listing.entries {
        if !entry.path.ends_with(".jar") || entry.path.contains('/') {
            continue;
        }
        let third_party = is_third_party(&entry.path, internal_prefixes);
        let existing = ops::get_jar_file(&tx, &service.id, &entry.path)
            .map_err(|e| JartrackError::Database(e.to_string()))?;
        match existing {
            Some(jar) => {
                ops::update_jar_listing(&tx, &jar.id, entry.size, entry.mtime, third_party)
                    .map_err(|e| JartrackError::Database(e.to_string()))?;
                stats.updated += 1;
            }
            None => {
                let jar = JarFile::new(
                    service.id.clone(),
                    entry.path.clone(),
                    entry.size,
                    entry.mtime,
                    third_party,
                );
                ops::insert_jar_file(&tx, &jar)
                    .map_err(|e| JartrackError::Database(e.to_string()))?;
                stats.inserted += 1;
            }
        }
    }

    tx.commit()
        .map_err(|e| JartrackError::Database(e.to_string()))?;

    tracing::info!(
        service = %service.service_name,
        inserted = stats.inserted,
        updated = stats.updated,
        skipped = stats.skipped_lines,
        "collected jar listing"
    );
    Ok(stats)
}

/// Collect loose-class metadata for one service.
pub fn collect_classes_for_service(
    conn: &Connection,
    service: &Service,
    transport: &dyn Transport,
) -> Result<CollectStats, JartrackError> {
    let classes_dir = service.render_path(&service.classes_path)?;
    let listing = transport.list(&classes_dir, true)?;

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| JartrackError::Database(e.to_string()))?;

    let mut stats = CollectStats {
        skipped_lines: listing.malformed,
        ..CollectStats::default()
    };

    for entry in &listing.entries {
        let Some(class_full_name) = derive_class_full_name(&entry.path) else {
            continue;
        };
        let existing = ops::get_class_file(&tx, &service.id, &class_full_name)
            .map_err(|e| JartrackError::Database(e.to_string()))?;
        match existing {
            Some(class) => {
                ops::update_class_listing(&tx, &class.id, entry.size, entry.mtime)
                    .map_err(|e| JartrackError::Database(e.to_string()))?;
                stats.updated += 1;
            }
            None => {
                let class = ClassFile::new(
                    service.id.clone(),
                    class_full_name,
                    entry.size,
                    entry.mtime,
                );
                ops::insert_class_file(&tx, &class)
                    .map_err(|e| JartrackError::Database(e.to_string()))?;
                stats.inserted += 1;
            }
        }
    }

    tx.commit()
        .map_err(|e| JartrackError::Database(e.to_string()))?;

    tracing::info!(
        service = %service.service_name,
        inserted = stats.inserted,
        updated = stats.updated,
        skipped = stats.skipped_lines,
        "collected class listing"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use jartrack_core::models::service::ServiceSpec;
    use jartrack_db::open_memory_db;
    use jartrack_transport::{Listing, RemoteEntry};
    use std::path::Path;

    /// Transport double returning a canned listing.
    struct FakeTransport {
        entries: Vec<RemoteEntry>,
        malformed: usize,
        fail: bool,
    }

    impl Transport for FakeTransport {
        fn list(&self, _path: &str, _recursive: bool) -> Result<Listing, JartrackError> {
            if self.fail {
                return Err(JartrackError::Transport {
                    service: "test".to_string(),
                    message: "unreachable".to_string(),
                });
            }
            Ok(Listing {
                entries: self.entries.clone(),
                malformed: self.malformed,
            })
        }

        fn fetch(&self, _src: &str, _dst: &Path) -> Result<u64, JartrackError> {
            unimplemented!("not needed for listing tests")
        }
    }

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

    fn entry(path: &str, size: i64) -> RemoteEntry {
        RemoteEntry {
            path: path.to_string(),
            size,
            mtime: Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap()),
        }
    }

    #[test]
    fn test_third_party_classification() {
        let prefixes = vec!["dsop".to_string(), "tsm".to_string()];
        assert!(!is_third_party("dsop_api.jar", &prefixes));
        assert!(!is_third_party("TSM-core.jar", &prefixes));
        assert!(is_third_party("spring-web-5.3.9.jar", &prefixes));
    }

    #[test]
    fn test_derive_class_full_name() {
        assert_eq!(
            derive_class_full_name("com/x/Y.class").as_deref(),
            Some("com.x.Y")
        );
        assert_eq!(
            derive_class_full_name("com/x/Outer$Inner.class").as_deref(),
            Some("com.x.Outer$Inner")
        );
        assert_eq!(derive_class_full_name("README.txt"), None);
        assert_eq!(derive_class_full_name(".class"), None);
    }

    #[test]
    fn test_collect_jars_upserts() {
        let conn = open_memory_db().unwrap();
        let service = test_service("a");
        ops::insert_service(&conn, &service).unwrap();
        let prefixes = vec!["dsop".to_string()];

        let transport = FakeTransport {
            entries: vec![
                entry("dsop_api.jar", 1024),
                entry("spring-web.jar", 900),
                entry("notes.txt", 5),
            ],
            malformed: 1,
            fail: false,
        };
        let stats = collect_jars_for_service(&conn, &service, &transport, &prefixes).unwrap();
        assert_eq!(stats.inserted, 2);
        assert_eq!(stats.updated, 0);
        assert_eq!(stats.skipped_lines, 1);

        let jars = ops::list_jar_files_for_service(&conn, &service.id).unwrap();
        assert_eq!(jars.len(), 2);
        let api = jars.iter().find(|j| j.jar_name == "dsop_api.jar").unwrap();
        assert!(!api.is_third_party);
        let spring = jars.iter().find(|j| j.jar_name == "spring-web.jar").unwrap();
        assert!(spring.is_third_party);

        // Second pass with a grown file updates in place.
        let transport = FakeTransport {
            entries: vec![entry("dsop_api.jar", 2048)],
            malformed: 0,
            fail: false,
        };
        let stats = collect_jars_for_service(&conn, &service, &transport, &prefixes).unwrap();
        assert_eq!(stats.updated, 1);
        let api = ops::get_jar_file(&conn, &service.id, "dsop_api.jar")
            .unwrap()
            .unwrap();
        assert_eq!(api.file_size, 2048);
        assert_eq!(
            ops::list_jar_files_for_service(&conn, &service.id).unwrap().len(),
            2
        );
    }

    #[test]
    fn test_collect_classes_derives_names() {
        let conn = open_memory_db().unwrap();
        let service = test_service("a");
        ops::insert_service(&conn, &service).unwrap();

        let transport = FakeTransport {
            entries: vec![
                entry("com/x/Z.class", 512),
                entry("com/x/Outer$Inner.class", 128),
            ],
            malformed: 0,
            fail: false,
        };
        let stats = collect_classes_for_service(&conn, &service, &transport).unwrap();
        assert_eq!(stats.inserted, 2);

        let classes = ops::list_class_files_for_service(&conn, &service.id).unwrap();
        let names: Vec<_> = classes.iter().map(|c| c.class_full_name.as_str()).collect();
        assert_eq!(names, vec!["com.x.Outer$Inner", "com.x.Z"]);
    }

    #[test]
    fn test_transport_failure_leaves_rows_untouched() {
        let conn = open_memory_db().unwrap();
        let service = test_service("a");
        ops::insert_service(&conn, &service).unwrap();
        let prefixes = vec!["dsop".to_string()];

        let transport = FakeTransport {
            entries: vec![entry("dsop_api.jar", 1024)],
            malformed: 0,
            fail: false,
        };
        collect_jars_for_service(&conn, &service, &transport, &prefixes).unwrap();

        let failing = FakeTransport {
            entries: vec![],
            malformed: 0,
            fail: true,
        };
        let err = collect_jars_for_service(&conn, &service, &failing, &prefixes).unwrap_err();
        assert!(matches!(err, JartrackError::Transport { .. }));

        let jars = ops::list_jar_files_for_service(&conn, &service.id).unwrap();
        assert_eq!(jars.len(), 1);
        assert_eq!(jars[0].file_size, 1024);
    }
}
