//! Service registry sync: declarative JSON document → `services` rows.

use std::collections::HashSet;
use std::path::Path;

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use jartrack_core::error::JartrackError;
use jartrack_core::models::service::{Service, ServiceSpec};
use jartrack_db::ops;

#[derive(Debug, Serialize, Deserialize)]
struct ConfigDoc {
    services: Vec<ServiceSpec>,
}

/// Outcome of one registry load. The registry never deletes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Load a config document into the registry.
///
/// A duplicate `(service_name, environment)` within the input is a
/// configuration error and aborts before anything is written; all writes
/// for a valid document happen in one transaction.
pub fn load_services(conn: &Connection, document: &str) -> Result<LoadReport, JartrackError> {
    let doc: ConfigDoc = serde_json::from_str(document).map_err(|e| JartrackError::Config {
        message: format!("invalid config document: {e}"),
    })?;

    let mut seen = HashSet::new();
    for spec in &doc.services {
        validate_spec(spec)?;
        if !seen.insert((spec.service_name.clone(), spec.environment.clone())) {
            return Err(JartrackError::Config {
                message: format!(
                    "duplicate service in input: {} ({})",
                    spec.service_name, spec.environment
                ),
            });
        }
    }

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| JartrackError::Database(e.to_string()))?;

    let mut report = LoadReport::default();
    for spec in doc.services {
        let existing = ops::get_service(&tx, &spec.service_name, &spec.environment)
            .map_err(|e| JartrackError::Database(e.to_string()))?;
        match existing {
            Some(current) => {
                if spec_matches(&current, &spec) {
                    report.skipped += 1;
                    continue;
                }
                let mut updated = current;
                apply_spec(&mut updated, spec);
                ops::update_service(&tx, &updated)
                    .map_err(|e| JartrackError::Database(e.to_string()))?;
                tracing::info!(service = %updated.service_name, environment = %updated.environment, "updated service");
                report.updated += 1;
            }
            None => {
                let service = Service::from_spec(spec);
                ops::insert_service(&tx, &service)
                    .map_err(|e| JartrackError::Database(e.to_string()))?;
                tracing::info!(service = %service.service_name, environment = %service.environment, "registered service");
                report.inserted += 1;
            }
        }
    }

    tx.commit()
        .map_err(|e| JartrackError::Database(e.to_string()))?;
    Ok(report)
}

fn validate_spec(spec: &ServiceSpec) -> Result<(), JartrackError> {
    let required = [
        ("service_name", &spec.service_name),
        ("jar_path", &spec.jar_path),
        ("classes_path", &spec.classes_path),
        ("jar_decompile_output_dir", &spec.jar_decompile_output_dir),
        (
            "class_decompile_output_dir",
            &spec.class_decompile_output_dir,
        ),
    ];
    for (field, value) in required {
        if value.is_empty() {
            return Err(JartrackError::Config {
                message: format!(
                    "service '{}': required field '{}' is missing or empty",
                    spec.service_name, field
                ),
            });
        }
    }
    Ok(())
}

fn spec_matches(service: &Service, spec: &ServiceSpec) -> bool {
    service.host == spec.host
        && service.port == spec.port
        && service.username == spec.username
        && service.password == spec.password
        && service.server_base_path == spec.server_base_path
        && service.jar_path == spec.jar_path
        && service.classes_path == spec.classes_path
        && service.jar_decompile_output_dir == spec.jar_decompile_output_dir
        && service.class_decompile_output_dir == spec.class_decompile_output_dir
        && service.description == spec.description
}

fn apply_spec(service: &mut Service, spec: ServiceSpec) {
    service.host = spec.host;
    service.port = spec.port;
    service.username = spec.username;
    service.password = spec.password;
    service.server_base_path = spec.server_base_path;
    service.jar_path = spec.jar_path;
    service.classes_path = spec.classes_path;
    service.jar_decompile_output_dir = spec.jar_decompile_output_dir;
    service.class_decompile_output_dir = spec.class_decompile_output_dir;
    service.description = spec.description;
}

/// Write a sample config document for operators to fill in.
pub fn create_sample_config(path: &Path) -> Result<(), JartrackError> {
    let sample = ConfigDoc {
        services: vec![
            ServiceSpec {
                service_name: "dsop_gateway".to_string(),
                environment: "production".to_string(),
                host: "10.20.151.32".to_string(),
                port: 22,
                username: String::new(),
                password: String::new(),
                server_base_path: "/app/apprun/tomcat_server/webapps/dsop_gateway/WEB-INF"
                    .to_string(),
                jar_path: "work/prod/lib-download/{service_name}{server_base_path}/lib"
                    .to_string(),
                classes_path:
                    "work/prod/classes-download/{service_name}{server_base_path}/classes"
                        .to_string(),
                jar_decompile_output_dir: "work/prod/lib-decompile".to_string(),
                class_decompile_output_dir: "work/prod/classes-decompile".to_string(),
                description: Some("DSOP Gateway Service".to_string()),
            },
            ServiceSpec {
                service_name: "dsop_core".to_string(),
                environment: "production".to_string(),
                host: "10.20.151.2".to_string(),
                port: 22,
                username: String::new(),
                password: String::new(),
                server_base_path: "/app/apprun/tomcat_server/webapps/dsop_core/WEB-INF"
                    .to_string(),
                jar_path: "work/prod/lib-download/{service_name}{server_base_path}/lib"
                    .to_string(),
                classes_path:
                    "work/prod/classes-download/{service_name}{server_base_path}/classes"
                        .to_string(),
                jar_decompile_output_dir: "work/prod/lib-decompile".to_string(),
                class_decompile_output_dir: "work/prod/classes-decompile".to_string(),
                description: Some("DSOP Core Service".to_string()),
            },
        ],
    };
    let content = serde_json::to_string_pretty(&sample)
        .map_err(|e| JartrackError::Serialization(e.to_string()))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jartrack_db::open_memory_db;

    fn doc(host_a: &str) -> String {
        format!(
            r#"{{"services": [
                {{"service_name": "a", "host": "{host_a}",
                  "jar_path": "lib", "classes_path": "classes",
                  "jar_decompile_output_dir": "out/lib",
                  "class_decompile_output_dir": "out/classes"}},
                {{"service_name": "b", "host": "10.0.0.2",
                  "jar_path": "lib", "classes_path": "classes",
                  "jar_decompile_output_dir": "out/lib",
                  "class_decompile_output_dir": "out/classes"}}
            ]}}"#
        )
    }

    #[test]
    fn test_load_inserts_then_skips_then_updates() {
        let conn = open_memory_db().unwrap();

        let report = load_services(&conn, &doc("10.0.0.1")).unwrap();
        assert_eq!(report, LoadReport { inserted: 2, updated: 0, skipped: 0 });

        // Identical input: everything skips.
        let report = load_services(&conn, &doc("10.0.0.1")).unwrap();
        assert_eq!(report, LoadReport { inserted: 0, updated: 0, skipped: 2 });

        // Changed host: one update, one skip.
        let report = load_services(&conn, &doc("10.0.0.9")).unwrap();
        assert_eq!(report, LoadReport { inserted: 0, updated: 1, skipped: 1 });

        let stored = ops::get_service(&conn, "a", "production").unwrap().unwrap();
        assert_eq!(stored.host, "10.0.0.9");
    }

    #[test]
    fn test_duplicate_input_aborts_without_writes() {
        let conn = open_memory_db().unwrap();
        let document = r#"{"services": [
            {"service_name": "a", "jar_path": "lib", "classes_path": "classes",
             "jar_decompile_output_dir": "o", "class_decompile_output_dir": "o"},
            {"service_name": "a", "jar_path": "lib", "classes_path": "classes",
             "jar_decompile_output_dir": "o", "class_decompile_output_dir": "o"}
        ]}"#;
        let err = load_services(&conn, document).unwrap_err();
        assert!(matches!(err, JartrackError::Config { .. }));
        assert!(ops::list_services(&conn).unwrap().is_empty());
    }

    #[test]
    fn test_missing_required_field_is_config_error() {
        let conn = open_memory_db().unwrap();
        let document = r#"{"services": [{"service_name": "a"}]}"#;
        let err = load_services(&conn, document).unwrap_err();
        assert!(matches!(err, JartrackError::Config { .. }));
    }

    #[test]
    fn test_sample_config_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("services.json");
        create_sample_config(&path).unwrap();

        let conn = open_memory_db().unwrap();
        let document = std::fs::read_to_string(&path).unwrap();
        let report = load_services(&conn, &document).unwrap();
        assert_eq!(report.inserted, 2);
    }
}
