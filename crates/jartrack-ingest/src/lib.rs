//! Source ingestion: walk decompile output trees, deduplicate `.java`
//! content into the source store, and wire up artifact links.

pub mod sweep;

use rusqlite::Connection;
use std::path::Path;
use walkdir::WalkDir;

use jartrack_core::error::JartrackError;
use jartrack_core::models::artifact::JarFile;
use jartrack_core::models::service::Service;
use jartrack_core::models::source::SourceVersion;
use jartrack_db::ops;

/// Directories holding retained binaries rather than decompiled output.
const MIRROR_DIRS: &[&str] = &["_jar", "_class"];

/// Composable ingestion selectors. Service selection happens in the caller;
/// these narrow within a service.
#[derive(Debug, Default, Clone)]
pub struct IngestFilter {
    pub jar_name: Option<String>,
    pub class_name: Option<String>,
    pub dry_run: bool,
}

/// Outcome of one ingestion pass.
#[derive(Debug, Default, Clone)]
pub struct IngestReport {
    pub files_seen: usize,
    pub versions_inserted: usize,
    pub versions_reused: usize,
    pub links_created: usize,
    pub class_pointers_set: usize,
    pub skipped: usize,
    /// Writes that would happen, populated in dry-run mode.
    pub planned: Vec<String>,
}

impl IngestReport {
    pub fn merge(&mut self, other: IngestReport) {
        self.files_seen += other.files_seen;
        self.versions_inserted += other.versions_inserted;
        self.versions_reused += other.versions_reused;
        self.links_created += other.links_created;
        self.class_pointers_set += other.class_pointers_set;
        self.skipped += other.skipped;
        self.planned.extend(other.planned);
    }
}

/// Ingest both decompile trees of one service.
pub fn ingest_service(
    conn: &Connection,
    service: &Service,
    filter: &IngestFilter,
) -> anyhow::Result<IngestReport> {
    let mut report = ingest_jar_tree(conn, service, filter)?;
    report.merge(ingest_class_tree(conn, service, filter)?);
    Ok(report)
}

/// Service name embedded in a `{YYYYMMDD}-{service}@{host}` directory name.
fn service_from_fragment_dir(name: &str) -> Option<&str> {
    let (_, rest) = name.split_once('-')?;
    Some(rest.split_once('@').map(|(service, _)| service).unwrap_or(rest))
}

/// Identity below a timestamp directory: drop `.java`, `/` becomes `.`.
fn identity_from_relative_path(rel: &Path) -> Option<String> {
    let joined = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    let stripped = joined.strip_suffix(".java")?;
    if stripped.is_empty() {
        return None;
    }
    Some(stripped.replace('/', "."))
}

fn matches_class_filter(filter: &IngestFilter, class_full_name: &str) -> bool {
    match &filter.class_name {
        Some(wanted) => wanted == class_full_name,
        None => true,
    }
}

fn sorted_subdirs(root: &Path) -> std::io::Result<Vec<std::fs::DirEntry>> {
    let mut dirs: Vec<_> = std::fs::read_dir(root)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .collect();
    dirs.sort_by_key(|e| e.file_name());
    Ok(dirs)
}

fn java_files_under(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut files: Vec<_> = WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "java"))
        .collect();
    files.sort();
    files
}

/// Read a decompiled source file, tolerating stray non-UTF-8 bytes the way
/// the decompiler sometimes emits them. NUL bytes mean the file is not text.
fn read_source(path: &Path) -> Result<(String, i64), JartrackError> {
    let bytes = std::fs::read(path)?;
    if bytes.contains(&0) {
        return Err(JartrackError::Encoding {
            what: path.display().to_string(),
        });
    }
    let size = bytes.len() as i64;
    Ok((String::from_utf8_lossy(&bytes).into_owned(), size))
}

fn ingest_jar_tree(
    conn: &Connection,
    service: &Service,
    filter: &IngestFilter,
) -> anyhow::Result<IngestReport> {
    let mut report = IngestReport::default();
    let root_str = service.render_path(&service.jar_decompile_output_dir)?;
    let root = Path::new(&root_str);
    if !root.is_dir() {
        tracing::warn!(service = %service.service_name, root = %root.display(), "jar decompile directory not found");
        return Ok(report);
    }

    let jars = ops::list_jar_files_for_service(conn, &service.id)?;

    for stem_entry in sorted_subdirs(root)? {
        let stem = stem_entry.file_name().to_string_lossy().to_string();
        if MIRROR_DIRS.contains(&stem.as_str()) {
            continue;
        }
        if let Some(wanted) = &filter.jar_name {
            if wanted.strip_suffix(".jar").unwrap_or(wanted.as_str()) != stem {
                continue;
            }
        }
        // The on-disk stem has no .jar extension; the stored name does.
        let Some(jar) = jars.iter().find(|j| j.stem() == stem) else {
            tracing::warn!(service = %service.service_name, stem = %stem, "no jar row for decompile directory");
            report.skipped += 1;
            continue;
        };

        for fragment_entry in sorted_subdirs(&stem_entry.path())? {
            let fragment = fragment_entry.file_name().to_string_lossy().to_string();
            match service_from_fragment_dir(&fragment) {
                Some(name) if name == service.service_name => {}
                _ => continue,
            }
            ingest_tree_files(
                conn,
                service,
                filter,
                &fragment_entry.path(),
                IngestTarget::Jar(jar),
                &mut report,
            )?;
        }
    }

    Ok(report)
}

fn ingest_class_tree(
    conn: &Connection,
    service: &Service,
    filter: &IngestFilter,
) -> anyhow::Result<IngestReport> {
    let mut report = IngestReport::default();
    // Class ingestion is pointless when a jar selector is in play.
    if filter.jar_name.is_some() {
        return Ok(report);
    }
    let root_str = service.render_path(&service.class_decompile_output_dir)?;
    let root = Path::new(&root_str);
    if !root.is_dir() {
        tracing::warn!(service = %service.service_name, root = %root.display(), "class decompile directory not found");
        return Ok(report);
    }

    for class_entry in sorted_subdirs(root)? {
        let class_dir = class_entry.file_name().to_string_lossy().to_string();
        if MIRROR_DIRS.contains(&class_dir.as_str()) {
            continue;
        }
        for fragment_entry in sorted_subdirs(&class_entry.path())? {
            let fragment = fragment_entry.file_name().to_string_lossy().to_string();
            match service_from_fragment_dir(&fragment) {
                Some(name) if name == service.service_name => {}
                _ => continue,
            }
            ingest_tree_files(
                conn,
                service,
                filter,
                &fragment_entry.path(),
                IngestTarget::Class,
                &mut report,
            )?;
        }
    }

    Ok(report)
}

enum IngestTarget<'a> {
    Jar(&'a JarFile),
    Class,
}

fn ingest_tree_files(
    conn: &Connection,
    service: &Service,
    filter: &IngestFilter,
    fragment_dir: &Path,
    target: IngestTarget,
    report: &mut IngestReport,
) -> anyhow::Result<()> {
    for file in java_files_under(fragment_dir) {
        let Some(class_full_name) = file
            .strip_prefix(fragment_dir)
            .ok()
            .and_then(identity_from_relative_path)
        else {
            continue;
        };
        if !matches_class_filter(filter, &class_full_name) {
            continue;
        }
        report.files_seen += 1;

        let (content, file_size) = match read_source(&file) {
            Ok(read) => read,
            Err(err) => {
                tracing::warn!(file = %file.display(), cause = %err, "skipping unreadable source file");
                report.skipped += 1;
                continue;
            }
        };

        if filter.dry_run {
            plan_file(conn, &class_full_name, &content, &target, report)?;
            continue;
        }

        let identity = ops::get_or_insert_identity(conn, &class_full_name)?;
        let candidate = SourceVersion::from_content(
            identity.id.clone(),
            Some(file.to_string_lossy().to_string()),
            &content,
            file_size,
        );
        let candidate_id = candidate.id.clone();
        let stored = ops::insert_or_get_source_version(conn, &candidate)?;
        if stored.id == candidate_id {
            report.versions_inserted += 1;
        } else {
            report.versions_reused += 1;
        }

        match &target {
            IngestTarget::Jar(jar) => {
                if ops::link_jar_source(conn, &jar.id, &stored.id)? {
                    report.links_created += 1;
                }
            }
            IngestTarget::Class => {
                if let Some(class) = ops::get_class_file(conn, &service.id, &class_full_name)? {
                    ops::set_class_source_version(conn, &class.id, &stored.id)?;
                    report.class_pointers_set += 1;
                } else {
                    tracing::warn!(class = %class_full_name, "no class row for decompiled source");
                    report.skipped += 1;
                }
            }
        }
    }
    Ok(())
}

fn plan_file(
    conn: &Connection,
    class_full_name: &str,
    content: &str,
    target: &IngestTarget,
    report: &mut IngestReport,
) -> anyhow::Result<()> {
    let normalized = jartrack_core::models::source::normalize_line_endings(content);
    let hash = jartrack_core::models::source::content_hash(&normalized);
    let exists = match ops::get_identity(conn, class_full_name)? {
        Some(identity) => ops::get_source_version(conn, &identity.id, &hash)?.is_some(),
        None => false,
    };
    let action = if exists { "reuse" } else { "insert" };
    let what = match target {
        IngestTarget::Jar(jar) => format!("link {} -> {class_full_name}", jar.jar_name),
        IngestTarget::Class => format!("point class {class_full_name}"),
    };
    report
        .planned
        .push(format!("{action} version {class_full_name} ({}); {what}", &hash[..12]));
    if exists {
        report.versions_reused += 1;
    } else {
        report.versions_inserted += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jartrack_core::models::artifact::ClassFile;
    use jartrack_core::models::service::{Service, ServiceSpec};
    use jartrack_db::open_memory_db;

    fn service_with_roots(name: &str, tmp: &Path) -> Service {
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
            jar_decompile_output_dir: tmp
                .join(format!("{name}/lib-decompile"))
                .to_string_lossy()
                .to_string(),
            class_decompile_output_dir: tmp
                .join(format!("{name}/classes-decompile"))
                .to_string_lossy()
                .to_string(),
            description: None,
        })
    }

    fn write_jar_source(service: &Service, stem: &str, class_path: &str, content: &str) {
        let dir = Path::new(&service.jar_decompile_output_dir)
            .join(stem)
            .join(format!("20240101-{}@{}", service.service_name, service.host));
        let file = dir.join(class_path);
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(file, content).unwrap();
    }

    #[test]
    fn test_identity_from_relative_path() {
        assert_eq!(
            identity_from_relative_path(Path::new("com/x/Y.java")).as_deref(),
            Some("com.x.Y")
        );
        assert_eq!(identity_from_relative_path(Path::new("notes.txt")), None);
    }

    #[test]
    fn test_service_from_fragment_dir() {
        assert_eq!(
            service_from_fragment_dir("20240101-gateway@10.0.0.1"),
            Some("gateway")
        );
        assert_eq!(service_from_fragment_dir("20240101-core"), Some("core"));
        assert_eq!(service_from_fragment_dir("junk"), None);
    }

    #[test]
    fn test_ingest_jar_tree_dedups_and_links() {
        let tmp = tempfile::tempdir().unwrap();
        let conn = open_memory_db().unwrap();

        let a = service_with_roots("a", tmp.path());
        let b = service_with_roots("b", tmp.path());
        ops::insert_service(&conn, &a).unwrap();
        ops::insert_service(&conn, &b).unwrap();

        let jar_a = JarFile::new(a.id.clone(), "dsop_api.jar".to_string(), 1024, None, false);
        let jar_b = JarFile::new(b.id.clone(), "dsop_api.jar".to_string(), 1024, None, false);
        ops::insert_jar_file(&conn, &jar_a).unwrap();
        ops::insert_jar_file(&conn, &jar_b).unwrap();

        let content = "package com.x;\nclass Y {}\n";
        write_jar_source(&a, "dsop_api", "com/x/Y.java", content);
        write_jar_source(&b, "dsop_api", "com/x/Y.java", content);

        let filter = IngestFilter::default();
        let report_a = ingest_service(&conn, &a, &filter).unwrap();
        assert_eq!(report_a.versions_inserted, 1);
        assert_eq!(report_a.links_created, 1);

        // Identical content from the second service reuses the blob.
        let report_b = ingest_service(&conn, &b, &filter).unwrap();
        assert_eq!(report_b.versions_inserted, 0);
        assert_eq!(report_b.versions_reused, 1);
        assert_eq!(report_b.links_created, 1);

        let identity = ops::get_identity(&conn, "com.x.Y").unwrap().unwrap();
        assert_eq!(
            ops::list_versions_for_identity(&conn, &identity.id).unwrap().len(),
            1
        );
    }

    #[test]
    fn test_ingest_skips_foreign_service_fragments() {
        let tmp = tempfile::tempdir().unwrap();
        let conn = open_memory_db().unwrap();
        let a = service_with_roots("a", tmp.path());
        ops::insert_service(&conn, &a).unwrap();
        let jar = JarFile::new(a.id.clone(), "dsop_api.jar".to_string(), 1024, None, false);
        ops::insert_jar_file(&conn, &jar).unwrap();

        // Fragment directory of some other service inside a's tree.
        let dir = Path::new(&a.jar_decompile_output_dir)
            .join("dsop_api")
            .join("20240101-other@10.0.0.2/com/x");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("Y.java"), "class Y {}").unwrap();

        let report = ingest_service(&conn, &a, &IngestFilter::default()).unwrap();
        assert_eq!(report.files_seen, 0);
    }

    #[test]
    fn test_ingest_class_tree_sets_pointer() {
        let tmp = tempfile::tempdir().unwrap();
        let conn = open_memory_db().unwrap();
        let a = service_with_roots("a", tmp.path());
        ops::insert_service(&conn, &a).unwrap();

        let class = ClassFile::new(a.id.clone(), "com.x.Z".to_string(), 512, None);
        ops::insert_class_file(&conn, &class).unwrap();

        let dir = Path::new(&a.class_decompile_output_dir)
            .join("com.x.Z")
            .join(format!("20240301-{}@{}", a.service_name, a.host))
            .join("com/x");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("Z.java"), "package com.x;\nclass Z {}\n").unwrap();

        let report = ingest_service(&conn, &a, &IngestFilter::default()).unwrap();
        assert_eq!(report.class_pointers_set, 1);

        let stored = ops::get_class_file(&conn, &a.id, "com.x.Z").unwrap().unwrap();
        let version_id = stored.java_source_file_version_id.unwrap();
        let version = ops::get_source_version_by_id(&conn, &version_id)
            .unwrap()
            .unwrap();
        let identity = ops::get_identity(&conn, "com.x.Z").unwrap().unwrap();
        assert_eq!(version.java_source_file_id, identity.id);
    }

    #[test]
    fn test_dry_run_reports_without_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let conn = open_memory_db().unwrap();
        let a = service_with_roots("a", tmp.path());
        ops::insert_service(&conn, &a).unwrap();
        let jar = JarFile::new(a.id.clone(), "dsop_api.jar".to_string(), 1024, None, false);
        ops::insert_jar_file(&conn, &jar).unwrap();
        write_jar_source(&a, "dsop_api", "com/x/Y.java", "class Y {}");

        let filter = IngestFilter {
            dry_run: true,
            ..IngestFilter::default()
        };
        let report = ingest_service(&conn, &a, &filter).unwrap();
        assert_eq!(report.planned.len(), 1);
        assert!(report.planned[0].contains("com.x.Y"));
        assert!(ops::get_identity(&conn, "com.x.Y").unwrap().is_none());
    }

    #[test]
    fn test_jar_name_selector_narrows() {
        let tmp = tempfile::tempdir().unwrap();
        let conn = open_memory_db().unwrap();
        let a = service_with_roots("a", tmp.path());
        ops::insert_service(&conn, &a).unwrap();
        for name in ["dsop_api.jar", "dsop_web.jar"] {
            let jar = JarFile::new(a.id.clone(), name.to_string(), 1024, None, false);
            ops::insert_jar_file(&conn, &jar).unwrap();
        }
        write_jar_source(&a, "dsop_api", "com/x/A.java", "class A {}");
        write_jar_source(&a, "dsop_web", "com/x/B.java", "class B {}");

        let filter = IngestFilter {
            jar_name: Some("dsop_api.jar".to_string()),
            ..IngestFilter::default()
        };
        let report = ingest_service(&conn, &a, &filter).unwrap();
        assert_eq!(report.files_seen, 1);
        assert!(ops::get_identity(&conn, "com.x.A").unwrap().is_some());
        assert!(ops::get_identity(&conn, "com.x.B").unwrap().is_none());
    }
}
