//! Diff service: per-file unified diffs between two versions of one
//! artifact, memoized in the store.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use similar::{ChangeTag, TextDiff};
use std::collections::BTreeMap;

use jartrack_core::error::JartrackError;
use jartrack_core::models::artifact::ArtifactKind;
use jartrack_core::models::diff::{
    ChangeType, DiffSummary, FileChange, FileDiff, VersionDiff,
};
use jartrack_core::models::source::SourceVersion;
use jartrack_db::ops;
use jartrack_db::query::{self, ResolvedSource};

/// Compute (or serve from cache) the diff between two versions of the same
/// artifact. `file_path` narrows the returned set to a single file;
/// `include_unchanged` exposes unchanged pairs instead of omitting them.
pub fn diff(
    conn: &Connection,
    kind: ArtifactKind,
    name: &str,
    from_version: i64,
    to_version: i64,
    file_path: Option<&str>,
    include_unchanged: bool,
) -> anyhow::Result<VersionDiff> {
    ensure_version_exists(conn, kind, name, from_version)?;
    ensure_version_exists(conn, kind, name, to_version)?;

    let from_set = query::resolve_version_set(conn, kind, name, from_version)?;
    let to_set = query::resolve_version_set(conn, kind, name, to_version)?;

    let kind_str = kind.to_string();
    if let Some((summary, cached_at)) =
        ops::get_diff_summary(conn, &kind_str, name, from_version, to_version)?
    {
        if fresh(&from_set, &to_set, cached_at) {
            tracing::debug!(artifact = name, from_version, to_version, "serving cached diff");
            let files = ops::list_diff_files(conn, &kind_str, name, from_version, to_version)?;
            return Ok(assemble(
                from_version,
                to_version,
                files,
                summary,
                file_path,
                include_unchanged,
            ));
        }
        tracing::debug!(artifact = name, from_version, to_version, "cached diff is stale, recomputing");
    }

    let files = compute_files(&from_set, &to_set);
    let summary = summarize(&files);
    ops::replace_diff(conn, &kind_str, name, from_version, to_version, &files, &summary)?;

    Ok(assemble(
        from_version,
        to_version,
        files,
        summary,
        file_path,
        include_unchanged,
    ))
}

fn ensure_version_exists(
    conn: &Connection,
    kind: ArtifactKind,
    name: &str,
    version_no: i64,
) -> anyhow::Result<()> {
    let sql = match kind {
        ArtifactKind::Jar => "SELECT COUNT(*) FROM jar_files WHERE jar_name = ?1 AND version_no = ?2",
        ArtifactKind::Class => {
            "SELECT COUNT(*) FROM class_files WHERE class_full_name = ?1 AND version_no = ?2"
        }
    };
    let count: i64 = conn.query_row(sql, rusqlite::params![name, version_no], |row| row.get(0))?;
    if count == 0 {
        return Err(JartrackError::VersionNotFound {
            kind: kind.to_string(),
            name: name.to_string(),
            version: version_no,
        }
        .into());
    }
    Ok(())
}

/// A cache row is valid only while neither endpoint version has been touched
/// after it was written.
fn fresh(from_set: &[ResolvedSource], to_set: &[ResolvedSource], cached_at: DateTime<Utc>) -> bool {
    from_set
        .iter()
        .chain(to_set.iter())
        .all(|r| r.version.updated_at <= cached_at)
}

fn compute_files(from_set: &[ResolvedSource], to_set: &[ResolvedSource]) -> Vec<(FileChange, String)> {
    let from_files: BTreeMap<&str, &SourceVersion> = from_set
        .iter()
        .map(|r| (r.class_full_name.as_str(), &r.version))
        .collect();
    let to_files: BTreeMap<&str, &SourceVersion> = to_set
        .iter()
        .map(|r| (r.class_full_name.as_str(), &r.version))
        .collect();

    let mut names: Vec<&str> = from_files.keys().chain(to_files.keys()).copied().collect();
    names.sort();
    names.dedup();

    let mut files = Vec::new();
    for file in names {
        let entry = match (from_files.get(file), to_files.get(file)) {
            (None, Some(to)) => {
                let additions = to.line_count;
                (
                    FileChange {
                        file_path: file.to_string(),
                        change_type: ChangeType::Added,
                        additions,
                        deletions: 0,
                        change_percentage: percentage(additions, 0, 0, to.line_count),
                        size_before: 0,
                        size_after: to.file_size,
                    },
                    String::new(),
                )
            }
            (Some(from), None) => {
                let deletions = from.line_count;
                (
                    FileChange {
                        file_path: file.to_string(),
                        change_type: ChangeType::Deleted,
                        additions: 0,
                        deletions,
                        change_percentage: percentage(0, deletions, from.line_count, 0),
                        size_before: from.file_size,
                        size_after: 0,
                    },
                    String::new(),
                )
            }
            (Some(from), Some(to)) if from.file_hash == to.file_hash => (
                FileChange {
                    file_path: file.to_string(),
                    change_type: ChangeType::Unchanged,
                    additions: 0,
                    deletions: 0,
                    change_percentage: 0.0,
                    size_before: from.file_size,
                    size_after: to.file_size,
                },
                String::new(),
            ),
            (Some(from), Some(to)) => {
                let (additions, deletions, unified) = unified_diff(file, from, to);
                (
                    FileChange {
                        file_path: file.to_string(),
                        change_type: ChangeType::Modified,
                        additions,
                        deletions,
                        change_percentage: percentage(
                            additions,
                            deletions,
                            from.line_count,
                            to.line_count,
                        ),
                        size_before: from.file_size,
                        size_after: to.file_size,
                    },
                    unified,
                )
            }
            (None, None) => continue,
        };
        files.push(entry);
    }
    files
}

/// Line-level unified diff with 3 lines of context, plus the insert/delete
/// line counts.
fn unified_diff(file: &str, from: &SourceVersion, to: &SourceVersion) -> (i64, i64, String) {
    let diff = TextDiff::from_lines(&from.file_content, &to.file_content);

    let mut additions = 0i64;
    let mut deletions = 0i64;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => additions += 1,
            ChangeTag::Delete => deletions += 1,
            ChangeTag::Equal => {}
        }
    }

    let rel = file.replace('.', "/");
    let unified = diff
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{rel}.java"), &format!("b/{rel}.java"))
        .to_string();

    (additions, deletions, unified)
}

/// `(additions + deletions) / max(lines_before, lines_after, 1) × 100`,
/// rounded to one decimal.
fn percentage(additions: i64, deletions: i64, lines_before: i64, lines_after: i64) -> f64 {
    let denominator = lines_before.max(lines_after).max(1) as f64;
    let raw = (additions + deletions) as f64 / denominator * 100.0;
    (raw * 10.0).round() / 10.0
}

fn summarize(files: &[(FileChange, String)]) -> DiffSummary {
    let changed: Vec<&FileChange> = files
        .iter()
        .map(|(change, _)| change)
        .filter(|c| c.change_type != ChangeType::Unchanged)
        .collect();
    let insertions: i64 = changed.iter().map(|c| c.additions).sum();
    let deletions: i64 = changed.iter().map(|c| c.deletions).sum();
    DiffSummary {
        total_files: files.len() as i64,
        files_changed: changed.len() as i64,
        insertions,
        deletions,
        net_change: insertions - deletions,
    }
}

fn assemble(
    from_version: i64,
    to_version: i64,
    files: Vec<(FileChange, String)>,
    summary: DiffSummary,
    file_path: Option<&str>,
    include_unchanged: bool,
) -> VersionDiff {
    let mut file_changes = Vec::new();
    let mut file_diffs = Vec::new();
    for (change, unified) in files {
        if let Some(wanted) = file_path {
            if change.file_path != wanted {
                continue;
            }
        }
        if change.change_type == ChangeType::Unchanged && !include_unchanged {
            continue;
        }
        if !unified.is_empty() {
            file_diffs.push(FileDiff {
                file_path: change.file_path.clone(),
                unified_diff: unified,
            });
        }
        file_changes.push(change);
    }
    VersionDiff {
        from_version,
        to_version,
        file_changes,
        summary,
        file_diffs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jartrack_core::models::artifact::JarFile;
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

    /// Two versions of foo.jar: v1 ships `com.x.Y` and `com.x.Common`, v2
    /// modifies `Y`, keeps `Common` byte-identical, and adds `New`.
    fn fixture(conn: &Connection) {
        let a = test_service("a");
        let c = test_service("c");
        ops::insert_service(conn, &a).unwrap();
        ops::insert_service(conn, &c).unwrap();

        let mut jar_v1 = JarFile::new(a.id.clone(), "foo.jar".to_string(), 1024, None, false);
        jar_v1.version_no = Some(1);
        let mut jar_v2 = JarFile::new(c.id.clone(), "foo.jar".to_string(), 2048, None, false);
        jar_v2.version_no = Some(2);
        ops::insert_jar_file(conn, &jar_v1).unwrap();
        ops::insert_jar_file(conn, &jar_v2).unwrap();

        let y = ops::get_or_insert_identity(conn, "com.x.Y").unwrap();
        let y1 = ops::insert_or_get_source_version(
            conn,
            &SourceVersion::from_content(y.id.clone(), None, "package com.x;\nclass Y {}\n", 27),
        )
        .unwrap();
        let y2 = ops::insert_or_get_source_version(
            conn,
            &SourceVersion::from_content(
                y.id.clone(),
                None,
                "package com.x;\nclass Y { int n; }\n",
                34,
            ),
        )
        .unwrap();

        let common = ops::get_or_insert_identity(conn, "com.x.Common").unwrap();
        let shared = ops::insert_or_get_source_version(
            conn,
            &SourceVersion::from_content(common.id.clone(), None, "class Common {}\n", 16),
        )
        .unwrap();

        let new = ops::get_or_insert_identity(conn, "com.x.New").unwrap();
        let added = ops::insert_or_get_source_version(
            conn,
            &SourceVersion::from_content(new.id.clone(), None, "class New {}\n", 13),
        )
        .unwrap();

        ops::link_jar_source(conn, &jar_v1.id, &y1.id).unwrap();
        ops::link_jar_source(conn, &jar_v1.id, &shared.id).unwrap();
        ops::link_jar_source(conn, &jar_v2.id, &y2.id).unwrap();
        ops::link_jar_source(conn, &jar_v2.id, &shared.id).unwrap();
        ops::link_jar_source(conn, &jar_v2.id, &added.id).unwrap();
    }

    #[test]
    fn test_diff_classifies_changes() {
        let conn = open_memory_db().unwrap();
        fixture(&conn);

        let result = diff(&conn, ArtifactKind::Jar, "foo.jar", 1, 2, None, false).unwrap();
        assert_eq!(result.summary.files_changed, 2);
        assert_eq!(result.summary.total_files, 3);

        let by_path: BTreeMap<&str, &FileChange> = result
            .file_changes
            .iter()
            .map(|c| (c.file_path.as_str(), c))
            .collect();
        assert_eq!(by_path["com.x.Y"].change_type, ChangeType::Modified);
        assert_eq!(by_path["com.x.Y"].additions, 1);
        assert_eq!(by_path["com.x.Y"].deletions, 1);
        assert_eq!(by_path["com.x.New"].change_type, ChangeType::Added);
        assert!(!by_path.contains_key("com.x.Common"));

        let unified = &result
            .file_diffs
            .iter()
            .find(|d| d.file_path == "com.x.Y")
            .unwrap()
            .unified_diff;
        assert!(unified.contains("@@"));
        assert!(unified.contains("-class Y {}"));
        assert!(unified.contains("+class Y { int n; }"));
    }

    #[test]
    fn test_unchanged_exposed_on_request() {
        let conn = open_memory_db().unwrap();
        fixture(&conn);

        let result = diff(&conn, ArtifactKind::Jar, "foo.jar", 1, 2, None, true).unwrap();
        let common = result
            .file_changes
            .iter()
            .find(|c| c.file_path == "com.x.Common")
            .unwrap();
        assert_eq!(common.change_type, ChangeType::Unchanged);
    }

    #[test]
    fn test_identical_versions_yield_empty_summary() {
        let conn = open_memory_db().unwrap();
        fixture(&conn);

        let result = diff(&conn, ArtifactKind::Jar, "foo.jar", 1, 1, None, false).unwrap();
        assert_eq!(result.summary.files_changed, 0);
        assert_eq!(result.summary.insertions, 0);
        assert_eq!(result.summary.deletions, 0);
        assert!(result.file_diffs.is_empty());
    }

    #[test]
    fn test_unknown_version_is_an_error() {
        let conn = open_memory_db().unwrap();
        fixture(&conn);
        assert!(diff(&conn, ArtifactKind::Jar, "foo.jar", 1, 9, None, false).is_err());
    }

    #[test]
    fn test_cache_roundtrip_is_identical() {
        let conn = open_memory_db().unwrap();
        fixture(&conn);

        let first = diff(&conn, ArtifactKind::Jar, "foo.jar", 1, 2, None, false).unwrap();
        assert!(
            ops::get_diff_summary(&conn, "jar", "foo.jar", 1, 2)
                .unwrap()
                .is_some()
        );

        let second = diff(&conn, ArtifactKind::Jar, "foo.jar", 1, 2, None, false).unwrap();
        assert_eq!(first.summary, second.summary);
        assert_eq!(
            first
                .file_diffs
                .iter()
                .map(|d| d.unified_diff.as_str())
                .collect::<Vec<_>>(),
            second
                .file_diffs
                .iter()
                .map(|d| d.unified_diff.as_str())
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_stale_cache_recomputed_after_endpoint_touch() {
        let conn = open_memory_db().unwrap();
        fixture(&conn);

        diff(&conn, ArtifactKind::Jar, "foo.jar", 1, 2, None, false).unwrap();
        let (_, first_cached_at) = ops::get_diff_summary(&conn, "jar", "foo.jar", 1, 2)
            .unwrap()
            .unwrap();

        // Touch one endpoint version after the cache row was written.
        let later = (first_cached_at + chrono::Duration::seconds(60)).to_rfc3339();
        conn.execute(
            "UPDATE java_source_file_versions SET updated_at = ?1",
            rusqlite::params![later],
        )
        .unwrap();

        diff(&conn, ArtifactKind::Jar, "foo.jar", 1, 2, None, false).unwrap();
        let (_, second_cached_at) = ops::get_diff_summary(&conn, "jar", "foo.jar", 1, 2)
            .unwrap()
            .unwrap();
        assert!(second_cached_at > first_cached_at);
    }

    #[test]
    fn test_file_path_narrows_result() {
        let conn = open_memory_db().unwrap();
        fixture(&conn);

        let result =
            diff(&conn, ArtifactKind::Jar, "foo.jar", 1, 2, Some("com.x.Y"), false).unwrap();
        assert_eq!(result.file_changes.len(), 1);
        assert_eq!(result.file_changes[0].file_path, "com.x.Y");
        // Summary still covers the whole version pair.
        assert_eq!(result.summary.files_changed, 2);
    }
}
