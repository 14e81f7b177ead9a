/// SQL statements for creating the jartrack database schema.

pub const CREATE_SCHEMA_VERSION: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version     INTEGER PRIMARY KEY,
    applied_at  TEXT NOT NULL
)";

pub const CREATE_SERVICES: &str = "
CREATE TABLE IF NOT EXISTS services (
    id                          TEXT PRIMARY KEY,
    service_name                TEXT NOT NULL,
    environment                 TEXT NOT NULL DEFAULT 'production',
    host                        TEXT NOT NULL DEFAULT '',
    port                        INTEGER NOT NULL DEFAULT 22,
    username                    TEXT NOT NULL DEFAULT '',
    password                    TEXT NOT NULL DEFAULT '',
    server_base_path            TEXT NOT NULL DEFAULT '',
    jar_path                    TEXT NOT NULL,
    classes_path                TEXT NOT NULL,
    jar_decompile_output_dir    TEXT NOT NULL,
    class_decompile_output_dir  TEXT NOT NULL,
    description                 TEXT,
    created_at                  TEXT NOT NULL,
    updated_at                  TEXT NOT NULL,
    UNIQUE (service_name, environment)
)";

pub const CREATE_JAR_FILES: &str = "
CREATE TABLE IF NOT EXISTS jar_files (
    id              TEXT PRIMARY KEY,
    service_id      TEXT NOT NULL,
    jar_name        TEXT NOT NULL,
    file_size       INTEGER NOT NULL,
    last_modified   TEXT,
    is_third_party  INTEGER NOT NULL DEFAULT 0,
    file_path       TEXT,
    decompile_path  TEXT,
    version_no      INTEGER,
    last_version_no INTEGER,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL,
    UNIQUE (service_id, jar_name),
    FOREIGN KEY (service_id) REFERENCES services(id) ON DELETE CASCADE
)";

pub const CREATE_CLASS_FILES: &str = "
CREATE TABLE IF NOT EXISTS class_files (
    id                          TEXT PRIMARY KEY,
    service_id                  TEXT NOT NULL,
    class_full_name             TEXT NOT NULL,
    file_size                   INTEGER NOT NULL,
    last_modified               TEXT,
    file_path                   TEXT,
    decompile_path              TEXT,
    java_source_file_version_id TEXT,
    version_no                  INTEGER,
    last_version_no             INTEGER,
    created_at                  TEXT NOT NULL,
    updated_at                  TEXT NOT NULL,
    UNIQUE (service_id, class_full_name),
    FOREIGN KEY (service_id) REFERENCES services(id) ON DELETE CASCADE,
    FOREIGN KEY (java_source_file_version_id)
        REFERENCES java_source_file_versions(id) ON DELETE SET NULL
)";

pub const CREATE_JAVA_SOURCE_FILES: &str = "
CREATE TABLE IF NOT EXISTS java_source_files (
    id              TEXT PRIMARY KEY,
    class_full_name TEXT NOT NULL UNIQUE,
    created_at      TEXT NOT NULL
)";

pub const CREATE_JAVA_SOURCE_FILE_VERSIONS: &str = "
CREATE TABLE IF NOT EXISTS java_source_file_versions (
    id                  TEXT PRIMARY KEY,
    java_source_file_id TEXT NOT NULL,
    version_labels      TEXT NOT NULL DEFAULT '[]',
    file_path           TEXT,
    file_content        TEXT NOT NULL,
    file_size           INTEGER NOT NULL,
    file_hash           TEXT NOT NULL,
    line_count          INTEGER NOT NULL,
    created_at          TEXT NOT NULL,
    updated_at          TEXT NOT NULL,
    UNIQUE (java_source_file_id, file_hash),
    FOREIGN KEY (java_source_file_id)
        REFERENCES java_source_files(id) ON DELETE CASCADE
)";

pub const CREATE_JAVA_SOURCE_IN_JAR_FILES: &str = "
CREATE TABLE IF NOT EXISTS java_source_in_jar_files (
    jar_file_id                 TEXT NOT NULL,
    java_source_file_version_id TEXT NOT NULL,
    created_at                  TEXT NOT NULL,
    PRIMARY KEY (jar_file_id, java_source_file_version_id),
    FOREIGN KEY (jar_file_id) REFERENCES jar_files(id) ON DELETE CASCADE,
    FOREIGN KEY (java_source_file_version_id)
        REFERENCES java_source_file_versions(id) ON DELETE CASCADE
)";

pub const CREATE_DIFF_CACHE: &str = "
CREATE TABLE IF NOT EXISTS diff_cache (
    id                TEXT PRIMARY KEY,
    artifact_kind     TEXT NOT NULL,
    artifact_name     TEXT NOT NULL,
    from_version      INTEGER NOT NULL,
    to_version        INTEGER NOT NULL,
    file_path         TEXT NOT NULL,
    change_type       TEXT NOT NULL,
    additions         INTEGER NOT NULL DEFAULT 0,
    deletions         INTEGER NOT NULL DEFAULT 0,
    change_percentage REAL NOT NULL DEFAULT 0,
    size_before       INTEGER NOT NULL DEFAULT 0,
    size_after        INTEGER NOT NULL DEFAULT 0,
    unified_diff      TEXT NOT NULL DEFAULT '',
    created_at        TEXT NOT NULL,
    UNIQUE (artifact_kind, artifact_name, from_version, to_version, file_path)
)";

pub const CREATE_DIFF_SUMMARIES: &str = "
CREATE TABLE IF NOT EXISTS diff_summaries (
    artifact_kind TEXT NOT NULL,
    artifact_name TEXT NOT NULL,
    from_version  INTEGER NOT NULL,
    to_version    INTEGER NOT NULL,
    total_files   INTEGER NOT NULL DEFAULT 0,
    files_changed INTEGER NOT NULL DEFAULT 0,
    insertions    INTEGER NOT NULL DEFAULT 0,
    deletions     INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,
    PRIMARY KEY (artifact_kind, artifact_name, from_version, to_version)
)";

pub const CREATE_INDEXES: &str = "
CREATE INDEX IF NOT EXISTS idx_jar_files_name ON jar_files(jar_name);
CREATE INDEX IF NOT EXISTS idx_class_files_name ON class_files(class_full_name);
CREATE INDEX IF NOT EXISTS idx_source_versions_hash ON java_source_file_versions(file_hash);
";
