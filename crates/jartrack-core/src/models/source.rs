use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use uuid::Uuid;

use super::artifact::JarFileId;

/// Unique identifier for a source identity (a fully-qualified class name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceIdentityId(pub Uuid);

impl SourceIdentityId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for SourceIdentityId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SourceIdentityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The class named X, regardless of which JAR or which version ships it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceIdentity {
    pub id: SourceIdentityId,
    pub class_full_name: String,
    pub created_at: DateTime<Utc>,
}

impl SourceIdentity {
    pub fn new(class_full_name: String) -> Self {
        Self {
            id: SourceIdentityId::new(),
            class_full_name,
            created_at: Utc::now(),
        }
    }
}

/// Unique identifier for a concrete source version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceVersionId(pub Uuid);

impl SourceVersionId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for SourceVersionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SourceVersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One concrete content blob of a source identity, content-addressed by
/// the hash of its normalized text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceVersion {
    pub id: SourceVersionId,
    pub java_source_file_id: SourceIdentityId,
    /// Artifact-version tokens this blob belongs to, e.g. `jar:foo.jar@2`.
    /// A blob unchanged across versions carries several.
    pub version_labels: Vec<String>,
    pub file_path: Option<String>,
    pub file_content: String,
    pub file_size: i64,
    pub file_hash: String,
    pub line_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SourceVersion {
    /// Build a version from raw file bytes, normalizing line endings before
    /// hashing and counting.
    pub fn from_content(
        java_source_file_id: SourceIdentityId,
        file_path: Option<String>,
        raw: &str,
        file_size: i64,
    ) -> Self {
        let normalized = normalize_line_endings(raw);
        let now = Utc::now();
        Self {
            id: SourceVersionId::new(),
            java_source_file_id,
            version_labels: Vec::new(),
            file_path,
            file_hash: content_hash(&normalized),
            line_count: line_count(&normalized),
            file_content: normalized.into_owned(),
            file_size,
            created_at: now,
            updated_at: now,
        }
    }
}

/// "This concrete JAR row contains this concrete source version."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JarSourceLink {
    pub jar_file_id: JarFileId,
    pub java_source_file_version_id: SourceVersionId,
    pub created_at: DateTime<Utc>,
}

impl JarSourceLink {
    pub fn new(jar_file_id: JarFileId, java_source_file_version_id: SourceVersionId) -> Self {
        Self {
            jar_file_id,
            java_source_file_version_id,
            created_at: Utc::now(),
        }
    }
}

/// Normalize `\r\n` to `\n`; hashing and line counting run on this form.
pub fn normalize_line_endings(content: &str) -> Cow<'_, str> {
    if content.contains("\r\n") {
        Cow::Owned(content.replace("\r\n", "\n"))
    } else {
        Cow::Borrowed(content)
    }
}

/// Lowercase hex sha-256 of the normalized content.
pub fn content_hash(normalized: &str) -> String {
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// Number of lines in normalized content: `\n` count, plus one when the
/// content is non-empty and does not end in `\n`. An empty file has zero.
pub fn line_count(normalized: &str) -> i64 {
    if normalized.is_empty() {
        return 0;
    }
    let newlines = normalized.bytes().filter(|b| *b == b'\n').count() as i64;
    if normalized.ends_with('\n') {
        newlines
    } else {
        newlines + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// sha-256 of the empty string.
    const EMPTY_HASH: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    #[test]
    fn test_empty_file_hash_and_lines() {
        assert_eq!(content_hash(""), EMPTY_HASH);
        assert_eq!(line_count(""), 0);
    }

    #[test]
    fn test_line_count_without_trailing_newline() {
        assert_eq!(line_count("package com.x;"), 1);
        assert_eq!(line_count("a\nb"), 2);
    }

    #[test]
    fn test_line_count_with_trailing_newline() {
        assert_eq!(line_count("a\n"), 1);
        assert_eq!(line_count("a\nb\n"), 2);
    }

    #[test]
    fn test_crlf_normalization_collapses_hashes() {
        let unix = "class Y {\n}\n";
        let dos = "class Y {\r\n}\r\n";
        assert_eq!(
            content_hash(&normalize_line_endings(unix)),
            content_hash(&normalize_line_endings(dos))
        );
        assert_eq!(line_count(&normalize_line_endings(dos)), 2);
    }

    #[test]
    fn test_from_content_is_consistent() {
        let sv = SourceVersion::from_content(
            SourceIdentityId::new(),
            None,
            "package com.x;\r\nclass Y {}\r\n",
            28,
        );
        assert_eq!(sv.line_count, 2);
        assert_eq!(sv.file_hash, content_hash(&sv.file_content));
        assert!(!sv.file_content.contains('\r'));
    }
}
