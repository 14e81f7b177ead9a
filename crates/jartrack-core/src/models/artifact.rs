use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use super::service::ServiceId;
use super::source::SourceVersionId;

/// The two artifact kinds tracked across the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Jar,
    Class,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactKind::Jar => write!(f, "jar"),
            ArtifactKind::Class => write!(f, "class"),
        }
    }
}

impl std::str::FromStr for ArtifactKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jar" => Ok(ArtifactKind::Jar),
            "class" => Ok(ArtifactKind::Class),
            _ => Err(format!("unknown artifact kind: {s}")),
        }
    }
}

/// Unique identifier for a JAR observation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JarFileId(pub Uuid);

impl JarFileId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for JarFileId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JarFileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One JAR as observed in one service's `lib/` directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JarFile {
    pub id: JarFileId,
    pub service_id: ServiceId,
    pub jar_name: String,
    pub file_size: i64,
    pub last_modified: Option<DateTime<Utc>>,
    pub is_third_party: bool,
    /// Local copy of the binary, once fetched.
    pub file_path: Option<PathBuf>,
    /// Dated decompile output directory, once decompiled.
    pub decompile_path: Option<PathBuf>,
    pub version_no: Option<i64>,
    pub last_version_no: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JarFile {
    pub fn new(
        service_id: ServiceId,
        jar_name: String,
        file_size: i64,
        last_modified: Option<DateTime<Utc>>,
        is_third_party: bool,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JarFileId::new(),
            service_id,
            jar_name,
            file_size,
            last_modified,
            is_third_party,
            file_path: None,
            decompile_path: None,
            version_no: None,
            last_version_no: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Jar name without the `.jar` suffix, used for output directory names.
    pub fn stem(&self) -> &str {
        self.jar_name
            .strip_suffix(".jar")
            .unwrap_or(&self.jar_name)
    }
}

/// Unique identifier for a loose-class observation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassFileId(pub Uuid);

impl ClassFileId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for ClassFileId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ClassFileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One loose `.class` file as observed in one service's `classes/` tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassFile {
    pub id: ClassFileId,
    pub service_id: ServiceId,
    pub class_full_name: String,
    pub file_size: i64,
    pub last_modified: Option<DateTime<Utc>>,
    pub file_path: Option<PathBuf>,
    pub decompile_path: Option<PathBuf>,
    /// The single source version this class decompiles to, once ingested.
    pub java_source_file_version_id: Option<SourceVersionId>,
    pub version_no: Option<i64>,
    pub last_version_no: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClassFile {
    pub fn new(
        service_id: ServiceId,
        class_full_name: String,
        file_size: i64,
        last_modified: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: ClassFileId::new(),
            service_id,
            class_full_name,
            file_size,
            last_modified,
            file_path: None,
            decompile_path: None,
            java_source_file_version_id: None,
            version_no: None,
            last_version_no: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Relative path of the `.class` file below the classes root.
    pub fn relative_path(&self) -> String {
        format!("{}.class", self.class_full_name.replace('.', "/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_kind_roundtrip() {
        for kind in [ArtifactKind::Jar, ArtifactKind::Class] {
            let parsed: ArtifactKind = kind.to_string().parse().unwrap();
            assert_eq!(kind, parsed);
        }
    }

    #[test]
    fn test_jar_stem() {
        let jar = JarFile::new(
            ServiceId::new(),
            "dsop_gateway-2.4.1.jar".to_string(),
            1024,
            None,
            false,
        );
        assert_eq!(jar.stem(), "dsop_gateway-2.4.1");
    }

    #[test]
    fn test_class_relative_path_keeps_inner_separators() {
        let class = ClassFile::new(
            ServiceId::new(),
            "com.x.Outer$Inner".to_string(),
            512,
            None,
        );
        assert_eq!(class.relative_path(), "com/x/Outer$Inner.class");
    }
}
