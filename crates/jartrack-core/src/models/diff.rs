use serde::{Deserialize, Serialize};

/// How a file changed between two artifact versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Deleted,
    Modified,
    Unchanged,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Added => write!(f, "added"),
            ChangeType::Deleted => write!(f, "deleted"),
            ChangeType::Modified => write!(f, "modified"),
            ChangeType::Unchanged => write!(f, "unchanged"),
        }
    }
}

impl std::str::FromStr for ChangeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "added" => Ok(ChangeType::Added),
            "deleted" => Ok(ChangeType::Deleted),
            "modified" => Ok(ChangeType::Modified),
            "unchanged" => Ok(ChangeType::Unchanged),
            _ => Err(format!("unknown change type: {s}")),
        }
    }
}

/// Per-file change record of a version diff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub file_path: String,
    pub change_type: ChangeType,
    pub additions: i64,
    pub deletions: i64,
    pub change_percentage: f64,
    pub size_before: i64,
    pub size_after: i64,
}

/// Unified-format diff text for one changed file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDiff {
    pub file_path: String,
    pub unified_diff: String,
}

/// Aggregate statistics of a version diff.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub total_files: i64,
    pub files_changed: i64,
    pub insertions: i64,
    pub deletions: i64,
    pub net_change: i64,
}

/// Full diff between two versions of the same artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionDiff {
    pub from_version: i64,
    pub to_version: i64,
    pub file_changes: Vec<FileChange>,
    pub summary: DiffSummary,
    pub file_diffs: Vec<FileDiff>,
}
