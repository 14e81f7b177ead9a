use clap::Args;
use std::process::ExitCode;

use jartrack_core::config::JartrackConfig;
use jartrack_core::models::artifact::ArtifactKind;
use jartrack_core::models::diff::ChangeType;

#[derive(Args)]
pub struct DiffArgs {
    /// Artifact kind: jar or class
    #[arg(long)]
    kind: ArtifactKind,
    /// Artifact name (jar file name or fully-qualified class name)
    name: String,
    /// Source version number
    #[arg(long)]
    from: i64,
    /// Target version number
    #[arg(long)]
    to: i64,
    /// Narrow to a single file (fully-qualified class name)
    #[arg(long)]
    file: Option<String>,
    /// Also list files that did not change
    #[arg(long)]
    include_unchanged: bool,
}

pub fn run(args: DiffArgs) -> anyhow::Result<ExitCode> {
    let db_path = JartrackConfig::db_path()?;
    let conn = jartrack_db::open_db(&db_path)?;

    let result = jartrack_diff::diff(
        &conn,
        args.kind,
        &args.name,
        args.from,
        args.to,
        args.file.as_deref(),
        args.include_unchanged,
    )?;

    println!(
        "{} {} v{} -> v{}: {} files changed, {} insertions(+), {} deletions(-)",
        args.kind,
        args.name,
        result.from_version,
        result.to_version,
        result.summary.files_changed,
        result.summary.insertions,
        result.summary.deletions
    );

    for change in &result.file_changes {
        let marker = match change.change_type {
            ChangeType::Added => "A",
            ChangeType::Deleted => "D",
            ChangeType::Modified => "M",
            ChangeType::Unchanged => "=",
        };
        println!(
            "  {marker} {} (+{} -{}  {:.1}%)",
            change.file_path, change.additions, change.deletions, change.change_percentage
        );
    }

    for file_diff in &result.file_diffs {
        println!("\n{}", file_diff.unified_diff);
    }

    Ok(ExitCode::SUCCESS)
}
