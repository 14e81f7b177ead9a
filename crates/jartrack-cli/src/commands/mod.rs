pub mod collect;
pub mod decompile;
pub mod diff;
pub mod ingest;
pub mod register;
pub mod sweep;
pub mod versions;

use clap::Subcommand;
use rusqlite::Connection;
use std::process::ExitCode;

use jartrack_core::error::JartrackError;
use jartrack_core::models::artifact::ArtifactKind;
use jartrack_core::models::service::Service;
use jartrack_db::ops;

#[derive(Subcommand)]
pub enum Command {
    /// Load service descriptors from a JSON config document
    RegisterServices(register::RegisterArgs),
    /// Record JAR metadata for the selected services
    CollectJars(collect::CollectArgs),
    /// Record loose .class metadata for the selected services
    CollectClasses(collect::CollectArgs),
    /// Fetch and decompile JARs
    DecompileJars(decompile::DecompileArgs),
    /// Fetch and decompile loose class files
    DecompileClasses(decompile::DecompileArgs),
    /// Walk decompile output and deduplicate sources into the store
    IngestSources(ingest::IngestArgs),
    /// Assign fleet-wide version numbers to JARs and classes
    AssignVersions(versions::AssignArgs),
    /// Remove source versions no artifact references (dry run by default)
    SweepOrphans(sweep::SweepArgs),
    /// Show the unified diff between two versions of one artifact
    Diff(diff::DiffArgs),
}

pub async fn run(cmd: Command) -> anyhow::Result<ExitCode> {
    match cmd {
        Command::RegisterServices(args) => register::run(args),
        Command::CollectJars(args) => collect::run(args, ArtifactKind::Jar),
        Command::CollectClasses(args) => collect::run(args, ArtifactKind::Class),
        Command::DecompileJars(args) => decompile::run(args, ArtifactKind::Jar).await,
        Command::DecompileClasses(args) => decompile::run(args, ArtifactKind::Class).await,
        Command::IngestSources(args) => ingest::run(args),
        Command::AssignVersions(args) => versions::run(args),
        Command::SweepOrphans(args) => sweep::run(args),
        Command::Diff(args) => diff::run(args),
    }
}

/// Resolve the `--service NAME` / `--all-services` selector pair.
pub(crate) fn select_services(
    conn: &Connection,
    service: Option<&str>,
    all_services: bool,
    environment: &str,
) -> anyhow::Result<Vec<Service>> {
    if let Some(name) = service {
        let found = ops::get_service(conn, name, environment)?.ok_or_else(|| {
            JartrackError::ServiceNotFound {
                name: name.to_string(),
                environment: environment.to_string(),
            }
        })?;
        return Ok(vec![found]);
    }
    if all_services {
        return ops::list_services_for_environment(conn, environment);
    }
    Err(JartrackError::Config {
        message: "specify --service NAME or --all-services".to_string(),
    }
    .into())
}
