use clap::Args;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use jartrack_core::config::JartrackConfig;
use jartrack_core::models::artifact::ArtifactKind;
use jartrack_db::ops;
use jartrack_decompile::{
    BatchWork, CfrDecompiler, DecompileEngine, DecompileStatus, ServiceBatch,
};

use super::select_services;

#[derive(Args)]
pub struct DecompileArgs {
    /// Decompile for one service
    #[arg(long)]
    service: Option<String>,
    /// Decompile for every registered service
    #[arg(long)]
    all_services: bool,
    /// Environment selector
    #[arg(long, default_value = "production")]
    environment: String,
    /// Re-run even when decompile output already exists
    #[arg(long)]
    force: bool,
}

pub async fn run(args: DecompileArgs, kind: ArtifactKind) -> anyhow::Result<ExitCode> {
    let config = Arc::new(JartrackConfig::load()?);
    let db_path = JartrackConfig::db_path()?;
    let conn = jartrack_db::open_db(&db_path)?;

    let services = select_services(
        &conn,
        args.service.as_deref(),
        args.all_services,
        &args.environment,
    )?;
    if services.is_empty() {
        println!("No services registered. Use `jartrack register-services` first.");
        return Ok(ExitCode::SUCCESS);
    }

    let mut batches = Vec::new();
    for service in services {
        let (remote_template, root_template) = match kind {
            ArtifactKind::Jar => (&service.jar_path, &service.jar_decompile_output_dir),
            ArtifactKind::Class => (&service.classes_path, &service.class_decompile_output_dir),
        };
        let remote_dir = service.render_path(remote_template)?;
        let output_root = PathBuf::from(service.render_path(root_template)?);
        let work = match kind {
            ArtifactKind::Jar => {
                BatchWork::Jars(ops::list_jar_files_for_service(&conn, &service.id)?)
            }
            ArtifactKind::Class => {
                BatchWork::Classes(ops::list_class_files_for_service(&conn, &service.id)?)
            }
        };
        batches.push(ServiceBatch {
            service,
            remote_dir,
            output_root,
            work,
        });
    }
    drop(conn);

    let decompiler = Arc::new(CfrDecompiler::from_config(&config));
    let engine = DecompileEngine::new(config.decompile_concurrency);
    let outcomes = engine
        .run(db_path, batches, config, decompiler, args.force)
        .await;

    let done = outcomes
        .iter()
        .filter(|o| o.status == DecompileStatus::Done)
        .count();
    let skipped = outcomes
        .iter()
        .filter(|o| o.status == DecompileStatus::Skipped)
        .count();
    let third_party = outcomes
        .iter()
        .filter(|o| o.status == DecompileStatus::SkippedThirdParty)
        .count();
    let failed = outcomes.iter().filter(|o| o.failed()).count();

    println!(
        "\nDecompiled {kind}s: {done} done | {skipped} up-to-date | {third_party} third-party skipped | {failed} failed"
    );
    for outcome in outcomes.iter().filter(|o| o.failed()) {
        if let DecompileStatus::Failed(cause) = &outcome.status {
            println!("  {} / {}: {}", outcome.service, outcome.artifact, cause);
        }
    }

    let code = if failed > 0 { 4 } else { 0 };
    Ok(ExitCode::from(code))
}
