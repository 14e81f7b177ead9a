use clap::Args;
use std::process::ExitCode;

use jartrack_core::config::JartrackConfig;
use jartrack_ingest::{IngestFilter, IngestReport};

use super::select_services;

#[derive(Args)]
pub struct IngestArgs {
    /// Ingest for one service
    #[arg(long)]
    service: Option<String>,
    /// Ingest for every registered service
    #[arg(long)]
    all_services: bool,
    /// Environment selector
    #[arg(long, default_value = "production")]
    environment: String,
    /// Only ingest the decompile output of this JAR
    #[arg(long)]
    jar_name: Option<String>,
    /// Only ingest sources for this fully-qualified class name
    #[arg(long)]
    class_name: Option<String>,
    /// Report planned writes without executing them
    #[arg(long)]
    dry_run: bool,
}

pub fn run(args: IngestArgs) -> anyhow::Result<ExitCode> {
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

    let filter = IngestFilter {
        jar_name: args.jar_name,
        class_name: args.class_name,
        dry_run: args.dry_run,
    };

    let mut report = IngestReport::default();
    for service in &services {
        report.merge(jartrack_ingest::ingest_service(&conn, service, &filter)?);
    }

    if args.dry_run {
        for planned in &report.planned {
            println!("[dry run] {planned}");
        }
        println!(
            "\n[dry run] {} files: {} versions to insert, {} to reuse",
            report.files_seen, report.versions_inserted, report.versions_reused
        );
        return Ok(ExitCode::SUCCESS);
    }

    println!(
        "Ingested {} files: {} versions inserted | {} reused | {} jar links | {} class pointers | {} skipped",
        report.files_seen,
        report.versions_inserted,
        report.versions_reused,
        report.links_created,
        report.class_pointers_set,
        report.skipped
    );
    Ok(ExitCode::SUCCESS)
}
