use clap::Args;
use std::process::ExitCode;

use jartrack_core::config::JartrackConfig;
use jartrack_db::ops;
use jartrack_version::AssignReport;

use super::select_services;

#[derive(Args)]
pub struct AssignArgs {
    /// Assign JAR versions
    #[arg(long)]
    jars: bool,
    /// Assign class versions
    #[arg(long)]
    classes: bool,
    /// Limit to names observed in one service (grouping stays fleet-wide)
    #[arg(long)]
    service: Option<String>,
    /// Environment selector
    #[arg(long, default_value = "production")]
    environment: String,
}

pub fn run(args: AssignArgs) -> anyhow::Result<ExitCode> {
    let db_path = JartrackConfig::db_path()?;
    let conn = jartrack_db::open_db(&db_path)?;

    // Neither flag means both.
    let do_jars = args.jars || !args.classes;
    let do_classes = args.classes || !args.jars;

    let scope = match &args.service {
        Some(name) => {
            Some(select_services(&conn, Some(name), false, &args.environment)?.remove(0))
        }
        None => None,
    };

    let mut report = AssignReport::default();

    if do_jars {
        let names = match &scope {
            Some(service) => ops::list_jar_names_for_service(&conn, &service.id)?,
            None => ops::list_jar_names(&conn)?,
        };
        report.merge(jartrack_version::assign_jar_versions(&conn, &names)?);
    }
    if do_classes {
        let names = match &scope {
            Some(service) => ops::list_class_names_for_service(&conn, &service.id)?,
            None => ops::list_class_names(&conn)?,
        };
        report.merge(jartrack_version::assign_class_versions(&conn, &names)?);
    }

    println!(
        "Assigned versions for {} names: {} rows updated, {} source labels applied",
        report.names, report.rows_updated, report.labels_applied
    );

    let stats = jartrack_version::version_statistics(&conn)?;
    println!(
        "JARs: {} rows, {} unique names, {} versioned",
        stats.jar_rows, stats.jar_names, stats.jar_rows_versioned
    );
    println!(
        "Classes: {} rows, {} unique names, {} versioned",
        stats.class_rows, stats.class_names, stats.class_rows_versioned
    );

    Ok(ExitCode::SUCCESS)
}
