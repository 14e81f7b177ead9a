use clap::Args;
use comfy_table::Table;
use std::process::ExitCode;

use jartrack_core::config::JartrackConfig;
use jartrack_ingest::sweep::sweep_orphans;

#[derive(Args)]
pub struct SweepArgs {
    /// Actually delete; without this flag the sweep is a dry run
    #[arg(long)]
    execute: bool,
}

pub fn run(args: SweepArgs) -> anyhow::Result<ExitCode> {
    let db_path = JartrackConfig::db_path()?;
    let conn = jartrack_db::open_db(&db_path)?;

    let report = sweep_orphans(&conn, args.execute)?;

    if report.by_identity.is_empty() {
        println!("No orphaned source versions.");
        return Ok(ExitCode::SUCCESS);
    }

    let mut table = Table::new();
    table.set_header(vec!["IDENTITY", "ORPHAN VERSIONS"]);
    for (identity, count) in &report.by_identity {
        table.add_row(vec![identity.clone(), count.to_string()]);
    }
    println!("{table}");

    if report.executed {
        println!(
            "Deleted {} source versions and {} identities.",
            report.versions_deleted, report.identities_deleted
        );
    } else {
        println!(
            "[dry run] {} orphaned versions across {} identities. Re-run with --execute to delete.",
            report.orphans_found(),
            report.by_identity.len()
        );
    }

    Ok(ExitCode::SUCCESS)
}
