use clap::Args;
use std::path::PathBuf;
use std::process::ExitCode;

use jartrack_collect::registry;
use jartrack_core::config::JartrackConfig;
use jartrack_core::error::JartrackError;

#[derive(Args)]
pub struct RegisterArgs {
    /// Path to the services config document (JSON)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Write a sample config document to FILE and exit
    #[arg(long, value_name = "FILE")]
    create_sample: Option<PathBuf>,
}

pub fn run(args: RegisterArgs) -> anyhow::Result<ExitCode> {
    if let Some(path) = args.create_sample {
        registry::create_sample_config(&path)?;
        println!("Sample configuration written to {}", path.display());
        return Ok(ExitCode::SUCCESS);
    }

    let Some(config) = args.config else {
        return Err(JartrackError::Config {
            message: "specify --config FILE or --create-sample FILE".to_string(),
        }
        .into());
    };

    let document = std::fs::read_to_string(&config).map_err(JartrackError::Io)?;
    let db_path = JartrackConfig::db_path()?;
    let conn = jartrack_db::open_db(&db_path)?;

    let report = registry::load_services(&conn, &document)?;
    println!(
        "Services: {} inserted | {} updated | {} skipped",
        report.inserted, report.updated, report.skipped
    );
    Ok(ExitCode::SUCCESS)
}
