use clap::Args;
use std::process::ExitCode;

use jartrack_core::config::JartrackConfig;
use jartrack_core::error::JartrackError;
use jartrack_core::models::artifact::ArtifactKind;
use jartrack_transport::transport_for;

use super::select_services;

#[derive(Args)]
pub struct CollectArgs {
    /// Collect for one service
    #[arg(long)]
    service: Option<String>,
    /// Collect for every registered service
    #[arg(long)]
    all_services: bool,
    /// Environment selector
    #[arg(long, default_value = "production")]
    environment: String,
}

pub fn run(args: CollectArgs, kind: ArtifactKind) -> anyhow::Result<ExitCode> {
    let config = JartrackConfig::load()?;
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

    let mut inserted = 0usize;
    let mut updated = 0usize;
    let mut skipped_lines = 0usize;
    let mut failures: Vec<JartrackError> = Vec::new();

    for service in &services {
        let transport = transport_for(service, &config);
        let result = match kind {
            ArtifactKind::Jar => jartrack_collect::collect_jars_for_service(
                &conn,
                service,
                transport.as_ref(),
                &config.internal_prefixes,
            ),
            ArtifactKind::Class => {
                jartrack_collect::collect_classes_for_service(&conn, service, transport.as_ref())
            }
        };
        match result {
            Ok(stats) => {
                println!(
                    "{}: {} new, {} updated, {} lines skipped",
                    service.service_name, stats.inserted, stats.updated, stats.skipped_lines
                );
                inserted += stats.inserted;
                updated += stats.updated;
                skipped_lines += stats.skipped_lines;
            }
            Err(err) => {
                tracing::error!(
                    service = %service.service_name,
                    phase = "collect",
                    cause = %err,
                    "collection failed, prior rows untouched"
                );
                failures.push(err);
            }
        }
    }

    println!(
        "\nCollected {kind}s: {inserted} new | {updated} updated | {skipped_lines} lines skipped | {}/{} services failed",
        failures.len(),
        services.len()
    );

    Ok(ExitCode::from(severity_code(&failures)))
}

/// The command exits with the highest-severity code observed across all
/// per-service failures: transport errors win over generic ones.
fn severity_code(failures: &[JartrackError]) -> u8 {
    failures
        .iter()
        .map(JartrackError::exit_code)
        .max()
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport_err() -> JartrackError {
        JartrackError::Transport {
            service: "deploy@10.0.0.5".to_string(),
            message: "connection refused".to_string(),
        }
    }

    #[test]
    fn test_no_failures_is_success() {
        assert_eq!(severity_code(&[]), 0);
    }

    #[test]
    fn test_single_transport_failure_among_many_services_is_code_3() {
        assert_eq!(severity_code(&[transport_err()]), 3);
    }

    #[test]
    fn test_generic_failure_is_code_1() {
        let failures = [JartrackError::Database("database is locked".to_string())];
        assert_eq!(severity_code(&failures), 1);
    }

    #[test]
    fn test_mixed_failures_take_highest_severity() {
        let failures = [
            JartrackError::Database("database is locked".to_string()),
            transport_err(),
        ];
        assert_eq!(severity_code(&failures), 3);
    }
}
