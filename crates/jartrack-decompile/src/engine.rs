//! Bounded worker pool driving fetch+decompile across services.
//!
//! Services run in parallel under a semaphore; artifacts within one service
//! run serially so a single SSH peer is never hammered by many connections.

use std::path::PathBuf;
use std::sync::Arc;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;

use jartrack_core::config::JartrackConfig;
use jartrack_core::models::artifact::{ClassFile, JarFile};
use jartrack_core::models::service::Service;
use jartrack_transport::transport_for;

use crate::decompiler::Decompiler;
use crate::driver::{self, DecompileOutcome, DecompileStatus};

/// The artifacts of one service selected for this pass.
pub enum BatchWork {
    Jars(Vec<JarFile>),
    Classes(Vec<ClassFile>),
}

/// One service's share of a decompile stage, with its paths pre-rendered.
pub struct ServiceBatch {
    pub service: Service,
    /// Rendered remote directory the binaries are fetched from.
    pub remote_dir: String,
    /// Rendered local output root.
    pub output_root: PathBuf,
    pub work: BatchWork,
}

/// Engine that decompiles service batches in parallel with a concurrency
/// limit.
pub struct DecompileEngine {
    concurrency: usize,
}

impl DecompileEngine {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
        }
    }

    pub async fn run(
        &self,
        db_path: PathBuf,
        batches: Vec<ServiceBatch>,
        config: Arc<JartrackConfig>,
        decompiler: Arc<dyn Decompiler>,
        force: bool,
    ) -> Vec<DecompileOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let multi = MultiProgress::new();
        let style = ProgressStyle::with_template("{spinner:.green} {msg}")
            .unwrap()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");

        let handles: Vec<_> = batches
            .into_iter()
            .map(|batch| {
                let sem = semaphore.clone();
                let pb = multi.add(ProgressBar::new_spinner());
                pb.set_style(style.clone());
                pb.set_message(format!("decompiling {}", batch.service.service_name));
                let db_path = db_path.clone();
                let config = config.clone();
                let decompiler = decompiler.clone();

                tokio::spawn(async move {
                    let _permit = match sem.acquire_owned().await {
                        Ok(permit) => permit,
                        Err(_) => return Vec::new(),
                    };
                    let service_name = batch.service.service_name.clone();
                    let result = tokio::task::spawn_blocking(move || {
                        run_service_batch(&db_path, batch, &config, decompiler.as_ref(), force)
                    })
                    .await
                    .unwrap_or_default();

                    let failed = result.iter().filter(|o| o.failed()).count();
                    pb.finish_with_message(format!(
                        "{service_name}: {} artifacts, {failed} failed",
                        result.len()
                    ));
                    result
                })
            })
            .collect();

        let mut outcomes = Vec::new();
        for handle in handles {
            if let Ok(result) = handle.await {
                outcomes.extend(result);
            }
        }

        outcomes
    }
}

fn run_service_batch(
    db_path: &PathBuf,
    batch: ServiceBatch,
    config: &JartrackConfig,
    decompiler: &dyn Decompiler,
    force: bool,
) -> Vec<DecompileOutcome> {
    let conn = match jartrack_db::open_db(db_path) {
        Ok(conn) => conn,
        Err(err) => {
            tracing::error!(service = %batch.service.service_name, cause = %err, "cannot open store");
            return Vec::new();
        }
    };
    let transport = transport_for(&batch.service, config);

    let mut outcomes = Vec::new();
    match batch.work {
        BatchWork::Jars(jars) => {
            for jar in &jars {
                let result = driver::decompile_jar(
                    &conn,
                    &batch.service,
                    &batch.remote_dir,
                    &batch.output_root,
                    transport.as_ref(),
                    decompiler,
                    jar,
                    force,
                );
                outcomes.push(unwrap_outcome(result, &batch.service, &jar.jar_name));
            }
        }
        BatchWork::Classes(classes) => {
            for class in &classes {
                let result = driver::decompile_class(
                    &conn,
                    &batch.service,
                    &batch.remote_dir,
                    &batch.output_root,
                    transport.as_ref(),
                    decompiler,
                    class,
                    force,
                );
                outcomes.push(unwrap_outcome(result, &batch.service, &class.class_full_name));
            }
        }
    }
    outcomes
}

fn unwrap_outcome(
    result: anyhow::Result<DecompileOutcome>,
    service: &Service,
    artifact: &str,
) -> DecompileOutcome {
    match result {
        Ok(outcome) => outcome,
        Err(err) => {
            tracing::error!(service = %service.service_name, artifact, cause = %err, "store error during decompile");
            DecompileOutcome {
                service: service.service_name.clone(),
                artifact: artifact.to_string(),
                status: DecompileStatus::Failed(err.to_string()),
            }
        }
    }
}
