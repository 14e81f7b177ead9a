//! Fetch-and-decompile driver for single artifacts.
//!
//! On-disk layout under an output root:
//!   `{root}/{stem}/{YYYYMMDD}-{service}@{host}/` — decompiled sources
//!   `{root}/_jar/{service}@{host}/`              — retained jar binaries
//!   `{root}/_class/{service}@{host}/`            — retained class binaries

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

use jartrack_core::error::JartrackError;
use jartrack_core::models::artifact::{ArtifactKind, ClassFile, JarFile};
use jartrack_core::models::service::Service;
use jartrack_db::ops;
use jartrack_transport::Transport;

use crate::decompiler::Decompiler;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecompileStatus {
    Done,
    /// Output already present with the expected timestamp fragment.
    Skipped,
    SkippedThirdParty,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct DecompileOutcome {
    pub service: String,
    pub artifact: String,
    pub status: DecompileStatus,
}

impl DecompileOutcome {
    pub fn failed(&self) -> bool {
        matches!(self.status, DecompileStatus::Failed(_))
    }
}

/// `YYYYMMDD` fragment from the artifact's last_modified.
fn date_fragment(last_modified: Option<DateTime<Utc>>) -> String {
    last_modified
        .unwrap_or_else(Utc::now)
        .format("%Y%m%d")
        .to_string()
}

fn originals_dir(root: &Path, kind: ArtifactKind, label: &str) -> PathBuf {
    let mirror = match kind {
        ArtifactKind::Jar => "_jar",
        ArtifactKind::Class => "_class",
    };
    root.join(mirror).join(label)
}

fn output_dir(root: &Path, stem: &str, fragment: &str, label: &str) -> PathBuf {
    root.join(stem).join(format!("{fragment}-{label}"))
}

fn dir_non_empty(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

fn should_skip(decompile_path: Option<&Path>, fragment_dir: &str, force: bool) -> bool {
    if force {
        return false;
    }
    match decompile_path {
        Some(path) => {
            path.to_string_lossy().contains(fragment_dir) && dir_non_empty(path)
        }
        None => false,
    }
}

/// Fetch one JAR and decompile it. Transport and decompiler failures are
/// recorded in the outcome; only store errors escape.
#[allow(clippy::too_many_arguments)]
pub fn decompile_jar(
    conn: &Connection,
    service: &Service,
    remote_dir: &str,
    output_root: &Path,
    transport: &dyn Transport,
    decompiler: &dyn Decompiler,
    jar: &JarFile,
    force: bool,
) -> anyhow::Result<DecompileOutcome> {
    let outcome = |status| DecompileOutcome {
        service: service.service_name.clone(),
        artifact: jar.jar_name.clone(),
        status,
    };

    if jar.is_third_party {
        return Ok(outcome(DecompileStatus::SkippedThirdParty));
    }

    let label = service.label();
    let fragment = date_fragment(jar.last_modified);
    let fragment_dir = format!("{fragment}-{label}");
    if should_skip(jar.decompile_path.as_deref(), &fragment_dir, force) {
        tracing::debug!(artifact = %jar.jar_name, "decompile output present, skipping");
        return Ok(outcome(DecompileStatus::Skipped));
    }

    let src = format!("{remote_dir}/{}", jar.jar_name);
    let binary = originals_dir(output_root, ArtifactKind::Jar, &label).join(&jar.jar_name);
    if let Err(err) = transport.fetch(&src, &binary) {
        tracing::warn!(service = %service.service_name, artifact = %jar.jar_name, phase = "fetch", cause = %err, "artifact failed this pass");
        return Ok(outcome(DecompileStatus::Failed(err.to_string())));
    }

    let out_dir = output_dir(output_root, jar.stem(), &fragment, &label);
    std::fs::create_dir_all(&out_dir)?;

    match decompiler.decompile(&binary, &out_dir) {
        Ok(0) => {
            ops::update_jar_paths(conn, &jar.id, &binary, &out_dir)?;
            Ok(outcome(DecompileStatus::Done))
        }
        Ok(code) => {
            tracing::warn!(service = %service.service_name, artifact = %jar.jar_name, phase = "decompile", exit_code = code, "artifact failed this pass");
            Ok(outcome(DecompileStatus::Failed(format!(
                "decompiler exited with {code}"
            ))))
        }
        Err(err) => {
            tracing::warn!(service = %service.service_name, artifact = %jar.jar_name, phase = "decompile", cause = %err, "artifact failed this pass");
            Ok(outcome(DecompileStatus::Failed(err.to_string())))
        }
    }
}

/// Fetch one loose class file and decompile it.
#[allow(clippy::too_many_arguments)]
pub fn decompile_class(
    conn: &Connection,
    service: &Service,
    remote_dir: &str,
    output_root: &Path,
    transport: &dyn Transport,
    decompiler: &dyn Decompiler,
    class: &ClassFile,
    force: bool,
) -> anyhow::Result<DecompileOutcome> {
    let outcome = |status| DecompileOutcome {
        service: service.service_name.clone(),
        artifact: class.class_full_name.clone(),
        status,
    };

    let label = service.label();
    let fragment = date_fragment(class.last_modified);
    let fragment_dir = format!("{fragment}-{label}");
    if should_skip(class.decompile_path.as_deref(), &fragment_dir, force) {
        tracing::debug!(artifact = %class.class_full_name, "decompile output present, skipping");
        return Ok(outcome(DecompileStatus::Skipped));
    }

    let src = format!("{remote_dir}/{}", class.relative_path());
    let retained_name = format!("{}.class", class.class_full_name.replace('.', "_"));
    let binary = originals_dir(output_root, ArtifactKind::Class, &label).join(retained_name);
    if let Err(err) = transport.fetch(&src, &binary) {
        tracing::warn!(service = %service.service_name, artifact = %class.class_full_name, phase = "fetch", cause = %err, "artifact failed this pass");
        return Ok(outcome(DecompileStatus::Failed(err.to_string())));
    }

    let out_dir = output_dir(output_root, &class.class_full_name, &fragment, &label);
    std::fs::create_dir_all(&out_dir)?;

    match decompiler.decompile(&binary, &out_dir) {
        Ok(0) => {
            ops::update_class_paths(conn, &class.id, &binary, &out_dir)?;
            Ok(outcome(DecompileStatus::Done))
        }
        Ok(code) => {
            tracing::warn!(service = %service.service_name, artifact = %class.class_full_name, phase = "decompile", exit_code = code, "artifact failed this pass");
            Ok(outcome(DecompileStatus::Failed(format!(
                "decompiler exited with {code}"
            ))))
        }
        Err(err) => {
            tracing::warn!(service = %service.service_name, artifact = %class.class_full_name, phase = "decompile", cause = %err, "artifact failed this pass");
            Ok(outcome(DecompileStatus::Failed(err.to_string())))
        }
    }
}
