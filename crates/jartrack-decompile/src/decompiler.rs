use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use jartrack_core::config::JartrackConfig;
use jartrack_core::error::JartrackError;
use jartrack_transport::process::run_with_timeout;

/// External decompiler contract: one binary in, a directory of `.java`
/// files out, exit code returned. The concrete tool is injected so tests
/// can substitute a fake.
pub trait Decompiler: Send + Sync {
    fn decompile(&self, binary: &Path, out_dir: &Path) -> Result<i32, JartrackError>;
}

/// CFR invoked as `java -jar cfr.jar <binary> --outputdir <dir>`.
pub struct CfrDecompiler {
    cfr_jar: PathBuf,
    timeout: Duration,
}

impl CfrDecompiler {
    pub fn new(cfr_jar: PathBuf, timeout: Duration) -> Self {
        Self { cfr_jar, timeout }
    }

    pub fn from_config(config: &JartrackConfig) -> Self {
        Self::new(
            config.decompiler_jar.clone(),
            Duration::from_secs(config.decompile_timeout_secs),
        )
    }
}

impl Decompiler for CfrDecompiler {
    fn decompile(&self, binary: &Path, out_dir: &Path) -> Result<i32, JartrackError> {
        let mut cmd = Command::new("java");
        cmd.arg("-jar")
            .arg(&self.cfr_jar)
            .arg(binary)
            .arg("--outputdir")
            .arg(out_dir);
        let output = run_with_timeout(cmd, self.timeout).map_err(|err| match err {
            JartrackError::CommandTimeout { .. } => JartrackError::Decompile {
                artifact: binary.display().to_string(),
                message: err.to_string(),
            },
            other => other,
        })?;
        if !output.success() {
            tracing::warn!(
                binary = %binary.display(),
                exit_code = output.exit_code,
                stderr = %output.stderr_text(),
                "decompiler exited non-zero"
            );
        }
        Ok(output.exit_code)
    }
}
