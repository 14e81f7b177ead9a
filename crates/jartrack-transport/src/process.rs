use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use jartrack_core::error::JartrackError;

/// Result of a finished subprocess.
#[derive(Debug)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }
}

/// Run a command, killing it when the wall-clock deadline passes.
///
/// stdout/stderr are drained on separate threads so a chatty child cannot
/// deadlock on a full pipe.
pub fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
) -> Result<CommandOutput, JartrackError> {
    let describe = format!("{cmd:?}");
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn()?;
    let mut stdout_pipe = child
        .stdout
        .take()
        .ok_or_else(|| JartrackError::Other("child stdout unavailable".into()))?;
    let mut stderr_pipe = child
        .stderr
        .take()
        .ok_or_else(|| JartrackError::Other("child stderr unavailable".into()))?;

    let stdout_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stdout_pipe.read_to_end(&mut buf);
        buf
    });
    let stderr_handle = std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = stderr_pipe.read_to_end(&mut buf);
        buf
    });

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None => {
                if Instant::now() >= deadline {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(JartrackError::CommandTimeout {
                        command: describe,
                        timeout_secs: timeout.as_secs(),
                    });
                }
                std::thread::sleep(Duration::from_millis(50));
            }
        }
    };

    let stdout = stdout_handle.join().unwrap_or_default();
    let stderr = stderr_handle.join().unwrap_or_default();

    Ok(CommandOutput {
        exit_code: status.code().unwrap_or(-1),
        stdout,
        stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captures_output() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("echo out; echo err >&2");
        let output = run_with_timeout(cmd, Duration::from_secs(5)).unwrap();
        assert!(output.success());
        assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "out");
        assert_eq!(output.stderr_text(), "err");
    }

    #[test]
    fn test_nonzero_exit() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("exit 3");
        let output = run_with_timeout(cmd, Duration::from_secs(5)).unwrap();
        assert!(!output.success());
        assert_eq!(output.exit_code, 3);
    }

    #[test]
    fn test_timeout_kills_child() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let err = run_with_timeout(cmd, Duration::from_millis(200)).unwrap_err();
        assert!(matches!(err, JartrackError::CommandTimeout { .. }));
    }
}
