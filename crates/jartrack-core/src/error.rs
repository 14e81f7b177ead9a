use std::path::PathBuf;

/// Central error type for the jartrack system.
#[derive(Debug, thiserror::Error)]
pub enum JartrackError {
    #[error("service not found: {name} ({environment})")]
    ServiceNotFound { name: String, environment: String },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("unknown placeholder '{{{placeholder}}}' in path template: {template}")]
    UnknownPlaceholder {
        placeholder: String,
        template: String,
    },

    #[error("transport error for {service}: {message}")]
    Transport { service: String, message: String },

    #[error("command timed out after {timeout_secs}s: {command}")]
    CommandTimeout { command: String, timeout_secs: u64 },

    #[error("unable to decode {what} with any known encoding")]
    Encoding { what: String },

    #[error("decompile failed for {artifact}: {message}")]
    Decompile { artifact: String, message: String },

    #[error("version not found: {kind} {name} v{version}")]
    VersionNotFound {
        kind: String,
        name: String,
        version: i64,
    },

    #[error("path not found: {path}")]
    PathNotFound { path: PathBuf },

    #[error("invariant violation: {message}")]
    Invariant { message: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

impl JartrackError {
    /// Process exit code for this error class: 2 config, 3 transport,
    /// 4 decompile, 1 everything else.
    pub fn exit_code(&self) -> u8 {
        match self {
            JartrackError::Config { .. }
            | JartrackError::UnknownPlaceholder { .. }
            | JartrackError::Serialization(_) => 2,
            JartrackError::Transport { .. } | JartrackError::CommandTimeout { .. } => 3,
            JartrackError::Decompile { .. } => 4,
            _ => 1,
        }
    }
}
