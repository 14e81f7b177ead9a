pub mod listing;
pub mod process;
pub mod ssh;

use chrono::{DateTime, Utc};
use std::path::Path;
use walkdir::WalkDir;

use jartrack_core::config::JartrackConfig;
use jartrack_core::error::JartrackError;
use jartrack_core::models::service::Service;

/// One file as reported by a directory listing: path relative to the listed
/// root (with `/` separators), byte size, modification time.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteEntry {
    pub path: String,
    pub size: i64,
    pub mtime: Option<DateTime<Utc>>,
}

/// Result of listing one directory.
#[derive(Debug, Default)]
pub struct Listing {
    pub entries: Vec<RemoteEntry>,
    /// Lines that looked like file entries but could not be parsed.
    pub malformed: usize,
}

/// Transport seam between the pipeline and a service's filesystem. The rest
/// of the system does not distinguish remote from local.
pub trait Transport: Send + Sync {
    /// List regular files under `path` without fetching contents.
    fn list(&self, path: &str, recursive: bool) -> Result<Listing, JartrackError>;

    /// Copy one remote file to a local destination, returning its size.
    fn fetch(&self, src: &str, dst: &Path) -> Result<u64, JartrackError>;
}

/// Pick the transport for a service: SSH when credentials are configured,
/// the local filesystem otherwise.
pub fn transport_for(service: &Service, config: &JartrackConfig) -> Box<dyn Transport> {
    if service.is_local() {
        Box::new(LocalTransport)
    } else {
        Box::new(ssh::SshTransport::from_service(service, config))
    }
}

/// Direct filesystem access for services whose paths are local mirrors.
pub struct LocalTransport;

impl Transport for LocalTransport {
    fn list(&self, path: &str, recursive: bool) -> Result<Listing, JartrackError> {
        let root = Path::new(path);
        if !root.is_dir() {
            return Err(JartrackError::PathNotFound {
                path: root.to_path_buf(),
            });
        }

        let max_depth = if recursive { usize::MAX } else { 1 };
        let mut entries = Vec::new();
        for entry in WalkDir::new(root)
            .max_depth(max_depth)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let meta = entry.metadata().map_err(|e| JartrackError::Other(e.to_string()))?;
            entries.push(RemoteEntry {
                path: rel,
                size: meta.len() as i64,
                mtime: meta.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(Listing {
            entries,
            malformed: 0,
        })
    }

    fn fetch(&self, src: &str, dst: &Path) -> Result<u64, JartrackError> {
        let src = Path::new(src);
        if !src.is_file() {
            return Err(JartrackError::PathNotFound {
                path: src.to_path_buf(),
            });
        }
        if let Some(parent) = dst.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(std::fs::copy(src, dst)?)
    }
}
