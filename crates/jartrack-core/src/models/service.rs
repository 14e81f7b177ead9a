use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::JartrackError;

/// Unique identifier for a service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServiceId(pub Uuid);

impl ServiceId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }
}

impl Default for ServiceId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One service entry of the declarative registry document.
///
/// Unknown keys are ignored; missing required keys fail deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub service_name: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub server_base_path: String,
    pub jar_path: String,
    pub classes_path: String,
    pub jar_decompile_output_dir: String,
    pub class_decompile_output_dir: String,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_environment() -> String {
    "production".to_string()
}

fn default_port() -> u16 {
    22
}

/// A deployed process instance on a host, with its artifact directories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: ServiceId,
    pub service_name: String,
    pub environment: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub server_base_path: String,
    /// Template for the remote directory holding JARs.
    pub jar_path: String,
    /// Template for the remote directory holding loose `.class` files.
    pub classes_path: String,
    pub jar_decompile_output_dir: String,
    pub class_decompile_output_dir: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Service {
    pub fn from_spec(spec: ServiceSpec) -> Self {
        let now = Utc::now();
        Self {
            id: ServiceId::new(),
            service_name: spec.service_name,
            environment: spec.environment,
            host: spec.host,
            port: spec.port,
            username: spec.username,
            password: spec.password,
            server_base_path: spec.server_base_path,
            jar_path: spec.jar_path,
            classes_path: spec.classes_path,
            jar_decompile_output_dir: spec.jar_decompile_output_dir,
            class_decompile_output_dir: spec.class_decompile_output_dir,
            description: spec.description,
            created_at: now,
            updated_at: now,
        }
    }

    /// Empty credentials mean the configured paths live on the local
    /// filesystem rather than behind SSH.
    pub fn is_local(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }

    /// `service@host` label used in on-disk directory names.
    pub fn label(&self) -> String {
        format!("{}@{}", self.service_name, self.host)
    }

    /// Render a path template, substituting `{service_name}` and
    /// `{server_base_path}`. Any other placeholder is a hard error.
    pub fn render_path(&self, template: &str) -> Result<String, JartrackError> {
        let rendered = template
            .replace("{service_name}", &self.service_name)
            .replace("{server_base_path}", &self.server_base_path);

        if let Some(start) = rendered.find('{') {
            let rest = &rendered[start + 1..];
            let placeholder = match rest.find('}') {
                Some(end) => rest[..end].to_string(),
                None => rest.to_string(),
            };
            return Err(JartrackError::UnknownPlaceholder {
                placeholder,
                template: template.to_string(),
            });
        }

        Ok(rendered)
    }
}
