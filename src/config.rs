//! Orchestrator configuration with builder-style setters

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the lifecycle orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Deadline for each driver or listener call
    pub call_timeout: Duration,
    /// Container start attempts, each with a fresh service port
    pub max_start_attempts: u32,
    /// Public ports applications may not claim, such as the API's own
    pub reserved_ports: Vec<u16>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(60),
            max_start_attempts: 3,
            reserved_ports: Vec::new(),
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn max_start_attempts(mut self, attempts: u32) -> Self {
        self.max_start_attempts = attempts;
        self
    }

    pub fn reserve_port(mut self, port: u16) -> Self {
        if !self.reserved_ports.contains(&port) {
            self.reserved_ports.push(port);
        }
        self
    }

    pub fn validate(&self) -> crate::Result<()> {
        if self.call_timeout.is_zero() {
            return Err(crate::Error::InvalidArgument("call_timeout must be positive".into()));
        }
        if self.max_start_attempts < 1 {
            return Err(crate::Error::InvalidArgument("max_start_attempts must be at least 1".into()));
        }
        Ok(())
    }
}

/// How the Docker driver names images and invokes the CLI
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerConfig {
    /// Docker executable
    pub binary: String,
    /// Prepended to the application name to form the image repository
    pub image_prefix: String,
    /// Image tag
    pub image_tag: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            binary: "docker".to_string(),
            image_prefix: String::new(),
            image_tag: "latest".to_string(),
        }
    }
}

impl DockerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn image_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.image_prefix = prefix.into();
        self
    }

    pub fn image_tag(mut self, tag: impl Into<String>) -> Self {
        self.image_tag = tag.into();
        self
    }

    /// Image reference for an application name
    pub fn image_for(&self, name: &str) -> String {
        format!("{}{}:{}", self.image_prefix, name, self.image_tag)
    }
}

/// Default REST API port, kept clear of the usual application ports
pub const DEFAULT_API_PORT: u16 = 7070;

/// Settings for the `serve` command
#[derive(Debug, Clone)]
pub struct ServeConfig {
    /// REST API address
    pub addr: SocketAddr,
    /// Host that application listeners bind on
    pub listen_host: String,
    /// SQLite file for the event log
    pub db_path: PathBuf,
    pub orchestrator: OrchestratorConfig,
    pub docker: DockerConfig,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_API_PORT)),
            listen_host: "0.0.0.0".to_string(),
            db_path: PathBuf::from("local-kube.db"),
            orchestrator: OrchestratorConfig::default().reserve_port(DEFAULT_API_PORT),
            docker: DockerConfig::default(),
        }
    }
}
