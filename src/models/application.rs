//! Application model - a containerized service managed by the orchestrator

use std::fmt;
use std::time::{Duration, Instant};

use crate::ports::SERVICE_PORT_RANGE;
use crate::{Error, Result};

/// A parsed `<name>:<port>` application identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppSpec {
    /// Name, also used as the container image name
    pub name: String,
    /// Public port the application is reachable on
    pub port_app: u16,
}

impl AppSpec {
    pub fn parse(raw: &str) -> Result<Self> {
        let (name, port) = raw
            .split_once(':')
            .ok_or_else(|| invalid(raw, "expected <name>:<port>"))?;

        if name.is_empty() {
            return Err(invalid(raw, "name cannot be empty"));
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        {
            return Err(invalid(raw, "name may only contain [A-Za-z0-9_.-]"));
        }
        if port.is_empty() || !port.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid(raw, "port must be a decimal number"));
        }

        let port_app: u16 = port
            .parse()
            .map_err(|_| invalid(raw, "port must be in 1-65535"))?;
        if port_app == 0 {
            return Err(invalid(raw, "port must be in 1-65535"));
        }

        Ok(Self {
            name: name.to_string(),
            port_app,
        })
    }

    /// Container instance name: `<name>_<port>`
    pub fn instance(&self) -> String {
        format!("{}_{}", self.name, self.port_app)
    }
}

impl fmt::Display for AppSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.port_app)
    }
}

fn invalid(raw: &str, reason: &str) -> Error {
    Error::InvalidArgument(format!("'{}': {}", raw, reason))
}

/// A running application tracked by the registry
///
/// Equality is by `id`, matching how the registry indexes entries.
#[derive(Debug, Clone)]
pub struct Application {
    id: u32,
    name: String,
    port_app: u16,
    port_service: u16,
    instance: String,
    started_at: Instant,
}

impl Application {
    pub fn new(id: u32, spec: &AppSpec, port_service: u16) -> Result<Self> {
        if id == 0 {
            return Err(Error::InvalidArgument("id must be positive".into()));
        }
        if !SERVICE_PORT_RANGE.contains(&port_service) {
            return Err(Error::InvalidArgument(format!(
                "service port {} outside {}-{}",
                port_service,
                SERVICE_PORT_RANGE.start(),
                SERVICE_PORT_RANGE.end()
            )));
        }

        Ok(Self {
            id,
            name: spec.name.clone(),
            port_app: spec.port_app,
            port_service,
            instance: spec.instance(),
            started_at: Instant::now(),
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The client-facing `<name>:<port>` string
    pub fn app(&self) -> String {
        format!("{}:{}", self.name, self.port_app)
    }

    pub fn port_app(&self) -> u16 {
        self.port_app
    }

    pub fn port_service(&self) -> u16 {
        self.port_service
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Elapsed time since the registry accepted this application, as `<m>m<s>s`
    pub fn elapsed_time(&self) -> String {
        format_elapsed(self.elapsed())
    }

    pub(crate) fn restamp(mut self) -> Self {
        self.started_at = Instant::now();
        self
    }

    /// True when both values describe the same deployment, ignoring timing
    pub fn same_deployment(&self, other: &Application) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.port_app == other.port_app
            && self.port_service == other.port_service
            && self.instance == other.instance
    }
}

impl PartialEq for Application {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Application {}

/// Minutes and seconds, each modulo 60
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}m{}s", (secs / 60) % 60, secs % 60)
}
