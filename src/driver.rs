//! Container engine driver
//!
//! The orchestrator only needs to start a container for an application and
//! stop it again by instance name. `DockerDriver` does this through the
//! `docker` CLI, run via the host shell.

use crate::config::DockerConfig;
use crate::models::Application;
use crate::os::OperatingSystem;
use crate::{Error, Result};

/// Launches and removes application containers
#[cfg_attr(test, mockall::automock)]
pub trait ContainerDriver: Send + Sync {
    /// Launch a container named `app.instance()` whose service is reachable
    /// from the host on `app.port_service()`
    fn start(&self, app: &Application) -> Result<()>;

    /// Terminate and remove the container
    fn stop(&self, instance: &str) -> Result<()>;
}

/// Docker CLI driver
pub struct DockerDriver {
    config: DockerConfig,
    os: OperatingSystem,
}

impl DockerDriver {
    pub fn new(config: DockerConfig, os: OperatingSystem) -> Self {
        Self { config, os }
    }

    /// `docker run` line for an application.
    ///
    /// The in-container service listens on the public port; Docker publishes
    /// it on the host's service port, where the front-end listener relays to.
    pub fn run_command_line(&self, app: &Application) -> String {
        let publish = format!("-p {}:{}", app.port_service(), app.port_app());
        let image = self.config.image_for(app.name());
        [
            self.config.binary.as_str(),
            "run",
            "-d",
            "--rm",
            "--name",
            app.instance(),
            self.os.host_option(),
            publish.as_str(),
            image.as_str(),
        ]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
    }

    pub fn stop_command_line(&self, instance: &str) -> String {
        format!("{} rm -f {}", self.config.binary, instance)
    }

    fn run(&self, line: &str) -> std::result::Result<String, String> {
        tracing::debug!(command = %line, "Running docker command");

        let output = self
            .os
            .command(line)
            .output()
            .map_err(|e| format!("failed to spawn {}: {}", self.os.shell(), e))?;

        if !output.status.success() {
            return Err(format!(
                "exit code {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl ContainerDriver for DockerDriver {
    fn start(&self, app: &Application) -> Result<()> {
        let container_id = self
            .run(&self.run_command_line(app))
            .map_err(|reason| Error::ContainerStartFailed {
                instance: app.instance().to_string(),
                reason,
            })?;

        tracing::info!(
            instance = %app.instance(),
            container = %container_id,
            service_port = app.port_service(),
            "Container started"
        );
        Ok(())
    }

    fn stop(&self, instance: &str) -> Result<()> {
        self.run(&self.stop_command_line(instance))
            .map_err(|reason| Error::ContainerStopFailed {
                instance: instance.to_string(),
                reason,
            })?;

        tracing::info!(instance = %instance, "Container stopped");
        Ok(())
    }
}
