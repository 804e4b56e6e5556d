//! local-kube
//!
//! A single-host orchestrator for containerized applications. Submit an
//! application as `<name>:<port>` and local-kube picks a free service port,
//! starts a container named `<name>_<port>`, and attaches a listener on the
//! public port that relays traffic into the container. Applications are
//! tracked in an in-memory registry until stopped or until the process
//! shuts down, at which point every container is removed.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use local_kube::{DockerConfig, DockerDriver, Orchestrator, OperatingSystem, Registry, TcpForwarder};
//!
//! # async fn run() -> local_kube::Result<()> {
//! let orchestrator = Orchestrator::new(
//!     Arc::new(Registry::new()),
//!     Arc::new(DockerDriver::new(DockerConfig::default(), OperatingSystem::current())),
//!     Arc::new(TcpForwarder::new(tokio::runtime::Handle::current(), "0.0.0.0")),
//! );
//!
//! let app = orchestrator.start("hello:8080")?;
//! println!("{} running on service port {}", app.instance(), app.port_service());
//!
//! orchestrator.stop(app.id().into())?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod driver;
pub mod error;
pub mod listener;
pub mod locks;
pub mod logs;
pub mod models;
pub mod orchestrator;
pub mod os;
pub mod ports;
pub mod registry;

pub use api::Server;
pub use config::{DockerConfig, OrchestratorConfig, ServeConfig};
pub use driver::{ContainerDriver, DockerDriver};
pub use error::{Error, Result};
pub use listener::{ListenerManager, TcpForwarder};
pub use logs::{LogSink, MemoryLogSink, SqliteLogSink};
pub use models::{AppSpec, Application};
pub use orchestrator::{AppPhase, Orchestrator};
pub use os::OperatingSystem;
pub use ports::{PortAllocator, ProbingAllocator};
pub use registry::Registry;
