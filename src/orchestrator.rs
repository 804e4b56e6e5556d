//! Application lifecycle orchestration
//!
//! The orchestrator keeps three things in agreement: the registry entry, the
//! running container and the front-end listener. `start` acquires them in
//! order and unwinds in reverse on failure. `stop` tears down greedily and
//! reports every failure it ran into. `shutdown` stops everything.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::OrchestratorConfig;
use crate::driver::ContainerDriver;
use crate::listener::ListenerManager;
use crate::locks::{KeyLocks, LockKey};
use crate::logs::{LogSink, MemoryLogSink};
use crate::models::{AppSpec, Application, LogEntry, LogEvent};
use crate::ports::{PortAllocator, ProbingAllocator};
use crate::registry::Registry;
use crate::{Error, Result};

/// Observable phase of a registered application
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppPhase {
    Live,
    Stopping,
}

impl std::fmt::Display for AppPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppPhase::Live => write!(f, "Live"),
            AppPhase::Stopping => write!(f, "Stopping"),
        }
    }
}

/// Coordinates container and listener lifecycles for registered applications
pub struct Orchestrator {
    registry: Arc<Registry>,
    allocator: Arc<dyn PortAllocator>,
    driver: Arc<dyn ContainerDriver>,
    listeners: Arc<dyn ListenerManager>,
    sink: Arc<dyn LogSink>,
    config: OrchestratorConfig,
    locks: KeyLocks,
    /// Service ports held by starts that have not reached the registry yet
    reserved: Mutex<HashSet<u16>>,
    stopping: Mutex<HashSet<u32>>,
    /// Starts hold it shared; shutdown takes it exclusively to drain them
    gate: RwLock<()>,
    shutting_down: AtomicBool,
}

impl Orchestrator {
    /// Create an orchestrator with a probing allocator, an in-memory log
    /// sink and default settings
    pub fn new(
        registry: Arc<Registry>,
        driver: Arc<dyn ContainerDriver>,
        listeners: Arc<dyn ListenerManager>,
    ) -> Self {
        Self {
            registry,
            allocator: Arc::new(ProbingAllocator::new()),
            driver,
            listeners,
            sink: Arc::new(MemoryLogSink::new()),
            config: OrchestratorConfig::default(),
            locks: KeyLocks::new(),
            reserved: Mutex::new(HashSet::new()),
            stopping: Mutex::new(HashSet::new()),
            gate: RwLock::new(()),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub fn with_allocator(mut self, allocator: Arc<dyn PortAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    pub fn with_log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Result<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Launch `<name>:<port>` and register it
    pub fn start(&self, name_and_port: &str) -> Result<Application> {
        if self.is_shutting_down() {
            return Err(Error::ShuttingDown);
        }
        let spec = AppSpec::parse(name_and_port)?;
        if self.config.reserved_ports.contains(&spec.port_app) {
            return Err(Error::InvalidArgument(format!(
                "port {} is reserved by local-kube",
                spec.port_app
            )));
        }

        let _gate = self.gate.read();
        if self.is_shutting_down() {
            return Err(Error::ShuttingDown);
        }
        let _port_lock = self.locks.lock(LockKey::Port(spec.port_app));

        if let Some(live) = self.registry.find_by_app_port(spec.port_app) {
            return Err(Error::ListenerAttachFailed {
                port: spec.port_app,
                reason: format!("port already served by application {}", live.id()),
            });
        }

        let id = self.registry.next_id();
        let (app, _reservation) = match self.launch_container(id, &spec) {
            Ok(launched) => launched,
            Err(e) => {
                self.record(id, LogEvent::StartFailed, format!("{}: {}", spec, e));
                return Err(e);
            }
        };

        if let Err(e) = self.attach_listener(&app) {
            tracing::warn!(id, instance = %app.instance(), error = %e, "Listener attach failed, rolling back");
            self.rollback_container(&app);
            self.record(id, LogEvent::StartFailed, format!("{}: {}", spec, e));
            return Err(e);
        }

        let app = match self.registry.insert(Some(app.clone())) {
            Ok(inserted) => inserted,
            Err(e) => {
                tracing::warn!(id, instance = %app.instance(), error = %e, "Registry insert failed, rolling back");
                self.rollback_listener(&app);
                self.rollback_container(&app);
                let err = Error::RegistryConflict(format!("id {} claimed concurrently: {}", id, e));
                self.record(id, LogEvent::StartFailed, format!("{}: {}", spec, err));
                return Err(err);
            }
        };

        tracing::info!(
            id,
            instance = %app.instance(),
            port = app.port_app(),
            service_port = app.port_service(),
            "Application started"
        );
        self.record(
            id,
            LogEvent::Started,
            format!("{} as {} on service port {}", app.app(), app.instance(), app.port_service()),
        );
        Ok(app)
    }

    /// Stop and unregister an application.
    ///
    /// Teardown does not abort on failure: the registry entry is always
    /// removed, and any driver or listener errors come back together as
    /// [`Error::StopIncomplete`].
    pub fn stop(&self, id: i64) -> Result<Application> {
        if id <= 0 {
            return Err(Error::InvalidArgument(format!("id must be positive, got {}", id)));
        }
        let id = u32::try_from(id).map_err(|_| Error::NotFound(id.to_string()))?;

        let _id_lock = self.locks.lock(LockKey::Id(id));
        let app = self
            .registry
            .find_by_id(i64::from(id))
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        let _port_lock = self.locks.lock(LockKey::Port(app.port_app()));

        self.teardown(app)
    }

    /// Stop every registered application, collecting failures.
    ///
    /// New starts are refused from here on. Starts already in flight finish
    /// first so they are included. Listener detach failures are only logged.
    pub fn shutdown(&self) -> Vec<Error> {
        if self.shutting_down.swap(true, Ordering::SeqCst) {
            tracing::debug!("Shutdown already requested");
        }
        let _gate = self.gate.write();

        let apps = self.registry.snapshot();
        tracing::info!(count = apps.len(), "Stopping all applications");

        let mut errors = Vec::new();
        for app in apps {
            match self.stop(i64::from(app.id())) {
                Ok(_) | Err(Error::NotFound(_)) => {}
                Err(e) => {
                    tracing::error!(id = app.id(), instance = %app.instance(), error = %e, "Shutdown stop failed");
                    errors.push(e);
                }
            }
        }
        errors
    }

    /// Registered applications in insertion order, including those being
    /// stopped
    pub fn list(&self) -> Vec<Application> {
        self.registry.snapshot()
    }

    /// Phase of a registered application, `None` when absent
    pub fn phase(&self, id: u32) -> Option<AppPhase> {
        self.registry.find_by_id(i64::from(id))?;
        if self.stopping.lock().contains(&id) {
            Some(AppPhase::Stopping)
        } else {
            Some(AppPhase::Live)
        }
    }

    /// Persisted lifecycle events for an application id
    pub fn logs(&self, app_id: u32) -> Result<Vec<LogEntry>> {
        self.sink.entries(app_id)
    }

    // ===== start steps =====

    /// Reserve a service port and start the container, retrying with a
    /// fresh port when the driver fails
    fn launch_container(&self, id: u32, spec: &AppSpec) -> Result<(Application, PortReservation<'_>)> {
        let mut failed_ports = HashSet::new();
        let mut last_err = None;

        for attempt in 1..=self.config.max_start_attempts {
            let reservation = self.reserve_service_port(&failed_ports)?;
            let app = Application::new(id, spec, reservation.port)?;

            match self.start_container(&app) {
                Ok(()) => return Ok((app, reservation)),
                Err(e) => {
                    tracing::warn!(
                        id,
                        attempt,
                        instance = %app.instance(),
                        service_port = app.port_service(),
                        error = %e,
                        "Container start failed"
                    );
                    // The abandoned start still owns the instance name
                    if matches!(e, Error::TimeoutExceeded { .. }) {
                        return Err(e);
                    }
                    failed_ports.insert(reservation.port);
                    last_err = Some(e);
                }
            }
        }

        Err(last_err.unwrap_or_else(|| Error::ContainerStartFailed {
            instance: spec.instance(),
            reason: "no start attempt made".into(),
        }))
    }

    /// Pick a service port unused by the registry, by other in-flight
    /// starts and by earlier failed attempts
    fn reserve_service_port(&self, failed: &HashSet<u16>) -> Result<PortReservation<'_>> {
        let mut reserved = self.reserved.lock();
        let mut excluded: HashSet<u16> = self.registry.service_ports().into_iter().collect();
        excluded.extend(reserved.iter().copied());
        excluded.extend(failed.iter().copied());

        for _ in 0..self.config.max_start_attempts {
            let allocator = Arc::clone(&self.allocator);
            let probe_excluded = excluded.clone();
            let port = self.with_deadline("port allocation", move || allocator.acquire(&probe_excluded))?;

            if excluded.contains(&port) {
                tracing::warn!(port, "Allocator returned a port already in use, retrying");
                excluded.insert(port);
                continue;
            }

            reserved.insert(port);
            return Ok(PortReservation {
                reserved: &self.reserved,
                port,
            });
        }

        Err(Error::RegistryConflict(
            "allocator kept returning service ports already in use".into(),
        ))
    }

    /// Start the container under the call deadline. A start that overruns
    /// is abandoned, and its container is removed if it comes up late.
    fn start_container(&self, app: &Application) -> Result<()> {
        let driver = Arc::clone(&self.driver);
        let undo_driver = Arc::clone(&self.driver);
        let candidate = app.clone();
        let instance = app.instance().to_string();
        self.with_deadline_or_undo(
            "container start",
            move || driver.start(&candidate),
            move |()| {
                tracing::warn!(instance = %instance, "Container came up after its deadline, removing");
                if let Err(e) = undo_driver.stop(&instance) {
                    tracing::error!(instance = %instance, error = %e, "Failed to remove late container");
                }
            },
        )
    }

    fn attach_listener(&self, app: &Application) -> Result<()> {
        let listeners = Arc::clone(&self.listeners);
        let undo_listeners = Arc::clone(&self.listeners);
        let (port, upstream) = (app.port_app(), app.port_service());
        self.with_deadline_or_undo(
            "listener attach",
            move || listeners.attach(port, upstream),
            move |()| {
                tracing::warn!(port, "Listener attached after its deadline, detaching");
                if let Err(e) = undo_listeners.detach(port) {
                    tracing::error!(port, error = %e, "Failed to detach late listener");
                }
            },
        )
    }

    fn rollback_container(&self, app: &Application) {
        if let Err(e) = self.stop_container(app.instance()) {
            tracing::warn!(instance = %app.instance(), error = %e, "Rollback: container stop failed");
            self.record(app.id(), LogEvent::RolledBack, format!("container stop failed: {}", e));
        } else {
            self.record(app.id(), LogEvent::RolledBack, format!("container {} removed", app.instance()));
        }
    }

    fn rollback_listener(&self, app: &Application) {
        if let Err(e) = self.detach_listener(app.port_app()) {
            tracing::warn!(port = app.port_app(), error = %e, "Rollback: listener detach failed");
            self.record(app.id(), LogEvent::RolledBack, format!("listener detach failed: {}", e));
        }
    }

    // ===== stop steps =====

    fn teardown(&self, app: Application) -> Result<Application> {
        let _stopping = StoppingMark::new(&self.stopping, app.id());
        let mut errors = Vec::new();

        if let Err(e) = self.stop_container(app.instance()) {
            tracing::warn!(id = app.id(), instance = %app.instance(), error = %e, "Container stop failed");
            errors.push(e);
        }

        if let Err(e) = self.detach_listener(app.port_app()) {
            if self.is_shutting_down() {
                tracing::warn!(id = app.id(), port = app.port_app(), error = %e, "Listener detach failed during shutdown");
            } else {
                tracing::warn!(id = app.id(), port = app.port_app(), error = %e, "Listener detach failed");
                errors.push(e);
            }
        }

        let removed = match self.registry.remove(Some(&app)) {
            Ok(removed) => removed,
            Err(e) => {
                errors.push(e);
                app
            }
        };

        if errors.is_empty() {
            tracing::info!(id = removed.id(), instance = %removed.instance(), elapsed = %removed.elapsed_time(), "Application stopped");
            self.record(
                removed.id(),
                LogEvent::Stopped,
                format!("{} after {}", removed.instance(), removed.elapsed_time()),
            );
            Ok(removed)
        } else {
            let err = Error::StopIncomplete {
                id: removed.id(),
                errors,
            };
            self.record(removed.id(), LogEvent::StopFailed, err.to_string());
            Err(err)
        }
    }

    fn stop_container(&self, instance: &str) -> Result<()> {
        let driver = Arc::clone(&self.driver);
        let instance = instance.to_string();
        self.with_deadline("container stop", move || driver.stop(&instance))
    }

    fn detach_listener(&self, port: u16) -> Result<()> {
        let listeners = Arc::clone(&self.listeners);
        self.with_deadline("listener detach", move || listeners.detach(port))
    }

    // ===== helpers =====

    /// Run an external call on a helper thread, giving up after the
    /// configured deadline. A timed-out call keeps running detached.
    fn with_deadline<T, F>(&self, step: &str, call: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
    {
        self.with_deadline_or_undo(step, call, |_| {})
    }

    /// Like [`Self::with_deadline`], but a call that succeeds after the
    /// caller gave up has its result handed to `undo` on the helper thread.
    fn with_deadline_or_undo<T, F, U>(&self, step: &str, call: F, undo: U) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T> + Send + 'static,
        U: FnOnce(T) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let abandoned = Arc::new(Mutex::new(false));
        let worker_abandoned = Arc::clone(&abandoned);

        std::thread::Builder::new()
            .name(format!("local-kube {}", step))
            .spawn(move || {
                let result = call();
                let abandoned = worker_abandoned.lock();
                if !*abandoned {
                    let _ = tx.send(result);
                    return;
                }
                drop(abandoned);
                if let Ok(value) = result {
                    undo(value);
                }
            })?;

        match rx.recv_timeout(self.config.call_timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                let mut abandoned = abandoned.lock();
                // The worker may have reported between the timeout and the lock
                if let Ok(result) = rx.try_recv() {
                    return result;
                }
                *abandoned = true;
                Err(Error::TimeoutExceeded {
                    step: step.to_string(),
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::Io(std::io::Error::other(format!(
                "{} worker exited without a result",
                step
            )))),
        }
    }

    fn record(&self, app_id: u32, event: LogEvent, message: String) {
        if let Err(e) = self.sink.append(&LogEntry::new(app_id, event, message)) {
            tracing::warn!(app_id, %event, error = %e, "Failed to persist log entry");
        }
    }
}

/// Releases an in-flight service port reservation on drop
struct PortReservation<'a> {
    reserved: &'a Mutex<HashSet<u16>>,
    port: u16,
}

impl Drop for PortReservation<'_> {
    fn drop(&mut self) {
        self.reserved.lock().remove(&self.port);
    }
}

/// Marks an application as stopping for as long as it lives
struct StoppingMark<'a> {
    stopping: &'a Mutex<HashSet<u32>>,
    id: u32,
}

impl<'a> StoppingMark<'a> {
    fn new(stopping: &'a Mutex<HashSet<u32>>, id: u32) -> Self {
        stopping.lock().insert(id);
        Self { stopping, id }
    }
}

impl Drop for StoppingMark<'_> {
    fn drop(&mut self) {
        self.stopping.lock().remove(&self.id);
    }
}
