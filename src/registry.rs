//! In-memory registry of live applications
//!
//! The registry is the only authoritative mutable state in the process. A
//! single `RwLock` guards it, which makes every operation linearizable with
//! respect to every other.

use parking_lot::RwLock;

use crate::models::Application;
use crate::{Error, Result};

/// Thread-safe collection of registered applications, in insertion order
#[derive(Debug, Default)]
pub struct Registry {
    apps: RwLock<Vec<Application>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `max(id) + 1` over the current members, or 1 when empty.
    ///
    /// Ids of removed applications may be handed out again.
    pub fn next_id(&self) -> u32 {
        self.apps
            .read()
            .iter()
            .map(Application::id)
            .max()
            .map_or(1, |max| max + 1)
    }

    /// Add an application, stamping its start time
    pub fn insert(&self, app: Option<Application>) -> Result<Application> {
        let app = app.ok_or_else(|| Error::InvalidArgument("cannot insert null application".into()))?;

        let mut apps = self.apps.write();
        if apps.iter().any(|a| a.id() == app.id()) {
            return Err(Error::DuplicateId(app.id()));
        }

        let app = app.restamp();
        apps.push(app.clone());
        tracing::debug!(id = app.id(), instance = %app.instance(), "Registered application");
        Ok(app)
    }

    /// Remove an application by id
    pub fn remove(&self, app: Option<&Application>) -> Result<Application> {
        let app = app.ok_or_else(|| Error::InvalidArgument("cannot remove null application".into()))?;

        let mut apps = self.apps.write();
        let index = apps
            .iter()
            .position(|a| a.id() == app.id())
            .ok_or_else(|| Error::NotFound(app.id().to_string()))?;

        let removed = apps.remove(index);
        tracing::debug!(id = removed.id(), instance = %removed.instance(), "Unregistered application");
        Ok(removed)
    }

    /// Look up by id; zero, negative and unknown ids yield `None`
    pub fn find_by_id(&self, id: i64) -> Option<Application> {
        if id <= 0 {
            return None;
        }
        self.apps.read().iter().find(|a| i64::from(a.id()) == id).cloned()
    }

    /// Live application serving the given public port, if any
    pub fn find_by_app_port(&self, port: u16) -> Option<Application> {
        self.apps.read().iter().find(|a| a.port_app() == port).cloned()
    }

    pub fn service_ports(&self) -> Vec<u16> {
        self.apps.read().iter().map(Application::port_service).collect()
    }

    /// Point-in-time copy in insertion order
    pub fn snapshot(&self) -> Vec<Application> {
        self.apps.read().clone()
    }

    pub fn size(&self) -> usize {
        self.apps.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.apps.read().is_empty()
    }
}
