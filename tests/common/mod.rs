//! In-process collaborators shared by the integration tests

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use local_kube::ports::SERVICE_PORT_RANGE;
use local_kube::{
    Application, ContainerDriver, Error, ListenerManager, MemoryLogSink, Orchestrator, PortAllocator,
    Registry, Result,
};
use parking_lot::Mutex;

/// Driver that tracks which containers are live
#[derive(Default)]
pub struct FakeDriver {
    live: Mutex<HashSet<String>>,
    refused: Mutex<HashSet<String>>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every start of `instance` fail
    pub fn refuse(&self, instance: &str) {
        self.refused.lock().insert(instance.to_string());
    }

    pub fn is_live(&self, instance: &str) -> bool {
        self.live.lock().contains(instance)
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }
}

impl ContainerDriver for FakeDriver {
    fn start(&self, app: &Application) -> Result<()> {
        if self.refused.lock().contains(app.instance()) {
            return Err(Error::ContainerStartFailed {
                instance: app.instance().to_string(),
                reason: "image not found".into(),
            });
        }
        if !self.live.lock().insert(app.instance().to_string()) {
            return Err(Error::ContainerStartFailed {
                instance: app.instance().to_string(),
                reason: "container name already in use".into(),
            });
        }
        Ok(())
    }

    fn stop(&self, instance: &str) -> Result<()> {
        if self.live.lock().remove(instance) {
            Ok(())
        } else {
            Err(Error::ContainerStopFailed {
                instance: instance.to_string(),
                reason: "no such container".into(),
            })
        }
    }
}

/// Listener manager that records bound ports without opening sockets
#[derive(Default)]
pub struct FakeListeners {
    bound: Mutex<HashMap<u16, u16>>,
    busy: Mutex<HashSet<u16>>,
}

impl FakeListeners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a port held by another process
    pub fn occupy(&self, port: u16) {
        self.busy.lock().insert(port);
    }

    pub fn is_bound(&self, port: u16) -> bool {
        self.bound.lock().contains_key(&port)
    }

    pub fn upstream(&self, port: u16) -> Option<u16> {
        self.bound.lock().get(&port).copied()
    }

    pub fn bound_count(&self) -> usize {
        self.bound.lock().len()
    }
}

impl ListenerManager for FakeListeners {
    fn attach(&self, port: u16, upstream: u16) -> Result<()> {
        if self.busy.lock().contains(&port) {
            return Err(Error::ListenerAttachFailed {
                port,
                reason: "address already in use".into(),
            });
        }
        let mut bound = self.bound.lock();
        if bound.contains_key(&port) {
            return Err(Error::ListenerAttachFailed {
                port,
                reason: "already attached".into(),
            });
        }
        bound.insert(port, upstream);
        Ok(())
    }

    fn detach(&self, port: u16) -> Result<()> {
        self.bound
            .lock()
            .remove(&port)
            .map(|_| ())
            .ok_or_else(|| Error::ListenerDetachFailed {
                port,
                reason: "not attached".into(),
            })
    }
}

/// Lowest service port not excluded, without touching the network
pub struct SequentialAllocator;

impl PortAllocator for SequentialAllocator {
    fn acquire(&self, excluded: &HashSet<u16>) -> Result<u16> {
        SERVICE_PORT_RANGE
            .clone()
            .find(|p| !excluded.contains(p))
            .ok_or(Error::NoFreePort {
                min: *SERVICE_PORT_RANGE.start(),
                max: *SERVICE_PORT_RANGE.end(),
            })
    }
}

/// Allocator with nothing left to give
pub struct ExhaustedAllocator;

impl PortAllocator for ExhaustedAllocator {
    fn acquire(&self, _excluded: &HashSet<u16>) -> Result<u16> {
        Err(Error::NoFreePort {
            min: *SERVICE_PORT_RANGE.start(),
            max: *SERVICE_PORT_RANGE.end(),
        })
    }
}

pub struct Harness {
    pub orch: Arc<Orchestrator>,
    pub registry: Arc<Registry>,
    pub driver: Arc<FakeDriver>,
    pub listeners: Arc<FakeListeners>,
    pub sink: Arc<MemoryLogSink>,
}

pub fn harness() -> Harness {
    harness_with(Arc::new(SequentialAllocator))
}

pub fn harness_with(allocator: Arc<dyn PortAllocator>) -> Harness {
    let registry = Arc::new(Registry::new());
    let driver = Arc::new(FakeDriver::new());
    let listeners = Arc::new(FakeListeners::new());
    let sink = Arc::new(MemoryLogSink::new());
    let orch = Orchestrator::new(Arc::clone(&registry), driver.clone(), listeners.clone())
        .with_allocator(allocator)
        .with_log_sink(sink.clone());

    Harness {
        orch: Arc::new(orch),
        registry,
        driver,
        listeners,
        sink,
    }
}
