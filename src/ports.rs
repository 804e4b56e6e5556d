//! Service port allocation
//!
//! Service ports live in the IANA dynamic range. A port is considered free
//! when a transient bind on the loopback interface succeeds; the probe
//! socket is released before the port is handed out, so another process
//! can still grab it before the container binds. Callers retry on that.

use std::collections::HashSet;
use std::net::{Ipv4Addr, TcpListener};
use std::ops::RangeInclusive;

use crate::{Error, Result};

/// Dynamic/private port range used for service ports
pub const SERVICE_PORT_RANGE: RangeInclusive<u16> = 49152..=65535;

/// Source of free service ports
pub trait PortAllocator: Send + Sync {
    /// Return a currently bindable port that is not in `excluded`
    fn acquire(&self, excluded: &HashSet<u16>) -> Result<u16>;
}

/// Probes ports in ascending order, starting at the bottom of the range
/// on every call.
#[derive(Debug, Clone)]
pub struct ProbingAllocator {
    range: RangeInclusive<u16>,
}

impl Default for ProbingAllocator {
    fn default() -> Self {
        Self {
            range: SERVICE_PORT_RANGE,
        }
    }
}

impl ProbingAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict probing to a sub-range of [`SERVICE_PORT_RANGE`]
    pub fn with_range(range: RangeInclusive<u16>) -> Self {
        let start = (*range.start()).max(*SERVICE_PORT_RANGE.start());
        let end = *range.end();
        Self { range: start..=end }
    }

    pub fn range(&self) -> &RangeInclusive<u16> {
        &self.range
    }
}

impl PortAllocator for ProbingAllocator {
    fn acquire(&self, excluded: &HashSet<u16>) -> Result<u16> {
        for port in self.range.clone() {
            if excluded.contains(&port) {
                continue;
            }
            if is_bindable(port) {
                tracing::debug!(port, "Service port available");
                return Ok(port);
            }
        }

        Err(Error::NoFreePort {
            min: *self.range.start(),
            max: *self.range.end(),
        })
    }
}

/// Try a transient bind; the listener is dropped before returning.
pub fn is_bindable(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
}
