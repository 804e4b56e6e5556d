//! Front-end listeners on public application ports
//!
//! Each attached port gets its own accept loop on the tokio runtime. Every
//! accepted connection is relayed byte-for-byte to the application's
//! service port on the loopback interface.

use std::collections::HashMap;
use std::net::{Ipv4Addr, TcpListener as StdTcpListener};

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};

use crate::{Error, Result};

/// Adds and removes port-bound listeners at runtime.
///
/// Both operations are atomic: a failed attach leaves nothing bound, a
/// failed detach leaves the listener as it was.
#[cfg_attr(test, mockall::automock)]
pub trait ListenerManager: Send + Sync {
    /// Start accepting on `port`, routing traffic to `upstream` on loopback
    fn attach(&self, port: u16, upstream: u16) -> Result<()>;

    /// Stop accepting on `port` and release it
    fn detach(&self, port: u16) -> Result<()>;
}

struct Forward {
    upstream: u16,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// TCP relay listeners driven by a tokio runtime
pub struct TcpForwarder {
    handle: Handle,
    bind_host: String,
    forwards: Mutex<HashMap<u16, Forward>>,
}

impl TcpForwarder {
    pub fn new(handle: Handle, bind_host: impl Into<String>) -> Self {
        Self {
            handle,
            bind_host: bind_host.into(),
            forwards: Mutex::new(HashMap::new()),
        }
    }

    /// Currently attached public ports with their upstream service ports
    pub fn attached_ports(&self) -> Vec<(u16, u16)> {
        let mut ports: Vec<_> = self
            .forwards
            .lock()
            .iter()
            .map(|(port, fwd)| (*port, fwd.upstream))
            .collect();
        ports.sort_unstable();
        ports
    }

    fn bind(&self, port: u16) -> std::io::Result<TcpListener> {
        let std_listener = StdTcpListener::bind((self.bind_host.as_str(), port))?;
        std_listener.set_nonblocking(true)?;
        let _guard = self.handle.enter();
        TcpListener::from_std(std_listener)
    }
}

impl ListenerManager for TcpForwarder {
    fn attach(&self, port: u16, upstream: u16) -> Result<()> {
        let mut forwards = self.forwards.lock();
        if forwards.contains_key(&port) {
            return Err(Error::ListenerAttachFailed {
                port,
                reason: "listener already attached".into(),
            });
        }

        let listener = self.bind(port).map_err(|e| Error::ListenerAttachFailed {
            port,
            reason: e.to_string(),
        })?;

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = self.handle.spawn(accept_loop(listener, port, upstream, shutdown_rx));
        forwards.insert(port, Forward { upstream, shutdown, task });

        tracing::info!(port, upstream, host = %self.bind_host, "Listener attached");
        Ok(())
    }

    fn detach(&self, port: u16) -> Result<()> {
        let forward = self
            .forwards
            .lock()
            .remove(&port)
            .ok_or_else(|| Error::ListenerDetachFailed {
                port,
                reason: "no listener attached".into(),
            })?;

        let _ = forward.shutdown.send(());
        forward.task.abort();

        tracing::info!(port, upstream = forward.upstream, "Listener detached");
        Ok(())
    }
}

impl Drop for TcpForwarder {
    fn drop(&mut self) {
        for (_, forward) in self.forwards.lock().drain() {
            forward.task.abort();
        }
    }
}

/// Accept until told to stop. Relays live in the loop's `JoinSet`, so they
/// are aborted together with it.
async fn accept_loop(
    listener: TcpListener,
    port: u16,
    upstream: u16,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut relays = JoinSet::new();
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((client, peer)) => {
                    tracing::debug!(port, %peer, "Accepted connection");
                    relays.spawn(relay(client, port, upstream));
                }
                Err(e) => {
                    tracing::warn!(port, error = %e, "Accept failed");
                }
            },
            Some(_) = relays.join_next(), if !relays.is_empty() => {}
        }
    }
    relays.shutdown().await;
}

async fn relay(mut client: TcpStream, port: u16, upstream: u16) {
    let mut service = match TcpStream::connect((Ipv4Addr::LOCALHOST, upstream)).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(port, upstream, error = %e, "Service port unreachable");
            return;
        }
    };

    if let Err(e) = tokio::io::copy_bidirectional(&mut client, &mut service).await {
        tracing::debug!(port, upstream, error = %e, "Relay closed with error");
    }
}
