//! ==============================================================================
//! mesh.rs - broadcast transport seam
//! ==============================================================================
//!
//! purpose:
//!     send-to-all messaging between nodes, with no addressing and no
//!     delivery guarantee. incoming messages never arrive through a callback:
//!     the transport posts them into a Mailbox during its service step and the
//!     control loop drains it on the same iteration.
//!
//! relationships:
//!     - used by: sensor_role.rs, actuator_role.rs (control loops)
//!     - configured by: config.rs ([mesh] section)
//!
//! frames (udp adapter):
//!     {"mesh":"dutymesh","from":3735928559,"msg":"<wire message>","sig":"<hex>"}
//!
//!     - mesh: network identifier, frames for other meshes are ignored
//!     - from: random per-boot sender id, a node drops its own broadcasts
//!     - sig:  sha-256 over password, sender and message
//!
//! ==============================================================================

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::VecDeque;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::config::MeshConfig;

const MAX_FRAME: usize = 2048;

pub trait MeshTransport {
    /// fire-and-forget send to every reachable peer
    fn broadcast(&mut self, payload: &str) -> impl Future<Output = Result<()>>;

    /// one bounded servicing step: waits up to one tick and posts whatever
    /// arrived into `inbox`
    fn service(&mut self, inbox: &mut Mailbox) -> impl Future<Output = Result<()>>;
}

// ==============================================================================
// mailbox
// ==============================================================================

/// bounded hand-off between transport and control loop; drops the oldest
/// message when full
#[derive(Debug)]
pub struct Mailbox {
    queue: VecDeque<String>,
    capacity: usize,
}

impl Mailbox {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { queue: VecDeque::with_capacity(capacity), capacity }
    }

    pub fn post(&mut self, msg: String) {
        if self.queue.len() == self.capacity {
            if let Some(dropped) = self.queue.pop_front() {
                warn!(dropped = %dropped, "mailbox full, dropping oldest message");
            }
        }
        self.queue.push_back(msg);
    }

    pub fn take(&mut self) -> Option<String> {
        self.queue.pop_front()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

// ==============================================================================
// frame envelope
// ==============================================================================

#[derive(Serialize, Deserialize)]
struct Frame {
    mesh: String,
    from: u32,
    msg: String,
    sig: String,
}

pub struct FrameCodec {
    prefix: String,
    password: String,
    sender_id: u32,
}

impl FrameCodec {
    pub fn new(cfg: &MeshConfig, sender_id: u32) -> Self {
        Self {
            prefix: cfg.prefix.clone(),
            password: cfg.password.clone(),
            sender_id,
        }
    }

    fn sign(&self, from: u32, msg: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.password.as_bytes());
        hasher.update(from.to_be_bytes());
        hasher.update(msg.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn seal(&self, msg: &str) -> Result<Vec<u8>> {
        let frame = Frame {
            mesh: self.prefix.clone(),
            from: self.sender_id,
            msg: msg.to_string(),
            sig: self.sign(self.sender_id, msg),
        };
        Ok(serde_json::to_vec(&frame)?)
    }

    /// the carried message, or `None` for garbage, foreign meshes, bad
    /// credentials and our own broadcasts
    pub fn open(&self, bytes: &[u8]) -> Option<String> {
        let frame: Frame = serde_json::from_slice(bytes).ok()?;
        if frame.mesh != self.prefix || frame.from == self.sender_id {
            return None;
        }
        if frame.sig != self.sign(frame.from, &frame.msg) {
            return None;
        }
        Some(frame.msg)
    }
}

// ==============================================================================
// udp adapter
// ==============================================================================

pub struct UdpMeshTransport {
    socket: UdpSocket,
    target: SocketAddr,
    frames: FrameCodec,
    tick: Duration,
}

impl UdpMeshTransport {
    /// joins the mesh port; several nodes on one host can share it
    pub async fn bind(cfg: &MeshConfig) -> Result<Self> {
        let socket = shared_socket(cfg.port)
            .with_context(|| format!("failed to bind mesh port {}", cfg.port))?;
        let socket = UdpSocket::from_std(socket)?;
        let target: SocketAddr = format!("{}:{}", cfg.broadcast_addr, cfg.port)
            .parse()
            .with_context(|| format!("invalid broadcast address {}", cfg.broadcast_addr))?;
        Ok(Self::from_socket(socket, target, cfg))
    }

    pub fn from_socket(socket: UdpSocket, target: SocketAddr, cfg: &MeshConfig) -> Self {
        let sender_id = rand::random::<u32>();
        debug!(sender_id, %target, "mesh transport ready");
        Self {
            socket,
            target,
            frames: FrameCodec::new(cfg, sender_id),
            tick: cfg.tick(),
        }
    }
}

fn shared_socket(port: u16) -> Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_broadcast(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddr::from(([0, 0, 0, 0], port)).into())?;
    Ok(socket.into())
}

impl MeshTransport for UdpMeshTransport {
    async fn broadcast(&mut self, payload: &str) -> Result<()> {
        let frame = self.frames.seal(payload)?;
        self.socket
            .send_to(&frame, self.target)
            .await
            .context("mesh broadcast failed")?;
        Ok(())
    }

    async fn service(&mut self, inbox: &mut Mailbox) -> Result<()> {
        let mut buf = [0u8; MAX_FRAME];
        match tokio::time::timeout(self.tick, self.socket.recv_from(&mut buf)).await {
            Err(_) => Ok(()),
            Ok(Err(e)) => Err(e).context("mesh receive failed"),
            Ok(Ok((len, from))) => {
                match self.frames.open(&buf[..len]) {
                    Some(msg) => {
                        debug!(%from, %msg, "mesh message");
                        inbox.post(msg);
                    }
                    None => debug!(%from, "ignored frame"),
                }
                Ok(())
            }
        }
    }
}

// ==============================================================================
// in-memory pair (tests)
// ==============================================================================
#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use tokio::sync::mpsc;

    /// one end of a two-node mesh living in a single runtime
    pub(crate) struct MemoryTransport {
        tx: mpsc::UnboundedSender<String>,
        rx: mpsc::UnboundedReceiver<String>,
        tick: Duration,
        pub sent: Vec<String>,
    }

    pub(crate) fn pair(tick: Duration) -> (MemoryTransport, MemoryTransport) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            MemoryTransport { tx: a_tx, rx: a_rx, tick, sent: Vec::new() },
            MemoryTransport { tx: b_tx, rx: b_rx, tick, sent: Vec::new() },
        )
    }

    impl MemoryTransport {
        /// everything the peer sent that this end has not serviced yet
        pub fn pending(&mut self) -> Vec<String> {
            let mut out = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                out.push(msg);
            }
            out
        }
    }

    impl MeshTransport for MemoryTransport {
        async fn broadcast(&mut self, payload: &str) -> Result<()> {
            self.sent.push(payload.to_string());
            self.tx
                .send(payload.to_string())
                .map_err(|_| anyhow::anyhow!("no peer in range"))
        }

        async fn service(&mut self, inbox: &mut Mailbox) -> Result<()> {
            match tokio::time::timeout(self.tick, self.rx.recv()).await {
                Ok(Some(msg)) => inbox.post(msg),
                // peer gone: behave like an empty air tick
                Ok(None) => tokio::time::sleep(self.tick).await,
                Err(_) => {}
            }
            Ok(())
        }
    }
}
