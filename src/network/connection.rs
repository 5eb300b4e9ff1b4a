use std::fmt;
use std::future::Future;
use std::io;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

use bytes::Bytes;
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::crypto::{Keypair, NodeId};
use crate::network::codec::Frame;
use crate::network::enode::NodeRecord;
use crate::network::message::{Capability, LocalError, Message};
use crate::network::transport::{self, FramedChannel, SecureChannel};
use crate::utils::{ConformanceError, Result};

pub const ETH_64: u32 = 64;
pub const ETH_65: u32 = 65;
pub const ETH_66: u32 = 66;

/// A dialed peer: secure channel, local identity, advertised capabilities and the
/// negotiated eth version (0 until the handshake succeeds).
///
/// All I/O goes through `&mut self`, so one connection is driven by one task.
pub struct Connection<C: SecureChannel = FramedChannel<TcpStream>> {
    channel: Option<C>,
    keypair: Keypair,
    caps: Vec<Capability>,
    our_highest_protocol: u32,
    negotiated_version: u32,
    config: ClientConfig,
    deadline: Option<Instant>,
}

/// Dial `node` (an `enode://` record) and advertise eth/64 and eth/65.
pub async fn dial(node: &str, config: ClientConfig) -> Result<Connection> {
    let record: NodeRecord = node.parse()?;
    let keypair = Keypair::generate()?;
    let channel = transport::connect(&record, &keypair).await?;
    Ok(Connection::new(channel, keypair, config))
}

/// [`dial`], then also advertise eth/66.
pub async fn dial_with_newest_generation(node: &str, config: ClientConfig) -> Result<Connection> {
    let mut conn = dial(node, config).await?;
    conn.add_capability(ETH_66);
    Ok(conn)
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "connection closed")
}

/// Run `fut` until the deadline, if any. `None` means the deadline passed first.
async fn within<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(at) => timeout_at(at, fut).await.ok(),
        None => Some(fut.await),
    }
}

impl<C: SecureChannel> Connection<C> {
    pub fn new(channel: C, keypair: Keypair, config: ClientConfig) -> Self {
        Self {
            channel: Some(channel),
            keypair,
            caps: vec![Capability::eth(ETH_64), Capability::eth(ETH_65)],
            our_highest_protocol: ETH_65,
            negotiated_version: 0,
            config,
            deadline: None,
        }
    }

    /// Advertise another eth version. Only meaningful before the handshake.
    pub fn add_capability(&mut self, version: u32) {
        let cap = Capability::eth(version);
        if !self.caps.contains(&cap) {
            self.caps.push(cap);
        }
        self.our_highest_protocol = self.our_highest_protocol.max(version);
    }

    pub fn caps(&self) -> &[Capability] {
        &self.caps
    }

    pub fn our_highest_protocol(&self) -> u32 {
        self.our_highest_protocol
    }

    pub fn negotiated_version(&self) -> u32 {
        self.negotiated_version
    }

    pub(crate) fn set_negotiated_version(&mut self, version: u32) {
        self.negotiated_version = version;
    }

    pub fn local_id(&self) -> NodeId {
        self.keypair.node_id()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_none()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    /// Bound every read and write until the guard drops.
    pub fn with_deadline(&mut self, timeout: Duration) -> DeadlineGuard<'_, C> {
        self.with_deadline_at(Instant::now() + timeout)
    }

    pub fn with_deadline_at(&mut self, at: Instant) -> DeadlineGuard<'_, C> {
        self.deadline = Some(at);
        DeadlineGuard { conn: self }
    }

    pub(crate) fn set_compressed(&mut self, enabled: bool) {
        if let Some(channel) = self.channel.as_mut() {
            channel.set_compressed(enabled);
        }
    }

    async fn read_frame(&mut self) -> std::result::Result<Frame, LocalError> {
        let deadline = self.deadline;
        let channel = self.channel.as_mut().ok_or_else(|| LocalError::Read(closed()))?;
        match within(deadline, channel.read_frame()).await {
            Some(Ok(frame)) => Ok(frame),
            Some(Err(e)) => Err(LocalError::Read(e)),
            None => Err(LocalError::DeadlineExceeded),
        }
    }

    async fn write_frame(&mut self, frame: Frame) -> Result<usize> {
        let deadline = self.deadline;
        let channel = self.channel.as_mut().ok_or_else(closed)?;
        match within(deadline, channel.write_frame(frame)).await {
            Some(written) => Ok(written?),
            None => Err(ConformanceError::Timeout("write deadline exceeded".into())),
        }
    }

    /// Read one message through the plain decode surface.
    pub async fn read(&mut self) -> std::result::Result<Message, LocalError> {
        let frame = self.read_frame().await?;
        Message::decode(frame.code, &frame.payload)
    }

    /// Read one message through the correlated decode surface.
    pub async fn read_correlated(&mut self) -> std::result::Result<(u64, Message), LocalError> {
        let frame = self.read_frame().await?;
        Message::decode_correlated(frame.code, &frame.payload)
    }

    pub async fn write(&mut self, msg: &Message) -> Result<usize> {
        let payload = msg.encode().map_err(|e| ConformanceError::Encode(e.to_string()))?;
        self.write_frame(Frame::new(msg.code(), Bytes::from(payload))).await
    }

    pub async fn write_correlated(&mut self, request_id: u64, msg: &Message) -> Result<usize> {
        let payload = msg
            .encode_correlated(request_id)
            .map_err(|e| ConformanceError::Encode(e.to_string()))?;
        self.write_frame(Frame::new(msg.code(), Bytes::from(payload))).await
    }

    /// Release the channel. Later calls are no-ops.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(mut channel) = self.channel.take() {
            debug!("closing connection");
            channel.close().await?;
            info!("connection closed");
        }
        Ok(())
    }
}

impl<C: SecureChannel> fmt::Debug for Connection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("caps", &self.caps)
            .field("negotiated_version", &self.negotiated_version)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Scoped deadline: derefs to the connection and clears its deadline on drop.
pub struct DeadlineGuard<'a, C: SecureChannel> {
    conn: &'a mut Connection<C>,
}

impl<C: SecureChannel> Deref for DeadlineGuard<'_, C> {
    type Target = Connection<C>;

    fn deref(&self) -> &Self::Target {
        self.conn
    }
}

impl<C: SecureChannel> DerefMut for DeadlineGuard<'_, C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn
    }
}

impl<C: SecureChannel> Drop for DeadlineGuard<'_, C> {
    fn drop(&mut self) {
        self.conn.deadline = None;
    }
}
