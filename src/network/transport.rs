use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::{debug, info};

use crate::crypto::{Keypair, NodeId};
use crate::network::codec::{Frame, FrameCodec, MAX_FRAME_LEN};
use crate::network::enode::NodeRecord;
use crate::network::secure;
use crate::utils::Result;

/// Authenticated, framed, ordered stream. Deadlines are applied by the caller
/// around these futures.
#[async_trait]
pub trait SecureChannel: Send {
    async fn read_frame(&mut self) -> io::Result<Frame>;

    /// Returns the number of frame body bytes written.
    async fn write_frame(&mut self, frame: Frame) -> io::Result<usize>;

    /// Switch payload compression on or off for subsequent frames.
    fn set_compressed(&mut self, enabled: bool);

    async fn close(&mut self) -> io::Result<()>;
}

/// [`SecureChannel`] over any byte stream, using [`FrameCodec`] framing and the
/// identity handshake in [`secure`].
pub struct FramedChannel<S> {
    framed: Framed<S, FrameCodec>,
    remote: NodeId,
    compressed: bool,
}

impl<S> FramedChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Run the dialing side of the secure handshake on `stream`.
    pub async fn initiate(stream: S, local: &Keypair, remote: NodeId) -> Result<Self> {
        let mut framed = Framed::new(stream, FrameCodec::new());
        secure::initiate(&mut framed, local, &remote).await?;
        Ok(Self { framed, remote, compressed: false })
    }

    /// Run the listening side of the secure handshake on `stream`.
    pub async fn accept(stream: S, local: &Keypair) -> Result<Self> {
        let mut framed = Framed::new(stream, FrameCodec::new());
        let remote = secure::accept(&mut framed, local).await?;
        Ok(Self { framed, remote, compressed: false })
    }

    pub fn remote_id(&self) -> NodeId {
        self.remote
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed
    }
}

#[async_trait]
impl<S> SecureChannel for FramedChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_frame(&mut self) -> io::Result<Frame> {
        let frame = match self.framed.next().await {
            Some(frame) => frame?,
            None => return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed by peer")),
        };
        if !self.compressed {
            return Ok(frame);
        }
        let payload = decompress(&frame.payload)?;
        Ok(Frame::new(frame.code, payload))
    }

    async fn write_frame(&mut self, frame: Frame) -> io::Result<usize> {
        let frame = if self.compressed {
            let payload = snap::raw::Encoder::new().compress_vec(&frame.payload).map_err(invalid_data)?;
            Frame::new(frame.code, Bytes::from(payload))
        } else {
            frame
        };
        let n = frame.body_len();
        self.framed.send(frame).await?;
        Ok(n)
    }

    fn set_compressed(&mut self, enabled: bool) {
        debug!("snappy payload compression {}", if enabled { "on" } else { "off" });
        self.compressed = enabled;
    }

    async fn close(&mut self) -> io::Result<()> {
        SinkExt::close(&mut self.framed).await
    }
}

fn invalid_data(e: snap::Error) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

/// Snappy-decode a payload, refusing anything that would expand past a frame.
fn decompress(payload: &[u8]) -> io::Result<Vec<u8>> {
    let len = snap::raw::decompress_len(payload).map_err(invalid_data)?;
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("decompressed payload of {len} bytes exceeds {MAX_FRAME_LEN}"),
        ));
    }
    snap::raw::Decoder::new().decompress_vec(payload).map_err(invalid_data)
}

/// Connect over TCP and authenticate the remote as `record.id`.
pub async fn connect(record: &NodeRecord, local: &Keypair) -> Result<FramedChannel<TcpStream>> {
    let addr = record.socket_addr();
    debug!("connecting to {addr}");
    let stream = TcpStream::connect(&addr).await?;
    stream.set_nodelay(true)?;
    let channel = FramedChannel::initiate(stream, local, record.id).await?;
    info!("secure channel established with {} at {addr}", record.id);
    Ok(channel)
}
