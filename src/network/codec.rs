use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Upper bound on a single frame body (code + payload).
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

const CODE_LEN: usize = 8;

/// One message on the wire: a numeric code and its encoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub code: u64,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(code: u64, payload: impl Into<Bytes>) -> Self {
        Self { code, payload: payload.into() }
    }

    /// Bytes this frame occupies inside its length prefix.
    pub fn body_len(&self) -> usize {
        CODE_LEN + self.payload.len()
    }
}

/// Length-delimited framing with an 8-byte big-endian message code in front of
/// each payload. Payload encoding is left to the message layer.
#[derive(Debug)]
pub struct FrameCodec {
    inner: LengthDelimitedCodec,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .max_frame_length(MAX_FRAME_LEN)
                .new_codec(),
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(mut buf) = self.inner.decode(src)? else {
            return Ok(None);
        };
        if buf.len() < CODE_LEN {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {} bytes is too short for a message code", buf.len()),
            ));
        }
        let code = buf.get_u64();
        Ok(Some(Frame { code, payload: buf.freeze() }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let mut body = BytesMut::with_capacity(item.body_len());
        body.put_u64(item.code);
        body.extend_from_slice(&item.payload);
        self.inner.encode(body.freeze(), dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use tokio_test::io::Builder;
    use tokio_util::codec::Framed;

    #[test]
    fn frame_layout_is_length_code_payload() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Frame::new(0x13, vec![0xaa, 0xbb]), &mut buf).unwrap();
        assert_eq!(
            &buf[..],
            &[0, 0, 0, 10, 0, 0, 0, 0, 0, 0, 0, 0x13, 0xaa, 0xbb][..]
        );
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame, Frame::new(0x13, vec![0xaa, 0xbb]));
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frames_wait_for_more_bytes() {
        let mut codec = FrameCodec::new();
        let mut full = BytesMut::new();
        codec.encode(Frame::new(2, Bytes::new()), &mut full).unwrap();

        let mut partial = BytesMut::from(&full[..6]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
        partial.extend_from_slice(&full[6..]);
        assert_eq!(codec.decode(&mut partial).unwrap(), Some(Frame::new(2, Bytes::new())));
    }

    #[test]
    fn short_body_is_invalid_data() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[0u8, 0, 0, 3, 1, 2, 3][..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[tokio::test]
    async fn framed_io_is_byte_exact() {
        let pong = [0u8, 0, 0, 8, 0, 0, 0, 0, 0, 0, 0, 3];
        let ping = [0u8, 0, 0, 8, 0, 0, 0, 0, 0, 0, 0, 2];
        let mock = Builder::new().read(&ping).write(&pong).build();
        let mut framed = Framed::new(mock, FrameCodec::new());

        let frame = framed.next().await.unwrap().unwrap();
        assert_eq!(frame, Frame::new(2, Bytes::new()));
        framed.send(Frame::new(3, Bytes::new())).await.unwrap();
    }
}
