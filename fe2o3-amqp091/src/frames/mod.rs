//! Frame type and the corresponding encoder and decoder
//!
//! Every frame is laid out as
//!
//! ```text
//! +------+---------+---------+-------------------+-----------+
//! | type | channel |  size   |      payload      | frame-end |
//! |  u8  |   u16   |   u32   |   `size` octets   |   0xCE    |
//! +------+---------+---------+-------------------+-----------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use fe2o3_amqp091_types::{
    definitions::{
        FRAME_BODY, FRAME_END, FRAME_HEADER, FRAME_HEADER_SIZE, FRAME_HEARTBEAT, FRAME_METHOD,
        FRAME_OVERHEAD,
    },
    methods::Method,
    properties::ContentHeader,
};
use tokio_util::codec::{Decoder, Encoder};

mod error;
pub use error::Error;

/// A single frame
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Channel of the frame, 0 for the connection itself
    pub channel: u16,

    /// Frame body
    pub body: FrameBody,
}

impl Frame {
    /// Creates a new frame
    pub fn new(channel: impl Into<u16>, body: FrameBody) -> Self {
        Self {
            channel: channel.into(),
            body,
        }
    }

    /// Creates a method frame
    pub fn method(channel: u16, method: impl Into<Method>) -> Self {
        Self::new(channel, FrameBody::Method(method.into()))
    }

    /// Creates a heartbeat frame. Heartbeats are only ever sent on channel 0
    pub fn heartbeat() -> Self {
        Self::new(0u16, FrameBody::Heartbeat)
    }

    /// Get the channel of the frame
    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// Get the body of the frame
    pub fn body(&self) -> &FrameBody {
        &self.body
    }

    /// Consume the frame to get the frame body
    pub fn into_body(self) -> FrameBody {
        self.body
    }

    /// Splits a content-bearing method, its properties and its body into the
    /// method frame, the content header frame and as many body frames as the
    /// frame-max requires. A `max_frame_size` of 0 means no limit.
    pub fn content(
        channel: u16,
        method: Method,
        header: ContentHeader,
        mut body: Bytes,
        max_frame_size: usize,
    ) -> Vec<Frame> {
        let chunk_size = match max_frame_size {
            0 => body.len().max(1),
            max => max - FRAME_OVERHEAD,
        };
        let mut frames = Vec::with_capacity(2 + body.len() / chunk_size + 1);
        frames.push(Frame::new(channel, FrameBody::Method(method)));
        frames.push(Frame::new(channel, FrameBody::Header(header)));
        while !body.is_empty() {
            let chunk = body.split_to(chunk_size.min(body.len()));
            frames.push(Frame::new(channel, FrameBody::Body(chunk)));
        }
        frames
    }
}

/// Frame body
#[derive(Debug, Clone, PartialEq)]
pub enum FrameBody {
    /// Method frame
    Method(Method),

    /// Content header frame
    Header(ContentHeader),

    /// Content body frame
    Body(Bytes),

    /// Heartbeat frame
    Heartbeat,
}

impl FrameBody {
    fn frame_type(&self) -> u8 {
        match self {
            FrameBody::Method(_) => FRAME_METHOD,
            FrameBody::Header(_) => FRAME_HEADER,
            FrameBody::Body(_) => FRAME_BODY,
            FrameBody::Heartbeat => FRAME_HEARTBEAT,
        }
    }

    fn encode_payload(self) -> Result<Bytes, Error> {
        let mut buf = BytesMut::new();
        match self {
            FrameBody::Method(method) => method.encode(&mut buf).map_err(Error::Encode)?,
            FrameBody::Header(header) => header.encode(&mut buf).map_err(Error::Encode)?,
            FrameBody::Body(body) => return Ok(body),
            FrameBody::Heartbeat => {}
        }
        Ok(buf.freeze())
    }
}

/// Encoder and decoder of frames
///
/// The payload of a frame is encoded completely before anything is written
/// into the destination buffer, so a frame that fails to encode leaves the
/// stream untouched
#[derive(Debug, Clone)]
pub struct FrameCodec {
    /// Max frame size including header and frame-end, 0 means no limit
    max_frame_size: usize,
}

impl FrameCodec {
    /// Creates a new codec
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Max frame size of the codec
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Change the max frame size, eg. after tuning
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) -> &mut Self {
        self.max_frame_size = max_frame_size;
        self
    }

    fn check_size(&self, size: usize) -> Result<(), Error> {
        if self.max_frame_size != 0 && size > self.max_frame_size {
            return Err(Error::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        Ok(())
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let Frame { channel, body } = item;
        let frame_type = body.frame_type();
        let payload = body.encode_payload()?;

        let total = FRAME_OVERHEAD + payload.len();
        self.check_size(total)?;
        let size = u32::try_from(payload.len()).map_err(|_| Error::FrameTooLarge {
            size: total,
            max: u32::MAX as usize,
        })?;

        dst.reserve(total);
        dst.put_u8(frame_type);
        dst.put_u16(channel);
        dst.put_u32(size);
        dst.put_slice(&payload);
        dst.put_u8(FRAME_END);
        Ok(())
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        // A peer that does not speak the requested version answers with its
        // own protocol header and closes the socket
        if src[0] == b'A' {
            if src.len() < 8 {
                return Ok(None);
            }
            let mut header = [0u8; 8];
            header.copy_from_slice(&src[..8]);
            src.advance(8);
            return Err(Error::ProtocolHeader(header));
        }

        let frame_type = src[0];
        match frame_type {
            FRAME_METHOD | FRAME_HEADER | FRAME_BODY | FRAME_HEARTBEAT => {}
            other => return Err(Error::UnknownFrameType(other)),
        }

        if src.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let channel = u16::from_be_bytes([src[1], src[2]]);
        let size = u32::from_be_bytes([src[3], src[4], src[5], src[6]]) as usize;
        let total = FRAME_OVERHEAD + size;
        self.check_size(total)?;

        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        let end = src[total - 1];
        if end != FRAME_END {
            return Err(Error::FrameEndMismatch(end));
        }

        src.advance(FRAME_HEADER_SIZE);
        let payload = src.split_to(size).freeze();
        src.advance(1);

        let decode_err = |source| Error::Decode { channel, source };
        let body = match frame_type {
            FRAME_METHOD => FrameBody::Method(Method::decode(payload).map_err(decode_err)?),
            FRAME_HEADER => FrameBody::Header(ContentHeader::decode(payload).map_err(decode_err)?),
            FRAME_BODY => FrameBody::Body(payload),
            _ => {
                if channel != 0 {
                    return Err(Error::HeartbeatOnChannel(channel));
                }
                FrameBody::Heartbeat
            }
        };

        Ok(Some(Frame { channel, body }))
    }
}

#[cfg(test)]
mod tests {
    use bytes::{Bytes, BytesMut};
    use fe2o3_amqp091_types::{
        methods::{basic, channel, connection, Method},
        properties::{BasicProperties, ContentHeader},
    };
    use tokio_util::codec::{Decoder, Encoder};

    use super::{Error, Frame, FrameBody, FrameCodec};

    fn encode_all(frames: Vec<Frame>) -> BytesMut {
        let mut codec = FrameCodec::new(0);
        let mut buf = BytesMut::new();
        for frame in frames {
            codec.encode(frame, &mut buf).unwrap();
        }
        buf
    }

    fn sample_frames() -> Vec<Frame> {
        let publish = Method::from(basic::Publish {
            exchange: "".into(),
            routing_key: "q".into(),
            ..Default::default()
        });
        let header = ContentHeader::new(
            5,
            BasicProperties::default().with_content_type("text/plain"),
        );
        let mut frames = vec![Frame::method(1, channel::Open)];
        frames.extend(Frame::content(
            1,
            publish,
            header,
            Bytes::from_static(b"hello"),
            4096,
        ));
        frames.push(Frame::heartbeat());
        frames
    }

    #[test]
    fn heartbeat_layout() {
        let buf = encode_all(vec![Frame::heartbeat()]);
        assert_eq!(&buf[..], &[8, 0, 0, 0, 0, 0, 0, 0xCE]);
    }

    #[test]
    fn method_frame_layout() {
        let buf = encode_all(vec![Frame::method(0, connection::CloseOk)]);
        assert_eq!(&buf[..], &[1, 0, 0, 0, 0, 0, 4, 0, 10, 0, 51, 0xCE]);
    }

    #[test]
    fn decode_whole_stream() {
        let frames = sample_frames();
        let mut buf = encode_all(frames.clone());

        let mut codec = FrameCodec::new(4096);
        let mut decoded = Vec::new();
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            decoded.push(frame);
        }
        assert_eq!(decoded, frames);
        assert!(buf.is_empty());
    }

    #[test]
    fn decoding_byte_by_byte_yields_the_same_frames() {
        let frames = sample_frames();
        let bytes = encode_all(frames.clone());

        let mut codec = FrameCodec::new(4096);
        let mut buf = BytesMut::new();
        let mut decoded = Vec::new();
        for byte in bytes.iter() {
            buf.extend_from_slice(&[*byte]);
            while let Some(frame) = codec.decode(&mut buf).unwrap() {
                decoded.push(frame);
            }
        }
        assert_eq!(decoded, frames);
    }

    #[test]
    fn body_is_split_by_frame_max() {
        let body = Bytes::from(vec![7u8; 10000]);
        let frames = Frame::content(
            1,
            Method::from(basic::Publish::default()),
            ContentHeader::new(10000, BasicProperties::default()),
            body,
            4096,
        );
        let sizes: Vec<usize> = frames
            .iter()
            .filter_map(|f| match &f.body {
                FrameBody::Body(b) => Some(b.len()),
                _ => None,
            })
            .collect();
        assert_eq!(sizes, vec![4088, 4088, 1824]);

        let mut codec = FrameCodec::new(4096);
        let mut buf = BytesMut::new();
        for frame in frames {
            codec.encode(frame, &mut buf).unwrap();
        }
    }

    #[test]
    fn empty_body_has_no_body_frames() {
        let frames = Frame::content(
            1,
            Method::from(basic::Publish::default()),
            ContentHeader::new(0, BasicProperties::default()),
            Bytes::new(),
            4096,
        );
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn frame_end_mismatch_is_fatal() {
        let mut buf = BytesMut::from(&[8, 0, 0, 0, 0, 0, 0, 0xCD][..]);
        let mut codec = FrameCodec::new(4096);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::FrameEndMismatch(0xCD))
        ));
    }

    #[test]
    fn oversized_frame_is_rejected_before_payload_arrives() {
        // declares 8192 bytes of payload, nothing more has been received
        let mut buf = BytesMut::from(&[3, 0, 1, 0, 0, 0x20, 0][..]);
        let mut codec = FrameCodec::new(4096);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::FrameTooLarge { size: 8200, max: 4096 })
        ));
    }

    #[test]
    fn oversized_frame_is_not_encoded() {
        let mut codec = FrameCodec::new(4096);
        let mut buf = BytesMut::new();
        let frame = Frame::new(1u16, FrameBody::Body(Bytes::from(vec![0u8; 4089])));
        assert!(matches!(
            codec.encode(frame, &mut buf),
            Err(Error::FrameTooLarge { .. })
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn unknown_frame_type() {
        let mut buf = BytesMut::from(&[4, 0, 0][..]);
        let mut codec = FrameCodec::new(4096);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(Error::UnknownFrameType(4))
        ));
    }

    #[test]
    fn protocol_header_reply() {
        let mut buf = BytesMut::from(&b"AMQP\x00\x00\x09\x01"[..]);
        let mut codec = FrameCodec::new(4096);
        match codec.decode(&mut buf) {
            Err(Error::ProtocolHeader(header)) => assert_eq!(&header, b"AMQP\x00\x00\x09\x01"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn heartbeat_on_nonzero_channel() {
        let mut buf = BytesMut::from(&[8, 0, 3, 0, 0, 0, 0, 0xCE][..]);
        let mut codec = FrameCodec::new(4096);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, Error::HeartbeatOnChannel(3)));
        assert!(err.is_framing_intact());
    }

    #[test]
    fn malformed_payload_keeps_framing() {
        // method frame with an unknown method id
        let mut buf = BytesMut::from(&[1, 0, 1, 0, 0, 0, 4, 0, 60, 0, 99, 0xCE, 8][..]);
        let mut codec = FrameCodec::new(4096);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, Error::Decode { channel: 1, .. }));
        assert!(err.is_framing_intact());
        assert_eq!(&buf[..], &[8]);
    }
}
