//! AMQP frame type and corresponding encoder and decoder

use std::fmt;

use amqp091_types::{
    methods::{BasicPublish, Method},
    read::Parser,
    BasicProperties, ContentHeader, Encode,
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{
    Error, FRAME_BODY, FRAME_END, FRAME_HEADER, FRAME_HEADER_SIZE, FRAME_HEARTBEAT, FRAME_METHOD,
    FRAME_OVERHEAD,
};

/// AMQP frame
#[derive(Clone, PartialEq)]
pub struct Frame {
    /// AMQP frame channel
    pub channel: u16,

    /// AMQP frame body
    pub body: FrameBody,
}

impl Frame {
    /// Creates a new AMQP frame
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

    /// Creates a heartbeat frame, which is always sent on channel 0
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

    /// Encodes the frame into a standalone buffer
    pub fn to_bytes(&self) -> Result<Bytes, Error> {
        let mut dst = BytesMut::new();
        write_frame(&mut dst, self)?;
        Ok(dst.freeze())
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("channel", &self.channel)
            .field("body", &self.body)
            .finish()
    }
}

/// AMQP frame body
#[derive(Clone, PartialEq)]
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
    /// Frame type octet
    pub fn frame_type(&self) -> u8 {
        match self {
            FrameBody::Method(_) => FRAME_METHOD,
            FrameBody::Header(_) => FRAME_HEADER,
            FrameBody::Body(_) => FRAME_BODY,
            FrameBody::Heartbeat => FRAME_HEARTBEAT,
        }
    }
}

impl fmt::Debug for FrameBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Method(method) => f.debug_tuple("Method").field(method).finish(),
            Self::Header(header) => f.debug_tuple("Header").field(header).finish(),
            // Payloads can be large
            Self::Body(body) => write!(f, "Body({} bytes)", body.len()),
            Self::Heartbeat => write!(f, "Heartbeat"),
        }
    }
}

fn write_frame(dst: &mut BytesMut, frame: &Frame) -> Result<(), Error> {
    dst.put_u8(frame.body.frame_type());
    dst.put_u16(frame.channel);
    let size_at = dst.len();
    dst.put_u32(0);
    let start = dst.len();
    match &frame.body {
        FrameBody::Method(method) => method.encode(dst).map_err(Error::Encode)?,
        FrameBody::Header(header) => header.encode(dst).map_err(Error::Encode)?,
        FrameBody::Body(body) => dst.put_slice(body),
        FrameBody::Heartbeat => {}
    }
    let size = dst.len() - start;
    let size = u32::try_from(size).map_err(|_| Error::MaxFrameSizeExceeded(size))?;
    dst[size_at..start].copy_from_slice(&size.to_be_bytes());
    dst.put_u8(FRAME_END);
    Ok(())
}

/// Encoder and decoder of AMQP frames
#[derive(Debug, Clone, Default)]
pub struct FrameCodec {
    /// Max frame size including the header and frame-end octet. Zero means unlimited.
    max_frame_size: usize,
}

impl FrameCodec {
    /// Creates a new codec
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Get the max frame size
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Set the max frame size, eg. after tuning
    pub fn set_max_frame_size(&mut self, max_frame_size: usize) {
        self.max_frame_size = max_frame_size;
    }

    fn check_size(&self, frame_size: usize) -> Result<(), Error> {
        if self.max_frame_size != 0 && frame_size > self.max_frame_size {
            return Err(Error::MaxFrameSizeExceeded(frame_size));
        }
        Ok(())
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let start = dst.len();
        write_frame(dst, &item)?;
        self.check_size(dst.len() - start)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // A broker that does not speak 0-9-1 answers with its own protocol header
        if src.len() >= 4 && &src[..4] == b"AMQP" {
            if src.len() < 8 {
                return Ok(None);
            }
            let mut header = [0u8; 8];
            src.copy_to_slice(&mut header);
            return Err(Error::ProtocolHeaderMismatch(header));
        }

        if src.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let frame_type = src[0];
        let channel = u16::from_be_bytes([src[1], src[2]]);
        let size = u32::from_be_bytes([src[3], src[4], src[5], src[6]]) as usize;
        let frame_size = size + FRAME_OVERHEAD;
        self.check_size(frame_size)?;

        if src.len() < frame_size {
            src.reserve(frame_size - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(frame_size);
        if frame[frame_size - 1] != FRAME_END {
            return Err(Error::FramingError);
        }
        frame.advance(FRAME_HEADER_SIZE);
        frame.truncate(size);

        let body = match frame_type {
            FRAME_METHOD => {
                let mut parser = Parser::new(&frame);
                FrameBody::Method(Method::decode(&mut parser).map_err(Error::Decode)?)
            }
            FRAME_HEADER => FrameBody::Header(ContentHeader::decode(&mut Parser::new(&frame))),
            FRAME_BODY => FrameBody::Body(frame.freeze()),
            FRAME_HEARTBEAT => FrameBody::Heartbeat,
            other => return Err(Error::UnknownFrameType(other)),
        };
        Ok(Some(Frame { channel, body }))
    }
}

/// Writes a `basic.publish` method frame, its content header and as many body frames as
/// needed so that no frame exceeds `frame_max`.
///
/// A `frame_max` of zero places the whole body in one frame. An empty body sends no body frame.
pub fn encode_content(
    dst: &mut BytesMut,
    channel: u16,
    publish: BasicPublish,
    properties: BasicProperties,
    mut body: Bytes,
    frame_max: usize,
) -> Result<(), Error> {
    write_frame(dst, &Frame::method(channel, publish))?;
    let header = ContentHeader::basic(body.len() as u64, properties);
    write_frame(dst, &Frame::new(channel, FrameBody::Header(header)))?;

    let chunk_size = match frame_max {
        0 => usize::MAX,
        n => n.saturating_sub(FRAME_OVERHEAD).max(1),
    };
    while !body.is_empty() {
        let chunk = body.split_to(chunk_size.min(body.len()));
        write_frame(dst, &Frame::new(channel, FrameBody::Body(chunk)))?;
    }
    Ok(())
}
