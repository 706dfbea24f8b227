use crate::config::CodecLimits;
use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Frames [`Packet`]s over an async byte stream.
#[derive(Debug, Clone, Copy)]
pub struct PacketCodec {
    limits: CodecLimits,
}

impl PacketCodec {
    pub fn new(limits: CodecLimits) -> Self {
        Self { limits }
    }
}

impl Default for PacketCodec {
    fn default() -> Self {
        Self::new(CodecLimits::global())
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match Packet::parse(&src[..], self.limits)? {
            Some((packet, consumed)) => {
                src.advance(consumed);
                Ok(Some(packet))
            }
            None => Ok(None),
        }
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<()> {
        item.encode_into(dst)
    }
}
