//! Request/response frames.
//!
//! A frame names the endpoint it is posted to, declares its content
//! encoding, and carries the body either with a known length or as a
//! sequence of chunks when the sender did not know the length up front.
//!
//! ```text
//! [Magic(4)] [Version(1)] [Flags(1)] [PathLen(2)] [Path]
//!   fixed:   [Length(4)] [Body]
//!   chunked: ([Length(4)] [Chunk])* [0u32]
//! ```
//!
//! Flags bits 0-1 hold the compression kind, bit 2 marks a chunked body.
//! Each chunk obeys the frame ceiling; the whole body obeys the message
//! ceiling, before and after decompression.

use crate::config::{CodecLimits, MAGIC_BYTES, PROTOCOL_VERSION};
use crate::error::{Ceiling, ProtocolError, Result};
use crate::utils::compression::{self, CompressionKind};
use bytes::{BufMut, BytesMut};
use std::borrow::Cow;
use std::io::{self, Read, Write};

pub const FLAG_COMPRESSION_MASK: u8 = 0b0000_0011;
pub const FLAG_CHUNKED: u8 = 0b0000_0100;

/// Magic, version, flags and path length.
pub const FIXED_HEADER_LEN: usize = 8;

/// Largest chunk the [`ChunkedWriter`] emits.
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

const MAX_PREALLOCATION: usize = 64 * 1024;

/// One posted body and the path it was posted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub path: String,
    pub compression: Option<CompressionKind>,
    /// Body as transmitted, chunks already joined.
    pub body: Vec<u8>,
}

impl Packet {
    pub fn new(path: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            compression: None,
            body,
        }
    }

    /// Body with any content encoding removed, bounded by the message ceiling.
    pub fn payload(&self, limits: CodecLimits) -> Result<Cow<'_, [u8]>> {
        match &self.compression {
            None => Ok(Cow::Borrowed(&self.body)),
            Some(kind) => Ok(Cow::Owned(compression::decompress(
                &self.body,
                kind,
                limits.max_message_size,
            )?)),
        }
    }

    /// Serialize with a fixed-length body.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(FIXED_HEADER_LEN + self.path.len() + 4 + self.body.len());
        write_header(&mut out, &self.path, self.compression, false)?;
        out.extend_from_slice(&body_len(self.body.len())?.to_be_bytes());
        out.extend_from_slice(&self.body);
        Ok(out)
    }

    /// Append the fixed-length encoding to a codec buffer.
    pub fn encode_into(&self, dst: &mut BytesMut) -> Result<()> {
        let path_len = path_len(&self.path)?;
        let len = body_len(self.body.len())?;
        dst.reserve(FIXED_HEADER_LEN + self.path.len() + 4 + self.body.len());
        dst.put_slice(&MAGIC_BYTES);
        dst.put_u8(PROTOCOL_VERSION);
        dst.put_u8(self.compression.map_or(0, CompressionKind::flag));
        dst.put_u16(path_len);
        dst.put_slice(self.path.as_bytes());
        dst.put_u32(len);
        dst.put_slice(&self.body);
        Ok(())
    }

    /// Try to parse one complete frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` until enough bytes are present, and the number of
    /// bytes consumed once a frame is complete.
    pub fn parse(buf: &[u8], limits: CodecLimits) -> Result<Option<(Packet, usize)>> {
        if buf.len() < FIXED_HEADER_LEN {
            return Ok(None);
        }
        let (compression, chunked, path_len) = parse_fixed_header(&buf[..FIXED_HEADER_LEN])?;
        let mut pos = FIXED_HEADER_LEN;
        if buf.len() < pos + path_len {
            return Ok(None);
        }
        let path = parse_path(&buf[pos..pos + path_len])?;
        pos += path_len;

        if !chunked {
            let Some(len) = read_u32_at(buf, pos) else {
                return Ok(None);
            };
            let len = check_message(len as usize, limits)?;
            pos += 4;
            if buf.len() < pos + len {
                return Ok(None);
            }
            let body = buf[pos..pos + len].to_vec();
            pos += len;
            return Ok(Some((
                Packet {
                    path,
                    compression,
                    body,
                },
                pos,
            )));
        }

        // Walk chunk headers first so nothing is copied until the frame is whole.
        let body_start = pos;
        let mut total = 0usize;
        loop {
            let Some(len) = read_u32_at(buf, pos) else {
                return Ok(None);
            };
            pos += 4;
            if len == 0 {
                break;
            }
            let len = check_frame(len as usize, limits)?;
            total = check_message(total + len, limits)?;
            if buf.len() < pos + len {
                return Ok(None);
            }
            pos += len;
        }

        let mut body = Vec::with_capacity(total);
        let mut cursor = body_start;
        loop {
            let len = read_u32_at(buf, cursor).unwrap_or(0) as usize;
            cursor += 4;
            if len == 0 {
                break;
            }
            body.extend_from_slice(&buf[cursor..cursor + len]);
            cursor += len;
        }
        Ok(Some((
            Packet {
                path,
                compression,
                body,
            },
            pos,
        )))
    }

    /// Blocking read of one frame.
    pub fn read_from<R: Read>(reader: &mut R, limits: CodecLimits) -> Result<Packet> {
        let mut header = [0u8; FIXED_HEADER_LEN];
        reader.read_exact(&mut header)?;
        let (compression, chunked, path_len) = parse_fixed_header(&header)?;
        let mut raw_path = vec![0u8; path_len];
        reader.read_exact(&mut raw_path)?;
        let path = parse_path(&raw_path)?;

        let body = if chunked {
            let mut body = Vec::new();
            loop {
                let len = read_u32(reader)? as usize;
                if len == 0 {
                    break;
                }
                let len = check_frame(len, limits)?;
                check_message(body.len() + len, limits)?;
                read_exact_bounded(reader, len, &mut body)?;
            }
            body
        } else {
            let len = check_message(read_u32(reader)? as usize, limits)?;
            let mut body = Vec::with_capacity(len.min(MAX_PREALLOCATION));
            read_exact_bounded(reader, len, &mut body)?;
            body
        };

        Ok(Packet {
            path,
            compression,
            body,
        })
    }
}

/// Write the frame header shared by fixed and chunked bodies.
pub fn write_header<W: Write>(
    sink: &mut W,
    path: &str,
    compression: Option<CompressionKind>,
    chunked: bool,
) -> Result<()> {
    let mut flags = compression.map_or(0, CompressionKind::flag);
    if chunked {
        flags |= FLAG_CHUNKED;
    }
    sink.write_all(&MAGIC_BYTES)?;
    sink.write_all(&[PROTOCOL_VERSION, flags])?;
    sink.write_all(&path_len(path)?.to_be_bytes())?;
    sink.write_all(path.as_bytes())?;
    Ok(())
}

/// Writer that frames everything written to it as length-prefixed chunks.
///
/// [`finish`](Self::finish) must be called to emit the terminating empty
/// chunk; dropping the writer leaves the body unterminated.
pub struct ChunkedWriter<W: Write> {
    inner: W,
    buffer: Vec<u8>,
    chunk_size: usize,
}

impl<W: Write> ChunkedWriter<W> {
    pub fn new(inner: W, limits: CodecLimits) -> Self {
        let chunk_size = DEFAULT_CHUNK_SIZE.min(limits.max_frame_size).max(1);
        Self {
            inner,
            buffer: Vec::with_capacity(chunk_size),
            chunk_size,
        }
    }

    pub fn finish(mut self) -> io::Result<W> {
        self.flush_chunk()?;
        self.inner.write_all(&0u32.to_be_bytes())?;
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn flush_chunk(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        // chunk_size never exceeds the frame ceiling, which fits in u32
        let len = self.buffer.len() as u32;
        self.inner.write_all(&len.to_be_bytes())?;
        self.inner.write_all(&self.buffer)?;
        self.buffer.clear();
        Ok(())
    }
}

impl<W: Write> Write for ChunkedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let room = self.chunk_size - self.buffer.len();
        let n = buf.len().min(room);
        self.buffer.extend_from_slice(&buf[..n]);
        if self.buffer.len() == self.chunk_size {
            self.flush_chunk()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_chunk()?;
        self.inner.flush()
    }
}

fn parse_fixed_header(header: &[u8]) -> Result<(Option<CompressionKind>, bool, usize)> {
    if header[0..4] != MAGIC_BYTES {
        return Err(ProtocolError::InvalidHeader);
    }
    if header[4] != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(header[4]));
    }
    let flags = header[5];
    if flags & !(FLAG_COMPRESSION_MASK | FLAG_CHUNKED) != 0 {
        return Err(ProtocolError::InvalidHeader);
    }
    let compression = CompressionKind::from_flag(flags & FLAG_COMPRESSION_MASK)?;
    let path_len = u16::from_be_bytes([header[6], header[7]]) as usize;
    Ok((compression, flags & FLAG_CHUNKED != 0, path_len))
}

fn parse_path(raw: &[u8]) -> Result<String> {
    std::str::from_utf8(raw)
        .map(str::to_owned)
        .map_err(|_| ProtocolError::InvalidHeader)
}

fn path_len(path: &str) -> Result<u16> {
    u16::try_from(path.len())
        .map_err(|_| ProtocolError::ConfigError(format!("endpoint path too long: {path}")))
}

fn body_len(len: usize) -> Result<u32> {
    u32::try_from(len).map_err(|_| ProtocolError::LimitExceeded {
        ceiling: Ceiling::MessageSize,
        limit: u32::MAX as usize,
        actual: len,
    })
}

fn check_frame(len: usize, limits: CodecLimits) -> Result<usize> {
    if len > limits.max_frame_size {
        return Err(ProtocolError::LimitExceeded {
            ceiling: Ceiling::FrameSize,
            limit: limits.max_frame_size,
            actual: len,
        });
    }
    Ok(len)
}

fn check_message(len: usize, limits: CodecLimits) -> Result<usize> {
    if len > limits.max_message_size {
        return Err(ProtocolError::LimitExceeded {
            ceiling: Ceiling::MessageSize,
            limit: limits.max_message_size,
            actual: len,
        });
    }
    Ok(len)
}

fn read_u32_at(buf: &[u8], pos: usize) -> Option<u32> {
    let bytes = buf.get(pos..pos + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut raw = [0u8; 4];
    reader.read_exact(&mut raw)?;
    Ok(u32::from_be_bytes(raw))
}

fn read_exact_bounded<R: Read>(reader: &mut R, len: usize, out: &mut Vec<u8>) -> Result<()> {
    let read = reader.take(len as u64).read_to_end(out)?;
    if read != len {
        return Err(ProtocolError::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "frame body ended early",
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_fixed_frame_roundtrip() {
        let packet = Packet::new("/invoke", vec![1, 2, 3]);
        let bytes = packet.to_bytes().unwrap();
        let (parsed, used) = Packet::parse(&bytes, CodecLimits::default())
            .unwrap()
            .unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(parsed, packet);

        let read = Packet::read_from(&mut bytes.as_slice(), CodecLimits::default()).unwrap();
        assert_eq!(read, packet);
    }

    #[test]
    fn test_chunked_frame_joins_chunks() {
        let limits = CodecLimits {
            max_frame_size: 4,
            ..CodecLimits::default()
        };
        let mut wire = Vec::new();
        write_header(&mut wire, "/invoke", None, true).unwrap();
        let mut writer = ChunkedWriter::new(wire, limits);
        writer.write_all(b"hello chunked world").unwrap();
        let wire = writer.finish().unwrap();

        let (parsed, used) = Packet::parse(&wire, limits).unwrap().unwrap();
        assert_eq!(used, wire.len());
        assert_eq!(parsed.body, b"hello chunked world");

        let read = Packet::read_from(&mut wire.as_slice(), limits).unwrap();
        assert_eq!(read.body, b"hello chunked world");
    }

    #[test]
    fn test_partial_frame_waits() {
        let bytes = Packet::new("/invoke", vec![9; 32]).to_bytes().unwrap();
        for cut in [0, 5, FIXED_HEADER_LEN + 3, bytes.len() - 1] {
            assert!(Packet::parse(&bytes[..cut], CodecLimits::default())
                .unwrap()
                .is_none());
        }
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = Packet::new("/", vec![]).to_bytes().unwrap();
        bytes[0] = b'X';
        assert!(matches!(
            Packet::parse(&bytes, CodecLimits::default()),
            Err(ProtocolError::InvalidHeader)
        ));
    }

    #[test]
    fn test_oversized_chunk_rejected_before_body_arrives() {
        let limits = CodecLimits {
            max_frame_size: 16,
            ..CodecLimits::default()
        };
        let mut wire = Vec::new();
        write_header(&mut wire, "/", None, true).unwrap();
        wire.extend(1_000_000u32.to_be_bytes());
        assert!(matches!(
            Packet::parse(&wire, limits),
            Err(ProtocolError::LimitExceeded {
                ceiling: Ceiling::FrameSize,
                ..
            })
        ));
    }

    #[test]
    fn test_declared_body_over_message_ceiling_rejected() {
        let limits = CodecLimits {
            max_message_size: 128,
            ..CodecLimits::default()
        };
        let mut wire = Vec::new();
        write_header(&mut wire, "/", None, false).unwrap();
        wire.extend(u32::MAX.to_be_bytes());
        assert!(matches!(
            Packet::read_from(&mut wire.as_slice(), limits),
            Err(ProtocolError::LimitExceeded {
                ceiling: Ceiling::MessageSize,
                ..
            })
        ));
    }

    #[test]
    fn test_compressed_payload_is_bounded() {
        let body = compression::compress(&[0u8; 10_000], &CompressionKind::Gzip).unwrap();
        let packet = Packet {
            path: "/".into(),
            compression: Some(CompressionKind::Gzip),
            body,
        };
        assert_eq!(
            packet.payload(CodecLimits::default()).unwrap().len(),
            10_000
        );
        let small = CodecLimits {
            max_message_size: 100,
            ..CodecLimits::default()
        };
        assert!(packet.payload(small).is_err());
    }
}
