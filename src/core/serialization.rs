//! # Wire Codec
//!
//! Binary, self-describing encoding of [`Value`] trees. Every value starts
//! with a one-byte tag, so a receiver can decode any message without knowing
//! in advance what was sent.
//!
//! ## Format
//! ```text
//! message := [Version(1)] value
//! value   := 0x00                                   null
//!          | 0x01 | 0x02                            false | true
//!          | 0x03 i64 | 0x04 u64 | 0x05 f64         8 bytes, big-endian
//!          | 0x06 str                               string
//!          | 0x07 [Len(4)] bytes                    raw bytes
//!          | 0x08 [Count(4)] value*                 list
//!          | 0x09 str [Count(4)] value*             array of named element type
//!          | 0x0A [Count(4)] (str value)*           map
//!          | 0x0B str [Count(4)] (str value)*       tagged object
//! str     := [Len(4)] utf-8
//! ```
//!
//! ## Ceilings
//! Both directions enforce [`CodecLimits`]:
//! - each message may not exceed `max_message_size` bytes; the count
//!   restarts with every message on a stream,
//! - no length or count prefix may exceed `max_frame_size`,
//! - containers may not nest deeper than `recursion_depth`.
//!
//! Limits are checked *before* bytes are read or buffers reserved, so a
//! hostile length prefix costs nothing beyond the header that carried it.
//! Violations surface as [`ProtocolError::LimitExceeded`] naming the ceiling.

use crate::config::{CodecLimits, PROTOCOL_VERSION};
use crate::core::value::Value;
use crate::error::{constants, Ceiling, ProtocolError, Result};
use std::io::{self, Read, Write};

const TAG_NULL: u8 = 0x00;
const TAG_FALSE: u8 = 0x01;
const TAG_TRUE: u8 = 0x02;
const TAG_I64: u8 = 0x03;
const TAG_U64: u8 = 0x04;
const TAG_F64: u8 = 0x05;
const TAG_STRING: u8 = 0x06;
const TAG_BYTES: u8 = 0x07;
const TAG_LIST: u8 = 0x08;
const TAG_ARRAY: u8 = 0x09;
const TAG_MAP: u8 = 0x0A;
const TAG_OBJECT: u8 = 0x0B;

/// Upper bound on capacity reserved up front for any container or string.
/// Larger items grow as their bytes actually arrive.
const MAX_PREALLOCATION: usize = 64 * 1024;

/// Build a serializer writing to `sink` under the process-wide limits.
pub fn build_serializer<W: Write>(sink: W) -> Serializer<W> {
    Serializer::new(sink, CodecLimits::global())
}

/// Build a deserializer reading from a stream under the process-wide limits.
pub fn build_deserializer<R: Read>(source: R) -> Deserializer<R> {
    Deserializer::new(source, CodecLimits::global())
}

/// Encode a value into a fresh buffer.
pub fn encode(value: &Value, limits: CodecLimits) -> Result<Vec<u8>> {
    let mut serializer = Serializer::new(Vec::new(), limits);
    serializer.write_message(value)?;
    Ok(serializer.into_inner())
}

/// Decode a complete message held in memory. Trailing bytes are an error.
pub fn decode(bytes: &[u8], limits: CodecLimits) -> Result<Value> {
    if bytes.len() > limits.max_message_size {
        return Err(ProtocolError::LimitExceeded {
            ceiling: Ceiling::MessageSize,
            limit: limits.max_message_size,
            actual: bytes.len(),
        });
    }
    let mut deserializer = Deserializer::new(bytes, limits);
    let value = deserializer.read_message()?;
    if deserializer.bytes_read() != bytes.len() {
        return Err(ProtocolError::Serialization(
            constants::ERR_TRAILING_BYTES.to_string(),
        ));
    }
    Ok(value)
}

/// Streaming encoder.
pub struct Serializer<W: Write> {
    sink: W,
    limits: CodecLimits,
    /// Bytes of the message being written, checked against the ceiling
    message_len: usize,
    written: usize,
}

impl<W: Write> Serializer<W> {
    pub fn new(sink: W, limits: CodecLimits) -> Self {
        Self {
            sink,
            limits,
            message_len: 0,
            written: 0,
        }
    }

    /// Write one complete message.
    pub fn write_message(&mut self, value: &Value) -> Result<()> {
        self.message_len = 0;
        self.put(&[PROTOCOL_VERSION])?;
        self.write_value(value, 0)?;
        self.sink.flush()?;
        Ok(())
    }

    /// Total bytes written across all messages.
    pub fn bytes_written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.sink
    }

    fn write_value(&mut self, value: &Value, depth: usize) -> Result<()> {
        match value {
            Value::Null => self.put(&[TAG_NULL]),
            Value::Bool(false) => self.put(&[TAG_FALSE]),
            Value::Bool(true) => self.put(&[TAG_TRUE]),
            Value::I64(i) => {
                self.put(&[TAG_I64])?;
                self.put(&i.to_be_bytes())
            }
            Value::U64(u) => {
                self.put(&[TAG_U64])?;
                self.put(&u.to_be_bytes())
            }
            Value::F64(f) => {
                self.put(&[TAG_F64])?;
                self.put(&f.to_bits().to_be_bytes())
            }
            Value::String(s) => {
                self.put(&[TAG_STRING])?;
                self.put_str(s)
            }
            Value::Bytes(bytes) => {
                self.put(&[TAG_BYTES])?;
                self.put_len(bytes.len())?;
                self.put(bytes)
            }
            Value::List(items) => {
                self.enter(depth)?;
                self.put(&[TAG_LIST])?;
                self.put_len(items.len())?;
                for item in items {
                    self.write_value(item, depth + 1)?;
                }
                Ok(())
            }
            Value::Array {
                element_type,
                items,
            } => {
                self.enter(depth)?;
                self.put(&[TAG_ARRAY])?;
                self.put_str(element_type)?;
                self.put_len(items.len())?;
                for item in items {
                    self.write_value(item, depth + 1)?;
                }
                Ok(())
            }
            Value::Map(entries) => {
                self.enter(depth)?;
                self.put(&[TAG_MAP])?;
                self.write_entries(entries, depth)
            }
            Value::Object { type_name, fields } => {
                self.enter(depth)?;
                self.put(&[TAG_OBJECT])?;
                self.put_str(type_name)?;
                self.write_entries(fields, depth)
            }
        }
    }

    fn write_entries(&mut self, entries: &[(String, Value)], depth: usize) -> Result<()> {
        self.put_len(entries.len())?;
        for (key, value) in entries {
            self.put_str(key)?;
            self.write_value(value, depth + 1)?;
        }
        Ok(())
    }

    fn enter(&self, depth: usize) -> Result<()> {
        if depth >= self.limits.recursion_depth {
            return Err(ProtocolError::LimitExceeded {
                ceiling: Ceiling::RecursionDepth,
                limit: self.limits.recursion_depth,
                actual: depth + 1,
            });
        }
        Ok(())
    }

    fn put_str(&mut self, s: &str) -> Result<()> {
        self.put_len(s.len())?;
        self.put(s.as_bytes())
    }

    fn put_len(&mut self, len: usize) -> Result<()> {
        if len > self.limits.max_frame_size {
            return Err(ProtocolError::LimitExceeded {
                ceiling: Ceiling::FrameSize,
                limit: self.limits.max_frame_size,
                actual: len,
            });
        }
        let len = u32::try_from(len).map_err(|_| ProtocolError::LimitExceeded {
            ceiling: Ceiling::FrameSize,
            limit: u32::MAX as usize,
            actual: len,
        })?;
        self.put(&len.to_be_bytes())
    }

    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        let message_len = self.message_len.saturating_add(bytes.len());
        if message_len > self.limits.max_message_size {
            return Err(ProtocolError::LimitExceeded {
                ceiling: Ceiling::MessageSize,
                limit: self.limits.max_message_size,
                actual: message_len,
            });
        }
        self.sink.write_all(bytes)?;
        self.message_len = message_len;
        self.written = self.written.saturating_add(bytes.len());
        Ok(())
    }
}

/// Streaming decoder. Reads exactly one message and nothing past it.
pub struct Deserializer<R: Read> {
    source: R,
    limits: CodecLimits,
    message_len: usize,
    read: usize,
}

impl<R: Read> Deserializer<R> {
    pub fn new(source: R, limits: CodecLimits) -> Self {
        Self {
            source,
            limits,
            message_len: 0,
            read: 0,
        }
    }

    /// Read one complete message.
    pub fn read_message(&mut self) -> Result<Value> {
        self.message_len = 0;
        let version = self.take_u8()?;
        if version != PROTOCOL_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }
        self.read_value(0)
    }

    /// Total bytes consumed across all messages.
    pub fn bytes_read(&self) -> usize {
        self.read
    }

    fn read_value(&mut self, depth: usize) -> Result<Value> {
        let tag = self.take_u8()?;
        match tag {
            TAG_NULL => Ok(Value::Null),
            TAG_FALSE => Ok(Value::Bool(false)),
            TAG_TRUE => Ok(Value::Bool(true)),
            TAG_I64 => Ok(Value::I64(i64::from_be_bytes(self.take_array()?))),
            TAG_U64 => Ok(Value::U64(u64::from_be_bytes(self.take_array()?))),
            TAG_F64 => Ok(Value::F64(f64::from_bits(u64::from_be_bytes(
                self.take_array()?,
            )))),
            TAG_STRING => Ok(Value::String(self.take_str()?)),
            TAG_BYTES => {
                let len = self.take_len()?;
                Ok(Value::Bytes(self.take_vec(len)?))
            }
            TAG_LIST => {
                self.enter(depth)?;
                let count = self.take_len()?;
                Ok(Value::List(self.read_items(count, depth)?))
            }
            TAG_ARRAY => {
                self.enter(depth)?;
                let element_type = self.take_str()?;
                let count = self.take_len()?;
                let items = self.read_items(count, depth)?;
                Ok(Value::Array {
                    element_type,
                    items,
                })
            }
            TAG_MAP => {
                self.enter(depth)?;
                Ok(Value::Map(self.read_entries(depth)?))
            }
            TAG_OBJECT => {
                self.enter(depth)?;
                let type_name = self.take_str()?;
                let fields = self.read_entries(depth)?;
                Ok(Value::Object { type_name, fields })
            }
            other => Err(ProtocolError::Serialization(format!(
                "unknown value tag 0x{other:02x} at offset {}",
                self.read - 1
            ))),
        }
    }

    fn read_items(&mut self, count: usize, depth: usize) -> Result<Vec<Value>> {
        let mut items = Vec::with_capacity(count.min(MAX_PREALLOCATION / 16));
        for _ in 0..count {
            items.push(self.read_value(depth + 1)?);
        }
        Ok(items)
    }

    fn read_entries(&mut self, depth: usize) -> Result<Vec<(String, Value)>> {
        let count = self.take_len()?;
        let mut entries = Vec::with_capacity(count.min(MAX_PREALLOCATION / 32));
        for _ in 0..count {
            let key = self.take_str()?;
            let value = self.read_value(depth + 1)?;
            entries.push((key, value));
        }
        Ok(entries)
    }

    fn enter(&self, depth: usize) -> Result<()> {
        if depth >= self.limits.recursion_depth {
            return Err(ProtocolError::LimitExceeded {
                ceiling: Ceiling::RecursionDepth,
                limit: self.limits.recursion_depth,
                actual: depth + 1,
            });
        }
        Ok(())
    }

    fn take_str(&mut self) -> Result<String> {
        let len = self.take_len()?;
        let bytes = self.take_vec(len)?;
        String::from_utf8(bytes)
            .map_err(|e| ProtocolError::Serialization(format!("invalid utf-8 in string: {e}")))
    }

    fn take_len(&mut self) -> Result<usize> {
        let len = u32::from_be_bytes(self.take_array()?) as usize;
        if len > self.limits.max_frame_size {
            return Err(ProtocolError::LimitExceeded {
                ceiling: Ceiling::FrameSize,
                limit: self.limits.max_frame_size,
                actual: len,
            });
        }
        Ok(len)
    }

    fn take_u8(&mut self) -> Result<u8> {
        let [byte] = self.take_array::<1>()?;
        Ok(byte)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        self.reserve(N)?;
        let mut buf = [0u8; N];
        self.source.read_exact(&mut buf).map_err(eof_as_malformed)?;
        Ok(buf)
    }

    fn take_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        self.reserve(len)?;
        let mut buf = Vec::with_capacity(len.min(MAX_PREALLOCATION));
        (&mut self.source)
            .take(len as u64)
            .read_to_end(&mut buf)
            .map_err(eof_as_malformed)?;
        if buf.len() != len {
            return Err(ProtocolError::Serialization(
                constants::ERR_UNEXPECTED_EOF.to_string(),
            ));
        }
        Ok(buf)
    }

    /// Account for `n` more bytes against the message ceiling before reading them.
    fn reserve(&mut self, n: usize) -> Result<()> {
        let message_len = self.message_len.saturating_add(n);
        if message_len > self.limits.max_message_size {
            return Err(ProtocolError::LimitExceeded {
                ceiling: Ceiling::MessageSize,
                limit: self.limits.max_message_size,
                actual: message_len,
            });
        }
        self.message_len = message_len;
        self.read = self.read.saturating_add(n);
        Ok(())
    }
}

fn eof_as_malformed(e: io::Error) -> ProtocolError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        ProtocolError::Serialization(constants::ERR_UNEXPECTED_EOF.to_string())
    } else {
        ProtocolError::Io(e)
    }
}
