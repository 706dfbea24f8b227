//! # Transport Layer
//!
//! Moving request bodies to a server and responses back.
//!
//! ## Components
//! - **Entity**: outbound body in buffered, streamed or compressed form
//! - **TCP**: blocking client transport with connect and I/O timeouts
//! - **Local**: in-process loopback through the full frame and codec path
//! - **Server**: async TCP listener executing requests on blocking threads
//!
//! Clients are synchronous: a call holds its thread for the whole round trip.
//! The server is async only around sockets; handlers run on the blocking pool.

pub mod entity;
pub mod local;
pub mod server;
pub mod tcp;

use crate::config::CodecLimits;
use crate::core::packet::{write_header, ChunkedWriter};
use crate::error::{Ceiling, ProtocolError, Result};
use entity::TransportEntity;
use std::io::Write;

/// Posts one request body and returns the response body.
pub trait Transport: Send + Sync {
    /// `address` selects the server, `path` the endpoint on it. The returned
    /// bytes are the decompressed response payload.
    fn post(&self, address: &str, path: &str, entity: TransportEntity) -> Result<Vec<u8>>;
}

/// Frame `entity` as a request to `path` and write it to `sink`.
pub fn write_request<W: Write>(
    sink: &mut W,
    path: &str,
    entity: TransportEntity,
    limits: CodecLimits,
) -> Result<()> {
    match entity.content_length()? {
        Some(length) => {
            let length = u32::try_from(length).map_err(|_| ProtocolError::LimitExceeded {
                ceiling: Ceiling::MessageSize,
                limit: u32::MAX as usize,
                actual: length,
            })?;
            write_header(sink, path, entity.compression(), false)?;
            sink.write_all(&length.to_be_bytes())?;
            entity.write_to(&mut *sink)?;
        }
        None => {
            write_header(sink, path, entity.compression(), true)?;
            let chunked = entity.write_to(ChunkedWriter::new(&mut *sink, limits))?;
            chunked.finish()?;
        }
    }
    sink.flush()?;
    Ok(())
}
