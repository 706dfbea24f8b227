use crate::error::{Ceiling, ProtocolError, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

/// Content encodings a request body may carry.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    Gzip,
    Lz4,
    Zstd,
}

impl CompressionKind {
    /// Frame flag bits identifying this encoding
    pub fn flag(self) -> u8 {
        match self {
            CompressionKind::Gzip => 0b0000_0001,
            CompressionKind::Lz4 => 0b0000_0010,
            CompressionKind::Zstd => 0b0000_0011,
        }
    }

    /// Inverse of [`flag`](Self::flag); `Ok(None)` means identity encoding
    pub fn from_flag(bits: u8) -> Result<Option<Self>> {
        match bits {
            0 => Ok(None),
            0b0000_0001 => Ok(Some(CompressionKind::Gzip)),
            0b0000_0010 => Ok(Some(CompressionKind::Lz4)),
            0b0000_0011 => Ok(Some(CompressionKind::Zstd)),
            _ => Err(ProtocolError::InvalidHeader),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            CompressionKind::Gzip => "gzip",
            CompressionKind::Lz4 => "lz4",
            CompressionKind::Zstd => "zstd",
        }
    }
}

/// Compresses data using the specified compression algorithm
///
/// # Errors
/// Returns `ProtocolError::CompressionFailure` if compression fails
pub fn compress(data: &[u8], kind: &CompressionKind) -> Result<Vec<u8>> {
    match kind {
        CompressionKind::Gzip => {
            let mut encoder =
                GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
            encoder
                .write_all(data)
                .map_err(|_| ProtocolError::CompressionFailure)?;
            encoder.finish().map_err(|_| ProtocolError::CompressionFailure)
        }
        CompressionKind::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
        CompressionKind::Zstd => {
            let mut out = Vec::new();
            zstd::stream::copy_encode(data, &mut out, 1)
                .map_err(|_| ProtocolError::CompressionFailure)?;
            Ok(out)
        }
    }
}

/// Decompresses data that was compressed with the specified algorithm
///
/// Output larger than `max_output` is rejected to prevent decompression bombs.
/// Callers pass the codec's message ceiling.
///
/// # Errors
/// Returns `ProtocolError::LimitExceeded` for the message ceiling when the
/// output (or the size lz4 claims for it) exceeds `max_output`, and
/// `ProtocolError::DecompressionFailure` for a corrupt stream.
pub fn decompress(data: &[u8], kind: &CompressionKind, max_output: usize) -> Result<Vec<u8>> {
    match *kind {
        CompressionKind::Gzip => read_bounded(GzDecoder::new(data), max_output),
        CompressionKind::Lz4 => {
            // lz4_flex prepends the uncompressed size as 4 little-endian bytes;
            // check it before the library allocates.
            if data.len() < 4 {
                return Err(ProtocolError::DecompressionFailure);
            }

            let claimed_size = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize;
            if claimed_size > max_output {
                return Err(over_limit(max_output, claimed_size));
            }

            let decompressed = lz4_flex::decompress_size_prepended(data)
                .map_err(|_| ProtocolError::DecompressionFailure)?;

            if decompressed.len() > max_output {
                return Err(over_limit(max_output, decompressed.len()));
            }
            Ok(decompressed)
        }
        CompressionKind::Zstd => {
            let reader = zstd::stream::Decoder::new(data)
                .map_err(|_| ProtocolError::DecompressionFailure)?;
            read_bounded(reader, max_output)
        }
    }
}

/// Read a decoder to the end in chunks, failing as soon as output passes `max_output`
fn read_bounded<R: Read>(mut reader: R, max_output: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buffer = [0u8; 8192];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                out.extend_from_slice(&buffer[..n]);
                if out.len() > max_output {
                    return Err(over_limit(max_output, out.len()));
                }
            }
            Err(_) => return Err(ProtocolError::DecompressionFailure),
        }
    }
    Ok(out)
}

fn over_limit(limit: usize, actual: usize) -> ProtocolError {
    ProtocolError::LimitExceeded {
        ceiling: Ceiling::MessageSize,
        limit,
        actual,
    }
}
