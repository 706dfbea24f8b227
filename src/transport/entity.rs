//! Outbound request bodies.
//!
//! A [`TransportEntity`] holds a value that still has to be encoded and
//! decides how it goes out:
//!
//! | streaming | compression | body                          | length  |
//! |-----------|-------------|-------------------------------|---------|
//! | no        | none        | encoded into a buffer         | known   |
//! | yes       | none        | encoded straight into the sink| unknown |
//! | any       | some        | encoded, compressed, buffered | known   |
//!
//! Compression needs the whole encoding in hand, so it wins over streaming.

use crate::config::CodecLimits;
use crate::core::serialization::{encode, Serializer};
use crate::core::value::Value;
use crate::error::Result;
use crate::utils::compression::{compress, CompressionKind};
use crate::utils::rate_limit::{RateLimitedWriter, RateLimiter};
use once_cell::unsync::OnceCell;
use std::io::{BufWriter, Write};
use std::sync::Arc;

pub struct TransportEntity {
    payload: Value,
    limits: CodecLimits,
    streaming: bool,
    compression: Option<CompressionKind>,
    limiter: Option<Arc<dyn RateLimiter>>,
    buffered: OnceCell<Vec<u8>>,
}

impl TransportEntity {
    /// Buffered, uncompressed, unthrottled.
    pub fn new(payload: Value, limits: CodecLimits) -> Self {
        Self {
            payload,
            limits,
            streaming: false,
            compression: None,
            limiter: None,
            buffered: OnceCell::new(),
        }
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn compressed(mut self, compression: Option<CompressionKind>) -> Self {
        self.compression = compression;
        self
    }

    /// Charge every written byte to `limiter`.
    pub fn with_rate_limiter(mut self, limiter: Option<Arc<dyn RateLimiter>>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Whether the body goes out with an unknown length.
    pub fn is_streaming(&self) -> bool {
        self.streaming && self.compression.is_none()
    }

    pub fn compression(&self) -> Option<CompressionKind> {
        self.compression
    }

    /// Exact body length, or `None` when streaming. Computed once.
    pub fn content_length(&self) -> Result<Option<usize>> {
        if self.is_streaming() {
            return Ok(None);
        }
        Ok(Some(self.buffer()?.len()))
    }

    /// Write the body. Consumes the entity: a streamed encoding cannot be
    /// replayed.
    pub fn write_to<W: Write>(self, sink: W) -> Result<W> {
        match self.limiter.clone() {
            Some(limiter) => {
                let mut throttled = RateLimitedWriter::new(sink, limiter);
                self.write_body(&mut throttled)?;
                Ok(throttled.into_inner())
            }
            None => {
                let mut sink = sink;
                self.write_body(&mut sink)?;
                Ok(sink)
            }
        }
    }

    fn write_body<W: Write>(&self, sink: &mut W) -> Result<()> {
        if self.is_streaming() {
            let mut buffered = BufWriter::new(&mut *sink);
            Serializer::new(&mut buffered, self.limits).write_message(&self.payload)?;
            buffered.flush()?;
        } else {
            sink.write_all(self.buffer()?)?;
            sink.flush()?;
        }
        Ok(())
    }

    fn buffer(&self) -> Result<&[u8]> {
        self.buffered
            .get_or_try_init(|| {
                let encoded = encode(&self.payload, self.limits)?;
                match &self.compression {
                    Some(kind) => compress(&encoded, kind),
                    None => Ok(encoded),
                }
            })
            .map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::core::serialization::decode;
    use crate::utils::compression::decompress;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn payload() -> Value {
        Value::object("test.Upload", vec![("data", Value::Bytes(vec![42; 4096]))])
    }

    #[test]
    fn test_buffered_length_matches_written_bytes() {
        let entity = TransportEntity::new(payload(), CodecLimits::default());
        let length = entity.content_length().unwrap().unwrap();
        let written = entity.write_to(Vec::new()).unwrap();
        assert_eq!(written.len(), length);
        assert_eq!(decode(&written, CodecLimits::default()).unwrap(), payload());
    }

    #[test]
    fn test_streaming_length_is_unknown() {
        let entity = TransportEntity::new(payload(), CodecLimits::default()).streaming(true);
        assert_eq!(entity.content_length().unwrap(), None);
        let written = entity.write_to(Vec::new()).unwrap();
        assert_eq!(decode(&written, CodecLimits::default()).unwrap(), payload());
    }

    #[test]
    fn test_compression_overrides_streaming() {
        let entity = TransportEntity::new(payload(), CodecLimits::default())
            .streaming(true)
            .compressed(Some(CompressionKind::Gzip));
        assert!(!entity.is_streaming());
        let length = entity.content_length().unwrap().unwrap();
        let written = entity.write_to(Vec::new()).unwrap();
        assert_eq!(written.len(), length);

        let plain = decompress(&written, &CompressionKind::Gzip, usize::MAX).unwrap();
        assert_eq!(decode(&plain, CodecLimits::default()).unwrap(), payload());
    }

    struct Meter(AtomicU64);

    impl RateLimiter for Meter {
        fn acquire(&self, amount: u64) {
            self.0.fetch_add(amount, Ordering::Relaxed);
        }

        fn max_acquire(&self) -> u64 {
            1024
        }
    }

    #[test]
    fn test_limiter_charged_for_every_byte() {
        for streaming in [false, true] {
            let meter = Arc::new(Meter(AtomicU64::new(0)));
            let entity = TransportEntity::new(payload(), CodecLimits::default())
                .streaming(streaming)
                .with_rate_limiter(Some(meter.clone()));
            let written = entity.write_to(Vec::new()).unwrap();
            assert_eq!(meter.0.load(Ordering::Relaxed), written.len() as u64);
        }
    }
}
