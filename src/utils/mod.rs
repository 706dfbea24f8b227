//! # Utility Modules
//!
//! Supporting utilities shared by the codec, transports, client and server.
//!
//! ## Components
//! - **Compression**: gzip, LZ4 and Zstd with bounded decompression
//! - **Rate limiting**: token bucket and a writer that charges it per byte
//! - **Logging**: tracing subscriber setup
//! - **Metrics**: thread-safe counters for invocation traffic

pub mod compression;
pub mod logging;
pub mod metrics;
pub mod rate_limit;

pub use rate_limit::{RateLimiter, TokenBucket};
