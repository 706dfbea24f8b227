//! # Core Protocol Components
//!
//! The value model, the self-describing wire codec, and request framing.
//!
//! ## Components
//! - **Value**: dynamic, tagged representation of any request or response
//! - **Serialization**: bounded binary encoding of values
//! - **Packet**: frame carrying one encoded body to a named endpoint path
//! - **Codec**: Tokio codec for framing packets over byte streams
//!
//! ## Security
//! - Three ceilings (message size, frame size, recursion depth) from
//!   [`CodecLimits`](crate::config::CodecLimits)
//! - Magic bytes prevent accidental misinterpretation
//! - Length validation before allocation

pub mod codec;
pub mod packet;
pub mod serialization;
pub mod value;
