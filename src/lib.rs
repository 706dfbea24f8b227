//! # wirecall
//!
//! Typed remote invocation over a self-describing binary wire format.
//!
//! A client sends request values to a server that resolves each one to a
//! handler purely by the type name carried on the wire. Privileged request
//! types pass an authorization check before their handler runs. Responses
//! keep array element types across the trip, and request bodies can be
//! streamed, compressed or throttled.
//!
//! ## Layers
//! - [`core`]: value model, bounded codec, request frames
//! - [`protocol`]: handlers, dispatcher, envelopes, remote interfaces
//! - [`transport`]: outbound bodies, TCP and loopback transports, async server
//! - [`service`]: client invoker and server endpoint
//! - [`utils`]: compression, rate limiting, logging, metrics
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use serde::{Deserialize, Serialize};
//! use wirecall::config::{CodecLimits, NetworkConfig};
//! use wirecall::error::Result;
//! use wirecall::protocol::dispatcher::{Dispatcher, HandlerRegistry};
//! use wirecall::protocol::handler::{access, CallContext, RequestHandler, ServerRequest};
//! use wirecall::service::client::ClientInvoker;
//! use wirecall::service::endpoint::Endpoint;
//! use wirecall::transport::local::LoopbackTransport;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Echo {
//!     text: String,
//! }
//! wirecall::wire_type!(Echo => "com.example.Echo");
//!
//! impl ServerRequest for Echo {
//!     type Response = String;
//!     type Access = access::Ordinary;
//! }
//!
//! struct EchoHandler;
//!
//! impl RequestHandler<Echo> for EchoHandler {
//!     fn handle_request(&self, _ctx: &CallContext, request: Echo) -> Result<String> {
//!         Ok(request.text)
//!     }
//! }
//!
//! # fn main() -> Result<()> {
//! let mut registry = HandlerRegistry::builder();
//! registry.register::<Echo, _>(EchoHandler)?;
//! let dispatcher = Arc::new(Dispatcher::new(registry.build()?, None));
//!
//! let config = NetworkConfig::default();
//! let endpoint = Arc::new(Endpoint::new(
//!     dispatcher,
//!     config.client.endpoint_path.clone(),
//!     CodecLimits::default(),
//! ));
//! let invoker = ClientInvoker::new(&config, Arc::new(LoopbackTransport::new(endpoint)));
//!
//! let reply = invoker.send_request(&Echo { text: "hi".into() }, "local")?;
//! assert_eq!(reply, "hi");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod transport;
pub mod utils;

pub use crate::core::value::{Value, WireType};
pub use crate::error::{ProtocolError, Result};
