//! # Service Layer
//!
//! The two ends applications talk to.
//!
//! - **Client**: [`ClientInvoker`](client::ClientInvoker) sends typed and
//!   privileged requests and backs generated remote-interface stubs
//! - **Endpoint**: [`Endpoint`](endpoint::Endpoint) turns request frames into
//!   dispatcher calls and response frames, for any server transport

pub mod client;
pub mod endpoint;
