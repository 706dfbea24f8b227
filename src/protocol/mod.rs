//! # Protocol Layer
//!
//! Request routing and the messages that frame it.
//!
//! ## Components
//! - **Handler**: request/handler traits and per-call context
//! - **Dispatcher**: handler registry and server-side execution
//! - **Envelope**: session and response wrappers for the wrapped call path
//! - **Message**: authorization outcomes, server errors, remote-call requests
//! - **Remote**: declaring interfaces that can be called across the wire
//!
//! ## Execution
//! ```text
//! decode ─▶ unwrap SessionEnvelope? ─▶ resolve by type name ─▶ authorize? ─▶ handle
//!                                                                       │
//!            wrap in ResponseEnvelope if the request was wrapped ◀──────┘
//! ```

pub mod dispatcher;
pub mod envelope;
pub mod handler;
pub mod message;
pub mod remote;
