use crate::config::CodecLimits;
use crate::core::packet::Packet;
use crate::core::serialization::{decode, encode};
use crate::core::value::Value;
use crate::error::{ProtocolError, Result};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::message::{ServerErrorResponse, WireMessage};
use crate::utils::metrics::{global_metrics, Timer};
use std::sync::Arc;
use tracing::{error, warn};

/// Server-side boundary between frames and the dispatcher.
///
/// Every inbound frame yields exactly one response frame; failures become
/// [`ServerErrorResponse`] values instead of dropped connections.
pub struct Endpoint {
    dispatcher: Arc<Dispatcher>,
    path: String,
    limits: CodecLimits,
}

impl Endpoint {
    pub fn new(dispatcher: Arc<Dispatcher>, path: impl Into<String>, limits: CodecLimits) -> Self {
        Self {
            dispatcher,
            path: path.into(),
            limits,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn limits(&self) -> CodecLimits {
        self.limits
    }

    /// Decode, execute and encode one request frame.
    pub fn handle_packet(&self, packet: Packet) -> Packet {
        let _timer = Timer::start("handle_packet");
        let response = self.process(&packet).unwrap_or_else(|e| {
            if e.is_protocol() {
                global_metrics().protocol_error();
                warn!(error = %e, "Rejected malformed request");
            }
            ServerErrorResponse::from_error(&e).into_value()
        });
        self.response_packet(&response)
    }

    /// Response frame carrying `error`, for failures before a request frame
    /// could be read at all.
    pub fn error_packet(&self, error: &ProtocolError) -> Packet {
        self.response_packet(&ServerErrorResponse::from_error(error).into_value())
    }

    fn process(&self, packet: &Packet) -> Result<Value> {
        if packet.path != self.path {
            return Err(ProtocolError::ConfigError(format!(
                "no endpoint at path {}",
                packet.path
            )));
        }
        let payload = packet.payload(self.limits)?;
        let request = decode(&payload, self.limits)?;
        self.dispatcher.execute(request)
    }

    fn response_packet(&self, response: &Value) -> Packet {
        let body = encode(response, self.limits).or_else(|e| {
            error!(error = %e, "Response could not be encoded");
            encode(&ServerErrorResponse::from_error(&e).into_value(), self.limits)
        });
        // An empty body still reaches the client, which reports it as malformed
        Packet::new("", body.unwrap_or_default())
    }
}
