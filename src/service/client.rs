//! Client-side invocation.
//!
//! [`ClientInvoker`] frames requests, posts them through a [`Transport`] and
//! unwraps whatever comes back. It never looks inside a domain response;
//! only framework shapes (envelopes, server errors, authorization outcomes)
//! are interpreted here.

use crate::config::{ClientConfig, CodecLimits, NetworkConfig, TransportConfig};
use crate::core::serialization::decode;
use crate::core::value::{from_value, to_tagged, Value};
use crate::error::{ProtocolError, Result};
use crate::protocol::envelope::{ResponseEnvelope, SessionEnvelope, SessionId};
use crate::protocol::handler::{PrivilegedRequest, ServerRequest};
use crate::protocol::message::{
    RemoteServiceRequest, ServerErrorResponse, SuccessfulExecution, UserNotAuthenticated,
    UserNotAuthorized, WireMessage,
};
use crate::protocol::remote::RemoteService;
use crate::transport::entity::TransportEntity;
use crate::transport::Transport;
use crate::utils::metrics::global_metrics;
use crate::utils::rate_limit::{RateLimiter, TokenBucket};
use std::backtrace::Backtrace;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn, Level};
use uuid::Uuid;

/// Which configured server a call goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    /// General request server
    Http,
    /// Localization request server
    Localization,
}

/// Decides what a privileged call returns when the server refuses it.
///
/// Implementations may prompt for credentials and retry, returning the
/// retried call's result, or fail.
pub trait NotAuthHandler: Send + Sync {
    fn not_authorized(&self, response: &UserNotAuthorized) -> Result<Value>;

    fn not_authenticated(&self, response: &UserNotAuthenticated) -> Result<Value>;
}

/// Turns every refusal into an error carrying the server's message.
#[derive(Debug, Default, Clone, Copy)]
pub struct RejectingNotAuthHandler;

impl NotAuthHandler for RejectingNotAuthHandler {
    fn not_authorized(&self, response: &UserNotAuthorized) -> Result<Value> {
        Err(ProtocolError::NotAuthorized(response.message.clone()))
    }

    fn not_authenticated(&self, response: &UserNotAuthenticated) -> Result<Value> {
        Err(ProtocolError::NotAuthenticated(response.message.clone()))
    }
}

pub struct ClientInvoker {
    config: ClientConfig,
    transport_config: TransportConfig,
    transport: Arc<dyn Transport>,
    limits: CodecLimits,
    limiter: Option<Arc<dyn RateLimiter>>,
    session: SessionId,
    session_data: Mutex<Option<Value>>,
}

impl ClientInvoker {
    pub fn new(config: &NetworkConfig, transport: Arc<dyn Transport>) -> Self {
        let limiter = config.transport.rate_limit_bytes_per_sec.map(|rate| {
            let burst = config.transport.rate_limit_burst.unwrap_or(rate);
            Arc::new(TokenBucket::new(rate, burst)) as Arc<dyn RateLimiter>
        });
        Self {
            config: config.client.clone(),
            transport_config: config.transport.clone(),
            transport,
            limits: CodecLimits::global(),
            limiter,
            session: SessionId::current(None),
            session_data: Mutex::new(None),
        }
    }

    pub fn with_limits(mut self, limits: CodecLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_session(mut self, session: SessionId) -> Self {
        self.session = session;
        self
    }

    /// Replace the limiter built from the transport configuration.
    pub fn with_rate_limiter(mut self, limiter: Option<Arc<dyn RateLimiter>>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn session(&self) -> &SessionId {
        &self.session
    }

    /// Session data last handed out by the server, if any.
    pub fn session_data(&self) -> Option<Value> {
        self.session_data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn address(&self, destination: Destination) -> &str {
        match destination {
            Destination::Http => &self.config.http_server,
            Destination::Localization => &self.config.localization_server,
        }
    }

    /// Client stub for a remote interface. Only interfaces declared with
    /// [`remote_interface!`](crate::remote_interface) qualify.
    pub fn construct_service_proxy<S>(self: &Arc<Self>, destination: Destination) -> S::Client
    where
        S: RemoteService + ?Sized,
    {
        debug!(interface = S::INTERFACE_NAME, ?destination, "Creating service proxy");
        S::client(Arc::clone(self), destination)
    }

    /// Send a request and return its typed response.
    pub fn send_request<R: ServerRequest>(
        &self,
        request: &R,
        server_address: &str,
    ) -> Result<R::Response> {
        let response = self.post(server_address, to_tagged(request)?)?;
        from_value(response)
    }

    /// Send a privileged request. Refusals go to `not_auth`; a successful
    /// execution is unwrapped and any session data it carries is stored.
    pub fn send_privileged_request<R: PrivilegedRequest>(
        &self,
        request: &R,
        not_auth: &dyn NotAuthHandler,
        server_address: &str,
    ) -> Result<R::Response> {
        let response = self.post(server_address, to_tagged(request)?)?;

        if UserNotAuthenticated::matches(&response) {
            let refusal = UserNotAuthenticated::from_value(response)?;
            info!(message = %refusal.message, "User not authenticated");
            return from_value(not_auth.not_authenticated(&refusal)?);
        }
        if UserNotAuthorized::matches(&response) {
            let refusal = UserNotAuthorized::from_value(response)?;
            info!(message = %refusal.message, "User not authorized");
            return from_value(not_auth.not_authorized(&refusal)?);
        }

        let success = SuccessfulExecution::from_value(response)?;
        if let Some(data) = success.updated_data {
            debug!("Storing updated session data");
            *self
                .session_data
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(data);
        }
        from_value(success.response)
    }

    /// Call a remote interface method; used by generated client stubs.
    pub fn invoke(&self, destination: Destination, request: RemoteServiceRequest) -> Result<Value> {
        self.post(self.address(destination), request.into_value())
    }

    /// Wrap, post, decode and unwrap one request.
    fn post(&self, server_address: &str, request: Value) -> Result<Value> {
        let request_id = Uuid::new_v4().to_string();
        let url = format!("{server_address}{}", self.config.endpoint_path);
        let envelope = SessionEnvelope {
            request,
            session: self.session.clone(),
            unique_id: request_id.clone(),
        };

        let entity = TransportEntity::new(envelope.into_value(), self.limits)
            .streaming(self.transport_config.stream_requests)
            .compressed(self.transport_config.compression)
            .with_rate_limiter(self.limiter.clone());
        let length = entity.content_length()?;

        let start = Instant::now();
        let result = self
            .transport
            .post(server_address, &self.config.endpoint_path, entity);
        let elapsed = start.elapsed();
        let elapsed_ms = elapsed.as_millis() as u64;

        info!(url = %url, request_id = %request_id, length = ?length, elapsed_ms, "Request posted");
        if elapsed >= self.config.slow_call_threshold {
            global_metrics().slow_call();
            warn!(url = %url, request_id = %request_id, elapsed_ms, "Slow call");
            if tracing::enabled!(Level::DEBUG) {
                debug!(
                    request_id = %request_id,
                    "(NOT AN ERROR) Stack of slow call:\n{}",
                    Backtrace::force_capture()
                );
            }
        }

        let body = result.map_err(|e| {
            global_metrics().request_failed();
            warn!(url = %url, request_id = %request_id, error = %e, "Request failed");
            e
        })?;
        global_metrics().request_sent(length.unwrap_or(0) as u64);
        global_metrics().response_received(body.len() as u64);

        let response = decode(&body, self.limits)?;
        if ServerErrorResponse::matches(&response) {
            let error = ServerErrorResponse::from_value(response)?;
            warn!(
                request_id = %request_id,
                error_type = %error.error_type,
                message = %error.message,
                "Server reported an error"
            );
            return Err(error.into_error());
        }
        if ResponseEnvelope::matches(&response) {
            return Ok(ResponseEnvelope::from_value(response)?.into_response());
        }
        Ok(response)
    }
}
