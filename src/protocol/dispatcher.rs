use crate::config::ServerConfig;
use crate::core::value::Value;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::envelope::{local_host_name, ResponseEnvelope, SessionEnvelope};
use crate::protocol::handler::{
    access, CallContext, ErasedHandler, ErasedOrdinary, ErasedPrivileged, PrivilegedRequest,
    PrivilegedRequestHandler, RequestHandler, ServerRequest,
};
use crate::protocol::message::{WireMessage, REMOTE_SERVICE_REQUEST};
use crate::protocol::remote::{InvokeInterfaceMethod, ServiceObject};
use crate::utils::metrics::global_metrics;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info};

/// Collects handlers at startup. Every mistake is reported at registration
/// or at [`build`](Self::build), never while serving.
#[derive(Default)]
pub struct RegistryBuilder {
    handlers: HashMap<String, Arc<dyn ErasedHandler>>,
    services: HashMap<String, Arc<dyn ServiceObject>>,
    required: Vec<String>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handler` to ordinary request type `R`.
    ///
    /// Privileged request types are rejected at compile time:
    ///
    /// ```compile_fail
    /// use serde::{Deserialize, Serialize};
    /// use wirecall::error::Result;
    /// use wirecall::protocol::dispatcher::HandlerRegistry;
    /// use wirecall::protocol::handler::{
    ///     access, CallContext, PrivilegedRequest, RequestHandler, ServerRequest,
    /// };
    ///
    /// #[derive(Serialize, Deserialize)]
    /// struct Wipe {}
    /// wirecall::wire_type!(Wipe => "com.example.Wipe");
    ///
    /// impl ServerRequest for Wipe {
    ///     type Response = String;
    ///     type Access = access::Privileged;
    /// }
    ///
    /// impl PrivilegedRequest for Wipe {
    ///     fn user(&self) -> Option<&str> {
    ///         None
    ///     }
    /// }
    ///
    /// struct WipeHandler;
    ///
    /// impl RequestHandler<Wipe> for WipeHandler {
    ///     fn handle_request(&self, _ctx: &CallContext, _request: Wipe) -> Result<String> {
    ///         Ok("wiped".into())
    ///     }
    /// }
    ///
    /// let mut builder = HandlerRegistry::builder();
    /// builder.register::<Wipe, _>(WipeHandler).unwrap();
    /// ```
    pub fn register<R, H>(&mut self, handler: H) -> Result<&mut Self>
    where
        R: ServerRequest<Access = access::Ordinary>,
        H: RequestHandler<R>,
    {
        let type_name = R::wire_name().into_owned();
        self.insert(type_name, Arc::new(ErasedOrdinary::<R, H>::new(handler)))
    }

    /// Bind an authorizing handler to privileged request type `R`.
    pub fn register_privileged<R, H>(&mut self, handler: H) -> Result<&mut Self>
    where
        R: PrivilegedRequest,
        H: PrivilegedRequestHandler<R>,
    {
        let type_name = R::wire_name().into_owned();
        self.insert(type_name, Arc::new(ErasedPrivileged::<R, H>::new(handler)))
    }

    /// Expose a remote interface implementation. Calls reach it through the
    /// generic interface-method handler.
    pub fn register_service<S>(&mut self, service: S) -> Result<&mut Self>
    where
        S: ServiceObject + 'static,
    {
        let interface = service.interface_name().to_string();
        if self.services.contains_key(&interface) {
            return Err(ProtocolError::DuplicateHandler(interface));
        }
        self.services.insert(interface, Arc::new(service));
        Ok(self)
    }

    /// Fail [`build`](Self::build) unless some handler serves `R`.
    pub fn require<R: ServerRequest>(&mut self) -> &mut Self {
        self.required.push(R::wire_name().into_owned());
        self
    }

    pub fn build(&mut self) -> Result<HandlerRegistry> {
        let mut handlers = std::mem::take(&mut self.handlers);
        let services = std::mem::take(&mut self.services);
        if !services.is_empty() {
            if handlers.contains_key(REMOTE_SERVICE_REQUEST) {
                return Err(ProtocolError::DuplicateHandler(
                    REMOTE_SERVICE_REQUEST.to_string(),
                ));
            }
            handlers.insert(
                REMOTE_SERVICE_REQUEST.to_string(),
                Arc::new(InvokeInterfaceMethod::new(services)),
            );
        }
        for type_name in self.required.drain(..) {
            if !handlers.contains_key(&type_name) {
                return Err(ProtocolError::HandlerNotFound(type_name));
            }
        }
        info!(handlers = handlers.len(), "Handler registry built");
        Ok(HandlerRegistry { handlers })
    }

    fn insert(&mut self, type_name: String, handler: Arc<dyn ErasedHandler>) -> Result<&mut Self> {
        if self.handlers.contains_key(&type_name) {
            return Err(ProtocolError::DuplicateHandler(type_name));
        }
        self.handlers.insert(type_name, handler);
        Ok(self)
    }
}

/// Frozen mapping from wire type name to handler.
///
/// Immutable after [`RegistryBuilder::build`], so concurrent lookups share
/// it without locking.
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ErasedHandler>>,
}

impl HandlerRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.handlers.contains_key(type_name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn resolve(&self, type_name: &str) -> Result<&Arc<dyn ErasedHandler>> {
        self.handlers
            .get(type_name)
            .ok_or_else(|| ProtocolError::HandlerNotFound(type_name.to_string()))
    }
}

/// Server-side execution of decoded requests.
pub struct Dispatcher {
    registry: HandlerRegistry,
    host_label: String,
}

impl Dispatcher {
    /// `host_label` names this server in response envelopes; the machine
    /// host name is used when it is `None`.
    pub fn new(registry: HandlerRegistry, host_label: Option<String>) -> Self {
        Self {
            registry,
            host_label: host_label.unwrap_or_else(local_host_name),
        }
    }

    pub fn from_config(registry: HandlerRegistry, config: &ServerConfig) -> Self {
        Self::new(registry, config.host_label.clone())
    }

    pub fn host_label(&self) -> &str {
        &self.host_label
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// Execute one request, wrapped or bare, and shape the response the
    /// same way it arrived.
    pub fn execute(&self, request: Value) -> Result<Value> {
        let (request, ctx, wrapped) = if SessionEnvelope::matches(&request) {
            let envelope = SessionEnvelope::from_value(request)?;
            let ctx = CallContext::new(Some(envelope.session), Some(envelope.unique_id));
            (envelope.request, ctx, true)
        } else {
            (request, CallContext::default(), false)
        };

        let type_name = request
            .object_type()
            .ok_or_else(|| {
                ProtocolError::Serialization(constants::ERR_UNTAGGED_REQUEST.to_string())
            })?
            .to_string();
        let handler = self.registry.resolve(&type_name)?;

        info!(
            user = ?ctx.session().and_then(|s| s.user_name.as_deref()),
            request_id = ?ctx.request_id(),
            request = %request.summary(),
            "Executing request"
        );
        global_metrics().dispatch();

        let response = handler.invoke(&ctx, request).map_err(|e| {
            global_metrics().handler_failure();
            error!(
                request_type = %type_name,
                request_id = ?ctx.request_id(),
                error = %e,
                "Problem executing request"
            );
            e
        })?;

        if wrapped {
            Ok(ResponseEnvelope::new(response, Some(self.host_label.clone())).into_value())
        } else {
            Ok(response)
        }
    }
}
