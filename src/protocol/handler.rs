//! Request and handler traits.
//!
//! A request type names itself on the wire through [`WireType`] and declares
//! its response type and [`access`] level. Handlers are bound to exactly one
//! request type. A privileged request type can only be bound to a
//! [`PrivilegedRequestHandler`], whose authorization check always runs
//! before the handler body; the access level is part of the type, so
//! binding it any other way does not compile.

use crate::core::value::{from_value, to_value, Value, WireType};
use crate::error::Result;
use crate::protocol::envelope::SessionId;
use crate::protocol::message::{
    SuccessfulExecution, UserNotAuthenticated, UserNotAuthorized, WireMessage,
};
use crate::utils::metrics::global_metrics;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use tracing::{debug, warn};

/// Access levels a request type can declare.
pub mod access {
    mod sealed {
        pub trait Sealed {}
    }

    /// Implemented only by [`Ordinary`] and [`Privileged`].
    pub trait AccessLevel: sealed::Sealed + Send + 'static {}

    /// Runs without an authorization check.
    #[derive(Debug)]
    pub enum Ordinary {}

    /// Must pass an authorization check before the handler runs.
    #[derive(Debug)]
    pub enum Privileged {}

    impl sealed::Sealed for Ordinary {}
    impl sealed::Sealed for Privileged {}
    impl AccessLevel for Ordinary {}
    impl AccessLevel for Privileged {}
}

/// A request the server knows how to execute.
pub trait ServerRequest: Serialize + DeserializeOwned + WireType + Send + 'static {
    type Response: Serialize + DeserializeOwned + WireType + Send;

    /// [`access::Ordinary`] or [`access::Privileged`].
    type Access: access::AccessLevel;
}

/// A request executed on behalf of a named user.
pub trait PrivilegedRequest: ServerRequest<Access = access::Privileged> {
    /// User named by the request itself, used when no session is attached.
    fn user(&self) -> Option<&str>;
}

/// Per-call state handed to handlers.
///
/// Each call gets its own context; nothing is shared between concurrent
/// calls or left behind once the call returns.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    session: Option<SessionId>,
    request_id: Option<String>,
    subject: Option<String>,
}

impl CallContext {
    pub fn new(session: Option<SessionId>, request_id: Option<String>) -> Self {
        Self {
            session,
            request_id,
            subject: None,
        }
    }

    /// Session of a wrapped request.
    pub fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// Authenticated subject of a privileged call; `None` everywhere else.
    pub fn subject(&self) -> Option<&str> {
        self.subject.as_deref()
    }

    pub(crate) fn with_subject(&self, subject: Option<String>) -> Self {
        Self {
            subject,
            ..self.clone()
        }
    }
}

/// Executes one request type.
pub trait RequestHandler<R>: Send + Sync + 'static
where
    R: ServerRequest<Access = access::Ordinary>,
{
    fn handle_request(&self, ctx: &CallContext, request: R) -> Result<R::Response>;
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationResponse {
    Authorized,
    /// Message is returned to the caller verbatim
    NotAuthorized(String),
    NotAuthenticated(String),
}

/// Executes one privileged request type after deciding whether the caller
/// may run it.
pub trait PrivilegedRequestHandler<R: PrivilegedRequest>: Send + Sync + 'static {
    fn authorized(&self, ctx: &CallContext, request: &R) -> AuthorizationResponse;

    fn handle_request(&self, ctx: &CallContext, request: R) -> Result<R::Response>;
}

/// Convert a typed response, turning `Vec<T>` into a typed array.
pub fn typed_response<T: Serialize + WireType>(response: &T) -> Result<Value> {
    let value = to_value(response)?;
    Ok(match (T::element_type(), value) {
        (Some(element_type), Value::List(items)) => Value::Array {
            element_type: element_type.into_owned(),
            items,
        },
        (_, value) => value,
    })
}

/// Handler with its request and response types erased.
pub(crate) trait ErasedHandler: Send + Sync {
    fn invoke(&self, ctx: &CallContext, request: Value) -> Result<Value>;
}

pub(crate) struct ErasedOrdinary<R, H> {
    handler: H,
    _request: PhantomData<fn(R)>,
}

impl<R, H> ErasedOrdinary<R, H> {
    pub(crate) fn new(handler: H) -> Self {
        Self {
            handler,
            _request: PhantomData,
        }
    }
}

impl<R, H> ErasedHandler for ErasedOrdinary<R, H>
where
    R: ServerRequest<Access = access::Ordinary>,
    H: RequestHandler<R>,
{
    fn invoke(&self, ctx: &CallContext, request: Value) -> Result<Value> {
        let request: R = from_value(request)?;
        let response = self.handler.handle_request(ctx, request)?;
        typed_response(&response)
    }
}

pub(crate) struct ErasedPrivileged<R, H> {
    handler: H,
    _request: PhantomData<fn(R)>,
}

impl<R, H> ErasedPrivileged<R, H> {
    pub(crate) fn new(handler: H) -> Self {
        Self {
            handler,
            _request: PhantomData,
        }
    }
}

impl<R, H> ErasedHandler for ErasedPrivileged<R, H>
where
    R: PrivilegedRequest,
    H: PrivilegedRequestHandler<R>,
{
    fn invoke(&self, ctx: &CallContext, request: Value) -> Result<Value> {
        let request: R = from_value(request)?;
        let subject = ctx
            .session()
            .and_then(|session| session.user_name.clone())
            .or_else(|| request.user().map(str::to_owned));
        let ctx = ctx.with_subject(subject);
        debug!(subject = ?ctx.subject(), request_type = %R::wire_name(), "Authorizing request");

        match self.handler.authorized(&ctx, &request) {
            AuthorizationResponse::Authorized => {}
            AuthorizationResponse::NotAuthorized(message) => {
                global_metrics().authorization_denied();
                warn!(
                    subject = ?ctx.subject(),
                    request_type = %R::wire_name(),
                    "User not authorized"
                );
                return Ok(UserNotAuthorized { message }.into_value());
            }
            AuthorizationResponse::NotAuthenticated(message) => {
                global_metrics().authorization_denied();
                warn!(
                    subject = ?ctx.subject(),
                    request_type = %R::wire_name(),
                    "User not authenticated"
                );
                return Ok(UserNotAuthenticated { message }.into_value());
            }
        }

        let response = self.handler.handle_request(&ctx, request)?;
        Ok(SuccessfulExecution {
            response: typed_response(&response)?,
            updated_data: None,
        }
        .into_value())
    }
}
