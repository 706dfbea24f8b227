//! Remote interfaces.
//!
//! [`remote_interface!`](crate::remote_interface) declares a trait that can
//! be called across the wire and generates both ends of it:
//!
//! - a client stub that turns each method call into a
//!   [`RemoteServiceRequest`] and sends it through a
//!   [`ClientInvoker`](crate::service::client::ClientInvoker),
//! - a server adapter that implements [`ServiceObject`] over any
//!   implementation of the trait.
//!
//! ```rust
//! use wirecall::remote_interface;
//!
//! remote_interface! {
//!     pub trait Greeter as "com.example.Greeter" {
//!         client = GreeterClient;
//!         server = GreeterServer;
//!         fn greet(&self, name: String) -> String;
//!         fn names(&self) -> Vec<String>;
//!     }
//! }
//! ```
//!
//! Only interfaces declared this way implement [`RemoteService`], so asking
//! a client for a stub of anything else does not compile.

use crate::core::value::{from_value, Value};
use crate::error::{ProtocolError, Result};
use crate::protocol::handler::{CallContext, ErasedHandler};
use crate::protocol::message::{RemoteServiceRequest, WireMessage};
use crate::service::client::{ClientInvoker, Destination};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Capability marker for interfaces that may be invoked remotely.
pub trait RemoteService {
    const INTERFACE_NAME: &'static str;

    /// Generated client stub.
    type Client;

    fn client(invoker: Arc<ClientInvoker>, destination: Destination) -> Self::Client;
}

/// Server side of a remote interface, addressed by method name.
pub trait ServiceObject: Send + Sync {
    fn interface_name(&self) -> &'static str;

    fn invoke(&self, method: &str, arguments: Vec<Value>) -> Result<Value>;
}

/// Handler bound to [`RemoteServiceRequest`]; routes by interface name.
pub(crate) struct InvokeInterfaceMethod {
    services: HashMap<String, Arc<dyn ServiceObject>>,
}

impl InvokeInterfaceMethod {
    pub(crate) fn new(services: HashMap<String, Arc<dyn ServiceObject>>) -> Self {
        Self { services }
    }
}

impl ErasedHandler for InvokeInterfaceMethod {
    fn invoke(&self, _ctx: &CallContext, request: Value) -> Result<Value> {
        let request = RemoteServiceRequest::from_value(request)?;
        let service = self
            .services
            .get(&request.interface)
            .ok_or_else(|| ProtocolError::UnknownService(request.interface.clone()))?;
        debug!(
            interface = %request.interface,
            method = %request.method,
            "Invoking interface method"
        );
        service.invoke(&request.method, request.arguments)
    }
}

/// Pull the next positional argument of a remote call.
pub fn next_argument<T, I>(arguments: &mut I, interface: &str, method: &str) -> Result<T>
where
    T: DeserializeOwned,
    I: Iterator<Item = Value>,
{
    let value = arguments.next().ok_or_else(|| {
        ProtocolError::Serialization(format!("{interface}.{method}: missing argument"))
    })?;
    from_value(value)
}

/// Error for a method name the interface does not declare.
pub fn unknown_method(interface: &str, method: &str) -> ProtocolError {
    ProtocolError::UnknownService(format!("{interface}.{method}"))
}

/// Declare a remotely invocable interface. See the [module docs](crate::protocol::remote).
#[macro_export]
macro_rules! remote_interface {
    (
        $(#[$meta:meta])*
        $vis:vis trait $name:ident as $wire:literal {
            client = $client:ident;
            server = $server:ident;
            $(
                $(#[$method_meta:meta])*
                fn $method:ident(&self $(, $arg:ident : $arg_ty:ty)* $(,)?) -> $ret:ty;
            )*
        }
    ) => {
        $(#[$meta])*
        $vis trait $name: Send + Sync {
            $(
                $(#[$method_meta])*
                fn $method(&self $(, $arg: $arg_ty)*) -> $crate::error::Result<$ret>;
            )*
        }

        impl $crate::protocol::remote::RemoteService for dyn $name {
            const INTERFACE_NAME: &'static str = $wire;
            type Client = $client;

            fn client(
                invoker: ::std::sync::Arc<$crate::service::client::ClientInvoker>,
                destination: $crate::service::client::Destination,
            ) -> $client {
                $client { invoker, destination }
            }
        }

        /// Client stub; every call is one round trip.
        $vis struct $client {
            invoker: ::std::sync::Arc<$crate::service::client::ClientInvoker>,
            destination: $crate::service::client::Destination,
        }

        impl $name for $client {
            $(
                fn $method(&self $(, $arg: $arg_ty)*) -> $crate::error::Result<$ret> {
                    let arguments = vec![$($crate::core::value::to_value(&$arg)?),*];
                    let request = $crate::protocol::message::RemoteServiceRequest {
                        interface: $wire.to_string(),
                        method: stringify!($method).to_string(),
                        arguments,
                    };
                    let value = self.invoker.invoke(self.destination, request)?;
                    $crate::core::value::from_value(value)
                }
            )*
        }

        /// Server adapter exposing an implementation to the dispatcher.
        $vis struct $server<T>(pub T);

        impl<T: $name> $crate::protocol::remote::ServiceObject for $server<T> {
            fn interface_name(&self) -> &'static str {
                $wire
            }

            #[allow(unused_mut, unused_variables)]
            fn invoke(
                &self,
                method: &str,
                arguments: ::std::vec::Vec<$crate::core::value::Value>,
            ) -> $crate::error::Result<$crate::core::value::Value> {
                let mut arguments = arguments.into_iter();
                $(
                    if method == stringify!($method) {
                        $(
                            let $arg: $arg_ty = $crate::protocol::remote::next_argument(
                                &mut arguments,
                                $wire,
                                stringify!($method),
                            )?;
                        )*
                        let result = self.0.$method($($arg),*)?;
                        return $crate::protocol::handler::typed_response(&result);
                    }
                )*
                Err($crate::protocol::remote::unknown_method($wire, method))
            }
        }
    };
}
