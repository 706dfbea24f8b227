//! Framework messages that travel alongside domain requests and responses.
//!
//! Each message is a tagged [`Value::Object`] with a fixed type name under
//! the `wirecall.` prefix, so receivers recognize them by tag alone.

use crate::core::value::{Fields, Value};
use crate::error::{ProtocolError, Result};

pub const SESSION_ENVELOPE: &str = "wirecall.SessionEnvelope";
pub const SESSION_ID: &str = "wirecall.SessionId";
pub const RESPONSE_ENVELOPE: &str = "wirecall.ResponseEnvelope";
pub const SERVER_ERROR_RESPONSE: &str = "wirecall.ServerErrorResponse";
pub const USER_NOT_AUTHORIZED: &str = "wirecall.UserNotAuthorized";
pub const USER_NOT_AUTHENTICATED: &str = "wirecall.UserNotAuthenticated";
pub const SUCCESSFUL_EXECUTION: &str = "wirecall.SuccessfulExecution";
pub const REMOTE_SERVICE_REQUEST: &str = "wirecall.RemoteServiceRequest";

/// A message with a fixed wire tag and hand-written field mapping.
pub trait WireMessage: Sized {
    const TYPE_NAME: &'static str;

    fn into_value(self) -> Value;

    fn from_fields(fields: Fields) -> Result<Self>;

    fn from_value(value: Value) -> Result<Self> {
        Self::from_fields(value.into_fields(Self::TYPE_NAME)?)
    }

    /// Whether `value` is tagged as this message.
    fn matches(value: &Value) -> bool {
        value.object_type() == Some(Self::TYPE_NAME)
    }
}

/// A handler failed, or the request could not be decoded or routed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerErrorResponse {
    pub message: String,
    pub error_type: String,
}

impl ServerErrorResponse {
    pub fn from_error(error: &ProtocolError) -> Self {
        Self {
            message: error.to_string(),
            error_type: error.kind().to_string(),
        }
    }

    pub fn into_error(self) -> ProtocolError {
        ProtocolError::RemoteExecution {
            error_type: self.error_type,
            message: self.message,
        }
    }
}

impl WireMessage for ServerErrorResponse {
    const TYPE_NAME: &'static str = SERVER_ERROR_RESPONSE;

    fn into_value(self) -> Value {
        Value::object(
            Self::TYPE_NAME,
            vec![
                ("message", Value::String(self.message)),
                ("error_type", Value::String(self.error_type)),
            ],
        )
    }

    fn from_fields(mut fields: Fields) -> Result<Self> {
        Ok(Self {
            message: fields.take_string("message")?,
            error_type: fields.take_string("error_type")?,
        })
    }
}

/// The caller is known but may not run this request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserNotAuthorized {
    pub message: String,
}

impl WireMessage for UserNotAuthorized {
    const TYPE_NAME: &'static str = USER_NOT_AUTHORIZED;

    fn into_value(self) -> Value {
        Value::object(Self::TYPE_NAME, vec![("message", Value::String(self.message))])
    }

    fn from_fields(mut fields: Fields) -> Result<Self> {
        Ok(Self {
            message: fields.take_string("message")?,
        })
    }
}

/// The caller has not proven who they are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserNotAuthenticated {
    pub message: String,
}

impl WireMessage for UserNotAuthenticated {
    const TYPE_NAME: &'static str = USER_NOT_AUTHENTICATED;

    fn into_value(self) -> Value {
        Value::object(Self::TYPE_NAME, vec![("message", Value::String(self.message))])
    }

    fn from_fields(mut fields: Fields) -> Result<Self> {
        Ok(Self {
            message: fields.take_string("message")?,
        })
    }
}

/// Result of a privileged request that passed authorization.
///
/// `updated_data` is reserved for session data the server wants the client
/// to store; the dispatcher always leaves it empty.
#[derive(Debug, Clone, PartialEq)]
pub struct SuccessfulExecution {
    pub response: Value,
    pub updated_data: Option<Value>,
}

impl WireMessage for SuccessfulExecution {
    const TYPE_NAME: &'static str = SUCCESSFUL_EXECUTION;

    fn into_value(self) -> Value {
        Value::object(
            Self::TYPE_NAME,
            vec![
                ("response", self.response),
                ("updated_data", self.updated_data.unwrap_or(Value::Null)),
            ],
        )
    }

    fn from_fields(mut fields: Fields) -> Result<Self> {
        let response = fields.take("response");
        let updated_data = match fields.take("updated_data") {
            Value::Null => None,
            data => Some(data),
        };
        Ok(Self {
            response,
            updated_data,
        })
    }
}

/// One call on a remote interface.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteServiceRequest {
    pub interface: String,
    pub method: String,
    pub arguments: Vec<Value>,
}

impl WireMessage for RemoteServiceRequest {
    const TYPE_NAME: &'static str = REMOTE_SERVICE_REQUEST;

    fn into_value(self) -> Value {
        Value::object(
            Self::TYPE_NAME,
            vec![
                ("interface", Value::String(self.interface)),
                ("method", Value::String(self.method)),
                ("arguments", Value::List(self.arguments)),
            ],
        )
    }

    fn from_fields(mut fields: Fields) -> Result<Self> {
        Ok(Self {
            interface: fields.take_string("interface")?,
            method: fields.take_string("method")?,
            arguments: fields.take_items("arguments")?,
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_server_error_keeps_kind_and_message() {
        let original = ProtocolError::Custom("disk full".into());
        let response = ServerErrorResponse::from_error(&original);
        let back = ServerErrorResponse::from_value(response.into_value()).unwrap();
        assert_eq!(back.error_type, "Custom");
        match back.into_error() {
            ProtocolError::RemoteExecution { message, .. } => {
                assert_eq!(message, "Custom error: disk full")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_successful_execution_null_update_reads_as_none() {
        let value = SuccessfulExecution {
            response: Value::I64(4),
            updated_data: None,
        }
        .into_value();
        assert!(SuccessfulExecution::matches(&value));
        let back = SuccessfulExecution::from_value(value).unwrap();
        assert_eq!(back.response, Value::I64(4));
        assert!(back.updated_data.is_none());
    }

    #[test]
    fn test_wrong_tag_is_rejected() {
        let value = UserNotAuthorized {
            message: "no".into(),
        }
        .into_value();
        assert!(UserNotAuthenticated::from_value(value).is_err());
    }
}
