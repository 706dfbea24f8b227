//! Outer wrappers used on the wrapped call path.
//!
//! A [`SessionEnvelope`] carries the caller's identity to the server; the
//! server answers a wrapped request with a [`ResponseEnvelope`] naming the
//! host that served it. Requests sent bare are answered bare.

use crate::core::value::{Fields, Value};
use crate::error::{ProtocolError, Result};
use crate::protocol::message::{WireMessage, RESPONSE_ENVELOPE, SESSION_ENVELOPE, SESSION_ID};

/// Who is calling and from where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId {
    pub user_name: Option<String>,
    pub host: String,
    pub program: String,
    pub pid: u32,
}

impl SessionId {
    /// Identity of the current process acting for `user_name`.
    pub fn current(user_name: Option<String>) -> Self {
        let host = local_host_name();
        let program = std::env::current_exe()
            .ok()
            .and_then(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "unknown".to_string());
        Self {
            user_name,
            host,
            program,
            pid: std::process::id(),
        }
    }
}

/// Name of this machine, or `"unknown"` when it cannot be read.
pub fn local_host_name() -> String {
    hostname::get()
        .ok()
        .map(|h| h.to_string_lossy().into_owned())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

impl WireMessage for SessionId {
    const TYPE_NAME: &'static str = SESSION_ID;

    fn into_value(self) -> Value {
        Value::object(
            Self::TYPE_NAME,
            vec![
                ("user_name", Value::from(self.user_name)),
                ("host", Value::String(self.host)),
                ("program", Value::String(self.program)),
                ("pid", Value::U64(u64::from(self.pid))),
            ],
        )
    }

    fn from_fields(mut fields: Fields) -> Result<Self> {
        let pid = fields.take_u64("pid")?;
        let pid = u32::try_from(pid).map_err(|_| {
            let type_name = fields.type_name();
            ProtocolError::Serialization(format!("{type_name}.pid: {pid} is out of range"))
        })?;
        Ok(Self {
            user_name: fields.take_opt_string("user_name")?,
            host: fields.take_string("host")?,
            program: fields.take_string("program")?,
            pid,
        })
    }
}

/// A request paired with the session that sent it.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEnvelope {
    pub request: Value,
    pub session: SessionId,
    /// Correlates client and server log lines for one call
    pub unique_id: String,
}

impl WireMessage for SessionEnvelope {
    const TYPE_NAME: &'static str = SESSION_ENVELOPE;

    fn into_value(self) -> Value {
        Value::object(
            Self::TYPE_NAME,
            vec![
                ("request", self.request),
                ("session", self.session.into_value()),
                ("unique_id", Value::String(self.unique_id)),
            ],
        )
    }

    fn from_fields(mut fields: Fields) -> Result<Self> {
        let request = fields.take("request");
        let session = SessionId::from_value(fields.take("session"))?;
        Ok(Self {
            request,
            session,
            unique_id: fields.take_string("unique_id")?,
        })
    }
}

/// A response paired with the serving host and, for arrays, the element
/// type needed to rebuild the array on the far side.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseEnvelope {
    response: Value,
    host: Option<String>,
    element_type: Option<String>,
}

impl ResponseEnvelope {
    /// Wrap `value`. An array response is held as a plain list and its
    /// element type kept as the hint; any other value carries no hint.
    pub fn new(value: Value, host: Option<String>) -> Self {
        match value {
            Value::Array {
                element_type,
                items,
            } => Self {
                response: Value::List(items),
                host,
                element_type: Some(element_type),
            },
            response => Self {
                response,
                host,
                element_type: None,
            },
        }
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn element_type(&self) -> Option<&str> {
        self.element_type.as_deref()
    }

    /// The wrapped response, rebuilt as a typed array when a hint is present
    /// and the held value is a plain list.
    pub fn into_response(self) -> Value {
        match (self.element_type, self.response) {
            (Some(element_type), Value::List(items)) => Value::Array {
                element_type,
                items,
            },
            (_, response) => response,
        }
    }
}

impl WireMessage for ResponseEnvelope {
    const TYPE_NAME: &'static str = RESPONSE_ENVELOPE;

    fn into_value(self) -> Value {
        Value::object(
            Self::TYPE_NAME,
            vec![
                ("response", self.response),
                ("host", Value::from(self.host)),
                ("element_type", Value::from(self.element_type)),
            ],
        )
    }

    fn from_fields(mut fields: Fields) -> Result<Self> {
        Ok(Self {
            response: fields.take("response"),
            host: fields.take_opt_string("host")?,
            element_type: fields.take_opt_string("element_type")?,
        })
    }
}
