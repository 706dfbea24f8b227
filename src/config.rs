//! # Configuration Management
//!
//! Centralized configuration for the codec, the server, and the client.
//!
//! ## Codec ceilings
//! [`CodecLimits`] bounds every encode and decode: total message size, the
//! size of any single frame or length-prefixed item, and container nesting
//! depth. The process-wide values come from the environment:
//!
//! | Variable                     | Default      |
//! |------------------------------|--------------|
//! | `WIRECALL_MAX_MESSAGE_SIZE`  | 104857600    |
//! | `WIRECALL_MAX_FRAME_SIZE`    | 16384000     |
//! | `WIRECALL_RECURSION_DEPTH`   | 64           |
//!
//! A value that is missing, unparsable, or not positive is logged and replaced
//! by the default. Resolution never fails.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()` / `from_toml()`
//! - Environment overrides via `from_env()`
//! - Direct instantiation with defaults

use crate::error::{ProtocolError, Result};
use crate::utils::compression::CompressionKind;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::{info, Level};

/// Current wire protocol version
pub const PROTOCOL_VERSION: u8 = 1;

/// Magic bytes that open every network frame ("WCAL")
pub const MAGIC_BYTES: [u8; 4] = [0x57, 0x43, 0x41, 0x4C];

/// Default ceiling on the encoded size of one message (100 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Default ceiling on a single frame or length-prefixed item
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16_384_000;

/// Default ceiling on container nesting
pub const DEFAULT_RECURSION_DEPTH: usize = 64;

pub const ENV_MAX_MESSAGE_SIZE: &str = "WIRECALL_MAX_MESSAGE_SIZE";
pub const ENV_MAX_FRAME_SIZE: &str = "WIRECALL_MAX_FRAME_SIZE";
pub const ENV_RECURSION_DEPTH: &str = "WIRECALL_RECURSION_DEPTH";

/// Endpoint path requests are posted to unless configured otherwise
pub const DEFAULT_ENDPOINT_PATH: &str = "/invoke";

/// Calls slower than this capture a diagnostic stack
pub const DEFAULT_SLOW_CALL_THRESHOLD: Duration = Duration::from_millis(5000);

static GLOBAL_LIMITS: Lazy<CodecLimits> = Lazy::new(CodecLimits::from_env);

/// Ceilings applied by the wire codec and the frame reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct CodecLimits {
    pub max_message_size: usize,
    pub max_frame_size: usize,
    pub recursion_depth: usize,
}

impl Default for CodecLimits {
    fn default() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            recursion_depth: DEFAULT_RECURSION_DEPTH,
        }
    }
}

impl CodecLimits {
    /// Process-wide limits, resolved from the environment on first use.
    pub fn global() -> CodecLimits {
        *GLOBAL_LIMITS
    }

    /// Resolve every ceiling from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Resolve every ceiling through `lookup`, which returns the raw value of
    /// a variable if it is set.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            max_message_size: resolve_ceiling(
                ENV_MAX_MESSAGE_SIZE,
                lookup(ENV_MAX_MESSAGE_SIZE),
                DEFAULT_MAX_MESSAGE_SIZE,
            ),
            max_frame_size: resolve_ceiling(
                ENV_MAX_FRAME_SIZE,
                lookup(ENV_MAX_FRAME_SIZE),
                DEFAULT_MAX_FRAME_SIZE,
            ),
            recursion_depth: resolve_ceiling(
                ENV_RECURSION_DEPTH,
                lookup(ENV_RECURSION_DEPTH),
                DEFAULT_RECURSION_DEPTH,
            ),
        }
    }
}

fn resolve_ceiling(name: &str, raw: Option<String>, default: usize) -> usize {
    let Some(raw) = raw else {
        info!(
            variable = name,
            default, "Environment variable is not set, using default"
        );
        return default;
    };

    match raw.trim().parse::<i64>() {
        Ok(value) if value > 0 => match usize::try_from(value) {
            Ok(value) => {
                info!(variable = name, value, "Ceiling set from environment");
                value
            }
            Err(_) => {
                info!(variable = name, raw = %raw, default, "Value does not fit, using default");
                default
            }
        },
        Ok(_) => {
            info!(
                variable = name,
                raw = %raw,
                default,
                "Value is not positive, using default"
            );
            default
        }
        Err(_) => {
            info!(
                variable = name,
                raw = %raw,
                default,
                "Could not parse value, using default"
            );
            default
        }
    }
}

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct NetworkConfig {
    /// Server-specific configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Client-specific configuration
    #[serde(default)]
    pub client: ClientConfig,

    /// Transport configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl NetworkConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("WIRECALL_SERVER_ADDRESS") {
            config.server.address = addr;
        }

        if let Ok(addr) = std::env::var("WIRECALL_HTTP_SERVER") {
            config.client.http_server = addr;
        }

        if let Ok(addr) = std::env::var("WIRECALL_LOCALIZATION_SERVER") {
            config.client.localization_server = addr;
        }

        if let Ok(slow) = std::env::var("WIRECALL_SLOW_CALL_MS") {
            if let Ok(val) = slow.parse::<u64>() {
                config.client.slow_call_threshold = Duration::from_millis(val);
            }
        }

        if let Ok(timeout) = std::env::var("WIRECALL_RESPONSE_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.client.response_timeout = Duration::from_millis(val);
            }
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.server.validate());
        errors.extend(self.client.validate());
        errors.extend(self.transport.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Server-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server listen address (e.g., "127.0.0.1:9581")
    pub address: String,

    /// Label placed in response envelopes; the machine host name when unset
    #[serde(default)]
    pub host_label: Option<String>,

    /// Maximum number of concurrent connections
    pub max_connections: usize,

    /// Timeout for graceful server shutdown
    #[serde(with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: String::from("127.0.0.1:9581"),
            host_label: None,
            max_connections: 1000,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// Validate server configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.address.is_empty() {
            errors.push("Server address cannot be empty".to_string());
        } else if self.address.parse::<std::net::SocketAddr>().is_err() {
            errors.push(format!(
                "Invalid server address format: '{}' (expected format: '0.0.0.0:9581')",
                self.address
            ));
        }

        if let Some(label) = &self.host_label {
            if label.trim().is_empty() {
                errors.push("Host label cannot be blank when set".to_string());
            }
        }

        if self.max_connections == 0 {
            errors.push("Max connections must be greater than 0".to_string());
        } else if self.max_connections > 100_000 {
            errors.push(format!(
                "Max connections very high: {} (ensure system resources can support this)",
                self.max_connections
            ));
        }

        if self.shutdown_timeout.as_secs() < 1 {
            errors.push("Shutdown timeout too short (minimum: 1s)".to_string());
        } else if self.shutdown_timeout.as_secs() > 60 {
            errors.push("Shutdown timeout too long (maximum: 60s)".to_string());
        }

        errors
    }
}

/// Client-specific configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// General request server
    pub http_server: String,

    /// Localization request server
    pub localization_server: String,

    /// Path requests are posted to at either server
    pub endpoint_path: String,

    /// Timeout for connection attempts
    #[serde(with = "duration_serde")]
    pub connection_timeout: Duration,

    /// Timeout for waiting for response messages
    #[serde(with = "duration_serde")]
    pub response_timeout: Duration,

    /// Calls at least this slow log a diagnostic stack
    #[serde(with = "duration_serde")]
    pub slow_call_threshold: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            http_server: String::from("127.0.0.1:9581"),
            localization_server: String::from("127.0.0.1:9581"),
            endpoint_path: String::from(DEFAULT_ENDPOINT_PATH),
            connection_timeout: Duration::from_secs(10),
            response_timeout: Duration::from_secs(60),
            slow_call_threshold: DEFAULT_SLOW_CALL_THRESHOLD,
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        for (name, address) in [
            ("HTTP server", &self.http_server),
            ("Localization server", &self.localization_server),
        ] {
            if address.is_empty() {
                errors.push(format!("{name} address cannot be empty"));
            }
        }

        if !self.endpoint_path.starts_with('/') {
            errors.push(format!(
                "Endpoint path must start with '/': '{}'",
                self.endpoint_path
            ));
        } else if self.endpoint_path.len() > u16::MAX as usize {
            errors.push("Endpoint path too long".to_string());
        }

        if self.connection_timeout.as_millis() < 100 {
            errors.push("Connection timeout too short (minimum: 100ms)".to_string());
        }

        if self.response_timeout.as_millis() < 100 {
            errors.push("Response timeout too short (minimum: 100ms)".to_string());
        }

        if self.slow_call_threshold.is_zero() {
            errors.push("Slow call threshold must be greater than 0".to_string());
        }

        errors
    }
}

/// Transport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransportConfig {
    /// Stream request bodies without computing their length first
    pub stream_requests: bool,

    /// Content encoding for request bodies; forces buffering when set
    #[serde(default)]
    pub compression: Option<CompressionKind>,

    /// Sustained upload rate; unlimited when unset
    #[serde(default)]
    pub rate_limit_bytes_per_sec: Option<u64>,

    /// Token bucket capacity; defaults to one second of rate
    #[serde(default)]
    pub rate_limit_burst: Option<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            stream_requests: true,
            compression: None,
            rate_limit_bytes_per_sec: None,
            rate_limit_burst: None,
        }
    }
}

impl TransportConfig {
    /// Validate transport configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if let Some(rate) = self.rate_limit_bytes_per_sec {
            if rate == 0 {
                errors.push("Rate limit must be greater than 0 when set".to_string());
            }
        }

        if let Some(burst) = self.rate_limit_burst {
            if burst == 0 {
                errors.push("Rate limit burst must be greater than 0 when set".to_string());
            }
            if self.rate_limit_bytes_per_sec.is_none() {
                errors.push("Rate limit burst requires rate_limit_bytes_per_sec".to_string());
            }
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("wirecall"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
