use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::net::SocketAddr;

use log::{debug, trace, warn};
use pingora::server::configuration::{Opt, ServerConf};
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use validator::{Validate, ValidationError};

use crate::{
    admission::{AdmissionMode, AdmissionSettings, OverflowStrategy},
    core::{GatewayError, GatewayResult},
};

#[derive(Default, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Config::validate_operations"))]
pub struct Config {
    #[serde(default)]
    pub pingora: ServerConf,

    #[validate(length(min = 1))]
    #[validate(nested)]
    pub listeners: Vec<Listener>,

    #[serde(default)]
    #[validate(nested)]
    pub server: Server,

    #[validate(length(min = 1))]
    #[validate(nested)]
    pub routes: Vec<Route>,

    #[validate(nested)]
    #[serde(default)]
    pub routing_operations: Vec<RoutingOperation>,

    #[serde(default)]
    pub log: Option<Log>,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub prometheus: Option<Prometheus>,
}

// Config file load and validation
impl Config {
    pub fn load_from_yaml<P>(path: P) -> GatewayResult<Self>
    where
        P: AsRef<std::path::Path> + fmt::Display,
    {
        let conf_str = fs::read_to_string(&path).map_err(|e| {
            GatewayError::Configuration(format!("Unable to read conf file from {path}: {e}"))
        })?;
        debug!("Conf file read from {path}");
        Self::from_yaml(&conf_str)
    }

    // config file load entry point
    pub fn load_yaml_with_opt_override(opt: &Opt) -> GatewayResult<Self> {
        match &opt.conf {
            Some(path) => {
                let mut conf = Self::load_from_yaml(path)?;
                conf.merge_with_opt(opt);
                Ok(conf)
            }
            None => Err(GatewayError::Configuration("No path specified".to_string())),
        }
    }

    pub fn from_yaml(conf_str: &str) -> GatewayResult<Self> {
        trace!("Read conf file: {conf_str}");
        let mut conf: Config = serde_yaml::from_str(conf_str)
            .map_err(|e| GatewayError::serialization_error("Unable to parse yaml conf", e))?;

        trace!("Loaded conf: {conf:?}");

        conf.validate()?;
        conf.server.normalize();

        for operation in conf.routing_operations.iter() {
            if operation.handlers.is_empty() {
                warn!(
                    "Routing operation [{}] has no handlers",
                    operation.operation_id
                );
            }
        }

        Ok(conf)
    }

    pub fn to_yaml(&self) -> GatewayResult<String> {
        serde_yaml::to_string(self).map_err(GatewayError::from)
    }

    pub fn merge_with_opt(&mut self, opt: &Opt) {
        if opt.daemon {
            self.pingora.daemon = true;
        }
    }

    pub fn operation(&self, operation_id: &str) -> Option<&RoutingOperation> {
        self.routing_operations
            .iter()
            .find(|op| op.operation_id == operation_id)
    }

    fn validate_operations(&self) -> Result<(), ValidationError> {
        let mut ids = HashSet::new();
        for operation in &self.routing_operations {
            if !ids.insert(operation.operation_id.as_str()) {
                return Err(ValidationError::new("duplicate_operation_id"));
            }
        }

        for route in &self.routes {
            if !ids.contains(route.operation_id.as_str()) {
                return Err(ValidationError::new("unknown_operation_id"));
            }
        }

        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Listener::validate_tls_for_offer_h2"))]
pub struct Listener {
    pub address: SocketAddr,
    pub tls: Option<Tls>,
    #[serde(default)]
    pub offer_h2: bool,
}

impl Listener {
    fn validate_tls_for_offer_h2(&self) -> Result<(), ValidationError> {
        if self.offer_h2 && self.tls.is_none() {
            Err(ValidationError::new("tls_required_for_h2"))
        } else {
            Ok(())
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tls {
    pub cert_path: String,
    pub key_path: String,
}

/// Request-processing options shared by every route.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct Server {
    /// Render the error text in fatal 500 responses.
    #[serde(default)]
    pub display_exception_details: bool,
    #[serde(default = "Server::default_access_log")]
    pub access_log: bool,
    /// Response headers forwarded to the client, compared case-insensitively.
    #[serde(default = "Server::default_allowed_response_headers")]
    pub allowed_response_headers: Vec<String>,
    #[serde(default)]
    #[validate(nested)]
    pub custom_response_header: Option<CustomHeader>,
    #[serde(default)]
    #[validate(nested)]
    pub drop_requests: DropRequests,
    /// Larger request bodies are answered with 413.
    #[serde(default = "Server::default_max_request_body_bytes")]
    #[validate(range(min = 1))]
    pub max_request_body_bytes: usize,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            display_exception_details: false,
            access_log: Self::default_access_log(),
            allowed_response_headers: Self::default_allowed_response_headers(),
            custom_response_header: None,
            drop_requests: DropRequests::default(),
            max_request_body_bytes: Self::default_max_request_body_bytes(),
        }
    }
}

impl Server {
    fn default_access_log() -> bool {
        true
    }

    fn default_max_request_body_bytes() -> usize {
        1024 * 1024
    }

    fn default_allowed_response_headers() -> Vec<String> {
        [
            "content-type",
            "content-length",
            "location",
            "set-cookie",
            "cache-control",
            "expires",
            "etag",
            "last-modified",
            "vary",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    fn normalize(&mut self) {
        for name in self.allowed_response_headers.iter_mut() {
            *name = name.to_ascii_lowercase();
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct CustomHeader {
    #[validate(length(min = 1))]
    pub name: String,
    pub value: String,
}

/// Backpressure buffer in front of request processing.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct DropRequests {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "DropRequests::default_buffer_capacity")]
    #[validate(range(min = 1))]
    pub buffer_capacity: usize,
    #[serde(default)]
    pub strategy: OverflowStrategy,
    #[serde(default = "DropRequests::default_response_code")]
    #[validate(range(min = 100, max = 599))]
    pub response_code: u16,
    #[serde(default = "DropRequests::default_max_in_flight")]
    #[validate(range(min = 1))]
    pub max_in_flight: usize,
}

impl Default for DropRequests {
    fn default() -> Self {
        Self {
            enabled: false,
            buffer_capacity: Self::default_buffer_capacity(),
            strategy: OverflowStrategy::default(),
            response_code: Self::default_response_code(),
            max_in_flight: Self::default_max_in_flight(),
        }
    }
}

impl DropRequests {
    fn default_buffer_capacity() -> usize {
        1000
    }

    fn default_response_code() -> u16 {
        429
    }

    fn default_max_in_flight() -> usize {
        128
    }

    pub fn admission_mode(&self) -> AdmissionMode {
        if !self.enabled {
            return AdmissionMode::PassThrough;
        }
        AdmissionMode::Controlled(AdmissionSettings {
            buffer_capacity: self.buffer_capacity,
            strategy: self.strategy,
            drop_status: self.response_code,
            max_in_flight: self.max_in_flight,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "Route::validate_uri"))]
pub struct Route {
    pub uri: String,
    /// Empty means every method.
    #[serde(default)]
    pub methods: Vec<HttpMethod>,
    pub operation_id: String,
}

impl Route {
    fn validate_uri(&self) -> Result<(), ValidationError> {
        if !self.uri.starts_with('/') {
            return Err(ValidationError::new("uri_must_start_with_slash"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    GET,
    POST,
    PUT,
    DELETE,
    PATCH,
    HEAD,
    OPTIONS,
    TRACE,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let method = match self {
            HttpMethod::GET => "GET",
            HttpMethod::POST => "POST",
            HttpMethod::PUT => "PUT",
            HttpMethod::DELETE => "DELETE",
            HttpMethod::PATCH => "PATCH",
            HttpMethod::HEAD => "HEAD",
            HttpMethod::OPTIONS => "OPTIONS",
            HttpMethod::TRACE => "TRACE",
        };
        write!(f, "{}", method)
    }
}

/// Ordered handler chains bound to an operation id.
#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
#[validate(schema(function = "RoutingOperation::validate_operation_id"))]
pub struct RoutingOperation {
    pub operation_id: String,
    #[serde(default)]
    #[validate(nested)]
    pub handlers: Vec<HandlerOptions>,
    #[serde(default)]
    #[validate(nested)]
    pub failure_handlers: Vec<HandlerOptions>,
    /// Per-handler time budget; exceeding it is fatal.
    #[serde(default)]
    #[validate(range(min = 1))]
    pub handler_timeout_ms: Option<u64>,
}

impl RoutingOperation {
    fn validate_operation_id(&self) -> Result<(), ValidationError> {
        if self.operation_id.trim().is_empty() {
            return Err(ValidationError::new("operation_id_required"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Validate)]
pub struct HandlerOptions {
    #[validate(length(min = 1))]
    pub name: String,
    /// Log identifier; defaults to `name`.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub config: YamlValue,
}

impl HandlerOptions {
    pub fn handler_id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Log {
    pub path: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Status {
    pub address: SocketAddr,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Prometheus {
    pub address: SocketAddr,
}
