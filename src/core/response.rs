//! Response state built up by handlers, and the rendered response handed to
//! the transport.

use bytes::Bytes;
use http::StatusCode;
use serde::Serialize;

use super::multimap::MultiMap;

/// Response under construction during a handler chain run.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientResponseInfo {
    pub status_code: u16,
    pub headers: MultiMap,
    pub body: Option<Bytes>,
}

impl Default for ClientResponseInfo {
    fn default() -> Self {
        Self {
            status_code: StatusCode::OK.as_u16(),
            headers: MultiMap::new(),
            body: None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResponseMetadata<'a> {
    status_code: u16,
    headers: &'a MultiMap,
}

impl ClientResponseInfo {
    pub fn new(status_code: u16) -> Self {
        Self {
            status_code,
            ..Default::default()
        }
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers = self.headers.with_added(name, value);
        self
    }

    pub fn clear_body(&mut self) {
        self.body = None;
    }

    pub fn body_str(&self) -> Option<&str> {
        self.body
            .as_ref()
            .and_then(|body| std::str::from_utf8(body).ok())
    }

    /// Status and headers without the body, for diagnostics.
    pub fn metadata_json(&self) -> serde_json::Value {
        serde_json::to_value(ResponseMetadata {
            status_code: self.status_code,
            headers: &self.headers,
        })
        .unwrap_or(serde_json::Value::Null)
    }
}

/// Final response of one request, ready for the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResponse {
    pub status: u16,
    pub headers: MultiMap,
    pub body: Bytes,
}

impl GatewayResponse {
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            headers: MultiMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn text(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: MultiMap::new(),
            body: body.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl From<ClientResponseInfo> for GatewayResponse {
    fn from(resp: ClientResponseInfo) -> Self {
        Self {
            status: resp.status_code,
            headers: resp.headers,
            body: resp.body.unwrap_or_default(),
        }
    }
}
