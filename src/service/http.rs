use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderName, HeaderValue, Response, StatusCode};
use pingora::{
    apps::http_app::ServeHttp, protocols::http::ServerSession, services::listening::Service,
};

use crate::{
    core::{GatewayError, GatewayResponse, GatewayResult},
    orchestration::{RawRequest, RequestBody, RequestPipeline},
};

/// Gateway HTTP application: hands every request to the [`RequestPipeline`].
pub struct GatewayHttpApp {
    pipeline: Arc<RequestPipeline>,
}

impl GatewayHttpApp {
    pub fn new(pipeline: Arc<RequestPipeline>) -> Self {
        Self { pipeline }
    }

    pub fn gateway_http_service(pipeline: Arc<RequestPipeline>) -> Service<Self> {
        Service::new("Fragway HTTP".to_string(), Self::new(pipeline))
    }
}

#[async_trait]
impl ServeHttp for GatewayHttpApp {
    async fn response(&self, http_session: &mut ServerSession) -> Response<Vec<u8>> {
        let raw = {
            let req_header = http_session.req_header();
            RawRequest {
                method: req_header.method.clone(),
                uri: req_header.uri.clone(),
                headers: req_header.headers.clone(),
            }
        };

        let mut body = SessionBody(http_session);
        build_response(self.pipeline.handle(raw, &mut body).await)
    }
}

/// Streams the request body off the downstream session.
struct SessionBody<'a>(&'a mut ServerSession);

#[async_trait]
impl<'a> RequestBody for SessionBody<'a> {
    async fn read_to_limit(&mut self, limit: usize) -> GatewayResult<Bytes> {
        let mut body_data = Vec::new();
        while let Some(bytes) = self.0.read_request_body().await.map_err(|e| {
            GatewayError::MalformedRequest(format!("Failed to read request body: {e}"))
        })? {
            if body_data.len() + bytes.len() > limit {
                return Err(GatewayError::PayloadTooLarge(limit));
            }
            body_data.extend_from_slice(&bytes);
        }
        Ok(Bytes::from(body_data))
    }
}

/// Converts a rendered response to the wire type, skipping headers that are
/// not valid HTTP.
pub(crate) fn build_response(resp: GatewayResponse) -> Response<Vec<u8>> {
    let mut builder = Response::builder().status(resp.status_code());
    for (name, values) in resp.headers.iter() {
        let Ok(name) = HeaderName::from_bytes(name.as_bytes()) else {
            log::warn!("Dropping invalid response header name: {name}");
            continue;
        };
        if name == header::CONTENT_LENGTH {
            continue;
        }
        for value in values {
            match HeaderValue::from_str(value) {
                Ok(value) => builder = builder.header(&name, value),
                Err(_) => log::warn!("Dropping invalid value for response header {name}"),
            }
        }
    }

    builder
        .header(header::CONTENT_LENGTH, resp.body.len())
        .body(resp.body.to_vec())
        .unwrap_or_else(|e| {
            log::error!("Failed to build HTTP response: {e}");
            let mut fallback = Response::new(b"Internal Server Error".to_vec());
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
}
