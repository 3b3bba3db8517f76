//! End-to-end processing of one inbound request.

use std::{collections::HashSet, sync::Arc, time::Instant};

use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderMap, Method, Uri};

use super::{
    chain::OperationChains,
    executor::{ChainResult, HandlerChainExecutor},
    router::{OperationRouter, RouteMatch},
};
use crate::{
    admission::{AdmissionController, AdmissionPermit, Submission},
    config::{Config, CustomHeader},
    core::{
        ClientRequestInfo, ClientResponseInfo, GatewayError, GatewayResponse, GatewayResult,
        RequestContext, RequestEvent,
    },
    handlers::HandlerRegistry,
};

const INTERNAL_SERVER_ERROR: &str = "Internal Server Error";
const PAYLOAD_TOO_LARGE: &str = "Payload Too Large";

/// Transport-level request line and headers.
#[derive(Debug, Clone)]
pub struct RawRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
}

impl RawRequest {
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
        }
    }

    fn declared_length(&self) -> Option<usize> {
        self.headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
    }
}

/// Request body, pulled only once the request holds an admission permit.
#[async_trait]
pub trait RequestBody: Send {
    /// Reads the whole body. Fails with [`GatewayError::PayloadTooLarge`]
    /// as soon as more than `limit` bytes arrive.
    async fn read_to_limit(&mut self, limit: usize) -> GatewayResult<Bytes>;
}

#[async_trait]
impl RequestBody for Bytes {
    async fn read_to_limit(&mut self, limit: usize) -> GatewayResult<Bytes> {
        if self.len() > limit {
            return Err(GatewayError::PayloadTooLarge(limit));
        }
        Ok(std::mem::take(self))
    }
}

/// Response rendering options.
#[derive(Debug, Clone)]
struct RenderOptions {
    display_exception_details: bool,
    access_log: bool,
    allowed_response_headers: HashSet<String>,
    custom_response_header: Option<CustomHeader>,
}

/// Admission, routing, chain execution and rendering for every request.
/// Built once at startup and shared read-only by all requests.
pub struct RequestPipeline {
    admission: Arc<AdmissionController>,
    router: OperationRouter,
    chains: OperationChains,
    executor: HandlerChainExecutor,
    max_body_bytes: usize,
    options: RenderOptions,
}

impl RequestPipeline {
    pub fn from_config(config: &Config, registry: &HandlerRegistry) -> GatewayResult<Self> {
        log::info!("Registered handlers: {}", registry.names().join(", "));
        let router = OperationRouter::new(&config.routes)?;
        let chains = OperationChains::from_config(registry, &config.routing_operations)?;
        let admission = AdmissionController::new(config.server.drop_requests.admission_mode());
        log::info!(
            "Request pipeline ready: {} routes, {} operations, admission {:?}",
            router.len(),
            chains.len(),
            admission.mode()
        );

        Ok(Self {
            admission,
            router,
            chains,
            executor: HandlerChainExecutor::new(),
            max_body_bytes: config.server.max_request_body_bytes,
            options: RenderOptions {
                display_exception_details: config.server.display_exception_details,
                access_log: config.server.access_log,
                allowed_response_headers: config
                    .server
                    .allowed_response_headers
                    .iter()
                    .map(|h| h.to_ascii_lowercase())
                    .collect(),
                custom_response_header: config.server.custom_response_header.clone(),
            },
        })
    }

    pub fn admission(&self) -> &Arc<AdmissionController> {
        &self.admission
    }

    pub fn operations(&self) -> usize {
        self.chains.len()
    }

    pub async fn handle(&self, raw: RawRequest, body: &mut dyn RequestBody) -> GatewayResponse {
        let start = Instant::now();
        let method = raw.method.clone();
        let uri = raw.uri.to_string();

        let response = self.process(raw, body).await;
        let response = self.decorate(response);

        if self.options.access_log {
            log::info!(
                target: "access",
                "{} {} {} {}ms",
                method,
                uri,
                response.status,
                start.elapsed().as_millis()
            );
        }
        response
    }

    async fn process(&self, raw: RawRequest, body: &mut dyn RequestBody) -> GatewayResponse {
        let request = match ClientRequestInfo::from_head(raw.method.clone(), &raw.uri, &raw.headers)
        {
            Ok(request) => request,
            Err(GatewayError::MalformedRequest(msg)) => {
                log::warn!("Malformed request {}: {}", raw.uri, msg);
                return GatewayResponse::text(400, msg);
            }
            Err(e) => {
                log::warn!("Unable to read request {}: {}", raw.uri, e);
                return GatewayResponse::text(400, "Bad Request");
            }
        };

        if raw
            .declared_length()
            .is_some_and(|len| len > self.max_body_bytes)
        {
            return GatewayResponse::text(413, PAYLOAD_TOO_LARGE);
        }

        let _permit = match self.admit().await {
            Some(permit) => permit,
            None => return self.drop_response(),
        };

        let request = match body.read_to_limit(self.max_body_bytes).await {
            Ok(bytes) => request.with_form_body(&bytes),
            Err(GatewayError::PayloadTooLarge(limit)) => {
                log::warn!("Request body for {} exceeds {} bytes", raw.uri, limit);
                return GatewayResponse::text(413, PAYLOAD_TOO_LARGE);
            }
            Err(e) => {
                log::warn!("Unable to read request body {}: {}", raw.uri, e);
                return GatewayResponse::text(400, "Bad Request");
            }
        };

        let operation_id = match self.router.route(request.method(), request.path()) {
            RouteMatch::Matched { operation_id } => operation_id,
            RouteMatch::MethodNotAllowed => return GatewayResponse::text(405, "Method Not Allowed"),
            RouteMatch::NotFound => return GatewayResponse::text(404, "Not Found"),
        };

        let Some(chain) = self.chains.get(&operation_id) else {
            log::error!("No handler chain for operation [{operation_id}]");
            return GatewayResponse::text(500, INTERNAL_SERVER_ERROR);
        };

        let mut ctx = RequestContext::new(operation_id, RequestEvent::new(request));
        let result = self.executor.execute(&chain, &mut ctx).await;
        log::debug!(
            "Request {} finished operation [{}] in {}ms: {:?}",
            ctx.id(),
            ctx.operation_id(),
            ctx.elapsed().as_millis(),
            result
        );
        self.render(result, &mut ctx)
    }

    async fn admit(&self) -> Option<AdmissionPermit> {
        match self.admission.submit() {
            Submission::Ready(permit) => Some(permit),
            Submission::Queued(ticket) => ticket.wait().await.ok(),
            Submission::Dropped | Submission::Failed => None,
        }
    }

    fn drop_response(&self) -> GatewayResponse {
        GatewayResponse::empty(self.admission.drop_status().unwrap_or(429))
    }

    fn render(&self, result: ChainResult, ctx: &mut RequestContext) -> GatewayResponse {
        match result {
            ChainResult::Completed => match ctx.take_client_response() {
                Some(resp) => self.filter_headers(resp),
                None => GatewayResponse::text(404, "Not Found"),
            },
            ChainResult::Failed { .. } => match ctx.take_client_response() {
                Some(resp) => self.filter_headers(resp),
                None => GatewayResponse::text(500, INTERNAL_SERVER_ERROR),
            },
            ChainResult::Fatal { message, .. } => {
                if self.options.display_exception_details {
                    GatewayResponse::text(500, message)
                } else {
                    GatewayResponse::text(500, INTERNAL_SERVER_ERROR)
                }
            }
        }
    }

    fn filter_headers(&self, resp: ClientResponseInfo) -> GatewayResponse {
        let allowed = &self.options.allowed_response_headers;
        let mut response = GatewayResponse::from(resp);
        response.headers = response
            .headers
            .filtered(|name| allowed.contains(&name.to_ascii_lowercase()));
        response
    }

    fn decorate(&self, mut response: GatewayResponse) -> GatewayResponse {
        if let Some(custom) = &self.options.custom_response_header {
            response.headers = response
                .headers
                .with_replaced(custom.name.as_str(), [custom.value.as_str()]);
        }
        response
    }
}
