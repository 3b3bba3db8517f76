use std::sync::Arc;

use async_trait::async_trait;
use http::{header, Response, StatusCode};
use pingora::{
    apps::http_app::ServeHttp, protocols::http::ServerSession, services::listening::Service,
};
use serde::Serialize;

use crate::{admission::AdmissionController, config::Status, core::status};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'static str>,
    admission: AdmissionStatus,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AdmissionStatus {
    controlled: bool,
    in_flight: usize,
    waiting: usize,
    dropped: u64,
}

/// Readiness probe, served on its own listener.
///
/// `GET /status/ready` answers 200 once every routing operation is built and
/// 503 before that. Both carry a snapshot of the admission buffer.
pub struct StatusHttpApp {
    address: String,
    admission: Arc<AdmissionController>,
}

impl StatusHttpApp {
    pub fn new(cfg: &Status, admission: Arc<AdmissionController>) -> Self {
        Self {
            address: cfg.address.to_string(),
            admission,
        }
    }

    pub fn status_http_service(cfg: &Status, admission: Arc<AdmissionController>) -> Service<Self> {
        let app = Self::new(cfg, admission);
        let addr = app.address.clone();
        let mut service = Service::new("Status HTTP".to_string(), app);
        service.add_tcp(&addr);
        service
    }

    fn ready(&self) -> Response<Vec<u8>> {
        let admission = AdmissionStatus {
            controlled: self.admission.drop_status().is_some(),
            in_flight: self.admission.in_flight(),
            waiting: self.admission.waiting(),
            dropped: self.admission.dropped_total(),
        };

        if status::is_ready() {
            json_response(
                StatusCode::OK,
                &StatusResponse {
                    status: "ok",
                    error: None,
                    admission,
                },
            )
        } else {
            json_response(
                StatusCode::SERVICE_UNAVAILABLE,
                &StatusResponse {
                    status: "error",
                    error: Some("Handlers not initialized yet"),
                    admission,
                },
            )
        }
    }
}

#[async_trait]
impl ServeHttp for StatusHttpApp {
    async fn response(&self, http_session: &mut ServerSession) -> Response<Vec<u8>> {
        http_session.set_keepalive(None);

        match http_session.req_header().uri.path() {
            "/status/ready" => self.ready(),
            _ => not_found_response(),
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Vec<u8>> {
    let json_body = serde_json::to_vec(body).unwrap_or_else(|e| {
        log::error!("Failed to serialize status response: {e}");
        b"{}".to_vec()
    });

    let mut resp = Response::new(json_body);
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        header::HeaderValue::from_static("application/json"),
    );
    resp
}

fn not_found_response() -> Response<Vec<u8>> {
    let mut resp = Response::new(b"Not Found".to_vec());
    *resp.status_mut() = StatusCode::NOT_FOUND;
    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::{AdmissionSettings, OverflowStrategy};

    #[test]
    fn test_ready_body() {
        let admission = AdmissionController::controlled(AdmissionSettings {
            buffer_capacity: 4,
            strategy: OverflowStrategy::DropLatest,
            drop_status: 429,
            max_in_flight: 2,
        });
        let app = StatusHttpApp::new(
            &Status {
                address: "127.0.0.1:7085".parse().unwrap(),
            },
            admission,
        );

        let resp = app.ready();
        let body: serde_json::Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["admission"]["controlled"], true);
        assert_eq!(body["admission"]["inFlight"], 0);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "application/json");
        assert!(resp.status() == StatusCode::OK || resp.status() == StatusCode::SERVICE_UNAVAILABLE);
    }
}
