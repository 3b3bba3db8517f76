//! Request context management
//!
//! This module provides the RequestContext that owns the per-request event
//! and audit log while a request travels through its handler chain.

use std::time::{Duration, Instant};

use uuid::Uuid;

use super::{
    event::RequestEvent, event_log::RequestEventLog, response::ClientResponseInfo,
};

/// Context that holds per-request state and metadata
pub struct RequestContext {
    /// Unique request id, used in access logs
    id: String,

    /// Operation the request was routed to
    operation_id: String,

    /// Event produced by the last successful handler
    event: RequestEvent,

    /// Handler outcome trail
    log: RequestEventLog,

    /// Response under construction
    client_response: Option<ClientResponseInfo>,

    request_start: Instant,
}

impl RequestContext {
    pub fn new(operation_id: impl Into<String>, event: RequestEvent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            operation_id: operation_id.into(),
            event,
            log: RequestEventLog::new(),
            client_response: None,
            request_start: Instant::now(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn request_event(&self) -> &RequestEvent {
        &self.event
    }

    pub fn request_event_log(&self) -> &RequestEventLog {
        &self.log
    }

    pub fn client_response(&self) -> Option<&ClientResponseInfo> {
        self.client_response.as_ref()
    }

    pub fn take_client_response(&mut self) -> Option<ClientResponseInfo> {
        self.client_response.take()
    }

    pub fn elapsed(&self) -> Duration {
        self.request_start.elapsed()
    }

    pub(crate) fn set_request_event(&mut self, event: RequestEvent) {
        self.event = event;
    }

    pub(crate) fn log_mut(&mut self) -> &mut RequestEventLog {
        &mut self.log
    }

    /// Borrow the parts a handler may touch while it runs.
    pub(crate) fn scope(&mut self) -> HandlerScope<'_> {
        HandlerScope {
            request_id: &self.id,
            response: &mut self.client_response,
            log: &self.log,
        }
    }
}

/// What a running handler can see besides the event itself.
pub struct HandlerScope<'a> {
    request_id: &'a str,
    response: &'a mut Option<ClientResponseInfo>,
    log: &'a RequestEventLog,
}

impl<'a> HandlerScope<'a> {
    pub fn new(
        request_id: &'a str,
        response: &'a mut Option<ClientResponseInfo>,
        log: &'a RequestEventLog,
    ) -> Self {
        Self {
            request_id,
            response,
            log,
        }
    }

    pub fn request_id(&self) -> &str {
        self.request_id
    }

    pub fn response(&self) -> Option<&ClientResponseInfo> {
        self.response.as_ref()
    }

    pub fn response_mut(&mut self) -> Option<&mut ClientResponseInfo> {
        self.response.as_mut()
    }

    pub fn set_response(&mut self, response: ClientResponseInfo) {
        *self.response = Some(response);
    }

    /// Existing response, or a fresh `200` one.
    pub fn response_or_default(&mut self) -> &mut ClientResponseInfo {
        self.response.get_or_insert_with(ClientResponseInfo::default)
    }

    pub fn log(&self) -> &RequestEventLog {
        self.log
    }
}
