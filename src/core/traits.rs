//! Core traits for Fragway components
//!
//! This module defines the handler capability that the chain executor
//! drives, and the factory signature used by the handler registry.

use std::sync::Arc;

use async_trait::async_trait;
use serde_yaml::Value as YamlValue;

use super::{context::HandlerScope, error::GatewayResult, event::RequestEvent};

/// Outcome of a handler that completed normally.
///
/// Unexpected errors are not an outcome: they travel through the `Err` side
/// of [`RequestEventHandler::handle`] and end the request as fatal.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// Continue with the (possibly rebuilt) event.
    Success(RequestEvent),
    /// Expected negative result; diverts to the failure chain.
    Failure(String),
}

impl HandlerOutcome {
    pub fn failure(reason: impl Into<String>) -> Self {
        HandlerOutcome::Failure(reason.into())
    }
}

/// A pluggable processing stage bound to routing operations.
#[async_trait]
pub trait RequestEventHandler: Send + Sync {
    /// Registered name of the handler type.
    fn name(&self) -> &str;

    /// Process the current event.
    ///
    /// `scope` exposes the response under construction and a read-only view
    /// of the outcomes logged so far.
    async fn handle(
        &self,
        event: RequestEvent,
        scope: &mut HandlerScope<'_>,
    ) -> GatewayResult<HandlerOutcome>;
}

/// Factory that builds a handler from its YAML configuration.
pub type HandlerCreateFn = fn(YamlValue) -> GatewayResult<Arc<dyn RequestEventHandler>>;
