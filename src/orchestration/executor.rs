//! Handler chain execution
//!
//! Runs an operation's handlers strictly in order against one
//! [`RequestContext`]. Every outcome is appended to the request's event log:
//!
//! - success stores the returned event and moves on,
//! - failure diverts to the operation's failure chain,
//! - an error, a panic or an exceeded time budget is fatal and stops
//!   everything, failure handlers included.

use std::{any::Any, panic::AssertUnwindSafe, time::Duration};

use futures::FutureExt;
use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};

use super::chain::{BoundHandler, OperationChain};
use crate::core::{EntryStatus, GatewayError, GatewayResult, HandlerOutcome, RequestContext};

static HANDLER_OUTCOMES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "fragway_handler_outcomes_total",
        "Handler invocations by outcome",
        &["handler", "status"]
    )
    .unwrap()
});

/// Terminal state of a chain run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainResult {
    /// Every success handler returned success.
    Completed,
    /// A success handler failed; the failure chain has run.
    Failed { handler_id: String, reason: String },
    /// A handler raised; nothing ran after it.
    Fatal { handler_id: String, message: String },
}

impl ChainResult {
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChainResult::Fatal { .. })
    }
}

/// Drives [`OperationChain`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct HandlerChainExecutor;

impl HandlerChainExecutor {
    pub fn new() -> Self {
        Self
    }

    pub async fn execute(&self, chain: &OperationChain, ctx: &mut RequestContext) -> ChainResult {
        for bound in chain.handlers.iter() {
            match invoke(bound, ctx, chain.handler_timeout).await {
                Ok(HandlerOutcome::Success(event)) => {
                    ctx.set_request_event(event);
                    record_success(bound, ctx);
                }
                Ok(HandlerOutcome::Failure(reason)) => {
                    record_failure(bound, ctx, &reason);
                    log::warn!(
                        "Handler [{}] failed for operation [{}]: {}",
                        bound.id(),
                        ctx.operation_id(),
                        reason
                    );
                    if let Some(fatal) = self.execute_failure_chain(chain, ctx).await {
                        return fatal;
                    }
                    return ChainResult::Failed {
                        handler_id: bound.id().to_string(),
                        reason,
                    };
                }
                Err(e) => return fatal(bound, ctx, e),
            }
        }
        ChainResult::Completed
    }

    /// Runs failure handlers until one does not succeed. Returns the fatal
    /// result if a failure handler raised.
    async fn execute_failure_chain(
        &self,
        chain: &OperationChain,
        ctx: &mut RequestContext,
    ) -> Option<ChainResult> {
        for bound in chain.failure_handlers.iter() {
            match invoke(bound, ctx, chain.handler_timeout).await {
                Ok(HandlerOutcome::Success(event)) => {
                    ctx.set_request_event(event);
                    record_success(bound, ctx);
                }
                Ok(HandlerOutcome::Failure(reason)) => {
                    record_failure(bound, ctx, &reason);
                    log::warn!(
                        "Failure handler [{}] failed for operation [{}]: {}",
                        bound.id(),
                        ctx.operation_id(),
                        reason
                    );
                    return None;
                }
                Err(e) => return Some(fatal(bound, ctx, e)),
            }
        }
        None
    }
}

/// Calls one handler with the current event, mapping panics and an exceeded
/// time budget to errors.
async fn invoke(
    bound: &BoundHandler,
    ctx: &mut RequestContext,
    timeout: Option<Duration>,
) -> GatewayResult<HandlerOutcome> {
    let event = ctx.request_event().clone();
    let mut scope = ctx.scope();
    let fut = AssertUnwindSafe(bound.handler().handle(event, &mut scope)).catch_unwind();

    let result = match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => {
                return Err(GatewayError::Timeout(format!(
                    "handler [{}] did not finish within {}ms",
                    bound.id(),
                    limit.as_millis()
                )))
            }
        },
        None => fut.await,
    };

    result.unwrap_or_else(|panic| {
        Err(GatewayError::handler_error(
            bound.id(),
            format!("panicked: {}", panic_message(panic.as_ref())),
        ))
    })
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

fn record_success(bound: &BoundHandler, ctx: &mut RequestContext) {
    ctx.log_mut().success(bound.id());
    observe(bound, EntryStatus::Success);
}

fn record_failure(bound: &BoundHandler, ctx: &mut RequestContext, reason: &str) {
    ctx.log_mut().failure(bound.id(), reason);
    observe(bound, EntryStatus::Failure);
}

fn fatal(bound: &BoundHandler, ctx: &mut RequestContext, err: GatewayError) -> ChainResult {
    let message = err.to_string();
    log::error!(
        "Handler [{}] raised for operation [{}] (request {}): {}",
        bound.id(),
        ctx.operation_id(),
        ctx.id(),
        message
    );
    ctx.log_mut().fatal(bound.id(), message.as_str());
    observe(bound, EntryStatus::Fatal);
    ChainResult::Fatal {
        handler_id: bound.id().to_string(),
        message,
    }
}

fn observe(bound: &BoundHandler, status: EntryStatus) {
    HANDLER_OUTCOMES
        .with_label_values(&[bound.id(), status.as_str()])
        .inc();
}
