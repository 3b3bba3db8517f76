//! Core request processing of the Fragway HTTP gateway.
//!
//! Inbound requests pass admission control, are routed to an operation and
//! run through that operation's handler chain. Handlers build the response
//! and may resolve `{source.field}` placeholders against the request.

pub mod admission;
pub mod config;
pub mod core;
pub mod handlers;
pub mod logging;
pub mod orchestration;
pub mod placeholders;
pub mod service;
