//! Core abstractions and interfaces for Fragway
//!
//! Request snapshot, event, audit log and context types, plus the handler
//! trait every processing stage implements.

pub mod context;
pub mod error;
pub mod event;
pub mod event_log;
pub mod fragment;
pub mod multimap;
pub mod request;
pub mod response;
pub mod status;
pub mod traits;

// Re-export commonly used types
pub use context::{HandlerScope, RequestContext};
pub use error::{ErrorContext, GatewayError, GatewayResult};
pub use event::RequestEvent;
pub use event_log::{Entry, EntryStatus, RequestEventLog};
pub use fragment::{DelimiterSplitter, Fragment, Splitter, WholeBodySplitter};
pub use multimap::MultiMap;
pub use request::ClientRequestInfo;
pub use response::{ClientResponseInfo, GatewayResponse};
pub use traits::{HandlerCreateFn, HandlerOutcome, RequestEventHandler};
