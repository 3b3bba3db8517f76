//! Request orchestration layer
//!
//! Routing, handler chain execution and the pipeline that ties them to
//! admission control and response rendering.

pub mod chain;
pub mod executor;
pub mod pipeline;
pub mod router;

pub use chain::{BoundHandler, OperationChain, OperationChains};
pub use executor::{ChainResult, HandlerChainExecutor};
pub use pipeline::{RawRequest, RequestBody, RequestPipeline};
pub use router::{OperationRouter, RouteMatch};
