//! Handler chains bound to routing operations.

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use crate::{
    config::{HandlerOptions, RoutingOperation},
    core::{GatewayResult, RequestEventHandler},
    handlers::HandlerRegistry,
};

/// A handler instance with the id its outcomes are logged under.
#[derive(Clone)]
pub struct BoundHandler {
    id: String,
    handler: Arc<dyn RequestEventHandler>,
}

impl BoundHandler {
    pub fn new(id: impl Into<String>, handler: Arc<dyn RequestEventHandler>) -> Self {
        Self {
            id: id.into(),
            handler,
        }
    }

    fn from_options(registry: &HandlerRegistry, options: &HandlerOptions) -> GatewayResult<Self> {
        let handler = registry.build(&options.name, options.config.clone())?;
        Ok(Self::new(options.handler_id(), handler))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn handler(&self) -> &dyn RequestEventHandler {
        self.handler.as_ref()
    }
}

impl fmt::Debug for BoundHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundHandler")
            .field("id", &self.id)
            .field("name", &self.handler.name())
            .finish()
    }
}

/// Success chain and failure chain of one operation.
#[derive(Clone, Debug, Default)]
pub struct OperationChain {
    pub handlers: Vec<BoundHandler>,
    pub failure_handlers: Vec<BoundHandler>,
    pub handler_timeout: Option<Duration>,
}

impl OperationChain {
    pub fn new(handlers: Vec<BoundHandler>, failure_handlers: Vec<BoundHandler>) -> Self {
        Self {
            handlers,
            failure_handlers,
            handler_timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = Some(timeout);
        self
    }

    pub fn from_config(
        registry: &HandlerRegistry,
        operation: &RoutingOperation,
    ) -> GatewayResult<Self> {
        let build = |options: &[HandlerOptions]| {
            options
                .iter()
                .map(|o| BoundHandler::from_options(registry, o))
                .collect::<GatewayResult<Vec<_>>>()
        };

        Ok(Self {
            handlers: build(&operation.handlers)?,
            failure_handlers: build(&operation.failure_handlers)?,
            handler_timeout: operation.handler_timeout_ms.map(Duration::from_millis),
        })
    }
}

/// All operation chains, keyed by operation id.
#[derive(Clone, Debug, Default)]
pub struct OperationChains {
    chains: HashMap<String, Arc<OperationChain>>,
}

impl OperationChains {
    /// Builds every configured operation; any handler that cannot be
    /// created aborts startup.
    pub fn from_config(
        registry: &HandlerRegistry,
        operations: &[RoutingOperation],
    ) -> GatewayResult<Self> {
        let mut chains = HashMap::with_capacity(operations.len());
        for operation in operations {
            let chain = OperationChain::from_config(registry, operation)?;
            log::info!(
                "Initialized all handlers for operation [{}]",
                operation.operation_id
            );
            chains.insert(operation.operation_id.clone(), Arc::new(chain));
        }
        Ok(Self { chains })
    }

    pub fn insert(&mut self, operation_id: impl Into<String>, chain: OperationChain) {
        self.chains.insert(operation_id.into(), Arc::new(chain));
    }

    pub fn get(&self, operation_id: &str) -> Option<Arc<OperationChain>> {
        self.chains.get(operation_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}
