pub mod assembler;
pub mod echo;
pub mod error_page;
pub mod filesystem;
pub mod payload;
pub mod redirect;
pub mod splitter;

use std::{collections::HashMap, sync::Arc};

use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde_yaml::Value as YamlValue;
use validator::Validate;

use crate::{
    config_error,
    core::{
        GatewayError, GatewayResult, HandlerCreateFn, RequestEvent, RequestEventHandler,
    },
    placeholders::SourceDefinitions,
};

/// Built-in handler factories, keyed by the name used in routing operations.
static HANDLER_BUILDER_REGISTRY: Lazy<HashMap<&'static str, HandlerCreateFn>> = Lazy::new(|| {
    let arr: Vec<(&str, HandlerCreateFn)> = vec![
        (
            filesystem::HANDLER_NAME,
            filesystem::create_filesystem_handler,
        ),
        (splitter::HANDLER_NAME, splitter::create_splitter_handler),
        (
            assembler::HANDLER_NAME,
            assembler::create_assembler_handler,
        ),
        (echo::HANDLER_NAME, echo::create_echo_handler),
        (redirect::HANDLER_NAME, redirect::create_redirect_handler),
        (payload::HANDLER_NAME, payload::create_payload_handler),
        (
            error_page::HANDLER_NAME,
            error_page::create_error_page_handler,
        ),
    ];
    arr.into_iter().collect()
});

/// Name to factory table consulted when operation chains are built.
///
/// Starts from the built-in handlers; embedders can register their own
/// before the configuration is loaded.
#[derive(Clone)]
pub struct HandlerRegistry {
    builders: HashMap<String, HandlerCreateFn>,
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl HandlerRegistry {
    pub fn builtin() -> Self {
        Self {
            builders: HANDLER_BUILDER_REGISTRY
                .iter()
                .map(|(name, builder)| (name.to_string(), *builder))
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, builder: HandlerCreateFn) -> &mut Self {
        self.builders.insert(name.into(), builder);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Creates a handler instance from its configuration.
    ///
    /// Unknown names and invalid configurations are configuration errors.
    pub fn build(&self, name: &str, cfg: YamlValue) -> GatewayResult<Arc<dyn RequestEventHandler>> {
        let builder = self
            .builders
            .get(name)
            .ok_or_else(|| config_error!("Unknown handler type: {}", name))?;
        builder(cfg).map_err(|e| match e {
            GatewayError::Configuration(_) => e,
            other => config_error!("Invalid configuration for handler {}: {}", name, other),
        })
    }
}

/// Builds a handler using the built-in table.
pub fn build_handler(name: &str, cfg: YamlValue) -> GatewayResult<Arc<dyn RequestEventHandler>> {
    HandlerRegistry::builtin().build(name, cfg)
}

/// Deserializes and validates a handler configuration; a missing config
/// block counts as an empty mapping.
pub(crate) fn parse_config<T>(handler: &str, cfg: YamlValue) -> GatewayResult<T>
where
    T: DeserializeOwned + Validate,
{
    let cfg = if cfg.is_null() {
        YamlValue::Mapping(Default::default())
    } else {
        cfg
    };
    let config: T = serde_yaml::from_value(cfg)
        .map_err(|e| config_error!("Invalid {} handler config: {}", handler, e))?;
    config
        .validate()
        .map_err(|e| config_error!("Invalid {} handler config: {}", handler, e))?;
    Ok(config)
}

/// Request, header, URI and payload sources for templates evaluated
/// against the current event.
pub(crate) fn event_sources(event: &RequestEvent) -> SourceDefinitions {
    SourceDefinitions::builder()
        .add_client_request_source(event.client_request())
        .add_json_source("payload", serde_json::Value::Object(event.payload()))
        .build()
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::core::{
        ClientRequestInfo, ClientResponseInfo, GatewayResult, HandlerOutcome, HandlerScope,
        RequestEvent, RequestEventHandler, RequestEventLog,
    };

    pub fn init_log() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    pub fn event(path: &str) -> RequestEvent {
        RequestEvent::new(ClientRequestInfo::builder().path(path).build())
    }

    /// Runs `handler` once outside of any chain.
    pub async fn run(
        handler: &dyn RequestEventHandler,
        event: RequestEvent,
        response: Option<ClientResponseInfo>,
    ) -> (GatewayResult<HandlerOutcome>, Option<ClientResponseInfo>) {
        run_with_log(handler, event, response, &RequestEventLog::new()).await
    }

    pub async fn run_with_log(
        handler: &dyn RequestEventHandler,
        event: RequestEvent,
        mut response: Option<ClientResponseInfo>,
        log: &RequestEventLog,
    ) -> (GatewayResult<HandlerOutcome>, Option<ClientResponseInfo>) {
        let outcome = {
            let mut scope = HandlerScope::new("test-request", &mut response, log);
            handler.handle(event, &mut scope).await
        };
        (outcome, response)
    }
}
