use std::sync::Arc;

use async_trait::async_trait;
use http::header;
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use validator::Validate;

use super::parse_config;
use crate::core::{
    GatewayResult, HandlerOutcome, HandlerScope, RequestEvent, RequestEventHandler,
};

pub const HANDLER_NAME: &str = "fragments-assembler";

pub const EMPTY_FRAGMENTS: &str = "Fragments are empty!";

pub fn create_assembler_handler(cfg: YamlValue) -> GatewayResult<Arc<dyn RequestEventHandler>> {
    let config: HandlerAssemblerConfig = parse_config(HANDLER_NAME, cfg)?;
    Ok(Arc::new(HandlerAssembler { config }))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
struct HandlerAssemblerConfig {
    /// Content type set when the response does not carry one yet.
    #[serde(default = "HandlerAssemblerConfig::default_content_type")]
    #[validate(length(min = 1))]
    content_type: String,
}

impl HandlerAssemblerConfig {
    fn default_content_type() -> String {
        "text/html; charset=utf-8".to_string()
    }
}

/// Joins fragment bodies, in order, into the response body.
pub struct HandlerAssembler {
    config: HandlerAssemblerConfig,
}

#[async_trait]
impl RequestEventHandler for HandlerAssembler {
    fn name(&self) -> &str {
        HANDLER_NAME
    }

    async fn handle(
        &self,
        event: RequestEvent,
        scope: &mut HandlerScope<'_>,
    ) -> GatewayResult<HandlerOutcome> {
        if event.fragments().is_empty() {
            return Ok(HandlerOutcome::failure(EMPTY_FRAGMENTS));
        }

        let body: String = event.fragments().iter().map(|f| f.body()).collect();

        let resp = scope.response_or_default();
        if !resp.headers.contains(header::CONTENT_TYPE.as_str()) {
            resp.headers = resp
                .headers
                .with_added(header::CONTENT_TYPE.as_str(), self.config.content_type.as_str());
        }
        resp.body = Some(body.into());

        Ok(HandlerOutcome::Success(event))
    }
}
