use std::sync::Arc;

use async_trait::async_trait;
use http::header;
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use validator::Validate;

use super::parse_config;
use crate::core::{
    ClientResponseInfo, EntryStatus, GatewayResult, HandlerOutcome, HandlerScope, RequestEvent,
    RequestEventHandler,
};

pub const HANDLER_NAME: &str = "error-page";

const REASON_TOKEN: &str = "{reason}";

pub fn create_error_page_handler(cfg: YamlValue) -> GatewayResult<Arc<dyn RequestEventHandler>> {
    let config: HandlerErrorPageConfig = parse_config(HANDLER_NAME, cfg)?;
    Ok(Arc::new(HandlerErrorPage { config }))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
struct HandlerErrorPageConfig {
    #[serde(default = "HandlerErrorPageConfig::default_status")]
    #[validate(range(min = 100, max = 599))]
    status: u16,
    /// `{reason}` is replaced by the message of the last failed handler.
    #[serde(default)]
    body: String,
    #[serde(default = "HandlerErrorPageConfig::default_content_type")]
    content_type: String,
}

impl HandlerErrorPageConfig {
    fn default_status() -> u16 {
        500
    }

    fn default_content_type() -> String {
        "text/plain; charset=utf-8".to_string()
    }
}

/// Failure-chain handler rendering a fixed error response.
pub struct HandlerErrorPage {
    config: HandlerErrorPageConfig,
}

#[async_trait]
impl RequestEventHandler for HandlerErrorPage {
    fn name(&self) -> &str {
        HANDLER_NAME
    }

    async fn handle(
        &self,
        event: RequestEvent,
        scope: &mut HandlerScope<'_>,
    ) -> GatewayResult<HandlerOutcome> {
        let reason = scope
            .log()
            .last_with_status(EntryStatus::Failure)
            .and_then(|entry| entry.error_message.clone())
            .unwrap_or_default();
        let body = self.config.body.replace(REASON_TOKEN, &reason);

        scope.set_response(
            ClientResponseInfo::new(self.config.status)
                .with_header(header::CONTENT_TYPE.as_str(), self.config.content_type.as_str())
                .with_body(body),
        );
        Ok(HandlerOutcome::Success(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RequestEventLog;
    use crate::handlers::test_support::{event, run, run_with_log};

    #[tokio::test]
    async fn test_renders_last_failure_reason() {
        let handler = create_error_page_handler(
            serde_yaml::from_str("status: 404\nbody: 'Sorry: {reason}'").unwrap(),
        )
        .unwrap();
        let mut log = RequestEventLog::new();
        log.success("repo");
        log.failure("splitter", "Template body is missing!");

        let (outcome, resp) = run_with_log(
            handler.as_ref(),
            event("/"),
            Some(ClientResponseInfo::new(200).with_body("stale")),
            &log,
        )
        .await;

        assert!(matches!(outcome, Ok(HandlerOutcome::Success(_))));
        let resp = resp.unwrap();
        assert_eq!(resp.status_code, 404);
        assert_eq!(resp.body_str(), Some("Sorry: Template body is missing!"));
    }

    #[tokio::test]
    async fn test_defaults() {
        let handler = create_error_page_handler(YamlValue::Null).unwrap();
        let (_, resp) = run(handler.as_ref(), event("/"), None).await;
        let resp = resp.unwrap();
        assert_eq!(resp.status_code, 500);
        assert_eq!(resp.body_str(), Some(""));
    }
}
