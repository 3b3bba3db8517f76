use std::sync::Arc;

use async_trait::async_trait;
use http::{header, Uri};
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use validator::Validate;

use super::{event_sources, parse_config};
use crate::{
    core::{
        ClientResponseInfo, GatewayResult, HandlerOutcome, HandlerScope, RequestEvent,
        RequestEventHandler,
    },
    placeholders::PlaceholdersResolver,
};

pub const HANDLER_NAME: &str = "redirect";

pub fn create_redirect_handler(cfg: YamlValue) -> GatewayResult<Arc<dyn RequestEventHandler>> {
    let config: HandlerRedirectConfig = parse_config(HANDLER_NAME, cfg)?;
    Ok(Arc::new(HandlerRedirect { config }))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
struct HandlerRedirectConfig {
    /// Target URI template, e.g. `/search?q={param.q}`. Values are URI-encoded.
    #[validate(length(min = 1))]
    uri: String,
    /// HTTP status code for the redirect. Defaults to 302 (temporary redirect).
    #[serde(default = "HandlerRedirectConfig::default_ret_code")]
    #[validate(range(min = 300, max = 399))]
    ret_code: u16,
    /// Append the original query string to the target.
    #[serde(default)]
    append_query_string: bool,
}

impl HandlerRedirectConfig {
    fn default_ret_code() -> u16 {
        302
    }
}

pub struct HandlerRedirect {
    config: HandlerRedirectConfig,
}

impl HandlerRedirect {
    fn merge_query_string(&self, target_query: &str, original_query: &str) -> String {
        if self.config.append_query_string {
            if target_query.is_empty() {
                original_query.to_string()
            } else if original_query.is_empty() || target_query == original_query {
                target_query.to_string()
            } else {
                format!("{target_query}&{original_query}")
            }
        } else {
            target_query.to_string()
        }
    }

    fn target(&self, event: &RequestEvent) -> String {
        let resolved =
            PlaceholdersResolver::resolve_and_encode(&self.config.uri, &event_sources(event));
        let (path, target_query) = resolved.split_once('?').unwrap_or((resolved.as_str(), ""));

        let request_uri = event.client_request().request_uri();
        let original_query = request_uri.split_once('?').map(|(_, q)| q).unwrap_or("");

        let query = self.merge_query_string(target_query, original_query);
        if query.is_empty() {
            path.to_string()
        } else {
            format!("{path}?{query}")
        }
    }
}

#[async_trait]
impl RequestEventHandler for HandlerRedirect {
    fn name(&self) -> &str {
        HANDLER_NAME
    }

    async fn handle(
        &self,
        event: RequestEvent,
        scope: &mut HandlerScope<'_>,
    ) -> GatewayResult<HandlerOutcome> {
        let target = self.target(&event);
        if target.parse::<Uri>().is_err() {
            log::warn!("Resolved redirect target is not a valid URI: {target}");
            return Ok(HandlerOutcome::failure(format!(
                "Invalid redirect target: {target}"
            )));
        }

        scope.set_response(
            ClientResponseInfo::new(self.config.ret_code)
                .with_header(header::LOCATION.as_str(), target),
        );
        Ok(HandlerOutcome::Success(event))
    }
}
