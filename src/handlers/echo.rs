use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use http::header;
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

pub const HANDLER_NAME: &str = "echo";

pub fn create_echo_handler(cfg: YamlValue) -> GatewayResult<Arc<dyn RequestEventHandler>> {
    let config: HandlerEchoConfig = parse_config(HANDLER_NAME, cfg)?;
    Ok(Arc::new(HandlerEcho { config }))
}

#[derive(Default, Debug, Serialize, Deserialize, Validate)]
struct HandlerEchoConfig {
    #[serde(default = "HandlerEchoConfig::default_status")]
    #[validate(range(min = 100, max = 599))]
    status: u16,
    #[serde(default)]
    body: String,
    headers: Option<BTreeMap<String, String>>,
    /// Resolve `{param.x}`-style placeholders in the body.
    #[serde(default)]
    resolve_placeholders: bool,
}

impl HandlerEchoConfig {
    fn default_status() -> u16 {
        200
    }
}

/// Answers with a fixed status, headers and body.
pub struct HandlerEcho {
    config: HandlerEchoConfig,
}

#[async_trait]
impl RequestEventHandler for HandlerEcho {
    fn name(&self) -> &str {
        HANDLER_NAME
    }

    async fn handle(
        &self,
        event: RequestEvent,
        scope: &mut HandlerScope<'_>,
    ) -> GatewayResult<HandlerOutcome> {
        let body = if self.config.resolve_placeholders {
            PlaceholdersResolver::resolve(&self.config.body, &event_sources(&event))
        } else {
            self.config.body.clone()
        };

        let mut resp = ClientResponseInfo::new(self.config.status);
        if let Some(headers) = &self.config.headers {
            for (k, v) in headers {
                resp = resp.with_header(k.as_str(), v.as_str());
            }
        }
        if !resp.headers.contains(header::CONTENT_TYPE.as_str()) {
            resp = resp.with_header(header::CONTENT_TYPE.as_str(), "text/plain; charset=utf-8");
        }

        scope.set_response(resp.with_body(body));
        Ok(HandlerOutcome::Success(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ClientRequestInfo;
    use crate::handlers::test_support::{event, run};

    #[tokio::test]
    async fn test_echo_static_body() {
        let handler = create_echo_handler(
            serde_yaml::from_str("status: 202\nbody: hello\nheaders:\n  X-Echo: echoed").unwrap(),
        )
        .unwrap();

        let (outcome, resp) = run(handler.as_ref(), event("/"), None).await;
        assert!(matches!(outcome, Ok(HandlerOutcome::Success(_))));

        let resp = resp.unwrap();
        assert_eq!(resp.status_code, 202);
        assert_eq!(resp.body_str(), Some("hello"));
        assert_eq!(resp.headers.get("x-echo"), Some("echoed"));
        assert!(resp.headers.contains("content-type"));
    }

    #[tokio::test]
    async fn test_echo_resolves_placeholders() {
        let handler = create_echo_handler(
            serde_yaml::from_str("body: 'hi {param.name} on {uri.path}'\nresolve_placeholders: true")
                .unwrap(),
        )
        .unwrap();
        let request = ClientRequestInfo::builder()
            .path("/greet")
            .param("name", "bob")
            .build();

        let (_, resp) = run(handler.as_ref(), RequestEvent::new(request), None).await;
        assert_eq!(resp.unwrap().body_str(), Some("hi bob on /greet"));
    }

    #[test]
    fn test_invalid_status_rejected() {
        assert!(create_echo_handler(serde_yaml::from_str("status: 42").unwrap()).is_err());
    }
}
