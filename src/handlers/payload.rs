use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use serde_yaml::Value as YamlValue;
use validator::Validate;

use super::{event_sources, parse_config};
use crate::{
    core::{
        GatewayError, GatewayResult, HandlerOutcome, HandlerScope, RequestEvent,
        RequestEventHandler,
    },
    placeholders::PlaceholdersResolver,
};

pub const HANDLER_NAME: &str = "payload";

pub fn create_payload_handler(cfg: YamlValue) -> GatewayResult<Arc<dyn RequestEventHandler>> {
    let config: HandlerPayloadConfig = parse_config(HANDLER_NAME, cfg)?;
    let values = config
        .values
        .into_iter()
        .map(|(key, value)| {
            serde_json::to_value(value)
                .map(|value| (key, value))
                .map_err(|e| GatewayError::serialization_error("Invalid payload value", e))
        })
        .collect::<GatewayResult<Vec<_>>>()?;
    Ok(Arc::new(HandlerPayload { values }))
}

#[derive(Debug, Serialize, Deserialize, Validate)]
struct HandlerPayloadConfig {
    #[validate(length(min = 1))]
    values: BTreeMap<String, YamlValue>,
}

/// Appends configured entries to the event payload. String values may
/// reference request placeholders and earlier payload entries.
pub struct HandlerPayload {
    values: Vec<(String, JsonValue)>,
}

#[async_trait]
impl RequestEventHandler for HandlerPayload {
    fn name(&self) -> &str {
        HANDLER_NAME
    }

    async fn handle(
        &self,
        mut event: RequestEvent,
        _scope: &mut HandlerScope<'_>,
    ) -> GatewayResult<HandlerOutcome> {
        for (key, value) in &self.values {
            let value = match value {
                JsonValue::String(template) => JsonValue::String(PlaceholdersResolver::resolve(
                    template,
                    &event_sources(&event),
                )),
                other => other.clone(),
            };
            event.append_payload(key.as_str(), value);
        }
        Ok(HandlerOutcome::Success(event))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ClientRequestInfo;
    use crate::handlers::test_support::run;
    use serde_json::json;

    #[tokio::test]
    async fn test_appends_values() {
        let handler = create_payload_handler(
            serde_yaml::from_str(
                "values:\n  a_user: '{header.x-user}'\n  b_greeting: 'hello {payload.a_user}'\n  c_limits: {max: 3}",
            )
            .unwrap(),
        )
        .unwrap();
        let event = RequestEvent::new(ClientRequestInfo::builder().header("X-User", "ann").build());

        let (outcome, _) = run(handler.as_ref(), event, None).await;

        let HandlerOutcome::Success(event) = outcome.unwrap() else {
            panic!("expected success");
        };
        assert_eq!(event.payload_value("a_user"), Some(&json!("ann")));
        assert_eq!(event.payload_value("b_greeting"), Some(&json!("hello ann")));
        assert_eq!(event.payload_value("c_limits"), Some(&json!({"max": 3})));
    }

    #[test]
    fn test_empty_values_rejected() {
        assert!(create_payload_handler(YamlValue::Null).is_err());
    }
}
