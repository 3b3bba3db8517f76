use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use validator::{Validate, ValidationError};

use super::parse_config;
use crate::core::{
    DelimiterSplitter, GatewayResult, HandlerOutcome, HandlerScope, RequestEvent,
    RequestEventHandler, Splitter, WholeBodySplitter,
};

pub const HANDLER_NAME: &str = "fragments-splitter";

pub const MISSING_TEMPLATE_BODY: &str = "Template body is missing!";

pub fn create_splitter_handler(cfg: YamlValue) -> GatewayResult<Arc<dyn RequestEventHandler>> {
    let config: HandlerSplitterConfig = parse_config(HANDLER_NAME, cfg)?;
    let splitter: Box<dyn Splitter> = match config.kind {
        SplitterKind::Whole => Box::new(WholeBodySplitter),
        SplitterKind::Delimiter => {
            Box::new(DelimiterSplitter::new(config.delimiter.unwrap_or_default()))
        }
    };
    Ok(Arc::new(HandlerSplitter { splitter }))
}

#[derive(Clone, Copy, Default, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum SplitterKind {
    #[default]
    Whole,
    Delimiter,
}

#[derive(Debug, Default, Serialize, Deserialize, Validate)]
#[validate(schema(function = "HandlerSplitterConfig::validate_delimiter"))]
struct HandlerSplitterConfig {
    #[serde(default, rename = "splitter")]
    kind: SplitterKind,
    delimiter: Option<String>,
}

impl HandlerSplitterConfig {
    fn validate_delimiter(&self) -> Result<(), ValidationError> {
        let has_delimiter = self
            .delimiter
            .as_deref()
            .map(|d| !d.is_empty())
            .unwrap_or(false);
        if self.kind == SplitterKind::Delimiter && !has_delimiter {
            return Err(ValidationError::new("delimiter_required"));
        }
        Ok(())
    }
}

/// Splits the client response body into fragments and clears the body.
pub struct HandlerSplitter {
    splitter: Box<dyn Splitter>,
}

#[async_trait]
impl RequestEventHandler for HandlerSplitter {
    fn name(&self) -> &str {
        HANDLER_NAME
    }

    async fn handle(
        &self,
        event: RequestEvent,
        scope: &mut HandlerScope<'_>,
    ) -> GatewayResult<HandlerOutcome> {
        let template = scope
            .response()
            .and_then(|resp| resp.body.as_ref())
            .map(|body| String::from_utf8_lossy(body).into_owned())
            .filter(|body| !body.trim().is_empty());

        let Some(template) = template else {
            log::error!("{MISSING_TEMPLATE_BODY}");
            return Ok(HandlerOutcome::failure(MISSING_TEMPLATE_BODY));
        };

        let fragments = self.splitter.split(&template)?;
        log::debug!("Template split into {} fragments", fragments.len());

        if let Some(resp) = scope.response_mut() {
            resp.clear_body();
        }
        Ok(HandlerOutcome::Success(event.with_fragments(fragments)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ClientResponseInfo;
    use crate::handlers::test_support::{event, run};

    #[tokio::test]
    async fn test_split_and_clear_body() {
        let handler = create_splitter_handler(
            serde_yaml::from_str("splitter: delimiter\ndelimiter: '<!--split-->'").unwrap(),
        )
        .unwrap();
        let response = ClientResponseInfo::new(200).with_body("<h1>a</h1><!--split--><p>b</p>");

        let (outcome, resp) = run(handler.as_ref(), event("/"), Some(response)).await;

        let HandlerOutcome::Success(event) = outcome.unwrap() else {
            panic!("expected success");
        };
        assert_eq!(event.fragments().len(), 2);
        assert_eq!(event.fragments()[1].body(), "<p>b</p>");
        let resp = resp.unwrap();
        assert!(resp.body.is_none());
        assert_eq!(resp.status_code, 200);
    }

    #[tokio::test]
    async fn test_missing_body_fails() {
        let handler = create_splitter_handler(YamlValue::Null).unwrap();

        let (outcome, _) = run(handler.as_ref(), event("/"), None).await;
        assert_eq!(outcome.unwrap(), HandlerOutcome::failure(MISSING_TEMPLATE_BODY));

        let blank = ClientResponseInfo::new(200).with_body("   \n");
        let (outcome, resp) = run(handler.as_ref(), event("/"), Some(blank)).await;
        assert_eq!(outcome.unwrap(), HandlerOutcome::failure(MISSING_TEMPLATE_BODY));
        assert!(resp.unwrap().body.is_some());
    }

    #[test]
    fn test_delimiter_required() {
        assert!(create_splitter_handler(serde_yaml::from_str("splitter: delimiter").unwrap()).is_err());
    }
}
