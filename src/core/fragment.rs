//! Content fragments and the splitter seam that produces them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use super::error::GatewayResult;

pub const STATIC_FRAGMENT_KIND: &str = "static";

/// Opaque content unit. The pipeline only cares about identity and order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    configuration: JsonValue,
    body: String,
    payload: Map<String, JsonValue>,
}

impl Fragment {
    pub fn new(kind: impl Into<String>, configuration: JsonValue, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind: kind.into(),
            configuration,
            body: body.into(),
            payload: Map::new(),
        }
    }

    pub fn static_content(body: impl Into<String>) -> Self {
        Self::new(STATIC_FRAGMENT_KIND, JsonValue::Object(Map::new()), body)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn configuration(&self) -> &JsonValue {
        &self.configuration
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn payload(&self) -> &Map<String, JsonValue> {
        &self.payload
    }
}

/// Turns a response body into an ordered fragment sequence.
pub trait Splitter: Send + Sync {
    fn split(&self, content: &str) -> GatewayResult<Vec<Fragment>>;
}

/// Keeps the whole body as a single static fragment.
#[derive(Debug, Default)]
pub struct WholeBodySplitter;

impl Splitter for WholeBodySplitter {
    fn split(&self, content: &str) -> GatewayResult<Vec<Fragment>> {
        Ok(vec![Fragment::static_content(content)])
    }
}

/// Cuts the body at every occurrence of a marker; empty pieces are skipped.
#[derive(Debug)]
pub struct DelimiterSplitter {
    delimiter: String,
}

impl DelimiterSplitter {
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
        }
    }
}

impl Splitter for DelimiterSplitter {
    fn split(&self, content: &str) -> GatewayResult<Vec<Fragment>> {
        if self.delimiter.is_empty() {
            return WholeBodySplitter.split(content);
        }
        Ok(content
            .split(self.delimiter.as_str())
            .filter(|piece| !piece.is_empty())
            .map(Fragment::static_content)
            .collect())
    }
}
