//! The state threaded through a handler chain.

use std::sync::Arc;

use serde_json::{json, Map, Value as JsonValue};

use super::{fragment::Fragment, request::ClientRequestInfo};

/// Client request view, fragments and free-form payload of one request.
///
/// Fragments are shared and immutable; swapping them means building a new
/// event with [`RequestEvent::with_fragments`]. The payload can only grow
/// through [`RequestEvent::append_payload`] and is handed out as a copy.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEvent {
    client_request: ClientRequestInfo,
    fragments: Arc<Vec<Fragment>>,
    payload: Map<String, JsonValue>,
}

impl RequestEvent {
    pub fn new(client_request: ClientRequestInfo) -> Self {
        Self {
            client_request,
            fragments: Arc::new(Vec::new()),
            payload: Map::new(),
        }
    }

    pub fn client_request(&self) -> &ClientRequestInfo {
        &self.client_request
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    /// Copy of the payload; changes to it never reach the event.
    pub fn payload(&self) -> Map<String, JsonValue> {
        self.payload.clone()
    }

    pub fn payload_value(&self, key: &str) -> Option<&JsonValue> {
        self.payload.get(key)
    }

    /// Stores `value` under `key` and returns a snapshot of the whole payload.
    pub fn append_payload(
        &mut self,
        key: impl Into<String>,
        value: JsonValue,
    ) -> Map<String, JsonValue> {
        self.payload.insert(key.into(), value);
        self.payload.clone()
    }

    pub fn with_fragments(&self, fragments: Vec<Fragment>) -> Self {
        Self {
            client_request: self.client_request.clone(),
            fragments: Arc::new(fragments),
            payload: self.payload.clone(),
        }
    }

    pub fn with_client_request(&self, client_request: ClientRequestInfo) -> Self {
        Self {
            client_request,
            fragments: Arc::clone(&self.fragments),
            payload: self.payload.clone(),
        }
    }

    pub fn to_json(&self) -> JsonValue {
        json!({
            "clientRequest": self.client_request.to_json(),
            "fragments": serde_json::to_value(self.fragments.as_slice()).unwrap_or(JsonValue::Null),
            "payload": JsonValue::Object(self.payload.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> RequestEvent {
        RequestEvent::new(ClientRequestInfo::builder().path("/a").build())
    }

    #[test]
    fn test_new_event_is_empty() {
        let event = event();
        assert!(event.fragments().is_empty());
        assert!(event.payload().is_empty());
    }

    #[test]
    fn test_payload_read_is_a_copy() {
        let mut event = event();
        event.append_payload("user", json!({"name": "alice"}));

        let mut copy = event.payload();
        copy.insert("injected".to_string(), json!(true));

        assert!(event.payload_value("injected").is_none());
        assert_eq!(event.payload().len(), 1);
    }

    #[test]
    fn test_append_returns_full_snapshot() {
        let mut event = event();
        event.append_payload("a", json!(1));
        let snapshot = event.append_payload("b", json!(2));
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["a"], json!(1));
    }

    #[test]
    fn test_with_fragments_builds_new_event() {
        let mut original = event();
        original.append_payload("k", json!("v"));

        let updated = original.with_fragments(vec![Fragment::static_content("x")]);

        assert!(original.fragments().is_empty());
        assert_eq!(updated.fragments().len(), 1);
        assert_eq!(updated.client_request(), original.client_request());
        assert_eq!(updated.payload_value("k"), Some(&json!("v")));
    }

    #[test]
    fn test_to_json() {
        let event = event().with_fragments(vec![Fragment::static_content("body")]);
        let json = event.to_json();
        assert_eq!(json["clientRequest"]["path"], "/a");
        assert_eq!(json["fragments"][0]["body"], "body");
        assert!(json["payload"].as_object().unwrap().is_empty());
    }
}
