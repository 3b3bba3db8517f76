//! Append-only audit trail of handler outcomes for a single request.

use std::{
    fmt,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

use super::error::{GatewayError, GatewayResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    Success,
    Failure,
    Fatal,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Success => "SUCCESS",
            EntryStatus::Failure => "FAILURE",
            EntryStatus::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub handler_id: String,
    pub status: EntryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(with = "epoch_millis")]
    pub timestamp: SystemTime,
}

mod epoch_millis {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &SystemTime, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = ts
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SystemTime, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + Duration::from_millis(millis))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEventLog {
    operations: Vec<Entry>,
}

impl RequestEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only the chain executor writes to the log.
    pub(crate) fn append(
        &mut self,
        handler_id: impl Into<String>,
        status: EntryStatus,
        error_message: Option<String>,
    ) {
        self.operations.push(Entry {
            handler_id: handler_id.into(),
            status,
            error_message,
            timestamp: SystemTime::now(),
        });
    }

    pub(crate) fn success(&mut self, handler_id: &str) {
        self.append(handler_id, EntryStatus::Success, None);
    }

    pub(crate) fn failure(&mut self, handler_id: &str, reason: impl Into<String>) {
        self.append(handler_id, EntryStatus::Failure, Some(reason.into()));
    }

    pub(crate) fn fatal(&mut self, handler_id: &str, message: impl Into<String>) {
        self.append(handler_id, EntryStatus::Fatal, Some(message.into()));
    }

    pub fn entries(&self) -> &[Entry] {
        &self.operations
    }

    pub fn last(&self) -> Option<&Entry> {
        self.operations.last()
    }

    /// Most recent entry with the given status.
    pub fn last_with_status(&self, status: EntryStatus) -> Option<&Entry> {
        self.operations.iter().rev().find(|e| e.status == status)
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn from_json(value: serde_json::Value) -> GatewayResult<Self> {
        serde_json::from_value(value)
            .map_err(|e| GatewayError::serialization_error("Invalid request event log", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_keeps_order() {
        let mut log = RequestEventLog::new();
        log.success("repository");
        log.failure("splitter", "Template body is missing!");
        log.fatal("assembler", "boom");

        let statuses: Vec<_> = log.entries().iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![EntryStatus::Success, EntryStatus::Failure, EntryStatus::Fatal]
        );
        assert_eq!(log.last().unwrap().handler_id, "assembler");
        assert_eq!(
            log.last_with_status(EntryStatus::Failure)
                .and_then(|e| e.error_message.as_deref()),
            Some("Template body is missing!")
        );
    }

    #[test]
    fn test_json_export_and_import() {
        let mut log = RequestEventLog::new();
        log.success("a");
        log.failure("b", "nope");

        let json = log.to_json();
        assert_eq!(json["operations"][0]["handlerId"], "a");
        assert_eq!(json["operations"][0]["status"], "SUCCESS");
        assert!(json["operations"][0].get("errorMessage").is_none());
        assert_eq!(json["operations"][1]["errorMessage"], "nope");
        assert!(json["operations"][1]["timestamp"].is_u64());

        let restored = RequestEventLog::from_json(json).unwrap();
        assert_eq!(restored.len(), 2);
        assert_eq!(restored.entries()[1].status, EntryStatus::Failure);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(RequestEventLog::from_json(serde_json::json!({"operations": 3})).is_err());
    }
}
