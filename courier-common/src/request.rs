//! The request a caller asks us to deliver

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// A message to be dispatched through one of the configured channels
///
/// Immutable once built: fields are private and only readable through
/// accessors. The wire format uses camelCase (`idempotencyKey`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRequest {
    /// Recipient address
    #[serde(alias = "recipient")]
    to: String,
    subject: String,
    body: String,
    /// Opt-in deduplication token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    idempotency_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<AHashMap<String, serde_json::Value>>,
}

impl DeliveryRequest {
    #[must_use]
    pub fn new(to: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            body: body.into(),
            idempotency_key: None,
            metadata: None,
        }
    }

    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(AHashMap::default)
            .insert(key.into(), value);
        self
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// The idempotency key, if the caller supplied a non-empty one
    pub fn idempotency_key(&self) -> Option<&str> {
        self.idempotency_key.as_deref().filter(|key| !key.is_empty())
    }

    pub const fn metadata(&self) -> Option<&AHashMap<String, serde_json::Value>> {
        self.metadata.as_ref()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_deserialize_wire_format() {
        let request: DeliveryRequest = serde_json::from_str(
            r#"{
                "to": "user@example.com",
                "subject": "Hello",
                "body": "Welcome!",
                "idempotencyKey": "unique-key-1",
                "metadata": { "campaign": "onboarding" }
            }"#,
        )
        .unwrap();

        assert_eq!(request.to(), "user@example.com");
        assert_eq!(request.subject(), "Hello");
        assert_eq!(request.body(), "Welcome!");
        assert_eq!(request.idempotency_key(), Some("unique-key-1"));
        assert_eq!(
            request.metadata().and_then(|m| m.get("campaign")),
            Some(&serde_json::json!("onboarding"))
        );
    }

    #[test]
    fn test_recipient_alias_and_optional_fields() {
        let request: DeliveryRequest = serde_json::from_str(
            r#"{ "recipient": "a@b.com", "subject": "s", "body": "b" }"#,
        )
        .unwrap();

        assert_eq!(request.to(), "a@b.com");
        assert_eq!(request.idempotency_key(), None);
        assert!(request.metadata().is_none());
    }

    #[test]
    fn test_empty_idempotency_key_is_treated_as_absent() {
        let request = DeliveryRequest::new("a@b.com", "s", "b").with_idempotency_key("");
        assert_eq!(request.idempotency_key(), None);
    }

    #[test]
    fn test_builder() {
        let request = DeliveryRequest::new("a@b.com", "s", "b")
            .with_idempotency_key("id1")
            .with_metadata("tenant", serde_json::json!(7));

        assert_eq!(request.idempotency_key(), Some("id1"));
        assert_eq!(request.metadata().map(|m| m.len()), Some(1));
    }
}
