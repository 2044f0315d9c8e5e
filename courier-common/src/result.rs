//! The outcome of a single `send` call

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::ChannelId;

/// Outcome of a dispatch, or of one channel attempt
///
/// Channels produce one per attempt; the orchestrator returns exactly one per
/// `send` call. Logical failures are carried in `success` and `error`, never
/// as an `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResult {
    pub success: bool,
    /// The channel that produced this result, if any channel was contacted
    #[serde(default, alias = "provider")]
    pub channel: Option<ChannelId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Provider-assigned message id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<AHashMap<String, serde_json::Value>>,
}

impl DeliveryResult {
    /// A successful delivery through `channel`
    #[must_use]
    pub fn delivered(channel: ChannelId, message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            channel: Some(channel),
            error: None,
            message_id: Some(message_id.into()),
            idempotency_key: None,
            details: None,
        }
    }

    /// A logical failure reported by `channel`
    #[must_use]
    pub fn rejected(channel: ChannelId, error: impl Into<String>) -> Self {
        Self {
            success: false,
            channel: Some(channel),
            error: Some(error.into()),
            message_id: None,
            idempotency_key: None,
            details: None,
        }
    }

    /// A failure that never reached (or no longer concerns) a single channel
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            channel: None,
            error: Some(error.into()),
            message_id: None,
            idempotency_key: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_idempotency_key(mut self, key: Option<&str>) -> Self {
        self.idempotency_key = key.map(ToString::to_string);
        self
    }

    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.details
            .get_or_insert_with(AHashMap::default)
            .insert(key.into(), value);
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_failure_serialization_omits_empty_fields() {
        let result = DeliveryResult::failure("Duplicate request").with_idempotency_key(Some("id3"));
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "success": false,
                "channel": null,
                "error": "Duplicate request",
                "idempotencyKey": "id3",
            })
        );
    }

    #[test]
    fn test_accepts_provider_alias() {
        let result: DeliveryResult = serde_json::from_str(
            r#"{ "success": true, "provider": "MockProviderB", "messageId": "b1" }"#,
        )
        .unwrap();

        assert!(result.success);
        assert_eq!(result.channel, Some(ChannelId::new("MockProviderB")));
        assert_eq!(result.message_id.as_deref(), Some("b1"));
    }

    #[test]
    fn test_details() {
        let result = DeliveryResult::delivered(ChannelId::new("a"), "A-1")
            .with_detail("delayMs", serde_json::json!(120));

        assert_eq!(
            result.details.as_ref().and_then(|d| d.get("delayMs")),
            Some(&serde_json::json!(120))
        );
    }
}
