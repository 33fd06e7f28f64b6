//! Push notification pipeline.
//!
//! ```text
//! bytes ─► decode (json → text fallback → empty) ─► derive fields
//!       ─► render (primary → minimal fallback) ─► give up
//! ```
//!
//! Every step is relayed to open clients. Nothing in here fails the push
//! event: the worst outcome is that no notification appears.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use thiserror::Error;

use crate::chain::{FallbackChain, TierFailure};
use crate::config::WorkerConfig;
use crate::host::{NotificationHost, NotificationId, NotificationOptions, NotificationRequest};
use crate::relay::ClientLogRelay;

pub const TIER_JSON: &str = "json";
pub const TIER_TEXT: &str = "text fallback";

// ==================== Types ====================

/// An inbound push message.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushEvent {
    /// Raw payload bytes, if the message carried any.
    pub data: Option<Vec<u8>>,
}

impl PushEvent {
    /// A push without payload.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn bytes(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Some(data.into()),
        }
    }

    pub fn text(text: &str) -> Self {
        Self::bytes(text.as_bytes())
    }

    pub fn json(value: &JsonValue) -> Self {
        Self::bytes(value.to_string())
    }
}

/// Decoded push payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,
}

/// Which decode tier produced the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeTier {
    /// The push carried no data.
    Absent,
    Json,
    Text,
    /// Nothing could be decoded.
    Empty,
}

/// Why a decode tier was skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("not a JSON object: {0}")]
    NotJson(String),

    #[error("not UTF-8 text: {0}")]
    NotText(String),
}

/// How the notification was rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The full notification was shown.
    Primary(NotificationId),
    /// Only the minimal fallback notification was shown.
    Fallback(NotificationId),
    /// Nothing was shown.
    Failed,
}

/// Result of handling one push event.
#[derive(Debug, Clone, PartialEq)]
pub struct PushReport {
    pub decode: DecodeTier,
    pub payload: PushPayload,
    pub outcome: PushOutcome,
}

// ==================== Decode ====================

fn decode_json(bytes: &[u8]) -> Result<PushPayload, DecodeError> {
    let value: JsonValue =
        serde_json::from_slice(bytes).map_err(|e| DecodeError::NotJson(e.to_string()))?;
    let map = match value {
        JsonValue::Object(map) => map,
        other => return Err(DecodeError::NotJson(format!("found {}", json_kind(&other)))),
    };
    Ok(PushPayload {
        title: map.get("title").and_then(as_text),
        body: map.get("body").and_then(as_text),
        data: map.get("data").filter(|d| !d.is_null()).cloned(),
    })
}

fn decode_text(bytes: &[u8]) -> Result<PushPayload, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|e| DecodeError::NotText(e.to_string()))?;
    Ok(PushPayload {
        body: Some(text.to_string()),
        ..Default::default()
    })
}

fn as_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// The payload decode tiers, in order.
pub fn decode_chain() -> FallbackChain<[u8], (DecodeTier, PushPayload), DecodeError> {
    FallbackChain::new()
        .tier(TIER_JSON, |b: &[u8]| decode_json(b).map(|p| (DecodeTier::Json, p)))
        .tier(TIER_TEXT, |b: &[u8]| decode_text(b).map(|p| (DecodeTier::Text, p)))
}

/// Decode a push payload. When every tier fails the result is an empty
/// payload from [`DecodeTier::Empty`].
pub fn decode_payload(
    data: Option<&[u8]>,
) -> (DecodeTier, PushPayload, Vec<TierFailure<DecodeError>>) {
    let Some(bytes) = data else {
        return (DecodeTier::Absent, PushPayload::default(), Vec::new());
    };
    match decode_chain().run(bytes) {
        Ok(resolved) => {
            let (tier, payload) = resolved.value;
            (tier, payload, resolved.failures)
        }
        Err(failures) => (DecodeTier::Empty, PushPayload::default(), failures),
    }
}

// ==================== Render ====================

/// One render attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTier {
    pub name: &'static str,
    pub request: NotificationRequest,
    /// Relayed if this attempt fails.
    pub failure_message: &'static str,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|s| !s.is_empty()).cloned()
}

/// Build the full notification for a payload, filling in defaults.
pub fn notification_request(config: &WorkerConfig, payload: &PushPayload) -> NotificationRequest {
    NotificationRequest {
        title: non_empty(payload.title.as_ref()).unwrap_or_else(|| config.default_title.clone()),
        options: NotificationOptions {
            body: non_empty(payload.body.as_ref()).unwrap_or_else(|| config.default_body.clone()),
            icon: config.icon.clone(),
            badge: Some(config.badge.clone()),
            data: payload.data.clone().unwrap_or_else(|| json!({})),
            require_interaction: true,
        },
    }
}

/// Build the minimal notification shown when the full one fails.
pub fn fallback_request(config: &WorkerConfig) -> NotificationRequest {
    NotificationRequest {
        title: config.fallback_title.clone(),
        options: NotificationOptions {
            body: config.fallback_body.clone(),
            icon: config.icon.clone(),
            badge: None,
            data: JsonValue::Null,
            require_interaction: false,
        },
    }
}

/// The render tiers, in order.
pub fn render_tiers(config: &WorkerConfig, payload: &PushPayload) -> Vec<RenderTier> {
    vec![
        RenderTier {
            name: "primary",
            request: notification_request(config, payload),
            failure_message: "Failed to show notification",
        },
        RenderTier {
            name: "fallback",
            request: fallback_request(config),
            failure_message: "Failed to show fallback notification",
        },
    ]
}

// ==================== Pipeline ====================

/// Turns push messages into notifications.
#[derive(Clone)]
pub struct PushPipeline {
    config: Arc<WorkerConfig>,
    notifications: Arc<dyn NotificationHost>,
    relay: ClientLogRelay,
}

impl PushPipeline {
    pub fn new(
        config: Arc<WorkerConfig>,
        notifications: Arc<dyn NotificationHost>,
        relay: ClientLogRelay,
    ) -> Self {
        Self {
            config,
            notifications,
            relay,
        }
    }

    /// Handle a push event end to end.
    pub async fn handle(&self, event: &PushEvent) -> PushReport {
        self.relay
            .info(
                "Push event received",
                Some(json!({ "hasData": event.data.is_some() })),
            )
            .await;

        let (decode, payload) = self.decode(event).await;
        let tiers = render_tiers(&self.config, &payload);
        let outcome = self.render(tiers).await;

        PushReport {
            decode,
            payload,
            outcome,
        }
    }

    async fn decode(&self, event: &PushEvent) -> (DecodeTier, PushPayload) {
        let (tier, payload, failures) = decode_payload(event.data.as_deref());
        let skipped = failure_detail(&failures);

        match tier {
            DecodeTier::Absent => {
                self.relay
                    .warning("No data in push event, using defaults", None)
                    .await;
            }
            DecodeTier::Json => {
                self.relay
                    .success("Push data parsed as JSON", serde_json::to_value(&payload).ok())
                    .await;
            }
            DecodeTier::Text => {
                self.relay
                    .warning(
                        "Push data parsed via text fallback",
                        Some(json!({ "body": payload.body, "skipped": skipped })),
                    )
                    .await;
            }
            DecodeTier::Empty => {
                self.relay
                    .error(
                        "Failed to parse push data, using empty payload",
                        Some(json!({ "skipped": skipped })),
                    )
                    .await;
            }
        }
        (tier, payload)
    }

    async fn render(&self, tiers: Vec<RenderTier>) -> PushOutcome {
        for (index, tier) in tiers.into_iter().enumerate() {
            match self.notifications.show_notification(&tier.request).await {
                Ok(id) => {
                    self.relay
                        .success(
                            "Notification displayed",
                            Some(json!({ "tier": tier.name, "title": tier.request.title })),
                        )
                        .await;
                    return if index == 0 {
                        PushOutcome::Primary(id)
                    } else {
                        PushOutcome::Fallback(id)
                    };
                }
                Err(e) => {
                    self.relay
                        .error(
                            tier.failure_message,
                            Some(json!({ "tier": tier.name, "error": e.to_string() })),
                        )
                        .await;
                }
            }
        }
        PushOutcome::Failed
    }
}

fn failure_detail(failures: &[TierFailure<DecodeError>]) -> JsonValue {
    failures
        .iter()
        .map(|f| json!({ "tier": f.tier, "error": f.error.to_string() }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn config() -> WorkerConfig {
        WorkerConfig::new(Url::parse("https://app.test/").unwrap())
    }

    #[test]
    fn test_decode_json_object() {
        let resolved = decode_chain()
            .run(br#"{"title":"Aspirin","body":"Take 1 tablet","data":{"doseId":7}}"#)
            .unwrap();
        let (tier, payload) = resolved.value;
        assert_eq!(tier, DecodeTier::Json);
        assert_eq!(payload.title.as_deref(), Some("Aspirin"));
        assert_eq!(payload.body.as_deref(), Some("Take 1 tablet"));
        assert_eq!(payload.data, Some(json!({"doseId": 7})));
    }

    #[test]
    fn test_decode_plain_text() {
        let resolved = decode_chain().run(b"Take your vitamins").unwrap();
        assert_eq!(resolved.tier, TIER_TEXT);
        assert_eq!(resolved.value.1.body.as_deref(), Some("Take your vitamins"));
        assert_eq!(resolved.failures[0].tier, TIER_JSON);
    }

    #[test]
    fn test_decode_json_scalar_falls_back_to_text() {
        let resolved = decode_chain().run(b"42").unwrap();
        assert_eq!(resolved.value.0, DecodeTier::Text);
        assert_eq!(resolved.value.1.body.as_deref(), Some("42"));
    }

    #[test]
    fn test_decode_binary_is_empty() {
        let failures = decode_chain().run(&[0xff, 0xfe, 0x00]).unwrap_err();
        assert_eq!(failures.len(), 2);

        let (tier, payload, failures) = decode_payload(Some(&[0xff, 0xfe, 0x00]));
        assert_eq!(tier, DecodeTier::Empty);
        assert_eq!(payload, PushPayload::default());
        let tiers: Vec<_> = failures.iter().map(|f| f.tier).collect();
        assert_eq!(tiers, vec![TIER_JSON, TIER_TEXT]);
    }

    #[test]
    fn test_decode_absent_payload() {
        let (tier, payload, failures) = decode_payload(None);
        assert_eq!(tier, DecodeTier::Absent);
        assert_eq!(payload, PushPayload::default());
        assert!(failures.is_empty());
    }

    #[test]
    fn test_notification_defaults() {
        let request = notification_request(&config(), &PushPayload::default());
        assert_eq!(request.title, "Medication Reminder");
        assert_eq!(request.options.body, config().default_body);
        assert_eq!(request.options.data, json!({}));
        assert!(request.options.require_interaction);
    }

    #[test]
    fn test_empty_strings_use_defaults() {
        let payload = PushPayload {
            title: Some(String::new()),
            body: Some(String::new()),
            data: None,
        };
        let request = notification_request(&config(), &payload);
        assert_eq!(request.title, "Medication Reminder");
        assert_eq!(request.options.body, config().default_body);
    }

    #[test]
    fn test_render_tiers_order() {
        let tiers = render_tiers(&config(), &PushPayload::default());
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers[0].name, "primary");
        assert_eq!(tiers[1].request.title, config().fallback_title);
        assert_eq!(tiers[1].request.options.icon, tiers[0].request.options.icon);
        assert_ne!(tiers[0].failure_message, tiers[1].failure_message);
    }
}
