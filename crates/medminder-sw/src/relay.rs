//! Client log relay.
//!
//! Broadcasts `SW_LOG` messages to every open client so the app can show
//! what the worker is doing. Delivery is best effort: nothing here can fail
//! the caller.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::host::{ClientMatchOptions, ClientsApi};

/// Message type tag of relayed log events.
pub const SW_LOG: &str = "SW_LOG";

/// Severity of a relayed log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    Success,
    Warning,
    Error,
}

impl LogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogKind::Info => "info",
            LogKind::Success => "success",
            LogKind::Warning => "warning",
            LogKind::Error => "error",
        }
    }
}

/// Wire form of a log event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    /// Always `SW_LOG`.
    #[serde(rename = "type")]
    pub message_type: String,

    #[serde(rename = "logType")]
    pub log_type: LogKind,

    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonValue>,

    /// ISO-8601 UTC, millisecond precision.
    pub timestamp: String,
}

impl LogMessage {
    /// Create a message stamped with the current time.
    pub fn new(kind: LogKind, message: impl Into<String>, data: Option<JsonValue>) -> Self {
        Self {
            message_type: SW_LOG.to_string(),
            log_type: kind,
            message: message.into(),
            data,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

/// Broadcasts log events to every connected client.
#[derive(Clone)]
pub struct ClientLogRelay {
    clients: Arc<dyn ClientsApi>,
}

impl ClientLogRelay {
    pub fn new(clients: Arc<dyn ClientsApi>) -> Self {
        Self { clients }
    }

    /// Log locally and deliver to every client. Returns how many clients
    /// received the message.
    pub async fn relay(
        &self,
        kind: LogKind,
        message: impl Into<String>,
        data: Option<JsonValue>,
    ) -> usize {
        let message = LogMessage::new(kind, message, data);
        trace_locally(&message);
        self.broadcast(&message).await
    }

    pub async fn info(&self, message: impl Into<String>, data: Option<JsonValue>) -> usize {
        self.relay(LogKind::Info, message, data).await
    }

    pub async fn success(&self, message: impl Into<String>, data: Option<JsonValue>) -> usize {
        self.relay(LogKind::Success, message, data).await
    }

    pub async fn warning(&self, message: impl Into<String>, data: Option<JsonValue>) -> usize {
        self.relay(LogKind::Warning, message, data).await
    }

    pub async fn error(&self, message: impl Into<String>, data: Option<JsonValue>) -> usize {
        self.relay(LogKind::Error, message, data).await
    }

    /// Deliver an already-built message.
    pub async fn broadcast(&self, message: &LogMessage) -> usize {
        let payload = match serde_json::to_string(message) {
            Ok(payload) => payload,
            Err(e) => {
                error!(error = %e, "Failed to serialize log message");
                return 0;
            }
        };

        let clients = match self.clients.match_all(ClientMatchOptions::everyone()).await {
            Ok(clients) => clients,
            Err(e) => {
                warn!(error = %e, "Failed to enumerate clients for log relay");
                return 0;
            }
        };

        let mut delivered = 0;
        for client in &clients {
            match self.clients.post_message(&client.id, &payload).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(client_id = %client.id, error = %e, "Failed to deliver log to client")
                }
            }
        }

        debug!(delivered, total = clients.len(), "Relayed log message");
        delivered
    }
}

fn trace_locally(message: &LogMessage) {
    let data = message
        .data
        .as_ref()
        .map(|d| d.to_string())
        .unwrap_or_default();
    match message.log_type {
        LogKind::Info => info!(data = %data, "{}", message.message),
        LogKind::Success => info!(outcome = "success", data = %data, "{}", message.message),
        LogKind::Warning => warn!(data = %data, "{}", message.message),
        LogKind::Error => error!(data = %data, "{}", message.message),
    }
}
