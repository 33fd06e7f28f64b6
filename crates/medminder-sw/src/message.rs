//! Control messages posted to the worker by app pages.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use tracing::trace;

use crate::relay::ClientLogRelay;

/// Messages the worker understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Page checks that the relay reaches it.
    TestConnection,
    /// Page asks for sample log output.
    TestLog,
}

impl ControlMessage {
    /// Parse a message body. Anything unrecognised yields `None`.
    pub fn parse(message: &JsonValue) -> Option<Self> {
        ControlMessage::deserialize(message).ok()
    }
}

/// What the worker did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    Acknowledged,
    /// Diagnostic events were relayed.
    Logged(usize),
    Ignored,
}

/// Answers control messages through the log relay.
#[derive(Clone)]
pub struct ControlMessages {
    relay: ClientLogRelay,
}

impl ControlMessages {
    pub fn new(relay: ClientLogRelay) -> Self {
        Self { relay }
    }

    pub async fn handle(&self, message: &JsonValue) -> MessageOutcome {
        match ControlMessage::parse(message) {
            Some(ControlMessage::TestConnection) => {
                self.relay
                    .success("Service worker connection OK", None)
                    .await;
                MessageOutcome::Acknowledged
            }
            Some(ControlMessage::TestLog) => {
                self.relay
                    .info(
                        "Test log from service worker",
                        Some(json!({ "source": "TEST_LOG" })),
                    )
                    .await;
                self.relay
                    .warning("Test warning from service worker", None)
                    .await;
                MessageOutcome::Logged(2)
            }
            None => {
                trace!(%message, "Ignoring unknown message");
                MessageOutcome::Ignored
            }
        }
    }
}
