//! The service worker global scope.
//!
//! [`ServiceWorker`] wires the configuration and host APIs into each
//! component and exposes one entry point per event. Each entry point spawns
//! the event's work and returns its [`EventTask`].

use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::info;

use crate::click::{ClickHandler, ClickOutcome, NotificationClickEvent, NotificationCloseEvent};
use crate::config::WorkerConfig;
use crate::fetch::FetchInterceptor;
use crate::host::{FetchRequest, FetchResponse, Host};
use crate::lifecycle::{ActivationReport, CacheLifecycle};
use crate::message::{ControlMessages, MessageOutcome};
use crate::push::{PushEvent, PushPipeline, PushReport};
use crate::relay::ClientLogRelay;
use crate::task::EventTask;
use crate::Result;

/// A running MedMinder service worker.
#[derive(Clone)]
pub struct ServiceWorker {
    config: Arc<WorkerConfig>,
    relay: ClientLogRelay,
    lifecycle: CacheLifecycle,
    fetch: FetchInterceptor,
    push: PushPipeline,
    clicks: ClickHandler,
    messages: ControlMessages,
}

impl ServiceWorker {
    /// Start a worker with validated configuration.
    pub fn new(config: WorkerConfig, host: Host) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);
        let relay = ClientLogRelay::new(host.clients.clone());

        info!(
            cache = %config.cache_name,
            origin = %config.origin,
            "Service worker started"
        );

        Ok(Self {
            lifecycle: CacheLifecycle::new(
                config.clone(),
                host.caches.clone(),
                host.network.clone(),
                host.clients.clone(),
                host.registration.clone(),
                relay.clone(),
            ),
            fetch: FetchInterceptor::new(config.clone(), host.caches.clone(), host.network.clone()),
            push: PushPipeline::new(config.clone(), host.notifications.clone(), relay.clone()),
            clicks: ClickHandler::new(
                config.clone(),
                host.clients.clone(),
                host.notifications.clone(),
                relay.clone(),
            ),
            messages: ControlMessages::new(relay.clone()),
            relay,
            config,
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// The relay, for hosts that want to report their own events.
    pub fn relay(&self) -> &ClientLogRelay {
        &self.relay
    }

    /// `install` event.
    pub fn install(&self) -> EventTask<Result<usize>> {
        let lifecycle = self.lifecycle.clone();
        EventTask::spawn("install", async move { lifecycle.install().await })
    }

    /// `activate` event.
    pub fn activate(&self) -> EventTask<ActivationReport> {
        let lifecycle = self.lifecycle.clone();
        EventTask::spawn("activate", async move { lifecycle.activate().await })
    }

    /// `fetch` event.
    pub fn fetch(&self, request: FetchRequest) -> EventTask<Result<FetchResponse>> {
        let fetch = self.fetch.clone();
        EventTask::spawn("fetch", async move { fetch.handle(&request).await })
    }

    /// `push` event.
    pub fn push(&self, event: PushEvent) -> EventTask<PushReport> {
        let push = self.push.clone();
        EventTask::spawn("push", async move { push.handle(&event).await })
    }

    /// `notificationclick` event.
    pub fn notification_click(&self, event: NotificationClickEvent) -> EventTask<ClickOutcome> {
        let clicks = self.clicks.clone();
        EventTask::spawn("notificationclick", async move {
            clicks.handle_click(&event).await
        })
    }

    /// `notificationclose` event.
    pub fn notification_close(&self, event: NotificationCloseEvent) -> EventTask<()> {
        let clicks = self.clicks.clone();
        EventTask::spawn("notificationclose", async move {
            clicks.handle_close(&event).await
        })
    }

    /// `message` event.
    pub fn message(&self, message: JsonValue) -> EventTask<MessageOutcome> {
        let messages = self.messages.clone();
        EventTask::spawn("message", async move { messages.handle(&message).await })
    }
}
