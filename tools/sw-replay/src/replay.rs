//! Scenario setup and execution.

use anyhow::{bail, Context};
use medminder_sw::host::ClientType;
use medminder_sw::{
    Client, FetchRequest, LogMessage, MemoryHost, NotificationClickEvent, PushEvent, PushOutcome,
    ServiceWorker, WorkerConfig,
};
use serde_json::Value as JsonValue;
use std::path::Path;

/// Client ID of the observer that collects relayed logs.
const OBSERVER_ID: &str = "sw-replay-observer";

/// One event to replay.
#[derive(Debug, Clone, PartialEq)]
pub enum Scenario {
    Install { missing: Vec<String> },
    Activate { existing: Vec<String> },
    Fetch { path: String, offline: bool },
    Push { data: Option<Vec<u8>>, failures: usize },
    Click { windows: Vec<String> },
    Message { body: JsonValue },
}

/// What a replay produced.
#[derive(Debug)]
pub struct Replay {
    /// Every log message relayed to clients, in order.
    pub logs: Vec<LogMessage>,
    pub outcome: String,
}

/// Load the worker configuration from a file, or build defaults for an origin.
pub fn load_config(path: Option<&Path>, origin: &str) -> anyhow::Result<WorkerConfig> {
    match path {
        Some(path) => WorkerConfig::from_path(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => WorkerConfig::for_origin(origin).context("building default config"),
    }
}

/// Serve every precache asset except the missing ones.
async fn serve_precache(
    host: &MemoryHost,
    config: &WorkerConfig,
    missing: &[String],
) -> anyhow::Result<()> {
    for path in &config.precache_urls {
        if missing.contains(path) {
            continue;
        }
        let url = config.resolve(path)?;
        host.network
            .serve_ok(url.as_str(), &format!("replayed {}", path))
            .await;
    }
    Ok(())
}

/// Run a scenario against a fresh in-memory host.
pub async fn run(config: WorkerConfig, scenario: Scenario) -> anyhow::Result<Replay> {
    let host = MemoryHost::new();

    // A non-window client receives the relay without affecting click routing.
    let mut observer = Client::window(OBSERVER_ID, config.origin.clone());
    observer.client_type = ClientType::Worker;
    host.clients.add(observer).await;

    let worker = ServiceWorker::new(config.clone(), host.host())?;

    let outcome = match scenario {
        Scenario::Install { missing } => {
            serve_precache(&host, &config, &missing).await?;
            match worker.install().finished().await? {
                Ok(count) => format!("installed ({} assets cached)", count),
                Err(e) => format!("install failed: {}", e),
            }
        }
        Scenario::Activate { existing } => {
            for name in &existing {
                host.caches.seed(name, Vec::new()).await;
            }
            let report = worker.activate().finished().await?;
            format!(
                "activated (deleted: [{}], remaining: [{}])",
                report.deleted.join(", "),
                host.caches.names().await.join(", ")
            )
        }
        Scenario::Fetch { path, offline } => {
            serve_precache(&host, &config, &[]).await?;
            if let Err(e) = worker.install().finished().await? {
                bail!("install failed before fetch: {}", e);
            }
            host.network.set_offline(offline);
            let request = FetchRequest::get(config.resolve(&path)?);
            match worker.fetch(request).finished().await? {
                Ok(response) => format!(
                    "{} {} ({})",
                    response.status,
                    response.status_text,
                    if response.from_cache { "cache" } else { "network" }
                ),
                Err(e) => format!("fetch failed: {}", e),
            }
        }
        Scenario::Push { data, failures } => {
            host.notifications.fail_next(failures);
            let report = worker.push(PushEvent { data }).finished().await?;
            format!("{:?} via {:?}", report.outcome, report.decode)
        }
        Scenario::Click { windows } => {
            for url in &windows {
                host.clients.add_window(url).await?;
            }
            let report = worker.push(PushEvent::empty()).finished().await?;
            let id = match report.outcome {
                PushOutcome::Primary(id) | PushOutcome::Fallback(id) => id,
                PushOutcome::Failed => bail!("no notification to click"),
            };
            let outcome = worker
                .notification_click(NotificationClickEvent::new(id))
                .finished()
                .await?;
            format!("{:?}", outcome)
        }
        Scenario::Message { body } => {
            let outcome = worker.message(body).finished().await?;
            format!("{:?}", outcome)
        }
    };

    let logs = host
        .clients
        .delivered_to(OBSERVER_ID)
        .await
        .iter()
        .map(|raw| serde_json::from_str(raw))
        .collect::<Result<Vec<LogMessage>, _>>()?;

    Ok(Replay { logs, outcome })
}
