//! The cache worker task: sole owner of generation state.
//!
//! Pages never read worker state directly. They send commands and receive
//! replies, and observe lifecycle transitions through the event broadcast.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::controller::{CacheController, Response};
use crate::fetcher::{Fetch, FetchError, FetchRequest};
use crate::generation::Generation;
use crate::store::CacheStore;

const COMMAND_QUEUE_DEPTH: usize = 64;
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Commands a page may send to the worker.
pub enum WorkerCommand {
    /// Resolve one intercepted request; the reply always carries a response
    /// for intercepted GETs.
    Fetch {
        request: FetchRequest,
        reply: oneshot::Sender<Result<Response, FetchError>>,
    },
    /// Activate the waiting generation immediately.
    SkipWaiting,
    /// Ask for the active generation's version string.
    GetVersion {
        reply: oneshot::Sender<Option<String>>,
    },
    Shutdown,
}

/// Lifecycle transitions observable by pages and the update advisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// A new generation finished installing while another is active.
    UpdateWaiting { version: String },
    /// A generation took control (initial activation or skip-waiting).
    ControllerChanged { version: String },
    /// The incoming generation failed to install; the previous one keeps
    /// serving.
    InstallFailed { version: String },
}

/// Worker construction parameters.
pub struct WorkerConfig {
    /// Version tag of the generation shipped with this build.
    pub version: String,
    /// App shell resources pre-fetched at install.
    pub shell_resources: Vec<String>,
    /// Origin the shell resources are fetched from.
    pub base_url: url::Url,
}

/// Cloneable handle for talking to the worker.
#[derive(Clone)]
pub struct CacheWorkerHandle {
    commands: mpsc::Sender<WorkerCommand>,
    events: broadcast::Sender<WorkerEvent>,
}

impl CacheWorkerHandle {
    /// Spawn the worker task. Installation and activation decisions run
    /// before the first command is processed.
    pub fn spawn(config: WorkerConfig, store: Arc<CacheStore>, fetcher: Arc<dyn Fetch>) -> Self {
        let (commands, rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let handle = Self {
            commands,
            events: events.clone(),
        };

        tokio::spawn(run_worker(config, store, fetcher, rx, events));
        handle
    }

    /// Subscribe to lifecycle events. Subscribe before awaiting anything so
    /// startup transitions are not missed.
    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    /// Resolve a request through the worker. Errors only for pass-through
    /// requests or when the worker is gone.
    pub async fn fetch(&self, request: FetchRequest) -> Result<Response, FetchError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(WorkerCommand::Fetch { request, reply })
            .await
            .map_err(|_| FetchError::Network("cache worker unavailable".into()))?;
        response
            .await
            .map_err(|_| FetchError::Network("cache worker dropped request".into()))?
    }

    pub async fn skip_waiting(&self) {
        let _ = self.commands.send(WorkerCommand::SkipWaiting).await;
    }

    pub async fn active_version(&self) -> Option<String> {
        let (reply, response) = oneshot::channel();
        if self
            .commands
            .send(WorkerCommand::GetVersion { reply })
            .await
            .is_err()
        {
            return None;
        }
        response.await.ok().flatten()
    }

    pub async fn shutdown(&self) {
        let _ = self.commands.send(WorkerCommand::Shutdown).await;
    }
}

async fn run_worker(
    config: WorkerConfig,
    store: Arc<CacheStore>,
    fetcher: Arc<dyn Fetch>,
    mut commands: mpsc::Receiver<WorkerCommand>,
    events: broadcast::Sender<WorkerEvent>,
) {
    let mut controller = CacheController::new(store, fetcher);

    startup(&mut controller, &config, &events).await;

    while let Some(command) = commands.recv().await {
        match command {
            WorkerCommand::Fetch { request, reply } => {
                let response = controller.handle_fetch(&request).await;
                let _ = reply.send(response);
            }
            WorkerCommand::SkipWaiting => {
                if !controller.has_waiting() {
                    debug!("skip-waiting with no generation waiting");
                    continue;
                }
                match controller.activate() {
                    Ok(()) => {
                        if let Some(version) = controller.active_version() {
                            let _ = events.send(WorkerEvent::ControllerChanged { version });
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to activate waiting generation"),
                }
            }
            WorkerCommand::GetVersion { reply } => {
                let _ = reply.send(controller.active_version());
            }
            WorkerCommand::Shutdown => break,
        }
    }
    debug!("cache worker stopped");
}

async fn startup(
    controller: &mut CacheController,
    config: &WorkerConfig,
    events: &broadcast::Sender<WorkerEvent>,
) {
    let active = controller.active_version();
    if active.as_deref() == Some(config.version.as_str()) {
        info!(version = %config.version, "generation already active");
        return;
    }

    let generation = Generation::new(config.version.clone());
    match controller
        .install(generation, &config.shell_resources, &config.base_url)
        .await
    {
        Ok(()) => {
            if active.is_none() {
                // Nothing to supersede: take control immediately.
                match controller.activate() {
                    Ok(()) => {
                        let _ = events.send(WorkerEvent::ControllerChanged {
                            version: config.version.clone(),
                        });
                    }
                    Err(e) => warn!(error = %e, "initial activation failed"),
                }
            } else {
                let _ = events.send(WorkerEvent::UpdateWaiting {
                    version: config.version.clone(),
                });
            }
        }
        Err(e) => {
            warn!(version = %config.version, error = %e, "generation install failed");
            let _ = events.send(WorkerEvent::InstallFailed {
                version: config.version.clone(),
            });
        }
    }
}
