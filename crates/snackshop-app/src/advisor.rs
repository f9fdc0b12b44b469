//! Install and update advisors.
//!
//! Two independent platform signals surface to the UI: "this app can be
//! installed" and "a new version is waiting". Each advisor owns its flag and
//! executes the corresponding platform action on request.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{debug, info, warn};

use snackshop_cache::{CacheWorkerHandle, WorkerEvent};
use snackshop_shared::schemas::{InstallOutcome, PlatformSignal, PromptHandle, ShellEvent};

use crate::shell::ShellPublisher;

const ACTIVATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Seam for replaying a captured install invitation to the user.
pub trait InstallPrompter: Send + Sync {
    /// Present the prompt. `Ok(None)` means the platform will report the
    /// choice later (as an `AppInstalled` signal).
    fn present<'a>(
        &'a self,
        prompt: &'a PromptHandle,
    ) -> Pin<Box<dyn Future<Output = Result<Option<InstallOutcome>>> + Send + 'a>>;
}

/// Production prompter: hands the prompt to the shell and lets the
/// `app-installed` signal report acceptance.
pub struct ShellPrompter {
    publisher: ShellPublisher,
}

impl ShellPrompter {
    pub fn new(publisher: ShellPublisher) -> Self {
        Self { publisher }
    }
}

impl InstallPrompter for ShellPrompter {
    fn present<'a>(
        &'a self,
        prompt: &'a PromptHandle,
    ) -> Pin<Box<dyn Future<Output = Result<Option<InstallOutcome>>> + Send + 'a>> {
        Box::pin(async move {
            self.publisher.emit(ShellEvent::PresentInstallPrompt {
                prompt: prompt.clone(),
            });
            Ok(None)
        })
    }
}

struct InstallState {
    installable: bool,
    installed: bool,
    deferred: Option<PromptHandle>,
}

/// Observes installability signals and replays the captured prompt.
pub struct InstallAdvisor {
    state: StdMutex<InstallState>,
    prompter: Arc<dyn InstallPrompter>,
    publisher: ShellPublisher,
}

impl InstallAdvisor {
    pub fn new(prompter: Arc<dyn InstallPrompter>, publisher: ShellPublisher) -> Self {
        Self {
            state: StdMutex::new(InstallState {
                installable: false,
                installed: false,
                deferred: None,
            }),
            prompter,
            publisher,
        }
    }

    pub fn installable(&self) -> bool {
        self.state.lock().unwrap().installable
    }

    pub fn installed(&self) -> bool {
        self.state.lock().unwrap().installed
    }

    /// Route one platform signal. Non-install signals are ignored.
    pub fn handle_signal(&self, signal: &PlatformSignal) {
        match signal {
            PlatformSignal::InstallPromptAvailable { prompt } => {
                let mut state = self.state.lock().unwrap();
                if state.installed {
                    debug!("install prompt offered but app is already installed");
                    return;
                }
                state.deferred = Some(prompt.clone());
                state.installable = true;
                drop(state);
                self.publisher
                    .emit(ShellEvent::InstallableChanged { installable: true });
            }
            PlatformSignal::AppInstalled => {
                let mut state = self.state.lock().unwrap();
                state.installed = true;
                state.installable = false;
                state.deferred = None;
                drop(state);
                info!("app installed");
                self.publisher
                    .emit(ShellEvent::InstallableChanged { installable: false });
            }
            PlatformSignal::DisplayMode { standalone } => {
                if *standalone {
                    let mut state = self.state.lock().unwrap();
                    state.installed = true;
                    state.installable = false;
                    state.deferred = None;
                }
            }
            _ => {}
        }
    }

    /// Replay the captured prompt. The handle is single-use and is discarded
    /// regardless of outcome. Returns whether the user accepted, when the
    /// platform reports it synchronously.
    pub async fn trigger_install(&self) -> Result<Option<InstallOutcome>> {
        let prompt = {
            let mut state = self.state.lock().unwrap();
            let Some(prompt) = state.deferred.take() else {
                bail!("no install prompt available");
            };
            state.installable = false;
            prompt
        };
        self.publisher
            .emit(ShellEvent::InstallableChanged { installable: false });

        let outcome = self.prompter.present(&prompt).await?;
        if outcome == Some(InstallOutcome::Accepted) {
            let mut state = self.state.lock().unwrap();
            state.installed = true;
        }
        Ok(outcome)
    }
}

struct UpdateState {
    update_available: bool,
    waiting_version: Option<String>,
}

/// Observes the cache worker for a waiting generation and drives the
/// activate-and-reload flow.
pub struct UpdateAdvisor {
    worker: CacheWorkerHandle,
    state: StdMutex<UpdateState>,
    publisher: ShellPublisher,
}

impl UpdateAdvisor {
    pub fn new(worker: CacheWorkerHandle, publisher: ShellPublisher) -> Self {
        Self {
            worker,
            state: StdMutex::new(UpdateState {
                update_available: false,
                waiting_version: None,
            }),
            publisher,
        }
    }

    pub fn update_available(&self) -> bool {
        self.state.lock().unwrap().update_available
    }

    /// Watch worker events in a background task.
    pub fn spawn_observer(self: &Arc<Self>) {
        let advisor = self.clone();
        let mut events = self.worker.subscribe();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(WorkerEvent::UpdateWaiting { version }) => {
                        {
                            let mut state = advisor.state.lock().unwrap();
                            state.update_available = true;
                            state.waiting_version = Some(version.clone());
                        }
                        info!(version = %version, "update waiting");
                        advisor.publisher.emit(ShellEvent::UpdateAvailable { version });
                    }
                    Ok(WorkerEvent::ControllerChanged { version }) => {
                        let mut state = advisor.state.lock().unwrap();
                        state.update_available = false;
                        state.waiting_version = None;
                        drop(state);
                        debug!(version = %version, "generation took control");
                    }
                    Ok(WorkerEvent::InstallFailed { version }) => {
                        warn!(version = %version, "generation install failed");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(count)) => {
                        warn!(count, "update advisor lagged behind worker events");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    /// Activate the waiting generation and ask the shell to reload once the
    /// new generation has taken control.
    pub async fn trigger_update(&self) -> Result<()> {
        if !self.update_available() {
            bail!("no update waiting");
        }

        let mut events = self.worker.subscribe();
        self.worker.skip_waiting().await;

        let changed = tokio::time::timeout(ACTIVATION_TIMEOUT, async {
            loop {
                match events.recv().await {
                    Ok(WorkerEvent::ControllerChanged { version }) => break Some(version),
                    Ok(_) => continue,
                    Err(_) => break None,
                }
            }
        })
        .await;

        match changed {
            Ok(Some(version)) => {
                {
                    let mut state = self.state.lock().unwrap();
                    state.update_available = false;
                    state.waiting_version = None;
                }
                info!(version = %version, "update activated, requesting reload");
                self.publisher.emit(ShellEvent::ReloadRequested);
                Ok(())
            }
            _ => bail!("waiting generation did not activate"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snackshop_cache::{CacheStore, Fetch, FetchError, FetchRequest, FetchedResponse};
    use snackshop_cache::worker::WorkerConfig;

    struct StaticFetcher;

    impl Fetch for StaticFetcher {
        fn fetch<'a>(
            &'a self,
            _request: &'a FetchRequest,
        ) -> Pin<Box<dyn Future<Output = std::result::Result<FetchedResponse, FetchError>> + Send + 'a>>
        {
            Box::pin(async move {
                Ok(FetchedResponse {
                    status: 200,
                    headers: vec![],
                    body: b"shell".to_vec(),
                })
            })
        }
    }

    struct ScriptedPrompter {
        outcome: Option<InstallOutcome>,
    }

    impl InstallPrompter for ScriptedPrompter {
        fn present<'a>(
            &'a self,
            _prompt: &'a PromptHandle,
        ) -> Pin<Box<dyn Future<Output = Result<Option<InstallOutcome>>> + Send + 'a>> {
            Box::pin(async move { Ok(self.outcome) })
        }
    }

    fn prompt_signal(id: &str) -> PlatformSignal {
        PlatformSignal::InstallPromptAvailable {
            prompt: PromptHandle { id: id.into() },
        }
    }

    #[tokio::test]
    async fn install_prompt_is_single_use() {
        let publisher = ShellPublisher::new();
        let advisor = InstallAdvisor::new(
            Arc::new(ScriptedPrompter {
                outcome: Some(InstallOutcome::Accepted),
            }),
            publisher.clone(),
        );

        assert!(!advisor.installable());
        advisor.handle_signal(&prompt_signal("p1"));
        assert!(advisor.installable());

        let outcome = advisor.trigger_install().await.unwrap();
        assert_eq!(outcome, Some(InstallOutcome::Accepted));
        assert!(advisor.installed());
        assert!(!advisor.installable());

        // The handle was consumed; a second trigger has nothing to replay.
        assert!(advisor.trigger_install().await.is_err());
    }

    #[tokio::test]
    async fn dismissed_prompt_is_still_discarded() {
        let publisher = ShellPublisher::new();
        let advisor = InstallAdvisor::new(
            Arc::new(ScriptedPrompter {
                outcome: Some(InstallOutcome::Dismissed),
            }),
            publisher,
        );

        advisor.handle_signal(&prompt_signal("p1"));
        let outcome = advisor.trigger_install().await.unwrap();
        assert_eq!(outcome, Some(InstallOutcome::Dismissed));
        assert!(!advisor.installed());
        assert!(advisor.trigger_install().await.is_err());
    }

    #[tokio::test]
    async fn installed_signal_clears_installability() {
        let publisher = ShellPublisher::new();
        let mut rx = publisher.subscribe();
        let advisor = InstallAdvisor::new(
            Arc::new(ScriptedPrompter { outcome: None }),
            publisher,
        );

        advisor.handle_signal(&prompt_signal("p1"));
        advisor.handle_signal(&PlatformSignal::AppInstalled);
        assert!(advisor.installed());
        assert!(!advisor.installable());
        // A later prompt while installed is ignored.
        advisor.handle_signal(&prompt_signal("p2"));
        assert!(!advisor.installable());

        assert_eq!(
            rx.try_recv().unwrap(),
            ShellEvent::InstallableChanged { installable: true }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ShellEvent::InstallableChanged { installable: false }
        );
    }

    #[tokio::test]
    async fn standalone_display_mode_counts_as_installed() {
        let publisher = ShellPublisher::new();
        let advisor = InstallAdvisor::new(
            Arc::new(ScriptedPrompter { outcome: None }),
            publisher,
        );
        advisor.handle_signal(&PlatformSignal::DisplayMode { standalone: true });
        assert!(advisor.installed());
    }

    #[tokio::test]
    async fn update_advisor_drives_activate_and_reload() {
        let store = Arc::new(CacheStore::open_in_memory().unwrap());
        store.set_active_version("1.0.0").unwrap();

        let worker = CacheWorkerHandle::spawn(
            WorkerConfig {
                version: "2.0.0".into(),
                shell_resources: vec!["/".into()],
                base_url: url::Url::parse("https://shop.example").unwrap(),
            },
            store,
            Arc::new(StaticFetcher),
        );

        let publisher = ShellPublisher::new();
        let mut shell_rx = publisher.subscribe();
        let advisor = Arc::new(UpdateAdvisor::new(worker.clone(), publisher));
        advisor.spawn_observer();

        // Wait for the observer to pick up the waiting generation.
        for _ in 0..100 {
            if advisor.update_available() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(advisor.update_available());
        assert_eq!(
            shell_rx.recv().await.unwrap(),
            ShellEvent::UpdateAvailable {
                version: "2.0.0".into()
            }
        );

        advisor.trigger_update().await.unwrap();
        assert!(!advisor.update_available());
        assert_eq!(shell_rx.recv().await.unwrap(), ShellEvent::ReloadRequested);
        assert_eq!(worker.active_version().await.as_deref(), Some("2.0.0"));
    }

    #[tokio::test]
    async fn trigger_update_without_waiting_generation_fails() {
        let store = Arc::new(CacheStore::open_in_memory().unwrap());
        let worker = CacheWorkerHandle::spawn(
            WorkerConfig {
                version: "1.0.0".into(),
                shell_resources: vec![],
                base_url: url::Url::parse("https://shop.example").unwrap(),
            },
            store,
            Arc::new(StaticFetcher),
        );
        let advisor = Arc::new(UpdateAdvisor::new(worker, ShellPublisher::new()));
        assert!(advisor.trigger_update().await.is_err());
    }
}
