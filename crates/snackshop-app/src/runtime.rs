//! Runtime wiring: cache worker, realtime channel, notification pipeline,
//! advisors, and the platform signal pump.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use snackshop_cache::worker::WorkerConfig;
use snackshop_cache::{CacheStore, CacheWorkerHandle, HttpFetcher};
use snackshop_notify::push::handle_push_message;
use snackshop_notify::{
    AlertSink, HttpNotificationApi, NotificationDispatcher, NotificationStore, RetryPolicy,
    ShellAlertSink,
};
use snackshop_realtime::{SocketClient, SocketClientConfig};
use snackshop_shared::api::NotificationFilter;
use snackshop_shared::schemas::{PlatformSignal, ShellEvent};
use snackshop_shared::socket_protocol::{EVENT_NEW_NOTIFICATION, EVENT_NOTIFICATION};

use crate::advisor::{InstallAdvisor, ShellPrompter, UpdateAdvisor};
use crate::config::Configuration;
use crate::shell::{ConnectivityTracker, ShellPublisher};

/// Run the client runtime until a shutdown signal arrives.
pub async fn run_app(config: Configuration) -> anyhow::Result<()> {
    info!(
        api_url = %config.api_url,
        origin = %config.origin_url,
        version = %config.generation_version,
        "starting snackshop client runtime"
    );

    let publisher = ShellPublisher::new();

    // --- Cache worker: sole owner of generation state ---
    let cache_store = Arc::new(CacheStore::open(&config.cache_db_path)?);
    let fetcher = Arc::new(HttpFetcher::new()?);
    let worker = CacheWorkerHandle::spawn(
        WorkerConfig {
            version: config.generation_version.clone(),
            shell_resources: config.shell_resources(),
            base_url: url::Url::parse(&config.origin_url)?,
        },
        cache_store,
        fetcher,
    );

    // --- Notification pipeline ---
    let sink = Arc::new(ShellAlertSink::new(
        publisher.sender(),
        config.badge_available,
    ));
    let backend = Arc::new(HttpNotificationApi::new(
        &config.api_url,
        &config.auth_token,
    )?);
    let store = Arc::new(NotificationStore::new(backend, RetryPolicy::default()));
    let dispatcher = Arc::new(NotificationDispatcher::new(store.clone(), sink.clone()));
    let pump = dispatcher.spawn_pump();

    // --- Realtime channel ---
    let socket = Arc::new(SocketClient::new(SocketClientConfig::new(
        &config.origin_url,
        &config.auth_token,
    )));
    for event in [EVENT_NEW_NOTIFICATION, EVENT_NOTIFICATION] {
        let tx = pump.clone();
        socket
            .on(event, move |data| {
                let _ = tx.send(data);
            })
            .await;
    }

    let connectivity = Arc::new(ConnectivityTracker::new(publisher.clone()));
    {
        let up = connectivity.clone();
        socket.on_connect(move || up.set_online(true)).await;
        let down = connectivity.clone();
        socket.on_disconnect(move || down.set_online(false)).await;
    }
    socket.connect().await;

    // Room membership does not survive reconnects: re-join on every
    // connected signal and reload anything missed while disconnected.
    if let Some(user_id) = config.user_id.clone() {
        let socket_for_join = socket.clone();
        let store_for_join = store.clone();
        tokio::spawn(async move {
            let signal = socket_for_join.connected_signal();
            loop {
                signal.notified().await;
                socket_for_join.join_user_room(&user_id).await;
                store_for_join
                    .load_all(&NotificationFilter::default())
                    .await;
            }
        });
    } else {
        debug!("no signed-in user, skipping room membership");
    }

    // Initial load with its own retry policy; gives up silently offline.
    {
        let store_for_load = store.clone();
        let sink_for_load = sink.clone();
        tokio::spawn(async move {
            if store_for_load.load_all(&NotificationFilter::default()).await {
                let _ = sink_for_load
                    .set_badge(store_for_load.unread_count())
                    .await;
            }
        });
    }

    // --- Advisors ---
    let install_advisor = Arc::new(InstallAdvisor::new(
        Arc::new(ShellPrompter::new(publisher.clone())),
        publisher.clone(),
    ));
    let update_advisor = Arc::new(UpdateAdvisor::new(worker.clone(), publisher.clone()));
    update_advisor.spawn_observer();

    // --- Platform signal pump ---
    let (signal_tx, signal_rx) = mpsc::unbounded_channel::<PlatformSignal>();
    spawn_signal_pump(
        signal_rx,
        install_advisor.clone(),
        dispatcher.clone(),
        sink.clone(),
        connectivity.clone(),
        publisher.clone(),
    );
    // The shell side would hold `signal_tx`; keep it alive for the session.
    let _signal_tx = signal_tx;

    // --- Shutdown ---
    shutdown_signal().await;
    info!("shutting down");

    if let Some(user_id) = config.user_id.as_deref() {
        socket.leave_user_room(user_id).await;
    }
    socket.teardown().await;
    worker.shutdown().await;

    info!("snackshop client runtime stopped");
    Ok(())
}

fn spawn_signal_pump(
    mut signals: mpsc::UnboundedReceiver<PlatformSignal>,
    install_advisor: Arc<InstallAdvisor>,
    dispatcher: Arc<NotificationDispatcher>,
    sink: Arc<ShellAlertSink>,
    connectivity: Arc<ConnectivityTracker>,
    publisher: ShellPublisher,
) {
    tokio::spawn(async move {
        while let Some(signal) = signals.recv().await {
            match &signal {
                PlatformSignal::InstallPromptAvailable { .. }
                | PlatformSignal::AppInstalled
                | PlatformSignal::DisplayMode { .. } => {
                    install_advisor.handle_signal(&signal);
                }
                PlatformSignal::ControllerChanged => {
                    debug!("controller changed signal from shell");
                }
                PlatformSignal::PushMessage { payload } => {
                    handle_push_message(&dispatcher, payload).await;
                }
                PlatformSignal::NotificationClicked { tag, link } => {
                    debug!(tag = %tag, "notification clicked");
                    publisher.emit(ShellEvent::Navigate {
                        url: link.clone().unwrap_or_else(|| "/".into()),
                    });
                }
                PlatformSignal::ConnectivityChanged { online } => {
                    connectivity.set_online(*online);
                }
                PlatformSignal::PermissionChanged { state } => {
                    sink.set_permission(*state);
                }
            }
        }
    });
}

/// Print configuration and cache diagnostics.
pub async fn run_doctor(config: Configuration) -> anyhow::Result<()> {
    println!("snackshop doctor");
    println!("  api url:     {}", config.api_url);
    println!("  origin:      {}", config.origin_url);
    println!("  home dir:    {}", config.home_dir.display());
    println!("  generation:  {}", config.generation_version);
    println!(
        "  user:        {}",
        config.user_id.as_deref().unwrap_or("(not signed in)")
    );

    match CacheStore::open(&config.cache_db_path) {
        Ok(store) => {
            println!(
                "  active gen:  {}",
                store.active_version().unwrap_or_else(|| "(none)".into())
            );
            let names = store.partition_names();
            if names.is_empty() {
                println!("  partitions:  (empty)");
            }
            for name in names {
                println!("  partition:   {name} ({} entries)", store.entry_count(&name));
            }
        }
        Err(e) => warn!(error = %e, "cache database unavailable"),
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
