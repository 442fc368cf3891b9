//! Scheduling and lifecycle management
//!
//! [`DnsManager`] owns everything that lives longer than a single update pass:
//! the shared IP source and its refresher, one polling task per domain, the
//! config-file watcher and the control panel.
//!
//! ## Generations
//!
//! Each configuration snapshot runs as one *generation*. A reload stops the
//! current generation (cancel, drain every task), waits a short grace delay
//! and starts a new one. Generations never overlap, so a domain is never
//! polled by two tasks at once.
//!
//! ```text
//! Uninitialized ──run()──▶ Running ──stop()──▶ Stopped
//!                            │  ▲
//!                     reload │  │ new generation
//!                            ▼  │
//!                     stop gen + grace
//! ```

mod watcher;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout, timeout_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Domain, Settings};
use crate::dns::DnsResolver;
use crate::engine::{DdnsEngine, EngineEvent, PassOutcome};
use crate::error::{Disposition, Error, Result};
use crate::http::build_client;
use crate::ip::IpHelper;
use crate::notification::NotificationManager;
use crate::registry::ProviderRegistry;
use crate::traits::{ControlPanel, IpSource, Notifier, PanelContext, RecordLookup};
use crate::webhook::Webhook;

pub use watcher::ConfigWatcher;

/// Pause between stopping one generation and starting the next.
pub const DEFAULT_RESTART_GRACE: Duration = Duration::from_millis(200);

/// How long a stopping generation waits for a domain task before aborting it.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a stopping generation waits for the control panel.
pub const PANEL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle state of a [`DnsManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Uninitialized,
    Running,
    Stopped,
}

/// Requests a restart of a running manager with new settings
#[derive(Clone)]
pub struct ReloadHandle {
    tx: mpsc::UnboundedSender<Settings>,
}

impl ReloadHandle {
    /// Validate `settings` and queue them for the next generation.
    pub fn request(&self, settings: Settings) -> Result<()> {
        settings.validate()?;
        self.tx
            .send(settings)
            .map_err(|_| Error::config("manager is no longer accepting reloads"))
    }
}

/// Builder for [`DnsManager`]
pub struct DnsManagerBuilder {
    settings: Settings,
    registry: Arc<ProviderRegistry>,
    ip_source: Option<Arc<dyn IpSource>>,
    lookup: Option<Arc<dyn RecordLookup>>,
    notifier: Option<Arc<dyn Notifier>>,
    panel: Option<Arc<dyn ControlPanel>>,
    config_path: Option<PathBuf>,
    event_tx: Option<mpsc::Sender<EngineEvent>>,
    restart_grace: Duration,
    drain_timeout: Duration,
}

impl DnsManagerBuilder {
    /// Use `source` instead of an [`IpHelper`] built from the settings
    pub fn ip_source(mut self, source: Arc<dyn IpSource>) -> Self {
        self.ip_source = Some(source);
        self
    }

    /// Use `lookup` instead of [`DnsResolver`]
    pub fn record_lookup(mut self, lookup: Arc<dyn RecordLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Use `notifier` instead of the channels configured in the settings
    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn control_panel(mut self, panel: Arc<dyn ControlPanel>) -> Self {
        self.panel = Some(panel);
        self
    }

    /// Watch this file and reload when it changes
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn events(mut self, tx: mpsc::Sender<EngineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn restart_grace(mut self, grace: Duration) -> Self {
        self.restart_grace = grace;
        self
    }

    pub fn drain_timeout(mut self, drain: Duration) -> Self {
        self.drain_timeout = drain;
        self
    }

    pub fn build(self) -> Result<Arc<DnsManager>> {
        self.settings.validate()?;
        if !self.registry.has_provider(&self.settings.provider) {
            return Err(Error::config(format!(
                "Unknown provider type: {}",
                self.settings.provider
            )));
        }

        let ip_source = match self.ip_source {
            Some(source) => source,
            None => Arc::new(IpHelper::new(&self.settings)?),
        };
        let lookup = self.lookup.unwrap_or_else(|| Arc::new(DnsResolver::new()));
        let (reload_tx, reload_rx) = mpsc::unbounded_channel();

        Ok(Arc::new(DnsManager {
            settings: RwLock::new(Arc::new(self.settings)),
            registry: self.registry,
            ip_source,
            lookup,
            notifier: self.notifier,
            panel: self.panel,
            config_path: self.config_path,
            event_tx: self.event_tx,
            restart_grace: self.restart_grace,
            drain_timeout: self.drain_timeout,
            state: RwLock::new(ManagerState::Uninitialized),
            generation: AtomicU64::new(0),
            active_tasks: Arc::new(AtomicUsize::new(0)),
            shutdown: CancellationToken::new(),
            reload_tx,
            reload_rx: Mutex::new(reload_rx),
            started_at: Utc::now(),
        }))
    }
}

/// Periodic scheduler and lifecycle owner
pub struct DnsManager {
    settings: RwLock<Arc<Settings>>,
    registry: Arc<ProviderRegistry>,
    ip_source: Arc<dyn IpSource>,
    lookup: Arc<dyn RecordLookup>,
    notifier: Option<Arc<dyn Notifier>>,
    panel: Option<Arc<dyn ControlPanel>>,
    config_path: Option<PathBuf>,
    event_tx: Option<mpsc::Sender<EngineEvent>>,
    restart_grace: Duration,
    drain_timeout: Duration,

    state: RwLock<ManagerState>,
    generation: AtomicU64,
    active_tasks: Arc<AtomicUsize>,
    shutdown: CancellationToken,
    reload_tx: mpsc::UnboundedSender<Settings>,
    reload_rx: Mutex<mpsc::UnboundedReceiver<Settings>>,
    started_at: DateTime<Utc>,
}

/// One running configuration snapshot
struct Generation {
    id: u64,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
    watcher: Option<ConfigWatcher>,
    panel: Option<JoinHandle<()>>,
}

impl Generation {
    async fn stop(self, drain_timeout: Duration) {
        debug!("Stopping generation {}", self.id);
        self.cancel.cancel();
        drop(self.watcher);

        if let Some(mut panel) = self.panel {
            if timeout(PANEL_SHUTDOWN_TIMEOUT, &mut panel).await.is_err() {
                warn!("Control panel did not stop within {:?}, aborting", PANEL_SHUTDOWN_TIMEOUT);
                panel.abort();
                let _ = panel.await;
            }
        }

        // Tasks drain in parallel against one shared deadline.
        let deadline = Instant::now() + drain_timeout;
        for mut task in self.tasks {
            if timeout_at(deadline, &mut task).await.is_err() {
                warn!("Domain task did not stop within {:?}, aborting", drain_timeout);
                task.abort();
                let _ = task.await;
            }
        }
        info!("Generation {} stopped", self.id);
    }
}

/// Decrements the live task counter however the task ends.
struct TaskGuard(Arc<AtomicUsize>);

impl TaskGuard {
    fn new(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl DnsManager {
    pub fn builder(settings: Settings, registry: Arc<ProviderRegistry>) -> DnsManagerBuilder {
        DnsManagerBuilder {
            settings,
            registry,
            ip_source: None,
            lookup: None,
            notifier: None,
            panel: None,
            config_path: None,
            event_tx: None,
            restart_grace: DEFAULT_RESTART_GRACE,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn state(&self) -> ManagerState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of generations started so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Domain polling tasks currently alive
    pub fn active_tasks(&self) -> usize {
        self.active_tasks.load(Ordering::SeqCst)
    }

    /// Settings of the running (or last started) generation
    pub fn settings(&self) -> Arc<Settings> {
        self.settings.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn ip_source(&self) -> Arc<dyn IpSource> {
        self.ip_source.clone()
    }

    pub fn reload_handle(&self) -> ReloadHandle {
        ReloadHandle {
            tx: self.reload_tx.clone(),
        }
    }

    /// Queue new settings; the running manager restarts with them.
    pub fn reload(&self, settings: Settings) -> Result<()> {
        self.reload_handle().request(settings)
    }

    /// Ask a running manager to stop. `run` returns once everything drained.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    fn set_state(&self, state: ManagerState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    /// A manager runs once, in one mode; anything else is a state error.
    fn enter_running(&self) -> Result<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if *state != ManagerState::Uninitialized {
            return Err(Error::State(format!("cannot start from {:?}", *state)));
        }
        *state = ManagerState::Running;
        Ok(())
    }

    fn check_reload(&self, next: &Settings) -> Result<()> {
        next.validate()?;
        if !self.registry.has_provider(&next.provider) {
            return Err(Error::config(format!("Unknown provider type: {}", next.provider)));
        }
        Ok(())
    }

    fn unchanged(&self, next: &Settings) -> bool {
        let current = self.settings();
        match (serde_json::to_value(next), serde_json::to_value(&*current)) {
            (Ok(a), Ok(b)) => a == b,
            _ => false,
        }
    }

    async fn build_engine(&self, settings: Arc<Settings>) -> Result<Arc<DdnsEngine>> {
        let provider = self.registry.create_provider(&settings)?;
        let client = build_client(&settings)?;
        let notifier: Arc<dyn Notifier> = match &self.notifier {
            Some(notifier) => notifier.clone(),
            None => Arc::new(NotificationManager::from_settings(&settings, client.clone())),
        };
        let webhook = Webhook::new(&settings.webhook, settings.ip_type, client);

        self.ip_source.update_configuration(&settings).await;

        let mut engine = DdnsEngine::new(
            settings,
            self.ip_source.clone(),
            self.lookup.clone(),
            provider,
            notifier,
        )
        .with_webhook(webhook);
        if let Some(tx) = &self.event_tx {
            engine = engine.with_events(tx.clone());
        }
        Ok(Arc::new(engine))
    }

    async fn start_generation(&self, settings: Arc<Settings>) -> Result<Generation> {
        let engine = self.build_engine(settings.clone()).await?;
        let id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = self.shutdown.child_token();
        let interval = Duration::from_secs(settings.interval);

        let tasks = settings
            .domains
            .iter()
            .cloned()
            .map(|domain| {
                let guard = TaskGuard::new(&self.active_tasks);
                tokio::spawn(domain_loop(
                    engine.clone(),
                    domain,
                    interval,
                    cancel.clone(),
                    guard,
                ))
            })
            .collect();

        let watcher = match &self.config_path {
            Some(path) => match ConfigWatcher::spawn(path, self.reload_handle(), cancel.clone()) {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    warn!("Config file will not be watched: {}", e);
                    None
                }
            },
            None => None,
        };

        let panel = match (&self.panel, settings.web_panel.enabled) {
            (Some(panel), true) => {
                let panel = panel.clone();
                let ctx = PanelContext {
                    settings: settings.clone(),
                    config_path: self.config_path.clone(),
                    ip_source: self.ip_source.clone(),
                    reload: self.reload_handle(),
                    started_at: self.started_at,
                };
                let panel_cancel = cancel.clone();
                Some(tokio::spawn(async move {
                    if let Err(e) = panel.serve(ctx, panel_cancel).await {
                        error!("Control panel stopped: {}", e);
                    }
                }))
            }
            _ => None,
        };

        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings.clone();
        info!(
            "Generation {} started: {} domain(s), every {}s",
            id,
            settings.domains.len(),
            settings.interval
        );

        Ok(Generation {
            id,
            cancel,
            tasks,
            watcher,
            panel,
        })
    }

    /// Poll every domain until [`DnsManager::stop`] is called
    ///
    /// Starts the IP refresher and the first generation, then restarts the
    /// generation for every accepted reload request.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Clean shutdown
    /// - `Err(Error)`: The first generation could not start (e.g. unknown
    ///   provider), or the manager was already started
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        self.enter_running()?;

        let refresh_cancel = self.shutdown.child_token();
        let refresher = self.ip_source.clone().start_refresh(refresh_cancel.clone());

        let result = self.supervise().await;

        refresh_cancel.cancel();
        if let Some(mut refresher) = refresher {
            if timeout(self.drain_timeout, &mut refresher).await.is_err() {
                refresher.abort();
            }
        }
        self.set_state(ManagerState::Stopped);
        info!("DNS manager stopped");
        result
    }

    async fn supervise(self: &Arc<Self>) -> Result<()> {
        let mut reload_rx = self.reload_rx.lock().await;
        let mut generation = self.start_generation(self.settings()).await?;

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                Some(next) = reload_rx.recv() => {
                    if let Err(e) = self.check_reload(&next) {
                        error!("Reload rejected, keeping current configuration: {}", e);
                        continue;
                    }
                    if self.unchanged(&next) {
                        debug!("Configuration unchanged, ignoring reload");
                        continue;
                    }

                    info!("Configuration changed, restarting");
                    let previous = self.settings();
                    generation.stop(self.drain_timeout).await;
                    tokio::time::sleep(self.restart_grace).await;

                    generation = match self.start_generation(Arc::new(next)).await {
                        Ok(generation) => generation,
                        Err(e) => {
                            error!("New configuration failed to start ({}), restoring previous", e);
                            self.start_generation(previous).await?
                        }
                    };
                }
            }
        }

        generation.stop(self.drain_timeout).await;
        Ok(())
    }

    /// One pass per domain, then stop
    ///
    /// Every domain is attempted exactly once even when an earlier one fails.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: Every domain completed its pass
    /// - `Err(Error::DomainsFailed)`: Names of the domains whose pass failed
    /// - `Err(Error)`: The engine could not be built
    pub async fn run_once(&self) -> Result<()> {
        self.enter_running()?;

        let mut settings = (*self.settings()).clone();
        settings.run_once = true;
        let settings = Arc::new(settings);
        let engine = match self.build_engine(settings.clone()).await {
            Ok(engine) => engine,
            Err(e) => {
                self.set_state(ManagerState::Stopped);
                return Err(e);
            }
        };

        let mut failed = Vec::new();
        for domain in &settings.domains {
            match engine.update_ip(domain).await {
                Ok(outcome) => log_outcome(&domain.domain_name, &outcome),
                Err(e) => {
                    error!("{}: {}", domain.domain_name, e);
                    failed.push(domain.domain_name.clone());
                }
            }
        }

        self.set_state(ManagerState::Stopped);
        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::DomainsFailed(failed))
        }
    }
}

fn log_outcome(domain: &str, outcome: &PassOutcome) {
    match outcome {
        PassOutcome::Applied { updated } if !updated.is_empty() => {
            info!("{}: updated {}", domain, updated.join(", "))
        }
        PassOutcome::Applied { .. } | PassOutcome::Unchanged => debug!("{}: up to date", domain),
        PassOutcome::NoAddress => debug!("{}: no address this tick", domain),
    }
}

async fn domain_loop(
    engine: Arc<DdnsEngine>,
    domain: Domain,
    interval: Duration,
    cancel: CancellationToken,
    _guard: TaskGuard,
) {
    debug!("Polling {} every {:?}", domain.domain_name, interval);
    loop {
        if cancel.is_cancelled() {
            break;
        }

        match engine.update_ip(&domain).await {
            Ok(outcome) => log_outcome(&domain.domain_name, &outcome),
            Err(e) => match e.disposition(engine.mode()) {
                Disposition::AbortProcess => {
                    error!("{}: {}; stopping this domain", domain.domain_name, e);
                    break;
                }
                _ => debug!("{}: tick abandoned", domain.domain_name),
            },
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    debug!("Stopped polling {}", domain.domain_name);
}
