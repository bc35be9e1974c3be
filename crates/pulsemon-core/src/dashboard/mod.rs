// ── Polling data controller ──
//
// Owns the dashboard's data state, fetches on demand or on a timer,
// reacts to host visibility and connectivity, and reports everything it
// does on the event bus.

mod request;
mod state;

pub use request::Fetched;
pub use state::{DashboardState, ErrorInfo, StateChange, StatePatch};

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use pulsemon_api::{
    AnalyticsSnapshot, MetricsClient, RequestDetail, RequestQuery, RequestRecord, Resolution,
    StatsSnapshot,
};

use crate::bus::EventBus;
use crate::config::{DashboardConfig, DashboardConfigPatch};
use crate::error::CoreError;
use crate::event::{BusEvent, DataLoaded};
use crate::host::{Connectivity, HostSignals, PageVisibility};
use crate::source::MetricsSource;

use request::RequestGate;

/// What a call to [`PollingDataController::refresh`] ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    /// A load was already running; nothing was emitted.
    Skipped,
    /// A newer request cancelled this refresh before it completed.
    Superseded,
}

// ── Controller ───────────────────────────────────────────────────

/// Keeps a [`DashboardState`] synchronized with a [`MetricsSource`].
///
/// Cheaply cloneable via `Arc`. Construction spawns a task that reacts
/// to [`HostSignals`], so it must happen inside a Tokio runtime. Call
/// [`destroy()`](Self::destroy) to stop background work and emit the
/// teardown events. Background tasks only hold weak references, so
/// dropping the last handle also stops them, silently.
pub struct PollingDataController<S: MetricsSource = MetricsClient> {
    inner: Arc<ControllerInner<S>>,
}

impl<S: MetricsSource> Clone for PollingDataController<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ControllerInner<S> {
    source: S,
    bus: EventBus,
    host: HostSignals,
    config: ArcSwap<DashboardConfig>,
    state: Mutex<DashboardState>,
    requests: RequestGate,
    /// Token of the running auto-refresh task; replaced on every start.
    timer: Mutex<Option<CancellationToken>>,
    cancel: CancellationToken,
    destroyed: AtomicBool,
}

impl<S> Drop for ControllerInner<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<S: MetricsSource> PollingDataController<S> {
    pub fn new(
        source: S,
        config: DashboardConfig,
        bus: EventBus,
        host: HostSignals,
    ) -> Result<Self, CoreError> {
        config.validate()?;

        let visibility = host.watch_visibility();
        let connectivity = host.watch_connectivity();
        let controller = Self {
            inner: Arc::new(ControllerInner {
                source,
                bus,
                host,
                config: ArcSwap::from_pointee(config),
                state: Mutex::new(DashboardState::default()),
                requests: RequestGate::default(),
                timer: Mutex::new(None),
                cancel: CancellationToken::new(),
                destroyed: AtomicBool::new(false),
            }),
        };

        tokio::spawn(host_reaction_task(
            Arc::downgrade(&controller.inner),
            visibility,
            connectivity,
            controller.inner.cancel.clone(),
        ));

        Ok(controller)
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn host(&self) -> &HostSignals {
        &self.inner.host
    }

    /// Snapshot of the current data state.
    pub fn state(&self) -> DashboardState {
        self.lock_state().clone()
    }

    pub fn config(&self) -> DashboardConfig {
        DashboardConfig::clone(&self.inner.config.load())
    }

    pub fn is_loading(&self) -> bool {
        self.lock_state().is_loading
    }

    pub fn is_auto_refresh_enabled(&self) -> bool {
        self.lock_state().auto_refresh_enabled
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Startup sequence: initial load, then auto-refresh when configured.
    ///
    /// The timer is armed even if the first load fails, so the dashboard
    /// recovers on its own once the source is reachable again.
    pub async fn initialize(&self) -> Result<Fetched<()>, CoreError> {
        if self.is_destroyed() {
            return Ok(Fetched::Cancelled);
        }
        self.inner.bus.publish(BusEvent::DashboardInitializing);
        info!("initializing dashboard");

        let result = self.load_initial_data().await;

        let auto_refresh = self.inner.config.load().auto_refresh;
        if auto_refresh {
            self.start_auto_refresh();
        }
        self.inner.bus.publish(BusEvent::DashboardInitialized);
        result
    }

    /// Stop all background work, drop every bus listener, and reset state.
    ///
    /// `dashboard:destroyed` is published after the listeners are cleared,
    /// so only [`EventBus::tap`] receivers observe it. It is the last event
    /// the controller emits: loads still in flight resolve as cancelled
    /// without touching state or the bus. Idempotent.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("destroying dashboard controller");

        self.stop_auto_refresh();
        self.inner.requests.cancel_current();
        self.inner.cancel.cancel();
        self.inner.bus.clear(None);
        *self.lock_state() = DashboardState::default();
        self.inner.bus.publish(BusEvent::DashboardDestroyed);
    }

    // ── Loading ──────────────────────────────────────────────────

    /// Fetch stats and the first page of requests as one logical request
    /// and merge them into state.
    ///
    /// Not guarded against concurrent loads; see [`refresh()`](Self::refresh).
    /// Failures are recorded in `state.error` and published as `error`
    /// before being returned. Previously loaded data is kept.
    pub async fn load_initial_data(&self) -> Result<Fetched<()>, CoreError> {
        if self.is_destroyed() {
            return Ok(Fetched::Cancelled);
        }
        self.update_state(StatePatch::loading(true));
        self.load().await
    }

    /// Body of a load once `is_loading` has been set.
    async fn load(&self) -> Result<Fetched<()>, CoreError> {
        self.publish_live(BusEvent::LoadingStart);
        let _loading = LoadingGuard { controller: self };

        let config = self.inner.config.load_full();
        let query = RequestQuery::new(config.page_size, 0);
        let source = &self.inner.source;
        let fetched = self
            .guarded("initial-load", async {
                tokio::try_join!(
                    source.stats(&config.endpoints.stats),
                    source.requests(&config.endpoints.requests, &query),
                )
            })
            .await;

        if self.is_destroyed() {
            return Ok(Fetched::Cancelled);
        }

        match fetched {
            Ok(Fetched::Completed((stats, requests))) => {
                let loaded_at = Utc::now();
                debug!(
                    total_requests = stats.total_requests,
                    records = requests.len(),
                    "dashboard data loaded"
                );
                self.update_state(StatePatch {
                    stats: Some(stats.clone()),
                    requests: Some(requests.clone()),
                    last_update: Some(loaded_at),
                    error: Some(None),
                    ..StatePatch::default()
                });
                self.publish_live(BusEvent::DataLoaded(Box::new(DataLoaded {
                    stats,
                    requests,
                    loaded_at,
                })));
                Ok(Fetched::Completed(()))
            }
            Ok(Fetched::Cancelled) => Ok(Fetched::Cancelled),
            Err(e) => {
                warn!(error = %e, "failed to load dashboard data");
                let info = ErrorInfo::from(&e);
                self.update_state(StatePatch {
                    error: Some(Some(info.clone())),
                    ..StatePatch::default()
                });
                self.publish_live(BusEvent::Error(info));
                Err(e)
            }
        }
    }

    /// Reload unless a load is already in flight.
    ///
    /// Checking and setting `is_loading` happen under one lock, so
    /// concurrent callers (timer, host reactions, user) start at most one
    /// load between them.
    pub async fn refresh(&self) -> Result<RefreshOutcome, CoreError> {
        let Some(change) = self.claim_load() else {
            debug!("refresh skipped, load in progress or controller destroyed");
            return Ok(RefreshOutcome::Skipped);
        };

        self.publish_live(BusEvent::DashboardRefreshing);
        self.publish_live(BusEvent::StateUpdated(Box::new(change)));
        match self.load().await? {
            Fetched::Completed(()) => {
                let last_update = self.lock_state().last_update.unwrap_or_else(Utc::now);
                self.publish_live(BusEvent::DashboardRefreshed { last_update });
                Ok(RefreshOutcome::Refreshed)
            }
            Fetched::Cancelled => Ok(RefreshOutcome::Superseded),
        }
    }

    // ── Individual fetches ───────────────────────────────────────
    //
    // Each one is a logical request: it supersedes whatever is in flight.
    // Results are returned to the caller, never merged into state.

    pub async fn fetch_stats(&self) -> Result<Fetched<StatsSnapshot>, CoreError> {
        let config = self.inner.config.load_full();
        self.guarded("stats", self.inner.source.stats(&config.endpoints.stats))
            .await
    }

    pub async fn fetch_requests(
        &self,
        query: &RequestQuery,
    ) -> Result<Fetched<Vec<RequestRecord>>, CoreError> {
        let config = self.inner.config.load_full();
        self.guarded(
            "requests",
            self.inner.source.requests(&config.endpoints.requests, query),
        )
        .await
    }

    /// `Completed(None)` when the source has no request with that id.
    pub async fn fetch_request_detail(
        &self,
        id: i64,
    ) -> Result<Fetched<Option<RequestDetail>>, CoreError> {
        let config = self.inner.config.load_full();
        self.guarded(
            "request-detail",
            self.inner
                .source
                .request_detail(&config.endpoints.requests, id),
        )
        .await
    }

    pub async fn fetch_analytics(
        &self,
        resolution: Resolution,
    ) -> Result<Fetched<AnalyticsSnapshot>, CoreError> {
        let config = self.inner.config.load_full();
        self.guarded(
            "analytics",
            self.inner
                .source
                .analytics(&config.endpoints.analytics, resolution),
        )
        .await
    }

    // ── Auto-refresh ─────────────────────────────────────────────

    /// Arm the refresh timer at the configured interval, replacing any
    /// running one.
    pub fn start_auto_refresh(&self) {
        if self.is_destroyed() {
            debug!("auto-refresh not started, controller destroyed");
            return;
        }
        let interval_ms = self.inner.config.load().refresh_interval_ms;
        let token = self.inner.cancel.child_token();
        if let Some(previous) = self.lock_timer().replace(token.clone()) {
            previous.cancel();
        }

        tokio::spawn(auto_refresh_task(
            Arc::downgrade(&self.inner),
            Duration::from_millis(interval_ms),
            token,
        ));

        self.update_state(StatePatch::auto_refresh(true));
        self.inner
            .bus
            .publish(BusEvent::AutoRefreshStarted { interval_ms });
        info!(interval_ms, "auto-refresh started");
    }

    /// Disarm the refresh timer. Safe to call when none is running.
    pub fn stop_auto_refresh(&self) {
        if let Some(token) = self.lock_timer().take() {
            token.cancel();
        }
        self.update_state(StatePatch::auto_refresh(false));
        self.inner.bus.publish(BusEvent::AutoRefreshStopped);
        info!("auto-refresh stopped");
    }

    /// Returns the new enabled state.
    pub fn toggle_auto_refresh(&self) -> bool {
        if self.is_auto_refresh_enabled() {
            self.stop_auto_refresh();
            false
        } else {
            self.start_auto_refresh();
            true
        }
    }

    // ── Configuration ────────────────────────────────────────────

    /// Shallow-merge `patch` into the configuration.
    ///
    /// A running timer keeps its interval until it is restarted.
    pub fn update_config(&self, patch: DashboardConfigPatch) -> Result<DashboardConfig, CoreError> {
        let merged = self.inner.config.load().merged(patch);
        if let Err(e) = merged.validate() {
            warn!(error = %e, "rejected configuration update");
            return Err(e);
        }

        self.inner.config.store(Arc::new(merged.clone()));
        self.inner
            .bus
            .publish(BusEvent::ConfigUpdated(Box::new(merged.clone())));
        debug!(?merged, "configuration updated");
        Ok(merged)
    }

    // ── Host reactions ───────────────────────────────────────────

    // Catch-up refreshes are spawned so the reaction task keeps observing
    // signals while a slow fetch is in flight.

    fn on_visibility(&self, visibility: PageVisibility) {
        match visibility {
            PageVisibility::Hidden => {
                debug!("page hidden, pausing");
                self.inner.bus.publish(BusEvent::DashboardPaused);
            }
            PageVisibility::Visible => {
                debug!("page visible, resuming");
                self.inner.bus.publish(BusEvent::DashboardResumed);
                if self.is_auto_refresh_enabled() {
                    self.spawn_refresh("resume");
                }
            }
        }
    }

    fn on_connectivity(&self, connectivity: Connectivity) {
        match connectivity {
            Connectivity::Offline => {
                info!("connection lost");
                self.inner.bus.publish(BusEvent::ConnectionOffline);
                self.stop_auto_refresh();
            }
            Connectivity::Online => {
                info!("connection restored");
                self.inner.bus.publish(BusEvent::ConnectionOnline);
                let rearm = self.inner.config.load().auto_refresh;
                if rearm {
                    self.start_auto_refresh();
                    self.spawn_refresh("reconnect");
                }
            }
        }
    }

    // ── Private helpers ──────────────────────────────────────────

    /// Run `fut` as the controller's one outstanding logical request.
    async fn guarded<T, F>(&self, label: &'static str, fut: F) -> Result<Fetched<T>, CoreError>
    where
        T: Send,
        F: Future<Output = Result<T, pulsemon_api::Error>> + Send,
    {
        let (id, token) = self.inner.requests.begin(&self.inner.cancel);
        trace!(request = label, id, "request started");

        let outcome = tokio::select! {
            biased;
            () = token.cancelled() => None,
            result = fut => Some(result),
        };
        self.inner.requests.finish(id);

        match outcome {
            None => {
                debug!(request = label, id, "request superseded");
                Ok(Fetched::Cancelled)
            }
            Some(Ok(value)) => Ok(Fetched::Completed(value)),
            Some(Err(e)) => Err(e.into()),
        }
    }

    async fn refresh_logged(&self, reason: &'static str) {
        if let Err(e) = self.refresh().await {
            debug!(reason, error = %e, "refresh failed");
        }
    }

    fn spawn_refresh(&self, reason: &'static str) {
        let controller = self.clone();
        tokio::spawn(async move { controller.refresh_logged(reason).await });
    }

    fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    /// Publish unless the controller has been torn down.
    fn publish_live(&self, event: BusEvent) {
        if !self.is_destroyed() {
            self.inner.bus.publish(event);
        }
    }

    /// Set `is_loading` if it is clear. The returned change still has to
    /// be published.
    fn claim_load(&self) -> Option<StateChange> {
        if self.is_destroyed() {
            return None;
        }
        let mut state = self.lock_state();
        if state.is_loading {
            return None;
        }
        let previous = state.clone();
        let patch = StatePatch::loading(true);
        patch.apply_to(&mut state);
        Some(StateChange {
            previous,
            current: state.clone(),
            delta: patch,
        })
    }

    /// Apply `patch` and publish `state:updated` with both snapshots.
    /// A no-op once destroyed.
    fn update_state(&self, patch: StatePatch) {
        let change = {
            let mut state = self.lock_state();
            if self.is_destroyed() {
                return;
            }
            let previous = state.clone();
            patch.apply_to(&mut state);
            StateChange {
                previous,
                current: state.clone(),
                delta: patch,
            }
        };
        self.inner
            .bus
            .publish(BusEvent::StateUpdated(Box::new(change)));
    }

    fn lock_state(&self) -> MutexGuard<'_, DashboardState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_timer(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.inner
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Ends a load on every exit path, including the future being dropped.
struct LoadingGuard<'a, S: MetricsSource> {
    controller: &'a PollingDataController<S>,
}

impl<S: MetricsSource> Drop for LoadingGuard<'_, S> {
    fn drop(&mut self) {
        self.controller.update_state(StatePatch::loading(false));
        self.controller.publish_live(BusEvent::LoadingEnd);
    }
}

// ── Background tasks ─────────────────────────────────────────────

/// Refresh on every tick while the page is visible and auto-refresh is on.
async fn auto_refresh_task<S: MetricsSource>(
    controller: Weak<ControllerInner<S>>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let Some(controller) = upgrade(&controller) else {
                    break;
                };
                let visible = controller.inner.host.is_visible();
                let enabled = controller.is_auto_refresh_enabled();
                if visible && enabled {
                    controller.refresh_logged("timer").await;
                } else {
                    trace!(visible, enabled, "auto-refresh tick skipped");
                }
            }
        }
    }
    trace!("auto-refresh task stopped");
}

/// Translate host signal changes into pause/resume and offline/online.
async fn host_reaction_task<S: MetricsSource>(
    controller: Weak<ControllerInner<S>>,
    mut visibility: watch::Receiver<PageVisibility>,
    mut connectivity: watch::Receiver<Connectivity>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Ok(()) = visibility.changed() => {
                let value = *visibility.borrow_and_update();
                let Some(controller) = upgrade(&controller) else {
                    break;
                };
                controller.on_visibility(value);
            }
            Ok(()) = connectivity.changed() => {
                let value = *connectivity.borrow_and_update();
                let Some(controller) = upgrade(&controller) else {
                    break;
                };
                controller.on_connectivity(value);
            }
        }
    }
    trace!("host reaction task stopped");
}

fn upgrade<S: MetricsSource>(
    inner: &Weak<ControllerInner<S>>,
) -> Option<PollingDataController<S>> {
    inner.upgrade().map(|inner| PollingDataController { inner })
}
