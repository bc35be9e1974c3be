// ── Bus event vocabulary ──
//
// Every event the controller and the preference manager publish. Payloads
// are owned snapshots; listeners never see internal mutable state.

use chrono::{DateTime, Utc};
use serde::Serialize;

use pulsemon_api::{RequestRecord, StatsSnapshot};

use crate::config::DashboardConfig;
use crate::dashboard::{ErrorInfo, StateChange};
use crate::theme::{ColorMode, SchemeDescriptor, ThemeState};

/// Name of an event, as subscribers register for it.
///
/// Displays and parses as the colon-separated wire name
/// (`"data:loaded"`, `"theme:changed"`, ...).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
pub enum EventKind {
    // ── Dashboard lifecycle ──
    #[strum(serialize = "dashboard:initializing")]
    DashboardInitializing,
    #[strum(serialize = "dashboard:initialized")]
    DashboardInitialized,
    #[strum(serialize = "dashboard:refreshing")]
    DashboardRefreshing,
    #[strum(serialize = "dashboard:refreshed")]
    DashboardRefreshed,
    #[strum(serialize = "dashboard:paused")]
    DashboardPaused,
    #[strum(serialize = "dashboard:resumed")]
    DashboardResumed,
    #[strum(serialize = "dashboard:destroyed")]
    DashboardDestroyed,

    // ── Data ──
    #[strum(serialize = "loading:start")]
    LoadingStart,
    #[strum(serialize = "loading:end")]
    LoadingEnd,
    #[strum(serialize = "data:loaded")]
    DataLoaded,
    #[strum(serialize = "error")]
    Error,
    #[strum(serialize = "state:updated")]
    StateUpdated,
    #[strum(serialize = "config:updated")]
    ConfigUpdated,
    #[strum(serialize = "autorefresh:started")]
    AutoRefreshStarted,
    #[strum(serialize = "autorefresh:stopped")]
    AutoRefreshStopped,
    #[strum(serialize = "connection:online")]
    ConnectionOnline,
    #[strum(serialize = "connection:offline")]
    ConnectionOffline,

    // ── Theme ──
    #[strum(serialize = "theme:initialized")]
    ThemeInitialized,
    #[strum(serialize = "theme:changed")]
    ThemeChanged,
    #[strum(serialize = "theme:reset")]
    ThemeReset,
    #[strum(serialize = "theme:destroyed")]
    ThemeDestroyed,
    #[strum(serialize = "mode:changed")]
    ModeChanged,
    #[strum(serialize = "scheme:changed")]
    SchemeChanged,
    #[strum(serialize = "scheme:registered")]
    SchemeRegistered,
    #[strum(serialize = "system:changed")]
    SystemChanged,
}

impl EventKind {
    /// Wire name of the event.
    pub fn as_str(self) -> &'static str {
        self.into()
    }

    /// Events published by the preference manager.
    pub fn is_theme(self) -> bool {
        matches!(
            self,
            Self::ThemeInitialized
                | Self::ThemeChanged
                | Self::ThemeReset
                | Self::ThemeDestroyed
                | Self::ModeChanged
                | Self::SchemeChanged
                | Self::SchemeRegistered
                | Self::SystemChanged
        )
    }
}

/// Payload of `data:loaded`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataLoaded {
    pub stats: StatsSnapshot,
    pub requests: Vec<RequestRecord>,
    pub loaded_at: DateTime<Utc>,
}

/// An event published on the [`EventBus`](crate::EventBus).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "payload")]
pub enum BusEvent {
    DashboardInitializing,
    DashboardInitialized,
    DashboardRefreshing,
    DashboardRefreshed { last_update: DateTime<Utc> },
    DashboardPaused,
    DashboardResumed,
    DashboardDestroyed,

    LoadingStart,
    LoadingEnd,
    DataLoaded(Box<DataLoaded>),
    Error(ErrorInfo),
    StateUpdated(Box<StateChange>),
    ConfigUpdated(Box<DashboardConfig>),
    AutoRefreshStarted { interval_ms: u64 },
    AutoRefreshStopped,
    ConnectionOnline,
    ConnectionOffline,

    ThemeInitialized(Box<ThemeState>),
    ThemeChanged(Box<ThemeState>),
    ThemeReset(Box<ThemeState>),
    ThemeDestroyed,
    ModeChanged { previous: ColorMode, current: ColorMode },
    SchemeChanged { previous: String, current: String },
    SchemeRegistered { key: String, descriptor: SchemeDescriptor },
    SystemChanged { mode: ColorMode },
}

impl BusEvent {
    /// The name listeners subscribe under.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::DashboardInitializing => EventKind::DashboardInitializing,
            Self::DashboardInitialized => EventKind::DashboardInitialized,
            Self::DashboardRefreshing => EventKind::DashboardRefreshing,
            Self::DashboardRefreshed { .. } => EventKind::DashboardRefreshed,
            Self::DashboardPaused => EventKind::DashboardPaused,
            Self::DashboardResumed => EventKind::DashboardResumed,
            Self::DashboardDestroyed => EventKind::DashboardDestroyed,
            Self::LoadingStart => EventKind::LoadingStart,
            Self::LoadingEnd => EventKind::LoadingEnd,
            Self::DataLoaded(_) => EventKind::DataLoaded,
            Self::Error(_) => EventKind::Error,
            Self::StateUpdated(_) => EventKind::StateUpdated,
            Self::ConfigUpdated(_) => EventKind::ConfigUpdated,
            Self::AutoRefreshStarted { .. } => EventKind::AutoRefreshStarted,
            Self::AutoRefreshStopped => EventKind::AutoRefreshStopped,
            Self::ConnectionOnline => EventKind::ConnectionOnline,
            Self::ConnectionOffline => EventKind::ConnectionOffline,
            Self::ThemeInitialized(_) => EventKind::ThemeInitialized,
            Self::ThemeChanged(_) => EventKind::ThemeChanged,
            Self::ThemeReset(_) => EventKind::ThemeReset,
            Self::ThemeDestroyed => EventKind::ThemeDestroyed,
            Self::ModeChanged { .. } => EventKind::ModeChanged,
            Self::SchemeChanged { .. } => EventKind::SchemeChanged,
            Self::SchemeRegistered { .. } => EventKind::SchemeRegistered,
            Self::SystemChanged { .. } => EventKind::SystemChanged,
        }
    }
}
