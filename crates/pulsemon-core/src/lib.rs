//! State-synchronization layer between `pulsemon-api` and a dashboard view.
//!
//! Three components, wired together only through an explicitly shared
//! [`EventBus`]:
//!
//! - **[`EventBus`]**: synchronous in-process publish/subscribe keyed by
//!   [`EventKind`], with priority ordering, one-shot listeners, and a
//!   broadcast [`tap()`](EventBus::tap) that observes every event.
//!
//! - **[`PollingDataController`]**: owns the [`DashboardState`]. Loads stats
//!   and recent requests from a [`MetricsSource`], keeps at most one logical
//!   request in flight (newer requests cancel older ones), and runs a
//!   visibility-aware auto-refresh timer driven by [`HostSignals`].
//!
//! - **[`PreferenceManager`]**: owns the light/dark mode and color scheme,
//!   persisted through a [`PreferenceStore`] and reconciled against the
//!   host's system color mode.
//!
//! Background work runs on Tokio; bus dispatch and state mutation are
//! synchronous and never hold a lock while a listener runs.

pub mod bus;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod event;
pub mod host;
pub mod source;
pub mod theme;

// ── Primary re-exports ──────────────────────────────────────────────
pub use bus::{EventBus, Listener, SubscribeOptions, Subscription, listener};
pub use config::{DashboardConfig, DashboardConfigPatch, PreferenceOptions};
pub use dashboard::{
    DashboardState, ErrorInfo, Fetched, PollingDataController, RefreshOutcome, StateChange,
    StatePatch,
};
pub use error::{CoreError, ListenerError, StorageError};
pub use event::{BusEvent, DataLoaded, EventKind};
pub use host::{Connectivity, HostSignals, PageVisibility};
pub use source::MetricsSource;
pub use theme::{
    ColorMode, FileStore, MemoryStore, PersistedPreference, PreferenceManager, PreferenceStore,
    SchemeDescriptor, SchemeRegistry, ThemeCombination, ThemeSettings, ThemeState,
};
