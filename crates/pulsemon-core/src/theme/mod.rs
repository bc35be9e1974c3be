// ── Persisted display preferences ──
//
// Light/dark mode plus a color scheme, hydrated from a preference store,
// reconciled against the host's system setting, and announced on the
// event bus.

mod registry;
mod storage;

pub use registry::{
    ColorMode, SETTINGS_VERSION, SchemeDescriptor, SchemeRegistry, ThemeCombination,
    ThemeSettings, ThemeState,
};
pub use storage::{FileStore, MemoryStore, PersistedPreference, PreferenceStore};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use chrono::Utc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::bus::EventBus;
use crate::config::{DEFAULT_SCHEME, PreferenceOptions};
use crate::error::{CoreError, StorageError};
use crate::event::{BusEvent, EventKind};
use crate::host::HostSignals;

/// Owns the user's theme choice.
///
/// Cheaply cloneable via `Arc`. When constructed inside a Tokio runtime it
/// follows the host's system color mode until the user picks one
/// explicitly; otherwise feed changes in through
/// [`handle_system_change()`](Self::handle_system_change). The listener
/// task holds a weak reference and ends when the last handle is dropped.
#[derive(Clone)]
pub struct PreferenceManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    options: PreferenceOptions,
    bus: EventBus,
    store: Arc<dyn PreferenceStore>,
    prefs: Mutex<Preferences>,
    cancel: CancellationToken,
    destroyed: AtomicBool,
}

impl Drop for ManagerInner {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Preferences {
    mode: ColorMode,
    scheme: String,
    system_preference: ColorMode,
    initialized: bool,
    /// The user chose mode or scheme themselves; system changes no longer
    /// override the mode.
    explicit: bool,
    registry: SchemeRegistry,
}

impl Preferences {
    fn snapshot(&self) -> ThemeState {
        ThemeState {
            mode: self.mode,
            scheme: self.scheme.clone(),
            scheme_data: self.registry.get(&self.scheme).cloned(),
            system_preference: self.system_preference,
            initialized: self.initialized,
            available: self.registry.keys().map(str::to_owned).collect(),
            combinations: self.registry.combinations(),
        }
    }

    fn record(&self) -> PersistedPreference {
        PersistedPreference {
            mode: self.mode,
            scheme: self.scheme.clone(),
            timestamp: Utc::now(),
            explicit: self.explicit,
        }
    }
}

impl std::fmt::Debug for PreferenceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefs = self.lock();
        f.debug_struct("PreferenceManager")
            .field("mode", &prefs.mode)
            .field("scheme", &prefs.scheme)
            .field("explicit", &prefs.explicit)
            .finish_non_exhaustive()
    }
}

impl PreferenceManager {
    /// Hydrate from `store`, apply, and publish `theme:initialized`.
    ///
    /// Storage failures fall back to defaults; construction never fails.
    pub fn new(
        mut options: PreferenceOptions,
        bus: EventBus,
        store: Arc<dyn PreferenceStore>,
        host: &HostSignals,
    ) -> Self {
        let registry = SchemeRegistry::builtin();
        if !registry.contains(&options.default_scheme) {
            warn!(
                scheme = %options.default_scheme,
                "default scheme is not registered, using '{DEFAULT_SCHEME}'"
            );
            DEFAULT_SCHEME.clone_into(&mut options.default_scheme);
        }

        let system_preference = host.system_mode();
        let (mode, scheme, explicit) = hydrate(store.as_ref(), &options, &registry, system_preference);

        let manager = Self {
            inner: Arc::new(ManagerInner {
                options,
                bus,
                store,
                prefs: Mutex::new(Preferences {
                    mode,
                    scheme,
                    system_preference,
                    initialized: false,
                    explicit,
                    registry,
                }),
                cancel: CancellationToken::new(),
                destroyed: AtomicBool::new(false),
            }),
        };

        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(system_listener_task(
                Arc::downgrade(&manager.inner),
                host.watch_system_mode(),
                manager.inner.cancel.clone(),
            ));
        } else {
            debug!("no runtime, system color mode changes must be forwarded manually");
        }

        manager.apply_theme();
        let state = {
            let mut prefs = manager.lock();
            prefs.initialized = true;
            prefs.snapshot()
        };
        info!(mode = %state.mode, scheme = %state.scheme, "theme initialized");
        manager
            .inner
            .bus
            .publish(BusEvent::ThemeInitialized(Box::new(state)));
        manager
    }

    // ── Queries ──────────────────────────────────────────────────

    pub fn theme_state(&self) -> ThemeState {
        self.lock().snapshot()
    }

    pub fn mode(&self) -> ColorMode {
        self.lock().mode
    }

    pub fn scheme(&self) -> String {
        self.lock().scheme.clone()
    }

    /// Whether the user has picked a theme themselves.
    pub fn is_explicit(&self) -> bool {
        self.lock().explicit
    }

    pub fn schemes(&self) -> SchemeRegistry {
        self.lock().registry.clone()
    }

    pub fn available_combinations(&self) -> Vec<ThemeCombination> {
        self.lock().registry.combinations()
    }

    // ── Apply ────────────────────────────────────────────────────

    /// Validate, persist, and publish `theme:changed` with the full state.
    ///
    /// An unregistered scheme is replaced by the default scheme.
    pub fn apply_theme(&self) -> ThemeState {
        let (record, state) = {
            let mut prefs = self.lock();
            if !prefs.registry.contains(&prefs.scheme) {
                warn!(
                    scheme = %prefs.scheme,
                    fallback = %self.inner.options.default_scheme,
                    "unknown scheme, falling back to default"
                );
                prefs.scheme.clone_from(&self.inner.options.default_scheme);
            }
            (prefs.record(), prefs.snapshot())
        };

        self.persist(&record);
        debug!(mode = %state.mode, scheme = %state.scheme, "theme applied");
        self.inner
            .bus
            .publish(BusEvent::ThemeChanged(Box::new(state.clone())));
        state
    }

    // ── Setters ──────────────────────────────────────────────────

    /// Returns `false` when `mode` is already active.
    pub fn set_mode(&self, mode: ColorMode) -> bool {
        let previous = {
            let mut prefs = self.lock();
            if prefs.mode == mode {
                return false;
            }
            prefs.explicit = true;
            std::mem::replace(&mut prefs.mode, mode)
        };

        self.apply_theme();
        self.inner.bus.publish(BusEvent::ModeChanged {
            previous,
            current: mode,
        });
        info!(%previous, current = %mode, "color mode changed");
        true
    }

    /// [`set_mode`](Self::set_mode) from a mode name (`"light"`, `"dark"`).
    pub fn set_mode_named(&self, name: &str) -> Result<bool, CoreError> {
        let mode: ColorMode = name.parse().map_err(|_| {
            warn!(mode = name, "ignoring unknown color mode");
            CoreError::validation("mode", format!("unknown mode '{name}'"))
        })?;
        Ok(self.set_mode(mode))
    }

    pub fn set_scheme(&self, scheme: &str) -> Result<bool, CoreError> {
        let previous = {
            let mut prefs = self.lock();
            check_scheme(&prefs.registry, scheme)?;
            if prefs.scheme == scheme {
                return Ok(false);
            }
            prefs.explicit = true;
            std::mem::replace(&mut prefs.scheme, scheme.to_owned())
        };

        self.apply_theme();
        info!(%previous, current = scheme, "color scheme changed");
        self.inner.bus.publish(BusEvent::SchemeChanged {
            previous,
            current: scheme.to_owned(),
        });
        Ok(true)
    }

    /// Set mode and scheme together, applying once.
    pub fn set_theme(&self, mode: ColorMode, scheme: &str) -> Result<bool, CoreError> {
        let (previous_mode, previous_scheme) = {
            let mut prefs = self.lock();
            check_scheme(&prefs.registry, scheme)?;
            if prefs.mode == mode && prefs.scheme == scheme {
                return Ok(false);
            }
            prefs.explicit = true;
            (
                std::mem::replace(&mut prefs.mode, mode),
                std::mem::replace(&mut prefs.scheme, scheme.to_owned()),
            )
        };

        self.apply_theme();
        if previous_mode != mode {
            self.inner.bus.publish(BusEvent::ModeChanged {
                previous: previous_mode,
                current: mode,
            });
        }
        if previous_scheme != scheme {
            self.inner.bus.publish(BusEvent::SchemeChanged {
                previous: previous_scheme,
                current: scheme.to_owned(),
            });
        }
        Ok(true)
    }

    /// Returns the new mode.
    pub fn toggle_mode(&self) -> ColorMode {
        let next = self.lock().mode.toggled();
        self.set_mode(next);
        next
    }

    /// Advance to the next registered scheme, wrapping. Returns its key.
    pub fn next_scheme(&self) -> String {
        self.step_scheme(true)
    }

    /// Step back to the previous registered scheme, wrapping.
    pub fn previous_scheme(&self) -> String {
        self.step_scheme(false)
    }

    // ── Registry ─────────────────────────────────────────────────

    /// Add a scheme, or replace the descriptor of an existing one.
    pub fn register_scheme(
        &self,
        key: &str,
        descriptor: SchemeDescriptor,
    ) -> Result<(), CoreError> {
        let key = key.trim();
        if key.is_empty() {
            warn!("ignoring scheme registration with empty key");
            return Err(CoreError::validation("scheme", "key must not be empty"));
        }

        self.lock().registry.register(key, descriptor.clone());
        debug!(scheme = key, "scheme registered");
        self.inner.bus.publish(BusEvent::SchemeRegistered {
            key: key.to_owned(),
            descriptor,
        });
        Ok(())
    }

    // ── System preference ────────────────────────────────────────

    /// Record the host's color mode and adopt it unless the user has
    /// chosen one.
    pub fn handle_system_change(&self, mode: ColorMode) {
        let previous = {
            let mut prefs = self.lock();
            prefs.system_preference = mode;
            let adopt = self.inner.options.respect_system_preference
                && !prefs.explicit
                && prefs.mode != mode;
            adopt.then(|| std::mem::replace(&mut prefs.mode, mode))
        };

        self.inner.bus.publish(BusEvent::SystemChanged { mode });
        if let Some(previous) = previous {
            debug!(%previous, current = %mode, "following system color mode");
            self.apply_theme();
            self.inner.bus.publish(BusEvent::ModeChanged {
                previous,
                current: mode,
            });
        }
    }

    // ── Import / export ──────────────────────────────────────────

    pub fn export_settings(&self) -> ThemeSettings {
        let prefs = self.lock();
        ThemeSettings {
            version: SETTINGS_VERSION,
            mode: prefs.mode,
            scheme: prefs.scheme.clone(),
            exported_at: Utc::now(),
        }
    }

    /// Apply exported settings. Settings from an unknown version are
    /// ignored and `Ok(false)` is returned.
    pub fn import_settings(&self, settings: &ThemeSettings) -> Result<bool, CoreError> {
        if settings.version != SETTINGS_VERSION {
            warn!(
                version = settings.version,
                supported = SETTINGS_VERSION,
                "ignoring theme settings from unsupported version"
            );
            return Ok(false);
        }
        self.set_theme(settings.mode, &settings.scheme)
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Back to the configured defaults. Clears the explicit choice, so
    /// system changes are followed again.
    pub fn reset(&self) -> ThemeState {
        {
            let mut prefs = self.lock();
            prefs.mode = self.inner.options.default_mode;
            prefs.scheme.clone_from(&self.inner.options.default_scheme);
            prefs.explicit = false;
        }
        let state = self.apply_theme();
        info!(mode = %state.mode, scheme = %state.scheme, "theme reset");
        self.inner
            .bus
            .publish(BusEvent::ThemeReset(Box::new(state.clone())));
        state
    }

    /// Stop following the system mode and drop all theme listeners.
    /// Idempotent.
    pub fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.cancel.cancel();
        self.inner.bus.clear_where(EventKind::is_theme);
        self.inner.bus.publish(BusEvent::ThemeDestroyed);
        debug!("preference manager destroyed");
    }

    // ── Private helpers ──────────────────────────────────────────

    fn step_scheme(&self, forward: bool) -> String {
        let target = {
            let prefs = self.lock();
            prefs
                .registry
                .neighbor(&prefs.scheme, forward)
                .map_or_else(|| prefs.scheme.clone(), str::to_owned)
        };
        // Taken from the registry, so it always validates.
        let _ = self.set_scheme(&target);
        target
    }

    fn persist(&self, record: &PersistedPreference) {
        let result = serde_json::to_string(record)
            .map_err(StorageError::from)
            .and_then(|raw| self.inner.store.save(&self.inner.options.storage_key, &raw));
        if let Err(e) = result {
            warn!(error = %e, "failed to persist theme preference");
        }
    }

    fn lock(&self) -> MutexGuard<'_, Preferences> {
        self.inner
            .prefs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

fn check_scheme(registry: &SchemeRegistry, scheme: &str) -> Result<(), CoreError> {
    if registry.contains(scheme) {
        return Ok(());
    }
    warn!(scheme, "ignoring unknown color scheme");
    Err(CoreError::validation(
        "scheme",
        format!("unknown scheme '{scheme}'"),
    ))
}

/// Initial `(mode, scheme, explicit)` from the stored record, or from the
/// system/default options when there is no usable record. A non-explicit
/// record keeps its scheme but takes the current system mode.
fn hydrate(
    store: &dyn PreferenceStore,
    options: &PreferenceOptions,
    registry: &SchemeRegistry,
    system: ColorMode,
) -> (ColorMode, String, bool) {
    let stored = store
        .load(&options.storage_key)
        .and_then(|raw| {
            raw.map(|raw| serde_json::from_str::<PersistedPreference>(&raw))
                .transpose()
                .map_err(StorageError::from)
        });

    match stored {
        Ok(Some(record)) if registry.contains(&record.scheme) => {
            debug!(mode = %record.mode, scheme = %record.scheme, explicit = record.explicit, "restored theme preference");
            // A mode that only mirrored the system follows today's system.
            let mode = if !record.explicit && options.respect_system_preference {
                system
            } else {
                record.mode
            };
            return (mode, record.scheme, record.explicit);
        }
        Ok(Some(record)) => {
            warn!(scheme = %record.scheme, "stored scheme is not registered, ignoring stored preference");
        }
        Ok(None) => debug!("no stored theme preference"),
        Err(e) => warn!(error = %e, "failed to read stored theme preference"),
    }

    let mode = if options.respect_system_preference {
        system
    } else {
        options.default_mode
    };
    (mode, options.default_scheme.clone(), false)
}

/// Forward host system-mode changes until cancelled.
async fn system_listener_task(
    manager: Weak<ManagerInner>,
    mut system: watch::Receiver<ColorMode>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Ok(()) = system.changed() => {
                let mode = *system.borrow_and_update();
                let Some(inner) = manager.upgrade() else {
                    break;
                };
                PreferenceManager { inner }.handle_system_change(mode);
            }
        }
    }
    trace!("system color mode listener stopped");
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests;
