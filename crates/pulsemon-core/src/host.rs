// ── Host environment signals ──
//
// Page visibility, network connectivity, and the system light/dark
// preference. The embedding application drives these; the controller and
// preference manager observe them through watch channels.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::theme::ColorMode;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PageVisibility {
    #[default]
    Visible,
    Hidden,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Connectivity {
    #[default]
    Online,
    Offline,
}

struct SignalsInner {
    visibility: watch::Sender<PageVisibility>,
    connectivity: watch::Sender<Connectivity>,
    system_mode: watch::Sender<ColorMode>,
}

/// Observable host state. Clones share the same channels.
#[derive(Clone)]
pub struct HostSignals {
    inner: Arc<SignalsInner>,
}

impl Default for HostSignals {
    fn default() -> Self {
        Self::new(ColorMode::Light)
    }
}

impl std::fmt::Debug for HostSignals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostSignals")
            .field("visibility", &*self.inner.visibility.borrow())
            .field("connectivity", &*self.inner.connectivity.borrow())
            .field("system_mode", &*self.inner.system_mode.borrow())
            .finish()
    }
}

impl HostSignals {
    /// Visible and online, with the given system color mode.
    pub fn new(system_mode: ColorMode) -> Self {
        let (visibility, _) = watch::channel(PageVisibility::Visible);
        let (connectivity, _) = watch::channel(Connectivity::Online);
        let (system_mode, _) = watch::channel(system_mode);
        Self {
            inner: Arc::new(SignalsInner {
                visibility,
                connectivity,
                system_mode,
            }),
        }
    }

    // ── Drivers ──────────────────────────────────────────────────────
    //
    // Each returns `true` when the value actually changed.

    pub fn set_visibility(&self, value: PageVisibility) -> bool {
        self.inner.visibility.send_if_modified(|current| replace(current, value))
    }

    pub fn set_connectivity(&self, value: Connectivity) -> bool {
        self.inner
            .connectivity
            .send_if_modified(|current| replace(current, value))
    }

    pub fn set_system_mode(&self, value: ColorMode) -> bool {
        self.inner
            .system_mode
            .send_if_modified(|current| replace(current, value))
    }

    // ── Readers ──────────────────────────────────────────────────────

    pub fn visibility(&self) -> PageVisibility {
        *self.inner.visibility.borrow()
    }

    pub fn is_visible(&self) -> bool {
        self.visibility() == PageVisibility::Visible
    }

    pub fn connectivity(&self) -> Connectivity {
        *self.inner.connectivity.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.connectivity() == Connectivity::Online
    }

    pub fn system_mode(&self) -> ColorMode {
        *self.inner.system_mode.borrow()
    }

    pub fn watch_visibility(&self) -> watch::Receiver<PageVisibility> {
        self.inner.visibility.subscribe()
    }

    pub fn watch_connectivity(&self) -> watch::Receiver<Connectivity> {
        self.inner.connectivity.subscribe()
    }

    pub fn watch_system_mode(&self) -> watch::Receiver<ColorMode> {
        self.inner.system_mode.subscribe()
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setters_report_changes_only() {
        let host = HostSignals::default();
        assert!(host.is_visible());
        assert!(host.is_online());

        assert!(!host.set_visibility(PageVisibility::Visible));
        assert!(host.set_visibility(PageVisibility::Hidden));
        assert!(!host.is_visible());

        assert!(host.set_connectivity(Connectivity::Offline));
        assert!(!host.is_online());

        assert!(host.set_system_mode(ColorMode::Dark));
        assert_eq!(host.system_mode(), ColorMode::Dark);
    }

    #[test]
    fn receivers_see_only_real_changes() {
        let host = HostSignals::default();
        let mut rx = host.watch_visibility();
        host.set_visibility(PageVisibility::Visible);
        assert!(!rx.has_changed().unwrap_or(true));
        host.set_visibility(PageVisibility::Hidden);
        assert!(rx.has_changed().unwrap_or(false));
        assert_eq!(*rx.borrow_and_update(), PageVisibility::Hidden);
    }
}
