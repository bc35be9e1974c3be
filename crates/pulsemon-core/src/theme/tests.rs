use std::sync::atomic::AtomicUsize;

use pretty_assertions::assert_eq;
use tokio::sync::broadcast;

use super::*;
use crate::bus::{SubscribeOptions, listener};

const KEY: &str = "dashboard-theme-preference";

/// A store whose every operation fails.
struct BrokenStore;

impl PreferenceStore for BrokenStore {
    fn load(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(std::io::Error::other("disk on fire").into())
    }

    fn save(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Err(std::io::Error::other("disk on fire").into())
    }

    fn remove(&self, _key: &str) -> Result<(), StorageError> {
        Ok(())
    }
}

struct Fixture {
    manager: PreferenceManager,
    store: Arc<MemoryStore>,
    host: HostSignals,
    tap: broadcast::Receiver<Arc<BusEvent>>,
}

fn fixture_with(options: PreferenceOptions, system: ColorMode, stored: Option<&str>) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    if let Some(raw) = stored {
        store.save(KEY, raw).unwrap();
    }
    let host = HostSignals::new(system);
    let bus = EventBus::new();
    let tap = bus.tap();
    let manager = PreferenceManager::new(options, bus, store.clone(), &host);
    Fixture {
        manager,
        store,
        host,
        tap,
    }
}

fn fixture() -> Fixture {
    fixture_with(PreferenceOptions::default(), ColorMode::Light, None)
}

fn persisted(store: &MemoryStore) -> PersistedPreference {
    serde_json::from_str(&store.load(KEY).unwrap().unwrap()).unwrap()
}

fn drain(tap: &mut broadcast::Receiver<Arc<BusEvent>>) -> Vec<BusEvent> {
    std::iter::from_fn(|| tap.try_recv().ok())
        .map(|event| BusEvent::clone(&event))
        .collect()
}

fn kinds(tap: &mut broadcast::Receiver<Arc<BusEvent>>) -> Vec<EventKind> {
    drain(tap).iter().map(BusEvent::kind).collect()
}

// ── Hydration ────────────────────────────────────────────────────

#[test]
fn fresh_start_follows_system_mode() {
    let mut f = fixture_with(PreferenceOptions::default(), ColorMode::Dark, None);

    let state = f.manager.theme_state();
    assert_eq!(state.mode, ColorMode::Dark);
    assert_eq!(state.scheme, "default");
    assert_eq!(state.system_preference, ColorMode::Dark);
    assert!(state.initialized);
    assert_eq!(state.scheme_data.unwrap().name, "Default");
    assert!(!f.manager.is_explicit());

    let record = persisted(&f.store);
    assert_eq!(record.mode, ColorMode::Dark);
    assert!(!record.explicit);

    assert_eq!(
        kinds(&mut f.tap),
        vec![EventKind::ThemeChanged, EventKind::ThemeInitialized]
    );
}

#[test]
fn fresh_start_ignores_system_when_not_respected() {
    let options = PreferenceOptions {
        respect_system_preference: false,
        default_mode: ColorMode::Light,
        ..PreferenceOptions::default()
    };
    let f = fixture_with(options, ColorMode::Dark, None);
    assert_eq!(f.manager.mode(), ColorMode::Light);
}

#[test]
fn stored_record_is_adopted_with_its_explicit_flag() {
    let f = fixture_with(
        PreferenceOptions::default(),
        ColorMode::Light,
        Some(r#"{"mode":"dark","scheme":"forest","timestamp":"2024-06-15T10:30:00Z","explicit":true}"#),
    );
    assert_eq!(f.manager.mode(), ColorMode::Dark);
    assert_eq!(f.manager.scheme(), "forest");
    assert!(f.manager.is_explicit());
}

#[test]
fn non_explicit_record_takes_current_system_mode() {
    let raw = r#"{"mode":"dark","scheme":"forest","timestamp":"2024-06-15T10:30:00Z","explicit":false}"#;

    let f = fixture_with(PreferenceOptions::default(), ColorMode::Light, Some(raw));
    assert_eq!(f.manager.mode(), ColorMode::Light);
    assert_eq!(f.manager.scheme(), "forest");
    assert!(!f.manager.is_explicit());
    assert_eq!(persisted(&f.store).mode, ColorMode::Light);

    let options = PreferenceOptions {
        respect_system_preference: false,
        ..PreferenceOptions::default()
    };
    let f = fixture_with(options, ColorMode::Light, Some(raw));
    assert_eq!(f.manager.mode(), ColorMode::Dark);
}

#[test]
fn unusable_records_fall_back_to_defaults() {
    for raw in [
        r#"{"mode":"dark","scheme":"neon","timestamp":"2024-06-15T10:30:00Z"}"#,
        r#"{"mode":"sepia","scheme":"ocean","timestamp":"2024-06-15T10:30:00Z"}"#,
        "not json at all",
    ] {
        let f = fixture_with(PreferenceOptions::default(), ColorMode::Light, Some(raw));
        assert_eq!(f.manager.mode(), ColorMode::Light, "record: {raw}");
        assert_eq!(f.manager.scheme(), "default", "record: {raw}");
        // The fallback overwrote the bad record.
        assert_eq!(persisted(&f.store).scheme, "default");
    }
}

#[test]
fn broken_storage_is_not_fatal() {
    let host = HostSignals::new(ColorMode::Dark);
    let manager = PreferenceManager::new(
        PreferenceOptions::default(),
        EventBus::new(),
        Arc::new(BrokenStore),
        &host,
    );
    assert_eq!(manager.mode(), ColorMode::Dark);
    assert!(manager.set_scheme("ocean").unwrap());
    assert_eq!(manager.scheme(), "ocean");
}

#[test]
fn unknown_default_scheme_falls_back() {
    let options = PreferenceOptions {
        default_scheme: "neon".into(),
        ..PreferenceOptions::default()
    };
    let f = fixture_with(options, ColorMode::Light, None);
    assert_eq!(f.manager.scheme(), "default");
    assert_eq!(f.manager.reset().scheme, "default");
}

// ── Setters ──────────────────────────────────────────────────────

#[test]
fn set_mode_emits_and_persists_explicit_choice() {
    let mut f = fixture();
    drain(&mut f.tap);

    assert!(!f.manager.set_mode(ColorMode::Light));
    assert!(drain(&mut f.tap).is_empty());

    assert!(f.manager.set_mode(ColorMode::Dark));
    let events = drain(&mut f.tap);
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].kind(), EventKind::ThemeChanged);
    assert_eq!(
        events[1],
        BusEvent::ModeChanged {
            previous: ColorMode::Light,
            current: ColorMode::Dark,
        }
    );

    let record = persisted(&f.store);
    assert_eq!(record.mode, ColorMode::Dark);
    assert!(record.explicit);
}

#[test]
fn invalid_values_are_rejected_without_events() {
    let mut f = fixture();
    drain(&mut f.tap);

    assert!(f.manager.set_mode_named("sepia").is_err());
    assert!(f.manager.set_scheme("neon").is_err());
    assert!(f.manager.set_theme(ColorMode::Dark, "neon").is_err());

    assert!(drain(&mut f.tap).is_empty());
    assert_eq!(f.manager.mode(), ColorMode::Light);
    assert_eq!(f.manager.scheme(), "default");
    assert!(!f.manager.is_explicit());

    assert!(f.manager.set_mode_named("DARK").unwrap());
    assert_eq!(f.manager.mode(), ColorMode::Dark);
}

#[test]
fn set_theme_reports_only_what_changed() {
    let mut f = fixture();
    drain(&mut f.tap);

    assert!(f.manager.set_theme(ColorMode::Light, "sunset").unwrap());
    assert_eq!(
        kinds(&mut f.tap),
        vec![EventKind::ThemeChanged, EventKind::SchemeChanged]
    );

    assert!(!f.manager.set_theme(ColorMode::Light, "sunset").unwrap());
    assert!(drain(&mut f.tap).is_empty());

    assert!(f.manager.set_theme(ColorMode::Dark, "ocean").unwrap());
    assert_eq!(
        kinds(&mut f.tap),
        vec![
            EventKind::ThemeChanged,
            EventKind::ModeChanged,
            EventKind::SchemeChanged,
        ]
    );
}

#[test]
fn scheme_cycling_wraps() {
    let f = fixture();

    assert_eq!(f.manager.previous_scheme(), "purple");
    assert_eq!(f.manager.next_scheme(), "default");
    assert_eq!(f.manager.next_scheme(), "ocean");
    assert_eq!(f.manager.scheme(), "ocean");
    assert_eq!(f.manager.toggle_mode(), ColorMode::Dark);
    assert_eq!(f.manager.toggle_mode(), ColorMode::Light);
}

// ── System preference ────────────────────────────────────────────

#[test]
fn system_change_adopted_until_user_chooses() {
    let mut f = fixture();
    drain(&mut f.tap);

    f.manager.handle_system_change(ColorMode::Dark);
    assert_eq!(f.manager.mode(), ColorMode::Dark);
    assert_eq!(
        kinds(&mut f.tap),
        vec![
            EventKind::SystemChanged,
            EventKind::ThemeChanged,
            EventKind::ModeChanged,
        ]
    );
    assert!(!persisted(&f.store).explicit);

    f.manager.set_scheme("ocean").unwrap();
    drain(&mut f.tap);

    f.manager.handle_system_change(ColorMode::Light);
    assert_eq!(f.manager.mode(), ColorMode::Dark);
    assert_eq!(f.manager.theme_state().system_preference, ColorMode::Light);
    assert_eq!(kinds(&mut f.tap), vec![EventKind::SystemChanged]);
}

#[test]
fn system_change_ignored_when_not_respected() {
    let options = PreferenceOptions {
        respect_system_preference: false,
        ..PreferenceOptions::default()
    };
    let f = fixture_with(options, ColorMode::Light, None);
    f.manager.handle_system_change(ColorMode::Dark);
    assert_eq!(f.manager.mode(), ColorMode::Light);
    assert_eq!(f.manager.theme_state().system_preference, ColorMode::Dark);
}

#[tokio::test]
async fn host_signal_drives_system_changes() {
    let f = fixture();
    tokio::task::yield_now().await;

    f.host.set_system_mode(ColorMode::Dark);
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
    assert_eq!(f.manager.mode(), ColorMode::Dark);

    f.manager.destroy();
    f.host.set_system_mode(ColorMode::Light);
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
    assert_eq!(f.manager.theme_state().system_preference, ColorMode::Dark);
}

#[tokio::test]
async fn dropping_the_manager_stops_the_system_listener() {
    let Fixture {
        manager,
        store,
        host,
        mut tap,
    } = fixture();
    tokio::task::yield_now().await;

    drop(manager);
    host.set_system_mode(ColorMode::Dark);
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
    assert_eq!(Arc::strong_count(&store), 1);
    assert!(!kinds(&mut tap).contains(&EventKind::SystemChanged));
}

// ── Registry ─────────────────────────────────────────────────────

#[test]
fn registered_scheme_joins_combinations() {
    let mut f = fixture();
    drain(&mut f.tap);

    let mono = SchemeDescriptor::new("Mono", "Greyscale", "neutral");
    f.manager.register_scheme("mono", mono.clone()).unwrap();
    assert_eq!(
        drain(&mut f.tap),
        vec![BusEvent::SchemeRegistered {
            key: "mono".into(),
            descriptor: mono,
        }]
    );

    let combos = f.manager.available_combinations();
    assert_eq!(combos.len(), 12);
    assert!(combos.iter().any(|c| c.preview == "dark-mono" && c.name == "Dark Mono"));
    assert_eq!(f.manager.theme_state().combinations, combos);

    assert!(f.manager.set_scheme("mono").unwrap());
    let changed = drain(&mut f.tap)
        .into_iter()
        .find_map(|event| match event {
            BusEvent::ThemeChanged(state) => Some(state),
            _ => None,
        })
        .unwrap();
    assert_eq!(changed.combinations, combos);
    assert_eq!(changed.scheme_data.unwrap().name, "Mono");

    assert!(
        f.manager
            .register_scheme("  ", SchemeDescriptor::new("", "", ""))
            .is_err()
    );
}

// ── Import / export / reset ──────────────────────────────────────

#[test]
fn export_import_round_trip() {
    let source = fixture();
    source.manager.set_theme(ColorMode::Dark, "forest").unwrap();
    let settings = source.manager.export_settings();
    assert_eq!(settings.version, SETTINGS_VERSION);

    let target = fixture();
    assert!(target.manager.import_settings(&settings).unwrap());
    assert_eq!(target.manager.mode(), ColorMode::Dark);
    assert_eq!(target.manager.scheme(), "forest");
    assert!(target.manager.is_explicit());
}

#[test]
fn import_of_unknown_version_is_ignored() {
    let mut f = fixture();
    drain(&mut f.tap);

    let settings = ThemeSettings {
        version: SETTINGS_VERSION + 1,
        mode: ColorMode::Dark,
        scheme: "ocean".into(),
        exported_at: Utc::now(),
    };
    assert!(!f.manager.import_settings(&settings).unwrap());
    assert_eq!(f.manager.mode(), ColorMode::Light);
    assert!(drain(&mut f.tap).is_empty());
}

#[test]
fn reset_restores_defaults_and_clears_explicit() {
    let mut f = fixture();
    f.manager.set_theme(ColorMode::Dark, "purple").unwrap();
    drain(&mut f.tap);

    let state = f.manager.reset();
    assert_eq!(state.mode, ColorMode::Light);
    assert_eq!(state.scheme, "default");
    assert!(!f.manager.is_explicit());
    assert!(!persisted(&f.store).explicit);
    assert_eq!(
        kinds(&mut f.tap),
        vec![EventKind::ThemeChanged, EventKind::ThemeReset]
    );
}

#[test]
fn destroy_clears_only_theme_listeners() {
    let mut f = fixture();
    let bus = f.manager.inner.bus.clone();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let count = listener(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    bus.subscribe(EventKind::ThemeDestroyed, Arc::clone(&count), SubscribeOptions::default());
    bus.subscribe(EventKind::ModeChanged, Arc::clone(&count), SubscribeOptions::default());
    bus.subscribe(EventKind::DataLoaded, count, SubscribeOptions::default());
    drain(&mut f.tap);

    f.manager.destroy();
    f.manager.destroy();

    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(bus.listener_count(EventKind::ThemeDestroyed), 0);
    assert_eq!(bus.listener_count(EventKind::ModeChanged), 0);
    assert_eq!(bus.listener_count(EventKind::DataLoaded), 1);
    assert_eq!(kinds(&mut f.tap), vec![EventKind::ThemeDestroyed]);
}
