use super::*;
use crate::backend::command::MockCommandRunner;
use crate::backend::detect::Discovery;
use crate::bus::{LocalBus, MessageLog};
use crate::config::DisplayConfig;
use crate::constants::*;
use crate::time_source::{ManualTimeSource, parse_datetime};
use chrono::Duration as ChronoDuration;
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

/// In-memory panel that counts hardware writes.
#[derive(Clone)]
struct FakePanel {
    interface: DeviceInterface,
    level: Arc<Mutex<u32>>,
    writes: Arc<AtomicUsize>,
}

impl FakePanel {
    fn new(interface: DeviceInterface, level: u32) -> Self {
        Self {
            interface,
            level: Arc::new(Mutex::new(level)),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn level(&self) -> u32 {
        *self.level.lock().unwrap()
    }

    fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl BrightnessBackend for FakePanel {
    fn interface(&self) -> DeviceInterface {
        self.interface
    }

    fn get_level(&mut self) -> anyhow::Result<u32> {
        Ok(*self.level.lock().unwrap())
    }

    fn set_level(&mut self, level: u32) -> anyhow::Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        *self.level.lock().unwrap() = level;
        Ok(())
    }
}

struct Harness {
    manager: Arc<BrightnessManager>,
    bus: Arc<LocalBus>,
    log: Arc<MessageLog>,
    clock: Arc<ManualTimeSource>,
    scheduler: Arc<Scheduler>,
}

impl Harness {
    fn new(panel: Option<FakePanel>, config: DisplayConfig, start: &str) -> Self {
        Self::with_store(panel, DisplayConfigStore::in_memory(config), start)
    }

    fn with_store(panel: Option<FakePanel>, store: DisplayConfigStore, start: &str) -> Self {
        crate::logger::Log::set_enabled(false);
        let clock = ManualTimeSource::shared(parse_datetime(start).unwrap());
        let scheduler = Arc::new(Scheduler::new(clock.clone()));
        let bus = Arc::new(LocalBus::new());
        let log = bus.record();
        let manager = BrightnessManager::new(ManagerParams {
            backend: panel.map(|p| Box::new(p) as Box<dyn BrightnessBackend>),
            config: store,
            location: None,
            bus: bus.clone(),
            scheduler: scheduler.clone(),
            time: clock.clone(),
            debug_enabled: false,
        });
        manager.start();
        Self {
            manager,
            bus,
            log,
            clock,
            scheduler,
        }
    }

    fn advance(&self, seconds: i64) {
        let now = self.clock.advance(ChronoDuration::seconds(seconds));
        self.scheduler.run_due(now);
    }

    fn advance_to(&self, at: &str) {
        let now = parse_datetime(at).unwrap();
        self.clock.set(now);
        self.scheduler.run_due(now);
    }

    fn send(&self, topic: &str, data: serde_json::Value) {
        self.bus.emit(Message::new(topic, data));
    }

    fn dim_due(&self) -> Option<DateTime<Local>> {
        self.scheduler.due_time(ALARM_AUTO_DIM)
    }
}

fn day_only() -> DisplayConfig {
    DisplayConfig {
        auto_nightmode: false,
        ..DisplayConfig::default()
    }
}

const NOON: &str = "2026-05-01 12:00:00";

#[test]
fn test_dim_then_interaction_restores_and_rearms() {
    let panel = FakePanel::new(DeviceInterface::Dsi, 100);
    let h = Harness::new(Some(panel.clone()), day_only(), NOON);
    let t0 = h.clock.now();

    h.manager.start_auto_dim();
    assert_eq!(h.dim_due(), Some(t0 + ChronoDuration::seconds(60)));

    h.advance(60);
    assert_eq!(h.manager.current_level(), 20);
    assert_eq!(panel.level(), 20);
    assert_eq!(
        h.log.last_of_type(TOPIC_DIM_UPDATE).unwrap().get("brightness"),
        Some(&json!(20))
    );

    h.send("gui.page_interaction", json!({}));
    assert_eq!(h.manager.current_level(), 100);
    assert_eq!(h.dim_due(), Some(t0 + ChronoDuration::seconds(120)));
}

#[test]
fn test_interaction_pushes_idle_timer_back() {
    let h = Harness::new(
        Some(FakePanel::new(DeviceInterface::Dsi, 100)),
        day_only(),
        NOON,
    );
    let t0 = h.clock.now();
    h.manager.start_auto_dim();

    h.advance(30);
    h.send("recognizer_loop:wakeword", json!({}));
    assert_eq!(h.dim_due(), Some(t0 + ChronoDuration::seconds(90)));

    // The original deadline passes without dimming
    h.advance(30);
    assert_eq!(h.manager.current_level(), 100);

    h.advance(30);
    assert_eq!(h.manager.current_level(), 20);
}

#[test]
fn test_start_then_stop_leaves_no_alarm() {
    let h = Harness::new(
        Some(FakePanel::new(DeviceInterface::Dsi, 100)),
        day_only(),
        NOON,
    );
    h.manager.start_auto_dim();
    h.manager.stop_auto_dim();

    assert!(!h.scheduler.is_scheduled(ALARM_AUTO_DIM));
    assert_eq!(h.manager.current_level(), h.manager.default_level());
    assert!(!h.manager.auto_dim_enabled());
}

#[test]
fn test_stop_after_dim_restores_default() {
    let h = Harness::new(
        Some(FakePanel::new(DeviceInterface::Dsi, 100)),
        day_only(),
        NOON,
    );
    h.manager.start_auto_dim();
    h.advance(60);
    assert_eq!(h.manager.current_level(), 20);

    h.manager.stop_auto_dim();
    assert_eq!(h.manager.current_level(), 100);
    assert!(h.scheduler.pending().is_empty());
}

#[test]
fn test_interaction_ignored_without_auto_dim() {
    let panel = FakePanel::new(DeviceInterface::Dsi, 40);
    let h = Harness::new(Some(panel.clone()), day_only(), NOON);
    h.send("gui.page_gained_focus", json!({}));
    assert_eq!(panel.level(), 40);
    assert!(h.dim_due().is_none());
}

#[test]
fn test_stale_dim_alarm_is_ignored() {
    let h = Harness::new(
        Some(FakePanel::new(DeviceInterface::Dsi, 100)),
        day_only(),
        NOON,
    );
    h.manager.start_auto_dim();
    let stale = h.manager.lock_state().dim_generation;
    h.send("gui.page_interaction", json!({}));

    h.clock.advance(ChronoDuration::seconds(60));
    h.manager.on_dim_alarm(stale);
    assert_eq!(h.manager.current_level(), 100);
}

#[test]
fn test_set_is_idempotent_on_hardware() {
    let panel = FakePanel::new(DeviceInterface::Dsi, 100);
    let h = Harness::new(Some(panel.clone()), day_only(), NOON);

    assert_eq!(h.manager.set_brightness(150).unwrap(), 150);
    assert_eq!(h.manager.set_brightness(150).unwrap(), 150);
    assert_eq!(panel.writes(), 1);
    assert_eq!(h.log.of_type(TOPIC_DIM_UPDATE).len(), 1);

    assert_eq!(h.manager.set_brightness(999).unwrap(), 255);
    assert_eq!(h.manager.set_brightness_fraction(0.5).unwrap(), 130);
}

#[test]
fn test_unknown_device_discovery_and_set() {
    let mut runner = MockCommandRunner::new();
    runner.expect_run().times(0);
    let discovery = Discovery {
        vcgencmd: None,
        ddcutil: None,
        backlight_dir: PathBuf::from("/nonexistent"),
        runner: Arc::new(runner),
        timeout: COMMAND_TIMEOUT,
        debug_enabled: false,
    };
    crate::logger::Log::set_enabled(false);
    assert!(discovery.run().is_none());

    let h = Harness::new(None, day_only(), NOON);
    assert_eq!(h.manager.interface(), DeviceInterface::Unknown);
    let before = h.manager.current_level();
    assert!(h.manager.set_brightness(50).is_err());
    assert_eq!(h.manager.current_level(), before);
    assert!(h.log.of_type(TOPIC_DIM_UPDATE).is_empty());
}

#[test]
fn test_get_request_reports_percent_for_dsi() {
    let h = Harness::new(
        Some(FakePanel::new(DeviceInterface::Dsi, 128)),
        day_only(),
        NOON,
    );
    h.send(TOPIC_GET, json!({}));
    let reply = h.log.last_of_type(TOPIC_GET_RESPONSE).unwrap();
    assert_eq!(reply.get("brightness"), Some(&json!(50)));
}

#[test]
fn test_get_request_reports_native_for_hdmi() {
    let h = Harness::new(
        Some(FakePanel::new(DeviceInterface::Hdmi, 70)),
        day_only(),
        NOON,
    );
    h.send(TOPIC_GET, json!({}));
    let reply = h.log.last_of_type(TOPIC_GET_RESPONSE).unwrap();
    assert_eq!(reply.get("brightness"), Some(&json!(70)));
}

#[test]
fn test_get_request_without_display_errors() {
    let h = Harness::new(None, day_only(), NOON);
    h.send(TOPIC_GET, json!({}));
    assert!(h.log.last_of_type(TOPIC_GET_RESPONSE).is_none());
    assert!(h.log.last_of_type(TOPIC_GET_ERROR).is_some());
}

#[test]
fn test_set_request_with_fraction() {
    let panel = FakePanel::new(DeviceInterface::Dsi, 100);
    let h = Harness::new(Some(panel.clone()), day_only(), NOON);

    h.send(TOPIC_SET, json!({"brightness": 0.5}));
    assert_eq!(panel.level(), 130);
    assert_eq!(
        h.log.last_of_type(TOPIC_SET_RESPONSE).unwrap().get("brightness"),
        Some(&json!(130))
    );
    assert_eq!(
        h.log.last_of_type(TOPIC_DIM_UPDATE).unwrap().get("brightness"),
        Some(&json!(130))
    );
}

#[test]
fn test_set_request_errors() {
    let h = Harness::new(
        Some(FakePanel::new(DeviceInterface::Hdmi, 50)),
        day_only(),
        NOON,
    );
    h.send(TOPIC_SET, json!({}));
    h.send(TOPIC_SET, json!({"brightness": "very"}));
    let errors = h.log.of_type(TOPIC_SET_ERROR);
    assert_eq!(errors.len(), 2);
    assert!(errors[0].get("error").unwrap().as_str().unwrap().contains("No brightness"));
    assert!(h.log.of_type(TOPIC_SET_RESPONSE).is_empty());
}

#[test]
fn test_sync_updates_cache_only() {
    let panel = FakePanel::new(DeviceInterface::Hdmi, 50);
    let h = Harness::new(Some(panel.clone()), day_only(), NOON);

    h.send(TOPIC_SYNC, json!({"brightness": 40}));
    assert_eq!(h.manager.current_level(), 40);
    assert_eq!(panel.writes(), 0);
    assert!(h.log.of_type(TOPIC_DIM_UPDATE).is_empty());
}

#[test]
fn test_sunset_sunrise_round_trip() {
    let panel = FakePanel::new(DeviceInterface::Dsi, 100);
    let h = Harness::new(Some(panel.clone()), DisplayConfig::default(), NOON);

    // Daytime start: day profile, next transition at the fallback sunset
    assert_eq!(h.manager.current_level(), 100);
    assert_eq!(
        h.scheduler.due_time(ALARM_NIGHT_MODE),
        Some(parse_datetime("2026-05-01 22:30:00").unwrap())
    );

    h.advance_to("2026-05-01 22:30:00");
    assert_eq!(h.manager.current_level(), 70);
    assert_eq!(h.manager.default_level(), 70);
    assert_eq!(h.log.of_type(TOPIC_NIGHT_MODE_ENABLED).len(), 1);
    assert_eq!(
        h.scheduler.due_time(ALARM_NIGHT_MODE),
        Some(parse_datetime("2026-05-02 06:30:00").unwrap())
    );
    // Night dims even though auto_dim is off
    assert!(h.dim_due().is_some());
    assert!(!h.manager.auto_dim_enabled());

    h.advance(60);
    assert_eq!(h.manager.current_level(), 20);

    h.advance_to("2026-05-02 06:30:00");
    assert_eq!(h.manager.current_level(), 100);
    assert_eq!(h.manager.default_level(), 100);
    assert!(h.dim_due().is_none());
    assert_eq!(
        h.log.last_of_type(TOPIC_MAIN_VIEW_INDEX).unwrap().get("current_index"),
        Some(&json!(0))
    );
    assert_eq!(
        h.scheduler.due_time(ALARM_NIGHT_MODE),
        Some(parse_datetime("2026-05-02 22:30:00").unwrap())
    );
}

#[test]
fn test_night_start_applies_night_profile() {
    let h = Harness::new(
        Some(FakePanel::new(DeviceInterface::Dsi, 100)),
        DisplayConfig::default(),
        "2026-05-01 23:15:00",
    );
    assert_eq!(h.manager.current_level(), 70);
    assert_eq!(h.log.of_type(TOPIC_NIGHT_MODE_ENABLED).len(), 1);

    // The idle dim at night also asks for the night face
    h.advance(60);
    assert_eq!(h.manager.current_level(), 20);
    assert_eq!(h.log.of_type(TOPIC_NIGHT_MODE_ENABLED).len(), 2);

    // Undim at night restores the night level
    h.send("gui.page_interaction", json!({}));
    assert_eq!(h.manager.current_level(), 70);
}

#[test]
fn test_stop_night_mode_cancels_alarms() {
    let h = Harness::new(
        Some(FakePanel::new(DeviceInterface::Dsi, 100)),
        DisplayConfig::default(),
        "2026-05-01 23:15:00",
    );
    h.advance(60);
    assert_eq!(h.manager.current_level(), 20);

    h.manager.stop_auto_night_mode();
    assert!(!h.scheduler.is_scheduled(ALARM_NIGHT_MODE));
    assert!(!h.scheduler.is_scheduled(ALARM_AUTO_DIM));
    assert_eq!(h.manager.default_level(), 100);
    assert_eq!(h.manager.current_level(), 100);
    assert!(!h.manager.auto_nightmode_enabled());
}

#[test]
fn test_user_auto_dim_survives_sunrise() {
    let config = DisplayConfig {
        auto_dim: true,
        ..DisplayConfig::default()
    };
    let h = Harness::new(
        Some(FakePanel::new(DeviceInterface::Dsi, 100)),
        config,
        "2026-05-02 06:29:00",
    );
    h.advance(60);
    assert_eq!(h.manager.current_level(), 20);
    // Sunrise ran too, but a dimmed screen stays dimmed
    assert_eq!(h.manager.default_level(), 100);

    h.send("recognizer_loop:record_begin", json!({}));
    assert_eq!(h.manager.current_level(), 100);
    assert!(h.dim_due().is_some());
}

#[test]
fn test_changed_event_reevaluates_flags() {
    let h = Harness::new(
        Some(FakePanel::new(DeviceInterface::Dsi, 100)),
        day_only(),
        NOON,
    );
    h.manager.with_state(|state, _| {
        state.config.set_auto_dim(true).unwrap();
    });
    h.send(TOPIC_AUTO_DIM_CHANGED, json!({}));
    assert!(h.dim_due().is_some());

    h.manager.with_state(|state, _| {
        state.config.set_auto_dim(false).unwrap();
    });
    h.send(TOPIC_AUTO_DIM_CHANGED, json!({}));
    assert!(h.dim_due().is_none());
}

#[test]
fn test_repeated_auto_dim_off_at_night_keeps_dimming() {
    let h = Harness::new(
        Some(FakePanel::new(DeviceInterface::Dsi, 100)),
        DisplayConfig::default(),
        "2026-05-01 23:15:00",
    );
    assert!(h.dim_due().is_some());

    h.advance(30);
    h.send(TOPIC_AUTO_DIM_CHANGED, json!({}));
    assert!(!h.manager.auto_dim_enabled());
    assert_eq!(
        h.dim_due(),
        Some(h.clock.now() + ChronoDuration::seconds(60))
    );

    h.advance(60);
    assert_eq!(h.manager.current_level(), 20);
}

#[test]
fn test_reload_turning_auto_dim_off_at_night() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(DISPLAY_CONFIG_FILE);
    std::fs::write(&path, r#"{"auto_dim": true, "auto_nightmode": true}"#).unwrap();
    let store = DisplayConfigStore::load(path.clone(), None).unwrap();
    let h = Harness::with_store(
        Some(FakePanel::new(DeviceInterface::Dsi, 100)),
        store,
        "2026-05-01 23:15:00",
    );

    std::fs::write(&path, r#"{"auto_dim": false, "auto_nightmode": true}"#).unwrap();
    h.manager.reload_config().unwrap();
    assert!(!h.manager.auto_dim_enabled());
    assert!(h.dim_due().is_some());

    h.advance(60);
    assert_eq!(h.manager.current_level(), 20);

    // Sunrise ends night dimming once auto-dim is off
    h.advance_to("2026-05-02 06:30:00");
    assert_eq!(h.manager.current_level(), 100);
    assert!(h.dim_due().is_none());
}

#[test]
fn test_reload_from_disk_starts_changed_policies() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(DISPLAY_CONFIG_FILE);
    std::fs::write(&path, r#"{"auto_dim": false, "auto_nightmode": false}"#).unwrap();
    let store = DisplayConfigStore::load(path.clone(), None).unwrap();

    let h = Harness::with_store(
        Some(FakePanel::new(DeviceInterface::Dsi, 100)),
        store,
        NOON,
    );
    assert!(h.scheduler.pending().is_empty());

    std::fs::write(
        &path,
        r#"{"auto_dim": true, "auto_nightmode": true, "auto_dim_seconds": 30}"#,
    )
    .unwrap();
    h.manager.reload_config().unwrap();

    assert_eq!(
        h.dim_due(),
        Some(h.clock.now() + ChronoDuration::seconds(30))
    );
    assert!(h.scheduler.is_scheduled(ALARM_NIGHT_MODE));

    std::fs::write(&path, "{ broken").unwrap();
    assert!(h.manager.reload_config().is_err());
    assert!(h.manager.auto_dim_enabled());
}

#[test]
fn test_reset_to_default() {
    let config = DisplayConfig {
        auto_dim: true,
        auto_nightmode: false,
        ..DisplayConfig::default()
    };
    let h = Harness::new(Some(FakePanel::new(DeviceInterface::Dsi, 100)), config, NOON);
    h.advance(60);
    assert_eq!(h.manager.current_level(), 20);

    h.send(TOPIC_RESET_REQUEST, json!({}));
    let reset = h.log.last_of_type(TOPIC_RESET).unwrap();
    assert_eq!(reset.get("brightness"), Some(&json!(100)));
    assert_eq!(reset.get("auto_dim"), Some(&json!(false)));
    assert_eq!(reset.get("auto_nightmode"), Some(&json!(true)));
    assert!(h.dim_due().is_none());
    assert!(h.scheduler.is_scheduled(ALARM_NIGHT_MODE));
}

#[test]
fn test_status_snapshot() {
    let h = Harness::new(
        Some(FakePanel::new(DeviceInterface::Hdmi, 60)),
        DisplayConfig::default(),
        NOON,
    );
    let status = h.manager.status();
    assert_eq!(status.interface, "HDMI");
    assert!(!status.is_night);
    assert!(status.sunset > h.clock.now());
    assert_eq!(status.pending_alarms.len(), 1);
}
