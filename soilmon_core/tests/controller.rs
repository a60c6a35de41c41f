use std::collections::VecDeque;
use std::error::Error;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use soilmon_core::error::MonitorError;
use soilmon_core::{Monitor, OpStatus, SamplingCfg, TimingCfg};
use soilmon_traits::{
    Button, CalibrationBounds, CalibrationStore, Clock, Indicator, IndicatorState, MoistureProbe,
    Press, Publisher,
};

/// Probe that serves one scripted level per sampling window (a window is
/// delimited by `power_on`), repeating the last level for later windows.
/// Reading while unpowered is an error so power discipline shows up in
/// operation outcomes.
struct WindowProbe {
    levels: Vec<u16>,
    windows: Arc<AtomicUsize>,
    powered: bool,
}

impl WindowProbe {
    fn new(levels: impl Into<Vec<u16>>) -> (Self, Arc<AtomicUsize>) {
        let windows = Arc::new(AtomicUsize::new(0));
        (
            Self {
                levels: levels.into(),
                windows: Arc::clone(&windows),
                powered: false,
            },
            windows,
        )
    }
}

impl MoistureProbe for WindowProbe {
    fn power_on(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.powered = true;
        self.windows.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn read(&mut self) -> Result<u16, Box<dyn Error + Send + Sync>> {
        if !self.powered {
            return Err("read while unpowered".into());
        }
        let window = self.windows.load(Ordering::Relaxed).saturating_sub(1);
        Ok(self.levels[window.min(self.levels.len() - 1)])
    }

    fn power_off(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        self.powered = false;
        Ok(())
    }
}

/// Button that replays a fixed script and then runs dry.
struct ScriptButton {
    presses: VecDeque<Press>,
}

impl ScriptButton {
    fn new(presses: impl IntoIterator<Item = Press>) -> Self {
        Self {
            presses: presses.into_iter().collect(),
        }
    }
}

impl Button for ScriptButton {
    fn wait_press(&mut self) -> Result<Press, Box<dyn Error + Send + Sync>> {
        self.presses
            .pop_front()
            .ok_or_else(|| "press script exhausted".into())
    }

    fn wait_press_timeout(
        &mut self,
        _timeout: Duration,
    ) -> Result<Option<Press>, Box<dyn Error + Send + Sync>> {
        Ok(self.presses.pop_front())
    }

    fn drain(&mut self) -> usize {
        let n = self.presses.len();
        self.presses.clear();
        n
    }
}

/// Indicator spy; the test keeps a clone to inspect the state sequence.
#[derive(Clone, Default)]
struct SpyIndicator {
    states: Arc<Mutex<Vec<IndicatorState>>>,
}

impl SpyIndicator {
    fn states(&self) -> Vec<IndicatorState> {
        self.states.lock().unwrap().clone()
    }
}

impl Indicator for SpyIndicator {
    fn show(&mut self, state: IndicatorState) {
        self.states.lock().unwrap().push(state);
    }
}

/// Publisher spy; optionally fails every publish.
#[derive(Clone, Default)]
struct SpyPublisher {
    published: Arc<Mutex<Vec<u8>>>,
    fail_publish: bool,
}

impl SpyPublisher {
    fn published(&self) -> Vec<u8> {
        self.published.lock().unwrap().clone()
    }
}

impl Publisher for SpyPublisher {
    fn connect(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }

    fn publish_percentage(&mut self, percent: u8) -> Result<(), Box<dyn Error + Send + Sync>> {
        if self.fail_publish {
            return Err("broker unreachable".into());
        }
        self.published.lock().unwrap().push(percent);
        Ok(())
    }
}

/// Store spy sharing its record with the test.
#[derive(Clone, Default)]
struct SharedStore {
    bounds: Arc<Mutex<Option<CalibrationBounds>>>,
}

impl SharedStore {
    fn preloaded(bounds: CalibrationBounds) -> Self {
        Self {
            bounds: Arc::new(Mutex::new(Some(bounds))),
        }
    }

    fn stored(&self) -> Option<CalibrationBounds> {
        *self.bounds.lock().unwrap()
    }
}

impl CalibrationStore for SharedStore {
    fn load(&mut self) -> Result<Option<CalibrationBounds>, Box<dyn Error + Send + Sync>> {
        Ok(*self.bounds.lock().unwrap())
    }

    fn save(&mut self, bounds: CalibrationBounds) -> Result<(), Box<dyn Error + Send + Sync>> {
        *self.bounds.lock().unwrap() = Some(bounds);
        Ok(())
    }

    fn delete(&mut self) -> Result<bool, Box<dyn Error + Send + Sync>> {
        Ok(self.bounds.lock().unwrap().take().is_some())
    }
}

/// Deterministic clock: real instants, skipped sleeps.
struct TestClock;

impl Clock for TestClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, _d: Duration) {}
}

fn calibrated_bounds() -> CalibrationBounds {
    CalibrationBounds {
        dry_raw: 40_000,
        wet_raw: 10_000,
    }
}

fn build_monitor(
    probe: WindowProbe,
    button: ScriptButton,
    indicator: SpyIndicator,
    publisher: SpyPublisher,
    store: SharedStore,
) -> Monitor {
    Monitor::builder()
        .with_probe(probe)
        .with_button(button)
        .with_indicator(indicator)
        .with_publisher(publisher)
        .with_store(store)
        .with_sampling(SamplingCfg {
            probe_count: 4,
            probe_interval: Duration::ZERO,
            settle: Duration::ZERO,
        })
        .with_timing(TimingCfg {
            wakeup_interval: Duration::from_millis(50),
            hold: Duration::ZERO,
        })
        .with_clock(Box::new(TestClock))
        .try_build()
        .expect("build monitor")
}

#[test]
fn measurement_maps_and_publishes_the_statistic() {
    let (probe, _) = WindowProbe::new([25_000]);
    let indicator = SpyIndicator::default();
    let publisher = SpyPublisher::default();
    let store = SharedStore::preloaded(calibrated_bounds());
    let mut monitor = build_monitor(
        probe,
        ScriptButton::new([]),
        indicator.clone(),
        publisher.clone(),
        store,
    );

    assert!(monitor.load_calibration().expect("load"));
    assert!(matches!(
        monitor.measure_soil_moisture(),
        OpStatus::Completed
    ));

    assert_eq!(monitor.last_percentage().map(|p| p.value()), Some(50));
    assert_eq!(publisher.published(), vec![50]);
    let states = indicator.states();
    assert!(states.contains(&IndicatorState::Measuring));
    assert!(states.contains(&IndicatorState::Moisture { percent: 50 }));
    assert_eq!(states.last(), Some(&IndicatorState::Idle));
    assert!(!monitor.is_busy());
}

#[test]
fn measurement_without_calibration_is_a_user_error() {
    let (probe, windows) = WindowProbe::new([25_000]);
    let indicator = SpyIndicator::default();
    let publisher = SpyPublisher::default();
    let mut monitor = build_monitor(
        probe,
        ScriptButton::new([]),
        indicator.clone(),
        publisher.clone(),
        SharedStore::default(),
    );

    match monitor.measure_soil_moisture() {
        OpStatus::Failed(MonitorError::NotCalibrated) => {}
        other => panic!("expected NotCalibrated, got {other:?}"),
    }

    // No sampling ran, nothing was published, and the indicator walked
    // through user-error back to idle.
    assert_eq!(windows.load(Ordering::Relaxed), 0);
    assert!(publisher.published().is_empty());
    let states = indicator.states();
    assert!(states.contains(&IndicatorState::UserError));
    assert_eq!(states.last(), Some(&IndicatorState::Idle));
    assert!(!monitor.is_busy());
}

#[test]
fn calibration_runs_dry_then_wet_and_persists() {
    let (probe, _) = WindowProbe::new([40_000, 10_000]);
    let indicator = SpyIndicator::default();
    let store = SharedStore::default();
    // Any press kind confirms a phase.
    let button = ScriptButton::new([Press::Short, Press::Double]);
    let mut monitor = build_monitor(
        probe,
        button,
        indicator.clone(),
        SpyPublisher::default(),
        store.clone(),
    );

    assert!(matches!(monitor.calibrate_device(), OpStatus::Completed));

    assert!(monitor.is_calibrated());
    assert_eq!(monitor.bounds(), calibrated_bounds());
    assert_eq!(store.stored(), Some(calibrated_bounds()));
    assert_eq!(monitor.last_percentage().map(|p| p.value()), Some(100));
    assert_eq!(
        indicator.states(),
        vec![
            IndicatorState::AwaitDryPress,
            IndicatorState::CalibratingDry,
            IndicatorState::AwaitWetPress,
            IndicatorState::CalibratingWet,
            IndicatorState::Idle,
        ]
    );
    assert!(!monitor.is_busy());
}

#[test]
fn calibration_rejects_wet_reading_at_or_above_dry() {
    // Wet soil must read strictly below dry soil.
    let (probe, _) = WindowProbe::new([10_000, 40_000]);
    let store = SharedStore::preloaded(calibrated_bounds());
    let indicator = SpyIndicator::default();
    let mut monitor = build_monitor(
        probe,
        ScriptButton::new([Press::Short, Press::Short]),
        indicator.clone(),
        SpyPublisher::default(),
        store.clone(),
    );

    match monitor.calibrate_device() {
        OpStatus::Failed(MonitorError::BoundsReversed { dry_raw, wet_raw }) => {
            assert_eq!((dry_raw, wet_raw), (10_000, 40_000));
        }
        other => panic!("expected BoundsReversed, got {other:?}"),
    }

    // The old record was cleared up front and nothing new was saved.
    assert!(!monitor.is_calibrated());
    assert_eq!(store.stored(), None);
    // The dry-phase placeholder survives; the wet placeholder was never set.
    assert_eq!(monitor.last_percentage().map(|p| p.value()), Some(0));
    let states = indicator.states();
    assert!(states.contains(&IndicatorState::UserError));
    assert_eq!(states.last(), Some(&IndicatorState::Idle));
    assert!(!monitor.is_busy());
}

#[test]
fn operations_are_rejected_while_busy() {
    let (probe, windows) = WindowProbe::new([25_000]);
    let busy = Arc::new(AtomicBool::new(false));
    let publisher = SpyPublisher::default();
    let indicator = SpyIndicator::default();
    let mut monitor = Monitor::builder()
        .with_probe(probe)
        .with_button(ScriptButton::new([Press::Short, Press::Short]))
        .with_indicator(indicator.clone())
        .with_publisher(publisher.clone())
        .with_store(SharedStore::preloaded(calibrated_bounds()))
        .with_clock(Box::new(TestClock))
        .with_busy_flag(Arc::clone(&busy))
        .try_build()
        .expect("build monitor");
    monitor.load_calibration().expect("load");

    busy.store(true, Ordering::Release);
    assert!(matches!(monitor.measure_soil_moisture(), OpStatus::Rejected));
    assert!(matches!(monitor.calibrate_device(), OpStatus::Rejected));
    assert!(matches!(monitor.last_measurement(), OpStatus::Rejected));

    // A rejected operation has no effect: no sampling, no publish, no
    // indicator traffic, and it must not clear a flag it never took.
    assert_eq!(windows.load(Ordering::Relaxed), 0);
    assert!(publisher.published().is_empty());
    assert!(indicator.states().is_empty());
    assert!(busy.load(Ordering::Acquire));

    busy.store(false, Ordering::Release);
    assert!(matches!(
        monitor.measure_soil_moisture(),
        OpStatus::Completed
    ));
}

#[test]
fn busy_flag_is_released_after_failed_operations() {
    let (probe, _) = WindowProbe::new([25_000]);
    let mut monitor = build_monitor(
        probe,
        ScriptButton::new([]),
        SpyIndicator::default(),
        SpyPublisher::default(),
        SharedStore::default(),
    );

    // Measurement fails (not calibrated), calibration fails (press script
    // exhausted); the flag must come back each time.
    assert!(matches!(
        monitor.measure_soil_moisture(),
        OpStatus::Failed(MonitorError::NotCalibrated)
    ));
    assert!(!monitor.is_busy());

    match monitor.calibrate_device() {
        OpStatus::Failed(MonitorError::Button(_)) => {}
        other => panic!("expected Button error, got {other:?}"),
    }
    assert!(!monitor.is_busy());
}

#[test]
fn recall_delegates_to_measurement_when_nothing_is_cached() {
    let (probe, windows) = WindowProbe::new([25_000]);
    let publisher = SpyPublisher::default();
    let mut monitor = build_monitor(
        probe,
        ScriptButton::new([]),
        SpyIndicator::default(),
        publisher.clone(),
        SharedStore::preloaded(calibrated_bounds()),
    );
    monitor.load_calibration().expect("load");

    assert!(matches!(monitor.last_measurement(), OpStatus::Completed));

    // A full measurement ran on its behalf.
    assert_eq!(windows.load(Ordering::Relaxed), 1);
    assert_eq!(publisher.published(), vec![50]);
    assert_eq!(monitor.last_percentage().map(|p| p.value()), Some(50));
}

#[test]
fn recall_replays_the_cache_without_sampling() {
    let (probe, windows) = WindowProbe::new([25_000]);
    let indicator = SpyIndicator::default();
    let publisher = SpyPublisher::default();
    let mut monitor = build_monitor(
        probe,
        ScriptButton::new([]),
        indicator.clone(),
        publisher.clone(),
        SharedStore::preloaded(calibrated_bounds()),
    );
    monitor.load_calibration().expect("load");

    assert!(matches!(
        monitor.measure_soil_moisture(),
        OpStatus::Completed
    ));
    assert!(matches!(monitor.last_measurement(), OpStatus::Completed));

    // Recall neither samples nor publishes; it only re-displays.
    assert_eq!(windows.load(Ordering::Relaxed), 1);
    assert_eq!(publisher.published(), vec![50]);
    let moisture_shows = indicator
        .states()
        .iter()
        .filter(|s| matches!(s, IndicatorState::Moisture { percent: 50 }))
        .count();
    assert_eq!(moisture_shows, 2);
}

#[test]
fn recall_with_cache_still_requires_calibration() {
    // A failed calibration leaves a cached placeholder (0%) on an
    // uncalibrated device; recalling it must fail, not display.
    let (probe, _) = WindowProbe::new([10_000, 40_000]);
    let indicator = SpyIndicator::default();
    let mut monitor = build_monitor(
        probe,
        ScriptButton::new([Press::Short, Press::Short]),
        indicator.clone(),
        SpyPublisher::default(),
        SharedStore::default(),
    );

    assert!(matches!(
        monitor.calibrate_device(),
        OpStatus::Failed(MonitorError::BoundsReversed { .. })
    ));
    assert_eq!(monitor.last_percentage().map(|p| p.value()), Some(0));

    match monitor.last_measurement() {
        OpStatus::Failed(MonitorError::NotCalibrated) => {}
        other => panic!("expected NotCalibrated, got {other:?}"),
    }
    assert!(!indicator
        .states()
        .iter()
        .any(|s| matches!(s, IndicatorState::Moisture { .. })));
}

#[test]
fn publish_failure_keeps_the_measurement_and_surfaces_transport_error() {
    let (probe, _) = WindowProbe::new([25_000]);
    let publisher = SpyPublisher {
        fail_publish: true,
        ..SpyPublisher::default()
    };
    let indicator = SpyIndicator::default();
    let mut monitor = build_monitor(
        probe,
        ScriptButton::new([]),
        indicator.clone(),
        publisher,
        SharedStore::preloaded(calibrated_bounds()),
    );
    monitor.load_calibration().expect("load");

    match monitor.measure_soil_moisture() {
        OpStatus::Failed(MonitorError::Transport(_)) => {}
        other => panic!("expected Transport error, got {other:?}"),
    }

    // The reading itself succeeded and stays cached.
    assert_eq!(monitor.last_percentage().map(|p| p.value()), Some(50));
    assert!(!monitor.is_busy());
}

#[test]
fn degenerate_stored_bounds_fail_measurement_without_crashing() {
    let (probe, _) = WindowProbe::new([500]);
    let mut monitor = build_monitor(
        probe,
        ScriptButton::new([]),
        SpyIndicator::default(),
        SpyPublisher::default(),
        SharedStore::preloaded(CalibrationBounds {
            dry_raw: 500,
            wet_raw: 500,
        }),
    );
    assert!(monitor.load_calibration().expect("load"));

    match monitor.measure_soil_moisture() {
        OpStatus::Failed(MonitorError::DegenerateBounds { raw: 500 }) => {}
        other => panic!("expected DegenerateBounds, got {other:?}"),
    }
    assert!(!monitor.is_busy());
}
