#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core monitoring logic (hardware-agnostic).
//!
//! This crate provides the hardware-independent control core of the soil
//! moisture monitor. All hardware interactions go through the collaborator
//! traits in `soilmon_traits`.
//!
//! ## Architecture
//!
//! - **Sampling**: powered probe windows with settle delay and spacing (`sampler` module)
//! - **Mapping**: raw statistic to moisture percentage (`mapper` module)
//! - **Persistence**: JSON calibration records (`store` module)
//! - **Reporting**: hub registration and retried publishes (`hub` module)
//! - **Input**: channel-fed button presses (`button` module)
//! - **Control**: busy-gated operations and the wakeup loop (`Monitor`)
//!
//! ## Operations
//!
//! The controller exposes three user-visible operations (calibrate, measure,
//! recall last measurement) plus [`Monitor::run`], the periodic loop that
//! dispatches them from button presses and wakeup timeouts. Operations are
//! mutually exclusive through the busy flag; a request arriving while one is
//! in flight is rejected, never queued.

// Module declarations
pub mod button;
pub mod conversions;
pub mod error;
pub mod hub;
pub mod mapper;
pub mod mocks;
pub mod sampler;
pub mod store;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use soilmon_traits::clock::{Clock, MonotonicClock};
use soilmon_traits::{
    Button, CalibrationBounds, CalibrationStore, Indicator, IndicatorState, MoistureProbe, Press,
    Publisher,
};

use crate::error::{BuildError, MonitorError, Result};

pub use crate::mapper::MoisturePercentage;

type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Map a probe-side error to a typed `MonitorError`. Typed hardware faults
/// keep their structured rendering; anything else is carried as a string.
pub(crate) fn map_probe_error(e: DynError) -> MonitorError {
    #[cfg(feature = "hardware-errors")]
    if let Some(hw) = e.downcast_ref::<soilmon_hardware::error::HwError>() {
        return MonitorError::ProbeFault(hw.to_string());
    }
    MonitorError::Probe(e.to_string())
}

fn map_button_error(e: DynError) -> MonitorError {
    MonitorError::Button(e.to_string())
}

fn map_store_error(e: DynError) -> MonitorError {
    MonitorError::Store(e.to_string())
}

// Publisher implementations in this workspace raise boxed MonitorErrors;
// recover those intact and wrap anything foreign as a transport error.
fn map_publish_error(e: DynError) -> MonitorError {
    match e.downcast::<MonitorError>() {
        Ok(me) => *me,
        Err(e) => MonitorError::Transport(e.to_string()),
    }
}

/// Sampling window configuration.
#[derive(Debug, Clone)]
pub struct SamplingCfg {
    /// Probe readings per window.
    pub probe_count: u32,
    /// Delay between consecutive readings.
    pub probe_interval: Duration,
    /// Delay between probe power-up and the first reading.
    pub settle: Duration,
}

impl Default for SamplingCfg {
    fn default() -> Self {
        Self {
            probe_count: 100,
            probe_interval: Duration::from_millis(200),
            settle: Duration::from_secs(1),
        }
    }
}

/// Controller pacing configuration.
#[derive(Debug, Clone)]
pub struct TimingCfg {
    /// Gap between periodic measurements in the main loop.
    pub wakeup_interval: Duration,
    /// How long result and status displays stay up before returning to idle.
    pub hold: Duration,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            wakeup_interval: Duration::from_secs(400),
            hold: Duration::from_secs(5),
        }
    }
}

/// Public outcome of one user-visible operation.
#[derive(Debug)]
pub enum OpStatus {
    /// Ran to completion.
    Completed,
    /// Dropped because another operation held the busy flag.
    Rejected,
    /// Started and failed; the error was already logged and shown.
    Failed(MonitorError),
}

/// Scoped hold on the controller's busy flag. The flag is cleared on drop,
/// whatever path the operation takes out.
struct BusyGuard {
    flag: Arc<AtomicBool>,
}

impl BusyGuard {
    fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        if flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(Self {
                flag: Arc::clone(flag),
            })
        } else {
            None
        }
    }

    /// Unconditional hold for the startup sequence, which owns the flag by
    /// construction.
    fn hold(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::Release);
        Self {
            flag: Arc::clone(flag),
        }
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// What ended one wait in the main loop.
enum Wake {
    Press(Press),
    Interval,
    Shutdown,
}

/// How often a blocked wakeup wait re-checks the shutdown flag.
const SHUTDOWN_POLL: Duration = Duration::from_millis(200);

/// The device controller: owns the collaborators and the calibration state,
/// and serializes operations through the busy flag.
///
/// # Examples
///
/// ```
/// use soilmon_core::mocks::{FixedProbe, MemoryStore, NoopButton, NullIndicator, NullPublisher};
/// use soilmon_core::{Monitor, OpStatus, SamplingCfg, TimingCfg};
/// use soilmon_traits::CalibrationBounds;
/// use std::time::Duration;
///
/// let mut monitor = Monitor::builder()
///     .with_probe(FixedProbe { level: 25_000 })
///     .with_button(NoopButton)
///     .with_indicator(NullIndicator)
///     .with_publisher(NullPublisher)
///     .with_store(MemoryStore::new(Some(CalibrationBounds {
///         dry_raw: 40_000,
///         wet_raw: 10_000,
///     })))
///     .with_sampling(SamplingCfg {
///         probe_count: 3,
///         probe_interval: Duration::ZERO,
///         settle: Duration::ZERO,
///     })
///     .with_timing(TimingCfg {
///         wakeup_interval: Duration::from_secs(1),
///         hold: Duration::ZERO,
///     })
///     .try_build()?;
///
/// monitor.load_calibration()?;
/// assert!(matches!(monitor.measure_soil_moisture(), OpStatus::Completed));
/// assert_eq!(monitor.last_percentage().map(|p| p.value()), Some(50));
/// # Ok::<(), soilmon_core::error::Report>(())
/// ```
pub struct Monitor {
    probe: Box<dyn MoistureProbe + Send>,
    button: Box<dyn Button + Send>,
    indicator: Box<dyn Indicator + Send>,
    publisher: Box<dyn Publisher + Send>,
    store: Box<dyn CalibrationStore + Send>,
    clock: Arc<dyn Clock + Send + Sync>,
    sampling: SamplingCfg,
    timing: TimingCfg,
    busy: Arc<AtomicBool>,
    bounds: CalibrationBounds,
    calibrated: bool,
    last: Option<MoisturePercentage>,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("sampling", &self.sampling)
            .field("timing", &self.timing)
            .field("calibrated", &self.calibrated)
            .field("bounds", &self.bounds)
            .field("last", &self.last)
            .field("busy", &self.busy.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Monitor {
    /// Start building a monitor from its collaborators.
    #[must_use]
    pub fn builder() -> MonitorBuilder {
        MonitorBuilder::default()
    }

    #[must_use]
    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Most recent measurement, if any was taken since startup.
    #[must_use]
    pub fn last_percentage(&self) -> Option<MoisturePercentage> {
        self.last
    }

    /// Current calibration bounds; the sentinel pair while uncalibrated.
    #[must_use]
    pub fn bounds(&self) -> CalibrationBounds {
        self.bounds
    }

    /// Brings the hub connection up and lets the publisher announce the
    /// device. [`Monitor::run`] does this during startup; one-shot callers
    /// invoke it directly before publishing.
    pub fn connect_hub(&mut self) -> std::result::Result<(), MonitorError> {
        self.publisher.connect().map_err(map_publish_error)
    }

    /// Loads persisted calibration bounds, if any, and returns whether the
    /// device is now calibrated.
    pub fn load_calibration(&mut self) -> std::result::Result<bool, MonitorError> {
        self.calibrated = match self.store.load().map_err(map_store_error)? {
            Some(bounds) => {
                tracing::debug!(
                    dry_raw = bounds.dry_raw,
                    wet_raw = bounds.wet_raw,
                    "calibration settings loaded"
                );
                self.bounds = bounds;
                true
            }
            None => {
                tracing::debug!("no calibration settings found");
                false
            }
        };
        Ok(self.calibrated)
    }

    /// Interactive two-point calibration: dry soil first, wet soil second,
    /// each phase armed by a button press of any kind.
    ///
    /// Clears the previous calibration up front, so a failed run leaves the
    /// device uncalibrated rather than half-updated.
    pub fn calibrate_device(&mut self) -> OpStatus {
        let Some(_guard) = BusyGuard::try_acquire(&self.busy) else {
            tracing::warn!("calibration rejected, another operation is in progress");
            return OpStatus::Rejected;
        };
        tracing::info!("calibrating soil moisture sensor");
        let outcome = self.run_calibration();
        self.finish_op("calibration", outcome)
    }

    /// One full measurement: sample, map, display, publish.
    pub fn measure_soil_moisture(&mut self) -> OpStatus {
        let Some(_guard) = BusyGuard::try_acquire(&self.busy) else {
            tracing::warn!("measurement rejected, another operation is in progress");
            return OpStatus::Rejected;
        };
        tracing::info!("measuring soil moisture");
        let outcome = self.run_measurement();
        self.finish_op("measurement", outcome)
    }

    /// Re-display the cached measurement; falls back to a fresh measurement
    /// when none has been taken yet.
    pub fn last_measurement(&mut self) -> OpStatus {
        let Some(guard) = BusyGuard::try_acquire(&self.busy) else {
            tracing::warn!("last-measurement recall rejected, another operation is in progress");
            return OpStatus::Rejected;
        };
        let Some(last) = self.last else {
            drop(guard);
            return self.measure_soil_moisture();
        };
        tracing::info!(percent = last.value(), "displaying last measurement");
        let outcome = self.run_recall(last);
        self.finish_op("last-measurement recall", outcome)
    }

    /// The device main loop: connect, bootstrap calibration if needed, then
    /// alternate between button dispatch and periodic measurements until
    /// `shutdown` is raised.
    ///
    /// Operation failures are handled inside the loop; an error escaping
    /// this function is fatal and the caller is expected to restart the
    /// process.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        match self.run_inner(shutdown) {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "monitor stopped on a fatal error");
                self.indicator.show(IndicatorState::FatalError);
                self.clock.sleep(self.timing.hold);
                Err(e.into())
            }
        }
    }

    fn run_inner(&mut self, shutdown: &AtomicBool) -> std::result::Result<(), MonitorError> {
        tracing::info!("device initialization");
        let guard = BusyGuard::hold(&self.busy);

        self.indicator.show(IndicatorState::Connecting);
        self.connect_hub()?;

        self.load_calibration()?;
        let _guard = if self.calibrated {
            guard
        } else {
            tracing::info!("device is not calibrated, starting calibration");
            drop(guard);
            match self.calibrate_device() {
                OpStatus::Completed => tracing::info!("initial calibration complete"),
                OpStatus::Rejected => tracing::warn!("initial calibration rejected"),
                OpStatus::Failed(e) => {
                    // Not fatal: the device runs uncalibrated and the next
                    // long-press retries.
                    tracing::warn!(error = %e, "initial calibration failed");
                }
            }
            BusyGuard::hold(&self.busy)
        };

        tracing::info!("device is ready, running main loop");
        self.indicator.show(IndicatorState::Ready);
        self.clock.sleep(self.timing.hold);
        self.indicator.show(IndicatorState::Idle);
        drop(_guard);

        loop {
            match self.wait_wakeup(shutdown)? {
                Wake::Shutdown => {
                    tracing::info!("shutdown requested, leaving main loop");
                    return Ok(());
                }
                Wake::Interval => {
                    self.measure_soil_moisture();
                    self.discard_stale_presses();
                }
                Wake::Press(Press::Long) => {
                    self.calibrate_device();
                    self.discard_stale_presses();
                }
                Wake::Press(Press::Double) => {
                    self.last_measurement();
                    self.discard_stale_presses();
                }
                Wake::Press(Press::Short) => {
                    tracing::debug!("short press has no binding in the main loop, ignored");
                }
            }
        }
    }

    /// Wait for a press or the wakeup interval, checking the shutdown flag
    /// between short slices so a stop request never waits out the full
    /// interval.
    fn wait_wakeup(&mut self, shutdown: &AtomicBool) -> std::result::Result<Wake, MonitorError> {
        let started = self.clock.now();
        loop {
            if shutdown.load(Ordering::Relaxed) {
                return Ok(Wake::Shutdown);
            }
            let elapsed = Duration::from_millis(self.clock.ms_since(started));
            let Some(remaining) = self.timing.wakeup_interval.checked_sub(elapsed) else {
                return Ok(Wake::Interval);
            };
            if remaining.is_zero() {
                return Ok(Wake::Interval);
            }
            let slice = remaining.min(SHUTDOWN_POLL);
            if let Some(press) = self
                .button
                .wait_press_timeout(slice)
                .map_err(map_button_error)?
            {
                return Ok(Wake::Press(press));
            }
        }
    }

    /// Presses delivered while an operation was running are dropped, not
    /// queued.
    fn discard_stale_presses(&mut self) {
        let dropped = self.button.drain();
        if dropped > 0 {
            tracing::warn!(dropped, "discarding presses received while busy");
        }
    }

    /// Shared operation epilogue: on failure show the user-error state and
    /// hold it, then return to idle either way.
    fn finish_op(
        &mut self,
        operation: &'static str,
        outcome: std::result::Result<(), MonitorError>,
    ) -> OpStatus {
        let status = match outcome {
            Ok(()) => OpStatus::Completed,
            Err(e) => {
                tracing::error!(error = %e, operation, "operation failed");
                self.indicator.show(IndicatorState::UserError);
                self.clock.sleep(self.timing.hold);
                OpStatus::Failed(e)
            }
        };
        self.indicator.show(IndicatorState::Idle);
        status
    }

    fn run_calibration(&mut self) -> std::result::Result<(), MonitorError> {
        self.calibrated = false;
        self.bounds = CalibrationBounds::UNSET;
        match self.store.delete().map_err(map_store_error)? {
            true => tracing::debug!("stored calibration deleted"),
            false => tracing::debug!("no stored calibration to delete"),
        }

        self.indicator.show(IndicatorState::AwaitDryPress);
        self.button.wait_press().map_err(map_button_error)?;

        self.indicator.show(IndicatorState::CalibratingDry);
        self.bounds.dry_raw = self.sample_statistic()?;
        self.last = Some(MoisturePercentage::new(0));
        tracing::debug!(dry_raw = self.bounds.dry_raw, "dry calibration complete");

        self.indicator.show(IndicatorState::AwaitWetPress);
        self.button.wait_press().map_err(map_button_error)?;

        self.indicator.show(IndicatorState::CalibratingWet);
        self.bounds.wet_raw = self.sample_statistic()?;
        tracing::debug!(wet_raw = self.bounds.wet_raw, "wet calibration complete");

        // Drier soil must read strictly higher; equal bounds would make the
        // percentage mapping degenerate.
        if self.bounds.dry_raw <= self.bounds.wet_raw {
            return Err(MonitorError::BoundsReversed {
                dry_raw: self.bounds.dry_raw,
                wet_raw: self.bounds.wet_raw,
            });
        }
        self.last = Some(MoisturePercentage::new(100));

        self.store.save(self.bounds).map_err(map_store_error)?;
        self.calibrated = true;
        Ok(())
    }

    fn run_measurement(&mut self) -> std::result::Result<(), MonitorError> {
        if !self.calibrated {
            return Err(MonitorError::NotCalibrated);
        }
        self.indicator.show(IndicatorState::Measuring);
        let statistic = self.sample_statistic()?;
        let percentage = mapper::to_percentage(statistic, self.bounds)?;
        self.last = Some(percentage);
        tracing::debug!(
            statistic,
            percent = percentage.value(),
            "soil moisture measured"
        );

        self.indicator.show(IndicatorState::Moisture {
            percent: percentage.value(),
        });
        self.publisher
            .publish_percentage(percentage.value())
            .map_err(map_publish_error)?;
        self.clock.sleep(self.timing.hold);
        Ok(())
    }

    fn run_recall(&mut self, last: MoisturePercentage) -> std::result::Result<(), MonitorError> {
        if !self.calibrated {
            return Err(MonitorError::NotCalibrated);
        }
        self.indicator.show(IndicatorState::Moisture {
            percent: last.value(),
        });
        self.clock.sleep(self.timing.hold);
        Ok(())
    }

    fn sample_statistic(&mut self) -> std::result::Result<u16, MonitorError> {
        let readings = sampler::sample(self.probe.as_mut(), self.clock.as_ref(), &self.sampling)?;
        mapper::reduce(&readings)
    }
}

/// Builder for [`Monitor`]. Collaborators are mandatory; configuration,
/// clock and busy flag fall back to defaults.
#[derive(Default)]
pub struct MonitorBuilder {
    probe: Option<Box<dyn MoistureProbe + Send>>,
    button: Option<Box<dyn Button + Send>>,
    indicator: Option<Box<dyn Indicator + Send>>,
    publisher: Option<Box<dyn Publisher + Send>>,
    store: Option<Box<dyn CalibrationStore + Send>>,
    sampling: Option<SamplingCfg>,
    timing: Option<TimingCfg>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    busy: Option<Arc<AtomicBool>>,
}

impl MonitorBuilder {
    #[must_use]
    pub fn with_probe(mut self, probe: impl MoistureProbe + Send + 'static) -> Self {
        self.probe = Some(Box::new(probe));
        self
    }

    #[must_use]
    pub fn with_button(mut self, button: impl Button + Send + 'static) -> Self {
        self.button = Some(Box::new(button));
        self
    }

    #[must_use]
    pub fn with_indicator(mut self, indicator: impl Indicator + Send + 'static) -> Self {
        self.indicator = Some(Box::new(indicator));
        self
    }

    #[must_use]
    pub fn with_publisher(mut self, publisher: impl Publisher + Send + 'static) -> Self {
        self.publisher = Some(Box::new(publisher));
        self
    }

    #[must_use]
    pub fn with_store(mut self, store: impl CalibrationStore + Send + 'static) -> Self {
        self.store = Some(Box::new(store));
        self
    }

    #[must_use]
    pub fn with_sampling(mut self, sampling: SamplingCfg) -> Self {
        self.sampling = Some(sampling);
        self
    }

    #[must_use]
    pub fn with_timing(mut self, timing: TimingCfg) -> Self {
        self.timing = Some(timing);
        self
    }

    /// Provide a custom clock implementation; defaults to `MonotonicClock`
    /// when not provided.
    #[must_use]
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Share the busy flag with an outside observer, e.g. a status surface
    /// that wants to know whether an operation is in flight.
    #[must_use]
    pub fn with_busy_flag(mut self, busy: Arc<AtomicBool>) -> Self {
        self.busy = Some(busy);
        self
    }

    /// Fallible build; returns a detailed `BuildError` for missing pieces
    /// and unusable configuration.
    pub fn try_build(self) -> Result<Monitor> {
        let MonitorBuilder {
            probe,
            button,
            indicator,
            publisher,
            store,
            sampling,
            timing,
            clock,
            busy,
        } = self;

        let probe = probe.ok_or_else(|| eyre::Report::new(BuildError::MissingProbe))?;
        let button = button.ok_or_else(|| eyre::Report::new(BuildError::MissingButton))?;
        let indicator = indicator.ok_or_else(|| eyre::Report::new(BuildError::MissingIndicator))?;
        let publisher = publisher.ok_or_else(|| eyre::Report::new(BuildError::MissingPublisher))?;
        let store = store.ok_or_else(|| eyre::Report::new(BuildError::MissingStore))?;

        let sampling = sampling.unwrap_or_default();
        let timing = timing.unwrap_or_default();
        let clock: Arc<dyn Clock + Send + Sync> = match clock {
            Some(b) => Arc::from(b),
            None => Arc::new(MonotonicClock::new()),
        };
        let busy = busy.unwrap_or_else(|| Arc::new(AtomicBool::new(false)));

        if sampling.probe_count == 0 {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "probe_count must be >= 1",
            )));
        }
        if timing.wakeup_interval.is_zero() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "wakeup_interval must be > 0",
            )));
        }

        Ok(Monitor {
            probe,
            button,
            indicator,
            publisher,
            store,
            clock,
            sampling,
            timing,
            busy,
            bounds: CalibrationBounds::UNSET,
            calibrated: false,
            last: None,
        })
    }
}
