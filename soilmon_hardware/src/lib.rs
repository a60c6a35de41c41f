#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Collaborator implementations for the soil-moisture monitor.
//!
//! The simulated probe, indicator and hub link in this crate are the default
//! dev/test surface; the `hardware` feature swaps in rppal-backed drivers for
//! the HD-38 probe, the control button and the RGB status LED.

pub mod button;
pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod hd38;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod led;

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};

use soilmon_traits::{HubLink, Indicator, IndicatorState, MoistureProbe};

use crate::error::HwError;

/// Raw level the simulated probe reads in dry air.
const SIM_DRY_RAW: u16 = 40_000;
/// Raw level the simulated probe reads fully submerged.
const SIM_WET_RAW: u16 = 10_000;

/// Shared control surface of a [`SimulatedProbe`].
///
/// Tests and the self-check force the probe onto a fixed level; dropping the
/// override returns it to its free-running sweep.
#[derive(Debug, Clone, Default)]
pub struct ProbeHandle {
    forced: Arc<AtomicU16>,
    has_forced: Arc<std::sync::atomic::AtomicBool>,
}

impl ProbeHandle {
    /// Pin every subsequent reading to `level`.
    pub fn force_level(&self, level: u16) {
        self.forced.store(level, Ordering::Relaxed);
        self.has_forced.store(true, Ordering::Relaxed);
    }

    /// Return the probe to the sweep.
    pub fn release(&self) {
        self.has_forced.store(false, Ordering::Relaxed);
    }

    fn get(&self) -> Option<u16> {
        self.has_forced
            .load(Ordering::Relaxed)
            .then(|| self.forced.load(Ordering::Relaxed))
    }
}

/// Simulated moisture probe.
///
/// Sweeps a triangle wave across the plausible raw range with a little
/// xorshift jitter on top, so consecutive sampling windows produce different
/// but stable means. Reading while unpowered fails, same as the real probe.
pub struct SimulatedProbe {
    handle: ProbeHandle,
    powered: bool,
    step: u32,
    rng: u32,
}

impl SimulatedProbe {
    #[must_use]
    pub fn new() -> Self {
        Self {
            handle: ProbeHandle::default(),
            powered: false,
            step: 0,
            rng: 0x9e37_79b9,
        }
    }

    #[must_use]
    pub fn handle(&self) -> ProbeHandle {
        self.handle.clone()
    }

    fn jitter(&mut self) -> i32 {
        // xorshift32, folded down to roughly ±60 counts.
        self.rng ^= self.rng << 13;
        self.rng ^= self.rng >> 17;
        self.rng ^= self.rng << 5;
        (self.rng % 121) as i32 - 60
    }

    fn sweep_level(&self) -> u16 {
        let span = u32::from(SIM_DRY_RAW - SIM_WET_RAW);
        let phase = self.step % (2 * span);
        let offset = if phase < span { phase } else { 2 * span - phase };
        SIM_WET_RAW + offset as u16
    }
}

impl Default for SimulatedProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MoistureProbe for SimulatedProbe {
    fn power_on(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.powered = true;
        Ok(())
    }

    fn read(&mut self) -> Result<u16, Box<dyn std::error::Error + Send + Sync>> {
        if !self.powered {
            return Err(Box::new(HwError::Unpowered));
        }
        let base = self.handle.get().unwrap_or_else(|| self.sweep_level());
        // ~37 counts per read moves the sweep a few percent per window.
        self.step = self.step.wrapping_add(37);
        let level = (i32::from(base) + self.jitter()).clamp(0, i32::from(u16::MAX)) as u16;
        Ok(level)
    }

    fn power_off(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.powered = false;
        Ok(())
    }
}

/// Indicator that logs state changes and remembers the latest one.
#[derive(Default)]
pub struct LoggingIndicator {
    last: Arc<Mutex<Option<IndicatorState>>>,
}

impl LoggingIndicator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared view of the most recent state, for tests and the self-check.
    #[must_use]
    pub fn watcher(&self) -> IndicatorWatcher {
        IndicatorWatcher {
            last: Arc::clone(&self.last),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndicatorWatcher {
    last: Arc<Mutex<Option<IndicatorState>>>,
}

impl IndicatorWatcher {
    #[must_use]
    pub fn last(&self) -> Option<IndicatorState> {
        self.last.lock().map(|g| *g).unwrap_or(None)
    }
}

impl Indicator for LoggingIndicator {
    fn show(&mut self, state: IndicatorState) {
        tracing::info!(?state, "indicator");
        if let Ok(mut g) = self.last.lock() {
            *g = Some(state);
        }
    }
}

#[derive(Debug, Default)]
struct LinkInner {
    connects: usize,
    published: Vec<(String, Vec<u8>, bool)>,
    last_will: Option<(String, Vec<u8>, bool)>,
    fail_publishes: usize,
    fail_connects: usize,
}

/// Hub link that records traffic instead of touching the network.
///
/// Failures are scriptable through the shared [`LinkHandle`], which is how
/// the publisher retry tests and the self-check exercise reconnects.
#[derive(Default)]
pub struct SimulatedHubLink {
    inner: Arc<Mutex<LinkInner>>,
}

impl SimulatedHubLink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn handle(&self) -> LinkHandle {
        LinkHandle {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[derive(Clone)]
pub struct LinkHandle {
    inner: Arc<Mutex<LinkInner>>,
}

impl LinkHandle {
    fn lock(&self) -> std::sync::MutexGuard<'_, LinkInner> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Make the next `n` publishes fail with a transport error.
    pub fn fail_next_publishes(&self, n: usize) {
        self.lock().fail_publishes = n;
    }

    /// Make the next `n` connects fail.
    pub fn fail_next_connects(&self, n: usize) {
        self.lock().fail_connects = n;
    }

    #[must_use]
    pub fn connects(&self) -> usize {
        self.lock().connects
    }

    /// The registered last will, as `(topic, payload, retain)`.
    #[must_use]
    pub fn last_will(&self) -> Option<(String, Vec<u8>, bool)> {
        self.lock().last_will.clone()
    }

    /// Payloads published to `topic`, lossily decoded.
    #[must_use]
    pub fn payloads_on(&self, topic: &str) -> Vec<String> {
        self.lock()
            .published
            .iter()
            .filter(|(t, _, _)| t == topic)
            .map(|(_, p, _)| String::from_utf8_lossy(p).into_owned())
            .collect()
    }
}

impl HubLink for SimulatedHubLink {
    fn set_last_will(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut inner = self.inner.lock().map_err(|e| e.to_string())?;
        inner.last_will = Some((topic.to_owned(), payload.to_vec(), retain));
        Ok(())
    }

    fn connect(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut inner = self.inner.lock().map_err(|e| e.to_string())?;
        if inner.fail_connects > 0 {
            inner.fail_connects -= 1;
            return Err("simulated connect failure".into());
        }
        inner.connects += 1;
        tracing::debug!(connects = inner.connects, "simulated hub link connected");
        Ok(())
    }

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut inner = self.inner.lock().map_err(|e| e.to_string())?;
        if inner.fail_publishes > 0 {
            inner.fail_publishes -= 1;
            return Err("simulated publish failure".into());
        }
        tracing::debug!(topic, retain, "simulated publish");
        inner.published.push((topic.to_owned(), payload.to_vec(), retain));
        Ok(())
    }
}
