//! Probe sampling: power sequencing, settle delay and paced reading windows.
//!
//! A window powers the probe, waits for the supply to settle, takes a fixed
//! number of spaced readings and powers back down. Resistive probes corrode
//! while energized, so power-down must happen on every exit path.

use crate::error::MonitorError;
use crate::{SamplingCfg, mapper};
use soilmon_traits::MoistureProbe;
use soilmon_traits::clock::Clock;

/// Holds the probe powered for the duration of one sampling window and
/// powers it down on drop, including the error paths out of [`sample`].
struct PowerGuard<'a, P: MoistureProbe + ?Sized> {
    probe: &'a mut P,
}

impl<'a, P: MoistureProbe + ?Sized> PowerGuard<'a, P> {
    fn engage(probe: &'a mut P) -> Result<Self, MonitorError> {
        probe.power_on().map_err(crate::map_probe_error)?;
        Ok(Self { probe })
    }

    fn read(&mut self) -> Result<u16, MonitorError> {
        self.probe.read().map_err(crate::map_probe_error)
    }
}

impl<P: MoistureProbe + ?Sized> Drop for PowerGuard<'_, P> {
    fn drop(&mut self) {
        if let Err(e) = self.probe.power_off() {
            // We may already be unwinding an error; log and move on.
            tracing::warn!(error = %e, "failed to power probe down");
        }
    }
}

/// Runs one full sampling window and returns the raw readings.
///
/// Readings are spaced `probe_interval` apart with no trailing sleep after
/// the last one, so a window takes `settle + (probe_count - 1) * interval`
/// plus conversion time. The probe is unpowered by the time this returns.
pub fn sample<P, C>(probe: &mut P, clock: &C, cfg: &SamplingCfg) -> Result<Vec<u16>, MonitorError>
where
    P: MoistureProbe + ?Sized,
    C: Clock + ?Sized,
{
    let mut guard = PowerGuard::engage(probe)?;
    clock.sleep(cfg.settle);

    let mut readings = Vec::with_capacity(cfg.probe_count as usize);
    for i in 0..cfg.probe_count {
        if i > 0 {
            clock.sleep(cfg.probe_interval);
        }
        readings.push(guard.read()?);
    }
    drop(guard);

    log_spread(&readings);
    Ok(readings)
}

/// Debug-level spread diagnostics for one window. Catches drifting supply
/// rails and loose probe wiring long before the mean moves.
fn log_spread(readings: &[u16]) {
    let Some(&min) = readings.iter().min() else {
        return;
    };
    let max = readings.iter().max().copied().unwrap_or(min);
    let mean = mapper::reduce(readings).unwrap_or(min);
    let p25 = mapper::percentile(readings, 25.0).unwrap_or_default();
    let p50 = mapper::percentile(readings, 50.0).unwrap_or_default();
    let p75 = mapper::percentile(readings, 75.0).unwrap_or_default();
    let p95 = mapper::percentile(readings, 95.0).unwrap_or_default();
    tracing::debug!(
        count = readings.len(),
        min,
        max,
        mean,
        p25,
        p50,
        p75,
        p95,
        "sampling window spread"
    );
}
