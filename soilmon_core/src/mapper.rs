//! Raw-reading statistics and the raw-to-moisture percentage mapping.

use crate::error::MonitorError;
use soilmon_traits::CalibrationBounds;

/// Moisture level as a whole percentage in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MoisturePercentage(u8);

impl MoisturePercentage {
    /// Wraps a percentage, clamping anything above 100 down to 100.
    #[must_use]
    pub fn new(percent: u8) -> Self {
        Self(percent.min(100))
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

impl std::fmt::Display for MoisturePercentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Collapses a window of raw probe readings into a single statistic.
///
/// Truncated integer mean over the whole window. A full window is ~100
/// readings, so single-sample noise moves the statistic by at most one
/// percent of its own magnitude.
pub fn reduce(readings: &[u16]) -> Result<u16, MonitorError> {
    if readings.is_empty() {
        return Err(MonitorError::EmptySample);
    }
    let sum: u64 = readings.iter().copied().map(u64::from).sum();
    Ok((sum / readings.len() as u64) as u16)
}

/// Maps a raw statistic onto the calibrated dry..wet span.
///
/// The dry bound maps to 0%, the wet bound to 100%, and readings outside
/// the span clamp to the nearest end. Resistive probes read higher when
/// dry, so with well-ordered bounds the mapping is non-increasing in the
/// raw statistic. Equal bounds cannot be mapped and are rejected; the
/// orientation itself is not checked here.
pub fn to_percentage(
    statistic: u16,
    bounds: CalibrationBounds,
) -> Result<MoisturePercentage, MonitorError> {
    if bounds.dry_raw == bounds.wet_raw {
        return Err(MonitorError::DegenerateBounds { raw: bounds.dry_raw });
    }
    let num = (i64::from(statistic) - i64::from(bounds.dry_raw)) * 100;
    let den = i64::from(bounds.wet_raw) - i64::from(bounds.dry_raw);
    let pct = (num / den).clamp(0, 100);
    Ok(MoisturePercentage(pct as u8))
}

/// Linearly interpolated percentile of a reading window.
///
/// `q` is the percentile in `0..=100`; out-of-range values clamp to the
/// nearest end of the sorted window. Rank is `q/100 * (n-1)` with the
/// fractional part interpolated between the two neighboring readings.
pub fn percentile(readings: &[u16], q: f64) -> Result<f64, MonitorError> {
    if readings.is_empty() {
        return Err(MonitorError::EmptySample);
    }
    let mut sorted = readings.to_vec();
    sorted.sort_unstable();
    let top = (sorted.len() - 1) as f64;
    let rank = ((q / 100.0) * top).clamp(0.0, top);
    let lower = rank as usize;
    let frac = rank - lower as f64;
    match sorted.get(lower + 1) {
        Some(&upper) => {
            let base = f64::from(sorted[lower]);
            Ok(base + frac * (f64::from(upper) - base))
        }
        None => Ok(f64::from(sorted[lower])),
    }
}
