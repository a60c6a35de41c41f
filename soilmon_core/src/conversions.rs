//! `From` implementations bridging `soilmon_config` types to `soilmon_core` types.
//!
//! Config carries durations as plain millisecond integers for TOML; the
//! controller wants `Duration` everywhere.

use std::time::Duration;

use crate::{SamplingCfg, TimingCfg};

impl From<&soilmon_config::SamplingCfg> for SamplingCfg {
    fn from(c: &soilmon_config::SamplingCfg) -> Self {
        Self {
            probe_count: c.probe_count,
            probe_interval: Duration::from_millis(c.probe_interval_ms),
            settle: Duration::from_millis(c.settle_ms),
        }
    }
}

impl From<&soilmon_config::TimingCfg> for TimingCfg {
    fn from(c: &soilmon_config::TimingCfg) -> Self {
        Self {
            wakeup_interval: Duration::from_millis(c.wakeup_interval_ms),
            hold: Duration::from_millis(c.hold_ms),
        }
    }
}
