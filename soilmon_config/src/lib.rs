#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the soil-moisture monitor.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Every field carries a default, so an absent file or an empty table
//!   still yields a runnable configuration.
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeviceCfg {
    /// Identifier used as the hub client id and topic prefix.
    pub id: String,
    /// Path of the persisted calibration record.
    pub calibration_path: String,
}

impl Default for DeviceCfg {
    fn default() -> Self {
        Self {
            id: "soil-quality-monitor".into(),
            calibration_path: "HD-38-sensor-calibration.json".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HubCfg {
    pub host: String,
    pub port: u16,
    /// Broker keepalive in seconds; consumed by the real link only.
    pub keepalive_secs: u16,
}

impl Default for HubCfg {
    fn default() -> Self {
        Self {
            host: "homeassistant.local".into(),
            port: 1883,
            keepalive_secs: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct SamplingCfg {
    /// Probes per sampling window.
    pub probe_count: u32,
    /// Spacing between consecutive probes (ms).
    pub probe_interval_ms: u64,
    /// Supply settle delay before the first probe (ms).
    pub settle_ms: u64,
}

impl Default for SamplingCfg {
    fn default() -> Self {
        Self {
            probe_count: 100,
            probe_interval_ms: 200,
            settle_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct TimingCfg {
    /// Pause between periodic measurements (ms).
    pub wakeup_interval_ms: u64,
    /// How long ready/result/error indications stay visible (ms).
    pub hold_ms: u64,
}

impl Default for TimingCfg {
    fn default() -> Self {
        Self {
            wakeup_interval_ms: 400_000,
            hold_ms: 5_000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct PublishCfg {
    /// Publish tries before giving up, reconnecting between them.
    pub attempts: u32,
}

impl Default for PublishCfg {
    fn default() -> Self {
        Self { attempts: 10 }
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct Config {
    pub device: DeviceCfg,
    pub hub: HubCfg,
    pub sampling: SamplingCfg,
    pub timing: TimingCfg,
    pub publish: PublishCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Device
        if self.device.id.is_empty() {
            eyre::bail!("device.id must not be empty");
        }
        if self.device.id.contains(['/', '+', '#']) {
            eyre::bail!("device.id must not contain topic separators or wildcards");
        }
        if self.device.calibration_path.is_empty() {
            eyre::bail!("device.calibration_path must not be empty");
        }

        // Hub
        if self.hub.host.is_empty() {
            eyre::bail!("hub.host must not be empty");
        }
        if self.hub.keepalive_secs == 0 {
            eyre::bail!("hub.keepalive_secs must be >= 1");
        }

        // Sampling; settle_ms may be 0 (no settle wait)
        if self.sampling.probe_count == 0 {
            eyre::bail!("sampling.probe_count must be >= 1");
        }

        // Timing; hold_ms may be 0 (no visible hold)
        if self.timing.wakeup_interval_ms == 0 {
            eyre::bail!("timing.wakeup_interval_ms must be >= 1");
        }
        if self.timing.wakeup_interval_ms > 24 * 60 * 60 * 1000 {
            eyre::bail!("timing.wakeup_interval_ms is unreasonably large (>24h)");
        }
        if self.timing.hold_ms > 5 * 60 * 1000 {
            eyre::bail!("timing.hold_ms is unreasonably large (>5min)");
        }

        // Publish
        if self.publish.attempts == 0 {
            eyre::bail!("publish.attempts must be >= 1");
        }

        Ok(())
    }
}
