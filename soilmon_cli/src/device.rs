//! Collaborator assembly and command execution.
//!
//! The default build wires the simulated collaborators from
//! `soilmon_hardware`; the `hardware` feature swaps the probe, button and
//! LED for the rppal drivers. The hub wire stays simulated either way —
//! a broker-backed [`soilmon_traits::HubLink`] slots in here without
//! touching the core.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use eyre::{Result, WrapErr, bail};
use soilmon_config::Config;
use soilmon_core::button::press_channel;
use soilmon_core::hub::HubReporter;
use soilmon_core::store::JsonStore;
use soilmon_core::{Monitor, OpStatus};
use soilmon_hardware::{LoggingIndicator, SimulatedHubLink, SimulatedProbe};
use soilmon_traits::{CalibrationStore, IndicatorState, Press};

/// Presses that can queue while an operation is running; extras are dropped.
const PRESS_BUFFER: usize = 8;

#[cfg(all(feature = "hardware", target_os = "linux"))]
mod pins {
    /// MCP3008 input the HD-38 analog output is wired to.
    pub const ADC_CHANNEL: u8 = 0;
    /// BCM pin switching the probe supply.
    pub const PROBE_POWER: u8 = 17;
    /// BCM pin of the active-low control button.
    pub const BUTTON: u8 = 21;
    pub const BUTTON_POLL_MS: u64 = 10;
    /// BCM pins of the RGB status LED.
    pub const LED_RED: u8 = 23;
    pub const LED_GREEN: u8 = 24;
    pub const LED_BLUE: u8 = 25;
}

fn reporter(cfg: &Config) -> (HubReporter<SimulatedHubLink>, soilmon_hardware::LinkHandle) {
    let link = SimulatedHubLink::new();
    let handle = link.handle();
    (
        HubReporter::new(link, &cfg.device.id, cfg.publish.attempts),
        handle,
    )
}

/// Builds the monitor for the long-running commands (`run`, `calibrate`,
/// `measure`). Press events come from stdin in the simulated build.
#[cfg(not(all(feature = "hardware", target_os = "linux")))]
fn build_monitor(cfg: &Config) -> Result<Monitor> {
    let (tx, button) = press_channel(PRESS_BUFFER);
    soilmon_hardware::button::spawn_stdin_injector(tx);
    tracing::info!("simulated hardware: type short/long/double + Enter to press the button");

    Monitor::builder()
        .with_probe(SimulatedProbe::new())
        .with_button(button)
        .with_indicator(LoggingIndicator::new())
        .with_publisher(reporter(cfg).0)
        .with_store(JsonStore::new(&cfg.device.calibration_path))
        .with_sampling((&cfg.sampling).into())
        .with_timing((&cfg.timing).into())
        .try_build()
        .wrap_err("failed to assemble the monitor")
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
fn build_monitor(cfg: &Config) -> Result<Monitor> {
    use soilmon_hardware::button::{ClassifierCfg, spawn_gpio_button};
    use soilmon_hardware::hd38::Hd38;
    use soilmon_hardware::led::GpioRgbLed;

    let (tx, button) = press_channel(PRESS_BUFFER);
    spawn_gpio_button(
        pins::BUTTON,
        pins::BUTTON_POLL_MS,
        ClassifierCfg::default(),
        tx,
    )
    .wrap_err("failed to open the button pin")?;

    Monitor::builder()
        .with_probe(
            Hd38::new(pins::ADC_CHANNEL, pins::PROBE_POWER).wrap_err("failed to open the probe")?,
        )
        .with_button(button)
        .with_indicator(
            GpioRgbLed::new(pins::LED_RED, pins::LED_GREEN, pins::LED_BLUE)
                .wrap_err("failed to open the status LED")?,
        )
        .with_publisher(reporter(cfg).0)
        .with_store(JsonStore::new(&cfg.device.calibration_path))
        .with_sampling((&cfg.sampling).into())
        .with_timing((&cfg.timing).into())
        .try_build()
        .wrap_err("failed to assemble the monitor")
}

/// The device loop; runs until the shutdown flag is raised.
pub fn run(cfg: &Config, shutdown: &Arc<AtomicBool>) -> Result<()> {
    let mut monitor = build_monitor(cfg)?;
    monitor.run(shutdown)
}

/// One-shot interactive calibration.
pub fn calibrate(cfg: &Config) -> Result<()> {
    let mut monitor = build_monitor(cfg)?;
    monitor.load_calibration()?;
    println!("Starting calibration: press the button with the probe in dry soil.");
    match monitor.calibrate_device() {
        OpStatus::Completed => {
            let bounds = monitor.bounds();
            println!(
                "Calibration saved: dry {} / wet {}.",
                bounds.dry_raw, bounds.wet_raw
            );
            Ok(())
        }
        OpStatus::Rejected => bail!("another operation is in progress"),
        OpStatus::Failed(e) => Err(e.into()),
    }
}

/// One-shot measurement; prints the percentage.
pub fn measure(cfg: &Config) -> Result<()> {
    let mut monitor = build_monitor(cfg)?;
    monitor.connect_hub()?;
    monitor.load_calibration()?;
    match monitor.measure_soil_moisture() {
        OpStatus::Completed => {
            // Completed measurements always leave a cached value.
            let pct = monitor
                .last_percentage()
                .ok_or_else(|| eyre::eyre!("measurement completed without a value"))?;
            println!("Soil moisture: {pct}");
            Ok(())
        }
        OpStatus::Rejected => bail!("another operation is in progress"),
        OpStatus::Failed(e) => Err(e.into()),
    }
}

/// Deletes the stored calibration record.
pub fn reset(cfg: &Config) -> Result<()> {
    let mut store = JsonStore::new(&cfg.device.calibration_path);
    let existed = store
        .delete()
        .map_err(|e| eyre::eyre!("failed to delete calibration: {e}"))?;
    if existed {
        println!("Calibration deleted.");
    } else {
        println!("No calibration was stored.");
    }
    Ok(())
}

/// Scripted end-to-end pass over simulated hardware: calibrate with forced
/// probe levels, measure at the midpoint, and check what reached the hub.
/// Always runs the simulated collaborators, whatever features are on.
pub fn self_check(cfg: &Config) -> Result<()> {
    let dir = std::env::temp_dir().join(format!("soilmon-selfcheck-{}", std::process::id()));
    std::fs::create_dir_all(&dir).wrap_err("failed to create self-check scratch dir")?;
    let calibration_path = dir.join("calibration.json");

    let probe = SimulatedProbe::new();
    let probe_handle = probe.handle();
    let indicator = LoggingIndicator::new();
    let watcher = indicator.watcher();
    let (link_reporter, link) = reporter(cfg);
    let (tx, button) = press_channel(PRESS_BUFFER);

    let mut monitor = Monitor::builder()
        .with_probe(probe)
        .with_button(button)
        .with_indicator(indicator)
        .with_publisher(link_reporter)
        .with_store(JsonStore::new(&calibration_path))
        .with_sampling(soilmon_core::SamplingCfg {
            probe_count: 16,
            probe_interval: Duration::from_millis(1),
            settle: Duration::ZERO,
        })
        .with_timing(soilmon_core::TimingCfg {
            wakeup_interval: Duration::from_secs(1),
            hold: Duration::ZERO,
        })
        .try_build()
        .wrap_err("failed to assemble the self-check monitor")?;

    // Script the button: confirm the dry phase once the indicator asks for
    // it, then the wet phase, forcing the probe level for each.
    let presser = std::thread::spawn(move || {
        press_on(&watcher, IndicatorState::AwaitDryPress, || {
            probe_handle.force_level(40_000);
            let _ = tx.send(Press::Short);
        });
        press_on(&watcher, IndicatorState::AwaitWetPress, || {
            probe_handle.force_level(10_000);
            let _ = tx.send(Press::Short);
        });
        // Midpoint for the measurement afterwards.
        probe_handle.force_level(25_000);
    });

    let checks = (|| -> Result<()> {
        monitor.connect_hub()?;
        match monitor.calibrate_device() {
            OpStatus::Completed => {}
            other => bail!("calibration did not complete: {other:?}"),
        }
        let bounds = monitor.bounds();
        if bounds.dry_raw < 39_000 || bounds.wet_raw > 11_000 {
            bail!(
                "calibration captured unexpected bounds: dry {} wet {}",
                bounds.dry_raw,
                bounds.wet_raw
            );
        }

        match monitor.measure_soil_moisture() {
            OpStatus::Completed => {}
            other => bail!("measurement did not complete: {other:?}"),
        }
        let pct = monitor
            .last_percentage()
            .map(|p| p.value())
            .ok_or_else(|| eyre::eyre!("no measurement was cached"))?;
        if !(45..=55).contains(&pct) {
            bail!("midpoint level mapped to {pct}%, expected ~50%");
        }

        let state_topic = format!("{}/HD_38_soil_moisture_sensor/state", cfg.device.id);
        let states = link.payloads_on(&state_topic);
        let expected = format!("{pct}.0");
        if states.last() != Some(&expected) {
            bail!("hub state topic carries {states:?}, expected {expected}");
        }
        let availability = link.payloads_on(&format!("{}/availability", cfg.device.id));
        if availability.last().map(String::as_str) != Some("online") {
            bail!("availability was not announced");
        }
        Ok(())
    })();

    let _ = presser.join();
    let _ = std::fs::remove_dir_all(&dir);

    checks?;
    println!("self-check passed");
    Ok(())
}

fn press_on(
    watcher: &soilmon_hardware::IndicatorWatcher,
    state: IndicatorState,
    act: impl FnOnce(),
) {
    // The monitor drives the indicator from the same thread that waits for
    // the press, so the state always appears before the wait starts.
    for _ in 0..1_000 {
        if watcher.last() == Some(state) {
            act();
            return;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    tracing::error!(?state, "self-check never saw the expected indicator state");
}
