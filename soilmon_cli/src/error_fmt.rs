//! Human-readable error descriptions and stable exit codes.

/// Map an eyre::Report to a human-readable explanation with likely causes and fix hints.
pub fn humanize(err: &eyre::Report) -> String {
    use soilmon_core::error::{BuildError, MonitorError};

    // Typed matches first
    if let Some(be) = err.downcast_ref::<BuildError>() {
        return match be {
            BuildError::MissingProbe => {
                "What happened: No moisture probe was provided to the monitor.\nLikely causes: Probe hardware failed to initialize or was not wired into the builder.\nHow to fix: Ensure the probe is created successfully and passed via with_probe(...).".to_string()
            }
            BuildError::MissingButton => {
                "What happened: No button source was provided to the monitor.\nLikely causes: The press channel was not created or the GPIO button failed to open.\nHow to fix: Create the press channel and pass its receiver via with_button(...).".to_string()
            }
            BuildError::MissingIndicator => {
                "What happened: No status indicator was provided to the monitor.\nLikely causes: The LED driver failed to initialize or was not wired into the builder.\nHow to fix: Ensure the indicator is created successfully and passed via with_indicator(...).".to_string()
            }
            BuildError::MissingPublisher => {
                "What happened: No hub publisher was provided to the monitor.\nLikely causes: The hub reporter was not assembled.\nHow to fix: Build the reporter over a hub link and pass it via with_publisher(...).".to_string()
            }
            BuildError::MissingStore => {
                "What happened: No calibration store was provided to the monitor.\nLikely causes: The calibration path was not configured.\nHow to fix: Check device.calibration_path in the config.".to_string()
            }
            BuildError::InvalidConfig(msg) => format!(
                "What happened: Invalid configuration ({msg}).\nLikely causes: Missing or out-of-range values in the TOML.\nHow to fix: Edit the config file, then rerun. See README for a sample."
            ),
        };
    }

    if let Some(me) = err.downcast_ref::<MonitorError>() {
        return match me {
            MonitorError::NotCalibrated => {
                "What happened: The device has no calibration yet.\nLikely causes: First run, or the stored calibration was reset.\nHow to fix: Run `soilmon calibrate` (or long-press the button) with the probe in dry then wet soil.".to_string()
            }
            MonitorError::BoundsReversed { dry_raw, wet_raw } => format!(
                "What happened: Calibration captured dry={dry_raw} at or below wet={wet_raw}; drier soil must read higher.\nLikely causes: The phases were swapped, or the probe was not actually in dry/wet soil.\nHow to fix: Recalibrate, confirming the dry phase first and the wet phase second."
            ),
            MonitorError::DegenerateBounds { raw } => format!(
                "What happened: Both calibration bounds read {raw}, so percentages cannot be computed.\nLikely causes: A corrupted calibration file or a probe stuck at one level.\nHow to fix: Run `soilmon reset`, then recalibrate."
            ),
            MonitorError::Transport(msg) => format!(
                "What happened: The hub could not be reached ({msg}).\nLikely causes: Broker down, wrong hub.host/hub.port, or flaky Wi-Fi.\nHow to fix: Check the broker and the [hub] section of the config, then retry."
            ),
            MonitorError::Probe(msg) | MonitorError::ProbeFault(msg) => format!(
                "What happened: The moisture probe failed ({msg}).\nLikely causes: Wiring fault, unpowered sensor rail, or SPI/ADC trouble.\nHow to fix: Check the probe wiring and supply pin, then rerun."
            ),
            MonitorError::Store(msg) => format!(
                "What happened: The calibration file could not be written ({msg}).\nLikely causes: Missing directory or no write permission at device.calibration_path.\nHow to fix: Create the directory or adjust the path in the config."
            ),
            _ => format!(
                "What happened: {me}.\nLikely causes: See logs.\nHow to fix: Re-run with --log-level=debug or set RUST_LOG for more detail."
            ),
        };
    }

    // String-based heuristics for errors coming from init or config
    let msg = err.to_string();
    let lower = msg.to_ascii_lowercase();

    if lower.contains("failed to read config") {
        return format!(
            "What happened: The config file could not be read.\nLikely causes: Wrong --config path or missing file.\nHow to fix: Point --config at an existing TOML file, or omit it to use defaults. Original: {msg}"
        );
    }

    if lower.contains("invalid config") || lower.contains("must be") || lower.contains("must not") {
        return format!(
            "What happened: Configuration is invalid.\nLikely causes: Out-of-range or malformed values in the TOML.\nHow to fix: Edit the config file and try again. Original: {msg}"
        );
    }

    // Generic fallback
    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!(
        "Something went wrong.{cause}\nHow to fix: Re-run with --log-level=debug for details. Original: {msg}"
    )
}

/// Stable exit codes per error kind; anything unclassified returns 1.
pub fn exit_code_for_error(err: &eyre::Report) -> i32 {
    use soilmon_core::error::MonitorError;
    if let Some(me) = err.downcast_ref::<MonitorError>() {
        return match me {
            MonitorError::NotCalibrated => 3,
            MonitorError::Transport(_) => 4,
            MonitorError::Probe(_) | MonitorError::ProbeFault(_) => 5,
            MonitorError::Store(_) => 6,
            _ => 1,
        };
    }
    1
}
