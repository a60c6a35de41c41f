//! RGB status LED renderer.
//!
//! [`GpioRgbLed`] owns a small render thread that drives the three LED
//! channels with software PWM, so blink patterns keep animating while the
//! controller is busy elsewhere. `show` only swaps the active pattern.

use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, bounded};
use rppal::gpio::{Gpio, OutputPin};
use soilmon_traits::{Indicator, IndicatorState};

use crate::error::{HwError, Result};

type Color = (u8, u8, u8);

const OFF: Color = (0, 0, 0);
const RED: Color = (255, 0, 0);
const GREEN: Color = (0, 255, 0);
const BLUE: Color = (0, 0, 255);

#[derive(Debug, Clone, Copy)]
enum Pattern {
    Solid(Color),
    /// Alternate the two colors, `half_period` per side.
    Blink(Color, Color, Duration),
}

fn pattern_for(state: IndicatorState) -> Pattern {
    let slow = Duration::from_millis(500);
    let fast = Duration::from_millis(100);
    match state {
        IndicatorState::Idle => Pattern::Solid(OFF),
        IndicatorState::Connecting => Pattern::Blink(BLUE, OFF, slow),
        IndicatorState::Ready => Pattern::Blink(GREEN, OFF, Duration::from_millis(200)),
        IndicatorState::Measuring => Pattern::Blink(RED, GREEN, slow),
        IndicatorState::AwaitDryPress => Pattern::Blink(RED, OFF, Duration::from_millis(200)),
        IndicatorState::CalibratingDry => Pattern::Solid(RED),
        IndicatorState::AwaitWetPress => Pattern::Blink(GREEN, OFF, Duration::from_millis(200)),
        IndicatorState::CalibratingWet => Pattern::Solid(GREEN),
        IndicatorState::Moisture { percent } => {
            // 0% dry = red through 100% wet = green.
            let green = u16::from(percent) * 255 / 100;
            Pattern::Solid(((255 - green) as u8, green as u8, 0))
        }
        IndicatorState::UserError => Pattern::Blink(RED, BLUE, fast),
        IndicatorState::FatalError => Pattern::Blink(RED, OFF, fast),
    }
}

struct Renderer {
    r: OutputPin,
    g: OutputPin,
    b: OutputPin,
    rx: Receiver<Pattern>,
}

impl Renderer {
    fn apply(&mut self, color: Color) {
        for (pin, value) in [
            (&mut self.r, color.0),
            (&mut self.g, color.1),
            (&mut self.b, color.2),
        ] {
            let duty = f64::from(value) / 255.0;
            if let Err(e) = pin.set_pwm_frequency(200.0, duty) {
                tracing::warn!(error = %e, "led pwm update failed");
            }
        }
    }

    fn run(mut self) {
        let mut pattern = Pattern::Solid(OFF);
        let mut phase = false;
        loop {
            let (color, wait) = match pattern {
                Pattern::Solid(c) => (c, Duration::from_secs(3600)),
                Pattern::Blink(a, b, half) => (if phase { b } else { a }, half),
            };
            self.apply(color);
            match self.rx.recv_timeout(wait) {
                Ok(next) => {
                    pattern = next;
                    phase = false;
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => phase = !phase,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    self.apply(OFF);
                    return;
                }
            }
        }
    }
}

/// Status LED on three GPIO pins (common-cathode RGB).
pub struct GpioRgbLed {
    tx: Sender<Pattern>,
}

impl GpioRgbLed {
    pub fn new(red_pin: u8, green_pin: u8, blue_pin: u8) -> Result<Self> {
        let gpio = Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let get = |pin: u8| -> Result<OutputPin> {
            Ok(gpio
                .get(pin)
                .map_err(|e| HwError::Gpio(e.to_string()))?
                .into_output_low())
        };
        let (tx, rx) = bounded(4);
        let renderer = Renderer {
            r: get(red_pin)?,
            g: get(green_pin)?,
            b: get(blue_pin)?,
            rx,
        };
        thread::spawn(move || renderer.run());
        Ok(Self { tx })
    }
}

impl Indicator for GpioRgbLed {
    fn show(&mut self, state: IndicatorState) {
        if self.tx.send(pattern_for(state)).is_err() {
            tracing::warn!("led render thread is gone");
        }
    }
}
