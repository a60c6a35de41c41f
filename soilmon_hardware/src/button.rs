//! Button press classification and press-event sources.
//!
//! [`PressClassifier`] is a pure state machine over debounced level changes;
//! the sources around it (GPIO polling thread, stdin injector) only move
//! edges in and [`Press`] events out through a channel.

use std::io::BufRead;
use std::thread;

use crossbeam_channel::Sender;
use soilmon_traits::Press;

/// Timing knobs of the classifier, all in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierCfg {
    /// Edges closer together than this are contact bounce.
    pub debounce_ms: u64,
    /// Holding at least this long makes a press long.
    pub long_ms: u64,
    /// A second press starting within this window makes a double.
    pub double_ms: u64,
}

impl Default for ClassifierCfg {
    fn default() -> Self {
        Self {
            debounce_ms: 30,
            long_ms: 1_000,
            double_ms: 350,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    /// Button is down; a long press fires the moment the threshold passes.
    Down { since_ms: u64 },
    /// Long press already emitted; swallow the release.
    WaitRelease,
    /// One short tap seen; waiting out the double-press window.
    AwaitSecond { released_ms: u64 },
    /// Second tap of a double is in progress.
    DownSecond,
}

/// Classifies debounced edges into short, long and double presses.
///
/// Feed level changes through [`on_edge`] and call [`poll`] periodically;
/// both may emit a press. A short press is only reported once the
/// double-press window has passed without a second tap, so a double never
/// leaks a spurious short first.
///
/// [`on_edge`]: PressClassifier::on_edge
/// [`poll`]: PressClassifier::poll
#[derive(Debug)]
pub struct PressClassifier {
    cfg: ClassifierCfg,
    state: State,
    last_edge_ms: Option<u64>,
}

impl PressClassifier {
    #[must_use]
    pub fn new(cfg: ClassifierCfg) -> Self {
        Self {
            cfg,
            state: State::Idle,
            last_edge_ms: None,
        }
    }

    /// Report a level change at `now_ms`; `pressed` is the new level.
    pub fn on_edge(&mut self, pressed: bool, now_ms: u64) -> Option<Press> {
        if let Some(last) = self.last_edge_ms {
            if now_ms.saturating_sub(last) < self.cfg.debounce_ms {
                return None;
            }
        }
        self.last_edge_ms = Some(now_ms);

        match (self.state, pressed) {
            (State::Idle, true) => {
                self.state = State::Down { since_ms: now_ms };
                None
            }
            (State::Down { since_ms }, false) => {
                if now_ms.saturating_sub(since_ms) >= self.cfg.long_ms {
                    self.state = State::Idle;
                    Some(Press::Long)
                } else {
                    self.state = State::AwaitSecond { released_ms: now_ms };
                    None
                }
            }
            (State::WaitRelease, false) => {
                self.state = State::Idle;
                None
            }
            (State::AwaitSecond { released_ms }, true) => {
                if now_ms.saturating_sub(released_ms) <= self.cfg.double_ms {
                    self.state = State::DownSecond;
                    None
                } else {
                    // Window expired between polls; flush the short and
                    // start a fresh press.
                    self.state = State::Down { since_ms: now_ms };
                    Some(Press::Short)
                }
            }
            (State::DownSecond, false) => {
                self.state = State::Idle;
                Some(Press::Double)
            }
            // Same level twice, or a release in Idle: nothing to do.
            _ => None,
        }
    }

    /// Advance time without an edge; flushes pending shorts and fires long
    /// presses while the button is still held.
    pub fn poll(&mut self, now_ms: u64) -> Option<Press> {
        match self.state {
            State::Down { since_ms } if now_ms.saturating_sub(since_ms) >= self.cfg.long_ms => {
                self.state = State::WaitRelease;
                Some(Press::Long)
            }
            State::AwaitSecond { released_ms }
                if now_ms.saturating_sub(released_ms) > self.cfg.double_ms =>
            {
                self.state = State::Idle;
                Some(Press::Short)
            }
            _ => None,
        }
    }
}

/// Reads `short` / `long` / `double` lines from stdin and injects them as
/// presses, for driving the simulated device interactively. The thread ends
/// when stdin closes or the receiver goes away.
pub fn spawn_stdin_injector(tx: Sender<Press>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let press = match line.trim() {
                "short" | "s" => Press::Short,
                "long" | "l" => Press::Long,
                "double" | "d" => Press::Double,
                "" => continue,
                other => {
                    tracing::warn!(input = other, "unknown press kind, try short/long/double");
                    continue;
                }
            };
            match tx.try_send(press) {
                Ok(()) => {}
                Err(crossbeam_channel::TrySendError::Full(press)) => {
                    tracing::warn!(?press, "press buffer full, dropping");
                }
                Err(crossbeam_channel::TrySendError::Disconnected(_)) => break,
            }
        }
        tracing::debug!("stdin press injector finished");
    })
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use gpio::spawn_gpio_button;

#[cfg(all(feature = "hardware", target_os = "linux"))]
mod gpio {
    use super::{ClassifierCfg, PressClassifier};
    use crate::error::HwError;
    use crossbeam_channel::Sender;
    use rppal::gpio::Gpio;
    use soilmon_traits::Press;
    use std::thread;
    use std::time::{Duration, Instant};

    /// Polls an active-low button pin and feeds classified presses into the
    /// channel. The thread runs until the receiver is dropped.
    pub fn spawn_gpio_button(
        pin: u8,
        poll_ms: u64,
        cfg: ClassifierCfg,
        tx: Sender<Press>,
    ) -> Result<thread::JoinHandle<()>, HwError> {
        let input = Gpio::new()
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .get(pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_input_pullup();

        let handle = thread::spawn(move || {
            let mut classifier = PressClassifier::new(cfg);
            let epoch = Instant::now();
            let mut level = false;
            loop {
                let now_ms = epoch.elapsed().as_millis() as u64;
                let pressed = input.is_low();
                let press = if pressed == level {
                    classifier.poll(now_ms)
                } else {
                    level = pressed;
                    classifier.on_edge(pressed, now_ms)
                };
                if let Some(press) = press {
                    tracing::debug!(?press, "button press");
                    match tx.try_send(press) {
                        Ok(()) => {}
                        Err(crossbeam_channel::TrySendError::Full(press)) => {
                            tracing::warn!(?press, "press buffer full, dropping");
                        }
                        Err(crossbeam_channel::TrySendError::Disconnected(_)) => return,
                    }
                }
                thread::sleep(Duration::from_millis(poll_ms));
            }
        });
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn classifier() -> PressClassifier {
        PressClassifier::new(ClassifierCfg::default())
    }

    #[test]
    fn short_press_fires_after_the_double_window() {
        let mut c = classifier();
        assert_eq!(c.on_edge(true, 0), None);
        assert_eq!(c.on_edge(false, 120), None);
        // Still inside the double window.
        assert_eq!(c.poll(400), None);
        assert_eq!(c.poll(500), Some(Press::Short));
        assert_eq!(c.poll(600), None);
    }

    #[test]
    fn long_press_fires_while_still_held() {
        let mut c = classifier();
        assert_eq!(c.on_edge(true, 0), None);
        assert_eq!(c.poll(999), None);
        assert_eq!(c.poll(1_000), Some(Press::Long));
        // The release is part of the same press.
        assert_eq!(c.on_edge(false, 1_500), None);
        assert_eq!(c.poll(2_000), None);
    }

    #[test]
    fn long_press_detected_on_release_without_polls() {
        let mut c = classifier();
        assert_eq!(c.on_edge(true, 0), None);
        assert_eq!(c.on_edge(false, 1_200), Some(Press::Long));
    }

    #[test]
    fn two_quick_taps_make_a_double() {
        let mut c = classifier();
        assert_eq!(c.on_edge(true, 0), None);
        assert_eq!(c.on_edge(false, 100), None);
        assert_eq!(c.on_edge(true, 300), None);
        assert_eq!(c.on_edge(false, 400), Some(Press::Double));
        // No trailing short leaks out.
        assert_eq!(c.poll(1_000), None);
    }

    #[test]
    fn slow_second_tap_flushes_a_short_first() {
        let mut c = classifier();
        assert_eq!(c.on_edge(true, 0), None);
        assert_eq!(c.on_edge(false, 100), None);
        // Second tap arrives after the window with no poll in between.
        assert_eq!(c.on_edge(true, 800), Some(Press::Short));
        assert_eq!(c.on_edge(false, 900), None);
        assert_eq!(c.poll(1_300), Some(Press::Short));
    }

    #[rstest]
    #[case(10)]
    #[case(25)]
    fn bounce_is_ignored(#[case] gap_ms: u64) {
        let mut c = classifier();
        assert_eq!(c.on_edge(true, 0), None);
        // Contact bounce right after the press edge.
        assert_eq!(c.on_edge(false, gap_ms), None);
        assert_eq!(c.on_edge(true, gap_ms + 5), None);
        // Real release later: a clean short tap.
        assert_eq!(c.on_edge(false, 200), None);
        assert_eq!(c.poll(600), Some(Press::Short));
    }

    #[test]
    fn release_in_idle_is_ignored() {
        let mut c = classifier();
        assert_eq!(c.on_edge(false, 0), None);
        assert_eq!(c.poll(1_000), None);
    }
}
