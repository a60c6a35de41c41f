//! Channel-backed press delivery.
//!
//! Press sources (a GPIO interrupt thread, a stdin injector, a test) feed
//! the sender side; the controller owns the [`ChannelButton`]. Presses that
//! arrive while the controller is busy stay queued until the next wait or
//! the next drain.

use crossbeam_channel as xch;
use soilmon_traits::{Button, Press};
use std::time::Duration;

pub struct ChannelButton {
    rx: xch::Receiver<Press>,
}

impl ChannelButton {
    #[must_use]
    pub fn new(rx: xch::Receiver<Press>) -> Self {
        Self { rx }
    }
}

/// Creates a connected press channel. Capacity bounds how many presses can
/// queue while the controller is busy; senders drop presses past that.
#[must_use]
pub fn press_channel(capacity: usize) -> (xch::Sender<Press>, ChannelButton) {
    let (tx, rx) = xch::bounded(capacity);
    (tx, ChannelButton::new(rx))
}

impl Button for ChannelButton {
    fn wait_press(&mut self) -> Result<Press, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.rx.recv()?)
    }

    fn wait_press_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Press>, Box<dyn std::error::Error + Send + Sync>> {
        match self.rx.recv_timeout(timeout) {
            Ok(press) => Ok(Some(press)),
            Err(xch::RecvTimeoutError::Timeout) => Ok(None),
            Err(e @ xch::RecvTimeoutError::Disconnected) => Err(Box::new(e)),
        }
    }

    fn drain(&mut self) -> usize {
        self.rx.try_iter().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_presses_in_order() {
        let (tx, mut button) = press_channel(8);
        tx.send(Press::Long).unwrap();
        tx.send(Press::Short).unwrap();
        assert_eq!(button.wait_press().unwrap(), Press::Long);
        assert_eq!(button.wait_press().unwrap(), Press::Short);
    }

    #[test]
    fn timeout_wait_returns_none_when_quiet() {
        let (_tx, mut button) = press_channel(8);
        let got = button.wait_press_timeout(Duration::from_millis(10)).unwrap();
        assert_eq!(got, None);
    }

    #[test]
    fn buffered_press_beats_the_timeout() {
        let (tx, mut button) = press_channel(8);
        tx.send(Press::Double).unwrap();
        let got = button.wait_press_timeout(Duration::from_secs(600)).unwrap();
        assert_eq!(got, Some(Press::Double));
    }

    #[test]
    fn drain_discards_everything_queued() {
        let (tx, mut button) = press_channel(8);
        tx.send(Press::Short).unwrap();
        tx.send(Press::Short).unwrap();
        tx.send(Press::Long).unwrap();
        assert_eq!(button.drain(), 3);
        assert_eq!(button.drain(), 0);
    }

    #[test]
    fn dropped_sender_turns_waits_into_errors() {
        let (tx, mut button) = press_channel(8);
        drop(tx);
        assert!(button.wait_press().is_err());
        assert!(
            button
                .wait_press_timeout(Duration::from_millis(10))
                .is_err()
        );
    }
}
