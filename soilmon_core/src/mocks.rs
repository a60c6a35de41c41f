//! Test and helper mocks for soilmon_core

use soilmon_traits::{
    Button, CalibrationBounds, CalibrationStore, Indicator, IndicatorState, MoistureProbe, Press,
    Publisher,
};

/// A probe that reads a fixed level; powering is a no-op.
pub struct FixedProbe {
    pub level: u16,
}

impl MoistureProbe for FixedProbe {
    fn power_on(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }

    fn read(&mut self) -> Result<u16, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.level)
    }

    fn power_off(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// A button nobody presses: timed waits run out their timeout, blocking
/// waits error.
pub struct NoopButton;

impl Button for NoopButton {
    fn wait_press(&mut self) -> Result<Press, Box<dyn std::error::Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("noop button")))
    }

    fn wait_press_timeout(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<Option<Press>, Box<dyn std::error::Error + Send + Sync>> {
        std::thread::sleep(timeout);
        Ok(None)
    }

    fn drain(&mut self) -> usize {
        0
    }
}

/// An indicator that discards every state change.
pub struct NullIndicator;

impl Indicator for NullIndicator {
    fn show(&mut self, _state: IndicatorState) {}
}

/// A publisher that accepts everything and reports nothing.
pub struct NullPublisher;

impl Publisher for NullPublisher {
    fn connect(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }

    fn publish_percentage(
        &mut self,
        _percent: u8,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Ok(())
    }
}

/// In-memory calibration store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    bounds: Option<CalibrationBounds>,
}

impl MemoryStore {
    #[must_use]
    pub fn new(bounds: Option<CalibrationBounds>) -> Self {
        Self { bounds }
    }
}

impl CalibrationStore for MemoryStore {
    fn load(
        &mut self,
    ) -> Result<Option<CalibrationBounds>, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.bounds)
    }

    fn save(
        &mut self,
        bounds: CalibrationBounds,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.bounds = Some(bounds);
        Ok(())
    }

    fn delete(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.bounds.take().is_some())
    }
}
