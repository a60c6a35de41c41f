pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// Analog moisture probe behind a switched supply.
///
/// Powering is split out so callers can scope it around a whole sampling
/// window instead of per read.
pub trait MoistureProbe {
    fn power_on(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn read(&mut self) -> Result<u16, Box<dyn std::error::Error + Send + Sync>>;
    fn power_off(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Edge-detected button press, already classified by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Press {
    Short,
    Long,
    Double,
}

/// Source of press events. Events that arrive while nobody is waiting stay
/// buffered, so a wait never misses an edge that preceded it.
pub trait Button {
    /// Block until the next press of any kind.
    fn wait_press(&mut self) -> Result<Press, Box<dyn std::error::Error + Send + Sync>>;

    /// Wait for a press for at most `timeout`; `Ok(None)` on timeout.
    fn wait_press_timeout(
        &mut self,
        timeout: std::time::Duration,
    ) -> Result<Option<Press>, Box<dyn std::error::Error + Send + Sync>>;

    /// Discard all buffered presses, returning how many were dropped.
    fn drain(&mut self) -> usize;
}

/// Named visual states the status indicator can render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorState {
    Connecting,
    Ready,
    Idle,
    Measuring,
    AwaitDryPress,
    CalibratingDry,
    AwaitWetPress,
    CalibratingWet,
    /// Color-coded moisture display, 0 = dry (red) through 100 = wet (green).
    Moisture { percent: u8 },
    UserError,
    FatalError,
}

/// Fire-and-forget status display.
pub trait Indicator {
    fn show(&mut self, state: IndicatorState);
}

/// Reports measurements to the home-automation hub. Implementations own
/// their retry policy; `publish_percentage` fails only once retries are
/// exhausted.
pub trait Publisher {
    fn connect(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn publish_percentage(
        &mut self,
        percent: u8,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Raw wire beneath a [`Publisher`]: one broker connection that can publish
/// a payload to a topic. Topic layout and retries live above this trait;
/// delivery quality lives below it.
pub trait HubLink {
    /// Register the payload the broker should emit on `topic` if this
    /// connection drops uncleanly. Takes effect at the next [`connect`].
    ///
    /// [`connect`]: HubLink::connect
    fn set_last_will(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    fn connect(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        retain: bool,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Raw-statistic readings captured at 0% and 100% moisture. Drier soil
/// reads higher, so a calibrated pair satisfies `dry_raw > wet_raw`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationBounds {
    pub dry_raw: u16,
    pub wet_raw: u16,
}

impl CalibrationBounds {
    /// Sentinel pair a device carries before calibration.
    pub const UNSET: Self = Self {
        dry_raw: u16::MAX,
        wet_raw: 0,
    };
}

/// Persists calibration bounds across restarts. A missing or unreadable
/// record loads as `None`, never as an error.
pub trait CalibrationStore {
    fn load(
        &mut self,
    ) -> Result<Option<CalibrationBounds>, Box<dyn std::error::Error + Send + Sync>>;
    fn save(
        &mut self,
        bounds: CalibrationBounds,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// Remove the stored record; `Ok(true)` if one existed.
    fn delete(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}
