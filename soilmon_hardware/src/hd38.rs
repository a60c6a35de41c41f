//! HD-38 resistive moisture probe behind an MCP3008 ADC.
//!
//! The probe's analog output goes into one MCP3008 channel; the converter
//! sits on SPI0. The probe supply is switched through a GPIO pin so it is
//! only energized during a sampling window (the sampler scopes that).

use std::time::Duration;

use rppal::gpio::{Gpio, OutputPin};
use rppal::spi::{Bus, Mode, SlaveSelect, Spi};
use soilmon_traits::MoistureProbe;

use crate::error::{HwError, Result};

/// How long the supply rail needs before conversions are trustworthy. The
/// sampler adds its own settle delay on top; this only covers the pin edge.
const POWER_EDGE_DELAY: Duration = Duration::from_millis(10);

pub struct Hd38 {
    spi: Spi,
    power: OutputPin,
    channel: u8,
    powered: bool,
}

impl Hd38 {
    /// `channel` is the MCP3008 input (0..=7), `power_pin` the BCM number of
    /// the supply switch.
    pub fn new(channel: u8, power_pin: u8) -> Result<Self> {
        if channel > 7 {
            return Err(HwError::Spi(format!("mcp3008 has no channel {channel}")));
        }
        let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, 1_350_000, Mode::Mode0)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        let mut power = Gpio::new()
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .get(power_pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_output();
        power.set_low();
        Ok(Self {
            spi,
            power,
            channel,
            powered: false,
        })
    }

    fn convert(&mut self) -> Result<u16> {
        // Start bit, single-ended mode + channel, one clocked-out byte.
        let tx = [0x01, (0x08 | self.channel) << 4, 0x00];
        let mut rx = [0u8; 3];
        self.spi
            .transfer(&mut rx, &tx)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        let raw10 = (u16::from(rx[1] & 0x03) << 8) | u16::from(rx[2]);
        // Stretch the 10-bit conversion onto the probe's native u16 range.
        let raw = raw10 << 6;
        tracing::trace!(raw10, raw, "hd38 conversion");
        Ok(raw)
    }
}

impl MoistureProbe for Hd38 {
    fn power_on(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.power.set_high();
        std::thread::sleep(POWER_EDGE_DELAY);
        self.powered = true;
        Ok(())
    }

    fn read(&mut self) -> std::result::Result<u16, Box<dyn std::error::Error + Send + Sync>> {
        if !self.powered {
            return Err(Box::new(HwError::Unpowered));
        }
        Ok(self.convert()?)
    }

    fn power_off(&mut self) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.power.set_low();
        self.powered = false;
        Ok(())
    }
}
