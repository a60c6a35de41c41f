//! Hub announcement and measurement reporting.
//!
//! [`HubReporter`] owns the topic layout, the device registration payload
//! and the publish retry policy. The broker connection itself stays behind
//! [`HubLink`], so the same reporter drives real and simulated transports.

use serde_json::json;
use soilmon_traits::{HubLink, Publisher};

use crate::error::MonitorError;

/// Hub-side identity of the moisture sensor component.
const SENSOR_ID: &str = "HD_38_soil_moisture_sensor";

/// Publishes device registration on connect and moisture levels afterwards,
/// reconnecting the link between failed publish attempts.
pub struct HubReporter<L: HubLink> {
    link: L,
    device_id: String,
    state_topic: String,
    attempts: u32,
}

impl<L: HubLink> HubReporter<L> {
    pub fn new(link: L, device_id: &str, attempts: u32) -> Self {
        Self {
            link,
            device_id: device_id.to_owned(),
            state_topic: format!("{device_id}/{SENSOR_ID}/state"),
            attempts,
        }
    }

    /// Topic the hub watches for moisture state updates.
    #[must_use]
    pub fn state_topic(&self) -> &str {
        &self.state_topic
    }

    fn announce(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let registration = json!({
            "device": {
                "identifiers": self.device_id,
                "name": self.device_id,
                "manufacturer": "TheSonOfDeimos",
                "model": "Raspberry Pi Pico W",
            },
            "origin": {
                "name": "SQM OS",
                "sw_version": "1.0",
            },
            "components": {
                SENSOR_ID: {
                    "unique_id": SENSOR_ID,
                    "platform": "sensor",
                    "device_class": "moisture",
                    "unit_of_measurement": "%",
                    "state_topic": self.state_topic,
                },
            },
        });
        let topic = format!("homeassistant/device/{}/config", self.device_id);
        self.link
            .publish(&topic, registration.to_string().as_bytes(), true)
    }
}

impl<L: HubLink> Publisher for HubReporter<L> {
    /// Brings the link up and announces the device: last will set to mark
    /// the device offline, availability flipped to online, then the
    /// registration payload. All three are retained so the hub recovers
    /// the device state after its own restarts.
    fn connect(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::debug!(device_id = %self.device_id, "connecting to hub");
        let availability_topic = format!("{}/availability", self.device_id);
        self.link
            .set_last_will(&availability_topic, b"offline", true)?;
        self.link.connect()?;
        self.link.publish(&availability_topic, b"online", true)?;
        self.announce()?;
        tracing::info!(device_id = %self.device_id, "registered with hub");
        Ok(())
    }

    fn publish_percentage(
        &mut self,
        percent: u8,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if percent > 100 {
            return Err(Box::new(MonitorError::PercentOutOfRange(percent)));
        }

        // Hub expects the level as a decimal string, e.g. "50.0".
        let payload = format!("{:.1}", f64::from(percent));
        for attempt in 1..=self.attempts {
            match self.link.publish(&self.state_topic, payload.as_bytes(), true) {
                Ok(()) => {
                    tracing::debug!(percent, "moisture level published");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        attempt,
                        attempts = self.attempts,
                        "publish failed, reconnecting"
                    );
                    if attempt < self.attempts {
                        if let Err(e) = self.link.connect() {
                            tracing::warn!(error = %e, "reconnect failed");
                        }
                    }
                }
            }
        }
        Err(Box::new(MonitorError::Transport(format!(
            "gave up publishing moisture level after {} attempts",
            self.attempts
        ))))
    }
}
