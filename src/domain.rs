//! ==============================================================================
//! domain.rs - device, pin and wire payload types
//! ==============================================================================
//!
//! purpose:
//!     the data the dashboard deals in, and the validation step that turns
//!     untyped upstream json into it. nothing past this module ever sees a
//!     serde_json::Value from the network.
//!
//! relationships:
//!     - used by: reconciler.rs (applies DeviceMessage / CacheSnapshot)
//!     - used by: snapshot.rs (parses GET /cache into CacheSnapshot)
//!     - used by: session.rs (parses new_message events into DeviceMessage)
//!
//! ==============================================================================

use crate::error::{DashboardError, DashboardResult};
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};
use std::collections::HashSet;

/// epoch-like event timestamp, as sent by the upstream
pub type Timestamp = i64;

// ==============================================================================
// domain types
// ==============================================================================

/// current reading of one pin on one device
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PinReading {
    pub pin: String,
    pub c_temperature: f64,
    pub f_temperature: f64,
    /// absent for pins seeded from an empty snapshot series
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

/// a device and every pin it currently reports
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Device {
    pub device_id: String,
    pub pins: Vec<PinReading>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Connected,
    #[default]
    Disconnected,
}

impl ConnectionStatus {
    pub fn label(self) -> &'static str {
        match self {
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Disconnected => "Disconnected",
        }
    }
}

// ==============================================================================
// push events
// ==============================================================================
// wire shape of a new_message event:
//     { "message": { "device_id": "...", "pins": [
//         { "pin": "...", "c_temperature": 21.5, "f_temperature": 70.7, "timestamp": 1700000000 }
//     ] } }

#[derive(Deserialize)]
struct RawEnvelope {
    message: RawDeviceMessage,
}

#[derive(Deserialize)]
struct RawDeviceMessage {
    device_id: String,
    pins: Vec<RawPin>,
}

#[derive(Deserialize)]
struct RawPin {
    pin: String,
    c_temperature: f64,
    f_temperature: f64,
    #[serde(default)]
    timestamp: Option<Number>,
}

/// one pin inside a push event; the timestamp is mandatory here
#[derive(Clone, Debug, PartialEq)]
pub struct PushReading {
    pub pin: String,
    pub c_temperature: f64,
    pub f_temperature: f64,
    pub timestamp: Timestamp,
}

impl PushReading {
    pub fn to_pin_reading(&self) -> PinReading {
        PinReading {
            pin: self.pin.clone(),
            c_temperature: self.c_temperature,
            f_temperature: self.f_temperature,
            timestamp: Some(self.timestamp),
        }
    }
}

/// a validated push event: the full current pin list of one device
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceMessage {
    pub device_id: String,
    pub pins: Vec<PushReading>,
}

impl DeviceMessage {
    /// validate the payload of a `new_message` event
    ///
    /// the message is all-or-nothing: one bad pin rejects the whole event,
    /// since a push event replaces the device's pin list wholesale.
    pub fn from_event_payload(payload: Value) -> DashboardResult<Self> {
        let raw: RawEnvelope = serde_json::from_value(payload)
            .map_err(|e| DashboardError::InvalidPayload(e.to_string()))?;
        let raw = raw.message;

        if raw.device_id.trim().is_empty() {
            return Err(DashboardError::InvalidPayload("empty device_id".into()));
        }

        let mut seen = HashSet::new();
        let mut pins = Vec::with_capacity(raw.pins.len());
        for p in raw.pins {
            if p.pin.trim().is_empty() {
                return Err(DashboardError::InvalidPayload(format!(
                    "device {}: empty pin id",
                    raw.device_id
                )));
            }
            if !seen.insert(p.pin.clone()) {
                return Err(DashboardError::InvalidPayload(format!(
                    "device {}: duplicate pin {}",
                    raw.device_id, p.pin
                )));
            }
            check_temperature(&raw.device_id, &p.pin, p.c_temperature, p.f_temperature)?;
            let timestamp = p
                .timestamp
                .as_ref()
                .and_then(parse_timestamp)
                .ok_or_else(|| {
                    DashboardError::InvalidPayload(format!(
                        "device {}: pin {} has no usable timestamp",
                        raw.device_id, p.pin
                    ))
                })?;
            pins.push(PushReading {
                pin: p.pin,
                c_temperature: p.c_temperature,
                f_temperature: p.f_temperature,
                timestamp,
            });
        }

        Ok(Self {
            device_id: raw.device_id,
            pins,
        })
    }
}

// ==============================================================================
// snapshot (GET /cache)
// ==============================================================================
// wire shape:
//     { "<device_id>": { "<pin>": [ { "timestamp", "c_temperature", "f_temperature" }, ... ] } }
//
// the map-of-maps-of-arrays structure must hold or the whole snapshot is
// rejected. individual samples that fail validation are dropped and counted.

#[derive(Deserialize)]
struct RawSample {
    #[serde(default)]
    timestamp: Option<Number>,
    c_temperature: f64,
    f_temperature: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotSample {
    pub timestamp: Timestamp,
    pub c_temperature: f64,
    pub f_temperature: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PinSeries {
    pub pin: String,
    /// chronological, oldest first (trusted from the source)
    pub samples: Vec<SnapshotSample>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeviceSeries {
    pub device_id: String,
    pub pins: Vec<PinSeries>,
}

/// validated contents of GET /cache, in upstream order
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CacheSnapshot {
    pub devices: Vec<DeviceSeries>,
    /// samples rejected during validation
    pub dropped_samples: usize,
}

impl CacheSnapshot {
    pub fn from_value(value: Value) -> DashboardResult<Self> {
        let Value::Object(devices) = value else {
            return Err(DashboardError::SnapshotFormat(
                "top level is not an object".into(),
            ));
        };

        let mut snapshot = CacheSnapshot::default();
        for (device_id, pins) in devices {
            let Value::Object(pins) = pins else {
                return Err(DashboardError::SnapshotFormat(format!(
                    "device {device_id}: pins are not an object"
                )));
            };

            let mut series = Vec::with_capacity(pins.len());
            for (pin, samples) in pins {
                let Value::Array(samples) = samples else {
                    return Err(DashboardError::SnapshotFormat(format!(
                        "device {device_id}: pin {pin}: samples are not an array"
                    )));
                };

                let mut valid = Vec::with_capacity(samples.len());
                for sample in samples {
                    match parse_sample(&device_id, &pin, sample) {
                        Some(s) => valid.push(s),
                        None => snapshot.dropped_samples += 1,
                    }
                }
                series.push(PinSeries { pin, samples: valid });
            }

            snapshot.devices.push(DeviceSeries {
                device_id,
                pins: series,
            });
        }

        Ok(snapshot)
    }
}

fn parse_sample(device_id: &str, pin: &str, sample: Value) -> Option<SnapshotSample> {
    let raw: RawSample = serde_json::from_value(sample).ok()?;
    check_temperature(device_id, pin, raw.c_temperature, raw.f_temperature).ok()?;
    let timestamp = raw.timestamp.as_ref().and_then(parse_timestamp)?;
    Some(SnapshotSample {
        timestamp,
        c_temperature: raw.c_temperature,
        f_temperature: raw.f_temperature,
    })
}

// ==============================================================================
// shared checks
// ==============================================================================

/// integer timestamps pass through, fractional ones are truncated
fn parse_timestamp(n: &Number) -> Option<Timestamp> {
    n.as_i64()
        .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as Timestamp))
}

fn check_temperature(device_id: &str, pin: &str, c: f64, f: f64) -> DashboardResult<()> {
    if c.is_finite() && f.is_finite() {
        Ok(())
    } else {
        Err(DashboardError::InvalidPayload(format!(
            "device {device_id}: pin {pin}: non-finite temperature"
        )))
    }
}
