//! ==============================================================================
//! reconciler.rs - device/pin state and history buffers
//! ==============================================================================
//!
//! purpose:
//!     owns everything the dashboard shows: the device list, one history
//!     buffer per (device, pin) and the connection status. it is mutated only
//!     by the session task; readers get immutable copies via `view()`.
//!
//! merge rules:
//!     - snapshot load replaces devices and history outright
//!     - a push event replaces the device's pin list wholesale (no field-level
//!       merge) and appends one sample per pin to that pin's history
//!     - connect / disconnect only flip the status, nothing is cleared
//!
//! relationships:
//!     - used by: session.rs (single writer)
//!     - uses: domain.rs (validated inputs), history.rs (bounded buffers)
//!
//! ==============================================================================

use crate::domain::{CacheSnapshot, ConnectionStatus, Device, DeviceMessage, PinReading};
use crate::history::HistoryBuffer;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// device_id -> pin -> buffer
pub type HistoryMap = BTreeMap<String, BTreeMap<String, HistoryBuffer>>;

/// everything the presentation layer reads
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DashboardView {
    pub status: ConnectionStatus,
    /// in first-seen order
    pub devices: Vec<Device>,
    pub history: HistoryMap,
    /// unix timestamp (ms) of the last committed change, 0 before any
    pub last_update: u64,
}

impl DashboardView {
    pub fn history_for(&self, device_id: &str, pin: &str) -> Option<&HistoryBuffer> {
        self.history.get(device_id).and_then(|pins| pins.get(pin))
    }

    pub fn device(&self, device_id: &str) -> Option<&Device> {
        self.devices.iter().find(|d| d.device_id == device_id)
    }
}

pub struct Reconciler {
    view: DashboardView,
    max_points: usize,
}

impl Reconciler {
    pub fn new(max_points: usize) -> Self {
        Self {
            view: DashboardView::default(),
            max_points: max_points.max(1),
        }
    }

    pub fn view(&self) -> &DashboardView {
        &self.view
    }

    pub fn status(&self) -> ConnectionStatus {
        self.view.status
    }

    pub fn handle_connect(&mut self) {
        self.view.status = ConnectionStatus::Connected;
        self.touch();
    }

    pub fn handle_disconnect(&mut self) {
        self.view.status = ConnectionStatus::Disconnected;
        self.touch();
    }

    /// replace devices and history with the snapshot contents
    ///
    /// each pin's history is seeded with its whole series; its current value
    /// is the last sample, or zero on both scales when the series is empty.
    pub fn load_snapshot(&mut self, snapshot: &CacheSnapshot) {
        let mut devices = Vec::with_capacity(snapshot.devices.len());
        let mut history = HistoryMap::new();

        for series in &snapshot.devices {
            let mut pins = Vec::with_capacity(series.pins.len());
            let device_history = history.entry(series.device_id.clone()).or_default();

            for pin in &series.pins {
                let last = pin.samples.last();
                pins.push(PinReading {
                    pin: pin.pin.clone(),
                    c_temperature: last.map_or(0.0, |s| s.c_temperature),
                    f_temperature: last.map_or(0.0, |s| s.f_temperature),
                    timestamp: last.map(|s| s.timestamp),
                });
                device_history.insert(
                    pin.pin.clone(),
                    HistoryBuffer::seeded(pin.samples.iter().map(|s| (s.timestamp, s.c_temperature))),
                );
            }

            devices.push(Device {
                device_id: series.device_id.clone(),
                pins,
            });
        }

        debug!(devices = devices.len(), "snapshot loaded");
        self.view.devices = devices;
        self.view.history = history;
        self.touch();
    }

    /// merge one push event
    pub fn apply_push_event(&mut self, message: DeviceMessage) {
        let pins: Vec<PinReading> = message.pins.iter().map(|p| p.to_pin_reading()).collect();

        match self
            .view
            .devices
            .iter_mut()
            .find(|d| d.device_id == message.device_id)
        {
            Some(device) => device.pins = pins,
            None => {
                debug!(device_id = %message.device_id, "new device");
                self.view.devices.push(Device {
                    device_id: message.device_id.clone(),
                    pins,
                });
            }
        }

        let device_history = self.view.history.entry(message.device_id).or_default();
        for reading in message.pins {
            device_history
                .entry(reading.pin)
                .or_default()
                .push(reading.timestamp, reading.c_temperature, self.max_points);
        }

        self.touch();
    }

    fn touch(&mut self) {
        self.view.last_update = now_ms();
    }
}

/// current unix time in milliseconds, 0 if the clock is before the epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
