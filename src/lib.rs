//! live temperature dashboard
//!
//! a session keeps a socket.io push channel to the sensor server, seeds its
//! state from GET /cache on every connect, merges each `new_message` event
//! into per-pin bounded histories, and publishes the result to a small axum
//! web view.

pub mod channel;
pub mod config;
pub mod domain;
pub mod error;
pub mod history;
pub mod logging;
pub mod protocol;
pub mod reconciler;
pub mod render;
pub mod server;
pub mod session;
pub mod snapshot;

pub use config::DashboardConfig;
pub use domain::{ConnectionStatus, Device, DeviceMessage, PinReading};
pub use error::{DashboardError, DashboardResult};
pub use history::{HistoryBuffer, MAX_HISTORY_POINTS};
pub use reconciler::{DashboardView, Reconciler};
pub use session::{SessionConfig, SessionHandle};
