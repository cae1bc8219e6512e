//! error types for the dashboard's network boundary
//!
//! nothing here is fatal: the session logs these and carries on (reconnect,
//! empty snapshot, dropped message). only the binary's startup path turns
//! errors into a process exit, and it does that through anyhow.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("invalid upstream url: {0}")]
    InvalidUrl(String),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("socket.io protocol error: {0}")]
    Protocol(String),

    #[error("connection closed by upstream")]
    ConnectionClosed,

    #[error("no ping from upstream within {0} ms")]
    PingTimeout(u64),

    #[error("snapshot request failed: {0}")]
    SnapshotHttp(#[from] reqwest::Error),

    #[error("snapshot payload malformed: {0}")]
    SnapshotFormat(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type DashboardResult<T> = Result<T, DashboardError>;
