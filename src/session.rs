//! ==============================================================================
//! session.rs - the single writer
//! ==============================================================================
//!
//! purpose:
//!     runs the event loop that owns the Reconciler. every input is applied
//!     to the reconciler in full and then published as one immutable view, so
//!     readers never see half of a push event. two sources feed it:
//!
//! ```text
//!     push channel  --mpsc-->  ┌─────────────┐  --watch-->  http handlers
//!     snapshot task --mpsc-->  │   session   │              (read only)
//!                              └─────────────┘
//! ```
//!
//! lifecycle:
//!     - Connected bumps the generation and spawns exactly one snapshot fetch
//!       tagged with it; a result whose generation is no longer current is
//!       discarded instead of overwriting newer state
//!     - Disconnected only flips the status
//!     - shutdown (or dropping the handle) aborts the channel task and any
//!       fetch still in flight; late results have nowhere to land
//!
//! ==============================================================================

use crate::channel::{self, ChannelConfig, ChannelEvent};
use crate::domain::{CacheSnapshot, DeviceMessage};
use crate::error::DashboardResult;
use crate::reconciler::{DashboardView, Reconciler};
use crate::snapshot::SnapshotClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;

/// socket.io event carrying device readings
pub const NEW_MESSAGE_EVENT: &str = "new_message";

const CHANNEL_QUEUE: usize = 256;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub base_url: Url,
    pub reconnect_delay: Duration,
    pub snapshot_timeout: Duration,
    pub max_points: usize,
    /// log every accepted reading at info instead of debug
    pub show_sensor_data: bool,
}

pub type ViewReceiver = watch::Receiver<Arc<DashboardView>>;

struct SnapshotOutcome {
    generation: u64,
    result: DashboardResult<CacheSnapshot>,
}

/// handle to a running session
pub struct SessionHandle {
    view: ViewReceiver,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SessionHandle {
    /// latest committed view, updated after every applied input
    pub fn subscribe(&self) -> ViewReceiver {
        self.view.clone()
    }

    /// stop the channel, abandon any in-flight fetch, end the loop
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.task.await {
            error!(error = %e, "session task failed");
        }
    }
}

/// start the push channel and the session loop
pub fn spawn(config: SessionConfig) -> DashboardResult<SessionHandle> {
    let channel_config = ChannelConfig::new(&config.base_url, config.reconnect_delay)?;
    let snapshots = SnapshotClient::new(&config.base_url, config.snapshot_timeout)?;
    info!(
        socket = %channel_config.socket_url,
        cache = %snapshots.url(),
        "starting session"
    );

    let (channel_tx, channel_rx) = mpsc::channel(CHANNEL_QUEUE);
    let channel_task = tokio::spawn(channel::run(channel_config, channel_tx));

    let (session, view) = Session::new(&config, snapshots);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task = tokio::spawn(session.run(channel_rx, shutdown_rx, channel_task));

    Ok(SessionHandle {
        view,
        shutdown: shutdown_tx,
        task,
    })
}

struct Session {
    reconciler: Reconciler,
    generation: u64,
    view_tx: watch::Sender<Arc<DashboardView>>,
    snapshots: SnapshotClient,
    snapshot_tx: mpsc::Sender<SnapshotOutcome>,
    snapshot_rx: mpsc::Receiver<SnapshotOutcome>,
    in_flight: Option<JoinHandle<()>>,
    show_sensor_data: bool,
}

impl Session {
    fn new(config: &SessionConfig, snapshots: SnapshotClient) -> (Self, ViewReceiver) {
        let reconciler = Reconciler::new(config.max_points);
        let (view_tx, view_rx) = watch::channel(Arc::new(reconciler.view().clone()));
        let (snapshot_tx, snapshot_rx) = mpsc::channel(4);
        let session = Self {
            reconciler,
            generation: 0,
            view_tx,
            snapshots,
            snapshot_tx,
            snapshot_rx,
            in_flight: None,
            show_sensor_data: config.show_sensor_data,
        };
        (session, view_rx)
    }

    async fn run(
        mut self,
        mut channel_rx: mpsc::Receiver<ChannelEvent>,
        mut shutdown_rx: oneshot::Receiver<()>,
        channel_task: JoinHandle<()>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                event = channel_rx.recv() => match event {
                    Some(event) => self.on_channel_event(event),
                    None => break,
                },
                Some(outcome) = self.snapshot_rx.recv() => self.on_snapshot(outcome),
            }
        }

        channel_task.abort();
        if let Some(fetch) = self.in_flight.take() {
            fetch.abort();
        }
        info!(generation = self.generation, "session stopped");
    }

    fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {
                self.reconciler.handle_connect();
                self.generation += 1;
                self.publish();
                self.request_snapshot();
            }
            ChannelEvent::Disconnected => {
                self.reconciler.handle_disconnect();
                self.publish();
            }
            ChannelEvent::Event { name, payload } if name == NEW_MESSAGE_EVENT => {
                match DeviceMessage::from_event_payload(payload) {
                    Ok(message) => self.on_device_message(message),
                    Err(e) => warn!(error = %e, "dropping malformed push event"),
                }
            }
            ChannelEvent::Event { name, .. } => debug!(event = %name, "ignoring event"),
        }
    }

    fn on_device_message(&mut self, message: DeviceMessage) {
        for p in &message.pins {
            if self.show_sensor_data {
                info!(
                    device_id = %message.device_id,
                    pin = %p.pin,
                    "{:.1}°C | {:.1}°F",
                    p.c_temperature,
                    p.f_temperature
                );
            } else {
                debug!(device_id = %message.device_id, pin = %p.pin, c = p.c_temperature, "reading");
            }
        }
        self.reconciler.apply_push_event(message);
        self.publish();
    }

    fn request_snapshot(&mut self) {
        if let Some(stale) = self.in_flight.take() {
            stale.abort();
        }

        let generation = self.generation;
        let snapshots = self.snapshots.clone();
        let tx = self.snapshot_tx.clone();
        self.in_flight = Some(tokio::spawn(async move {
            let result = snapshots.fetch().await;
            let _ = tx.send(SnapshotOutcome { generation, result }).await;
        }));
    }

    fn on_snapshot(&mut self, outcome: SnapshotOutcome) {
        if outcome.generation != self.generation {
            debug!(
                generation = outcome.generation,
                current = self.generation,
                "discarding snapshot from an earlier connection"
            );
            return;
        }
        self.in_flight = None;

        match outcome.result {
            Ok(snapshot) => {
                info!(
                    generation = outcome.generation,
                    devices = snapshot.devices.len(),
                    "snapshot applied"
                );
                self.reconciler.load_snapshot(&snapshot);
                self.publish();
            }
            Err(e) => error!(
                generation = outcome.generation,
                error = %e,
                "error loading initial data, keeping current state"
            ),
        }
    }

    fn publish(&self) {
        self.view_tx.send_replace(Arc::new(self.reconciler.view().clone()));
    }
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConnectionStatus, DeviceSeries, PinSeries, SnapshotSample};
    use crate::error::DashboardError;
    use serde_json::json;

    fn test_session() -> (Session, ViewReceiver) {
        test_session_at("http://127.0.0.1:9", Duration::from_millis(200))
    }

    fn test_session_at(base_url: &str, snapshot_timeout: Duration) -> (Session, ViewReceiver) {
        let config = SessionConfig {
            base_url: Url::parse(base_url).unwrap(),
            reconnect_delay: Duration::from_millis(10),
            snapshot_timeout,
            max_points: 20,
            show_sensor_data: false,
        };
        let snapshots = SnapshotClient::new(&config.base_url, config.snapshot_timeout).unwrap();
        Session::new(&config, snapshots)
    }

    fn snapshot_with(device_id: &str) -> CacheSnapshot {
        CacheSnapshot {
            devices: vec![DeviceSeries {
                device_id: device_id.into(),
                pins: vec![PinSeries {
                    pin: "A".into(),
                    samples: vec![SnapshotSample {
                        timestamp: 1,
                        c_temperature: 5.0,
                        f_temperature: 41.0,
                    }],
                }],
            }],
            dropped_samples: 0,
        }
    }

    fn new_message(device_id: &str, c: f64, ts: i64) -> ChannelEvent {
        ChannelEvent::Event {
            name: NEW_MESSAGE_EVENT.into(),
            payload: json!({
                "message": {
                    "device_id": device_id,
                    "pins": [{ "pin": "A", "c_temperature": c, "f_temperature": c * 1.8 + 32.0, "timestamp": ts }]
                }
            }),
        }
    }

    #[tokio::test]
    async fn test_connect_publishes_status_and_bumps_generation() {
        let (mut session, view) = test_session();
        session.on_channel_event(ChannelEvent::Connected);

        assert_eq!(session.generation, 1);
        assert!(session.in_flight.is_some());
        assert_eq!(view.borrow().status, ConnectionStatus::Connected);

        session.on_channel_event(ChannelEvent::Disconnected);
        assert_eq!(view.borrow().status, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_stale_snapshot_is_discarded() {
        let (mut session, view) = test_session();
        session.on_channel_event(ChannelEvent::Connected);
        session.on_channel_event(ChannelEvent::Disconnected);
        session.on_channel_event(ChannelEvent::Connected);

        session.on_snapshot(SnapshotOutcome {
            generation: 1,
            result: Ok(snapshot_with("OLD")),
        });
        assert!(view.borrow().device("OLD").is_none());

        session.on_snapshot(SnapshotOutcome {
            generation: 2,
            result: Ok(snapshot_with("NEW")),
        });
        assert!(view.borrow().device("NEW").is_some());
    }

    #[tokio::test]
    async fn test_failed_snapshot_keeps_state_and_events_flow() {
        let (mut session, view) = test_session();
        session.on_channel_event(ChannelEvent::Connected);
        session.on_channel_event(new_message("D1", 20.0, 1));

        session.on_snapshot(SnapshotOutcome {
            generation: 1,
            result: Err(DashboardError::SnapshotFormat("boom".into())),
        });
        assert!(view.borrow().device("D1").is_some());

        session.on_channel_event(new_message("D2", 21.0, 2));
        assert_eq!(view.borrow().devices.len(), 2);
    }

    #[tokio::test]
    async fn test_malformed_and_foreign_events_are_dropped() {
        let (mut session, view) = test_session();
        session.on_channel_event(ChannelEvent::Event {
            name: NEW_MESSAGE_EVENT.into(),
            payload: json!({ "message": { "device_id": "D1" } }),
        });
        session.on_channel_event(ChannelEvent::Event {
            name: "chat".into(),
            payload: json!({ "message": { "device_id": "D1", "pins": [] } }),
        });

        assert!(view.borrow().devices.is_empty());
    }

    #[tokio::test]
    async fn test_push_event_published_whole() {
        let (mut session, view) = test_session();
        session.on_channel_event(ChannelEvent::Event {
            name: NEW_MESSAGE_EVENT.into(),
            payload: json!({
                "message": {
                    "device_id": "D1",
                    "pins": [
                        { "pin": "A", "c_temperature": 1.0, "f_temperature": 33.8, "timestamp": 7 },
                        { "pin": "B", "c_temperature": 2.0, "f_temperature": 35.6, "timestamp": 7 }
                    ]
                }
            }),
        });

        let snapshot = view.borrow().clone();
        assert_eq!(snapshot.device("D1").unwrap().pins.len(), 2);
        assert_eq!(snapshot.history_for("D1", "B").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reconnects_do_not_accumulate() {
        let (mut session, view) = test_session();
        for generation in 1..=5 {
            session.on_channel_event(ChannelEvent::Connected);
            session.on_snapshot(SnapshotOutcome {
                generation,
                result: Ok(snapshot_with("D1")),
            });
            session.on_channel_event(ChannelEvent::Disconnected);
        }

        let v = view.borrow().clone();
        assert_eq!(v.devices.len(), 1);
        assert_eq!(v.history_for("D1", "A").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_aborts_in_flight_snapshot() {
        use tokio::io::AsyncReadExt;

        // /cache accepts the request and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (accepted_tx, accepted_rx) = oneshot::channel();
        let (closed_tx, closed_rx) = oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let _ = accepted_tx.send(());
            let mut buf = [0u8; 1024];
            while let Ok(n) = socket.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
            let _ = closed_tx.send(());
        });

        let (session, mut view) = test_session_at(&format!("http://{addr}"), Duration::from_secs(60));
        let (channel_tx, channel_rx) = mpsc::channel(4);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (alive_tx, alive_rx) = oneshot::channel::<()>();
        let channel_task = tokio::spawn(async move {
            let _alive = alive_tx;
            std::future::pending::<()>().await
        });
        let task = tokio::spawn(session.run(channel_rx, shutdown_rx, channel_task));

        channel_tx.send(ChannelEvent::Connected).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), accepted_rx)
            .await
            .expect("snapshot fetch never started")
            .unwrap();
        assert_eq!(view.borrow_and_update().status, ConnectionStatus::Connected);

        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("session did not stop")
            .unwrap();

        // the fetch dropped its connection and the channel task is gone
        tokio::time::timeout(Duration::from_secs(5), closed_rx)
            .await
            .expect("in-flight fetch was not aborted")
            .unwrap();
        assert!(alive_rx.await.is_err());

        // nothing can publish any more and nothing was published after connect
        assert!(view.has_changed().is_err());
        assert!(view.borrow().devices.is_empty());
    }
}
