//! ==============================================================================
//! server.rs - read-only web view over the session's state
//! ==============================================================================
//!
//! routes:
//!     GET /                                -> html dashboard (render.rs)
//!     GET /api                             -> full DashboardView as json
//!     GET /api/history/:device_id/:pin     -> one history buffer, 404 if unknown
//!
//! handlers only ever borrow the latest Arc<DashboardView> from the watch
//! channel; nothing here can reach back into the reconciler.
//!
//! ==============================================================================

use crate::history::HistoryBuffer;
use crate::reconciler::DashboardView;
use crate::render;
use crate::session::ViewReceiver;
use anyhow::{Context, Result};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, Json},
    routing::get,
    Router,
};
use std::future::Future;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    view: ViewReceiver,
    refresh_seconds: u64,
}

impl AppState {
    pub fn new(view: ViewReceiver, refresh_seconds: u64) -> Self {
        Self {
            view,
            refresh_seconds,
        }
    }

    fn current(&self) -> Arc<DashboardView> {
        self.view.borrow().clone()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/api", get(api_handler))
        .route("/api/history/:device_id/:pin", get(history_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// serve until `shutdown` resolves
pub async fn run_server<F>(bind: &str, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind dashboard listener on {bind}"))?;
    info!(addr = %listener.local_addr()?, "dashboard listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn dashboard_handler(State(state): State<AppState>) -> Html<String> {
    let view = state.current();
    Html(render::render_dashboard(&view, state.refresh_seconds))
}

/// json api endpoint for programmatic access
async fn api_handler(State(state): State<AppState>) -> Json<DashboardView> {
    Json(state.current().as_ref().clone())
}

async fn history_handler(
    State(state): State<AppState>,
    Path((device_id, pin)): Path<(String, String)>,
) -> Result<Json<HistoryBuffer>, StatusCode> {
    state
        .current()
        .history_for(&device_id, &pin)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Device, PinReading};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tokio::sync::watch;
    use tower::ServiceExt;

    fn state_with_device() -> (AppState, watch::Sender<Arc<DashboardView>>) {
        let mut view = DashboardView::default();
        view.devices.push(Device {
            device_id: "D1".into(),
            pins: vec![PinReading {
                pin: "A".into(),
                c_temperature: 6.0,
                f_temperature: 42.8,
                timestamp: Some(2),
            }],
        });
        view.history
            .entry("D1".into())
            .or_default()
            .insert("A".into(), HistoryBuffer::seeded([(1, 5.0), (2, 6.0)]));
        let (tx, rx) = watch::channel(Arc::new(view));
        (AppState::new(rx, 0), tx)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_api_returns_view() {
        let (state, _tx) = state_with_device();
        let (status, body) = get(router(state), "/api").await;
        assert_eq!(status, StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "disconnected");
        assert_eq!(json["devices"][0]["device_id"], "D1");
        assert_eq!(json["devices"][0]["pins"][0]["f_temperature"], 42.8);
        assert_eq!(json["history"]["D1"]["A"]["timestamps"], serde_json::json!([1, 2]));
        assert_eq!(json["history"]["D1"]["A"]["temperatures"], serde_json::json!([5.0, 6.0]));
    }

    #[tokio::test]
    async fn test_history_route() {
        let (state, _tx) = state_with_device();
        let (status, body) = get(router(state.clone()), "/api/history/D1/A").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"temperatures\":[5.0,6.0]"));

        let (status, _) = get(router(state), "/api/history/D1/Z").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_dashboard_follows_latest_view() {
        let (state, tx) = state_with_device();
        let (_, html) = get(router(state.clone()), "/").await;
        assert!(html.contains("Sensor A"));

        tx.send_replace(Arc::new(DashboardView::default()));
        let (status, html) = get(router(state), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("Waiting for sensor data..."));
    }
}
