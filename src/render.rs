//! ==============================================================================
//! render.rs - html for the dashboard page
//! ==============================================================================
//!
//! purpose:
//!     turns one DashboardView into a self-contained html page: header with
//!     connection indicator and last update time, then one card per
//!     (device, pin) with the current °C / °F readout and an inline svg line
//!     chart of that pin's history. no javascript; the page refreshes itself.
//!
//! every piece of upstream text goes through html_escape before it lands in
//! the markup.
//!
//! ==============================================================================

use crate::domain::{ConnectionStatus, PinReading};
use crate::history::HistoryBuffer;
use crate::reconciler::DashboardView;
use std::fmt::Write;

const CHART_WIDTH: f64 = 320.0;
const CHART_HEIGHT: f64 = 120.0;

pub fn render_dashboard(view: &DashboardView, refresh_seconds: u64) -> String {
    let mut cards = String::new();
    for device in &view.devices {
        for pin in &device.pins {
            cards.push_str(&render_card(
                &device.device_id,
                pin,
                view.history_for(&device.device_id, &pin.pin),
            ));
        }
    }

    let body = if view.devices.is_empty() {
        r#"<p class="empty">Waiting for sensor data...</p>"#.to_string()
    } else {
        format!(r#"<div class="grid">{cards}</div>"#)
    };

    let refresh = if refresh_seconds > 0 {
        format!(r#"<meta http-equiv="refresh" content="{refresh_seconds}">"#)
    } else {
        String::new()
    };

    let dot = match view.status {
        ConnectionStatus::Connected => "online",
        ConnectionStatus::Disconnected => "offline",
    };
    let status = view.status.label();

    format!(
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
{refresh}
<title>Temperature Monitoring Dashboard</title>
<style>
body {{ font-family: system-ui; background: #f3f4f6; margin: 0; padding: 1.5rem; color: #1f2937; }}
header {{ display: flex; justify-content: space-between; align-items: center; margin-bottom: 2rem; }}
.status {{ display: flex; align-items: center; gap: .5rem; font-size: .875rem; color: #4b5563; }}
.dot {{ width: .75rem; height: .75rem; border-radius: 50%; display: inline-block; }}
.dot.online {{ background: #22c55e; }}
.dot.offline {{ background: #ef4444; }}
.grid {{ display: grid; grid-template-columns: repeat(auto-fill, minmax(340px, 1fr)); gap: 1.5rem; }}
.card {{ background: #fff; border-radius: 8px; padding: 1.5rem; box-shadow: 0 4px 6px rgba(0,0,0,.1); }}
.card h2 {{ margin: 0; font-size: 1.25rem; }}
.meta {{ font-size: .875rem; color: #6b7280; }}
.celsius {{ font-size: 1.875rem; font-weight: bold; color: #2563eb; }}
.fahrenheit {{ font-size: 1.5rem; color: #4b5563; }}
.readout {{ display: flex; justify-content: space-between; align-items: center; margin: 1rem 0; }}
.empty {{ text-align: center; color: #6b7280; padding: 3rem 0; }}
</style>
</head>
<body>
<header>
<h1>Temperature Monitoring Dashboard</h1>
<div class="status"><span class="dot {dot}"></span><span>{status}</span>
<span>Last Update: {last_update}</span></div>
</header>
{body}
</body>
</html>"#,
        last_update = format_time_ms(view.last_update),
    )
}

fn render_card(device_id: &str, reading: &PinReading, history: Option<&HistoryBuffer>) -> String {
    let pin = html_escape(&reading.pin);
    let chart = match history {
        Some(h) if !h.is_empty() => line_chart(h, &format!("Temperature History - Sensor {pin}")),
        _ => String::new(),
    };
    let updated = match reading.timestamp {
        Some(ts) => format!("Last reading: {ts}"),
        None => "No readings yet".to_string(),
    };

    format!(
        r#"<div class="card">
<div class="readout"><h2>Sensor {pin}</h2><span class="meta">Device ID: {device}</span></div>
<div class="readout"><span class="celsius">{c:.1}°C</span><span class="fahrenheit">{f:.1}°F</span></div>
{chart}
<div class="meta">{updated}</div>
</div>"#,
        device = html_escape(device_id),
        c = reading.c_temperature,
        f = reading.f_temperature,
    )
}

/// svg polyline of the celsius series, scaled to its own min/max, with the
/// first and last timestamps under the x axis
///
/// `label` must already be escaped.
pub fn line_chart(history: &HistoryBuffer, label: &str) -> String {
    let temps: Vec<f64> = history.temperatures().collect();
    let mut timestamps = history.timestamps();
    let first = timestamps.next();
    let last = timestamps.last().or(first);
    let axis = match (first, last) {
        (Some(first), Some(last)) => format!(
            r##"<text x="0" y="{y}" font-size="10" fill="#6b7280">{first}</text>
<text x="{w}" y="{y}" font-size="10" fill="#6b7280" text-anchor="end">{last}</text>
"##,
            y = CHART_HEIGHT + 14.0,
            w = CHART_WIDTH,
        ),
        _ => String::new(),
    };
    let (min, max) = temps
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &t| (lo.min(t), hi.max(t)));
    let span = max - min;
    let step = if temps.len() > 1 {
        CHART_WIDTH / (temps.len() - 1) as f64
    } else {
        0.0
    };

    let mut points = String::new();
    for (i, t) in temps.iter().enumerate() {
        let x = i as f64 * step;
        let y = if span > 0.0 {
            CHART_HEIGHT - (t - min) / span * CHART_HEIGHT
        } else {
            CHART_HEIGHT / 2.0
        };
        if !points.is_empty() {
            points.push(' ');
        }
        let _ = write!(points, "{x:.1},{y:.1}");
    }

    format!(
        r##"<svg viewBox="-4 -14 {w} {h}" width="100%" height="160" role="img" aria-label="{label}">
<text x="0" y="-4" font-size="10" fill="#6b7280">{label} ({min:.1}–{max:.1}°C)</text>
<polyline fill="none" stroke="rgb(75, 192, 192)" stroke-width="2" points="{points}"/>
{axis}</svg>"##,
        w = CHART_WIDTH + 8.0,
        h = CHART_HEIGHT + 36.0,
    )
}

fn format_time_ms(ms: u64) -> String {
    if ms == 0 {
        return "never".to_string();
    }
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ms as i64)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// escape html special characters to prevent xss
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
     .replace('<', "&lt;")
     .replace('>', "&gt;")
     .replace('"', "&quot;")
}
