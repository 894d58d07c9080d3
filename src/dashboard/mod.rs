// Read-only web dashboard over the artifacts written by the trading loop

use crate::notify::NotificationGate;
use crate::persistence::{gate_file, latest_run_artifact, read_order_log, OrderLog, CHART_FILE, ORDER_LOG_FILE};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use std::fmt::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct DashboardState {
    data_dir: Arc<PathBuf>,
}

pub fn router(data_dir: impl Into<PathBuf>) -> Router {
    let state = DashboardState {
        data_dir: Arc::new(data_dir.into()),
    };

    Router::new()
        .route("/", get(index))
        .route("/chart.svg", get(chart))
        .route("/api/orders", get(orders))
        .route("/api/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the dashboard until the task is dropped or the listener fails
pub async fn serve(bind: &str, data_dir: impl Into<PathBuf>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Web server started at http://{}", listener.local_addr()?);
    axum::serve(listener, router(data_dir)).await?;
    Ok(())
}

impl DashboardState {
    fn gate(&self) -> NotificationGate {
        NotificationGate::load(&gate_file(&self.data_dir))
    }

    fn order_log(&self) -> OrderLog {
        latest_run_artifact(&self.data_dir, ORDER_LOG_FILE)
            .and_then(|path| read_order_log(&path).ok())
            .unwrap_or_default()
    }

    fn ban_status(&self) -> String {
        match self.gate().banned_until {
            Some(until) if until > Utc::now() => {
                format!("Telegram Ban Until: {}", until.format("%Y-%m-%d %H:%M:%S UTC"))
            }
            _ => "Not banned".to_string(),
        }
    }
}

async fn index(State(state): State<DashboardState>) -> Html<String> {
    let has_chart = latest_run_artifact(&state.data_dir, CHART_FILE).is_some();
    let log = state.order_log();

    let mut page = String::new();
    // Writing into a String cannot fail
    let _ = write!(
        page,
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><meta http-equiv=\"refresh\" content=\"60\">\
         <title>Spread Bot</title></head>\
         <body style=\"background:#1c2526;color:white;font-family:sans-serif\">\
         <h1>Spread Bot Dashboard</h1><p>Current Time: {}</p><p>{}</p>",
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
        state.ban_status()
    );

    if has_chart {
        page.push_str("<img src=\"/chart.svg\" alt=\"Candlestick chart\" style=\"max-width:100%\">");
    } else {
        page.push_str("<p>No chart available yet</p>");
    }

    page.push_str("<h2>Open Orders</h2>");
    if log.open_orders.is_empty() {
        page.push_str("<p>No open orders</p>");
    } else {
        page.push_str("<table><tr><th>Order ID</th><th>Side</th><th>Quantity</th><th>Price</th></tr>");
        for order in &log.open_orders {
            let _ = write!(
                page,
                "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
                escape(&order.order_id),
                order.side,
                order.quantity,
                order.price
            );
        }
        page.push_str("</table>");
    }
    page.push_str("</body></html>");

    Html(page)
}

async fn chart(State(state): State<DashboardState>) -> Response {
    let Some(path) = latest_run_artifact(&state.data_dir, CHART_FILE) else {
        return (StatusCode::NOT_FOUND, "No chart available").into_response();
    };

    match tokio::fs::read(&path).await {
        Ok(bytes) => ([(header::CONTENT_TYPE, "image/svg+xml")], bytes).into_response(),
        Err(e) => {
            tracing::warn!("Failed to read chart {}: {}", path.display(), e);
            (StatusCode::NOT_FOUND, "No chart available").into_response()
        }
    }
}

async fn orders(State(state): State<DashboardState>) -> Json<OrderLog> {
    Json(state.order_log())
}

async fn status(State(state): State<DashboardState>) -> Json<Value> {
    let now = Utc::now();
    let gate = state.gate();
    let latest_run = latest_run_artifact(&state.data_dir, ORDER_LOG_FILE)
        .and_then(|path| path.parent().and_then(|p| p.file_name()).map(|n| n.to_string_lossy().into_owned()));

    Json(json!({
        "time": now.to_rfc3339(),
        "notifications_open": gate.is_open(now),
        "telegram_banned_until": gate.banned_until.map(|t| t.to_rfc3339()),
        "latest_run": latest_run,
        "open_orders": state.order_log().open_orders.len(),
    }))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OpenOrder, Side};
    use crate::persistence::{write_atomic, write_order_log, ArtifactPaths};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;
    use tower::ServiceExt;

    async fn fetch(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn seed_run(data_dir: &std::path::Path) -> ArtifactPaths {
        let paths = ArtifactPaths::for_run(data_dir, Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap());
        paths.create_dirs().unwrap();
        write_order_log(
            &paths.order_log(),
            &[OpenOrder {
                order_id: "123".to_string(),
                side: Side::Buy,
                quantity: dec!(150),
                price: dec!(1.0),
            }],
        )
        .unwrap();
        write_atomic(&paths.chart(), b"<svg xmlns=\"http://www.w3.org/2000/svg\"/>").unwrap();
        paths
    }

    #[tokio::test]
    async fn test_empty_data_dir() {
        let dir = tempfile::tempdir().unwrap();

        let (status, _) = fetch(router(dir.path()), "/chart.svg").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = fetch(router(dir.path()), "/api/orders").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(serde_json::from_str::<Value>(&body).unwrap(), json!({ "open_orders": [] }));

        let (_, page) = fetch(router(dir.path()), "/").await;
        assert!(page.contains("Not banned"));
        assert!(page.contains("No chart available yet"));
    }

    #[tokio::test]
    async fn test_serves_latest_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        seed_run(dir.path());

        let (status, svg) = fetch(router(dir.path()), "/chart.svg").await;
        assert_eq!(status, StatusCode::OK);
        assert!(svg.starts_with("<svg"));

        let (_, body) = fetch(router(dir.path()), "/api/orders").await;
        let log: OrderLog = serde_json::from_str(&body).unwrap();
        assert_eq!(log.open_orders.len(), 1);
        assert_eq!(log.open_orders[0].order_id, "123");

        let (_, page) = fetch(router(dir.path()), "/").await;
        assert!(page.contains("<td>123</td>"));
        assert!(page.contains("/chart.svg"));
    }

    #[tokio::test]
    async fn test_status_reports_ban() {
        let dir = tempfile::tempdir().unwrap();
        seed_run(dir.path());
        let gate = NotificationGate::open().after_rate_limit(Utc::now(), Duration::hours(2));
        gate.save(&gate_file(dir.path())).unwrap();

        let (_, body) = fetch(router(dir.path()), "/api/status").await;
        let status: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(status["notifications_open"], false);
        assert_eq!(status["latest_run"], "20250501_080000");
        assert_eq!(status["open_orders"], 1);

        let (_, page) = fetch(router(dir.path()), "/").await;
        assert!(page.contains("Telegram Ban Until"));
    }
}
