// src/server.rs
//
// Read-only HTTP surface over the pipeline's published state: the MJPEG
// stream, the snapshot, and the metrics counters. Handlers never touch
// loop-owned state; they only read what the publisher exposes.

use crate::metrics::{MetricsSummary, PipelineMetrics};
use crate::publisher::{FrameHub, StatePublisher};
use crate::types::TrafficSnapshot;
use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::debug;

pub struct AppState {
    pub publisher: Arc<StatePublisher>,
    pub hub: FrameHub,
    pub metrics: Arc<PipelineMetrics>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/video", get(video_feed))
        .route("/data", get(traffic_data))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET / — minimal page embedding the stream and polling /data.
async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// GET /data — latest complete snapshot, by value.
async fn traffic_data(State(state): State<Arc<AppState>>) -> Json<TrafficSnapshot> {
    Json(state.publisher.get())
}

/// GET /metrics — pipeline counters.
async fn metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSummary> {
    Json(state.metrics.summary())
}

/// GET /video — continuous multipart stream. Each connection gets its own
/// broadcast receiver; if this consumer falls behind it skips the frames
/// it missed, and when it disconnects only its receiver is dropped.
async fn video_feed(State(state): State<Arc<AppState>>) -> Response {
    let rx = state.hub.subscribe();

    let stream = futures_util::stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(part) => return Some((Ok::<Bytes, Infallible>(part), rx)),
                Err(RecvError::Lagged(missed)) => {
                    debug!("stream consumer lagged, skipped {} frames", missed);
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    (
        [(
            header::CONTENT_TYPE,
            "multipart/x-mixed-replace; boundary=frame",
        )],
        Body::from_stream(stream),
    )
        .into_response()
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Smart Intersection</title>
    <style>
        body { font-family: sans-serif; background: #f0f2f5; display: flex;
               flex-direction: column; align-items: center; margin: 0; padding: 24px; }
        .card { background: #fff; border-radius: 12px; padding: 24px;
                box-shadow: 0 4px 20px rgba(0,0,0,0.1); text-align: center; }
        img { max-width: 100%; border-radius: 8px; }
        .stats { margin-top: 16px; text-align: left; font-size: 1.1em; }
        #light { font-weight: bold; }
    </style>
</head>
<body>
    <div class="card">
        <h1>Smart Intersection</h1>
        <img src="/video" alt="Intersection feed">
        <div class="stats">
            <div>North-South vehicles: <span id="ns">0</span></div>
            <div>East-West vehicles: <span id="ew">0</span></div>
            <div>Total: <span id="total">0</span></div>
            <div>Light: <span id="light">GREEN</span></div>
        </div>
    </div>
    <script>
        async function poll() {
            try {
                const data = await (await fetch('/data')).json();
                document.getElementById('ns').textContent = data.north_south;
                document.getElementById('ew').textContent = data.east_west;
                document.getElementById('total').textContent = data.total;
                const light = document.getElementById('light');
                light.textContent = data.light_state;
                light.style.color = data.light_state === 'GREEN' ? 'green'
                    : data.light_state === 'YELLOW' ? 'orange' : 'red';
            } catch (e) { console.error(e); }
        }
        setInterval(poll, 1000);
    </script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, Phase};

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState {
            publisher: Arc::new(StatePublisher::new()),
            hub: FrameHub::new(4),
            metrics: Arc::new(PipelineMetrics::new()),
        })
    }

    #[tokio::test]
    async fn data_handler_reflects_latest_snapshot() {
        let state = test_state();
        state.publisher.set(TrafficSnapshot {
            north_south: 5,
            east_west: 2,
            total: 7,
            current_direction: Direction::NorthSouth,
            light_state: Phase::Green,
        });

        let Json(snap) = traffic_data(State(Arc::clone(&state))).await;
        assert_eq!(snap.total, 7);
        assert_eq!(snap.light_state, Phase::Green);
    }

    #[tokio::test]
    async fn video_handler_sets_multipart_content_type() {
        let state = test_state();
        let response = video_feed(State(state)).await;
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "multipart/x-mixed-replace; boundary=frame"
        );
    }
}
