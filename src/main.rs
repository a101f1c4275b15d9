// src/main.rs

mod compositor;
mod config;
mod counter;
mod detector;
mod encoder;
mod error;
mod metrics;
mod pipeline;
mod publisher;
mod server;
mod signal;
mod types;
mod video_source;

use anyhow::{Context, Result};
use detector::{Detector, YoloDetector};
use metrics::PipelineMetrics;
use publisher::{FrameHub, StatePublisher};
use std::sync::Arc;
use tracing::{error, info};
use video_source::{FrameSource, VideoSource};

const FRAME_HUB_CAPACITY: usize = 16;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.yaml".to_string());
    let config = types::Config::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "smart_intersection={},ort=warn,tower_http=warn",
            config.logging.level
        ))
        .init();

    info!("🚦 Smart Intersection starting");
    info!("✓ Configuration loaded from {}", config_path);

    // A source that cannot be opened is fatal: the loop must not start.
    let sources: Vec<Box<dyn FrameSource + Send>> = vec![
        Box::new(VideoSource::open(&config.video.north_south_source)?),
        Box::new(VideoSource::open(&config.video.east_west_source)?),
    ];
    info!("✓ Video sources open");

    // One detector per direction so the workers run independently.
    let detectors: Vec<Box<dyn Detector>> = vec![
        Box::new(YoloDetector::new(
            &config.detection.model_path,
            config.detection.confidence_threshold,
        )?),
        Box::new(YoloDetector::new(
            &config.detection.model_path,
            config.detection.confidence_threshold,
        )?),
    ];

    let publisher = Arc::new(StatePublisher::new());
    let hub = FrameHub::new(FRAME_HUB_CAPACITY);
    let pipeline_metrics = Arc::new(PipelineMetrics::new());

    let pipeline = pipeline::Pipeline::new(
        sources,
        detectors,
        &config,
        Arc::clone(&publisher),
        hub.clone(),
        Arc::clone(&pipeline_metrics),
    )?;

    std::thread::Builder::new()
        .name("pipeline".to_string())
        .spawn(move || {
            if let Err(e) = pipeline.run() {
                error!("Pipeline terminated: {:#}", e);
            }
        })
        .context("spawning pipeline thread")?;

    let state = Arc::new(server::AppState {
        publisher,
        hub,
        metrics: pipeline_metrics,
    });
    let router = server::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.server.bind_addr))?;
    info!("✓ Serving on http://{}", config.server.bind_addr);

    axum::serve(listener, router).await?;
    Ok(())
}
