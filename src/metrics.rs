// src/metrics.rs
//
// Pipeline observability counters. Exported as JSON on /metrics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub struct PipelineMetrics {
    pub iterations: AtomicU64,
    pub detection_failures: AtomicU64,
    pub compose_failures: AtomicU64,
    pub encode_failures: AtomicU64,
    pub frames_streamed: AtomicU64,
    started_at: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            iterations: AtomicU64::new(0),
            detection_failures: AtomicU64::new(0),
            compose_failures: AtomicU64::new(0),
            encode_failures: AtomicU64::new(0),
            frames_streamed: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            self.iterations.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            iterations: self.iterations.load(Ordering::Relaxed),
            detection_failures: self.detection_failures.load(Ordering::Relaxed),
            compose_failures: self.compose_failures.load(Ordering::Relaxed),
            encode_failures: self.encode_failures.load(Ordering::Relaxed),
            frames_streamed: self.frames_streamed.load(Ordering::Relaxed),
            fps: self.fps(),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub iterations: u64,
    pub detection_failures: u64,
    pub compose_failures: u64,
    pub encode_failures: u64,
    pub frames_streamed: u64,
    pub fps: f64,
    pub elapsed_secs: f64,
}
