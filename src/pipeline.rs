// src/pipeline.rs
//
// The per-intersection control loop. One sequential iteration: read one
// frame per direction in lockstep, fork detection to the per-direction
// workers and join, count vehicles, advance the signal machine, publish
// the snapshot, composite, encode, broadcast. The light rendered into a
// frame always matches the snapshot published in the same iteration.

use crate::compositor;
use crate::counter::count_vehicles;
use crate::detector::Detector;
use crate::encoder;
use crate::error::PipelineError;
use crate::metrics::PipelineMetrics;
use crate::publisher::{FrameHub, StatePublisher};
use crate::signal::SignalController;
use crate::types::{Config, Detection, Direction, Frame, TrafficSnapshot};
use crate::video_source::{FrameSource, Looping};
use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Handle to one direction's detection worker thread. Frames go out,
/// detection results come back; the pair of sends/recvs per iteration is
/// the fork/join point.
struct DetectionLane {
    direction: Direction,
    frame_tx: Sender<Frame>,
    result_rx: Receiver<Result<Vec<Detection>, PipelineError>>,
}

fn spawn_detection_worker(
    direction: Direction,
    mut detector: Box<dyn Detector>,
) -> Result<DetectionLane> {
    let (frame_tx, frame_rx) = bounded::<Frame>(1);
    let (result_tx, result_rx) = bounded(1);

    thread::Builder::new()
        .name(format!("detect-{}", direction.as_str().to_lowercase()))
        .spawn(move || {
            for frame in frame_rx {
                let result = detector
                    .detect(&frame)
                    .map_err(|e| PipelineError::DetectionFailure(e.to_string()));
                if result_tx.send(result).is_err() {
                    break;
                }
            }
        })
        .with_context(|| format!("spawning detection worker for {}", direction.as_str()))?;

    Ok(DetectionLane {
        direction,
        frame_tx,
        result_rx,
    })
}

pub struct Pipeline {
    sources: Vec<Looping<Box<dyn FrameSource + Send>>>,
    lanes: Vec<DetectionLane>,
    signal: SignalController,
    vehicle_classes: HashSet<usize>,
    publisher: Arc<StatePublisher>,
    hub: FrameHub,
    metrics: Arc<PipelineMetrics>,
    idle_delay: Duration,
}

impl Pipeline {
    pub fn new(
        sources: Vec<Box<dyn FrameSource + Send>>,
        detectors: Vec<Box<dyn Detector>>,
        config: &Config,
        publisher: Arc<StatePublisher>,
        hub: FrameHub,
        metrics: Arc<PipelineMetrics>,
    ) -> Result<Self> {
        assert_eq!(sources.len(), Direction::ALL.len());
        assert_eq!(detectors.len(), Direction::ALL.len());

        let lanes = Direction::ALL
            .into_iter()
            .zip(detectors)
            .map(|(direction, detector)| spawn_detection_worker(direction, detector))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            sources: sources.into_iter().map(Looping::new).collect(),
            lanes,
            signal: SignalController::new(&config.signal, Instant::now()),
            vehicle_classes: config.detection.vehicle_classes.iter().copied().collect(),
            publisher,
            hub,
            metrics,
            idle_delay: config.idle_delay(),
        })
    }

    /// Run until the process exits or a source fails unrecoverably.
    pub fn run(mut self) -> Result<()> {
        info!("🚦 Intersection pipeline running");
        loop {
            self.iterate(Instant::now())?;
            thread::sleep(self.idle_delay);
        }
    }

    fn iterate(&mut self, now: Instant) -> Result<()> {
        // Lockstep read: one frame per adapter per iteration.
        let mut frames = Vec::with_capacity(self.sources.len());
        for source in &mut self.sources {
            frames.push(source.read_frame()?);
        }

        // Fork: independent directions detect concurrently.
        for (lane, frame) in self.lanes.iter().zip(&frames) {
            lane.frame_tx
                .send(frame.clone())
                .context("detection worker exited")?;
        }

        // Join. A per-frame detection failure counts as zero vehicles and
        // the loop keeps going.
        let mut detections = Vec::with_capacity(self.lanes.len());
        for lane in &self.lanes {
            match lane.result_rx.recv().context("detection worker exited")? {
                Ok(found) => detections.push(found),
                Err(e) => {
                    warn!(
                        "Detection failed for {}: {}; treating count as 0",
                        lane.direction.as_str(),
                        e
                    );
                    PipelineMetrics::inc(&self.metrics.detection_failures);
                    detections.push(Vec::new());
                }
            }
        }

        let counts = [
            count_vehicles(&detections[0], &self.vehicle_classes),
            count_vehicles(&detections[1], &self.vehicle_classes),
        ];

        self.signal.tick(now, counts);

        self.publisher.set(TrafficSnapshot {
            north_south: counts[0],
            east_west: counts[1],
            total: counts[0] + counts[1],
            current_direction: self.signal.current_direction(),
            light_state: self.signal.active_phase(),
        });

        let lights = [
            self.signal.phase_for(Direction::NorthSouth),
            self.signal.phase_for(Direction::EastWest),
        ];

        // Encoding problems skip the frame, never the iteration.
        match compositor::compose(
            (&frames[0], &detections[0]),
            (&frames[1], &detections[1]),
            lights,
        ) {
            Ok(composite) => match encoder::encode_jpeg(&composite) {
                Ok(jpeg) => {
                    self.hub.publish(encoder::multipart_part(&jpeg));
                    PipelineMetrics::inc(&self.metrics.frames_streamed);
                }
                Err(e) => {
                    warn!("Frame encoding failed: {}", e);
                    PipelineMetrics::inc(&self.metrics.encode_failures);
                }
            },
            Err(e) => {
                warn!("Frame composition failed: {}", e);
                PipelineMetrics::inc(&self.metrics.compose_failures);
            }
        }

        PipelineMetrics::inc(&self.metrics.iterations);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        DetectionConfig, LoggingConfig, Phase, ServerConfig, SignalConfig, VideoConfig,
    };
    use std::sync::atomic::Ordering;

    struct SolidSource {
        value: u8,
    }

    impl FrameSource for SolidSource {
        fn read(&mut self) -> Result<Option<Frame>> {
            Ok(Some(Frame {
                data: vec![self.value; 32 * 32 * 3],
                width: 32,
                height: 32,
            }))
        }

        fn rewind(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// Yields a fixed number of car detections per frame, or fails.
    struct StubDetector {
        cars: usize,
        fail: bool,
    }

    impl Detector for StubDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            if self.fail {
                anyhow::bail!("synthetic detector fault");
            }
            Ok((0..self.cars)
                .map(|i| Detection {
                    bbox: [i as f32, 0.0, i as f32 + 4.0, 4.0],
                    confidence: 0.9,
                    class_id: 2,
                    class_name: "car".to_string(),
                })
                .collect())
        }
    }

    fn test_config() -> Config {
        Config {
            video: VideoConfig {
                north_south_source: String::new(),
                east_west_source: String::new(),
                idle_delay_ms: 0,
            },
            detection: DetectionConfig {
                model_path: String::new(),
                confidence_threshold: 0.3,
                vehicle_classes: vec![2, 3, 5, 7],
            },
            signal: SignalConfig {
                green_secs: 10,
                high_traffic_green_secs: 20,
                yellow_secs: 3,
                high_traffic_threshold: 5.0,
                red_low_traffic_secs: 15,
                red_high_traffic_secs: 5,
            },
            server: ServerConfig {
                bind_addr: "127.0.0.1:0".to_string(),
            },
            logging: LoggingConfig {
                level: "warn".to_string(),
            },
        }
    }

    fn build_pipeline(
        detectors: Vec<Box<dyn Detector>>,
    ) -> (Pipeline, Arc<StatePublisher>, FrameHub, Arc<PipelineMetrics>) {
        let sources: Vec<Box<dyn FrameSource + Send>> = vec![
            Box::new(SolidSource { value: 40 }),
            Box::new(SolidSource { value: 90 }),
        ];
        let publisher = Arc::new(StatePublisher::new());
        let hub = FrameHub::new(8);
        let metrics = Arc::new(PipelineMetrics::new());
        let pipeline = Pipeline::new(
            sources,
            detectors,
            &test_config(),
            Arc::clone(&publisher),
            hub.clone(),
            Arc::clone(&metrics),
        )
        .unwrap();
        (pipeline, publisher, hub, metrics)
    }

    #[test]
    fn iteration_publishes_matching_snapshot_and_frame() {
        let (mut pipeline, publisher, hub, metrics) = build_pipeline(vec![
            Box::new(StubDetector {
                cars: 3,
                fail: false,
            }),
            Box::new(StubDetector {
                cars: 1,
                fail: false,
            }),
        ]);
        let mut rx = hub.subscribe();

        pipeline.iterate(Instant::now()).unwrap();

        let snap = publisher.get();
        assert_eq!(snap.north_south, 3);
        assert_eq!(snap.east_west, 1);
        assert_eq!(snap.total, 4);
        assert_eq!(snap.current_direction, Direction::NorthSouth);
        assert_eq!(snap.light_state, Phase::Green);

        let part = rx.try_recv().unwrap();
        assert!(part.starts_with(b"--frame\r\n"));
        assert_eq!(metrics.iterations.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn detection_failure_counts_zero_and_loop_continues() {
        let (mut pipeline, publisher, _hub, metrics) = build_pipeline(vec![
            Box::new(StubDetector {
                cars: 0,
                fail: true,
            }),
            Box::new(StubDetector {
                cars: 2,
                fail: false,
            }),
        ]);

        pipeline.iterate(Instant::now()).unwrap();
        pipeline.iterate(Instant::now()).unwrap();

        let snap = publisher.get();
        assert_eq!(snap.north_south, 0);
        assert_eq!(snap.east_west, 2);
        assert_eq!(metrics.detection_failures.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.iterations.load(Ordering::Relaxed), 2);
    }

    /// Frame whose byte length does not match its declared geometry, so
    /// composition cannot build a Mat from it.
    struct CorruptSource;

    impl FrameSource for CorruptSource {
        fn read(&mut self) -> Result<Option<Frame>> {
            Ok(Some(Frame {
                data: vec![0; 7],
                width: 32,
                height: 32,
            }))
        }

        fn rewind(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn compose_failure_is_counted_separately_and_skips_the_frame() {
        let sources: Vec<Box<dyn FrameSource + Send>> =
            vec![Box::new(CorruptSource), Box::new(SolidSource { value: 90 })];
        let publisher = Arc::new(StatePublisher::new());
        let hub = FrameHub::new(8);
        let metrics = Arc::new(PipelineMetrics::new());
        let mut pipeline = Pipeline::new(
            sources,
            vec![
                Box::new(StubDetector {
                    cars: 1,
                    fail: false,
                }),
                Box::new(StubDetector {
                    cars: 1,
                    fail: false,
                }),
            ],
            &test_config(),
            Arc::clone(&publisher),
            hub.clone(),
            Arc::clone(&metrics),
        )
        .unwrap();
        let mut rx = hub.subscribe();

        pipeline.iterate(Instant::now()).unwrap();

        // Snapshot still published; no frame emitted; right counter bumped.
        assert_eq!(publisher.get().total, 2);
        assert!(rx.try_recv().is_err());
        assert_eq!(metrics.compose_failures.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.encode_failures.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.iterations.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn signal_advances_across_iterations() {
        let (mut pipeline, publisher, _hub, _metrics) = build_pipeline(vec![
            Box::new(StubDetector {
                cars: 6,
                fail: false,
            }),
            Box::new(StubDetector {
                cars: 0,
                fail: false,
            }),
        ]);

        let t0 = Instant::now();
        pipeline.iterate(t0).unwrap();
        pipeline.iterate(t0 + Duration::from_secs(10)).unwrap(); // -> yellow
        assert_eq!(publisher.get().light_state, Phase::Yellow);

        pipeline.iterate(t0 + Duration::from_secs(13)).unwrap(); // -> green EW
        let snap = publisher.get();
        assert_eq!(snap.current_direction, Direction::EastWest);
        assert_eq!(snap.light_state, Phase::Green);
        // Heavy NS traffic extended its next green.
        assert_eq!(
            pipeline.signal.green_duration(Direction::NorthSouth),
            Duration::from_secs(20)
        );
    }
}
