// src/signal.rs
//
// Adaptive signal state machine. One direction holds Green/Yellow at a
// time, the other is implicitly Red. Green length adapts to the average
// vehicle count observed during the previous green window.

use crate::types::{Direction, Phase, SignalConfig};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Loop-owned signal state. Mutated once per iteration via `tick`; never
/// handed out by reference to anything outside the pipeline.
pub struct SignalController {
    current_direction: Direction,
    phase: Phase,
    phase_start: Instant,
    green_duration: [Duration; 2],
    red_duration: [Duration; 2],
    samples: [Vec<usize>; 2],

    base_green: Duration,
    high_green: Duration,
    yellow: Duration,
    red_low: Duration,
    red_high: Duration,
    high_traffic_threshold: f32,
}

impl SignalController {
    pub fn new(config: &SignalConfig, now: Instant) -> Self {
        let base_green = Duration::from_secs(config.green_secs);
        let red_low = Duration::from_secs(config.red_low_traffic_secs);
        Self {
            current_direction: Direction::NorthSouth,
            phase: Phase::Green,
            phase_start: now,
            green_duration: [base_green; 2],
            red_duration: [red_low; 2],
            samples: [Vec::new(), Vec::new()],
            base_green,
            high_green: Duration::from_secs(config.high_traffic_green_secs),
            yellow: Duration::from_secs(config.yellow_secs),
            red_low,
            red_high: Duration::from_secs(config.red_high_traffic_secs),
            high_traffic_threshold: config.high_traffic_threshold,
        }
    }

    /// Advance the machine by one pipeline iteration. `counts` holds the
    /// per-direction vehicle count for this iteration, indexed by
    /// `Direction::index`. Counts are recorded into the active direction's
    /// sample window only while it is green.
    pub fn tick(&mut self, now: Instant, counts: [usize; 2]) {
        let elapsed = now.duration_since(self.phase_start);
        let active = self.current_direction;

        match self.phase {
            Phase::Green if elapsed >= self.green_duration[active.index()] => {
                debug!(
                    "{} green expired after {:.1}s, switching to yellow",
                    active.as_str(),
                    elapsed.as_secs_f64()
                );
                self.phase = Phase::Yellow;
                self.phase_start = now;
            }
            Phase::Yellow if elapsed >= self.yellow => {
                self.finish_cycle(now);
            }
            _ => {}
        }

        if self.phase == Phase::Green {
            let active = self.current_direction;
            self.samples[active.index()].push(counts[active.index()]);
        }
    }

    /// Yellow expired: adapt the outgoing direction's durations from its
    /// sample window, clear the window, and hand green to the other side.
    fn finish_cycle(&mut self, now: Instant) {
        let outgoing = self.current_direction;
        let window = &self.samples[outgoing.index()];
        // Floor of 1 on the divisor: an empty window averages to zero.
        let avg = window.iter().sum::<usize>() as f32 / window.len().max(1) as f32;

        if avg >= self.high_traffic_threshold {
            self.green_duration[outgoing.index()] = self.high_green;
            self.red_duration[outgoing.index()] = self.red_high;
            info!(
                "{}: avg {:.1} vehicles/frame >= {:.1}, extending green to {}s",
                outgoing.as_str(),
                avg,
                self.high_traffic_threshold,
                self.high_green.as_secs()
            );
        } else {
            self.green_duration[outgoing.index()] = self.base_green;
            self.red_duration[outgoing.index()] = self.red_low;
            debug!(
                "{}: avg {:.1} vehicles/frame, keeping base green {}s",
                outgoing.as_str(),
                avg,
                self.base_green.as_secs()
            );
        }

        self.samples[outgoing.index()].clear();

        let incoming = outgoing.opposite();
        self.samples[incoming.index()].clear();
        self.current_direction = incoming;
        self.phase = Phase::Green;
        self.phase_start = now;
        info!("signal switched: {} is now GREEN", incoming.as_str());
    }

    pub fn current_direction(&self) -> Direction {
        self.current_direction
    }

    /// Phase as rendered for a given direction; the inactive axis is
    /// always Red.
    pub fn phase_for(&self, direction: Direction) -> Phase {
        if direction == self.current_direction {
            self.phase
        } else {
            Phase::Red
        }
    }

    pub fn active_phase(&self) -> Phase {
        self.phase
    }

    pub fn green_duration(&self, direction: Direction) -> Duration {
        self.green_duration[direction.index()]
    }

    pub fn red_duration(&self, direction: Direction) -> Duration {
        self.red_duration[direction.index()]
    }

    #[cfg(test)]
    fn sample_window(&self, direction: Direction) -> &[usize] {
        &self.samples[direction.index()]
    }
}
