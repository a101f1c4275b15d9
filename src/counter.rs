// src/counter.rs

use crate::types::Detection;
use std::collections::HashSet;

/// Count detections whose class id belongs to the configured vehicle set.
/// Confidence filtering is the detector's responsibility, not ours.
pub fn count_vehicles(detections: &[Detection], vehicle_classes: &HashSet<usize>) -> usize {
    detections
        .iter()
        .filter(|d| vehicle_classes.contains(&d.class_id))
        .count()
}
