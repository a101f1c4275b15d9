// src/detector.rs

use crate::types::{Detection, Frame};
use anyhow::Result;
use opencv::{
    core::{self, Mat, Rect, Scalar, Size},
    imgproc,
    prelude::*,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use tracing::{debug, info};

const INPUT_SIZE: i32 = 640;
const NUM_CLASSES: usize = 80;
const NUM_PREDICTIONS: usize = 8400;
const NMS_IOU_THRESHOLD: f32 = 0.45;

/// Contract the pipeline requires from an object detector. Any conforming
/// implementation may be substituted; the loop never depends on YOLO
/// specifics.
pub trait Detector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// YOLO family detector over ONNX Runtime.
pub struct YoloDetector {
    session: Session,
    confidence_threshold: f32,
}

impl YoloDetector {
    pub fn new(model_path: &str, confidence_threshold: f32) -> Result<Self> {
        info!("Loading detection model: {}", model_path);

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        info!("✓ Detector initialized");
        Ok(Self {
            session,
            confidence_threshold,
        })
    }

    /// Letterbox the frame into a 640x640 gray canvas, returning the CHW
    /// input tensor plus the scale/padding needed to map boxes back.
    fn preprocess(&self, frame: &Frame) -> Result<(Vec<f32>, f32, f32, f32)> {
        let (src_w, src_h) = (frame.width as i32, frame.height as i32);
        let scale = (INPUT_SIZE as f32 / src_w as f32).min(INPUT_SIZE as f32 / src_h as f32);
        let scaled_w = (src_w as f32 * scale) as i32;
        let scaled_h = (src_h as f32 * scale) as i32;
        let pad_x = (INPUT_SIZE - scaled_w) / 2;
        let pad_y = (INPUT_SIZE - scaled_h) / 2;

        let flat = Mat::from_slice(&frame.data)?;
        let src = flat.reshape(3, src_h)?;
        let mut resized = Mat::default();
        imgproc::resize(
            &src,
            &mut resized,
            Size::new(scaled_w, scaled_h),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )?;

        let mut canvas = Mat::new_rows_cols_with_default(
            INPUT_SIZE,
            INPUT_SIZE,
            core::CV_8UC3,
            Scalar::all(114.0),
        )?;
        let mut roi = Mat::roi_mut(&mut canvas, Rect::new(pad_x, pad_y, scaled_w, scaled_h))?;
        resized.copy_to(&mut roi)?;

        // HWC u8 -> CHW f32 in [0, 1]
        let pixels = canvas.data_bytes()?;
        let hw = (INPUT_SIZE * INPUT_SIZE) as usize;
        let mut input = vec![0.0f32; 3 * hw];
        for i in 0..hw {
            for c in 0..3 {
                input[c * hw + i] = pixels[i * 3 + c] as f32 / 255.0;
            }
        }

        Ok((input, scale, pad_x as f32, pad_y as f32))
    }

    fn infer(&mut self, input: Vec<f32>) -> Result<Vec<f32>> {
        let shape = [1usize, 3, INPUT_SIZE as usize, INPUT_SIZE as usize];
        let value =
            ort::value::Value::from_array((shape.as_slice(), input.into_boxed_slice()))?;
        let outputs = self.session.run(ort::inputs!["images" => value])?;
        let (_, data) = outputs[0].try_extract_tensor::<f32>()?;
        Ok(data.to_vec())
    }

    /// Parse the [1, 84, 8400] output: per prediction, a centered box plus
    /// 80 class scores, mapped back through the letterbox transform.
    fn postprocess(&self, output: &[f32], scale: f32, pad_x: f32, pad_y: f32) -> Vec<Detection> {
        let mut detections = Vec::new();

        for i in 0..NUM_PREDICTIONS {
            let (mut best_class, mut best_conf) = (0usize, 0.0f32);
            for c in 0..NUM_CLASSES {
                let conf = output[NUM_PREDICTIONS * (4 + c) + i];
                if conf > best_conf {
                    best_conf = conf;
                    best_class = c;
                }
            }
            if best_conf < self.confidence_threshold {
                continue;
            }

            let cx = output[i];
            let cy = output[NUM_PREDICTIONS + i];
            let w = output[NUM_PREDICTIONS * 2 + i];
            let h = output[NUM_PREDICTIONS * 3 + i];

            detections.push(Detection {
                bbox: [
                    (cx - w / 2.0 - pad_x) / scale,
                    (cy - h / 2.0 - pad_y) / scale,
                    (cx + w / 2.0 - pad_x) / scale,
                    (cy + h / 2.0 - pad_y) / scale,
                ],
                confidence: best_conf,
                class_id: best_class,
                class_name: class_name(best_class).to_string(),
            });
        }

        nms(detections, NMS_IOU_THRESHOLD)
    }
}

impl Detector for YoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let (input, scale, pad_x, pad_y) = self.preprocess(frame)?;
        let output = self.infer(input)?;
        let detections = self.postprocess(&output, scale, pad_x, pad_y);
        debug!("Detected {} objects", detections.len());
        Ok(detections)
    }
}

pub fn class_name(class_id: usize) -> &'static str {
    match class_id {
        0 => "person",
        1 => "bicycle",
        2 => "car",
        3 => "motorcycle",
        5 => "bus",
        6 => "train",
        7 => "truck",
        _ => "object",
    }
}

fn nms(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let overlaps = kept
            .iter()
            .any(|k| iou(&k.bbox, &candidate.bbox) >= iou_threshold);
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let intersection = ix * iy;
    let union = (a[2] - a[0]) * (a[3] - a[1]) + (b[2] - b[0]) * (b[3] - b[1]) - intersection;
    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(bbox: [f32; 4], confidence: f32) -> Detection {
        Detection {
            bbox,
            confidence,
            class_id: 2,
            class_name: "car".to_string(),
        }
    }

    #[test]
    fn nms_keeps_highest_confidence_of_overlapping_boxes() {
        let boxes = vec![
            det([0.0, 0.0, 10.0, 10.0], 0.6),
            det([1.0, 1.0, 11.0, 11.0], 0.9),
            det([100.0, 100.0, 110.0, 110.0], 0.5),
        ];
        let kept = nms(boxes, 0.45);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        assert_eq!(
            iou(&[0.0, 0.0, 1.0, 1.0], &[5.0, 5.0, 6.0, 6.0]),
            0.0
        );
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = [0.0, 0.0, 4.0, 4.0];
        assert!((iou(&b, &b) - 1.0).abs() < 1e-6);
    }
}
