// src/compositor.rs
//
// Pure frame transform: annotate each direction's frame with its detection
// boxes and signal indicator, normalize heights, concatenate horizontally.
// North-south renders on the left, east-west on the right.

use crate::types::{Detection, Frame, Phase};
use anyhow::Result;
use opencv::{
    core::{self, Mat, Point, Scalar, Size},
    imgproc,
    prelude::*,
};

const LIGHT_ANCHOR: (i32, i32) = (60, 100);
const LIGHT_RADIUS: i32 = 30;
const BOX_COLOR: (f64, f64, f64) = (0.0, 200.0, 255.0); // BGR amber

/// Fixed BGR color table for the signal indicator.
pub fn phase_color(phase: Phase) -> Scalar {
    match phase {
        Phase::Red => Scalar::new(0.0, 0.0, 255.0, 0.0),
        Phase::Yellow => Scalar::new(0.0, 255.0, 255.0, 0.0),
        Phase::Green => Scalar::new(0.0, 255.0, 0.0, 0.0),
    }
}

/// Proportional width for a frame scaled to `target_height`, floored.
pub fn scaled_width(width: i32, height: i32, target_height: i32) -> i32 {
    (width as i64 * target_height as i64 / height as i64) as i32
}

/// Draw the circular signal indicator plus its label at a fixed anchor.
/// Takes everything it needs as arguments; no loop state involved.
pub fn draw_light(mat: &mut Mat, phase: Phase, anchor: Point) -> Result<()> {
    let color = phase_color(phase);
    imgproc::circle(mat, anchor, LIGHT_RADIUS, color, -1, imgproc::LINE_8, 0)?;
    imgproc::put_text(
        mat,
        phase.as_str(),
        Point::new(anchor.x - 40, anchor.y + 60),
        imgproc::FONT_HERSHEY_SIMPLEX,
        0.8,
        color,
        2,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}

fn draw_detections(mat: &mut Mat, detections: &[Detection]) -> Result<()> {
    let color = Scalar::new(BOX_COLOR.0, BOX_COLOR.1, BOX_COLOR.2, 0.0);
    for det in detections {
        let [x1, y1, x2, y2] = det.bbox;
        let rect = core::Rect::new(
            x1 as i32,
            y1 as i32,
            (x2 - x1).max(0.0) as i32,
            (y2 - y1).max(0.0) as i32,
        );
        imgproc::rectangle(mat, rect, color, 2, imgproc::LINE_8, 0)?;
        imgproc::put_text(
            mat,
            &format!("{} {:.2}", det.class_name, det.confidence),
            Point::new(x1 as i32, (y1 as i32 - 5).max(10)),
            imgproc::FONT_HERSHEY_SIMPLEX,
            0.5,
            color,
            1,
            imgproc::LINE_8,
            false,
        )?;
    }
    Ok(())
}

fn annotate(frame: &Frame, detections: &[Detection], phase: Phase) -> Result<Mat> {
    let flat = Mat::from_slice(&frame.data)?;
    let rgb = flat.reshape(3, frame.height as i32)?;
    let mut bgr = Mat::default();
    imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;

    draw_detections(&mut bgr, detections)?;
    draw_light(&mut bgr, phase, Point::new(LIGHT_ANCHOR.0, LIGHT_ANCHOR.1))?;
    Ok(bgr)
}

/// Compose the per-direction views into one side-by-side BGR frame.
/// `lights` is indexed by `Direction::index`: the active direction shows
/// its current phase, the other side always shows red.
pub fn compose(
    north_south: (&Frame, &[Detection]),
    east_west: (&Frame, &[Detection]),
    lights: [Phase; 2],
) -> Result<Mat> {
    let left = annotate(north_south.0, north_south.1, lights[0])?;
    let right = annotate(east_west.0, east_west.1, lights[1])?;

    let target_height = left.rows().min(right.rows());
    let left = resize_to_height(&left, target_height)?;
    let right = resize_to_height(&right, target_height)?;

    let mut combined = Mat::default();
    core::hconcat2(&left, &right, &mut combined)?;
    Ok(combined)
}

fn resize_to_height(mat: &Mat, target_height: i32) -> Result<Mat> {
    if mat.rows() == target_height {
        return Ok(mat.clone());
    }
    let width = scaled_width(mat.cols(), mat.rows(), target_height);
    let mut resized = Mat::default();
    imgproc::resize(
        mat,
        &mut resized,
        Size::new(width, target_height),
        0.0,
        0.0,
        imgproc::INTER_LINEAR,
    )?;
    Ok(resized)
}
