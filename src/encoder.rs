// src/encoder.rs

use crate::error::PipelineError;
use bytes::Bytes;
use opencv::{core::Mat, core::Vector, imgcodecs, prelude::VectorToVec};

const BOUNDARY_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";
const PART_TRAILER: &[u8] = b"\r\n";

/// Encode a BGR frame to JPEG.
pub fn encode_jpeg(mat: &Mat) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Vector::<u8>::new();
    let params = Vector::<i32>::new();
    let ok = imgcodecs::imencode(".jpg", mat, &mut buf, &params)
        .map_err(|e| PipelineError::EncodingFailure(e.to_string()))?;
    if !ok {
        return Err(PipelineError::EncodingFailure(
            "imencode returned false".to_string(),
        ));
    }
    Ok(buf.to_vec())
}

/// Wrap a JPEG payload as one part of a `multipart/x-mixed-replace`
/// stream: boundary marker, content-type header, payload, delimiter.
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let mut part = Vec::with_capacity(BOUNDARY_HEADER.len() + jpeg.len() + PART_TRAILER.len());
    part.extend_from_slice(BOUNDARY_HEADER);
    part.extend_from_slice(jpeg);
    part.extend_from_slice(PART_TRAILER);
    Bytes::from(part)
}
