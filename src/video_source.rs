// src/video_source.rs

use crate::error::PipelineError;
use crate::types::Frame;
use anyhow::Result;
use opencv::{
    core::Mat,
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait, VideoCaptureTraitConst},
};
use tracing::{debug, info};

/// One readable frame source. `read` yields `None` on end-of-stream;
/// `rewind` seeks back to the first frame.
pub trait FrameSource {
    fn read(&mut self) -> Result<Option<Frame>>;
    fn rewind(&mut self) -> Result<()>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn read(&mut self) -> Result<Option<Frame>> {
        (**self).read()
    }

    fn rewind(&mut self) -> Result<()> {
        (**self).rewind()
    }
}

/// OpenCV-backed source over a video file or capture URI.
pub struct VideoSource {
    cap: VideoCapture,
    pub fps: f64,
    pub width: i32,
    pub height: i32,
}

impl VideoSource {
    pub fn open(source_id: &str) -> Result<Self, PipelineError> {
        info!("Opening video source: {}", source_id);

        let unavailable = |reason: String| PipelineError::SourceUnavailable {
            source_id: source_id.to_string(),
            reason,
        };

        let cap = VideoCapture::from_file(source_id, videoio::CAP_ANY)
            .map_err(|e| unavailable(e.to_string()))?;
        if !cap.is_opened().map_err(|e| unavailable(e.to_string()))? {
            return Err(unavailable("capture failed to open".to_string()));
        }

        let fps = cap.get(videoio::CAP_PROP_FPS).unwrap_or(0.0);
        let width = cap.get(videoio::CAP_PROP_FRAME_WIDTH).unwrap_or(0.0) as i32;
        let height = cap.get(videoio::CAP_PROP_FRAME_HEIGHT).unwrap_or(0.0) as i32;
        info!("Source properties: {}x{} @ {:.1} FPS", width, height, fps);

        Ok(Self {
            cap,
            fps,
            width,
            height,
        })
    }
}

impl FrameSource for VideoSource {
    fn read(&mut self) -> Result<Option<Frame>> {
        let mut mat = Mat::default();
        if !self.cap.read(&mut mat)? || mat.empty() {
            return Ok(None);
        }

        let mut rgb = Mat::default();
        imgproc::cvt_color(&mat, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;

        Ok(Some(Frame {
            data: rgb.data_bytes()?.to_vec(),
            width: mat.cols() as usize,
            height: mat.rows() as usize,
        }))
    }

    fn rewind(&mut self) -> Result<()> {
        self.cap.set(videoio::CAP_PROP_POS_FRAMES, 0.0)?;
        Ok(())
    }
}

/// Treats any source as an infinite loop: on end-of-stream it rewinds and
/// the next read yields the first frame again. A source that still yields
/// nothing after a rewind is genuinely broken and surfaces an error.
pub struct Looping<S: FrameSource> {
    inner: S,
}

impl<S: FrameSource> Looping<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn read_frame(&mut self) -> Result<Frame> {
        if let Some(frame) = self.inner.read()? {
            return Ok(frame);
        }
        debug!("Source exhausted, seeking to frame 0");
        self.inner.rewind()?;
        match self.inner.read()? {
            Some(frame) => Ok(frame),
            None => anyhow::bail!("source yielded no frame after rewind"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scripted source: yields its frames once, then end-of-stream until
    /// rewound.
    struct ScriptedSource {
        frames: Vec<Frame>,
        cursor: usize,
        rewinds: usize,
    }

    impl ScriptedSource {
        fn new(count: usize) -> Self {
            let frames = (0..count)
                .map(|i| Frame {
                    data: vec![i as u8; 12],
                    width: 2,
                    height: 2,
                })
                .collect();
            Self {
                frames,
                cursor: 0,
                rewinds: 0,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn read(&mut self) -> Result<Option<Frame>> {
            match self.frames.get(self.cursor) {
                Some(frame) => {
                    self.cursor += 1;
                    Ok(Some(frame.clone()))
                }
                None => Ok(None),
            }
        }

        fn rewind(&mut self) -> Result<()> {
            self.cursor = 0;
            self.rewinds += 1;
            Ok(())
        }
    }

    #[test]
    fn wraps_around_at_end_of_stream() {
        let mut source = Looping::new(ScriptedSource::new(3));
        for expected in [0u8, 1, 2, 0, 1, 2, 0] {
            let frame = source.read_frame().unwrap();
            assert_eq!(frame.data[0], expected);
        }
        assert_eq!(source.inner.rewinds, 2);
    }

    #[test]
    fn empty_source_errors_instead_of_spinning() {
        let mut source = Looping::new(ScriptedSource::new(0));
        assert!(source.read_frame().is_err());
    }
}
