use std::time::Instant;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use gestu_core::geometry::center_square;
use gestu_core::{FramePacer, Message};
use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use tracing::{debug, trace};

use crate::capture::CaptureSource;
use crate::config::ClientConfig;
use crate::error::{EncodeError, SendRejection};

const DATA_URL_PREFIX: &str = "data:image/jpeg;base64,";

/// Where encoded frames go; implemented by the session transport.
pub trait FrameSink {
    fn is_writable(&self) -> bool;

    /// Hand over one message. Rejected messages are dropped, never queued.
    ///
    /// # Errors
    ///
    /// Returns `SendRejection` describing why the message was dropped.
    fn send_message(&mut self, message: &Message) -> Result<(), SendRejection>;
}

/// Result of one driving tick.
#[derive(Debug)]
pub enum TickOutcome {
    NotDue,
    NotWritable,
    NotReady,
    Sent { bytes: usize },
    Dropped(SendRejection),
    Failed(EncodeError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncoderStats {
    pub sent: u64,
    pub not_writable: u64,
    pub not_ready: u64,
    pub dropped: u64,
    pub failed: u64,
}

/// Samples the capture source at a fixed rate and ships square JPEG frames.
#[derive(Debug, Clone)]
pub struct FrameEncoder {
    pacer: FramePacer,
    frame_size: u32,
    quality: u8,
    stats: EncoderStats,
}

impl FrameEncoder {
    #[must_use]
    pub fn new(fps: u32, frame_size: u32, quality: u8) -> Self {
        Self {
            pacer: FramePacer::new(fps),
            frame_size: frame_size.max(1),
            quality: quality.clamp(1, 100),
            stats: EncoderStats::default(),
        }
    }

    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.fps(), config.frame_size(), config.jpeg_quality())
    }

    #[must_use]
    pub fn stats(&self) -> EncoderStats {
        self.stats
    }

    #[must_use]
    pub fn frame_size(&self) -> u32 {
        self.frame_size
    }

    /// Center-crop to a square, scale to `frame_size`, JPEG-encode, and wrap
    /// as a `data:` URL.
    ///
    /// # Errors
    ///
    /// Returns `EncodeError::EmptyFrame` for zero-sized input and
    /// `EncodeError::Image` if JPEG encoding fails.
    pub fn encode(&self, frame: &DynamicImage) -> Result<String, EncodeError> {
        let crop = center_square(frame.width(), frame.height()).ok_or(EncodeError::EmptyFrame)?;
        let square = frame
            .crop_imm(crop.x, crop.y, crop.side, crop.side)
            .resize_exact(self.frame_size, self.frame_size, FilterType::Triangle)
            .to_rgb8();

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality).encode_image(&square)?;

        let mut data = String::with_capacity(DATA_URL_PREFIX.len() + jpeg.len() * 4 / 3 + 4);
        data.push_str(DATA_URL_PREFIX);
        STANDARD.encode_string(&jpeg, &mut data);
        Ok(data)
    }

    /// Emit at most one frame if the pacer allows, the sink is writable and
    /// the source is ready. Otherwise the tick is skipped without queuing.
    pub fn tick(
        &mut self,
        now: Instant,
        source: Option<&mut (dyn CaptureSource + 'static)>,
        sink: &mut dyn FrameSink,
    ) -> TickOutcome {
        if !self.pacer.is_due(now) {
            return TickOutcome::NotDue;
        }
        if !sink.is_writable() {
            self.stats.not_writable += 1;
            return TickOutcome::NotWritable;
        }
        let Some(source) = source.filter(|source| source.is_ready()) else {
            self.stats.not_ready += 1;
            return TickOutcome::NotReady;
        };
        self.pacer.mark_sent(now);

        let encoded = source
            .current_frame()
            .map_err(EncodeError::from)
            .and_then(|frame| self.encode(&frame));
        let data = match encoded {
            Ok(data) => data,
            Err(err) => {
                self.stats.failed += 1;
                debug!(error = %err, "frame encode failed");
                return TickOutcome::Failed(err);
            }
        };

        let bytes = data.len();
        match sink.send_message(&Message::frame(data)) {
            Ok(()) => {
                self.stats.sent += 1;
                trace!(bytes, "frame sent");
                TickOutcome::Sent { bytes }
            }
            Err(rejection) => {
                self.stats.dropped += 1;
                trace!(%rejection, "frame dropped");
                TickOutcome::Dropped(rejection)
            }
        }
    }

    /// Restart pacing, e.g. after the stream resumes.
    pub fn reset(&mut self) {
        self.pacer.reset();
    }
}
