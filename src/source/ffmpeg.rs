//! ffmpeg-backed source
//!
//! Opens anything libavformat understands (RTSP cameras, HTTP streams, local
//! files), decodes the best video stream and converts it to packed RGB24.

use ffmpeg::format::context::Input;
use ffmpeg::format::Pixel;
use ffmpeg::software::scaling::{context::Context as Scaler, flag::Flags};
use ffmpeg::util::frame::video::Video;

use bytes::BytesMut;

use crate::error::{Error, Result};
use crate::media::frame::RGB_CHANNELS;
use crate::media::Frame;

use super::{Capture, FrameSource};

/// Source reading a URL through ffmpeg
#[derive(Debug, Clone)]
pub struct FfmpegSource {
    url: String,
}

impl FfmpegSource {
    /// Create a source for `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    fn open_err(&self, reason: impl ToString) -> Error {
        Error::SourceOpen {
            url: self.url.clone(),
            reason: reason.to_string(),
        }
    }
}

impl FrameSource for FfmpegSource {
    type Capture = FfmpegCapture;

    fn open(&mut self) -> Result<FfmpegCapture> {
        ffmpeg::init().map_err(|e| self.open_err(e))?;

        let input = ffmpeg::format::input(&self.url).map_err(|e| self.open_err(e))?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| self.open_err("no video stream"))?;
        let stream_index = stream.index();

        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| self.open_err(e))?;
        let decoder = context.decoder().video().map_err(|e| self.open_err(e))?;

        let scaler = Scaler::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            Flags::BILINEAR,
        )
        .map_err(|e| self.open_err(e))?;

        Ok(FfmpegCapture {
            input,
            decoder,
            scaler,
            stream_index,
        })
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

/// Open ffmpeg capture; dropping it closes the input
pub struct FfmpegCapture {
    input: Input,
    decoder: ffmpeg::decoder::Video,
    scaler: Scaler,
    stream_index: usize,
}

impl FfmpegCapture {
    fn to_frame(&mut self, decoded: &Video) -> Result<Frame> {
        let mut rgb = Video::empty();
        self.scaler
            .run(decoded, &mut rgb)
            .map_err(|e| Error::SourceRead(e.to_string()))?;

        let (width, height) = (rgb.width(), rgb.height());
        let row_len = width as usize * RGB_CHANNELS;
        let stride = rgb.stride(0);
        let data = rgb.data(0);

        // Strip per-row padding
        let mut payload = BytesMut::with_capacity(row_len * height as usize);
        for row in data.chunks(stride).take(height as usize) {
            payload.extend_from_slice(&row[..row_len]);
        }

        Ok(Frame::new(payload.freeze(), width, height))
    }
}

impl Capture for FfmpegCapture {
    fn read(&mut self) -> Result<Option<Frame>> {
        let mut decoded = Video::empty();

        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                return self.to_frame(&decoded).map(Some);
            }

            let mut fed = false;
            for (stream, packet) in self.input.packets() {
                if stream.index() == self.stream_index {
                    self.decoder
                        .send_packet(&packet)
                        .map_err(|e| Error::SourceRead(e.to_string()))?;
                    fed = true;
                    break;
                }
            }

            if !fed {
                // End of stream
                return Ok(None);
            }
        }
    }
}
