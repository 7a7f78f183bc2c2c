//! Synthetic test-pattern source
//!
//! Produces a moving RGB gradient. Selected with `pattern://WIDTHxHEIGHT`
//! and used for demos and tests where no camera is available.

use bytes::{BufMut, BytesMut};

use crate::error::{Error, Result};
use crate::media::frame::RGB_CHANNELS;
use crate::media::Frame;

use super::{Capture, FrameSource};

/// URL scheme selecting this source
pub const SCHEME: &str = "pattern://";

const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 360;

/// Synthetic gradient source
#[derive(Debug, Clone)]
pub struct PatternSource {
    width: u32,
    height: u32,
}

impl PatternSource {
    /// Create a source producing `width`x`height` frames
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Check if `url` selects this source
    pub fn handles(url: &str) -> bool {
        url.starts_with(SCHEME)
    }

    /// Parse `pattern://WIDTHxHEIGHT`; the size may be omitted
    pub fn from_url(url: &str) -> Result<Self> {
        let spec = url
            .strip_prefix(SCHEME)
            .ok_or_else(|| Error::Config(format!("not a pattern URL: {}", url)))?;

        if spec.is_empty() {
            return Ok(Self::new(DEFAULT_WIDTH, DEFAULT_HEIGHT));
        }

        let parse = |s: &str| {
            s.parse::<u32>()
                .ok()
                .filter(|v| *v > 0)
                .ok_or_else(|| Error::Config(format!("invalid pattern size: {}", spec)))
        };

        let (w, h) = spec
            .split_once('x')
            .ok_or_else(|| Error::Config(format!("invalid pattern size: {}", spec)))?;

        Ok(Self::new(parse(w)?, parse(h)?))
    }
}

impl FrameSource for PatternSource {
    type Capture = PatternCapture;

    fn open(&mut self) -> Result<PatternCapture> {
        Ok(PatternCapture {
            width: self.width,
            height: self.height,
            tick: 0,
        })
    }

    fn describe(&self) -> String {
        format!("{}{}x{}", SCHEME, self.width, self.height)
    }
}

/// Open pattern capture
#[derive(Debug)]
pub struct PatternCapture {
    width: u32,
    height: u32,
    tick: u32,
}

impl Capture for PatternCapture {
    fn read(&mut self) -> Result<Option<Frame>> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut payload = BytesMut::with_capacity(w * h * RGB_CHANNELS);
        let shift = self.tick as usize;

        for y in 0..h {
            for x in 0..w {
                payload.put_u8(((x + shift) % 256) as u8);
                payload.put_u8(((y + shift) % 256) as u8);
                payload.put_u8((shift % 256) as u8);
            }
        }

        self.tick = self.tick.wrapping_add(1);
        Ok(Some(Frame::new(payload.freeze(), self.width, self.height)))
    }
}
