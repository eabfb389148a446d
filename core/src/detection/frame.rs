//! Captured frames and frame sources

use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, RgbImage};
use tracing::debug;

use super::geometry::Rect;
use crate::abilities::RegistryError;

/// One captured frame in 3-channel form, plus where it sits on screen.
#[derive(Debug, Clone)]
pub struct Frame {
    image: RgbImage,
    region: Rect,
}

impl Frame {
    /// Wrap a capture. Alpha is dropped so 4-channel captures match
    /// 3-channel templates. `region` origin is the capture's screen position.
    pub fn from_capture(image: DynamicImage, region: Rect) -> Self {
        let image = image.to_rgb8();
        let region = Rect::new(region.x, region.y, image.width(), image.height());
        Self { image, region }
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Frame-local bounds, origin at 0,0.
    pub fn bounds(&self) -> Rect {
        Rect::sized(self.width(), self.height())
    }

    /// Absolute screen region of the capture.
    pub fn region(&self) -> Rect {
        self.region
    }
}

/// Something that can capture the watched screen region.
pub trait FrameSource: Send {
    /// Next frame, or `None` when nothing could be captured this tick.
    fn capture_frame(&mut self) -> Option<DynamicImage>;

    /// Screen region the captures come from.
    fn region(&self) -> Rect;

    /// True when no further frames will ever be produced.
    fn is_exhausted(&self) -> bool {
        false
    }
}

/// Plays a directory of PNG frames in file-name order, then stops.
#[derive(Debug)]
pub struct ImageSequenceSource {
    frames: Vec<PathBuf>,
    next: usize,
    region: Rect,
    looping: bool,
}

impl ImageSequenceSource {
    pub fn from_dir(dir: &Path, region: Rect) -> Result<Self, RegistryError> {
        let entries = fs::read_dir(dir).map_err(|source| RegistryError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;
        let mut frames: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| is_png(p))
            .collect();
        frames.sort();
        Ok(Self {
            frames,
            next: 0,
            region,
            looping: false,
        })
    }

    /// Start over after the last frame instead of running dry.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn capture_frame(&mut self) -> Option<DynamicImage> {
        if self.frames.is_empty() {
            return None;
        }
        if self.next >= self.frames.len() {
            if !self.looping {
                return None;
            }
            self.next = 0;
        }
        let path = &self.frames[self.next];
        self.next += 1;
        match image::open(path) {
            Ok(image) => Some(image),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Skipping unreadable frame");
                None
            }
        }
    }

    fn region(&self) -> Rect {
        self.region
    }

    /// True once every frame has been played (never for a looping source).
    fn is_exhausted(&self) -> bool {
        !self.looping && self.next >= self.frames.len()
    }
}

pub(crate) fn is_png(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"))
}
