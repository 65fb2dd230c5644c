use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::RgbaImage;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{PlayerError, PlayerResult};

/// Area the still frames are fitted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 800,
            height: 450,
        }
    }
}

/// What the display is currently showing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frame {
    Blank,
    Still {
        path: PathBuf,
        width: u32,
        height: u32,
    },
    Video {
        path: PathBuf,
    },
    Placeholder {
        text: String,
    },
}

/// Where the sequencer sends what should be on screen.
pub trait Display: Send {
    fn show_image(&mut self, path: &Path) -> PlayerResult<()>;
    fn show_video(&mut self, path: &Path);
    fn show_placeholder(&mut self, text: &str);
    fn clear(&mut self);
    fn current(&self) -> &Frame;
}

/// Largest size with the source aspect ratio that fits `viewport`. Images are
/// only ever shrunk, never enlarged.
pub fn fit_within(width: u32, height: u32, viewport: Viewport) -> (u32, u32) {
    if width == 0 || height == 0 || viewport.width == 0 || viewport.height == 0 {
        return (0, 0);
    }
    if width <= viewport.width && height <= viewport.height {
        return (width, height);
    }

    let scale_w = viewport.width as f64 / width as f64;
    let scale_h = viewport.height as f64 / height as f64;
    let scale = scale_w.min(scale_h);
    let fitted_w = ((width as f64 * scale).round() as u32).clamp(1, viewport.width);
    let fitted_h = ((height as f64 * scale).round() as u32).clamp(1, viewport.height);
    (fitted_w, fitted_h)
}

/// Decodes `path` and scales it to fit `viewport`.
pub fn load_still(path: &Path, viewport: Viewport) -> PlayerResult<RgbaImage> {
    let img = image::open(path)?;
    let (width, height) = fit_within(img.width(), img.height(), viewport);
    if (width, height) == (img.width(), img.height()) {
        return Ok(img.to_rgba8());
    }
    Ok(img
        .resize_exact(width, height, FilterType::Lanczos3)
        .to_rgba8())
}

/// Display without a window: records the current frame and, when an output
/// path is configured, writes every fitted still frame there as a PNG for an
/// external viewer to pick up.
pub struct HeadlessDisplay {
    viewport: Viewport,
    output: Option<PathBuf>,
    current: Frame,
}

impl HeadlessDisplay {
    pub fn new(viewport: Viewport, output: Option<PathBuf>) -> Self {
        Self {
            viewport,
            output,
            current: Frame::Blank,
        }
    }
}

impl Display for HeadlessDisplay {
    fn show_image(&mut self, path: &Path) -> PlayerResult<()> {
        let (width, height) = match self.output.as_ref() {
            Some(output) => {
                let frame = load_still(path, self.viewport)?;
                frame
                    .save(output)
                    .map_err(|e| PlayerError::Display(format!("writing {}: {}", output.display(), e)))?;
                frame.dimensions()
            }
            None => {
                let (w, h) = image::image_dimensions(path)?;
                fit_within(w, h, self.viewport)
            }
        };

        debug!("Still frame {}x{} for {}", width, height, path.display());
        self.current = Frame::Still {
            path: path.to_path_buf(),
            width,
            height,
        };
        Ok(())
    }

    fn show_video(&mut self, path: &Path) {
        self.current = Frame::Video {
            path: path.to_path_buf(),
        };
    }

    fn show_placeholder(&mut self, text: &str) {
        info!("Placeholder: {}", text.replace('\n', " | "));
        self.current = Frame::Placeholder {
            text: text.to_string(),
        };
    }

    fn clear(&mut self) {
        self.current = Frame::Blank;
    }

    fn current(&self) -> &Frame {
        &self.current
    }
}
