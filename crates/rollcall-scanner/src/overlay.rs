//! Operator feedback: outline and label newly scanned badges on the frame
//! and write the annotated frame to the snapshot directory.
//!
//! Nothing drawn here is persisted in the database.

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_line_segment_mut, draw_text_mut};
use rollcall_core::{CodeRegion, IdentityClaim, ScanStatus};
use rollcall_hw::Frame;
use std::path::{Path, PathBuf};
use thiserror::Error;

const PRESENT_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const INVALID_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const OUTLINE_THICKNESS: i32 = 3;
const LABEL_FONT_SIZE: f32 = 22.0;
const LABEL_OFFSET: i32 = 26;

#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("failed to create snapshot directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to save snapshot {path}: {source}")]
    Save {
        path: PathBuf,
        source: image::ImageError,
    },
    #[error("frame conversion failed: {0}")]
    Frame(#[from] rollcall_hw::frame::FrameError),
}

/// What gets drawn for one scan.
pub struct Annotation<'a> {
    pub region: &'a CodeRegion,
    pub claim: &'a IdentityClaim,
    pub status: ScanStatus,
}

pub fn status_color(status: ScanStatus) -> Rgb<u8> {
    match status {
        ScanStatus::Present => PRESENT_COLOR,
        ScanStatus::Invalid => INVALID_COLOR,
    }
}

/// `"Present: Alice (101)"`; a missing roll number shows as `?`.
pub fn status_label(claim: &IdentityClaim, status: ScanStatus) -> String {
    format!(
        "{status}: {} ({})",
        claim.name,
        claim.roll_no.as_deref().unwrap_or("?")
    )
}

pub struct Overlay {
    snapshot_dir: PathBuf,
    font: Option<FontVec>,
}

impl Overlay {
    /// Prepare the snapshot directory. An unreadable font is logged and
    /// labels are skipped; outlines are always drawn.
    pub fn new(snapshot_dir: &Path, font_path: Option<&Path>) -> Result<Self, OverlayError> {
        std::fs::create_dir_all(snapshot_dir).map_err(|source| OverlayError::CreateDir {
            path: snapshot_dir.to_path_buf(),
            source,
        })?;

        let font = font_path.and_then(|path| match std::fs::read(path) {
            Ok(bytes) => match FontVec::try_from_vec(bytes) {
                Ok(font) => Some(font),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "invalid font; labels disabled");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "cannot read font; labels disabled");
                None
            }
        });

        tracing::info!(
            dir = %snapshot_dir.display(),
            labels = font.is_some(),
            "snapshots enabled"
        );

        Ok(Self {
            snapshot_dir: snapshot_dir.to_path_buf(),
            font,
        })
    }

    /// Draw every annotation on `image`.
    pub fn annotate(&self, image: &mut RgbImage, annotations: &[Annotation<'_>]) {
        for a in annotations {
            let color = status_color(a.status);
            draw_outline(image, &a.region.corners, color);

            if let Some(font) = &self.font {
                let (left, top, _, _) = a.region.bounds();
                let label = status_label(a.claim, a.status);
                draw_text_mut(
                    image,
                    color,
                    left.max(0),
                    (top - LABEL_OFFSET).max(0),
                    PxScale::from(LABEL_FONT_SIZE),
                    font,
                    &label,
                );
            }
        }
    }

    /// Annotate a copy of `frame` and write it as a PNG. Returns the file path.
    pub fn snapshot(&self, frame: &Frame, annotations: &[Annotation<'_>]) -> Result<PathBuf, OverlayError> {
        let mut image = frame.to_rgb_image()?;
        self.annotate(&mut image, annotations);

        let name = format!(
            "scan-{}-{:06}.png",
            chrono::Utc::now().format("%Y%m%dT%H%M%S%3f"),
            frame.sequence
        );
        let path = self.snapshot_dir.join(name);
        image
            .save(&path)
            .map_err(|source| OverlayError::Save {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(path = %path.display(), "snapshot written");
        Ok(path)
    }
}

/// Closed polygon through the four corners, thickened by offsetting the
/// segment in both axes.
fn draw_outline(image: &mut RgbImage, corners: &[(i32, i32); 4], color: Rgb<u8>) {
    let half = OUTLINE_THICKNESS / 2;
    for i in 0..corners.len() {
        let (x0, y0) = corners[i];
        let (x1, y1) = corners[(i + 1) % corners.len()];
        for dx in -half..=half {
            for dy in -half..=half {
                draw_line_segment_mut(
                    image,
                    ((x0 + dx) as f32, (y0 + dy) as f32),
                    ((x1 + dx) as f32, (y1 + dy) as f32),
                    color,
                );
            }
        }
    }
}
