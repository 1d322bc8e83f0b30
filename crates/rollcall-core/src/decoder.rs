//! QR code region detection and decoding via `rqrr`.

/// A decoded code region in a frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeRegion {
    pub payload: String,
    /// Corner points in pixel coordinates, in outline order.
    pub corners: [(i32, i32); 4],
}

impl CodeRegion {
    /// Area of the outline polygon (shoelace formula).
    pub fn area(&self) -> f64 {
        let mut twice = 0i64;
        for i in 0..4 {
            let (x0, y0) = self.corners[i];
            let (x1, y1) = self.corners[(i + 1) % 4];
            twice += x0 as i64 * y1 as i64 - x1 as i64 * y0 as i64;
        }
        (twice as f64 / 2.0).abs()
    }

    /// True when the outline collapses to a line or point.
    pub fn is_degenerate(&self) -> bool {
        self.area() == 0.0
    }

    /// Whether this region carries something worth classifying.
    pub fn is_usable(&self) -> bool {
        !self.payload.is_empty() && !self.is_degenerate()
    }

    /// Axis-aligned bounds as (left, top, right, bottom).
    pub fn bounds(&self) -> (i32, i32, i32, i32) {
        let xs = self.corners.iter().map(|c| c.0);
        let ys = self.corners.iter().map(|c| c.1);
        (
            xs.clone().min().unwrap_or(0),
            ys.clone().min().unwrap_or(0),
            xs.max().unwrap_or(0),
            ys.max().unwrap_or(0),
        )
    }
}

/// Strategy for finding and decoding code regions in a grayscale frame.
pub trait CodeDecoder {
    /// Returns every region that decoded. May be empty.
    fn decode(&mut self, gray: &[u8], width: u32, height: u32) -> Vec<CodeRegion>;
}

/// QR decoder backed by `rqrr`.
#[derive(Debug, Default)]
pub struct QrDecoder;

impl CodeDecoder for QrDecoder {
    fn decode(&mut self, gray: &[u8], width: u32, height: u32) -> Vec<CodeRegion> {
        let (w, h) = (width as usize, height as usize);
        if w == 0 || h == 0 || gray.len() < w * h {
            tracing::warn!(
                width,
                height,
                len = gray.len(),
                "frame buffer does not match its dimensions; skipping decode"
            );
            return Vec::new();
        }

        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(w, h, |x, y| gray[y * w + x]);
        let grids = prepared.detect_grids();

        let mut regions = Vec::with_capacity(grids.len());
        for grid in grids {
            match grid.decode() {
                Ok((_meta, payload)) => {
                    let corners = grid.bounds.map(|p| (p.x, p.y));
                    regions.push(CodeRegion { payload, corners });
                }
                Err(e) => {
                    tracing::trace!(error = %e, "grid failed to decode");
                }
            }
        }
        regions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(payload: &str, corners: [(i32, i32); 4]) -> CodeRegion {
        CodeRegion {
            payload: payload.into(),
            corners,
        }
    }

    #[test]
    fn test_square_area() {
        let r = region("x", [(0, 0), (10, 0), (10, 10), (0, 10)]);
        assert_eq!(r.area(), 100.0);
        assert!(!r.is_degenerate());
        assert!(r.is_usable());
    }

    #[test]
    fn test_collinear_outline_is_degenerate() {
        let r = region("x", [(0, 0), (5, 5), (10, 10), (2, 2)]);
        assert!(r.is_degenerate());
        assert!(!r.is_usable());
    }

    #[test]
    fn test_empty_payload_not_usable() {
        let r = region("", [(0, 0), (10, 0), (10, 10), (0, 10)]);
        assert!(!r.is_usable());
    }

    #[test]
    fn test_bounds() {
        let r = region("x", [(3, 4), (20, 2), (22, 18), (1, 19)]);
        assert_eq!(r.bounds(), (1, 2, 22, 19));
    }

    const MODULE_PX: usize = 4;

    /// Paint `payload` as a QR symbol with its top-left module at `(ox, oy)`
    /// on a white frame. Returns the symbol's side length in pixels.
    fn paint_code(gray: &mut [u8], frame_width: usize, ox: usize, oy: usize, payload: &str) -> usize {
        let code = qrcode::QrCode::new(payload.as_bytes()).unwrap();
        let modules = code.width();
        for (i, color) in code.to_colors().into_iter().enumerate() {
            if color != qrcode::Color::Dark {
                continue;
            }
            let (mx, my) = (i % modules, i / modules);
            for dy in 0..MODULE_PX {
                for dx in 0..MODULE_PX {
                    let x = ox + mx * MODULE_PX + dx;
                    let y = oy + my * MODULE_PX + dy;
                    gray[y * frame_width + x] = 0;
                }
            }
        }
        modules * MODULE_PX
    }

    fn assert_outline_near(region: &CodeRegion, ox: i32, oy: i32, side: i32) {
        let slack = MODULE_PX as i32 * 2;
        let (left, top, right, bottom) = region.bounds();
        assert!((left - ox).abs() <= slack, "left {left} vs {ox}");
        assert!((top - oy).abs() <= slack, "top {top} vs {oy}");
        assert!((right - (ox + side)).abs() <= slack, "right {right} vs {}", ox + side);
        assert!((bottom - (oy + side)).abs() <= slack, "bottom {bottom} vs {}", oy + side);
        assert!(region.area() > (side * side) as f64 * 0.5);
        assert!(region.is_usable());
    }

    #[test]
    fn test_decodes_rendered_code() {
        let (w, h) = (160usize, 160usize);
        let mut gray = vec![255u8; w * h];
        let side = paint_code(&mut gray, w, 40, 36, "Alice - 101");

        let regions = QrDecoder.decode(&gray, w as u32, h as u32);
        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].payload, "Alice - 101");
        assert_outline_near(&regions[0], 40, 36, side as i32);
    }

    #[test]
    fn test_decodes_every_code_in_frame() {
        let (w, h) = (320usize, 160usize);
        let mut gray = vec![255u8; w * h];
        let left = paint_code(&mut gray, w, 20, 30, "Alice - 101");
        let right = paint_code(&mut gray, w, 190, 30, "Bob - 999");

        let mut regions = QrDecoder.decode(&gray, w as u32, h as u32);
        regions.sort_by(|a, b| a.payload.cmp(&b.payload));
        let payloads: Vec<_> = regions.iter().map(|r| r.payload.as_str()).collect();
        assert_eq!(payloads, vec!["Alice - 101", "Bob - 999"]);
        assert_outline_near(&regions[0], 20, 30, left as i32);
        assert_outline_near(&regions[1], 190, 30, right as i32);
    }

    #[test]
    fn test_blank_frame_has_no_regions() {
        let gray = vec![255u8; 64 * 48];
        assert!(QrDecoder.decode(&gray, 64, 48).is_empty());
    }

    #[test]
    fn test_short_buffer_has_no_regions() {
        let gray = vec![255u8; 10];
        assert!(QrDecoder.decode(&gray, 64, 48).is_empty());
    }
}
