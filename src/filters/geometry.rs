//! Running frame geometry and the crop that removes rotation padding.

/// Frame size and remaining duration while operations replay.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub duration: f64,
}

impl Geometry {
    pub fn new(width: u32, height: u32, duration: f64) -> Self {
        Self {
            width,
            height,
            duration,
        }
    }

    /// Apply a fractional crop box, returning the pixel box.
    pub fn crop_fraction(&mut self, x1: f64, y1: f64, x2: f64, y2: f64) -> CropBox {
        let (w, h) = (self.width as f64, self.height as f64);
        let px = |f: f64, extent: f64| (f.clamp(0.0, 1.0) * extent) as u32;

        let (left, right) = (px(x1, w), px(x2, w));
        let (top, bottom) = (px(y1, h), px(y2, h));
        let rect = CropBox {
            width: right.saturating_sub(left),
            height: bottom.saturating_sub(top),
            x: left,
            y: top,
        };
        self.width = rect.width;
        self.height = rect.height;
        rect
    }

    /// Scale both sides, rounding each down to an even number.
    pub fn scale(&mut self, factor: f64) -> (u32, u32) {
        let even = |v: u32| {
            let v = (factor * v as f64).max(0.0) as u32;
            v - v % 2
        };
        self.width = even(self.width);
        self.height = even(self.height);
        (self.width, self.height)
    }

    pub fn transpose(&mut self) {
        std::mem::swap(&mut self.width, &mut self.height);
    }

    /// Record a cut and return the resolved `(start, duration)`.
    pub fn cut(&mut self, start: Option<f64>, duration: Option<f64>) -> (f64, f64) {
        let start = start.unwrap_or(0.0);
        let duration = duration.unwrap_or(self.duration - start);
        self.duration -= duration;
        (start, duration)
    }
}

/// A pixel rectangle inside a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBox {
    pub width: u32,
    pub height: u32,
    pub x: u32,
    pub y: u32,
}

const EPSILON: f64 = 1e-10;

/// Largest axis-aligned rectangle inside a `width`x`height` frame rotated by
/// `degrees`, positioned within the rotated bounding box.
///
/// When the short side is long enough for all four corners of the rectangle
/// to touch the rotated frame, the box is `(W - 2a, H - 2b)` at `(a, b)` with
/// `f = CS / (S² - C²)`, `a = f(wS - hC)` and `b = f(hS - wC)`. Otherwise
/// only two corners touch and the box is centered in the bounding box.
pub fn crop_after_rotate(width: u32, height: u32, degrees: f64) -> CropBox {
    let theta = degrees.to_radians();
    let c = theta.cos().abs();
    let s = theta.sin().abs();
    let (w, h) = (width as f64, height as f64);

    if s < EPSILON {
        return CropBox { width, height, x: 0, y: 0 };
    }
    if c < EPSILON {
        return CropBox { width: height, height: width, x: 0, y: 0 };
    }

    let outer_w = w * c + h * s;
    let outer_h = w * s + h * c;
    let (long, short) = if w >= h { (w, h) } else { (h, w) };

    if short <= 2.0 * s * c * long || (s - c).abs() < EPSILON {
        let x = 0.5 * short;
        let (cw, ch) = if w >= h { (x / s, x / c) } else { (x / c, x / s) };
        return CropBox {
            width: cw as u32,
            height: ch as u32,
            x: ((outer_w - cw) / 2.0) as u32,
            y: ((outer_h - ch) / 2.0) as u32,
        };
    }

    let f = c * s / (s * s - c * c);
    let a = f * (w * s - h * c);
    let b = f * (h * s - w * c);
    CropBox {
        width: (outer_w - 2.0 * a) as u32,
        height: (outer_h - 2.0 * b) as u32,
        x: a as u32,
        y: b as u32,
    }
}
