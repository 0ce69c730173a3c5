//! Viewer space (pixels, origin top-left) to PDF space (points, origin
//! bottom-left) and back.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_usable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle anchored at `(x, y)`.
///
/// In viewer space the anchor is the top-left corner; in PDF space it is the
/// bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Inclusive on all edges so a press on the border still counts.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }
}

/// `None` when no scaling pass is needed (viewer renders the page 1:1).
fn scale_factors(viewport: Size, page: Size) -> Option<(f64, f64)> {
    if viewport == page || !viewport.is_usable() {
        return None;
    }
    Some((page.width / viewport.width, page.height / viewport.height))
}

pub fn to_pdf_space(rect: Rect, viewport: Size, page: Size) -> Rect {
    match scale_factors(viewport, page) {
        None => Rect::new(rect.x, page.height - rect.y - rect.height, rect.width, rect.height),
        Some((sx, sy)) => Rect::new(
            rect.x * sx,
            page.height - rect.y * sy - rect.height * sy,
            rect.width * sx,
            rect.height * sy,
        ),
    }
}

pub fn to_viewer_space(rect: Rect, viewport: Size, page: Size) -> Rect {
    match scale_factors(viewport, page) {
        None => Rect::new(rect.x, page.height - rect.y - rect.height, rect.width, rect.height),
        Some((sx, sy)) => {
            let height = rect.height / sy;
            Rect::new(
                rect.x / sx,
                (page.height - rect.y) / sy - height,
                rect.width / sx,
                height,
            )
        }
    }
}
