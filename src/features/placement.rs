//! Drag/resize handling for the overlay box drawn over a rendered page.
//!
//! The whole session is one `Copy` value; every pointer event goes through a
//! pure transition returning the next value.

use serde::{Deserialize, Serialize};

use super::geometry::{Point, Rect, Size};

/// Side of the square resize handle at the bottom-right corner, in pixels.
pub const HANDLE_SIZE: f64 = 16.0;
/// Smallest width/height the overlay can be resized to, in pixels.
pub const MIN_OVERLAY_SIZE: f64 = 20.0;
pub const DEFAULT_RECT: Rect = Rect::new(100.0, 100.0, 100.0, 100.0);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Interaction {
    Idle,
    /// Pointer minus rect top-left, captured on press.
    Dragging { grab_dx: f64, grab_dy: f64 },
    /// Rect bottom-right minus pointer, captured on press.
    Resizing { grab_dx: f64, grab_dy: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementSession {
    pub interaction: Interaction,
    pub rect: Rect,
    pub viewport: Size,
}

impl PlacementSession {
    pub fn new(viewport: Size) -> Self {
        Self::with_rect(viewport, DEFAULT_RECT)
    }

    pub fn with_rect(viewport: Size, rect: Rect) -> Self {
        Self {
            interaction: Interaction::Idle,
            rect: fit_into(rect, viewport),
            viewport,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.interaction, Interaction::Idle)
    }

    pub fn handle_rect(&self) -> Rect {
        let side = HANDLE_SIZE.min(self.rect.width).min(self.rect.height);
        Rect::new(self.rect.right() - side, self.rect.bottom() - side, side, side)
    }

    pub fn pointer_down(self, p: Point) -> Self {
        if !self.is_idle() {
            return self;
        }
        let interaction = if self.handle_rect().contains(p) {
            Interaction::Resizing {
                grab_dx: self.rect.right() - p.x,
                grab_dy: self.rect.bottom() - p.y,
            }
        } else if self.rect.contains(p) {
            Interaction::Dragging {
                grab_dx: p.x - self.rect.x,
                grab_dy: p.y - self.rect.y,
            }
        } else {
            Interaction::Idle
        };
        Self { interaction, ..self }
    }

    pub fn pointer_move(self, p: Point) -> Self {
        let rect = match self.interaction {
            Interaction::Idle => return self,
            Interaction::Dragging { grab_dx, grab_dy } => {
                let max_x = (self.viewport.width - self.rect.width).max(0.0);
                let max_y = (self.viewport.height - self.rect.height).max(0.0);
                Rect::new(
                    (p.x - grab_dx).clamp(0.0, max_x),
                    (p.y - grab_dy).clamp(0.0, max_y),
                    self.rect.width,
                    self.rect.height,
                )
            }
            Interaction::Resizing { grab_dx, grab_dy } => Rect::new(
                self.rect.x,
                self.rect.y,
                clamp_dimension(
                    p.x + grab_dx - self.rect.x,
                    self.viewport.width - self.rect.x,
                ),
                clamp_dimension(
                    p.y + grab_dy - self.rect.y,
                    self.viewport.height - self.rect.y,
                ),
            ),
        };
        Self { rect, ..self }
    }

    pub fn pointer_up(self) -> Self {
        Self {
            interaction: Interaction::Idle,
            ..self
        }
    }

    /// Host re-rendered the page at a new size; keep the box on the same
    /// part of the page.
    pub fn resize_viewport(self, viewport: Size) -> Self {
        if !viewport.is_usable() || !self.viewport.is_usable() {
            return Self { viewport, ..self };
        }
        let sx = viewport.width / self.viewport.width;
        let sy = viewport.height / self.viewport.height;
        let scaled = Rect::new(
            self.rect.x * sx,
            self.rect.y * sy,
            self.rect.width * sx,
            self.rect.height * sy,
        );
        Self {
            interaction: Interaction::Idle,
            rect: fit_into(scaled, viewport),
            viewport,
        }
    }
}

fn clamp_dimension(value: f64, available: f64) -> f64 {
    if available <= MIN_OVERLAY_SIZE {
        return available.max(0.0);
    }
    value.clamp(MIN_OVERLAY_SIZE, available)
}

fn fit_into(rect: Rect, viewport: Size) -> Rect {
    if !viewport.is_usable() {
        return rect;
    }
    let width = rect.width.clamp(MIN_OVERLAY_SIZE.min(viewport.width), viewport.width);
    let height = rect.height.clamp(MIN_OVERLAY_SIZE.min(viewport.height), viewport.height);
    Rect::new(
        rect.x.clamp(0.0, viewport.width - width),
        rect.y.clamp(0.0, viewport.height - height),
        width,
        height,
    )
}
