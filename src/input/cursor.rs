//! Pointer position over the output layout.

use log::trace;

use crate::geometry::{PointF, Rectangle};
use crate::toolkit::CursorKind;

#[derive(Debug, Clone)]
pub struct Cursor {
    position: PointF,
    bounds: Rectangle,
    image: CursorKind,
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}

impl Cursor {
    pub fn new() -> Self {
        Self {
            position: PointF::new(0.0, 0.0),
            bounds: Rectangle::default(),
            image: CursorKind::Default,
        }
    }

    pub fn position(&self) -> PointF {
        self.position
    }

    pub fn bounds(&self) -> Rectangle {
        self.bounds
    }

    /// Restricts the cursor to the layout extents. An empty rectangle
    /// leaves it unconstrained.
    pub fn set_bounds(&mut self, bounds: Rectangle) {
        self.bounds = bounds;
        self.position = self.clamp(self.position);
    }

    fn clamp(&self, position: PointF) -> PointF {
        if self.bounds.is_empty() {
            return position;
        }
        let max_x = (self.bounds.right() - 1) as f64;
        let max_y = (self.bounds.bottom() - 1) as f64;
        PointF::new(
            position.x.clamp(self.bounds.x as f64, max_x),
            position.y.clamp(self.bounds.y as f64, max_y),
        )
    }

    pub fn move_by(&mut self, dx: f64, dy: f64) -> PointF {
        self.warp(PointF::new(self.position.x + dx, self.position.y + dy))
    }

    pub fn warp(&mut self, position: PointF) -> PointF {
        self.position = self.clamp(position);
        trace!("cursor at {:?}", self.position);
        self.position
    }

    pub fn image(&self) -> CursorKind {
        self.image
    }

    /// Returns whether the image changed.
    pub fn set_image(&mut self, image: CursorKind) -> bool {
        let changed = self.image != image;
        self.image = image;
        changed
    }
}
