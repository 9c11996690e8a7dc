//! Integer geometry shared by the scene tree, layers and outputs.
//!
//! All coordinates are logical pixels. Widths and heights are signed so that
//! edge arithmetic (resize deltas, exclusive zones) never needs casts; a
//! rectangle with a non-positive extent is empty.

use bitflags::bitflags;
use std::fmt;

/// A point in logical pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn to_f64(self) -> PointF {
        PointF::new(self.x as f64, self.y as f64)
    }
}

impl std::ops::Add for Point {
    type Output = Point;
    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// A sub-pixel position, as reported by pointer devices.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointF {
    pub x: f64,
    pub y: f64,
}

impl PointF {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Rounds towards negative infinity, the way hit-testing treats pixels.
    pub fn floor(self) -> Point {
        Point::new(self.x.floor() as i32, self.y.floor() as i32)
    }

    pub fn translate(self, by: Point) -> Self {
        Self::new(self.x + by.x as f64, self.y + by.y as f64)
    }

    pub fn relative_to(self, origin: Point) -> Self {
        Self::new(self.x - origin.x as f64, self.y - origin.y as f64)
    }
}

/// Width and height in logical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    pub width: i32,
    pub height: i32,
}

impl Size {
    pub const fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Rectangle for element positioning and sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rectangle {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn from_loc_and_size(loc: Point, size: Size) -> Self {
        Self::new(loc.x, loc.y, size.width, size.height)
    }

    pub fn loc(&self) -> Point {
        Point::new(self.x, self.y)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2, self.y + self.height / 2)
    }

    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x < self.right() && point.y >= self.y && point.y < self.bottom()
    }

    pub fn contains_f(&self, point: PointF) -> bool {
        point.x >= self.x as f64
            && point.x < self.right() as f64
            && point.y >= self.y as f64
            && point.y < self.bottom() as f64
    }

    pub fn translate(&self, by: Point) -> Self {
        Self::new(self.x + by.x, self.y + by.y, self.width, self.height)
    }

    pub fn with_loc(&self, loc: Point) -> Self {
        Self::new(loc.x, loc.y, self.width, self.height)
    }

    pub fn intersection(&self, other: &Rectangle) -> Option<Rectangle> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        let rect = Rectangle::new(x, y, right - x, bottom - y);
        (!rect.is_empty()).then_some(rect)
    }

    /// Smallest rectangle covering both. Empty rectangles do not contribute.
    pub fn union(&self, other: &Rectangle) -> Rectangle {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rectangle::new(x, y, right - x, bottom - y)
    }

    /// Moves (never resizes) `self` so that as much of it as possible lies
    /// within `bounds`. The top-left corner wins when `self` is larger.
    pub fn confined_to(&self, bounds: &Rectangle) -> Rectangle {
        let mut x = self.x;
        let mut y = self.y;
        if x + self.width > bounds.right() {
            x = bounds.right() - self.width;
        }
        if y + self.height > bounds.bottom() {
            y = bounds.bottom() - self.height;
        }
        x = x.max(bounds.x);
        y = y.max(bounds.y);
        Rectangle::new(x, y, self.width, self.height)
    }

    /// Shrinks by the given amount on the given edge, saturating at zero extent.
    pub fn shrink_edge(&self, edge: Edges, amount: i32) -> Rectangle {
        let mut rect = *self;
        let amount = amount.max(0);
        if edge == Edges::TOP {
            let d = amount.min(rect.height);
            rect.y += d;
            rect.height -= d;
        } else if edge == Edges::BOTTOM {
            rect.height -= amount.min(rect.height);
        } else if edge == Edges::LEFT {
            let d = amount.min(rect.width);
            rect.x += d;
            rect.width -= d;
        } else if edge == Edges::RIGHT {
            rect.width -= amount.min(rect.width);
        }
        rect
    }
}

impl fmt::Display for Rectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {}x{})", self.x, self.y, self.width, self.height)
    }
}

bitflags! {
    /// Screen or window edges. Bit values match the layer-shell anchor enum.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Edges: u32 {
        const TOP = 1;
        const BOTTOM = 2;
        const LEFT = 4;
        const RIGHT = 8;
    }
}

impl Edges {
    pub const TOP_LEFT: Edges = Edges::TOP.union(Edges::LEFT);
    pub const TOP_RIGHT: Edges = Edges::TOP.union(Edges::RIGHT);
    pub const BOTTOM_LEFT: Edges = Edges::BOTTOM.union(Edges::LEFT);
    pub const BOTTOM_RIGHT: Edges = Edges::BOTTOM.union(Edges::RIGHT);

    /// The single edge an exclusive zone applies to: anchored to one edge, or
    /// to one edge plus both edges perpendicular to it. Otherwise `None`.
    pub fn exclusive_edge(self) -> Option<Edges> {
        let horizontal = Edges::LEFT | Edges::RIGHT;
        let vertical = Edges::TOP | Edges::BOTTOM;
        for edge in [Edges::TOP, Edges::BOTTOM, Edges::LEFT, Edges::RIGHT] {
            let perpendicular = if vertical.contains(edge) { horizontal } else { vertical };
            if self == edge || self == edge | perpendicular {
                return Some(edge);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangle_contains_half_open() {
        let r = Rectangle::new(10, 10, 20, 20);
        assert!(r.contains(Point::new(10, 10)));
        assert!(r.contains(Point::new(29, 29)));
        assert!(!r.contains(Point::new(30, 29)));
        assert!(!r.contains(Point::new(9, 15)));
    }

    #[test]
    fn test_union_ignores_empty() {
        let a = Rectangle::new(0, 0, 10, 10);
        let empty = Rectangle::default();
        assert_eq!(a.union(&empty), a);
        assert_eq!(empty.union(&a), a);
        assert_eq!(
            a.union(&Rectangle::new(20, 5, 5, 10)),
            Rectangle::new(0, 0, 25, 15)
        );
    }

    #[test]
    fn test_confined_to_moves_inside() {
        let bounds = Rectangle::new(0, 24, 1920, 1056);
        let r = Rectangle::new(1800, 1000, 200, 200);
        assert_eq!(r.confined_to(&bounds), Rectangle::new(1720, 880, 200, 200));
        let r = Rectangle::new(-50, 0, 100, 100);
        assert_eq!(r.confined_to(&bounds), Rectangle::new(0, 24, 100, 100));
    }

    #[test]
    fn test_shrink_edge_saturates() {
        let r = Rectangle::new(0, 0, 100, 50);
        assert_eq!(r.shrink_edge(Edges::TOP, 20), Rectangle::new(0, 20, 100, 30));
        assert_eq!(r.shrink_edge(Edges::RIGHT, 30), Rectangle::new(0, 0, 70, 50));
        assert_eq!(r.shrink_edge(Edges::LEFT, 500), Rectangle::new(100, 0, 0, 50));
    }

    #[test]
    fn test_exclusive_edge() {
        assert_eq!(Edges::TOP.exclusive_edge(), Some(Edges::TOP));
        assert_eq!(
            (Edges::TOP | Edges::LEFT | Edges::RIGHT).exclusive_edge(),
            Some(Edges::TOP)
        );
        assert_eq!(
            (Edges::LEFT | Edges::TOP | Edges::BOTTOM).exclusive_edge(),
            Some(Edges::LEFT)
        );
        assert_eq!(Edges::TOP_LEFT.exclusive_edge(), None);
        assert_eq!(Edges::all().exclusive_edge(), None);
        assert_eq!(Edges::empty().exclusive_edge(), None);
    }
}
