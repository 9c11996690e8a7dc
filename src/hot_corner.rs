//! Hot corners
//!
//! Each corner of the output layout is the single pixel at that corner of
//! the layout extents. Resting the pointer there for the enter delay runs
//! the corner's enter action; leaving a corner whose enter action ran runs
//! its leave action.

use log::debug;
use std::time::{Duration, Instant};

use crate::action::BoundAction;
use crate::geometry::{Point, PointF, Rectangle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    fn index(self) -> usize {
        self as usize
    }

    /// The corner pixel of `extents`.
    pub fn pixel(self, extents: Rectangle) -> Point {
        let right = extents.right() - 1;
        let bottom = extents.bottom() - 1;
        match self {
            Corner::TopLeft => Point::new(extents.x, extents.y),
            Corner::TopRight => Point::new(right, extents.y),
            Corner::BottomLeft => Point::new(extents.x, bottom),
            Corner::BottomRight => Point::new(right, bottom),
        }
    }

    pub fn at(position: PointF, extents: Rectangle) -> Option<Corner> {
        if extents.is_empty() {
            return None;
        }
        let pixel = Point::new(position.x.floor() as i32, position.y.floor() as i32);
        Corner::ALL
            .into_iter()
            .find(|corner| corner.pixel(extents) == pixel)
    }
}

/// Actions of one corner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CornerActions {
    pub enter: Option<BoundAction>,
    pub leave: Option<BoundAction>,
}

#[derive(Debug, Clone, Copy)]
struct Occupied {
    corner: Corner,
    since: Instant,
    entered: bool,
}

#[derive(Debug)]
pub struct HotCorners {
    extents: Rectangle,
    delay: Duration,
    actions: [CornerActions; 4],
    occupied: Option<Occupied>,
}

impl HotCorners {
    pub fn new(delay: Duration, actions: [CornerActions; 4]) -> Self {
        Self {
            extents: Rectangle::default(),
            delay,
            actions,
            occupied: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn actions(&self, corner: Corner) -> &CornerActions {
        &self.actions[corner.index()]
    }

    /// The layout changed. A corner the pointer was resting in is left.
    pub fn set_extents(&mut self, extents: Rectangle) -> Option<BoundAction> {
        self.extents = extents;
        self.leave()
    }

    fn leave(&mut self) -> Option<BoundAction> {
        let occupied = self.occupied.take()?;
        if !occupied.entered {
            return None;
        }
        debug!("Hot corner {:?} left", occupied.corner);
        self.actions[occupied.corner.index()].leave.clone()
    }

    /// Returns the leave action when the pointer moved out of an entered
    /// corner.
    pub fn pointer_moved(&mut self, position: PointF, now: Instant) -> Option<BoundAction> {
        let corner = Corner::at(position, self.extents);
        if corner == self.occupied.map(|o| o.corner) {
            return None;
        }
        let leave = self.leave();
        self.occupied = corner.map(|corner| Occupied {
            corner,
            since: now,
            entered: false,
        });
        leave
    }

    /// Time until the pending enter action is due.
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let occupied = self.occupied.filter(|o| !o.entered)?;
        Some(
            self.delay
                .saturating_sub(now.saturating_duration_since(occupied.since)),
        )
    }

    /// Returns the enter action once the pointer rested long enough.
    pub fn poll(&mut self, now: Instant) -> Option<BoundAction> {
        if !self.remaining(now)?.is_zero() {
            return None;
        }
        let occupied = self.occupied.as_mut()?;
        occupied.entered = true;
        debug!("Hot corner {:?} entered", occupied.corner);
        self.actions[occupied.corner.index()].enter.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;

    fn corners() -> HotCorners {
        let mut actions: [CornerActions; 4] = Default::default();
        actions[Corner::TopLeft.index()] = CornerActions {
            enter: Some(BoundAction::new(Action::LockInhibitBegin)),
            leave: Some(BoundAction::new(Action::LockInhibitEnd)),
        };
        actions[Corner::BottomRight.index()].enter = Some(BoundAction::new(Action::LockScreen));
        let mut corners = HotCorners::new(Duration::from_millis(500), actions);
        corners.set_extents(Rectangle::new(0, 0, 1920, 1080));
        corners
    }

    #[test]
    fn test_corner_pixels() {
        let extents = Rectangle::new(0, 0, 1920, 1080);
        assert_eq!(Corner::at(PointF::new(0.4, 0.9), extents), Some(Corner::TopLeft));
        assert_eq!(Corner::at(PointF::new(1919.0, 0.0), extents), Some(Corner::TopRight));
        assert_eq!(Corner::at(PointF::new(0.0, 1079.5), extents), Some(Corner::BottomLeft));
        assert_eq!(Corner::at(PointF::new(1.0, 0.0), extents), None);
        assert_eq!(Corner::at(PointF::new(0.0, 0.0), Rectangle::default()), None);
    }

    #[test]
    fn test_enter_after_delay_then_leave() {
        let mut corners = corners();
        let start = Instant::now();
        assert_eq!(corners.pointer_moved(PointF::new(0.0, 0.0), start), None);
        assert_eq!(corners.poll(start + Duration::from_millis(499)), None);
        assert_eq!(
            corners.poll(start + Duration::from_millis(500)),
            Some(BoundAction::new(Action::LockInhibitBegin))
        );
        assert_eq!(corners.poll(start + Duration::from_secs(5)), None);
        assert_eq!(
            corners.pointer_moved(PointF::new(10.0, 0.0), start + Duration::from_secs(6)),
            Some(BoundAction::new(Action::LockInhibitEnd))
        );
    }

    #[test]
    fn test_passing_through_does_nothing() {
        let mut corners = corners();
        let start = Instant::now();
        corners.pointer_moved(PointF::new(1919.0, 1079.0), start);
        assert_eq!(
            corners.pointer_moved(PointF::new(1900.0, 1079.0), start + Duration::from_millis(100)),
            None
        );
        assert_eq!(corners.poll(start + Duration::from_secs(1)), None);
        assert_eq!(corners.remaining(start), None);
    }
}
