//! The `xdg_positioner` object: a reusable description of how to place a popup
//! relative to its parent's window geometry.

use wayland_protocols::xdg::shell::server::xdg_positioner;

use crate::utils::{Logical, Point, Rectangle, Size};

/// The state of a positioner, as accumulated by the client through `xdg_positioner` requests.
///
/// A positioner is created empty (zero size, no anchor rectangle) and is "complete" only once
/// both a size and an anchor rectangle with positive dimensions have been set. It is consumed
/// (copied) when the client calls `xdg_surface.get_popup`; its lifetime is otherwise independent
/// of any surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionerState {
    /// Size of the rectangle that needs to be positioned.
    pub size: Size<i32, Logical>,
    /// Anchor rectangle, in the parent surface's window-geometry coordinates, relative to which
    /// the popup must be positioned.
    pub anchor_rect: Rectangle<i32, Logical>,
    /// Edge (or corner) of the anchor rectangle the popup is anchored to.
    pub anchor: xdg_positioner::Anchor,
    /// Direction in which the popup extends away from its anchor point.
    pub gravity: xdg_positioner::Gravity,
    /// Constraint-adjustment bitmask requested by the client.
    ///
    /// Only [`xdg_positioner::ConstraintAdjustment::empty()`] is interpreted by this crate: the
    /// unconstrained geometry is always returned. A compositor that wants to reposition popups
    /// that would otherwise end up off-screen can inspect this field and apply its own placement
    /// policy on top of [`PositionerState::get_geometry`]; doing so is out of scope here.
    pub constraint_adjustment: xdg_positioner::ConstraintAdjustment,
    /// Offset added to the anchor point before gravity is applied.
    pub offset: Point<i32, Logical>,
}

impl Default for PositionerState {
    fn default() -> Self {
        PositionerState {
            size: Size::from((0, 0)),
            anchor_rect: Rectangle::from_loc_and_size((0, 0), (0, 0)),
            anchor: xdg_positioner::Anchor::None,
            gravity: xdg_positioner::Gravity::None,
            constraint_adjustment: xdg_positioner::ConstraintAdjustment::empty(),
            offset: Point::from((0, 0)),
        }
    }
}

impl PositionerState {
    /// A positioner is complete once it has a positive size and a positive-width anchor
    /// rectangle. Incomplete positioners must not be used to create a popup.
    pub fn is_complete(&self) -> bool {
        self.size.w > 0 && self.size.h > 0 && self.anchor_rect.size.w > 0
    }

    fn anchor_has_edge(&self, edge: xdg_positioner::Anchor) -> bool {
        use xdg_positioner::Anchor::*;
        match edge {
            Top => matches!(self.anchor, Top | TopLeft | TopRight),
            Bottom => matches!(self.anchor, Bottom | BottomLeft | BottomRight),
            Left => matches!(self.anchor, Left | TopLeft | BottomLeft),
            Right => matches!(self.anchor, Right | TopRight | BottomRight),
            _ => unreachable!("anchor_has_edge is only called with a cardinal edge"),
        }
    }

    fn gravity_has_edge(&self, edge: xdg_positioner::Gravity) -> bool {
        use xdg_positioner::Gravity::*;
        match edge {
            Top => matches!(self.gravity, Top | TopLeft | TopRight),
            Bottom => matches!(self.gravity, Bottom | BottomLeft | BottomRight),
            Left => matches!(self.gravity, Left | TopLeft | BottomLeft),
            Right => matches!(self.gravity, Right | TopRight | BottomRight),
            _ => unreachable!("gravity_has_edge is only called with a cardinal edge"),
        }
    }

    /// The point on the anchor rectangle the popup is anchored to, derived from
    /// [`PositionerState::anchor`].
    pub fn anchor_point(&self) -> Point<i32, Logical> {
        let mut point = self.anchor_rect.loc;

        point.y += if self.anchor_has_edge(xdg_positioner::Anchor::Top) {
            0
        } else if self.anchor_has_edge(xdg_positioner::Anchor::Bottom) {
            self.anchor_rect.size.h
        } else {
            self.anchor_rect.size.h / 2
        };

        point.x += if self.anchor_has_edge(xdg_positioner::Anchor::Left) {
            0
        } else if self.anchor_has_edge(xdg_positioner::Anchor::Right) {
            self.anchor_rect.size.w
        } else {
            self.anchor_rect.size.w / 2
        };

        point
    }

    /// Compute the popup geometry described by this positioner, in the parent surface's
    /// window-geometry coordinate space.
    ///
    /// This implements only the `constraint_adjustment = NONE` path: the returned rectangle is
    /// never adjusted to fit within any bound. A compositor implementing constraint-adjustment
    /// policy should start from this rectangle and the positioner's `constraint_adjustment` mask.
    pub fn get_geometry(&self) -> Rectangle<i32, Logical> {
        let mut geometry = Rectangle::new(self.offset, self.size);

        geometry.loc += self.anchor_point();

        if self.gravity_has_edge(xdg_positioner::Gravity::Top) {
            geometry.loc.y -= geometry.size.h;
        } else if !self.gravity_has_edge(xdg_positioner::Gravity::Bottom) {
            geometry.loc.y -= geometry.size.h / 2;
        }

        if self.gravity_has_edge(xdg_positioner::Gravity::Left) {
            geometry.loc.x -= geometry.size.w;
        } else if !self.gravity_has_edge(xdg_positioner::Gravity::Right) {
            geometry.loc.x -= geometry.size.w / 2;
        }

        geometry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positioner(
        size: (i32, i32),
        anchor_rect: (i32, i32, i32, i32),
        anchor: xdg_positioner::Anchor,
        gravity: xdg_positioner::Gravity,
        offset: (i32, i32),
    ) -> PositionerState {
        PositionerState {
            size: Size::from(size),
            anchor_rect: Rectangle::from_loc_and_size((anchor_rect.0, anchor_rect.1), (anchor_rect.2, anchor_rect.3)),
            anchor,
            gravity,
            constraint_adjustment: xdg_positioner::ConstraintAdjustment::empty(),
            offset: Point::from(offset),
        }
    }

    #[test]
    fn scenario_positioner_geometry() {
        // size=(100,50), anchor_rect=(0,0,200,100), anchor=BOTTOM_RIGHT, gravity=TOP_LEFT,
        // offset=(0,0): anchor point is (200,100), gravity=TOP_LEFT subtracts the popup's
        // own size on both axes => geometry=(100,50,100,50)
        let p = positioner(
            (100, 50),
            (0, 0, 200, 100),
            xdg_positioner::Anchor::BottomRight,
            xdg_positioner::Gravity::TopLeft,
            (0, 0),
        );
        let geo = p.get_geometry();
        assert_eq!(geo, Rectangle::from_loc_and_size((100, 50), (100, 50)));
    }

    #[test]
    fn centered_anchor_and_gravity() {
        let p = positioner(
            (100, 50),
            (0, 0, 200, 100),
            xdg_positioner::Anchor::None,
            xdg_positioner::Gravity::None,
            (0, 0),
        );
        // anchor point is the center of the anchor rect: (100, 50)
        // centered gravity subtracts half the popup size on both axes
        let geo = p.get_geometry();
        assert_eq!(geo, Rectangle::from_loc_and_size((50, 25), (100, 50)));
    }

    #[test]
    fn offset_is_applied_before_anchor_and_gravity() {
        let p = positioner(
            (10, 10),
            (0, 0, 100, 100),
            xdg_positioner::Anchor::TopLeft,
            xdg_positioner::Gravity::BottomRight,
            (5, 7),
        );
        let geo = p.get_geometry();
        assert_eq!(geo, Rectangle::from_loc_and_size((5, 7), (10, 10)));
    }

    #[test]
    fn completeness() {
        let mut p = PositionerState::default();
        assert!(!p.is_complete());
        p.size = Size::from((10, 10));
        assert!(!p.is_complete());
        p.anchor_rect = Rectangle::from_loc_and_size((0, 0), (10, 10));
        assert!(p.is_complete());
    }

    #[test]
    fn positioner_purity() {
        // geometry is a pure function of the positioner's fields: calling it twice with the
        // same fields yields the same rectangle.
        let anchors = [
            xdg_positioner::Anchor::None,
            xdg_positioner::Anchor::Top,
            xdg_positioner::Anchor::BottomRight,
        ];
        let gravities = [
            xdg_positioner::Gravity::None,
            xdg_positioner::Gravity::Bottom,
            xdg_positioner::Gravity::TopLeft,
        ];
        for &anchor in &anchors {
            for &gravity in &gravities {
                let p = positioner((30, 20), (1, 2, 40, 60), anchor, gravity, (3, -4));
                assert_eq!(p.get_geometry(), p.get_geometry());
            }
        }
    }
}
