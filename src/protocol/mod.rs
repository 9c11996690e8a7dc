//! Client-bridge contracts
//!
//! The Wayland protocol library that owns sockets, resources and marshalling
//! lives outside this crate. This module is the seam between it and the core:
//!
//! - **Handles**: traits the bridge implements for each protocol object the
//!   core talks back to (toplevels, popups, layer surfaces, session locks).
//! - **Configure tracking**: [`configure::ConfigureQueue`] pairs the serials
//!   of sent configures with the state they carry, so that state only
//!   advances on the matching acknowledgement.
//! - **Wire enums**: conversions from the protocol enums handed in by the
//!   bridge into toolkit types, so the toolkit never depends on wire types.
//! - **Headless doubles**: [`headless`] implements every handle in memory,
//!   recording what the core sent. `main` and the tests run on them.

pub mod configure;
pub mod headless;

use std::fmt;

use thiserror::Error;
use wayland_protocols::xdg::decoration::zv1::server::zxdg_toplevel_decoration_v1;
use wayland_protocols::xdg::shell::server::xdg_toplevel;
use wayland_protocols_wlr::layer_shell::v1::server::{zwlr_layer_shell_v1, zwlr_layer_surface_v1};

use crate::decoration::ClientPreference;
use crate::error::SessionError;
use crate::geometry::{Edges, PointF, Rectangle, Size};
use crate::toolkit::layer::LayerKind;
use crate::toolkit::SurfaceId;

pub use configure::{AckOutcome, ConfigureQueue};

/// Configure serial, as allocated by the protocol library.
pub type Serial = u32;

/// Returns true if `a` is the same as or newer than `b`, tolerating wrap-around.
pub fn serial_at_least(a: Serial, b: Serial) -> bool {
    (a.wrapping_sub(b) as i32) >= 0
}

/// The state proposed to a toplevel in one configure event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ToplevelConfigure {
    /// Content size; zero lets the client decide.
    pub size: Size,
    pub maximized: bool,
    pub fullscreen: bool,
    pub activated: bool,
    pub resizing: bool,
}

impl ToplevelConfigure {
    /// The xdg_toplevel state array the bridge sends along with the size.
    pub fn states(&self) -> Vec<xdg_toplevel::State> {
        let mut states = Vec::new();
        if self.maximized {
            states.push(xdg_toplevel::State::Maximized);
        }
        if self.fullscreen {
            states.push(xdg_toplevel::State::Fullscreen);
        }
        if self.activated {
            states.push(xdg_toplevel::State::Activated);
        }
        if self.resizing {
            states.push(xdg_toplevel::State::Resizing);
        }
        states
    }
}

/// Protocol violations detected in the core and posted on the client's resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Client acked a serial that was never sent
    #[error("surface {surface} acked unknown serial {acked} (pending: {pending:?})")]
    InvalidAckSerial {
        surface: SurfaceId,
        acked: Serial,
        pending: Vec<Serial>,
    },

    /// A second lock surface was created for the same output
    #[error("a lock surface already exists for output {0}")]
    DuplicateLockOutput(u32),

    /// Unlock requested before the session was reported locked
    #[error("unlock requested before the session was locked")]
    InvalidUnlock,

    /// Layer surface requested a zero extent without anchoring both opposite edges
    #[error("layer surface size {size} requires anchors {anchors:?}")]
    InvalidLayerSize { size: Size, anchors: Edges },

    /// Popup requested for a parent that is gone
    #[error("popup parent {0} does not exist")]
    InvalidPopupParent(SurfaceId),
}

/// An xdg_toplevel, as seen from the core.
pub trait ToplevelHandle: fmt::Debug {
    fn send_configure(&self, configure: &ToplevelConfigure) -> Serial;
    fn send_close(&self);
    fn post_error(&self, error: &ProtocolError);
}

/// An xdg_popup.
pub trait PopupHandle: fmt::Debug {
    /// Geometry relative to the parent surface.
    fn send_configure(&self, geometry: Rectangle) -> Serial;
    fn send_popup_done(&self);
    fn post_error(&self, error: &ProtocolError);
}

/// A zwlr_layer_surface_v1.
pub trait LayerSurfaceHandle: fmt::Debug {
    fn send_configure(&self, size: Size) -> Serial;
    fn send_closed(&self);
    fn post_error(&self, error: &ProtocolError);
}

/// An ext_session_lock_v1.
pub trait LockHandle: fmt::Debug {
    fn send_locked(&self);
    fn send_finished(&self);
    fn post_error(&self, error: &ProtocolError);
}

/// An ext_session_lock_surface_v1.
pub trait LockSurfaceHandle: fmt::Debug {
    fn send_configure(&self, size: Size) -> Serial;
    fn post_error(&self, error: &ProtocolError);
}

/// Modifier state in the wl_keyboard.modifiers layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SerializedModifiers {
    pub depressed: u32,
    pub latched: u32,
    pub locked: u32,
    pub group: u32,
}

/// Scroll axis of a pointer axis event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Vertical,
    Horizontal,
}

/// Client-bound input traffic, targeted at a surface.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientInput {
    PointerEnter { surface: SurfaceId, position: PointF },
    PointerLeave { surface: SurfaceId },
    PointerMotion { surface: SurfaceId, position: PointF, time_msec: u32 },
    PointerButton { surface: SurfaceId, button: u32, pressed: bool, time_msec: u32 },
    PointerAxis { surface: SurfaceId, axis: Axis, delta: f64, time_msec: u32 },
    KeyboardEnter { surface: SurfaceId },
    KeyboardLeave { surface: SurfaceId },
    KeyboardKey { surface: SurfaceId, keycode: u32, pressed: bool, time_msec: u32 },
    KeyboardModifiers { surface: SurfaceId, modifiers: SerializedModifiers },
}

impl ClientInput {
    pub fn surface(&self) -> SurfaceId {
        match self {
            ClientInput::PointerEnter { surface, .. }
            | ClientInput::PointerLeave { surface }
            | ClientInput::PointerMotion { surface, .. }
            | ClientInput::PointerButton { surface, .. }
            | ClientInput::PointerAxis { surface, .. }
            | ClientInput::KeyboardEnter { surface }
            | ClientInput::KeyboardLeave { surface }
            | ClientInput::KeyboardKey { surface, .. }
            | ClientInput::KeyboardModifiers { surface, .. } => *surface,
        }
    }
}

/// The seat's client side: wl_pointer and wl_keyboard resources.
pub trait SeatBridge: fmt::Debug {
    fn send(&mut self, input: ClientInput);
}

/// The graphics session (logind, libseat or a bare TTY).
pub trait SessionBackend: fmt::Debug {
    fn switch_vt(&mut self, vt: u32) -> Result<(), SessionError>;
}

impl From<zwlr_layer_surface_v1::Anchor> for Edges {
    fn from(anchor: zwlr_layer_surface_v1::Anchor) -> Self {
        Edges::from_bits_truncate(anchor.bits())
    }
}

impl From<xdg_toplevel::ResizeEdge> for Edges {
    fn from(edge: xdg_toplevel::ResizeEdge) -> Self {
        match edge {
            xdg_toplevel::ResizeEdge::Top => Edges::TOP,
            xdg_toplevel::ResizeEdge::Bottom => Edges::BOTTOM,
            xdg_toplevel::ResizeEdge::Left => Edges::LEFT,
            xdg_toplevel::ResizeEdge::Right => Edges::RIGHT,
            xdg_toplevel::ResizeEdge::TopLeft => Edges::TOP_LEFT,
            xdg_toplevel::ResizeEdge::TopRight => Edges::TOP_RIGHT,
            xdg_toplevel::ResizeEdge::BottomLeft => Edges::BOTTOM_LEFT,
            xdg_toplevel::ResizeEdge::BottomRight => Edges::BOTTOM_RIGHT,
            _ => Edges::empty(),
        }
    }
}

impl From<zwlr_layer_shell_v1::Layer> for LayerKind {
    fn from(layer: zwlr_layer_shell_v1::Layer) -> Self {
        match layer {
            zwlr_layer_shell_v1::Layer::Background => LayerKind::Background,
            zwlr_layer_shell_v1::Layer::Bottom => LayerKind::Bottom,
            zwlr_layer_shell_v1::Layer::Top => LayerKind::Top,
            _ => LayerKind::Overlay,
        }
    }
}

impl From<zxdg_toplevel_decoration_v1::Mode> for ClientPreference {
    fn from(mode: zxdg_toplevel_decoration_v1::Mode) -> Self {
        match mode {
            zxdg_toplevel_decoration_v1::Mode::ServerSide => ClientPreference::ServerSide,
            _ => ClientPreference::ClientSide,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_comparison_wraps() {
        assert!(serial_at_least(5, 5));
        assert!(serial_at_least(6, 5));
        assert!(!serial_at_least(4, 5));
        assert!(serial_at_least(2, u32::MAX - 1));
        assert!(!serial_at_least(u32::MAX - 1, 2));
    }

    #[test]
    fn test_configure_states() {
        let configure = ToplevelConfigure {
            size: Size::new(100, 100),
            maximized: true,
            activated: true,
            ..Default::default()
        };
        assert_eq!(
            configure.states(),
            vec![xdg_toplevel::State::Maximized, xdg_toplevel::State::Activated]
        );
    }

    #[test]
    fn test_wire_enum_conversions() {
        let anchor = zwlr_layer_surface_v1::Anchor::Top | zwlr_layer_surface_v1::Anchor::Left;
        assert_eq!(Edges::from(anchor), Edges::TOP_LEFT);
        assert_eq!(
            Edges::from(xdg_toplevel::ResizeEdge::BottomRight),
            Edges::BOTTOM_RIGHT
        );
        assert_eq!(
            LayerKind::from(zwlr_layer_shell_v1::Layer::Bottom),
            LayerKind::Bottom
        );
        assert_eq!(
            ClientPreference::from(zxdg_toplevel_decoration_v1::Mode::ServerSide),
            ClientPreference::ServerSide
        );
    }
}
