//! Scene-tree toolkit
//!
//! The toolkit owns the spatial hierarchy of everything on screen and brokers
//! input routing, keyboard focus and damage. It is layered the way the
//! pieces nest:
//!
//! - [`element`]: the capability trait every leaf implements, input event
//!   types, and the simple leaves (solid rectangles, buttons).
//! - [`scene`]: the arena that owns nodes, containers and their ordering,
//!   plus hit-testing, pointer grabs, keyboard focus and damage.
//! - [`surface`]: client drawing surfaces with configure/commit tracking.
//! - [`popup`], [`menu`]: transient children anchored to a parent.
//! - [`window`]: decorated toplevels and their state machine.
//! - [`panel`], [`layer`]: edge-anchored panels and exclusive-zone layout.
//! - [`workspace`]: window stacking, activation and drag sessions.
//! - [`root`]: the workspaces, the lock curtain and event fan-out.
//!
//! Ownership follows the tree: the [`scene::Scene`] arena owns every node;
//! parents reference children by [`NodeId`] and children keep a non-owning
//! parent id that is cleared whenever they are detached.

pub mod element;
pub mod layer;
pub mod menu;
pub mod panel;
pub mod popup;
pub mod root;
pub mod scene;
pub mod surface;
pub mod window;
pub mod workspace;

use std::fmt;

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u64);

        impl $name {
            pub const fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            pub const fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// A node of the scene tree.
    NodeId,
    "node#"
);
define_id!(
    /// A toplevel window, client-backed or internal.
    WindowId,
    "window#"
);
define_id!(
    /// A client drawing surface (toplevel content, popup, panel, lock surface).
    SurfaceId,
    "surface#"
);
define_id!(
    /// A panel on one of the workspace layers.
    PanelId,
    "panel#"
);
define_id!(
    /// A client popup.
    PopupId,
    "popup#"
);
define_id!(
    /// A server-side menu.
    MenuId,
    "menu#"
);
define_id!(
    /// An output in the layout.
    OutputId,
    "output#"
);
define_id!(
    /// A session lock, as held by the root curtain.
    LockId,
    "lock#"
);

/// Hands out the toolkit's identifiers. Values are never reused.
#[derive(Debug, Default)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    fn bump(&mut self) -> u64 {
        let id = self.next.max(1);
        self.next = id + 1;
        id
    }

    pub fn window(&mut self) -> WindowId {
        WindowId(self.bump())
    }

    pub fn surface(&mut self) -> SurfaceId {
        SurfaceId(self.bump())
    }

    pub fn panel(&mut self) -> PanelId {
        PanelId(self.bump())
    }

    pub fn popup(&mut self) -> PopupId {
        PopupId(self.bump())
    }

    pub fn menu(&mut self) -> MenuId {
        MenuId(self.bump())
    }

    pub fn output(&mut self) -> OutputId {
        OutputId(self.bump())
    }

    pub fn lock(&mut self) -> LockId {
        LockId(self.bump())
    }
}

pub use element::{
    AxisEvent, ButtonEvent, ButtonState, ButtonTag, Color, CursorKind, Element, EventSink,
    KeyEvent, SceneEvent,
};
pub use scene::Scene;
