//! Scene leaves: the element capability trait and input event types.
//!
//! An [`Element`] never sees another node directly. Whatever it wants the
//! rest of the system to do (forward input to a client, start a move,
//! trigger a menu item) it records as a [`SceneEvent`] in the [`EventSink`]
//! handed to every callback; the owner drains the sink after dispatch.

use std::any::Any;
use std::fmt;

use xkbcommon::xkb;

use crate::geometry::{Edges, PointF, Rectangle, Size};
use crate::input::keybinding::Modifiers;
use crate::protocol::{Axis, ClientInput};
use crate::toolkit::{MenuId, WindowId};

/// Linux input event codes for the buttons the toolkit cares about.
pub const BTN_LEFT: u32 = 0x110;
pub const BTN_RIGHT: u32 = 0x111;
pub const BTN_MIDDLE: u32 = 0x112;

/// Downcasting support for trait objects stored in the scene.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonState {
    Pressed,
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ButtonEvent {
    pub button: u32,
    pub state: ButtonState,
    pub time_msec: u32,
    /// Pointer position in the receiving element's coordinates.
    pub position: PointF,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisEvent {
    pub axis: Axis,
    pub delta: f64,
    pub time_msec: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyEvent {
    /// Hardware keycode, without the XKB offset.
    pub keycode: u32,
    pub keysyms: Vec<xkb::Keysym>,
    pub pressed: bool,
    pub modifiers: Modifiers,
    pub time_msec: u32,
}

/// Pointer image an element asks for while the pointer is over it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorKind {
    #[default]
    Default,
    Move,
    Resize(Edges),
    Pointer,
}

/// ARGB colour, as written in configuration files (`0xff202020` or `#202020`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Color(pub u32);

impl Color {
    pub const BLACK: Color = Color(0xff00_0000);
    pub const WHITE: Color = Color(0xffff_ffff);

    pub fn parse(text: &str) -> Option<Color> {
        let text = text.trim();
        let (digits, implicit_alpha) = if let Some(hex) = text.strip_prefix('#') {
            (hex, hex.len() == 6)
        } else if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
            (hex, hex.len() == 6)
        } else {
            return None;
        };
        if digits.len() != 6 && digits.len() != 8 {
            return None;
        }
        let value = u32::from_str_radix(digits, 16).ok()?;
        Some(Color(if implicit_alpha {
            0xff00_0000 | value
        } else {
            value
        }))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// What a [`Button`] reports when clicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonTag {
    WindowClose(WindowId),
    WindowMenu(WindowId),
    /// Owner-defined buttons (dock tiles, clip arrows).
    Custom(u64),
}

/// Requests raised by elements during dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEvent {
    /// Input to forward to a client surface.
    Client(ClientInput),
    /// A client surface was clicked.
    SurfaceClicked(crate::toolkit::SurfaceId),
    WindowActivate(WindowId),
    WindowMove(WindowId),
    WindowResize(WindowId, Edges),
    WindowMenu(WindowId),
    WindowToggleShade(WindowId),
    ButtonClicked(ButtonTag),
    MenuHover { menu: MenuId, item: usize },
    MenuTrigger { menu: MenuId, item: usize },
    MenuKey { menu: MenuId, keysym: xkb::Keysym },
    /// Press on a workspace background, in global coordinates.
    BackgroundButton { button: u32, position: PointF },
}

/// Collects [`SceneEvent`]s raised during one dispatch.
#[derive(Debug, Default)]
pub struct EventSink {
    events: Vec<SceneEvent>,
}

impl EventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: SceneEvent) {
        self.events.push(event);
    }

    pub fn drain(&mut self) -> Vec<SceneEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn events(&self) -> &[SceneEvent] {
        &self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Capabilities of a scene leaf.
///
/// Hit-testing is done by the scene against [`Element::dimensions`]; the
/// pointer callbacks only run for elements under the pointer (or holding a
/// pointer grab). Positions are in the element's own coordinates.
pub trait Element: AsAny + fmt::Debug {
    /// Bounding box relative to the node position. Usually at (0, 0).
    fn dimensions(&self) -> Rectangle;

    /// Returns true if the element claims the motion. Unclaimed motion is
    /// offered to the next sibling below.
    fn pointer_motion(&mut self, _position: PointF, _time_msec: u32, _sink: &mut EventSink) -> bool {
        true
    }

    fn pointer_enter(&mut self, _position: PointF, _sink: &mut EventSink) {}

    fn pointer_leave(&mut self, _sink: &mut EventSink) {}

    fn pointer_button(&mut self, _event: &ButtonEvent, _sink: &mut EventSink) -> bool {
        false
    }

    fn pointer_axis(&mut self, _event: &AxisEvent, _sink: &mut EventSink) -> bool {
        false
    }

    fn keyboard_key(&mut self, _event: &KeyEvent, _sink: &mut EventSink) -> bool {
        false
    }

    fn keyboard_focus(&mut self, _focused: bool, _sink: &mut EventSink) {}

    fn cursor(&self) -> Option<CursorKind> {
        None
    }

    /// Colour for solid elements; `None` for content drawn elsewhere.
    fn fill(&self) -> Option<Color> {
        None
    }

    /// Called once when the node is destroyed.
    fn destroy(&mut self) {}
}

/// A filled rectangle: borders, backdrops, separators.
#[derive(Debug, Clone)]
pub struct SolidRect {
    pub size: Size,
    pub color: Color,
    /// Whether pointer motion over the rectangle is claimed.
    pub opaque: bool,
}

impl SolidRect {
    pub fn new(size: Size, color: Color) -> Self {
        Self {
            size,
            color,
            opaque: true,
        }
    }
}

impl Element for SolidRect {
    fn dimensions(&self) -> Rectangle {
        Rectangle::from_loc_and_size(Default::default(), self.size)
    }

    fn pointer_motion(&mut self, _position: PointF, _time_msec: u32, _sink: &mut EventSink) -> bool {
        self.opaque
    }

    fn fill(&self) -> Option<Color> {
        Some(self.color)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonLook {
    Normal,
    Hover,
    Pressed,
}

/// A push button. Clicks complete on release inside the button after a
/// press inside it.
#[derive(Debug, Clone)]
pub struct Button {
    pub size: Size,
    pub tag: ButtonTag,
    pub label: String,
    pub colors: [Color; 3],
    look: ButtonLook,
    pointer_inside: bool,
}

impl Button {
    pub fn new(size: Size, tag: ButtonTag) -> Self {
        Self {
            size,
            tag,
            label: String::new(),
            colors: [Color(0xff50_5050), Color(0xff70_7070), Color(0xff30_3030)],
            look: ButtonLook::Normal,
            pointer_inside: false,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn look(&self) -> ButtonLook {
        self.look
    }
}

impl Element for Button {
    fn dimensions(&self) -> Rectangle {
        Rectangle::from_loc_and_size(Default::default(), self.size)
    }

    fn pointer_enter(&mut self, _position: PointF, _sink: &mut EventSink) {
        self.pointer_inside = true;
        if self.look == ButtonLook::Normal {
            self.look = ButtonLook::Hover;
        }
    }

    fn pointer_leave(&mut self, _sink: &mut EventSink) {
        self.pointer_inside = false;
        self.look = ButtonLook::Normal;
    }

    fn pointer_button(&mut self, event: &ButtonEvent, sink: &mut EventSink) -> bool {
        if event.button != BTN_LEFT {
            return false;
        }
        match event.state {
            ButtonState::Pressed => {
                self.look = ButtonLook::Pressed;
            }
            ButtonState::Released => {
                let inside = self.dimensions().contains_f(event.position);
                if self.look == ButtonLook::Pressed && inside {
                    sink.push(SceneEvent::ButtonClicked(self.tag));
                }
                self.look = if self.pointer_inside {
                    ButtonLook::Hover
                } else {
                    ButtonLook::Normal
                };
            }
        }
        true
    }

    fn cursor(&self) -> Option<CursorKind> {
        Some(CursorKind::Pointer)
    }

    fn fill(&self) -> Option<Color> {
        Some(match self.look {
            ButtonLook::Normal => self.colors[0],
            ButtonLook::Hover => self.colors[1],
            ButtonLook::Pressed => self.colors[2],
        })
    }
}

/// A line of text. Glyphs are rasterized by the renderer; the toolkit only
/// keeps the string and the box it is laid out in.
#[derive(Debug, Clone)]
pub struct Label {
    pub size: Size,
    pub text: String,
    pub color: Color,
}

impl Label {
    pub fn new(size: Size, text: impl Into<String>) -> Self {
        Self {
            size,
            text: text.into(),
            color: Color::WHITE,
        }
    }
}

impl Element for Label {
    fn dimensions(&self) -> Rectangle {
        Rectangle::from_loc_and_size(Default::default(), self.size)
    }

    fn pointer_motion(&mut self, _position: PointF, _time_msec: u32, _sink: &mut EventSink) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(button: u32, x: f64, y: f64) -> ButtonEvent {
        ButtonEvent {
            button,
            state: ButtonState::Pressed,
            time_msec: 0,
            position: PointF::new(x, y),
        }
    }

    fn release(button: u32, x: f64, y: f64) -> ButtonEvent {
        ButtonEvent {
            state: ButtonState::Released,
            ..press(button, x, y)
        }
    }

    #[test]
    fn test_color_parse() {
        assert_eq!(Color::parse("#202020"), Some(Color(0xff20_2020)));
        assert_eq!(Color::parse("0x80102030"), Some(Color(0x8010_2030)));
        assert_eq!(Color::parse("0x102030"), Some(Color(0xff10_2030)));
        assert_eq!(Color::parse("red"), None);
        assert_eq!(Color::parse("#12345"), None);
    }

    #[test]
    fn test_button_click_completes_inside() {
        let mut sink = EventSink::new();
        let mut button = Button::new(Size::new(20, 20), ButtonTag::Custom(7));

        button.pointer_enter(PointF::new(5.0, 5.0), &mut sink);
        assert_eq!(button.look(), ButtonLook::Hover);
        assert!(button.pointer_button(&press(BTN_LEFT, 5.0, 5.0), &mut sink));
        assert_eq!(button.look(), ButtonLook::Pressed);
        assert!(button.pointer_button(&release(BTN_LEFT, 6.0, 6.0), &mut sink));

        assert_eq!(
            sink.drain(),
            vec![SceneEvent::ButtonClicked(ButtonTag::Custom(7))]
        );
        assert_eq!(button.look(), ButtonLook::Hover);
    }

    #[test]
    fn test_button_release_outside_does_not_click() {
        let mut sink = EventSink::new();
        let mut button = Button::new(Size::new(20, 20), ButtonTag::Custom(1));

        button.pointer_button(&press(BTN_LEFT, 5.0, 5.0), &mut sink);
        button.pointer_leave(&mut sink);
        button.pointer_button(&release(BTN_LEFT, 40.0, 5.0), &mut sink);

        assert!(sink.is_empty());
        assert_eq!(button.look(), ButtonLook::Normal);
    }

    #[test]
    fn test_button_ignores_other_buttons() {
        let mut sink = EventSink::new();
        let mut button = Button::new(Size::new(20, 20), ButtonTag::Custom(1));
        assert!(!button.pointer_button(&press(BTN_RIGHT, 5.0, 5.0), &mut sink));
        assert_eq!(button.look(), ButtonLook::Normal);
    }
}
