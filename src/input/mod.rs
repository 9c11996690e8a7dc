//! Seat input handling
//!
//! Keys are translated by the XKB [`keyboard::Keyboard`], offered to the
//! [`keybinding::KeyBindings`] and, when no binding claims them, handed back
//! for delivery through the scene. A key whose press was claimed by a
//! binding has its release swallowed too, so clients never see half a
//! keystroke.
//!
//! Pointer motion moves the [`cursor::Cursor`]; whether it goes to the
//! scene or to a drag session is the [`PointerMode`].

pub mod cursor;
pub mod keyboard;
pub mod keybinding;

use log::{debug, warn};
use std::collections::HashSet;

use xkbcommon::xkb;

use crate::geometry::Edges;
use crate::protocol::SerializedModifiers;
use crate::toolkit::workspace::{DragMode, DragSession};
use crate::toolkit::KeyEvent;

use self::cursor::Cursor;
use self::keybinding::{KeyBindings, Modifiers};
use self::keyboard::{KeyInput, Keyboard, RepeatInfo};

/// Where pointer events go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerMode {
    /// To the element under the cursor.
    Passthrough,
    Move,
    Resize(Edges),
}

impl PointerMode {
    pub fn of(drag: Option<&DragSession>) -> Self {
        match drag.map(|d| d.mode) {
            None => PointerMode::Passthrough,
            Some(DragMode::Move) => PointerMode::Move,
            Some(DragMode::Resize(edges)) => PointerMode::Resize(edges),
        }
    }
}

/// What became of one key event.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyRouting {
    /// A binding claimed it.
    Consumed,
    /// Deliver through the scene.
    Forward(KeyEvent),
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyOutcome {
    pub routing: KeyRouting,
    pub modifiers: Modifiers,
    /// New modifier state for the focused client, when it changed.
    pub serialized: Option<SerializedModifiers>,
}

/// Keyboard, bindings and cursor of the single seat.
#[derive(Debug)]
pub struct InputManager<T> {
    keyboard: Option<Keyboard>,
    bindings: KeyBindings<T>,
    cursor: Cursor,
    repeat: RepeatInfo,
    /// Keycodes whose press a binding consumed.
    consumed: HashSet<u32>,
}

impl<T> InputManager<T> {
    /// A seat without a keyboard still routes keys, with no keysyms.
    pub fn new(keyboard: Option<Keyboard>, bindings: KeyBindings<T>, repeat: RepeatInfo) -> Self {
        if keyboard.is_none() {
            warn!("⌨️ No keymap; key bindings are inactive");
        }
        Self {
            keyboard,
            bindings,
            cursor: Cursor::new(),
            repeat,
            consumed: HashSet::new(),
        }
    }

    pub fn keyboard(&self) -> Option<&Keyboard> {
        self.keyboard.as_ref()
    }

    pub fn bindings(&self) -> &KeyBindings<T> {
        &self.bindings
    }

    pub fn bindings_mut(&mut self) -> &mut KeyBindings<T> {
        &mut self.bindings
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn cursor_mut(&mut self) -> &mut Cursor {
        &mut self.cursor
    }

    pub fn repeat(&self) -> RepeatInfo {
        self.repeat
    }

    pub fn modifiers(&self) -> Modifiers {
        self.keyboard
            .as_ref()
            .map(Keyboard::modifiers)
            .unwrap_or_default()
    }

    /// Modifier state as last sent to clients.
    pub fn serialized_modifiers(&self) -> SerializedModifiers {
        self.keyboard
            .as_ref()
            .map(Keyboard::serialized_modifiers)
            .unwrap_or_default()
    }

    /// Runs a hardware key through the keymap without routing it.
    pub fn translate(&mut self, keycode: u32, pressed: bool) -> KeyInput {
        match self.keyboard.as_mut() {
            Some(keyboard) => keyboard.key(keycode, pressed),
            None => KeyInput {
                keysyms: Vec::new(),
                modifiers: Modifiers::empty(),
                serialized: None,
            },
        }
    }

    /// Bound values matching one keysym, in binding order.
    pub fn matching(&self, modifiers: Modifiers, keysym: xkb::Keysym) -> Vec<T>
    where
        T: Clone,
    {
        self.bindings.matches(modifiers, keysym).cloned().collect()
    }

    /// Translates a hardware key and routes it.
    pub fn key(
        &mut self,
        keycode: u32,
        pressed: bool,
        time_msec: u32,
        handler: impl FnMut(&T) -> bool,
    ) -> KeyOutcome {
        let input = self.translate(keycode, pressed);
        let routing = self.route(keycode, &input.keysyms, input.modifiers, pressed, time_msec, handler);
        KeyOutcome {
            routing,
            modifiers: self.modifiers(),
            serialized: input.serialized,
        }
    }

    /// Routes already-translated keysyms: bindings first, on press only.
    pub fn route(
        &mut self,
        keycode: u32,
        keysyms: &[xkb::Keysym],
        modifiers: Modifiers,
        pressed: bool,
        time_msec: u32,
        mut handler: impl FnMut(&T) -> bool,
    ) -> KeyRouting {
        let claimed = pressed
            && keysyms
                .iter()
                .any(|keysym| self.bindings.dispatch(modifiers, *keysym, &mut handler));
        self.settle(keycode, keysyms, modifiers, pressed, time_msec, claimed)
    }

    /// Decides delivery once bindings had their say. The release of a
    /// claimed press is swallowed.
    pub fn settle(
        &mut self,
        keycode: u32,
        keysyms: &[xkb::Keysym],
        modifiers: Modifiers,
        pressed: bool,
        time_msec: u32,
        claimed: bool,
    ) -> KeyRouting {
        if pressed && claimed {
            debug!("⌨️ Key {} claimed by a binding", keycode);
            self.consumed.insert(keycode);
            return KeyRouting::Consumed;
        }
        if !pressed && self.consumed.remove(&keycode) {
            return KeyRouting::Consumed;
        }
        KeyRouting::Forward(KeyEvent {
            keycode,
            keysyms: keysyms.to_vec(),
            pressed,
            modifiers,
            time_msec,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::keybinding::KeyCombo;
    use super::*;
    use crate::geometry::{PointF, Rectangle};

    fn manager() -> InputManager<&'static str> {
        let mut bindings = KeyBindings::new();
        bindings.bind("Logo+Return".parse::<KeyCombo>().unwrap(), "terminal");
        bindings.bind("Logo+x".parse::<KeyCombo>().unwrap(), "unclaimed");
        InputManager::new(None, bindings, RepeatInfo::default())
    }

    #[test]
    fn test_claimed_press_swallows_release() {
        let mut input = manager();
        let mut fired = Vec::new();
        let routing = input.route(28, &[xkb::Keysym::Return], Modifiers::LOGO, true, 10, |a| {
            fired.push(*a);
            true
        });
        assert_eq!(routing, KeyRouting::Consumed);
        assert_eq!(fired, vec!["terminal"]);

        let release = input.route(28, &[xkb::Keysym::Return], Modifiers::empty(), false, 20, |_| true);
        assert_eq!(release, KeyRouting::Consumed);

        let again = input.route(28, &[xkb::Keysym::Return], Modifiers::empty(), false, 30, |_| true);
        assert!(matches!(again, KeyRouting::Forward(KeyEvent { pressed: false, .. })));
    }

    #[test]
    fn test_unclaimed_key_is_forwarded() {
        let mut input = manager();
        let routing = input.route(45, &[xkb::Keysym::x], Modifiers::LOGO, true, 10, |_| false);
        assert_eq!(
            routing,
            KeyRouting::Forward(KeyEvent {
                keycode: 45,
                keysyms: vec![xkb::Keysym::x],
                pressed: true,
                modifiers: Modifiers::LOGO,
                time_msec: 10,
            })
        );
    }

    #[test]
    fn test_matching_and_settle() {
        let mut input = manager();
        assert_eq!(input.matching(Modifiers::LOGO, xkb::Keysym::Return), vec!["terminal"]);
        assert!(input.matching(Modifiers::CTRL, xkb::Keysym::Return).is_empty());

        let press = input.settle(28, &[xkb::Keysym::Return], Modifiers::LOGO, true, 1, true);
        assert_eq!(press, KeyRouting::Consumed);
        let release = input.settle(28, &[xkb::Keysym::Return], Modifiers::LOGO, false, 2, false);
        assert_eq!(release, KeyRouting::Consumed);
    }

    #[test]
    fn test_without_keyboard_keys_pass_through() {
        let mut input = manager();
        let outcome = input.key(30, true, 0, |_| true);
        assert!(matches!(outcome.routing, KeyRouting::Forward(_)));
        assert_eq!(outcome.serialized, None);
    }

    #[test]
    fn test_pointer_mode_follows_drag() {
        let drag = DragSession {
            window: crate::toolkit::WindowId::from_raw(1),
            mode: DragMode::Resize(Edges::LEFT),
            grab: PointF::new(0.0, 0.0),
            original: Rectangle::new(0, 0, 10, 10),
        };
        assert_eq!(PointerMode::of(None), PointerMode::Passthrough);
        assert_eq!(PointerMode::of(Some(&drag)), PointerMode::Resize(Edges::LEFT));
    }
}
