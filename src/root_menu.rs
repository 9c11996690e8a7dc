//! Root menu
//!
//! A server-side window whose content is the configured menu tree. It is
//! opened by the `RootMenu` action (keyboard-driven) or by a right-click on
//! the workspace background, and closes again once an item is chosen or the
//! menu is dismissed.

use log::{debug, warn};

use crate::action::BoundAction;
use crate::config::MenuEntry;
use crate::geometry::Point;
use crate::toolkit::element::SceneEvent;
use crate::toolkit::menu::{Menu, MenuItem, MenuMode, MenuOutcome};
use crate::toolkit::root::Root;
use crate::toolkit::{IdAllocator, WindowId};

fn build_items(ids: &mut IdAllocator, entries: &[MenuEntry]) -> Vec<MenuItem<BoundAction>> {
    entries
        .iter()
        .map(|entry| match entry {
            MenuEntry::Item { label, action } => MenuItem::entry(label.clone(), action.clone()),
            MenuEntry::Submenu { label, entries } => {
                let items = build_items(ids, entries);
                MenuItem::submenu(label.clone(), Menu::new(ids, Some(label.clone()), items))
            }
        })
        .collect()
}

#[derive(Debug)]
pub struct RootMenu {
    window: WindowId,
    menu: Menu<BoundAction>,
}

impl RootMenu {
    /// Builds the menu and its (unmapped) window.
    pub fn new(root: &mut Root, entry: &MenuEntry) -> Self {
        let (title, items) = match entry {
            MenuEntry::Submenu { label, entries } => {
                (label.clone(), build_items(root.ids_mut(), entries))
            }
            MenuEntry::Item { .. } => (
                String::new(),
                build_items(root.ids_mut(), std::slice::from_ref(entry)),
            ),
        };
        let mut menu = Menu::new(root.ids_mut(), None, items);
        let content = menu.show(root.scene_mut());
        let window = root.create_internal_window(&title, content, menu.keyboard_node(), menu.size());
        debug!("root menu is {}", window);
        Self { window, menu }
    }

    pub fn window(&self) -> WindowId {
        self.window
    }

    pub fn is_open(&self, root: &Root) -> bool {
        root.window(self.window).map_or(false, |w| w.is_mapped())
    }

    pub fn mode(&self) -> MenuMode {
        self.menu.mode()
    }

    /// Maps the menu at `at` on the current workspace. Does nothing if it
    /// is already open.
    pub fn open(&mut self, root: &mut Root, at: Point, mode: MenuMode) -> bool {
        if self.is_open(root) {
            return false;
        }
        let workspace = root.current_index();
        if let Err(err) = root.map_window(self.window, workspace) {
            warn!("root menu: {}", err);
            return false;
        }
        root.set_window_position(self.window, at);
        root.confine_window(self.window);
        root.activate_window(self.window);
        self.menu.set_mode(mode);
        true
    }

    pub fn close(&mut self, root: &mut Root) {
        self.menu.reset(root.scene_mut());
        if self.is_open(root) {
            if let Err(err) = root.unmap_window(self.window) {
                warn!("root menu: {}", err);
            }
        }
    }

    /// Feeds a scene event to the menu. The menu closes once an item is
    /// triggered or it is dismissed.
    pub fn handle(&mut self, root: &mut Root, event: &SceneEvent) -> MenuOutcome<BoundAction> {
        if !self.is_open(root) {
            return MenuOutcome::Ignored;
        }
        let outcome = self.menu.handle(root.scene_mut(), event);
        if matches!(outcome, MenuOutcome::Triggered(_) | MenuOutcome::Dismissed) {
            self.close(root);
        }
        outcome
    }

    /// The button that opened a right-click menu went up.
    pub fn button_released(&mut self, root: &mut Root) -> MenuOutcome<BoundAction> {
        if !self.is_open(root) || self.menu.mode() != MenuMode::RightClick {
            return MenuOutcome::Ignored;
        }
        let outcome = self.menu.release();
        self.close(root);
        outcome
    }
}
