//! Server-side menus.
//!
//! A [`Menu`] is a list of items, each either an entry carrying an owner
//! value or a nested submenu. Its scene nodes exist only while it is shown.
//! Item leaves report hovers and clicks as [`SceneEvent`]s; the owner feeds
//! them back through [`Menu::handle`], which answers with a [`MenuOutcome`].
//!
//! In [`MenuMode::Normal`] the menu is keyboard driven as well (Up, Down,
//! Left, Right, Return, Escape). In [`MenuMode::RightClick`] it was opened by
//! a held button and the item under the pointer on release is triggered.

use log::debug;
use xkbcommon::xkb;

use crate::geometry::{Point, PointF, Rectangle, Size};
use crate::toolkit::element::{
    ButtonEvent, ButtonState, Color, Element, EventSink, KeyEvent, Label, SceneEvent,
};
use crate::toolkit::{IdAllocator, MenuId, NodeId, Scene};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MenuMode {
    #[default]
    Normal,
    RightClick,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MenuStyle {
    pub width: i32,
    pub item_height: i32,
    pub title_height: i32,
    pub background: Color,
    pub highlight: Color,
    pub title_background: Color,
    pub text: Color,
    pub disabled_text: Color,
}

impl Default for MenuStyle {
    fn default() -> Self {
        Self {
            width: 200,
            item_height: 20,
            title_height: 22,
            background: Color(0xffaa_aaaa),
            highlight: Color(0xffff_ffff),
            title_background: Color(0xff00_0000),
            text: Color(0xff00_0000),
            disabled_text: Color(0xff60_6060),
        }
    }
}

#[derive(Debug, Clone)]
pub enum MenuItemKind<T> {
    Entry(T),
    Submenu(Menu<T>),
}

#[derive(Debug, Clone)]
pub struct MenuItem<T> {
    pub label: String,
    pub enabled: bool,
    pub kind: MenuItemKind<T>,
}

impl<T> MenuItem<T> {
    pub fn entry(label: impl Into<String>, value: T) -> Self {
        Self {
            label: label.into(),
            enabled: true,
            kind: MenuItemKind::Entry(value),
        }
    }

    pub fn submenu(label: impl Into<String>, menu: Menu<T>) -> Self {
        Self {
            label: label.into(),
            enabled: true,
            kind: MenuItemKind::Submenu(menu),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Result of feeding an event to a menu.
#[derive(Debug, Clone, PartialEq)]
pub enum MenuOutcome<T> {
    /// The event belongs to some other menu.
    Ignored,
    Handled,
    Triggered(T),
    /// The user backed out of the menu.
    Dismissed,
}

#[derive(Debug, Clone)]
struct MenuNodes {
    root: NodeId,
    items: Vec<NodeId>,
    keyboard: NodeId,
}

#[derive(Debug, Clone)]
pub struct Menu<T> {
    id: MenuId,
    title: Option<String>,
    items: Vec<MenuItem<T>>,
    style: MenuStyle,
    mode: MenuMode,
    nodes: Option<MenuNodes>,
    highlighted: Option<usize>,
    open_submenu: Option<usize>,
}

impl<T: Clone> Menu<T> {
    pub fn new(ids: &mut IdAllocator, title: Option<String>, items: Vec<MenuItem<T>>) -> Self {
        Self {
            id: ids.menu(),
            title,
            items,
            style: MenuStyle::default(),
            mode: MenuMode::Normal,
            nodes: None,
            highlighted: None,
            open_submenu: None,
        }
    }

    pub fn with_style(mut self, style: MenuStyle) -> Self {
        self.apply_style(&style);
        self
    }

    fn apply_style(&mut self, style: &MenuStyle) {
        self.style = style.clone();
        for item in &mut self.items {
            if let MenuItemKind::Submenu(sub) = &mut item.kind {
                sub.apply_style(style);
            }
        }
    }

    pub fn id(&self) -> MenuId {
        self.id
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn items(&self) -> &[MenuItem<T>] {
        &self.items
    }

    pub fn mode(&self) -> MenuMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: MenuMode) {
        self.mode = mode;
        for item in &mut self.items {
            if let MenuItemKind::Submenu(sub) = &mut item.kind {
                sub.set_mode(mode);
            }
        }
    }

    pub fn highlighted(&self) -> Option<usize> {
        self.highlighted
    }

    pub fn open_submenu(&self) -> Option<&Menu<T>> {
        match self.open_submenu.map(|index| &self.items[index].kind) {
            Some(MenuItemKind::Submenu(sub)) => Some(sub),
            _ => None,
        }
    }

    /// True if this menu or one of its descendants has the id.
    pub fn contains_menu(&self, id: MenuId) -> bool {
        self.id == id
            || self.items.iter().any(|item| match &item.kind {
                MenuItemKind::Submenu(sub) => sub.contains_menu(id),
                MenuItemKind::Entry(_) => false,
            })
    }

    pub fn size(&self) -> Size {
        let title = if self.title.is_some() {
            self.style.title_height
        } else {
            0
        };
        Size::new(
            self.style.width,
            title + self.style.item_height * self.items.len() as i32,
        )
    }

    fn item_offset(&self, index: usize) -> i32 {
        let title = if self.title.is_some() {
            self.style.title_height
        } else {
            0
        };
        title + self.style.item_height * index as i32
    }

    pub fn is_shown(&self) -> bool {
        self.nodes.is_some()
    }

    pub fn node(&self) -> Option<NodeId> {
        self.nodes.as_ref().map(|nodes| nodes.root)
    }

    /// The leaf that takes keyboard focus while the menu is up.
    pub fn keyboard_node(&self) -> Option<NodeId> {
        self.nodes.as_ref().map(|nodes| nodes.keyboard)
    }

    /// Builds the scene nodes. Returns the (unattached) root container.
    pub fn show(&mut self, scene: &mut Scene) -> NodeId {
        if let Some(nodes) = &self.nodes {
            return nodes.root;
        }
        let root = scene.create_container();
        let size = self.size();
        let background = scene.create_element(MenuBackground { size, color: self.style.background });
        attach(scene, root, background, Point::default());

        if let Some(title) = &self.title {
            let mut label = Label::new(Size::new(self.style.width, self.style.title_height), title.clone());
            label.color = self.style.highlight;
            let node = scene.create_element(label);
            attach(scene, root, node, Point::default());
        }

        let mut item_nodes = Vec::with_capacity(self.items.len());
        for (index, item) in self.items.iter().enumerate() {
            let element = MenuItemElement {
                menu: self.id,
                index,
                size: Size::new(self.style.width, self.style.item_height),
                label: item.label.clone(),
                enabled: item.enabled,
                highlighted: false,
                has_submenu: matches!(item.kind, MenuItemKind::Submenu(_)),
                colors: [self.style.background, self.style.highlight],
            };
            let node = scene.create_element(element);
            attach(scene, root, node, Point::new(0, self.item_offset(index)));
            item_nodes.push(node);
        }

        let keyboard = scene.create_element(MenuKeyboard { menu: self.id });
        attach(scene, root, keyboard, Point::default());

        self.nodes = Some(MenuNodes {
            root,
            items: item_nodes,
            keyboard,
        });
        root
    }

    /// Destroys the scene nodes, including any open submenu.
    pub fn hide(&mut self, scene: &mut Scene) {
        self.close_submenu(scene);
        if let Some(nodes) = self.nodes.take() {
            scene.destroy(nodes.root);
        }
        self.highlighted = None;
    }

    /// Closes submenus and clears the highlight, keeping the nodes.
    pub fn reset(&mut self, scene: &mut Scene) {
        self.close_submenu(scene);
        self.highlight(scene, None);
    }

    pub fn set_item_enabled(&mut self, scene: &mut Scene, index: usize, enabled: bool) {
        let Some(item) = self.items.get_mut(index) else {
            return;
        };
        item.enabled = enabled;
        if let Some(node) = self.nodes.as_ref().and_then(|n| n.items.get(index).copied()) {
            scene.update_element::<MenuItemElement, _>(node, |e| e.enabled = enabled);
        }
    }

    pub fn highlight(&mut self, scene: &mut Scene, index: Option<usize>) {
        if self.highlighted == index {
            return;
        }
        let nodes = self.nodes.as_ref().map(|n| n.items.clone()).unwrap_or_default();
        if let Some(old) = self.highlighted.and_then(|i| nodes.get(i).copied()) {
            scene.update_element::<MenuItemElement, _>(old, |e| e.highlighted = false);
        }
        if let Some(new) = index.and_then(|i| nodes.get(i).copied()) {
            scene.update_element::<MenuItemElement, _>(new, |e| e.highlighted = true);
        }
        self.highlighted = index;
    }

    fn open_submenu_at(&mut self, scene: &mut Scene, index: usize) {
        if self.open_submenu == Some(index) {
            return;
        }
        self.close_submenu(scene);
        let Some(root) = self.node() else {
            return;
        };
        let offset = Point::new(self.style.width, self.item_offset(index));
        if let Some(MenuItemKind::Submenu(sub)) = self.items.get_mut(index).map(|i| &mut i.kind) {
            let sub_root = sub.show(scene);
            attach(scene, root, sub_root, offset);
            self.open_submenu = Some(index);
            debug!("{}: opened submenu {}", self.id, sub.id);
        }
    }

    fn close_submenu(&mut self, scene: &mut Scene) {
        if let Some(index) = self.open_submenu.take() {
            if let Some(MenuItemKind::Submenu(sub)) = self.items.get_mut(index).map(|i| &mut i.kind) {
                sub.hide(scene);
            }
        }
    }

    fn open_submenu_mut(&mut self) -> Option<&mut Menu<T>> {
        let index = self.open_submenu?;
        match &mut self.items.get_mut(index)?.kind {
            MenuItemKind::Submenu(sub) => Some(sub),
            MenuItemKind::Entry(_) => None,
        }
    }

    /// Feeds a scene event to the menu tree.
    pub fn handle(&mut self, scene: &mut Scene, event: &SceneEvent) -> MenuOutcome<T> {
        match event {
            SceneEvent::MenuHover { menu, item } if *menu == self.id => {
                self.hover(scene, *item);
                MenuOutcome::Handled
            }
            SceneEvent::MenuTrigger { menu, item } if *menu == self.id => {
                self.activate(scene, *item)
            }
            SceneEvent::MenuKey { menu, keysym } if self.contains_menu(*menu) => {
                self.key(scene, *keysym)
            }
            SceneEvent::MenuHover { .. } | SceneEvent::MenuTrigger { .. } => {
                match self.open_submenu_mut() {
                    Some(sub) => sub.handle(scene, event),
                    None => MenuOutcome::Ignored,
                }
            }
            _ => MenuOutcome::Ignored,
        }
    }

    fn hover(&mut self, scene: &mut Scene, index: usize) {
        self.highlight(scene, Some(index));
        let has_submenu = matches!(
            self.items.get(index).map(|i| &i.kind),
            Some(MenuItemKind::Submenu(_))
        );
        let enabled = self.items.get(index).map(|i| i.enabled).unwrap_or(false);
        if has_submenu && enabled {
            self.open_submenu_at(scene, index);
        } else {
            self.close_submenu(scene);
        }
    }

    /// Triggers an item: entries yield their value, submenus open.
    pub fn activate(&mut self, scene: &mut Scene, index: usize) -> MenuOutcome<T> {
        let Some(item) = self.items.get(index) else {
            return MenuOutcome::Handled;
        };
        if !item.enabled {
            return MenuOutcome::Handled;
        }
        match &item.kind {
            MenuItemKind::Entry(value) => MenuOutcome::Triggered(value.clone()),
            MenuItemKind::Submenu(_) => {
                self.open_submenu_at(scene, index);
                MenuOutcome::Handled
            }
        }
    }

    /// End of a [`MenuMode::RightClick`] press: the deepest highlighted
    /// entry fires, anything else dismisses the menu.
    pub fn release(&mut self) -> MenuOutcome<T> {
        if let Some(sub) = self.open_submenu_mut() {
            if sub.highlighted.is_some() {
                return sub.release();
            }
        }
        match self.highlighted.and_then(|index| self.items.get(index)) {
            Some(MenuItem {
                kind: MenuItemKind::Entry(value),
                enabled: true,
                ..
            }) => MenuOutcome::Triggered(value.clone()),
            _ => MenuOutcome::Dismissed,
        }
    }

    fn step(&self, from: Option<usize>, forward: bool) -> Option<usize> {
        let len = self.items.len();
        if len == 0 {
            return None;
        }
        let mut index = match from {
            Some(i) => i,
            None if forward => len - 1,
            None => 0,
        };
        for _ in 0..len {
            index = if forward {
                (index + 1) % len
            } else {
                (index + len - 1) % len
            };
            if self.items[index].enabled {
                return Some(index);
            }
        }
        None
    }

    /// Keyboard navigation, applied to the deepest open submenu.
    pub fn key(&mut self, scene: &mut Scene, keysym: xkb::Keysym) -> MenuOutcome<T> {
        if let Some(sub) = self.open_submenu_mut() {
            if sub.open_submenu.is_some() || sub.highlighted.is_some() {
                if keysym == xkb::Keysym::Left && sub.open_submenu.is_none() {
                    self.close_submenu(scene);
                    return MenuOutcome::Handled;
                }
                return sub.key(scene, keysym);
            }
        }

        if keysym == xkb::Keysym::Down {
            let next = self.step(self.highlighted, true);
            self.highlight(scene, next);
            self.close_submenu(scene);
            MenuOutcome::Handled
        } else if keysym == xkb::Keysym::Up {
            let prev = self.step(self.highlighted, false);
            self.highlight(scene, prev);
            self.close_submenu(scene);
            MenuOutcome::Handled
        } else if keysym == xkb::Keysym::Right {
            if let Some(index) = self.highlighted {
                self.open_submenu_at(scene, index);
                if let Some(sub) = self.open_submenu_mut() {
                    let first = sub.step(None, true);
                    sub.highlight(scene, first);
                }
            }
            MenuOutcome::Handled
        } else if keysym == xkb::Keysym::Return || keysym == xkb::Keysym::KP_Enter {
            match self.highlighted {
                Some(index) => {
                    let outcome = self.activate(scene, index);
                    if matches!(outcome, MenuOutcome::Handled) {
                        if let Some(sub) = self.open_submenu_mut() {
                            let first = sub.step(None, true);
                            sub.highlight(scene, first);
                        }
                    }
                    outcome
                }
                None => MenuOutcome::Handled,
            }
        } else if keysym == xkb::Keysym::Escape {
            MenuOutcome::Dismissed
        } else {
            MenuOutcome::Handled
        }
    }
}

fn attach(scene: &mut Scene, parent: NodeId, child: NodeId, position: Point) {
    scene.set_position(child, position);
    if let Err(err) = scene.add_child(parent, child) {
        debug!("menu: attaching {}: {}", child, err);
    }
}

#[derive(Debug, Clone)]
struct MenuBackground {
    size: Size,
    color: Color,
}

impl Element for MenuBackground {
    fn dimensions(&self) -> Rectangle {
        Rectangle::from_loc_and_size(Point::default(), self.size)
    }

    fn fill(&self) -> Option<Color> {
        Some(self.color)
    }
}

/// One menu row.
#[derive(Debug, Clone)]
pub struct MenuItemElement {
    menu: MenuId,
    index: usize,
    size: Size,
    label: String,
    enabled: bool,
    highlighted: bool,
    has_submenu: bool,
    colors: [Color; 2],
}

impl MenuItemElement {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn is_highlighted(&self) -> bool {
        self.highlighted
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn has_submenu(&self) -> bool {
        self.has_submenu
    }
}

impl Element for MenuItemElement {
    fn dimensions(&self) -> Rectangle {
        Rectangle::from_loc_and_size(Point::default(), self.size)
    }

    fn pointer_enter(&mut self, _position: PointF, sink: &mut EventSink) {
        sink.push(SceneEvent::MenuHover {
            menu: self.menu,
            item: self.index,
        });
    }

    fn pointer_button(&mut self, event: &ButtonEvent, sink: &mut EventSink) -> bool {
        if event.state == ButtonState::Released
            && self.enabled
            && self.dimensions().contains_f(event.position)
        {
            sink.push(SceneEvent::MenuTrigger {
                menu: self.menu,
                item: self.index,
            });
        }
        true
    }

    fn fill(&self) -> Option<Color> {
        Some(if self.highlighted {
            self.colors[1]
        } else {
            self.colors[0]
        })
    }
}

/// Zero-sized leaf holding keyboard focus for a shown menu.
#[derive(Debug, Clone)]
struct MenuKeyboard {
    menu: MenuId,
}

impl Element for MenuKeyboard {
    fn dimensions(&self) -> Rectangle {
        Rectangle::default()
    }

    fn keyboard_key(&mut self, event: &KeyEvent, sink: &mut EventSink) -> bool {
        if event.pressed {
            for keysym in &event.keysyms {
                sink.push(SceneEvent::MenuKey {
                    menu: self.menu,
                    keysym: *keysym,
                });
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(ids: &mut IdAllocator) -> Menu<&'static str> {
        let sub = Menu::new(
            ids,
            None,
            vec![MenuItem::entry("One", "one"), MenuItem::entry("Two", "two")],
        );
        Menu::new(
            ids,
            Some("Root".into()),
            vec![
                MenuItem::entry("Terminal", "terminal"),
                MenuItem::entry("Disabled", "disabled").enabled(false),
                MenuItem::submenu("More", sub),
            ],
        )
    }

    #[test]
    fn test_show_builds_rows_below_title() {
        let mut ids = IdAllocator::new();
        let mut scene = Scene::new();
        let mut menu = sample(&mut ids);
        let root = menu.show(&mut scene);

        assert_eq!(menu.size(), Size::new(200, 22 + 3 * 20));
        assert_eq!(scene.dimensions(root), Rectangle::new(0, 0, 200, 82));
        scene.check_invariants().unwrap();

        menu.hide(&mut scene);
        assert!(!scene.contains(root));
        assert!(scene.is_empty());
    }

    #[test]
    fn test_pointer_hover_and_trigger() {
        let mut ids = IdAllocator::new();
        let mut scene = Scene::new();
        let mut menu = sample(&mut ids);
        let root = menu.show(&mut scene);

        scene.pointer_motion(root, PointF::new(10.0, 30.0), 0);
        for event in scene.take_events() {
            assert_eq!(menu.handle(&mut scene, &event), MenuOutcome::Handled);
        }
        assert_eq!(menu.highlighted(), Some(0));

        let trigger = SceneEvent::MenuTrigger {
            menu: menu.id(),
            item: 0,
        };
        assert_eq!(
            menu.handle(&mut scene, &trigger),
            MenuOutcome::Triggered("terminal")
        );
        let disabled = SceneEvent::MenuTrigger {
            menu: menu.id(),
            item: 1,
        };
        assert_eq!(menu.handle(&mut scene, &disabled), MenuOutcome::Handled);
    }

    #[test]
    fn test_submenu_opens_on_hover() {
        let mut ids = IdAllocator::new();
        let mut scene = Scene::new();
        let mut menu = sample(&mut ids);
        let root = menu.show(&mut scene);

        // Third row.
        scene.pointer_motion(root, PointF::new(10.0, 22.0 + 45.0), 0);
        for event in scene.take_events() {
            menu.handle(&mut scene, &event);
        }
        let sub = menu.open_submenu().expect("submenu open");
        let sub_id = sub.id();
        let sub_node = sub.node().unwrap();
        assert_eq!(scene.position(sub_node), Point::new(200, 62));

        let trigger = SceneEvent::MenuTrigger { menu: sub_id, item: 1 };
        assert_eq!(menu.handle(&mut scene, &trigger), MenuOutcome::Triggered("two"));

        menu.hide(&mut scene);
        assert!(!scene.contains(sub_node));
    }

    #[test]
    fn test_keyboard_navigation_skips_disabled() {
        let mut ids = IdAllocator::new();
        let mut scene = Scene::new();
        let mut menu = sample(&mut ids);
        menu.show(&mut scene);

        menu.key(&mut scene, xkb::Keysym::Down);
        assert_eq!(menu.highlighted(), Some(0));
        menu.key(&mut scene, xkb::Keysym::Down);
        assert_eq!(menu.highlighted(), Some(2));

        menu.key(&mut scene, xkb::Keysym::Right);
        assert_eq!(menu.open_submenu().unwrap().highlighted(), Some(0));
        menu.key(&mut scene, xkb::Keysym::Down);
        assert_eq!(
            menu.key(&mut scene, xkb::Keysym::Return),
            MenuOutcome::Triggered("two")
        );

        menu.key(&mut scene, xkb::Keysym::Left);
        assert!(menu.open_submenu().is_none());
        assert_eq!(menu.key(&mut scene, xkb::Keysym::Escape), MenuOutcome::Dismissed);
    }
}
