//! The scene apex
//!
//! The root owns the scene, every window, popup and panel, the ordered
//! workspaces and the lock curtain. Its node holds the workspaces container
//! and, above it, the curtain. Only the current workspace is visible. While
//! the curtain is engaged, input is dispatched to the curtain alone and the
//! workspaces refuse keyboard focus.
//!
//! Panels are sticky: they live in the current workspace's layers and move
//! along on every workspace switch.

use log::{debug, info, warn};
use std::collections::HashMap;

use crate::decoration::DecorationTheme;
use crate::error::ToolkitError;
use crate::geometry::{Edges, Point, PointF, Rectangle, Size};
use crate::protocol::{PopupHandle, ProtocolError, Serial, ToplevelHandle};
use crate::signals::Signal;
use crate::toolkit::element::{
    AxisEvent, ButtonEvent, Color, CursorKind, KeyEvent, SceneEvent, SolidRect,
};
use crate::toolkit::panel::{Panel, PanelCommit, PanelMap};
use crate::toolkit::menu::MenuOutcome;
use crate::toolkit::popup::{Popup, PopupParent};
use crate::toolkit::scene::RenderItem;
use crate::toolkit::surface::SurfaceElement;
use crate::toolkit::window::{ClientIdentity, Window, WindowCommit, WindowMenuCommand};
use crate::toolkit::workspace::{DragSession, Workspace, WindowMap};
use crate::toolkit::{
    IdAllocator, LockId, NodeId, OutputId, PanelId, PopupId, Scene, SurfaceId, WindowId,
};

/// Payload of the window lifecycle signals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub id: WindowId,
    pub client: ClientIdentity,
    pub title: String,
    pub app_id: String,
}

impl WindowInfo {
    fn of(window: &Window) -> Self {
        Self {
            id: window.id(),
            client: window.client(),
            title: window.title().to_string(),
            app_id: window.app_id().to_string(),
        }
    }
}

/// Listener lists fired by the root.
#[derive(Debug, Default)]
pub struct RootSignals {
    pub window_created: Signal<WindowInfo>,
    pub window_mapped: Signal<WindowInfo>,
    pub window_unmapped: Signal<WindowInfo>,
    pub window_destroyed: Signal<WindowInfo>,
    /// Index of the new current workspace.
    pub workspace_changed: Signal<usize>,
}

/// A visible paint list and the damage accumulated since the last frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub items: Vec<RenderItem>,
    pub damage: Vec<Rectangle>,
}

#[derive(Debug)]
struct Curtain {
    node: NodeId,
    backdrop: NodeId,
    surfaces: NodeId,
    holder: Option<LockId>,
    /// The holder's client went away; the session stays locked.
    orphaned: bool,
}

/// Workspace name and background colour.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkspaceStyle {
    pub name: String,
    pub background: Color,
}

impl WorkspaceStyle {
    pub fn new(name: &str, background: Color) -> Self {
        Self {
            name: name.to_string(),
            background,
        }
    }
}

#[derive(Debug)]
pub struct Root {
    scene: Scene,
    ids: IdAllocator,
    node: NodeId,
    workspaces_node: NodeId,
    curtain: Curtain,
    workspaces: Vec<Workspace>,
    current: usize,
    windows: WindowMap,
    popups: HashMap<PopupId, Popup>,
    panels: PanelMap,
    outputs: Vec<(OutputId, Rectangle)>,
    theme: DecorationTheme,
    default_background: Color,
    signals: RootSignals,
}

impl Root {
    /// Creates the root with the given workspaces (at least one is made).
    pub fn new(theme: DecorationTheme, curtain_color: Color, workspaces: &[WorkspaceStyle]) -> Self {
        let mut scene = Scene::new();
        let node = scene.create_container();
        let workspaces_node = scene.create_container();
        let curtain_node = scene.create_container();
        let backdrop = scene.create_element(SolidRect::new(Size::default(), curtain_color));
        let surfaces = scene.create_container();
        for (parent, child) in [
            (node, workspaces_node),
            (node, curtain_node),
            (curtain_node, backdrop),
            (curtain_node, surfaces),
        ] {
            if let Err(err) = scene.add_child(parent, child) {
                warn!("root: {}", err);
            }
        }
        scene.set_visible(curtain_node, false);

        let default_background = workspaces
            .first()
            .map(|w| w.background)
            .unwrap_or(Color::BLACK);
        let mut root = Self {
            scene,
            ids: IdAllocator::new(),
            node,
            workspaces_node,
            curtain: Curtain {
                node: curtain_node,
                backdrop,
                surfaces,
                holder: None,
                orphaned: false,
            },
            workspaces: Vec::new(),
            current: 0,
            windows: WindowMap::new(),
            popups: HashMap::new(),
            panels: PanelMap::new(),
            outputs: Vec::new(),
            theme,
            default_background,
            signals: RootSignals::default(),
        };
        for style in workspaces {
            root.add_workspace(&style.name, Some(style.background));
        }
        if root.workspaces.is_empty() {
            root.add_workspace("Main", None);
        }
        root.refresh_workspaces();
        root
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn ids_mut(&mut self) -> &mut IdAllocator {
        &mut self.ids
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn theme(&self) -> &DecorationTheme {
        &self.theme
    }

    pub fn signals_mut(&mut self) -> &mut RootSignals {
        &mut self.signals
    }

    // -- Outputs -----------------------------------------------------------

    pub fn outputs(&self) -> &[(OutputId, Rectangle)] {
        &self.outputs
    }

    /// Bounding box of all outputs.
    pub fn extents(&self) -> Rectangle {
        self.outputs
            .iter()
            .fold(Rectangle::default(), |acc, (_, geometry)| acc.union(geometry))
    }

    pub fn output_geometry(&self, output: OutputId) -> Option<Rectangle> {
        self.outputs
            .iter()
            .find(|(id, _)| *id == output)
            .map(|(_, geometry)| *geometry)
    }

    /// Adopts a new output layout everywhere. Client panels bound to a
    /// vanished output are told to close.
    pub fn set_outputs(&mut self, outputs: Vec<(OutputId, Rectangle)>) {
        self.outputs = outputs;
        let extents = self.extents();
        self.scene.set_position(self.curtain.backdrop, extents.loc());
        self.scene.update_element::<SolidRect, _>(self.curtain.backdrop, |rect| {
            rect.size = extents.size()
        });
        for workspace in &mut self.workspaces {
            workspace.set_outputs(&mut self.scene, &mut self.windows, &mut self.panels, &self.outputs);
        }
        for panel in self.panels.values() {
            if let Some(output) = panel.config().output {
                if !self.outputs.iter().any(|(id, _)| *id == output) {
                    info!("{}: output {} is gone", panel.id(), output);
                    panel.close();
                }
            }
        }
    }

    // -- Workspaces --------------------------------------------------------

    pub fn workspaces(&self) -> &[Workspace] {
        &self.workspaces
    }

    pub fn workspace(&self, index: usize) -> Option<&Workspace> {
        self.workspaces.get(index)
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current_workspace(&self) -> &Workspace {
        &self.workspaces[self.current]
    }

    pub fn workspace_names(&self) -> Vec<String> {
        self.workspaces.iter().map(|w| w.name().to_string()).collect()
    }

    /// Appends a workspace with its background and returns its index.
    pub fn add_workspace(&mut self, name: &str, background: Option<Color>) -> usize {
        let index = self.workspaces.len();
        let mut workspace = Workspace::new(
            &mut self.scene,
            index,
            name,
            background.unwrap_or(self.default_background),
            self.theme.minimum_outer_size(),
        );
        if let Err(err) = self.scene.add_child(self.workspaces_node, workspace.node()) {
            warn!("root: attaching workspace: {}", err);
        }
        workspace.set_outputs(&mut self.scene, &mut self.windows, &mut self.panels, &self.outputs);
        self.workspaces.push(workspace);
        self.refresh_workspaces();
        index
    }

    /// Removes the last workspace if it is empty and not the current one.
    pub fn destroy_last_workspace(&mut self) -> bool {
        let last = self.workspaces.len() - 1;
        if self.workspaces.len() < 2 || last == self.current || !self.workspaces[last].is_empty() {
            debug!("root: keeping workspace {}", last);
            return false;
        }
        if let Some(workspace) = self.workspaces.pop() {
            workspace.destroy(&mut self.scene);
        }
        true
    }

    /// Makes `index` the current workspace.
    pub fn switch_to_workspace(&mut self, index: usize) -> Result<(), ToolkitError> {
        if index >= self.workspaces.len() {
            return Err(ToolkitError::UnknownWorkspace(index));
        }
        if index == self.current {
            return Ok(());
        }
        let previous = self.current;
        if let Some(drag) = self.workspaces[previous].end_drag() {
            debug!("root: dropping drag of {} on switch", drag.window);
        }
        self.scene.pointer_leave(self.workspaces[previous].node());

        let panels = self.workspaces[previous].take_panels();
        self.workspaces[previous].arrange(&mut self.scene, &mut self.windows, &mut self.panels);
        self.current = index;
        let workspace = &mut self.workspaces[index];
        workspace.adopt_panels(&mut self.scene, &mut self.panels, panels);
        workspace.arrange(&mut self.scene, &mut self.windows, &mut self.panels);
        self.refresh_workspaces();

        info!("🗂️ Switched to workspace {} \"{}\"", index, self.workspaces[index].name());
        self.signals.workspace_changed.emit(&index);
        Ok(())
    }

    pub fn switch_to_next_workspace(&mut self) -> bool {
        let next = self.current + 1;
        next < self.workspaces.len() && self.switch_to_workspace(next).is_ok()
    }

    pub fn switch_to_previous_workspace(&mut self) -> bool {
        self.current > 0 && self.switch_to_workspace(self.current - 1).is_ok()
    }

    /// Visibility and input follow the current index and the lock.
    fn refresh_workspaces(&mut self) {
        let locked = self.is_locked();
        for (index, workspace) in self.workspaces.iter_mut().enumerate() {
            let current = index == self.current;
            workspace.set_visible(&mut self.scene, current);
            workspace.set_input_enabled(&mut self.scene, &self.windows, current && !locked);
        }
    }

    // -- Windows -----------------------------------------------------------

    pub fn windows(&self) -> &WindowMap {
        &self.windows
    }

    pub fn window(&self, id: WindowId) -> Option<&Window> {
        self.windows.get(&id)
    }

    pub fn window_mut(&mut self, id: WindowId) -> Option<&mut Window> {
        self.windows.get_mut(&id)
    }

    pub fn window_for_surface(&self, surface: SurfaceId) -> Option<WindowId> {
        self.windows
            .values()
            .find(|w| w.surface_id() == Some(surface))
            .map(|w| w.id())
    }

    /// Window owning a scene node (its content, decoration or popups).
    pub fn window_for_node(&self, node: NodeId) -> Option<WindowId> {
        self.windows
            .values()
            .find(|w| self.scene.is_ancestor_or_self(w.node(), node))
            .map(|w| w.id())
    }

    /// The activated window of the current workspace.
    pub fn activated_window(&self) -> Option<WindowId> {
        self.current_workspace().activated()
    }

    pub fn create_client_window(
        &mut self,
        surface: SurfaceId,
        handle: Box<dyn ToplevelHandle>,
        client: ClientIdentity,
        decorated: bool,
    ) -> WindowId {
        let id = self.ids.window();
        let mut window = Window::new_client(&mut self.scene, id, surface, handle, client, self.theme.clone());
        window.set_decorated(&mut self.scene, decorated);
        let info = WindowInfo::of(&window);
        self.windows.insert(id, window);
        info!("🪟 {} created (pid {})", id, client.pid);
        self.signals.window_created.emit(&info);
        id
    }

    /// A window around compositor-drawn content (the root menu).
    pub fn create_internal_window(
        &mut self,
        title: &str,
        content: NodeId,
        keyboard: Option<NodeId>,
        size: Size,
    ) -> WindowId {
        let id = self.ids.window();
        let mut window = Window::new_internal(&mut self.scene, id, content, keyboard, size, self.theme.clone());
        window.set_title(&mut self.scene, title);
        let info = WindowInfo::of(&window);
        self.windows.insert(id, window);
        self.signals.window_created.emit(&info);
        id
    }

    /// Maps a window on a workspace (on top, activated).
    pub fn map_window(&mut self, id: WindowId, workspace: usize) -> Result<(), ToolkitError> {
        let window = self.windows.get(&id).ok_or(ToolkitError::UnknownWindow(id))?;
        if window.is_mapped() {
            return Err(ToolkitError::AlreadyMapped(id));
        }
        let target = self
            .workspaces
            .get_mut(workspace)
            .ok_or(ToolkitError::UnknownWorkspace(workspace))?;
        target.map_window(&mut self.scene, &mut self.windows, id);
        if let Some(window) = self.windows.get(&id) {
            info!("🪟 {} mapped on workspace {}", id, workspace);
            let info = WindowInfo::of(window);
            self.signals.window_mapped.emit(&info);
        }
        Ok(())
    }

    pub fn unmap_window(&mut self, id: WindowId) -> Result<(), ToolkitError> {
        let window = self.windows.get(&id).ok_or(ToolkitError::UnknownWindow(id))?;
        let Some(index) = window.workspace() else {
            return Err(ToolkitError::NotMapped(id));
        };
        self.dismiss_popups_of(id);
        if let Some(workspace) = self.workspaces.get_mut(index) {
            workspace.unmap_window(&mut self.scene, &mut self.windows, id);
        }
        if let Some(window) = self.windows.get(&id) {
            info!("🪟 {} unmapped", id);
            let info = WindowInfo::of(window);
            self.signals.window_unmapped.emit(&info);
        }
        Ok(())
    }

    /// Unmaps (if needed) and drops a window and its popups.
    pub fn destroy_window(&mut self, id: WindowId) -> Result<(), ToolkitError> {
        if !self.windows.contains_key(&id) {
            return Err(ToolkitError::UnknownWindow(id));
        }
        if self.windows.get(&id).and_then(|w| w.workspace()).is_some() {
            self.unmap_window(id)?;
        }
        let popups: Vec<PopupId> = self
            .windows
            .get(&id)
            .map(|w| w.popups().to_vec())
            .unwrap_or_default();
        for popup in popups {
            self.destroy_popup(popup);
        }
        if let Some(window) = self.windows.remove(&id) {
            let info = WindowInfo::of(&window);
            window.destroy(&mut self.scene);
            info!("🗑️ {} destroyed", id);
            self.signals.window_destroyed.emit(&info);
        }
        Ok(())
    }

    /// Moves a window to another workspace, keeping it activated there.
    pub fn move_window_to_workspace(&mut self, id: WindowId, target: usize) -> Result<(), ToolkitError> {
        if target >= self.workspaces.len() {
            return Err(ToolkitError::UnknownWorkspace(target));
        }
        let from = self
            .windows
            .get(&id)
            .ok_or(ToolkitError::UnknownWindow(id))?
            .workspace()
            .ok_or(ToolkitError::NotMapped(id))?;
        if from == target {
            return Ok(());
        }
        self.unmap_window(id)?;
        self.map_window(id, target)
    }

    /// Commits a client toplevel and keeps the workspace in step with
    /// fullscreen changes.
    pub fn commit_window(
        &mut self,
        id: WindowId,
        acked: Option<Serial>,
        size: Size,
    ) -> Result<WindowCommit, ProtocolError> {
        let Some(window) = self.windows.get_mut(&id) else {
            return Ok(WindowCommit::default());
        };
        let commit = window.commit(&mut self.scene, acked, size)?;
        if commit.state_changed {
            if let Some(index) = window.workspace() {
                if let Some(workspace) = self.workspaces.get_mut(index) {
                    workspace.window_state_changed(&mut self.scene, &self.windows, id);
                }
            }
        }
        Ok(commit)
    }

    fn workspace_of(&self, id: WindowId) -> usize {
        self.windows
            .get(&id)
            .and_then(|w| w.workspace())
            .unwrap_or(self.current)
    }

    pub fn request_maximized(&mut self, id: WindowId, maximized: bool) {
        let index = self.workspace_of(id);
        let Some(window) = self.windows.get_mut(&id) else {
            return;
        };
        let usable = self.workspaces[index].usable_for(window.geometry());
        window.request_maximized(&mut self.scene, maximized, usable);
        self.workspaces[index].window_state_changed(&mut self.scene, &self.windows, id);
    }

    pub fn request_fullscreen(&mut self, id: WindowId, fullscreen: bool) {
        let index = self.workspace_of(id);
        let Some(window) = self.windows.get_mut(&id) else {
            return;
        };
        let Some((_, output)) = self.workspaces[index].output_for(window.geometry()) else {
            return;
        };
        window.request_fullscreen(&mut self.scene, fullscreen, output);
        self.workspaces[index].window_state_changed(&mut self.scene, &self.windows, id);
    }

    pub fn set_shaded(&mut self, id: WindowId, shaded: bool) {
        if let Some(window) = self.windows.get_mut(&id) {
            window.set_shaded(&mut self.scene, shaded);
        }
    }

    pub fn request_close(&mut self, id: WindowId) {
        let internal = match self.windows.get(&id) {
            Some(window) => !window.request_close(),
            None => return,
        };
        if internal && self.windows.get(&id).map_or(false, |w| w.is_mapped()) {
            if let Err(err) = self.unmap_window(id) {
                debug!("closing {}: {}", id, err);
            }
        }
    }

    /// Raises and activates a window in its workspace.
    pub fn activate_window(&mut self, id: WindowId) {
        let index = self.workspace_of(id);
        let workspace = &mut self.workspaces[index];
        if !workspace.windows().contains(&id) {
            return;
        }
        workspace.raise_window(&mut self.scene, &self.windows, id);
        workspace.activate(&mut self.scene, &mut self.windows, Some(id));
    }

    /// Activates without raising (task-list cycling).
    pub fn focus_window(&mut self, id: WindowId) {
        let index = self.workspace_of(id);
        self.workspaces[index].activate(&mut self.scene, &mut self.windows, Some(id));
    }

    pub fn raise_window(&mut self, id: WindowId) {
        let index = self.workspace_of(id);
        self.workspaces[index].raise_window(&mut self.scene, &self.windows, id);
    }

    pub fn lower_window(&mut self, id: WindowId) {
        let index = self.workspace_of(id);
        self.workspaces[index].lower_window(&mut self.scene, &self.windows, id);
    }

    pub fn iconify_window(&mut self, id: WindowId) {
        let index = self.workspace_of(id);
        self.dismiss_popups_of(id);
        self.workspaces[index].iconify_window(&mut self.scene, &mut self.windows, id);
    }

    pub fn deiconify_window(&mut self, id: WindowId) {
        let index = self.workspace_of(id);
        self.workspaces[index].deiconify_window(&mut self.scene, &mut self.windows, id);
    }

    pub fn confine_window(&mut self, id: WindowId) {
        let index = self.workspace_of(id);
        self.workspaces[index].confine_within(&mut self.scene, &mut self.windows, id);
    }

    pub fn set_window_position(&mut self, id: WindowId, position: Point) {
        if let Some(window) = self.windows.get_mut(&id) {
            window.set_position(&mut self.scene, position);
        }
    }

    pub fn set_window_decorated(&mut self, id: WindowId, decorated: bool) {
        if let Some(window) = self.windows.get_mut(&id) {
            if window.is_decorated() != decorated {
                window.set_decorated(&mut self.scene, decorated);
            }
        }
    }

    pub fn set_window_app_id(&mut self, id: WindowId, app_id: &str) {
        if let Some(window) = self.windows.get_mut(&id) {
            window.set_app_id(app_id);
        }
    }

    pub fn set_window_title(&mut self, id: WindowId, title: &str) {
        if let Some(window) = self.windows.get_mut(&id) {
            window.set_title(&mut self.scene, title);
        }
    }

    pub fn begin_window_move(&mut self, id: WindowId, pointer: PointF) -> bool {
        let index = self.workspace_of(id);
        self.workspaces[index].begin_window_move(&self.windows, id, pointer)
    }

    pub fn begin_window_resize(&mut self, id: WindowId, edges: Edges, pointer: PointF) -> bool {
        let index = self.workspace_of(id);
        self.workspaces[index].begin_window_resize(&self.windows, id, edges, pointer)
    }

    pub fn drag(&self) -> Option<&DragSession> {
        self.current_workspace().drag()
    }

    pub fn drag_motion(&mut self, pointer: PointF) -> bool {
        self.workspaces[self.current].drag_motion(&mut self.scene, &mut self.windows, pointer)
    }

    pub fn end_drag(&mut self) -> Option<DragSession> {
        self.workspaces[self.current].end_drag()
    }

    /// Opens the window menu at a global position.
    pub fn show_window_menu(&mut self, id: WindowId, at: Point) -> bool {
        let names = self.workspace_names();
        let Some(window) = self.windows.get_mut(&id) else {
            return false;
        };
        let local = Point::new(at.x - window.position().x, at.y - window.position().y);
        window
            .show_menu(&mut self.scene, &mut self.ids, &names, local)
            .is_some()
    }

    /// Feeds a menu event to the window menu it belongs to. The menu is
    /// hidden once it yields a command or is dismissed.
    pub fn window_menu_event(
        &mut self,
        event: &SceneEvent,
    ) -> Option<(WindowId, MenuOutcome<WindowMenuCommand>)> {
        let menu = match event {
            SceneEvent::MenuHover { menu, .. }
            | SceneEvent::MenuTrigger { menu, .. }
            | SceneEvent::MenuKey { menu, .. } => *menu,
            _ => return None,
        };
        let window = self
            .windows
            .values_mut()
            .find(|w| w.menu().map_or(false, |m| m.contains_menu(menu)))?;
        let id = window.id();
        let outcome = window.menu_mut()?.handle(&mut self.scene, event);
        if matches!(outcome, MenuOutcome::Triggered(_) | MenuOutcome::Dismissed) {
            window.hide_menu(&mut self.scene);
        }
        Some((id, outcome))
    }

    /// Hides every open window menu.
    pub fn hide_window_menus(&mut self) {
        for window in self.windows.values_mut() {
            if window.menu().is_some() {
                window.hide_menu(&mut self.scene);
            }
        }
    }

    // -- Popups ------------------------------------------------------------

    pub fn popup(&self, id: PopupId) -> Option<&Popup> {
        self.popups.get(&id)
    }

    pub fn popup_mut(&mut self, id: PopupId) -> Option<&mut Popup> {
        self.popups.get_mut(&id)
    }

    pub fn popup_for_surface(&self, surface: SurfaceId) -> Option<PopupId> {
        self.popups
            .values()
            .find(|p| p.surface_id() == surface)
            .map(|p| p.id())
    }

    /// The toplevel a popup chain hangs off.
    pub fn popup_window(&self, mut id: PopupId) -> Option<WindowId> {
        loop {
            match self.popups.get(&id)?.parent() {
                PopupParent::Window(window) => return Some(window),
                PopupParent::Popup(parent) => id = parent,
            }
        }
    }

    pub fn create_popup(
        &mut self,
        surface: SurfaceId,
        parent: PopupParent,
        handle: Box<dyn PopupHandle>,
    ) -> Result<PopupId, ProtocolError> {
        let parent_node = match parent {
            PopupParent::Window(window) => self.windows.get(&window).map(|w| w.popups_node()),
            PopupParent::Popup(popup) => self.popups.get(&popup).map(|p| p.node()),
        };
        let Some(parent_node) = parent_node else {
            let err = ProtocolError::InvalidPopupParent(surface);
            handle.post_error(&err);
            return Err(err);
        };
        let id = self.ids.popup();
        let popup = Popup::new(&mut self.scene, id, surface, parent, handle);
        if let Err(err) = self.scene.add_child(parent_node, popup.node()) {
            warn!("{}: attaching: {}", id, err);
        }
        match parent {
            PopupParent::Window(window) => {
                if let Some(w) = self.windows.get_mut(&window) {
                    w.add_popup(id);
                }
            }
            PopupParent::Popup(parent) => {
                if let Some(p) = self.popups.get_mut(&parent) {
                    p.add_child(id);
                }
            }
        }
        self.popups.insert(id, popup);
        debug!("{} created under {:?}", id, parent);
        Ok(id)
    }

    /// Initial placement relative to the parent surface; sent with the
    /// first configure.
    pub fn place_popup(&mut self, id: PopupId, geometry: Rectangle) {
        if let Some(popup) = self.popups.get_mut(&id) {
            popup.place(&mut self.scene, geometry);
        }
    }

    pub fn commit_popup(&mut self, id: PopupId, acked: Option<Serial>, size: Size) -> Result<(), ProtocolError> {
        match self.popups.get_mut(&id) {
            Some(popup) => popup.commit(&mut self.scene, acked, size),
            None => Ok(()),
        }
    }

    /// An explicit grab; a click outside the popup chain dismisses it.
    pub fn grab_popup(&mut self, id: PopupId) {
        if let Some(popup) = self.popups.get_mut(&id) {
            popup.set_grabbed(true);
        }
    }

    /// Window of the outermost grabbed popup, if any.
    pub fn grabbed_popup_window(&self) -> Option<WindowId> {
        self.popups
            .values()
            .find(|popup| popup.is_grabbed())
            .and_then(|popup| self.popup_window(popup.id()))
    }

    /// Destroys a popup and everything nested in it.
    pub fn destroy_popup(&mut self, id: PopupId) {
        let Some(popup) = self.popups.remove(&id) else {
            return;
        };
        for child in popup.children().to_vec() {
            self.destroy_popup(child);
        }
        match popup.parent() {
            PopupParent::Window(window) => {
                if let Some(w) = self.windows.get_mut(&window) {
                    w.remove_popup(id);
                }
            }
            PopupParent::Popup(parent) => {
                if let Some(p) = self.popups.get_mut(&parent) {
                    p.remove_child(id);
                }
            }
        }
        popup.destroy(&mut self.scene);
    }

    /// Sends popup_done to every popup of a window, innermost first.
    pub fn dismiss_popups_of(&mut self, window: WindowId) {
        let mut pending: Vec<PopupId> = self
            .windows
            .get(&window)
            .map(|w| w.popups().to_vec())
            .unwrap_or_default();
        let mut order = Vec::new();
        while let Some(id) = pending.pop() {
            if let Some(popup) = self.popups.get(&id) {
                pending.extend_from_slice(popup.children());
                order.push(id);
            }
        }
        for id in order.into_iter().rev() {
            if let Some(popup) = self.popups.get_mut(&id) {
                popup.dismiss();
            }
        }
    }

    // -- Panels ------------------------------------------------------------

    pub fn panel(&self, id: PanelId) -> Option<&Panel> {
        self.panels.get(&id)
    }

    pub fn panel_mut(&mut self, id: PanelId) -> Option<&mut Panel> {
        self.panels.get_mut(&id)
    }

    pub fn panel_for_surface(&self, surface: SurfaceId) -> Option<PanelId> {
        self.panels
            .values()
            .find(|p| p.surface_id() == Some(surface))
            .map(|p| p.id())
    }

    /// Adds a panel to the current workspace's layers.
    pub fn add_panel(&mut self, panel: Panel) -> PanelId {
        let id = panel.id();
        self.panels.insert(id, panel);
        self.workspaces[self.current].add_panel(&mut self.scene, &mut self.windows, &mut self.panels, id);
        id
    }

    pub fn commit_panel(
        &mut self,
        id: PanelId,
        acked: Option<Serial>,
        size: Size,
    ) -> Result<PanelCommit, ProtocolError> {
        let Some(panel) = self.panels.get_mut(&id) else {
            return Ok(PanelCommit::default());
        };
        let commit = panel.commit(&mut self.scene, acked, size)?;
        let workspace = &mut self.workspaces[self.current];
        if commit.layer_changed {
            workspace.move_panel_to_layer(&mut self.scene, &mut self.panels, id);
        }
        if commit.config_changed || commit.mapped_changed {
            workspace.arrange(&mut self.scene, &mut self.windows, &mut self.panels);
        }
        Ok(commit)
    }

    pub fn remove_panel(&mut self, id: PanelId) {
        for workspace in &mut self.workspaces {
            workspace.remove_panel(id);
        }
        if let Some(panel) = self.panels.remove(&id) {
            panel.destroy(&mut self.scene);
        }
        self.arrange_panels();
    }

    pub fn arrange_panels(&mut self) {
        self.workspaces[self.current].arrange(&mut self.scene, &mut self.windows, &mut self.panels);
    }

    // -- Lock curtain ------------------------------------------------------

    pub fn is_locked(&self) -> bool {
        self.curtain.holder.is_some()
    }

    pub fn lock_holder(&self) -> Option<LockId> {
        self.curtain.holder
    }

    pub fn is_lock_orphaned(&self) -> bool {
        self.curtain.orphaned
    }

    pub fn curtain_node(&self) -> NodeId {
        self.curtain.node
    }

    /// Container lock surfaces are placed in.
    pub fn curtain_surfaces_node(&self) -> NodeId {
        self.curtain.surfaces
    }

    /// Engages the curtain for `lock`. Fails while another live lock holds
    /// it; an orphaned curtain may be taken over.
    pub fn lock(&mut self, lock: LockId) -> bool {
        if self.curtain.holder.is_some() && !self.curtain.orphaned {
            warn!("🔒 {} refused: already locked by {:?}", lock, self.curtain.holder);
            return false;
        }
        self.curtain.holder = Some(lock);
        self.curtain.orphaned = false;
        if let Some(drag) = self.workspaces[self.current].end_drag() {
            debug!("root: dropping drag of {} on lock", drag.window);
        }
        self.scene.release_pointer_grabs(self.node);
        self.scene.pointer_leave(self.workspaces_node);
        self.scene.set_visible(self.curtain.node, true);
        if let Err(err) = self.scene.raise_to_top(self.curtain.node) {
            warn!("root: raising curtain: {}", err);
        }
        self.scene.set_keyboard_focus(None);
        self.refresh_workspaces();
        info!("🔒 Session locked by {}", lock);
        true
    }

    /// Disengages the curtain if `lock` holds it.
    pub fn unlock(&mut self, lock: LockId) -> bool {
        if self.curtain.holder != Some(lock) {
            warn!("🔒 unlock from {} refused (holder {:?})", lock, self.curtain.holder);
            return false;
        }
        self.curtain.holder = None;
        self.curtain.orphaned = false;
        self.scene.release_pointer_grabs(self.curtain.node);
        self.scene.pointer_leave(self.curtain.node);
        if let Some(focused) = self.scene.keyboard_focus() {
            if self.scene.is_ancestor_or_self(self.curtain.node, focused) {
                self.scene.set_keyboard_focus(None);
            }
        }
        self.scene.set_visible(self.curtain.node, false);
        self.refresh_workspaces();
        info!("🔓 Session unlocked by {}", lock);
        true
    }

    /// The holder's client is gone; the session stays locked.
    pub fn lock_unreference(&mut self, lock: LockId) {
        if self.curtain.holder == Some(lock) {
            self.curtain.orphaned = true;
            warn!("🔒 {} went away while locked; staying locked", lock);
        }
    }

    // -- Input and output --------------------------------------------------

    /// Node input is dispatched to: the curtain while locked.
    pub fn input_root(&self) -> NodeId {
        if self.is_locked() {
            self.curtain.node
        } else {
            self.node
        }
    }

    pub fn pointer_motion(&mut self, position: PointF, time_msec: u32) -> bool {
        let root = self.input_root();
        self.scene.pointer_motion(root, position, time_msec)
    }

    pub fn pointer_button(&mut self, event: &ButtonEvent) -> bool {
        let root = self.input_root();
        self.scene.pointer_button(root, event)
    }

    /// Ends the implicit grab of a press, for when the compositor takes
    /// over the pointer (a move, a resize or a menu).
    pub fn release_pointer_grabs(&mut self) {
        let root = self.input_root();
        self.scene.release_pointer_grabs(root);
    }

    /// Surface of the leaf holding keyboard focus, if input reaches it.
    pub fn keyboard_focus_surface(&self) -> Option<SurfaceId> {
        let focused = self.scene.keyboard_focus()?;
        if !self.scene.is_ancestor_or_self(self.input_root(), focused) {
            return None;
        }
        self.scene
            .element::<SurfaceElement>(focused)
            .map(SurfaceElement::surface)
    }

    pub fn pointer_axis(&mut self, event: &AxisEvent) -> bool {
        let root = self.input_root();
        self.scene.pointer_axis(root, event)
    }

    pub fn keyboard_key(&mut self, event: &KeyEvent) -> bool {
        let root = self.input_root();
        self.scene.keyboard_key(root, event)
    }

    pub fn cursor(&self) -> CursorKind {
        self.scene.cursor(self.input_root())
    }

    pub fn take_events(&mut self) -> Vec<SceneEvent> {
        self.scene.take_events()
    }

    /// Paint list of what is visible plus the damage since the last frame.
    pub fn frame(&mut self) -> Frame {
        Frame {
            items: self.scene.render_list(self.node),
            damage: self.scene.take_damage(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::headless::{HeadlessPopup, HeadlessToplevel, SerialCounter};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn root() -> Root {
        let mut root = Root::new(
            DecorationTheme::default(),
            Color::BLACK,
            &[
                WorkspaceStyle::new("Main", Color(0xff33_3366)),
                WorkspaceStyle::new("Other", Color(0xff33_6633)),
            ],
        );
        root.set_outputs(vec![(OutputId::from_raw(1), Rectangle::new(0, 0, 1920, 1080))]);
        root
    }

    fn client(root: &mut Root, serials: &SerialCounter, size: Size) -> (WindowId, HeadlessToplevel) {
        let handle = HeadlessToplevel::new(serials);
        let surface = root.ids_mut().surface();
        let id = root.create_client_window(surface, Box::new(handle.clone()), ClientIdentity::default(), false);
        root.commit_window(id, None, Size::default()).unwrap();
        let (serial, _) = handle.last_configure().unwrap();
        root.commit_window(id, Some(serial), size).unwrap();
        (id, handle)
    }

    #[test]
    fn test_only_current_workspace_visible() {
        let mut root = root();
        assert!(root.scene().is_visible(root.workspaces()[0].node()));
        assert!(!root.scene().is_visible(root.workspaces()[1].node()));

        root.switch_to_workspace(1).unwrap();
        assert!(!root.scene().is_visible(root.workspaces()[0].node()));
        assert!(root.scene().is_visible(root.workspaces()[1].node()));
        assert!(root.workspaces()[1].is_input_enabled());
        assert!(!root.workspaces()[0].is_input_enabled());
        assert_eq!(root.switch_to_workspace(5), Err(ToolkitError::UnknownWorkspace(5)));
    }

    #[test]
    fn test_window_signals_fire_in_order() {
        let mut root = root();
        let log = Rc::new(RefCell::new(Vec::new()));
        let signals = root.signals_mut();
        for (name, signal) in [
            ("created", &mut signals.window_created),
            ("mapped", &mut signals.window_mapped),
            ("unmapped", &mut signals.window_unmapped),
            ("destroyed", &mut signals.window_destroyed),
        ] {
            let log = log.clone();
            signal.connect(move |info: &WindowInfo| log.borrow_mut().push(format!("{} {}", name, info.id)));
        }

        let serials = SerialCounter::new();
        let (id, _) = client(&mut root, &serials, Size::new(200, 100));
        root.map_window(id, 0).unwrap();
        assert_eq!(root.map_window(id, 0), Err(ToolkitError::AlreadyMapped(id)));
        root.destroy_window(id).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                format!("created {}", id),
                format!("mapped {}", id),
                format!("unmapped {}", id),
                format!("destroyed {}", id),
            ]
        );
        assert!(root.window(id).is_none());
        root.scene().check_invariants().unwrap();
    }

    #[test]
    fn test_move_window_to_next_workspace() {
        let mut root = root();
        let serials = SerialCounter::new();
        let (id, _) = client(&mut root, &serials, Size::new(200, 100));
        root.map_window(id, 0).unwrap();

        root.move_window_to_workspace(id, 1).unwrap();
        assert!(!root.workspaces()[0].windows().contains(&id));
        assert_eq!(root.workspaces()[1].windows().last(), Some(&id));
        assert_eq!(root.workspaces()[1].activated(), Some(id));
        assert_eq!(root.window(id).and_then(|w| w.workspace()), Some(1));
    }

    #[test]
    fn test_destroy_last_workspace_rules() {
        let mut root = root();
        let serials = SerialCounter::new();
        let index = root.add_workspace("New", None);
        assert_eq!(index, 2);

        let (id, _) = client(&mut root, &serials, Size::new(200, 100));
        root.map_window(id, 2).unwrap();
        assert!(!root.destroy_last_workspace());
        root.unmap_window(id).unwrap();
        assert!(root.destroy_last_workspace());
        assert_eq!(root.workspaces().len(), 2);

        root.switch_to_workspace(1).unwrap();
        assert!(!root.destroy_last_workspace());
    }

    #[test]
    fn test_lock_curtain() {
        let mut root = root();
        let serials = SerialCounter::new();
        let (id, _) = client(&mut root, &serials, Size::new(200, 100));
        root.map_window(id, 0).unwrap();
        assert!(root.scene().keyboard_focus().is_some());

        let first = LockId::from_raw(1);
        let second = LockId::from_raw(2);
        assert!(root.lock(first));
        assert!(root.is_locked());
        assert!(root.scene().is_visible(root.curtain_node()));
        assert_eq!(root.input_root(), root.curtain_node());
        assert_eq!(root.scene().keyboard_focus(), None);
        assert!(!root.workspaces()[0].is_input_enabled());
        assert!(!root.lock(second));

        assert!(!root.unlock(second));
        root.lock_unreference(first);
        assert!(root.is_locked());
        assert!(root.is_lock_orphaned());
        assert!(root.lock(second));

        assert!(root.unlock(second));
        assert!(!root.is_locked());
        assert!(!root.scene().is_visible(root.curtain_node()));
        assert_eq!(
            root.scene().keyboard_focus(),
            root.window(id).and_then(|w| w.keyboard_node())
        );
    }

    #[test]
    fn test_curtain_renders_on_top_while_locked() {
        let mut root = root();
        root.frame();
        root.lock(LockId::from_raw(1));
        let frame = root.frame();
        let last = frame.items.last().expect("curtain in frame");
        assert_eq!(last.bounds, Rectangle::new(0, 0, 1920, 1080));
        assert!(!frame.damage.is_empty());
    }

    #[test]
    fn test_popup_chain_destroyed_with_window() {
        let mut root = root();
        let serials = SerialCounter::new();
        let (id, _) = client(&mut root, &serials, Size::new(200, 100));
        root.map_window(id, 0).unwrap();

        let outer_handle = HeadlessPopup::new(&serials);
        let surface = root.ids_mut().surface();
        let outer = root
            .create_popup(surface, PopupParent::Window(id), Box::new(outer_handle.clone()))
            .unwrap();
        let surface = root.ids_mut().surface();
        let inner = root
            .create_popup(surface, PopupParent::Popup(outer), Box::new(HeadlessPopup::new(&serials)))
            .unwrap();
        assert_eq!(root.popup_window(inner), Some(id));

        let bogus = root.ids_mut().surface();
        assert!(root
            .create_popup(
                bogus,
                PopupParent::Popup(PopupId::from_raw(999)),
                Box::new(HeadlessPopup::new(&serials))
            )
            .is_err());

        root.destroy_window(id).unwrap();
        assert!(root.popup(outer).is_none());
        assert!(root.popup(inner).is_none());
        assert!(outer_handle.is_done());
        root.scene().check_invariants().unwrap();
    }
}
