//! Workspaces
//!
//! A workspace stacks its windows between the panel layers. Its node holds,
//! back to front: the background layer (with the workspace background), the
//! bottom layer, the window container, the top layer, the overlay layer and
//! the fullscreen container. A committed fullscreen window is moved into the
//! fullscreen container, above every panel.
//!
//! Window state lives in the root's window map; the workspace only keeps
//! ids. Operations that touch windows take the scene and that map.

use log::{debug, info, warn};
use std::collections::HashMap;

use crate::geometry::{Edges, Point, PointF, Rectangle, Size};
use crate::toolkit::element::{ButtonEvent, ButtonState, Color, Element, EventSink, SceneEvent};
use crate::toolkit::layer::{arrange_layers, Layer, LayerKind};
use crate::toolkit::panel::PanelMap;
use crate::toolkit::window::Window;
use crate::toolkit::{NodeId, OutputId, PanelId, Scene, WindowId};

/// Windows by id.
pub type WindowMap = HashMap<WindowId, Window>;

/// What an active drag does to its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragMode {
    Move,
    Resize(Edges),
}

/// An interactive move or resize in progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragSession {
    pub window: WindowId,
    pub mode: DragMode,
    /// Pointer position when the drag began.
    pub grab: PointF,
    /// Window geometry when the drag began.
    pub original: Rectangle,
}

/// New outer geometry when dragging `edges` of `original` by (dx, dy).
/// The edges opposite the dragged ones stay put.
pub fn resize_geometry(original: Rectangle, edges: Edges, dx: i32, dy: i32, minimum: Size) -> Rectangle {
    let mut rect = original;
    if edges.contains(Edges::LEFT) {
        rect.width = (original.width - dx).max(minimum.width);
        rect.x = original.right() - rect.width;
    } else if edges.contains(Edges::RIGHT) {
        rect.width = (original.width + dx).max(minimum.width);
    }
    if edges.contains(Edges::TOP) {
        rect.height = (original.height - dy).max(minimum.height);
        rect.y = original.bottom() - rect.height;
    } else if edges.contains(Edges::BOTTOM) {
        rect.height = (original.height + dy).max(minimum.height);
    }
    rect
}

/// The workspace background. Clicks on it are reported so the root menu
/// can open on empty space.
#[derive(Debug, Clone)]
pub struct Background {
    origin: Point,
    size: Size,
    color: Color,
}

impl Element for Background {
    fn dimensions(&self) -> Rectangle {
        Rectangle::from_loc_and_size(Point::default(), self.size)
    }

    fn pointer_button(&mut self, event: &ButtonEvent, sink: &mut EventSink) -> bool {
        if event.state == ButtonState::Pressed {
            sink.push(SceneEvent::BackgroundButton {
                button: event.button,
                position: event.position.translate(self.origin),
            });
        }
        true
    }

    fn fill(&self) -> Option<Color> {
        Some(self.color)
    }
}

#[derive(Debug)]
pub struct Workspace {
    index: usize,
    name: String,
    node: NodeId,
    layers: Vec<Layer>,
    windows_node: NodeId,
    fullscreen_node: NodeId,
    background: NodeId,
    stack: Vec<WindowId>,
    iconified: Vec<WindowId>,
    activated: Option<WindowId>,
    fullscreen: Option<WindowId>,
    drag: Option<DragSession>,
    outputs: Vec<(OutputId, Rectangle)>,
    usable: HashMap<OutputId, Rectangle>,
    input_enabled: bool,
    minimum_size: Size,
}

impl Workspace {
    pub fn new(scene: &mut Scene, index: usize, name: &str, background: Color, minimum_size: Size) -> Self {
        let node = scene.create_container();
        let layers: Vec<Layer> = LayerKind::ALL
            .iter()
            .map(|kind| Layer::new(scene, *kind))
            .collect();
        let windows_node = scene.create_container();
        let fullscreen_node = scene.create_container();
        let background = scene.create_element(Background {
            origin: Point::default(),
            size: Size::default(),
            color: background,
        });

        let order = [
            layers[LayerKind::Background.index()].node(),
            layers[LayerKind::Bottom.index()].node(),
            windows_node,
            layers[LayerKind::Top.index()].node(),
            layers[LayerKind::Overlay.index()].node(),
            fullscreen_node,
        ];
        for child in order {
            attach(scene, node, child);
        }
        attach(scene, layers[LayerKind::Background.index()].node(), background);

        info!("🗂️ Workspace {} \"{}\" created", index, name);
        Self {
            index,
            name: name.to_string(),
            node,
            layers,
            windows_node,
            fullscreen_node,
            background,
            stack: Vec::new(),
            iconified: Vec::new(),
            activated: None,
            fullscreen: None,
            drag: None,
            outputs: Vec::new(),
            usable: HashMap::new(),
            input_enabled: false,
            minimum_size,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn background_node(&self) -> NodeId {
        self.background
    }

    pub fn layer(&self, kind: LayerKind) -> &Layer {
        &self.layers[kind.index()]
    }

    pub fn layer_mut(&mut self, kind: LayerKind) -> &mut Layer {
        &mut self.layers[kind.index()]
    }

    /// Mapped windows, bottom to top.
    pub fn windows(&self) -> &[WindowId] {
        &self.stack
    }

    pub fn iconified(&self) -> &[WindowId] {
        &self.iconified
    }

    pub fn contains(&self, window: WindowId) -> bool {
        self.stack.contains(&window) || self.iconified.contains(&window)
    }

    /// No windows, mapped or iconified.
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty() && self.iconified.is_empty()
    }

    pub fn activated(&self) -> Option<WindowId> {
        self.activated
    }

    pub fn fullscreen(&self) -> Option<WindowId> {
        self.fullscreen
    }

    pub fn drag(&self) -> Option<&DragSession> {
        self.drag.as_ref()
    }

    pub fn is_input_enabled(&self) -> bool {
        self.input_enabled
    }

    pub fn usable_area(&self, output: OutputId) -> Option<Rectangle> {
        self.usable.get(&output).copied()
    }

    /// The output holding the centre of `rect`, or the first output.
    pub fn output_for(&self, rect: Rectangle) -> Option<(OutputId, Rectangle)> {
        let center = rect.center();
        self.outputs
            .iter()
            .find(|(_, geometry)| geometry.contains(center))
            .or_else(|| self.outputs.first())
            .copied()
    }

    /// Usable area of the output `rect` is on.
    pub fn usable_for(&self, rect: Rectangle) -> Rectangle {
        self.output_for(rect)
            .map(|(id, full)| self.usable.get(&id).copied().unwrap_or(full))
            .unwrap_or_default()
    }

    pub fn set_visible(&mut self, scene: &mut Scene, visible: bool) {
        scene.set_visible(self.node, visible);
    }

    /// Input is enabled only on the current workspace while unlocked.
    /// Re-enabling refocuses the activated window.
    pub fn set_input_enabled(&mut self, scene: &mut Scene, windows: &WindowMap, enabled: bool) {
        if self.input_enabled == enabled {
            return;
        }
        self.input_enabled = enabled;
        if enabled {
            self.focus_activated(scene, windows);
        }
    }

    fn focus_activated(&self, scene: &mut Scene, windows: &WindowMap) {
        if !self.input_enabled {
            return;
        }
        let target = self
            .activated
            .and_then(|id| windows.get(&id))
            .and_then(|window| window.keyboard_node());
        match target {
            Some(node) => scene.set_keyboard_focus(Some(node)),
            None => {
                if let Some(focused) = scene.keyboard_focus() {
                    if scene.is_ancestor_or_self(self.node, focused) {
                        scene.set_keyboard_focus(None);
                    }
                }
            }
        }
    }

    // -- Outputs and layers ------------------------------------------------

    /// Adopts a new output layout: resizes the background, adds or drops
    /// panel placements and re-arranges.
    pub fn set_outputs(
        &mut self,
        scene: &mut Scene,
        windows: &mut WindowMap,
        panels: &mut PanelMap,
        outputs: &[(OutputId, Rectangle)],
    ) {
        self.outputs = outputs.to_vec();
        let extents = outputs
            .iter()
            .fold(Rectangle::default(), |acc, (_, geometry)| acc.union(geometry));
        scene.set_position(self.background, extents.loc());
        scene.update_element::<Background, _>(self.background, |background| {
            background.origin = extents.loc();
            background.size = extents.size();
        });
        for layer in &self.layers {
            layer.sync_outputs(scene, panels, outputs);
        }
        self.arrange(scene, windows, panels);
    }

    /// Re-places every panel. Maximized and fullscreen windows follow a
    /// changed usable area.
    pub fn arrange(&mut self, scene: &mut Scene, windows: &mut WindowMap, panels: &mut PanelMap) {
        let usable = arrange_layers(scene, &self.layers, panels, &self.outputs);
        if usable != self.usable {
            self.usable = usable;
            self.reconfigure_windows(scene, windows);
        }
    }

    pub fn add_panel(
        &mut self,
        scene: &mut Scene,
        windows: &mut WindowMap,
        panels: &mut PanelMap,
        panel: PanelId,
    ) {
        let outputs = self.outputs.clone();
        if let Some(entry) = panels.get_mut(&panel) {
            let kind = entry.layer();
            self.layers[kind.index()].add_panel(scene, entry, &outputs);
        }
        self.arrange(scene, windows, panels);
    }

    /// Drops a panel from whichever layer holds it. The caller owns its
    /// nodes.
    pub fn remove_panel(&mut self, panel: PanelId) -> bool {
        self.layers.iter_mut().any(|layer| layer.remove_panel(panel))
    }

    /// Moves a panel whose client asked for another layer.
    pub fn move_panel_to_layer(&mut self, scene: &mut Scene, panels: &mut PanelMap, panel: PanelId) {
        let Some(entry) = panels.get_mut(&panel) else {
            return;
        };
        if self.layers.iter_mut().any(|layer| layer.remove_panel(panel)) {
            self.layers[entry.layer().index()].adopt_panel(scene, entry);
        }
    }

    /// Hands every panel over, layer by layer.
    pub fn take_panels(&mut self) -> Vec<(LayerKind, Vec<PanelId>)> {
        self.layers
            .iter_mut()
            .map(|layer| (layer.kind(), layer.take_panels()))
            .collect()
    }

    /// Takes over panels from another workspace.
    pub fn adopt_panels(
        &mut self,
        scene: &mut Scene,
        panels: &mut PanelMap,
        taken: Vec<(LayerKind, Vec<PanelId>)>,
    ) {
        for (kind, ids) in taken {
            for id in ids {
                if let Some(panel) = panels.get_mut(&id) {
                    self.layers[kind.index()].adopt_panel(scene, panel);
                }
            }
        }
    }

    fn reconfigure_windows(&mut self, scene: &mut Scene, windows: &mut WindowMap) {
        let ids: Vec<WindowId> = self.stack.clone();
        for id in ids {
            let Some(window) = windows.get(&id) else {
                continue;
            };
            let geometry = window.geometry();
            let target = window.target_state();
            let output = self.output_for(geometry).map(|(_, full)| full);
            let usable = self.usable_for(geometry);
            let Some(window) = windows.get_mut(&id) else {
                continue;
            };
            if target.fullscreen {
                if let Some(output) = output {
                    window.request_fullscreen(scene, true, output);
                }
            } else if target.maximized {
                window.request_maximized(scene, true, usable);
            }
        }
    }

    // -- Window stack ------------------------------------------------------

    /// Puts a window on top of the stack and activates it.
    pub fn map_window(&mut self, scene: &mut Scene, windows: &mut WindowMap, id: WindowId) {
        let Some(window) = windows.get_mut(&id) else {
            return;
        };
        if self.contains(id) {
            return;
        }
        window.set_workspace(Some(self.index));
        window.set_mapped(true);
        let container = if window.state().fullscreen {
            self.fullscreen = Some(id);
            self.fullscreen_node
        } else {
            self.windows_node
        };
        attach(scene, container, window.node());
        self.stack.push(id);
        self.keep_fullscreen_on_top();
        debug!("{} mapped on workspace {}", id, self.index);
        self.activate(scene, windows, Some(id));
    }

    /// Removes a window; the new top window is activated if the removed one
    /// was.
    pub fn unmap_window(&mut self, scene: &mut Scene, windows: &mut WindowMap, id: WindowId) -> bool {
        let was_stacked = self.stack.contains(&id);
        if !was_stacked && !self.iconified.contains(&id) {
            return false;
        }
        self.stack.retain(|w| *w != id);
        self.iconified.retain(|w| *w != id);
        self.cancel_drag_for(id);
        if self.fullscreen == Some(id) {
            self.fullscreen = None;
        }
        if let Some(window) = windows.get_mut(&id) {
            window.hide_menu(scene);
            scene.detach(window.node());
            window.set_mapped(false);
            window.set_workspace(None);
            window.set_iconified(false);
        }
        debug!("{} unmapped from workspace {}", id, self.index);
        if self.activated == Some(id) {
            if let Some(window) = windows.get_mut(&id) {
                window.set_activated(scene, false);
            }
            self.activated = None;
            let top = self.stack.last().copied();
            self.activate(scene, windows, top);
        }
        true
    }

    /// Makes `id` the keyboard focus target (without raising it).
    pub fn activate(&mut self, scene: &mut Scene, windows: &mut WindowMap, id: Option<WindowId>) {
        let id = id.filter(|id| self.stack.contains(id));
        if self.activated != id {
            if let Some(previous) = self.activated.and_then(|p| windows.get_mut(&p)) {
                previous.set_activated(scene, false);
            }
            if let Some(window) = id.and_then(|w| windows.get_mut(&w)) {
                window.set_activated(scene, true);
            }
            self.activated = id;
            debug!("workspace {}: activated {:?}", self.index, id);
        }
        self.focus_activated(scene, windows);
    }

    fn keep_fullscreen_on_top(&mut self) {
        if let Some(fullscreen) = self.fullscreen {
            if let Some(position) = self.stack.iter().position(|w| *w == fullscreen) {
                let id = self.stack.remove(position);
                self.stack.push(id);
            }
        }
    }

    pub fn raise_window(&mut self, scene: &mut Scene, windows: &WindowMap, id: WindowId) {
        let Some(position) = self.stack.iter().position(|w| *w == id) else {
            return;
        };
        self.stack.remove(position);
        self.stack.push(id);
        self.keep_fullscreen_on_top();
        if let Some(window) = windows.get(&id) {
            if let Err(err) = scene.raise_to_top(window.node()) {
                debug!("raising {}: {}", id, err);
            }
        }
    }

    pub fn lower_window(&mut self, scene: &mut Scene, windows: &WindowMap, id: WindowId) {
        let Some(position) = self.stack.iter().position(|w| *w == id) else {
            return;
        };
        self.stack.remove(position);
        self.stack.insert(0, id);
        self.keep_fullscreen_on_top();
        if let Some(window) = windows.get(&id) {
            if let Err(err) = scene.lower_to_bottom(window.node()) {
                debug!("lowering {}: {}", id, err);
            }
        }
    }

    /// Follows a committed fullscreen change: fullscreen windows live in the
    /// fullscreen container above all panels.
    pub fn window_state_changed(&mut self, scene: &mut Scene, windows: &WindowMap, id: WindowId) {
        let Some(window) = windows.get(&id) else {
            return;
        };
        if !self.stack.contains(&id) {
            return;
        }
        let fullscreen = window.state().fullscreen;
        if fullscreen && self.fullscreen != Some(id) {
            if let Some(previous) = self.fullscreen.and_then(|p| windows.get(&p)) {
                scene.detach(previous.node());
                attach(scene, self.windows_node, previous.node());
            }
            scene.detach(window.node());
            attach(scene, self.fullscreen_node, window.node());
            self.fullscreen = Some(id);
            self.keep_fullscreen_on_top();
        } else if !fullscreen && self.fullscreen == Some(id) {
            scene.detach(window.node());
            attach(scene, self.windows_node, window.node());
            self.fullscreen = None;
        }
    }

    pub fn iconify_window(&mut self, scene: &mut Scene, windows: &mut WindowMap, id: WindowId) {
        let Some(position) = self.stack.iter().position(|w| *w == id) else {
            return;
        };
        self.stack.remove(position);
        self.cancel_drag_for(id);
        if self.fullscreen == Some(id) {
            self.fullscreen = None;
        }
        if let Some(window) = windows.get_mut(&id) {
            window.hide_menu(scene);
            scene.detach(window.node());
            window.set_iconified(true);
        }
        self.iconified.push(id);
        info!("{} iconified", id);
        if self.activated == Some(id) {
            if let Some(window) = windows.get_mut(&id) {
                window.set_activated(scene, false);
            }
            self.activated = None;
            let top = self.stack.last().copied();
            self.activate(scene, windows, top);
        }
    }

    pub fn deiconify_window(&mut self, scene: &mut Scene, windows: &mut WindowMap, id: WindowId) {
        let Some(position) = self.iconified.iter().position(|w| *w == id) else {
            return;
        };
        self.iconified.remove(position);
        let Some(window) = windows.get_mut(&id) else {
            return;
        };
        window.set_iconified(false);
        let container = if window.state().fullscreen {
            self.fullscreen = Some(id);
            self.fullscreen_node
        } else {
            self.windows_node
        };
        attach(scene, container, window.node());
        self.stack.push(id);
        self.keep_fullscreen_on_top();
        info!("{} restored", id);
        self.activate(scene, windows, Some(id));
    }

    /// Moves a window so it lies within the usable area.
    pub fn confine_within(&mut self, scene: &mut Scene, windows: &mut WindowMap, id: WindowId) {
        let Some(window) = windows.get_mut(&id) else {
            return;
        };
        let geometry = window.geometry();
        let usable = self.usable_for(geometry);
        let confined = geometry.confined_to(&usable);
        if confined != geometry {
            window.set_position(scene, confined.loc());
        }
    }

    // -- Drag sessions -----------------------------------------------------

    fn begin_drag(&mut self, windows: &WindowMap, id: WindowId, mode: DragMode, pointer: PointF) -> bool {
        let Some(window) = windows.get(&id) else {
            return false;
        };
        if !self.stack.contains(&id) || !window.state().is_organic() {
            return false;
        }
        if let DragMode::Resize(_) = mode {
            if window.state().shaded {
                return false;
            }
        }
        self.drag = Some(DragSession {
            window: id,
            mode,
            grab: pointer,
            original: window.geometry(),
        });
        debug!("{}: drag {:?} from {:?}", id, mode, pointer);
        true
    }

    pub fn begin_window_move(&mut self, windows: &WindowMap, id: WindowId, pointer: PointF) -> bool {
        self.begin_drag(windows, id, DragMode::Move, pointer)
    }

    pub fn begin_window_resize(
        &mut self,
        windows: &WindowMap,
        id: WindowId,
        edges: Edges,
        pointer: PointF,
    ) -> bool {
        if edges.is_empty() {
            return false;
        }
        self.begin_drag(windows, id, DragMode::Resize(edges), pointer)
    }

    /// Applies pointer motion to the dragged window. Returns false when no
    /// drag is active.
    pub fn drag_motion(&mut self, scene: &mut Scene, windows: &mut WindowMap, pointer: PointF) -> bool {
        let Some(drag) = self.drag else {
            return false;
        };
        let Some(window) = windows.get_mut(&drag.window) else {
            self.drag = None;
            return false;
        };
        let dx = (pointer.x - drag.grab.x).round() as i32;
        let dy = (pointer.y - drag.grab.y).round() as i32;
        match drag.mode {
            DragMode::Move => {
                window.set_position(scene, drag.original.loc().offset(dx, dy));
            }
            DragMode::Resize(edges) => {
                let geometry = resize_geometry(drag.original, edges, dx, dy, self.minimum_size);
                window.request_geometry(scene, geometry, edges);
            }
        }
        true
    }

    pub fn end_drag(&mut self) -> Option<DragSession> {
        self.drag.take()
    }

    pub fn cancel_drag_for(&mut self, window: WindowId) {
        if self.drag.map(|d| d.window) == Some(window) {
            debug!("{}: drag cancelled", window);
            self.drag = None;
        }
    }

    /// Detaches the workspace's own nodes. Windows must have been moved
    /// away and panels handed over first.
    pub fn destroy(self, scene: &mut Scene) {
        info!("🗑️ Workspace {} \"{}\" destroyed", self.index, self.name);
        scene.destroy(self.node);
    }
}

fn attach(scene: &mut Scene, parent: NodeId, child: NodeId) {
    if let Err(err) = scene.add_child(parent, child) {
        warn!("workspace: attaching {}: {}", child, err);
    }
}

#[cfg(test)]
mod tests;
