//! The scene arena.
//!
//! Every node lives in one [`Scene`]; containers own their children through
//! the arena and children hold a plain parent id. Attaching a node that
//! already has a parent is refused, so a node is in at most one container.
//!
//! Input is routed here rather than by the elements themselves:
//!
//! - Pointer motion walks containers front to back, hit-tests each visible
//!   child against its bounding box and offers the motion to the first hit.
//!   A child that does not claim it passes it on to the next sibling below.
//! - Enter and leave are synthesized from changes of a container's pointer
//!   child, never taken from the input source.
//! - A container with a pointer grab sends every pointer event to the
//!   grabbing child, hit or not.
//! - Keyboard events follow the chain of focused children down to the one
//!   focused leaf.
//!
//! Element callbacks push [`SceneEvent`]s into the scene's sink; owners
//! collect them with [`Scene::take_events`] after each dispatch.

use std::collections::HashMap;

use log::{debug, warn};

use crate::error::ToolkitError;
use crate::geometry::{Point, PointF, Rectangle};
use crate::toolkit::element::{
    AxisEvent, ButtonEvent, ButtonState, Color, CursorKind, Element, EventSink, KeyEvent,
    SceneEvent,
};
use crate::toolkit::NodeId;

/// Where a child goes in its parent's stacking order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Top,
    Bottom,
    Above(NodeId),
    Below(NodeId),
}

#[derive(Debug, Default)]
struct Container {
    /// Back to front.
    children: Vec<NodeId>,
    pointer_grab: Option<NodeId>,
    pointer_child: Option<NodeId>,
    keyboard_child: Option<NodeId>,
}

#[derive(Debug)]
enum NodeKind {
    Leaf(Box<dyn Element>),
    Container(Container),
}

#[derive(Debug)]
struct Node {
    parent: Option<NodeId>,
    position: Point,
    visible: bool,
    kind: NodeKind,
}

/// A leaf as it should be painted this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderItem {
    pub node: NodeId,
    pub bounds: Rectangle,
    pub fill: Option<Color>,
}

#[derive(Debug)]
pub struct Scene {
    nodes: HashMap<NodeId, Node>,
    next_id: u64,
    focused: Option<NodeId>,
    /// Buttons down since the implicit grab was taken.
    buttons_held: u32,
    damage: Vec<Rectangle>,
    events: EventSink,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            next_id: 1,
            focused: None,
            buttons_held: 0,
            damage: Vec::new(),
            events: EventSink::new(),
        }
    }

    fn insert_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId::from_raw(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            Node {
                parent: None,
                position: Point::default(),
                visible: true,
                kind,
            },
        );
        id
    }

    pub fn create_container(&mut self) -> NodeId {
        self.insert_node(NodeKind::Container(Container::default()))
    }

    pub fn create_element<E: Element>(&mut self, element: E) -> NodeId {
        self.insert_node(NodeKind::Leaf(Box::new(element)))
    }

    pub fn create_boxed(&mut self, element: Box<dyn Element>) -> NodeId {
        self.insert_node(NodeKind::Leaf(element))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_container(&self, id: NodeId) -> bool {
        matches!(
            self.nodes.get(&id),
            Some(Node {
                kind: NodeKind::Container(_),
                ..
            })
        )
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id).and_then(|node| node.parent)
    }

    /// Children back to front; empty for leaves and unknown nodes.
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.nodes.get(&id) {
            Some(Node {
                kind: NodeKind::Container(container),
                ..
            }) => &container.children,
            _ => &[],
        }
    }

    fn container(&self, id: NodeId) -> Option<&Container> {
        match self.nodes.get(&id) {
            Some(Node {
                kind: NodeKind::Container(container),
                ..
            }) => Some(container),
            _ => None,
        }
    }

    fn container_mut(&mut self, id: NodeId) -> Option<&mut Container> {
        match self.nodes.get_mut(&id) {
            Some(Node {
                kind: NodeKind::Container(container),
                ..
            }) => Some(container),
            _ => None,
        }
    }

    /// True if `ancestor` is `node` or one of its ancestors.
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    // -- Structure ---------------------------------------------------------

    pub fn add_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), ToolkitError> {
        self.insert_child(parent, child, Placement::Top)
    }

    pub fn insert_child(
        &mut self,
        parent: NodeId,
        child: NodeId,
        placement: Placement,
    ) -> Result<(), ToolkitError> {
        if !self.contains(parent) {
            return Err(ToolkitError::UnknownNode(parent));
        }
        if !self.is_container(parent) {
            return Err(ToolkitError::NotAContainer(parent));
        }
        let existing = match self.nodes.get(&child) {
            Some(node) => node.parent,
            None => return Err(ToolkitError::UnknownNode(child)),
        };
        if let Some(existing) = existing {
            return Err(ToolkitError::AlreadyParented {
                child,
                parent: existing,
            });
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(ToolkitError::Cycle(child));
        }

        let container = self
            .container_mut(parent)
            .ok_or(ToolkitError::NotAContainer(parent))?;
        let index = match placement {
            Placement::Top => container.children.len(),
            Placement::Bottom => 0,
            Placement::Above(reference) | Placement::Below(reference) => {
                let position = container
                    .children
                    .iter()
                    .position(|c| *c == reference)
                    .ok_or(ToolkitError::NotAChild {
                        child: reference,
                        parent,
                    })?;
                if matches!(placement, Placement::Above(_)) {
                    position + 1
                } else {
                    position
                }
            }
        };
        container.children.insert(index, child);
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }

        if let Some(focused) = self.focused {
            if self.is_ancestor_or_self(child, focused) {
                self.mark_focus_chain(focused);
            }
        }
        self.request_redraw(child);
        Ok(())
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), ToolkitError> {
        if self.container(parent).is_none() {
            return Err(if self.contains(parent) {
                ToolkitError::NotAContainer(parent)
            } else {
                ToolkitError::UnknownNode(parent)
            });
        }
        if self.parent(child) != Some(parent) {
            return Err(ToolkitError::NotAChild { child, parent });
        }

        self.request_redraw(child);

        let mut leave = None;
        if let Some(container) = self.container_mut(parent) {
            container.children.retain(|c| *c != child);
            if container.pointer_grab == Some(child) {
                container.pointer_grab = None;
            }
            if container.pointer_child == Some(child) {
                container.pointer_child = None;
                leave = Some(child);
            }
        }
        if let Some(leave) = leave {
            self.pointer_leave_node(leave);
        }

        if let Some(focused) = self.focused {
            if self.is_ancestor_or_self(child, focused) {
                debug!("{} leaves the tree with keyboard focus", focused);
                self.set_keyboard_focus(None);
            }
        }

        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = None;
        }
        Ok(())
    }

    /// Removes `id` from its parent, if it has one.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.parent(id) {
            if let Err(err) = self.remove_child(parent, id) {
                warn!("detaching {}: {}", id, err);
            }
        }
    }

    /// Moves an attached child within its parent's stacking order.
    pub fn restack(&mut self, child: NodeId, placement: Placement) -> Result<(), ToolkitError> {
        let parent = self.parent(child).ok_or(ToolkitError::UnknownNode(child))?;
        if matches!(placement, Placement::Above(r) | Placement::Below(r) if r == child) {
            return Ok(());
        }
        let container = self
            .container_mut(parent)
            .ok_or(ToolkitError::NotAContainer(parent))?;
        let old_index = container
            .children
            .iter()
            .position(|c| *c == child)
            .ok_or(ToolkitError::NotAChild { child, parent })?;
        container.children.remove(old_index);
        let index = match placement {
            Placement::Top => container.children.len(),
            Placement::Bottom => 0,
            Placement::Above(reference) | Placement::Below(reference) => {
                match container.children.iter().position(|c| *c == reference) {
                    Some(position) if matches!(placement, Placement::Above(_)) => position + 1,
                    Some(position) => position,
                    None => {
                        container.children.insert(old_index, child);
                        return Err(ToolkitError::NotAChild {
                            child: reference,
                            parent,
                        });
                    }
                }
            }
        };
        container.children.insert(index, child);
        self.request_redraw(child);
        Ok(())
    }

    pub fn raise_to_top(&mut self, child: NodeId) -> Result<(), ToolkitError> {
        self.restack(child, Placement::Top)
    }

    pub fn lower_to_bottom(&mut self, child: NodeId) -> Result<(), ToolkitError> {
        self.restack(child, Placement::Bottom)
    }

    /// Detaches and frees `id` and everything below it.
    pub fn destroy(&mut self, id: NodeId) {
        if !self.contains(id) {
            return;
        }
        self.detach(id);
        if let Some(focused) = self.focused {
            if self.is_ancestor_or_self(id, focused) {
                self.set_keyboard_focus(None);
            }
        }
        self.destroy_subtree(id);
    }

    fn destroy_subtree(&mut self, id: NodeId) {
        let Some(node) = self.nodes.remove(&id) else {
            return;
        };
        match node.kind {
            NodeKind::Leaf(mut element) => element.destroy(),
            NodeKind::Container(container) => {
                for child in container.children {
                    self.destroy_subtree(child);
                }
            }
        }
    }

    // -- Geometry and visibility ------------------------------------------

    pub fn position(&self, id: NodeId) -> Point {
        self.nodes
            .get(&id)
            .map(|node| node.position)
            .unwrap_or_default()
    }

    pub fn set_position(&mut self, id: NodeId, position: Point) {
        if self.position(id) == position {
            return;
        }
        self.request_redraw(id);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.position = position;
        }
        self.request_redraw(id);
    }

    /// Position in the coordinate space of the topmost ancestor.
    pub fn absolute_position(&self, id: NodeId) -> Point {
        let mut position = Point::default();
        let mut current = Some(id);
        while let Some(node) = current.and_then(|id| self.nodes.get(&id)) {
            position = position + node.position;
            current = node.parent;
        }
        position
    }

    pub fn is_visible(&self, id: NodeId) -> bool {
        self.nodes.get(&id).map(|node| node.visible).unwrap_or(false)
    }

    /// Visible along with every ancestor.
    pub fn is_effectively_visible(&self, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(id) = current {
            match self.nodes.get(&id) {
                Some(node) if node.visible => current = node.parent,
                _ => return false,
            }
        }
        true
    }

    pub fn set_visible(&mut self, id: NodeId, visible: bool) {
        match self.nodes.get(&id) {
            Some(node) if node.visible != visible => {}
            _ => return,
        }
        if !visible {
            self.request_redraw(id);
            if let Some(parent) = self.parent(id) {
                let mut leave = false;
                if let Some(container) = self.container_mut(parent) {
                    if container.pointer_grab == Some(id) {
                        container.pointer_grab = None;
                    }
                    if container.pointer_child == Some(id) {
                        container.pointer_child = None;
                        leave = true;
                    }
                }
                if leave {
                    self.pointer_leave_node(id);
                }
            }
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.visible = visible;
        }
        if visible {
            self.request_redraw(id);
        }
    }

    /// Bounding box relative to the node's position. For containers this is
    /// the union of the visible children.
    pub fn dimensions(&self, id: NodeId) -> Rectangle {
        match self.nodes.get(&id).map(|node| &node.kind) {
            Some(NodeKind::Leaf(element)) => element.dimensions(),
            Some(NodeKind::Container(container)) => container
                .children
                .iter()
                .filter(|child| self.is_visible(**child))
                .fold(Rectangle::default(), |acc, child| {
                    acc.union(&self.dimensions(*child).translate(self.position(*child)))
                }),
            None => Rectangle::default(),
        }
    }

    /// Bounding box in the coordinate space of the topmost ancestor.
    pub fn bounds(&self, id: NodeId) -> Rectangle {
        self.dimensions(id).translate(self.absolute_position(id))
    }

    // -- Elements ----------------------------------------------------------

    pub fn element<E: Element>(&self, id: NodeId) -> Option<&E> {
        match self.nodes.get(&id).map(|node| &node.kind) {
            Some(NodeKind::Leaf(element)) => {
                let element: &dyn Element = &**element;
                element.as_any().downcast_ref::<E>()
            }
            _ => None,
        }
    }

    /// Mutable access without damage tracking; prefer [`Scene::update_element`].
    pub fn element_mut<E: Element>(&mut self, id: NodeId) -> Option<&mut E> {
        match self.nodes.get_mut(&id).map(|node| &mut node.kind) {
            Some(NodeKind::Leaf(element)) => {
                let element: &mut dyn Element = &mut **element;
                element.as_any_mut().downcast_mut::<E>()
            }
            _ => None,
        }
    }

    /// Runs `f` on the element and damages its area before and after.
    pub fn update_element<E: Element, R>(
        &mut self,
        id: NodeId,
        f: impl FnOnce(&mut E) -> R,
    ) -> Option<R> {
        self.element::<E>(id)?;
        self.request_redraw(id);
        let result = self.element_mut::<E>(id).map(f);
        self.request_redraw(id);
        result
    }

    // -- Damage and frames -------------------------------------------------

    pub fn request_redraw(&mut self, id: NodeId) {
        if !self.is_effectively_visible(id) {
            return;
        }
        let bounds = self.bounds(id);
        self.damage_rect(bounds);
    }

    pub fn damage_rect(&mut self, rect: Rectangle) {
        if rect.is_empty() {
            return;
        }
        if self.damage.iter().any(|d| d.intersection(&rect) == Some(rect)) {
            return;
        }
        self.damage.push(rect);
    }

    pub fn has_damage(&self) -> bool {
        !self.damage.is_empty()
    }

    pub fn take_damage(&mut self) -> Vec<Rectangle> {
        std::mem::take(&mut self.damage)
    }

    /// Visible leaves under `root`, back to front.
    pub fn render_list(&self, root: NodeId) -> Vec<RenderItem> {
        let mut items = Vec::new();
        let origin = self.absolute_position(root) - self.position(root);
        self.collect_render(root, origin, &mut items);
        items
    }

    fn collect_render(&self, id: NodeId, origin: Point, items: &mut Vec<RenderItem>) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        if !node.visible {
            return;
        }
        let position = origin + node.position;
        match &node.kind {
            NodeKind::Leaf(element) => {
                let bounds = element.dimensions().translate(position);
                if !bounds.is_empty() {
                    items.push(RenderItem {
                        node: id,
                        bounds,
                        fill: element.fill(),
                    });
                }
            }
            NodeKind::Container(container) => {
                for child in &container.children {
                    self.collect_render(*child, position, items);
                }
            }
        }
    }

    // -- Events ------------------------------------------------------------

    pub fn take_events(&mut self) -> Vec<SceneEvent> {
        self.events.drain()
    }

    pub fn push_event(&mut self, event: SceneEvent) {
        self.events.push(event);
    }

    // -- Keyboard focus ----------------------------------------------------

    pub fn keyboard_focus(&self) -> Option<NodeId> {
        self.focused
    }

    /// True if the focused leaf is `id` or below it.
    pub fn has_keyboard_focus(&self, id: NodeId) -> bool {
        self.focused
            .map(|focused| self.is_ancestor_or_self(id, focused))
            .unwrap_or(false)
    }

    /// Moves keyboard focus to a leaf, or clears it.
    pub fn set_keyboard_focus(&mut self, target: Option<NodeId>) {
        if self.focused == target {
            return;
        }
        if let Some(target) = target {
            if self.is_container(target) || !self.contains(target) {
                warn!("keyboard focus requested for non-leaf {}", target);
                return;
            }
        }

        if let Some(old) = self.focused.take() {
            self.clear_focus_chain(old);
            if let Some(Node {
                kind: NodeKind::Leaf(element),
                ..
            }) = self.nodes.get_mut(&old)
            {
                element.keyboard_focus(false, &mut self.events);
            }
        }

        if let Some(new) = target {
            self.focused = Some(new);
            self.mark_focus_chain(new);
            if let Some(Node {
                kind: NodeKind::Leaf(element),
                ..
            }) = self.nodes.get_mut(&new)
            {
                element.keyboard_focus(true, &mut self.events);
            }
        }
    }

    fn mark_focus_chain(&mut self, leaf: NodeId) {
        let mut child = leaf;
        while let Some(parent) = self.parent(child) {
            if let Some(container) = self.container_mut(parent) {
                container.keyboard_child = Some(child);
            }
            child = parent;
        }
    }

    fn clear_focus_chain(&mut self, leaf: NodeId) {
        let mut child = leaf;
        while let Some(parent) = self.parent(child) {
            if let Some(container) = self.container_mut(parent) {
                if container.keyboard_child == Some(child) {
                    container.keyboard_child = None;
                }
            }
            child = parent;
        }
    }

    /// Routes a key along the focus chain starting at `root`.
    pub fn keyboard_key(&mut self, root: NodeId, event: &KeyEvent) -> bool {
        let mut current = root;
        loop {
            match self.nodes.get_mut(&current).map(|node| &mut node.kind) {
                Some(NodeKind::Container(container)) => match container.keyboard_child {
                    Some(child) => current = child,
                    None => return false,
                },
                Some(NodeKind::Leaf(element)) => {
                    return element.keyboard_key(event, &mut self.events)
                }
                None => return false,
            }
        }
    }

    // -- Pointer -----------------------------------------------------------

    pub fn pointer_grab(&self, container: NodeId) -> Option<NodeId> {
        self.container(container).and_then(|c| c.pointer_grab)
    }

    /// Latches pointer events in `container` to `child` until released.
    pub fn set_pointer_grab(&mut self, container: NodeId, child: NodeId) -> Result<(), ToolkitError> {
        if self.parent(child) != Some(container) {
            return Err(ToolkitError::NotAChild {
                child,
                parent: container,
            });
        }
        let previous = self
            .container_mut(container)
            .ok_or(ToolkitError::NotAContainer(container))?
            .pointer_child;
        if previous != Some(child) {
            self.switch_pointer_child(container, Some(child), PointF::default());
        }
        if let Some(c) = self.container_mut(container) {
            c.pointer_grab = Some(child);
        }
        Ok(())
    }

    pub fn release_pointer_grab(&mut self, container: NodeId) {
        if let Some(c) = self.container_mut(container) {
            c.pointer_grab = None;
        }
    }

    /// Latches every container on the entered path below `root` to the
    /// child the pointer is in.
    fn latch_pointer_path(&mut self, root: NodeId) {
        let mut current = root;
        while let Some(container) = self.container_mut(current) {
            let Some(next) = container.pointer_grab.or(container.pointer_child) else {
                break;
            };
            container.pointer_grab = Some(next);
            current = next;
        }
    }

    /// Drops the grabs along the grabbed path below `root` and forgets any
    /// held buttons.
    pub fn release_pointer_grabs(&mut self, root: NodeId) {
        self.buttons_held = 0;
        let mut current = root;
        while let Some(container) = self.container_mut(current) {
            let Some(next) = container.pointer_grab.take().or(container.pointer_child) else {
                break;
            };
            current = next;
        }
    }

    pub fn buttons_held(&self) -> u32 {
        self.buttons_held
    }

    /// Dispatches motion at `position`, given in the coordinate space of
    /// the topmost ancestor of `root`.
    pub fn pointer_motion(&mut self, root: NodeId, position: PointF, time_msec: u32) -> bool {
        let origin = self.absolute_position(root) - self.position(root);
        let local = position.relative_to(origin + self.position(root));
        self.motion_at(root, local, time_msec, false)
    }

    fn motion_at(&mut self, id: NodeId, position: PointF, time_msec: u32, forced: bool) -> bool {
        let (visible, grab, children) = match self.nodes.get(&id) {
            None => return false,
            Some(node) => match &node.kind {
                NodeKind::Leaf(_) => (node.visible, None, None),
                NodeKind::Container(c) => (node.visible, c.pointer_grab, Some(c.children.clone())),
            },
        };
        if !forced && !visible {
            return false;
        }

        let Some(children) = children else {
            let Some(Node {
                kind: NodeKind::Leaf(element),
                ..
            }) = self.nodes.get_mut(&id)
            else {
                return false;
            };
            if !forced && !element.dimensions().contains_f(position) {
                return false;
            }
            return element.pointer_motion(position, time_msec, &mut self.events);
        };

        if let Some(grab) = grab {
            let local = position.relative_to(self.position(grab));
            self.switch_pointer_child(id, Some(grab), local);
            self.motion_at(grab, local, time_msec, true);
            return true;
        }

        for child in children.iter().rev().copied() {
            if !self.is_visible(child) {
                continue;
            }
            let local = position.relative_to(self.position(child));
            if !self.dimensions(child).contains_f(local) {
                continue;
            }
            self.switch_pointer_child(id, Some(child), local);
            if self.motion_at(child, local, time_msec, false) {
                return true;
            }
        }
        self.switch_pointer_child(id, None, position);
        false
    }

    fn switch_pointer_child(&mut self, container: NodeId, new: Option<NodeId>, position: PointF) {
        let Some(current) = self.container(container).map(|c| c.pointer_child) else {
            return;
        };
        if current == new {
            return;
        }
        if let Some(old) = current {
            self.pointer_leave_node(old);
        }
        if let Some(c) = self.container_mut(container) {
            c.pointer_child = new;
        }
        if let Some(new) = new {
            if let Some(Node {
                kind: NodeKind::Leaf(element),
                ..
            }) = self.nodes.get_mut(&new)
            {
                element.pointer_enter(position, &mut self.events);
            }
        }
    }

    fn pointer_leave_node(&mut self, id: NodeId) {
        let inner = match self.nodes.get_mut(&id).map(|node| &mut node.kind) {
            Some(NodeKind::Leaf(element)) => {
                element.pointer_leave(&mut self.events);
                None
            }
            Some(NodeKind::Container(container)) => {
                container.pointer_grab = None;
                container.pointer_child.take()
            }
            None => None,
        };
        if let Some(inner) = inner {
            self.pointer_leave_node(inner);
        }
    }

    /// Sends leave to whatever is under the pointer below `root`.
    pub fn pointer_leave(&mut self, root: NodeId) {
        self.pointer_leave_node(root);
    }

    /// Dispatches a button to the grabbing or entered path below `root`.
    /// The event position is in the topmost ancestor's coordinate space.
    ///
    /// A press latches the path it lands on, so motion and the release go
    /// to the pressed element even after the pointer leaves it. The grab
    /// ends when the last held button is released.
    pub fn pointer_button(&mut self, root: NodeId, event: &ButtonEvent) -> bool {
        match event.state {
            ButtonState::Pressed => {
                self.buttons_held += 1;
                self.latch_pointer_path(root);
                self.deliver_button(root, event)
            }
            ButtonState::Released => {
                let claimed = self.deliver_button(root, event);
                if self.buttons_held > 0 {
                    self.buttons_held -= 1;
                    if self.buttons_held == 0 {
                        self.release_pointer_grabs(root);
                    }
                }
                claimed
            }
        }
    }

    fn deliver_button(&mut self, root: NodeId, event: &ButtonEvent) -> bool {
        let mut event = *event;
        event.position = event.position.relative_to(self.absolute_position(root));
        let mut current = root;
        loop {
            let next = match self.nodes.get_mut(&current).map(|node| &mut node.kind) {
                Some(NodeKind::Container(container)) => {
                    container.pointer_grab.or(container.pointer_child)
                }
                Some(NodeKind::Leaf(element)) => {
                    return element.pointer_button(&event, &mut self.events)
                }
                None => None,
            };
            let Some(next) = next else {
                return false;
            };
            event.position = event.position.relative_to(self.position(next));
            current = next;
        }
    }

    pub fn pointer_axis(&mut self, root: NodeId, event: &AxisEvent) -> bool {
        let leaf = self.pointer_focus(root);
        match leaf.and_then(|leaf| self.nodes.get_mut(&leaf)) {
            Some(Node {
                kind: NodeKind::Leaf(element),
                ..
            }) => element.pointer_axis(event, &mut self.events),
            _ => false,
        }
    }

    /// The leaf the pointer is over (or grabbed by) below `root`.
    pub fn pointer_focus(&self, root: NodeId) -> Option<NodeId> {
        let mut current = root;
        loop {
            match self.nodes.get(&current).map(|node| &node.kind) {
                Some(NodeKind::Container(container)) => {
                    current = container.pointer_grab.or(container.pointer_child)?;
                }
                Some(NodeKind::Leaf(_)) => return Some(current),
                None => return None,
            }
        }
    }

    pub fn cursor(&self, root: NodeId) -> CursorKind {
        self.pointer_focus(root)
            .and_then(|leaf| match self.nodes.get(&leaf).map(|node| &node.kind) {
                Some(NodeKind::Leaf(element)) => element.cursor(),
                _ => None,
            })
            .unwrap_or_default()
    }

    // -- Diagnostics -------------------------------------------------------

    /// Verifies the parent/child bookkeeping and the focus chain.
    pub fn check_invariants(&self) -> Result<(), String> {
        let mut seen: HashMap<NodeId, NodeId> = HashMap::new();
        for (id, node) in &self.nodes {
            if let NodeKind::Container(container) = &node.kind {
                for child in &container.children {
                    if let Some(other) = seen.insert(*child, *id) {
                        return Err(format!("{} listed by {} and {}", child, other, id));
                    }
                    match self.nodes.get(child) {
                        Some(c) if c.parent == Some(*id) => {}
                        Some(c) => {
                            return Err(format!(
                                "{} lists {} whose parent is {:?}",
                                id, child, c.parent
                            ))
                        }
                        None => return Err(format!("{} lists missing node {}", id, child)),
                    }
                }
            }
            if let Some(parent) = node.parent {
                if !self.children(parent).contains(id) {
                    return Err(format!("{} claims parent {} which does not list it", id, parent));
                }
            }
        }
        if let Some(focused) = self.focused {
            let mut child = focused;
            while let Some(parent) = self.parent(child) {
                if self.container(parent).and_then(|c| c.keyboard_child) != Some(child) {
                    return Err(format!("focus chain broken at {}", parent));
                }
                child = parent;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Size;
    use crate::toolkit::element::{ButtonState, SolidRect, BTN_LEFT, BTN_RIGHT};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<String>>>;

    #[derive(Debug)]
    struct Probe {
        name: &'static str,
        size: Size,
        claims: bool,
        log: Log,
    }

    impl Probe {
        fn new(name: &'static str, size: Size, log: &Log) -> Self {
            Self {
                name,
                size,
                claims: true,
                log: log.clone(),
            }
        }

        fn record(&self, what: String) {
            self.log.borrow_mut().push(format!("{}:{}", self.name, what));
        }
    }

    impl Element for Probe {
        fn dimensions(&self) -> Rectangle {
            Rectangle::from_loc_and_size(Point::default(), self.size)
        }

        fn pointer_motion(&mut self, position: PointF, _time: u32, _sink: &mut EventSink) -> bool {
            self.record(format!("motion {},{}", position.x, position.y));
            self.claims
        }

        fn pointer_enter(&mut self, _position: PointF, _sink: &mut EventSink) {
            self.record("enter".into());
        }

        fn pointer_leave(&mut self, _sink: &mut EventSink) {
            self.record("leave".into());
        }

        fn pointer_button(&mut self, event: &ButtonEvent, _sink: &mut EventSink) -> bool {
            self.record(format!("button {},{}", event.position.x, event.position.y));
            true
        }

        fn keyboard_key(&mut self, _event: &KeyEvent, _sink: &mut EventSink) -> bool {
            self.record("key".into());
            true
        }

        fn keyboard_focus(&mut self, focused: bool, _sink: &mut EventSink) {
            self.record(format!("focus {}", focused));
        }

        fn destroy(&mut self) {
            self.record("destroy".into());
        }
    }

    fn log() -> Log {
        Rc::new(RefCell::new(Vec::new()))
    }

    fn take(log: &Log) -> Vec<String> {
        std::mem::take(&mut *log.borrow_mut())
    }

    fn key_event() -> KeyEvent {
        KeyEvent {
            keycode: 30,
            keysyms: Vec::new(),
            pressed: true,
            modifiers: Default::default(),
            time_msec: 0,
        }
    }

    #[test]
    fn test_parent_back_references() {
        let mut scene = Scene::new();
        let a = scene.create_container();
        let b = scene.create_container();
        let leaf = scene.create_element(SolidRect::new(Size::new(10, 10), Color::BLACK));

        scene.add_child(a, leaf).unwrap();
        assert_eq!(scene.parent(leaf), Some(a));
        assert_eq!(
            scene.add_child(b, leaf),
            Err(ToolkitError::AlreadyParented { child: leaf, parent: a })
        );

        scene.remove_child(a, leaf).unwrap();
        assert_eq!(scene.parent(leaf), None);
        scene.add_child(b, leaf).unwrap();
        assert_eq!(scene.children(b), &[leaf]);
        assert!(scene.children(a).is_empty());
        scene.check_invariants().unwrap();
    }

    #[test]
    fn test_structural_preconditions() {
        let mut scene = Scene::new();
        let outer = scene.create_container();
        let inner = scene.create_container();
        let leaf = scene.create_element(SolidRect::new(Size::new(1, 1), Color::BLACK));

        scene.add_child(outer, inner).unwrap();
        assert_eq!(scene.add_child(inner, outer), Err(ToolkitError::Cycle(outer)));
        assert_eq!(scene.add_child(leaf, inner), Err(ToolkitError::NotAContainer(leaf)));
        assert_eq!(
            scene.remove_child(inner, leaf),
            Err(ToolkitError::NotAChild { child: leaf, parent: inner })
        );
    }

    #[test]
    fn test_stacking_operations() {
        let mut scene = Scene::new();
        let parent = scene.create_container();
        let nodes: Vec<NodeId> = (0..3).map(|_| scene.create_container()).collect();
        for node in &nodes {
            scene.add_child(parent, *node).unwrap();
        }

        scene.raise_to_top(nodes[0]).unwrap();
        assert_eq!(scene.children(parent), &[nodes[1], nodes[2], nodes[0]]);
        scene.lower_to_bottom(nodes[2]).unwrap();
        assert_eq!(scene.children(parent), &[nodes[2], nodes[1], nodes[0]]);
        scene.restack(nodes[2], Placement::Above(nodes[1])).unwrap();
        assert_eq!(scene.children(parent), &[nodes[1], nodes[2], nodes[0]]);

        let extra = scene.create_container();
        scene
            .insert_child(parent, extra, Placement::Below(nodes[0]))
            .unwrap();
        assert_eq!(scene.children(parent), &[nodes[1], nodes[2], extra, nodes[0]]);
        scene.check_invariants().unwrap();
    }

    #[test]
    fn test_motion_hits_topmost_and_falls_through() {
        let log = log();
        let mut scene = Scene::new();
        let root = scene.create_container();
        let bottom = scene.create_element(Probe::new("bottom", Size::new(100, 100), &log));
        let top = scene.create_element(Probe::new("top", Size::new(50, 50), &log));
        scene.add_child(root, bottom).unwrap();
        scene.add_child(root, top).unwrap();
        scene.set_position(top, Point::new(10, 10));

        assert!(scene.pointer_motion(root, PointF::new(20.0, 20.0), 0));
        assert_eq!(take(&log), vec!["top:enter", "top:motion 10,10"]);

        scene.element_mut::<Probe>(top).unwrap().claims = false;
        assert!(scene.pointer_motion(root, PointF::new(21.0, 20.0), 0));
        assert_eq!(
            take(&log),
            vec![
                "top:motion 11,10",
                "top:leave",
                "bottom:enter",
                "bottom:motion 21,20"
            ]
        );

        assert!(!scene.pointer_motion(root, PointF::new(200.0, 20.0), 0));
        assert_eq!(take(&log), vec!["bottom:leave"]);
    }

    #[test]
    fn test_nested_enter_leave_transitions() {
        let log = log();
        let mut scene = Scene::new();
        let root = scene.create_container();
        let left = scene.create_container();
        let right = scene.create_container();
        let a = scene.create_element(Probe::new("a", Size::new(10, 10), &log));
        let b = scene.create_element(Probe::new("b", Size::new(10, 10), &log));
        scene.add_child(root, left).unwrap();
        scene.add_child(root, right).unwrap();
        scene.add_child(left, a).unwrap();
        scene.add_child(right, b).unwrap();
        scene.set_position(right, Point::new(20, 0));

        scene.pointer_motion(root, PointF::new(5.0, 5.0), 0);
        scene.pointer_motion(root, PointF::new(25.0, 5.0), 0);
        assert_eq!(
            take(&log),
            vec!["a:enter", "a:motion 5,5", "a:leave", "b:enter", "b:motion 5,5"]
        );
        assert_eq!(scene.pointer_focus(root), Some(b));
    }

    #[test]
    fn test_hidden_nodes_are_skipped() {
        let log = log();
        let mut scene = Scene::new();
        let root = scene.create_container();
        let leaf = scene.create_element(Probe::new("leaf", Size::new(10, 10), &log));
        scene.add_child(root, leaf).unwrap();

        scene.pointer_motion(root, PointF::new(1.0, 1.0), 0);
        scene.set_visible(leaf, false);
        assert_eq!(take(&log), vec!["leaf:enter", "leaf:motion 1,1", "leaf:leave"]);
        assert!(!scene.pointer_motion(root, PointF::new(1.0, 1.0), 0));
        assert!(take(&log).is_empty());
    }

    #[test]
    fn test_pointer_grab_latches_events() {
        let log = log();
        let mut scene = Scene::new();
        let root = scene.create_container();
        let a = scene.create_element(Probe::new("a", Size::new(10, 10), &log));
        let b = scene.create_element(Probe::new("b", Size::new(10, 10), &log));
        scene.add_child(root, a).unwrap();
        scene.add_child(root, b).unwrap();
        scene.set_position(b, Point::new(50, 0));

        scene.pointer_motion(root, PointF::new(5.0, 5.0), 0);
        scene.set_pointer_grab(root, a).unwrap();
        take(&log);

        scene.pointer_motion(root, PointF::new(55.0, 5.0), 0);
        let button = ButtonEvent {
            button: BTN_LEFT,
            state: ButtonState::Released,
            time_msec: 0,
            position: PointF::new(55.0, 5.0),
        };
        scene.pointer_button(root, &button);
        assert_eq!(take(&log), vec!["a:motion 55,5", "a:button 55,5"]);

        scene.release_pointer_grab(root);
        scene.pointer_motion(root, PointF::new(55.0, 5.0), 0);
        assert_eq!(take(&log), vec!["a:leave", "b:enter", "b:motion 5,5"]);
    }

    #[test]
    fn test_press_holds_the_pointer_until_last_release() {
        let log = log();
        let mut scene = Scene::new();
        let root = scene.create_container();
        let group = scene.create_container();
        let a = scene.create_element(Probe::new("a", Size::new(10, 10), &log));
        let b = scene.create_element(Probe::new("b", Size::new(10, 10), &log));
        scene.add_child(root, group).unwrap();
        scene.add_child(group, a).unwrap();
        scene.add_child(root, b).unwrap();
        scene.set_position(b, Point::new(50, 0));

        let button = |button, state, x| ButtonEvent {
            button,
            state,
            time_msec: 0,
            position: PointF::new(x, 5.0),
        };
        scene.pointer_motion(root, PointF::new(5.0, 5.0), 0);
        scene.pointer_button(root, &button(BTN_LEFT, ButtonState::Pressed, 5.0));
        scene.pointer_button(root, &button(BTN_RIGHT, ButtonState::Pressed, 5.0));
        assert_eq!(scene.pointer_grab(root), Some(group));
        assert_eq!(scene.pointer_grab(group), Some(a));
        take(&log);

        scene.pointer_motion(root, PointF::new(55.0, 5.0), 0);
        scene.pointer_button(root, &button(BTN_LEFT, ButtonState::Released, 55.0));
        assert_eq!(take(&log), vec!["a:motion 55,5", "a:button 55,5"]);
        assert_eq!(scene.buttons_held(), 1);

        scene.pointer_button(root, &button(BTN_RIGHT, ButtonState::Released, 55.0));
        assert_eq!(take(&log), vec!["a:button 55,5"]);
        assert_eq!(scene.pointer_grab(root), None);
        assert_eq!(scene.pointer_grab(group), None);

        scene.pointer_motion(root, PointF::new(55.0, 5.0), 0);
        assert_eq!(take(&log), vec!["a:leave", "b:enter", "b:motion 5,5"]);
    }

    #[test]
    fn test_keyboard_focus_is_unique() {
        let log = log();
        let mut scene = Scene::new();
        let root = scene.create_container();
        let group = scene.create_container();
        let a = scene.create_element(Probe::new("a", Size::new(10, 10), &log));
        let b = scene.create_element(Probe::new("b", Size::new(10, 10), &log));
        scene.add_child(root, group).unwrap();
        scene.add_child(group, a).unwrap();
        scene.add_child(root, b).unwrap();

        scene.set_keyboard_focus(Some(a));
        assert!(scene.has_keyboard_focus(group));
        assert!(scene.keyboard_key(root, &key_event()));

        scene.set_keyboard_focus(Some(b));
        assert!(!scene.has_keyboard_focus(group));
        assert!(scene.keyboard_key(root, &key_event()));
        assert_eq!(
            take(&log),
            vec!["a:focus true", "a:key", "a:focus false", "b:focus true", "b:key"]
        );
        scene.check_invariants().unwrap();
    }

    #[test]
    fn test_removing_focused_subtree_clears_focus() {
        let log = log();
        let mut scene = Scene::new();
        let root = scene.create_container();
        let group = scene.create_container();
        let a = scene.create_element(Probe::new("a", Size::new(10, 10), &log));
        scene.add_child(root, group).unwrap();
        scene.add_child(group, a).unwrap();
        scene.set_keyboard_focus(Some(a));

        scene.remove_child(root, group).unwrap();
        assert_eq!(scene.keyboard_focus(), None);
        assert!(!scene.keyboard_key(root, &key_event()));

        scene.destroy(group);
        assert!(!scene.contains(a));
        assert_eq!(take(&log), vec!["a:focus true", "a:focus false", "a:destroy"]);
        scene.check_invariants().unwrap();
    }

    #[test]
    fn test_damage_and_render_order() {
        let mut scene = Scene::new();
        let root = scene.create_container();
        let back = scene.create_element(SolidRect::new(Size::new(100, 100), Color::BLACK));
        let front = scene.create_element(SolidRect::new(Size::new(10, 10), Color::WHITE));
        scene.add_child(root, back).unwrap();
        scene.add_child(root, front).unwrap();
        scene.take_damage();

        scene.set_position(front, Point::new(20, 30));
        assert_eq!(
            scene.take_damage(),
            vec![Rectangle::new(0, 0, 10, 10), Rectangle::new(20, 30, 10, 10)]
        );

        let items = scene.render_list(root);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].node, back);
        assert_eq!(items[1].bounds, Rectangle::new(20, 30, 10, 10));
        assert_eq!(items[1].fill, Some(Color::WHITE));

        scene.set_visible(front, false);
        assert_eq!(scene.render_list(root).len(), 1);
        assert_eq!(scene.dimensions(root), Rectangle::new(0, 0, 100, 100));
    }
}
