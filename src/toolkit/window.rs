//! Toplevel windows
//!
//! A window is a container holding, back to front: four borders, the
//! titlebar (menu button, title, close button), the content, the resize bar,
//! a popup container and a menu container. Decorations exist only for
//! server-side decorated windows and are hidden while fullscreen.
//!
//! Maximize, fullscreen and resize are two-phase: the request sends a
//! configure and remembers the proposed state under its serial; the state is
//! committed when the client acknowledges that serial and commits. Shade and
//! moves apply immediately. Windows with internal content (the root menu)
//! commit every request at once.

use log::{debug, info, warn};

use crate::decoration::DecorationTheme;
use crate::geometry::{Edges, Point, Rectangle, Size};
use crate::protocol::{ProtocolError, Serial, ToplevelConfigure, ToplevelHandle};
use crate::toolkit::element::{
    Button, ButtonEvent, ButtonState, ButtonTag, Color, CursorKind, Element, EventSink, Label,
    SceneEvent, BTN_LEFT, BTN_RIGHT,
};
use crate::toolkit::menu::{Menu, MenuItem};
use crate::toolkit::scene::Placement;
use crate::toolkit::surface::ClientSurface;
use crate::toolkit::{IdAllocator, NodeId, PopupId, Scene, SurfaceId, WindowId};

/// Credentials of the client that created the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClientIdentity {
    pub pid: libc::pid_t,
    pub uid: libc::uid_t,
    pub gid: libc::gid_t,
}

/// Committed window state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowState {
    pub maximized: bool,
    pub fullscreen: bool,
    pub shaded: bool,
    pub iconified: bool,
}

impl WindowState {
    /// Neither maximized nor fullscreen.
    pub fn is_organic(&self) -> bool {
        !self.maximized && !self.fullscreen
    }
}

/// State proposed by a configure, applied when it is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingState {
    pub maximized: bool,
    pub fullscreen: bool,
    /// Target outer geometry; `None` keeps the current position.
    pub geometry: Option<Rectangle>,
    /// Edges being dragged; the opposite edges stay put.
    pub anchor: Edges,
}

/// Items of the per-window menu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMenuCommand {
    Shade,
    Unshade,
    Maximize,
    Unmaximize,
    Fullscreen,
    Minimize,
    Close,
    MoveToWorkspace(usize),
}

/// What a client commit changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowCommit {
    pub first: bool,
    /// Maximized or fullscreen flipped.
    pub state_changed: bool,
    pub geometry_changed: bool,
}

#[derive(Debug)]
enum Content {
    Client {
        surface: ClientSurface<PendingState>,
        handle: Box<dyn ToplevelHandle>,
    },
    Internal {
        node: NodeId,
        keyboard: Option<NodeId>,
        size: Size,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartRole {
    Border(Edges),
    Titlebar,
    Resize(Edges),
}

/// Titlebar background, borders and resize-bar sections.
#[derive(Debug, Clone)]
pub struct DecorationPart {
    window: WindowId,
    role: PartRole,
    size: Size,
    color: Color,
}

impl Element for DecorationPart {
    fn dimensions(&self) -> Rectangle {
        Rectangle::from_loc_and_size(Point::default(), self.size)
    }

    fn pointer_button(&mut self, event: &ButtonEvent, sink: &mut EventSink) -> bool {
        if event.state != ButtonState::Pressed {
            return true;
        }
        sink.push(SceneEvent::WindowActivate(self.window));
        match (self.role, event.button) {
            (PartRole::Titlebar, BTN_LEFT) => sink.push(SceneEvent::WindowMove(self.window)),
            (PartRole::Titlebar, BTN_RIGHT) => sink.push(SceneEvent::WindowMenu(self.window)),
            (PartRole::Border(edges), BTN_LEFT) | (PartRole::Resize(edges), BTN_LEFT) => {
                sink.push(SceneEvent::WindowResize(self.window, edges))
            }
            _ => {}
        }
        true
    }

    fn cursor(&self) -> Option<CursorKind> {
        match self.role {
            PartRole::Border(edges) | PartRole::Resize(edges) => Some(CursorKind::Resize(edges)),
            PartRole::Titlebar => None,
        }
    }

    fn fill(&self) -> Option<Color> {
        Some(self.color)
    }
}

#[derive(Debug)]
struct Decoration {
    /// Top, bottom, left, right.
    borders: [NodeId; 4],
    titlebar: NodeId,
    titlebar_background: NodeId,
    menu_button: NodeId,
    title: NodeId,
    close_button: NodeId,
    resizebar: NodeId,
    /// Left corner, middle, right corner.
    resize_sections: [NodeId; 3],
}

impl Decoration {
    fn new(scene: &mut Scene, window: WindowId, theme: &DecorationTheme, title: &str) -> Self {
        let part = |scene: &mut Scene, role, color| {
            scene.create_element(DecorationPart {
                window,
                role,
                size: Size::default(),
                color,
            })
        };
        let borders = [
            part(scene, PartRole::Border(Edges::TOP), theme.border_color),
            part(scene, PartRole::Border(Edges::BOTTOM), theme.border_color),
            part(scene, PartRole::Border(Edges::LEFT), theme.border_color),
            part(scene, PartRole::Border(Edges::RIGHT), theme.border_color),
        ];

        let titlebar = scene.create_container();
        let titlebar_background = part(scene, PartRole::Titlebar, theme.titlebar_blurred);
        let button = Size::new(theme.button_size.min(theme.titlebar_height), theme.titlebar_height);
        let menu_button = scene.create_element(Button::new(button, ButtonTag::WindowMenu(window)));
        let mut label = Label::new(Size::default(), title);
        label.color = theme.text_blurred;
        let title = scene.create_element(label);
        let close_button = scene.create_element(Button::new(button, ButtonTag::WindowClose(window)));
        for node in [titlebar_background, menu_button, title, close_button] {
            add(scene, titlebar, node);
        }

        let resizebar = scene.create_container();
        let resize_sections = [
            part(scene, PartRole::Resize(Edges::BOTTOM_LEFT), theme.resizebar_color),
            part(scene, PartRole::Resize(Edges::BOTTOM), theme.resizebar_color),
            part(scene, PartRole::Resize(Edges::BOTTOM_RIGHT), theme.resizebar_color),
        ];
        for node in resize_sections {
            add(scene, resizebar, node);
        }

        Self {
            borders,
            titlebar,
            titlebar_background,
            menu_button,
            title,
            close_button,
            resizebar,
            resize_sections,
        }
    }

    fn nodes(&self) -> Vec<NodeId> {
        let mut nodes = self.borders.to_vec();
        nodes.push(self.titlebar);
        nodes.push(self.resizebar);
        nodes
    }

    /// Lays the decoration out around content of the given size.
    fn layout(&self, scene: &mut Scene, theme: &DecorationTheme, content: Size, shaded: bool) {
        let b = theme.border_width;
        let th = theme.titlebar_height;
        let rh = theme.resizebar_height;
        let width = content.width + 2 * b;
        let height = if shaded {
            2 * b + th
        } else {
            content.height + 2 * b + th + rh
        };

        let rects = [
            Rectangle::new(0, 0, width, b),
            Rectangle::new(0, height - b, width, b),
            Rectangle::new(0, b, b, height - 2 * b),
            Rectangle::new(width - b, b, b, height - 2 * b),
        ];
        for (node, rect) in self.borders.iter().zip(rects) {
            place_part(scene, *node, rect);
        }

        scene.set_position(self.titlebar, Point::new(b, b));
        place_part(scene, self.titlebar_background, Rectangle::new(0, 0, content.width, th));
        let button = theme.button_size.min(th);
        scene.set_position(self.menu_button, Point::new(0, 0));
        scene.set_position(self.close_button, Point::new(content.width - button, 0));
        scene.set_position(self.title, Point::new(button, 0));
        let title_size = Size::new((content.width - 2 * button).max(0), th);
        scene.update_element::<Label, _>(self.title, |label| label.size = title_size);

        scene.set_position(self.resizebar, Point::new(b, b + th + content.height));
        let corner = theme.resizebar_corner_width.min(content.width / 2);
        let sections = [
            Rectangle::new(0, 0, corner, rh),
            Rectangle::new(corner, 0, content.width - 2 * corner, rh),
            Rectangle::new(content.width - corner, 0, corner, rh),
        ];
        for (node, rect) in self.resize_sections.iter().zip(sections) {
            place_part(scene, *node, rect);
        }

        for border in self.borders {
            scene.set_visible(border, !shaded);
        }
        scene.set_visible(self.resizebar, !shaded);
        scene.set_visible(self.titlebar, true);
    }

    fn set_visible(&self, scene: &mut Scene, visible: bool) {
        for node in self.nodes() {
            scene.set_visible(node, visible);
        }
    }

    fn set_focused(&self, scene: &mut Scene, theme: &DecorationTheme, focused: bool) {
        let (background, text) = if focused {
            (theme.titlebar_focused, theme.text_focused)
        } else {
            (theme.titlebar_blurred, theme.text_blurred)
        };
        scene.update_element::<DecorationPart, _>(self.titlebar_background, |part| {
            part.color = background
        });
        scene.update_element::<Label, _>(self.title, |label| label.color = text);
    }

    fn destroy(&self, scene: &mut Scene) {
        for node in self.nodes() {
            scene.destroy(node);
        }
    }
}

fn add(scene: &mut Scene, parent: NodeId, child: NodeId) {
    if let Err(err) = scene.add_child(parent, child) {
        warn!("window: attaching {}: {}", child, err);
    }
}

fn place_part(scene: &mut Scene, node: NodeId, rect: Rectangle) {
    scene.set_position(node, rect.loc());
    let size = Size::new(rect.width.max(0), rect.height.max(0));
    scene.update_element::<DecorationPart, _>(node, |part| part.size = size);
}

#[derive(Debug)]
pub struct Window {
    id: WindowId,
    node: NodeId,
    content: Content,
    decoration: Option<Decoration>,
    theme: DecorationTheme,
    popups_node: NodeId,
    menu_node: NodeId,
    menu: Option<Menu<WindowMenuCommand>>,
    title: String,
    app_id: String,
    client: ClientIdentity,
    position: Point,
    state: WindowState,
    saved_geometry: Option<Rectangle>,
    activated: bool,
    workspace: Option<usize>,
    popups: Vec<PopupId>,
    mapped: bool,
}

impl Window {
    fn build(
        scene: &mut Scene,
        id: WindowId,
        content: Content,
        content_node: NodeId,
        theme: DecorationTheme,
        client: ClientIdentity,
    ) -> Self {
        let node = scene.create_container();
        let popups_node = scene.create_container();
        let menu_node = scene.create_container();
        add(scene, node, content_node);
        add(scene, node, popups_node);
        add(scene, node, menu_node);
        Self {
            id,
            node,
            content,
            decoration: None,
            theme,
            popups_node,
            menu_node,
            menu: None,
            title: String::new(),
            app_id: String::new(),
            client,
            position: Point::default(),
            state: WindowState::default(),
            saved_geometry: None,
            activated: false,
            workspace: None,
            popups: Vec::new(),
            mapped: false,
        }
    }

    /// A window for a client xdg_toplevel.
    pub fn new_client(
        scene: &mut Scene,
        id: WindowId,
        surface: SurfaceId,
        handle: Box<dyn ToplevelHandle>,
        client: ClientIdentity,
        theme: DecorationTheme,
    ) -> Self {
        let surface = ClientSurface::new(scene, surface);
        let content_node = surface.node();
        debug!("{} created for pid {}", id, client.pid);
        Self::build(
            scene,
            id,
            Content::Client { surface, handle },
            content_node,
            theme,
            client,
        )
    }

    /// A window whose content is a compositor-owned subtree.
    pub fn new_internal(
        scene: &mut Scene,
        id: WindowId,
        content_node: NodeId,
        keyboard: Option<NodeId>,
        size: Size,
        theme: DecorationTheme,
    ) -> Self {
        let client = ClientIdentity {
            pid: std::process::id() as libc::pid_t,
            // SAFETY: getuid/getgid cannot fail.
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
        };
        let mut window = Self::build(
            scene,
            id,
            Content::Internal {
                node: content_node,
                keyboard,
                size,
            },
            content_node,
            theme,
            client,
        );
        window.relayout(scene);
        window
    }

    pub fn id(&self) -> WindowId {
        self.id
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn popups_node(&self) -> NodeId {
        self.popups_node
    }

    pub fn is_internal(&self) -> bool {
        matches!(self.content, Content::Internal { .. })
    }

    pub fn surface_id(&self) -> Option<SurfaceId> {
        match &self.content {
            Content::Client { surface, .. } => Some(surface.id()),
            Content::Internal { .. } => None,
        }
    }

    pub fn content_node(&self) -> NodeId {
        match &self.content {
            Content::Client { surface, .. } => surface.node(),
            Content::Internal { node, .. } => *node,
        }
    }

    /// Leaf that receives keyboard focus when the window is activated.
    pub fn keyboard_node(&self) -> Option<NodeId> {
        match &self.content {
            Content::Client { surface, .. } => Some(surface.node()),
            Content::Internal { keyboard, .. } => *keyboard,
        }
    }

    pub fn client(&self) -> ClientIdentity {
        self.client
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, scene: &mut Scene, title: &str) {
        if self.title == title {
            return;
        }
        self.title = title.to_string();
        if let Some(decoration) = &self.decoration {
            let text = self.title.clone();
            scene.update_element::<Label, _>(decoration.title, |label| label.text = text);
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn set_app_id(&mut self, app_id: &str) {
        self.app_id = app_id.to_string();
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn saved_geometry(&self) -> Option<Rectangle> {
        self.saved_geometry
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    pub fn workspace(&self) -> Option<usize> {
        self.workspace
    }

    pub fn set_workspace(&mut self, workspace: Option<usize>) {
        self.workspace = workspace;
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn set_mapped(&mut self, mapped: bool) {
        self.mapped = mapped;
    }

    pub fn set_iconified(&mut self, iconified: bool) {
        self.state.iconified = iconified;
    }

    pub fn popups(&self) -> &[PopupId] {
        &self.popups
    }

    pub fn add_popup(&mut self, popup: PopupId) {
        self.popups.push(popup);
    }

    pub fn remove_popup(&mut self, popup: PopupId) {
        self.popups.retain(|p| *p != popup);
    }

    /// Whether the client attached a buffer yet (internal windows always are).
    pub fn has_content(&self) -> bool {
        !self.content_size().is_empty()
    }

    // -- Geometry ----------------------------------------------------------

    pub fn is_decorated(&self) -> bool {
        self.decoration.is_some()
    }

    fn decorations_shown(&self) -> bool {
        self.decoration.is_some() && !self.state.fullscreen
    }

    pub fn content_size(&self) -> Size {
        match &self.content {
            Content::Client { surface, .. } => surface.committed_size(),
            Content::Internal { size, .. } => *size,
        }
    }

    pub fn outer_size(&self) -> Size {
        let content = self.content_size();
        if !self.decorations_shown() {
            return content;
        }
        if self.state.shaded {
            let b = self.theme.border_width;
            Size::new(content.width + 2 * b, 2 * b + self.theme.titlebar_height)
        } else {
            self.theme.outer_size(content)
        }
    }

    /// Outer geometry, decorations included.
    pub fn geometry(&self) -> Rectangle {
        Rectangle::from_loc_and_size(self.position, self.outer_size())
    }

    pub fn position(&self) -> Point {
        self.position
    }

    /// Offset of the content within the window.
    pub fn content_offset(&self) -> Point {
        if self.decorations_shown() {
            Point::new(
                self.theme.border_width,
                self.theme.border_width + self.theme.titlebar_height,
            )
        } else {
            Point::default()
        }
    }

    /// Content size that makes the window `outer` large.
    fn content_size_for(&self, outer: Size, fullscreen: bool) -> Size {
        if fullscreen || self.decoration.is_none() {
            outer
        } else {
            self.theme.content_size(outer)
        }
    }

    pub fn set_position(&mut self, scene: &mut Scene, position: Point) {
        self.position = position;
        scene.set_position(self.node, position);
    }

    fn relayout(&mut self, scene: &mut Scene) {
        let offset = self.content_offset();
        let content_node = self.content_node();
        scene.set_position(content_node, offset);
        scene.set_position(self.popups_node, offset);
        scene.set_visible(content_node, !self.state.shaded);
        scene.set_visible(self.popups_node, !self.state.shaded);
        let content = self.content_size();
        if let Some(decoration) = &self.decoration {
            if self.state.fullscreen {
                decoration.set_visible(scene, false);
            } else {
                decoration.layout(scene, &self.theme, content, self.state.shaded);
            }
        }
    }

    /// Adds or removes server-side decorations.
    pub fn set_decorated(&mut self, scene: &mut Scene, decorated: bool) {
        if decorated == self.decoration.is_some() {
            return;
        }
        if decorated {
            let decoration = Decoration::new(scene, self.id, &self.theme, &self.title);
            let content = self.content_node();
            for border in decoration.borders {
                if let Err(err) = scene.insert_child(self.node, border, Placement::Below(content)) {
                    warn!("{}: attaching border: {}", self.id, err);
                }
            }
            if let Err(err) = scene.insert_child(
                self.node,
                decoration.titlebar,
                Placement::Below(content),
            ) {
                warn!("{}: attaching titlebar: {}", self.id, err);
            }
            if let Err(err) = scene.insert_child(
                self.node,
                decoration.resizebar,
                Placement::Above(content),
            ) {
                warn!("{}: attaching resize bar: {}", self.id, err);
            }
            decoration.set_focused(scene, &self.theme, self.activated);
            self.decoration = Some(decoration);
        } else if let Some(decoration) = self.decoration.take() {
            decoration.destroy(scene);
        }
        self.relayout(scene);
    }

    // -- State machine -----------------------------------------------------

    /// The state the window is heading to: the newest proposal, or the
    /// committed state if nothing is pending.
    pub fn target_state(&self) -> PendingState {
        if let Content::Client { surface, .. } = &self.content {
            if let Some(pending) = surface.pending_state() {
                return *pending;
            }
        }
        PendingState {
            maximized: self.state.maximized,
            fullscreen: self.state.fullscreen,
            geometry: None,
            anchor: Edges::empty(),
        }
    }

    pub fn has_pending_configure(&self) -> bool {
        match &self.content {
            Content::Client { surface, .. } => surface.has_pending_configure(),
            Content::Internal { .. } => false,
        }
    }

    fn capture_saved_geometry(&mut self) {
        if self.state.is_organic() && self.saved_geometry.is_none() {
            self.saved_geometry = Some(self.geometry());
            debug!("{}: saved geometry {}", self.id, self.geometry());
        }
    }

    pub fn request_maximized(&mut self, scene: &mut Scene, maximized: bool, usable: Rectangle) {
        let target = self.target_state();
        if maximized {
            if target.maximized && !target.fullscreen && self.geometry() == usable {
                return;
            }
            self.capture_saved_geometry();
            self.propose(
                scene,
                PendingState {
                    maximized: true,
                    fullscreen: false,
                    geometry: Some(usable),
                    anchor: Edges::empty(),
                },
            );
        } else {
            if !target.maximized {
                return;
            }
            let geometry = if target.fullscreen {
                target.geometry
            } else {
                Some(self.saved_geometry.unwrap_or_else(|| self.geometry()))
            };
            self.propose(
                scene,
                PendingState {
                    maximized: false,
                    fullscreen: target.fullscreen,
                    geometry,
                    anchor: Edges::empty(),
                },
            );
        }
    }

    pub fn request_fullscreen(&mut self, scene: &mut Scene, fullscreen: bool, output: Rectangle) {
        let target = self.target_state();
        if fullscreen {
            if target.fullscreen && self.geometry() == output {
                return;
            }
            self.capture_saved_geometry();
            self.propose(
                scene,
                PendingState {
                    maximized: false,
                    fullscreen: true,
                    geometry: Some(output),
                    anchor: Edges::empty(),
                },
            );
        } else {
            if !target.fullscreen {
                return;
            }
            let geometry = self.saved_geometry.unwrap_or_else(|| self.geometry());
            self.propose(
                scene,
                PendingState {
                    maximized: false,
                    fullscreen: false,
                    geometry: Some(geometry),
                    anchor: Edges::empty(),
                },
            );
        }
    }

    /// Asks for a new outer geometry while resizing from `anchor` edges.
    pub fn request_geometry(&mut self, scene: &mut Scene, geometry: Rectangle, anchor: Edges) {
        let target = self.target_state();
        self.propose(
            scene,
            PendingState {
                maximized: target.maximized,
                fullscreen: target.fullscreen,
                geometry: Some(geometry),
                anchor,
            },
        );
    }

    fn propose(&mut self, scene: &mut Scene, pending: PendingState) {
        let outer = pending
            .geometry
            .map(|g| g.size())
            .unwrap_or_else(|| self.outer_size());
        let content = self.content_size_for(outer, pending.fullscreen);
        match &mut self.content {
            Content::Client { surface, handle } => {
                let configure = ToplevelConfigure {
                    size: content,
                    maximized: pending.maximized,
                    fullscreen: pending.fullscreen,
                    activated: self.activated,
                    resizing: !pending.anchor.is_empty(),
                };
                let serial = handle.send_configure(&configure);
                surface.configured(serial, pending);
                debug!("{}: configure {} {:?}", self.id, serial, configure);
            }
            Content::Internal { size, .. } => {
                *size = content;
                self.apply(scene, pending);
            }
        }
    }

    /// Commits a proposed state locally. Returns true if maximized or
    /// fullscreen flipped.
    fn apply(&mut self, scene: &mut Scene, pending: PendingState) -> bool {
        let changed = self.state.maximized != pending.maximized
            || self.state.fullscreen != pending.fullscreen;
        self.state.maximized = pending.maximized;
        self.state.fullscreen = pending.fullscreen;
        if self.state.is_organic() && changed {
            self.saved_geometry = None;
        }
        self.relayout(scene);

        if let Some(geometry) = pending.geometry {
            let outer = self.outer_size();
            let x = if pending.anchor.contains(Edges::LEFT) {
                geometry.right() - outer.width
            } else {
                geometry.x
            };
            let y = if pending.anchor.contains(Edges::TOP) {
                geometry.bottom() - outer.height
            } else {
                geometry.y
            };
            self.set_position(scene, Point::new(x, y));
        }
        if changed {
            info!(
                "{}: maximized={} fullscreen={}",
                self.id, self.state.maximized, self.state.fullscreen
            );
        }
        changed
    }

    /// Handles a commit from the client: the serial it acknowledged and the
    /// size of its buffer.
    pub fn commit(
        &mut self,
        scene: &mut Scene,
        acked: Option<Serial>,
        size: Size,
    ) -> Result<WindowCommit, ProtocolError> {
        let before = self.geometry();
        let (commit, initial) = match &mut self.content {
            Content::Client { surface, handle } => match surface.commit(scene, acked, size) {
                Ok(commit) => {
                    let initial = commit.first && !surface.has_pending_configure();
                    (commit, initial)
                }
                Err(err) => {
                    warn!("{}: {}", self.id, err);
                    handle.post_error(&err);
                    return Err(err);
                }
            },
            Content::Internal { .. } => return Ok(WindowCommit::default()),
        };

        if initial {
            // Let the client pick its size.
            let pending = PendingState {
                geometry: None,
                ..self.target_state()
            };
            if let Content::Client { surface, handle } = &mut self.content {
                let configure = ToplevelConfigure {
                    activated: self.activated,
                    maximized: pending.maximized,
                    fullscreen: pending.fullscreen,
                    ..Default::default()
                };
                let serial = handle.send_configure(&configure);
                surface.configured(serial, pending);
            }
        }

        let mut state_changed = false;
        if let Some(pending) = commit.applied {
            state_changed = self.apply(scene, pending);
        } else if commit.size_changed {
            self.relayout(scene);
        }

        Ok(WindowCommit {
            first: commit.first,
            state_changed,
            geometry_changed: before != self.geometry(),
        })
    }

    /// Shade applies at once; no client round trip.
    pub fn set_shaded(&mut self, scene: &mut Scene, shaded: bool) {
        if self.state.shaded == shaded || self.decoration.is_none() {
            return;
        }
        self.state.shaded = shaded;
        self.relayout(scene);
        debug!("{}: shaded={}", self.id, shaded);
    }

    pub fn set_activated(&mut self, scene: &mut Scene, activated: bool) {
        if self.activated == activated {
            return;
        }
        self.activated = activated;
        if let Some(decoration) = &self.decoration {
            decoration.set_focused(scene, &self.theme, activated);
        }
        if let Content::Client { surface, .. } = &mut self.content {
            surface.set_activated(scene, activated);
            if surface.has_committed() {
                let pending = PendingState {
                    geometry: None,
                    anchor: Edges::empty(),
                    ..self.target_state()
                };
                self.propose(scene, pending);
            }
        }
    }

    /// Asks the client to close. Internal windows have nobody to ask and
    /// return false; their owner unmaps them.
    pub fn request_close(&self) -> bool {
        match &self.content {
            Content::Client { handle, .. } => {
                handle.send_close();
                true
            }
            Content::Internal { .. } => false,
        }
    }

    pub fn post_error(&self, error: &ProtocolError) {
        if let Content::Client { handle, .. } = &self.content {
            handle.post_error(error);
        }
    }

    // -- Window menu -------------------------------------------------------

    pub fn menu(&self) -> Option<&Menu<WindowMenuCommand>> {
        self.menu.as_ref()
    }

    pub fn menu_mut(&mut self) -> Option<&mut Menu<WindowMenuCommand>> {
        self.menu.as_mut()
    }

    /// Opens the window menu at `at` (window coordinates). Item enablement
    /// follows the live state; the move submenu lists every workspace but
    /// the window's own.
    pub fn show_menu(
        &mut self,
        scene: &mut Scene,
        ids: &mut IdAllocator,
        workspaces: &[String],
        at: Point,
    ) -> Option<NodeId> {
        self.hide_menu(scene);
        let state = self.target_state();
        let current = self.workspace;
        let targets: Vec<MenuItem<WindowMenuCommand>> = workspaces
            .iter()
            .enumerate()
            .filter(|(index, _)| Some(*index) != current)
            .map(|(index, name)| MenuItem::entry(name.clone(), WindowMenuCommand::MoveToWorkspace(index)))
            .collect();
        let has_targets = !targets.is_empty();
        let move_menu = Menu::new(ids, None, targets);

        let items = vec![
            MenuItem::entry("Shade", WindowMenuCommand::Shade)
                .enabled(!self.state.shaded && self.decoration.is_some()),
            MenuItem::entry("Unshade", WindowMenuCommand::Unshade).enabled(self.state.shaded),
            MenuItem::entry("Maximize", WindowMenuCommand::Maximize).enabled(!state.maximized),
            MenuItem::entry("Unmaximize", WindowMenuCommand::Unmaximize).enabled(state.maximized),
            MenuItem::entry("Fullscreen", WindowMenuCommand::Fullscreen),
            MenuItem::entry("Minimize", WindowMenuCommand::Minimize).enabled(!self.state.iconified),
            MenuItem::submenu("Move to workspace", move_menu).enabled(has_targets),
            MenuItem::entry("Close", WindowMenuCommand::Close),
        ];
        let mut menu = Menu::new(ids, Some(self.title.clone()), items);
        let node = menu.show(scene);
        scene.set_position(node, at);
        add(scene, self.menu_node, node);
        self.menu = Some(menu);
        Some(node)
    }

    pub fn hide_menu(&mut self, scene: &mut Scene) {
        if let Some(mut menu) = self.menu.take() {
            menu.hide(scene);
        }
    }

    pub fn destroy(mut self, scene: &mut Scene) {
        self.hide_menu(scene);
        scene.destroy(self.node);
        if let Content::Client { surface, .. } = self.content {
            surface.destroy(scene);
        }
    }
}
