//! Edge-anchored panels (wlr-layer-shell surfaces, the Dock and the Clip).
//!
//! A panel is placed once per output it appears on. Panels targeted at an
//! output appear only there; untargeted client panels are mirrored on every
//! output, with the configure size taken from the first one.

use log::{debug, warn};
use std::collections::HashMap;

use crate::geometry::{Edges, Point, Rectangle, Size};
use crate::protocol::{AckOutcome, ConfigureQueue, LayerSurfaceHandle, ProtocolError, Serial};
use crate::toolkit::layer::LayerKind;
use crate::toolkit::surface::SurfaceElement;
use crate::toolkit::{NodeId, OutputId, PanelId, Scene, SurfaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Margins {
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
    pub left: i32,
}

impl Margins {
    pub fn on(&self, edge: Edges) -> i32 {
        if edge == Edges::TOP {
            self.top
        } else if edge == Edges::BOTTOM {
            self.bottom
        } else if edge == Edges::LEFT {
            self.left
        } else if edge == Edges::RIGHT {
            self.right
        } else {
            0
        }
    }
}

/// Double-buffered layer-surface state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PanelConfig {
    pub layer: LayerKind,
    pub anchor: Edges,
    /// Desired size; zero on an axis means "stretch between both anchors".
    pub size: Size,
    /// > 0 reserves space, 0 avoids other zones, < 0 ignores them.
    pub exclusive_zone: i32,
    pub margins: Margins,
    /// Output the client asked for, if any.
    pub output: Option<OutputId>,
}

impl PanelConfig {
    pub fn new(layer: LayerKind) -> Self {
        Self {
            layer,
            anchor: Edges::empty(),
            size: Size::default(),
            exclusive_zone: 0,
            margins: Margins::default(),
            output: None,
        }
    }

    /// A zero extent needs both opposite anchors.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let both = |edges: Edges| self.anchor.contains(edges);
        if (self.size.width == 0 && !both(Edges::LEFT | Edges::RIGHT))
            || (self.size.height == 0 && !both(Edges::TOP | Edges::BOTTOM))
        {
            return Err(ProtocolError::InvalidLayerSize {
                size: self.size,
                anchors: self.anchor,
            });
        }
        Ok(())
    }
}

/// Places one panel on an output.
///
/// `usable` is the area left by the panels placed before this one; it
/// shrinks by the exclusive zone (plus the margin on that edge) when the
/// zone is positive and the anchors single out one edge.
pub fn place_panel(config: &PanelConfig, full: Rectangle, usable: &mut Rectangle) -> Rectangle {
    let bounds = if config.exclusive_zone < 0 { full } else { *usable };
    let anchor = config.anchor;
    let m = config.margins;

    let (x, width) = place_axis(
        bounds.x,
        bounds.width,
        config.size.width,
        anchor.contains(Edges::LEFT),
        anchor.contains(Edges::RIGHT),
        m.left,
        m.right,
    );
    let (y, height) = place_axis(
        bounds.y,
        bounds.height,
        config.size.height,
        anchor.contains(Edges::TOP),
        anchor.contains(Edges::BOTTOM),
        m.top,
        m.bottom,
    );

    if config.exclusive_zone > 0 {
        if let Some(edge) = anchor.exclusive_edge() {
            *usable = usable.shrink_edge(edge, config.exclusive_zone + m.on(edge));
        }
    }
    Rectangle::new(x, y, width, height)
}

fn place_axis(
    start: i32,
    extent: i32,
    desired: i32,
    low: bool,
    high: bool,
    low_margin: i32,
    high_margin: i32,
) -> (i32, i32) {
    match (low, high) {
        (true, true) if desired == 0 => (
            start + low_margin,
            (extent - low_margin - high_margin).max(0),
        ),
        (true, false) => (start + low_margin, desired),
        (false, true) => (start + extent - high_margin - desired, desired),
        _ => (start + (extent - desired) / 2, desired),
    }
}

#[derive(Debug)]
enum PanelContent {
    Client {
        surface: SurfaceId,
        handle: Box<dyn LayerSurfaceHandle>,
        configures: ConfigureQueue<Size>,
        committed_size: Size,
        /// Last configured size.
        configured: Option<Size>,
    },
    /// A compositor-owned subtree (Dock, Clip); shown on one output.
    Server { node: NodeId, size: Size },
}

#[derive(Debug, Clone, Copy)]
struct PanelPlacement {
    output: OutputId,
    node: NodeId,
    geometry: Rectangle,
}

/// What a layer-surface commit changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PanelCommit {
    pub first: bool,
    pub config_changed: bool,
    pub layer_changed: bool,
    pub mapped_changed: bool,
}

#[derive(Debug)]
pub struct Panel {
    id: PanelId,
    config: PanelConfig,
    pending: PanelConfig,
    content: PanelContent,
    placements: Vec<PanelPlacement>,
    committed_once: bool,
    mapped: bool,
}

impl Panel {
    pub fn new_client(
        id: PanelId,
        surface: SurfaceId,
        layer: LayerKind,
        output: Option<OutputId>,
        handle: Box<dyn LayerSurfaceHandle>,
    ) -> Self {
        let config = PanelConfig {
            output,
            ..PanelConfig::new(layer)
        };
        Self {
            id,
            config,
            pending: config,
            content: PanelContent::Client {
                surface,
                handle,
                configures: ConfigureQueue::new(),
                committed_size: Size::default(),
                configured: None,
            },
            placements: Vec::new(),
            committed_once: false,
            mapped: false,
        }
    }

    /// A panel around compositor-drawn content of a fixed size.
    pub fn new_server(id: PanelId, node: NodeId, size: Size, config: PanelConfig) -> Self {
        let config = PanelConfig { size, ..config };
        Self {
            id,
            config,
            pending: config,
            content: PanelContent::Server { node, size },
            placements: Vec::new(),
            committed_once: true,
            mapped: true,
        }
    }

    pub fn id(&self) -> PanelId {
        self.id
    }

    pub fn config(&self) -> &PanelConfig {
        &self.config
    }

    pub fn layer(&self) -> LayerKind {
        self.config.layer
    }

    /// Pending state, applied on the next commit.
    pub fn pending_mut(&mut self) -> &mut PanelConfig {
        &mut self.pending
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    pub fn is_client(&self) -> bool {
        matches!(self.content, PanelContent::Client { .. })
    }

    pub fn surface_id(&self) -> Option<SurfaceId> {
        match &self.content {
            PanelContent::Client { surface, .. } => Some(*surface),
            PanelContent::Server { .. } => None,
        }
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.placements.iter().map(|p| p.node)
    }

    pub fn node_on(&self, output: OutputId) -> Option<NodeId> {
        self.placements.iter().find(|p| p.output == output).map(|p| p.node)
    }

    pub fn geometry_on(&self, output: OutputId) -> Option<Rectangle> {
        self.placements
            .iter()
            .find(|p| p.output == output)
            .map(|p| p.geometry)
    }

    /// Outputs this panel belongs on, given the layout's outputs in order.
    fn target_outputs(&self, outputs: &[(OutputId, Rectangle)]) -> Vec<OutputId> {
        match (self.config.output, &self.content) {
            (Some(output), _) => outputs
                .iter()
                .filter(|(id, _)| *id == output)
                .map(|(id, _)| *id)
                .collect(),
            (None, PanelContent::Server { .. }) => outputs.iter().take(1).map(|(id, _)| *id).collect(),
            (None, PanelContent::Client { .. }) => outputs.iter().map(|(id, _)| *id).collect(),
        }
    }

    /// Adds and removes per-output placements under `parent` to match the
    /// outputs present.
    pub fn sync_outputs(&mut self, scene: &mut Scene, parent: NodeId, outputs: &[(OutputId, Rectangle)]) {
        let targets = self.target_outputs(outputs);
        let mut kept = Vec::new();
        for placement in self.placements.drain(..) {
            if targets.contains(&placement.output) {
                kept.push(placement);
            } else {
                debug!("{}: leaving {}", self.id, placement.output);
                match &self.content {
                    PanelContent::Client { .. } => scene.destroy(placement.node),
                    PanelContent::Server { .. } => scene.detach(placement.node),
                }
            }
        }
        self.placements = kept;

        for output in targets {
            if self.placements.iter().any(|p| p.output == output) {
                continue;
            }
            let node = match &self.content {
                PanelContent::Client {
                    surface,
                    committed_size,
                    ..
                } => {
                    let mut element = SurfaceElement::new(*surface);
                    element.set_size(*committed_size);
                    scene.create_element(element)
                }
                PanelContent::Server { node, .. } => *node,
            };
            if let Err(err) = scene.add_child(parent, node) {
                warn!("{}: placing on {}: {}", self.id, output, err);
                continue;
            }
            scene.set_visible(node, self.mapped);
            self.placements.push(PanelPlacement {
                output,
                node,
                geometry: Rectangle::default(),
            });
        }
    }

    /// Moves every placement into `parent`, keeping their order.
    pub fn reparent(&mut self, scene: &mut Scene, parent: NodeId) {
        for placement in &self.placements {
            scene.detach(placement.node);
            if let Err(err) = scene.add_child(parent, placement.node) {
                warn!("{}: reparenting: {}", self.id, err);
            }
        }
    }

    /// Places the panel on `output` and updates that output's usable area.
    pub fn arrange_on(
        &mut self,
        scene: &mut Scene,
        output: OutputId,
        full: Rectangle,
        usable: &mut Rectangle,
    ) {
        let Some(index) = self.placements.iter().position(|p| p.output == output) else {
            return;
        };
        if !self.committed_once {
            return;
        }
        let geometry = place_panel(&self.config, full, usable);
        let placement = &mut self.placements[index];
        placement.geometry = geometry;
        scene.set_position(placement.node, geometry.loc());
    }

    /// Sends a configure if the size computed for the first placement
    /// differs from the last one sent.
    pub fn configure_if_needed(&mut self) -> Option<Serial> {
        let size = self.placements.first()?.geometry.size();
        let PanelContent::Client {
            handle,
            configures,
            configured,
            ..
        } = &mut self.content
        else {
            return None;
        };
        if !self.committed_once || *configured == Some(size) {
            return None;
        }
        let serial = handle.send_configure(size);
        configures.push(serial, size);
        *configured = Some(size);
        debug!("{}: configure {} {}", self.id, serial, size);
        Some(serial)
    }

    /// Applies a client commit.
    pub fn commit(
        &mut self,
        scene: &mut Scene,
        acked: Option<Serial>,
        size: Size,
    ) -> Result<PanelCommit, ProtocolError> {
        let PanelContent::Client {
            surface,
            handle,
            configures,
            committed_size,
            ..
        } = &mut self.content
        else {
            return Ok(PanelCommit::default());
        };

        if let Err(err) = self.pending.validate() {
            warn!("{}: {}", self.id, err);
            handle.post_error(&err);
            return Err(err);
        }
        if let Some(serial) = acked {
            if let AckOutcome::Unknown { pending } = configures.ack(serial) {
                let err = ProtocolError::InvalidAckSerial {
                    surface: *surface,
                    acked: serial,
                    pending,
                };
                handle.post_error(&err);
                return Err(err);
            }
        }

        let first = !self.committed_once;
        self.committed_once = true;
        let config_changed = first || self.pending != self.config;
        let layer_changed = self.pending.layer != self.config.layer;
        self.config = self.pending;

        if !configures.has_pending() && size != *committed_size {
            *committed_size = size;
            for placement in &self.placements {
                scene.update_element::<SurfaceElement, _>(placement.node, |e| e.set_size(size));
            }
        }

        let mapped = configures.last_acked().is_some() && !committed_size.is_empty();
        let mapped_changed = mapped != self.mapped;
        if mapped_changed {
            self.mapped = mapped;
            for placement in &self.placements {
                scene.set_visible(placement.node, mapped);
            }
            debug!("{}: mapped={}", self.id, mapped);
        }

        Ok(PanelCommit {
            first,
            config_changed,
            layer_changed,
            mapped_changed,
        })
    }

    /// Tells the client its surface is gone (its output went away).
    pub fn close(&self) {
        if let PanelContent::Client { handle, .. } = &self.content {
            handle.send_closed();
        }
    }

    pub fn destroy(mut self, scene: &mut Scene) {
        for placement in self.placements.drain(..) {
            scene.destroy(placement.node);
        }
        if let PanelContent::Server { node, .. } = self.content {
            if scene.contains(node) {
                scene.destroy(node);
            }
        }
    }

    /// Size of the compositor-drawn content.
    pub fn server_size(&self) -> Option<Size> {
        match &self.content {
            PanelContent::Server { size, .. } => Some(*size),
            PanelContent::Client { .. } => None,
        }
    }

    /// Position of the placement on `output`, in layout coordinates.
    pub fn position_on(&self, output: OutputId) -> Option<Point> {
        self.geometry_on(output).map(|g| g.loc())
    }
}

/// Panels by id, shared by the layers of every workspace.
pub type PanelMap = HashMap<PanelId, Panel>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::headless::{HeadlessLayerSurface, SerialCounter};

    const OUTPUT: Rectangle = Rectangle::new(0, 0, 1920, 1080);

    fn config(anchor: Edges, size: Size, zone: i32) -> PanelConfig {
        PanelConfig {
            anchor,
            size,
            exclusive_zone: zone,
            ..PanelConfig::new(LayerKind::Top)
        }
    }

    #[test]
    fn test_top_bar_reserves_its_height() {
        let mut usable = OUTPUT;
        let bar = config(Edges::TOP | Edges::LEFT | Edges::RIGHT, Size::new(0, 24), 24);
        let geometry = place_panel(&bar, OUTPUT, &mut usable);
        assert_eq!(geometry, Rectangle::new(0, 0, 1920, 24));
        assert_eq!(usable, Rectangle::new(0, 24, 1920, 1056));

        let side = config(Edges::LEFT, Size::new(64, 200), 64);
        let geometry = place_panel(&side, OUTPUT, &mut usable);
        assert_eq!(geometry, Rectangle::new(0, 24 + (1056 - 200) / 2, 64, 200));
        assert_eq!(usable, Rectangle::new(64, 24, 1856, 1056));
    }

    #[test]
    fn test_zone_modes() {
        let mut usable = Rectangle::new(0, 24, 1920, 1056);
        // Zero zone: placed within what is left.
        let dock = config(Edges::TOP | Edges::RIGHT, Size::new(64, 64), 0);
        assert_eq!(
            place_panel(&dock, OUTPUT, &mut usable),
            Rectangle::new(1856, 24, 64, 64)
        );
        // Negative zone: against the full output.
        let overlay = config(Edges::TOP | Edges::RIGHT, Size::new(64, 64), -1);
        assert_eq!(
            place_panel(&overlay, OUTPUT, &mut usable),
            Rectangle::new(1856, 0, 64, 64)
        );
        assert_eq!(usable, Rectangle::new(0, 24, 1920, 1056));
    }

    #[test]
    fn test_margins_and_fill() {
        let mut usable = OUTPUT;
        let mut background = config(Edges::all(), Size::default(), -1);
        assert_eq!(place_panel(&background, OUTPUT, &mut usable), OUTPUT);

        background.margins = Margins {
            top: 10,
            right: 20,
            bottom: 30,
            left: 40,
        };
        assert_eq!(
            place_panel(&background, OUTPUT, &mut usable),
            Rectangle::new(40, 10, 1860, 1040)
        );

        let mut bottom = config(Edges::BOTTOM, Size::new(100, 30), 30);
        bottom.margins.bottom = 5;
        assert_eq!(
            place_panel(&bottom, OUTPUT, &mut usable),
            Rectangle::new(910, 1045, 100, 30)
        );
        assert_eq!(usable, Rectangle::new(0, 0, 1920, 1045));
    }

    #[test]
    fn test_zero_size_needs_opposite_anchors() {
        assert!(config(Edges::TOP, Size::new(0, 24), 0).validate().is_err());
        assert!(config(Edges::TOP | Edges::LEFT | Edges::RIGHT, Size::new(0, 24), 0)
            .validate()
            .is_ok());
        assert!(config(Edges::LEFT | Edges::RIGHT, Size::new(100, 0), 0)
            .validate()
            .is_err());
    }

    #[test]
    fn test_client_panel_lifecycle() {
        let mut scene = Scene::new();
        let parent = scene.create_container();
        let serials = SerialCounter::new();
        let handle = HeadlessLayerSurface::new(&serials);
        let output = OutputId::from_raw(1);
        let outputs = [(output, OUTPUT)];

        let mut panel = Panel::new_client(
            PanelId::from_raw(1),
            SurfaceId::from_raw(9),
            LayerKind::Top,
            None,
            Box::new(handle.clone()),
        );
        panel.sync_outputs(&mut scene, parent, &outputs);
        *panel.pending_mut() = config(Edges::TOP | Edges::LEFT | Edges::RIGHT, Size::new(0, 24), 24);

        // Nothing is configured before the initial commit.
        assert_eq!(panel.configure_if_needed(), None);
        let commit = panel.commit(&mut scene, None, Size::default()).unwrap();
        assert!(commit.first && commit.config_changed);

        let mut usable = OUTPUT;
        panel.arrange_on(&mut scene, output, OUTPUT, &mut usable);
        let serial = panel.configure_if_needed().unwrap();
        assert_eq!(handle.last_configure(), Some((serial, Size::new(1920, 24))));
        assert_eq!(panel.configure_if_needed(), None);

        let commit = panel.commit(&mut scene, Some(serial), Size::new(1920, 24)).unwrap();
        assert!(commit.mapped_changed);
        assert!(panel.is_mapped());
        let node = panel.node_on(output).unwrap();
        assert!(scene.is_visible(node));
        assert_eq!(scene.dimensions(node).size(), Size::new(1920, 24));
    }

    #[test]
    fn test_untargeted_client_panel_is_mirrored() {
        let mut scene = Scene::new();
        let parent = scene.create_container();
        let serials = SerialCounter::new();
        let left = OutputId::from_raw(1);
        let right = OutputId::from_raw(2);
        let outputs = [
            (left, Rectangle::new(0, 0, 1920, 1080)),
            (right, Rectangle::new(1920, 0, 1280, 1024)),
        ];
        let mut panel = Panel::new_client(
            PanelId::from_raw(1),
            SurfaceId::from_raw(9),
            LayerKind::Bottom,
            None,
            Box::new(HeadlessLayerSurface::new(&serials)),
        );
        panel.sync_outputs(&mut scene, parent, &outputs);
        assert_eq!(panel.nodes().count(), 2);

        panel.sync_outputs(&mut scene, parent, &outputs[..1]);
        assert_eq!(panel.nodes().count(), 1);
        assert!(panel.node_on(right).is_none());
        scene.check_invariants().unwrap();
    }
}
