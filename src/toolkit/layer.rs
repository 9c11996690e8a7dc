//! Z-levels holding panels
//!
//! A workspace has one [`Layer`] per [`LayerKind`]. Each layer keeps its
//! panels in insertion order. [`arrange_layers`] places every panel on every
//! output it appears on, subtracting exclusive zones as it goes, and
//! returns each output's usable area.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::geometry::Rectangle;
use crate::toolkit::panel::{Panel, PanelMap};
use crate::toolkit::{NodeId, OutputId, PanelId, Scene};

/// Layer-shell z-levels, bottom to top.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LayerKind {
    Background,
    Bottom,
    Top,
    Overlay,
}

impl LayerKind {
    pub const ALL: [LayerKind; 4] = [
        LayerKind::Background,
        LayerKind::Bottom,
        LayerKind::Top,
        LayerKind::Overlay,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayerKind::Background => "background",
            LayerKind::Bottom => "bottom",
            LayerKind::Top => "top",
            LayerKind::Overlay => "overlay",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct Layer {
    kind: LayerKind,
    node: NodeId,
    panels: Vec<PanelId>,
}

impl Layer {
    pub fn new(scene: &mut Scene, kind: LayerKind) -> Self {
        Self {
            kind,
            node: scene.create_container(),
            panels: Vec::new(),
        }
    }

    pub fn kind(&self) -> LayerKind {
        self.kind
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn panels(&self) -> &[PanelId] {
        &self.panels
    }

    pub fn contains(&self, panel: PanelId) -> bool {
        self.panels.contains(&panel)
    }

    /// Adds a new panel, creating its per-output placements.
    pub fn add_panel(&mut self, scene: &mut Scene, panel: &mut Panel, outputs: &[(OutputId, Rectangle)]) {
        debug!("{} layer: adding {}", self.kind, panel.id());
        self.panels.push(panel.id());
        panel.sync_outputs(scene, self.node, outputs);
    }

    /// Takes over a panel that already has placements elsewhere.
    pub fn adopt_panel(&mut self, scene: &mut Scene, panel: &mut Panel) {
        self.panels.push(panel.id());
        panel.reparent(scene, self.node);
    }

    /// Forgets the panel; its nodes are the caller's to move or destroy.
    pub fn remove_panel(&mut self, panel: PanelId) -> bool {
        let before = self.panels.len();
        self.panels.retain(|p| *p != panel);
        before != self.panels.len()
    }

    pub fn take_panels(&mut self) -> Vec<PanelId> {
        std::mem::take(&mut self.panels)
    }

    /// Adds or drops placements after the output layout changed.
    pub fn sync_outputs(&self, scene: &mut Scene, panels: &mut PanelMap, outputs: &[(OutputId, Rectangle)]) {
        for id in &self.panels {
            if let Some(panel) = panels.get_mut(id) {
                panel.sync_outputs(scene, self.node, outputs);
            }
        }
    }

    /// Places this layer's panels on one output.
    pub fn arrange(
        &self,
        scene: &mut Scene,
        panels: &mut PanelMap,
        output: OutputId,
        full: Rectangle,
        usable: &mut Rectangle,
    ) {
        for id in &self.panels {
            if let Some(panel) = panels.get_mut(id) {
                panel.arrange_on(scene, output, full, usable);
            }
        }
    }
}

/// Arranges all layers on all outputs and configures panels whose size
/// changed. Exclusive zones are claimed from the top layer down.
pub fn arrange_layers(
    scene: &mut Scene,
    layers: &[Layer],
    panels: &mut PanelMap,
    outputs: &[(OutputId, Rectangle)],
) -> HashMap<OutputId, Rectangle> {
    let mut order: Vec<&Layer> = layers.iter().collect();
    order.sort_by_key(|layer| std::cmp::Reverse(layer.kind()));

    let mut usable_areas = HashMap::new();
    for (output, full) in outputs {
        let mut usable = *full;
        for layer in &order {
            layer.arrange(scene, panels, *output, *full, &mut usable);
        }
        debug!("{}: usable area {}", output, usable);
        usable_areas.insert(*output, usable);
    }

    for layer in &order {
        for id in layer.panels() {
            if let Some(panel) = panels.get_mut(id) {
                panel.configure_if_needed();
            }
        }
    }
    usable_areas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Edges, Size};
    use crate::toolkit::panel::PanelConfig;
    use proptest::prelude::*;

    const OUTPUT: Rectangle = Rectangle::new(0, 0, 1920, 1080);

    fn server_panel(id: u64, scene: &mut Scene, layer: LayerKind, anchor: Edges, size: Size, zone: i32) -> Panel {
        let node = scene.create_container();
        let config = PanelConfig {
            anchor,
            exclusive_zone: zone,
            ..PanelConfig::new(layer)
        };
        Panel::new_server(PanelId::from_raw(id), node, size, config)
    }

    fn layers(scene: &mut Scene) -> Vec<Layer> {
        LayerKind::ALL.iter().map(|kind| Layer::new(scene, *kind)).collect()
    }

    #[test]
    fn test_exclusive_zones_accumulate() {
        let mut scene = Scene::new();
        let mut layers = layers(&mut scene);
        let mut panels = PanelMap::new();
        let output = OutputId::from_raw(1);
        let outputs = [(output, OUTPUT)];

        let mut bar = server_panel(
            1,
            &mut scene,
            LayerKind::Top,
            Edges::TOP | Edges::LEFT | Edges::RIGHT,
            Size::new(1920, 24),
            24,
        );
        layers[LayerKind::Top.index()].add_panel(&mut scene, &mut bar, &outputs);
        panels.insert(bar.id(), bar);
        let usable = arrange_layers(&mut scene, &layers, &mut panels, &outputs);
        assert_eq!(usable[&output], Rectangle::new(0, 24, 1920, 1056));

        let mut side = server_panel(2, &mut scene, LayerKind::Bottom, Edges::LEFT, Size::new(64, 400), 64);
        layers[LayerKind::Bottom.index()].add_panel(&mut scene, &mut side, &outputs);
        panels.insert(side.id(), side);
        let usable = arrange_layers(&mut scene, &layers, &mut panels, &outputs);
        assert_eq!(usable[&output], Rectangle::new(64, 24, 1856, 1056));

        let side = &panels[&PanelId::from_raw(2)];
        assert_eq!(
            side.geometry_on(output),
            Some(Rectangle::new(0, 24 + (1056 - 400) / 2, 64, 400))
        );
    }

    #[test]
    fn test_server_panel_lives_on_first_output() {
        let mut scene = Scene::new();
        let mut layer = Layer::new(&mut scene, LayerKind::Top);
        let outputs = [
            (OutputId::from_raw(1), OUTPUT),
            (OutputId::from_raw(2), Rectangle::new(1920, 0, 1920, 1080)),
        ];
        let mut dock = server_panel(1, &mut scene, LayerKind::Top, Edges::RIGHT, Size::new(64, 64), 0);
        layer.add_panel(&mut scene, &mut dock, &outputs);
        assert_eq!(dock.nodes().count(), 1);
        assert!(dock.node_on(OutputId::from_raw(1)).is_some());

        let mut other = Layer::new(&mut scene, LayerKind::Top);
        layer.remove_panel(dock.id());
        other.adopt_panel(&mut scene, &mut dock);
        assert_eq!(scene.children(other.node()).len(), 1);
        assert!(scene.children(layer.node()).is_empty());
        scene.check_invariants().unwrap();
    }

    proptest! {
        #[test]
        fn prop_exclusive_zones_never_exceed_output(
            zones in proptest::collection::vec((0usize..4, 0i32..800), 0..12)
        ) {
            let mut scene = Scene::new();
            let mut layers = layers(&mut scene);
            let mut panels = PanelMap::new();
            let output = OutputId::from_raw(1);
            let outputs = [(output, OUTPUT)];
            let edges = [Edges::TOP, Edges::BOTTOM, Edges::LEFT, Edges::RIGHT];

            for (i, (edge, zone)) in zones.iter().enumerate() {
                let mut panel = server_panel(i as u64 + 1, &mut scene, LayerKind::Top, edges[*edge], Size::new(10, 10), *zone);
                layers[LayerKind::Top.index()].add_panel(&mut scene, &mut panel, &outputs);
                panels.insert(panel.id(), panel);
            }
            let usable = arrange_layers(&mut scene, &layers, &mut panels, &outputs)[&output];

            prop_assert!(usable.width >= 0 && usable.height >= 0);
            prop_assert!(usable.x >= OUTPUT.x && usable.right() <= OUTPUT.right());
            prop_assert!(usable.y >= OUTPUT.y && usable.bottom() <= OUTPUT.bottom());
            let horizontal: i32 = OUTPUT.width - usable.width;
            let vertical: i32 = OUTPUT.height - usable.height;
            prop_assert!(horizontal <= OUTPUT.width && vertical <= OUTPUT.height);
        }
    }
}
