//! Dock and Clip
//!
//! The Dock is a column (or row) of launcher tiles on the top layer.
//! Clicking a tile starts its command under the subprocess monitor; the
//! tile shows a running indicator while any window of a process it started
//! is mapped. The Clip is a single tile showing the current workspace name
//! with buttons to the previous and next workspace.

use log::{info, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::action::Action;
use crate::config::{ClipConfig, DockConfig, LauncherConfig, Positioning};
use crate::geometry::{Edges, Point, Size};
use crate::subprocess::{
    exec_command, watch_output, Subprocess, SubprocessCallbacks, SubprocessError, SubprocessId,
    SubprocessMonitor,
};
use crate::toolkit::element::{Button, ButtonTag, Color, Label, SolidRect};
use crate::toolkit::layer::LayerKind;
use crate::toolkit::panel::{Panel, PanelConfig};
use crate::toolkit::root::Root;
use crate::toolkit::{NodeId, PanelId, Scene};

pub const TILE_SIZE: i32 = 64;
const INDICATOR_SIZE: Size = Size::new(6, 6);

/// Button tags of dock tiles start here; the Clip uses the two below.
const DOCK_TAG_BASE: u64 = 0x0d0c_0000;
pub const CLIP_PREVIOUS: ButtonTag = ButtonTag::Custom(0x0c11_0001);
pub const CLIP_NEXT: ButtonTag = ButtonTag::Custom(0x0c11_0002);

fn attach(scene: &mut Scene, parent: NodeId, child: NodeId, at: Point) {
    if let Err(err) = scene.add_child(parent, child) {
        warn!("dock: {}", err);
    }
    scene.set_position(child, at);
}

/// Offset of tile `index` along the dock's edge.
fn tile_offset(positioning: &Positioning, index: usize) -> Point {
    let step = TILE_SIZE * index as i32;
    if positioning.edge.edges().intersects(Edges::LEFT | Edges::RIGHT) {
        Point::new(0, step)
    } else {
        Point::new(step, 0)
    }
}

/// Mapped-window count per launcher, shared with the subprocess callbacks.
type RunningCount = Rc<RefCell<usize>>;

#[derive(Debug)]
struct Tile {
    launcher: LauncherConfig,
    indicator: NodeId,
    running: RunningCount,
}

#[derive(Debug)]
pub struct Dock {
    panel: PanelId,
    tiles: Vec<Tile>,
    /// Live subprocesses started from tiles.
    launched: HashMap<SubprocessId, usize>,
}

impl Dock {
    pub fn new(root: &mut Root, config: &DockConfig) -> Self {
        let count = config.launchers.len().max(1) as i32;
        let vertical = config.positioning.edge.edges().intersects(Edges::LEFT | Edges::RIGHT);
        let size = if vertical {
            Size::new(TILE_SIZE, TILE_SIZE * count)
        } else {
            Size::new(TILE_SIZE * count, TILE_SIZE)
        };

        let scene = root.scene_mut();
        let node = scene.create_container();
        let backdrop = scene.create_element(SolidRect::new(size, Color(0xff40_4040)));
        attach(scene, node, backdrop, Point::default());

        let mut tiles = Vec::with_capacity(config.launchers.len());
        for (index, launcher) in config.launchers.iter().enumerate() {
            let offset = tile_offset(&config.positioning, index);
            let label = launcher
                .label
                .clone()
                .unwrap_or_else(|| launcher.command_line.clone());
            let button = Button::new(
                Size::new(TILE_SIZE, TILE_SIZE),
                ButtonTag::Custom(DOCK_TAG_BASE + index as u64),
            )
            .with_label(label);
            let button = scene.create_element(button);
            attach(scene, node, button, offset);

            let indicator = scene.create_element(SolidRect::new(INDICATOR_SIZE, Color::WHITE));
            attach(scene, node, indicator, offset.offset(2, TILE_SIZE - INDICATOR_SIZE.height - 2));
            scene.set_visible(indicator, false);

            tiles.push(Tile {
                launcher: launcher.clone(),
                indicator,
                running: Rc::new(RefCell::new(0)),
            });
        }

        let panel_config = PanelConfig {
            anchor: config.positioning.anchor(),
            ..PanelConfig::new(LayerKind::Top)
        };
        let id = root.ids_mut().panel();
        let panel = root.add_panel(Panel::new_server(id, node, size, panel_config));
        info!("⚓ Dock with {} launchers", tiles.len());
        Self {
            panel,
            tiles,
            launched: HashMap::new(),
        }
    }

    pub fn panel(&self) -> PanelId {
        self.panel
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// The launcher a button tag belongs to.
    pub fn tile_for(&self, tag: ButtonTag) -> Option<usize> {
        match tag {
            ButtonTag::Custom(raw) if raw >= DOCK_TAG_BASE => {
                let index = (raw - DOCK_TAG_BASE) as usize;
                (index < self.tiles.len()).then_some(index)
            }
            _ => None,
        }
    }

    pub fn is_running(&self, index: usize) -> bool {
        self.tiles
            .get(index)
            .map_or(false, |tile| *tile.running.borrow() > 0)
    }

    /// Starts the launcher's command and tracks its windows.
    pub fn launch(
        &mut self,
        index: usize,
        monitor: &Rc<RefCell<SubprocessMonitor>>,
    ) -> Result<Option<SubprocessId>, SubprocessError> {
        let Some(tile) = self.tiles.get(index) else {
            return Ok(None);
        };
        let process = Subprocess::spawn(exec_command(&tile.launcher.command_line)?)?;

        let mapped = Rc::clone(&tile.running);
        let unmapped = Rc::clone(&tile.running);
        let callbacks = SubprocessCallbacks {
            window_mapped: Some(Box::new(move |_| *mapped.borrow_mut() += 1)),
            window_unmapped: Some(Box::new(move |_| {
                let mut count = unmapped.borrow_mut();
                *count = count.saturating_sub(1);
            })),
            ..SubprocessCallbacks::default()
        };
        let id = monitor.borrow_mut().entrust(process, callbacks);
        self.launched.insert(id, index);
        Ok(Some(id))
    }

    /// Same as [`launch`](Self::launch), also watching the child's output
    /// on the event loop.
    pub fn launch_watched<D: 'static>(
        &mut self,
        index: usize,
        monitor: &Rc<RefCell<SubprocessMonitor>>,
        handle: &calloop::LoopHandle<'static, D>,
    ) -> Result<Option<SubprocessId>, SubprocessError> {
        let id = self.launch(index, monitor)?;
        if let Some(id) = id {
            watch_output(monitor, handle, id)?;
        }
        Ok(id)
    }

    /// A subprocess ended; the monitor already reported its windows.
    pub fn subprocess_terminated(&mut self, id: SubprocessId) {
        self.launched.remove(&id);
    }

    /// Shows or hides the running indicators.
    pub fn refresh(&self, scene: &mut Scene) {
        for tile in &self.tiles {
            let running = *tile.running.borrow() > 0;
            if scene.is_visible(tile.indicator) != running {
                scene.set_visible(tile.indicator, running);
            }
        }
    }
}

#[derive(Debug)]
pub struct Clip {
    panel: PanelId,
    label: NodeId,
}

impl Clip {
    pub fn new(root: &mut Root, config: &ClipConfig) -> Self {
        let size = Size::new(TILE_SIZE, TILE_SIZE);
        let arrow = Size::new(TILE_SIZE / 2, TILE_SIZE / 4);
        let name = root.current_workspace().name().to_string();

        let scene = root.scene_mut();
        let node = scene.create_container();
        let backdrop = scene.create_element(SolidRect::new(size, Color(0xff30_3030)));
        attach(scene, node, backdrop, Point::default());
        let label = scene.create_element(Label::new(Size::new(TILE_SIZE, TILE_SIZE / 2), name));
        attach(scene, node, label, Point::new(0, TILE_SIZE / 4));
        let previous = scene.create_element(Button::new(arrow, CLIP_PREVIOUS).with_label("<"));
        attach(scene, node, previous, Point::new(0, TILE_SIZE - arrow.height));
        let next = scene.create_element(Button::new(arrow, CLIP_NEXT).with_label(">"));
        attach(scene, node, next, Point::new(arrow.width, TILE_SIZE - arrow.height));

        let panel_config = PanelConfig {
            anchor: config.positioning.anchor(),
            ..PanelConfig::new(LayerKind::Top)
        };
        let id = root.ids_mut().panel();
        let panel = root.add_panel(Panel::new_server(id, node, size, panel_config));
        Self { panel, label }
    }

    pub fn panel(&self) -> PanelId {
        self.panel
    }

    /// The action a clip button stands for.
    pub fn action_for(&self, tag: ButtonTag) -> Option<Action> {
        match tag {
            CLIP_PREVIOUS => Some(Action::WorkspacePrevious),
            CLIP_NEXT => Some(Action::WorkspaceNext),
            _ => None,
        }
    }

    pub fn label(&self, scene: &Scene) -> Option<String> {
        scene.element::<Label>(self.label).map(|l| l.text.clone())
    }

    /// Shows the current workspace name.
    pub fn update(&self, root: &mut Root) {
        let name = root.current_workspace().name().to_string();
        root.scene_mut()
            .update_element::<Label, _>(self.label, |label| label.text = name);
    }
}
