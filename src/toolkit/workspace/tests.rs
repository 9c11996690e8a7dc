//! Unit tests for workspaces
//!
//! Stacking, activation, drag sessions and the reaction to usable-area
//! changes, driven through headless toplevels.

use super::*;
use crate::decoration::DecorationTheme;
use crate::geometry::{Edges, Point, PointF, Rectangle, Size};
use crate::protocol::headless::{HeadlessToplevel, SerialCounter};
use crate::toolkit::element::{ButtonEvent, ButtonState, Color, SceneEvent, BTN_RIGHT};
use crate::toolkit::panel::{Panel, PanelConfig, PanelMap};
use crate::toolkit::window::{ClientIdentity, Window};
use crate::toolkit::{OutputId, PanelId, Scene, SurfaceId, WindowId};
use anyhow::Result;

const OUTPUT: Rectangle = Rectangle::new(0, 0, 1920, 1080);

struct Fixture {
    scene: Scene,
    windows: WindowMap,
    panels: PanelMap,
    serials: SerialCounter,
    workspace: Workspace,
}

impl Fixture {
    fn new() -> Self {
        let mut scene = Scene::new();
        let mut windows = WindowMap::new();
        let mut panels = PanelMap::new();
        let mut workspace = Workspace::new(&mut scene, 0, "Main", Color::BLACK, Size::new(50, 40));
        workspace.set_outputs(
            &mut scene,
            &mut windows,
            &mut panels,
            &[(OutputId::from_raw(1), OUTPUT)],
        );
        workspace.set_input_enabled(&mut scene, &windows, true);
        Self {
            scene,
            windows,
            panels,
            serials: SerialCounter::new(),
            workspace,
        }
    }

    /// Creates an undecorated client window with a committed buffer.
    fn window(&mut self, id: u64, size: Size) -> Result<(WindowId, HeadlessToplevel)> {
        let handle = HeadlessToplevel::new(&self.serials);
        let id = WindowId::from_raw(id);
        let mut window = Window::new_client(
            &mut self.scene,
            id,
            SurfaceId::from_raw(id.raw()),
            Box::new(handle.clone()),
            ClientIdentity::default(),
            DecorationTheme::default(),
        );
        window.commit(&mut self.scene, None, Size::default())?;
        let (serial, _) = handle.last_configure().expect("initial configure");
        window.commit(&mut self.scene, Some(serial), size)?;
        self.windows.insert(id, window);
        Ok((id, handle))
    }

    fn map(&mut self, id: WindowId) {
        self.workspace.map_window(&mut self.scene, &mut self.windows, id);
    }

    /// Acks the newest configure with the size it asked for.
    fn ack(&mut self, id: WindowId, handle: &HeadlessToplevel) -> Result<()> {
        let (serial, configure) = handle.last_configure().expect("configure");
        let window = self.windows.get_mut(&id).expect("window");
        window.commit(&mut self.scene, Some(serial), configure.size)?;
        Ok(())
    }
}

#[test]
fn test_map_activates_and_focuses_top() -> Result<()> {
    let mut f = Fixture::new();
    let (a, _) = f.window(1, Size::new(400, 300))?;
    let (b, _) = f.window(2, Size::new(400, 300))?;
    f.map(a);
    f.map(b);

    assert_eq!(f.workspace.windows(), &[a, b]);
    assert_eq!(f.workspace.activated(), Some(b));
    assert!(f.windows[&b].is_activated());
    assert!(!f.windows[&a].is_activated());
    assert_eq!(f.scene.keyboard_focus(), f.windows[&b].keyboard_node());

    assert!(f.workspace.unmap_window(&mut f.scene, &mut f.windows, b));
    assert_eq!(f.workspace.windows(), &[a]);
    assert_eq!(f.workspace.activated(), Some(a));
    assert_eq!(f.scene.keyboard_focus(), f.windows[&a].keyboard_node());
    assert!(!f.windows[&b].is_mapped());
    assert_eq!(f.windows[&b].workspace(), None);

    assert!(f.workspace.unmap_window(&mut f.scene, &mut f.windows, a));
    assert_eq!(f.workspace.activated(), None);
    assert_eq!(f.scene.keyboard_focus(), None);
    f.scene.check_invariants().map_err(anyhow::Error::msg)?;
    Ok(())
}

#[test]
fn test_disabled_input_keeps_focus_away() -> Result<()> {
    let mut f = Fixture::new();
    f.workspace.set_input_enabled(&mut f.scene, &f.windows, false);
    let (a, _) = f.window(1, Size::new(400, 300))?;
    f.map(a);
    assert_eq!(f.workspace.activated(), Some(a));
    assert_eq!(f.scene.keyboard_focus(), None);

    f.workspace.set_input_enabled(&mut f.scene, &f.windows, true);
    assert_eq!(f.scene.keyboard_focus(), f.windows[&a].keyboard_node());
    Ok(())
}

#[test]
fn test_fullscreen_window_stays_on_top() -> Result<()> {
    let mut f = Fixture::new();
    let (a, handle) = f.window(1, Size::new(400, 300))?;
    let (b, _) = f.window(2, Size::new(400, 300))?;
    f.map(a);
    f.map(b);

    f.windows
        .get_mut(&a)
        .expect("window")
        .request_fullscreen(&mut f.scene, true, OUTPUT);
    f.ack(a, &handle)?;
    f.workspace.window_state_changed(&mut f.scene, &f.windows, a);
    assert_eq!(f.workspace.fullscreen(), Some(a));
    assert_eq!(f.workspace.windows(), &[b, a]);

    f.workspace.raise_window(&mut f.scene, &f.windows, b);
    assert_eq!(f.workspace.windows(), &[b, a]);
    f.workspace.lower_window(&mut f.scene, &f.windows, a);
    assert_eq!(f.workspace.windows(), &[b, a]);

    f.windows
        .get_mut(&a)
        .expect("window")
        .request_fullscreen(&mut f.scene, false, OUTPUT);
    f.ack(a, &handle)?;
    f.workspace.window_state_changed(&mut f.scene, &f.windows, a);
    assert_eq!(f.workspace.fullscreen(), None);
    f.workspace.lower_window(&mut f.scene, &f.windows, a);
    assert_eq!(f.workspace.windows(), &[a, b]);
    f.scene.check_invariants().map_err(anyhow::Error::msg)?;
    Ok(())
}

#[test]
fn test_drag_move_and_resize() -> Result<()> {
    let mut f = Fixture::new();
    let (a, handle) = f.window(1, Size::new(400, 300))?;
    f.map(a);
    f.windows
        .get_mut(&a)
        .expect("window")
        .set_position(&mut f.scene, Point::new(100, 100));

    assert!(f.workspace.begin_window_move(&f.windows, a, PointF::new(150.0, 150.0)));
    assert!(f
        .workspace
        .drag_motion(&mut f.scene, &mut f.windows, PointF::new(170.0, 140.0)));
    assert_eq!(f.windows[&a].position(), Point::new(120, 90));
    assert_eq!(f.workspace.end_drag().map(|d| d.mode), Some(DragMode::Move));
    assert!(!f
        .workspace
        .drag_motion(&mut f.scene, &mut f.windows, PointF::new(0.0, 0.0)));

    assert!(f
        .workspace
        .begin_window_resize(&f.windows, a, Edges::LEFT, PointF::new(120.0, 200.0)));
    f.workspace
        .drag_motion(&mut f.scene, &mut f.windows, PointF::new(80.0, 200.0));
    let (_, configure) = handle.last_configure().expect("configure");
    assert_eq!(configure.size, Size::new(440, 300));
    assert!(configure.resizing);
    f.ack(a, &handle)?;
    assert_eq!(f.windows[&a].geometry(), Rectangle::new(80, 90, 440, 300));
    Ok(())
}

#[test]
fn test_unmap_cancels_drag() -> Result<()> {
    let mut f = Fixture::new();
    let (a, _) = f.window(1, Size::new(400, 300))?;
    f.map(a);
    assert!(f.workspace.begin_window_move(&f.windows, a, PointF::new(1.0, 1.0)));
    f.workspace.unmap_window(&mut f.scene, &mut f.windows, a);
    assert!(f.workspace.drag().is_none());
    Ok(())
}

#[test]
fn test_resize_geometry_respects_minimum() {
    let original = Rectangle::new(100, 100, 200, 200);
    let minimum = Size::new(50, 40);
    assert_eq!(
        resize_geometry(original, Edges::TOP_LEFT, 500, 500, minimum),
        Rectangle::new(250, 260, 50, 40)
    );
    assert_eq!(
        resize_geometry(original, Edges::BOTTOM_RIGHT, 30, -20, minimum),
        Rectangle::new(100, 100, 230, 180)
    );
}

#[test]
fn test_maximized_window_follows_usable_area() -> Result<()> {
    let mut f = Fixture::new();
    let (a, handle) = f.window(1, Size::new(400, 300))?;
    f.map(a);
    f.windows
        .get_mut(&a)
        .expect("window")
        .request_maximized(&mut f.scene, true, OUTPUT);
    f.ack(a, &handle)?;
    assert_eq!(f.windows[&a].geometry(), OUTPUT);

    let node = f.scene.create_container();
    let config = PanelConfig {
        anchor: Edges::TOP | Edges::LEFT | Edges::RIGHT,
        exclusive_zone: 24,
        ..PanelConfig::new(crate::toolkit::layer::LayerKind::Top)
    };
    let panel = Panel::new_server(PanelId::from_raw(1), node, Size::new(1920, 24), config);
    f.panels.insert(panel.id(), panel);
    f.workspace
        .add_panel(&mut f.scene, &mut f.windows, &mut f.panels, PanelId::from_raw(1));

    assert_eq!(
        f.workspace.usable_area(OutputId::from_raw(1)),
        Some(Rectangle::new(0, 24, 1920, 1056))
    );
    let (_, configure) = handle.last_configure().expect("configure");
    assert_eq!(configure.size, Size::new(1920, 1056));
    f.ack(a, &handle)?;
    assert_eq!(f.windows[&a].geometry(), Rectangle::new(0, 24, 1920, 1056));
    Ok(())
}

#[test]
fn test_iconify_and_restore() -> Result<()> {
    let mut f = Fixture::new();
    let (a, _) = f.window(1, Size::new(400, 300))?;
    let (b, _) = f.window(2, Size::new(400, 300))?;
    f.map(a);
    f.map(b);

    f.workspace.iconify_window(&mut f.scene, &mut f.windows, b);
    assert_eq!(f.workspace.windows(), &[a]);
    assert_eq!(f.workspace.iconified(), &[b]);
    assert!(f.windows[&b].state().iconified);
    assert_eq!(f.workspace.activated(), Some(a));
    assert!(f.scene.parent(f.windows[&b].node()).is_none());
    assert!(!f.workspace.is_empty());

    f.workspace.deiconify_window(&mut f.scene, &mut f.windows, b);
    assert_eq!(f.workspace.windows(), &[a, b]);
    assert!(f.workspace.iconified().is_empty());
    assert_eq!(f.workspace.activated(), Some(b));
    Ok(())
}

#[test]
fn test_confine_within_usable_area() -> Result<()> {
    let mut f = Fixture::new();
    let (a, _) = f.window(1, Size::new(400, 300))?;
    f.map(a);
    f.windows
        .get_mut(&a)
        .expect("window")
        .set_position(&mut f.scene, Point::new(1700, 900));
    f.workspace.confine_within(&mut f.scene, &mut f.windows, a);
    assert_eq!(f.windows[&a].position(), Point::new(1520, 780));
    Ok(())
}

#[test]
fn test_background_click_is_reported() {
    let mut f = Fixture::new();
    let root = f.workspace.node();
    f.scene.pointer_motion(root, PointF::new(500.0, 500.0), 0);
    f.scene.take_events();
    let press = ButtonEvent {
        button: BTN_RIGHT,
        state: ButtonState::Pressed,
        time_msec: 0,
        position: PointF::new(500.0, 500.0),
    };
    assert!(f.scene.pointer_button(root, &press));
    assert_eq!(
        f.scene.take_events(),
        vec![SceneEvent::BackgroundButton {
            button: BTN_RIGHT,
            position: PointF::new(500.0, 500.0),
        }]
    );
}
