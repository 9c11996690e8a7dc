//! Client popups (xdg_popup).
//!
//! A popup is positioned relative to its parent surface: the content of a
//! window or another popup. Its node holds the popup surface and, above it,
//! any nested popups, so a whole chain moves with the window.

use log::debug;

use crate::geometry::{Point, Rectangle, Size};
use crate::protocol::{PopupHandle, ProtocolError, Serial};
use crate::toolkit::surface::ClientSurface;
use crate::toolkit::{NodeId, PopupId, Scene, SurfaceId, WindowId};

/// What a popup is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupParent {
    Window(WindowId),
    Popup(PopupId),
}

#[derive(Debug)]
pub struct Popup {
    id: PopupId,
    parent: PopupParent,
    node: NodeId,
    surface: ClientSurface<Rectangle>,
    /// Relative to the parent surface.
    geometry: Rectangle,
    children: Vec<PopupId>,
    grabbed: bool,
    handle: Box<dyn PopupHandle>,
}

impl Popup {
    pub fn new(
        scene: &mut Scene,
        id: PopupId,
        surface: SurfaceId,
        parent: PopupParent,
        handle: Box<dyn PopupHandle>,
    ) -> Self {
        let node = scene.create_container();
        let surface = ClientSurface::new(scene, surface);
        if let Err(err) = scene.add_child(node, surface.node()) {
            debug!("{}: attaching surface: {}", id, err);
        }
        Self {
            id,
            parent,
            node,
            surface,
            geometry: Rectangle::default(),
            children: Vec::new(),
            grabbed: false,
            handle,
        }
    }

    pub fn id(&self) -> PopupId {
        self.id
    }

    pub fn parent(&self) -> PopupParent {
        self.parent
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn surface(&self) -> &ClientSurface<Rectangle> {
        &self.surface
    }

    pub fn surface_id(&self) -> SurfaceId {
        self.surface.id()
    }

    pub fn geometry(&self) -> Rectangle {
        self.geometry
    }

    pub fn children(&self) -> &[PopupId] {
        &self.children
    }

    pub fn add_child(&mut self, child: PopupId) {
        self.children.push(child);
    }

    pub fn remove_child(&mut self, child: PopupId) {
        self.children.retain(|c| *c != child);
    }

    pub fn is_grabbed(&self) -> bool {
        self.grabbed
    }

    pub fn set_grabbed(&mut self, grabbed: bool) {
        self.grabbed = grabbed;
    }

    /// Sends the (already constrained) geometry to the client.
    pub fn configure(&mut self, geometry: Rectangle) -> Serial {
        let serial = self.handle.send_configure(geometry);
        self.surface.configured(serial, geometry);
        serial
    }

    pub fn commit(
        &mut self,
        scene: &mut Scene,
        acked: Option<Serial>,
        size: Size,
    ) -> Result<(), ProtocolError> {
        let commit = match self.surface.commit(scene, acked, size) {
            Ok(commit) => commit,
            Err(err) => {
                self.handle.post_error(&err);
                return Err(err);
            }
        };
        if let Some(geometry) = commit.applied {
            self.geometry = geometry;
            scene.set_position(self.node, geometry.loc());
        } else if commit.first && !self.surface.has_pending_configure() {
            let geometry = self.geometry;
            self.configure(geometry);
        }
        Ok(())
    }

    /// Sets the initial placement before the first configure.
    pub fn place(&mut self, scene: &mut Scene, geometry: Rectangle) {
        self.geometry = geometry;
        scene.set_position(self.node, geometry.loc());
    }

    pub fn position(&self) -> Point {
        self.geometry.loc()
    }

    /// Tells the client its popup was dismissed.
    pub fn dismiss(&mut self) {
        debug!("{} dismissed", self.id);
        self.grabbed = false;
        self.handle.send_popup_done();
    }

    pub fn destroy(self, scene: &mut Scene) {
        scene.destroy(self.node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::headless::{HeadlessPopup, SerialCounter};

    #[test]
    fn test_popup_configure_and_commit() {
        let mut scene = Scene::new();
        let serials = SerialCounter::new();
        let handle = HeadlessPopup::new(&serials);
        let mut popup = Popup::new(
            &mut scene,
            PopupId::from_raw(1),
            SurfaceId::from_raw(2),
            PopupParent::Window(WindowId::from_raw(3)),
            Box::new(handle.clone()),
        );

        let serial = popup.configure(Rectangle::new(10, 20, 100, 50));
        assert_eq!(handle.configures(), vec![(serial, Rectangle::new(10, 20, 100, 50))]);

        popup
            .commit(&mut scene, Some(serial), Size::new(100, 50))
            .unwrap();
        assert_eq!(scene.position(popup.node()), Point::new(10, 20));
        assert_eq!(popup.surface().committed_size(), Size::new(100, 50));

        popup.dismiss();
        assert!(handle.is_done());
    }
}
