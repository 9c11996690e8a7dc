//! Client drawing surfaces.
//!
//! [`SurfaceElement`] is the scene leaf for a client buffer: it turns the
//! pointer and keyboard traffic it receives into [`ClientInput`] for the
//! protocol bridge. [`ClientSurface`] pairs that leaf with the configure/ack
//! bookkeeping shared by toplevels, popups and lock surfaces.
//!
//! The committed size only advances once every configure sent so far has
//! been acknowledged; a commit racing a newer configure keeps the old size.

use log::debug;

use crate::geometry::{Point, PointF, Rectangle, Size};
use crate::protocol::{AckOutcome, ClientInput, ConfigureQueue, ProtocolError, Serial};
use crate::toolkit::element::{
    AxisEvent, ButtonEvent, ButtonState, Element, EventSink, KeyEvent, SceneEvent,
};
use crate::toolkit::{NodeId, Scene, SurfaceId};

/// Scene leaf showing a client buffer.
#[derive(Debug, Clone)]
pub struct SurfaceElement {
    surface: SurfaceId,
    size: Size,
    activated: bool,
}

impl SurfaceElement {
    pub fn new(surface: SurfaceId) -> Self {
        Self {
            surface,
            size: Size::default(),
            activated: false,
        }
    }

    pub fn surface(&self) -> SurfaceId {
        self.surface
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn set_size(&mut self, size: Size) {
        self.size = size;
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    pub fn set_activated(&mut self, activated: bool) {
        self.activated = activated;
    }
}

impl Element for SurfaceElement {
    fn dimensions(&self) -> Rectangle {
        Rectangle::from_loc_and_size(Point::default(), self.size)
    }

    fn pointer_motion(&mut self, position: PointF, time_msec: u32, sink: &mut EventSink) -> bool {
        sink.push(SceneEvent::Client(ClientInput::PointerMotion {
            surface: self.surface,
            position,
            time_msec,
        }));
        true
    }

    fn pointer_enter(&mut self, position: PointF, sink: &mut EventSink) {
        sink.push(SceneEvent::Client(ClientInput::PointerEnter {
            surface: self.surface,
            position,
        }));
    }

    fn pointer_leave(&mut self, sink: &mut EventSink) {
        sink.push(SceneEvent::Client(ClientInput::PointerLeave {
            surface: self.surface,
        }));
    }

    fn pointer_button(&mut self, event: &ButtonEvent, sink: &mut EventSink) -> bool {
        let pressed = event.state == ButtonState::Pressed;
        if pressed {
            sink.push(SceneEvent::SurfaceClicked(self.surface));
        }
        sink.push(SceneEvent::Client(ClientInput::PointerButton {
            surface: self.surface,
            button: event.button,
            pressed,
            time_msec: event.time_msec,
        }));
        true
    }

    fn pointer_axis(&mut self, event: &AxisEvent, sink: &mut EventSink) -> bool {
        sink.push(SceneEvent::Client(ClientInput::PointerAxis {
            surface: self.surface,
            axis: event.axis,
            delta: event.delta,
            time_msec: event.time_msec,
        }));
        true
    }

    fn keyboard_key(&mut self, event: &KeyEvent, sink: &mut EventSink) -> bool {
        sink.push(SceneEvent::Client(ClientInput::KeyboardKey {
            surface: self.surface,
            keycode: event.keycode,
            pressed: event.pressed,
            time_msec: event.time_msec,
        }));
        true
    }

    fn keyboard_focus(&mut self, focused: bool, sink: &mut EventSink) {
        let surface = self.surface;
        sink.push(SceneEvent::Client(if focused {
            ClientInput::KeyboardEnter { surface }
        } else {
            ClientInput::KeyboardLeave { surface }
        }));
    }
}

/// What a commit changed.
#[derive(Debug, Clone, PartialEq)]
pub struct Commit<S> {
    /// This was the surface's first commit.
    pub first: bool,
    /// Newest configured state released by the commit's ack.
    pub applied: Option<S>,
    pub size_changed: bool,
}

/// A client surface with its configure/ack state.
#[derive(Debug)]
pub struct ClientSurface<S> {
    id: SurfaceId,
    node: NodeId,
    configures: ConfigureQueue<S>,
    committed_size: Size,
    committed_once: bool,
    activated: bool,
}

impl<S> ClientSurface<S> {
    pub fn new(scene: &mut Scene, id: SurfaceId) -> Self {
        let node = scene.create_element(SurfaceElement::new(id));
        Self {
            id,
            node,
            configures: ConfigureQueue::new(),
            committed_size: Size::default(),
            committed_once: false,
            activated: false,
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn committed_size(&self) -> Size {
        self.committed_size
    }

    pub fn has_committed(&self) -> bool {
        self.committed_once
    }

    pub fn is_activated(&self) -> bool {
        self.activated
    }

    /// Records a configure the bridge just sent.
    pub fn configured(&mut self, serial: Serial, state: S) {
        self.configures.push(serial, state);
    }

    pub fn has_pending_configure(&self) -> bool {
        self.configures.has_pending()
    }

    /// State of the newest configure still awaiting its ack.
    pub fn pending_state(&self) -> Option<&S> {
        self.configures.newest_pending_state()
    }

    pub fn newest_pending_serial(&self) -> Option<Serial> {
        self.configures.newest_pending()
    }

    pub fn last_acked(&self) -> Option<Serial> {
        self.configures.last_acked()
    }

    /// Handles a client commit carrying the serial it acknowledged (if any)
    /// and the size of the attached buffer.
    pub fn commit(
        &mut self,
        scene: &mut Scene,
        acked: Option<Serial>,
        size: Size,
    ) -> Result<Commit<S>, ProtocolError> {
        let mut applied = None;
        if let Some(serial) = acked {
            match self.configures.ack(serial) {
                AckOutcome::Applied(mut states) => applied = states.pop(),
                AckOutcome::Stale => debug!("{}: dropping stale ack {}", self.id, serial),
                AckOutcome::Unknown { pending } => {
                    return Err(ProtocolError::InvalidAckSerial {
                        surface: self.id,
                        acked: serial,
                        pending,
                    })
                }
            }
        }

        let first = !self.committed_once;
        self.committed_once = true;

        // A null buffer unmaps at once; other sizes wait for the ack.
        let size_changed = if size.is_empty() && !self.committed_size.is_empty() {
            self.committed_size = Size::default();
            scene.update_element::<SurfaceElement, _>(self.node, |e| e.set_size(size));
            true
        } else if self.configures.has_pending() {
            false
        } else if size != self.committed_size {
            self.committed_size = size;
            scene.update_element::<SurfaceElement, _>(self.node, |e| e.set_size(size));
            true
        } else {
            false
        };

        Ok(Commit {
            first,
            applied,
            size_changed,
        })
    }

    /// Marks the element activated; the protocol side is the owner's job.
    pub fn set_activated(&mut self, scene: &mut Scene, activated: bool) {
        self.activated = activated;
        scene.update_element::<SurfaceElement, _>(self.node, |e| e.set_activated(activated));
    }

    pub fn destroy(self, scene: &mut Scene) {
        scene.destroy(self.node);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_advances_only_when_acked() {
        let mut scene = Scene::new();
        let mut surface: ClientSurface<Size> = ClientSurface::new(&mut scene, SurfaceId::from_raw(1));

        let commit = surface.commit(&mut scene, None, Size::default()).unwrap();
        assert!(commit.first);

        surface.configured(10, Size::new(640, 480));
        let commit = surface.commit(&mut scene, None, Size::new(300, 200)).unwrap();
        assert!(!commit.first);
        assert!(!commit.size_changed);
        assert_eq!(surface.committed_size(), Size::default());

        let commit = surface.commit(&mut scene, Some(10), Size::new(640, 480)).unwrap();
        assert_eq!(commit.applied, Some(Size::new(640, 480)));
        assert!(commit.size_changed);
        assert_eq!(
            scene.element::<SurfaceElement>(surface.node()).unwrap().size(),
            Size::new(640, 480)
        );
    }

    #[test]
    fn test_null_buffer_does_not_wait_for_ack() {
        let mut scene = Scene::new();
        let mut surface: ClientSurface<Size> = ClientSurface::new(&mut scene, SurfaceId::from_raw(1));
        surface.commit(&mut scene, None, Size::default()).unwrap();
        surface.configured(1, Size::default());
        surface.commit(&mut scene, Some(1), Size::new(64, 48)).unwrap();
        assert_eq!(surface.committed_size(), Size::new(64, 48));

        surface.configured(2, Size::new(128, 96));
        let commit = surface.commit(&mut scene, None, Size::default()).unwrap();
        assert!(commit.size_changed);
        assert!(surface.committed_size().is_empty());
    }

    #[test]
    fn test_older_ack_does_not_release_newer_configure() {
        let mut scene = Scene::new();
        let mut surface: ClientSurface<u32> = ClientSurface::new(&mut scene, SurfaceId::from_raw(1));
        surface.commit(&mut scene, None, Size::default()).unwrap();

        surface.configured(1, 1);
        surface.configured(2, 2);
        let commit = surface.commit(&mut scene, Some(1), Size::new(10, 10)).unwrap();
        assert_eq!(commit.applied, Some(1));
        assert!(!commit.size_changed);

        let commit = surface.commit(&mut scene, Some(1), Size::new(10, 10)).unwrap();
        assert_eq!(commit.applied, None);
        assert!(!commit.size_changed);
    }

    #[test]
    fn test_unknown_ack_is_a_protocol_error() {
        let mut scene = Scene::new();
        let mut surface: ClientSurface<()> = ClientSurface::new(&mut scene, SurfaceId::from_raw(4));
        surface.configured(5, ());
        assert_eq!(
            surface.commit(&mut scene, Some(9), Size::default()),
            Err(ProtocolError::InvalidAckSerial {
                surface: SurfaceId::from_raw(4),
                acked: 9,
                pending: vec![5],
            })
        );
    }

    #[test]
    fn test_surface_element_forwards_input() {
        let mut sink = EventSink::new();
        let mut element = SurfaceElement::new(SurfaceId::from_raw(2));
        element.set_size(Size::new(10, 10));
        element.pointer_enter(PointF::new(1.0, 2.0), &mut sink);
        element.keyboard_focus(true, &mut sink);
        assert_eq!(
            sink.drain(),
            vec![
                SceneEvent::Client(ClientInput::PointerEnter {
                    surface: SurfaceId::from_raw(2),
                    position: PointF::new(1.0, 2.0)
                }),
                SceneEvent::Client(ClientInput::KeyboardEnter {
                    surface: SurfaceId::from_raw(2)
                }),
            ]
        );
    }
}
