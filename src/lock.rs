//! Session lock
//!
//! A lock client first creates a lock, then one lock surface per output.
//! Every surface is configured with its output's size and counts as
//! registered once the client commits an ack for that configure. When each
//! current output has a registered surface the root curtain is engaged and
//! the client is told the session is locked.
//!
//! Unlocking lowers the curtain but leaves the lock object to the client.
//! A client that vanishes while holding the curtain leaves the session
//! locked.

use log::{debug, info, warn};
use std::collections::HashMap;

use crate::geometry::{Rectangle, Size};
use crate::protocol::{LockHandle, LockSurfaceHandle, ProtocolError, Serial};
use crate::toolkit::root::Root;
use crate::toolkit::surface::ClientSurface;
use crate::toolkit::{LockId, OutputId, SurfaceId};

#[derive(Debug)]
struct LockSurface {
    output: OutputId,
    surface: ClientSurface<Size>,
    handle: Box<dyn LockSurfaceHandle>,
    /// Position in registration order, once registered.
    registered: Option<u64>,
}

impl LockSurface {
    fn configure(&mut self, root: &mut Root, geometry: Rectangle) -> Serial {
        root.scene_mut().set_position(self.surface.node(), geometry.loc());
        let serial = self.handle.send_configure(geometry.size());
        self.surface.configured(serial, geometry.size());
        serial
    }
}

#[derive(Debug)]
struct SessionLock {
    handle: Box<dyn LockHandle>,
    surfaces: HashMap<SurfaceId, LockSurface>,
    locked: bool,
    /// Refused because another client holds the curtain.
    denied: bool,
}

impl SessionLock {
    fn surface_on(&self, output: OutputId) -> Option<&LockSurface> {
        self.surfaces.values().find(|s| s.output == output)
    }
}

/// The session-lock manager: every live lock object.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: HashMap<LockId, SessionLock>,
    registrations: u64,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self, lock: LockId) -> bool {
        self.locks.get(&lock).map_or(false, |l| l.locked)
    }

    pub fn surface_count(&self, lock: LockId) -> usize {
        self.locks.get(&lock).map_or(0, |l| l.surfaces.len())
    }

    /// The lock a surface belongs to.
    pub fn lock_for_surface(&self, surface: SurfaceId) -> Option<LockId> {
        self.locks
            .iter()
            .find(|(_, lock)| lock.surfaces.contains_key(&surface))
            .map(|(id, _)| *id)
    }

    /// Creates a lock object. If a live lock already holds the curtain the
    /// new one is told `finished` right away.
    pub fn create_lock(&mut self, root: &mut Root, handle: Box<dyn LockHandle>) -> LockId {
        let id = root.ids_mut().lock();
        let denied = root.is_locked() && !root.is_lock_orphaned();
        if denied {
            warn!("🔒 {} denied: the session is already locked", id);
            handle.send_finished();
        } else {
            info!("🔒 {} created", id);
        }
        self.locks.insert(
            id,
            SessionLock {
                handle,
                surfaces: HashMap::new(),
                locked: false,
                denied,
            },
        );
        id
    }

    /// Creates a lock surface for `output` and sends its first configure.
    pub fn create_surface(
        &mut self,
        root: &mut Root,
        lock: LockId,
        surface: SurfaceId,
        output: OutputId,
        handle: Box<dyn LockSurfaceHandle>,
    ) -> Result<(), ProtocolError> {
        let Some(session) = self.locks.get_mut(&lock) else {
            return Ok(());
        };
        if session.surface_on(output).is_some() {
            let err = ProtocolError::DuplicateLockOutput(output.raw() as u32);
            session.handle.post_error(&err);
            return Err(err);
        }
        let client_surface = ClientSurface::new(root.scene_mut(), surface);
        let parent = root.curtain_surfaces_node();
        if let Err(err) = root.scene_mut().add_child(parent, client_surface.node()) {
            warn!("{}: attaching lock surface: {}", lock, err);
        }
        let mut lock_surface = LockSurface {
            output,
            surface: client_surface,
            handle,
            registered: None,
        };
        match root.output_geometry(output) {
            Some(geometry) => {
                lock_surface.configure(root, geometry);
            }
            None => debug!("{}: lock surface for unknown {}", lock, output),
        }
        session.surfaces.insert(surface, lock_surface);
        Ok(())
    }

    /// Handles a lock-surface commit and engages the curtain once every
    /// output is covered.
    pub fn commit_surface(
        &mut self,
        root: &mut Root,
        surface: SurfaceId,
        acked: Option<Serial>,
        size: Size,
    ) -> Result<(), ProtocolError> {
        let Some(lock) = self.lock_for_surface(surface) else {
            return Ok(());
        };
        let Some(session) = self.locks.get_mut(&lock) else {
            return Ok(());
        };
        let Some(lock_surface) = session.surfaces.get_mut(&surface) else {
            return Ok(());
        };
        if let Err(err) = lock_surface.surface.commit(root.scene_mut(), acked, size) {
            lock_surface.handle.post_error(&err);
            return Err(err);
        }
        if lock_surface.registered.is_none() && lock_surface.surface.last_acked().is_some() {
            self.registrations += 1;
            lock_surface.registered = Some(self.registrations);
            debug!("🔒 {} registered on {}", surface, lock_surface.output);
        }
        let node = lock_surface.surface.node();
        if session.locked {
            if root.scene().keyboard_focus().is_none() {
                root.scene_mut().set_keyboard_focus(Some(node));
            }
            return Ok(());
        }
        self.try_engage(root, lock);
        Ok(())
    }

    fn try_engage(&mut self, root: &mut Root, lock: LockId) {
        let Some(session) = self.locks.get_mut(&lock) else {
            return;
        };
        if session.denied {
            return;
        }
        let covered = root.outputs().iter().all(|(output, _)| {
            session
                .surface_on(*output)
                .map_or(false, |s| s.registered.is_some())
        });
        if !covered || root.outputs().is_empty() {
            return;
        }
        if !root.lock(lock) {
            session.denied = true;
            session.handle.send_finished();
            return;
        }
        session.locked = true;
        session.handle.send_locked();
        let newest = session
            .surfaces
            .values()
            .filter_map(|s| s.registered.map(|order| (order, s.surface.node())))
            .max_by_key(|(order, _)| *order)
            .map(|(_, node)| node);
        root.scene_mut().set_keyboard_focus(newest);
    }

    /// The client asked to unlock.
    pub fn unlock(&mut self, root: &mut Root, lock: LockId) -> Result<(), ProtocolError> {
        let Some(session) = self.locks.get_mut(&lock) else {
            return Ok(());
        };
        if !session.locked {
            let err = ProtocolError::InvalidUnlock;
            session.handle.post_error(&err);
            return Err(err);
        }
        session.locked = false;
        root.unlock(lock);
        Ok(())
    }

    pub fn destroy_surface(&mut self, root: &mut Root, surface: SurfaceId) {
        let Some(lock) = self.lock_for_surface(surface) else {
            return;
        };
        if let Some(lock_surface) = self
            .locks
            .get_mut(&lock)
            .and_then(|session| session.surfaces.remove(&surface))
        {
            lock_surface.surface.destroy(root.scene_mut());
        }
    }

    /// The client destroyed the lock object. Without a prior unlock the
    /// session stays locked.
    pub fn destroy_lock(&mut self, root: &mut Root, lock: LockId) {
        let Some(session) = self.locks.remove(&lock) else {
            return;
        };
        if session.locked {
            root.lock_unreference(lock);
        }
        for (_, lock_surface) in session.surfaces {
            lock_surface.surface.destroy(root.scene_mut());
        }
        debug!("🔒 {} destroyed", lock);
    }

    /// Re-configures lock surfaces after the output layout changed.
    pub fn outputs_changed(&mut self, root: &mut Root) {
        for session in self.locks.values_mut() {
            for lock_surface in session.surfaces.values_mut() {
                if let Some(geometry) = root.output_geometry(lock_surface.output) {
                    lock_surface.configure(root, geometry);
                }
            }
        }
        let pending: Vec<LockId> = self
            .locks
            .iter()
            .filter(|(_, s)| !s.locked && !s.denied)
            .map(|(id, _)| *id)
            .collect();
        for lock in pending {
            self.try_engage(root, lock);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoration::DecorationTheme;
    use crate::geometry::Point;
    use crate::protocol::headless::{HeadlessLock, HeadlessLockSurface, SerialCounter};
    use crate::toolkit::root::WorkspaceStyle;
    use crate::toolkit::Color;

    fn root(outputs: usize) -> Root {
        let mut root = Root::new(
            DecorationTheme::default(),
            Color::BLACK,
            &[WorkspaceStyle::new("Main", Color::WHITE)],
        );
        let layout = (0..outputs)
            .map(|i| {
                (
                    OutputId::from_raw(100 + i as u64),
                    Rectangle::new(1920 * i as i32, 0, 1920, 1080),
                )
            })
            .collect();
        root.set_outputs(layout);
        root
    }

    fn surface(
        locks: &mut LockManager,
        root: &mut Root,
        serials: &SerialCounter,
        lock: LockId,
        output: u64,
    ) -> (SurfaceId, HeadlessLockSurface) {
        let handle = HeadlessLockSurface::new(serials);
        let id = root.ids_mut().surface();
        locks
            .create_surface(root, lock, id, OutputId::from_raw(output), Box::new(handle.clone()))
            .unwrap();
        (id, handle)
    }

    fn ack(locks: &mut LockManager, root: &mut Root, id: SurfaceId, handle: &HeadlessLockSurface) {
        let (serial, size) = handle.last_configure().unwrap();
        locks.commit_surface(root, id, Some(serial), size).unwrap();
    }

    #[test]
    fn test_lock_engages_when_every_output_is_covered() {
        let mut root = root(2);
        let mut locks = LockManager::new();
        let serials = SerialCounter::new();
        let client = HeadlessLock::new();
        let lock = locks.create_lock(&mut root, Box::new(client.clone()));

        let (first, first_handle) = surface(&mut locks, &mut root, &serials, lock, 100);
        let (second, second_handle) = surface(&mut locks, &mut root, &serials, lock, 101);
        assert_eq!(first_handle.last_configure().map(|c| c.1), Some(Size::new(1920, 1080)));

        ack(&mut locks, &mut root, first, &first_handle);
        assert!(!root.is_locked());
        assert_eq!(client.locked_events(), 0);

        ack(&mut locks, &mut root, second, &second_handle);
        assert!(root.is_locked());
        assert_eq!(client.locked_events(), 1);
        assert!(root.scene().is_visible(root.curtain_node()));

        let focus = root.scene().keyboard_focus().unwrap();
        assert_eq!(root.scene().parent(focus), Some(root.curtain_surfaces_node()));
        assert_eq!(root.scene().position(focus), Point::new(1920, 0));
    }

    #[test]
    fn test_new_output_while_locked_stays_covered() {
        let mut root = root(2);
        let mut locks = LockManager::new();
        let serials = SerialCounter::new();
        let client = HeadlessLock::new();
        let lock = locks.create_lock(&mut root, Box::new(client.clone()));
        for output in [100, 101] {
            let (id, handle) = surface(&mut locks, &mut root, &serials, lock, output);
            ack(&mut locks, &mut root, id, &handle);
        }
        assert!(root.is_locked());

        let mut layout = root.outputs().to_vec();
        layout.push((OutputId::from_raw(102), Rectangle::new(3840, 0, 1280, 1024)));
        root.set_outputs(layout);
        locks.outputs_changed(&mut root);
        assert!(root.is_locked());
        assert_eq!(client.locked_events(), 1);

        let frame = root.frame();
        let backdrop = frame
            .items
            .iter()
            .find(|item| item.bounds == Rectangle::new(0, 0, 5120, 1080))
            .expect("curtain covers the new output");
        assert_eq!(backdrop.fill, Some(Color::BLACK));

        let (third, handle) = surface(&mut locks, &mut root, &serials, lock, 102);
        assert_eq!(handle.last_configure().map(|c| c.1), Some(Size::new(1280, 1024)));
        ack(&mut locks, &mut root, third, &handle);
        assert_eq!(client.locked_events(), 1);
    }

    #[test]
    fn test_duplicate_surface_and_early_unlock_are_errors() {
        let mut root = root(1);
        let mut locks = LockManager::new();
        let serials = SerialCounter::new();
        let client = HeadlessLock::new();
        let lock = locks.create_lock(&mut root, Box::new(client.clone()));
        surface(&mut locks, &mut root, &serials, lock, 100);

        let duplicate = locks.create_surface(
            &mut root,
            lock,
            SurfaceId::from_raw(999),
            OutputId::from_raw(100),
            Box::new(HeadlessLockSurface::new(&serials)),
        );
        assert_eq!(duplicate, Err(ProtocolError::DuplicateLockOutput(100)));
        assert_eq!(locks.unlock(&mut root, lock), Err(ProtocolError::InvalidUnlock));
        assert_eq!(client.errors().len(), 2);
    }

    #[test]
    fn test_unlock_and_client_death() {
        let mut root = root(1);
        let mut locks = LockManager::new();
        let serials = SerialCounter::new();

        let lock = locks.create_lock(&mut root, Box::new(HeadlessLock::new()));
        let (id, handle) = surface(&mut locks, &mut root, &serials, lock, 100);
        ack(&mut locks, &mut root, id, &handle);
        assert!(root.is_locked());

        let rival = HeadlessLock::new();
        locks.create_lock(&mut root, Box::new(rival.clone()));
        assert_eq!(rival.finished_events(), 1);

        locks.unlock(&mut root, lock).unwrap();
        assert!(!root.is_locked());
        locks.destroy_lock(&mut root, lock);

        let crashed = locks.create_lock(&mut root, Box::new(HeadlessLock::new()));
        let (id, handle) = surface(&mut locks, &mut root, &serials, crashed, 100);
        ack(&mut locks, &mut root, id, &handle);
        locks.destroy_lock(&mut root, crashed);
        assert!(root.is_locked());
        assert!(root.is_lock_orphaned());

        let replacement = HeadlessLock::new();
        let lock = locks.create_lock(&mut root, Box::new(replacement.clone()));
        let (id, handle) = surface(&mut locks, &mut root, &serials, lock, 100);
        ack(&mut locks, &mut root, id, &handle);
        assert_eq!(replacement.locked_events(), 1);
        assert_eq!(root.lock_holder(), Some(lock));
        root.scene().check_invariants().unwrap();
    }
}
