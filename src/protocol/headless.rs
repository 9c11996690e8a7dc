//! In-memory protocol handles
//!
//! Every handle is a cheap clone around shared state: hand one clone to the
//! server and keep another to inspect what was sent.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::debug;

use super::{
    ClientInput, LayerSurfaceHandle, LockHandle, LockSurfaceHandle, PopupHandle, ProtocolError,
    SeatBridge, Serial, SessionBackend, ToplevelConfigure, ToplevelHandle,
};
use crate::error::SessionError;
use crate::geometry::{Rectangle, Size};

/// Monotonic serial source shared between handles, like a wl_display's.
#[derive(Debug, Clone, Default)]
pub struct SerialCounter(Rc<Cell<Serial>>);

impl SerialCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> Serial {
        let serial = self.0.get().wrapping_add(1);
        self.0.set(serial);
        serial
    }
}

#[derive(Debug, Default)]
struct ToplevelLog {
    configures: Vec<(Serial, ToplevelConfigure)>,
    close_requests: u32,
    errors: Vec<ProtocolError>,
}

#[derive(Debug, Clone)]
pub struct HeadlessToplevel {
    serials: SerialCounter,
    log: Rc<RefCell<ToplevelLog>>,
}

impl HeadlessToplevel {
    pub fn new(serials: &SerialCounter) -> Self {
        Self {
            serials: serials.clone(),
            log: Rc::default(),
        }
    }

    pub fn configures(&self) -> Vec<(Serial, ToplevelConfigure)> {
        self.log.borrow().configures.clone()
    }

    pub fn last_configure(&self) -> Option<(Serial, ToplevelConfigure)> {
        self.log.borrow().configures.last().copied()
    }

    pub fn close_requests(&self) -> u32 {
        self.log.borrow().close_requests
    }

    pub fn errors(&self) -> Vec<ProtocolError> {
        self.log.borrow().errors.clone()
    }
}

impl ToplevelHandle for HeadlessToplevel {
    fn send_configure(&self, configure: &ToplevelConfigure) -> Serial {
        let serial = self.serials.next();
        debug!("headless toplevel: configure {} {:?}", serial, configure);
        self.log.borrow_mut().configures.push((serial, *configure));
        serial
    }

    fn send_close(&self) {
        self.log.borrow_mut().close_requests += 1;
    }

    fn post_error(&self, error: &ProtocolError) {
        self.log.borrow_mut().errors.push(error.clone());
    }
}

#[derive(Debug, Default)]
struct PopupLog {
    configures: Vec<(Serial, Rectangle)>,
    done: bool,
    errors: Vec<ProtocolError>,
}

#[derive(Debug, Clone)]
pub struct HeadlessPopup {
    serials: SerialCounter,
    log: Rc<RefCell<PopupLog>>,
}

impl HeadlessPopup {
    pub fn new(serials: &SerialCounter) -> Self {
        Self {
            serials: serials.clone(),
            log: Rc::default(),
        }
    }

    pub fn configures(&self) -> Vec<(Serial, Rectangle)> {
        self.log.borrow().configures.clone()
    }

    pub fn is_done(&self) -> bool {
        self.log.borrow().done
    }
}

impl PopupHandle for HeadlessPopup {
    fn send_configure(&self, geometry: Rectangle) -> Serial {
        let serial = self.serials.next();
        self.log.borrow_mut().configures.push((serial, geometry));
        serial
    }

    fn send_popup_done(&self) {
        self.log.borrow_mut().done = true;
    }

    fn post_error(&self, error: &ProtocolError) {
        self.log.borrow_mut().errors.push(error.clone());
    }
}

#[derive(Debug, Default)]
struct LayerSurfaceLog {
    configures: Vec<(Serial, Size)>,
    closed: bool,
    errors: Vec<ProtocolError>,
}

#[derive(Debug, Clone)]
pub struct HeadlessLayerSurface {
    serials: SerialCounter,
    log: Rc<RefCell<LayerSurfaceLog>>,
}

impl HeadlessLayerSurface {
    pub fn new(serials: &SerialCounter) -> Self {
        Self {
            serials: serials.clone(),
            log: Rc::default(),
        }
    }

    pub fn configures(&self) -> Vec<(Serial, Size)> {
        self.log.borrow().configures.clone()
    }

    pub fn last_configure(&self) -> Option<(Serial, Size)> {
        self.log.borrow().configures.last().copied()
    }

    pub fn is_closed(&self) -> bool {
        self.log.borrow().closed
    }

    pub fn errors(&self) -> Vec<ProtocolError> {
        self.log.borrow().errors.clone()
    }
}

impl LayerSurfaceHandle for HeadlessLayerSurface {
    fn send_configure(&self, size: Size) -> Serial {
        let serial = self.serials.next();
        self.log.borrow_mut().configures.push((serial, size));
        serial
    }

    fn send_closed(&self) {
        self.log.borrow_mut().closed = true;
    }

    fn post_error(&self, error: &ProtocolError) {
        self.log.borrow_mut().errors.push(error.clone());
    }
}

#[derive(Debug, Default)]
struct LockLog {
    locked: u32,
    finished: u32,
    errors: Vec<ProtocolError>,
}

#[derive(Debug, Clone, Default)]
pub struct HeadlessLock {
    log: Rc<RefCell<LockLog>>,
}

impl HeadlessLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `locked` events sent.
    pub fn locked_events(&self) -> u32 {
        self.log.borrow().locked
    }

    pub fn finished_events(&self) -> u32 {
        self.log.borrow().finished
    }

    pub fn errors(&self) -> Vec<ProtocolError> {
        self.log.borrow().errors.clone()
    }
}

impl LockHandle for HeadlessLock {
    fn send_locked(&self) {
        self.log.borrow_mut().locked += 1;
    }

    fn send_finished(&self) {
        self.log.borrow_mut().finished += 1;
    }

    fn post_error(&self, error: &ProtocolError) {
        self.log.borrow_mut().errors.push(error.clone());
    }
}

#[derive(Debug, Default)]
struct LockSurfaceLog {
    configures: Vec<(Serial, Size)>,
    errors: Vec<ProtocolError>,
}

#[derive(Debug, Clone)]
pub struct HeadlessLockSurface {
    serials: SerialCounter,
    log: Rc<RefCell<LockSurfaceLog>>,
}

impl HeadlessLockSurface {
    pub fn new(serials: &SerialCounter) -> Self {
        Self {
            serials: serials.clone(),
            log: Rc::default(),
        }
    }

    pub fn configures(&self) -> Vec<(Serial, Size)> {
        self.log.borrow().configures.clone()
    }

    pub fn last_configure(&self) -> Option<(Serial, Size)> {
        self.log.borrow().configures.last().copied()
    }
}

impl LockSurfaceHandle for HeadlessLockSurface {
    fn send_configure(&self, size: Size) -> Serial {
        let serial = self.serials.next();
        self.log.borrow_mut().configures.push((serial, size));
        serial
    }

    fn post_error(&self, error: &ProtocolError) {
        self.log.borrow_mut().errors.push(error.clone());
    }
}

/// Records client-bound input instead of writing it to wl_seat resources.
#[derive(Debug, Clone, Default)]
pub struct HeadlessSeat {
    sent: Rc<RefCell<Vec<ClientInput>>>,
}

impl HeadlessSeat {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<ClientInput> {
        self.sent.borrow().clone()
    }

    pub fn take(&self) -> Vec<ClientInput> {
        std::mem::take(&mut *self.sent.borrow_mut())
    }
}

impl SeatBridge for HeadlessSeat {
    fn send(&mut self, input: ClientInput) {
        self.sent.borrow_mut().push(input);
    }
}

/// A session without VT support unless constructed with [`HeadlessSession::with_vts`].
#[derive(Debug, Clone, Default)]
pub struct HeadlessSession {
    vts: Option<u32>,
    switches: Rc<RefCell<Vec<u32>>>,
}

impl HeadlessSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vts(count: u32) -> Self {
        Self {
            vts: Some(count),
            switches: Rc::default(),
        }
    }

    pub fn switches(&self) -> Vec<u32> {
        self.switches.borrow().clone()
    }
}

impl SessionBackend for HeadlessSession {
    fn switch_vt(&mut self, vt: u32) -> Result<(), SessionError> {
        match self.vts {
            None => Err(SessionError::Unsupported),
            Some(count) if vt == 0 || vt > count => Err(SessionError::InvalidVt(vt)),
            Some(_) => {
                self.switches.borrow_mut().push(vt);
                Ok(())
            }
        }
    }
}
