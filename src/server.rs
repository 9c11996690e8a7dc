//! The compositor server
//!
//! [`Server`] owns the scene root and every subsystem around it: input,
//! session locks, subprocesses, outputs, the idle monitor, hot corners, the
//! task list and the dock. The client bridge calls its entry points; the
//! event loop in `main` drives [`Server::tick`] and [`Server::reap_children`].
//!
//! Key bindings, menus, hot corners and the clip all end up in
//! [`Server::execute`], which carries out one [`BoundAction`].

use anyhow::Result;
use calloop::{LoopHandle, LoopSignal};
use log::{debug, error, info, warn};
use std::cell::RefCell;
use std::path::PathBuf;
use std::process::Command;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::action::{Action, BoundAction};
use crate::config::Config;
use crate::decoration::{ClientPreference, DecorationManager, DecorationMode};
use crate::dock::{Clip, Dock};
use crate::geometry::{Edges, Point, PointF, Rectangle, Size};
use crate::hot_corner::HotCorners;
use crate::idle::{IdleEvent, IdleMonitor};
use crate::input::keybinding::KeyBindings;
use crate::input::keyboard::Keyboard;
use crate::input::{InputManager, KeyRouting, PointerMode};
use crate::lock::LockManager;
use crate::output::OutputLayout;
use crate::protocol::{
    Axis, ClientInput, LayerSurfaceHandle, LockHandle, LockSurfaceHandle, PopupHandle,
    ProtocolError, SeatBridge, Serial, SessionBackend, ToplevelHandle,
};
use crate::root_menu::RootMenu;
use crate::subprocess::{
    exec_command, shell_command, watch_output, SubprocessId, SubprocessMonitor, Termination,
};
use crate::task_list::{Direction, TaskList};
use crate::toolkit::element::{
    AxisEvent, ButtonEvent, ButtonState, ButtonTag, CursorKind, SceneEvent, BTN_LEFT, BTN_RIGHT,
};
use crate::toolkit::layer::LayerKind;
use crate::toolkit::menu::{MenuMode, MenuOutcome};
use crate::toolkit::panel::{Panel, PanelCommit, PanelConfig};
use crate::toolkit::popup::PopupParent;
use crate::toolkit::root::{Frame, Root};
use crate::toolkit::window::{ClientIdentity, WindowCommit, WindowMenuCommand};
use crate::toolkit::{LockId, OutputId, PanelId, PopupId, SurfaceId, WindowId};

/// Name given to workspaces created by `WorkspaceAdd`.
pub const NEW_WORKSPACE_NAME: &str = "New";

/// Actions that still run while the session is locked.
fn allowed_while_locked(action: Action) -> bool {
    matches!(
        action,
        Action::Quit
            | Action::SwitchToVt(_)
            | Action::LockInhibitBegin
            | Action::LockInhibitEnd
            | Action::OutputMagnify
            | Action::OutputReduce
            | Action::OutputSaveState
    )
}

/// Main server struct that orchestrates all subsystems
pub struct Server {
    config: Config,

    // Core subsystems
    root: Root,
    input: InputManager<BoundAction>,
    locks: LockManager,
    outputs: OutputLayout,
    decorations: DecorationManager,
    monitor: Rc<RefCell<SubprocessMonitor>>,

    // Shell
    idle: IdleMonitor,
    hot_corners: HotCorners,
    task_list: TaskList,
    root_menu: Option<RootMenu>,
    dock: Option<Dock>,
    clip: Option<Clip>,

    // Outside world
    seat: Box<dyn SeatBridge>,
    session: Box<dyn SessionBackend>,
    loop_handle: Option<LoopHandle<'static, Server>>,
    loop_signal: Option<LoopSignal>,
    state_path: Option<PathBuf>,

    running: bool,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("workspace", &self.root.current_index())
            .field("windows", &self.root.windows().len())
            .field("outputs", &self.outputs.outputs().len())
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Create a new server from a validated configuration
    pub fn new(
        config: Config,
        seat: Box<dyn SeatBridge>,
        session: Box<dyn SessionBackend>,
    ) -> Result<Self> {
        info!("🏗️ Initializing Lodestar server...");
        let now = Instant::now();

        debug!("🗂️ Initializing workspaces...");
        let theme = config.decoration.theme();
        let mut root = Root::new(
            theme.clone(),
            config.screen_lock.curtain_color,
            &config.workspace_styles(),
        );

        debug!("⌨️ Initializing input...");
        let keyboard = match Keyboard::new(&config.keyboard.keymap_source()) {
            Ok(keyboard) => Some(keyboard),
            Err(err) => {
                error!("❌ Keymap: {}", err);
                None
            }
        };
        let mut bindings = KeyBindings::new();
        for binding in &config.key_bindings {
            bindings.bind(binding.combo, binding.action.clone());
        }
        let input = InputManager::new(keyboard, bindings, config.keyboard.repeat);

        debug!("👶 Initializing subprocess monitor...");
        let monitor = Rc::new(RefCell::new(SubprocessMonitor::new()));
        let signals = root.signals_mut();
        let m = Rc::clone(&monitor);
        signals.window_created.connect(move |info| m.borrow_mut().window_created(info));
        let m = Rc::clone(&monitor);
        signals.window_mapped.connect(move |info| m.borrow_mut().window_mapped(info));
        let m = Rc::clone(&monitor);
        signals.window_unmapped.connect(move |info| m.borrow_mut().window_unmapped(info));
        let m = Rc::clone(&monitor);
        signals.window_destroyed.connect(move |info| m.borrow_mut().window_destroyed(info));

        let idle = IdleMonitor::new(Duration::from_secs(config.screen_lock.idle_seconds), now);
        let hot_corners = HotCorners::new(config.hot_corner.delay(), config.hot_corner.actions()?);

        let root_menu = config
            .root_menu
            .as_ref()
            .map(|entry| RootMenu::new(&mut root, entry));
        let dock = config
            .dock
            .enabled
            .then(|| Dock::new(&mut root, &config.dock));
        let clip = config
            .clip
            .enabled
            .then(|| Clip::new(&mut root, &config.clip));

        let decorations = DecorationManager::new(config.decoration.mode, theme);
        let outputs = OutputLayout::new(config.outputs.clone());

        info!("✅ All subsystems initialized successfully");
        Ok(Self {
            config,
            root,
            input,
            locks: LockManager::new(),
            outputs,
            decorations,
            monitor,
            idle,
            hot_corners,
            task_list: TaskList::default(),
            root_menu,
            dock,
            clip,
            seat,
            session,
            loop_handle: None,
            loop_signal: None,
            state_path: None,
            running: true,
        })
    }

    /// Where `OutputSaveState` writes.
    pub fn with_state_path(mut self, path: PathBuf) -> Self {
        self.state_path = Some(path);
        self
    }

    /// Lets the server stop the loop and watch subprocess output on it.
    pub fn attach_event_loop(&mut self, handle: LoopHandle<'static, Server>, signal: LoopSignal) {
        self.loop_handle = Some(handle);
        self.loop_signal = Some(signal);
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn input(&self) -> &InputManager<BoundAction> {
        &self.input
    }

    pub fn root(&self) -> &Root {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Root {
        &mut self.root
    }

    pub fn outputs(&self) -> &OutputLayout {
        &self.outputs
    }

    pub fn monitor(&self) -> &Rc<RefCell<SubprocessMonitor>> {
        &self.monitor
    }

    pub fn idle(&self) -> &IdleMonitor {
        &self.idle
    }

    pub fn task_list(&self) -> &TaskList {
        &self.task_list
    }

    pub fn root_menu(&self) -> Option<&RootMenu> {
        self.root_menu.as_ref()
    }

    pub fn dock(&self) -> Option<&Dock> {
        self.dock.as_ref()
    }

    pub fn clip(&self) -> Option<&Clip> {
        self.clip.as_ref()
    }

    pub fn cursor_position(&self) -> PointF {
        self.input.cursor().position()
    }

    pub fn cursor_image(&self) -> CursorKind {
        self.input.cursor().image()
    }

    /// A fresh id for a client surface.
    pub fn allocate_surface(&mut self) -> SurfaceId {
        self.root.ids_mut().surface()
    }

    // -- Actions -----------------------------------------------------------

    /// Carries out one action. Returns whether it claimed the input that
    /// triggered it.
    pub fn execute(&mut self, bound: &BoundAction) -> bool {
        if self.root.is_locked() && !allowed_while_locked(bound.action) {
            debug!("🔒 {} ignored while locked", bound);
            return false;
        }
        debug!("Executing {}", bound);
        let argument = bound.argument.as_deref().unwrap_or_default();
        let claimed = match bound.action {
            Action::Quit => {
                self.quit();
                true
            }
            Action::LockScreen => {
                let event = self.idle.lock_now();
                self.idle_event(event);
                true
            }
            Action::LockInhibitBegin => {
                self.idle.inhibit_begin();
                true
            }
            Action::LockInhibitEnd => {
                self.idle.inhibit_end(Instant::now());
                true
            }
            Action::LaunchTerminal => {
                let terminal = self.config.terminal.clone();
                match exec_command(&terminal) {
                    Ok(command) => {
                        self.spawn(command, &terminal);
                    }
                    Err(err) => warn!("Terminal \"{}\": {}", terminal, err),
                }
                true
            }
            Action::ShellExecute => {
                self.spawn(shell_command(argument), argument);
                true
            }
            Action::Execute => {
                match exec_command(argument) {
                    Ok(command) => {
                        self.spawn(command, argument);
                    }
                    Err(err) => warn!("Execute \"{}\": {}", argument, err),
                }
                true
            }

            Action::WorkspacePrevious => {
                self.root.switch_to_previous_workspace();
                true
            }
            Action::WorkspaceNext => {
                self.root.switch_to_next_workspace();
                true
            }
            Action::WorkspaceAdd => {
                let index = self.root.add_workspace(NEW_WORKSPACE_NAME, None);
                info!("🗂️ Added workspace {}", index);
                true
            }
            Action::WorkspaceDestroyLast => {
                self.root.destroy_last_workspace();
                true
            }

            Action::TaskNext => self.task_list.step(&mut self.root, Direction::Next),
            Action::TaskPrevious => self.task_list.step(&mut self.root, Direction::Previous),

            Action::WindowDeiconify => {
                let Some(id) = self.root.current_workspace().iconified().last().copied() else {
                    return false;
                };
                self.root.deiconify_window(id);
                self.root.activate_window(id);
                true
            }
            Action::RootMenu => {
                let at = self.input.cursor().position().floor();
                match self.root_menu.as_mut() {
                    Some(menu) => {
                        menu.open(&mut self.root, at, MenuMode::Normal);
                        true
                    }
                    None => false,
                }
            }
            Action::OutputMagnify => {
                if self.outputs.magnify() {
                    self.apply_output_layout();
                }
                true
            }
            Action::OutputReduce => {
                if self.outputs.reduce() {
                    self.apply_output_layout();
                }
                true
            }
            Action::OutputSaveState => {
                match &self.state_path {
                    Some(path) => {
                        if let Err(err) = self.outputs.save_state(path) {
                            error!("❌ {:#}", err);
                        }
                    }
                    None => warn!("No state file to save outputs to"),
                }
                true
            }
            Action::SwitchToVt(vt) => {
                if let Err(err) = self.session.switch_vt(u32::from(vt)) {
                    warn!("Switching to VT {}: {}", vt, err);
                }
                true
            }

            action => {
                let Some(id) = self.root.activated_window() else {
                    return false;
                };
                self.window_action(action, id)
            }
        };
        self.refresh_shell();
        claimed
    }

    /// Window actions on `id`.
    fn window_action(&mut self, action: Action, id: WindowId) -> bool {
        let Some(state) = self.root.window(id).map(|w| w.state()) else {
            return false;
        };
        let current = self.root.current_index();
        match action {
            Action::WindowRaise => self.root.raise_window(id),
            Action::WindowLower => self.root.lower_window(id),
            Action::WindowToggleFullscreen => self.root.request_fullscreen(id, !state.fullscreen),
            Action::WindowToggleMaximized => self.root.request_maximized(id, !state.maximized),
            Action::WindowMaximize => self.root.request_maximized(id, true),
            Action::WindowUnmaximize => self.root.request_maximized(id, false),
            Action::WindowFullscreen => self.root.request_fullscreen(id, true),
            Action::WindowShade => self.root.set_shaded(id, true),
            Action::WindowUnshade => self.root.set_shaded(id, false),
            Action::WindowMinimize => self.root.iconify_window(id),
            Action::WindowClose => self.root.request_close(id),
            Action::WindowToNextWorkspace | Action::WindowToPreviousWorkspace => {
                let target = if action == Action::WindowToNextWorkspace {
                    current + 1
                } else {
                    match current.checked_sub(1) {
                        Some(target) => target,
                        None => return true,
                    }
                };
                if target < self.root.workspaces().len() {
                    if let Err(err) = self.root.move_window_to_workspace(id, target) {
                        warn!("Moving {}: {}", id, err);
                    }
                }
            }
            other => {
                debug!("{} is not a window action", other);
                return false;
            }
        }
        true
    }

    fn window_menu_command(&mut self, id: WindowId, command: WindowMenuCommand) {
        debug!("{}: menu {:?}", id, command);
        match command {
            WindowMenuCommand::Shade => self.root.set_shaded(id, true),
            WindowMenuCommand::Unshade => self.root.set_shaded(id, false),
            WindowMenuCommand::Maximize => self.root.request_maximized(id, true),
            WindowMenuCommand::Unmaximize => self.root.request_maximized(id, false),
            WindowMenuCommand::Fullscreen => self.root.request_fullscreen(id, true),
            WindowMenuCommand::Minimize => self.root.iconify_window(id),
            WindowMenuCommand::Close => self.root.request_close(id),
            WindowMenuCommand::MoveToWorkspace(target) => {
                if let Err(err) = self.root.move_window_to_workspace(id, target) {
                    warn!("Moving {}: {}", id, err);
                }
            }
        }
    }

    fn quit(&mut self) {
        info!("🛑 Quit requested");
        self.running = false;
        if let Some(signal) = &self.loop_signal {
            signal.stop();
        }
    }

    fn spawn(&mut self, command: Command, what: &str) -> Option<SubprocessId> {
        let launched = self.monitor.borrow_mut().launch(command);
        match launched {
            Ok(id) => {
                if let Some(handle) = &self.loop_handle {
                    if let Err(err) = watch_output(&self.monitor, handle, id) {
                        warn!("{}: {}", id, err);
                    }
                }
                Some(id)
            }
            Err(err) => {
                error!("❌ Failed to start \"{}\": {}", what, err);
                None
            }
        }
    }

    /// Spawns a startup command under the monitor.
    pub fn run_command(&mut self, line: &str) -> Option<SubprocessId> {
        self.spawn(shell_command(line), line)
    }

    fn idle_event(&mut self, event: IdleEvent) {
        match event {
            IdleEvent::Lock => match self.config.screen_lock.command.clone() {
                Some(command) => {
                    info!("🔒 Locking the screen");
                    self.spawn(shell_command(&command), &command);
                }
                None => warn!("🔒 No ScreenLock.Command configured"),
            },
        }
    }

    /// Keeps the clip label and the dock indicators current.
    fn refresh_shell(&mut self) {
        if let Some(clip) = &self.clip {
            clip.update(&mut self.root);
        }
        if let Some(dock) = &self.dock {
            dock.refresh(self.root.scene_mut());
        }
    }

    // -- Timers and children -----------------------------------------------

    /// Runs due timers. Returns how long until the next one, if any.
    pub fn tick(&mut self, now: Instant) -> Option<Duration> {
        if let Some(event) = self.idle.poll(now) {
            self.idle_event(event);
        }
        if let Some(action) = self.hot_corners.poll(now) {
            self.execute(&action);
        }
        if self.loop_handle.is_none() {
            self.monitor.borrow_mut().poll_output();
        }
        match (self.idle.remaining(now), self.hot_corners.remaining(now)) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Collects exited children (on SIGCHLD).
    pub fn reap_children(&mut self) -> Vec<(SubprocessId, Termination)> {
        let reaped = self.monitor.borrow_mut().reap();
        if let Some(dock) = self.dock.as_mut() {
            for (id, _) in &reaped {
                dock.subprocess_terminated(*id);
            }
        }
        self.refresh_shell();
        reaped
    }

    // -- Scene events ------------------------------------------------------

    /// Drains the scene's events until it stops raising new ones.
    fn process_scene_events(&mut self) {
        loop {
            let events = self.root.take_events();
            if events.is_empty() {
                break;
            }
            for event in events {
                self.scene_event(event);
            }
        }
        self.refresh_shell();
    }

    fn scene_event(&mut self, event: SceneEvent) {
        let cursor = self.input.cursor().position();
        match event {
            SceneEvent::Client(input) => {
                let entered = match input {
                    ClientInput::KeyboardEnter { surface } => Some(surface),
                    _ => None,
                };
                self.seat.send(input);
                if let Some(surface) = entered {
                    let modifiers = self.input.serialized_modifiers();
                    self.seat.send(ClientInput::KeyboardModifiers { surface, modifiers });
                }
            }
            SceneEvent::SurfaceClicked(surface) => {
                if let Some(window) = self.root.grabbed_popup_window() {
                    let inside = self.root.window_for_surface(surface) == Some(window)
                        || self
                            .root
                            .popup_for_surface(surface)
                            .and_then(|p| self.root.popup_window(p))
                            == Some(window);
                    if !inside {
                        self.root.dismiss_popups_of(window);
                    }
                }
                if let Some(id) = self.root.window_for_surface(surface) {
                    self.root.activate_window(id);
                }
            }
            SceneEvent::WindowActivate(id) => self.root.activate_window(id),
            SceneEvent::WindowMove(id) => {
                if self.root.begin_window_move(id, cursor) {
                    self.root.release_pointer_grabs();
                }
            }
            SceneEvent::WindowResize(id, edges) => {
                if self.root.begin_window_resize(id, edges, cursor) {
                    self.root.release_pointer_grabs();
                }
            }
            SceneEvent::WindowMenu(id) | SceneEvent::ButtonClicked(ButtonTag::WindowMenu(id)) => {
                if self.root.show_window_menu(id, cursor.floor()) {
                    self.root.release_pointer_grabs();
                }
            }
            SceneEvent::WindowToggleShade(id) => {
                if let Some(shaded) = self.root.window(id).map(|w| w.state().shaded) {
                    self.root.set_shaded(id, !shaded);
                }
            }
            SceneEvent::ButtonClicked(ButtonTag::WindowClose(id)) => self.root.request_close(id),
            SceneEvent::ButtonClicked(tag) => self.shell_button(tag),
            SceneEvent::MenuHover { .. } | SceneEvent::MenuTrigger { .. } | SceneEvent::MenuKey { .. } => {
                self.menu_event(&event)
            }
            SceneEvent::BackgroundButton { button, position } => {
                self.root.hide_window_menus();
                if let Some(menu) = self.root_menu.as_mut() {
                    if button == BTN_RIGHT {
                        if menu.open(&mut self.root, position.floor(), MenuMode::RightClick) {
                            self.root.release_pointer_grabs();
                        }
                    } else if button == BTN_LEFT {
                        menu.close(&mut self.root);
                    }
                }
            }
        }
    }

    fn shell_button(&mut self, tag: ButtonTag) {
        if let Some(index) = self.dock.as_ref().and_then(|dock| dock.tile_for(tag)) {
            let monitor = Rc::clone(&self.monitor);
            let Some(dock) = self.dock.as_mut() else {
                return;
            };
            let launched = match &self.loop_handle {
                Some(handle) => dock.launch_watched(index, &monitor, handle),
                None => dock.launch(index, &monitor),
            };
            if let Err(err) = launched {
                error!("❌ Dock launcher {}: {}", index, err);
            }
            return;
        }
        if let Some(action) = self.clip.as_ref().and_then(|clip| clip.action_for(tag)) {
            self.execute(&BoundAction::new(action));
        }
    }

    fn menu_event(&mut self, event: &SceneEvent) {
        if let Some(menu) = self.root_menu.as_mut() {
            match menu.handle(&mut self.root, event) {
                MenuOutcome::Ignored => {}
                MenuOutcome::Triggered(action) => {
                    self.execute(&action);
                    return;
                }
                MenuOutcome::Handled | MenuOutcome::Dismissed => return,
            }
        }
        if let Some((id, MenuOutcome::Triggered(command))) = self.root.window_menu_event(event) {
            self.window_menu_command(id, command);
        }
    }

    // -- Toplevels ---------------------------------------------------------

    pub fn toplevel_created(
        &mut self,
        surface: SurfaceId,
        handle: Box<dyn ToplevelHandle>,
        client: ClientIdentity,
    ) -> WindowId {
        let id = self.root.create_client_window(surface, handle, client, false);
        let mode = self.decorations.negotiate(id, None);
        self.root.set_window_decorated(id, mode == DecorationMode::ServerSide);
        id
    }

    /// The client stated (or withdrew) an xdg-decoration preference. The
    /// resolved mode is what the bridge echoes back.
    pub fn toplevel_decoration(
        &mut self,
        id: WindowId,
        preference: Option<ClientPreference>,
    ) -> DecorationMode {
        let mode = self.decorations.negotiate(id, preference);
        self.root.set_window_decorated(id, mode == DecorationMode::ServerSide);
        mode
    }

    /// A toplevel commit. The window maps on its first commit with a
    /// buffer and unmaps when the buffer goes away.
    pub fn toplevel_commit(
        &mut self,
        id: WindowId,
        acked: Option<Serial>,
        size: Size,
    ) -> Result<WindowCommit, ProtocolError> {
        let commit = self.root.commit_window(id, acked, size)?;
        let Some(window) = self.root.window(id) else {
            return Ok(commit);
        };
        let (mapped, has_content) = (window.is_mapped(), window.has_content());
        if !mapped && has_content {
            self.map_new_window(id);
        } else if mapped && !has_content {
            if let Err(err) = self.root.unmap_window(id) {
                warn!("{}: {}", id, err);
            }
        }
        self.refresh_shell();
        Ok(commit)
    }

    /// Maps on the current workspace, centred on the output under the
    /// cursor.
    fn map_new_window(&mut self, id: WindowId) {
        let workspace = self.root.current_index();
        if let Err(err) = self.root.map_window(id, workspace) {
            warn!("{}: {}", id, err);
            return;
        }
        let cursor = self.input.cursor().position().floor();
        let probe = Rectangle::from_loc_and_size(cursor, Size::new(1, 1));
        let usable = self.root.current_workspace().usable_for(probe);
        if let Some(size) = self.root.window(id).map(|w| w.outer_size()) {
            let center = usable.center();
            self.root
                .set_window_position(id, Point::new(center.x - size.width / 2, center.y - size.height / 2));
            self.root.confine_window(id);
        }
        self.root.activate_window(id);
    }

    pub fn toplevel_destroyed(&mut self, id: WindowId) {
        if let Err(err) = self.root.destroy_window(id) {
            debug!("{}: {}", id, err);
        }
        self.decorations.remove_window(id);
        self.refresh_shell();
    }

    pub fn toplevel_request_maximized(&mut self, id: WindowId, maximized: bool) {
        self.root.request_maximized(id, maximized);
    }

    pub fn toplevel_request_fullscreen(&mut self, id: WindowId, fullscreen: bool) {
        self.root.request_fullscreen(id, fullscreen);
    }

    pub fn toplevel_request_minimize(&mut self, id: WindowId) {
        self.root.iconify_window(id);
    }

    pub fn toplevel_request_move(&mut self, id: WindowId) -> bool {
        let cursor = self.input.cursor().position();
        self.root.begin_window_move(id, cursor)
    }

    pub fn toplevel_request_resize(&mut self, id: WindowId, edges: Edges) -> bool {
        let cursor = self.input.cursor().position();
        self.root.begin_window_resize(id, edges, cursor)
    }

    pub fn toplevel_set_title(&mut self, id: WindowId, title: &str) {
        self.root.set_window_title(id, title);
    }

    pub fn toplevel_set_app_id(&mut self, id: WindowId, app_id: &str) {
        self.root.set_window_app_id(id, app_id);
    }

    /// `at` is relative to the window's content.
    pub fn toplevel_show_window_menu(&mut self, id: WindowId, at: Point) -> bool {
        let Some(window) = self.root.window(id) else {
            return false;
        };
        let origin = window.position() + window.content_offset();
        self.root.show_window_menu(id, origin + at)
    }

    // -- Popups ------------------------------------------------------------

    /// `geometry` is the positioner's result, relative to the parent.
    pub fn popup_created(
        &mut self,
        surface: SurfaceId,
        parent: PopupParent,
        geometry: Rectangle,
        handle: Box<dyn PopupHandle>,
    ) -> Result<PopupId, ProtocolError> {
        let id = self.root.create_popup(surface, parent, handle)?;
        self.root.place_popup(id, geometry);
        Ok(id)
    }

    pub fn popup_commit(&mut self, id: PopupId, acked: Option<Serial>, size: Size) -> Result<(), ProtocolError> {
        self.root.commit_popup(id, acked, size)
    }

    pub fn popup_grab(&mut self, id: PopupId) {
        self.root.grab_popup(id);
    }

    pub fn popup_destroyed(&mut self, id: PopupId) {
        self.root.destroy_popup(id);
    }

    // -- Layer surfaces ----------------------------------------------------

    pub fn layer_surface_created(
        &mut self,
        surface: SurfaceId,
        layer: LayerKind,
        output: Option<OutputId>,
        handle: Box<dyn LayerSurfaceHandle>,
    ) -> PanelId {
        let id = self.root.ids_mut().panel();
        self.root
            .add_panel(Panel::new_client(id, surface, layer, output, handle))
    }

    /// Double-buffered state the client set since its last commit.
    pub fn layer_surface_pending(&mut self, id: PanelId) -> Option<&mut PanelConfig> {
        self.root.panel_mut(id).map(Panel::pending_mut)
    }

    pub fn layer_surface_commit(
        &mut self,
        id: PanelId,
        acked: Option<Serial>,
        size: Size,
    ) -> Result<PanelCommit, ProtocolError> {
        self.root.commit_panel(id, acked, size)
    }

    pub fn layer_surface_destroyed(&mut self, id: PanelId) {
        self.root.remove_panel(id);
    }

    // -- Session lock ------------------------------------------------------

    pub fn lock_created(&mut self, handle: Box<dyn LockHandle>) -> LockId {
        self.locks.create_lock(&mut self.root, handle)
    }

    pub fn lock_surface_created(
        &mut self,
        lock: LockId,
        surface: SurfaceId,
        output: OutputId,
        handle: Box<dyn LockSurfaceHandle>,
    ) -> Result<(), ProtocolError> {
        self.locks
            .create_surface(&mut self.root, lock, surface, output, handle)
    }

    pub fn lock_surface_commit(
        &mut self,
        surface: SurfaceId,
        acked: Option<Serial>,
        size: Size,
    ) -> Result<(), ProtocolError> {
        let result = self.locks.commit_surface(&mut self.root, surface, acked, size);
        if self.root.is_locked() {
            self.task_list.cancel();
            if let Some(menu) = self.root_menu.as_mut() {
                menu.close(&mut self.root);
            }
        }
        result
    }

    pub fn lock_unlock(&mut self, lock: LockId) -> Result<(), ProtocolError> {
        self.locks.unlock(&mut self.root, lock)?;
        self.idle.activity(Instant::now());
        Ok(())
    }

    pub fn lock_surface_destroyed(&mut self, surface: SurfaceId) {
        self.locks.destroy_surface(&mut self.root, surface);
    }

    pub fn lock_destroyed(&mut self, lock: LockId) {
        self.locks.destroy_lock(&mut self.root, lock);
    }

    // -- Outputs -----------------------------------------------------------

    pub fn output_added(&mut self, name: &str, mode: Size) -> OutputId {
        let id = self.root.ids_mut().output();
        self.outputs.add(id, name, mode);
        self.apply_output_layout();
        id
    }

    pub fn output_removed(&mut self, id: OutputId) {
        if self.outputs.remove(id) {
            self.apply_output_layout();
        }
    }

    pub fn output_mode_changed(&mut self, id: OutputId, mode: Size) {
        if self.outputs.set_mode(id, mode) {
            self.apply_output_layout();
        }
    }

    /// Pushes the output layout to the scene, the lock surfaces, the cursor
    /// and the hot corners.
    fn apply_output_layout(&mut self) {
        self.root.set_outputs(self.outputs.geometries());
        self.locks.outputs_changed(&mut self.root);
        let extents = self.outputs.extents();
        self.input.cursor_mut().set_bounds(extents);
        if let Some(action) = self.hot_corners.set_extents(extents) {
            self.execute(&action);
        }
        self.refresh_shell();
    }

    // -- Input -------------------------------------------------------------

    pub fn keyboard_key(&mut self, keycode: u32, pressed: bool, time_msec: u32) {
        self.idle.activity(Instant::now());
        let key = self.input.translate(keycode, pressed);

        let mut claimed = false;
        if pressed {
            'keysyms: for keysym in &key.keysyms {
                for action in self.input.matching(key.modifiers, *keysym) {
                    if self.execute(&action) {
                        claimed = true;
                        break 'keysyms;
                    }
                }
            }
        }
        let routing = self
            .input
            .settle(keycode, &key.keysyms, key.modifiers, pressed, time_msec, claimed);

        if !pressed {
            let held = self.input.modifiers();
            if let Some(id) = self.task_list.key_released(&mut self.root, held) {
                debug!("Task list raised {}", id);
            }
        }
        if let (Some(modifiers), Some(surface)) = (key.serialized, self.focused_surface()) {
            self.seat.send(ClientInput::KeyboardModifiers { surface, modifiers });
        }
        if let KeyRouting::Forward(event) = routing {
            self.root.keyboard_key(&event);
        }
        self.process_scene_events();
    }

    fn focused_surface(&self) -> Option<SurfaceId> {
        self.root.keyboard_focus_surface()
    }

    pub fn pointer_motion(&mut self, dx: f64, dy: f64, time_msec: u32) {
        let position = self.input.cursor_mut().move_by(dx, dy);
        self.pointer_moved(position, time_msec);
    }

    pub fn pointer_motion_absolute(&mut self, position: PointF, time_msec: u32) {
        let position = self.input.cursor_mut().warp(position);
        self.pointer_moved(position, time_msec);
    }

    fn pointer_moved(&mut self, position: PointF, time_msec: u32) {
        let now = Instant::now();
        self.idle.activity(now);
        if let Some(action) = self.hot_corners.pointer_moved(position, now) {
            self.execute(&action);
        }
        let image = match PointerMode::of(self.root.drag()) {
            PointerMode::Passthrough => {
                self.root.pointer_motion(position, time_msec);
                self.root.cursor()
            }
            PointerMode::Move => {
                self.root.drag_motion(position);
                CursorKind::Move
            }
            PointerMode::Resize(edges) => {
                self.root.drag_motion(position);
                CursorKind::Resize(edges)
            }
        };
        self.input.cursor_mut().set_image(image);
        self.process_scene_events();
    }

    pub fn pointer_button(&mut self, button: u32, pressed: bool, time_msec: u32) {
        self.idle.activity(Instant::now());
        let state = if pressed {
            ButtonState::Pressed
        } else {
            ButtonState::Released
        };
        if !pressed && self.root.drag().is_some() {
            if let Some(drag) = self.root.end_drag() {
                debug!("{}: drag ended", drag.window);
            }
            self.root.release_pointer_grabs();
            return;
        }
        let event = ButtonEvent {
            button,
            state,
            time_msec,
            position: self.input.cursor().position(),
        };
        self.root.pointer_button(&event);
        self.process_scene_events();

        if !pressed && button == BTN_RIGHT {
            if let Some(menu) = self.root_menu.as_mut() {
                if let MenuOutcome::Triggered(action) = menu.button_released(&mut self.root) {
                    self.execute(&action);
                }
            }
        }
    }

    pub fn pointer_axis(&mut self, axis: Axis, delta: f64, time_msec: u32) {
        self.idle.activity(Instant::now());
        self.root.pointer_axis(&AxisEvent {
            axis,
            delta,
            time_msec,
        });
        self.process_scene_events();
    }

    // -- Output frames -----------------------------------------------------

    /// Paint list plus damage since the last frame.
    pub fn frame(&mut self) -> Frame {
        self.refresh_shell();
        self.root.frame()
    }
}
