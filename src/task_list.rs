//! Task list
//!
//! `TaskNext`/`TaskPrevious` walk the windows of the current workspace,
//! topmost first and iconified windows last. Stepping activates the
//! selection without raising it; the selection is raised (or restored, when
//! iconified) once the user lets go of the masked modifiers.

use log::debug;

use crate::input::keybinding::Modifiers;
use crate::toolkit::root::Root;
use crate::toolkit::WindowId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

#[derive(Debug)]
struct Cycle {
    windows: Vec<WindowId>,
    index: usize,
}

#[derive(Debug)]
pub struct TaskList {
    mask: Modifiers,
    cycle: Option<Cycle>,
}

impl Default for TaskList {
    fn default() -> Self {
        Self::new(Modifiers::DEFAULT_MASK)
    }
}

impl TaskList {
    /// `mask` names the modifiers whose release commits the selection.
    pub fn new(mask: Modifiers) -> Self {
        Self { mask, cycle: None }
    }

    pub fn is_active(&self) -> bool {
        self.cycle.is_some()
    }

    pub fn selection(&self) -> Option<WindowId> {
        self.cycle.as_ref().map(|c| c.windows[c.index])
    }

    /// Titles of the cycled windows and the selected index, for display.
    pub fn entries(&self, root: &Root) -> Vec<(String, bool)> {
        let Some(cycle) = &self.cycle else {
            return Vec::new();
        };
        cycle
            .windows
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let title = root.window(*id).map(|w| w.title().to_string()).unwrap_or_default();
                (title, i == cycle.index)
            })
            .collect()
    }

    fn snapshot(root: &Root) -> Vec<WindowId> {
        let workspace = root.current_workspace();
        workspace
            .windows()
            .iter()
            .rev()
            .chain(workspace.iconified().iter())
            .copied()
            .collect()
    }

    /// Moves the selection. Returns false when there is nothing to cycle.
    pub fn step(&mut self, root: &mut Root, direction: Direction) -> bool {
        if self.cycle.is_none() {
            let windows = Self::snapshot(root);
            if windows.is_empty() {
                return false;
            }
            let activated = root.current_workspace().activated();
            let index = windows.iter().position(|w| Some(*w) == activated).unwrap_or(0);
            self.cycle = Some(Cycle { windows, index });
        }
        let Some(cycle) = self.cycle.as_mut() else {
            return false;
        };
        // Windows destroyed mid-cycle drop out.
        cycle.windows.retain(|w| root.window(*w).is_some());
        if cycle.windows.is_empty() {
            self.cycle = None;
            return false;
        }
        let len = cycle.windows.len();
        cycle.index = match direction {
            Direction::Next => (cycle.index.min(len - 1) + 1) % len,
            Direction::Previous => (cycle.index.min(len - 1) + len - 1) % len,
        };
        let selected = cycle.windows[cycle.index];
        debug!("Task list selects {}", selected);
        if !root.window(selected).map_or(true, |w| w.state().iconified) {
            root.focus_window(selected);
        }
        true
    }

    /// Commits the selection when no masked modifier remains held.
    pub fn key_released(&mut self, root: &mut Root, held: Modifiers) -> Option<WindowId> {
        if self.cycle.is_none() || held.intersects(self.mask) {
            return None;
        }
        self.commit(root)
    }

    pub fn commit(&mut self, root: &mut Root) -> Option<WindowId> {
        let cycle = self.cycle.take()?;
        let selected = cycle.windows[cycle.index];
        let window = root.window(selected)?;
        if window.state().iconified {
            root.deiconify_window(selected);
        }
        root.activate_window(selected);
        debug!("Task list committed {}", selected);
        Some(selected)
    }

    /// Drops the cycle without touching the stacking order.
    pub fn cancel(&mut self) {
        self.cycle = None;
    }
}
