//! Server-side decoration policy and theme
//!
//! Clients state a decoration preference through xdg-decoration; the
//! configured policy decides whether the compositor draws the titlebar,
//! borders and resize bar itself. The [`DecorationTheme`] supplies the
//! metrics the window layout is computed from.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::geometry::{Rectangle, Size};
use crate::toolkit::{Color, WindowId};

/// Who draws a window's decorations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecorationMode {
    /// Client-side decorations (app draws its own titlebar)
    ClientSide,
    /// Server-side decorations (compositor draws titlebar)
    ServerSide,
}

/// The mode a client asked for via xdg-decoration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientPreference {
    ClientSide,
    ServerSide,
}

/// `Decoration.Mode` from the configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DecorationPolicy {
    /// Follow the client's preference; client-side if it has none.
    SuggestClient,
    /// Follow the client's preference; server-side if it has none.
    #[default]
    SuggestServer,
    EnforceClient,
    EnforceServer,
}

impl DecorationPolicy {
    pub fn resolve(self, preference: Option<ClientPreference>) -> DecorationMode {
        let follow = |fallback| match preference {
            Some(ClientPreference::ClientSide) => DecorationMode::ClientSide,
            Some(ClientPreference::ServerSide) => DecorationMode::ServerSide,
            None => fallback,
        };
        match self {
            DecorationPolicy::SuggestClient => follow(DecorationMode::ClientSide),
            DecorationPolicy::SuggestServer => follow(DecorationMode::ServerSide),
            DecorationPolicy::EnforceClient => DecorationMode::ClientSide,
            DecorationPolicy::EnforceServer => DecorationMode::ServerSide,
        }
    }
}

/// Decoration metrics and colours
#[derive(Debug, Clone, PartialEq)]
pub struct DecorationTheme {
    /// Titlebar height in pixels
    pub titlebar_height: i32,

    /// Width of the four borders
    pub border_width: i32,

    /// Height of the resize bar below the content
    pub resizebar_height: i32,

    /// Width of the corner sections of the resize bar
    pub resizebar_corner_width: i32,

    /// Titlebar button size (square)
    pub button_size: i32,

    pub titlebar_focused: Color,
    pub titlebar_blurred: Color,
    pub text_focused: Color,
    pub text_blurred: Color,
    pub border_color: Color,
    pub resizebar_color: Color,
}

impl Default for DecorationTheme {
    fn default() -> Self {
        Self {
            titlebar_height: 22,
            border_width: 1,
            resizebar_height: 7,
            resizebar_corner_width: 29,
            button_size: 22,
            titlebar_focused: Color(0xff00_0000),
            titlebar_blurred: Color(0xff66_6666),
            text_focused: Color(0xffff_ffff),
            text_blurred: Color(0xff00_0000),
            border_color: Color(0xff00_0000),
            resizebar_color: Color(0xffaa_aaaa),
        }
    }
}

impl DecorationTheme {
    /// Size of the decorated window around content of `content` size.
    pub fn outer_size(&self, content: Size) -> Size {
        Size::new(
            content.width + 2 * self.border_width,
            content.height + 2 * self.border_width + self.titlebar_height + self.resizebar_height,
        )
    }

    /// Content size that fits a decorated window of `outer` size.
    pub fn content_size(&self, outer: Size) -> Size {
        Size::new(
            (outer.width - 2 * self.border_width).max(1),
            (outer.height - 2 * self.border_width - self.titlebar_height - self.resizebar_height)
                .max(1),
        )
    }

    /// Calculate the content area rectangle for a window (accounting for decorations)
    pub fn content_rect(&self, window_rect: Rectangle) -> Rectangle {
        let content = self.content_size(window_rect.size());
        Rectangle::new(
            window_rect.x + self.border_width,
            window_rect.y + self.border_width + self.titlebar_height,
            content.width,
            content.height,
        )
    }

    /// Smallest outer size that still shows the titlebar buttons.
    pub fn minimum_outer_size(&self) -> Size {
        Size::new(
            3 * self.button_size + 2 * self.border_width,
            2 * self.border_width + self.titlebar_height + self.resizebar_height + 1,
        )
    }
}

/// Resolves and remembers decoration modes per window.
#[derive(Debug)]
pub struct DecorationManager {
    /// Theme settings
    theme: DecorationTheme,

    policy: DecorationPolicy,

    /// Resolved decoration mode by window
    modes: HashMap<WindowId, DecorationMode>,
}

impl DecorationManager {
    pub fn new(policy: DecorationPolicy, theme: DecorationTheme) -> Self {
        info!(
            "🎨 Decorations: policy {:?}, titlebar {}px, border {}px",
            policy, theme.titlebar_height, theme.border_width
        );
        Self {
            theme,
            policy,
            modes: HashMap::new(),
        }
    }

    pub fn policy(&self) -> DecorationPolicy {
        self.policy
    }

    pub fn theme(&self) -> &DecorationTheme {
        &self.theme
    }

    /// Resolves the mode for a window from the client's preference.
    /// Returns the mode, which the bridge echoes back to the client.
    pub fn negotiate(&mut self, window: WindowId, preference: Option<ClientPreference>) -> DecorationMode {
        let mode = self.policy.resolve(preference);
        if self.modes.insert(window, mode) != Some(mode) {
            debug!("{}: decoration {:?} (client asked {:?})", window, mode, preference);
        }
        mode
    }

    pub fn mode(&self, window: WindowId) -> DecorationMode {
        self.modes
            .get(&window)
            .copied()
            .unwrap_or_else(|| self.policy.resolve(None))
    }

    /// Remove window from decoration management
    pub fn remove_window(&mut self, window: WindowId) {
        if self.modes.remove(&window).is_some() {
            debug!("🗑️ Removed decoration for {}", window);
        }
    }
}
