//! # Lodestar Wayland Compositor Library
//!
//! A Window Maker-inspired compositor core: server-side decorations,
//! numbered workspaces, a dock and a clip, a root menu, hot corners and an
//! ext-session-lock curtain.
//!
//! ## Architecture
//!
//! Lodestar is built on a modular architecture:
//! - `toolkit`: Scene tree, windows, popups, panels, workspaces and the root
//! - `input`: XKB keyboard, key bindings and the cursor
//! - `action`: The named actions bindings and menus dispatch to
//! - `lock`: ext-session-lock-v1 sessions and the curtain
//! - `subprocess`: Child processes and the windows they create
//! - `config`: Property-list configuration parsing
//! - `protocol`: Handles the Wayland bridge implements for each role
//! - `server`: The compositor server tying it all together
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lodestar::protocol::headless::{HeadlessSeat, HeadlessSession};
//! use lodestar::{Config, Server};
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::builtin()?;
//!     let mut server = Server::new(
//!         config,
//!         Box::new(HeadlessSeat::new()),
//!         Box::new(HeadlessSession::new()),
//!     )?;
//!     server.output_added("HEADLESS-1", lodestar::geometry::Size::new(1920, 1080));
//!     Ok(())
//! }
//! ```

pub mod action;
pub mod config;
pub mod decoration;
pub mod dock;
pub mod error;
pub mod geometry;
pub mod hot_corner;
pub mod idle;
pub mod input;
pub mod lock;
pub mod output;
pub mod protocol;
pub mod root_menu;
pub mod server;
pub mod signals;
pub mod subprocess;
pub mod task_list;
pub mod toolkit;

// Re-export main types for easy access
pub use action::{Action, BoundAction};
pub use config::Config;
pub use error::ToolkitError;
pub use input::InputManager;
pub use lock::LockManager;
pub use server::Server;
pub use subprocess::SubprocessMonitor;
pub use toolkit::root::Root;

// Re-export common error types
pub use anyhow::{Context, Error, Result};

/// Version information for Lodestar
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
