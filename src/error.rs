//! Error types shared across the toolkit and the session plumbing.
//!
//! Subsystems with richer failure modes keep their own error enums next to
//! the code (`config::ConfigError`, `protocol::ProtocolError`,
//! `input::keybinding::KeyComboError`, `subprocess::SubprocessError`).

use thiserror::Error;

use crate::toolkit::{NodeId, WindowId};

/// Precondition violations in the scene tree and the window model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolkitError {
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),

    #[error("node {0} is not a container")]
    NotAContainer(NodeId),

    #[error("node {child} already has parent {parent}")]
    AlreadyParented { child: NodeId, parent: NodeId },

    #[error("node {child} is not a child of {parent}")]
    NotAChild { child: NodeId, parent: NodeId },

    #[error("node {0} cannot be added below itself")]
    Cycle(NodeId),

    #[error("window {0} does not exist")]
    UnknownWindow(WindowId),

    #[error("window {0} is already mapped")]
    AlreadyMapped(WindowId),

    #[error("window {0} is not mapped")]
    NotMapped(WindowId),

    #[error("workspace {0} does not exist")]
    UnknownWorkspace(usize),
}

/// Failures reported by the graphics session (VT switching).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("the session does not support VT switching")]
    Unsupported,

    #[error("virtual terminal {0} is out of range")]
    InvalidVt(u32),

    #[error("VT switch failed: {0}")]
    Failed(String),
}
