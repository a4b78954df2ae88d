//! OS pointer output
//!
//! [`PointerCommand`]s produced by the mapping core are handed to a
//! [`PointerSink`], the collaborator that injects them into the host's input
//! stack. Coordinates use the absolute-pointer convention where
//! `(0, 0)..(65535, 65535)` spans the whole screen.

pub mod logging;
#[cfg(target_os = "linux")]
pub mod uinput;

use crate::config::{PointerBackendKind, PointerConfig};
use std::fmt;
use tracing::info;

/// Largest coordinate of the absolute pointer space
pub const ABSOLUTE_MAX: i32 = 65535;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    /// Primary button, driven by AX1
    Left,
    /// Secondary button, driven by AX0
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonEdge {
    Down,
    Up,
}

/// Instruction for the OS input collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerCommand {
    /// Absolute move; values may lie outside `0..=ABSOLUTE_MAX`, the sink clamps
    MoveAbsolute { x: i32, y: i32 },
    Button { button: MouseButton, edge: ButtonEdge },
}

impl fmt::Display for PointerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointerCommand::MoveAbsolute { x, y } => write!(f, "move to ({}, {})", x, y),
            PointerCommand::Button { button, edge } => write!(f, "{:?} {:?}", button, edge),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PointerError {
    #[error("Failed to create pointer device: {0}")]
    InitializationError(String),

    #[error("Failed to emit pointer event: {0}")]
    EmitError(String),

    #[error("Pointer backend {0:?} is not available on this platform")]
    Unsupported(PointerBackendKind),
}

/// Consumer of pointer commands
pub trait PointerSink: Send {
    fn emit(&mut self, command: &PointerCommand) -> Result<(), PointerError>;

    fn name(&self) -> &str;
}

/// Clamps a coordinate into the absolute pointer space
pub fn clamp_coordinate(value: i32) -> i32 {
    value.clamp(0, ABSOLUTE_MAX)
}

/// Creates the sink selected in the configuration
pub fn open_pointer(config: &PointerConfig) -> Result<Box<dyn PointerSink>, PointerError> {
    match config.backend {
        PointerBackendKind::Log => {
            info!("Using logging pointer backend");
            Ok(Box::new(logging::LogPointer::new(&config.device_name)))
        }
        PointerBackendKind::Uinput => open_uinput(config),
    }
}

#[cfg(target_os = "linux")]
fn open_uinput(config: &PointerConfig) -> Result<Box<dyn PointerSink>, PointerError> {
    info!("Creating uinput pointer '{}'", config.device_name);
    Ok(Box::new(uinput::UinputPointer::create(&config.device_name)?))
}

#[cfg(not(target_os = "linux"))]
fn open_uinput(config: &PointerConfig) -> Result<Box<dyn PointerSink>, PointerError> {
    tracing::warn!("uinput requested for '{}' on a non-Linux host", config.device_name);
    Err(PointerError::Unsupported(PointerBackendKind::Uinput))
}
