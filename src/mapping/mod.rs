//! Sensor-to-pointer mapping core.
//!
//! Turns the device message stream into pointer commands:
//!
//! 1. [`orientation`] - Euler angles to absolute screen coordinates
//! 2. [`suppression`] - Cursor freeze window after a button-down
//! 3. [`buttons`] - Digital port edges to button transitions
//! 4. [`engine`] - Per-session state and the task that drains the channel

pub mod buttons;
pub mod engine;
pub mod error;
pub mod orientation;
pub mod suppression;

pub use engine::{MapperHandle, MapperReport, MapperStats, PointerMapper};
pub use error::MappingError;
