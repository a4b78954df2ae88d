//! Device subsystem for x-IMU data acquisition
//!
//! Defines the seam between the mapping core and the device-communication
//! collaborator. The collaborator owns port scanning, serial framing and
//! packet validation; the core only sees typed [`DeviceMessage`]s.
//!
//! # Architecture
//!
//! ```text
//! ImuBackend ──scan()──► PortAssignment
//!     │
//!   open() ──► ImuSession ──[DeviceMessage]──► mpsc channel ──► PointerMapper
//!                  │
//!             PacketCounter (idle detection)
//! ```
//!
//! Both message kinds of one session travel through a single channel, so the
//! consumer never sees orientation and digital-I/O handlers run concurrently.

pub mod simulated;

use crate::mapping::orientation::EulerAngles;
use chrono::{DateTime, Local};
use std::fmt;
use tokio::sync::mpsc;

/// A device found by [`ImuBackend::scan`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortAssignment {
    /// Device identifier reported by the device itself
    pub device_id: String,
    /// Transport address the device was found on
    pub port_name: String,
}

impl fmt::Display for PortAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.device_id, self.port_name)
    }
}

/// Orientation payload of a quaternion packet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuaternionData {
    pub w: f32,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl QuaternionData {
    pub const IDENTITY: Self = Self {
        w: 1.0,
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(w: f32, x: f32, y: f32, z: f32) -> Self {
        Self { w, x, y, z }
    }

    /// Converts to ZYX Euler angles in degrees using the device's convention.
    ///
    /// The quaternion describes the earth frame relative to the sensor frame,
    /// which is why the signs differ from the textbook aerospace formulas.
    pub fn to_euler_angles(&self) -> EulerAngles {
        let Self { w, x, y, z } = *self;

        let phi = (2.0 * (y * z - w * x)).atan2(2.0 * w * w - 1.0 + 2.0 * z * z);
        let sin_theta = (2.0 * x * z + 2.0 * w * y).clamp(-1.0, 1.0);
        let theta = -(sin_theta / (1.0 - sin_theta * sin_theta).sqrt()).atan();
        let psi = (2.0 * (x * y - w * z)).atan2(2.0 * w * w - 1.0 + 2.0 * x * x);

        EulerAngles {
            phi: phi.to_degrees(),
            theta: theta.to_degrees(),
            psi: psi.to_degrees(),
        }
    }
}

/// State of the eight auxiliary digital ports at one sample time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DigitalPortBits {
    pub ax0: bool,
    pub ax1: bool,
    pub ax2: bool,
    pub ax3: bool,
    pub ax4: bool,
    pub ax5: bool,
    pub ax6: bool,
    pub ax7: bool,
}

impl DigitalPortBits {
    /// Unpacks the port byte, AX0 in the least significant bit
    pub fn from_byte(byte: u8) -> Self {
        Self {
            ax0: byte & 0x01 != 0,
            ax1: byte & 0x02 != 0,
            ax2: byte & 0x04 != 0,
            ax3: byte & 0x08 != 0,
            ax4: byte & 0x10 != 0,
            ax5: byte & 0x20 != 0,
            ax6: byte & 0x40 != 0,
            ax7: byte & 0x80 != 0,
        }
    }

    pub fn to_byte(&self) -> u8 {
        [
            self.ax0, self.ax1, self.ax2, self.ax3, self.ax4, self.ax5, self.ax6, self.ax7,
        ]
        .iter()
        .enumerate()
        .fold(0u8, |acc, (bit, set)| if *set { acc | (1 << bit) } else { acc })
    }
}

/// Typed message pushed by a device session
///
/// `quaternion_packets_read` is the session's quaternion counter at the moment
/// the message was dispatched.
#[derive(Debug, Clone)]
pub enum DeviceMessage {
    Quaternion {
        data: QuaternionData,
        quaternion_packets_read: u64,
        timestamp: DateTime<Local>,
    },
    DigitalIo {
        state: DigitalPortBits,
        quaternion_packets_read: u64,
        timestamp: DateTime<Local>,
    },
}

impl DeviceMessage {
    pub fn quaternion_packets_read(&self) -> u64 {
        match self {
            DeviceMessage::Quaternion {
                quaternion_packets_read,
                ..
            }
            | DeviceMessage::DigitalIo {
                quaternion_packets_read,
                ..
            } => *quaternion_packets_read,
        }
    }

    /// When the session dispatched the message
    pub fn timestamp(&self) -> DateTime<Local> {
        match self {
            DeviceMessage::Quaternion { timestamp, .. }
            | DeviceMessage::DigitalIo { timestamp, .. } => *timestamp,
        }
    }
}

/// Snapshot of a session's packet counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PacketCounter {
    pub total_packets_read: u64,
    pub quaternion_packets_read: u64,
    pub digital_io_packets_read: u64,
}

/// Device command set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandCode {
    NullCommand,
    FactoryReset,
    Reset,
    Sleep,
    ResetSleepTimer,
    SampleGyroscopeAxisAt200dps,
    CalculateGyroscopeSensitivity,
    SampleGyroscopeBiasTemp1,
    SampleGyroscopeBiasTemp2,
    CalculateGyroscopeBiasParameters,
    SampleAccelerometerAxisAt1g,
    CalculateAccelerometerBiasAndSensitivity,
    MeasureMagnetometerBiasAndSensitivity,
    AlgorithmInitialise,
    AlgorithmTare,
    AlgorithmClearTare,
    AlgorithmInitialiseThenTare,
}

impl fmt::Display for CommandCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandCode::AlgorithmInitialiseThenTare => write!(f, "Initialise then tare"),
            CommandCode::AlgorithmInitialise => write!(f, "Initialise"),
            CommandCode::AlgorithmTare => write!(f, "Tare"),
            CommandCode::AlgorithmClearTare => write!(f, "Clear tare"),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Device collaborator errors
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Failed to scan for devices: {0}")]
    ScanError(String),

    #[error("Failed to open {port}: {reason}")]
    OpenError { port: String, reason: String },

    #[error("Failed to send command {0}: {1}")]
    CommandError(CommandCode, String),

    #[error("Failed to close {port}: {reason}")]
    CloseError { port: String, reason: String },
}

/// Discovery and connection entry point of a device collaborator
pub trait ImuBackend: Send + Sync {
    /// Lists candidate devices; an empty list means "nothing found yet"
    fn scan(&self) -> Result<Vec<PortAssignment>, DeviceError>;

    /// Opens a session and starts pushing its messages into `events`
    fn open(
        &self,
        port: &PortAssignment,
        events: mpsc::Sender<DeviceMessage>,
    ) -> Result<Box<dyn ImuSession>, DeviceError>;
}

/// An open transport session
pub trait ImuSession: Send {
    fn port(&self) -> &PortAssignment;

    fn packet_counter(&self) -> PacketCounter;

    /// Fire-and-forget; no response is awaited
    fn send_command(&mut self, command: CommandCode) -> Result<(), DeviceError>;

    /// Stops the session; all message senders it holds are dropped
    fn close(self: Box<Self>) -> Result<(), DeviceError>;
}
