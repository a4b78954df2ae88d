//! Simulated x-IMU
//!
//! Streams a slow yaw/pitch sweep at the configured quaternion rate and toggles
//! AX1 periodically, so the whole pipeline can run without hardware.

use super::{
    CommandCode, DeviceError, DeviceMessage, DigitalPortBits, ImuBackend, ImuSession,
    PacketCounter, PortAssignment, QuaternionData,
};
use crate::config::SimulatedDeviceConfig;
use chrono::Local;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Peak yaw of the sweep in degrees
const SWEEP_YAW_DEG: f32 = 25.0;
/// Peak pitch of the sweep in degrees
const SWEEP_PITCH_DEG: f32 = 15.0;
/// Sweep period in seconds
const SWEEP_PERIOD_S: f32 = 8.0;
/// AX1, the left button port
const CLICK_PORT_MASK: u8 = 0x02;

pub struct SimulatedBackend {
    config: SimulatedDeviceConfig,
}

impl SimulatedBackend {
    pub fn new(config: SimulatedDeviceConfig) -> Self {
        Self { config }
    }
}

impl ImuBackend for SimulatedBackend {
    fn scan(&self) -> Result<Vec<PortAssignment>, DeviceError> {
        debug!("Scanning simulated ports");
        Ok(vec![PortAssignment {
            device_id: self.config.device_id.clone(),
            port_name: self.config.port_name.clone(),
        }])
    }

    fn open(
        &self,
        port: &PortAssignment,
        events: mpsc::Sender<DeviceMessage>,
    ) -> Result<Box<dyn ImuSession>, DeviceError> {
        if port.port_name != self.config.port_name {
            return Err(DeviceError::OpenError {
                port: port.port_name.clone(),
                reason: "no simulated device on this port".to_string(),
            });
        }
        if self.config.sample_rate_hz == 0 {
            return Err(DeviceError::OpenError {
                port: port.port_name.clone(),
                reason: "sample rate must be greater than 0".to_string(),
            });
        }

        info!("Opening simulated device {}", port);
        Ok(Box::new(SimulatedSession::start(
            port.clone(),
            self.config.clone(),
            events,
        )))
    }
}

#[derive(Debug, Default)]
struct Counters {
    total: AtomicU64,
    quaternion: AtomicU64,
    digital_io: AtomicU64,
}

pub struct SimulatedSession {
    port: PortAssignment,
    counters: Arc<Counters>,
    /// Sample index the sweep is measured from, moved by tare
    tare_tx: watch::Sender<u64>,
    task: JoinHandle<()>,
}

impl SimulatedSession {
    fn start(
        port: PortAssignment,
        config: SimulatedDeviceConfig,
        events: mpsc::Sender<DeviceMessage>,
    ) -> Self {
        let counters = Arc::new(Counters::default());
        let (tare_tx, tare_rx) = watch::channel(0u64);
        let task = tokio::spawn(stream_samples(config, counters.clone(), tare_rx, events));

        Self {
            port,
            counters,
            tare_tx,
            task,
        }
    }
}

/// Orientation at `sample` samples after the tare point
fn sweep_orientation(sample: u64, sample_rate_hz: u32) -> QuaternionData {
    let t = sample as f32 / sample_rate_hz as f32;
    let phase = std::f32::consts::TAU * t / SWEEP_PERIOD_S;
    let yaw = (SWEEP_YAW_DEG * phase.sin()).to_radians();
    let pitch = (SWEEP_PITCH_DEG * (2.0 * phase).sin()).to_radians();

    // yaw about z then pitch about y, conjugated into the device's convention
    let (sy, cy) = (yaw / 2.0).sin_cos();
    let (sp, cp) = (pitch / 2.0).sin_cos();
    QuaternionData::new(cy * cp, sy * sp, -(cy * sp), -(sy * cp))
}

async fn stream_samples(
    config: SimulatedDeviceConfig,
    counters: Arc<Counters>,
    tare_rx: watch::Receiver<u64>,
    events: mpsc::Sender<DeviceMessage>,
) {
    let period = Duration::from_secs_f64(1.0 / config.sample_rate_hz as f64);
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let samples_per_toggle =
        (config.click_period_ms.saturating_mul(config.sample_rate_hz as u64) / 2000).max(1);
    let mut port_byte = 0u8;
    let mut sample = 0u64;

    loop {
        ticker.tick().await;

        let total = counters.total.load(Ordering::Relaxed);
        if config.stall_after_packets.is_some_and(|limit| total >= limit) {
            warn!("Simulated device stalled after {} packets", total);
            break;
        }

        let origin = *tare_rx.borrow();
        let message = DeviceMessage::Quaternion {
            data: sweep_orientation(sample.saturating_sub(origin), config.sample_rate_hz),
            quaternion_packets_read: counters.quaternion.fetch_add(1, Ordering::Relaxed) + 1,
            timestamp: Local::now(),
        };
        counters.total.fetch_add(1, Ordering::Relaxed);
        if !deliver(&events, message) {
            break;
        }

        sample += 1;
        if config.click_period_ms > 0 && sample % samples_per_toggle == 0 {
            port_byte ^= CLICK_PORT_MASK;
            let message = DeviceMessage::DigitalIo {
                state: DigitalPortBits::from_byte(port_byte),
                quaternion_packets_read: counters.quaternion.load(Ordering::Relaxed),
                timestamp: Local::now(),
            };
            counters.digital_io.fetch_add(1, Ordering::Relaxed);
            counters.total.fetch_add(1, Ordering::Relaxed);
            if !deliver(&events, message) {
                break;
            }
        }
    }
}

/// Returns `false` once the receiving side is gone
fn deliver(events: &mpsc::Sender<DeviceMessage>, message: DeviceMessage) -> bool {
    match events.try_send(message) {
        Ok(()) => true,
        Err(TrySendError::Full(dropped)) => {
            warn!(
                "Device channel full, dropped packet at sample {}",
                dropped.quaternion_packets_read()
            );
            true
        }
        Err(TrySendError::Closed(_)) => {
            debug!("Simulated device receiver gone");
            false
        }
    }
}

impl ImuSession for SimulatedSession {
    fn port(&self) -> &PortAssignment {
        &self.port
    }

    fn packet_counter(&self) -> PacketCounter {
        PacketCounter {
            total_packets_read: self.counters.total.load(Ordering::Relaxed),
            quaternion_packets_read: self.counters.quaternion.load(Ordering::Relaxed),
            digital_io_packets_read: self.counters.digital_io.load(Ordering::Relaxed),
        }
    }

    fn send_command(&mut self, command: CommandCode) -> Result<(), DeviceError> {
        match command {
            CommandCode::AlgorithmInitialiseThenTare | CommandCode::AlgorithmTare => {
                let now = self.counters.quaternion.load(Ordering::Relaxed);
                self.tare_tx.send_replace(now);
                info!("Simulated device {}: {} at sample {}", self.port, command, now);
            }
            other => debug!("Simulated device ignores {}", other),
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), DeviceError> {
        self.task.abort();
        info!("Closed simulated device {}", self.port);
        Ok(())
    }
}

impl Drop for SimulatedSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}
