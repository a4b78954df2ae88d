//! Pointer mapper and its task
//!
//! One [`PointerMapper`] exists per device session. It owns every piece of
//! state the two message handlers share (sample counter, suppression mark,
//! previous port snapshot), and a single task drains the session's channel
//! into it, so the handlers never interleave.
//!
//! # Architecture
//!
//! ```text
//! DeviceMessage ──► PointerMapper ──► PointerCommand ──► PointerSink
//!                   ├ orientation ◄── SuppressionGate ──┐
//!                   └ buttons ───────── arm() ──────────┘
//! ```

use crate::device::{DeviceMessage, DigitalPortBits, QuaternionData};
use crate::mapping::buttons::ButtonEdgeDetector;
use crate::mapping::orientation::map_to_absolute;
use crate::mapping::suppression::{SuppressionGate, SUPPRESSION_WINDOW};
use crate::mapping::MappingError;
use crate::pointer::{ButtonEdge, PointerCommand, PointerSink};
use chrono::{DateTime, Local};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapperStats {
    pub quaternion_messages: u64,
    pub digital_io_messages: u64,
    pub moves_emitted: u64,
    pub moves_suppressed: u64,
    pub button_events: u64,
    /// Dispatch time of the most recent message
    pub last_dispatched: Option<DateTime<Local>>,
}

#[derive(Debug, Default)]
pub struct PointerMapper {
    sample_count: u64,
    gate: SuppressionGate,
    buttons: ButtonEdgeDetector,
    stats: MapperStats,
}

impl PointerMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn gate(&self) -> &SuppressionGate {
        &self.gate
    }

    #[cfg(test)]
    pub fn previous_ports(&self) -> &DigitalPortBits {
        self.buttons.previous()
    }

    pub fn stats(&self) -> MapperStats {
        self.stats
    }

    pub fn handle_message(&mut self, message: &DeviceMessage) -> Vec<PointerCommand> {
        // the counter only moves forward so the mark never passes it
        self.sample_count = self.sample_count.max(message.quaternion_packets_read());
        self.stats.last_dispatched = Some(message.timestamp());

        match message {
            DeviceMessage::Quaternion { data, .. } => {
                self.on_quaternion(data).into_iter().collect()
            }
            DeviceMessage::DigitalIo { state, .. } => self.on_digital_io(*state),
        }
    }

    fn on_quaternion(&mut self, data: &QuaternionData) -> Option<PointerCommand> {
        self.stats.quaternion_messages += 1;

        if !self.gate.is_open(self.sample_count) {
            self.stats.moves_suppressed += 1;
            return None;
        }

        let position = map_to_absolute(&data.to_euler_angles());
        self.stats.moves_emitted += 1;
        Some(PointerCommand::MoveAbsolute {
            x: position.x,
            y: position.y,
        })
    }

    fn on_digital_io(&mut self, state: DigitalPortBits) -> Vec<PointerCommand> {
        self.stats.digital_io_messages += 1;
        debug!("Digital ports {:#010b}", state.to_byte());
        let commands = self
            .buttons
            .update(state, &mut self.gate, self.sample_count);
        self.stats.button_events += commands.len() as u64;
        commands
    }
}

/// What a finished mapper task hands back
pub struct MapperReport {
    pub sink: Box<dyn PointerSink>,
    pub stats: MapperStats,
}

/// Running mapper task for one device session
pub struct MapperHandle {
    task: JoinHandle<Result<MapperReport, MappingError>>,
}

impl MapperHandle {
    /// Spawns the task; it ends when every sender of `events` is dropped
    pub fn spawn(
        mut events: mpsc::Receiver<DeviceMessage>,
        mut sink: Box<dyn PointerSink>,
    ) -> Self {
        info!("Spawning pointer mapper for sink '{}'", sink.name());

        let task = tokio::spawn(async move {
            let mut mapper = PointerMapper::new();
            let mut last_log_time = Local::now();
            let log_interval = chrono::Duration::seconds(10);
            let mut messages_since_log = 0u64;

            while let Some(message) = events.recv().await {
                messages_since_log += 1;
                for command in mapper.handle_message(&message) {
                    if let PointerCommand::Button { edge, .. } = command {
                        info!(
                            "{} at sample {} ({})",
                            command,
                            mapper.sample_count(),
                            message.timestamp().format("%H:%M:%S.%3f")
                        );
                        if edge == ButtonEdge::Down {
                            debug!(
                                "Moves held through sample {}",
                                mapper.gate().mark() + SUPPRESSION_WINDOW
                            );
                        }
                    }
                    if let Err(e) = sink.emit(&command) {
                        error!("Pointer sink '{}' rejected {}: {}", sink.name(), command, e);
                        return Err(MappingError::from(e));
                    }
                }

                let now = Local::now();
                if now - last_log_time > log_interval {
                    let stats = mapper.stats();
                    let lag = now - message.timestamp();
                    info!(
                        "Mapper stats: {} messages in last {} seconds, {} moves emitted, \
                         {} suppressed, {} ms dispatch lag",
                        messages_since_log,
                        log_interval.num_seconds(),
                        stats.moves_emitted,
                        stats.moves_suppressed,
                        lag.num_milliseconds()
                    );
                    messages_since_log = 0;
                    last_log_time = now;
                }
            }

            debug!("Device channel closed after {} samples", mapper.sample_count());
            Ok(MapperReport {
                sink,
                stats: mapper.stats(),
            })
        });

        Self { task }
    }

    /// `true` once the task stopped, either because its channel closed or
    /// because the sink failed
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub async fn join(self) -> Result<MapperReport, MappingError> {
        self.task
            .await
            .map_err(|e| MappingError::ThreadError(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointer::{MouseButton, PointerError};
    use std::sync::{Arc, Mutex};

    fn quaternion(count: u64) -> DeviceMessage {
        DeviceMessage::Quaternion {
            data: QuaternionData::IDENTITY,
            quaternion_packets_read: count,
            timestamp: Local::now(),
        }
    }

    fn ports(left: bool, count: u64) -> DeviceMessage {
        DeviceMessage::DigitalIo {
            state: DigitalPortBits {
                ax1: left,
                ..Default::default()
            },
            quaternion_packets_read: count,
            timestamp: Local::now(),
        }
    }

    #[derive(Clone, Default)]
    struct RecordingPointer {
        commands: Arc<Mutex<Vec<PointerCommand>>>,
        fail: bool,
    }

    impl PointerSink for RecordingPointer {
        fn emit(&mut self, command: &PointerCommand) -> Result<(), PointerError> {
            if self.fail {
                return Err(PointerError::EmitError("unplugged".to_string()));
            }
            self.commands.lock().unwrap().push(*command);
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[test]
    fn moves_are_held_for_window_after_button_down() {
        let mut mapper = PointerMapper::new();
        let mut moved_at = Vec::new();

        for count in 0..=40u64 {
            if count == 5 {
                let commands = mapper.handle_message(&ports(true, 5));
                assert_eq!(
                    commands,
                    vec![PointerCommand::Button {
                        button: MouseButton::Left,
                        edge: ButtonEdge::Down
                    }]
                );
                assert_eq!(mapper.gate().mark(), 5);
            }
            if !mapper.handle_message(&quaternion(count)).is_empty() {
                moved_at.push(count);
            }
        }

        assert_eq!(moved_at, (38..=40).collect::<Vec<_>>());
    }

    #[test]
    fn release_never_holds_the_cursor() {
        let mut mapper = PointerMapper::new();
        for count in 0..100 {
            mapper.handle_message(&quaternion(count));
        }
        mapper.handle_message(&ports(true, 100));
        for count in 100..140 {
            mapper.handle_message(&quaternion(count));
        }

        let commands = mapper.handle_message(&ports(false, 140));
        assert_eq!(
            commands,
            vec![PointerCommand::Button {
                button: MouseButton::Left,
                edge: ButtonEdge::Up
            }]
        );
        assert_eq!(mapper.gate().mark(), 100);
        assert_eq!(mapper.handle_message(&quaternion(141)).len(), 1);
    }

    #[test]
    fn repeated_snapshot_emits_once() {
        let mut mapper = PointerMapper::new();
        assert_eq!(mapper.handle_message(&ports(true, 50)).len(), 1);
        assert!(mapper.handle_message(&ports(true, 60)).is_empty());
        assert_eq!(mapper.gate().mark(), 50);
        assert!(mapper.previous_ports().ax1);
    }

    #[test]
    fn mark_never_exceeds_sample_count() {
        let mut mapper = PointerMapper::new();
        mapper.handle_message(&quaternion(80));
        // a stale counter on a digital message must not rewind the count
        mapper.handle_message(&ports(true, 70));
        assert_eq!(mapper.sample_count(), 80);
        assert_eq!(mapper.gate().mark(), 80);
    }

    #[test]
    fn centred_device_moves_to_screen_centre() {
        let mut mapper = PointerMapper::new();
        let commands = mapper.handle_message(&quaternion(33));
        assert_eq!(commands, vec![PointerCommand::MoveAbsolute { x: 32768, y: 32768 }]);
        assert_eq!(mapper.stats().moves_emitted, 1);
    }

    #[test]
    fn stats_keep_dispatch_time_of_latest_message() {
        let mut mapper = PointerMapper::new();
        assert_eq!(mapper.stats().last_dispatched, None);

        let dispatched = Local::now() - chrono::Duration::milliseconds(250);
        mapper.handle_message(&DeviceMessage::DigitalIo {
            state: DigitalPortBits::default(),
            quaternion_packets_read: 3,
            timestamp: dispatched,
        });
        assert_eq!(mapper.stats().last_dispatched, Some(dispatched));

        let later = dispatched + chrono::Duration::milliseconds(8);
        mapper.handle_message(&DeviceMessage::Quaternion {
            data: QuaternionData::IDENTITY,
            quaternion_packets_read: 4,
            timestamp: later,
        });
        assert_eq!(mapper.stats().last_dispatched, Some(later));
    }

    #[tokio::test]
    async fn task_drains_channel_and_returns_sink() {
        let (tx, rx) = mpsc::channel(64);
        let sink = RecordingPointer::default();
        let recorded = sink.commands.clone();
        let handle = MapperHandle::spawn(rx, Box::new(sink));

        tx.send(ports(true, 0)).await.unwrap();
        for count in 0..40 {
            tx.send(quaternion(count)).await.unwrap();
        }
        drop(tx);

        let report = handle.join().await.unwrap();
        assert_eq!(report.sink.name(), "recording");
        assert_eq!(report.stats.button_events, 1);
        assert_eq!(report.stats.moves_emitted, 7);
        assert_eq!(recorded.lock().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn sink_failure_stops_the_task() {
        let (tx, rx) = mpsc::channel(8);
        let sink = RecordingPointer {
            fail: true,
            ..Default::default()
        };
        let handle = MapperHandle::spawn(rx, Box::new(sink));

        tx.send(ports(true, 0)).await.unwrap();

        let result = handle.join().await;
        assert!(matches!(result, Err(MappingError::PointerError(_))));
    }
}
