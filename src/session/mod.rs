//! Session loop with statum state machine
//!
//! Drives discovery, connection and streaming, and reconnects whenever the
//! device stops sending data. Runs until the console cancels the token or a
//! collaborator reports an error.
//!
//! # State Machine
//!
//! ```text
//! Searching ──► Connecting ──► Streaming ──► (idle) ──► Searching
//!     │                            │
//!     └────────── cancel ──────────┴──► Exit
//! ```

pub mod idle;

use crate::config::SessionConfig;
use crate::console::{self, ConsoleCommand};
use crate::device::{CommandCode, DeviceError, ImuBackend, ImuSession, PortAssignment};
use crate::mapping::{MapperHandle, MappingError};
use crate::pointer::PointerSink;
use idle::IdleDetector;
use statum::{machine, state};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Command sent for every non-cancel key press
pub const TARE_COMMAND: CommandCode = CommandCode::AlgorithmInitialiseThenTare;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error("Invalid session state: {0}")]
    InvalidState(String),
}

/// Result of a state that may be left by cancellation
pub enum SessionStep<T> {
    Next(T),
    Exit,
}

#[state]
#[derive(Debug, Clone)]
pub enum SessionState {
    Searching,
    Connecting(PortAssignment),
    Streaming,
}

/// Open device session plus the mapper draining it
pub struct ActiveLink {
    session: Box<dyn ImuSession>,
    mapper: MapperHandle,
}

#[machine]
pub struct SessionLoop<S: SessionState> {
    backend: Arc<dyn ImuBackend>,
    pointer: Option<Box<dyn PointerSink>>,
    commands: mpsc::Receiver<ConsoleCommand>,
    cancel: CancellationToken,
    settings: SessionConfig,
    link: Option<ActiveLink>,
}

impl<S: SessionState> SessionLoop<S> {
    /// Closes the device and waits for the mapper to hand the sink back
    async fn close_link(&mut self) -> Result<(), SessionError> {
        let Some(link) = self.link.take() else {
            return Ok(());
        };

        let port = link.session.port().clone();
        link.session.close()?;
        let report = link.mapper.join().await?;
        info!(
            "Session on {} closed: {} quaternion and {} digital messages, {} moves, {} suppressed",
            port,
            report.stats.quaternion_messages,
            report.stats.digital_io_messages,
            report.stats.moves_emitted,
            report.stats.moves_suppressed
        );
        self.pointer = Some(report.sink);
        Ok(())
    }
}

impl SessionLoop<Searching> {
    pub fn create(
        backend: Arc<dyn ImuBackend>,
        pointer: Box<dyn PointerSink>,
        commands: mpsc::Receiver<ConsoleCommand>,
        cancel: CancellationToken,
        settings: SessionConfig,
    ) -> Self {
        debug!("Creating session loop with settings: {:?}", settings);
        Self::new(backend, Some(pointer), commands, cancel, settings, None)
    }

    /// Scans until a device shows up and picks the first one
    pub async fn search(self) -> Result<SessionStep<SessionLoop<Connecting>>, SessionError> {
        let retry = Duration::from_millis(self.settings.scan_retry_ms);
        let mut attempts = 0u64;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(SessionStep::Exit);
            }

            attempts += 1;
            let mut ports = self.backend.scan()?;
            if !ports.is_empty() {
                let port = ports.remove(0);
                info!(
                    "Found {} candidate(s) after {} scan(s), selecting {}",
                    ports.len() + 1,
                    attempts,
                    port
                );
                return Ok(SessionStep::Next(self.transition_with(port)));
            }

            debug!("No device found, retrying in {:?}", retry);
            tokio::select! {
                _ = self.cancel.cancelled() => return Ok(SessionStep::Exit),
                _ = sleep(retry) => {}
            }
        }
    }
}

impl SessionLoop<Connecting> {
    /// Opens the device and starts the mapper on its message channel
    pub fn connect(mut self) -> Result<SessionLoop<Streaming>, SessionError> {
        let port = match self.get_state_data() {
            Some(port) => port.clone(),
            None => {
                error!("Connecting state without a port");
                return Err(SessionError::InvalidState("no port selected".to_string()));
            }
        };

        let pointer = self.pointer.take().ok_or_else(|| {
            SessionError::InvalidState("pointer sink still owned by a mapper".to_string())
        })?;

        let (events_tx, events_rx) = mpsc::channel(self.settings.channel_capacity);
        let session = match self.backend.open(&port, events_tx) {
            Ok(session) => session,
            Err(e) => {
                error!("Failed to open {}: {}", port, e);
                return Err(e.into());
            }
        };
        let mapper = MapperHandle::spawn(events_rx, pointer);
        self.link = Some(ActiveLink { session, mapper });

        console::status(&format!(
            "Connected to x-IMU {} on {}.",
            port.device_id, port.port_name
        ));
        console::status(&format!(
            "Press Esc to exit or any other key to send '{}' command.",
            TARE_COMMAND
        ));
        Ok(self.transition())
    }
}

impl SessionLoop<Streaming> {
    fn session_mut(&mut self) -> Result<&mut Box<dyn ImuSession>, SessionError> {
        self.link
            .as_mut()
            .map(|link| &mut link.session)
            .ok_or_else(|| SessionError::InvalidState("streaming without a session".to_string()))
    }

    /// Polls keys and the packet counter until the device goes quiet or the
    /// user exits
    pub async fn stream(mut self) -> Result<SessionStep<SessionLoop<Searching>>, SessionError> {
        let mut ticker = interval(Duration::from_millis(self.settings.poll_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        let mut idle = IdleDetector::new(self.session_mut()?.packet_counter().total_packets_read);

        loop {
            let cancelled = tokio::select! {
                _ = self.cancel.cancelled() => true,
                _ = ticker.tick() => false,
            };
            if cancelled {
                info!("Session cancelled by user");
                self.close_link().await?;
                return Ok(SessionStep::Exit);
            }

            while let Ok(command) = self.commands.try_recv() {
                match command {
                    ConsoleCommand::Tare => {
                        info!("Sending '{}' command", TARE_COMMAND);
                        self.session_mut()?.send_command(TARE_COMMAND)?;
                    }
                }
            }

            let mapper_stopped = self
                .link
                .as_ref()
                .is_some_and(|link| link.mapper.is_finished());
            if mapper_stopped {
                // a sink failure surfaces from close_link, not as an idle device
                warn!("Device message stream ended");
                self.close_link().await?;
                return Ok(SessionStep::Next(self.transition()));
            }

            let counter = self.session_mut()?.packet_counter();
            debug!("Packet counter: {:?}", counter);
            if idle.is_stalled(counter.total_packets_read) {
                break;
            }
        }

        console::status("No data received from x-IMU.  Closing port.");
        self.close_link().await?;
        Ok(SessionStep::Next(self.transition()))
    }
}

/// Runs the loop until cancellation or the first error
pub async fn run(mut machine: SessionLoop<Searching>) -> Result<(), SessionError> {
    info!("Session loop started");
    loop {
        console::status("Searching for x-IMU...");
        let connecting = match machine.search().await? {
            SessionStep::Next(connecting) => connecting,
            SessionStep::Exit => break,
        };

        let streaming = connecting.connect()?;

        machine = match streaming.stream().await? {
            SessionStep::Next(searching) => searching,
            SessionStep::Exit => break,
        };
    }
    info!("Session loop finished");
    Ok(())
}
