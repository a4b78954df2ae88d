//! Console status output and single-key input
//!
//! Keys are read on a dedicated thread with the terminal in raw mode, so no
//! Enter is needed. Escape (or Ctrl+C) cancels the session token; any other
//! key press becomes a [`ConsoleCommand::Tare`].

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use std::io::Write;
use std::thread;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const KEY_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Send "initialise then tare" to the device
    Tare,
}

/// Prints one status line; safe to call while the terminal is in raw mode
pub fn status(message: &str) {
    let mut stdout = std::io::stdout().lock();
    let _ = write!(stdout, "{}\r\n", message);
    let _ = stdout.flush();
}

/// Ends every line with `\r\n` so log output stays aligned in raw mode
pub struct CrlfWriter<W> {
    inner: W,
}

impl<W: Write> CrlfWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write> Write for CrlfWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut start = 0;
        for (i, byte) in buf.iter().enumerate() {
            if *byte == b'\n' && (i == 0 || buf[i - 1] != b'\r') {
                self.inner.write_all(&buf[start..i])?;
                self.inner.write_all(b"\r\n")?;
                start = i + 1;
            }
        }
        self.inner.write_all(&buf[start..])?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Log sink for the tracing subscriber
pub fn log_writer() -> CrlfWriter<std::io::Stderr> {
    CrlfWriter::new(std::io::stderr())
}

struct RawModeGuard {
    active: bool,
}

impl RawModeGuard {
    fn enable() -> Self {
        match terminal::enable_raw_mode() {
            Ok(()) => Self { active: true },
            Err(e) => {
                warn!("Could not switch terminal to raw mode: {}", e);
                Self { active: false }
            }
        }
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = terminal::disable_raw_mode() {
                error!("Failed to restore terminal mode: {}", e);
            }
        }
    }
}

fn is_cancel_key(key: &KeyEvent) -> bool {
    key.code == KeyCode::Esc
        || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
}

/// Starts the key reader; it stops once `cancel` is cancelled
pub fn spawn_key_reader(
    cancel: CancellationToken,
    commands: mpsc::Sender<ConsoleCommand>,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("console-keys".to_string())
        .spawn(move || {
            let _raw = RawModeGuard::enable();
            info!("Console key reader started");

            while !cancel.is_cancelled() {
                match event::poll(KEY_POLL_INTERVAL) {
                    Ok(false) => continue,
                    Ok(true) => {}
                    Err(e) => {
                        error!("Console input unavailable: {}", e);
                        break;
                    }
                }

                let key = match event::read() {
                    Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => key,
                    Ok(_) => continue,
                    Err(e) => {
                        error!("Failed to read console input: {}", e);
                        break;
                    }
                };

                if is_cancel_key(&key) {
                    info!("Exit requested from console");
                    cancel.cancel();
                } else {
                    debug!("Key {:?} pressed, requesting tare", key.code);
                    if let Err(e) = commands.try_send(ConsoleCommand::Tare) {
                        warn!("Dropped console command: {}", e);
                    }
                }
            }

            debug!("Console key reader stopped");
        })
}

/// Blocks until any key is pressed
pub fn wait_for_any_key() {
    let _raw = RawModeGuard::enable();
    loop {
        match event::read() {
            Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => break,
            Ok(_) => continue,
            Err(e) => {
                warn!("Cannot wait for a key press: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyEventState;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent {
            code,
            modifiers,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn escape_and_ctrl_c_cancel() {
        assert!(is_cancel_key(&key(KeyCode::Esc, KeyModifiers::NONE)));
        assert!(is_cancel_key(&key(KeyCode::Char('c'), KeyModifiers::CONTROL)));
    }

    #[test]
    fn log_lines_end_with_carriage_return() {
        let mut out = Vec::new();
        let mut writer = CrlfWriter::new(&mut out);
        writer.write_all(b"connected\nstats\r\n").unwrap();
        writer.write_all(b"\nclosed\n").unwrap();
        writer.flush().unwrap();

        assert_eq!(out, b"connected\r\nstats\r\n\r\nclosed\r\n".to_vec());
    }

    #[test]
    fn other_keys_request_tare() {
        assert!(!is_cancel_key(&key(KeyCode::Char('c'), KeyModifiers::NONE)));
        assert!(!is_cancel_key(&key(KeyCode::Enter, KeyModifiers::NONE)));
        assert!(!is_cancel_key(&key(KeyCode::Char(' '), KeyModifiers::SHIFT)));
    }
}
