use super::{clamp_coordinate, PointerCommand, PointerError, PointerSink};
use tracing::{debug, info};

/// Sink that only reports commands through tracing
#[derive(Debug)]
pub struct LogPointer {
    name: String,
    moves: u64,
}

impl LogPointer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            moves: 0,
        }
    }
}

impl PointerSink for LogPointer {
    fn emit(&mut self, command: &PointerCommand) -> Result<(), PointerError> {
        match command {
            PointerCommand::MoveAbsolute { x, y } => {
                self.moves += 1;
                // moves arrive at sample rate, keep them out of info
                debug!(
                    "[{}] move #{} to ({}, {})",
                    self.name,
                    self.moves,
                    clamp_coordinate(*x),
                    clamp_coordinate(*y)
                );
            }
            PointerCommand::Button { .. } => info!("[{}] {}", self.name, command),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
