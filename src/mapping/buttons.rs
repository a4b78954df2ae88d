//! Edge detection on the digital ports
//!
//! AX1 drives the left (primary) button and AX0 the right (secondary) button.
//! Each changed port produces exactly one event; a down-edge also arms the
//! suppression gate with the current sample count.

use crate::device::DigitalPortBits;
use crate::mapping::suppression::{SuppressionGate, SUPPRESSION_WINDOW};
use crate::pointer::{ButtonEdge, MouseButton, PointerCommand};
use tracing::debug;

fn left_port(bits: &DigitalPortBits) -> bool {
    bits.ax1
}

fn right_port(bits: &DigitalPortBits) -> bool {
    bits.ax0
}

/// Evaluation order of the buttons
const BUTTON_PORTS: [(MouseButton, fn(&DigitalPortBits) -> bool); 2] = [
    (MouseButton::Left, left_port),
    (MouseButton::Right, right_port),
];

#[derive(Debug, Clone, Default)]
pub struct ButtonEdgeDetector {
    previous: DigitalPortBits,
}

impl ButtonEdgeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn previous(&self) -> &DigitalPortBits {
        &self.previous
    }

    /// Compares `current` against the stored snapshot, left before right.
    ///
    /// The stored snapshot is replaced with `current` whether or not anything
    /// changed.
    pub fn update(
        &mut self,
        current: DigitalPortBits,
        gate: &mut SuppressionGate,
        sample_count: u64,
    ) -> Vec<PointerCommand> {
        let mut commands = Vec::with_capacity(BUTTON_PORTS.len());

        for (button, port) in BUTTON_PORTS {
            let was = port(&self.previous);
            let is = port(&current);
            if was == is {
                continue;
            }

            let edge = if is {
                gate.arm(sample_count);
                debug!(
                    "{:?} down at sample {}, cursor held until {}",
                    button,
                    sample_count,
                    sample_count + SUPPRESSION_WINDOW
                );
                ButtonEdge::Down
            } else {
                ButtonEdge::Up
            };
            commands.push(PointerCommand::Button { button, edge });
        }

        self.previous = current;
        commands
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(left: bool, right: bool) -> DigitalPortBits {
        DigitalPortBits {
            ax1: left,
            ax0: right,
            ..Default::default()
        }
    }

    #[test]
    fn press_emits_single_down_and_arms_gate() {
        let mut detector = ButtonEdgeDetector::new();
        let mut gate = SuppressionGate::new();

        let commands = detector.update(bits(true, false), &mut gate, 57);

        assert_eq!(
            commands,
            vec![PointerCommand::Button {
                button: MouseButton::Left,
                edge: ButtonEdge::Down
            }]
        );
        assert_eq!(gate.mark(), 57);
    }

    #[test]
    fn release_does_not_touch_gate() {
        let mut detector = ButtonEdgeDetector::new();
        let mut gate = SuppressionGate::new();
        detector.update(bits(false, true), &mut gate, 10);

        let commands = detector.update(bits(false, false), &mut gate, 90);

        assert_eq!(
            commands,
            vec![PointerCommand::Button {
                button: MouseButton::Right,
                edge: ButtonEdge::Up
            }]
        );
        assert_eq!(gate.mark(), 10);
    }

    #[test]
    fn unchanged_snapshot_is_silent() {
        for state in [bits(false, false), bits(true, false), bits(true, true)] {
            let mut detector = ButtonEdgeDetector::new();
            let mut gate = SuppressionGate::new();
            detector.update(state, &mut gate, 3);
            let mark = gate.mark();

            let commands = detector.update(state, &mut gate, 80);

            assert!(commands.is_empty());
            assert_eq!(gate.mark(), mark);
            assert_eq!(detector.previous(), &state);
        }
    }

    #[test]
    fn left_is_reported_before_right() {
        let mut detector = ButtonEdgeDetector::new();
        let mut gate = SuppressionGate::new();

        let commands = detector.update(bits(true, true), &mut gate, 12);

        assert_eq!(
            commands,
            vec![
                PointerCommand::Button {
                    button: MouseButton::Left,
                    edge: ButtonEdge::Down
                },
                PointerCommand::Button {
                    button: MouseButton::Right,
                    edge: ButtonEdge::Down
                },
            ]
        );
    }

    #[test]
    fn ports_are_independent() {
        let mut detector = ButtonEdgeDetector::new();
        let mut gate = SuppressionGate::new();
        detector.update(bits(true, false), &mut gate, 1);

        let commands = detector.update(bits(false, true), &mut gate, 40);

        assert_eq!(
            commands,
            vec![
                PointerCommand::Button {
                    button: MouseButton::Left,
                    edge: ButtonEdge::Up
                },
                PointerCommand::Button {
                    button: MouseButton::Right,
                    edge: ButtonEdge::Down
                },
            ]
        );
        assert_eq!(gate.mark(), 40);
    }

    #[test]
    fn unused_ports_are_stored_but_ignored() {
        let mut detector = ButtonEdgeDetector::new();
        let mut gate = SuppressionGate::new();
        let noisy = DigitalPortBits::from_byte(0b1111_0100);

        assert!(detector.update(noisy, &mut gate, 5).is_empty());
        assert_eq!(detector.previous(), &noisy);
        assert_eq!(gate.mark(), 0);
    }
}
