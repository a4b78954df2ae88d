//! Virtual absolute pointer backed by Linux uinput

use super::{
    clamp_coordinate, ButtonEdge, MouseButton, PointerCommand, PointerError, PointerSink,
    ABSOLUTE_MAX,
};
use evdev::{
    uinput::{VirtualDevice, VirtualDeviceBuilder},
    AbsInfo, AbsoluteAxisType, AttributeSet, EventType, InputEvent, Key, UinputAbsSetup,
};
use tracing::{debug, error, info};

pub struct UinputPointer {
    name: String,
    device: VirtualDevice,
}

impl UinputPointer {
    /// Registers a device with ABS_X/ABS_Y in `0..=65535` and two buttons
    pub fn create(name: &str) -> Result<Self, PointerError> {
        let axis = |axis| UinputAbsSetup::new(axis, AbsInfo::new(0, 0, ABSOLUTE_MAX, 0, 0, 0));

        let device = VirtualDeviceBuilder::new()
            .and_then(|builder| {
                builder
                    .name(name)
                    .with_keys(&AttributeSet::from_iter([Key::BTN_LEFT, Key::BTN_RIGHT]))
            })
            .and_then(|builder| builder.with_absolute_axis(&axis(AbsoluteAxisType::ABS_X)))
            .and_then(|builder| builder.with_absolute_axis(&axis(AbsoluteAxisType::ABS_Y)))
            .and_then(|builder| builder.build())
            .map_err(|e| {
                error!("Failed to create uinput device: {}", e);
                PointerError::InitializationError(e.to_string())
            })?;

        info!("uinput pointer '{}' registered", name);
        Ok(Self {
            name: name.to_string(),
            device,
        })
    }
}

fn button_key(button: MouseButton) -> Key {
    match button {
        MouseButton::Left => Key::BTN_LEFT,
        MouseButton::Right => Key::BTN_RIGHT,
    }
}

impl PointerSink for UinputPointer {
    fn emit(&mut self, command: &PointerCommand) -> Result<(), PointerError> {
        let events = match *command {
            PointerCommand::MoveAbsolute { x, y } => vec![
                InputEvent::new(
                    EventType::ABSOLUTE,
                    AbsoluteAxisType::ABS_X.0,
                    clamp_coordinate(x),
                ),
                InputEvent::new(
                    EventType::ABSOLUTE,
                    AbsoluteAxisType::ABS_Y.0,
                    clamp_coordinate(y),
                ),
            ],
            PointerCommand::Button { button, edge } => {
                let value = match edge {
                    ButtonEdge::Down => 1,
                    ButtonEdge::Up => 0,
                };
                debug!("uinput {:?} {:?}", button, edge);
                vec![InputEvent::new(
                    EventType::KEY,
                    button_key(button).code(),
                    value,
                )]
            }
        };

        self.device
            .emit(&events)
            .map_err(|e| PointerError::EmitError(e.to_string()))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
