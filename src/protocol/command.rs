//! Host to device commands.
//!
//! Every command is a short ASCII token terminated by `!`. The firmware has no reply
//! framing, so several commands may be concatenated into one write with
//! [`CommandBatch`].

use crate::device::types::Axis;
use std::fmt;

/// A single command understood by the scanner firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Move a servo to an absolute angle (`px<deg>!` / `py<deg>!`).
    Move {
        /// Servo to move
        axis: Axis,
        /// Target angle in degrees
        degrees: i32,
    },
    /// Request an object temperature reading (`to!`).
    ReadObjectTemp,
    /// Request an ambient temperature reading (`ta!`).
    ReadAmbientTemp,
    /// Power the servos (`mon!`).
    MotorsOn,
    /// Release the servos (`moff!`).
    MotorsOff,
    /// Ignore the device's joystick (`jd!`).
    JoystickDisable,
    /// Obey the device's joystick again (`je!`).
    JoystickEnable,
}

impl Command {
    /// Shorthand for a move command.
    pub fn move_to(axis: Axis, degrees: i32) -> Self {
        Command::Move { axis, degrees }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Move { axis, degrees } => write!(f, "p{axis}{degrees}!"),
            Command::ReadObjectTemp => f.write_str("to!"),
            Command::ReadAmbientTemp => f.write_str("ta!"),
            Command::MotorsOn => f.write_str("mon!"),
            Command::MotorsOff => f.write_str("moff!"),
            Command::JoystickDisable => f.write_str("jd!"),
            Command::JoystickEnable => f.write_str("je!"),
        }
    }
}

/// Commands queued for a single write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandBatch {
    commands: Vec<Command>,
}

impl CommandBatch {
    /// Creates an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a command to the batch.
    pub fn queue(&mut self, command: Command) -> &mut Self {
        self.commands.push(command);
        self
    }

    /// Returns the queued commands.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Wire encoding of all queued commands, in order.
    pub fn encode(&self) -> String {
        self.commands.iter().map(Command::to_string).collect()
    }
}

impl FromIterator<Command> for CommandBatch {
    fn from_iter<I: IntoIterator<Item = Command>>(iter: I) -> Self {
        Self {
            commands: iter.into_iter().collect(),
        }
    }
}
