//! Device to host line protocol.
//!
//! Bytes are accumulated by [`LineAssembler`] until `\n` (carriage returns are dropped),
//! then [`parse_line`] classifies the completed line:
//!
//! | Line                         | Result                                 |
//! |------------------------------|----------------------------------------|
//! | `Idims:<xmin>,<xmax>,<ymin>,<ymax>` | [`Message::Dims`]               |
//! | `Ix: <n>` / `Iy: <n>`        | [`Message::Position`]                  |
//! | `Itemp object:<float>`       | [`Message::Temperature`] (object)      |
//! | `Itemp ambient:<float>`      | [`Message::Temperature`] (ambient)     |
//! | `Isetup finished`            | [`Message::SetupFinished`]             |
//! | `E<text>`                    | [`Message::DeviceError`]               |
//! | other `I...`                 | [`ProtocolError::UnknownInfoLine`]     |
//! | anything else                | [`ProtocolError::Malformed`]           |
//!
//! A partial line longer than [`MAX_LINE_LEN`] is reported as malformed by the
//! assembler itself and discarded.

use crate::device::types::{Axis, FieldOfView, Region, TempChannel};
use crate::error::ProtocolError;

/// A classified line received from the device.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Field of view announcement.
    Dims(FieldOfView),
    /// A servo reached (or was clamped to) a new angle.
    Position {
        /// Servo
        axis: Axis,
        /// Angle in degrees
        value: i32,
    },
    /// A temperature reading; `None` when the device sent an empty payload.
    Temperature {
        /// Sensor channel
        channel: TempChannel,
        /// Degrees Celsius
        value: Option<f32>,
    },
    /// The firmware finished booting.
    SetupFinished,
    /// Error text reported by the firmware (without the `E` prefix).
    DeviceError(String),
}

/// Classify one complete line (terminator already removed).
pub fn parse_line(line: &str) -> Result<Message, ProtocolError> {
    if let Some(text) = line.strip_prefix('E') {
        return Ok(Message::DeviceError(text.to_string()));
    }
    let Some(info) = line.strip_prefix('I') else {
        return Err(ProtocolError::Malformed(line.to_string()));
    };

    if let Some(dims) = info.strip_prefix("dims:") {
        parse_dims(dims)
            .map(Message::Dims)
            .ok_or_else(|| field_failure("dims", line))
    } else if let Some(value) = info.strip_prefix("x:") {
        parse_position(Axis::X, value).ok_or_else(|| field_failure("x", line))
    } else if let Some(value) = info.strip_prefix("y:") {
        parse_position(Axis::Y, value).ok_or_else(|| field_failure("y", line))
    } else if let Some(reading) = info.strip_prefix("temp ") {
        parse_temperature(reading, line)
    } else if info.starts_with("setup finished") {
        Ok(Message::SetupFinished)
    } else {
        Err(ProtocolError::UnknownInfoLine(line.to_string()))
    }
}

fn field_failure(field: &'static str, line: &str) -> ProtocolError {
    ProtocolError::FieldParseFailure {
        field,
        line: line.to_string(),
    }
}

fn parse_dims(payload: &str) -> Option<FieldOfView> {
    let values = payload
        .split(',')
        .map(|v| v.trim().parse::<i32>().ok())
        .collect::<Option<Vec<_>>>()?;
    match values.as_slice() {
        [xmin, xmax, ymin, ymax] => Region::new(*xmin, *xmax, *ymin, *ymax),
        _ => None,
    }
}

fn parse_position(axis: Axis, payload: &str) -> Option<Message> {
    let value = payload.trim().parse::<i32>().ok()?;
    Some(Message::Position { axis, value })
}

fn parse_temperature(reading: &str, line: &str) -> Result<Message, ProtocolError> {
    let Some((name, payload)) = reading.split_once(':') else {
        return Err(ProtocolError::UnknownInfoLine(line.to_string()));
    };
    let channel = match name.trim() {
        "object" => TempChannel::Object,
        "ambient" => TempChannel::Ambient,
        _ => return Err(ProtocolError::UnknownInfoLine(line.to_string())),
    };

    let payload = payload.trim();
    let value = if payload.is_empty() {
        None
    } else {
        let parsed = payload
            .parse::<f32>()
            .map_err(|_| field_failure("temperature", line))?;
        if !parsed.is_finite() {
            return Err(field_failure("temperature", line));
        }
        Some(parsed)
    };
    Ok(Message::Temperature { channel, value })
}

/// Longest line the assembler buffers; real device lines are a few dozen bytes.
pub const MAX_LINE_LEN: usize = 256;

/// Accumulates received bytes into lines.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buffer: Vec<u8>,
}

impl LineAssembler {
    /// Creates an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte; returns the completed line when `byte` is `\n`.
    ///
    /// The buffer is cleared after every completed line, whatever its contents. A
    /// byte that would grow the buffer past [`MAX_LINE_LEN`] yields
    /// [`ProtocolError::Malformed`] with the discarded bytes; accumulation restarts
    /// with that byte.
    pub fn push(&mut self, byte: u8) -> Option<Result<String, ProtocolError>> {
        match byte {
            b'\r' => None,
            b'\n' => {
                let line = String::from_utf8_lossy(&self.buffer).into_owned();
                self.buffer.clear();
                Some(Ok(line))
            }
            _ if self.buffer.len() >= MAX_LINE_LEN => {
                let discarded = String::from_utf8_lossy(&self.buffer).into_owned();
                self.buffer.clear();
                self.buffer.push(byte);
                Some(Err(ProtocolError::Malformed(discarded)))
            }
            _ => {
                self.buffer.push(byte);
                None
            }
        }
    }

    /// Bytes of the line received so far.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }
}
