//! Events published by the device controller.
//!
//! The controller owns a `tokio::sync::broadcast` sender; the scan session, the
//! viewport and any log panel subscribe independently. Every receiver sees every event
//! in the order the controller produced them.

use super::types::{Axis, FieldOfView, Region};
use tokio::sync::broadcast;
use tracing::Level;

/// Capacity of the event channel. A receiver that falls further behind than this
/// observes `RecvError::Lagged`.
pub const EVENT_CAPACITY: usize = 1024;

/// Something observable happened on the device.
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceEvent {
    /// The device announced its field of view.
    Ready(FieldOfView),
    /// A servo reported its position.
    PositionChanged {
        /// Servo
        axis: Axis,
        /// Angle in degrees
        value: i32,
    },
    /// Object temperature attributed to the position it was measured at.
    ObjectTemperature {
        /// X angle
        x: i32,
        /// Y angle
        y: i32,
        /// Degrees Celsius; `None` if the device sent no value
        value: Option<f32>,
    },
    /// Sensor die temperature.
    AmbientTemperature(Option<f32>),
    /// The firmware finished booting and the baseline commands were sent.
    SetupFinished,
    /// A raster scan over the region began.
    ScanStarted(Region),
    /// The scan ended; `completed` is false when it was cancelled.
    ScanFinished {
        /// Whether every cell was visited
        completed: bool,
    },
    /// A leveled log message for presentation layers.
    Log {
        /// Severity
        level: Level,
        /// Message text
        message: String,
    },
}

impl DeviceEvent {
    /// Shorthand for a log event.
    pub fn log(level: Level, message: impl Into<String>) -> Self {
        DeviceEvent::Log {
            level,
            message: message.into(),
        }
    }
}

/// Sender half of the event bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DeviceEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per receiver.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Register a new receiver. It sees events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscribers is not an error.
    pub fn publish(&self, event: DeviceEvent) {
        let _ = self.tx.send(event);
    }
}

/// Drain everything currently queued on `rx` without waiting.
///
/// Lagged receivers skip the lost events and continue.
pub fn drain(rx: &mut broadcast::Receiver<DeviceEvent>) -> Vec<DeviceEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event receiver lagged");
            }
            Err(_) => break,
        }
    }
    events
}
