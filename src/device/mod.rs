//! Device orchestration: the `ThermCam` controller, its raster scan state machine and
//! the events it publishes.

pub mod controller;
pub mod events;
pub mod scan;
pub mod types;

pub use controller::{Connected, DeviceStatus, ThermCam};
pub use events::{DeviceEvent, EventBus};
pub use scan::{ScanController, ScanStep};
pub use types::{Axis, FieldOfView, Position, Region, TempChannel};
