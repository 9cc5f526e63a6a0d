//! # ThermCam Host Library
//!
//! Host side of a pan/tilt infrared thermal scanner: an embedded controller drives two
//! servos and an IR thermometer, and this crate talks to it over a serial line, runs
//! raster scans sample by sample and assembles the readings into a false-color image.
//!
//! ## Crate Structure
//!
//! - **`serial`**: advisory `LCK..` lock files and the raw 8-bit serial channel.
//! - **`protocol`**: command encoding and the line parser for device replies.
//! - **`device`**: the `ThermCam` controller, its scan state machine and the typed
//!   events it publishes.
//! - **`view`**: the sample buffer, colormap, viewport overlays, `.qtcd` persistence and
//!   image export.
//! - **`session`**: the single-threaded reactor that connects a channel, the controller
//!   and the viewport.
//! - **`config`**: layered configuration via `figment`.
//! - **`tracing_setup`**: `tracing-subscriber` initialization.
//! - **`error`**: the error taxonomy.

pub mod config;
pub mod device;
pub mod error;
pub mod protocol;
pub mod serial;
pub mod session;
pub mod tracing_setup;
pub mod view;

pub use config::ThermCamConfig;
pub use device::{DeviceEvent, ThermCam};
pub use error::{AppResult, ThermCamError};
pub use session::{ScanOutcome, Session};
pub use view::TempView;
