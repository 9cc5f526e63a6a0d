//! Error types for the thermal scanner host.
//!
//! Each layer gets its own `thiserror` enum so callers can tell the failure
//! classes apart:
//!
//! - **`ConnectError`**: acquiring the advisory lock and opening/configuring the
//!   serial port. Always aborts the connect attempt.
//! - **`ProtocolError`**: a received line could not be classified or one of its
//!   fields did not parse. Never aborts the session.
//! - **`ChannelError`**: mid-session I/O on the open port. Logged as a warning; the
//!   user decides whether to reconnect.
//! - **`PersistenceError`**: loading or saving a `.qtcd` scan document. The variants
//!   separate I/O, parse and validation failures.
//! - **`LockError`**: anomalies found while releasing a lock file.
//! - **`DeviceError`**: preconditions of device commands (not connected, FOV unknown,
//!   scan already running).
//!
//! `ThermCamError` consolidates all of them with `#[from]` so `?` works across layers.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the crate-wide error type.
pub type AppResult<T> = std::result::Result<T, ThermCamError>;

/// Failure to bring up a device connection.
#[derive(Error, Debug)]
pub enum ConnectError {
    /// The device node does not exist.
    #[error("{0}: device does not exist")]
    NotFound(PathBuf),

    /// The device node (or lock directory) is not accessible to this process.
    #[error("{0}: permission denied")]
    PermissionDenied(PathBuf),

    /// Another live process holds the advisory lock.
    #[error("Device is locked by process {0}")]
    DeviceLocked(i32),

    /// The lock file could not be created, read, written or removed.
    #[error("Lock file {path}: {source}")]
    LockFailed {
        /// Lock file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Opening succeeded but the line settings could not be applied.
    #[error("Port configuration failed: {0}")]
    PortConfigFailed(String),

    /// Built without the `instrument_serial` feature.
    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,
}

/// A received line that could not be turned into a device message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    /// The line starts with neither `I` nor `E`.
    #[error("Malformed line: {0:?}")]
    Malformed(String),

    /// An `I` line that matches none of the known patterns.
    #[error("Unrecognized info line: {0:?}")]
    UnknownInfoLine(String),

    /// A recognized line whose payload field failed to parse.
    #[error("Invalid {field} in line {line:?}")]
    FieldParseFailure {
        /// Name of the offending field.
        field: &'static str,
        /// The complete line.
        line: String,
    },
}

/// I/O failure on an open serial channel.
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Fewer bytes were accepted than requested.
    #[error("Short write: {written} of {expected} bytes sent")]
    ShortWrite {
        /// Bytes accepted by the port.
        written: usize,
        /// Bytes requested.
        expected: usize,
    },

    /// The write failed outright.
    #[error("Write failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    /// Reading from the port failed.
    #[error("Read failed: {0}")]
    ReadFailed(#[source] std::io::Error),

    /// The port reported end of stream.
    #[error("Unexpected EOF from serial port")]
    UnexpectedEof,
}

/// Failure while loading or saving a persisted scan.
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// The file could not be opened or read.
    #[error("Cannot open {path}: {source}")]
    OpenFailed {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file could not be written.
    #[error("Cannot write {path}: {source}")]
    WriteFailed {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not well formed.
    #[error("Cannot parse scan document: {0}")]
    ParseFailed(String),

    /// A coordinate lies outside the declared field of view.
    #[error("Bounds violation: {0}")]
    BoundsViolation(String),

    /// No buffer has been allocated yet.
    #[error("No scan data to save")]
    NoData,

    /// The rendered image could not be encoded.
    #[error("Image export failed: {0}")]
    ImageExport(#[from] image::ImageError),
}

/// Anomaly detected while releasing a device lock.
#[derive(Error, Debug)]
pub enum LockError {
    /// The lock file vanished while we held it.
    #[error("Someone unlocked the device behind our back!")]
    Missing,

    /// The lock file now names a different process.
    #[error("Someone unlocked the device behind our back AND locked it, new process is {0}")]
    ForeignOwner(i32),

    /// The lock file could not be read or removed.
    #[error("Lock file {path}: {source}")]
    Io {
        /// Lock file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

/// A device command that cannot be issued in the current state.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// No serial channel is open.
    #[error("Device not connected")]
    NotConnected,

    /// The device has not announced its field of view yet.
    #[error("Field of view not reported by device yet")]
    FovUnknown,

    /// A scan is already running.
    #[error("A scan is already in progress")]
    ScanInProgress,

    /// The requested scan rectangle exceeds the field of view.
    #[error("Scan region {0} lies outside the field of view {1}")]
    ScanOutOfBounds(String, String),

    /// The command bytes could not be sent.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

/// Crate-wide error type.
#[derive(Error, Debug)]
pub enum ThermCamError {
    /// Connection setup failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Device command rejected or not sent.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Serial channel I/O failed.
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Scan document could not be loaded or saved.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Configuration file parsing failed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration values are semantically invalid.
    #[error("Configuration validation error: {0}")]
    Configuration(String),
}

impl From<figment::Error> for ThermCamError {
    fn from(value: figment::Error) -> Self {
        ThermCamError::Config(Box::new(value))
    }
}

impl ConnectError {
    /// Map an I/O error on `path` into the connect taxonomy.
    pub(crate) fn from_io(path: PathBuf, err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => ConnectError::NotFound(path),
            std::io::ErrorKind::PermissionDenied => ConnectError::PermissionDenied(path),
            _ => ConnectError::PortConfigFailed(format!("{}: {}", path.display(), err)),
        }
    }
}
