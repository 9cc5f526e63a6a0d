//! Serial link to the scanner controller.
//!
//! - [`lock`]: advisory `LCK..<device>` lock files shared with other serial tools
//! - [`channel`]: opening the port and the split reader/writer halves

pub mod channel;
pub mod lock;

pub use channel::{open_port, split, ByteReader, CommandWriter, DynSerial, PortSettings, SerialPortIO};
pub use lock::{lock_file_path, DeviceLock, ProcessProbe, SignalProbe};
