//! The duplex byte channel to the scanner controller.
//!
//! Opening applies raw 8-bit line settings (no flow control, modem lines ignored) and
//! hands back the two halves of the port: a [`ByteReader`] that the reactor polls one
//! byte at a time, and a [`CommandWriter`] owned exclusively by the device controller.

use crate::error::{ChannelError, ConnectError};
use std::fmt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tracing::trace;

/// Trait alias for async serial port I/O.
///
/// Implemented by `tokio_serial::SerialStream` for real hardware and by
/// `tokio::io::DuplexStream` in tests.
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> SerialPortIO for T {}

/// Type-erased boxed serial port.
pub type DynSerial = Box<dyn SerialPortIO>;

/// Split a port into its reading and writing halves.
pub fn split(port: DynSerial) -> (ByteReader, CommandWriter) {
    let (read, write) = tokio::io::split(port);
    (
        ByteReader {
            inner: BufReader::new(read),
        },
        CommandWriter { inner: write },
    )
}

/// Receiving half of the channel.
pub struct ByteReader {
    inner: BufReader<ReadHalf<DynSerial>>,
}

impl std::fmt::Debug for ByteReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteReader").finish_non_exhaustive()
    }
}

impl ByteReader {
    /// Wait for the next byte from the device.
    pub async fn next_byte(&mut self) -> Result<u8, ChannelError> {
        self.inner.read_u8().await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ChannelError::UnexpectedEof
            } else {
                ChannelError::ReadFailed(e)
            }
        })
    }
}

/// Sending half of the channel.
pub struct CommandWriter {
    inner: WriteHalf<DynSerial>,
}

impl CommandWriter {
    /// Send `bytes` with a single write.
    ///
    /// A partial write is reported as [`ChannelError::ShortWrite`]; the caller decides
    /// whether that matters.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<usize, ChannelError> {
        let written = self
            .inner
            .write(bytes)
            .await
            .map_err(ChannelError::WriteFailed)?;
        if written == 0 && !bytes.is_empty() {
            return Err(ChannelError::WriteFailed(std::io::Error::from(
                std::io::ErrorKind::WriteZero,
            )));
        }
        self.inner.flush().await.map_err(ChannelError::WriteFailed)?;
        trace!(written, "Bytes sent: {:?}", String::from_utf8_lossy(&bytes[..written]));
        if written < bytes.len() {
            return Err(ChannelError::ShortWrite {
                written,
                expected: bytes.len(),
            });
        }
        Ok(written)
    }

    /// Flush and shut down the writing direction.
    pub async fn shutdown(&mut self) -> Result<(), ChannelError> {
        self.inner.shutdown().await.map_err(ChannelError::WriteFailed)
    }
}

/// Line settings of a port, as requested or as read back after opening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSettings {
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits per character
    pub data_bits: u8,
    /// Parity mode
    pub parity: String,
    /// Stop bits
    pub stop_bits: u8,
    /// Flow control mode
    pub flow_control: String,
}

impl PortSettings {
    /// The raw 8N1 line without flow control that [`open_port`] applies.
    pub fn requested(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            data_bits: 8,
            parity: "None".to_string(),
            stop_bits: 1,
            flow_control: "None".to_string(),
        }
    }
}

impl fmt::Display for PortSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "speed {} baud, {} data bits, parity {}, {} stop bit(s), flow control {}",
            self.baud_rate, self.data_bits, self.parity, self.stop_bits, self.flow_control
        )
    }
}

/// Open and configure the serial device at `path`.
///
/// Runs on the blocking pool; the port is raw 8N1 without flow control.
#[cfg(feature = "instrument_serial")]
pub async fn open_port(
    path: &std::path::Path,
    baud_rate: u32,
) -> Result<(DynSerial, PortSettings), ConnectError> {
    use tokio_serial::{SerialPort, SerialPortBuilderExt};

    let path_owned = path.to_path_buf();
    let opened = tokio::task::spawn_blocking(move || {
        let port_name = path_owned.to_string_lossy().into_owned();
        let port = tokio_serial::new(&port_name, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| map_serial_error(&path_owned, e))?;

        let settings = PortSettings {
            baud_rate: port.baud_rate().map_err(settings_error)?,
            data_bits: match port.data_bits().map_err(settings_error)? {
                tokio_serial::DataBits::Five => 5,
                tokio_serial::DataBits::Six => 6,
                tokio_serial::DataBits::Seven => 7,
                tokio_serial::DataBits::Eight => 8,
            },
            parity: port.parity().map_err(settings_error)?.to_string(),
            stop_bits: match port.stop_bits().map_err(settings_error)? {
                tokio_serial::StopBits::One => 1,
                tokio_serial::StopBits::Two => 2,
            },
            flow_control: port.flow_control().map_err(settings_error)?.to_string(),
        };
        Ok::<_, ConnectError>((port, settings))
    })
    .await
    .map_err(|e| ConnectError::PortConfigFailed(format!("open task failed: {e}")))??;

    let (port, settings) = opened;
    Ok((Box::new(port), settings))
}

/// Serial support is compiled out; every open fails.
#[cfg(not(feature = "instrument_serial"))]
pub async fn open_port(
    _path: &std::path::Path,
    _baud_rate: u32,
) -> Result<(DynSerial, PortSettings), ConnectError> {
    Err(ConnectError::SerialFeatureDisabled)
}

#[cfg(feature = "instrument_serial")]
fn map_serial_error(path: &std::path::Path, err: tokio_serial::Error) -> ConnectError {
    match err.kind() {
        tokio_serial::ErrorKind::NoDevice => ConnectError::NotFound(path.to_path_buf()),
        tokio_serial::ErrorKind::Io(kind) => {
            ConnectError::from_io(path.to_path_buf(), &std::io::Error::new(kind, err.description))
        }
        _ => ConnectError::PortConfigFailed(format!("{}: {}", path.display(), err.description)),
    }
}

#[cfg(feature = "instrument_serial")]
fn settings_error(err: tokio_serial::Error) -> ConnectError {
    ConnectError::PortConfigFailed(err.description)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reader_yields_bytes_then_eof() {
        let (mut host, device) = tokio::io::duplex(64);
        let (mut reader, _writer) = split(Box::new(device));

        host.write_all(b"Ix").await.unwrap();
        drop(host);

        assert_eq!(reader.next_byte().await.unwrap(), b'I');
        assert_eq!(reader.next_byte().await.unwrap(), b'x');
        assert!(matches!(
            reader.next_byte().await,
            Err(ChannelError::UnexpectedEof)
        ));
    }

    #[tokio::test]
    async fn writer_sends_whole_command() {
        let (mut host, device) = tokio::io::duplex(64);
        let (_reader, mut writer) = split(Box::new(device));

        assert_eq!(writer.write(b"px90!").await.unwrap(), 5);

        let mut buf = [0u8; 5];
        host.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"px90!");
    }

    #[tokio::test]
    async fn writer_reports_short_write() {
        let (mut host, device) = tokio::io::duplex(4);
        let (_reader, mut writer) = split(Box::new(device));

        match writer.write(b"px100!").await {
            Err(ChannelError::ShortWrite { written, expected }) => {
                assert_eq!(written, 4);
                assert_eq!(expected, 6);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let mut buf = [0u8; 4];
        host.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"px10");
    }

    #[test]
    fn settings_display() {
        let settings = PortSettings::requested(115_200);
        assert_eq!(settings.data_bits, 8);
        assert_eq!(
            settings.to_string(),
            "speed 115200 baud, 8 data bits, parity None, 1 stop bit(s), flow control None"
        );
    }
}
