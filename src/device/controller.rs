//! The scanner device controller.
//!
//! `ThermCam` exclusively owns the writing half of the serial channel. The session
//! feeds it received bytes through [`ThermCam::handle_byte`]; everything the device
//! reports comes back out as [`DeviceEvent`]s on the controller's bus.
//!
//! Write failures after connecting are reported as warnings and never trigger a
//! reconnect: the user decides.

use super::events::{DeviceEvent, EventBus};
use super::scan::{ScanController, ScanStep};
use super::types::{Axis, FieldOfView, Position, Region, TempChannel};
use crate::config::{SerialConfig, ThermCamConfig};
use crate::error::{ChannelError, ConnectError, DeviceError, ProtocolError};
use crate::protocol::{parse_line, Command, CommandBatch, LineAssembler, Message};
use crate::serial::{self, ByteReader, CommandWriter, DeviceLock, DynSerial, PortSettings};
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn, Level};

/// A freshly opened connection; the session polls `reader` for device bytes.
#[derive(Debug)]
pub struct Connected {
    /// Receiving half of the port
    pub reader: ByteReader,
    /// Line settings applied to the port
    pub settings: PortSettings,
}

/// Snapshot of the controller state.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceStatus {
    /// Device path of the open connection
    pub port: Option<PathBuf>,
    /// Whether a channel is open
    pub connected: bool,
    /// Last announced field of view
    pub fov: Option<FieldOfView>,
    /// Last reported position
    pub position: Position,
    /// Last ambient reading
    pub ambient: Option<f32>,
    /// Whether a scan is running
    pub scanning: bool,
    /// Region of the active or last scan
    pub scan_region: Option<Region>,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let opt = |v: Option<i32>| v.map_or_else(|| "?".to_string(), |v| v.to_string());
        match (&self.port, self.connected) {
            (Some(port), true) => writeln!(f, "connected to {}", port.display())?,
            _ => writeln!(f, "disconnected")?,
        }
        match self.fov {
            Some(fov) => writeln!(f, "field of view: {fov}")?,
            None => writeln!(f, "field of view: unknown")?,
        }
        writeln!(
            f,
            "position: x={} y={}",
            opt(self.position.x),
            opt(self.position.y)
        )?;
        match self.ambient {
            Some(t) => writeln!(f, "ambient: {t:.2} °C")?,
            None => writeln!(f, "ambient: unknown")?,
        }
        match (self.scanning, self.scan_region) {
            (true, Some(region)) => write!(f, "scanning {region}"),
            (false, Some(region)) => write!(f, "idle (last scan {region})"),
            _ => write!(f, "idle"),
        }
    }
}

/// Controller for one pan/tilt thermal scanner.
pub struct ThermCam {
    serial: SerialConfig,
    home: (i32, i32),
    writer: Option<CommandWriter>,
    lock: Option<DeviceLock>,
    port: Option<PathBuf>,
    fov: Option<FieldOfView>,
    position: Position,
    ambient: Option<f32>,
    scan: ScanController,
    assembler: LineAssembler,
    bus: EventBus,
}

impl ThermCam {
    /// Create a disconnected controller.
    pub fn new(config: &ThermCamConfig) -> Self {
        Self {
            serial: config.serial.clone(),
            home: (config.device.home_x, config.device.home_y),
            writer: None,
            lock: None,
            port: None,
            fov: None,
            position: Position::default(),
            ambient: None,
            scan: ScanController::new(),
            assembler: LineAssembler::new(),
            bus: EventBus::default(),
        }
    }

    /// Receive events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.bus.subscribe()
    }

    /// Lock, open and configure the serial device at `path`.
    ///
    /// An existing connection is closed first. The lock is released on every failure
    /// after it was taken. The device is not ready to scan until it announced its
    /// field of view.
    pub async fn connect(&mut self, path: &Path) -> Result<Connected, ConnectError> {
        if self.is_connected() {
            self.disconnect().await;
        }

        let lock = match DeviceLock::acquire(path, &self.serial.lock_dir) {
            Ok(lock) => lock,
            Err(e) => {
                self.log(Level::ERROR, format!("Cannot lock {}: {}", path.display(), e));
                return Err(e);
            }
        };

        let requested = PortSettings::requested(self.serial.baud_rate);
        self.log(
            Level::INFO,
            format!("Configuring {}: {}", path.display(), requested),
        );
        let (port, settings) = match serial::open_port(path, self.serial.baud_rate).await {
            Ok(opened) => opened,
            Err(e) => {
                if let Err(unlock_err) = lock.release() {
                    warn!(port = %path.display(), "{}", unlock_err);
                }
                self.log(Level::ERROR, format!("Cannot open {}: {}", path.display(), e));
                return Err(e);
            }
        };

        if settings == requested {
            self.log(Level::INFO, format!("Opened {}: {}", path.display(), settings));
        } else {
            self.log(
                Level::WARN,
                format!("Opened {} with different settings: {}", path.display(), settings),
            );
        }
        let reader = self.attach(port, Some(lock), path);
        Ok(Connected { reader, settings })
    }

    /// Take ownership of an already open port, e.g. one end of an in-memory duplex.
    pub fn attach(&mut self, port: DynSerial, lock: Option<DeviceLock>, path: &Path) -> ByteReader {
        let (reader, writer) = serial::split(port);
        self.writer = Some(writer);
        self.lock = lock;
        self.port = Some(path.to_path_buf());
        self.position = Position::default();
        self.assembler = LineAssembler::new();
        reader
    }

    /// Turn the motors off, close the channel and release the lock.
    ///
    /// The field of view is kept until the device announces a new one. A running scan
    /// is cancelled.
    pub async fn disconnect(&mut self) {
        self.end_scan(false).await;

        if let Some(mut writer) = self.writer.take() {
            let motors_off = Command::MotorsOff.to_string();
            if let Err(e) = writer.write(motors_off.as_bytes()).await {
                self.log(Level::WARN, format!("Cannot switch motors off: {e}"));
            }
            if let Err(e) = writer.shutdown().await {
                debug!("Shutdown failed: {}", e);
            }
        }

        if let Some(lock) = self.lock.take() {
            if let Err(e) = lock.release() {
                self.log(Level::WARN, e.to_string());
            }
        }

        if let Some(port) = self.port.take() {
            self.log(Level::INFO, format!("Disconnected from {}", port.display()));
        }
        self.position = Position::default();
        self.assembler = LineAssembler::new();
    }

    /// Whether a channel is open.
    pub fn is_connected(&self) -> bool {
        self.writer.is_some()
    }

    /// Last announced field of view.
    pub fn fov(&self) -> Option<FieldOfView> {
        self.fov
    }

    /// Last reported position.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Scan state.
    pub fn scan(&self) -> &ScanController {
        &self.scan
    }

    /// Snapshot of the controller state.
    pub fn status(&self) -> DeviceStatus {
        DeviceStatus {
            port: self.port.clone(),
            connected: self.is_connected(),
            fov: self.fov,
            position: self.position,
            ambient: self.ambient,
            scanning: self.scan.in_progress(),
            scan_region: self.scan.region(),
        }
    }

    /// Move `axis` to `target`, clamped into the field of view.
    ///
    /// A move whose target had to be clamped is skipped when the device already
    /// reports the clamped boundary.
    pub async fn send_move(&mut self, axis: Axis, target: i32) -> Result<(), DeviceError> {
        let fov = self.fov.ok_or(DeviceError::FovUnknown)?;
        let clamped = fov.clamp(axis, target);
        if clamped != target && self.position.get(axis) == Some(clamped) {
            debug!(%axis, target, clamped, "Already at boundary, move skipped");
            return Ok(());
        }
        self.send(&std::iter::once(Command::move_to(axis, clamped)).collect())
            .await
    }

    /// Request an object temperature reading.
    pub async fn send_read_object_temp(&mut self) -> Result<(), DeviceError> {
        self.send(&std::iter::once(Command::ReadObjectTemp).collect())
            .await
    }

    /// Request an ambient temperature reading.
    pub async fn send_read_ambient_temp(&mut self) -> Result<(), DeviceError> {
        self.send(&std::iter::once(Command::ReadAmbientTemp).collect())
            .await
    }

    /// Start a raster scan over `region`, or the whole field of view.
    pub async fn start_scan(&mut self, region: Option<Region>) -> Result<Region, DeviceError> {
        if !self.is_connected() {
            return Err(DeviceError::NotConnected);
        }
        let fov = self.fov.ok_or(DeviceError::FovUnknown)?;
        let region = region.unwrap_or(fov);
        let batch = self.scan.start(region, &fov)?;

        if let Err(e) = self.send(&batch).await {
            self.scan.stop();
            return Err(e);
        }
        self.log(Level::INFO, format!("Scanning {region}"));
        self.bus.publish(DeviceEvent::ScanStarted(region));
        Ok(region)
    }

    /// Cancel a running scan. No-op when idle.
    pub async fn stop_scan(&mut self) {
        self.end_scan(false).await;
    }

    async fn end_scan(&mut self, completed: bool) {
        if let Some(batch) = self.scan.stop() {
            self.send_logged(&batch).await;
            let verb = if completed { "finished" } else { "cancelled" };
            self.log(Level::INFO, format!("Scan {verb}"));
            self.bus.publish(DeviceEvent::ScanFinished { completed });
        }
    }

    /// Feed one received byte; complete lines are handled immediately.
    pub async fn handle_byte(&mut self, byte: u8) {
        match self.assembler.push(byte) {
            Some(Ok(line)) => self.handle_line(&line).await,
            Some(Err(e)) => self.log(Level::ERROR, e.to_string()),
            None => {}
        }
    }

    /// Handle one complete line from the device.
    pub async fn handle_line(&mut self, line: &str) {
        if line.starts_with('E') {
            self.log(Level::ERROR, format!("Line: {line}"));
        } else {
            self.log(Level::INFO, format!("Line: {line}"));
        }

        match parse_line(line) {
            Ok(message) => self.handle_message(message).await,
            Err(ProtocolError::Malformed(_)) => {
                self.log(Level::ERROR, "Above message has invalid format!");
            }
            Err(e @ ProtocolError::UnknownInfoLine(_)) => self.log(Level::WARN, e.to_string()),
            Err(e @ ProtocolError::FieldParseFailure { .. }) => {
                self.log(Level::ERROR, e.to_string());
            }
        }
    }

    async fn handle_message(&mut self, message: Message) {
        match message {
            Message::Dims(fov) => {
                self.fov = Some(fov);
                self.bus.publish(DeviceEvent::Ready(fov));
            }
            Message::Position { axis, value } => {
                self.position.set(axis, value);
                self.bus.publish(DeviceEvent::PositionChanged { axis, value });
            }
            Message::Temperature {
                channel: TempChannel::Ambient,
                value,
            } => {
                self.ambient = value;
                self.bus.publish(DeviceEvent::AmbientTemperature(value));
            }
            Message::Temperature {
                channel: TempChannel::Object,
                value,
            } => self.handle_object_temperature(value).await,
            Message::SetupFinished => {
                let (home_x, home_y) = self.home;
                let mut baseline = CommandBatch::new();
                baseline
                    .queue(Command::MotorsOn)
                    .queue(Command::move_to(Axis::X, home_x))
                    .queue(Command::move_to(Axis::Y, home_y))
                    .queue(Command::ReadObjectTemp)
                    .queue(Command::ReadAmbientTemp);
                self.send_logged(&baseline).await;
                self.bus.publish(DeviceEvent::SetupFinished);
            }
            Message::DeviceError(text) => {
                error!(device_error = %text, "Device reported an error");
            }
        }
    }

    async fn handle_object_temperature(&mut self, value: Option<f32>) {
        let Some((x, y)) = self.position.known() else {
            self.log(
                Level::WARN,
                "Object temperature received before the position is known, dropped",
            );
            self.end_scan(false).await;
            return;
        };

        self.bus
            .publish(DeviceEvent::ObjectTemperature { x, y, value });

        match self.scan.advance(x, y) {
            ScanStep::Idle => {}
            ScanStep::Next(batch) => self.send_logged(&batch).await,
            ScanStep::Finished => self.end_scan(true).await,
        }
    }

    async fn send(&mut self, batch: &CommandBatch) -> Result<(), DeviceError> {
        let writer = self.writer.as_mut().ok_or(DeviceError::NotConnected)?;
        let encoded = batch.encode();
        debug!(command = %encoded, "Sending command");
        match writer.write(encoded.as_bytes()).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let message = match &e {
                    ChannelError::ShortWrite { .. } => format!("Command {encoded:?}: {e}"),
                    _ => format!("Cannot send {encoded:?}: {e}"),
                };
                self.log(Level::WARN, message);
                Err(DeviceError::Channel(e))
            }
        }
    }

    /// Send from the reactor path, where failures are only reported.
    async fn send_logged(&mut self, batch: &CommandBatch) {
        if let Err(DeviceError::NotConnected) = self.send(batch).await {
            self.log(Level::WARN, format!("Not connected, {:?} dropped", batch.encode()));
        }
    }

    fn log(&self, level: Level, message: impl Into<String>) {
        let message = message.into();
        match level {
            Level::ERROR => error!("{}", message),
            Level::WARN => warn!("{}", message),
            Level::INFO => info!("{}", message),
            _ => debug!("{}", message),
        }
        self.bus.publish(DeviceEvent::log(level, message));
    }
}
