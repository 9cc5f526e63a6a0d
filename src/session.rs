//! Single-threaded reactor tying the pieces together.
//!
//! A `Session` owns the device controller and the viewport. Each turn of the loop
//! waits for either the next byte from the device or the caller's shutdown signal,
//! feeds the byte to the controller and folds the resulting events into the view.
//!
//! ## Cooperative scheduling
//!
//! Nothing runs on another thread. After a display refresh during a scan the reactor
//! yields, so a pending cancellation is observed between samples. There is no reply
//! timeout: a wedged device stalls the scan until the user cancels it.
//!
//! ## Functionality
//!
//! - **`wait_until_ready`**: waits for the field of view and the baseline readings
//!   that follow `Isetup finished`
//! - **`run_scan`**: drives a raster scan to completion or cancellation
//! - **`monitor`**: pumps bytes until shutdown, for watching the device log

use crate::device::events::{drain, DeviceEvent};
use crate::device::types::{FieldOfView, Region};
use crate::device::ThermCam;
use crate::error::{ChannelError, ThermCamError};
use crate::serial::ByteReader;
use crate::view::TempView;
use image::RgbImage;
use std::future::Future;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// How a scan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Scanned region
    pub region: Region,
    /// `false` when cancelled or interrupted
    pub completed: bool,
    /// Cells holding a value
    pub samples: usize,
}

/// Progress towards a usable device after connecting.
#[derive(Debug, Default, Clone, Copy)]
struct Readiness {
    fov: Option<FieldOfView>,
    setup_finished: bool,
    baseline_done: bool,
}

/// Controller, viewport and the event subscription between them.
pub struct Session {
    cam: ThermCam,
    view: TempView,
    events: broadcast::Receiver<DeviceEvent>,
    view_size: (u32, u32),
    frame: Option<RgbImage>,
}

impl Session {
    /// Wrap a controller; `view_size` is the viewport used for display refreshes.
    pub fn new(cam: ThermCam, view_size: (u32, u32)) -> Self {
        let events = cam.subscribe();
        Self {
            cam,
            view: TempView::new(),
            events,
            view_size,
            frame: None,
        }
    }

    /// The device controller.
    pub fn controller(&self) -> &ThermCam {
        &self.cam
    }

    /// The device controller, for issuing commands.
    pub fn controller_mut(&mut self) -> &mut ThermCam {
        &mut self.cam
    }

    /// The viewport.
    pub fn view(&self) -> &TempView {
        &self.view
    }

    /// The viewport, for annotations and export.
    pub fn view_mut(&mut self) -> &mut TempView {
        &mut self.view
    }

    /// Latest display image composed during a scan.
    pub fn frame(&self) -> Option<&RgbImage> {
        self.frame.as_ref()
    }

    /// Take one byte from the device and process everything it triggers.
    pub async fn pump(&mut self, reader: &mut ByteReader) -> Result<Vec<DeviceEvent>, ChannelError> {
        let byte = reader.next_byte().await?;
        self.cam.handle_byte(byte).await;
        Ok(self.dispatch())
    }

    /// Fold queued controller events into the view and return them.
    fn dispatch(&mut self) -> Vec<DeviceEvent> {
        let events = drain(&mut self.events);
        for event in &events {
            self.view.apply_event(event);
        }
        events
    }

    /// Wait until the device announced its field of view and answered the baseline
    /// requests sent after `Isetup finished`.
    ///
    /// Returns `None` if `shutdown` fires first.
    pub async fn wait_until_ready<F>(
        &mut self,
        reader: &mut ByteReader,
        shutdown: F,
    ) -> Result<Option<FieldOfView>, ChannelError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut readiness = Readiness {
            fov: self.cam.fov(),
            ..Default::default()
        };

        loop {
            if let (Some(fov), true, true) =
                (readiness.fov, readiness.setup_finished, readiness.baseline_done)
            {
                info!(%fov, "Device ready");
                return Ok(Some(fov));
            }

            let events = tokio::select! {
                events = self.pump(reader) => events?,
                () = &mut shutdown => return Ok(None),
            };
            for event in events {
                match event {
                    DeviceEvent::Ready(fov) => readiness.fov = Some(fov),
                    DeviceEvent::SetupFinished => readiness.setup_finished = true,
                    // `ta!` is the last baseline request; its reply comes after the object one
                    DeviceEvent::AmbientTemperature(_) if readiness.setup_finished => {
                        readiness.baseline_done = true;
                    }
                    _ => {}
                }
            }
        }
    }

    /// Scan `region` (whole field of view when `None`) until it completes, `shutdown`
    /// fires, or the channel fails.
    ///
    /// On shutdown the scan is cancelled cleanly. A channel failure is returned as an
    /// error; the collected samples stay in the view either way.
    pub async fn run_scan<F>(
        &mut self,
        reader: &mut ByteReader,
        region: Option<Region>,
        shutdown: F,
    ) -> Result<ScanOutcome, ThermCamError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let region = self.cam.start_scan(region).await?;
        self.dispatch();

        loop {
            let events = tokio::select! {
                events = self.pump(reader) => events,
                () = &mut shutdown => {
                    info!("Cancelling scan");
                    self.cam.stop_scan().await;
                    self.dispatch();
                    return Ok(self.outcome(region, false));
                }
            };

            let events = match events {
                Ok(events) => events,
                Err(e) => {
                    self.cam.stop_scan().await;
                    self.dispatch();
                    return Err(e.into());
                }
            };

            let mut row_done = false;
            for event in &events {
                match event {
                    DeviceEvent::ScanFinished { completed } => {
                        self.refresh();
                        return Ok(self.outcome(region, *completed));
                    }
                    DeviceEvent::ObjectTemperature { x, .. } if *x >= region.xmax() => {
                        row_done = true;
                    }
                    _ => {}
                }
            }

            if row_done {
                self.refresh();
                tokio::task::yield_now().await;
            }
        }
    }

    /// Pump bytes until `shutdown` fires or the channel fails.
    pub async fn monitor<F>(&mut self, reader: &mut ByteReader, shutdown: F) -> Result<(), ChannelError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                events = self.pump(reader) => {
                    for event in events? {
                        debug!(?event, "Device event");
                    }
                }
                () = &mut shutdown => return Ok(()),
            }
        }
    }

    fn refresh(&mut self) {
        let (width, height) = self.view_size;
        self.frame = self.view.refresh_view(width, height);
    }

    fn outcome(&self, region: Region, completed: bool) -> ScanOutcome {
        ScanOutcome {
            region,
            completed,
            samples: self.view.buffer().map_or(0, |b| b.set_count()),
        }
    }

    /// Release the device and hand back the viewport.
    pub async fn close(mut self) -> TempView {
        self.cam.disconnect().await;
        self.view
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThermCamConfig;
    use std::path::Path;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn ready_after_dims_setup_and_baseline() {
        let mut cam = ThermCam::new(&ThermCamConfig::default());
        let (host, mut device) = tokio::io::duplex(1024);
        let mut reader = cam.attach(Box::new(host), None, Path::new("/dev/null"));
        let mut session = Session::new(cam, (100, 100));

        device
            .write_all(b"Idims:30,170,30,165\nIsetup finished\nIx: 90\nIy: 90\nItemp object:20.00\nItemp ambient:21.00\n")
            .await
            .unwrap();

        let fov = session
            .wait_until_ready(&mut reader, std::future::pending())
            .await
            .unwrap();
        assert_eq!(fov, Region::new(30, 170, 30, 165));
        assert_eq!(session.view().highlight(), Some((90, 90)));
    }

    #[tokio::test]
    async fn shutdown_interrupts_waiting() {
        let mut cam = ThermCam::new(&ThermCamConfig::default());
        let (host, _device) = tokio::io::duplex(64);
        let mut reader = cam.attach(Box::new(host), None, Path::new("/dev/null"));
        let mut session = Session::new(cam, (100, 100));

        let fov = session
            .wait_until_ready(&mut reader, std::future::ready(()))
            .await
            .unwrap();
        assert_eq!(fov, None);
    }

    #[tokio::test]
    async fn late_reading_after_scan_keeps_grid() {
        let mut cam = ThermCam::new(&ThermCamConfig::default());
        let (host, mut device) = tokio::io::duplex(1024);
        let mut reader = cam.attach(Box::new(host), None, Path::new("/dev/null"));
        let mut session = Session::new(cam, (100, 100));

        device.write_all(b"Idims:0,1,0,0\n").await.unwrap();
        while session.controller().fov().is_none() {
            session.pump(&mut reader).await.unwrap();
        }

        device
            .write_all(b"Iy: 0\nIx: 0\nItemp object:20.00\nIx: 1\nItemp object:21.00\nIx: 0\nItemp object:99.00\n")
            .await
            .unwrap();

        let outcome = session
            .run_scan(&mut reader, None, std::future::pending())
            .await
            .unwrap();
        assert!(outcome.completed);
        drop(device);

        // the reply to a manual read after the scan
        let result = session.monitor(&mut reader, std::future::pending()).await;
        assert!(matches!(result, Err(ChannelError::UnexpectedEof)));
        assert_eq!(session.controller().position().x, Some(0));

        let buffer = session.view().buffer().unwrap();
        assert_eq!(buffer.get(0, 0), Some(20.0));
        assert_eq!(buffer.range(), Some((20.0, 21.0)));
    }

    #[tokio::test]
    async fn monitor_reports_eof() {
        let mut cam = ThermCam::new(&ThermCamConfig::default());
        let (host, device) = tokio::io::duplex(64);
        let mut reader = cam.attach(Box::new(host), None, Path::new("/dev/null"));
        let mut session = Session::new(cam, (100, 100));
        drop(device);

        let result = session.monitor(&mut reader, std::future::pending()).await;
        assert!(matches!(result, Err(ChannelError::UnexpectedEof)));
    }
}
