//! Raster scan state machine.
//!
//! ```text
//!          start(region)                 reading at (xmax, ymax)
//!   Idle ───────────────▶ Scanning ───────────────────────────▶ Idle
//!                            │  ▲        stop()
//!                            └──┘ reading elsewhere: next cell
//! ```
//!
//! The controller produces commands only; it never touches the channel. Exactly one
//! object reading is outstanding while scanning, and that reading's arrival is the
//! clock that advances the raster (x fast, y slow).

use super::types::{Axis, FieldOfView, Region};
use crate::error::DeviceError;
use crate::protocol::{Command, CommandBatch};

/// What to do after a reading was recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanStep {
    /// No scan is running.
    Idle,
    /// Send these commands to visit the next cell.
    Next(CommandBatch),
    /// The last cell was read; the scan is over.
    Finished,
}

/// Region and progress of the current, or most recent, scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanController {
    region: Option<Region>,
    in_progress: bool,
}

impl ScanController {
    /// Creates an idle controller.
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` while a scan is running.
    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    /// Region of the active or most recently finished scan.
    pub fn region(&self) -> Option<Region> {
        self.region
    }

    /// Begin scanning `region`, which must lie inside `fov`.
    ///
    /// Returns the opening sequence: disable the joystick, go to `(xmin, ymin)`, read.
    pub fn start(&mut self, region: Region, fov: &FieldOfView) -> Result<CommandBatch, DeviceError> {
        if self.in_progress {
            return Err(DeviceError::ScanInProgress);
        }
        if !fov.contains_region(&region) {
            return Err(DeviceError::ScanOutOfBounds(
                region.to_string(),
                fov.to_string(),
            ));
        }

        self.region = Some(region);
        self.in_progress = true;

        let mut batch = CommandBatch::new();
        batch
            .queue(Command::JoystickDisable)
            .queue(Command::move_to(Axis::Y, region.ymin()))
            .queue(Command::move_to(Axis::X, region.xmin()))
            .queue(Command::ReadObjectTemp);
        Ok(batch)
    }

    /// Advance after the reading at `(x, y)` was recorded.
    ///
    /// On [`ScanStep::Finished`] the caller is expected to [`stop`](Self::stop).
    pub fn advance(&mut self, x: i32, y: i32) -> ScanStep {
        let Some(region) = self.region.filter(|_| self.in_progress) else {
            return ScanStep::Idle;
        };

        let mut batch = CommandBatch::new();
        if x >= region.xmax() {
            if y >= region.ymax() {
                return ScanStep::Finished;
            }
            batch
                .queue(Command::move_to(Axis::Y, y + 1))
                .queue(Command::move_to(Axis::X, region.xmin()));
        } else {
            batch.queue(Command::move_to(Axis::X, x + 1));
        }
        batch.queue(Command::ReadObjectTemp);
        ScanStep::Next(batch)
    }

    /// End the scan and hand back the command re-enabling the joystick.
    ///
    /// `None` when already idle.
    pub fn stop(&mut self) -> Option<CommandBatch> {
        if !self.in_progress {
            return None;
        }
        self.in_progress = false;
        Some(std::iter::once(Command::JoystickEnable).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fov() -> FieldOfView {
        Region::new(0, 10, 0, 10).unwrap()
    }

    #[test]
    fn start_sequence() {
        let mut scan = ScanController::new();
        let batch = scan.start(Region::new(2, 4, 3, 5).unwrap(), &fov()).unwrap();
        assert_eq!(batch.encode(), "jd!py3!px2!to!");
        assert!(scan.in_progress());
    }

    #[test]
    fn start_rejects_busy_and_out_of_bounds() {
        let mut scan = ScanController::new();
        assert!(matches!(
            scan.start(Region::new(0, 11, 0, 1).unwrap(), &fov()),
            Err(DeviceError::ScanOutOfBounds(..))
        ));
        assert!(!scan.in_progress());

        scan.start(Region::new(0, 1, 0, 1).unwrap(), &fov()).unwrap();
        assert!(matches!(
            scan.start(Region::new(0, 1, 0, 1).unwrap(), &fov()),
            Err(DeviceError::ScanInProgress)
        ));
    }

    #[test]
    fn advances_in_raster_order() {
        let mut scan = ScanController::new();
        scan.start(Region::new(0, 2, 0, 1).unwrap(), &fov()).unwrap();

        let encoded = |step: ScanStep| match step {
            ScanStep::Next(batch) => batch.encode(),
            other => panic!("unexpected step {:?}", other),
        };
        assert_eq!(encoded(scan.advance(0, 0)), "px1!to!");
        assert_eq!(encoded(scan.advance(1, 0)), "px2!to!");
        assert_eq!(encoded(scan.advance(2, 0)), "py1!px0!to!");
        assert_eq!(encoded(scan.advance(0, 1)), "px1!to!");
        assert_eq!(encoded(scan.advance(1, 1)), "px2!to!");
        assert_eq!(scan.advance(2, 1), ScanStep::Finished);
    }

    #[test]
    fn stop_is_idempotent_and_keeps_region() {
        let mut scan = ScanController::new();
        assert!(scan.stop().is_none());

        let region = Region::new(1, 1, 1, 1).unwrap();
        scan.start(region, &fov()).unwrap();
        assert_eq!(scan.stop().unwrap().encode(), "je!");
        assert!(scan.stop().is_none());
        assert_eq!(scan.advance(1, 1), ScanStep::Idle);
        assert_eq!(scan.region(), Some(region));
    }
}
