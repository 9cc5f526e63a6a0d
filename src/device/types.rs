//! Coordinate types shared by the protocol, the scan controller and the viewport.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Servo axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// Pan (fast scan axis)
    X,
    /// Tilt (slow scan axis)
    Y,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "x"),
            Axis::Y => write!(f, "y"),
        }
    }
}

/// Temperature sensor channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TempChannel {
    /// The spot the sensor is aimed at
    Object,
    /// The sensor's own die temperature
    Ambient,
}

/// Most cells a region may span; every region can back a sample grid and an image.
pub const MAX_REGION_CELLS: u64 = 1 << 20;

/// Inclusive rectangle of servo angles in degrees.
///
/// Used both for the device's field of view and for a scan's sub-region of it.
/// Constructed only through [`Region::new`], so `xmin <= xmax`, `ymin <= ymax` and
/// `area() <= MAX_REGION_CELLS` hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRegion", into = "RawRegion")]
pub struct Region {
    xmin: i32,
    xmax: i32,
    ymin: i32,
    ymax: i32,
}

/// Field of view reported by the device.
pub type FieldOfView = Region;

impl Region {
    /// Create a region, rejecting inverted bounds and regions larger than
    /// [`MAX_REGION_CELLS`].
    pub fn new(xmin: i32, xmax: i32, ymin: i32, ymax: i32) -> Option<Self> {
        if xmin > xmax || ymin > ymax {
            return None;
        }
        let cells = span(xmin, xmax).checked_mul(span(ymin, ymax))?;
        (cells <= MAX_REGION_CELLS).then_some(Self {
            xmin,
            xmax,
            ymin,
            ymax,
        })
    }

    /// Lowest X angle
    pub fn xmin(&self) -> i32 {
        self.xmin
    }

    /// Highest X angle
    pub fn xmax(&self) -> i32 {
        self.xmax
    }

    /// Lowest Y angle
    pub fn ymin(&self) -> i32 {
        self.ymin
    }

    /// Highest Y angle
    pub fn ymax(&self) -> i32 {
        self.ymax
    }

    /// Bounds of one axis as `(min, max)`.
    pub fn bounds(&self, axis: Axis) -> (i32, i32) {
        match axis {
            Axis::X => (self.xmin, self.xmax),
            Axis::Y => (self.ymin, self.ymax),
        }
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        span(self.xmin, self.xmax) as usize
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        span(self.ymin, self.ymax) as usize
    }

    /// Number of cells.
    pub fn area(&self) -> usize {
        self.width() * self.height()
    }

    /// Whether `(x, y)` lies inside.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        (self.xmin..=self.xmax).contains(&x) && (self.ymin..=self.ymax).contains(&y)
    }

    /// Whether `other` lies entirely inside.
    pub fn contains_region(&self, other: &Region) -> bool {
        self.contains(other.xmin, other.ymin) && self.contains(other.xmax, other.ymax)
    }

    /// Clamp `value` into the bounds of `axis`.
    pub fn clamp(&self, axis: Axis, value: i32) -> i32 {
        let (min, max) = self.bounds(axis);
        value.clamp(min, max)
    }

    /// Coordinates in raster order: x fastest, then y.
    pub fn raster(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        (self.ymin..=self.ymax).flat_map(move |y| (self.xmin..=self.xmax).map(move |x| (x, y)))
    }
}

/// Number of integers in `min..=max`; `min <= max`.
fn span(min: i32, max: i32) -> u64 {
    (i64::from(max) - i64::from(min) + 1) as u64
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "x {}..={}, y {}..={}",
            self.xmin, self.xmax, self.ymin, self.ymax
        )
    }
}

#[derive(Serialize, Deserialize)]
struct RawRegion {
    xmin: i32,
    xmax: i32,
    ymin: i32,
    ymax: i32,
}

impl TryFrom<RawRegion> for Region {
    type Error = String;

    fn try_from(raw: RawRegion) -> Result<Self, Self::Error> {
        Region::new(raw.xmin, raw.xmax, raw.ymin, raw.ymax).ok_or_else(|| {
            format!(
                "inverted or oversized bounds: xmin={} xmax={} ymin={} ymax={}",
                raw.xmin, raw.xmax, raw.ymin, raw.ymax
            )
        })
    }
}

impl From<Region> for RawRegion {
    fn from(region: Region) -> Self {
        Self {
            xmin: region.xmin,
            xmax: region.xmax,
            ymin: region.ymin,
            ymax: region.ymax,
        }
    }
}

/// Last position reported by the device; `None` per axis until reported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    /// X angle
    pub x: Option<i32>,
    /// Y angle
    pub y: Option<i32>,
}

impl Position {
    /// Position of one axis.
    pub fn get(&self, axis: Axis) -> Option<i32> {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
        }
    }

    /// Record a reported position.
    pub fn set(&mut self, axis: Axis, value: i32) {
        match axis {
            Axis::X => self.x = Some(value),
            Axis::Y => self.y = Some(value),
        }
    }

    /// Both coordinates, if known.
    pub fn known(&self) -> Option<(i32, i32)> {
        Some((self.x?, self.y?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_inverted_bounds() {
        assert!(Region::new(10, 5, 0, 1).is_none());
        assert!(Region::new(0, 1, 3, 2).is_none());
        assert!(Region::new(4, 4, 7, 7).is_some());
    }

    #[test]
    fn rejects_oversized_bounds() {
        assert!(Region::new(i32::MIN, i32::MAX, 0, 0).is_none());
        assert!(Region::new(i32::MIN, i32::MAX, i32::MIN, i32::MAX).is_none());
        assert!(Region::new(0, 100_000, 0, 100_000).is_none());
        assert!(Region::new(0, 1023, 0, 1023).is_some());
        assert!(Region::new(0, 1024, 0, 1023).is_none());

        let widest = Region::new(i32::MAX - 9, i32::MAX, -5, 5).unwrap();
        assert_eq!(widest.width(), 10);
        assert_eq!(widest.area(), 110);
    }

    #[test]
    fn oversized_bounds_fail_to_deserialize() {
        let json = r#"{"xmin":-2147483648,"xmax":2147483647,"ymin":0,"ymax":0}"#;
        assert!(serde_json::from_str::<Region>(json).is_err());
    }

    #[test]
    fn dimensions_are_inclusive() {
        let fov = Region::new(30, 170, 30, 165).unwrap();
        assert_eq!(fov.width(), 141);
        assert_eq!(fov.height(), 136);
        assert_eq!(fov.area(), 141 * 136);
    }

    #[test]
    fn clamps_per_axis() {
        let fov = Region::new(30, 170, 30, 165).unwrap();
        assert_eq!(fov.clamp(Axis::X, 10), 30);
        assert_eq!(fov.clamp(Axis::X, 200), 170);
        assert_eq!(fov.clamp(Axis::Y, 166), 165);
        assert_eq!(fov.clamp(Axis::Y, 90), 90);
    }

    #[test]
    fn raster_is_x_fast() {
        let region = Region::new(0, 2, 0, 1).unwrap();
        let visited: Vec<_> = region.raster().collect();
        assert_eq!(
            visited,
            vec![(0, 0), (1, 0), (2, 0), (0, 1), (1, 1), (2, 1)]
        );
    }

    #[test]
    fn sub_region_containment() {
        let fov = Region::new(30, 170, 30, 165).unwrap();
        assert!(fov.contains_region(&Region::new(40, 50, 60, 70).unwrap()));
        assert!(!fov.contains_region(&Region::new(20, 50, 60, 70).unwrap()));
    }

    #[test]
    fn serde_rejects_inverted_region() {
        let ok: Region = serde_json::from_str(r#"{"xmin":0,"xmax":2,"ymin":0,"ymax":1}"#).unwrap();
        assert_eq!(ok.width(), 3);
        assert!(serde_json::from_str::<Region>(r#"{"xmin":3,"xmax":2,"ymin":0,"ymax":1}"#).is_err());
    }
}
