//! Dense grid of temperature samples over a scan region.

use crate::device::types::Region;

/// Temperature grid indexed by servo coordinates.
///
/// Cells start unset. The running range covers every value ever written; it is
/// `None` until the first sample.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    region: Region,
    cells: Vec<Option<f32>>,
    range: Option<(f32, f32)>,
}

impl SampleBuffer {
    /// Allocate an all-unset grid covering `region`.
    pub fn new(region: Region) -> Self {
        Self {
            region,
            cells: vec![None; region.area()],
            range: None,
        }
    }

    /// Covered coordinates.
    pub fn region(&self) -> Region {
        self.region
    }

    /// Columns.
    pub fn width(&self) -> usize {
        self.region.width()
    }

    /// Rows.
    pub fn height(&self) -> usize {
        self.region.height()
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if !self.region.contains(x, y) {
            return None;
        }
        let column = (x - self.region.xmin()) as usize;
        let row = (y - self.region.ymin()) as usize;
        Some(row * self.width() + column)
    }

    /// Sample at `(x, y)`; `None` if unset or out of bounds.
    pub fn get(&self, x: i32, y: i32) -> Option<f32> {
        self.index(x, y).and_then(|i| self.cells[i])
    }

    /// Store a sample. Returns `false` (and changes nothing) when out of bounds.
    pub fn set(&mut self, x: i32, y: i32, value: f32) -> bool {
        let Some(i) = self.index(x, y) else {
            return false;
        };
        self.cells[i] = Some(value);
        self.range = Some(match self.range {
            Some((tmin, tmax)) => (tmin.min(value), tmax.max(value)),
            None => (value, value),
        });
        true
    }

    /// `(tmin, tmax)` over the samples written so far.
    pub fn range(&self) -> Option<(f32, f32)> {
        self.range
    }

    /// Lowest sample written so far.
    pub fn tmin(&self) -> Option<f32> {
        self.range.map(|(tmin, _)| tmin)
    }

    /// Highest sample written so far.
    pub fn tmax(&self) -> Option<f32> {
        self.range.map(|(_, tmax)| tmax)
    }

    /// One data row, lowest x first.
    pub fn row(&self, y: i32) -> Option<&[Option<f32>]> {
        if !(self.region.ymin()..=self.region.ymax()).contains(&y) {
            return None;
        }
        let start = (y - self.region.ymin()) as usize * self.width();
        Some(&self.cells[start..start + self.width()])
    }

    /// Number of set cells.
    pub fn set_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// All cells as `(x, y, value)` in raster order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, i32, Option<f32>)> + '_ {
        self.region
            .raster()
            .zip(self.cells.iter())
            .map(|((x, y), value)| (x, y, *value))
    }
}
