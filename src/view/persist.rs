//! `.qtcd` scan documents.
//!
//! A JSON document with four records:
//!
//! ```json
//! {
//!   "fov": { "xmin": 30, "xmax": 31, "ymin": 40, "ymax": 40 },
//!   "highlight": { "x": 31, "y": 40 },
//!   "data": [
//!     { "y": 40, "columns": [ { "x": 30, "t": "21.5" }, { "x": 31, "t": "" } ] }
//!   ],
//!   "show": [ "30,40" ]
//! }
//! ```
//!
//! Unset cells are stored as an empty string rather than a number. Loading validates
//! `fov` itself (ordered bounds, at most [`MAX_REGION_CELLS`] cells) and every
//! coordinate against it, stopping at the first violation.
//!
//! The layout mirrors the XML scan files of the original Qt tool (same records and
//! attribute names) but is not byte-compatible with them; those files cannot be
//! loaded.

use super::buffer::SampleBuffer;
use super::viewport::TempView;
use crate::device::types::{Region, MAX_REGION_CELLS};
use crate::error::PersistenceError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Serialized form of a [`TempView`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanDocument {
    /// Region covered by `data`
    pub fov: FovRecord,
    /// Live cursor cell at save time
    #[serde(default)]
    pub highlight: HighlightRecord,
    /// One record per row
    #[serde(default)]
    pub data: Vec<RowRecord>,
    /// Annotated cells as `"x,y"`
    #[serde(default)]
    pub show: Vec<String>,
}

/// Bounds as stored; checked when the document is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FovRecord {
    /// Lowest X angle
    pub xmin: i32,
    /// Highest X angle
    pub xmax: i32,
    /// Lowest Y angle
    pub ymin: i32,
    /// Highest Y angle
    pub ymax: i32,
}

impl From<Region> for FovRecord {
    fn from(region: Region) -> Self {
        Self {
            xmin: region.xmin(),
            xmax: region.xmax(),
            ymin: region.ymin(),
            ymax: region.ymax(),
        }
    }
}

impl FovRecord {
    fn region(&self) -> Result<Region, PersistenceError> {
        Region::new(self.xmin, self.xmax, self.ymin, self.ymax).ok_or_else(|| {
            PersistenceError::BoundsViolation(format!(
                "fov x {}..={}, y {}..={} is inverted or exceeds {MAX_REGION_CELLS} cells",
                self.xmin, self.xmax, self.ymin, self.ymax
            ))
        })
    }
}

/// Optional cursor coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightRecord {
    /// X angle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    /// Y angle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
}

/// Samples of one row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowRecord {
    /// Row coordinate
    pub y: i32,
    /// Cells of the row
    pub columns: Vec<ColumnRecord>,
}

/// A single cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRecord {
    /// Column coordinate
    pub x: i32,
    /// Temperature, or empty for an unset cell
    pub t: String,
}

impl ScanDocument {
    /// Capture the buffer, highlight and annotations of `view`.
    pub fn from_view(view: &TempView) -> Result<Self, PersistenceError> {
        let buffer = view.buffer().ok_or(PersistenceError::NoData)?;
        let region = buffer.region();

        let data = (region.ymin()..=region.ymax())
            .map(|y| RowRecord {
                y,
                columns: (region.xmin()..=region.xmax())
                    .map(|x| ColumnRecord {
                        x,
                        t: buffer.get(x, y).map(|t| t.to_string()).unwrap_or_default(),
                    })
                    .collect(),
            })
            .collect();

        let (x, y) = view.highlight().unzip();
        Ok(Self {
            fov: region.into(),
            highlight: HighlightRecord { x, y },
            data,
            show: view.annotations().map(|(x, y)| format!("{x},{y}")).collect(),
        })
    }

    /// Validate the document and install it into `view`.
    ///
    /// On error `view` is left untouched.
    pub fn apply_to(&self, view: &mut TempView) -> Result<(), PersistenceError> {
        let fov = self.fov.region()?;
        let mut buffer = SampleBuffer::new(fov);

        for row in &self.data {
            if !(fov.ymin()..=fov.ymax()).contains(&row.y) {
                return Err(PersistenceError::BoundsViolation(format!(
                    "row y={} outside {fov}",
                    row.y
                )));
            }
            for column in &row.columns {
                if !fov.contains(column.x, row.y) {
                    return Err(PersistenceError::BoundsViolation(format!(
                        "column x={} of row y={} outside {fov}",
                        column.x, row.y
                    )));
                }
                let text = column.t.trim();
                if text.is_empty() {
                    continue;
                }
                let value = text.parse::<f32>().map_err(|_| {
                    PersistenceError::ParseFailed(format!(
                        "invalid temperature {:?} at {},{}",
                        column.t, column.x, row.y
                    ))
                })?;
                buffer.set(column.x, row.y, value);
            }
        }

        let annotations = self
            .show
            .iter()
            .map(|entry| {
                let (x, y) = parse_point(entry)?;
                if fov.contains(x, y) {
                    Ok((x, y))
                } else {
                    Err(PersistenceError::BoundsViolation(format!(
                        "annotation {x},{y} outside {fov}"
                    )))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let highlight = match (self.highlight.x, self.highlight.y) {
            (Some(x), Some(y)) => Some((x, y)),
            _ => None,
        };

        view.restore(buffer, highlight, annotations);
        Ok(())
    }
}

fn parse_point(entry: &str) -> Result<(i32, i32), PersistenceError> {
    let invalid = || PersistenceError::ParseFailed(format!("invalid point {entry:?}"));
    let (x, y) = entry.split_once(',').ok_or_else(invalid)?;
    let x = x.trim().parse::<i32>().map_err(|_| invalid())?;
    let y = y.trim().parse::<i32>().map_err(|_| invalid())?;
    Ok((x, y))
}

/// Save `view` to `path`.
pub fn save_scan(view: &TempView, path: &Path) -> Result<(), PersistenceError> {
    let document = ScanDocument::from_view(view)?;
    let json = serde_json::to_string_pretty(&document)
        .map_err(|e| PersistenceError::ParseFailed(e.to_string()))?;
    fs::write(path, json).map_err(|source| PersistenceError::WriteFailed {
        path: path.to_path_buf(),
        source,
    })?;
    info!(path = %path.display(), fov = ?document.fov, "Scan saved");
    Ok(())
}

/// Load `path` into `view`.
pub fn load_scan(view: &mut TempView, path: &Path) -> Result<(), PersistenceError> {
    let json = fs::read_to_string(path).map_err(|source| PersistenceError::OpenFailed {
        path: path.to_path_buf(),
        source,
    })?;
    let document: ScanDocument =
        serde_json::from_str(&json).map_err(|e| PersistenceError::ParseFailed(e.to_string()))?;
    document.apply_to(view)?;
    info!(path = %path.display(), fov = ?document.fov, "Scan loaded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_view() -> TempView {
        let mut view = TempView::new();
        view.allocate(Region::new(30, 31, 40, 40).unwrap());
        view.set_sample(30, 40, 21.5);
        view.set_highlight(Some((31, 40)));
        view.annotate(30, 40);
        view
    }

    #[test]
    fn document_layout() {
        let document = ScanDocument::from_view(&sample_view()).unwrap();
        let json = serde_json::to_value(&document).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "fov": { "xmin": 30, "xmax": 31, "ymin": 40, "ymax": 40 },
                "highlight": { "x": 31, "y": 40 },
                "data": [
                    { "y": 40, "columns": [ { "x": 30, "t": "21.5" }, { "x": 31, "t": "" } ] }
                ],
                "show": [ "30,40" ]
            })
        );
    }

    #[test]
    fn empty_view_cannot_be_saved() {
        let dir = tempdir().unwrap();
        let err = save_scan(&TempView::new(), &dir.path().join("x.qtcd")).unwrap_err();
        assert!(matches!(err, PersistenceError::NoData));
    }

    #[test]
    fn missing_file_is_open_failure() {
        let dir = tempdir().unwrap();
        let mut view = TempView::new();
        let err = load_scan(&mut view, &dir.path().join("absent.qtcd")).unwrap_err();
        assert!(matches!(err, PersistenceError::OpenFailed { .. }));
    }

    #[test]
    fn garbage_is_parse_failure() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.qtcd");
        fs::write(&path, "<thermcam/>").unwrap();
        let err = load_scan(&mut TempView::new(), &path).unwrap_err();
        assert!(matches!(err, PersistenceError::ParseFailed(_)));
    }

    #[test]
    fn out_of_bounds_cell_is_rejected_and_view_kept() {
        let mut document = ScanDocument::from_view(&sample_view()).unwrap();
        document.data[0].columns.push(ColumnRecord {
            x: 99,
            t: "1.0".to_string(),
        });

        let mut view = sample_view();
        let err = document.apply_to(&mut view).unwrap_err();
        assert!(matches!(err, PersistenceError::BoundsViolation(_)));
        assert_eq!(view.buffer().unwrap().get(30, 40), Some(21.5));
    }

    #[test]
    fn out_of_bounds_row_and_annotation_are_rejected() {
        let mut document = ScanDocument::from_view(&sample_view()).unwrap();
        document.data[0].y = 41;
        assert!(matches!(
            document.apply_to(&mut TempView::new()),
            Err(PersistenceError::BoundsViolation(_))
        ));

        let mut document = ScanDocument::from_view(&sample_view()).unwrap();
        document.show.push("29,40".to_string());
        assert!(matches!(
            document.apply_to(&mut TempView::new()),
            Err(PersistenceError::BoundsViolation(_))
        ));

        document.show = vec!["30;40".to_string()];
        assert!(matches!(
            document.apply_to(&mut TempView::new()),
            Err(PersistenceError::ParseFailed(_))
        ));
    }

    #[test]
    fn hostile_fov_is_bounds_violation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("huge.qtcd");
        for fov in [
            r#"{"xmin":-2147483648,"xmax":2147483647,"ymin":0,"ymax":0}"#,
            r#"{"xmin":0,"xmax":100000,"ymin":0,"ymax":100000}"#,
            r#"{"xmin":5,"xmax":4,"ymin":0,"ymax":0}"#,
        ] {
            fs::write(&path, format!(r#"{{"fov":{fov},"data":[],"show":[]}}"#)).unwrap();
            let mut view = sample_view();
            let err = load_scan(&mut view, &path).unwrap_err();
            assert!(matches!(err, PersistenceError::BoundsViolation(_)), "{fov}: {err}");
            assert_eq!(view.buffer().unwrap().get(30, 40), Some(21.5));
        }
    }

    #[test]
    fn partial_highlight_loads_as_none() {
        let mut document = ScanDocument::from_view(&sample_view()).unwrap();
        document.highlight = HighlightRecord {
            x: Some(30),
            y: None,
        };
        let mut view = TempView::new();
        document.apply_to(&mut view).unwrap();
        assert_eq!(view.highlight(), None);
    }
}
