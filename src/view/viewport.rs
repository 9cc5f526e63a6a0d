//! Viewport over the sample buffer ("TempView").
//!
//! Keeps a data-sized false-color image that is recolored row by row as samples
//! arrive, and composes display images from it: integer upscaling, centering inside
//! the viewport, a highlight frame around the live cursor cell and value labels at
//! annotated cells.
//!
//! Data rows grow upwards while image rows grow downwards, so sample row `ymin` is
//! the bottom image row.

use super::buffer::SampleBuffer;
use super::colormap;
use super::glyphs;
use crate::device::events::DeviceEvent;
use crate::device::types::{Position, Region};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;
use std::collections::BTreeMap;

/// Frame drawn around the highlighted cell.
pub const HIGHLIGHT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
/// Annotation dot and label color.
pub const ANNOTATION_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// Placement of the rendered pixmap inside the viewport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    /// Screen pixels per sample cell
    pub scale: u32,
    /// Left padding
    pub offset_x: u32,
    /// Top padding
    pub offset_y: u32,
    /// Pixmap width
    pub width: u32,
    /// Pixmap height
    pub height: u32,
}

impl Layout {
    /// Largest integer scale at which `data` fits into `viewport`, never below 1.
    pub fn fit(data: (u32, u32), viewport: (u32, u32)) -> Self {
        let (dw, dh) = (data.0.max(1), data.1.max(1));
        let scale = (viewport.0 / dw).min(viewport.1 / dh).max(1);
        let (width, height) = (dw * scale, dh * scale);
        Self {
            scale,
            offset_x: viewport.0.saturating_sub(width) / 2,
            offset_y: viewport.1.saturating_sub(height) / 2,
            width,
            height,
        }
    }
}

/// Sample grid plus everything needed to display it.
#[derive(Debug, Clone, Default)]
pub struct TempView {
    buffer: Option<SampleBuffer>,
    cache: RgbImage,
    cursor: Position,
    highlight: Option<(i32, i32)>,
    // Between `ScanStarted` and `ScanFinished`; readings outside that window are ignored.
    collecting: bool,
    // Annotated cells with their label size at glyph scale 1, computed lazily.
    annotations: BTreeMap<(i32, i32), Option<(u32, u32)>>,
    layout: Option<Layout>,
}

impl TempView {
    /// An empty view without a buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the buffer with an all-unset grid over `region`.
    ///
    /// Annotations are cleared; the highlight cursor is kept.
    pub fn allocate(&mut self, region: Region) {
        let buffer = SampleBuffer::new(region);
        self.cache = RgbImage::from_pixel(
            buffer.width() as u32,
            buffer.height() as u32,
            colormap::UNSET_COLOR,
        );
        self.buffer = Some(buffer);
        self.annotations.clear();
        self.layout = None;
    }

    /// The sample buffer, if allocated.
    pub fn buffer(&self) -> Option<&SampleBuffer> {
        self.buffer.as_ref()
    }

    /// Data-sized false-color image.
    pub fn image(&self) -> &RgbImage {
        &self.cache
    }

    /// Store a sample without recoloring. Returns `false` when out of bounds.
    pub fn set_sample(&mut self, x: i32, y: i32, value: f32) -> bool {
        let Some(buffer) = self.buffer.as_mut() else {
            return false;
        };
        if !buffer.set(x, y, value) {
            return false;
        }
        if let Some(size) = self.annotations.get_mut(&(x, y)) {
            *size = None;
        }
        true
    }

    /// Recolor data rows `y_from..=y_to` (clamped to the buffer).
    pub fn render_rows(&mut self, y_from: i32, y_to: i32) {
        let Some(buffer) = self.buffer.as_ref() else {
            return;
        };
        let region = buffer.region();
        let range = buffer.range();
        let bottom = region.height() as u32 - 1;

        for y in y_from.max(region.ymin())..=y_to.min(region.ymax()) {
            let Some(row) = buffer.row(y) else { continue };
            let image_row = bottom - (y - region.ymin()) as u32;
            for (column, value) in row.iter().enumerate() {
                self.cache
                    .put_pixel(column as u32, image_row, colormap::color_for(*value, range));
            }
        }
    }

    /// Recolor every row.
    pub fn render_all(&mut self) {
        if let Some(region) = self.buffer.as_ref().map(SampleBuffer::region) {
            self.render_rows(region.ymin(), region.ymax());
        }
    }

    /// Live cursor cell.
    pub fn highlight(&self) -> Option<(i32, i32)> {
        self.highlight
    }

    /// Move or clear the live cursor cell.
    pub fn set_highlight(&mut self, highlight: Option<(i32, i32)>) {
        self.highlight = highlight;
    }

    /// Annotated cells in coordinate order.
    pub fn annotations(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        self.annotations.keys().copied()
    }

    /// Add an annotation at `(x, y)`. Returns `false` when out of bounds.
    pub fn annotate(&mut self, x: i32, y: i32) -> bool {
        if !self.in_bounds(x, y) {
            return false;
        }
        self.annotations.entry((x, y)).or_insert(None);
        true
    }

    /// Add the annotation at `(x, y)` if absent, remove it if present.
    ///
    /// Returns whether the cell is annotated afterwards, or `None` when out of bounds.
    pub fn toggle_annotation(&mut self, x: i32, y: i32) -> Option<bool> {
        if !self.in_bounds(x, y) {
            return None;
        }
        if self.annotations.remove(&(x, y)).is_some() {
            Some(false)
        } else {
            self.annotations.insert((x, y), None);
            Some(true)
        }
    }

    fn in_bounds(&self, x: i32, y: i32) -> bool {
        self.buffer
            .as_ref()
            .is_some_and(|b| b.region().contains(x, y))
    }

    /// Label shown for the cell at `(x, y)`.
    pub fn label_text(&self, x: i32, y: i32) -> String {
        match self.buffer.as_ref().and_then(|b| b.get(x, y)) {
            Some(value) => format!("{value:.1}"),
            None => "--".to_string(),
        }
    }

    /// Layout of the last [`refresh_view`](Self::refresh_view).
    pub fn layout(&self) -> Option<Layout> {
        self.layout
    }

    /// Compose the display image for a `width` x `height` viewport.
    ///
    /// The returned pixmap excludes the centering padding recorded in [`layout`](Self::layout).
    /// `None` before a buffer is allocated.
    pub fn refresh_view(&mut self, width: u32, height: u32) -> Option<RgbImage> {
        let region = self.buffer.as_ref()?.region();
        let layout = Layout::fit(self.cache.dimensions(), (width, height));
        self.layout = Some(layout);

        let scale = layout.scale;
        let mut pixmap = RgbImage::from_fn(layout.width, layout.height, |px, py| {
            *self.cache.get_pixel(px / scale, py / scale)
        });

        if let Some((x, y)) = self.highlight.filter(|(x, y)| region.contains(*x, *y)) {
            let (left, top) = cell_origin(&region, scale, x, y);
            let frame = Rect::at(left as i32 - 1, top as i32 - 1).of_size(scale + 2, scale + 2);
            draw_hollow_rect_mut(&mut pixmap, frame, HIGHLIGHT_COLOR);
        }

        let label_scale = (scale / 6).clamp(1, 4);
        let radius = (scale / 4).max(1) as i64;
        let cells: Vec<(i32, i32)> = self.annotations().collect();
        for (x, y) in cells {
            let text = self.label_text(x, y);
            let (lw, lh) = match self.annotations.get_mut(&(x, y)) {
                Some(Some(size)) => *size,
                Some(cached) => *cached.insert(glyphs::text_size(&text, 1)),
                None => continue,
            };
            let (lw, lh) = (i64::from(lw * label_scale), i64::from(lh * label_scale));

            let (left, top) = cell_origin(&region, scale, x, y);
            let cx = i64::from(left + scale / 2);
            let cy = i64::from(top + scale / 2);
            draw_filled_circle_mut(&mut pixmap, (cx as i32, cy as i32), radius as i32, ANNOTATION_COLOR);

            let (pw, ph) = (i64::from(layout.width), i64::from(layout.height));
            let mut lx = cx + radius + 1;
            if lx + lw > pw {
                lx = cx - radius - 1 - lw;
            }
            let mut ly = cy - radius - 1 - lh;
            if ly < 0 {
                ly = cy + radius + 1;
            }
            let lx = lx.clamp(0, (pw - lw).max(0));
            let ly = ly.clamp(0, (ph - lh).max(0));
            glyphs::draw_text(&mut pixmap, lx, ly, &text, label_scale, ANNOTATION_COLOR);
        }

        Some(pixmap)
    }

    /// Map a viewport pixel back to the sample under it.
    ///
    /// Uses the layout of the last refresh; `None` for points in the padding, outside
    /// the pixmap, or before any refresh.
    pub fn point_to_sample(&self, px: i32, py: i32) -> Option<(i32, i32)> {
        let layout = self.layout?;
        let region = self.buffer.as_ref()?.region();

        let col = i64::from(px) - i64::from(layout.offset_x);
        let row = i64::from(py) - i64::from(layout.offset_y);
        if !(0..i64::from(layout.width)).contains(&col) || !(0..i64::from(layout.height)).contains(&row) {
            return None;
        }
        let scale = i64::from(layout.scale);
        let x = i64::from(region.xmin()) + col / scale;
        let y = i64::from(region.ymax()) - row / scale;
        Some((x as i32, y as i32))
    }

    /// Whether object readings are currently being recorded.
    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    /// Fold a device event into the view. Returns `true` when a refresh is due.
    ///
    /// Object readings are stored only while a scan is running; late replies and
    /// manual reads leave the grid alone.
    pub fn apply_event(&mut self, event: &DeviceEvent) -> bool {
        match event {
            DeviceEvent::ScanStarted(region) => {
                self.allocate(*region);
                self.collecting = true;
                true
            }
            DeviceEvent::ScanFinished { .. } => {
                self.collecting = false;
                false
            }
            DeviceEvent::PositionChanged { axis, value } => {
                self.cursor.set(*axis, *value);
                self.highlight = self.cursor.known();
                true
            }
            DeviceEvent::ObjectTemperature {
                x,
                y,
                value: Some(value),
            } if self.collecting => {
                let before = self.buffer.as_ref().and_then(SampleBuffer::range);
                if !self.set_sample(*x, *y, *value) {
                    return false;
                }
                let after = self.buffer.as_ref().and_then(SampleBuffer::range);
                if before == after {
                    self.render_rows(*y, *y);
                } else {
                    self.render_all();
                }
                true
            }
            _ => false,
        }
    }

    /// Install a loaded grid, highlight and annotation set.
    pub(crate) fn restore(
        &mut self,
        buffer: SampleBuffer,
        highlight: Option<(i32, i32)>,
        annotations: impl IntoIterator<Item = (i32, i32)>,
    ) {
        self.allocate(buffer.region());
        self.collecting = false;
        self.buffer = Some(buffer);
        self.highlight = highlight;
        self.annotations = annotations.into_iter().map(|p| (p, None)).collect();
        self.render_all();
    }
}

/// Top-left pixmap pixel of the cell at `(x, y)`.
fn cell_origin(region: &Region, scale: u32, x: i32, y: i32) -> (u32, u32) {
    let column = (x - region.xmin()) as u32;
    let row_from_top = (region.ymax() - y) as u32;
    (column * scale, row_from_top * scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::types::Axis;

    fn view_3x2() -> TempView {
        let mut view = TempView::new();
        view.allocate(Region::new(0, 2, 0, 1).unwrap());
        view
    }

    #[test]
    fn layout_uses_integer_scale_and_centers() {
        let layout = Layout::fit((3, 2), (100, 50));
        assert_eq!(layout.scale, 25);
        assert_eq!((layout.width, layout.height), (75, 50));
        assert_eq!((layout.offset_x, layout.offset_y), (12, 0));

        let tiny = Layout::fit((141, 136), (50, 50));
        assert_eq!(tiny.scale, 1);
        assert_eq!((tiny.offset_x, tiny.offset_y), (0, 0));
    }

    #[test]
    fn rows_are_flipped() {
        let mut view = view_3x2();
        view.set_sample(0, 0, 0.0);
        view.set_sample(2, 1, 100.0);
        view.render_all();

        // y = 0 is the bottom image row
        assert_eq!(*view.image().get_pixel(0, 1), colormap::color_for_level(0));
        assert_eq!(*view.image().get_pixel(2, 0), colormap::color_for_level(1024));
        assert_eq!(*view.image().get_pixel(1, 0), colormap::UNSET_COLOR);
    }

    #[test]
    fn render_rows_touches_only_requested_rows() {
        let mut view = view_3x2();
        view.set_sample(0, 0, 1.0);
        view.set_sample(0, 1, 2.0);
        view.render_rows(1, 1);

        assert_ne!(*view.image().get_pixel(0, 0), colormap::UNSET_COLOR);
        assert_eq!(*view.image().get_pixel(0, 1), colormap::UNSET_COLOR);
    }

    #[test]
    fn allocate_resets_samples_and_annotations() {
        let mut view = view_3x2();
        view.set_sample(1, 1, 20.0);
        view.annotate(1, 1);
        view.set_highlight(Some((1, 1)));

        view.allocate(Region::new(0, 4, 0, 4).unwrap());
        let buffer = view.buffer().unwrap();
        assert_eq!(buffer.set_count(), 0);
        assert_eq!(buffer.range(), None);
        assert_eq!(view.annotations().count(), 0);
        assert_eq!(view.image().dimensions(), (5, 5));
        assert_eq!(view.highlight(), Some((1, 1)));
    }

    #[test]
    fn point_mapping_inverts_scale_flip_and_padding() {
        let mut view = view_3x2();
        let pixmap = view.refresh_view(100, 50).unwrap();
        assert_eq!(pixmap.dimensions(), (75, 50));

        // padding
        assert_eq!(view.point_to_sample(5, 10), None);
        assert_eq!(view.point_to_sample(87, 10), None);
        // top-left cell is (xmin, ymax)
        assert_eq!(view.point_to_sample(12, 0), Some((0, 1)));
        // bottom-right cell is (xmax, ymin)
        assert_eq!(view.point_to_sample(86, 49), Some((2, 0)));
        assert_eq!(view.point_to_sample(40, 30), Some((1, 0)));
        assert_eq!(view.point_to_sample(40, 50), None);
    }

    #[test]
    fn point_mapping_needs_a_refresh() {
        let view = view_3x2();
        assert_eq!(view.point_to_sample(0, 0), None);
    }

    #[test]
    fn highlight_frame_is_drawn_around_cell() {
        let mut view = view_3x2();
        view.set_highlight(Some((1, 0)));
        let pixmap = view.refresh_view(30, 20).unwrap();
        // scale 10, cell (1, 0) spans x 10..20, y 10..20; frame starts one pixel outside
        assert_eq!(*pixmap.get_pixel(9, 15), HIGHLIGHT_COLOR);
        assert_eq!(*pixmap.get_pixel(15, 9), HIGHLIGHT_COLOR);
        assert_eq!(*pixmap.get_pixel(15, 15), colormap::UNSET_COLOR);
    }

    #[test]
    fn out_of_bounds_highlight_is_not_drawn() {
        let mut view = view_3x2();
        view.set_highlight(Some((90, 90)));
        let pixmap = view.refresh_view(30, 20).unwrap();
        assert!(pixmap.pixels().all(|p| *p == colormap::UNSET_COLOR));
    }

    #[test]
    fn annotations_toggle_and_label() {
        let mut view = view_3x2();
        assert_eq!(view.toggle_annotation(5, 5), None);
        assert_eq!(view.toggle_annotation(2, 1), Some(true));
        assert_eq!(view.label_text(2, 1), "--");

        view.set_sample(2, 1, 36.66);
        assert_eq!(view.label_text(2, 1), "36.7");

        let pixmap = view.refresh_view(300, 200).unwrap();
        assert!(pixmap.pixels().any(|p| *p == ANNOTATION_COLOR));

        assert_eq!(view.toggle_annotation(2, 1), Some(false));
        assert_eq!(view.annotations().count(), 0);
    }

    #[test]
    fn label_cache_is_invalidated_by_new_sample() {
        let mut view = view_3x2();
        view.annotate(0, 0);
        view.set_sample(0, 0, 5.0);
        view.refresh_view(30, 20);
        assert_eq!(view.annotations.get(&(0, 0)), Some(&Some((11, 5))));

        view.set_sample(0, 0, -15.0);
        assert_eq!(view.annotations.get(&(0, 0)), Some(&None));
        view.refresh_view(30, 20);
        assert_eq!(view.annotations.get(&(0, 0)), Some(&Some((19, 5))));
    }

    #[test]
    fn events_drive_buffer_and_highlight() {
        let mut view = TempView::new();
        let region = Region::new(0, 2, 0, 1).unwrap();
        assert!(view.apply_event(&DeviceEvent::ScanStarted(region)));
        assert!(view.apply_event(&DeviceEvent::PositionChanged {
            axis: Axis::X,
            value: 1
        }));
        assert_eq!(view.highlight(), None);
        view.apply_event(&DeviceEvent::PositionChanged {
            axis: Axis::Y,
            value: 0,
        });
        assert_eq!(view.highlight(), Some((1, 0)));

        assert!(view.apply_event(&DeviceEvent::ObjectTemperature {
            x: 1,
            y: 0,
            value: Some(22.0)
        }));
        assert!(!view.apply_event(&DeviceEvent::ObjectTemperature {
            x: 1,
            y: 1,
            value: None
        }));
        assert!(!view.apply_event(&DeviceEvent::ObjectTemperature {
            x: 9,
            y: 9,
            value: Some(1.0)
        }));
        assert_eq!(view.buffer().unwrap().get(1, 0), Some(22.0));
        assert_ne!(*view.image().get_pixel(1, 1), colormap::UNSET_COLOR);
    }

    #[test]
    fn readings_outside_a_scan_are_ignored() {
        let mut view = TempView::new();
        let reading = |x, value| DeviceEvent::ObjectTemperature {
            x,
            y: 0,
            value: Some(value),
        };
        assert!(!view.apply_event(&reading(0, 5.0)));
        assert!(view.buffer().is_none());

        view.apply_event(&DeviceEvent::ScanStarted(Region::new(0, 1, 0, 0).unwrap()));
        assert!(view.is_collecting());
        assert!(view.apply_event(&reading(0, 20.0)));
        assert!(view.apply_event(&reading(1, 21.0)));
        view.apply_event(&DeviceEvent::ScanFinished { completed: true });
        assert!(!view.is_collecting());

        assert!(!view.apply_event(&reading(0, 99.0)));
        let buffer = view.buffer().unwrap();
        assert_eq!(buffer.get(0, 0), Some(20.0));
        assert_eq!(buffer.range(), Some((20.0, 21.0)));
    }
}
