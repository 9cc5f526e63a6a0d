//! Sample storage and presentation ("TempView").
//!
//! - [`buffer`]: the temperature grid with its running range
//! - [`colormap`]: level computation and the four-segment gradient
//! - [`viewport`]: recoloring, scaling, overlays and pointer mapping
//! - [`persist`]: `.qtcd` documents
//! - [`export`]: writing the rendered image

pub mod buffer;
pub mod colormap;
pub mod export;
pub mod glyphs;
pub mod persist;
pub mod viewport;

pub use buffer::SampleBuffer;
pub use export::export_image;
pub use persist::{load_scan, save_scan, ScanDocument};
pub use viewport::{Layout, TempView};
