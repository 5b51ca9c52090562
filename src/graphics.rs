//! Inline images through the kitty graphics protocol.
//!
//! Decoding, resizing and encoding happen on worker threads via
//! [`prepare`]. The resulting [`KittyImage`] only holds escape sequences;
//! writing them is left to the control loop so two images never interleave.

use std::env;
use std::io::{self, Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use base64::{engine::general_purpose, Engine as _};
use crossterm::cursor::MoveTo;
use crossterm::style::Print;
use crossterm::terminal::window_size;
use image::imageops::FilterType;
use image::ImageFormat;
use tracing::debug;

use crate::error::RenderError;

const KITTY_CHUNK_SIZE: usize = 4096;
const MAX_SOURCE_PX: u32 = 8192;
const SUPPORTED_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellMetrics {
    pub width: f64,
    pub height: f64,
}

/// Pixel size of one terminal cell, falling back to a common 8x16 when the
/// terminal does not report pixel dimensions.
pub fn cell_metrics() -> CellMetrics {
    static METRICS: OnceLock<CellMetrics> = OnceLock::new();
    *METRICS.get_or_init(|| {
        window_size().ok().map_or(
            CellMetrics {
                width: 8.0,
                height: 16.0,
            },
            |size| {
                let columns = size.columns.max(1) as f64;
                let rows = size.rows.max(1) as f64;
                let width = if size.width > 0 {
                    f64::from(size.width) / columns
                } else {
                    8.0
                };
                let height = if size.height > 0 {
                    f64::from(size.height) / rows
                } else {
                    16.0
                };
                CellMetrics { width, height }
            },
        )
    })
}

/// Cells reserved for an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub cols: u16,
    pub rows: u16,
}

#[derive(Clone, Debug)]
pub struct KittyImage {
    id: u32,
    cols: u16,
    rows: u16,
    transmit_chunks: Vec<String>,
    wrap_tmux: bool,
}

impl KittyImage {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    /// Transmit the image data and place it with its top-left cell at
    /// (`col`, `row`).
    pub fn draw<W: Write>(&self, writer: &mut W, col: u16, row: u16) -> io::Result<()> {
        for chunk in &self.transmit_chunks {
            writer.write_all(chunk.as_bytes())?;
        }
        let placement = wrap(
            &format!(
                "\x1b_Ga=p,q=2,C=1,i={},c={},r={};\x1b\\",
                self.id, self.cols, self.rows
            ),
            self.wrap_tmux,
        );
        crossterm::queue!(writer, MoveTo(col, row), Print(placement))?;
        writer.flush()
    }

    pub fn delete_sequence(&self) -> String {
        delete_sequence_for(self.id, self.wrap_tmux)
    }
}

pub fn delete_sequence_for(id: u32, wrap_tmux: bool) -> String {
    wrap(&format!("\x1b_Ga=d,d=I,q=2,i={id};\x1b\\"), wrap_tmux)
}

fn wrap(sequence: &str, wrap_tmux: bool) -> String {
    if wrap_tmux {
        format!("\x1bPtmux;\x1b{sequence}\x1b\\")
    } else {
        sequence.to_string()
    }
}

/// Decode, shrink into `region` and encode the file at `path`.
///
/// Returns `Ok(None)` when `cancel` was raised part way through.
pub fn prepare(
    path: &Path,
    region: Region,
    max_px: u32,
    id: u32,
    cancel: &AtomicBool,
) -> Result<Option<KittyImage>, RenderError> {
    if region.cols == 0 || region.rows == 0 {
        return Err(RenderError::NoRoom);
    }
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
        return Err(RenderError::Unsupported(ext));
    }

    let decode_err = |source| RenderError::Decode {
        path: path.display().to_string(),
        source,
    };
    let (src_w, src_h) = image::image_dimensions(path).map_err(decode_err)?;
    if src_w > MAX_SOURCE_PX || src_h > MAX_SOURCE_PX {
        return Err(RenderError::Oversized {
            width: src_w,
            height: src_h,
        });
    }
    if cancel.load(Ordering::SeqCst) {
        return Ok(None);
    }

    let mut img = image::open(path).map_err(decode_err)?;
    debug!(width = src_w, height = src_h, "graphics: decoded");
    if cancel.load(Ordering::SeqCst) {
        return Ok(None);
    }

    let cell = cell_metrics();
    let (box_w, box_h) = fit_box(region, cell, max_px);
    if img.width() > box_w || img.height() > box_h {
        img = img.resize(box_w, box_h, FilterType::Lanczos3);
    }
    if img.width() > max_px || img.height() > max_px {
        return Err(RenderError::Oversized {
            width: img.width(),
            height: img.height(),
        });
    }
    if cancel.load(Ordering::SeqCst) {
        return Ok(None);
    }

    let mut png = Vec::new();
    img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(decode_err)?;

    let cols = cells_for(img.width(), cell.width, region.cols);
    let rows = cells_for(img.height(), cell.height, region.rows);
    let wrap_tmux = tmux_passthrough_enabled();
    Ok(Some(KittyImage {
        id,
        cols,
        rows,
        transmit_chunks: transmit_chunks(&png, id, wrap_tmux),
        wrap_tmux,
    }))
}

/// Largest pixel box that fits both the region and `max_px`.
fn fit_box(region: Region, cell: CellMetrics, max_px: u32) -> (u32, u32) {
    let width = (f64::from(region.cols) * cell.width).floor().max(1.0) as u32;
    let height = (f64::from(region.rows) * cell.height).floor().max(1.0) as u32;
    (width.min(max_px).max(1), height.min(max_px).max(1))
}

fn cells_for(pixels: u32, cell: f64, limit: u16) -> u16 {
    let cells = (f64::from(pixels) / cell.max(1.0)).ceil() as u32;
    cells.clamp(1, u32::from(limit.max(1))) as u16
}

fn transmit_chunks(png: &[u8], id: u32, wrap_tmux: bool) -> Vec<String> {
    let encoded = general_purpose::STANDARD.encode(png);
    let mut chunks = Vec::new();
    let mut offset = 0;
    while offset < encoded.len() {
        let end = usize::min(offset + KITTY_CHUNK_SIZE, encoded.len());
        let more = if end < encoded.len() { 1 } else { 0 };
        let header = if offset == 0 {
            format!("\x1b_Ga=t,q=2,i={id},f=100,m={more};")
        } else {
            format!("\x1b_Ga=t,q=2,i={id},m={more};")
        };
        chunks.push(wrap(
            &format!("{header}{}\x1b\\", &encoded[offset..end]),
            wrap_tmux,
        ));
        offset = end;
    }
    chunks
}

fn env_truthy(key: &str) -> bool {
    env::var(key)
        .map(|value| matches!(value.trim(), "1" | "true" | "TRUE" | "True" | "yes" | "YES"))
        .unwrap_or(false)
}

fn tmux_passthrough_enabled() -> bool {
    env::var("TMUX").map(|v| !v.is_empty()).unwrap_or(false)
}

/// Whether the terminal is expected to understand kitty graphics.
pub fn graphics_supported() -> bool {
    static SUPPORTED: OnceLock<bool> = OnceLock::new();
    *SUPPORTED.get_or_init(|| {
        if env_truthy("IBB_DISABLE_KITTY") {
            return false;
        }
        if env_truthy("IBB_FORCE_KITTY") {
            return true;
        }
        if env::var("KITTY_WINDOW_ID")
            .map(|v| !v.is_empty())
            .unwrap_or(false)
        {
            return true;
        }
        if env::var("WEZTERM_PANE")
            .map(|v| !v.is_empty())
            .unwrap_or(false)
        {
            return true;
        }
        if env::var("TERM_PROGRAM")
            .map(|term| {
                let lower = term.to_lowercase();
                lower.contains("wezterm") || lower.contains("ghostty")
            })
            .unwrap_or(false)
        {
            return true;
        }
        env::var("TERM")
            .map(|term| {
                let lower = term.to_lowercase();
                lower.contains("kitty") || lower.contains("wezterm") || lower.contains("ghostty")
            })
            .unwrap_or(false)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> std::path::PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(width, height, Rgb([200, 10, 10]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn chunks_split_large_payloads() {
        let data = vec![7u8; KITTY_CHUNK_SIZE * 2];
        let chunks = transmit_chunks(&data, 9, false);
        assert!(chunks.len() > 1);
        assert!(chunks[0].starts_with("\x1b_Ga=t,q=2,i=9,f=100,m=1;"));
        assert!(chunks.last().unwrap().starts_with("\x1b_Ga=t,q=2,i=9,m=0;"));
    }

    #[test]
    fn tmux_wrapping_surrounds_sequence() {
        assert_eq!(
            delete_sequence_for(3, true),
            "\x1bPtmux;\x1b\x1b_Ga=d,d=I,q=2,i=3;\x1b\\\x1b\\"
        );
        assert_eq!(delete_sequence_for(3, false), "\x1b_Ga=d,d=I,q=2,i=3;\x1b\\");
    }

    #[test]
    fn prepare_fits_image_inside_region() {
        let dir = tempdir().unwrap();
        let path = write_png(dir.path(), "wide.png", 2000, 500);
        let cancel = AtomicBool::new(false);
        let region = Region { cols: 40, rows: 10 };
        let image = prepare(&path, region, 1200, 1, &cancel).unwrap().unwrap();
        assert!(image.cols() <= region.cols);
        assert!(image.rows() <= region.rows);
        assert_eq!(image.id(), 1);
    }

    #[test]
    fn unsupported_extension_is_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.webm");
        std::fs::write(&path, b"not an image").unwrap();
        let cancel = AtomicBool::new(false);
        let err = prepare(&path, Region { cols: 10, rows: 10 }, 1200, 1, &cancel).unwrap_err();
        assert!(matches!(err, RenderError::Unsupported(ext) if ext == "webm"));
    }

    #[test]
    fn corrupt_file_is_decode_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"garbage").unwrap();
        let cancel = AtomicBool::new(false);
        let err = prepare(&path, Region { cols: 10, rows: 10 }, 1200, 1, &cancel).unwrap_err();
        assert!(matches!(err, RenderError::Decode { .. }));
    }

    #[test]
    fn cancelled_work_yields_nothing() {
        let dir = tempdir().unwrap();
        let path = write_png(dir.path(), "small.png", 8, 8);
        let cancel = AtomicBool::new(true);
        let result = prepare(&path, Region { cols: 10, rows: 10 }, 1200, 1, &cancel).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn fit_box_respects_pixel_cap() {
        let cell = CellMetrics {
            width: 10.0,
            height: 20.0,
        };
        assert_eq!(fit_box(Region { cols: 200, rows: 100 }, cell, 1200), (1200, 1200));
        assert_eq!(fit_box(Region { cols: 20, rows: 10 }, cell, 1200), (200, 200));
    }
}
