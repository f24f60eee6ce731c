//! PDF access via Google PDFium.
//!
//! Two consumers share the library loader here: the layout-aware text
//! strategy (first in the PDF chain) and the page renderer used by OCR.
//!
//! `Pdfium` is `!Send`, so every call binds a fresh instance inside
//! `with_document`. Repeat `dlopen`s of the same library are cheap.

use std::io::Cursor;
use std::path::PathBuf;

use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use super::table_detect::detect_tables;
use super::types::{ExtractionMethod, PdfPageRenderer, PdfTextStrategy, StrategyOutput};
use super::ExtractionError;

/// Cap on either side of a rendered page, in pixels.
const MAX_DIMENSION_PX: u32 = 4096;

const POINTS_PER_INCH: f32 = 72.0;

/// Explicit library path override.
const PDFIUM_PATH_ENV: &str = "PDFIUM_DYNAMIC_LIB_PATH";

fn library_missing(reason: String) -> ExtractionError {
    ExtractionError::PdfRendering { page: 0, reason }
}

/// Bind PDFium. An explicit `PDFIUM_DYNAMIC_LIB_PATH` must load; otherwise
/// bundled locations are tried before the system library.
fn load_pdfium() -> Result<Pdfium, ExtractionError> {
    if let Ok(path) = std::env::var(PDFIUM_PATH_ENV) {
        let bindings = Pdfium::bind_to_library(&path)
            .map_err(|e| library_missing(format!("Failed to load PDFium from {path}: {e}")))?;
        debug!(path = %path, "PDFium bound from {PDFIUM_PATH_ENV}");
        return Ok(Pdfium::new(bindings));
    }

    // Next to the executable, then `<exe_dir>/pdfium/lib`.
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(PathBuf::from));
    if let Some(exe_dir) = exe_dir {
        for dir in [exe_dir.clone(), exe_dir.join("pdfium").join("lib")] {
            let lib_path =
                Pdfium::pdfium_platform_library_name_at_path(dir.to_string_lossy().as_ref());
            if let Ok(bindings) = Pdfium::bind_to_library(&lib_path) {
                debug!(dir = %dir.display(), "PDFium bound from bundled location");
                return Ok(Pdfium::new(bindings));
            }
        }
    }

    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| {
            library_missing(format!(
                "PDFium library not found (set {PDFIUM_PATH_ENV} or install PDFium): {e}"
            ))
        })
}

/// Open `pdf_bytes` with a freshly bound PDFium and hand the document to `f`.
fn with_document<T>(
    pdf_bytes: &[u8],
    f: impl FnOnce(&PdfDocument<'_>) -> Result<T, ExtractionError>,
) -> Result<T, ExtractionError> {
    let pdfium = load_pdfium()?;
    let document = pdfium
        .load_pdf_from_byte_slice(pdf_bytes, None)
        .map_err(map_load_error)?;
    f(&document)
}

fn map_load_error(e: PdfiumError) -> ExtractionError {
    let msg = e.to_string().to_lowercase();
    if msg.contains("password") || msg.contains("encrypt") {
        ExtractionError::PdfEncrypted
    } else {
        ExtractionError::PdfParsing(format!("Failed to load PDF: {e}"))
    }
}

/// Pixel size of a page rendered at `dpi`. The longer side is capped at
/// `MAX_DIMENSION_PX` with the aspect ratio kept; both sides are at least 1.
fn compute_render_dimensions(width_points: f32, height_points: f32, dpi: u32) -> (u32, u32) {
    let scale = dpi as f32 / POINTS_PER_INCH;
    let w = (width_points * scale).max(1.0);
    let h = (height_points * scale).max(1.0);
    let shrink = (MAX_DIMENSION_PX as f32 / w.max(h)).min(1.0);

    let side = |v: f32| ((v * shrink).round() as u32).clamp(1, MAX_DIMENSION_PX);
    (side(w), side(h))
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ExtractionError> {
    let mut cursor = Cursor::new(Vec::new());
    image
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}

// ═══════════════════════════════════════════════════════════
// Layout strategy
// ═══════════════════════════════════════════════════════════

/// First strategy in the PDF chain: PDFium's positioned text layer, page by
/// page, with table-like blocks collected along the way.
pub struct LayoutTextStrategy;

impl PdfTextStrategy for LayoutTextStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Layout
    }

    fn extract(&self, pdf_bytes: &[u8]) -> Result<StrategyOutput, ExtractionError> {
        with_document(pdf_bytes, |document| {
            let mut output = StrategyOutput::default();
            let mut pages_with_text = Vec::new();

            for (index, page) in document.pages().iter().enumerate() {
                let page_number = index + 1;
                let text = page.text().map(|t| t.all()).map_err(|e| {
                    ExtractionError::PdfParsing(format!("page {page_number}: {e}"))
                })?;

                output.tables.extend(detect_tables(page_number, &text));
                if !text.trim().is_empty() {
                    pages_with_text.push(text);
                }
            }

            output.text = pages_with_text.join("\n");
            debug!(
                pages = pages_with_text.len(),
                tables = output.tables.len(),
                text_length = output.text.len(),
                "Layout text read"
            );
            Ok(output)
        })
    }
}

// ═══════════════════════════════════════════════════════════
// Page renderer
// ═══════════════════════════════════════════════════════════

/// Rasterizes pages to PNG for the OCR strategy.
pub struct PdfiumRenderer;

impl PdfiumRenderer {
    /// Fails when no PDFium library can be bound.
    pub fn new() -> Result<Self, ExtractionError> {
        load_pdfium()?;
        Ok(Self)
    }
}

impl PdfPageRenderer for PdfiumRenderer {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        with_document(pdf_bytes, |document| Ok(document.pages().len() as usize))
    }

    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError> {
        with_document(pdf_bytes, |document| {
            let pages = document.pages();
            let page = u16::try_from(page_number)
                .ok()
                .and_then(|index| pages.get(index).ok())
                .ok_or_else(|| ExtractionError::PdfRendering {
                    page: page_number,
                    reason: format!("no such page (document has {})", pages.len()),
                })?;
            render_to_png(&page, page_number, dpi)
        })
    }

    /// Loads the document once for all pages.
    fn render_pages(&self, pdf_bytes: &[u8], dpi: u32) -> Result<Vec<Vec<u8>>, ExtractionError> {
        with_document(pdf_bytes, |document| {
            document
                .pages()
                .iter()
                .enumerate()
                .map(|(page_number, page)| render_to_png(&page, page_number, dpi))
                .collect()
        })
    }
}

fn render_to_png(page: &PdfPage<'_>, page_number: usize, dpi: u32) -> Result<Vec<u8>, ExtractionError> {
    let (width, height) = compute_render_dimensions(page.width().value, page.height().value, dpi);
    if width.max(height) == MAX_DIMENSION_PX {
        warn!(page = page_number, dpi, "Rendered page capped at {MAX_DIMENSION_PX}px");
    }

    let config = PdfRenderConfig::new()
        .set_target_width(width as i32)
        .set_maximum_height(height as i32);
    let bitmap = page
        .render_with_config(&config)
        .map_err(|e| ExtractionError::PdfRendering {
            page: page_number,
            reason: e.to_string(),
        })?;

    let png = encode_png(&bitmap.as_image())?;
    debug!(page = page_number, width, height, bytes = png.len(), "Page rendered");
    Ok(png)
}

// ── Mock for testing ──────────────────────────────────────

/// Renders a blank 1x1 PNG for each page below `page_count`.
pub struct MockPdfPageRenderer {
    page_count: usize,
}

impl MockPdfPageRenderer {
    pub fn new(page_count: usize) -> Self {
        Self { page_count }
    }
}

impl PdfPageRenderer for MockPdfPageRenderer {
    fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
        Ok(self.page_count)
    }

    fn render_page(
        &self,
        _pdf_bytes: &[u8],
        page_number: usize,
        _dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError> {
        if page_number >= self.page_count {
            return Err(ExtractionError::PdfRendering {
                page: page_number,
                reason: format!("mock has {} pages", self.page_count),
            });
        }
        let blank = RgbImage::from_pixel(1, 1, Rgb([255, 255, 255]));
        encode_png(&DynamicImage::ImageRgb8(blank))
    }
}
