pub mod types;
pub mod fields;
pub mod format;
pub mod table_detect;
pub mod pdf;
pub mod pdfium;
pub mod ocr;
pub mod orchestrator;

pub use types::*;
pub use fields::parse_fields;
pub use format::format_for_agents;
pub use pdf::*;
pub use pdfium::*;
pub use ocr::*;
pub use orchestrator::*;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported document kind: {0}")]
    UnsupportedKind(String),

    #[error("Tesseract OCR initialization failed: {0}")]
    OcrInit(String),

    #[error("OCR processing failed: {0}")]
    OcrProcessing(String),

    #[error("PDF parsing failed: {0}")]
    PdfParsing(String),

    #[error("PDF rendering failed on page {page}: {reason}")]
    PdfRendering { page: usize, reason: String },

    #[error("PDF is password-protected")]
    PdfEncrypted,

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Extraction strategy panicked: {0}")]
    StrategyPanicked(String),

    #[error("Tessdata not found at: {0}")]
    TessdataNotFound(PathBuf),
}
