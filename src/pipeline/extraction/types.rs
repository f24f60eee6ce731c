use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::ExtractionError;

/// Declared kind of an input document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocumentKind {
    PlainText,
    Pdf,
    Unsupported,
}

impl DocumentKind {
    /// Map a file extension (without the dot), case-insensitive.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "txt" => Self::PlainText,
            "pdf" => Self::Pdf,
            _ => Self::Unsupported,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "plain-text",
            Self::Pdf => "pdf",
            Self::Unsupported => "unsupported",
        }
    }
}

/// Raw document bytes plus their declared kind. Immutable once built.
#[derive(Debug, Clone)]
pub struct Document {
    name: String,
    bytes: Vec<u8>,
    kind: DocumentKind,
}

impl Document {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>, kind: DocumentKind) -> Self {
        Self {
            name: name.into(),
            bytes,
            kind,
        }
    }

    /// Convenience for callers that start from a file on disk.
    /// The kind is inferred from the extension.
    pub fn from_path(path: &Path) -> Result<Self, ExtractionError> {
        let bytes = std::fs::read(path)?;
        let kind = path
            .extension()
            .and_then(|e| e.to_str())
            .map(DocumentKind::from_extension)
            .unwrap_or(DocumentKind::Unsupported);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, bytes, kind))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> DocumentKind {
        self.kind
    }
}

/// Which step produced the accepted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// No strategy produced acceptable text.
    None,
    /// Whole-file read of a plain-text document.
    PlainTextRead,
    /// Positioned text layer with table awareness.
    Layout,
    /// Sequential page-by-page text pull.
    Raw,
    /// Page rasterization plus optical character recognition.
    Ocr,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::PlainTextRead => "plain_text_read",
            Self::Layout => "layout",
            Self::Raw => "raw",
            Self::Ocr => "ocr",
        }
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Table-like block found in a page: rows of cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub page_number: usize,
    pub rows: Vec<Vec<String>>,
}

/// What one strategy produced before the acceptance check.
#[derive(Debug, Clone, Default)]
pub struct StrategyOutput {
    pub text: String,
    pub tables: Vec<Table>,
}

/// Record of a single strategy attempt, kept for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyAttempt {
    pub method: ExtractionMethod,
    /// Trimmed length in characters of the produced text (0 on error).
    pub text_length: usize,
    pub accepted: bool,
    pub error: Option<String>,
}

/// Result of running the extraction chain over one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub succeeded: bool,
    pub text: String,
    pub method: ExtractionMethod,
    pub fields: BTreeMap<String, String>,
    pub tables: Vec<Table>,
    pub attempts: Vec<StrategyAttempt>,
}

impl ExtractionResult {
    /// Degraded result: nothing cleared the threshold.
    pub fn failed(attempts: Vec<StrategyAttempt>) -> Self {
        Self {
            succeeded: false,
            text: String::new(),
            method: ExtractionMethod::None,
            fields: BTreeMap::new(),
            tables: vec![],
            attempts,
        }
    }
}

/// One interchangeable algorithm that pulls text out of PDF bytes.
pub trait PdfTextStrategy: Send + Sync {
    fn method(&self) -> ExtractionMethod;

    fn extract(&self, pdf_bytes: &[u8]) -> Result<StrategyOutput, ExtractionError>;
}

/// Raw OCR result from the engine
#[derive(Debug)]
pub struct OcrPageResult {
    pub text: String,
    pub confidence: f32,
}

/// OCR engine abstraction (allows mocking for tests)
pub trait OcrEngine: Send + Sync {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError>;
}

/// Renders individual PDF pages to PNG bytes.
pub trait PdfPageRenderer: Send + Sync {
    fn page_count(&self, pdf_bytes: &[u8]) -> Result<usize, ExtractionError>;

    /// `page_number` is zero-based.
    fn render_page(
        &self,
        pdf_bytes: &[u8],
        page_number: usize,
        dpi: u32,
    ) -> Result<Vec<u8>, ExtractionError>;

    /// Every page in order. Backends that can keep the document open across
    /// pages should override this.
    fn render_pages(&self, pdf_bytes: &[u8], dpi: u32) -> Result<Vec<Vec<u8>>, ExtractionError> {
        (0..self.page_count(pdf_bytes)?)
            .map(|page| self.render_page(pdf_bytes, page, dpi))
            .collect()
    }
}
