use std::sync::Arc;

use tracing::debug;

use super::types::{
    ExtractionMethod, OcrEngine, OcrPageResult, PdfPageRenderer, PdfTextStrategy, StrategyOutput,
};
use super::ExtractionError;

/// Last-resort strategy: rasterize every page and recognise it visually.
pub struct OcrStrategy {
    renderer: Arc<dyn PdfPageRenderer>,
    engine: Arc<dyn OcrEngine>,
    dpi: u32,
}

impl OcrStrategy {
    pub fn new(renderer: Arc<dyn PdfPageRenderer>, engine: Arc<dyn OcrEngine>, dpi: u32) -> Self {
        Self {
            renderer,
            engine,
            dpi,
        }
    }
}

impl PdfTextStrategy for OcrStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Ocr
    }

    fn extract(&self, pdf_bytes: &[u8]) -> Result<StrategyOutput, ExtractionError> {
        let pages = self.renderer.render_pages(pdf_bytes, self.dpi)?;
        let mut text = String::new();

        for (index, png) in pages.iter().enumerate() {
            let page = index + 1;
            let result = self.engine.ocr_image(png)?;
            debug!(
                page,
                confidence = result.confidence,
                chars = result.text.len(),
                "OCR page recognised"
            );
            text.push_str(&format!("--- Page {page} ---\n{}\n", result.text));
        }

        Ok(StrategyOutput {
            text,
            tables: vec![],
        })
    }
}

/// Bundled Tesseract OCR engine.
/// Only available when compiled with the `ocr` feature flag.
#[cfg(feature = "ocr")]
pub struct BundledTesseract {
    tessdata_dir: std::path::PathBuf,
    lang: String,
}

#[cfg(feature = "ocr")]
impl BundledTesseract {
    /// Initialize with a tessdata directory containing at least `eng.traineddata`.
    pub fn new(tessdata_dir: &std::path::Path) -> Result<Self, ExtractionError> {
        if !tessdata_dir.join("eng.traineddata").exists() {
            return Err(ExtractionError::TessdataNotFound(tessdata_dir.to_path_buf()));
        }
        Ok(Self {
            tessdata_dir: tessdata_dir.to_path_buf(),
            lang: "eng".to_string(),
        })
    }

    /// Probe the usual system locations, honouring `TESSDATA_PREFIX` first.
    pub fn from_system() -> Result<Self, ExtractionError> {
        let mut candidates: Vec<std::path::PathBuf> = Vec::new();
        if let Ok(prefix) = std::env::var("TESSDATA_PREFIX") {
            candidates.push(prefix.into());
        }
        candidates.extend(
            [
                "/usr/share/tesseract-ocr/5/tessdata",
                "/usr/share/tesseract-ocr/4.00/tessdata",
                "/usr/share/tessdata",
                "/usr/local/share/tessdata",
                "/opt/homebrew/share/tessdata",
            ]
            .iter()
            .map(std::path::PathBuf::from),
        );

        candidates
            .iter()
            .find_map(|dir| Self::new(dir).ok())
            .ok_or_else(|| {
                ExtractionError::TessdataNotFound(
                    candidates.first().cloned().unwrap_or_default(),
                )
            })
    }
}

#[cfg(feature = "ocr")]
impl OcrEngine for BundledTesseract {
    fn ocr_image(&self, image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        let tessdata_str = self
            .tessdata_dir
            .to_str()
            .ok_or_else(|| ExtractionError::OcrInit("Invalid tessdata path".into()))?;

        let tess = tesseract::Tesseract::new(Some(tessdata_str), Some(&self.lang))
            .map_err(|e| ExtractionError::OcrInit(format!("{e:?}")))?;

        let mut tess = tess
            .set_image_from_mem(image_bytes)
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;

        let text = tess
            .get_text()
            .map_err(|e| ExtractionError::OcrProcessing(format!("{e:?}")))?;
        let confidence = tess.mean_text_conf().max(0) as f32 / 100.0;

        Ok(OcrPageResult { text, confidence })
    }
}

/// Mock OCR engine for unit testing without Tesseract.
pub struct MockOcrEngine {
    pub text: String,
    pub confidence: f32,
}

impl MockOcrEngine {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            text: text.to_string(),
            confidence,
        }
    }
}

impl OcrEngine for MockOcrEngine {
    fn ocr_image(&self, _image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
        Ok(OcrPageResult {
            text: self.text.clone(),
            confidence: self.confidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::pdfium::MockPdfPageRenderer;

    struct FailingOcr;

    impl OcrEngine for FailingOcr {
        fn ocr_image(&self, _image_bytes: &[u8]) -> Result<OcrPageResult, ExtractionError> {
            Err(ExtractionError::OcrProcessing("engine crashed".into()))
        }
    }

    #[test]
    fn formats_each_page_with_header() {
        let strategy = OcrStrategy::new(
            Arc::new(MockPdfPageRenderer::new(2)),
            Arc::new(MockOcrEngine::new("Incident report", 0.9)),
            300,
        );
        let output = strategy.extract(b"%PDF").unwrap();
        assert_eq!(
            output.text,
            "--- Page 1 ---\nIncident report\n--- Page 2 ---\nIncident report\n"
        );
        assert!(output.tables.is_empty());
    }

    /// Serves only whole-document renders; per-page calls fail.
    struct WholeDocumentRenderer {
        pages: usize,
        calls: std::sync::atomic::AtomicUsize,
    }

    impl PdfPageRenderer for WholeDocumentRenderer {
        fn page_count(&self, _pdf_bytes: &[u8]) -> Result<usize, ExtractionError> {
            Err(ExtractionError::PdfParsing("document reopened".into()))
        }

        fn render_page(&self, _: &[u8], page: usize, _: u32) -> Result<Vec<u8>, ExtractionError> {
            Err(ExtractionError::PdfRendering {
                page,
                reason: "document reopened".into(),
            })
        }

        fn render_pages(&self, _: &[u8], _: u32) -> Result<Vec<Vec<u8>>, ExtractionError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(vec![vec![0u8]; self.pages])
        }
    }

    #[test]
    fn renders_document_in_one_pass() {
        let renderer = Arc::new(WholeDocumentRenderer {
            pages: 3,
            calls: Default::default(),
        });
        let strategy = OcrStrategy::new(
            renderer.clone(),
            Arc::new(MockOcrEngine::new("Lab values", 0.8)),
            300,
        );

        let output = strategy.extract(b"%PDF").unwrap();
        assert!(output.text.contains("--- Page 3 ---\nLab values\n"));
        assert_eq!(renderer.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_pages_yields_empty_text() {
        let strategy = OcrStrategy::new(
            Arc::new(MockPdfPageRenderer::new(0)),
            Arc::new(MockOcrEngine::new("unused", 0.9)),
            300,
        );
        assert!(strategy.extract(b"%PDF").unwrap().text.is_empty());
    }

    #[test]
    fn engine_failure_propagates() {
        let strategy = OcrStrategy::new(
            Arc::new(MockPdfPageRenderer::new(1)),
            Arc::new(FailingOcr),
            300,
        );
        let err = strategy.extract(b"%PDF").unwrap_err();
        assert!(matches!(err, ExtractionError::OcrProcessing(_)));
    }

    #[test]
    fn mock_engine_returns_configured_text() {
        let engine = MockOcrEngine::new("Blood pressure 140/90", 0.85);
        let result = engine.ocr_image(&[]).unwrap();
        assert_eq!(result.text, "Blood pressure 140/90");
        assert!((result.confidence - 0.85).abs() < f32::EPSILON);
    }

    #[cfg(feature = "ocr")]
    #[test]
    fn bundled_tesseract_rejects_missing_tessdata() {
        let dir = tempfile::tempdir().unwrap();
        let err = BundledTesseract::new(dir.path()).err().unwrap();
        assert!(matches!(err, ExtractionError::TessdataNotFound(_)));
    }
}
