use std::panic::{self, AssertUnwindSafe};

use super::fields::parse_fields;
use super::pdf::RawTextStrategy;
use super::pdfium::LayoutTextStrategy;
use super::types::{
    Document, DocumentKind, ExtractionMethod, ExtractionResult, PdfTextStrategy, StrategyAttempt,
};
use super::ExtractionError;
use crate::config::{AppConfig, DEFAULT_MIN_TEXT_LEN, DEFAULT_OCR_DPI};
use crate::pipeline::panic_message;

/// Tunables for the extraction chain.
#[derive(Debug, Clone, Copy)]
pub struct ExtractorConfig {
    /// Output is accepted once its trimmed length exceeds this.
    pub min_text_len: usize,
    pub ocr_dpi: u32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            min_text_len: DEFAULT_MIN_TEXT_LEN,
            ocr_dpi: DEFAULT_OCR_DPI,
        }
    }
}

impl From<&AppConfig> for ExtractorConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            min_text_len: config.min_text_len,
            ocr_dpi: config.ocr_dpi,
        }
    }
}

/// Runs the PDF strategy chain and the field parser over one document.
/// Strategies are tried in order; the first whose output clears the
/// threshold wins and the rest are never invoked.
pub struct DocumentExtractor {
    strategies: Vec<Box<dyn PdfTextStrategy>>,
    config: ExtractorConfig,
}

impl DocumentExtractor {
    pub fn new(strategies: Vec<Box<dyn PdfTextStrategy>>, config: ExtractorConfig) -> Self {
        Self { strategies, config }
    }

    /// Layout, then raw, then OCR when an OCR backend is available.
    pub fn with_default_chain(config: ExtractorConfig) -> Self {
        Self::new(default_strategies(&config), config)
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract text and fields. Fails only for unsupported document kinds;
    /// poor extraction is reported through `succeeded == false`.
    pub fn extract(&self, doc: &Document) -> Result<ExtractionResult, ExtractionError> {
        tracing::info!(
            document = doc.name(),
            kind = doc.kind().as_str(),
            size = doc.bytes().len(),
            "Starting text extraction"
        );

        match doc.kind() {
            DocumentKind::PlainText => Ok(self.extract_plain_text(doc)),
            DocumentKind::Pdf => Ok(self.extract_pdf(doc.bytes())),
            DocumentKind::Unsupported => Err(ExtractionError::UnsupportedKind(
                doc.name().to_string(),
            )),
        }
    }

    fn extract_plain_text(&self, doc: &Document) -> ExtractionResult {
        let text = match std::str::from_utf8(doc.bytes()) {
            Ok(text) => text.to_string(),
            Err(e) => {
                tracing::warn!(
                    document = doc.name(),
                    error = %e,
                    "Plain text is not valid UTF-8, decoding lossily"
                );
                String::from_utf8_lossy(doc.bytes()).into_owned()
            }
        };

        let succeeded = !text.is_empty();
        let fields = parse_fields(&text);
        let attempt = StrategyAttempt {
            method: ExtractionMethod::PlainTextRead,
            text_length: text.trim().chars().count(),
            accepted: succeeded,
            error: None,
        };

        ExtractionResult {
            succeeded,
            method: if succeeded {
                ExtractionMethod::PlainTextRead
            } else {
                ExtractionMethod::None
            },
            text,
            fields,
            tables: vec![],
            attempts: vec![attempt],
        }
    }

    fn extract_pdf(&self, bytes: &[u8]) -> ExtractionResult {
        let mut attempts = Vec::with_capacity(self.strategies.len());

        for strategy in &self.strategies {
            let method = strategy.method();
            // pdf-extract panics on some malformed documents.
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| strategy.extract(bytes)))
                .unwrap_or_else(|payload| {
                    Err(ExtractionError::StrategyPanicked(panic_message(payload.as_ref())))
                });
            match outcome {
                Ok(output) => {
                    let text_length = output.text.trim().chars().count();
                    let accepted = text_length > self.config.min_text_len;
                    attempts.push(StrategyAttempt {
                        method,
                        text_length,
                        accepted,
                        error: None,
                    });

                    if accepted {
                        tracing::info!(%method, text_length, "Extraction strategy accepted");
                        let fields = parse_fields(&output.text);
                        return ExtractionResult {
                            succeeded: true,
                            text: output.text,
                            method,
                            fields,
                            tables: output.tables,
                            attempts,
                        };
                    }
                    tracing::debug!(
                        %method,
                        text_length,
                        threshold = self.config.min_text_len,
                        "Strategy output below threshold, falling back"
                    );
                }
                Err(e) => {
                    tracing::warn!(%method, error = %e, "Extraction strategy failed, falling back");
                    attempts.push(StrategyAttempt {
                        method,
                        text_length: 0,
                        accepted: false,
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        tracing::warn!(
            strategies = attempts.len(),
            "No extraction strategy produced usable text"
        );
        ExtractionResult::failed(attempts)
    }
}

/// Build the standard PDF chain. OCR joins only when both PDFium and an
/// OCR engine can be loaded.
pub fn default_strategies(config: &ExtractorConfig) -> Vec<Box<dyn PdfTextStrategy>> {
    let mut strategies: Vec<Box<dyn PdfTextStrategy>> =
        vec![Box::new(LayoutTextStrategy), Box::new(RawTextStrategy)];

    if let Some(ocr) = ocr_strategy(config) {
        strategies.push(ocr);
    }

    strategies
}

#[cfg(feature = "ocr")]
fn ocr_strategy(config: &ExtractorConfig) -> Option<Box<dyn PdfTextStrategy>> {
    use std::sync::Arc;

    use super::ocr::{BundledTesseract, OcrStrategy};
    use super::pdfium::PdfiumRenderer;

    let renderer = match PdfiumRenderer::new() {
        Ok(renderer) => renderer,
        Err(e) => {
            tracing::warn!(error = %e, "PDFium unavailable, OCR strategy disabled");
            return None;
        }
    };
    let engine = match BundledTesseract::from_system() {
        Ok(engine) => engine,
        Err(e) => {
            tracing::warn!(error = %e, "Tesseract unavailable, OCR strategy disabled");
            return None;
        }
    };

    Some(Box::new(OcrStrategy::new(
        Arc::new(renderer),
        Arc::new(engine),
        config.ocr_dpi,
    )))
}

#[cfg(not(feature = "ocr"))]
fn ocr_strategy(_config: &ExtractorConfig) -> Option<Box<dyn PdfTextStrategy>> {
    tracing::debug!("Built without the `ocr` feature, OCR strategy disabled");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::ocr::{MockOcrEngine, OcrStrategy};
    use crate::pipeline::extraction::pdfium::MockPdfPageRenderer;
    use crate::pipeline::extraction::types::{StrategyOutput, Table};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const LONG_TEXT: &str =
        "Patient Name: John Smith\nAge: 54\nSymptoms: chest pain, shortness of breath on exertion";

    /// Strategy returning canned output and counting invocations.
    struct CountingStrategy {
        method: ExtractionMethod,
        output: Result<String, ()>,
        tables: Vec<Table>,
        calls: Arc<AtomicUsize>,
    }

    impl CountingStrategy {
        fn ok(method: ExtractionMethod, text: &str) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let strategy = Self {
                method,
                output: Ok(text.to_string()),
                tables: vec![],
                calls: calls.clone(),
            };
            (strategy, calls)
        }

        fn failing(method: ExtractionMethod) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let strategy = Self {
                method,
                output: Err(()),
                tables: vec![],
                calls: calls.clone(),
            };
            (strategy, calls)
        }
    }

    impl PdfTextStrategy for CountingStrategy {
        fn method(&self) -> ExtractionMethod {
            self.method
        }

        fn extract(&self, _pdf_bytes: &[u8]) -> Result<StrategyOutput, ExtractionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.output {
                Ok(text) => Ok(StrategyOutput {
                    text: text.clone(),
                    tables: self.tables.clone(),
                }),
                Err(()) => Err(ExtractionError::PdfParsing("malformed xref".into())),
            }
        }
    }

    fn pdf_doc() -> Document {
        Document::new("report.pdf", b"%PDF-1.4".to_vec(), DocumentKind::Pdf)
    }

    #[test]
    fn plain_text_round_trips_exactly() {
        let content = "Patient reports chest pain and dizziness.\n  trailing  ";
        let extractor = DocumentExtractor::new(vec![], ExtractorConfig::default());
        let doc = Document::new("note.txt", content.as_bytes().to_vec(), DocumentKind::PlainText);

        let result = extractor.extract(&doc).unwrap();
        assert!(result.succeeded);
        assert_eq!(result.text, content);
        assert_eq!(result.method, ExtractionMethod::PlainTextRead);
    }

    #[test]
    fn short_plain_text_still_succeeds() {
        let extractor = DocumentExtractor::new(vec![], ExtractorConfig::default());
        let doc = Document::new("n.txt", b"Age: 7".to_vec(), DocumentKind::PlainText);
        let result = extractor.extract(&doc).unwrap();
        assert!(result.succeeded);
        assert_eq!(result.fields["age"], "7");
    }

    #[test]
    fn empty_plain_text_fails_softly() {
        let extractor = DocumentExtractor::new(vec![], ExtractorConfig::default());
        let doc = Document::new("empty.txt", vec![], DocumentKind::PlainText);
        let result = extractor.extract(&doc).unwrap();
        assert!(!result.succeeded);
        assert_eq!(result.method, ExtractionMethod::None);
    }

    #[test]
    fn invalid_utf8_plain_text_is_decoded_lossily() {
        let extractor = DocumentExtractor::new(vec![], ExtractorConfig::default());
        let doc = Document::new("bad.txt", vec![b'o', b'k', 0xFF], DocumentKind::PlainText);
        let result = extractor.extract(&doc).unwrap();
        assert!(result.succeeded);
        assert!(result.text.starts_with("ok"));
    }

    #[test]
    fn unsupported_kind_is_the_only_error() {
        let extractor = DocumentExtractor::new(vec![], ExtractorConfig::default());
        let doc = Document::new("scan.docx", vec![1, 2, 3], DocumentKind::Unsupported);
        let err = extractor.extract(&doc).unwrap_err();
        assert!(matches!(err, ExtractionError::UnsupportedKind(name) if name == "scan.docx"));
    }

    #[test]
    fn first_acceptable_strategy_short_circuits() {
        let (layout, layout_calls) = CountingStrategy::ok(ExtractionMethod::Layout, LONG_TEXT);
        let (raw, raw_calls) = CountingStrategy::ok(ExtractionMethod::Raw, LONG_TEXT);
        let (ocr, ocr_calls) = CountingStrategy::ok(ExtractionMethod::Ocr, LONG_TEXT);
        let extractor = DocumentExtractor::new(
            vec![Box::new(layout), Box::new(raw), Box::new(ocr)],
            ExtractorConfig::default(),
        );

        let result = extractor.extract(&pdf_doc()).unwrap();
        assert!(result.succeeded);
        assert_eq!(result.method, ExtractionMethod::Layout);
        assert_eq!(layout_calls.load(Ordering::SeqCst), 1);
        assert_eq!(raw_calls.load(Ordering::SeqCst), 0);
        assert_eq!(ocr_calls.load(Ordering::SeqCst), 0);
        assert_eq!(result.fields["patient_name"], "John Smith");
        assert_eq!(result.attempts.len(), 1);
    }

    #[test]
    fn errors_and_short_output_fall_through_to_ocr() {
        let (layout, _) = CountingStrategy::failing(ExtractionMethod::Layout);
        let (raw, raw_calls) = CountingStrategy::ok(ExtractionMethod::Raw, "   tiny   ");
        let (ocr, ocr_calls) = CountingStrategy::ok(ExtractionMethod::Ocr, LONG_TEXT);
        let extractor = DocumentExtractor::new(
            vec![Box::new(layout), Box::new(raw), Box::new(ocr)],
            ExtractorConfig::default(),
        );

        let result = extractor.extract(&pdf_doc()).unwrap();
        assert!(result.succeeded);
        assert_eq!(result.method, ExtractionMethod::Ocr);
        assert_eq!(raw_calls.load(Ordering::SeqCst), 1);
        assert_eq!(ocr_calls.load(Ordering::SeqCst), 1);

        assert!(result.attempts[0].error.is_some());
        assert_eq!(result.attempts[1].text_length, 4);
        assert!(!result.attempts[1].accepted);
        assert!(result.attempts[2].accepted);
    }

    #[test]
    fn threshold_is_strictly_greater_than() {
        let exactly_fifty = "x".repeat(50);
        let (layout, _) = CountingStrategy::ok(ExtractionMethod::Layout, &exactly_fifty);
        let extractor =
            DocumentExtractor::new(vec![Box::new(layout)], ExtractorConfig::default());
        assert!(!extractor.extract(&pdf_doc()).unwrap().succeeded);

        let fifty_one = format!("  {}  ", "x".repeat(51));
        let (layout, _) = CountingStrategy::ok(ExtractionMethod::Layout, &fifty_one);
        let extractor =
            DocumentExtractor::new(vec![Box::new(layout)], ExtractorConfig::default());
        assert!(extractor.extract(&pdf_doc()).unwrap().succeeded);
    }

    #[test]
    fn all_strategies_failing_degrades_without_error() {
        let (layout, _) = CountingStrategy::failing(ExtractionMethod::Layout);
        let (raw, _) = CountingStrategy::failing(ExtractionMethod::Raw);
        let extractor = DocumentExtractor::new(
            vec![Box::new(layout), Box::new(raw)],
            ExtractorConfig::default(),
        );

        let result = extractor.extract(&pdf_doc()).unwrap();
        assert!(!result.succeeded);
        assert!(result.text.is_empty());
        assert_eq!(result.method, ExtractionMethod::None);
        assert!(result.fields.is_empty());
        assert_eq!(result.attempts.len(), 2);
    }

    struct PanickingStrategy;

    impl PdfTextStrategy for PanickingStrategy {
        fn method(&self) -> ExtractionMethod {
            ExtractionMethod::Raw
        }

        fn extract(&self, _pdf_bytes: &[u8]) -> Result<StrategyOutput, ExtractionError> {
            panic!("missing font")
        }
    }

    #[test]
    fn panicking_strategy_falls_through_to_next() {
        let (ocr, ocr_calls) = CountingStrategy::ok(ExtractionMethod::Ocr, LONG_TEXT);
        let extractor = DocumentExtractor::new(
            vec![Box::new(PanickingStrategy), Box::new(ocr)],
            ExtractorConfig::default(),
        );

        let result = extractor.extract(&pdf_doc()).unwrap();
        assert!(result.succeeded);
        assert_eq!(result.method, ExtractionMethod::Ocr);
        assert_eq!(ocr_calls.load(Ordering::SeqCst), 1);

        let first = &result.attempts[0];
        assert!(!first.accepted);
        assert_eq!(first.text_length, 0);
        assert!(first.error.as_deref().unwrap().contains("missing font"));
    }

    #[test]
    fn undefined_font_pdf_degrades_without_panic() {
        let pdf = crate::pipeline::extraction::pdf::make_pdf_with_undefined_font(
            "Patient reports chest pain radiating to the left arm and jaw",
        );
        let doc = Document::new("broken.pdf", pdf, DocumentKind::Pdf);
        let extractor =
            DocumentExtractor::new(vec![Box::new(RawTextStrategy)], ExtractorConfig::default());

        let result = extractor.extract(&doc).unwrap();
        assert_eq!(result.attempts.len(), 1);
        assert_eq!(result.attempts[0].method, ExtractionMethod::Raw);
        if !result.succeeded {
            assert!(result.text.is_empty());
            assert_eq!(result.method, ExtractionMethod::None);
        }
    }

    #[test]
    fn accepted_tables_are_kept() {
        let (mut layout, _) = CountingStrategy::ok(ExtractionMethod::Layout, LONG_TEXT);
        layout.tables = vec![Table {
            page_number: 1,
            rows: vec![vec!["BNP".into(), "410".into()], vec!["K".into(), "4.2".into()]],
        }];
        let extractor =
            DocumentExtractor::new(vec![Box::new(layout)], ExtractorConfig::default());
        let result = extractor.extract(&pdf_doc()).unwrap();
        assert_eq!(result.tables.len(), 1);
    }

    #[test]
    fn mock_ocr_chain_produces_page_blocks() {
        let (layout, _) = CountingStrategy::failing(ExtractionMethod::Layout);
        let ocr = OcrStrategy::new(
            Arc::new(MockPdfPageRenderer::new(1)),
            Arc::new(MockOcrEngine::new(LONG_TEXT, 0.9)),
            300,
        );
        let extractor = DocumentExtractor::new(
            vec![Box::new(layout), Box::new(ocr)],
            ExtractorConfig::default(),
        );

        let result = extractor.extract(&pdf_doc()).unwrap();
        assert_eq!(result.method, ExtractionMethod::Ocr);
        assert!(result.text.starts_with("--- Page 1 ---\n"));
        assert_eq!(result.fields["age"], "54");
    }

    #[test]
    fn custom_threshold_respected() {
        let (layout, _) = CountingStrategy::ok(ExtractionMethod::Layout, "Short but fine");
        let extractor = DocumentExtractor::new(
            vec![Box::new(layout)],
            ExtractorConfig {
                min_text_len: 5,
                ocr_dpi: 300,
            },
        );
        assert!(extractor.extract(&pdf_doc()).unwrap().succeeded);
    }

    #[test]
    fn default_chain_starts_with_layout_then_raw() {
        let strategies = default_strategies(&ExtractorConfig::default());
        assert_eq!(strategies[0].method(), ExtractionMethod::Layout);
        assert_eq!(strategies[1].method(), ExtractionMethod::Raw);
    }

    #[test]
    fn config_derives_from_app_config() {
        let app = AppConfig {
            min_text_len: 80,
            ocr_dpi: 200,
            ..AppConfig::default()
        };
        let config = ExtractorConfig::from(&app);
        assert_eq!(config.min_text_len, 80);
        assert_eq!(config.ocr_dpi, 200);
    }
}
