use super::types::{ExtractionMethod, PdfTextStrategy, StrategyOutput};
use super::ExtractionError;

/// Raw text strategy using the pdf-extract crate.
/// Pulls each page's text layer in order, with no layout awareness.
pub struct RawTextStrategy;

impl PdfTextStrategy for RawTextStrategy {
    fn method(&self) -> ExtractionMethod {
        ExtractionMethod::Raw
    }

    fn extract(&self, pdf_bytes: &[u8]) -> Result<StrategyOutput, ExtractionError> {
        let page_texts = pdf_extract::extract_text_from_mem_by_pages(pdf_bytes)
            .map_err(|e| ExtractionError::PdfParsing(e.to_string()))?;

        let text = page_texts
            .iter()
            .map(|page| page.trim_end())
            .filter(|page| !page.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        Ok(StrategyOutput {
            text,
            tables: vec![],
        })
    }
}

/// Build a one-page PDF with a single line of Helvetica text.
#[cfg(test)]
pub(crate) fn make_test_pdf(text: &str) -> Vec<u8> {
    build_pdf(text, true)
}

/// Like `make_test_pdf`, but the page has no `/Resources`, so the content
/// stream's `/F1` names an undefined font.
#[cfg(test)]
pub(crate) fn make_pdf_with_undefined_font(text: &str) -> Vec<u8> {
    build_pdf(text, false)
}

#[cfg(test)]
fn build_pdf(text: &str, with_resources: bool) -> Vec<u8> {
    use lopdf::dictionary;
    use lopdf::{Document, Object, Stream};

    let mut doc = Document::with_version("1.4");

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });

    let content = format!("BT /F1 12 Tf 72 700 Td ({text}) Tj ET");
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));

    let mut page = dictionary! {
        "Type" => "Page",
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        "Contents" => content_id,
    };
    if with_resources {
        page.set(
            "Resources",
            dictionary! {
                "Font" => dictionary! { "F1" => font_id },
            },
        );
    }
    let page_id = doc.add_object(page);

    let pages_id = doc.add_object(dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
    });

    if let Ok(Object::Dictionary(dict)) = doc.get_object_mut(page_id) {
        dict.set("Parent", pages_id);
    }

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}
