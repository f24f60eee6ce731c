use std::fmt::Write;

use super::fields::field_names;
use super::types::{ExtractionResult, Table};

/// Placeholder handed to the analysis batch when extraction degraded.
pub const EXTRACTION_FAILED_TEXT: &str = "Error: Could not extract text from document";

/// Render an extraction result as the report text the specialists read.
///
/// Layout: header, extraction method, raw text, structured fields in rule
/// order with title-cased labels, then any tables.
pub fn format_for_agents(result: &ExtractionResult) -> String {
    if !result.succeeded {
        return EXTRACTION_FAILED_TEXT.to_string();
    }

    let mut out = String::new();
    let _ = writeln!(out, "Medical Report Analysis");
    let _ = writeln!(out, "=======================");
    let _ = writeln!(out, "Extraction Method: {}", result.method);
    let _ = writeln!(out);
    let _ = writeln!(out, "RAW TEXT CONTENT:");
    let _ = writeln!(out, "{}", result.text);
    let _ = writeln!(out);
    let _ = writeln!(out, "STRUCTURED DATA EXTRACTED:");

    for name in field_names() {
        if let Some(value) = result.fields.get(name) {
            let _ = writeln!(out, "{}: {value}", title_case(name));
        }
    }

    if !result.tables.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "TABULAR DATA:");
        for (i, table) in result.tables.iter().enumerate() {
            let _ = writeln!(out, "Table {} (page {}):", i + 1, table.page_number);
            write_table(&mut out, table);
        }
    }

    out
}

fn write_table(out: &mut String, table: &Table) {
    for row in &table.rows {
        let _ = writeln!(out, "| {} |", row.join(" | "));
    }
}

/// `date_of_birth` -> `Date Of Birth`
fn title_case(field: &str) -> String {
    field
        .split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
