use super::types::Table;

/// Minimum consecutive tabular lines that form a table.
const MIN_TABLE_ROWS: usize = 2;

/// Find table-like blocks in one page of text.
///
/// A block is a run of at least `MIN_TABLE_ROWS` consecutive lines that
/// each look tabular. Cells are split on tabs, pipes, or runs of 3+ spaces.
pub fn detect_tables(page_number: usize, text: &str) -> Vec<Table> {
    let mut tables = Vec::new();
    let mut run: Vec<&str> = Vec::new();

    for line in text.lines() {
        if is_tabular_line(line) {
            run.push(line);
            continue;
        }
        flush_run(page_number, &mut run, &mut tables);
    }
    flush_run(page_number, &mut run, &mut tables);

    tables
}

fn flush_run(page_number: usize, run: &mut Vec<&str>, tables: &mut Vec<Table>) {
    if run.len() >= MIN_TABLE_ROWS {
        let rows = run.iter().map(|l| split_cells(l)).collect();
        tables.push(Table { page_number, rows });
    }
    run.clear();
}

/// Heuristic: a line looks tabular if it has multiple columns separated by
/// tabs, pipes, or consistent multi-space gaps.
///
/// - Tab-separated: "Name\tDose\tFrequency"
/// - Pipe-separated: "Name | Dose | Frequency"
/// - Multi-space aligned: "Troponin    0.04    ng/mL"
fn is_tabular_line(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.len() < 5 {
        return false;
    }

    trimmed.matches('\t').count() >= 2
        || trimmed.matches('|').count() >= 2
        || count_multi_space_gaps(trimmed) >= 2
}

/// Count runs of 3+ consecutive spaces that separate non-empty text segments.
fn count_multi_space_gaps(text: &str) -> usize {
    let mut count = 0;
    let mut gap_len = 0;

    for ch in text.chars() {
        if ch == ' ' {
            gap_len += 1;
            if gap_len == 3 {
                count += 1;
            }
        } else {
            gap_len = 0;
        }
    }

    count
}

fn split_cells(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let raw: Vec<&str> = if trimmed.contains('\t') {
        trimmed.split('\t').collect()
    } else if trimmed.contains('|') {
        trimmed.split('|').collect()
    } else {
        trimmed.split("   ").collect()
    };

    raw.into_iter()
        .map(str::trim)
        .filter(|cell| !cell.is_empty())
        .map(str::to_string)
        .collect()
}
