//! Saves a finished batch as plain-text reports, one file per task plus
//! the final diagnosis, and lists what earlier runs saved. Used by the CLI
//! and the status API; the pipeline itself never writes.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local, NaiveDateTime};
use serde::Serialize;

use crate::pipeline::batch::BatchResult;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const FINAL_DIAGNOSIS_SUFFIX: &str = "_final_diagnosis.txt";

/// How many past analyses `GET /api/results` reports.
pub const RECENT_RESULTS_LIMIT: usize = 10;

/// One saved analysis, keyed by the timestamp prefix of its files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResultSummary {
    /// `YYYYMMDD_HHMMSS` shared by every file of the run.
    pub id: String,
    /// Name of the final diagnosis file, usable with the download route.
    pub filename: String,
    /// `DD/MM/YYYY` from the id, or from the modification time.
    pub date: String,
    pub size: u64,
    /// RFC 3339 modification time.
    pub modified: String,
}

/// Write every task output and the synthesis under `dir`, creating it if
/// needed. Returns the written paths, task reports first.
pub fn save_batch_result(dir: &Path, result: &BatchResult) -> Result<Vec<PathBuf>, std::io::Error> {
    let stamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
    write_reports(dir, result, &stamp)
}

fn write_reports(
    dir: &Path,
    result: &BatchResult,
    stamp: &str,
) -> Result<Vec<PathBuf>, std::io::Error> {
    std::fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(result.outputs.len() + 1);

    for (task, output) in &result.outputs {
        let path = dir.join(format!("{stamp}_{}_report.txt", file_stem(task)));
        std::fs::write(&path, format!("### {task} Report:\n\n{output}"))?;
        tracing::info!(batch_id = %result.batch_id, task, path = %path.display(), "Saved task report");
        written.push(path);
    }

    let path = dir.join(format!("{stamp}_final_diagnosis.txt"));
    std::fs::write(&path, format!("### Final Diagnosis:\n\n{}", result.synthesis))?;
    tracing::info!(batch_id = %result.batch_id, path = %path.display(), "Saved final diagnosis");
    written.push(path);

    Ok(written)
}

/// Save the specialist input built from a PDF next to the reports.
pub fn save_extracted_text(dir: &Path, text: &str) -> Result<PathBuf, std::io::Error> {
    let stamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
    write_extracted_text(dir, text, &stamp)
}

fn write_extracted_text(dir: &Path, text: &str, stamp: &str) -> Result<PathBuf, std::io::Error> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(format!("{stamp}_extracted_pdf_text.txt"));
    std::fs::write(&path, text)?;
    tracing::info!(path = %path.display(), "Saved extracted text");
    Ok(path)
}

/// Final diagnoses under `dir`, newest first, at most `limit`. A missing
/// directory has no results.
pub fn list_recent_results(dir: &Path, limit: usize) -> Result<Vec<ResultSummary>, std::io::Error> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(e),
    };

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.ends_with(FINAL_DIAGNOSIS_SUFFIX) {
            continue;
        }
        let metadata = entry.metadata()?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        found.push((modified, name, metadata.len()));
    }

    // Newest first; the name breaks ties so equal mtimes stay deterministic.
    found.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| b.1.cmp(&a.1)));

    Ok(found
        .into_iter()
        .take(limit)
        .map(|(modified, name, size)| summarize(name, size, modified))
        .collect())
}

fn summarize(filename: String, size: u64, modified: SystemTime) -> ResultSummary {
    let modified: DateTime<Local> = modified.into();
    let id = filename
        .strip_suffix(FINAL_DIAGNOSIS_SUFFIX)
        .unwrap_or(&filename)
        .to_string();
    let date = NaiveDateTime::parse_from_str(&id, TIMESTAMP_FORMAT)
        .map(|stamp| stamp.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|_| modified.format("%d/%m/%Y").to_string());

    ResultSummary {
        id,
        filename,
        date,
        size,
        modified: modified.to_rfc3339(),
    }
}

/// Path of a saved file named `filename` directly under `dir`. Names with
/// path separators, parent references or a leading dot are refused.
pub fn resolve_result_file(dir: &Path, filename: &str) -> Option<PathBuf> {
    let plain = Path::new(filename).file_name().and_then(|n| n.to_str()) == Some(filename);
    if !plain || filename.starts_with('.') || filename.contains(['/', '\\']) {
        return None;
    }
    let path = dir.join(filename);
    path.is_file().then_some(path)
}

/// Lowercase, with anything outside `[a-z0-9_-]` replaced by `_`.
fn file_stem(task: &str) -> String {
    task.chars()
        .map(|c| match c.to_ascii_lowercase() {
            c @ ('a'..='z' | '0'..='9' | '_' | '-') => c,
            _ => '_',
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn sample_result() -> BatchResult {
        let mut outputs = BTreeMap::new();
        outputs.insert("Cardiologist".to_string(), "Sinus rhythm.".to_string());
        outputs.insert("Psychologist".to_string(), "No response.".to_string());
        BatchResult {
            batch_id: "analysis_test".into(),
            outputs,
            failed_tasks: vec!["Psychologist".into()],
            synthesis: "- Panic disorder".into(),
            synthesis_succeeded: true,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn writes_one_file_per_task_and_final() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = write_reports(tmp.path(), &sample_result(), "20240101_120000").unwrap();

        assert_eq!(paths.len(), 3);
        assert_eq!(
            paths[0].file_name().unwrap(),
            "20240101_120000_cardiologist_report.txt"
        );
        assert_eq!(
            paths[2].file_name().unwrap(),
            "20240101_120000_final_diagnosis.txt"
        );

        let cardio = std::fs::read_to_string(&paths[0]).unwrap();
        assert_eq!(cardio, "### Cardiologist Report:\n\nSinus rhythm.");
        let psych = std::fs::read_to_string(&paths[1]).unwrap();
        assert_eq!(psych, "### Psychologist Report:\n\nNo response.");
        let last = std::fs::read_to_string(&paths[2]).unwrap();
        assert_eq!(last, "### Final Diagnosis:\n\n- Panic disorder");
    }

    #[test]
    fn creates_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        let paths = save_batch_result(&nested, &sample_result()).unwrap();
        assert!(nested.is_dir());
        assert!(paths.iter().all(|p| p.exists()));
    }

    #[test]
    fn extracted_text_is_saved_verbatim() {
        let tmp = tempfile::tempdir().unwrap();
        let text = "Medical Report Analysis\n=======================\nAge: 29\n";
        let path = write_extracted_text(tmp.path(), text, "20240101_120000").unwrap();
        assert_eq!(
            path.file_name().unwrap(),
            "20240101_120000_extracted_pdf_text.txt"
        );
        assert_eq!(std::fs::read_to_string(&path).unwrap(), text);
    }

    #[test]
    fn recent_results_lists_final_diagnoses_newest_first() {
        let tmp = tempfile::tempdir().unwrap();
        write_reports(tmp.path(), &sample_result(), "20240101_120000").unwrap();
        write_reports(tmp.path(), &sample_result(), "20240315_083000").unwrap();
        write_extracted_text(tmp.path(), "text", "20240315_083000").unwrap();

        let results = list_recent_results(tmp.path(), RECENT_RESULTS_LIMIT).unwrap();
        assert_eq!(results.len(), 2);
        let ids: Vec<_> = results.iter().map(|r| r.id.as_str()).collect();
        assert!(ids.contains(&"20240101_120000"));
        assert!(ids.contains(&"20240315_083000"));

        let march = results.iter().find(|r| r.id == "20240315_083000").unwrap();
        assert_eq!(march.filename, "20240315_083000_final_diagnosis.txt");
        assert_eq!(march.date, "15/03/2024");
        assert_eq!(march.size, "### Final Diagnosis:\n\n- Panic disorder".len() as u64);
        assert!(DateTime::parse_from_rfc3339(&march.modified).is_ok());
    }

    #[test]
    fn recent_results_respects_limit() {
        let tmp = tempfile::tempdir().unwrap();
        for minute in 0..12 {
            let stamp = format!("20240101_12{minute:02}00");
            std::fs::write(tmp.path().join(format!("{stamp}_final_diagnosis.txt")), "x").unwrap();
        }
        let results = list_recent_results(tmp.path(), RECENT_RESULTS_LIMIT).unwrap();
        assert_eq!(results.len(), RECENT_RESULTS_LIMIT);
    }

    #[test]
    fn unparseable_stamp_falls_back_to_mtime() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("manual_final_diagnosis.txt"), "x").unwrap();
        let results = list_recent_results(tmp.path(), 10).unwrap();
        assert_eq!(results[0].id, "manual");
        assert_eq!(results[0].date, Local::now().format("%d/%m/%Y").to_string());
    }

    #[test]
    fn missing_results_dir_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let results = list_recent_results(&tmp.path().join("none"), 10).unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn resolve_refuses_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let paths = write_reports(tmp.path(), &sample_result(), "20240101_120000").unwrap();
        std::fs::write(tmp.path().join(".hidden"), "x").unwrap();

        assert_eq!(
            resolve_result_file(tmp.path(), "20240101_120000_final_diagnosis.txt"),
            Some(paths[2].clone())
        );
        assert_eq!(resolve_result_file(tmp.path(), "../etc/passwd"), None);
        assert_eq!(resolve_result_file(tmp.path(), ".."), None);
        assert_eq!(resolve_result_file(tmp.path(), ".hidden"), None);
        assert_eq!(resolve_result_file(tmp.path(), "a\\b.txt"), None);
        assert_eq!(resolve_result_file(tmp.path(), "missing.txt"), None);
        assert_eq!(resolve_result_file(tmp.path(), ""), None);
    }

    #[test]
    fn file_stem_sanitizes_names() {
        assert_eq!(file_stem("Cardiologist"), "cardiologist");
        assert_eq!(file_stem("Sleep Medicine/2"), "sleep_medicine_2");
        assert_eq!(file_stem("../x"), "___x");
    }
}
