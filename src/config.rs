use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "MedAssist";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Minimum trimmed length for extracted text to be accepted.
pub const DEFAULT_MIN_TEXT_LEN: usize = 50;

/// Rasterization DPI for the OCR strategy.
pub const DEFAULT_OCR_DPI: u32 = 300;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "medgemma";
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    if cfg!(debug_assertions) {
        "info,medassist_lib=debug"
    } else {
        "info"
    }
}

/// Get the application data directory
/// ~/MedAssist/ on all platforms. Falls back to the working directory
/// when no home directory can be determined.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Default directory for saved reports.
pub fn results_dir() -> PathBuf {
    app_data_dir().join("results")
}

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub ollama_url: String,
    pub model: String,
    pub timeout_secs: u64,
    pub min_text_len: usize,
    pub ocr_dpi: u32,
    pub results_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            min_text_len: DEFAULT_MIN_TEXT_LEN,
            ocr_dpi: DEFAULT_OCR_DPI,
            results_dir: results_dir(),
        }
    }
}

impl AppConfig {
    /// Build from `MEDASSIST_*` environment variables, keeping defaults
    /// for anything unset or unparseable.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default = Self::default();
        Self {
            ollama_url: lookup("MEDASSIST_OLLAMA_URL").unwrap_or(default.ollama_url),
            model: lookup("MEDASSIST_MODEL").unwrap_or(default.model),
            timeout_secs: parse_or(&lookup, "MEDASSIST_TIMEOUT_SECS", default.timeout_secs),
            min_text_len: parse_or(&lookup, "MEDASSIST_MIN_TEXT_LEN", default.min_text_len),
            ocr_dpi: parse_or(&lookup, "MEDASSIST_OCR_DPI", default.ocr_dpi),
            results_dir: lookup("MEDASSIST_RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.results_dir),
        }
    }
}

fn parse_or<T: std::str::FromStr + Copy>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match lookup(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, "Invalid config value, using default");
            default
        }),
        None => default,
    }
}
