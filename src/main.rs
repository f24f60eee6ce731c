//! medassist - medical report extraction and multi-specialist analysis.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use medassist_lib::api::ApiContext;
use medassist_lib::config::AppConfig;
use medassist_lib::pipeline::batch::ProgressStore;
use medassist_lib::pipeline::extraction::{
    format_for_agents, Document, DocumentExtractor, DocumentKind, ExtractorConfig,
};
use medassist_lib::pipeline::processor::{AnalysisOutcome, AnalysisPipeline};

#[derive(Parser)]
#[command(name = "medassist")]
#[command(about = "Medical report extraction and multidisciplinary analysis")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract a report and run every specialist plus the final synthesis
    Analyze {
        /// Plain-text (.txt) or PDF report
        file: PathBuf,

        /// Model name (overrides MEDASSIST_MODEL)
        #[arg(long)]
        model: Option<String>,

        /// Serve batch progress over HTTP while the analysis runs
        #[arg(long, value_name = "ADDR")]
        status_addr: Option<SocketAddr>,

        /// Directory for saved reports (overrides MEDASSIST_RESULTS_DIR)
        #[arg(long)]
        results_dir: Option<PathBuf>,

        /// Do not write report files
        #[arg(long)]
        no_save: bool,

        /// Print the full outcome as JSON instead of the final diagnosis
        #[arg(long)]
        json: bool,
    },
    /// Run only the extraction chain and print what the specialists would see
    Extract {
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    medassist_lib::init_tracing();
    tracing::info!(
        "{} v{}",
        medassist_lib::config::APP_NAME,
        medassist_lib::config::APP_VERSION
    );

    let cli = Cli::parse();
    let mut config = AppConfig::from_env();

    match cli.command {
        Commands::Analyze {
            file,
            model,
            status_addr,
            results_dir,
            no_save,
            json,
        } => {
            if let Some(model) = model {
                config.model = model;
            }
            if let Some(dir) = results_dir {
                config.results_dir = dir;
            }
            analyze(&config, file, status_addr, !no_save, json).await
        }
        Commands::Extract { file } => extract(&config, file).await,
    }
}

async fn analyze(
    config: &AppConfig,
    file: PathBuf,
    status_addr: Option<SocketAddr>,
    save: bool,
    json: bool,
) -> Result<()> {
    let doc = Document::from_path(&file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let from_pdf = doc.kind() == DocumentKind::Pdf;

    let progress = Arc::new(ProgressStore::new());

    let mut server = match status_addr {
        Some(addr) => {
            let ctx = ApiContext::new(Arc::clone(&progress), config.results_dir.clone());
            let server = medassist_lib::api::start_status_server(ctx, addr)
                .await
                .with_context(|| format!("Failed to bind status server on {addr}"))?;
            eprintln!("Status: http://{}/api/status", server.addr());
            Some(server)
        }
        None => None,
    };

    // The blocking HTTP client must be built, used and dropped off the runtime.
    let background = {
        let config = config.clone();
        tokio::task::spawn_blocking(move || {
            AnalysisPipeline::from_config(&config, progress)?.start_analysis(doc)
        })
        .await??
    };
    let cancel = background.cancel_token();
    tracing::info!(batch_id = background.batch_id(), file = %file.display(), "Analysis started");

    // The pipeline blocks on HTTP calls; keep it off the async workers.
    let mut join = tokio::task::spawn_blocking(move || background.join());

    let outcome = tokio::select! {
        joined = &mut join => joined?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Interrupted, cancelling analysis...");
            cancel.cancel();
            join.await?
        }
    };

    if let Some(server) = server.as_mut() {
        server.shutdown();
    }

    let outcome = outcome?;
    report(config, &outcome, from_pdf, save, json)
}

fn report(
    config: &AppConfig,
    outcome: &AnalysisOutcome,
    from_pdf: bool,
    save: bool,
    json: bool,
) -> Result<()> {
    let result = &outcome.result;

    for task in &result.failed_tasks {
        eprintln!("warning: {task} returned no response");
    }
    if !result.synthesis_succeeded {
        eprintln!("warning: synthesis returned no diagnosis");
    }

    if save && from_pdf {
        let path =
            medassist_lib::results::save_extracted_text(&config.results_dir, &outcome.agent_input)
                .with_context(|| {
                    format!("Failed to save extracted text to {}", config.results_dir.display())
                })?;
        eprintln!("Saved {}", path.display());
    }

    if save {
        let paths = medassist_lib::results::save_batch_result(&config.results_dir, result)
            .with_context(|| {
                format!("Failed to save reports to {}", config.results_dir.display())
            })?;
        for path in paths {
            eprintln!("Saved {}", path.display());
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
    } else {
        println!("### Final Diagnosis:\n\n{}", result.synthesis);
    }
    Ok(())
}

async fn extract(config: &AppConfig, file: PathBuf) -> Result<()> {
    let doc = Document::from_path(&file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let extractor_config = ExtractorConfig::from(config);

    // PDFium and Tesseract calls block.
    let extraction = tokio::task::spawn_blocking(move || {
        DocumentExtractor::with_default_chain(extractor_config).extract(&doc)
    })
    .await??;

    for attempt in &extraction.attempts {
        eprintln!(
            "{:<16} {:>6} chars  {}{}",
            attempt.method.as_str(),
            attempt.text_length,
            if attempt.accepted { "accepted" } else { "rejected" },
            attempt
                .error
                .as_deref()
                .map(|e| format!(" ({e})"))
                .unwrap_or_default()
        );
    }

    if !extraction.succeeded {
        bail!("No strategy could extract text from {}", file.display());
    }

    println!("{}", format_for_agents(&extraction));
    Ok(())
}
