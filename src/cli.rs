// Command-line interface
//
// A thin presentation shim over the refinement library: wires the
// configured gateway to a file-backed document host, streams run events to
// stdout, and manages the artifact history.

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::artifacts::{ArtifactStore, SqliteArtifactStore};
use crate::config::{load_config, Config};
use crate::gateway::create_gateway;
use crate::host::{media_type_for, FileHost};
use crate::refine::{Outcome, ReferenceImage, RefineRequest, Refiner, RunEvent};
use crate::stylesheet::{BlockKey, StyleDocument};

#[derive(Parser)]
#[command(name = "restyle", version, about = "Iterative AI stylesheet refinement")]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one refinement loop against a document snapshot
    Run {
        /// Natural-language styling request
        intent: String,

        /// Element-tree snapshot of the document (JSON)
        #[arg(long)]
        snapshot: PathBuf,

        /// Where the refined stylesheet is written each round
        #[arg(long, default_value = "restyle.css")]
        out: PathBuf,

        /// Screenshot file refreshed by an external renderer
        #[arg(long)]
        capture: Option<PathBuf>,

        /// Reference image(s) showing the desired look
        #[arg(long)]
        image: Vec<PathBuf>,

        /// Existing stylesheet to adopt as the baseline
        #[arg(long)]
        baseline: Option<PathBuf>,

        /// Override the configured iteration budget
        #[arg(long)]
        max_iterations: Option<u32>,

        /// Save the accepted stylesheet to history under this label
        #[arg(long)]
        save: Option<String>,
    },

    /// List saved stylesheets
    History,

    /// Delete a saved stylesheet by id
    Delete { id: String },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config()?;

    match cli.command {
        Command::Run {
            intent,
            snapshot,
            out,
            capture,
            image,
            baseline,
            max_iterations,
            save,
        } => {
            run_refinement(
                config,
                intent,
                snapshot,
                out,
                capture,
                image,
                baseline,
                max_iterations,
                save,
            )
            .await
        }

        Command::History => {
            let store = SqliteArtifactStore::open(&config.artifacts_db)?;
            let artifacts = store.list()?;
            if artifacts.is_empty() {
                println!("No saved stylesheets.");
                return Ok(());
            }
            for artifact in artifacts {
                println!(
                    "{}  {}  {} ({} bytes)",
                    artifact.id,
                    artifact.created_at.format("%Y-%m-%d %H:%M"),
                    artifact.label,
                    artifact.css.len()
                );
            }
            Ok(())
        }

        Command::Delete { id } => {
            let store = SqliteArtifactStore::open(&config.artifacts_db)?;
            if store.delete(&id)? {
                println!("Deleted {id}.");
            } else {
                println!("No artifact with id {id}.");
            }
            Ok(())
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_refinement(
    config: Config,
    intent: String,
    snapshot: PathBuf,
    out: PathBuf,
    capture: Option<PathBuf>,
    images: Vec<PathBuf>,
    baseline: Option<PathBuf>,
    max_iterations: Option<u32>,
    save: Option<String>,
) -> Result<()> {
    let provider = config
        .active_provider()
        .context("no provider configured")?;
    let gateway = create_gateway(provider)?;
    println!(
        "Using {} ({})",
        provider.display_name(),
        gateway.default_model()
    );

    let mut refine_config = config.refine.to_refine_config();
    if let Some(n) = max_iterations {
        refine_config.max_iterations = n;
    }

    let mut request = RefineRequest::new(intent, BlockKey::new("page", "theme"));
    for path in &images {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read reference image {}", path.display()))?;
        request.reference_images.push(ReferenceImage {
            media_type: media_type_for(path),
            data: BASE64.encode(bytes),
        });
    }
    if let Some(path) = &baseline {
        let css = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read baseline stylesheet {}", path.display()))?;
        request.baseline = StyleDocument::parse(&css);
    }

    let host = Arc::new(FileHost::new(snapshot, out.clone(), capture));
    let refiner = Refiner::new(Arc::from(gateway), host, refine_config);

    let (tx, mut rx) = mpsc::channel::<RunEvent>(64);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            println!(
                "[iter {} | {}] {}",
                event.iteration, event.stage, event.message
            );
        }
    });

    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("cancellation requested, stopping at the next stage boundary");
            ctrl_c_cancel.cancel();
        }
    });

    let report = refiner.run(request, tx, cancel).await;
    let _ = printer.await;

    match &report.outcome {
        Outcome::Converged => println!("Converged after {} iteration(s).", report.history.len()),
        Outcome::Exhausted => println!(
            "Iteration budget exhausted after {} iteration(s); last result kept.",
            report.history.len()
        ),
        Outcome::Cancelled => println!("Cancelled."),
        Outcome::Failed {
            stage,
            iteration,
            error,
        } => bail!("refinement failed at {stage} (iteration {iteration}): {error}"),
    }
    println!("Stylesheet written to {}.", out.display());

    if let Some(label) = save {
        if report.outcome.is_success() {
            let store = SqliteArtifactStore::open(&config.artifacts_db)?;
            let artifact = store.save(&label, &report.final_css)?;
            println!("Saved to history as {} ({}).", artifact.label, artifact.id);
        }
    }

    Ok(())
}
