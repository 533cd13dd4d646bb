//! design-context CLI.
//!
//! Renders a page and prints its design context.
//!
//! Usage examples:
//!   $ design-context https://example.com --strategy full --css-budget 15000
//!   $ RUST_LOG=debug design-context https://example.com --format html --save-dir captures

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use design_context::artifact::{self, ArtifactNaming};
use design_context::generator::build_prompt;
use design_context::{CaptureStrategy, ExtractConfig, ExtractOptions, Extractor};
use log::{info, warn};

#[derive(Parser)]
#[command(name = "design-context", author, version, about = "Extract a design context from a live web page")]
struct Cli {
    /// Page to render
    url: String,

    /// CSS capture strategy (coverage or full)
    #[arg(long, default_value = "coverage")]
    strategy: CaptureStrategy,

    /// Truncate CSS to this many characters and reduce the head to metadata
    #[arg(long)]
    css_budget: Option<usize>,

    /// Leave <img> sources as links
    #[arg(long)]
    no_images: bool,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Deadline for the whole request, in milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// What to print
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,

    /// Also save the wrapped HTML document into this directory
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Name saved files by timestamp instead of content hash
    #[arg(long, requires = "save_dir")]
    timestamped: bool,
}

#[derive(Clone, Copy, ValueEnum, Debug)]
enum OutputFormat {
    /// The full context, diagnostics included
    Json,
    /// The wrapped HTML document
    Html,
    /// The generator prompt
    Prompt,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_env_logger();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ExtractConfig::from_json_file(path)?,
        None => ExtractConfig::default(),
    };
    if cli.deadline_ms.is_some() {
        config.request_deadline_ms = cli.deadline_ms;
    }

    let options = ExtractOptions {
        capture_strategy: cli.strategy,
        css_char_budget: cli.css_budget,
        inline_images: !cli.no_images,
    };

    let extractor = Extractor::new(config)?;
    let context = extractor
        .extract(&cli.url, &options)
        .await
        .with_context(|| format!("extraction of {} failed", cli.url))?;

    if context.diagnostics().likely_under_rendered() {
        warn!("Page may not have finished rendering; consider a longer settle delay");
    }

    if let Some(dir) = &cli.save_dir {
        let naming = if cli.timestamped {
            ArtifactNaming::Timestamped
        } else {
            ArtifactNaming::ContentAddressed
        };
        let path = artifact::persist(&context, dir, naming)?;
        info!("Wrote {}", path.display());
    }

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&context)?),
        OutputFormat::Html => print!("{}", artifact::wrap_document(&context)),
        OutputFormat::Prompt => print!("{}", build_prompt(&context)),
    }

    Ok(())
}

fn init_env_logger() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .target(env_logger::Target::Stderr)
        .try_init();
}
