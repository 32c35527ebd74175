use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use augur_application::{Pipeline, PipelineRequest};
use augur_core::config::PipelineConfig;
use augur_core::upload::UploadedFile;
use augur_infrastructure::{csv_headers, sqlite_schema};
use augur_interaction::GeminiClient;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "augur")]
#[command(about = "Augur - answers data questions by generating and executing analysis code", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one question-answering pipeline over the given files
    Run {
        /// File containing the question text
        #[arg(long)]
        question: PathBuf,
        /// Additional uploads, as NAME=PATH or a bare path
        #[arg(long = "file", value_name = "NAME=PATH")]
        files: Vec<String>,
        /// Root directory for per-run working directories
        #[arg(long)]
        uploads_root: Option<PathBuf>,
        /// Model identifier (e.g. gemini-2.5-flash)
        #[arg(long)]
        model: Option<String>,
    },
    /// Print extracted schema hints for a SQLite or CSV file
    Schema {
        /// The .db/.sqlite or .csv file to describe
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            question,
            files,
            uploads_root,
            model,
        } => run(question, files, uploads_root, model).await,
        Commands::Schema { path } => schema(path),
    }
}

async fn run(
    question: PathBuf,
    files: Vec<String>,
    uploads_root: Option<PathBuf>,
    model: Option<String>,
) -> Result<()> {
    let mut config = PipelineConfig::load()?;
    if let Some(root) = uploads_root {
        config.uploads_root = root;
    }
    if let Some(model) = model {
        config.model = model;
    }

    let mut uploads = vec![UploadedFile::new(
        "question.txt",
        std::fs::read(&question)
            .with_context(|| format!("failed to read question file {}", question.display()))?,
    )];
    for spec in &files {
        uploads.push(parse_upload(spec)?);
    }

    let client = GeminiClient::try_from_env(config.model.clone()).await?;
    let pipeline = Pipeline::new(config, Arc::new(client));

    match pipeline.run(PipelineRequest { uploads }).await {
        Ok(artifact) => {
            println!("{}", serde_json::to_string_pretty(&artifact)?);
            Ok(())
        }
        Err(failure) => {
            eprintln!("{}", serde_json::to_string_pretty(&failure)?);
            bail!("pipeline failed: {failure}")
        }
    }
}

/// Parses a `NAME=PATH` upload spec; a bare path uses its file name.
fn parse_upload(spec: &str) -> Result<UploadedFile> {
    let (name, path) = match spec.split_once('=') {
        Some((name, path)) => (name.to_string(), PathBuf::from(path)),
        None => {
            let path = PathBuf::from(spec);
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(str::to_string)
                .with_context(|| format!("upload path has no file name: {spec}"))?;
            (name, path)
        }
    };
    let bytes = std::fs::read(&path)
        .with_context(|| format!("failed to read upload {}", path.display()))?;
    Ok(UploadedFile::new(name, bytes))
}

fn schema(path: PathBuf) -> Result<()> {
    let hints = match path.extension().and_then(|e| e.to_str()) {
        Some("db") | Some("sqlite") | Some("sqlite3") => {
            serde_json::to_value(sqlite_schema(&path)?)?
        }
        Some("csv") => serde_json::to_value(csv_headers(&path)?)?,
        _ => bail!("unsupported file type: {}", path.display()),
    };
    println!("{}", serde_json::to_string_pretty(&hints)?);
    Ok(())
}
