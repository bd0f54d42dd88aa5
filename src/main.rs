mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use vietrag::config::VietragConfig;

#[derive(Parser)]
#[command(
    name = "vietrag",
    version,
    about = "Vietnamese-aware prompts and embeddings for RAG pipelines"
)]
struct Cli {
    /// Config file (default: ~/.vietrag/config.toml)
    #[arg(long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect the language of a piece of text
    Detect { text: String },
    /// Print a prompt template for the effective language
    Prompt {
        key: String,
        /// Force a language (e.g. "vi", "Vietnamese", "en")
        #[arg(long)]
        language: Option<String>,
        /// Query text used to detect the language when none is configured
        #[arg(long)]
        sample: Option<String>,
        /// Template parameter as name=value (repeatable)
        #[arg(long = "param", value_name = "NAME=VALUE")]
        params: Vec<String>,
    },
    /// Embed texts and print one JSON vector per line
    Embed {
        #[arg(required = true)]
        texts: Vec<String>,
    },
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
    /// Check configuration, model files, and vector store dimensions
    Doctor,
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to ~/.vietrag/models/
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => VietragConfig::load_from(path)?,
        None => VietragConfig::load()?,
    };

    // Log to stderr so stdout stays clean for command output.
    let filter = EnvFilter::try_new(&config.logging.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Detect { text } => cli::detect::detect(&text),
        Command::Prompt {
            key,
            language,
            sample,
            params,
        } => {
            cli::prompt::prompt(
                &config,
                &key,
                language.as_deref(),
                sample.as_deref(),
                &params,
            )?;
        }
        Command::Embed { texts } => {
            cli::embed::embed(&config, texts).await?;
        }
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.embedding).await?;
            }
        },
        Command::Doctor => {
            if !cli::doctor::doctor(&config)? {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
