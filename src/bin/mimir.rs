//! mimir: model cache inspection CLI
//!
//! Reads GGUF metadata through the metadata cache and prints the cache keys
//! the coordinator would use for a given request.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mimir::{CacheKey, Config, EncoderTask, GgufMetadata, MetadataCache, ModelFormat};

/// Mimir model cache CLI
#[derive(Parser)]
#[command(name = "mimir")]
#[command(version = mimir::version::PKG_VERSION)]
#[command(about = "Model lifecycle and cache inspection")]
struct Args {
    /// Path to config file (default: ~/.mimir/config.toml or /etc/mimir/config.toml)
    #[arg(short, long, env = "MIMIR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print GGUF header metadata as JSON
    Inspect {
        /// GGUF files to read
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Print the cache key for a model request
    Key {
        #[command(subcommand)]
        kind: KeyKind,
    },
}

#[derive(Subcommand)]
enum KeyKind {
    /// Language model key
    Language {
        model_id: String,
        /// Context window size
        #[arg(long, default_value_t = 2048)]
        ctx: u32,
        /// Quantization (e.g. Q4_K_M)
        #[arg(long)]
        quant: Option<String>,
    },

    /// Encoder (embedding or rerank) key
    Encoder {
        model_id: String,
        /// Task: embedding or rerank
        #[arg(long, default_value = "embedding")]
        task: EncoderTask,
        /// Format: gguf, onnx or safetensors
        #[arg(long, default_value = "gguf")]
        format: ModelFormat,
        #[arg(long)]
        quant: Option<String>,
    },

    /// Classifier key
    Classifier { model_id: String },

    /// Anomaly detector key
    Anomaly { backend: String, model_id: String },

    /// Timeseries forecaster key
    Timeseries { backend: String, model_id: String },
}

impl KeyKind {
    fn key(&self) -> CacheKey {
        match self {
            Self::Language {
                model_id,
                ctx,
                quant,
            } => CacheKey::language(model_id, *ctx, quant.as_deref()),
            Self::Encoder {
                model_id,
                task,
                format,
                quant,
            } => CacheKey::encoder(*task, *format, model_id, quant.as_deref()),
            Self::Classifier { model_id } => CacheKey::classifier(model_id),
            Self::Anomaly { backend, model_id } => CacheKey::anomaly(backend, model_id),
            Self::Timeseries { backend, model_id } => CacheKey::timeseries(backend, model_id),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn for CLI; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Key { kind } => {
            println!("{}", kind.key());
        }
        Command::Inspect { paths } => {
            // Defaults apply only when no config file exists at all.
            let config = Config::load_or_default(args.config.as_deref())?;
            let cache = MetadataCache::with_max_entries(config.metadata.max_entries);

            let mut failed = false;
            let mut results = Vec::with_capacity(paths.len());
            for path in &paths {
                match cache.get_metadata(path).await {
                    Ok(metadata) => results.push(metadata),
                    Err(e) => {
                        eprintln!("{}: {e}", path.display());
                        failed = true;
                    }
                }
            }

            let results: Vec<&GgufMetadata> = results.iter().map(|m| m.as_ref()).collect();
            let json = match results.as_slice() {
                [single] => serde_json::to_string_pretty(single)?,
                many => serde_json::to_string_pretty(many)?,
            };
            if !results.is_empty() {
                println!("{json}");
            }
            if failed {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
