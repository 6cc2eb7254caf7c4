//! blockput command-line uploader entry point.

mod app;
mod config;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Resumable block upload of a single file")]
struct CliArgs {
    /// File to upload
    file: PathBuf,

    /// Object key (defaults to the file name)
    #[arg(short, long)]
    key: Option<String>,

    /// Upload credential
    #[arg(short, long, default_value = "")]
    token: String,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let config = config::Config::load(args.config.as_deref())?;

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting blockput");

    let key = match args.key {
        Some(key) => key,
        None => args
            .file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("cannot derive a key from {}", args.file.display()))?,
    };

    let rt = tokio::runtime::Runtime::new()?;
    let response = rt.block_on(app::run(config, args.file, key, args.token))?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.success {
        std::process::exit(1);
    }
    Ok(())
}
