mod app;
mod capture;
mod config;
mod editor;
mod error;
mod export;
mod game;
mod notation;
mod ocr;
mod ocr_llm;
mod pgn;
mod session;

use anyhow::{Context, Result, bail};
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::app::App;
use crate::config::Config;
use crate::ocr_llm::OpenAiTranscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Logs go to stderr so `--print` output stays clean
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();

    // Parse CLI arguments
    let matches = Command::new("ClickChess")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Scan handwritten chess scoresheets into PGN")
        .arg(
            Arg::new("image")
                .long("image")
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Scoresheet image to scan right away"),
        )
        .arg(
            Arg::new("print")
                .long("print")
                .action(ArgAction::SetTrue)
                .requires("image")
                .help("Scan --image without prompts and write the PGN to stdout"),
        )
        .arg(
            Arg::new("output-dir")
                .long("output-dir")
                .value_name("DIR")
                .value_parser(clap::value_parser!(PathBuf))
                .help("Where saved PGN files go (default: CLICKCHESS_OUTPUT_DIR or .)"),
        )
        .arg(
            Arg::new("model")
                .long("model")
                .value_name("NAME")
                .help("Vision model to transcribe with (default: CLICKCHESS_MODEL or gpt-4o)"),
        )
        .get_matches();

    let mut config = Config::from_env().context("Invalid configuration")?;
    if let Some(dir) = matches.get_one::<PathBuf>("output-dir") {
        config.output_dir = dir.clone();
    }
    if let Some(model) = matches.get_one::<String>("model") {
        config.model = model.clone();
    }

    let transcriber = match OpenAiTranscriber::new(&config) {
        Ok(transcriber) => {
            tracing::info!("Transcribing with {}", transcriber.model());
            Some(transcriber)
        }
        Err(err) => {
            tracing::warn!("Scanning disabled: {}", err);
            None
        }
    };

    let today = chrono::Local::now().date_naive();
    let mut app = App::new(config, transcriber, today);
    let image = matches.get_one::<PathBuf>("image");

    if matches.get_flag("print") {
        let Some(path) = image else {
            bail!("--print needs --image");
        };
        let pgn = app
            .scan_to_pgn(path)
            .await
            .with_context(|| format!("Failed to scan {}", path.display()))?;
        println!("{}", pgn);
        return Ok(());
    }

    if let Some(path) = image {
        app.pick_file(path);
    }
    app.run().await
}
