//! qrferry entry point.

mod commands;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use qrferry_protocol::ErrorCorrectionLevel;
use tracing_subscriber::EnvFilter;

use config::AppConfig;

#[derive(Parser)]
#[command(name = "qrferry", version)]
#[command(about = "One-way file transfer through a sequence of on-screen frames")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Config file path")]
    config: Option<PathBuf>,

    #[arg(long, global = true, help = "Payload bytes per chunk (overrides config)")]
    chunk_size: Option<usize>,

    #[arg(long, global = true, help = "Error correction level: L, M, Q or H (overrides config)")]
    ec_level: Option<ErrorCorrectionLevel>,

    #[arg(long, global = true, help = "Playback frames per second (overrides config)")]
    fps: Option<u32>,

    #[arg(long = "loop", global = true, help = "Loop playback until interrupted")]
    loop_playback: bool,

    #[arg(long, global = true, help = "Disable whole-file and per-chunk compression")]
    no_compress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write every envelope of FILE, one per line.
    Pack {
        file: PathBuf,
        #[arg(short, long, help = "Output file (stdout when omitted)")]
        output: Option<PathBuf>,
    },
    /// Play the frames of FILE on stdout at the configured rate.
    Send { file: PathBuf },
    /// Reassemble a frames file (`-` for stdin) and save the verified file.
    Receive {
        frames: PathBuf,
        #[arg(short, long, default_value = ".", help = "Output directory")]
        output: PathBuf,
    },
    /// Report what a frames file holds and what is missing.
    Inspect { frames: PathBuf },
    /// Print the effective configuration.
    Config {
        #[arg(long, help = "Also write it to the config file")]
        init: bool,
    },
}

impl Cli {
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(level) = self.ec_level {
            config.error_correction = level;
        }
        if let Some(fps) = self.fps {
            config.fps = fps;
        }
        if self.loop_playback {
            config.loop_playback = true;
        }
        if self.no_compress {
            config.compress_file = false;
            config.compress_chunks = false;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries frames and reports.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,qrferry=debug")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::load(cli.config.as_deref())?;
    cli.apply_overrides(&mut config);

    match &cli.command {
        Commands::Pack { file, output } => {
            let stats = match output {
                Some(path) => {
                    let mut out = std::io::BufWriter::new(std::fs::File::create(path)?);
                    commands::pack(&config, file, &mut out)?
                }
                None => commands::pack(&config, file, &mut std::io::stdout().lock())?,
            };
            eprintln!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Commands::Send { file } => {
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!(error = %e, "failed to listen for ctrl-c");
                    std::future::pending::<()>().await;
                }
            };
            commands::send(&config, file, &mut std::io::stdout(), shutdown).await?;
        }
        Commands::Receive { frames, output } => {
            let lines = commands::read_frames(frames)?;
            let path = commands::receive(&config, lines, output)?;
            println!("{}", path.display());
        }
        Commands::Inspect { frames } => {
            let lines = commands::read_frames(frames)?;
            let report = commands::inspect(&lines);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Config { init } => {
            if *init {
                let path = match &cli.config {
                    Some(p) => p.clone(),
                    None => config::config_path()?,
                };
                config.save_to(&path)?;
                tracing::info!(path = %path.display(), "configuration written");
            }
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
