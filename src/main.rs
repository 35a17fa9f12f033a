//! `faceauth` operator CLI.
//!
//! Runs enrollment and authentication against a local store, with the
//! commitment journal standing in for the chain. Embeddings are read as a
//! JSON array of numbers from a file or from stdin (`-`); results are
//! printed as JSON.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use faceauth::{build_service, FaceAuthConfig, FaceAuthService, LivenessResult};
use serde::Serialize;
use tracing_subscriber::{fmt, EnvFilter};

/// FaceAuth: face-embedding enrollment and wallet authentication
#[derive(Parser)]
#[command(name = "faceauth")]
#[command(version)]
#[command(about = "Face-embedding enrollment and wallet authentication")]
#[command(propagate_version = true)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// redb data file; overrides the configured storage
    #[arg(short, long, global = true)]
    data: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset (e.g. "info", "faceauth=debug")
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll an embedding and bind it to a wallet
    Enroll {
        #[arg(short, long)]
        wallet: String,
        /// JSON array file, or "-" for stdin
        #[arg(short, long)]
        embedding: PathBuf,
    },
    /// Authenticate a wallet with a fresh embedding
    Authenticate {
        #[arg(short, long)]
        wallet: String,
        /// JSON array file, or "-" for stdin; omit when no face was found
        #[arg(short, long)]
        embedding: Option<PathBuf>,
        /// Mark the capture as failing the liveness check
        #[arg(long)]
        spoof: bool,
        /// Liveness detector confidence
        #[arg(long, default_value_t = 1.0)]
        liveness_confidence: f32,
    },
    /// Show the identity bound to a wallet
    Binding {
        #[arg(short, long)]
        wallet: String,
    },
    /// Remove a wallet's binding and enrolled embedding
    Unenroll {
        #[arg(short, long)]
        wallet: String,
    },
    /// Verify the recorded commitment for a wallet
    Audit {
        #[arg(short, long)]
        wallet: String,
    },
    /// Print index and ledger counters
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(
        cli.log_level.as_deref().unwrap_or(&config.logging.level),
        cli.json_logs || config.logging.json,
    );

    let service = build_service(&config).context("failed to open faceauth state")?;
    run(&service, cli.command)
}

fn load_config(cli: &Cli) -> Result<FaceAuthConfig> {
    let mut config = match &cli.config {
        Some(path) => FaceAuthConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => {
            let mut config = FaceAuthConfig::default();
            config.storage.backend = "redb".to_string();
            config.storage.path = Some(PathBuf::from("faceauth.redb"));
            config
        }
    };
    config.apply_env_overrides()?;
    if let Some(data) = &cli.data {
        config.storage.backend = "redb".to_string();
        config.storage.path = Some(data.clone());
    }
    Ok(config)
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(service: &FaceAuthService, command: Commands) -> Result<()> {
    match command {
        Commands::Enroll { wallet, embedding } => {
            let embedding = read_embedding(&embedding)?;
            print_json(&service.enroll(&wallet, &embedding)?)
        }
        Commands::Authenticate {
            wallet,
            embedding,
            spoof,
            liveness_confidence,
        } => {
            let embedding = embedding.as_deref().map(read_embedding).transpose()?;
            let liveness = LivenessResult {
                is_live: !spoof,
                confidence: liveness_confidence,
            };
            print_json(&service.authenticate(&wallet, embedding.as_deref(), &liveness)?)
        }
        Commands::Binding { wallet } => match service.get_binding(&wallet) {
            Some(binding) => print_json(&binding),
            None => bail!("wallet {wallet} is not enrolled"),
        },
        Commands::Unenroll { wallet } => match service.unenroll(&wallet)? {
            Some(binding) => print_json(&binding),
            None => bail!("wallet {wallet} is not enrolled"),
        },
        Commands::Audit { wallet } => print_json(&service.audit_commitment(&wallet)?),
        Commands::Stats => print_json(&service.stats()),
    }
}

fn read_embedding(path: &Path) -> Result<Vec<f32>> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read embedding from stdin")?;
        buf
    } else {
        fs::read_to_string(path)
            .with_context(|| format!("failed to read embedding {}", path.display()))?
    };
    serde_json::from_str(&raw).context("embedding must be a JSON array of numbers")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
