//! trackhistory - Runs a scripted editing session and reports the resulting
//! undo history.
//!
//! # Usage
//!
//! ```bash
//! trackhistory session.json                      # Print the history report
//! trackhistory --save out.thp session.json       # Also save the project
//! RUST_LOG=trackhistory=debug trackhistory session.json
//! ```
//!
//! The script is a JSON array of commands; see [`trackhistory::script`].

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use trackhistory::script::{self, HistoryReport, ScriptRunner};
use trackhistory::{Config, MemoryBlockStore, Project};

const DEFAULT_CONFIG_PATH: &str = "trackhistory.json";

/// Command-line options for the application.
struct CliOptions {
    /// Script to run.
    script: PathBuf,
    /// Settings file; missing means defaults.
    config: PathBuf,
    /// Where to save the project after the run.
    save: Option<PathBuf>,
}

impl CliOptions {
    /// Parses command-line arguments.
    ///
    /// Supports:
    /// - `--config <path>` or `-c <path>`: Settings file
    /// - `--save <path>` or `-o <path>`: Save the project after the run
    /// - `--help` or `-h`: Print help and exit
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let mut script: Option<PathBuf> = None;
        let mut config = PathBuf::from(DEFAULT_CONFIG_PATH);
        let mut save: Option<PathBuf> = None;
        let mut i = 1;

        while i < args.len() {
            match args[i].as_str() {
                "--config" | "-c" => {
                    i += 1;
                    let Some(path) = args.get(i) else {
                        anyhow::bail!("--config requires a path argument");
                    };
                    config = PathBuf::from(path);
                }
                "--save" | "-o" => {
                    i += 1;
                    let Some(path) = args.get(i) else {
                        anyhow::bail!("--save requires a path argument");
                    };
                    save = Some(PathBuf::from(path));
                }
                "--help" | "-h" => {
                    eprintln!("trackhistory - Scripted track editing with undo history");
                    eprintln!();
                    eprintln!(
                        "Usage: {} [OPTIONS] SCRIPT.json",
                        args.first().map(String::as_str).unwrap_or("trackhistory")
                    );
                    eprintln!();
                    eprintln!("Options:");
                    eprintln!("  -c, --config PATH  Settings file (default: {DEFAULT_CONFIG_PATH})");
                    eprintln!("  -o, --save PATH    Save the project after the run (.json or binary)");
                    eprintln!("  -h, --help         Print this help message");
                    std::process::exit(0);
                }
                other if other.starts_with('-') => {
                    anyhow::bail!("Unknown option: {other}. Use --help for usage information");
                }
                other => {
                    if script.is_some() {
                        anyhow::bail!("Only one script may be given");
                    }
                    script = Some(PathBuf::from(other));
                }
            }
            i += 1;
        }

        let script = script.context("No script given. Use --help for usage information")?;
        Ok(Self {
            script,
            config,
            save,
        })
    }
}

/// Main entry point.
fn main() -> Result<()> {
    let cli = CliOptions::parse()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Config::load(&cli.config)?;
    let json = std::fs::read_to_string(&cli.script)
        .with_context(|| format!("Failed to read script {}", cli.script.display()))?;
    let commands = script::parse(&json)
        .with_context(|| format!("Failed to parse script {}", cli.script.display()))?;

    let name = cli
        .script
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_string());
    let store = Arc::new(MemoryBlockStore::new());
    let mut project = Project::new(name, store.clone(), &config);

    ScriptRunner::new(store)
        .run(&mut project, &commands)
        .context("Script failed")?;

    if let Some(path) = &cli.save {
        project
            .save(path)
            .with_context(|| format!("Failed to save project to {}", path.display()))?;
    }

    let report = HistoryReport::collect(&mut project);
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
