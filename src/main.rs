//! Problem archive CLI
//!
//! Entry point for the `noj-archive` command-line tool.

use clap::{Parser, Subcommand};
use noj_problem_archive::manifest::{BatchManifest, MANIFEST_FILE};
use noj_problem_archive::{verify_archive, ArchiveConfig, Container, EffectiveConfig};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "noj-archive")]
#[command(about = "Inspect and verify problem archives", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the manifest summary of an archive
    Inspect {
        archive: PathBuf,

        /// Folder of one problem inside a batch archive
        #[arg(long)]
        prefix: Option<String>,

        /// Print the raw manifest as JSON
        #[arg(long)]
        json: bool,
    },

    /// Verify every file digest and the content hash of an archive
    Verify {
        archive: PathBuf,

        #[arg(long)]
        prefix: Option<String>,

        /// Path to a TOML config file
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },

    /// Print the effective configuration
    Config {
        #[arg(long, short = 'c')]
        config: Option<PathBuf>,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect { archive, prefix, json } => {
            run_inspect(&archive, prefix.as_deref().unwrap_or(""), json);
        }
        Commands::Verify { archive, prefix, config } => {
            run_verify(&archive, prefix.as_deref().unwrap_or(""), config);
        }
        Commands::Config { config } => {
            run_config(config);
        }
    }
}

fn load_config(path: Option<&Path>) -> EffectiveConfig {
    match EffectiveConfig::from_env(path, None) {
        Ok(effective) => effective,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            process::exit(1);
        }
    }
}

fn open_container(path: &Path, config: &ArchiveConfig) -> Container<File> {
    debug!(path = %path.display(), "opening archive");
    match Container::open_path(path, &config.limits) {
        Ok(container) => container,
        Err(e) => {
            error!(kind = %e.kind(), "archive rejected");
            eprintln!("Archive rejected: {}", e);
            process::exit(2);
        }
    }
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}

fn run_inspect(path: &Path, prefix: &str, json: bool) {
    let config = load_config(None).config;
    let mut container = open_container(path, &config);
    let prefix = match prefix.trim_matches('/') {
        "" => String::new(),
        folder => format!("{}/", folder),
    };

    let root = match container.read_json::<serde_json::Value>(&format!("{}{}", prefix, MANIFEST_FILE)) {
        Ok(value) => value,
        Err(e) => {
            eprintln!("Cannot read manifest: {}", e);
            process::exit(1);
        }
    };

    if BatchManifest::looks_like_batch(&root) {
        let batch: BatchManifest = match serde_json::from_value(root) {
            Ok(batch) => batch,
            Err(e) => {
                eprintln!("Malformed batch manifest: {}", e);
                process::exit(1);
            }
        };
        if json {
            print_json(&batch);
            return;
        }
        println!("Batch archive exported by {} at {}", batch.exported_by, batch.exported_at);
        println!("  Problems: {}", batch.problem_count);
        for entry in &batch.problems {
            println!(
                "    {} {} ({})",
                entry.folder.as_deref().unwrap_or("<no folder>"),
                entry.name.as_deref().unwrap_or(""),
                entry.problem_content_hash.as_deref().unwrap_or("-"),
            );
        }
        for failure in &batch.failed {
            println!("  Failed: problem {}: {}", failure.problem_id, failure.reason);
        }
        return;
    }

    let (manifest, meta) = match container.load_problem(&prefix) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Cannot read problem: {}", e);
            process::exit(1);
        }
    };
    if json {
        print_json(&manifest);
        return;
    }

    println!("Problem: {}", meta.problem_name.as_deref().unwrap_or("<unnamed>"));
    println!("  Format: {}", manifest.format_version);
    println!("  Exported by {} at {}", manifest.exported_by, manifest.exported_at);
    if let Some(source) = &manifest.source_system {
        println!("  Source: {}", source);
    }
    println!("  Content hash: {}", manifest.problem_content_hash);
    for (id, entry) in &manifest.components {
        let mark = if entry.included { "+" } else { "-" };
        println!("  {} {} ({} files)", mark, id, entry.files.len());
    }
    println!("  Files: {}", manifest.files.len());
    if !manifest.redactions.is_empty() {
        println!("  Redacted: {}", manifest.redactions.join(", "));
    }
}

fn run_verify(path: &Path, prefix: &str, config_path: Option<PathBuf>) {
    let config = load_config(config_path.as_deref()).config;
    let mut container = open_container(path, &config);

    match verify_archive(&mut container, prefix, config.chunk_size) {
        Ok(report) => {
            println!("Archive verified: {}", path.display());
            for problem in &report.problems {
                let folder = if problem.folder.is_empty() { "." } else { problem.folder.as_str() };
                println!(
                    "  {} {} ({} files, {} bytes)",
                    folder, problem.problem_content_hash, problem.files, problem.bytes
                );
            }
            if report.failed > 0 {
                println!("  Problems the exporter could not include: {}", report.failed);
            }
        }
        Err(e) => {
            error!(kind = %e.kind(), "verification failed");
            eprintln!("Verification failed: {}", e);
            process::exit(1);
        }
    }
}

fn run_config(config_path: Option<PathBuf>) {
    let effective = load_config(config_path.as_deref());
    match effective.to_json() {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error serializing output: {}", e);
            process::exit(1);
        }
    }
}
