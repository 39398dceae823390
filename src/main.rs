//! enrich-skeleton CLI: skeleton-based document round-tripping.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use enrich_skeleton::backconvert::BackConversionInput;
use enrich_skeleton::config::ConverterConfig;
use enrich_skeleton::engine::Converter;
use enrich_skeleton::event::DocumentEvent;

#[derive(Parser)]
#[command(
    name = "enrich-skeleton",
    version,
    about = "Skeleton-based document round-tripping for annotation services"
)]
struct Cli {
    /// Converter configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a parser event stream into skeleton and plain-text contexts.
    Forward {
        /// Path to a JSON array of document events.
        #[arg(long)]
        events: PathBuf,

        /// Source format (extension or MIME type), checked before conversion.
        #[arg(long)]
        format: Option<String>,

        /// Pretty-print the JSON output.
        #[arg(long)]
        pretty: bool,
    },

    /// Rebuild a document from its skeleton context and annotated spans.
    Back {
        /// Path to a JSON back-conversion input.
        #[arg(long)]
        input: PathBuf,
    },

    /// Forward-convert, then back-convert without annotations, and compare.
    Roundtrip {
        /// Path to a JSON array of document events.
        #[arg(long)]
        events: PathBuf,
    },

    /// Write the default configuration as TOML.
    Config {
        /// Destination path.
        #[arg(long)]
        write: PathBuf,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConverterConfig::load(path)?,
        None => ConverterConfig::default(),
    };

    match cli.command {
        Commands::Forward {
            events,
            format,
            pretty,
        } => {
            let converter = Converter::new(config)?;
            if let Some(format) = format {
                let format = converter.check_format(&format)?;
                tracing::info!(%format, "source format accepted");
            }
            let events = read_events(&events)?;
            let forward = converter.forward(&events)?;
            let json = if pretty {
                serde_json::to_string_pretty(&forward)
            } else {
                serde_json::to_string(&forward)
            }
            .into_diagnostic()?;
            println!("{json}");
        }

        Commands::Back { input } => {
            let converter = Converter::new(config)?;
            let content = std::fs::read_to_string(&input).into_diagnostic()?;
            let input: BackConversionInput = serde_json::from_str(&content).into_diagnostic()?;
            let back = converter.back(&input)?;
            for dropped in &back.dropped {
                eprintln!("dropped {} ({})", dropped.span, dropped.reason);
            }
            println!("{}", back.document);
        }

        Commands::Roundtrip { events } => {
            let converter = Converter::new(config)?;
            let events = read_events(&events)?;
            let forward = converter.forward(&events)?;
            let back = converter.back(&forward.to_back_input())?;
            if back.document != forward.skeleton_context {
                miette::bail!(
                    "round trip differs: {} bytes in skeleton, {} bytes rebuilt",
                    forward.skeleton_context.len(),
                    back.document.len()
                );
            }
            println!(
                "Round trip OK: {} units, {} bytes",
                forward.units.len(),
                back.document.len()
            );
        }

        Commands::Config { write } => {
            ConverterConfig::default().save(&write)?;
            println!("Wrote default config to {}", write.display());
        }
    }

    Ok(())
}

fn read_events(path: &Path) -> Result<Vec<DocumentEvent>> {
    let content = std::fs::read_to_string(path).into_diagnostic()?;
    serde_json::from_str(&content).into_diagnostic()
}
