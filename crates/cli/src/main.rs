mod check;
mod context;

use std::path::{Path, PathBuf};
use std::process;

use blockyard_lsp::config::ServerConfig;
use blockyard_lsp::workspace::find_project_root;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Blockyard workspace configuration tooling.
#[derive(Parser)]
#[command(
    name = "blockyard",
    version,
    about = "Blockyard workspace configuration tooling"
)]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Configuration file; defaults to blockyard.toml in the project root
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a workspace document and print its diagnostics
    Check {
        /// Path to the workspace document
        file: PathBuf,
        /// Semantic snapshot JSON to reconcile against, instead of running the oracle
        #[arg(long, conflicts_with = "oracle")]
        snapshot: Option<PathBuf>,
        /// Run the configured validation oracle in the project root
        #[arg(long)]
        oracle: bool,
        /// Narrow the oracle run to one block
        #[arg(long, requires = "oracle")]
        block: Option<String>,
    },

    /// Show the block, action and section at a position
    Context {
        /// Path to the workspace document
        file: PathBuf,
        /// Zero-based line
        #[arg(long)]
        line: usize,
        /// Zero-based character offset within the line
        #[arg(long)]
        character: usize,
    },

    /// Start the Language Server Protocol server over stdio
    Lsp,
}

fn main() {
    // stdout belongs to the LSP protocol and to command output.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "blockyard=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check {
            file,
            snapshot,
            oracle,
            block,
        } => {
            let config = load_config(cli.config.as_deref(), &file, cli.output, cli.quiet);
            check::cmd_check(
                &file,
                check::SnapshotSource::from_flags(snapshot, oracle, block),
                &config,
                cli.output,
                cli.quiet,
            );
        }
        Commands::Context {
            file,
            line,
            character,
        } => {
            let config = load_config(cli.config.as_deref(), &file, cli.output, cli.quiet);
            context::cmd_context(&file, line, character, &config, cli.output, cli.quiet);
        }
        Commands::Lsp => {
            tracing::info!("starting blockyard language server");
            if let Err(e) = blockyard_lsp::run() {
                eprintln!("LSP server error: {}", e);
                process::exit(1);
            }
        }
    }
}

/// `--config` when given, otherwise `blockyard.toml` in the document's
/// project root (or its directory when no root marker is found).
fn load_config(
    explicit: Option<&Path>,
    file: &Path,
    output: OutputFormat,
    quiet: bool,
) -> ServerConfig {
    let loaded = match explicit {
        Some(path) => ServerConfig::load_file(path),
        None => {
            let marker = ServerConfig::default().root_marker;
            let dir = find_project_root(file, &marker)
                .or_else(|| file.parent().map(Path::to_path_buf))
                .unwrap_or_default();
            ServerConfig::discover(&dir)
        }
    };
    match loaded {
        Ok(config) => config,
        Err(e) => {
            report_error(&format!("configuration error: {}", e), output, quiet);
            process::exit(1);
        }
    }
}

pub(crate) fn read_source(file: &Path, output: OutputFormat, quiet: bool) -> String {
    match std::fs::read_to_string(file) {
        Ok(text) => text,
        Err(e) => {
            let msg = format!("error reading file '{}': {}", file.display(), e);
            report_error(&msg, output, quiet);
            process::exit(1);
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
