//! Blockyard Language Server Protocol implementation for IDE integration.
//!
//! Publishes diagnostics correlated from the external validation tool and
//! the raw-text rules, and answers completion, hover, document symbol and
//! go-to-definition requests from the structural engine in
//! `blockyard-core`. Connects to editors via the `blockyard lsp` CLI
//! subcommand over stdio.

pub mod completion;
pub mod config;
pub mod diagnostics;
pub mod hover;
pub mod navigation;
pub mod oracle;
pub mod scheduler;
pub mod server;
pub mod store;
pub mod workspace;

/// Run the LSP server over stdio. This is the public entry point
/// called by `blockyard lsp`.
pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    server::run()
}
