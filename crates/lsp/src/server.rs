//! LSP server main loop with request/notification dispatch.
//!
//! Uses `lsp-server` (synchronous, crossbeam-based) for the transport. The
//! loop itself is single-threaded; only oracle runs go to the tokio runtime,
//! and their outcomes come back through a channel selected next to the
//! connection receiver.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use blockyard_core::{
    reconcile_with, DiagnosticPublisher, DocumentSnapshot, EntityIndex, PublishOutcome,
};
use crossbeam_channel::select;
use lsp_server::{Connection, Message, Notification, Request, Response};
use lsp_types::notification::{
    DidChangeTextDocument, DidCloseTextDocument, DidOpenTextDocument, DidSaveTextDocument,
    Notification as _, PublishDiagnostics,
};
use lsp_types::request::{Completion, DocumentSymbolRequest, GotoDefinition, HoverRequest};
use lsp_types::{
    CompletionOptions, CompletionResponse, DocumentSymbolResponse, GotoDefinitionResponse,
    HoverProviderCapability, OneOf, SaveOptions, ServerCapabilities, TextDocumentSyncCapability,
    TextDocumentSyncKind, TextDocumentSyncOptions, TextDocumentSyncSaveOptions, Uri,
};

use crate::completion;
use crate::config::ServerConfig;
use crate::diagnostics;
use crate::hover;
use crate::navigation;
use crate::oracle::{CommandOracle, DisabledOracle, Oracle};
use crate::scheduler::{Disposition, ValidationOutcome, ValidationScheduler};
use crate::store::DocumentStore;
use crate::workspace::{find_project_root, uri_to_path, workspace_root};

/// Run the LSP server over stdio until shutdown.
pub fn run() -> Result<(), Box<dyn Error>> {
    let (connection, io_threads) = Connection::stdio();
    serve(&connection)?;
    io_threads.join()?;
    Ok(())
}

/// Serve one client on an established connection, from the initialize
/// handshake through shutdown.
pub fn serve(connection: &Connection) -> Result<(), Box<dyn Error>> {
    // ── Initialize handshake ──────────────────────────────────────────
    let init_json = serde_json::to_value(build_capabilities())?;
    let init_params: lsp_types::InitializeParams =
        serde_json::from_value(connection.initialize(init_json)?)?;

    let config = load_config(&init_params);
    tracing::info!(
        oracle = %config.oracle.command,
        enabled = config.oracle.enabled,
        debounce_ms = config.debounce_ms,
        "blockyard language server initialized"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("blockyard-oracle")
        .enable_all()
        .build()?;
    let oracle: Arc<dyn Oracle> = if config.oracle.enabled {
        Arc::new(CommandOracle::new(config.oracle.clone()))
    } else {
        Arc::new(DisabledOracle)
    };
    let scheduler = ValidationScheduler::new(
        runtime.handle().clone(),
        oracle,
        Duration::from_millis(config.debounce_ms),
    );
    let results = scheduler.results().clone();

    let mut server = Server {
        connection,
        store: DocumentStore::new(config.vocabulary.clone()),
        publisher: DiagnosticPublisher::new(),
        scheduler,
        config,
    };

    // ── Main loop ─────────────────────────────────────────────────────
    loop {
        select! {
            recv(connection.receiver) -> msg => {
                let Ok(msg) = msg else { break };
                match msg {
                    Message::Request(req) => {
                        if connection.handle_shutdown(&req)? {
                            break;
                        }
                        server.handle_request(req)?;
                    }
                    Message::Notification(not) => server.handle_notification(not)?,
                    Message::Response(_) => {
                        // We never send requests to the client.
                    }
                }
            }
            recv(results) -> outcome => {
                if let Ok(outcome) = outcome {
                    server.handle_outcome(outcome)?;
                }
            }
        }
    }

    // In-flight oracle processes are killed when their futures drop.
    runtime.shutdown_background();
    tracing::info!("blockyard language server stopped");
    Ok(())
}

/// Defaults, then `blockyard.toml` in the workspace root, then the client's
/// `initializationOptions`. Bad layers are logged and skipped.
fn load_config(params: &lsp_types::InitializeParams) -> ServerConfig {
    let mut config = match workspace_root(params) {
        Some(root) => ServerConfig::discover(&root).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "ignoring workspace configuration");
            ServerConfig::default()
        }),
        None => ServerConfig::default(),
    };
    if let Some(options) = params.initialization_options.clone() {
        match config.overlay_json(options) {
            Ok(merged) => config = merged,
            Err(e) => tracing::warn!(error = %e, "ignoring initializationOptions"),
        }
    }
    config
}

fn build_capabilities() -> ServerCapabilities {
    ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Options(
            TextDocumentSyncOptions {
                open_close: Some(true),
                change: Some(TextDocumentSyncKind::FULL),
                save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                    include_text: Some(false),
                })),
                ..Default::default()
            },
        )),
        definition_provider: Some(OneOf::Left(true)),
        document_symbol_provider: Some(OneOf::Left(true)),
        hover_provider: Some(HoverProviderCapability::Simple(true)),
        completion_provider: Some(CompletionOptions {
            trigger_characters: Some(vec![":".into(), " ".into(), "-".into()]),
            resolve_provider: Some(false),
            ..Default::default()
        }),
        ..Default::default()
    }
}

struct Server<'c> {
    connection: &'c Connection,
    store: DocumentStore,
    publisher: DiagnosticPublisher,
    scheduler: ValidationScheduler,
    config: ServerConfig,
}

impl Server<'_> {
    fn handle_request(&self, req: Request) -> Result<(), Box<dyn Error>> {
        use lsp_types::request::Request as _;

        let resp = if req.method == Completion::METHOD {
            let params: lsp_types::CompletionParams = serde_json::from_value(req.params)?;
            let uri = &params.text_document_position.text_document.uri;
            let position = params.text_document_position.position;
            let items = self.with_document(uri, |doc, _| {
                completion::compute_completions(doc, position, self.store.vocabulary())
            });
            Response::new_ok(req.id, CompletionResponse::Array(items))
        } else if req.method == HoverRequest::METHOD {
            let params: lsp_types::HoverParams = serde_json::from_value(req.params)?;
            let uri = &params.text_document_position_params.text_document.uri;
            let position = params.text_document_position_params.position;
            let result = self.with_document(uri, |doc, _| {
                hover::compute_hover(doc, position, self.store.vocabulary())
            });
            Response::new_ok(req.id, result)
        } else if req.method == GotoDefinition::METHOD {
            let params: lsp_types::GotoDefinitionParams = serde_json::from_value(req.params)?;
            let uri = &params.text_document_position_params.text_document.uri;
            let position = params.text_document_position_params.position;
            let result = self
                .with_document(uri, |doc, index| {
                    navigation::goto_definition(index, doc, uri, position)
                })
                .map(GotoDefinitionResponse::Scalar);
            Response::new_ok(req.id, result)
        } else if req.method == DocumentSymbolRequest::METHOD {
            let params: lsp_types::DocumentSymbolParams = serde_json::from_value(req.params)?;
            let symbols = self.with_document(&params.text_document.uri, |_, index| {
                navigation::document_symbols(index)
            });
            let result: Option<DocumentSymbolResponse> = if symbols.is_empty() {
                None
            } else {
                Some(DocumentSymbolResponse::Nested(symbols))
            };
            Response::new_ok(req.id, result)
        } else {
            Response::new_err(
                req.id,
                lsp_server::ErrorCode::MethodNotFound as i32,
                format!("method not found: {}", req.method),
            )
        };
        self.connection.sender.send(Message::Response(resp))?;
        Ok(())
    }

    /// Run `f` against the open document, or the file on disk when the
    /// editor has not opened it.
    fn with_document<T>(
        &self,
        uri: &Uri,
        f: impl FnOnce(&DocumentSnapshot, &EntityIndex) -> T,
    ) -> T {
        let key = uri.as_str();
        if let (Some(doc), Some(index)) = (self.store.get(key), self.store.index(key)) {
            return f(doc.snapshot(), index);
        }
        let text = std::fs::read_to_string(uri_to_path(uri)).unwrap_or_default();
        let doc = DocumentSnapshot::new(&text, 0);
        let index = EntityIndex::build_with(&doc, self.store.vocabulary());
        f(&doc, &index)
    }

    fn handle_notification(&mut self, not: Notification) -> Result<(), Box<dyn Error>> {
        match not.method.as_str() {
            m if m == DidOpenTextDocument::METHOD => {
                let params: lsp_types::DidOpenTextDocumentParams =
                    serde_json::from_value(not.params)?;
                let uri = params.text_document.uri.as_str();
                let path = uri_to_path(&params.text_document.uri);
                let root = find_project_root(&path, &self.config.root_marker);
                if root.is_none() {
                    tracing::info!(uri, marker = %self.config.root_marker, "no project root found");
                }
                let revision = self.store.open(
                    uri,
                    path,
                    params.text_document.version,
                    &params.text_document.text,
                    root.clone(),
                );
                self.scheduler.schedule(uri, revision, root);
            }
            m if m == DidChangeTextDocument::METHOD => {
                let params: lsp_types::DidChangeTextDocumentParams =
                    serde_json::from_value(not.params)?;
                let uri = params.text_document.uri.as_str();
                // FULL sync: last content change has the entire document
                let Some(change) = params.content_changes.into_iter().last() else {
                    return Ok(());
                };
                if let Some(revision) =
                    self.store
                        .change(uri, params.text_document.version, &change.text)
                {
                    let root = self.store.get(uri).and_then(|d| d.root.clone());
                    self.scheduler.schedule(uri, revision, root);
                }
            }
            m if m == DidSaveTextDocument::METHOD => {
                // The oracle reads from disk, so a save is worth another run
                // even when the text did not change.
                let params: lsp_types::DidSaveTextDocumentParams =
                    serde_json::from_value(not.params)?;
                let uri = params.text_document.uri.as_str();
                if let Some(doc) = self.store.get(uri) {
                    let (revision, root) = (doc.revision(), doc.root.clone());
                    self.scheduler.schedule(uri, revision, root);
                }
            }
            m if m == DidCloseTextDocument::METHOD => {
                let params: lsp_types::DidCloseTextDocumentParams =
                    serde_json::from_value(not.params)?;
                let uri = params.text_document.uri.as_str();
                self.store.close(uri);
                self.scheduler.forget(uri);
                self.publisher.close(uri);
                // Clear diagnostics for closed file
                self.send_diagnostics(params.text_document.uri, &[], None)?;
            }
            _ => {
                // Unknown notification -- ignore
            }
        }
        Ok(())
    }

    /// Reconcile and publish once a validation job for an open document
    /// finishes. Outcomes for older revisions are dropped.
    fn handle_outcome(&mut self, outcome: ValidationOutcome) -> Result<(), Box<dyn Error>> {
        if self.scheduler.complete(&outcome) == Disposition::Stale {
            return Ok(());
        }
        let (Some(doc), Some(index)) = (
            self.store.get(&outcome.uri),
            self.store.index(&outcome.uri),
        ) else {
            return Ok(());
        };
        if doc.revision() != outcome.revision {
            return Ok(());
        }

        let anomalies = reconcile_with(index, outcome.snapshot(), self.store.vocabulary());
        match self
            .publisher
            .publish(&outcome.uri, outcome.revision, &anomalies, index)
        {
            PublishOutcome::Replaced(published) => {
                tracing::debug!(
                    uri = %outcome.uri,
                    revision = outcome.revision,
                    count = published.len(),
                    "publishing diagnostics"
                );
                let Ok(uri) = outcome.uri.parse::<Uri>() else {
                    return Ok(());
                };
                let version = Some(doc.version);
                self.send_diagnostics(uri, &published, version)?;
            }
            PublishOutcome::Stale { current } => {
                tracing::debug!(uri = %outcome.uri, revision = outcome.revision, current, "publisher already ahead");
            }
        }
        Ok(())
    }

    /// Send `textDocument/publishDiagnostics` notification to the client.
    fn send_diagnostics(
        &self,
        uri: Uri,
        published: &[blockyard_core::Diagnostic],
        version: Option<i32>,
    ) -> Result<(), Box<dyn Error>> {
        let params = diagnostics::publish_params(uri, published, version);
        let not = Notification::new(PublishDiagnostics::METHOD.to_string(), params);
        self.connection.sender.send(Message::Notification(not))?;
        Ok(())
    }
}
