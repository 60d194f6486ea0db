//! Background validation with debounce, coalescing and stale discard.
//!
//! Jobs run on a tokio runtime; outcomes come back over a crossbeam channel
//! that the synchronous server loop selects on next to the LSP connection.
//!
//! Per document at most one job is in flight. Edits that arrive while a job
//! runs only mark the document dirty; when the job completes a single
//! follow-up is spawned for the newest revision. A job that wakes from its
//! debounce sleep to find a newer revision returns without running the
//! oracle.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use blockyard_core::SemanticValue;
use crossbeam_channel::{Receiver, Sender};
use tokio::runtime::Handle;

use crate::oracle::{Oracle, OracleError};

#[derive(Debug)]
pub enum ValidationResult {
    Snapshot(SemanticValue),
    Unavailable(OracleError),
    /// A newer revision arrived during the debounce; the oracle was not run.
    Superseded,
}

#[derive(Debug)]
pub struct ValidationOutcome {
    pub uri: String,
    pub revision: u64,
    pub result: ValidationResult,
}

impl ValidationOutcome {
    /// The snapshot, or `None` when the rules must run without one.
    pub fn snapshot(&self) -> Option<&SemanticValue> {
        match &self.result {
            ValidationResult::Snapshot(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The outcome belongs to the document's newest revision.
    Current,
    /// Superseded, outdated or for a closed document. Discard it.
    Stale,
}

struct Tracked {
    latest: Arc<AtomicU64>,
    root: Option<PathBuf>,
    in_flight: bool,
    dirty: bool,
    /// Cleared by `forget`; a closed entry lingers only while its job runs.
    open: bool,
}

pub struct ValidationScheduler {
    runtime: Handle,
    oracle: Arc<dyn Oracle>,
    debounce: Duration,
    documents: HashMap<String, Tracked>,
    sender: Sender<ValidationOutcome>,
    receiver: Receiver<ValidationOutcome>,
}

impl ValidationScheduler {
    pub fn new(runtime: Handle, oracle: Arc<dyn Oracle>, debounce: Duration) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            runtime,
            oracle,
            debounce,
            documents: HashMap::new(),
            sender,
            receiver,
        }
    }

    /// Completed jobs. Pass every message to [`complete`](Self::complete).
    pub fn results(&self) -> &Receiver<ValidationOutcome> {
        &self.receiver
    }

    /// Request validation of `revision`. Older requests for the same
    /// document are superseded.
    pub fn schedule(&mut self, uri: &str, revision: u64, root: Option<PathBuf>) {
        let tracked = self
            .documents
            .entry(uri.to_owned())
            .or_insert_with(|| Tracked {
                latest: Arc::new(AtomicU64::new(revision)),
                root: None,
                in_flight: false,
                dirty: false,
                open: true,
            });
        tracked.open = true;
        tracked.latest.store(revision, Ordering::SeqCst);
        tracked.root = root;
        if tracked.in_flight {
            tracing::trace!(uri, revision, "validation in flight, coalescing");
            tracked.dirty = true;
        } else {
            self.spawn(uri, revision);
        }
    }

    /// Record that a job finished and classify its outcome.
    ///
    /// Spawns the follow-up job when edits arrived while it ran.
    pub fn complete(&mut self, outcome: &ValidationOutcome) -> Disposition {
        let Some(tracked) = self.documents.get_mut(&outcome.uri) else {
            tracing::debug!(uri = %outcome.uri, "discarding result for closed document");
            return Disposition::Stale;
        };
        tracked.in_flight = false;
        if !tracked.open {
            self.documents.remove(&outcome.uri);
            tracing::debug!(uri = %outcome.uri, "discarding result for closed document");
            return Disposition::Stale;
        }
        let latest = tracked.latest.load(Ordering::SeqCst);
        if tracked.dirty {
            tracked.dirty = false;
            self.spawn(&outcome.uri, latest);
        }

        let superseded = matches!(outcome.result, ValidationResult::Superseded);
        if superseded || outcome.revision != latest {
            tracing::debug!(
                uri = %outcome.uri,
                revision = outcome.revision,
                latest,
                "discarding stale validation result"
            );
            Disposition::Stale
        } else {
            Disposition::Current
        }
    }

    /// Stop tracking a closed document. Late outcomes for it become stale.
    ///
    /// A running job keeps the entry alive until it reports back, so a
    /// reopen in the meantime waits for it instead of starting a second one.
    pub fn forget(&mut self, uri: &str) {
        let Some(tracked) = self.documents.get_mut(uri) else {
            return;
        };
        if tracked.in_flight {
            tracked.open = false;
            tracked.dirty = false;
            // Revisions start at 1, so a job still in its debounce skips the oracle.
            tracked.latest.store(0, Ordering::SeqCst);
        } else {
            self.documents.remove(uri);
        }
    }

    fn spawn(&mut self, uri: &str, revision: u64) {
        let Some(tracked) = self.documents.get_mut(uri) else {
            return;
        };
        tracked.in_flight = true;

        let latest = Arc::clone(&tracked.latest);
        let root = tracked.root.clone();
        let oracle = Arc::clone(&self.oracle);
        let sender = self.sender.clone();
        let debounce = self.debounce;
        let uri = uri.to_owned();

        self.runtime.spawn(async move {
            if !debounce.is_zero() {
                tokio::time::sleep(debounce).await;
            }
            let result = if latest.load(Ordering::SeqCst) != revision {
                ValidationResult::Superseded
            } else {
                match root {
                    None => ValidationResult::Unavailable(OracleError::NoProjectRoot),
                    Some(root) => match oracle.evaluate(&root, None).await {
                        Ok(value) => ValidationResult::Snapshot(value),
                        Err(err) => {
                            tracing::info!(uri = %uri, error = %err, "oracle unavailable, using fallback rules");
                            ValidationResult::Unavailable(err)
                        }
                    },
                }
            };
            // The receiver lives as long as the server loop.
            let _ = sender.send(ValidationOutcome {
                uri,
                revision,
                result,
            });
        });
    }
}
