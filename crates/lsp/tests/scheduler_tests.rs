//! Validation scheduler behavior with a scripted oracle: debounce,
//! coalescing, stale discard and fallback when the oracle fails.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use blockyard_core::{reconcile, AnomalyCode, DocumentSnapshot, SemanticValue, Severity};
use blockyard_lsp::oracle::{Oracle, OracleError};
use blockyard_lsp::scheduler::{
    Disposition, ValidationOutcome, ValidationResult, ValidationScheduler,
};
use serde_json::json;
use tokio::sync::Semaphore;

const URI: &str = "file:///ws/workspace.yaml";

#[derive(Default)]
struct ScriptedOracle {
    calls: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
    /// When set, each evaluation waits for a permit.
    gate: Option<Arc<Semaphore>>,
    fail: bool,
}

#[async_trait]
impl Oracle for ScriptedOracle {
    async fn evaluate(
        &self,
        _root: &Path,
        _entity: Option<&str>,
    ) -> Result<SemanticValue, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            permit.map_err(|_| OracleError::Empty)?.forget();
        } else {
            self.running.fetch_sub(1, Ordering::SeqCst);
        }
        if self.fail {
            return Err(OracleError::Missing {
                command: "blocks".to_string(),
            });
        }
        Ok(SemanticValue::from(
            json!({ "name": "platform", "kind": "workspace" }),
        ))
    }
}

fn root() -> Option<PathBuf> {
    Some(PathBuf::from("/ws"))
}

fn next(scheduler: &ValidationScheduler) -> ValidationOutcome {
    scheduler
        .results()
        .recv_timeout(Duration::from_secs(5))
        .expect("validation outcome")
}

fn wait_for_calls(oracle: &ScriptedOracle, n: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while oracle.calls.load(Ordering::SeqCst) < n {
        assert!(Instant::now() < deadline, "oracle never called");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn rapid_edits_run_the_oracle_once_for_the_newest_revision() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let oracle = Arc::new(ScriptedOracle::default());
    let mut scheduler = ValidationScheduler::new(
        runtime.handle().clone(),
        oracle.clone(),
        Duration::from_millis(50),
    );

    scheduler.schedule(URI, 1, root());
    scheduler.schedule(URI, 2, root());
    scheduler.schedule(URI, 3, root());

    let first = next(&scheduler);
    assert_eq!(first.revision, 1);
    assert!(matches!(first.result, ValidationResult::Superseded));
    assert_eq!(scheduler.complete(&first), Disposition::Stale);

    let second = next(&scheduler);
    assert_eq!(second.revision, 3);
    assert!(second.snapshot().is_some());
    assert_eq!(scheduler.complete(&second), Disposition::Current);
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn result_for_an_outdated_revision_is_stale_and_followed_up() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let oracle = Arc::new(ScriptedOracle {
        gate: Some(gate.clone()),
        ..Default::default()
    });
    let mut scheduler =
        ValidationScheduler::new(runtime.handle().clone(), oracle.clone(), Duration::ZERO);

    scheduler.schedule(URI, 1, root());
    wait_for_calls(&oracle, 1);
    // Arrives while revision 1 is still being evaluated.
    scheduler.schedule(URI, 2, root());
    gate.add_permits(2);

    let late = next(&scheduler);
    assert_eq!(late.revision, 1);
    assert!(late.snapshot().is_some());
    assert_eq!(scheduler.complete(&late), Disposition::Stale);

    let fresh = next(&scheduler);
    assert_eq!(fresh.revision, 2);
    assert_eq!(scheduler.complete(&fresh), Disposition::Current);
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn oracle_failure_leads_to_fallback_rules() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let oracle = Arc::new(ScriptedOracle {
        fail: true,
        ..Default::default()
    });
    let mut scheduler =
        ValidationScheduler::new(runtime.handle().clone(), oracle, Duration::ZERO);

    scheduler.schedule(URI, 7, root());
    let outcome = next(&scheduler);
    assert!(matches!(
        outcome.result,
        ValidationResult::Unavailable(OracleError::Missing { .. })
    ));
    assert_eq!(scheduler.complete(&outcome), Disposition::Current);

    let doc = DocumentSnapshot::new("kind: workspace\nblocks:\n  - name: a\n", 7);
    let anomalies = reconcile(&doc, outcome.snapshot());
    let errors: Vec<_> = anomalies
        .iter()
        .filter(|a| a.severity == Severity::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, AnomalyCode::MissingField);
}

#[test]
fn document_without_root_never_reaches_the_oracle() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let oracle = Arc::new(ScriptedOracle::default());
    let mut scheduler =
        ValidationScheduler::new(runtime.handle().clone(), oracle.clone(), Duration::ZERO);

    scheduler.schedule(URI, 1, None);
    let outcome = next(&scheduler);
    assert!(matches!(
        outcome.result,
        ValidationResult::Unavailable(OracleError::NoProjectRoot)
    ));
    assert_eq!(scheduler.complete(&outcome), Disposition::Current);
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
}

#[test]
fn outcome_after_close_is_stale() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let oracle = Arc::new(ScriptedOracle::default());
    let mut scheduler =
        ValidationScheduler::new(runtime.handle().clone(), oracle, Duration::from_millis(20));

    scheduler.schedule(URI, 1, root());
    scheduler.forget(URI);
    let outcome = next(&scheduler);
    assert_eq!(scheduler.complete(&outcome), Disposition::Stale);
}

#[test]
fn reopen_during_a_running_call_waits_for_it() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let oracle = Arc::new(ScriptedOracle {
        gate: Some(gate.clone()),
        ..Default::default()
    });
    let mut scheduler =
        ValidationScheduler::new(runtime.handle().clone(), oracle.clone(), Duration::ZERO);

    scheduler.schedule(URI, 1, root());
    wait_for_calls(&oracle, 1);
    scheduler.forget(URI);
    scheduler.schedule(URI, 2, root());
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);

    gate.add_permits(2);
    let closed = next(&scheduler);
    assert_eq!(closed.revision, 1);
    assert_eq!(scheduler.complete(&closed), Disposition::Stale);

    let reopened = next(&scheduler);
    assert_eq!(reopened.revision, 2);
    assert_eq!(scheduler.complete(&reopened), Disposition::Current);
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    assert_eq!(oracle.max_running.load(Ordering::SeqCst), 1);
}

#[test]
fn close_during_a_running_call_drops_the_entry_once_it_reports() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let gate = Arc::new(Semaphore::new(0));
    let oracle = Arc::new(ScriptedOracle {
        gate: Some(gate.clone()),
        ..Default::default()
    });
    let mut scheduler =
        ValidationScheduler::new(runtime.handle().clone(), oracle.clone(), Duration::ZERO);

    scheduler.schedule(URI, 1, root());
    wait_for_calls(&oracle, 1);
    scheduler.forget(URI);
    gate.add_permits(1);
    let outcome = next(&scheduler);
    assert_eq!(scheduler.complete(&outcome), Disposition::Stale);

    // A fresh open starts immediately.
    gate.add_permits(1);
    scheduler.schedule(URI, 2, root());
    let outcome = next(&scheduler);
    assert_eq!(outcome.revision, 2);
    assert_eq!(scheduler.complete(&outcome), Disposition::Current);
}

#[test]
fn documents_are_scheduled_independently() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let oracle = Arc::new(ScriptedOracle::default());
    let mut scheduler =
        ValidationScheduler::new(runtime.handle().clone(), oracle.clone(), Duration::ZERO);

    scheduler.schedule("file:///a/workspace.yaml", 1, root());
    scheduler.schedule("file:///b/workspace.yaml", 2, root());

    let mut current = 0;
    for _ in 0..2 {
        let outcome = next(&scheduler);
        if scheduler.complete(&outcome) == Disposition::Current {
            current += 1;
        }
    }
    assert_eq!(current, 2);
    assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
}
