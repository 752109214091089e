use std::collections::HashMap;
use std::fs;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use codeask_analyze::{
    AiClient, AnalysisError, AnalysisOrchestrator, AnalysisStore, AnalyzerConfig,
    ChannelProgress, FileStatus, FixedClock, ProgressEvent, ProgressSink, ProviderError,
    SourceFile, SummaryStatus,
};
use codeask_core::{BoxFuture, ChatMessage, templates};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

type Behaviour = dyn Fn(&str, u32) -> Result<String, ProviderError> + Send + Sync;

/// AI client answering from a script, counting calls per path.
struct StubClient {
    behaviour: Box<Behaviour>,
    latency: Duration,
    calls: Mutex<HashMap<String, u32>>,
    summary_calls: AtomicU32,
    summary_fails: AtomicBool,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl StubClient {
    fn new() -> Self {
        Self::with_behaviour(|path, _| Ok(format!("analysis of {path}")))
    }

    fn with_behaviour(
        behaviour: impl Fn(&str, u32) -> Result<String, ProviderError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            behaviour: Box::new(behaviour),
            latency: Duration::ZERO,
            calls: Mutex::new(HashMap::new()),
            summary_calls: AtomicU32::new(0),
            summary_fails: AtomicBool::new(false),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    fn latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn calls_for(&self, path: &str) -> u32 {
        self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    fn file_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }

    fn summary_calls(&self) -> u32 {
        self.summary_calls.load(Ordering::SeqCst)
    }

    fn respond(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        if messages[0].content == templates::SUMMARY_PROMPT {
            let n = self.summary_calls.fetch_add(1, Ordering::SeqCst);
            if self.summary_fails.load(Ordering::SeqCst) {
                return Err(ProviderError::InvalidRequest {
                    message: "context too long".into(),
                });
            }
            return Ok(format!("summary #{n}"));
        }

        let path = messages[1]
            .content
            .strip_prefix("File: ")
            .and_then(|rest| rest.split('\n').next())
            .unwrap()
            .to_string();
        let index = {
            let mut calls = self.calls.lock().unwrap();
            let count = calls.entry(path.clone()).or_insert(0);
            *count += 1;
            *count - 1
        };
        (self.behaviour)(&path, index)
    }
}

impl AiClient for StubClient {
    fn name(&self) -> &str {
        "stub"
    }

    fn complete<'a>(
        &'a self,
        messages: &'a [ChatMessage],
    ) -> BoxFuture<'a, Result<String, ProviderError>> {
        Box::pin(async move {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            let result = self.respond(messages);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }
}

fn config(concurrency: usize) -> AnalyzerConfig {
    AnalyzerConfig::builder()
        .concurrency(concurrency)
        .base_delay(Duration::from_millis(1))
        .max_delay(Duration::from_millis(10))
        .request_timeout(Duration::from_secs(5))
        .build()
        .unwrap()
}

fn files(paths: &[&str]) -> Vec<SourceFile> {
    paths
        .iter()
        .map(|p| SourceFile::new(*p, format!("# contents of {p}")))
        .collect()
}

fn orchestrator(
    client: &Arc<StubClient>,
    temp: &TempDir,
    config: AnalyzerConfig,
) -> AnalysisOrchestrator {
    let client: Arc<dyn AiClient> = client.clone();
    AnalysisOrchestrator::new(client, AnalysisStore::for_root(temp.path()), config)
}

#[tokio::test]
async fn test_unchanged_files_are_not_reanalyzed() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(StubClient::new());
    let orch = orchestrator(&client, &temp, config(4));

    let first = orch.run(files(&["a.py", "b.py"]), true).await.unwrap();
    assert_eq!(first.analyzed, 2);
    assert_eq!(first.summary, SummaryStatus::Succeeded);
    assert_eq!(client.file_calls(), 2);
    assert_eq!(client.summary_calls(), 1);

    let second = orch.run(files(&["a.py", "b.py"]), true).await.unwrap();
    assert_eq!(second.analyzed, 0);
    assert_eq!(second.cached, 2);
    assert_eq!(client.file_calls(), 2);
    assert_eq!(client.summary_calls(), 1);
    assert_eq!(
        second.state.get("a.py").unwrap().analysis_text,
        "analysis of a.py"
    );
    assert_eq!(second.state.summary_text.as_deref(), Some("summary #0"));
}

#[tokio::test]
async fn test_changed_file_gets_exactly_one_job() {
    for concurrency in [1, 8] {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(StubClient::new());
        let orch = orchestrator(&client, &temp, config(concurrency));

        orch.run(files(&["a.py", "b.py", "c.py"]), true).await.unwrap();

        let mut changed = files(&["a.py", "b.py", "c.py"]);
        changed[1] = SourceFile::new("b.py", "# edited");
        let report = orch.run(changed, true).await.unwrap();

        assert_eq!(report.analyzed, 1);
        assert_eq!(client.calls_for("a.py"), 1);
        assert_eq!(client.calls_for("b.py"), 2);
        assert_eq!(client.calls_for("c.py"), 1);
    }
}

#[tokio::test]
async fn test_full_run_reanalyzes_everything() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(StubClient::new());
    let orch = orchestrator(&client, &temp, config(2));

    orch.run(files(&["a.py", "b.py"]), true).await.unwrap();
    let report = orch.run(files(&["a.py", "b.py"]), false).await.unwrap();

    assert_eq!(report.analyzed, 2);
    assert_eq!(report.cached, 0);
    assert_eq!(client.file_calls(), 4);
}

#[tokio::test]
async fn test_transient_failures_then_success_wait_for_backoff() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(StubClient::with_behaviour(|path, attempt| {
        if attempt < 2 {
            Err(ProviderError::Server {
                status: 503,
                message: "overloaded".into(),
            })
        } else {
            Ok(format!("analysis of {path}"))
        }
    }));
    let config = AnalyzerConfig::builder()
        .concurrency(1usize)
        .base_delay(Duration::from_millis(30))
        .max_delay(Duration::from_secs(1))
        .build()
        .unwrap();
    let orch = orchestrator(&client, &temp, config);

    let start = Instant::now();
    let report = orch.run(files(&["flaky.py"]), true).await.unwrap();

    assert!(start.elapsed() >= Duration::from_millis(90));
    let record = report.state.get("flaky.py").unwrap();
    assert_eq!(record.status, FileStatus::Succeeded);
    assert_eq!(record.last_attempt_count, 3);
    assert_eq!(client.calls_for("flaky.py"), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_failing_file_does_not_block_others() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(
        StubClient::with_behaviour(|path, _| {
            if path == "bad.py" {
                Err(ProviderError::Authentication {
                    message: "invalid key".into(),
                })
            } else {
                Ok(format!("analysis of {path}"))
            }
        })
        .latency(Duration::from_millis(100)),
    );
    let orch = orchestrator(&client, &temp, config(4));

    let start = Instant::now();
    let report = orch
        .run(files(&["a.py", "bad.py", "c.py", "d.py"]), true)
        .await
        .unwrap();
    let elapsed = start.elapsed();

    // Four files in parallel plus one summary call, not five sequential calls
    assert!(elapsed < Duration::from_millis(450), "took {elapsed:?}");
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 1);

    let bad = report.state.get("bad.py").unwrap();
    assert_eq!(bad.status, FileStatus::Failed);
    assert_eq!(bad.last_attempt_count, 1);
    assert!(bad.last_error.as_deref().unwrap().contains("invalid key"));
    assert_eq!(report.summary, SummaryStatus::Succeeded);
}

#[tokio::test]
async fn test_removed_files_are_pruned() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(StubClient::new());
    let orch = orchestrator(&client, &temp, config(4));

    orch.run(files(&["a", "b", "c"]), true).await.unwrap();
    let report = orch.run(files(&["a", "c"]), true).await.unwrap();

    assert_eq!(report.pruned, vec!["b".to_string()]);
    let keys: Vec<&str> = report.state.files.keys().map(String::as_str).collect();
    assert_eq!(keys, vec!["a", "c"]);

    let stored = orch.store().load();
    assert!(stored.get("b").is_none());
    // Pruning changes the summary input
    assert_eq!(client.summary_calls(), 2);
}

#[tokio::test]
async fn test_full_runs_are_idempotent() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(StubClient::new());
    let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()));
    let orch = orchestrator(&client, &temp, config(3)).with_clock(clock);

    orch.run(files(&["x.py", "y.py", "z.py"]), false).await.unwrap();
    let first = fs::read(orch.store().path()).unwrap();

    client.summary_calls.store(0, Ordering::SeqCst);
    orch.run(files(&["x.py", "y.py", "z.py"]), false).await.unwrap();
    let second = fs::read(orch.store().path()).unwrap();

    assert_eq!(first, second);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_worker_pool_bounds_concurrency() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(StubClient::new().latency(Duration::from_millis(20)));
    let orch = orchestrator(&client, &temp, config(3));

    let paths: Vec<String> = (0..12).map(|i| format!("f{i:02}.py")).collect();
    let paths: Vec<&str> = paths.iter().map(String::as_str).collect();
    let report = orch.run(files(&paths), true).await.unwrap();

    assert_eq!(report.succeeded, 12);
    assert_eq!(client.peak.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_summary_skipped_when_nothing_succeeds() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(StubClient::with_behaviour(|_, _| {
        Err(ProviderError::InvalidRequest {
            message: "nope".into(),
        })
    }));
    let orch = orchestrator(&client, &temp, config(2));

    let report = orch.run(files(&["a.py", "b.py"]), true).await.unwrap();

    assert_eq!(report.failed, 2);
    assert_eq!(client.summary_calls(), 0);
    assert_eq!(report.summary, SummaryStatus::Skipped);
    assert!(report.state.summary_text.is_none());
}

#[tokio::test]
async fn test_summary_failure_keeps_file_results_and_old_summary() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(StubClient::new());
    let orch = orchestrator(&client, &temp, config(2));

    orch.run(files(&["a.py"]), true).await.unwrap();

    client.summary_fails.store(true, Ordering::SeqCst);
    let report = orch.run(files(&["a.py", "b.py"]), true).await.unwrap();

    assert_eq!(report.summary, SummaryStatus::Failed);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.state.summary_text.as_deref(), Some("summary #0"));
    assert!(report.state.summary_error.is_some());
    assert!(report.state.get("b.py").unwrap().is_succeeded());
}

#[tokio::test]
async fn test_failed_file_keeps_previous_analysis_and_is_retried_next_run() {
    let temp = TempDir::new().unwrap();
    let fail = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&fail);
    let client = Arc::new(StubClient::with_behaviour(move |path, attempt| {
        if flag.load(Ordering::SeqCst) {
            Err(ProviderError::network("connection reset"))
        } else {
            Ok(format!("analysis {attempt} of {path}"))
        }
    }));
    let orch = orchestrator(&client, &temp, config(1));

    let original = SourceFile::new("a.py", "v1");
    let edited = SourceFile::new("a.py", "v2");

    orch.run(vec![original.clone()], true).await.unwrap();

    fail.store(true, Ordering::SeqCst);
    let report = orch.run(vec![edited.clone()], true).await.unwrap();
    let record = report.state.get("a.py").unwrap();
    assert_eq!(record.status, FileStatus::Failed);
    assert_eq!(record.last_attempt_count, 3);
    assert_eq!(record.analysis_text, "analysis 0 of a.py");
    assert_eq!(record.content_hash, Some(original.content_hash()));

    fail.store(false, Ordering::SeqCst);
    let report = orch.run(vec![edited.clone()], true).await.unwrap();
    let record = report.state.get("a.py").unwrap();
    assert_eq!(report.analyzed, 1);
    assert!(record.is_succeeded());
    assert_eq!(record.content_hash, Some(edited.content_hash()));
}

#[tokio::test]
async fn test_prompt_change_forces_full_run() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(StubClient::new());

    orchestrator(&client, &temp, config(2))
        .run(files(&["a.py", "b.py"]), true)
        .await
        .unwrap();

    let mut changed = config(2);
    changed.single_file_prompt = "Review this file briefly.".to_string();
    let report = orchestrator(&client, &temp, changed)
        .run(files(&["a.py", "b.py"]), true)
        .await
        .unwrap();

    assert_eq!(report.analyzed, 2);
    assert_eq!(client.file_calls(), 4);
}

#[tokio::test]
async fn test_empty_and_wrapped_responses() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(StubClient::with_behaviour(|_, attempt| {
        if attempt == 0 {
            Ok("```markdown\n```".to_string())
        } else {
            Ok("<think></think>```markdown\n# Report\n```".to_string())
        }
    }));
    let orch = orchestrator(&client, &temp, config(1));

    let report = orch.run(files(&["a.py"]), true).await.unwrap();
    let record = report.state.get("a.py").unwrap();

    assert_eq!(record.analysis_text, "# Report");
    assert_eq!(record.last_attempt_count, 2);
}

#[tokio::test]
async fn test_storage_failure_aborts_run() {
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("not-a-dir");
    fs::write(&blocker, b"x").unwrap();

    let client: Arc<dyn AiClient> = Arc::new(StubClient::new());
    let orch = AnalysisOrchestrator::new(
        client,
        AnalysisStore::new(blocker.join(".codeaskdata")),
        config(2),
    );

    let result = orch.run(files(&["a.py"]), true).await;
    assert!(matches!(result, Err(AnalysisError::Storage(_))));
}

#[tokio::test]
async fn test_cancelled_run_leaves_unstarted_files_pending() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(StubClient::new());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let orch = orchestrator(&client, &temp, config(2)).with_cancellation(cancel);

    let report = orch.run(files(&["a.py", "b.py"]), true).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.succeeded, 0);
    assert_eq!(client.file_calls(), 0);
    assert_eq!(client.summary_calls(), 0);
    assert!(
        report
            .state
            .files
            .values()
            .all(|r| r.status == FileStatus::Pending)
    );
    assert_eq!(orch.store().load().files.len(), 2);
}

/// Cancels the run as soon as the first analysis has been recorded.
struct CancelAfterFirstAnalysis(CancellationToken);

impl ProgressSink for CancelAfterFirstAnalysis {
    fn emit(&self, event: ProgressEvent) {
        if matches!(event, ProgressEvent::FileCompleted { cached: false, .. }) {
            self.0.cancel();
        }
    }
}

#[tokio::test]
async fn test_interrupted_run_does_not_keep_old_summary() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(StubClient::with_behaviour(|path, attempt| {
        Ok(format!("analysis {attempt} of {path}"))
    }));

    orchestrator(&client, &temp, config(1))
        .run(vec![SourceFile::new("a.py", "v1")], true)
        .await
        .unwrap();
    assert_eq!(client.summary_calls(), 1);

    let edited = SourceFile::new("a.py", "v2 edited");
    let cancel = CancellationToken::new();
    let interrupted = orchestrator(&client, &temp, config(1))
        .with_cancellation(cancel.clone())
        .with_progress(Arc::new(CancelAfterFirstAnalysis(cancel)))
        .run(vec![edited.clone()], true)
        .await
        .unwrap();

    assert!(interrupted.cancelled);
    assert_eq!(client.summary_calls(), 1);
    let stored = AnalysisStore::for_root(temp.path()).load();
    assert_eq!(stored.get("a.py").unwrap().analysis_text, "analysis 1 of a.py");
    assert_ne!(stored.summary_status, SummaryStatus::Succeeded);

    let resumed = orchestrator(&client, &temp, config(1))
        .run(vec![edited], true)
        .await
        .unwrap();

    assert_eq!(resumed.analyzed, 0);
    assert_eq!(resumed.summary, SummaryStatus::Succeeded);
    assert_eq!(client.summary_calls(), 2);
    assert_eq!(resumed.state.summary_text.as_deref(), Some("summary #1"));
}

#[tokio::test]
async fn test_cancel_during_request_keeps_previous_analysis() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(
        StubClient::with_behaviour(|path, attempt| Ok(format!("analysis {attempt} of {path}")))
            .latency(Duration::from_millis(300)),
    );
    let original = SourceFile::new("a.py", "v1");
    let edited = SourceFile::new("a.py", "v2");

    orchestrator(&client, &temp, config(1))
        .run(vec![original.clone()], true)
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });
    let report = orchestrator(&client, &temp, config(1))
        .with_cancellation(cancel)
        .run(vec![edited.clone()], true)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.analyzed, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(client.summary_calls(), 1);
    let record = report.state.get("a.py").unwrap();
    assert_eq!(record.status, FileStatus::Failed);
    assert_eq!(record.last_error.as_deref(), Some("Request cancelled"));
    assert_eq!(record.analysis_text, "analysis 0 of a.py");
    assert_eq!(record.content_hash, Some(original.content_hash()));
    let stored = AnalysisStore::for_root(temp.path()).load();
    assert_eq!(stored.get("a.py").unwrap().status, FileStatus::Failed);

    let retried = orchestrator(&client, &temp, config(1))
        .run(vec![edited.clone()], true)
        .await
        .unwrap();
    let record = retried.state.get("a.py").unwrap();
    assert_eq!(retried.analyzed, 1);
    assert!(record.is_succeeded());
    assert_eq!(record.content_hash, Some(edited.content_hash()));
    assert_eq!(client.summary_calls(), 2);
}

#[tokio::test]
async fn test_progress_events() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(StubClient::new());
    let (sink, mut rx) = ChannelProgress::new();
    let orch = orchestrator(&client, &temp, config(2)).with_progress(Arc::new(sink));

    orch.run(files(&["a.py", "b.py"]), true).await.unwrap();
    orch.run(files(&["a.py", "b.py"]), true).await.unwrap();

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    let started = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::FileStarted { .. }))
        .count();
    let cached = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::FileCompleted { cached: true, .. }))
        .count();
    let summaries = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::SummaryStarted))
        .count();

    assert_eq!(started, 2);
    assert_eq!(cached, 2);
    assert_eq!(summaries, 1);
    assert!(events.windows(2).all(|pair| pair[0] != pair[1]));
    let finished = ProgressEvent::TotalProgress {
        completed: 2,
        total: 2,
    };
    assert_eq!(events.iter().filter(|e| **e == finished).count(), 2);
    assert_eq!(
        events.last(),
        Some(&ProgressEvent::TotalProgress {
            completed: 2,
            total: 2
        })
    );
}

#[tokio::test]
async fn test_corrupt_state_means_full_run() {
    let temp = TempDir::new().unwrap();
    let client = Arc::new(StubClient::new());
    let orch = orchestrator(&client, &temp, config(2));

    fs::write(orch.store().path(), "garbage").unwrap();
    let report = orch.run(files(&["a.py"]), true).await.unwrap();

    assert_eq!(report.analyzed, 1);
    assert!(report.state.get("a.py").unwrap().is_succeeded());
}
