//! Incremental analysis runs.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use codeask_core::{
    AiClient, AnalyzerConfig, ChatMessage, ContentHash, FileStatus, ProjectAnalysisState,
    ProviderError, SourceFile, SummaryStatus, clean_response, needs_reanalysis, templates,
};

use crate::clock::{Clock, SystemClock};
use crate::error::AnalysisError;
use crate::progress::{NoopProgress, ProgressEvent, ProgressSink};
use crate::retry::{JobOutcome, RetryingJobRunner, Sleeper, TokioSleeper};
use crate::store::AnalysisStore;
use crate::summary::SummaryAggregator;

/// Capacity of the worker result channel.
const RESULT_CHANNEL_SIZE: usize = 100;

/// What an analysis run did.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// State as persisted at the end of the run.
    pub state: ProjectAnalysisState,
    /// Files handed to the run.
    pub discovered: usize,
    /// Files sent to the AI backend.
    pub analyzed: usize,
    /// Files answered from the stored state.
    pub cached: usize,
    /// Analyzed files that succeeded.
    pub succeeded: usize,
    /// Analyzed files that failed.
    pub failed: usize,
    /// Paths whose records were removed.
    pub pruned: Vec<String>,
    /// The run was cancelled before every job finished.
    pub cancelled: bool,
    /// Outcome of the summary step.
    pub summary: SummaryStatus,
    /// Wall time of the run.
    pub elapsed: Duration,
}

/// A file waiting for a worker.
struct FileJob {
    file: SourceFile,
    hash: ContentHash,
}

/// Messages sent from workers to the orchestrator.
enum WorkerMessage {
    Started { path: String },
    Finished {
        path: String,
        hash: ContentHash,
        outcome: JobOutcome,
    },
}

/// Runs incremental analyses against one AI client and one store.
///
/// Workers only talk to the AI backend. Every state mutation and every save
/// happens on the task driving [`run`](Self::run), one completed job at a time.
pub struct AnalysisOrchestrator {
    client: Arc<dyn AiClient>,
    store: AnalysisStore,
    config: AnalyzerConfig,
    progress: Arc<dyn ProgressSink>,
    sleeper: Arc<dyn Sleeper>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
}

impl AnalysisOrchestrator {
    /// Create an orchestrator with no progress reporting and wall-clock time.
    pub fn new(client: Arc<dyn AiClient>, store: AnalysisStore, config: AnalyzerConfig) -> Self {
        Self {
            client,
            store,
            config,
            progress: Arc::new(NoopProgress),
            sleeper: Arc::new(TokioSleeper),
            clock: Arc::new(SystemClock),
            cancel: CancellationToken::new(),
        }
    }

    /// Report progress to `progress`.
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Stop the run when `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Take timestamps from `clock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Wait between retries with `sleeper`.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Store used by this orchestrator.
    pub fn store(&self) -> &AnalysisStore {
        &self.store
    }

    /// Configuration in use.
    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Analyze `files` and persist the results.
    ///
    /// With `incremental`, files whose content hash matches a successful
    /// record are not sent to the backend. Per-file failures are recorded
    /// and never abort the run; only storage failures do.
    pub async fn run(
        &self,
        files: Vec<SourceFile>,
        incremental: bool,
    ) -> Result<RunReport, AnalysisError> {
        self.validate()?;
        let start = Instant::now();
        let run_cancel = self.cancel.child_token();

        let mut state = self.store.load();
        let files = dedup_by_path(files);
        let total = files.len();

        let current: HashSet<String> = files.iter().map(|f| f.path.clone()).collect();
        let pruned = AnalysisStore::prune(&mut state, &current);

        let fingerprint = self.config.prompt_fingerprint();
        let mut incremental = incremental;
        if incremental && state.prompt_fingerprint.is_some_and(|f| f != fingerprint) {
            info!("prompt templates changed, analyzing every file");
            incremental = false;
        }
        state.prompt_fingerprint = Some(fingerprint);

        let mut jobs = VecDeque::new();
        let mut cached = 0;
        for file in files {
            let hash = file.content_hash();
            if incremental && !needs_reanalysis(state.get(&file.path), &hash) {
                self.progress.emit(ProgressEvent::FileCompleted {
                    path: file.path,
                    status: FileStatus::Succeeded,
                    cached: true,
                });
                cached += 1;
            } else {
                state.entry(&file.path);
                jobs.push_back(FileJob { file, hash });
            }
        }

        let analyzed = jobs.len();
        let changed = analyzed > 0 || !pruned.is_empty();
        if changed {
            // Per-file saves below must not pair new analyses with an old summary
            state.mark_summary_stale();
        }
        self.progress.emit(ProgressEvent::TotalProgress {
            completed: cached,
            total,
        });
        info!(total, analyzed, cached, pruned = pruned.len(), incremental, "starting analysis");

        let mut counts = JobCounts {
            completed: cached,
            ..Default::default()
        };
        if !jobs.is_empty() {
            self.run_jobs(jobs, &mut state, &run_cancel, &mut counts, total)
                .await?;
        }

        let cancelled = self.cancel.is_cancelled();
        let summary = if cancelled {
            info!("run cancelled, skipping summary");
            state.summary_status
        } else {
            self.update_summary(&mut state, &run_cancel).await
        };

        state.updated_at = Some(self.clock.now());
        self.store.save(&state)?;

        info!(
            succeeded = counts.succeeded,
            failed = counts.failed,
            cached,
            cancelled,
            "analysis finished"
        );

        Ok(RunReport {
            state,
            discovered: total,
            analyzed,
            cached,
            succeeded: counts.succeeded,
            failed: counts.failed,
            pruned,
            cancelled,
            summary,
            elapsed: start.elapsed(),
        })
    }

    fn validate(&self) -> Result<(), AnalysisError> {
        if self.config.concurrency == 0 {
            return Err(AnalysisError::invalid_config("concurrency must be at least 1"));
        }
        if self.config.max_attempts == 0 {
            return Err(AnalysisError::invalid_config("max attempts must be at least 1"));
        }
        if self.config.request_timeout.is_zero() {
            return Err(AnalysisError::invalid_config("request timeout must be positive"));
        }
        Ok(())
    }

    fn runner(&self, cancel: &CancellationToken) -> RetryingJobRunner {
        RetryingJobRunner::from_config(&self.config)
            .with_sleeper(self.sleeper.clone())
            .with_cancellation(cancel.clone())
    }

    /// Drain `jobs` through a fixed pool of workers, folding each result
    /// into `state` and saving after every completion.
    async fn run_jobs(
        &self,
        jobs: VecDeque<FileJob>,
        state: &mut ProjectAnalysisState,
        cancel: &CancellationToken,
        counts: &mut JobCounts,
        total: usize,
    ) -> Result<(), AnalysisError> {
        let worker_count = self.config.worker_count().min(jobs.len());
        let queue = Arc::new(Mutex::new(jobs));
        let (tx, mut rx) = mpsc::channel(RESULT_CHANNEL_SIZE);
        let prompt: Arc<str> = Arc::from(self.config.single_file_prompt.as_str());

        debug!(workers = worker_count, "spawning analysis workers");

        let mut workers = JoinSet::new();
        for _ in 0..worker_count {
            let worker = Worker {
                queue: Arc::clone(&queue),
                client: Arc::clone(&self.client),
                runner: self.runner(cancel),
                progress: Arc::clone(&self.progress),
                prompt: Arc::clone(&prompt),
                cancel: cancel.clone(),
                tx: tx.clone(),
            };
            workers.spawn(worker.run());
        }
        drop(tx);

        while let Some(message) = rx.recv().await {
            match message {
                WorkerMessage::Started { path } => {
                    let record = state.entry(&path);
                    record.mark_analyzing();
                    record.last_attempt_count = 0;
                    self.progress.emit(ProgressEvent::FileStarted { path });
                }
                WorkerMessage::Finished {
                    path,
                    hash,
                    outcome,
                } => {
                    let status = self.apply_outcome(state, &path, hash, outcome);
                    match status {
                        FileStatus::Succeeded => counts.succeeded += 1,
                        _ => counts.failed += 1,
                    }
                    counts.completed += 1;

                    self.progress.emit(ProgressEvent::FileCompleted {
                        path,
                        status,
                        cached: false,
                    });
                    self.progress.emit(ProgressEvent::TotalProgress {
                        completed: counts.completed,
                        total,
                    });

                    state.updated_at = Some(self.clock.now());
                    if let Err(err) = self.store.save(state) {
                        cancel.cancel();
                        workers.abort_all();
                        return Err(err.into());
                    }
                }
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                warn!(error = %err, "analysis worker stopped unexpectedly");
            }
        }
        Ok(())
    }

    fn apply_outcome(
        &self,
        state: &mut ProjectAnalysisState,
        path: &str,
        hash: ContentHash,
        outcome: JobOutcome,
    ) -> FileStatus {
        let record = state.entry(path);
        match outcome.result {
            Ok(text) => {
                debug!(path, attempts = outcome.attempts, "file analyzed");
                record.record_success(hash, text, outcome.attempts, self.clock.now());
            }
            Err(error) => {
                warn!(path, attempts = outcome.attempts, error = %error, "file analysis failed");
                record.record_failure(error.to_string(), outcome.attempts);
            }
        }
        record.status
    }

    /// Regenerate the project summary unless the stored one is still current.
    async fn update_summary(
        &self,
        state: &mut ProjectAnalysisState,
        cancel: &CancellationToken,
    ) -> SummaryStatus {
        let records: Vec<_> = state.succeeded_records().cloned().collect();
        if records.is_empty() {
            debug!("no successful analyses, skipping summary");
            state.clear_summary();
            return state.summary_status;
        }
        if state.summary_status == SummaryStatus::Succeeded && state.has_summary() {
            debug!("analyses unchanged, keeping existing summary");
            return state.summary_status;
        }

        self.progress.emit(ProgressEvent::SummaryStarted);
        let aggregator = SummaryAggregator::new(
            Arc::clone(&self.client),
            self.runner(cancel),
            &self.config,
        );
        let refs: Vec<_> = records.iter().collect();
        match aggregator.summarize(&refs).await {
            Ok(text) => state.set_summary(text, self.clock.now()),
            Err(err) => {
                warn!(error = %err, "summary generation failed");
                state.set_summary_failed(err.to_string());
            }
        }

        self.progress.emit(ProgressEvent::SummaryCompleted {
            status: state.summary_status,
        });
        state.summary_status
    }
}

impl std::fmt::Debug for AnalysisOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisOrchestrator")
            .field("client", &self.client.name())
            .field("store", &self.store)
            .field("config", &self.config)
            .finish()
    }
}

#[derive(Debug, Default)]
struct JobCounts {
    completed: usize,
    succeeded: usize,
    failed: usize,
}

/// One member of the worker pool.
struct Worker {
    queue: Arc<Mutex<VecDeque<FileJob>>>,
    client: Arc<dyn AiClient>,
    runner: RetryingJobRunner,
    progress: Arc<dyn ProgressSink>,
    prompt: Arc<str>,
    cancel: CancellationToken,
    tx: mpsc::Sender<WorkerMessage>,
}

impl Worker {
    fn next_job(&self) -> Option<FileJob> {
        match self.queue.lock() {
            Ok(mut queue) => queue.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        }
    }

    async fn run(self) {
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let Some(FileJob { file, hash }) = self.next_job() else {
                break;
            };

            let path = file.path.clone();
            if self
                .tx
                .send(WorkerMessage::Started { path: path.clone() })
                .await
                .is_err()
            {
                break;
            }

            let messages = [
                ChatMessage::system(self.prompt.as_ref()),
                ChatMessage::user(templates::file_request(&file.path, &file.text())),
            ];
            let client = self.client.as_ref();
            let progress = self.progress.as_ref();
            let outcome = self
                .runner
                .execute(
                    |_| complete_cleaned(client, &messages),
                    |attempt, error| {
                        progress.emit(ProgressEvent::FileRetrying {
                            path: path.clone(),
                            attempt,
                            error: error.to_string(),
                        })
                    },
                )
                .await;

            let message = WorkerMessage::Finished {
                path,
                hash,
                outcome,
            };
            if self.tx.send(message).await.is_err() {
                break;
            }
        }
    }
}

/// Send `messages` and clean the response. An empty answer counts as malformed.
pub(crate) async fn complete_cleaned(
    client: &dyn AiClient,
    messages: &[ChatMessage],
) -> Result<String, ProviderError> {
    let raw = client.complete(messages).await?;
    let cleaned = clean_response(&raw);
    if cleaned.is_empty() {
        return Err(ProviderError::malformed("empty response"));
    }
    Ok(cleaned)
}

/// Keep the first file for each path.
fn dedup_by_path(files: Vec<SourceFile>) -> Vec<SourceFile> {
    let mut seen = HashSet::with_capacity(files.len());
    files
        .into_iter()
        .filter(|file| {
            let fresh = seen.insert(file.path.clone());
            if !fresh {
                warn!(path = %file.path, "duplicate path ignored");
            }
            fresh
        })
        .collect()
}
