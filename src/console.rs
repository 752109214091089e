//! Line-oriented progress output on stderr.

use std::sync::Mutex;

use codeask_analyze::{FileStatus, ProgressEvent, ProgressSink, SummaryStatus};

#[derive(Debug, Default)]
struct Counter {
    completed: usize,
    total: usize,
}

/// Prints one line per progress event.
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    counter: Mutex<Counter>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Line printed for `event`, or `None` when the event is silent.
    fn line(&self, event: &ProgressEvent) -> Option<String> {
        let mut counter = match self.counter.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        match event {
            ProgressEvent::TotalProgress { completed, total } => {
                counter.completed = *completed;
                counter.total = *total;
                None
            }
            ProgressEvent::FileStarted { path } => Some(format!(
                "{} analyzing {path}",
                position(counter.completed, counter.total)
            )),
            ProgressEvent::FileRetrying {
                path,
                attempt,
                error,
            } => Some(format!("  retrying {path} (attempt {attempt}): {error}")),
            ProgressEvent::FileCompleted { cached: true, .. } => None,
            ProgressEvent::FileCompleted { path, status, .. } => {
                let done = (counter.completed + 1).min(counter.total.max(1));
                let mark = match status {
                    FileStatus::Succeeded => "done",
                    FileStatus::Failed => "FAILED",
                    _ => "stopped",
                };
                Some(format!("{} {mark} {path}", position(done, counter.total)))
            }
            ProgressEvent::SummaryStarted => Some("Generating project summary...".to_string()),
            ProgressEvent::SummaryCompleted { status } => match status {
                SummaryStatus::Succeeded => Some("Project summary generated".to_string()),
                SummaryStatus::Failed => Some("Project summary FAILED".to_string()),
                _ => None,
            },
        }
    }
}

fn position(done: usize, total: usize) -> String {
    let width = total.to_string().len();
    format!("[{done:>width$}/{total}]")
}

impl ProgressSink for ConsoleProgress {
    fn emit(&self, event: ProgressEvent) {
        if let Some(line) = self.line(&event) {
            eprintln!("{line}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines() {
        let console = ConsoleProgress::new();

        assert!(
            console
                .line(&ProgressEvent::TotalProgress {
                    completed: 3,
                    total: 12
                })
                .is_none()
        );
        assert_eq!(
            console
                .line(&ProgressEvent::FileStarted {
                    path: "a.rs".into()
                })
                .unwrap(),
            "[ 3/12] analyzing a.rs"
        );
        assert_eq!(
            console
                .line(&ProgressEvent::FileCompleted {
                    path: "a.rs".into(),
                    status: FileStatus::Failed,
                    cached: false,
                })
                .unwrap(),
            "[ 4/12] FAILED a.rs"
        );
        assert!(
            console
                .line(&ProgressEvent::FileCompleted {
                    path: "b.rs".into(),
                    status: FileStatus::Succeeded,
                    cached: true,
                })
                .is_none()
        );
        assert!(
            console
                .line(&ProgressEvent::SummaryCompleted {
                    status: SummaryStatus::Skipped
                })
                .is_none()
        );
    }
}
