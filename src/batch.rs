use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::BatchError;
use crate::events::{ItemLog, LogSink};
use crate::fetcher::Fetcher;
use crate::models::{EnrichedRow, ExtractionResult, Severity};
use crate::retry::RetryController;

/// Identifiers that failed or came back without an image, in the order seen.
#[derive(Debug, Default, Clone, Serialize)]
pub struct FailureRegistry {
    identifiers: Vec<String>,
    #[serde(skip)]
    seen: HashSet<String>,
}

impl FailureRegistry {
    pub fn insert(&mut self, identifier: &str) {
        if self.seen.insert(identifier.to_string()) {
            self.identifiers.push(identifier.to_string());
        }
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.seen.contains(identifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.identifiers.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub identifier: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub results: HashMap<String, ExtractionResult>,
    /// Processing order of the unique identifiers.
    pub order: Vec<String>,
    pub summary: BatchSummary,
}

/// State shared by one batch run: the log sink, the failure registry,
/// the cancel flag and an optional progress callback.
pub struct BatchContext {
    pub log: LogSink,
    pub failures: FailureRegistry,
    cancel: Arc<AtomicBool>,
    on_progress: Option<Box<dyn FnMut(&Progress)>>,
}

impl Default for BatchContext {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchContext {
    pub fn new() -> Self {
        Self {
            log: LogSink::new(),
            failures: FailureRegistry::default(),
            cancel: Arc::new(AtomicBool::new(false)),
            on_progress: None,
        }
    }

    pub fn with_progress(mut self, on_progress: impl FnMut(&Progress) + 'static) -> Self {
        self.on_progress = Some(Box::new(on_progress));
        self
    }

    /// Flag checked between items; setting it stops the batch at the next boundary.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    fn publish(&mut self, progress: Progress) {
        debug!(completed = progress.completed, total = progress.total, "progress");
        if let Some(on_progress) = self.on_progress.as_mut() {
            on_progress(&progress);
        }
    }
}

/// Trimmed, non-empty identifiers, first occurrence wins.
pub fn unique_identifiers<S: AsRef<str>>(identifiers: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    identifiers
        .iter()
        .map(|id| id.as_ref().trim())
        .filter(|id| !id.is_empty())
        .filter(|id| seen.insert(id.to_string()))
        .map(str::to_string)
        .collect()
}

/// Runs `per_item` once per unique identifier, strictly one after another.
/// A `limit` of `Some(k)` with `k > 0` processes only the first `k`.
pub fn process<S, F>(
    ctx: &mut BatchContext,
    identifiers: &[S],
    limit: Option<usize>,
    mut per_item: F,
) -> Result<BatchOutcome, BatchError>
where
    S: AsRef<str>,
    F: FnMut(&str, &mut ItemLog) -> ExtractionResult,
{
    let unique = unique_identifiers(identifiers);
    if unique.is_empty() {
        return Err(BatchError::EmptyInput);
    }

    let total = match limit {
        Some(k) if k > 0 => k.min(unique.len()),
        _ => unique.len(),
    };
    let started = Instant::now();
    ctx.log.append(
        Severity::Info,
        format!("Starting processing of {total} unique identifiers"),
    );

    let mut results = HashMap::with_capacity(total);
    let mut order = Vec::with_capacity(total);
    let mut cancelled = false;

    for (index, identifier) in unique.into_iter().take(total).enumerate() {
        if ctx.is_cancelled() {
            ctx.log.append(
                Severity::Warning,
                format!("Batch cancelled after {index} of {total} items"),
            );
            cancelled = true;
            break;
        }

        let mut item_log = ItemLog::new();
        item_log.info(format!(
            "Starting to process {identifier} ({}/{total})",
            index + 1
        ));
        let result = per_item(&identifier, &mut item_log);

        if !result.success || !result.fields.has_image() {
            ctx.failures.insert(&identifier);
        }
        ctx.log.flush(item_log);

        results.insert(identifier.clone(), result);
        order.push(identifier.clone());
        ctx.publish(Progress {
            completed: index + 1,
            total,
            identifier,
        });
    }

    let succeeded = results.values().filter(|r| r.success).count();
    let summary = BatchSummary {
        total,
        succeeded,
        failed: results.len() - succeeded,
        cancelled,
        elapsed: started.elapsed(),
    };
    info!(
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        cancelled = summary.cancelled,
        "batch finished"
    );

    Ok(BatchOutcome {
        results,
        order,
        summary,
    })
}

/// Fetches and extracts every identifier with the retry controller.
pub fn extract_all<S, F>(
    ctx: &mut BatchContext,
    config: &EngineConfig,
    fetcher: &F,
    identifiers: &[S],
) -> Result<BatchOutcome, BatchError>
where
    S: AsRef<str>,
    F: Fetcher + ?Sized,
{
    let controller = RetryController::new(fetcher, config);
    process(ctx, identifiers, config.max_items, |identifier, log| {
        controller.run(identifier, log)
    })
}

/// Joins results back onto every input row, keeping input order.
/// Rows whose identifier was never processed get a skipped result.
pub fn join_rows<R, K>(
    rows: Vec<R>,
    identifier_of: K,
    results: &HashMap<String, ExtractionResult>,
    config: &EngineConfig,
) -> Vec<EnrichedRow<R>>
where
    K: Fn(&R) -> &str,
{
    rows.into_iter()
        .map(|row| {
            let identifier = identifier_of(&row).trim().to_string();
            let link = config.product_url(&identifier);
            match results.get(&identifier) {
                Some(result) => EnrichedRow::new(row, result, link),
                None => EnrichedRow::new(row, &ExtractionResult::skipped(identifier), link),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn ok_result(identifier: &str) -> ExtractionResult {
        let mut result = ExtractionResult::new(identifier);
        result.fields.title = format!("Title {identifier}");
        result.fields.image_url = format!("https://cdn.test/{identifier}.jpg");
        result.success = true;
        result.attempt_count = 1;
        result
    }

    #[test]
    fn failure_registry_keeps_first_insertion_order() {
        let mut failures = FailureRegistry::default();
        for id in ["C", "A", "C", "B", "A"] {
            failures.insert(id);
        }
        assert_eq!(failures.iter().collect::<Vec<_>>(), ["C", "A", "B"]);
        assert_eq!(failures.len(), 3);
        assert!(failures.contains("B"));
        assert!(!failures.contains("D"));
    }

    #[test]
    fn dedupes_and_trims() {
        let ids = ["A", " B ", "A", "", "  ", "C", "B"];
        assert_eq!(unique_identifiers(&ids), ["A", "B", "C"]);
    }

    #[test]
    fn empty_input_aborts_before_processing() {
        let mut ctx = BatchContext::new();
        let mut calls = 0;
        let err = process(&mut ctx, &["", "   "], None, |id, _| {
            calls += 1;
            ok_result(id)
        })
        .unwrap_err();
        assert!(matches!(err, BatchError::EmptyInput));
        assert_eq!(calls, 0);
        assert!(ctx.log.is_empty());
    }

    #[test]
    fn each_unique_identifier_runs_once() {
        let mut ctx = BatchContext::new();
        let mut seen = Vec::new();
        let outcome = process(&mut ctx, &["A", "A", "B"], None, |id, _| {
            seen.push(id.to_string());
            ok_result(id)
        })
        .unwrap();

        assert_eq!(seen, ["A", "B"]);
        assert_eq!(outcome.order, ["A", "B"]);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(outcome.summary.succeeded, 2);
    }

    #[test]
    fn limit_caps_processing_and_join_marks_skipped() {
        let mut ctx = BatchContext::new();
        let outcome = process(&mut ctx, &["A", "B", "C"], Some(2), |id, _| ok_result(id)).unwrap();
        assert_eq!(outcome.summary.total, 2);

        let config = EngineConfig::default();
        let rows = vec!["C".to_string(), "A".to_string(), "B".to_string()];
        let joined = join_rows(rows, |r| r.as_str(), &outcome.results, &config);

        let ids: Vec<_> = joined.iter().map(|r| r.row.as_str()).collect();
        assert_eq!(ids, ["C", "A", "B"]);
        assert_eq!(joined[0].error.as_deref(), Some("Processing skipped"));
        assert!(!joined[0].success);
        assert!(joined[1].success);
        assert_eq!(joined[2].product_link, "https://www.amazon.com/dp/B");
    }

    #[test]
    fn failures_include_successes_without_image() {
        let mut ctx = BatchContext::new();
        process(&mut ctx, &["A", "B", "C"], None, |id, _| match id {
            "A" => ok_result(id),
            "B" => {
                let mut r = ok_result(id);
                r.fields.image_url.clear();
                r
            }
            _ => ExtractionResult::new(id),
        })
        .unwrap();

        let failures: Vec<_> = ctx.failures.iter().collect();
        assert_eq!(failures, ["B", "C"]);
    }

    #[test]
    fn item_logs_merge_in_submission_order() {
        let mut ctx = BatchContext::new();
        process(&mut ctx, &["A", "B"], None, |id, log| {
            log.info(format!("{id} step 1"));
            log.info(format!("{id} step 2"));
            ok_result(id)
        })
        .unwrap();

        let messages: Vec<_> = ctx.log.drain().into_iter().map(|e| e.message).collect();
        assert_eq!(
            messages,
            [
                "Starting processing of 2 unique identifiers",
                "Starting to process A (1/2)",
                "A step 1",
                "A step 2",
                "Starting to process B (2/2)",
                "B step 1",
                "B step 2",
            ]
        );
    }

    #[test]
    fn progress_and_cancellation_at_item_boundary() {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let mut ctx = BatchContext::new().with_progress(move |p| {
            sink.borrow_mut().push((p.completed, p.total));
        });
        let cancel = ctx.cancel_handle();

        let outcome = process(&mut ctx, &["A", "B", "C"], None, |id, _| {
            if id == "B" {
                cancel.store(true, Ordering::SeqCst);
            }
            ok_result(id)
        })
        .unwrap();

        assert_eq!(*seen.borrow(), [(1, 3), (2, 3)]);
        assert!(outcome.summary.cancelled);
        assert_eq!(outcome.order, ["A", "B"]);
    }
}
