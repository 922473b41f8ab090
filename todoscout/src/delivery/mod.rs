//! Sending TODOs to external services.
//!
//! Each item is delivered on its own. Failures are either transient
//! (timeouts, connection resets, DNS failures, HTTP 429/5xx) or permanent.
//! Transient failures are retried with exponential backoff, waiting
//! `base * 2^attempt` after the failed attempt, until the attempt cap is hit.
//! An item that still fails is reported in the [`DeliveryReport`]; the rest
//! of the batch carries on.
pub mod notion;
pub mod slack;

pub use notion::NotionDatabase;
pub use slack::SlackWebhook;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use reqwest::StatusCode;
use std::num::NonZeroUsize;
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DeliveryConfig;
use crate::results::TodoItem;

/// Why a delivery attempt failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    /// Worth retrying
    #[error("transient delivery failure: {0}")]
    Transient(String),
    /// Retrying will not help
    #[error("delivery failed: {0}")]
    Permanent(String),
}

impl DeliveryError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        let transient_status = err
            .status()
            .is_some_and(|s| s.is_server_error() || s.as_u16() == 429);
        if err.is_timeout() || err.is_connect() || transient_status {
            Self::Transient(err.to_string())
        } else if err.is_request() && is_reset(&err) {
            Self::Transient(err.to_string())
        } else {
            Self::Permanent(err.to_string())
        }
    }
}

fn is_reset(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut source = err.source();
    while let Some(inner) = source {
        if let Some(io) = inner.downcast_ref::<std::io::Error>() {
            return matches!(
                io.kind(),
                std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            );
        }
        source = inner.source();
    }
    false
}

/// Maps an HTTP response status from `service` to a failure, if it is one
pub fn classify_status(service: &str, status: StatusCode) -> Option<DeliveryError> {
    if status.is_success() {
        None
    } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        Some(DeliveryError::transient(format!("{} returned {}", service, status)))
    } else {
        Some(DeliveryError::permanent(format!("{} returned {}", service, status)))
    }
}

/// A destination that accepts one item at a time
pub trait Deliverer: Sync {
    /// Short name for log lines
    fn name(&self) -> &str;

    /// Makes a single delivery attempt
    fn deliver(&self, item: &TodoItem) -> Result<(), DeliveryError>;
}

/// Attempt cap and backoff base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts per item, first try included. Zero behaves like one.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Wait after failed attempt `attempt` (0-based): `base * 2^attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Runs `op` until it succeeds, fails permanently, or runs out of
    /// attempts. Returns the outcome and the number of attempts made.
    pub fn run<T, F>(&self, mut op: F) -> (Result<T, DeliveryError>, u32)
    where
        F: FnMut() -> Result<T, DeliveryError>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return (Ok(value), attempt + 1),
                Err(err) if err.is_transient() && attempt + 1 < max_attempts => {
                    let delay = self.delay_for(attempt);
                    debug!(
                        "Attempt {}/{} failed ({}); retrying in {:?}",
                        attempt + 1,
                        max_attempts,
                        err,
                        delay
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return (Err(err), attempt + 1),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&DeliveryConfig::default())
    }
}

impl From<&DeliveryConfig> for RetryPolicy {
    fn from(config: &DeliveryConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay())
    }
}

/// One item that could not be delivered
#[derive(Debug, Clone)]
pub struct DeliveryFailure {
    pub file_path: String,
    pub line_number: usize,
    pub attempts: u32,
    pub error: DeliveryError,
}

/// Outcome of delivering a batch
#[derive(Debug, Clone, Default)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failures: Vec<DeliveryFailure>,
}

impl DeliveryReport {
    pub fn total(&self) -> usize {
        self.delivered + self.failures.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Delivers every item with at most `concurrency` in flight
pub fn deliver_all<D: Deliverer>(
    items: &[TodoItem],
    deliverer: &D,
    concurrency: NonZeroUsize,
    policy: &RetryPolicy,
) -> Result<DeliveryReport, DeliveryError> {
    deliver_all_with_progress(items, deliverer, concurrency, policy, |_, _| {})
}

/// Like [`deliver_all`], calling `on_item` as each item finishes
pub fn deliver_all_with_progress<D, F>(
    items: &[TodoItem],
    deliverer: &D,
    concurrency: NonZeroUsize,
    policy: &RetryPolicy,
    on_item: F,
) -> Result<DeliveryReport, DeliveryError>
where
    D: Deliverer,
    F: Fn(&TodoItem, bool) + Sync,
{
    let pool = ThreadPoolBuilder::new()
        .num_threads(concurrency.get())
        .thread_name(|i| format!("todoscout-delivery-{}", i))
        .build()
        .map_err(|e| DeliveryError::permanent(format!("failed to start delivery pool: {}", e)))?;

    info!(
        "Delivering {} TODOs to {} with {} workers",
        items.len(),
        deliverer.name(),
        concurrency
    );

    let outcomes: Vec<Option<DeliveryFailure>> = pool.install(|| {
        items
            .par_iter()
            .map(|item| {
                let (result, attempts) = policy.run(|| deliverer.deliver(item));
                on_item(item, result.is_ok());
                result.err().map(|error| {
                    warn!(
                        "Giving up on {}:{} after {} attempts: {}",
                        item.file_path, item.line_number, attempts, error
                    );
                    DeliveryFailure {
                        file_path: item.file_path.clone(),
                        line_number: item.line_number,
                        attempts,
                        error,
                    }
                })
            })
            .collect()
    });

    let mut report = DeliveryReport::default();
    for outcome in outcomes {
        match outcome {
            Some(failure) => report.failures.push(failure),
            None => report.delivered += 1,
        }
    }

    info!(
        "Delivered {} of {} TODOs to {}",
        report.delivered,
        report.total(),
        deliverer.name()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn item(line: usize) -> TodoItem {
        TodoItem {
            file_path: "src/lib.rs".to_string(),
            line_number: line,
            content: format!("[TODO] item {}", line),
            priority: None,
            assignee: None,
            tags: None,
        }
    }

    /// Fails according to a per-line script, then succeeds
    struct Scripted {
        transient_failures: HashMap<usize, usize>,
        permanent: Vec<usize>,
        calls: Mutex<HashMap<usize, usize>>,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl Scripted {
        fn new(transient_failures: &[(usize, usize)], permanent: &[usize]) -> Self {
            Self {
                transient_failures: transient_failures.iter().copied().collect(),
                permanent: permanent.to_vec(),
                calls: Mutex::new(HashMap::new()),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }

        fn calls_for(&self, line: usize) -> usize {
            self.calls.lock().unwrap().get(&line).copied().unwrap_or(0)
        }
    }

    impl Deliverer for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn deliver(&self, item: &TodoItem) -> Result<(), DeliveryError> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(2));

            let call = {
                let mut calls = self.calls.lock().unwrap();
                let count = calls.entry(item.line_number).or_insert(0);
                *count += 1;
                *count
            };

            let result = if self.permanent.contains(&item.line_number) {
                Err(DeliveryError::permanent("rejected"))
            } else if call <= *self.transient_failures.get(&item.line_number).unwrap_or(&0) {
                Err(DeliveryError::transient("connection reset"))
            } else {
                Ok(())
            };

            self.active.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_classify_status() {
        assert!(classify_status("Slack", StatusCode::OK).is_none());
        assert!(classify_status("Slack", StatusCode::TOO_MANY_REQUESTS)
            .unwrap()
            .is_transient());
        assert!(classify_status("Notion", StatusCode::BAD_GATEWAY)
            .unwrap()
            .is_transient());
        let err = classify_status("Notion", StatusCode::NOT_FOUND).unwrap();
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "delivery failed: Notion returned 404 Not Found");
    }

    #[test]
    fn test_delay_doubles() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(64), Duration::from_millis(100) * u32::MAX);
    }

    #[test]
    fn test_transient_failures_are_retried() {
        let deliverer = Scripted::new(&[(1, 2)], &[]);
        let report =
            deliver_all(&[item(1)], &deliverer, NonZeroUsize::MIN, &fast_policy(3)).unwrap();
        assert_eq!(report.delivered, 1);
        assert!(report.is_success());
        assert_eq!(deliverer.calls_for(1), 3);
    }

    #[test]
    fn test_attempt_cap_surfaces_failure() {
        let deliverer = Scripted::new(&[(1, 10)], &[]);
        let report =
            deliver_all(&[item(1)], &deliverer, NonZeroUsize::MIN, &fast_policy(3)).unwrap();
        assert_eq!(report.delivered, 0);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].attempts, 3);
        assert!(report.failures[0].error.is_transient());
        assert_eq!(deliverer.calls_for(1), 3);
    }

    #[test]
    fn test_permanent_failure_is_not_retried_and_batch_continues() {
        let deliverer = Scripted::new(&[], &[2]);
        let items: Vec<TodoItem> = (1..=5).map(item).collect();
        let report = deliver_all(
            &items,
            &deliverer,
            NonZeroUsize::new(2).unwrap(),
            &fast_policy(3),
        )
        .unwrap();

        assert_eq!(report.delivered, 4);
        assert_eq!(report.total(), 5);
        assert_eq!(report.failures[0].line_number, 2);
        assert_eq!(report.failures[0].attempts, 1);
        assert_eq!(deliverer.calls_for(2), 1);
    }

    #[test]
    fn test_concurrency_is_bounded() {
        let deliverer = Scripted::new(&[], &[]);
        let items: Vec<TodoItem> = (1..=24).map(item).collect();
        let done = AtomicUsize::new(0);
        let report = deliver_all_with_progress(
            &items,
            &deliverer,
            NonZeroUsize::new(3).unwrap(),
            &fast_policy(1),
            |_, ok| {
                assert!(ok);
                done.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();

        assert_eq!(report.delivered, 24);
        assert_eq!(done.load(Ordering::SeqCst), 24);
        assert!(deliverer.peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let (result, attempts) = fast_policy(0).run(|| Err::<(), _>(DeliveryError::transient("x")));
        assert!(result.is_err());
        assert_eq!(attempts, 1);
    }
}
