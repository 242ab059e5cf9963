//! Background scheduler
//!
//! One long-running task that wakes on a fixed tick, refreshes examples and
//! runs batches when their intervals have elapsed, then sleeps until the
//! next tick or a shutdown signal. Each iteration runs as its own task so a
//! panic inside it is logged instead of killing the loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use shared::{component_debug, component_error, component_warn, log_shutdown, log_startup, Component};

use crate::engine::LabelingEngine;
use crate::traits::{AnnotationStore, Generator, ItemStore, StateStore};

/// Handle to a running scheduler loop
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

/// What one scheduler iteration did
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    pub refreshed: bool,
    pub batch_ran: bool,
    pub stored: usize,
    pub reported: usize,
}

/// True when `interval` has elapsed since `last`, or it never ran
pub fn is_due(last: Option<DateTime<Utc>>, interval: Duration, now: DateTime<Utc>) -> bool {
    match last {
        None => true,
        // A timestamp in the future (clock moved back) counts as due
        Some(at) => now.signed_duration_since(at).to_std().map_or(true, |elapsed| elapsed >= interval),
    }
}

/// Run a single scheduler iteration against the engine
pub async fn run_cycle<A, I, G, S>(engine: Arc<LabelingEngine<A, I, G, S>>) -> CycleReport
where
    A: AnnotationStore + 'static,
    I: ItemStore + 'static,
    G: Generator + 'static,
    S: StateStore + 'static,
{
    let config = engine.config();
    let mut report = CycleReport::default();
    let (last_refresh, last_batch) = engine.refresh_times().await;

    if is_due(last_refresh, config.example_refresh_interval(), Utc::now()) {
        // Failures are logged by the engine and retried next tick
        report.refreshed = engine.refresh_examples().await.is_ok();
    }

    if is_due(last_batch, config.batch_interval(), Utc::now()) {
        report.batch_ran = true;
        for schema in &config.schemas {
            if engine.example_count(&schema.name).await < config.llm_labeling.trigger_threshold {
                continue;
            }
            match engine.run_batch(&schema.name).await {
                Ok(outcome) => {
                    report.stored += outcome.stored;
                    report.reported += outcome.reported.len();
                }
                Err(e) => component_error!(Component::Scheduler, "❌ Batch for '{}' failed: {}", schema.name, e),
            }
        }

        // Persist whenever anything was stored, even below the confidence threshold
        if report.stored > 0 {
            let _ = engine.save_state().await;
        }
        engine.mark_batch_run(Utc::now()).await;
    }

    report
}

/// Spawn the scheduler loop for `engine`
pub fn spawn<A, I, G, S>(engine: Arc<LabelingEngine<A, I, G, S>>) -> WorkerHandle
where
    A: AnnotationStore + 'static,
    I: ItemStore + 'static,
    G: Generator + 'static,
    S: StateStore + 'static,
{
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
    let tick = engine.config().scheduler_tick();

    let join = tokio::spawn(async move {
        log_startup(Component::Scheduler, &format!("background labeling worker (tick {:?})", tick));

        loop {
            match tokio::spawn(run_cycle(Arc::clone(&engine))).await {
                Ok(report) => component_debug!(Component::Scheduler, "Cycle finished: {:?}", report),
                Err(e) => component_error!(Component::Scheduler, "❌ Scheduler iteration aborted: {}", e),
            }

            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = tokio::time::sleep(tick) => {}
            }
        }

        log_shutdown(Component::Scheduler, "background labeling worker stopped");
    });

    WorkerHandle { shutdown_tx, join }
}

/// Signal the loop and wait up to `timeout` for it to exit
///
/// Returns false if the loop is still running when the timeout expires.
pub async fn stop(handle: WorkerHandle, timeout: Duration) -> bool {
    let WorkerHandle { shutdown_tx, join } = handle;
    // Capacity one; a full channel already carries a pending signal
    let _ = shutdown_tx.try_send(());

    match tokio::time::timeout(timeout, join).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            component_error!(Component::Scheduler, "❌ Worker task ended abnormally: {}", e);
            true
        }
        Err(_) => {
            component_warn!(
                Component::Scheduler,
                "⚠️ Worker did not stop within {:?}, leaving it detached",
                timeout
            );
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_never_run_is_due() {
        assert!(is_due(None, Duration::from_secs(300), Utc::now()));
    }

    #[test]
    fn test_due_after_interval() {
        let now = Utc::now();
        let last = now - chrono::Duration::seconds(301);
        assert!(is_due(Some(last), Duration::from_secs(300), now));
    }

    #[test]
    fn test_not_due_within_interval() {
        let now = Utc::now();
        let last = now - chrono::Duration::seconds(10);
        assert!(!is_due(Some(last), Duration::from_secs(300), now));
    }

    #[test]
    fn test_future_timestamp_is_due() {
        let now = Utc::now();
        let last = now + chrono::Duration::seconds(60);
        assert!(is_due(Some(last), Duration::from_secs(300), now));
    }
}
