//! Background maintenance.
//!
//! A tokio task wakes on a fixed interval, or early when the store signals that it has
//! grown past its high-water mark, and runs one [`maintenance_pass`] on the blocking pool.
//! Callers of the store only ever wait for the write section of a single pass.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::memory::{ForgetReport, Memory};

/// Lightweight cancellation token shared between a handle and its task.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Advances the logical clock, decays and forgets, and rebuilds the head index when
/// queries have become slow and forgetting did not already rebuild it.
pub fn maintenance_pass(memory: &Memory) -> ForgetReport {
    memory.tick();
    let mut report = memory.decay_and_forget();
    let threshold = Duration::from_micros(memory.config().latency_rebuild_threshold_us);
    if !report.rebuilt_index && memory.latency().average() > threshold {
        debug!(average = ?memory.latency().average(), "query latency over threshold, rebuilding index");
        memory.rebuild_index();
        report.rebuilt_index = true;
    }
    report
}

/// Handle to a running maintenance task.
#[derive(Debug)]
pub struct MaintenanceHandle {
    cancel: CancelToken,
    wake: Arc<Notify>,
    passes: Arc<AtomicU64>,
    join: Option<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Requests the task to stop after the pass in progress, if any.
    pub fn cancel(&self) {
        self.cancel.cancel();
        self.wake.notify_one();
    }
    /// Number of passes completed so far.
    pub fn passes(&self) -> u64 {
        self.passes.load(Ordering::Acquire)
    }
    pub fn is_finished(&self) -> bool {
        self.join.as_ref().is_none_or(|j| j.is_finished())
    }
    /// Cancels the task and waits for it to finish.
    pub async fn stop(mut self) {
        self.cancel();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                warn!(error = %e, "maintenance task ended abnormally");
            }
        }
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Starts periodic maintenance of `memory`. Must be called from within a tokio runtime.
pub fn spawn(memory: Arc<Memory>, interval: Duration) -> MaintenanceHandle {
    let cancel = CancelToken::new();
    let wake = Arc::new(Notify::new());
    let passes = Arc::new(AtomicU64::new(0));
    let interval = interval.max(Duration::from_millis(1));
    let join = {
        let (cancel, wake, passes) = (cancel.clone(), Arc::clone(&wake), Arc::clone(&passes));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(interval_ms = interval.as_millis() as u64, "maintenance started");
            loop {
                tokio::select! {
                    _ = ticker.tick() => (),
                    _ = memory.pressure().notified() => debug!(atoms = memory.len(), "memory pressure"),
                    _ = wake.notified() => (),
                }
                if cancel.is_cancelled() {
                    break;
                }
                let store = Arc::clone(&memory);
                match tokio::task::spawn_blocking(move || maintenance_pass(&store)).await {
                    Ok(report) => {
                        let pass = passes.fetch_add(1, Ordering::AcqRel) + 1;
                        info!(
                            pass,
                            examined = report.examined,
                            evicted = report.evicted,
                            remaining = report.remaining,
                            rebuilt_index = report.rebuilt_index,
                            "maintenance pass"
                        );
                    }
                    Err(e) => warn!(error = %e, "maintenance pass failed"),
                }
            }
            info!("maintenance stopped");
        })
    };
    MaintenanceHandle { cancel, wake, passes, join: Some(join) }
}
