//! One scheduler for every periodic task.
//!
//! Each task gets its own ticker. A tick always runs to completion before the
//! next one starts; ticks missed while a slow tick was running are skipped,
//! not queued. Every tick runs in its own spawned task, so an error or a panic
//! ends that tick only. On shutdown the in-flight tick finishes and the loop
//! exits.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

/// Process-wide stop signal; `true` means stop.
pub type ShutdownSignal = watch::Receiver<bool>;

/// Resolves once shutdown was requested or the sender is gone.
pub async fn wait_for_shutdown(signal: &mut ShutdownSignal) {
    let _ = signal.wait_for(|stop| *stop).await;
}

#[async_trait]
pub trait PeriodicTask: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn tick(&self, now: DateTime<Utc>) -> Result<()>;
}

pub struct Scheduler {
    shutdown: ShutdownSignal,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Scheduler {
    pub fn new(shutdown: ShutdownSignal) -> Self {
        Self {
            shutdown,
            handles: Vec::new(),
        }
    }

    pub fn spawn<T: PeriodicTask>(&mut self, task: Arc<T>, period: Duration) {
        let name = task.name();
        let handle = tokio::spawn(run_periodic(task, period, self.shutdown.clone()));
        self.handles.push((name, handle));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Waits for every task loop to exit. Call after signalling shutdown.
    pub async fn join(self) {
        for (name, handle) in self.handles {
            if let Err(e) = handle.await {
                error!(task = name, error = %e, "Periodic task loop ended abnormally");
            }
        }
    }
}

pub async fn run_periodic<T: PeriodicTask>(task: Arc<T>, period: Duration, mut shutdown: ShutdownSignal) {
    let name = task.name();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(task = name, period_ms = period.as_millis() as u64, "⏰ Periodic task started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = wait_for_shutdown(&mut shutdown) => break,
        }

        let job = Arc::clone(&task);
        let started = std::time::Instant::now();
        match tokio::spawn(async move { job.tick(Utc::now()).await }).await {
            Ok(Ok(())) => {
                debug!(task = name, elapsed_ms = started.elapsed().as_millis() as u64, "Tick complete");
            }
            Ok(Err(e)) => warn!(task = name, error = %e, "Tick failed"),
            Err(e) => error!(task = name, error = %e, "Tick panicked"),
        }

        if *shutdown.borrow() {
            break;
        }
    }

    info!(task = name, "Periodic task stopped");
}
