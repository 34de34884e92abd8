//! # Pass Scheduling
//!
//! Runs reconciliation passes one at a time: once immediately, then after
//! every wait. A wait ends at the earliest of
//! - the interval elapsing
//! - a [`Wakeup`] (SIGHUP in the binary, or any task holding a handle)
//! - a change event on the `ParameterMapping` watch
//!
//! Each wait ends in exactly one pass. A wakeup that arrives while a pass is
//! running is held (a single permit) and ends the following wait at once.
//!
//! The mapping watch is closed at the end of every pass and reopened before
//! the next wait, so a broken stream never outlives one cycle. The watch
//! stays polled while the pass runs: a change seen then is folded into the
//! held wakeup, since a reopened watch only reports what happens after it
//! opens. A watch that ends or fails is dropped until the next reopen.
//!
//! A failed pass is logged (WARN for expected misconfiguration, ERROR
//! otherwise) and counted; scheduling continues.

use crate::cluster::{ClusterClient, MappingChange, MappingWatch};
use crate::error::{Error, Result};
use crate::observability::metrics;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, warn};

/// Handle that ends the current (or next) wait early
#[derive(Debug, Clone, Default)]
pub struct Wakeup {
    notify: Arc<Notify>,
}

impl Wakeup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request an immediate pass
    pub fn wake(&self) {
        self.notify.notify_one();
    }
}

/// Why a wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    Interval,
    Interrupt,
    MappingChanged,
    Shutdown,
}

impl WakeReason {
    /// Metric label
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interval => "interval",
            Self::Interrupt => "interrupt",
            Self::MappingChanged => "mapping_changed",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Pass scheduler
#[derive(Debug)]
pub struct Polling {
    interval: Duration,
    wakeup: Wakeup,
    cluster: Option<Arc<dyn ClusterClient>>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Polling {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            wakeup: Wakeup::new(),
            cluster: None,
            shutdown: None,
        }
    }

    /// End waits when `wakeup` fires
    #[must_use]
    pub fn with_wakeup(mut self, wakeup: Wakeup) -> Self {
        self.wakeup = wakeup;
        self
    }

    /// End waits when a `ParameterMapping` changes
    #[must_use]
    pub fn watching(mut self, cluster: Arc<dyn ClusterClient>) -> Self {
        self.cluster = Some(cluster);
        self
    }

    /// Stop between passes once `shutdown` holds `true`
    #[must_use]
    pub fn until(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Run `pass` now and after every wait.
    ///
    /// Returns only once shutdown is requested; without [`Polling::until`]
    /// it never returns.
    pub async fn run<F, Fut>(&self, mut pass: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut shutdown = self.shutdown.clone();

        let mut mapping_watch = self.open_watch().await;
        self.run_watched(&mut pass, &mut mapping_watch).await;
        loop {
            finish(mapping_watch.take());
            mapping_watch = self.open_watch().await;

            let reason = self.wait(&mut mapping_watch, shutdown.as_mut()).await;
            if reason == WakeReason::Shutdown {
                finish(mapping_watch.take());
                info!("Shutdown requested; stopping reconciliation");
                return;
            }

            metrics::increment_wakeups(reason.as_str());
            debug!(reason = reason.as_str(), "Wait ended");
            self.run_watched(&mut pass, &mut mapping_watch).await;
        }
    }

    /// Run one pass while draining `mapping_watch` into the wakeup permit
    async fn run_watched<F, Fut>(
        &self,
        pass: &mut F,
        mapping_watch: &mut Option<Box<dyn MappingWatch>>,
    ) where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let pass = run_pass(pass);
        tokio::pin!(pass);
        loop {
            tokio::select! {
                () = &mut pass => return,
                change = next_change(mapping_watch) => match change {
                    Some(change) => {
                        log_change(&change);
                        self.wakeup.wake();
                    }
                    None => finish(mapping_watch.take()),
                },
            }
        }
    }

    async fn open_watch(&self) -> Option<Box<dyn MappingWatch>> {
        let cluster = self.cluster.as_ref()?;
        match cluster.watch_mappings().await {
            Ok(mapping_watch) => Some(mapping_watch),
            Err(e) => {
                warn!(error = %e, "Failed to open ParameterMapping watch; relying on the interval");
                None
            }
        }
    }

    async fn wait(
        &self,
        mapping_watch: &mut Option<Box<dyn MappingWatch>>,
        mut shutdown: Option<&mut watch::Receiver<bool>>,
    ) -> WakeReason {
        let deadline = Instant::now() + self.interval;
        loop {
            tokio::select! {
                () = sleep_until(deadline) => return WakeReason::Interval,
                () = self.wakeup.notify.notified() => return WakeReason::Interrupt,
                () = shutdown_requested(&mut shutdown) => return WakeReason::Shutdown,
                change = next_change(mapping_watch) => match change {
                    Some(change) => {
                        log_change(&change);
                        return WakeReason::MappingChanged;
                    }
                    None => finish(mapping_watch.take()),
                },
            }
        }
    }
}

/// Run `pass` forever: once now, then after each `interval` or wakeup
pub async fn with_polling<F, Fut>(interval: Duration, pass: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    Polling::new(interval).run(pass).await;
}

/// The single catch boundary for pass failures
async fn run_pass<F, Fut>(pass: &mut F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    if let Err(e) = pass().await {
        report_pass_error(&e);
    }
}

/// Log and count a failed pass
pub fn report_pass_error(error: &Error) {
    metrics::increment_pass_errors(error.severity());
    if error.is_expected() {
        warn!(error = %error, "Reconciliation pass failed");
    } else {
        error!(error = %error, "Reconciliation pass failed");
    }
}

async fn next_change(mapping_watch: &mut Option<Box<dyn MappingWatch>>) -> Option<MappingChange> {
    match mapping_watch {
        Some(mapping_watch) => mapping_watch.next_change().await,
        None => std::future::pending().await,
    }
}

fn finish(mapping_watch: Option<Box<dyn MappingWatch>>) {
    if let Some(mapping_watch) = mapping_watch {
        mapping_watch.finish();
    }
}

async fn shutdown_requested(shutdown: &mut Option<&mut watch::Receiver<bool>>) {
    match shutdown {
        Some(receiver) => {
            if receiver.wait_for(|stop| *stop).await.is_err() {
                // Sender gone: nobody can request shutdown any more
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending().await,
    }
}

fn log_change(change: &MappingChange) {
    match change {
        MappingChange::Applied { namespace, name } => {
            info!(namespace = %namespace, mapping = %name, "ParameterMapping changed");
        }
        MappingChange::Deleted { namespace, name } => {
            info!(namespace = %namespace, mapping = %name, "ParameterMapping deleted");
        }
    }
}
