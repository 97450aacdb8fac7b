//! The per-engine scan thread and its cancellation.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use super::EngineInner;
use crate::error::{Error, Result, panic_message};
use crate::host::BufferHost;
use crate::model::config::StopPolicy;

static NEXT_WORKER_ID: AtomicU64 = AtomicU64::new(1);

/// How often a stop request re-checks the worker between pumps.
const STOP_SPIN: Duration = Duration::from_millis(1);

pub(crate) struct WorkerHandle {
    cancel: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

impl WorkerHandle {
    pub(crate) fn name(&self) -> &str {
        self.thread.thread().name().unwrap_or("urlmark-scan")
    }
}

pub(crate) enum WorkerSlot {
    Idle,
    Running(WorkerHandle),
    /// A stop request timed out. The thread may still be running; it exits
    /// at its next quantum boundary if it ever gets there.
    Abandoned,
}

pub(crate) fn spawn(inner: Arc<EngineInner>) -> Result<WorkerHandle> {
    let cancel = Arc::new(AtomicBool::new(false));
    let name = format!(
        "urlmark-scan-{}",
        NEXT_WORKER_ID.fetch_add(1, Ordering::Relaxed)
    );

    let flag = Arc::clone(&cancel);
    let thread = thread::Builder::new()
        .name(name)
        .spawn(move || run(inner, flag))
        .map_err(|err| Error::WorkerSpawn(err.to_string()))?;

    Ok(WorkerHandle { cancel, thread })
}

fn run(inner: Arc<EngineInner>, cancel: Arc<AtomicBool>) {
    info!("scan worker started");
    while !cancel.load(Ordering::Acquire) {
        if !inner.poll_and_scan() {
            inner.time.sleep(inner.poll_quantum());
        }
    }
    info!("scan worker stopped");
}

/// Asks the worker to exit and waits for it.
///
/// The wait runs `policy.retries` rounds of `policy.poll_interval`, pumping
/// the host's queued jobs so a worker blocked on the owning thread can
/// finish its scan. After that comes one `policy.grace` wait without
/// pumping. A worker still running then is abandoned.
pub(crate) fn stop(handle: WorkerHandle, policy: StopPolicy, host: &dyn BufferHost) -> Result<()> {
    handle.cancel.store(true, Ordering::Release);
    let name = handle.name().to_string();

    let finished = wait_for_exit(&handle, policy.poll_interval * policy.retries, Some(host))
        || wait_for_exit(&handle, policy.grace, None);
    if !finished {
        return Err(Error::WorkerAbandoned(policy.budget()));
    }

    debug!(worker = %name, "scan worker joined");
    handle
        .thread
        .join()
        .map_err(|payload| Error::ScanPanicked(panic_message(payload.as_ref())))
}

fn wait_for_exit(handle: &WorkerHandle, budget: Duration, host: Option<&dyn BufferHost>) -> bool {
    let deadline = Instant::now() + budget;
    loop {
        if handle.thread.is_finished() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        if let Some(host) = host {
            host.pump_pending();
        }
        thread::sleep(STOP_SPIN.min(deadline - now));
    }
}
