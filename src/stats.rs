//! Defines the shared operation counters and the optional background
//! stats reporter.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::size::humanize_bytes;

/// Monotonic counters updated by every filesystem callback.
#[derive(Default)]
pub struct Counters {
    operations_total: AtomicU64,
    bytes_read_total: AtomicU64,
}

impl Counters {
    pub fn record_operation(&self) {
        self.operations_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_bytes_read(&self, n: u64) {
        self.bytes_read_total.fetch_add(n, Ordering::Relaxed);
    }

    pub fn operations_total(&self) -> u64 {
        self.operations_total.load(Ordering::Acquire)
    }

    pub fn bytes_read_total(&self) -> u64 {
        self.bytes_read_total.load(Ordering::Acquire)
    }
}

/// Handle to the background reporter thread. Dropping it does not stop
/// the thread; call [`StatsReporter::stop`] to request shutdown and join.
pub struct StatsReporter {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StatsReporter {
    /// Spawns a thread that wakes once per second, logs ops/s and bytes/s
    /// over the previous interval, and resets its sample base.
    pub fn spawn(counters: Arc<Counters>) -> Self {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = Arc::clone(&shutdown);

        let handle = thread::spawn(move || {
            let mut last_ops = counters.operations_total();
            let mut last_bytes = counters.bytes_read_total();

            while !thread_shutdown.load(Ordering::Acquire) {
                thread::sleep(Duration::from_secs(1));

                let ops = counters.operations_total();
                let bytes = counters.bytes_read_total();
                let ops_per_sec = ops.saturating_sub(last_ops);
                let bytes_per_sec = bytes.saturating_sub(last_bytes);

                tracing::info!(
                    ops_per_sec,
                    bytes_per_sec,
                    "{ops_per_sec} ops/s, {} /s",
                    humanize_bytes(bytes_per_sec)
                );

                last_ops = ops;
                last_bytes = bytes;
            }
        });

        Self { shutdown, handle: Some(handle) }
    }

    /// Signals the reporter thread to stop and joins it.
    pub fn stop(mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StatsReporter {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
    }
}
