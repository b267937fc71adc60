pub mod errors;

/// Response fields the engine merges into a job's payload. Anything else a
/// worker sends back passes through the broker untouched and is never stored.
pub const RECOGNIZED_RESPONSE_FIELDS: &[&str] = &[
    "output",
    "transcription",
    "translations",
    "segments",
    "language",
    "detail",
];

pub const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 30;

pub const DEFAULT_WAITER_SWEEP_INTERVAL_SECS: u64 = 60;

pub const DEFAULT_STORE_PATH: &str = "scribeflow.redb";

use std::sync::LazyLock;

use tokio::runtime::{Builder, Runtime};

pub static CURRENT_NUM_THREADS: LazyLock<usize> = LazyLock::new(|| {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
});

// Rocket-specific Tokio Runtime
// This runtime is dedicated to handling network requests, with thread names clearly labeled.
pub static ROCKET_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .worker_threads(*CURRENT_NUM_THREADS)
        .thread_name("rocket-io-worker")
        .enable_all()
        .build()
        .expect("Failed to build Rocket Tokio runtime")
});

// Engine-specific Tokio Runtime
// Carries the broker consumer loops and the waiter sweeper, so a burst of
// HTTP traffic can never starve response handling.
pub static ENGINE_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .worker_threads(*CURRENT_NUM_THREADS)
        .thread_name("engine-worker")
        .enable_all()
        .build()
        .expect("Failed to build Engine Tokio runtime")
});
