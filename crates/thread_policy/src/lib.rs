//! Process-wide thread-count policy.
//!
//! By default every available CPU is used. The parallel runtime's own settings
//! (`OMP_NUM_THREADS`, `OMP_THREAD_LIMIT`, or another library lowering its
//! ceiling) are respected, and [`set_thread_count`] caps this library alone.
//! After [`init`], a forked child drops to one thread to avoid deadlocking on a
//! pool inherited from its parent; call `set_thread_count(0)` in the child to
//! return to multi-threaded mode.

use log::info;

mod arg;
mod error;
mod fork;
mod policy;
mod report;
mod runtime;

pub use arg::ThreadArg;
pub use error::ThreadPolicyError;
pub use policy::ThreadPolicy;
pub use report::ThreadReport;
pub use runtime::{
    DefaultRuntime, ParallelRuntime, PoolRuntime, RuntimeConfig, SerialRuntime,
    NUM_THREADS_VAR, RAYON_NUM_THREADS_VAR, THREAD_LIMIT_VAR,
};

// Never touched directly outside the accessors below and the fork handler.
static POLICY: ThreadPolicy<DefaultRuntime> = ThreadPolicy::new(DefaultRuntime::new());

/// Call once when the library is loaded: reads the runtime configuration and
/// registers the fork-child handler.
pub fn init() -> Result<(), ThreadPolicyError> {
    // A child forked while another thread is still seeding the runtime would
    // inherit a half-initialised OnceLock and block on its first query.
    let _ = POLICY.runtime().max_threads();
    fork::install_fork_handler()
}

pub fn policy() -> &'static ThreadPolicy<DefaultRuntime> {
    &POLICY
}

pub fn get_thread_count() -> usize {
    POLICY.effective_threads()
}

/// Set the library-wide cap, returning the previous one. `0` means use all
/// the runtime allows.
pub fn set_thread_count(threads: impl Into<ThreadArg>) -> Result<usize, ThreadPolicyError> {
    POLICY.set_threads(threads)
}

pub fn thread_report() -> ThreadReport {
    let report = ThreadReport::collect(&POLICY, fork::fork_handler_installed());
    info!("Thread policy:\n{}", report);
    report
}

#[cfg(feature = "parallel")]
pub fn pool_builder() -> rayon::ThreadPoolBuilder {
    POLICY.pool_builder()
}
