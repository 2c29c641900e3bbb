use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use log::{debug, warn};

pub const NUM_THREADS_VAR: &str = "OMP_NUM_THREADS";
pub const THREAD_LIMIT_VAR: &str = "OMP_THREAD_LIMIT";
pub const RAYON_NUM_THREADS_VAR: &str = "RAYON_NUM_THREADS";

/// The parallel-execution runtime whose ceiling a [`crate::ThreadPolicy`]
/// negotiates with.
///
/// Implementations must keep `1 <= max_threads() <= thread_limit()` and must
/// not fail: the policy queries them from worker call sites.
pub trait ParallelRuntime: Send + Sync {
    /// Current configured ceiling.
    fn max_threads(&self) -> usize;

    /// Absolute ceiling the runtime never exceeds.
    fn thread_limit(&self) -> usize;

    /// Set the configured ceiling. Never called from a fork-child handler.
    fn set_num_threads(&self, n: usize);
}

/// Startup configuration of a [`PoolRuntime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub num_threads: usize,
    pub thread_limit: usize,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::resolve(lookup, num_cpus::get())
    }

    fn resolve<F>(lookup: F, cpus: usize) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let cpus = cpus.max(1);
        let thread_limit = read_count(&lookup, THREAD_LIMIT_VAR).unwrap_or(cpus);
        let num_threads = read_count(&lookup, NUM_THREADS_VAR)
            .or_else(|| read_count(&lookup, RAYON_NUM_THREADS_VAR))
            .unwrap_or(cpus);

        Self {
            num_threads: num_threads.clamp(1, thread_limit),
            thread_limit,
        }
    }
}

// OpenMP allows a nesting list ("8,4"); only the outer level matters here.
fn parse_count(raw: &str) -> Option<usize> {
    raw.split(',')
        .next()?
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|&n| n > 0)
}

fn read_count<F>(lookup: &F, var: &str) -> Option<usize>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(var)?;
    match parse_count(&raw) {
        Some(n) => Some(n),
        None => {
            warn!("Ignoring {}={:?}: expected a positive integer", var, raw);
            None
        }
    }
}

#[derive(Debug)]
struct PoolState {
    max: AtomicUsize,
    limit: usize,
}

impl From<RuntimeConfig> for PoolState {
    fn from(config: RuntimeConfig) -> Self {
        debug!(
            "Parallel runtime configured: max threads = {}, thread limit = {}",
            config.num_threads, config.thread_limit
        );
        PoolState {
            max: AtomicUsize::new(config.num_threads),
            limit: config.thread_limit,
        }
    }
}

/// In-process parallel runtime.
///
/// Seeded from the environment the first time it is queried, so a `static`
/// holding one costs nothing until the library actually asks for threads.
#[derive(Debug, Default)]
pub struct PoolRuntime {
    state: OnceLock<PoolState>,
}

impl PoolRuntime {
    pub const fn new() -> Self {
        PoolRuntime {
            state: OnceLock::new(),
        }
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let state = OnceLock::new();
        let _ = state.set(PoolState::from(config));
        PoolRuntime { state }
    }

    /// Whether the environment has been read yet.
    pub fn is_seeded(&self) -> bool {
        self.state.get().is_some()
    }

    fn state(&self) -> &PoolState {
        self.state
            .get_or_init(|| PoolState::from(RuntimeConfig::from_env()))
    }
}

impl ParallelRuntime for PoolRuntime {
    fn max_threads(&self) -> usize {
        self.state().max.load(Ordering::SeqCst)
    }

    fn thread_limit(&self) -> usize {
        self.state().limit
    }

    fn set_num_threads(&self, n: usize) {
        let state = self.state();
        let n = n.clamp(1, state.limit);
        let old = state.max.swap(n, Ordering::SeqCst);
        debug!("Parallel runtime max threads changed from {} to {}", old, n);
    }
}

/// Stand-in runtime for builds without the `parallel` feature.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialRuntime;

impl SerialRuntime {
    pub const fn new() -> Self {
        SerialRuntime
    }
}

impl ParallelRuntime for SerialRuntime {
    fn max_threads(&self) -> usize {
        1
    }

    fn thread_limit(&self) -> usize {
        1
    }

    fn set_num_threads(&self, _n: usize) {}
}

#[cfg(feature = "parallel")]
pub type DefaultRuntime = PoolRuntime;

#[cfg(not(feature = "parallel"))]
pub type DefaultRuntime = SerialRuntime;
