use std::fmt;

use crate::policy::ThreadPolicy;
use crate::runtime::{ParallelRuntime, NUM_THREADS_VAR, RAYON_NUM_THREADS_VAR, THREAD_LIMIT_VAR};

/// Snapshot of everything that feeds into the effective thread count.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadReport {
    pub logical_cpus: usize,
    pub physical_cpus: usize,
    pub runtime_max: usize,
    pub thread_limit: usize,
    pub requested: usize,
    pub effective: usize,
    pub fork_handler_installed: bool,
    pub env: Vec<(&'static str, Option<String>)>,
}

impl ThreadReport {
    pub fn collect<R: ParallelRuntime>(policy: &ThreadPolicy<R>, fork_handler_installed: bool) -> Self {
        let env = [NUM_THREADS_VAR, THREAD_LIMIT_VAR, RAYON_NUM_THREADS_VAR]
            .into_iter()
            .map(|var| (var, std::env::var(var).ok()))
            .collect();

        ThreadReport {
            logical_cpus: num_cpus::get(),
            physical_cpus: num_cpus::get_physical(),
            runtime_max: policy.runtime().max_threads(),
            thread_limit: policy.runtime().thread_limit(),
            requested: policy.requested(),
            effective: policy.effective_threads(),
            fork_handler_installed,
            env,
        }
    }
}

impl fmt::Display for ThreadReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  CPUs: {} logical, {} physical",
            self.logical_cpus, self.physical_cpus
        )?;
        writeln!(f, "  runtime max threads: {}", self.runtime_max)?;
        writeln!(f, "  runtime thread limit: {}", self.thread_limit)?;
        let requested = match self.requested {
            0 => "0 (automatic)".to_string(),
            n => n.to_string(),
        };
        writeln!(f, "  requested threads: {}", requested)?;
        writeln!(
            f,
            "  fork handler: {}",
            if self.fork_handler_installed { "installed" } else { "not installed" }
        )?;
        for (var, value) in &self.env {
            writeln!(f, "  {}: {}", var, value.as_deref().unwrap_or("unset"))?;
        }
        write!(f, "  using {} threads", self.effective)
    }
}
