use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;

use crate::arg::ThreadArg;
use crate::error::ThreadPolicyError;
use crate::runtime::ParallelRuntime;

/// How many threads a library may use, negotiated against a
/// [`ParallelRuntime`].
///
/// `requested == 0` means "whatever the runtime allows", any other value caps
/// the runtime's ceiling. The state is a single atomic so that the fork-child
/// hook can reset it without locking.
#[derive(Debug)]
pub struct ThreadPolicy<R> {
    requested: AtomicUsize,
    runtime: R,
}

impl<R: ParallelRuntime> ThreadPolicy<R> {
    pub const fn new(runtime: R) -> Self {
        ThreadPolicy {
            requested: AtomicUsize::new(0),
            runtime,
        }
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn requested(&self) -> usize {
        self.requested.load(Ordering::SeqCst)
    }

    /// Thread count parallel regions should use. Always in `[1, thread_limit]`.
    pub fn effective_threads(&self) -> usize {
        let max = self.runtime.max_threads();
        let ans = match self.requested() {
            0 => max,
            requested => requested.min(max),
        };
        ans.min(self.runtime.thread_limit()).max(1)
    }

    /// Validate `threads` and apply it, returning the previous requested value.
    /// On error nothing changes.
    pub fn set_threads(&self, threads: impl Into<ThreadArg>) -> Result<usize, ThreadPolicyError> {
        let n = threads.into().to_thread_count()?;
        Ok(self.set_requested(n))
    }

    /// Swap the requested count to `n` and, when the runtime has been throttled
    /// below its limit, raise it far enough to honour the request.
    pub fn set_requested(&self, n: usize) -> usize {
        let old = self.requested.swap(n, Ordering::SeqCst);
        debug!("Requested threads changed from {} to {}", old, n);

        let max = self.runtime.max_threads();
        let limit = self.runtime.thread_limit();
        if max < limit {
            if n == 0 {
                // e.g. after a fork dropped us to one thread: back to everything
                self.runtime.set_num_threads(limit);
            } else if n > max {
                self.runtime.set_num_threads(n.min(limit));
            }
        }
        old
    }

    /// Fork-child handler body. Only an atomic store: no runtime calls, no
    /// allocation, no locks, no logging. Multi-threading stays off until the
    /// user calls `set_requested(0)` again.
    pub fn on_fork_child(&self) {
        self.requested.store(1, Ordering::SeqCst);
    }

    /// A rayon pool builder sized from [`Self::effective_threads`].
    #[cfg(feature = "parallel")]
    pub fn pool_builder(&self) -> rayon::ThreadPoolBuilder {
        rayon::ThreadPoolBuilder::new().num_threads(self.effective_threads())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Runtime double that records every call to its mutator.
    #[derive(Debug)]
    pub(crate) struct FakeRuntime {
        max: AtomicUsize,
        limit: usize,
        set_calls: AtomicUsize,
    }

    impl FakeRuntime {
        pub(crate) fn new(max: usize, limit: usize) -> Self {
            FakeRuntime {
                max: AtomicUsize::new(max),
                limit,
                set_calls: AtomicUsize::new(0),
            }
        }

        /// Another library lowering the ceiling behind our back.
        pub(crate) fn throttle(&self, max: usize) {
            self.max.store(max, Ordering::SeqCst);
        }

        pub(crate) fn set_calls(&self) -> usize {
            self.set_calls.load(Ordering::SeqCst)
        }
    }

    impl ParallelRuntime for FakeRuntime {
        fn max_threads(&self) -> usize {
            self.max.load(Ordering::SeqCst)
        }

        fn thread_limit(&self) -> usize {
            self.limit
        }

        fn set_num_threads(&self, n: usize) {
            self.set_calls.fetch_add(1, Ordering::SeqCst);
            self.max.store(n.clamp(1, self.limit), Ordering::SeqCst);
        }
    }

    #[test]
    fn test_automatic_uses_runtime_max() {
        let policy = ThreadPolicy::new(FakeRuntime::new(8, 16));
        assert_eq!(policy.requested(), 0);
        assert_eq!(policy.effective_threads(), 8);
    }

    #[test]
    fn test_cap_below_runtime_max() {
        let policy = ThreadPolicy::new(FakeRuntime::new(8, 8));
        assert_eq!(policy.set_requested(3), 0);
        assert_eq!(policy.effective_threads(), 3);
        assert_eq!(policy.runtime().set_calls(), 0);
    }

    #[test]
    fn test_repeated_set_returns_previous() {
        let policy = ThreadPolicy::new(FakeRuntime::new(8, 8));
        assert_eq!(policy.set_requested(5), 0);
        assert_eq!(policy.set_requested(5), 5);
        assert_eq!(policy.set_requested(0), 5);
    }

    #[test]
    fn test_effective_never_exceeds_request() {
        let policy = ThreadPolicy::new(FakeRuntime::new(4, 16));
        for n in 0..40 {
            policy.set_requested(n);
            let effective = policy.effective_threads();
            assert!(effective >= 1);
            assert!(effective <= policy.runtime().thread_limit());
            if n > 0 {
                assert!(effective <= n);
            } else {
                assert_eq!(effective, policy.runtime().max_threads().max(1));
            }
        }
    }

    #[test]
    fn test_no_reconciliation_at_limit() {
        // max == limit: the runtime is never touched, whatever is asked
        let policy = ThreadPolicy::new(FakeRuntime::new(8, 8));
        policy.set_requested(0);
        policy.set_requested(64);
        assert_eq!(policy.runtime().set_calls(), 0);
        assert_eq!(policy.effective_threads(), 8);
    }

    #[test]
    fn test_larger_request_raises_throttled_runtime() {
        let policy = ThreadPolicy::new(FakeRuntime::new(2, 16));
        policy.set_requested(6);
        assert_eq!(policy.runtime().max_threads(), 6);
        assert_eq!(policy.effective_threads(), 6);

        policy.set_requested(64);
        assert_eq!(policy.runtime().max_threads(), 16);
        assert_eq!(policy.effective_threads(), 16);
    }

    #[test]
    fn test_smaller_request_leaves_runtime_alone() {
        let policy = ThreadPolicy::new(FakeRuntime::new(4, 16));
        policy.set_requested(3);
        assert_eq!(policy.runtime().set_calls(), 0);
        assert_eq!(policy.runtime().max_threads(), 4);
        assert_eq!(policy.effective_threads(), 3);
    }

    #[test]
    fn test_invalid_arguments_leave_state_unchanged() {
        let policy = ThreadPolicy::new(FakeRuntime::new(8, 8));
        policy.set_requested(4);
        let before = policy.effective_threads();

        let bad: Vec<ThreadArg> = vec![
            ThreadArg::from(-1i64),
            ThreadArg::from(2.5),
            ThreadArg::Missing,
            ThreadArg::from(vec![2i64, 3]),
        ];
        for arg in bad {
            assert!(matches!(
                policy.set_threads(arg),
                Err(ThreadPolicyError::InvalidArgument(_))
            ));
            assert_eq!(policy.requested(), 4);
            assert_eq!(policy.effective_threads(), before);
        }
    }

    #[test]
    fn test_set_threads_accepts_host_values() {
        let policy = ThreadPolicy::new(FakeRuntime::new(8, 8));
        assert_eq!(policy.set_threads(2.0), Ok(0));
        assert_eq!(policy.set_threads(vec![6i64]), Ok(2));
        assert_eq!(policy.effective_threads(), 6);
    }

    #[test]
    fn test_fork_child_drops_to_one_thread() {
        let policy = ThreadPolicy::new(FakeRuntime::new(8, 8));
        policy.set_requested(8);
        let calls = policy.runtime().set_calls();

        policy.on_fork_child();
        assert_eq!(policy.effective_threads(), 1);
        assert_eq!(policy.runtime().set_calls(), calls);
        assert_eq!(policy.runtime().max_threads(), 8);
    }

    #[test]
    fn test_fork_child_from_automatic() {
        let policy = ThreadPolicy::new(FakeRuntime::new(8, 8));
        policy.on_fork_child();
        assert_eq!(policy.requested(), 1);
        assert_eq!(policy.effective_threads(), 1);
    }

    #[test]
    fn test_recovery_after_fork() {
        let policy = ThreadPolicy::new(FakeRuntime::new(8, 16));
        policy.on_fork_child();
        policy.runtime().throttle(8);
        assert_eq!(policy.effective_threads(), 1);

        assert_eq!(policy.set_requested(0), 1);
        assert_eq!(policy.runtime().max_threads(), 16);
        assert_eq!(policy.effective_threads(), 16);
    }

    #[test]
    fn test_recovery_after_single_threading_by_other_code() {
        let policy = ThreadPolicy::new(FakeRuntime::new(12, 12));
        policy.runtime().throttle(1);
        assert_eq!(policy.effective_threads(), 1);

        policy.set_requested(0);
        assert_eq!(policy.effective_threads(), 12);
    }

    #[test]
    fn test_concurrent_reads() {
        let policy = ThreadPolicy::new(FakeRuntime::new(8, 8));
        policy.set_requested(3);
        std::thread::scope(|s| {
            let readers: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        (0..10_000)
                            .map(|_| policy.effective_threads())
                            .all(|n| n == 3 || n == 5)
                    })
                })
                .collect();
            s.spawn(|| {
                for _ in 0..100 {
                    policy.set_requested(5);
                    policy.set_requested(3);
                }
            });
            for reader in readers {
                assert!(reader.join().unwrap());
            }
        });
    }

    #[test]
    fn test_concurrent_setters_lose_no_update() {
        let policy = ThreadPolicy::new(FakeRuntime::new(64, 64));
        // every value 1..=32 is set exactly once, so each previous value must be
        // returned exactly once as well
        let mut seen: Vec<usize> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|t| {
                    let policy = &policy;
                    s.spawn(move || {
                        (1..=8)
                            .map(|i| policy.set_requested(t * 8 + i))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|h| h.join().unwrap())
                .collect()
        });
        seen.push(policy.requested());
        seen.sort_unstable();
        assert_eq!(seen, (0..=32).collect::<Vec<_>>());
    }

    #[cfg(feature = "parallel")]
    #[test]
    fn test_pool_builder_uses_effective_threads() {
        let policy = ThreadPolicy::new(FakeRuntime::new(8, 8));
        policy.set_requested(2);
        let pool = policy.pool_builder().build().unwrap();
        assert_eq!(pool.current_num_threads(), 2);
    }
}
