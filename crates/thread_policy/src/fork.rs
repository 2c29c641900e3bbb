use std::sync::OnceLock;

use log::{debug, warn};

use crate::error::ThreadPolicyError;

static REGISTERED: OnceLock<Result<(), ThreadPolicyError>> = OnceLock::new();

// Runs in the child straight after fork(), before anything else. Must stay a
// single atomic store: calling the runtime's set_num_threads here has been
// seen to hang or crash forked children on some platforms.
#[cfg(unix)]
unsafe extern "C" fn when_fork() {
    crate::POLICY.on_fork_child();
}

/// Register the fork-child handler with the C library. Safe to call more than
/// once; registration happens on the first call only.
pub(crate) fn install_fork_handler() -> Result<(), ThreadPolicyError> {
    REGISTERED.get_or_init(register).clone()
}

pub(crate) fn fork_handler_installed() -> bool {
    matches!(REGISTERED.get(), Some(Ok(())))
}

#[cfg(unix)]
fn register() -> Result<(), ThreadPolicyError> {
    let rc = unsafe { libc::pthread_atfork(None, None, Some(when_fork)) };
    if rc == 0 {
        debug!("Registered fork-child handler");
        Ok(())
    } else {
        warn!("pthread_atfork failed with code {}; forked children keep the parent's thread count", rc);
        Err(ThreadPolicyError::ForkHandler(rc))
    }
}

#[cfg(not(unix))]
fn register() -> Result<(), ThreadPolicyError> {
    debug!("No fork on this platform, fork-child handler not needed");
    Ok(())
}
