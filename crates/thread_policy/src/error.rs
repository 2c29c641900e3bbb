use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ThreadPolicyError {
    #[error("Argument to set_thread_count must be a single integer >= 0, got {0}. Default 0 is recommended to use all CPU.")]
    InvalidArgument(String),

    #[error("Could not register fork handler (pthread_atfork returned {0})")]
    ForkHandler(i32),
}

impl ThreadPolicyError {
    pub(crate) fn invalid(got: impl Into<String>) -> Self {
        ThreadPolicyError::InvalidArgument(got.into())
    }
}
