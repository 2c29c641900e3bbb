#[cfg(feature = "python")]
mod pybindings;

#[cfg(feature = "python")]
pub use pybindings::thread_policy_bindings;
