use std::fmt;

use crate::error::ThreadPolicyError;

/// A thread-count argument as a host runtime hands it over.
///
/// Hosts are loosely typed: a Python caller may pass `None`, a float or a list
/// where an integer is expected. Only a single non-negative integral value is
/// accepted by [`ThreadArg::to_thread_count`].
#[derive(Debug, Clone, PartialEq)]
pub enum ThreadArg {
    Missing,
    Integer(i64),
    Unsigned(u64),
    Real(f64),
    Logical(bool),
    Text(String),
    Sequence(Vec<ThreadArg>),
}

impl ThreadArg {
    pub fn to_thread_count(&self) -> Result<usize, ThreadPolicyError> {
        match self {
            ThreadArg::Integer(n) => {
                usize::try_from(*n).map_err(|_| ThreadPolicyError::invalid(self.to_string()))
            }
            ThreadArg::Unsigned(n) => {
                usize::try_from(*n).map_err(|_| ThreadPolicyError::invalid(self.to_string()))
            }
            ThreadArg::Real(x) => {
                // integral doubles are what most hosts send for a literal like `4`
                if x.is_finite() && x.fract() == 0.0 && *x >= 0.0 && *x < usize::MAX as f64 {
                    Ok(*x as usize)
                } else {
                    Err(ThreadPolicyError::invalid(self.to_string()))
                }
            }
            ThreadArg::Sequence(items) if items.len() == 1 => items[0].to_thread_count(),
            _ => Err(ThreadPolicyError::invalid(self.to_string())),
        }
    }
}

impl fmt::Display for ThreadArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadArg::Missing => write!(f, "a missing value"),
            ThreadArg::Integer(n) => write!(f, "{}", n),
            ThreadArg::Unsigned(n) => write!(f, "{}", n),
            ThreadArg::Real(x) => write!(f, "{}", x),
            ThreadArg::Logical(b) => write!(f, "logical {}", b),
            ThreadArg::Text(s) => write!(f, "text {:?}", s),
            ThreadArg::Sequence(items) => write!(f, "a sequence of length {}", items.len()),
        }
    }
}

impl From<usize> for ThreadArg {
    fn from(n: usize) -> Self {
        ThreadArg::Unsigned(n as u64)
    }
}

impl From<u64> for ThreadArg {
    fn from(n: u64) -> Self {
        ThreadArg::Unsigned(n)
    }
}

impl From<u32> for ThreadArg {
    fn from(n: u32) -> Self {
        ThreadArg::Integer(i64::from(n))
    }
}

impl From<i32> for ThreadArg {
    fn from(n: i32) -> Self {
        ThreadArg::Integer(i64::from(n))
    }
}

impl From<i64> for ThreadArg {
    fn from(n: i64) -> Self {
        ThreadArg::Integer(n)
    }
}

impl From<f64> for ThreadArg {
    fn from(x: f64) -> Self {
        ThreadArg::Real(x)
    }
}

impl From<bool> for ThreadArg {
    fn from(b: bool) -> Self {
        ThreadArg::Logical(b)
    }
}

impl From<&str> for ThreadArg {
    fn from(s: &str) -> Self {
        ThreadArg::Text(s.to_string())
    }
}

impl<T: Into<ThreadArg>> From<Option<T>> for ThreadArg {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(ThreadArg::Missing)
    }
}

impl<T: Into<ThreadArg>> From<Vec<T>> for ThreadArg {
    fn from(values: Vec<T>) -> Self {
        ThreadArg::Sequence(values.into_iter().map(Into::into).collect())
    }
}
