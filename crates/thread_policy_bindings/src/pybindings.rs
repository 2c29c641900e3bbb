use log::warn;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::{PyBool, PyFloat, PyInt, PyList, PyString, PyTuple};
use pyo3::wrap_pyfunction;

use thread_policy::ThreadArg;

// Python's loose typing mapped onto what the policy validates. bool is checked
// before int because it is an int subclass.
fn to_thread_arg(value: &Bound<'_, PyAny>) -> PyResult<ThreadArg> {
    if value.is_none() {
        return Ok(ThreadArg::Missing);
    }
    if value.is_instance_of::<PyBool>() {
        return Ok(ThreadArg::Logical(value.extract::<bool>()?));
    }
    if value.is_instance_of::<PyInt>() {
        return Ok(match value.extract::<i64>() {
            Ok(n) => ThreadArg::Integer(n),
            Err(_) => match value.extract::<u64>() {
                Ok(n) => ThreadArg::Unsigned(n),
                Err(_) => ThreadArg::Text(value.repr()?.to_string()),
            },
        });
    }
    if value.is_instance_of::<PyFloat>() {
        return Ok(ThreadArg::Real(value.extract::<f64>()?));
    }
    if value.is_instance_of::<PyString>() {
        return Ok(ThreadArg::Text(value.extract::<String>()?));
    }
    if value.is_instance_of::<PyList>() || value.is_instance_of::<PyTuple>() {
        let items = value
            .try_iter()?
            .map(|item| to_thread_arg(&item?))
            .collect::<PyResult<Vec<_>>>()?;
        return Ok(ThreadArg::Sequence(items));
    }
    // numpy integer scalars and other __index__ implementors
    if let Ok(n) = value.extract::<i64>() {
        return Ok(ThreadArg::Integer(n));
    }
    Ok(ThreadArg::Text(value.repr()?.to_string()))
}

/// Number of threads parallel work in this library will use.
#[pyfunction]
#[pyo3(signature = (verbose=false))]
fn get_threads(verbose: bool) -> usize {
    if verbose {
        println!("{}", thread_policy::thread_report());
    }
    thread_policy::get_thread_count()
}

/// Cap the threads used by this library and return the previous cap.
/// 0 (recommended) uses all the CPU the runtime allows.
#[pyfunction]
#[pyo3(signature = (threads))]
fn set_threads(threads: &Bound<'_, PyAny>) -> PyResult<usize> {
    let arg = to_thread_arg(threads)?;
    thread_policy::set_thread_count(arg).map_err(|e| PyValueError::new_err(e.to_string()))
}

#[pymodule]
pub fn thread_policy_bindings(m: &Bound<PyModule>) -> PyResult<()> {
    if let Err(e) = thread_policy::init() {
        warn!("{}", e);
    }
    m.add_function(wrap_pyfunction!(get_threads, m)?)?;
    m.add_function(wrap_pyfunction!(set_threads, m)?)?;
    Ok(())
}
