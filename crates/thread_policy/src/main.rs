use env_logger::Builder;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::{env, io::Write, process};

use thread_policy::ThreadArg;

fn main() {
    Builder::from_default_env()
        .format(|buf, record| {
            writeln!(buf, "[{}] {}",
                record.level(),
                record.args()
            )
        })
        .init();

    if let Err(e) = thread_policy::init() {
        warn!("{}", e);
    }

    if let Some(arg) = env::args().nth(1) {
        let threads = match arg.parse::<f64>() {
            Ok(x) => ThreadArg::from(x),
            Err(_) => ThreadArg::from(arg.as_str()),
        };
        match thread_policy::set_thread_count(threads) {
            Ok(old) => info!("Thread cap changed from {} to {}", old, arg),
            Err(e) => {
                eprintln!("{}", e);
                process::exit(2);
            }
        }
    }

    println!("{}", thread_policy::thread_report());

    let pool = match thread_policy::pool_builder().build() {
        Ok(pool) => pool,
        Err(e) => {
            eprintln!("Could not build thread pool: {}", e);
            process::exit(1);
        }
    };
    let total: u64 = pool.install(|| (1..=10_000_000u64).into_par_iter().sum());
    debug!("sum = {}", total);
    println!("parallel sum on {} threads: {}", pool.current_num_threads(), total);

    #[cfg(unix)]
    fork_demo();
}

// The child reports its thread count through the exit status; printing from a
// forked child of a threaded process can block on a lock held at fork time.
#[cfg(unix)]
fn fork_demo() {
    let pid = unsafe { libc::fork() };
    match pid {
        -1 => warn!("fork failed"),
        0 => {
            let n = thread_policy::get_thread_count();
            unsafe { libc::_exit(n.min(255) as libc::c_int) }
        }
        pid => {
            let mut status: libc::c_int = 0;
            unsafe { libc::waitpid(pid, &mut status, 0) };
            if libc::WIFEXITED(status) {
                println!("forked child uses {} thread(s)", libc::WEXITSTATUS(status));
            }
            println!("parent still uses {} threads", thread_policy::get_thread_count());
        }
    }
}
