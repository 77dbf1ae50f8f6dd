use std::net::TcpListener;

use anyhow::Context;
use nix::sys::signal::{Signal as UnixSignal, kill};
use nix::sys::wait::{Id, WaitPidFlag, waitid, waitpid};
use nix::unistd::{ForkResult, Pid, fork};
use tracing::{error, info, warn};

use crate::server::shutdown_signal;

/// Forks `count` workers that all serve `listener`, then supervises them.
///
/// Each child runs `worker` on its own copy of the listening socket and exits
/// with its result; the kernel spreads accepted connections across them. The
/// parent waits for SIGINT/SIGTERM or for any worker to exit, then sends
/// SIGTERM to every worker and reaps them.
///
/// Must be called before any runtime or thread is started in this process.
pub fn serve_multiple<F>(count: usize, listener: &TcpListener, worker: F) -> anyhow::Result<()>
where
    F: Fn(TcpListener) -> anyhow::Result<()>,
{
    let mut children = Vec::with_capacity(count);
    for id in 0..count {
        // SAFETY: the caller guarantees the process is still single-threaded.
        let forked = unsafe { fork() };
        match forked {
            Ok(ForkResult::Child) => {
                let result = listener
                    .try_clone()
                    .context("cloning listening socket")
                    .and_then(&worker);
                let code = match result {
                    Ok(()) => 0,
                    Err(e) => {
                        error!(worker = id, "Worker failed: {:#}", e);
                        1
                    }
                };
                std::process::exit(code);
            }
            Ok(ForkResult::Parent { child }) => {
                info!(worker = id, pid = child.as_raw(), "Started worker");
                children.push(child);
            }
            Err(e) => {
                terminate(&children);
                return Err(e).context("forking worker");
            }
        }
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building supervisor runtime")?;
    runtime.block_on(supervise());
    // A waiter may still be blocked in waitpid.
    runtime.shutdown_background();

    terminate(&children);
    info!("All workers stopped");
    Ok(())
}

async fn supervise() {
    // WNOWAIT leaves the exited worker for `terminate` to reap.
    let worker_exit = tokio::task::spawn_blocking(|| {
        waitid(Id::All, WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT)
    });
    tokio::select! {
        _ = shutdown_signal() => {}
        exited = worker_exit => {
            warn!(status = ?exited, "Worker exited, stopping the rest");
        }
    }
}

fn terminate(children: &[Pid]) {
    for &child in children {
        // Workers that already exited report ESRCH.
        let _ = kill(child, UnixSignal::SIGTERM);
    }
    for &child in children {
        match waitpid(child, None) {
            Ok(status) => info!(pid = child.as_raw(), ?status, "Worker reaped"),
            Err(nix::errno::Errno::ECHILD) => {}
            Err(e) => warn!(pid = child.as_raw(), error = %e, "Failed to reap worker"),
        }
    }
}
