//! Shutdown on SIGINT and SIGTERM.
//!
//! The first signal raises the poll loop's stop flag, so the pass in flight
//! finishes and both adapters are closed. A second signal exits at once.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

/// Starts a background thread that raises `stop` when a shutdown signal
/// arrives.
///
/// The handlers are registered before this returns, so a signal sent right
/// after it is not lost.
pub fn install(stop: Arc<AtomicBool>) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let mut signals = {
        let _guard = runtime.enter();
        Signals::register()?
    };

    std::thread::Builder::new()
        .name("caes-signals".into())
        .spawn(move || {
            runtime.block_on(async {
                let name = signals.next().await;
                info!(signal = name, "shutdown requested, finishing the current pass");
                stop.store(true, Ordering::SeqCst);

                let name = signals.next().await;
                warn!(signal = name, "second shutdown signal, exiting immediately");
                std::process::exit(130);
            })
        })?;
    Ok(())
}

#[cfg(unix)]
struct Signals {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn register() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn next(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn register() -> io::Result<Self> {
        Ok(Self)
    }

    async fn next(&mut self) -> &'static str {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        "ctrl-c"
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::process::Command;
    use std::time::{Duration, Instant};

    #[test]
    fn sigterm_raises_the_stop_flag() {
        let stop = Arc::new(AtomicBool::new(false));
        install(Arc::clone(&stop)).unwrap();

        let status = Command::new("kill")
            .args(["-TERM", &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());

        let deadline = Instant::now() + Duration::from_secs(5);
        while !stop.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(stop.load(Ordering::SeqCst));
    }
}
