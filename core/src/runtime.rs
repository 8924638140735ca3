//! Process runtime for the miner daemon.
//!
//! The daemon is a fixed, small set of long-running workers (the consensus
//! driver, the HTTP ingress), so the runtime stays minimal: one named thread
//! per service and one shared shutdown token that every service polls. There
//! is no per-service stop channel and no service lookup.

use log::{info, trace, warn};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Cooperative stop flag shared by the runtime and every service thread.
/// Tripping it is idempotent and never blocks.
#[derive(Clone, Default)]
pub struct ShutdownToken {
    triggered: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }
}

/// A long-running worker of the daemon. `run` owns its thread until the
/// shutdown token trips; every wait loop inside it must poll the token.
pub trait Service: Send + Sync {
    fn name(&self) -> &'static str;
    fn run(self: Arc<Self>, shutdown: ShutdownToken);
}

/// Drives the registered services for the lifetime of the process.
///
/// The first service to return or crash trips the shared token, so the
/// process winds down as a unit rather than limping along with a dead
/// worker. Ctrl-C trips the same token; a second Ctrl-C halts immediately.
pub struct Runtime {
    shutdown: ShutdownToken,
    services: Vec<Arc<dyn Service>>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self { shutdown: ShutdownToken::new(), services: Vec::new() }
    }

    pub fn register(&mut self, service: Arc<dyn Service>) {
        trace!("[runtime] registered service {}", service.name());
        self.services.push(service);
    }

    pub fn shutdown_token(&self) -> ShutdownToken {
        self.shutdown.clone()
    }

    /// Installs the Ctrl-C hook, spawns every registered service on its own
    /// named thread and blocks until all of them have returned.
    pub fn run(self) {
        self.install_ctrlc_hook();

        let mut workers = Vec::with_capacity(self.services.len());
        for service in &self.services {
            let name = service.name();
            let service = service.clone();
            let shutdown = self.shutdown.clone();
            let worker = thread::Builder::new()
                .name(name.into())
                .spawn(move || {
                    if catch_unwind(AssertUnwindSafe(|| service.run(shutdown.clone()))).is_err() {
                        warn!("[{}] service crashed", name);
                    }
                    shutdown.trigger();
                })
                .expect("Failed spawning a service thread");
            trace!("[{}] service started", name);
            workers.push(worker);
        }

        // Join in reverse registration order
        for worker in workers.into_iter().rev() {
            let name = worker.thread().name().unwrap_or("service").to_string();
            match worker.join() {
                Ok(()) => info!("[{}] stopped", name),
                Err(_) => warn!("[{}] worker thread did not stop cleanly", name),
            }
        }
    }

    fn install_ctrlc_hook(&self) {
        let shutdown = self.shutdown.clone();
        ctrlc::set_handler(move || {
            if shutdown.is_triggered() {
                eprintln!("^SIGNAL - halting immediately");
                std::process::exit(1);
            }
            info!("shutdown requested, draining services (Ctrl-C again to halt)");
            shutdown.trigger();
        })
        .expect("Error setting signal handler");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct OneShot {
        finished: Arc<AtomicBool>,
    }

    impl Service for OneShot {
        fn name(&self) -> &'static str {
            "one-shot"
        }

        fn run(self: Arc<Self>, _shutdown: ShutdownToken) {
            self.finished.store(true, Ordering::SeqCst);
        }
    }

    struct Poller {
        rounds: Arc<AtomicUsize>,
    }

    impl Service for Poller {
        fn name(&self) -> &'static str {
            "poller"
        }

        fn run(self: Arc<Self>, shutdown: ShutdownToken) {
            while !shutdown.is_triggered() {
                self.rounds.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(5));
            }
        }
    }

    #[test]
    fn test_first_service_to_return_drains_the_rest() {
        // The poller alone would spin forever; the one-shot returning must
        // trip the shared token and let run() come back.
        let finished = Arc::new(AtomicBool::new(false));
        let rounds = Arc::new(AtomicUsize::new(0));
        let mut runtime = Runtime::new();
        runtime.register(Arc::new(Poller { rounds: rounds.clone() }));
        runtime.register(Arc::new(OneShot { finished: finished.clone() }));
        let token = runtime.shutdown_token();
        runtime.run();
        assert!(finished.load(Ordering::SeqCst));
        assert!(token.is_triggered());
    }

    #[test]
    fn test_token_is_shared_and_idempotent() {
        let token = ShutdownToken::new();
        let observer = token.clone();
        assert!(!observer.is_triggered());
        token.trigger();
        token.trigger();
        assert!(observer.is_triggered());
    }
}
