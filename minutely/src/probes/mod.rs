use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use log::warn;
use once_cell::sync::Lazy;

pub mod builtin;
pub mod clock;
pub mod registry;
pub mod scheduler;

pub use clock::{Clock, SystemClock};
pub use registry::{Probe, ProbeRegistry, StatefulProbe, StatelessProbe};
pub use scheduler::Scheduler;

/// Log target for all probe loop diagnostics.
pub const LOG_TARGET: &str = "minutely";

static REGISTRY: Lazy<Arc<ProbeRegistry>> = Lazy::new(|| Arc::new(ProbeRegistry::new()));

static SHUTDOWN: Lazy<Arc<AtomicBool>> = Lazy::new(|| Arc::new(AtomicBool::new(false)));

/// The process-wide registry used by [`register`], [`unregister`] and
/// [`start`].
pub fn registry() -> Arc<ProbeRegistry> {
    REGISTRY.clone()
}

pub fn shutdown_flag() -> Arc<AtomicBool> {
    SHUTDOWN.clone()
}

/// Asks loops started with [`start`] to exit at their next wake-up.
///
/// The flag is never cleared: loops started afterwards exit at their first
/// wake-up without running a cycle.
pub fn request_shutdown() {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

pub fn register(name: impl Into<String>, probe: Probe) {
    REGISTRY.register(name, probe);
}

pub fn unregister(name: &str) {
    REGISTRY.unregister(name);
}

/// Starts the minutely probe loop in the background and returns
/// immediately.
///
/// Each call spawns another loop over the same registry. After
/// [`request_shutdown`] a newly started loop exits at its first wake-up.
pub fn start() {
    let scheduler = Scheduler::new(registry(), SystemClock).with_shutdown(shutdown_flag());
    if let Err(e) = scheduler.spawn() {
        warn!(target: LOG_TARGET, "Failed to start minutely probes: {}", e);
    }
}
