//! Minutely probe loop.
//!
//! A single detached thread waits for the next minute boundary, runs every
//! registered probe once in registration order, and waits again. Probes run
//! back-to-back on that thread, so a cycle never overlaps the previous one.
//! Errors and panics from a probe are logged and swallowed at the per-probe
//! boundary; nothing a probe does can stop the loop.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Result, anyhow};
use log::{debug, info};

use super::{
    LOG_TARGET,
    clock::{Clock, initial_wait_time, wait_time},
    registry::{Invocation, ProbeRegistry},
};
use crate::telemetry;

pub const THREAD_NAME: &str = "minutely-probes";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    WaitingForBoundary { seconds: u64 },
    RunningCycle,
}

pub struct Scheduler {
    registry: Arc<ProbeRegistry>,
    clock: Arc<dyn Clock>,
    shutdown: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new<C: Clock>(registry: Arc<ProbeRegistry>, clock: C) -> Self {
        Self {
            registry,
            clock: Arc::new(clock),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Use `flag` to stop the loop instead of a private one.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    /// Setting the returned flag stops the loop at its next wake-up.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Starts the loop on a detached thread. The join handle is dropped; the
    /// thread does not keep the process alive.
    pub fn spawn(self) -> std::io::Result<()> {
        thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || self.run())?;
        Ok(())
    }

    /// Runs until the shutdown flag is observed after a wait. Without a
    /// shutdown request this never returns.
    pub fn run(&self) {
        let mut state = LoopState::WaitingForBoundary {
            seconds: initial_wait_time(self.clock.second_of_minute()),
        };
        debug!(target: LOG_TARGET, "Minutely probes start in {state:?}");

        loop {
            state = match state {
                LoopState::WaitingForBoundary { seconds } => {
                    self.clock.sleep(Duration::from_secs(seconds));
                    if self.is_shutdown() {
                        info!(target: LOG_TARGET, "Minutely probes stopped");
                        return;
                    }
                    LoopState::RunningCycle
                }
                LoopState::RunningCycle => {
                    self.run_cycle();
                    LoopState::WaitingForBoundary {
                        seconds: wait_time(self.clock.second_of_minute()),
                    }
                }
            };
        }
    }

    /// Invokes every registered probe once.
    ///
    /// Names are captured when the cycle starts and each probe is looked up
    /// again right before it runs: a probe unregistered mid-cycle is
    /// skipped, one registered mid-cycle first runs next cycle.
    pub fn run_cycle(&self) {
        for name in self.registry.names() {
            self.run_probe(&name);
        }
    }

    fn run_probe(&self, name: &str) {
        let Some(invocation) = self.registry.invocation(name) else {
            return;
        };
        debug!(target: LOG_TARGET, "Gathering minutely metrics with `{}` probe", name);

        let started = Instant::now();
        let outcome = match invocation {
            Invocation::Stateless(probe) => catch_probe(|| probe.sample()),
            // The state's own Clone and Drop run in here too.
            Invocation::Stateful { probe, state } => catch_probe(|| {
                let next = probe.sample(name, state)?;
                drop(self.registry.store_state(name, next));
                Ok(())
            }),
        };

        telemetry::record_probe_run(name, started.elapsed(), outcome.is_ok());
        if let Err(e) = outcome {
            debug!(target: LOG_TARGET, "Error in minutely probe `{}`: {:#}", name, e);
        }
    }
}

fn catch_probe<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|payload| Err(anyhow!("probe panicked: {}", panic_message(&*payload))))
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}
