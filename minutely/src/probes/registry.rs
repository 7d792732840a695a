//! Probe registry.
//!
//! Owns two mappings behind a single lock: probe name → probe, and probe
//! name → last state returned by a stateful probe. The host mutates it via
//! [`ProbeRegistry::register`] / [`ProbeRegistry::unregister`] while the
//! scheduler thread reads it once per minute.

use std::{
    any::Any,
    marker::PhantomData,
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::Result;
use log::debug;

use super::LOG_TARGET;

/// Opaque state kept between invocations of a stateful probe.
///
/// Shared rather than boxed so handing it to the scheduler never runs the
/// state type's own `Clone` or `Drop` while the registry lock is held.
pub(crate) type ProbeState = Arc<dyn Any + Send + Sync>;

/// A probe invoked for its side effect only.
pub trait StatelessProbe: Send + Sync + 'static {
    fn sample(&self) -> Result<()>;
}

impl<F> StatelessProbe for F
where
    F: Fn() -> Result<()> + Send + Sync + 'static,
{
    fn sample(&self) -> Result<()> {
        self()
    }
}

/// A probe that receives the state it returned on its previous run.
///
/// `state` is `None` on the first run, and whenever the previous run
/// itself returned `None`.
pub trait StatefulProbe<S>: Send + Sync + 'static {
    fn sample(&self, state: Option<S>) -> Result<Option<S>>;
}

impl<S, F> StatefulProbe<S> for F
where
    F: Fn(Option<S>) -> Result<Option<S>> + Send + Sync + 'static,
{
    fn sample(&self, state: Option<S>) -> Result<Option<S>> {
        self(state)
    }
}

/// Type-erased view of a [`StatefulProbe`] so probes with different state
/// types can share one map.
pub(crate) trait ErasedStatefulProbe: Send + Sync {
    /// Clones the typed value out of `stored` and runs the probe with it.
    /// A value stored by a probe with a different state type is replaced by
    /// `None`.
    fn sample(&self, name: &str, stored: Option<ProbeState>) -> Result<ProbeState>;
}

struct TypedStatefulProbe<S, P> {
    probe: P,
    _state: PhantomData<fn(S) -> S>,
}

impl<S, P> ErasedStatefulProbe for TypedStatefulProbe<S, P>
where
    S: Clone + Send + Sync + 'static,
    P: StatefulProbe<S>,
{
    fn sample(&self, name: &str, stored: Option<ProbeState>) -> Result<ProbeState> {
        let state = match stored.as_deref() {
            None => None,
            Some(stored) => match stored.downcast_ref::<Option<S>>() {
                Some(state) => state.clone(),
                None => {
                    debug!(
                        target: LOG_TARGET,
                        "Discarding state of `{}` left by a probe with a different state type",
                        name
                    );
                    None
                }
            },
        };
        let next = self.probe.sample(state)?;
        Ok(Arc::new(next))
    }
}

/// A registered probe, tagged with the shape the host declared for it.
#[derive(Clone)]
pub struct Probe {
    kind: ProbeKind,
}

#[derive(Clone)]
enum ProbeKind {
    Stateless(Arc<dyn StatelessProbe>),
    Stateful(Arc<dyn ErasedStatefulProbe>),
}

impl Probe {
    pub fn stateless<P>(probe: P) -> Self
    where
        P: StatelessProbe,
    {
        Self {
            kind: ProbeKind::Stateless(Arc::new(probe)),
        }
    }

    pub fn stateful<S, P>(probe: P) -> Self
    where
        S: Clone + Send + Sync + 'static,
        P: StatefulProbe<S>,
    {
        Self {
            kind: ProbeKind::Stateful(Arc::new(TypedStatefulProbe {
                probe,
                _state: PhantomData,
            })),
        }
    }

    pub fn is_stateful(&self) -> bool {
        matches!(self.kind, ProbeKind::Stateful(_))
    }
}

impl std::fmt::Debug for Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            ProbeKind::Stateless(_) => f.write_str("Probe::Stateless"),
            ProbeKind::Stateful(_) => f.write_str("Probe::Stateful"),
        }
    }
}

#[derive(Default)]
struct Entries {
    // Insertion-ordered; probe counts are small so a linear scan is fine.
    probes: Vec<(String, Probe)>,
    states: Vec<(String, ProbeState)>,
}

impl Entries {
    fn probe(&self, name: &str) -> Option<&Probe> {
        self.probes.iter().find(|(n, _)| n == name).map(|(_, p)| p)
    }

    fn state(&self, name: &str) -> Option<&ProbeState> {
        self.states.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }
}

/// What the scheduler needs to invoke one probe outside the lock.
pub(crate) enum Invocation {
    Stateless(Arc<dyn StatelessProbe>),
    Stateful {
        probe: Arc<dyn ErasedStatefulProbe>,
        state: Option<ProbeState>,
    },
}

#[derive(Default)]
pub struct ProbeRegistry {
    entries: Mutex<Entries>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // Probes run outside the lock, so a poisoned lock only means a host
    // thread panicked mid-insert; the data is still usable.
    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Inserts `probe` under `name`, replacing any probe already registered
    /// with that name. A stored state for `name` is kept.
    pub fn register(&self, name: impl Into<String>, probe: Probe) {
        let name = name.into();
        let mut entries = self.lock();

        match entries.probes.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => {
                debug!(
                    target: LOG_TARGET,
                    "A probe with the name `{}` is already registered. Overwriting the entry with the new probe.",
                    name
                );
                *existing = probe;
            }
            None => entries.probes.push((name, probe)),
        }
    }

    /// Removes the probe and its state. Unknown names are ignored.
    pub fn unregister(&self, name: &str) {
        let removed = {
            let mut entries = self.lock();
            entries.probes.retain(|(n, _)| n != name);
            let position = entries.states.iter().position(|(n, _)| n == name);
            position.map(|i| entries.states.remove(i))
        };
        // Dropped after the guard is released.
        drop(removed);
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.lock().probes.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().probe(name).is_some()
    }

    /// Whether a state entry exists for `name`.
    pub fn has_state(&self, name: &str) -> bool {
        self.lock().state(name).is_some()
    }

    /// Looks `name` up at invocation time. Returns `None` if it was
    /// unregistered since the cycle started.
    pub(crate) fn invocation(&self, name: &str) -> Option<Invocation> {
        let entries = self.lock();

        match &entries.probe(name)?.kind {
            ProbeKind::Stateless(probe) => Some(Invocation::Stateless(probe.clone())),
            ProbeKind::Stateful(probe) => Some(Invocation::Stateful {
                probe: probe.clone(),
                state: entries.state(name).cloned(),
            }),
        }
    }

    /// Stores the state returned by a successful stateful run and hands back
    /// whatever was displaced: the previous state, or `state` itself if the
    /// probe was unregistered while it ran. The caller drops it outside the
    /// lock.
    #[must_use]
    pub(crate) fn store_state(&self, name: &str, state: ProbeState) -> Option<ProbeState> {
        let mut entries = self.lock();
        if entries.probe(name).is_none() {
            return Some(state);
        }

        match entries.states.iter_mut().find(|(n, _)| n == name) {
            Some((_, existing)) => Some(std::mem::replace(existing, state)),
            None => {
                entries.states.push((name.to_string(), state));
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> Probe {
        Probe::stateless(|| anyhow::Ok(()))
    }

    fn counter() -> Probe {
        Probe::stateful(|state: Option<u32>| anyhow::Ok(Some(state.unwrap_or(0) + 1)))
    }

    #[test]
    fn test_register_keeps_registration_order() {
        let registry = ProbeRegistry::new();
        registry.register("b", noop());
        registry.register("a", noop());
        registry.register("c", noop());

        assert_eq!(registry.names(), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_register_overwrite_keeps_position() {
        let registry = ProbeRegistry::new();
        registry.register("first", noop());
        registry.register("second", noop());
        registry.register("first", counter());

        assert_eq!(registry.names(), vec!["first", "second"]);
        assert_eq!(registry.len(), 2);
        assert!(matches!(
            registry.invocation("first"),
            Some(Invocation::Stateful { .. })
        ));
    }

    #[test]
    fn test_register_overwrite_keeps_state() {
        let registry = ProbeRegistry::new();
        registry.register("counter", counter());
        let _ = registry.store_state("counter", Arc::new(Some(7u32)));

        registry.register("counter", counter());

        assert!(registry.has_state("counter"));
        match registry.invocation("counter") {
            Some(Invocation::Stateful { state, .. }) => {
                let state = state.and_then(|s| s.downcast::<Option<u32>>().ok());
                assert_eq!(state.map(|s| *s), Some(Some(7)));
            }
            _ => panic!("expected a stateful invocation"),
        }
    }

    #[test]
    fn test_unregister_removes_probe_and_state() {
        let registry = ProbeRegistry::new();
        registry.register("counter", counter());
        let _ = registry.store_state("counter", Arc::new(Some(1u32)));

        registry.unregister("counter");

        assert!(!registry.contains("counter"));
        assert!(!registry.has_state("counter"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unregister_unknown_is_noop() {
        let registry = ProbeRegistry::new();
        registry.register("kept", noop());

        registry.unregister("missing");
        registry.unregister("kept");
        registry.unregister("kept");

        assert!(registry.is_empty());
    }

    #[test]
    fn test_store_state_ignored_after_unregister() {
        let registry = ProbeRegistry::new();
        registry.register("gone", counter());
        registry.unregister("gone");

        let rejected = registry.store_state("gone", Arc::new(Some(3u32)));

        assert!(rejected.is_some());
        assert!(!registry.has_state("gone"));
    }

    #[test]
    fn test_store_state_returns_displaced_value() {
        let registry = ProbeRegistry::new();
        registry.register("counter", counter());

        assert!(registry.store_state("counter", Arc::new(Some(1u32))).is_none());
        let displaced = registry
            .store_state("counter", Arc::new(Some(2u32)))
            .and_then(|s| s.downcast::<Option<u32>>().ok());

        assert_eq!(displaced.map(|s| *s), Some(Some(1)));
    }

    #[test]
    fn test_stale_state_of_other_type_is_discarded() {
        let registry = ProbeRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = seen.clone();
        registry.register("probe", counter());
        let _ = registry.store_state("probe", Arc::new(Some(5u32)));
        registry.register(
            "probe",
            Probe::stateful(move |state: Option<String>| {
                recorded.lock().unwrap().push(state);
                anyhow::Ok(Some("x".to_string()))
            }),
        );

        match registry.invocation("probe") {
            Some(Invocation::Stateful { probe, state }) => {
                assert!(state.is_some());
                let next = probe.sample("probe", state).unwrap();
                assert_eq!(
                    next.downcast_ref::<Option<String>>(),
                    Some(&Some("x".to_string()))
                );
            }
            _ => panic!("expected a stateful invocation"),
        }
        assert_eq!(*seen.lock().unwrap(), vec![None]);
    }

    #[test]
    fn test_probe_shape() {
        assert!(counter().is_stateful());
        assert!(!noop().is_stateful());
        assert_eq!(format!("{:?}", counter()), "Probe::Stateful");
    }

    #[test]
    fn test_stateless_probe_has_no_state() {
        let registry = ProbeRegistry::new();
        registry.register("noop", noop());

        assert!(matches!(
            registry.invocation("noop"),
            Some(Invocation::Stateless(_))
        ));
        assert!(!registry.has_state("noop"));
    }
}
