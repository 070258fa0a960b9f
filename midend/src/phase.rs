// phase.rs — Pipeline phases and phase factories
//
// A phase is one graph-to-graph transformation with a shared context handle
// (registry plus, when available, published graphs). The runner executes a
// sequence of phases with per-phase timing. Phase factories let a client
// override how configurable phases are constructed: registering a factory
// replaces the previous one, and every consumer constructs phases through
// the factories object it was handed.

use std::time::{Duration, Instant};

use crate::error::Error;
use crate::graph::Graph;
use crate::inline::InliningPhase;
use crate::installer::CompilerStorage;
use crate::registry::MethodRegistry;

// ── Phase ───────────────────────────────────────────────────────────────────

/// Shared read context for phases.
pub struct PhaseContext<'a> {
    pub registry: &'a MethodRegistry,
    /// Published graphs, for phases that splice in callee bodies.
    pub storage: Option<&'a CompilerStorage>,
}

impl<'a> PhaseContext<'a> {
    pub fn new(registry: &'a MethodRegistry) -> Self {
        PhaseContext {
            registry,
            storage: None,
        }
    }

    pub fn with_storage(registry: &'a MethodRegistry, storage: &'a CompilerStorage) -> Self {
        PhaseContext {
            registry,
            storage: Some(storage),
        }
    }
}

/// One graph transformation.
pub trait Phase {
    fn name(&self) -> &'static str;
    fn apply(&self, graph: &mut Graph, cx: &PhaseContext) -> Result<(), Error>;
}

// ── Runner ──────────────────────────────────────────────────────────────────

/// Executes a phase sequence, reporting per-phase wall time to an optional
/// observer.
#[derive(Default)]
pub struct PhaseRunner {
    phases: Vec<Box<dyn Phase>>,
    on_phase_complete: Option<Box<dyn Fn(&str, Duration)>>,
}

impl PhaseRunner {
    pub fn new() -> Self {
        PhaseRunner::default()
    }

    pub fn push(&mut self, phase: Box<dyn Phase>) -> &mut Self {
        self.phases.push(phase);
        self
    }

    pub fn observe(&mut self, f: impl Fn(&str, Duration) + 'static) -> &mut Self {
        self.on_phase_complete = Some(Box::new(f));
        self
    }

    pub fn run(&self, graph: &mut Graph, cx: &PhaseContext) -> Result<(), Error> {
        for phase in &self.phases {
            let start = Instant::now();
            phase.apply(graph, cx)?;
            if let Some(observer) = &self.on_phase_complete {
                observer(phase.name(), start.elapsed());
            }
        }
        Ok(())
    }
}

// ── Factories ───────────────────────────────────────────────────────────────

type PhaseFactory = Box<dyn Fn() -> Box<dyn Phase> + Send + Sync>;

/// Construction points for phases a client may want to swap out. Owned by
/// whoever drives compilation; not a process-wide singleton.
pub struct PhaseFactories {
    inlining: PhaseFactory,
}

impl Default for PhaseFactories {
    fn default() -> Self {
        PhaseFactories {
            inlining: Box::new(|| Box::new(InliningPhase::default())),
        }
    }
}

impl PhaseFactories {
    pub fn new() -> Self {
        PhaseFactories::default()
    }

    /// Replace the inlining-phase factory. Later registrations win.
    pub fn register_inlining_factory(
        &mut self,
        factory: impl Fn() -> Box<dyn Phase> + Send + Sync + 'static,
    ) {
        self.inlining = Box::new(factory);
    }

    pub fn create_inlining_phase(&self) -> Box<dyn Phase> {
        (self.inlining)()
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────
