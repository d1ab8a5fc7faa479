//! Shared audio context handed to the pad and click controllers.

use crate::events::Notifier;
use setalight_core::{AudioClock, AudioGraph, EnvelopeScheduler};
use std::sync::Arc;

/// The graph, its envelopes and the clock both are driven by.
pub struct Stage {
    pub(crate) graph: AudioGraph,
    pub(crate) envelopes: EnvelopeScheduler,
    pub(crate) notifier: Arc<Notifier>,
    clock: Arc<dyn AudioClock>,
}

impl Stage {
    pub fn new(graph: AudioGraph, clock: Arc<dyn AudioClock>, notifier: Arc<Notifier>) -> Self {
        Self {
            graph,
            envelopes: EnvelopeScheduler::new(),
            notifier,
            clock,
        }
    }

    #[inline]
    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    pub fn graph(&self) -> &AudioGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut AudioGraph {
        &mut self.graph
    }

    pub fn envelopes(&self) -> &EnvelopeScheduler {
        &self.envelopes
    }

    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }
}

impl std::fmt::Debug for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("graph", &self.graph)
            .field("now_ms", &self.now_ms())
            .finish()
    }
}
