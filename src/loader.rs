//! Pad loading off the control path.
//!
//! Every request gets a [`LoadTicket`]. Results come back through
//! [`Loader::poll`] tagged with their ticket, and the pad controller drops any
//! result whose ticket is no longer the one it is waiting for.

use crate::provider::{PadKey, PadSource, SampleProvider};
use crate::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadTicket(u64);

/// How loads are executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadExecutor {
    /// Resolve on the calling thread; the result is delivered on the next poll.
    #[default]
    Inline,
    /// Resolve on a background worker thread.
    Threaded,
}

#[derive(Debug)]
pub struct LoadOutcome {
    pub ticket: LoadTicket,
    /// Key as requested, before normalisation.
    pub key: String,
    pub result: Result<PadSource>,
}

struct LoadRequest {
    ticket: LoadTicket,
    key: String,
    pad_set: String,
}

enum Backend {
    Inline {
        ready: VecDeque<LoadOutcome>,
    },
    Threaded {
        request_tx: Option<Sender<LoadRequest>>,
        outcome_rx: Receiver<LoadOutcome>,
        worker: Option<JoinHandle<()>>,
    },
}

pub struct Loader {
    provider: Arc<dyn SampleProvider>,
    backend: Backend,
    next_ticket: u64,
    in_flight: usize,
}

fn resolve(provider: &dyn SampleProvider, key: &str, pad_set: &str) -> Result<PadSource> {
    let pad = PadKey::parse(key)?;
    provider.resolve_pad_source(&pad, pad_set)
}

impl Loader {
    pub fn new(provider: Arc<dyn SampleProvider>, executor: LoadExecutor) -> Self {
        let backend = match executor {
            LoadExecutor::Inline => Backend::Inline {
                ready: VecDeque::new(),
            },
            LoadExecutor::Threaded => {
                let (request_tx, request_rx) = unbounded::<LoadRequest>();
                let (outcome_tx, outcome_rx) = unbounded();
                let worker_provider = Arc::clone(&provider);

                let worker = thread::Builder::new()
                    .name("setalight-loader".into())
                    .spawn(move || {
                        for request in request_rx {
                            let result =
                                resolve(worker_provider.as_ref(), &request.key, &request.pad_set);
                            let outcome = LoadOutcome {
                                ticket: request.ticket,
                                key: request.key,
                                result,
                            };
                            if outcome_tx.send(outcome).is_err() {
                                break;
                            }
                        }
                    });

                match worker {
                    Ok(handle) => Backend::Threaded {
                        request_tx: Some(request_tx),
                        outcome_rx,
                        worker: Some(handle),
                    },
                    Err(err) => {
                        tracing::warn!(error = %err, "could not spawn loader thread, loading inline");
                        Backend::Inline {
                            ready: VecDeque::new(),
                        }
                    }
                }
            }
        };

        Self {
            provider,
            backend,
            next_ticket: 0,
            in_flight: 0,
        }
    }

    pub fn submit(&mut self, key: &str, pad_set: &str) -> LoadTicket {
        let ticket = LoadTicket(self.next_ticket);
        self.next_ticket += 1;
        self.in_flight += 1;

        match &mut self.backend {
            Backend::Inline { ready } => {
                let result = resolve(self.provider.as_ref(), key, pad_set);
                ready.push_back(LoadOutcome {
                    ticket,
                    key: key.to_string(),
                    result,
                });
            }
            Backend::Threaded { request_tx, .. } => {
                let request = LoadRequest {
                    ticket,
                    key: key.to_string(),
                    pad_set: pad_set.to_string(),
                };
                let sent = request_tx
                    .as_ref()
                    .is_some_and(|tx| tx.send(request).is_ok());
                if !sent {
                    tracing::warn!(key, "loader thread gone, load dropped");
                    self.in_flight -= 1;
                }
            }
        }

        tracing::debug!(?ticket, key, pad_set, "pad load submitted");
        ticket
    }

    /// Every outcome finished since the last poll.
    pub fn poll(&mut self) -> Vec<LoadOutcome> {
        let outcomes: Vec<LoadOutcome> = match &mut self.backend {
            Backend::Inline { ready } => ready.drain(..).collect(),
            Backend::Threaded { outcome_rx, .. } => outcome_rx.try_iter().collect(),
        };
        self.in_flight = self.in_flight.saturating_sub(outcomes.len());
        outcomes
    }

    /// Loads submitted but not yet returned by [`poll`](Self::poll).
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        if let Backend::Threaded {
            request_tx, worker, ..
        } = &mut self.backend
        {
            // Closing the queue ends the worker loop.
            request_tx.take();
            if let Some(handle) = worker.take() {
                let _ = handle.join();
            }
        }
    }
}
