use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::AdmissionConfig;
use crate::monitor::MemoryMonitor;
use crate::security::rate_limit::{path_is_endpoint, path_matches};
use crate::telemetry::Metrics;

/// The request waited in the queue longer than the configured timeout
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("server busy: not admitted within {}ms", waited.as_millis())]
pub struct CapacityExceeded {
    pub waited: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub active: usize,
    pub queued: usize,
    pub max_concurrent: usize,
}

struct Waiter {
    id: u64,
    priority: bool,
    tx: oneshot::Sender<()>,
}

#[derive(Default)]
struct State {
    active: usize,
    queue: VecDeque<Waiter>,
}

struct Shared {
    max_concurrent: usize,
    timeout: Duration,
    priority_prefixes: Vec<String>,
    bypass_paths: Vec<String>,
    monitor: Arc<MemoryMonitor>,
    state: Mutex<State>,
    draining: AtomicBool,
    next_id: AtomicU64,
    metrics: Option<Arc<Metrics>>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn has_capacity(&self, state: &State) -> bool {
        state.active < self.max_concurrent && !self.monitor.is_under_pressure()
    }

    fn release(&self) {
        {
            let mut state = self.lock();
            state.active = state.active.saturating_sub(1);
        }
        if let Some(m) = &self.metrics {
            m.record_active_requests(-1);
        }
        self.drain();
    }

    /// Admit queued requests while capacity lasts. Single-flight.
    fn drain(&self) {
        loop {
            if self
                .draining
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }

            let admitted = self.drain_once();
            self.draining.store(false, Ordering::Release);

            if admitted > 0 {
                debug!(admitted, "Admitted queued requests");
            }

            // capacity freed while the flag was held is picked up here
            let state = self.lock();
            if state.queue.is_empty() || !self.has_capacity(&state) {
                return;
            }
        }
    }

    fn drain_once(&self) -> usize {
        let mut admitted = 0;
        let mut state = self.lock();
        while self.has_capacity(&state) {
            let Some(waiter) = state.queue.pop_front() else { break };
            // a closed receiver means the waiter is being dropped; skip it
            if waiter.tx.send(()).is_ok() {
                state.active += 1;
                admitted += 1;
                if let Some(m) = &self.metrics {
                    m.record_active_requests(1);
                }
            }
        }
        admitted
    }
}

/// Held while a request is being processed. Dropping it frees the slot.
#[must_use = "dropping the permit immediately releases the slot"]
pub struct AdmissionPermit {
    shared: Option<Arc<Shared>>,
}

impl AdmissionPermit {
    /// False for bypassed paths that never took a slot
    pub fn holds_slot(&self) -> bool {
        self.shared.is_some()
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.take() {
            shared.release();
        }
    }
}

/// A queue entry owned by the waiting request
struct QueuedTicket {
    shared: Arc<Shared>,
    id: u64,
    rx: oneshot::Receiver<()>,
    armed: bool,
}

impl QueuedTicket {
    /// Remove the entry if still queued. Returns false if it was admitted meanwhile.
    fn withdraw(&mut self) -> bool {
        let removed = {
            let mut state = self.shared.lock();
            match state.queue.iter().position(|w| w.id == self.id) {
                Some(pos) => {
                    state.queue.remove(pos);
                    true
                }
                None => false,
            }
        };
        if removed {
            return true;
        }
        // drain sends under the lock, so an admission is visible by now
        self.rx.try_recv().is_err()
    }

    fn into_permit(mut self) -> AdmissionPermit {
        self.armed = false;
        AdmissionPermit { shared: Some(self.shared.clone()) }
    }
}

impl Drop for QueuedTicket {
    fn drop(&mut self) {
        // client went away while queued
        if self.armed && !self.withdraw() {
            self.shared.release();
        }
    }
}

/// Bounds the number of requests processed concurrently.
///
/// Requests over the bound wait in a queue. Priority paths go ahead of normal
/// ones (FIFO within each tier), and a request still queued when its timeout
/// fires is rejected and never admitted later.
#[derive(Clone)]
pub struct AdmissionQueue {
    shared: Arc<Shared>,
}

impl AdmissionQueue {
    pub fn new(
        config: &AdmissionConfig,
        bypass_paths: &[String],
        monitor: Arc<MemoryMonitor>,
        metrics: Option<Arc<Metrics>>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                max_concurrent: config.max_concurrent,
                timeout: Duration::from_millis(config.queue_timeout_ms),
                priority_prefixes: config.priority_prefixes.clone(),
                bypass_paths: bypass_paths.to_vec(),
                monitor,
                state: Mutex::new(State::default()),
                draining: AtomicBool::new(false),
                next_id: AtomicU64::new(0),
                metrics,
            }),
        }
    }

    pub fn is_priority(&self, path: &str) -> bool {
        self.shared.priority_prefixes.iter().any(|p| path_matches(path, p))
    }

    pub fn is_bypassed(&self, path: &str) -> bool {
        self.shared.bypass_paths.iter().any(|p| path_is_endpoint(path, p))
    }

    /// Wait for a processing slot.
    ///
    /// Dropping the returned future while queued withdraws the request.
    pub async fn admit(&self, path: &str) -> Result<AdmissionPermit, CapacityExceeded> {
        if self.is_bypassed(path) {
            return Ok(AdmissionPermit { shared: None });
        }

        let shared = &self.shared;
        let priority = self.is_priority(path);
        let mut ticket = {
            let mut state = shared.lock();
            if shared.has_capacity(&state) {
                state.active += 1;
                drop(state);
                if let Some(m) = &shared.metrics {
                    m.record_admission("immediate");
                    m.record_active_requests(1);
                }
                debug!(path, "Request admitted");
                return Ok(AdmissionPermit { shared: Some(shared.clone()) });
            }

            let id = shared.next_id.fetch_add(1, Ordering::Relaxed);
            let (tx, rx) = oneshot::channel();
            let waiter = Waiter { id, priority, tx };
            if priority {
                // behind earlier priority entries, ahead of every normal one
                let pos =
                    state.queue.iter().position(|w| !w.priority).unwrap_or(state.queue.len());
                state.queue.insert(pos, waiter);
            } else {
                state.queue.push_back(waiter);
            }
            debug!(
                path,
                priority,
                queued = state.queue.len(),
                active = state.active,
                "Request queued"
            );
            QueuedTicket { shared: shared.clone(), id, rx, armed: true }
        };

        if let Some(m) = &shared.metrics {
            m.record_admission("queued");
        }
        let enqueued_at = Instant::now();

        let outcome = tokio::time::timeout(shared.timeout, &mut ticket.rx).await;
        let waited = enqueued_at.elapsed();
        if let Some(m) = &shared.metrics {
            m.record_queue_wait(waited.as_secs_f64());
        }

        match outcome {
            Ok(Ok(())) => {
                debug!(path, waited_ms = waited.as_millis() as u64, "Queued request admitted");
                Ok(ticket.into_permit())
            }
            Ok(Err(_)) => {
                ticket.armed = false;
                Err(CapacityExceeded { waited })
            }
            Err(_) => {
                if ticket.withdraw() {
                    ticket.armed = false;
                    warn!(path, waited_ms = waited.as_millis() as u64, "Queued request timed out");
                    if let Some(m) = &shared.metrics {
                        m.record_admission("timed_out");
                    }
                    Err(CapacityExceeded { waited })
                } else {
                    // admitted in the same instant the timer fired
                    Ok(ticket.into_permit())
                }
            }
        }
    }

    /// Admit queued requests if capacity and memory allow
    pub fn drain(&self) {
        self.shared.drain();
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.shared.lock();
        QueueStats {
            active: state.active,
            queued: state.queue.len(),
            max_concurrent: self.shared.max_concurrent,
        }
    }

    pub fn queue_len(&self) -> usize {
        self.shared.lock().queue.len()
    }

    pub fn active(&self) -> usize {
        self.shared.lock().active
    }
}
