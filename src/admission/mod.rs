//! Admission control at the network boundary.
//!
//! In controlled mode at most `max_in_flight` requests run past admission at
//! once. Up to `buffer_capacity` further requests wait in FIFO order, and a
//! finishing request hands its slot to the oldest waiter. When the buffer is
//! full the overflow strategy decides who is dropped. Every drop is logged
//! and counted.

use std::{
    collections::VecDeque,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
};

use once_cell::sync::Lazy;
use prometheus::{register_int_counter, register_int_counter_vec, IntCounter, IntCounterVec};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

// Requests admitted, immediately or after waiting
static ADMISSION_ACCEPTED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "fragway_admission_accepted_total",
        "Requests admitted past the backpressure buffer"
    )
    .unwrap()
});

// Requests dropped by the overflow strategy
static ADMISSION_DROPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "fragway_admission_dropped_total",
        "Requests dropped because the backpressure buffer was full",
        &["strategy"]
    )
    .unwrap()
});

#[derive(Clone, Copy, Default, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowStrategy {
    /// Drop the request that just arrived.
    #[default]
    DropLatest,
    /// Evict the longest-waiting request and queue the new one.
    DropOldest,
    /// Reject the new request and report it as an error.
    Fail,
}

impl OverflowStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverflowStrategy::DropLatest => "drop_latest",
            OverflowStrategy::DropOldest => "drop_oldest",
            OverflowStrategy::Fail => "fail",
        }
    }
}

impl fmt::Display for OverflowStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionSettings {
    pub buffer_capacity: usize,
    pub strategy: OverflowStrategy,
    pub drop_status: u16,
    pub max_in_flight: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionMode {
    /// No buffering, nothing is ever dropped.
    PassThrough,
    Controlled(AdmissionSettings),
}

/// Marker for a request removed by the overflow strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dropped;

/// Result of [`AdmissionController::submit`].
#[derive(Debug)]
pub enum Submission {
    /// A processing slot is free, go ahead.
    Ready(AdmissionPermit),
    /// Buffered; await the ticket for a slot.
    Queued(Ticket),
    /// Buffer full, this request was dropped.
    Dropped,
    /// Buffer full under the `fail` strategy.
    Failed,
}

struct Waiter {
    tx: oneshot::Sender<Result<AdmissionPermit, Dropped>>,
}

#[derive(Default)]
struct State {
    in_flight: usize,
    waiting: VecDeque<Waiter>,
}

pub struct AdmissionController {
    mode: AdmissionMode,
    state: Mutex<State>,
    dropped: AtomicU64,
}

impl fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionController")
            .field("mode", &self.mode)
            .field("dropped", &self.dropped_total())
            .finish()
    }
}

impl AdmissionController {
    pub fn pass_through() -> Arc<Self> {
        Self::new(AdmissionMode::PassThrough)
    }

    pub fn controlled(settings: AdmissionSettings) -> Arc<Self> {
        Self::new(AdmissionMode::Controlled(settings))
    }

    pub fn new(mode: AdmissionMode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            state: Mutex::new(State::default()),
            dropped: AtomicU64::new(0),
        })
    }

    pub fn mode(&self) -> AdmissionMode {
        self.mode
    }

    /// Status answered to dropped requests; `None` in pass-through mode.
    pub fn drop_status(&self) -> Option<u16> {
        match self.mode {
            AdmissionMode::PassThrough => None,
            AdmissionMode::Controlled(settings) => Some(settings.drop_status),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Admit, queue or drop an inbound request.
    pub fn submit(self: &Arc<Self>) -> Submission {
        let settings = match self.mode {
            AdmissionMode::PassThrough => {
                return Submission::Ready(AdmissionPermit { controller: None })
            }
            AdmissionMode::Controlled(settings) => settings,
        };

        let mut state = self.lock();
        // waiters whose request went away no longer hold a buffer slot
        state.waiting.retain(|w| !w.tx.is_closed());

        if state.in_flight < settings.max_in_flight {
            state.in_flight += 1;
            ADMISSION_ACCEPTED.inc();
            return Submission::Ready(AdmissionPermit {
                controller: Some(Arc::clone(self)),
            });
        }

        if state.waiting.len() >= settings.buffer_capacity {
            match settings.strategy {
                OverflowStrategy::DropLatest => {
                    drop(state);
                    self.record_drop(settings.strategy);
                    return Submission::Dropped;
                }
                OverflowStrategy::Fail => {
                    drop(state);
                    self.record_drop(settings.strategy);
                    log::error!(
                        "Backpressure buffer is full ({} waiting), rejecting request",
                        settings.buffer_capacity
                    );
                    return Submission::Failed;
                }
                OverflowStrategy::DropOldest => {
                    if let Some(oldest) = state.waiting.pop_front() {
                        let _ = oldest.tx.send(Err(Dropped));
                        self.record_drop(settings.strategy);
                    }
                }
            }
        }

        let (tx, rx) = oneshot::channel();
        state.waiting.push_back(Waiter { tx });
        Submission::Queued(Ticket { rx })
    }

    fn record_drop(&self, strategy: OverflowStrategy) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        ADMISSION_DROPPED
            .with_label_values(&[strategy.as_str()])
            .inc();
        log::warn!("Backpressure buffer is overflown. Dropping request ({strategy})");
    }

    /// Hands the slot of a finished request to the oldest live waiter.
    fn release(self: &Arc<Self>) {
        let mut state = self.lock();
        while let Some(waiter) = state.waiting.pop_front() {
            let permit = AdmissionPermit {
                controller: Some(Arc::clone(self)),
            };
            match waiter.tx.send(Ok(permit)) {
                Ok(()) => {
                    ADMISSION_ACCEPTED.inc();
                    return;
                }
                Err(unsent) => {
                    // receiver is gone; disarm so the permit does not release again
                    if let Ok(mut permit) = unsent {
                        permit.controller = None;
                    }
                }
            }
        }
        state.in_flight = state.in_flight.saturating_sub(1);
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    pub fn waiting(&self) -> usize {
        self.lock().waiting.len()
    }

    /// Requests dropped by this controller since it was created.
    pub fn dropped_total(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Processing slot held for the lifetime of one admitted request.
pub struct AdmissionPermit {
    controller: Option<Arc<AdmissionController>>,
}

impl fmt::Debug for AdmissionPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionPermit")
            .field("controlled", &self.controller.is_some())
            .finish()
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        if let Some(controller) = self.controller.take() {
            controller.release();
        }
    }
}

/// Place in the backpressure buffer.
#[derive(Debug)]
pub struct Ticket {
    rx: oneshot::Receiver<Result<AdmissionPermit, Dropped>>,
}

impl Ticket {
    /// Waits until a slot frees up or the request is evicted.
    pub async fn wait(self) -> Result<AdmissionPermit, Dropped> {
        self.rx.await.unwrap_or(Err(Dropped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controlled(capacity: usize, strategy: OverflowStrategy, in_flight: usize) -> Arc<AdmissionController> {
        AdmissionController::controlled(AdmissionSettings {
            buffer_capacity: capacity,
            strategy,
            drop_status: 429,
            max_in_flight: in_flight,
        })
    }

    fn ready(submission: Submission) -> AdmissionPermit {
        match submission {
            Submission::Ready(permit) => permit,
            other => panic!("expected ready, got {other:?}"),
        }
    }

    fn queued(submission: Submission) -> Ticket {
        match submission {
            Submission::Queued(ticket) => ticket,
            other => panic!("expected queued, got {other:?}"),
        }
    }

    #[test]
    fn test_pass_through_never_drops() {
        let controller = AdmissionController::pass_through();
        let permits: Vec<_> = (0..1000).map(|_| ready(controller.submit())).collect();
        assert_eq!(permits.len(), 1000);
        assert_eq!(controller.dropped_total(), 0);
        assert_eq!(controller.drop_status(), None);
    }

    #[tokio::test]
    async fn test_drop_latest() {
        let controller = controlled(2, OverflowStrategy::DropLatest, 1);

        let running = ready(controller.submit());
        let first = queued(controller.submit());
        let second = queued(controller.submit());
        assert!(matches!(controller.submit(), Submission::Dropped));
        assert_eq!(controller.dropped_total(), 1);
        assert_eq!(controller.waiting(), 2);

        // buffered requests are unaffected and proceed in order
        drop(running);
        let first = first.wait().await.unwrap();
        assert_eq!(controller.waiting(), 1);
        drop(first);
        let second = second.wait().await.unwrap();
        drop(second);
        assert_eq!(controller.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_drop_oldest_evicts_head() {
        let controller = controlled(1, OverflowStrategy::DropOldest, 1);

        let running = ready(controller.submit());
        let oldest = queued(controller.submit());
        let newest = queued(controller.submit());

        assert_eq!(oldest.wait().await.unwrap_err(), Dropped);
        assert_eq!(controller.dropped_total(), 1);

        drop(running);
        let permit = newest.wait().await.unwrap();
        drop(permit);
        assert_eq!(controller.in_flight(), 0);
    }

    #[test]
    fn test_fail_strategy() {
        let controller = controlled(1, OverflowStrategy::Fail, 1);
        let _running = ready(controller.submit());
        let _waiting = queued(controller.submit());
        assert!(matches!(controller.submit(), Submission::Failed));
        assert_eq!(controller.dropped_total(), 1);
        assert_eq!(controller.drop_status(), Some(429));
    }

    #[tokio::test]
    async fn test_abandoned_ticket_releases_slot() {
        let controller = controlled(2, OverflowStrategy::DropLatest, 1);

        let running = ready(controller.submit());
        let abandoned = queued(controller.submit());
        let patient = queued(controller.submit());
        drop(abandoned);

        drop(running);
        let permit = patient.wait().await.unwrap();
        assert_eq!(controller.in_flight(), 1);
        drop(permit);
        assert_eq!(controller.in_flight(), 0);
        assert_eq!(controller.waiting(), 0);
    }

    #[test]
    fn test_below_capacity_always_accepted() {
        let controller = controlled(3, OverflowStrategy::DropLatest, 2);
        let _a = ready(controller.submit());
        let _b = ready(controller.submit());
        let _c = queued(controller.submit());
        let _d = queued(controller.submit());
        let _e = queued(controller.submit());
        assert_eq!(controller.dropped_total(), 0);
        assert!(matches!(controller.submit(), Submission::Dropped));
    }

    #[test]
    fn test_strategy_names() {
        let strategy: OverflowStrategy = serde_yaml::from_str("drop_oldest").unwrap();
        assert_eq!(strategy, OverflowStrategy::DropOldest);
        assert_eq!(OverflowStrategy::Fail.to_string(), "fail");
    }
}
