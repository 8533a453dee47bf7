//! Non-blocking delivery of events to subscribers.
//!
//! The dispatcher runs on a single task, so it must never wait on one
//! subscriber while others have events pending. Each registration owns a
//! bounded channel and every delivery is a `try_send`:
//!
//! - channel has room: the event is queued and counted as delivered
//! - channel is full: the event is dropped for that subscriber only and
//!   counted as dropped (drop-newest)
//! - receiver is gone: nothing is queued; the registration stays until it is
//!   unregistered
//!
//! # Configuration
//!
//! - `event_buffer_size`: capacity of each delivery channel (default: 100)

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;

/// Default capacity of every delivery channel.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Per-registration delivery counters.
///
/// Shared between the dispatcher and the subscriber's
/// [`Registration`](crate::events::Registration); updated with relaxed
/// atomics since they are informational only.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl DeliveryStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    fn record_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/// What happened to one event for one subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeliveryOutcome {
    Delivered,
    Dropped,
    Closed,
}

/// Offer an event to a subscriber without waiting.
pub(crate) fn deliver<T>(
    eventch: &mpsc::Sender<T>,
    event: T,
    stats: &DeliveryStats,
) -> DeliveryOutcome {
    match eventch.try_send(event) {
        Ok(()) => {
            stats.record_delivered();
            DeliveryOutcome::Delivered
        }
        Err(mpsc::error::TrySendError::Full(_)) => {
            stats.record_dropped();
            DeliveryOutcome::Dropped
        }
        Err(mpsc::error::TrySendError::Closed(_)) => DeliveryOutcome::Closed,
    }
}
