//! Keep-alive timer
//!
//! The timer exists only while it is armed. [`Heartbeat::tick`] resolves at
//! each deadline and reschedules the next one before returning; once
//! cancelled it never resolves, so a `select!` arm on it goes quiet the
//! moment the connection leaves Open.

use std::future;
use std::pin::Pin;
use std::time::Duration;

use tokio::time::{sleep, Instant, Sleep};

/// Fixed-interval keep-alive timer
#[derive(Debug)]
pub struct Heartbeat {
    interval: Duration,
    next: Option<Pin<Box<Sleep>>>,
    fired: u64,
}

impl Heartbeat {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: None,
            fired: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Arm the timer one interval from now, replacing any pending deadline
    pub fn start(&mut self) {
        self.next = Some(Box::pin(sleep(self.interval)));
    }

    /// Drop the pending deadline
    pub fn cancel(&mut self) {
        self.next = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next.is_some()
    }

    /// Number of firings since creation
    pub fn fired(&self) -> u64 {
        self.fired
    }

    /// Deadline of the next firing, if armed
    pub fn deadline(&self) -> Option<Instant> {
        self.next.as_ref().map(|sleep| sleep.deadline())
    }

    /// Wait for the next firing
    ///
    /// Cancel-safe: dropping the future keeps the pending deadline.
    pub async fn tick(&mut self) {
        let Some(next) = self.next.as_mut() else {
            return future::pending().await;
        };

        next.as_mut().await;

        let following = next.deadline() + self.interval;
        next.as_mut().reset(following);
        self.fired += 1;
    }
}
