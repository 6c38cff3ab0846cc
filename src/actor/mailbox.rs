//! Per-actor mailbox (§3 "Mailbox").
//!
//! The teacher builds its own lock-guarded queue (`kernel::queue`) instead of
//! handing a raw channel straight to user code, because a bounded mailbox
//! needs drop-oldest/drop-newest eviction that `tokio::sync::mpsc` does not
//! offer directly. This module follows that shape: a `Mutex<VecDeque<_>>`
//! plus a `Notify` for the receiver to wait on. Push is always synchronous
//! and non-blocking -- overflow is handled by policy, never by blocking the
//! publisher (§4.2 "fire-and-forget").

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use super::LifecycleRequest;
use crate::bus::BusEvent;

/// Overflow discipline for a bounded mailbox (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MailboxPolicy {
    #[default]
    Unbounded,
    DropOldest(usize),
    DropNewest(usize),
}

/// What actually moves through the mailbox. Lifecycle requests carry an ack
/// channel so the [`crate::master::Master`] can observe success/failure per
/// actor, per phase (§4.1 "Ordering guarantees").
pub enum Envelope {
    Lifecycle(LifecycleRequest),
    User(BusEvent),
    Timer(TimerFired),
}

/// Delivered to an actor when one of its `scheduleOnce`/`scheduleRecurring`
/// timers fires (§4.4 "Scheduling").
#[derive(Debug, Clone)]
pub struct TimerFired {
    pub id: u64,
}

struct Inner {
    queue: Mutex<VecDeque<Envelope>>,
    notify: Notify,
    closed: AtomicBool,
    policy: MailboxPolicy,
    dropped: std::sync::atomic::AtomicU64,
}

#[derive(Clone)]
pub struct MailboxSender {
    inner: Arc<Inner>,
}

pub struct MailboxReceiver {
    inner: Arc<Inner>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueError {
    Closed,
    Dropped,
}

impl std::fmt::Display for EnqueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnqueueError::Closed => write!(f, "mailbox closed"),
            EnqueueError::Dropped => write!(f, "message dropped by mailbox policy"),
        }
    }
}

pub fn mailbox(policy: MailboxPolicy) -> (MailboxSender, MailboxReceiver) {
    let inner = Arc::new(Inner {
        queue: Mutex::new(VecDeque::new()),
        notify: Notify::new(),
        closed: AtomicBool::new(false),
        policy,
        dropped: std::sync::atomic::AtomicU64::new(0),
    });
    (
        MailboxSender {
            inner: inner.clone(),
        },
        MailboxReceiver { inner },
    )
}

impl MailboxSender {
    pub fn enqueue(&self, envelope: Envelope) -> Result<(), EnqueueError> {
        if self.inner.closed.load(Ordering::Acquire) {
            return Err(EnqueueError::Closed);
        }
        let mut queue = self.inner.queue.lock().unwrap();
        match self.inner.policy {
            MailboxPolicy::Unbounded => {
                queue.push_back(envelope);
            }
            MailboxPolicy::DropNewest(cap) => {
                if queue.len() >= cap {
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                    drop(queue);
                    return Err(EnqueueError::Dropped);
                }
                queue.push_back(envelope);
            }
            MailboxPolicy::DropOldest(cap) => {
                if queue.len() >= cap {
                    queue.pop_front();
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                }
                queue.push_back(envelope);
            }
        }
        drop(queue);
        self.inner.notify.notify_one();
        Ok(())
    }

    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn dropped_count(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl MailboxReceiver {
    /// Waits for and removes the next envelope, or `None` once the mailbox
    /// is closed and drained.
    pub async fn recv(&mut self) -> Option<Envelope> {
        loop {
            {
                let mut queue = self.inner.queue.lock().unwrap();
                if let Some(env) = queue.pop_front() {
                    return Some(env);
                }
                if self.inner.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            self.inner.notify.notified().await;
        }
    }

    pub fn drain(&self) -> Vec<Envelope> {
        let mut queue = self.inner.queue.lock().unwrap();
        queue.drain(..).collect()
    }
}

/// Surfaces a drained user envelope (if any) as a dead letter, used when an
/// actor is force-terminated with messages still pending.
pub fn into_dead_letters(envelopes: Vec<Envelope>) -> Vec<BusEvent> {
    envelopes
        .into_iter()
        .filter_map(|e| match e {
            Envelope::User(ev) => Some(ev),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    fn dummy_event() -> BusEvent {
        BusEvent::new("/x", StdArc::new(1i32), None)
    }

    #[tokio::test]
    async fn drop_oldest_evicts_front() {
        let (tx, mut rx) = mailbox(MailboxPolicy::DropOldest(1));
        tx.enqueue(Envelope::User(dummy_event())).unwrap();
        tx.enqueue(Envelope::User(dummy_event())).unwrap();
        let got = rx.recv().await.unwrap();
        match got {
            Envelope::User(_) => {}
            _ => panic!("expected user envelope"),
        }
        assert_eq!(tx.dropped_count(), 1);
    }

    #[tokio::test]
    async fn drop_newest_rejects_overflow() {
        let (tx, _rx) = mailbox(MailboxPolicy::DropNewest(1));
        tx.enqueue(Envelope::User(dummy_event())).unwrap();
        let err = tx.enqueue(Envelope::User(dummy_event())).unwrap_err();
        assert_eq!(err, EnqueueError::Dropped);
    }

    #[tokio::test]
    async fn closed_mailbox_rejects_further_sends() {
        let (tx, _rx) = mailbox(MailboxPolicy::Unbounded);
        tx.close();
        assert_eq!(
            tx.enqueue(Envelope::User(dummy_event())).unwrap_err(),
            EnqueueError::Closed
        );
    }
}
