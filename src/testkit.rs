//! Test-only helpers for asserting on bus traffic (SPEC_FULL.md §10,
//! "Supplemented features"). Deterministic time control for scenario tests
//! does not need a double here -- [`crate::clock::Clock`] itself already
//! exposes `pause`/`reset`/`rescale`, so a test freezes or seeds simulated
//! time on the same `Clock` its actors read from rather than swapping in a
//! parallel implementation.
//!
//! The probe is grounded in `riker-testkit::probe::channel::ChannelProbe`:
//! a throwaway actor that forwards everything it receives on a channel into
//! an `mpsc` the test can `await`/assert on, instead of polling actor state
//! from outside.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::actor::{spawn, Actor, ActorContext, ActorHandle, MailboxPolicy};
use crate::bus::{Bus, BusEvent};
use crate::clock::Clock;
use crate::error::ActorError;
use crate::scheduler::Scheduler;

/// An actor that does nothing but forward every message it receives to an
/// mpsc channel, so a test can assert on bus traffic without implementing a
/// throwaway [`Actor`] of its own each time.
struct ProbeActor {
    tx: mpsc::UnboundedSender<BusEvent>,
}

#[async_trait]
impl Actor for ProbeActor {
    async fn handle_message(&mut self, _ctx: &mut ActorContext, event: BusEvent) -> Result<(), ActorError> {
        let _ = self.tx.send(event);
        Ok(())
    }

    fn accepts_while_paused(&self) -> bool {
        true
    }
}

/// A channel probe: spawns a [`ProbeActor`], subscribes it to `pattern`, and
/// exposes an async `expect_*` API over the forwarded events.
pub struct ChannelProbe {
    handle: ActorHandle,
    rx: mpsc::UnboundedReceiver<BusEvent>,
}

impl ChannelProbe {
    /// Spawns a probe already subscribed to `pattern` and in the `Running`
    /// state -- a test does not otherwise drive a probe through the
    /// lifecycle state machine.
    pub async fn subscribe(bus: &Bus, clock: &Clock, pattern: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(clock.clone());
        let handle = spawn(
            format!("probe-{pattern}"),
            ProbeActor { tx },
            bus.clone(),
            clock.clone(),
            scheduler,
            Vec::new(),
            Vec::new(),
            Vec::new(),
            MailboxPolicy::default(),
            true,
        );
        handle
            .send_lifecycle(crate::actor::LifecycleKind::Initialize, Duration::from_secs(1))
            .await
            .expect("probe initialize");
        handle
            .send_lifecycle(crate::actor::LifecycleKind::Start, Duration::from_secs(1))
            .await
            .expect("probe start");
        bus.subscribe(&handle, pattern);
        ChannelProbe { handle, rx }
    }

    pub fn handle(&self) -> &ActorHandle {
        &self.handle
    }

    /// Waits up to `timeout` for the next forwarded event.
    pub async fn recv_within(&mut self, timeout: Duration) -> Option<BusEvent> {
        tokio::time::timeout(timeout, self.rx.recv()).await.ok().flatten()
    }

    /// Asserts the next event's payload downcasts to `T` and matches `pred`.
    pub async fn expect<T: 'static>(&mut self, timeout: Duration, pred: impl FnOnce(&T) -> bool) -> bool {
        match self.recv_within(timeout).await {
            Some(event) => event.downcast::<T>().map(pred).unwrap_or(false),
            None => false,
        }
    }

    pub async fn expect_none(&mut self, within: Duration) -> bool {
        self.recv_within(within).await.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    #[tokio::test]
    async fn probe_forwards_matching_publications() {
        let bus = Bus::new();
        let clock = Clock::real_time();
        let mut probe = ChannelProbe::subscribe(&bus, &clock, "/test/*").await;

        bus.publish("/test/a", StdArc::new(7i32), None).await;

        assert!(probe.expect::<i32>(Duration::from_millis(200), |v| *v == 7).await);
    }

    #[tokio::test]
    async fn probe_expect_none_when_nothing_published() {
        let bus = Bus::new();
        let clock = Clock::real_time();
        let mut probe = ChannelProbe::subscribe(&bus, &clock, "/test/*").await;
        assert!(probe.expect_none(Duration::from_millis(50)).await);
    }
}
