//! Per-dispatch context handed to actor hooks (§4.3 "Publishing and
//! subscribing traits"). Grounded in the teacher's `actor::actor_cell::Context`,
//! which is likewise a cheaply-cloneable bundle of handles (`myself`,
//! `system`, `kernel`) threaded through every `Actor::recv` call rather than
//! stored as ambient global state.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::bus::{Bus, Payload, SubscriptionHandle};
use crate::clock::Clock;
use crate::scheduler::Scheduler;

use super::{ActorHandle, ActorState};

/// A single filter in a [`ActorContext`]'s filter chain (§4.3 "Filtering
/// publisher"). Returning `false` drops the message before it reaches the bus.
pub trait PublishFilter: Send + Sync {
    fn allow(&self, channel: &str, payload: &Payload) -> bool;
}

pub struct ActorContext {
    pub(crate) handle: ActorHandle,
    pub(crate) bus: Bus,
    pub(crate) clock: Clock,
    pub(crate) scheduler: Scheduler,
    pub(crate) write_to: Vec<String>,
    pub(crate) read_from: Vec<String>,
    pub(crate) filters: Vec<Arc<dyn PublishFilter>>,
}

impl ActorContext {
    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn state(&self) -> ActorState {
        self.handle.state()
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn write_to(&self) -> &[String] {
        &self.write_to
    }

    pub fn read_from(&self) -> &[String] {
        &self.read_from
    }

    pub fn myself(&self) -> &ActorHandle {
        &self.handle
    }

    /// Publishes on an explicit channel. A publisher reads its `write-to`
    /// configuration at Initialize time, so publication is allowed from
    /// `Initialized` onward; it is only dropped with a warning from
    /// `Unborn`/`Initializing` (not yet configured) or a terminal state
    /// (§4.3 "Publication from a non-initialized state is silently
    /// dropped").
    pub async fn publish<T: Any + Send + Sync>(&self, channel: &str, payload: T) {
        self.publish_dyn(channel, Arc::new(payload)).await;
    }

    pub async fn publish_dyn(&self, channel: &str, payload: Payload) {
        let state = self.state();
        let deliverable = matches!(
            state,
            ActorState::Initialized
                | ActorState::Starting
                | ActorState::Running
                | ActorState::Paused
                | ActorState::Terminating
        );
        if !deliverable {
            warn!(actor = self.name(), channel, ?state, "publish dropped: actor not in a publishing state");
            return;
        }
        for filter in &self.filters {
            if !filter.allow(channel, &payload) {
                return;
            }
        }
        self.bus.publish(channel, payload, Some(self.handle.clone())).await;
    }

    /// Publishes on the first `write-to` entry (§4.3).
    pub async fn publish_default<T: Any + Send + Sync>(&self, payload: T) {
        if let Some(channel) = self.write_to.first().cloned() {
            self.publish(&channel, payload).await;
        } else {
            warn!(actor = self.name(), "publish_default called with no write-to channel configured");
        }
    }

    /// Subscribes this actor to an additional channel pattern at runtime,
    /// beyond its configured `read-from` list -- used by capabilities like
    /// [`crate::topic::TopicProvider`] that listen on reserved system
    /// channels decided by the capability, not by configuration.
    pub fn subscribe(&self, pattern: &str) -> SubscriptionHandle {
        self.bus.subscribe(&self.handle, pattern)
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        self.bus.unsubscribe(handle);
    }

    pub fn schedule_once(&self, sim_delay: Duration, timer_id: u64) -> crate::scheduler::TimerHandle {
        self.scheduler.schedule_once(self.handle.clone(), sim_delay, timer_id)
    }

    pub fn schedule_recurring(
        &self,
        initial: Duration,
        period: Duration,
        timer_id: u64,
    ) -> crate::scheduler::TimerHandle {
        self.scheduler
            .schedule_recurring(self.handle.clone(), initial, period, timer_id)
    }
}
