//! Deferred self-message scheduling (§4.4 "Scheduling").
//!
//! Grounded in the teacher's `system::timer` module and the `odin_actor`
//! Rust port's `oneshot_timer_for`/`repeat_timer_for` helpers: a timer is
//! just a spawned task that sleeps (in wall time, converted from sim time
//! via the [`Clock`]) and then tries to deliver a `TimerFired` message to
//! the target actor. Cancellation is best-effort: it aborts the sleeping
//! task, but a message already handed to the mailbox still gets processed
//! (§4.4 "Cancellation returns a handle").

use std::time::Duration;

use tokio::task::AbortHandle;

use crate::actor::ActorHandle;
use crate::clock::Clock;

#[derive(Clone)]
pub struct Scheduler {
    clock: Clock,
}

/// Returned by [`Scheduler::schedule_once`]/[`Scheduler::schedule_recurring`].
/// Dropping it does *not* cancel the timer -- call [`TimerHandle::cancel`]
/// explicitly, matching the explicit-cancel contract in §4.4.
pub struct TimerHandle {
    abort: AbortHandle,
}

impl TimerHandle {
    pub fn cancel(&self) {
        self.abort.abort();
    }
}

impl Scheduler {
    pub fn new(clock: Clock) -> Self {
        Scheduler { clock }
    }

    pub fn schedule_once(&self, target: ActorHandle, sim_delay: Duration, timer_id: u64) -> TimerHandle {
        let wall_delay = self.clock.to_wall_duration(sim_delay);
        let join = tokio::spawn(async move {
            tokio::time::sleep(wall_delay).await;
            if target.is_running() {
                target.deliver_timer(timer_id);
            }
        });
        TimerHandle {
            abort: join.abort_handle(),
        }
    }

    pub fn schedule_recurring(
        &self,
        target: ActorHandle,
        initial: Duration,
        period: Duration,
        timer_id: u64,
    ) -> TimerHandle {
        let wall_initial = self.clock.to_wall_duration(initial);
        let wall_period = self.clock.to_wall_duration(period).max(Duration::from_millis(1));
        let join = tokio::spawn(async move {
            tokio::time::sleep(wall_initial).await;
            let mut ticker = tokio::time::interval(wall_period);
            loop {
                if !target.is_running() {
                    break;
                }
                target.deliver_timer(timer_id);
                ticker.tick().await;
            }
        });
        TimerHandle {
            abort: join.abort_handle(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{Actor, ActorContext, MailboxPolicy};
    use crate::bus::{Bus, BusEvent};
    use crate::error::ActorError;
    use async_trait::async_trait;
    use chrono::Utc;

    struct Noop;

    #[async_trait]
    impl Actor for Noop {
        async fn handle_message(&mut self, _ctx: &mut ActorContext, _event: BusEvent) -> Result<(), ActorError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn cancel_prevents_further_firing() {
        let clock = Clock::new(Utc::now(), 1.0);
        let scheduler = Scheduler::new(clock.clone());
        let bus = Bus::new();
        let handle = crate::actor::spawn(
            "noop",
            Noop,
            bus,
            clock,
            scheduler.clone(),
            vec![],
            vec![],
            vec![],
            MailboxPolicy::default(),
            false,
        );
        let timer = scheduler.schedule_once(handle, Duration::from_millis(5), 1);
        timer.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;
        // No assertion beyond "did not panic": cancellation is best-effort.
    }
}
