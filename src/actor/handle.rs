//! Cloneable actor reference and the actor's own dispatch loop.
//!
//! Grounded in the teacher's `ActorHandle`/`run_actor` pair in the Rust port
//! of this runtime (`odin_actor::tokio_kanal`): a handle is cheap to clone
//! and carries only an id, a sender, and shared state; the loop that owns
//! the actual `Actor` value and mailbox receiver runs in exactly one spawned
//! task, which is how "no two messages for the same actor execute
//! simultaneously" (§3) is realized without an explicit per-actor lock.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::bus::{Bus, BusEvent};
use crate::clock::Clock;
use crate::error::ActorError;
use crate::scheduler::Scheduler;

use super::context::{ActorContext, PublishFilter};
use super::mailbox::{mailbox, into_dead_letters, Envelope, EnqueueError, MailboxPolicy, MailboxSender, TimerFired};
use super::{Actor, ActorState, LifecycleKind, LifecycleRequest};

fn state_to_u8(s: ActorState) -> u8 {
    s as u8
}

fn u8_to_state(v: u8) -> ActorState {
    match v {
        0 => ActorState::Unborn,
        1 => ActorState::Initializing,
        2 => ActorState::Initialized,
        3 => ActorState::Starting,
        4 => ActorState::Running,
        5 => ActorState::Paused,
        6 => ActorState::Terminating,
        7 => ActorState::Terminated,
        _ => ActorState::Failed,
    }
}

struct Shared {
    name: String,
    state: AtomicU8,
    accepts_while_paused: bool,
}

/// A lightweight, cloneable reference to a live actor (§3 "Actor", minus the
/// fields only the owning task needs). Every publish/subscribe/lifecycle
/// operation goes through this handle rather than the actor value itself.
#[derive(Clone)]
pub struct ActorHandle {
    shared: Arc<Shared>,
    mailbox: MailboxSender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryError {
    NotReceptive(ActorState),
    MailboxClosed,
    MailboxDropped,
}

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryError::NotReceptive(s) => write!(f, "actor not in a receptive state ({s:?})"),
            DeliveryError::MailboxClosed => write!(f, "mailbox closed"),
            DeliveryError::MailboxDropped => write!(f, "mailbox full, message dropped"),
        }
    }
}

impl ActorHandle {
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn state(&self) -> ActorState {
        u8_to_state(self.shared.state.load(Ordering::Acquire))
    }

    fn set_state(&self, s: ActorState) {
        self.shared.state.store(state_to_u8(s), Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        !self.mailbox.is_closed()
    }

    /// Delivers a bus publication, enforcing §3 invariant (c): the bus never
    /// delivers to an actor not in a receptive state.
    pub async fn deliver_bus_event(&self, event: BusEvent) -> Result<(), DeliveryError> {
        let state = self.state();
        let receptive = matches!(state, ActorState::Running)
            || (matches!(state, ActorState::Paused) && self.shared.accepts_while_paused);
        if !receptive {
            return Err(DeliveryError::NotReceptive(state));
        }
        self.mailbox
            .enqueue(Envelope::User(event))
            .map_err(|e| match e {
                EnqueueError::Closed => DeliveryError::MailboxClosed,
                EnqueueError::Dropped => DeliveryError::MailboxDropped,
            })
    }

    pub(crate) fn deliver_timer(&self, id: u64) {
        let _ = self.mailbox.enqueue(Envelope::Timer(TimerFired { id }));
    }

    /// Sends a lifecycle message and awaits the actor's acknowledgment,
    /// failing with a timeout if the actor does not respond in time (§4.1,
    /// §5 "Cancellation and timeouts").
    pub async fn send_lifecycle(
        &self,
        kind: LifecycleKind,
        timeout: Duration,
    ) -> Result<(), ActorError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self
            .mailbox
            .enqueue(Envelope::Lifecycle(LifecycleRequest { kind, ack: ack_tx }))
            .is_err()
        {
            return Err(ActorError::new(format!("actor '{}' mailbox closed", self.name())));
        }
        match tokio::time::timeout(timeout, ack_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ActorError::new(format!(
                "actor '{}' dropped lifecycle ack channel",
                self.name()
            ))),
            Err(_) => Err(ActorError::new(format!(
                "actor '{}' timed out on {:?} after {:?}",
                self.name(),
                kind,
                timeout
            ))),
        }
    }

    /// Best-effort terminate without waiting for an ack; used by the grace
    /// period force-kill path (§4.1 "Terminate").
    pub fn close_mailbox(&self) {
        self.mailbox.close();
    }
}

/// Spawns the dispatch task for `actor` and returns a handle to it. The task
/// runs until the mailbox is closed and drained; it is the only place that
/// ever calls into user actor code, guaranteeing single-threaded semantics
/// per actor.
pub fn spawn<A: Actor>(
    name: impl Into<String>,
    actor: A,
    bus: Bus,
    clock: Clock,
    scheduler: Scheduler,
    write_to: Vec<String>,
    read_from: Vec<String>,
    filters: Vec<Arc<dyn PublishFilter>>,
    mailbox_policy: MailboxPolicy,
    accepts_while_paused: bool,
) -> ActorHandle {
    let name = name.into();
    let (tx, mut rx) = mailbox(mailbox_policy);
    let shared = Arc::new(Shared {
        name: name.clone(),
        state: AtomicU8::new(state_to_u8(ActorState::Unborn)),
        accepts_while_paused,
    });
    let handle = ActorHandle {
        shared: shared.clone(),
        mailbox: tx,
    };

    let mut ctx = ActorContext {
        handle: handle.clone(),
        bus: bus.clone(),
        clock,
        scheduler,
        write_to,
        read_from,
        filters,
    };

    let run_handle = handle.clone();
    let return_handle = handle.clone();
    tokio::spawn(async move {
        handle.set_state(ActorState::Initializing);
        let mut actor = actor;

        while let Some(envelope) = rx.recv().await {
            match envelope {
                Envelope::Lifecycle(req) => {
                    let result = run_lifecycle(&mut actor, &mut ctx, req.kind).await;
                    let failed = result.is_err();
                    let terminated = !failed && matches!(req.kind, LifecycleKind::Terminate);
                    // State must reach its final value before the ack is sent, so a
                    // caller awaiting `send_lifecycle` never observes a stale state.
                    if failed {
                        handle.set_state(ActorState::Failed);
                    }
                    let _ = req.ack.send(result);
                    if failed || terminated {
                        break;
                    }
                }
                Envelope::User(event) => {
                    run_user_message(&mut actor, &mut ctx, event).await;
                }
                Envelope::Timer(fired) => {
                    let wrapped = BusEvent::new("/system/timer", std::sync::Arc::new(fired), None);
                    run_user_message(&mut actor, &mut ctx, wrapped).await;
                }
            }
        }

        let leftover = into_dead_letters(rx.drain());
        if !leftover.is_empty() {
            warn!(actor = run_handle.name(), count = leftover.len(), "actor stopped with pending mailbox entries");
        }
        info!(actor = run_handle.name(), state = ?run_handle.state(), "actor dispatch loop ended");
    });

    return_handle
}

async fn run_lifecycle<A: Actor>(
    actor: &mut A,
    ctx: &mut ActorContext,
    kind: LifecycleKind,
) -> Result<(), ActorError> {
    // Enter the transitional "-ing" state before invoking the hook so
    // concurrent state reads distinguish in-flight from completed (§4.3).
    let (transitional, completed) = match kind {
        LifecycleKind::Initialize => (ActorState::Initializing, ActorState::Initialized),
        LifecycleKind::Start => (ActorState::Starting, ActorState::Running),
        LifecycleKind::Pause => (ActorState::Paused, ActorState::Paused),
        LifecycleKind::Resume => (ActorState::Running, ActorState::Running),
        LifecycleKind::Terminate => (ActorState::Terminating, ActorState::Terminated),
    };
    ctx.handle.set_state(transitional);

    let fut = async {
        match kind {
            LifecycleKind::Initialize => actor.on_initialize(ctx).await,
            LifecycleKind::Start => actor.on_start(ctx).await,
            LifecycleKind::Pause => actor.on_pause(ctx).await,
            LifecycleKind::Resume => actor.on_resume(ctx).await,
            LifecycleKind::Terminate => actor.on_terminate(ctx).await,
        }
    };

    let outcome = AssertUnwindSafe(fut).catch_unwind().await;
    let result = match outcome {
        Ok(r) => r,
        Err(_) => Err(ActorError::new(format!("panic in {kind:?} callback"))),
    };

    match &result {
        Ok(()) => ctx.handle.set_state(completed),
        Err(e) => error!(actor = ctx.name(), callback = ?kind, error = %e, "lifecycle callback failed"),
    }

    result
}

async fn run_user_message<A: Actor>(actor: &mut A, ctx: &mut ActorContext, event: BusEvent) {
    // Admission was already enforced at `deliver_bus_event` time; a state
    // change between enqueue and dequeue only matters for the dead states,
    // which stop the dispatch loop entirely before this is ever reached.
    let fut = actor.handle_message(ctx, event.clone());
    let outcome = AssertUnwindSafe(fut).catch_unwind().await;

    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(actor = ctx.name(), channel = %event.channel, error = %e, "message handling error; actor resumes");
        }
        Err(_) => {
            error!(actor = ctx.name(), channel = %event.channel, "panic handling message; actor resumes");
        }
    }
}
