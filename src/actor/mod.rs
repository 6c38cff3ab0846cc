//! Actor base: lifecycle state machine, mailbox dispatch, and the
//! publish/subscribe/continuous-time/channel-topic mix-in contracts (§4.3).

mod context;
mod handle;
mod mailbox;

pub use context::{ActorContext, PublishFilter};
pub use handle::{spawn, ActorHandle, DeliveryError};
pub use mailbox::{MailboxPolicy, TimerFired};

use async_trait::async_trait;
use tokio::sync::oneshot;

pub use crate::error::ActorError;
use crate::bus::BusEvent;

/// §4.3 "Lifecycle state machine".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ActorState {
    Unborn = 0,
    Initializing = 1,
    Initialized = 2,
    Starting = 3,
    Running = 4,
    Paused = 5,
    Terminating = 6,
    Terminated = 7,
    Failed = 8,
}

impl ActorState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ActorState::Terminated | ActorState::Failed)
    }

    pub fn accepts_user_messages(self) -> bool {
        matches!(self, ActorState::Running | ActorState::Paused)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleKind {
    Initialize,
    Start,
    Pause,
    Resume,
    Terminate,
}

pub(crate) struct LifecycleRequest {
    pub kind: LifecycleKind,
    pub ack: oneshot::Sender<Result<(), ActorError>>,
}

/// The kernel-to-actor interface (§9 "Actor lifecycle with overridable
/// callbacks"): a small set of hook functions rather than a deep class
/// hierarchy. Every hook has a default no-op/success implementation so an
/// actor only overrides the phases it cares about, the same way the
/// teacher's `Actor` trait defaults `pre_start`/`post_start`/`post_stop`.
#[async_trait]
pub trait Actor: Send + 'static {
    /// Unborn → Initializing → Initialized.
    async fn on_initialize(&mut self, _ctx: &mut ActorContext) -> Result<(), ActorError> {
        Ok(())
    }

    /// Initialized → Starting → Running.
    async fn on_start(&mut self, _ctx: &mut ActorContext) -> Result<(), ActorError> {
        Ok(())
    }

    /// Running → Paused.
    async fn on_pause(&mut self, _ctx: &mut ActorContext) -> Result<(), ActorError> {
        Ok(())
    }

    /// Paused → Running.
    async fn on_resume(&mut self, _ctx: &mut ActorContext) -> Result<(), ActorError> {
        Ok(())
    }

    /// any(≠Terminated) → Terminating → Terminated.
    async fn on_terminate(&mut self, _ctx: &mut ActorContext) -> Result<(), ActorError> {
        Ok(())
    }

    /// Invoked once per mailbox entry while `Running` (or `Paused`, if
    /// [`Actor::accepts_while_paused`] is `true`). A returned `Err` or a
    /// panic inside this call is logged and the actor resumes processing
    /// the next message (§4.1 "Supervision").
    async fn handle_message(
        &mut self,
        ctx: &mut ActorContext,
        event: BusEvent,
    ) -> Result<(), ActorError>;

    /// §9 open question (a): default is "no user messages while Paused".
    fn accepts_while_paused(&self) -> bool {
        false
    }
}

/// Lets the [`crate::master::Master`]'s actor factory registry hand out
/// trait objects (actor classes are resolved by name at configuration time,
/// so their concrete type is not known until then) while [`spawn`] stays
/// generic over a single `A: Actor` type parameter.
#[async_trait]
impl Actor for Box<dyn Actor> {
    async fn on_initialize(&mut self, ctx: &mut ActorContext) -> Result<(), ActorError> {
        (**self).on_initialize(ctx).await
    }

    async fn on_start(&mut self, ctx: &mut ActorContext) -> Result<(), ActorError> {
        (**self).on_start(ctx).await
    }

    async fn on_pause(&mut self, ctx: &mut ActorContext) -> Result<(), ActorError> {
        (**self).on_pause(ctx).await
    }

    async fn on_resume(&mut self, ctx: &mut ActorContext) -> Result<(), ActorError> {
        (**self).on_resume(ctx).await
    }

    async fn on_terminate(&mut self, ctx: &mut ActorContext) -> Result<(), ActorError> {
        (**self).on_terminate(ctx).await
    }

    async fn handle_message(
        &mut self,
        ctx: &mut ActorContext,
        event: BusEvent,
    ) -> Result<(), ActorError> {
        (**self).handle_message(ctx, event).await
    }

    fn accepts_while_paused(&self) -> bool {
        (**self).accepts_while_paused()
    }
}
