//! Process-wide runtime holder (§3 "Universe").
//!
//! Grounded in the teacher's `ActorSystem`, the single object a process ties
//! its actor graph to: a name, a bus, a clock, and (here) a [`Master`] that
//! owns the live-actor set. A `Universe` does not run anything itself beyond
//! driving the phase sequence -- the tokio runtime and per-actor dispatch
//! tasks are the actual "threads of execution".

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tracing::{error, info};

use crate::bus::Bus;
use crate::clock::Clock;
use crate::config::UniverseConfig;
use crate::error::KernelError;
use crate::master::{ActorFactory, Master, PhaseTimeouts};

/// Signaled once every actor has reached `Terminated` or the Universe has
/// been aborted, so a driver awaiting shutdown does not have to poll.
#[derive(Clone, Default)]
pub struct TerminationBarrier {
    notify: Arc<Notify>,
    done: Arc<AtomicBool>,
}

impl TerminationBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) {
        self.done.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        if self.is_done() {
            return;
        }
        self.notify.notified().await;
    }
}

/// Process-wide holder for one actor graph (§3 "Universe").
pub struct Universe {
    pub name: String,
    pub bus: Bus,
    pub clock: Clock,
    pub master: Master,
    termination: TerminationBarrier,
}

impl Universe {
    /// Creates a Universe from a parsed configuration but does not yet
    /// create any actors -- call [`Universe::boot`] for the full
    /// CreateActors→Initialize→Start sequence.
    pub fn new(config: &UniverseConfig, timeouts: PhaseTimeouts) -> Self {
        let clock = Clock::new(config.start_time, config.time_scale);
        let bus = Bus::new();
        let master = Master::new(config.name.clone(), bus.clone(), clock.clone(), timeouts);
        Universe {
            name: config.name.clone(),
            bus,
            clock,
            master,
            termination: TerminationBarrier::new(),
        }
    }

    pub fn register_class(&mut self, class: impl Into<String>, factory: ActorFactory) {
        self.master.register_class(class, factory);
    }

    /// Registers a payload codec for remote forwarding; see
    /// [`Master::register_codec`].
    pub fn register_codec(&mut self, codec: crate::remote::connector::Codec) {
        self.master.register_codec(codec);
    }

    pub fn termination_barrier(&self) -> TerminationBarrier {
        self.termination.clone()
    }

    /// Read-only lookup by actor name, used by remote connectors and the
    /// channel-topic registry to resolve a `provider`/`subscriber` name to a
    /// live handle without a global singleton (§4.1 "Actor selection by
    /// path pattern").
    pub fn actor_ref(&self, name: &str) -> Option<crate::actor::ActorHandle> {
        self.master.handle_of(name)
    }

    /// Runs CreateActors→Initialize→Start in order (§4.1). On any
    /// non-optional failure the Universe is considered aborted: remaining
    /// phases are skipped and the error is returned (§7 error taxonomy:
    /// `UniverseAborted`).
    pub async fn boot(&mut self, config: &UniverseConfig) -> Result<(), KernelError> {
        info!(universe = %self.name, actor_count = config.actors.len(), "creating actors");
        self.master.create_actors(&config.actors)?;

        info!(universe = %self.name, "initializing actors");
        if let Err(e) = self.master.initialize().await {
            error!(universe = %self.name, error = %e, "initialize phase failed, aborting universe");
            return Err(KernelError::UniverseAborted(self.name.clone()));
        }

        info!(universe = %self.name, "starting actors");
        if let Err(e) = self.master.start().await {
            error!(universe = %self.name, error = %e, "start phase failed, aborting universe");
            return Err(KernelError::UniverseAborted(self.name.clone()));
        }

        Ok(())
    }

    pub async fn pause(&mut self) -> Result<(), KernelError> {
        self.master.pause().await
    }

    pub async fn resume(&mut self) -> Result<(), KernelError> {
        self.master.resume().await
    }

    /// Reverse-order Terminate, then signals the termination barrier
    /// (§3 "destroyed when all actors have reached Terminated").
    pub async fn shutdown(&mut self) -> Result<(), KernelError> {
        info!(universe = %self.name, "terminating actors");
        let result = self.master.terminate().await;
        self.termination.signal();
        result
    }
}
