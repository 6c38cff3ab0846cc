//! A handful of actor classes registered by name so `race-driver` (§6) is
//! runnable out of the box, the way the teacher ships a couple of example
//! actors (`Channel`'s own `SysActor`) alongside the library. An embedding
//! application with its own actor classes should call
//! [`crate::universe::Universe::register_class`] directly instead of going
//! through this registry.

use async_trait::async_trait;
use tracing::info;

use crate::actor::{Actor, ActorContext};
use crate::bus::BusEvent;
use crate::config::ActorConfig;
use crate::error::ActorError;
use crate::master::ActorFactory;
use crate::universe::Universe;

/// Logs every message it receives at `info` level; useful as a default
/// subscriber while wiring up a new configuration.
struct Logger;

#[async_trait]
impl Actor for Logger {
    async fn on_start(&mut self, ctx: &mut ActorContext) -> Result<(), ActorError> {
        info!(actor = ctx.name(), read_from = ?ctx.read_from(), "logger started");
        Ok(())
    }

    async fn handle_message(&mut self, ctx: &mut ActorContext, event: BusEvent) -> Result<(), ActorError> {
        info!(actor = ctx.name(), channel = %event.channel, "message received");
        Ok(())
    }
}

/// Publishes a single message once on its first `write-to` channel after
/// starting, then goes idle; useful for smoke-testing a configuration's
/// wiring end to end.
struct Ping {
    message: String,
}

#[async_trait]
impl Actor for Ping {
    async fn on_start(&mut self, ctx: &mut ActorContext) -> Result<(), ActorError> {
        ctx.publish_default(self.message.clone()).await;
        Ok(())
    }

    async fn handle_message(&mut self, _ctx: &mut ActorContext, _event: BusEvent) -> Result<(), ActorError> {
        Ok(())
    }
}

pub fn register_builtin_classes(universe: &mut Universe) {
    let logger_factory: ActorFactory = std::sync::Arc::new(|_cfg: &ActorConfig| Ok(Box::new(Logger) as Box<dyn Actor>));
    universe.register_class("Logger", logger_factory);

    let ping_factory: ActorFactory = std::sync::Arc::new(|cfg: &ActorConfig| {
        let message = cfg
            .properties
            .get_string("message")
            .unwrap_or_else(|_| "ping".to_string());
        Ok(Box::new(Ping { message }) as Box<dyn Actor>)
    });
    universe.register_class("Ping", ping_factory);
}
