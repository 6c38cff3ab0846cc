//! Phased actor lifecycle supervisor (§4.1 "Master").
//!
//! Grounded in the teacher's `SystemBuilder`/`ActorSystem` startup sequence,
//! which likewise walks a configuration-ordered actor list through a strict
//! phase barrier. Unlike the teacher, actor classes here are not known at
//! compile time -- they are resolved from a configuration `class` string --
//! so construction goes through a small factory registry instead of a
//! generic type parameter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::actor::{spawn, Actor, ActorContext, ActorHandle, LifecycleKind, MailboxPolicy};
use crate::bus::{Bus, BusEvent};
use crate::clock::Clock;
use crate::config::ActorConfig;
use crate::error::{ActorError, KernelError};
use crate::remote::connector::{next_backoff, Codec, InboundConnector, OutboundConnector};
use crate::remote::transport::{TcpTransport, Transport};
use crate::scheduler::Scheduler;

/// Builds a boxed actor instance from its resolved configuration
/// (§4.1 "CreateActors": "construct the Actor with its config as sole
/// argument").
pub type ActorFactory = Arc<dyn Fn(&ActorConfig) -> Result<Box<dyn Actor>, ActorError> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct PhaseTimeouts {
    pub initialize: Duration,
    pub start: Duration,
    pub pause: Duration,
    pub resume: Duration,
    pub terminate_grace: Duration,
}

impl Default for PhaseTimeouts {
    fn default() -> Self {
        PhaseTimeouts {
            initialize: Duration::from_secs(10),
            start: Duration::from_secs(10),
            pause: Duration::from_secs(5),
            resume: Duration::from_secs(5),
            terminate_grace: Duration::from_secs(15),
        }
    }
}

struct LiveActor {
    config: ActorConfig,
    handle: ActorHandle,
}

/// Owns the phased lifecycle of every Actor in a Universe (§4.1).
pub struct Master {
    universe_name: String,
    bus: Bus,
    clock: Clock,
    scheduler: Scheduler,
    registry: HashMap<String, ActorFactory>,
    codecs: Vec<Codec>,
    timeouts: PhaseTimeouts,
    live: Vec<LiveActor>,
    remote_tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Master {
    pub fn new(universe_name: impl Into<String>, bus: Bus, clock: Clock, timeouts: PhaseTimeouts) -> Self {
        Master {
            universe_name: universe_name.into(),
            bus,
            scheduler: Scheduler::new(clock.clone()),
            clock,
            registry: HashMap::new(),
            codecs: Vec::new(),
            timeouts,
            live: Vec::new(),
            remote_tasks: Vec::new(),
        }
    }

    /// Registers a constructor for a configuration `class` string. Classes
    /// not registered by the time [`Master::create_actors`] runs fail
    /// construction for any actor that names them.
    pub fn register_class(&mut self, class: impl Into<String>, factory: ActorFactory) {
        self.registry.insert(class.into(), factory);
    }

    /// Registers a payload codec tried, in registration order, against every
    /// outbound publication destined for a remote peer (§4.6 "Non-serializable
    /// payloads": the first codec that recognizes the payload wins).
    pub fn register_codec(&mut self, codec: Codec) {
        self.codecs.push(codec);
    }

    pub fn live_actor_names(&self) -> Vec<String> {
        self.live.iter().map(|a| a.handle.name().to_string()).collect()
    }

    pub fn handle_of(&self, name: &str) -> Option<ActorHandle> {
        self.live.iter().find(|a| a.handle.name() == name).map(|a| a.handle.clone())
    }

    /// §4.1 "CreateActors(configs)". Remote-backed entries (`remote` set,
    /// no local `class`) are not spawned here -- they are served by a
    /// [`crate::remote::connector::InboundConnector`] instead.
    pub fn create_actors(&mut self, configs: &[ActorConfig]) -> Result<(), KernelError> {
        for config in configs {
            if config.class.is_none() && config.is_remote() {
                info!(actor = %config.name, "actor is remote-backed, no local instance created");
                self.spawn_remote_peer(config.clone());
                continue;
            }
            let class = config.class.as_deref().ok_or_else(|| {
                KernelError::ActorConstruction {
                    actor: config.name.clone(),
                    reason: "neither class nor remote configured".to_string(),
                }
            })?;

            let factory = match self.registry.get(class) {
                Some(f) => f.clone(),
                None => {
                    let err = KernelError::ActorConstruction {
                        actor: config.name.clone(),
                        reason: format!("actor class '{class}' is not registered"),
                    };
                    if config.optional {
                        warn!(actor = %config.name, class, "optional actor skipped: unregistered class");
                        continue;
                    }
                    return Err(err);
                }
            };

            match factory(config) {
                Ok(actor) => {
                    let handle = spawn(
                        config.name.clone(),
                        actor,
                        self.bus.clone(),
                        self.clock.clone(),
                        self.scheduler.clone(),
                        config.write_to.clone(),
                        config.read_from.clone(),
                        Vec::new(),
                        MailboxPolicy::default(),
                        false,
                    );
                    self.live.push(LiveActor {
                        config: config.clone(),
                        handle,
                    });
                }
                Err(reason) => {
                    if config.optional {
                        warn!(actor = %config.name, %reason, "optional actor skipped: construction failed");
                        continue;
                    }
                    return Err(KernelError::ActorConstruction {
                        actor: config.name.clone(),
                        reason: reason.0,
                    });
                }
            }
        }
        Ok(())
    }

    /// §4.1 "Initialize()": forward phase barrier, Unborn→Initializing→Initialized.
    /// Each actor's `read-from` channels are subscribed immediately before
    /// its own Initialize is dispatched, not at construction time, so a
    /// publish made from another actor's `on_initialize` can never race a
    /// subscription that configuration says should already be in place
    /// (§4.3 "reads its read-from configuration at Initialize time").
    pub async fn initialize(&mut self) -> Result<(), KernelError> {
        for live in &self.live {
            for channel in &live.config.read_from {
                self.bus.subscribe(&live.handle, channel);
            }
        }
        self.run_phase_forward(LifecycleKind::Initialize, self.timeouts.initialize, "initialize")
            .await
    }

    /// §4.1 "Start()": forward phase barrier, Initialized→Starting→Running.
    pub async fn start(&mut self) -> Result<(), KernelError> {
        self.run_phase_forward(LifecycleKind::Start, self.timeouts.start, "start").await
    }

    pub async fn pause(&mut self) -> Result<(), KernelError> {
        self.run_phase_forward(LifecycleKind::Pause, self.timeouts.pause, "pause").await
    }

    pub async fn resume(&mut self) -> Result<(), KernelError> {
        self.run_phase_forward(LifecycleKind::Resume, self.timeouts.resume, "resume").await
    }

    /// §4.1 "Terminate()": reverse order, best-effort with a grace-period
    /// force-kill for non-responding actors.
    pub async fn terminate(&mut self) -> Result<(), KernelError> {
        for live in self.live.iter().rev() {
            self.bus.unsubscribe_all(&live.handle);
            match live
                .handle
                .send_lifecycle(LifecycleKind::Terminate, self.timeouts.terminate_grace)
                .await
            {
                Ok(()) => info!(actor = live.handle.name(), "terminated"),
                Err(e) => {
                    warn!(actor = live.handle.name(), error = %e, "force-killing non-responding actor");
                    live.handle.close_mailbox();
                }
            }
        }
        self.live.clear();
        for task in self.remote_tasks.drain(..) {
            task.abort();
        }
        Ok(())
    }

    /// §4.6 "Mechanism": builds the outbound/inbound BusConnector pair for
    /// one remote peer and runs it for the lifetime of the Master, connecting
    /// and reconnecting with exponential backoff whenever the peer drops
    /// (§4.6 "Failure model"). Spawned as a background task rather than
    /// awaited here -- a remote peer that is slow or down at boot must not
    /// block `CreateActors` for every other, local, actor.
    fn spawn_remote_peer(&mut self, config: ActorConfig) {
        let addr = match config.remote.clone() {
            Some(addr) => addr,
            None => return,
        };
        let bus = self.bus.clone();
        let clock = self.clock.clone();
        let scheduler = self.scheduler.clone();
        let universe_name = self.universe_name.clone();
        let codecs = self.codecs.clone();
        let label = config.name.clone();
        let forwarded_channels = config.write_to.clone();
        let initial_subscriptions = config.read_from.clone();

        let task = tokio::spawn(async move {
            let mut backoff = Duration::ZERO;
            loop {
                let transport = match TcpTransport::connect(&addr).await {
                    Ok(t) => t,
                    Err(e) => {
                        warn!(peer = %label, error = %e, "remote peer connection failed");
                        tokio::time::sleep(backoff).await;
                        backoff = next_backoff(backoff);
                        continue;
                    }
                };
                backoff = Duration::ZERO;
                let (write_half, mut read_half) = transport.split();
                let mut outbound = OutboundConnector::new(universe_name.clone(), write_half, forwarded_channels.clone());
                for channel in &initial_subscriptions {
                    if let Err(e) = outbound.subscribe(channel).await {
                        warn!(peer = %label, error = %e, "failed to advertise initial subscription");
                    }
                }

                let forwarder_handle = spawn(
                    format!("remote-forwarder-{label}"),
                    RemoteForwarder {
                        connector: outbound,
                        codecs: codecs.clone(),
                    },
                    bus.clone(),
                    clock.clone(),
                    scheduler.clone(),
                    Vec::new(),
                    Vec::new(),
                    Vec::new(),
                    MailboxPolicy::default(),
                    false,
                );
                for channel in &forwarded_channels {
                    bus.subscribe(&forwarder_handle, channel);
                }

                let startup_timeout = Duration::from_secs(10);
                let started = match forwarder_handle.send_lifecycle(LifecycleKind::Initialize, startup_timeout).await {
                    Ok(()) => forwarder_handle.send_lifecycle(LifecycleKind::Start, startup_timeout).await,
                    Err(e) => Err(e),
                };
                if started.is_err() {
                    warn!(peer = %label, "remote forwarder failed to start, retrying connection");
                    bus.unsubscribe_all(&forwarder_handle);
                    tokio::time::sleep(backoff).await;
                    backoff = next_backoff(backoff);
                    continue;
                }

                let inbound = InboundConnector::new(label.clone(), bus.clone());
                let served = inbound.drain(&mut read_half).await;

                bus.unsubscribe_all(&forwarder_handle);
                let _ = forwarder_handle
                    .send_lifecycle(LifecycleKind::Terminate, Duration::from_secs(5))
                    .await;
                backoff = inbound.announce_gone(served, backoff).await;
                tokio::time::sleep(backoff).await;
            }
        });
        self.remote_tasks.push(task);
    }

    /// Shared sequential-phase-barrier runner for Initialize/Start/Pause/Resume:
    /// actor `i`'s callback completes before actor `i+1`'s begins; a
    /// non-optional failure or timeout fails the whole phase (§4.1 "Ordering
    /// guarantees").
    async fn run_phase_forward(
        &mut self,
        kind: LifecycleKind,
        timeout: Duration,
        phase_name: &'static str,
    ) -> Result<(), KernelError> {
        let mut failed_optional = Vec::new();
        for live in &self.live {
            match live.handle.send_lifecycle(kind, timeout).await {
                Ok(()) => {}
                Err(e) => {
                    if live.config.optional {
                        warn!(actor = live.handle.name(), phase = phase_name, error = %e, "optional actor failed phase, dropping");
                        failed_optional.push(live.handle.name().to_string());
                    } else {
                        return Err(KernelError::LifecycleTimeout {
                            actor: live.handle.name().to_string(),
                            phase: phase_name,
                            timeout,
                        });
                    }
                }
            }
        }
        self.live.retain(|a| !failed_optional.contains(&a.handle.name().to_string()));
        Ok(())
    }
}

/// The local stand-in for a remote peer's interest: every publication on one
/// of its subscribed channels is handed to the [`OutboundConnector`] rather
/// than acted on locally. Wrapped in an `Actor` so forwarding goes through
/// the ordinary mailbox dispatch loop instead of a bespoke bus tap, the same
/// way [`crate::testkit::ChannelProbe`] rides the actor system rather than
/// inventing a second delivery path.
struct RemoteForwarder<T: Transport> {
    connector: OutboundConnector<T>,
    codecs: Vec<Codec>,
}

#[async_trait]
impl<T: Transport + 'static> Actor for RemoteForwarder<T> {
    async fn handle_message(&mut self, _ctx: &mut ActorContext, event: BusEvent) -> Result<(), ActorError> {
        for codec in &self.codecs {
            if let Some((class_tag, bytes)) = codec(&event.payload) {
                return self
                    .connector
                    .forward(&event.channel, class_tag, bytes)
                    .await
                    .map_err(|e| ActorError::new(format!("remote forward to peer failed: {e}")));
            }
        }
        warn!(channel = %event.channel, "no codec registered for payload, dropping remote forward");
        Ok(())
    }
}

#[cfg(test)]
mod remote_tests {
    use super::*;
    use crate::config::load_universe;
    use crate::remote::connector::json_codec;
    use crate::remote::transport::StreamTransport;
    use crate::remote::wire::TypeTag;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc;

    #[derive(serde::Serialize, serde::Deserialize)]
    struct Telemetry {
        value: i32,
    }

    #[tokio::test]
    async fn remote_peer_forwards_outbound_and_republishes_inbound() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let dir = std::env::temp_dir().join(format!("race-master-remote-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("u.toml");
        std::fs::write(
            &path,
            format!(
                r#"
                name = "local"
                [[actors]]
                name = "peer"
                remote = "{addr}"
                read-from = ["/inbox"]
                write-to = ["/telemetry"]
                "#
            ),
        )
        .unwrap();
        let config = load_universe(&[path], None, &Vec::new()).unwrap();

        let bus = Bus::new();
        let clock = Clock::real_time();
        let scheduler = Scheduler::new(clock.clone());

        // A probe standing in for a local actor subscribed to the channel
        // the remote peer is configured to read from.
        struct Forwarder(mpsc::UnboundedSender<String>);
        #[async_trait]
        impl Actor for Forwarder {
            async fn handle_message(&mut self, _ctx: &mut ActorContext, event: BusEvent) -> Result<(), ActorError> {
                let _ = self.0.send(event.channel.clone());
                Ok(())
            }
        }
        let (tx, mut rx) = mpsc::unbounded_channel();
        let probe = spawn(
            "inbox-probe",
            Forwarder(tx),
            bus.clone(),
            clock.clone(),
            scheduler,
            Vec::new(),
            Vec::new(),
            Vec::new(),
            MailboxPolicy::default(),
            false,
        );
        bus.subscribe(&probe, "/inbox");
        probe
            .send_lifecycle(LifecycleKind::Initialize, Duration::from_secs(1))
            .await
            .unwrap();
        probe.send_lifecycle(LifecycleKind::Start, Duration::from_secs(1)).await.unwrap();

        let mut master = Master::new("local", bus.clone(), clock, PhaseTimeouts::default());
        master.register_codec(json_codec::<Telemetry>("Telemetry"));
        master.create_actors(&config.actors).unwrap();

        let (stream, peer) = listener.accept().await.unwrap();
        let mut server = StreamTransport::new(stream, peer.to_string());

        let subscribe = tokio::time::timeout(Duration::from_secs(2), server.recv())
            .await
            .expect("initial subscribe advertisement")
            .unwrap();
        assert_eq!(subscribe.type_tag, TypeTag::Subscribe);
        assert_eq!(subscribe.channel, "/inbox");

        // The forwarder actor subscribes to "/telemetry" asynchronously
        // after sending the initial subscribe advertisement, so publish on
        // a short repeating timer rather than once -- a single publish
        // issued before that subscription lands would simply have no
        // subscriber and be dropped.
        let publisher = tokio::spawn({
            let bus = bus.clone();
            async move {
                loop {
                    bus.publish("/telemetry", Arc::new(Telemetry { value: 7 }), None).await;
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
            }
        });
        let forwarded = tokio::time::timeout(Duration::from_secs(2), server.recv())
            .await
            .expect("outbound publication forwarded over the wire")
            .unwrap();
        publisher.abort();
        assert_eq!(forwarded.channel, "/telemetry");
        assert_eq!(forwarded.type_tag, TypeTag::Data("Telemetry".to_string()));

        let inbound_envelope = crate::remote::wire::Envelope {
            source_universe: "remote".into(),
            channel: "/inbox".into(),
            type_tag: TypeTag::Data("Telemetry".into()),
            sequence: 0,
            payload: serde_json::to_vec(&Telemetry { value: 9 }).unwrap(),
        };
        server.send(&inbound_envelope).await.unwrap();

        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("inbound envelope republished locally")
            .unwrap();
        assert_eq!(received, "/inbox");

        std::fs::remove_dir_all(&dir).ok();
    }
}
