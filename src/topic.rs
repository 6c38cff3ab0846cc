//! On-demand flow-control protocol for high-volume upstream sources
//! (§4.5 "Channel-Topic Protocol").
//!
//! Grounded in the teacher's `Channel`/`ChannelMsg::Subscribe` handshake
//! (`riker/src/actor/channel.rs`): rather than a permanent subscription, a
//! consumer advertises *interest* in a narrow topic-key on a channel and a
//! producer only starts producing once accepted. The four message shapes
//! below travel over the ordinary [`crate::bus::Bus`] on reserved system
//! channels, so no separate transport is needed -- a Provider is just
//! another actor subscribed to `REQUEST_CHANNEL`.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bus::BusEvent;

pub const REQUEST_CHANNEL: &str = "/system/topic/request";
pub const RESPONSE_CHANNEL: &str = "/system/topic/response";
pub const ACCEPT_CHANNEL: &str = "/system/topic/accept";
pub const RELEASE_CHANNEL: &str = "/system/topic/release";

/// A topic-key is either a specific opaque selector or the `<all>`
/// system wildcard (§4.5 edge case (c)).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TopicKey {
    Key(String),
    All,
}

impl fmt::Display for TopicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TopicKey::Key(k) => write!(f, "{k}"),
            TopicKey::All => write!(f, "<all>"),
        }
    }
}

impl TopicKey {
    pub fn matches(&self, requested: &TopicKey) -> bool {
        matches!(self, TopicKey::All) || self == requested
    }
}

fn id(channel: &str, topic: &TopicKey) -> (String, TopicKey) {
    (channel.to_string(), topic.clone())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicRequest {
    pub channel: String,
    pub topic: TopicKey,
    pub subscriber: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicResponse {
    pub channel: String,
    pub topic: TopicKey,
    pub provider: String,
    pub subscriber: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicAccept {
    pub channel: String,
    pub topic: TopicKey,
    pub provider: String,
    pub subscriber: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicRelease {
    pub channel: String,
    pub topic: TopicKey,
    pub provider: String,
    pub subscriber: String,
}

/// Default window a Subscriber waits for `Response`s before retrying the
/// `Request` with backoff (§4.5 edge case (a)).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
pub const MAX_REQUEST_BACKOFF: Duration = Duration::from_secs(30);

pub fn next_backoff(previous: Duration) -> Duration {
    let doubled = previous.saturating_mul(2);
    if doubled > MAX_REQUEST_BACKOFF {
        MAX_REQUEST_BACKOFF
    } else if doubled.is_zero() {
        DEFAULT_REQUEST_TIMEOUT
    } else {
        doubled
    }
}

/// Subscriber-side bookkeeping for a single (channel, topic) demand. Tracks
/// the in-flight `Response`s and which `Provider` was accepted, so a
/// `Release` can name the right peer once the last local consumer drops.
#[derive(Default)]
pub struct TopicSubscription {
    accepted: Option<String>,
    candidates: Vec<String>,
}

impl TopicSubscription {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an incoming `Response`; first-received wins the tie-break
    /// unless an acceptance has already been made (§4.5 step 3).
    pub fn record_response(&mut self, provider: String) {
        if self.accepted.is_none() && !self.candidates.contains(&provider) {
            self.candidates.push(provider);
        }
    }

    /// Picks the provider to Accept: first received, per the default
    /// tie-break rule. Returns `None` if no Response has arrived yet.
    pub fn select(&mut self) -> Option<String> {
        if self.accepted.is_some() {
            return self.accepted.clone();
        }
        let chosen = self.candidates.first().cloned()?;
        self.accepted = Some(chosen.clone());
        Some(chosen)
    }

    pub fn accepted_provider(&self) -> Option<&str> {
        self.accepted.as_deref()
    }

    pub fn reset(&mut self) {
        self.accepted = None;
        self.candidates.clear();
    }
}

/// Provider-side bookkeeping across every topic it currently serves. A
/// `TransitiveProvider` (§4.5 step 4) is simply a Provider that also holds a
/// [`TopicSubscription`] for its own upstream demand.
#[derive(Default)]
pub struct TopicProviderRegistry {
    accepted_subscribers: HashMap<(String, TopicKey), HashSet<String>>,
    serves_all: HashSet<String>,
    served_keys: HashMap<String, HashSet<String>>,
}

impl TopicProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers unconditional service of every topic on `channel`
    /// (§4.5 edge case (c)); such a channel never needs a Request/Response
    /// round-trip on the Provider side.
    pub fn serve_all(&mut self, channel: impl Into<String>) {
        self.serves_all.insert(channel.into());
    }

    /// Registers service of a specific, named set of topic-keys on `channel`.
    pub fn serve_keys(&mut self, channel: impl Into<String>, keys: impl IntoIterator<Item = String>) {
        self.served_keys.entry(channel.into()).or_default().extend(keys);
    }

    pub fn can_serve(&self, channel: &str, topic: &TopicKey) -> bool {
        if self.serves_all.contains(channel) {
            return true;
        }
        match topic {
            TopicKey::All => false,
            TopicKey::Key(k) => self.served_keys.get(channel).is_some_and(|keys| keys.contains(k)),
        }
    }

    /// Returns `true` if this is the first accepted subscriber for the
    /// topic -- i.e. production should (re)start.
    pub fn accept(&mut self, channel: &str, topic: &TopicKey, subscriber: impl Into<String>) -> bool {
        let key = id(channel, topic);
        let set = self.accepted_subscribers.entry(key).or_default();
        let was_empty = set.is_empty();
        set.insert(subscriber.into());
        was_empty
    }

    /// Returns `true` if the accepted-subscriber count just dropped to
    /// zero -- i.e. production should stop and, if transitive, the
    /// Provider should propagate its own Release upstream (§4.5 step 5).
    pub fn release(&mut self, channel: &str, topic: &TopicKey, subscriber: &str) -> bool {
        let key = id(channel, topic);
        if let Some(set) = self.accepted_subscribers.get_mut(&key) {
            set.remove(subscriber);
            if set.is_empty() {
                self.accepted_subscribers.remove(&key);
                debug!(channel, topic = %topic, "last subscriber released, stopping production");
                return true;
            }
        }
        false
    }

    pub fn subscriber_count(&self, channel: &str, topic: &TopicKey) -> usize {
        self.accepted_subscribers
            .get(&id(channel, topic))
            .map(HashSet::len)
            .unwrap_or(0)
    }
}

/// Observable effect of feeding one [`crate::bus::BusEvent`] into a
/// [`TopicProvider`]: whether the accepted-subscriber count for some topic
/// just transitioned, so the owning actor knows when to start or stop
/// producing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicEffect {
    /// First subscriber accepted for some topic: start producing.
    Started,
    /// Last subscriber released for some topic: stop producing.
    Stopped,
    /// `event` was not a topic-protocol message this provider acts on.
    None,
}

/// Drives the Provider side of the protocol from ordinary bus traffic
/// (§4.5). An actor that produces on a channel composes one of these per
/// channel it serves, subscribes it once via [`TopicProvider::install`], and
/// feeds every `handle_message` event through [`TopicProvider::handle_event`].
pub struct TopicProvider {
    channel: String,
    registry: TopicProviderRegistry,
}

impl TopicProvider {
    /// A provider that answers every `Request` on `channel` regardless of
    /// topic-key (§4.5 edge case (c), the `<all>` bypass).
    pub fn serve_all(channel: impl Into<String>) -> Self {
        let channel = channel.into();
        let mut registry = TopicProviderRegistry::new();
        registry.serve_all(channel.clone());
        TopicProvider { channel, registry }
    }

    /// A provider that only answers `Request`s naming one of `keys`.
    pub fn serve_keys(channel: impl Into<String>, keys: impl IntoIterator<Item = String>) -> Self {
        let channel = channel.into();
        let mut registry = TopicProviderRegistry::new();
        registry.serve_keys(channel.clone(), keys);
        TopicProvider { channel, registry }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn can_serve(&self, topic: &TopicKey) -> bool {
        self.registry.can_serve(&self.channel, topic)
    }

    /// Subscribes to the three channels a Provider listens on. Call once,
    /// typically from `Actor::on_start`.
    pub fn install(&self, ctx: &crate::actor::ActorContext) {
        ctx.subscribe(REQUEST_CHANNEL);
        ctx.subscribe(ACCEPT_CHANNEL);
        ctx.subscribe(RELEASE_CHANNEL);
    }

    async fn respond(&self, ctx: &crate::actor::ActorContext, own_name: &str, req: &TopicRequest) {
        ctx.publish(
            RESPONSE_CHANNEL,
            TopicResponse {
                channel: req.channel.clone(),
                topic: req.topic.clone(),
                provider: own_name.to_string(),
                subscriber: req.subscriber.clone(),
            },
        )
        .await;
    }

    /// Feeds one bus event into the provider state machine (§4.5 steps
    /// 2/3/5). `own_name` is the provider's own actor name, since a
    /// `TopicAccept`/`TopicRelease` must be addressed to us specifically.
    pub async fn handle_event(&mut self, ctx: &crate::actor::ActorContext, own_name: &str, event: &BusEvent) -> TopicEffect {
        match event.channel.as_str() {
            REQUEST_CHANNEL => {
                if let Some(req) = event.downcast::<TopicRequest>() {
                    if req.channel == self.channel && self.can_serve(&req.topic) {
                        self.respond(ctx, own_name, req).await;
                    }
                }
                TopicEffect::None
            }
            ACCEPT_CHANNEL => {
                if let Some(acc) = event.downcast::<TopicAccept>() {
                    if acc.provider == own_name
                        && acc.channel == self.channel
                        && self.registry.accept(&acc.channel, &acc.topic, acc.subscriber.clone())
                    {
                        return TopicEffect::Started;
                    }
                }
                TopicEffect::None
            }
            RELEASE_CHANNEL => {
                if let Some(rel) = event.downcast::<TopicRelease>() {
                    if rel.provider == own_name
                        && rel.channel == self.channel
                        && self.registry.release(&rel.channel, &rel.topic, &rel.subscriber)
                    {
                        return TopicEffect::Stopped;
                    }
                }
                TopicEffect::None
            }
            _ => TopicEffect::None,
        }
    }
}

/// Drives the Subscriber side of the protocol (§4.5 steps 1/3/5). An actor
/// wanting on-demand data from a Provider composes one of these per demand.
pub struct TopicSubscriberClient {
    channel: String,
    topic: TopicKey,
    subscriber_name: String,
    subscription: TopicSubscription,
}

impl TopicSubscriberClient {
    pub fn new(channel: impl Into<String>, topic: TopicKey, subscriber_name: impl Into<String>) -> Self {
        TopicSubscriberClient {
            channel: channel.into(),
            topic,
            subscriber_name: subscriber_name.into(),
            subscription: TopicSubscription::new(),
        }
    }

    pub fn accepted_provider(&self) -> Option<&str> {
        self.subscription.accepted_provider()
    }

    /// Subscribes to `RESPONSE_CHANNEL`. Call once before the first
    /// [`TopicSubscriberClient::request`].
    pub fn install(&self, ctx: &crate::actor::ActorContext) {
        ctx.subscribe(RESPONSE_CHANNEL);
    }

    /// Publishes the initial `Request` (§4.5 step 1). Retry on timeout is
    /// the caller's responsibility, using [`next_backoff`] for the delay.
    pub async fn request(&self, ctx: &crate::actor::ActorContext) {
        ctx.publish(
            REQUEST_CHANNEL,
            TopicRequest {
                channel: self.channel.clone(),
                topic: self.topic.clone(),
                subscriber: self.subscriber_name.clone(),
            },
        )
        .await;
    }

    /// Records an incoming `Response`. Returns the provider name the instant
    /// one is first selected (§4.5 step 3), so the caller can publish the
    /// matching `Accept`.
    pub fn handle_response(&mut self, event: &BusEvent) -> Option<String> {
        if event.channel != RESPONSE_CHANNEL {
            return None;
        }
        let resp = event.downcast::<TopicResponse>()?;
        if resp.channel != self.channel || resp.topic != self.topic || resp.subscriber != self.subscriber_name {
            return None;
        }
        let already_accepted = self.subscription.accepted_provider().is_some();
        self.subscription.record_response(resp.provider.clone());
        if already_accepted {
            None
        } else {
            self.subscription.select()
        }
    }

    pub async fn accept(&self, ctx: &crate::actor::ActorContext, provider: &str) {
        ctx.publish(
            ACCEPT_CHANNEL,
            TopicAccept {
                channel: self.channel.clone(),
                topic: self.topic.clone(),
                provider: provider.to_string(),
                subscriber: self.subscriber_name.clone(),
            },
        )
        .await;
    }

    /// Releases the accepted provider, if any, and resets so a later
    /// [`TopicSubscriberClient::request`] starts a fresh round (§4.5 step 5).
    pub async fn release(&mut self, ctx: &crate::actor::ActorContext) {
        if let Some(provider) = self.subscription.accepted_provider().map(str::to_string) {
            ctx.publish(
                RELEASE_CHANNEL,
                TopicRelease {
                    channel: self.channel.clone(),
                    topic: self.topic.clone(),
                    provider,
                    subscriber: self.subscriber_name.clone(),
                },
            )
            .await;
            self.subscription.reset();
        }
    }
}

/// A Provider that is itself a Subscriber of some upstream channel: it
/// defers its own `Response`s until its upstream demand is satisfied, and
/// propagates a `Release` upstream once its last downstream subscriber drops
/// (§4.5 step 4, "Providers may themselves be Subscribers, making the
/// protocol transitive").
pub struct TransitiveProvider {
    downstream: TopicProvider,
    upstream: TopicSubscriberClient,
    pending_requests: Vec<TopicRequest>,
}

impl TransitiveProvider {
    pub fn new(downstream: TopicProvider, upstream: TopicSubscriberClient) -> Self {
        TransitiveProvider {
            downstream,
            upstream,
            pending_requests: Vec::new(),
        }
    }

    pub fn install(&self, ctx: &crate::actor::ActorContext) {
        self.downstream.install(ctx);
        self.upstream.install(ctx);
    }

    fn upstream_ready(&self) -> bool {
        self.upstream.accepted_provider().is_some()
    }

    /// Drives both halves of the protocol from one bus event, deferring a
    /// downstream `Response` behind our own upstream `Request`/`Accept`
    /// round-trip the first time we are asked (§4.5 step 4).
    pub async fn handle_event(&mut self, ctx: &crate::actor::ActorContext, own_name: &str, event: &BusEvent) -> TopicEffect {
        if let Some(chosen) = self.upstream.handle_response(event) {
            self.upstream.accept(ctx, &chosen).await;
            let pending = std::mem::take(&mut self.pending_requests);
            for req in &pending {
                self.downstream.respond(ctx, own_name, req).await;
            }
        }

        if event.channel == REQUEST_CHANNEL {
            if let Some(req) = event.downcast::<TopicRequest>() {
                if req.channel == self.downstream.channel && self.downstream.can_serve(&req.topic) {
                    if self.upstream_ready() {
                        self.downstream.respond(ctx, own_name, req).await;
                    } else {
                        self.pending_requests.push(req.clone());
                        self.upstream.request(ctx).await;
                    }
                    return TopicEffect::None;
                }
            }
        }

        let effect = self.downstream.handle_event(ctx, own_name, event).await;
        if effect == TopicEffect::Stopped {
            self.upstream.release(ctx).await;
        }
        effect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscription_tie_break_prefers_first_response() {
        let mut sub = TopicSubscription::new();
        sub.record_response("provider-a".into());
        sub.record_response("provider-b".into());
        assert_eq!(sub.select().as_deref(), Some("provider-a"));
        // Subsequent selects are stable even if more responses arrive.
        sub.record_response("provider-c".into());
        assert_eq!(sub.select().as_deref(), Some("provider-a"));
    }

    #[test]
    fn registry_tracks_first_accept_and_last_release() {
        let mut registry = TopicProviderRegistry::new();
        let topic = TopicKey::Key("ksfo".into());
        assert!(registry.accept("/flights/arrivals", &topic, "sub-1"));
        assert!(!registry.accept("/flights/arrivals", &topic, "sub-2"));
        assert!(!registry.release("/flights/arrivals", &topic, "sub-1"));
        assert!(registry.release("/flights/arrivals", &topic, "sub-2"));
        assert_eq!(registry.subscriber_count("/flights/arrivals", &topic), 0);
    }

    #[test]
    fn all_wildcard_bypasses_protocol() {
        let mut registry = TopicProviderRegistry::new();
        registry.serve_all("/weather/metar");
        assert!(registry.can_serve("/weather/metar", &TopicKey::Key("ksfo".into())));
        assert!(!registry.can_serve("/weather/taf", &TopicKey::Key("ksfo".into())));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let mut d = Duration::ZERO;
        d = next_backoff(d);
        assert_eq!(d, DEFAULT_REQUEST_TIMEOUT);
        for _ in 0..10 {
            d = next_backoff(d);
        }
        assert_eq!(d, MAX_REQUEST_BACKOFF);
    }

    #[test]
    fn serve_keys_only_answers_registered_keys() {
        let mut registry = TopicProviderRegistry::new();
        registry.serve_keys("/flights/arrivals", ["ksfo".to_string()]);
        assert!(registry.can_serve("/flights/arrivals", &TopicKey::Key("ksfo".into())));
        assert!(!registry.can_serve("/flights/arrivals", &TopicKey::Key("kjfk".into())));
        assert!(!registry.can_serve("/flights/arrivals", &TopicKey::All));
    }

    use crate::actor::{spawn, Actor, ActorContext, LifecycleKind, MailboxPolicy};
    use crate::bus::Bus;
    use crate::clock::Clock;
    use crate::error::ActorError;
    use crate::scheduler::Scheduler;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    async fn drive_to_running(handle: &crate::actor::ActorHandle) {
        for kind in [LifecycleKind::Initialize, LifecycleKind::Start] {
            handle.send_lifecycle(kind, Duration::from_secs(1)).await.unwrap();
        }
    }

    struct Source {
        provider: TopicProvider,
        started: mpsc::UnboundedSender<()>,
    }

    #[async_trait]
    impl Actor for Source {
        async fn on_start(&mut self, ctx: &mut ActorContext) -> Result<(), ActorError> {
            self.provider.install(ctx);
            Ok(())
        }

        async fn handle_message(&mut self, ctx: &mut ActorContext, event: BusEvent) -> Result<(), ActorError> {
            if self.provider.handle_event(ctx, "source", &event).await == TopicEffect::Started {
                let _ = self.started.send(());
            }
            Ok(())
        }
    }

    struct Sink {
        client: TopicSubscriberClient,
        accepted: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl Actor for Sink {
        async fn on_start(&mut self, ctx: &mut ActorContext) -> Result<(), ActorError> {
            self.client.install(ctx);
            self.client.request(ctx).await;
            Ok(())
        }

        async fn handle_message(&mut self, ctx: &mut ActorContext, event: BusEvent) -> Result<(), ActorError> {
            if let Some(provider) = self.client.handle_response(&event) {
                self.client.accept(ctx, &provider).await;
                let _ = self.accepted.send(provider);
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn provider_and_subscriber_client_drive_the_protocol_through_real_actors() {
        let bus = Bus::new();
        let clock = Clock::real_time();
        let scheduler = Scheduler::new(clock.clone());
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let (accepted_tx, mut accepted_rx) = mpsc::unbounded_channel();

        let source = spawn(
            "source",
            Source {
                provider: TopicProvider::serve_keys("/flights/arrivals", vec!["ksfo".to_string()]),
                started: started_tx,
            },
            bus.clone(),
            clock.clone(),
            scheduler.clone(),
            vec![],
            vec![],
            vec![],
            MailboxPolicy::default(),
            false,
        );
        drive_to_running(&source).await;

        let sink = spawn(
            "sink",
            Sink {
                client: TopicSubscriberClient::new("/flights/arrivals", TopicKey::Key("ksfo".into()), "sink"),
                accepted: accepted_tx,
            },
            bus.clone(),
            clock.clone(),
            scheduler,
            vec![],
            vec![],
            vec![],
            MailboxPolicy::default(),
            false,
        );
        drive_to_running(&sink).await;

        let provider = tokio::time::timeout(Duration::from_millis(500), accepted_rx.recv())
            .await
            .expect("sink should have accepted a provider")
            .unwrap();
        assert_eq!(provider, "source");
        tokio::time::timeout(Duration::from_millis(500), started_rx.recv())
            .await
            .expect("source should observe the accept as a Started effect")
            .unwrap();
    }

    struct Relay {
        transitive: TransitiveProvider,
        started: mpsc::UnboundedSender<()>,
    }

    #[async_trait]
    impl Actor for Relay {
        async fn on_start(&mut self, ctx: &mut ActorContext) -> Result<(), ActorError> {
            self.transitive.install(ctx);
            Ok(())
        }

        async fn handle_message(&mut self, ctx: &mut ActorContext, event: BusEvent) -> Result<(), ActorError> {
            if self.transitive.handle_event(ctx, "relay", &event).await == TopicEffect::Started {
                let _ = self.started.send(());
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn transitive_provider_defers_its_response_until_its_own_upstream_request_is_accepted() {
        let bus = Bus::new();
        let clock = Clock::real_time();
        let scheduler = Scheduler::new(clock.clone());
        let topic = TopicKey::Key("ksfo".into());

        let (source_started_tx, mut source_started_rx) = mpsc::unbounded_channel();
        let source = spawn(
            "source",
            Source {
                provider: TopicProvider::serve_keys("/flights/raw", vec!["ksfo".to_string()]),
                started: source_started_tx,
            },
            bus.clone(),
            clock.clone(),
            scheduler.clone(),
            vec![],
            vec![],
            vec![],
            MailboxPolicy::default(),
            false,
        );
        drive_to_running(&source).await;

        let (relay_started_tx, mut relay_started_rx) = mpsc::unbounded_channel();
        let relay = spawn(
            "relay",
            Relay {
                transitive: TransitiveProvider::new(
                    TopicProvider::serve_keys("/flights/enriched", vec!["ksfo".to_string()]),
                    TopicSubscriberClient::new("/flights/raw", topic.clone(), "relay"),
                ),
                started: relay_started_tx,
            },
            bus.clone(),
            clock.clone(),
            scheduler.clone(),
            vec![],
            vec![],
            vec![],
            MailboxPolicy::default(),
            false,
        );
        drive_to_running(&relay).await;

        let (accepted_tx, mut accepted_rx) = mpsc::unbounded_channel();
        let sink = spawn(
            "sink",
            Sink {
                client: TopicSubscriberClient::new("/flights/enriched", topic, "sink"),
                accepted: accepted_tx,
            },
            bus.clone(),
            clock.clone(),
            scheduler,
            vec![],
            vec![],
            vec![],
            MailboxPolicy::default(),
            false,
        );
        drive_to_running(&sink).await;

        // The sink's downstream Accept only flows once the relay's own
        // upstream Request/Accept round-trip with `source` has completed.
        let provider = tokio::time::timeout(Duration::from_millis(500), accepted_rx.recv())
            .await
            .expect("sink should eventually accept the relay")
            .unwrap();
        assert_eq!(provider, "relay");
        tokio::time::timeout(Duration::from_millis(500), source_started_rx.recv())
            .await
            .expect("relay's upstream demand should have started the source")
            .unwrap();
        tokio::time::timeout(Duration::from_millis(500), relay_started_rx.recv())
            .await
            .expect("relay's own downstream demand should have started")
            .unwrap();
    }
}
