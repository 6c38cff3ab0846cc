//! In-process publish/subscribe fabric (§4.2).
//!
//! Grounded in the teacher's `actor::channel::Channel` (a `HashMap<Topic,
//! Vec<BoxedTell>>` guarded by the actor's own single-threaded mailbox) but
//! generalized two ways the teacher's generic-`Msg` design can't express:
//! payloads are `Arc<dyn Any + Send + Sync>` so a single publication fans out
//! to subscribers with heterogeneous message types without cloning the
//! payload, and subscriptions are indexed by hierarchical channel path with
//! prefix-wildcard support rather than a flat topic enum. The subscription
//! map itself uses `dashmap` (already part of the teacher's dependency
//! stack) instead of a `Mutex<HashMap<..>>` so `subscribe`/`unsubscribe`
//! never blocks a publish for long, while still being linearizable per
//! bucket (§4.2 "Thread-safety").

use std::any::Any;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{trace, warn};

use crate::actor::ActorHandle;

pub const WILDCARD_SUFFIX: &str = "/*";
pub const LOCAL_PREFIX: &str = "/local/";
pub const DEAD_LETTERS_CHANNEL: &str = "/system/dead-letters";

/// A payload handed to [`Bus::publish`]. The kernel never downcasts this
/// itself -- only the receiving actor, which knows its own expected type,
/// does. See `Actor::handle_message` in [`crate::actor`].
pub type Payload = Arc<dyn Any + Send + Sync>;

/// The universal wrapper for bus publications (§3 "BusEvent").
#[derive(Clone)]
pub struct BusEvent {
    pub channel: String,
    pub payload: Payload,
    pub sender: Option<ActorHandle>,
}

impl BusEvent {
    pub fn new(channel: impl Into<String>, payload: Payload, sender: Option<ActorHandle>) -> Self {
        BusEvent {
            channel: channel.into(),
            payload,
            sender,
        }
    }

    pub fn downcast<T: 'static>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }
}

/// A subscription pattern: either a literal channel or a path-prefix
/// terminated with `/*` (§3 "Channel").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelPattern {
    Exact(String),
    Prefix(String),
}

impl ChannelPattern {
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix(WILDCARD_SUFFIX) {
            Some(prefix) => ChannelPattern::Prefix(prefix.to_string()),
            None => ChannelPattern::Exact(pattern.to_string()),
        }
    }

    pub fn matches(&self, channel: &str) -> bool {
        match self {
            ChannelPattern::Exact(e) => e == channel,
            ChannelPattern::Prefix(p) => {
                channel == p.as_str() || channel.starts_with(&format!("{p}/"))
            }
        }
    }

    pub fn as_key(&self) -> String {
        match self {
            ChannelPattern::Exact(c) => c.clone(),
            ChannelPattern::Prefix(p) => format!("{p}{WILDCARD_SUFFIX}"),
        }
    }
}

pub fn is_local_only(channel: &str) -> bool {
    channel.starts_with(LOCAL_PREFIX)
}

/// Opaque token returned by [`Bus::subscribe`], usable for [`Bus::unsubscribe`].
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    pub actor: String,
    pub pattern_key: String,
}

struct Subscription {
    pattern: ChannelPattern,
    handle: ActorHandle,
}

/// The single in-process fan-out fabric (§4.2).
///
/// Subscriptions are stored per pattern key so a publish only has to walk
/// the published channel's own ancestor path segments (one dashmap lookup
/// per ancestor) rather than scan every registered pattern.
#[derive(Clone, Default)]
pub struct Bus {
    subs: Arc<DashMap<String, Vec<Subscription>>>,
}

impl Bus {
    pub fn new() -> Self {
        Bus {
            subs: Arc::new(DashMap::new()),
        }
    }

    /// Idempotent for the same (actor, pattern) pair (§4.2).
    pub fn subscribe(&self, actor: &ActorHandle, pattern: &str) -> SubscriptionHandle {
        let pattern = ChannelPattern::parse(pattern);
        let key = pattern.as_key();
        let mut bucket = self.subs.entry(key.clone()).or_default();
        if !bucket.iter().any(|s| s.handle.name() == actor.name()) {
            bucket.push(Subscription {
                pattern,
                handle: actor.clone(),
            });
        }
        SubscriptionHandle {
            actor: actor.name().to_string(),
            pattern_key: key,
        }
    }

    pub fn unsubscribe(&self, handle: &SubscriptionHandle) {
        if let Some(mut bucket) = self.subs.get_mut(&handle.pattern_key) {
            bucket.retain(|s| s.handle.name() != handle.actor);
        }
    }

    pub fn unsubscribe_all(&self, actor: &ActorHandle) {
        for mut bucket in self.subs.iter_mut() {
            bucket.retain(|s| s.handle.name() != actor.name());
        }
    }

    /// Fans `payload` out to every subscriber whose pattern matches
    /// `channel`, including prefix-wildcard ancestors (§4.2 "Algorithm").
    /// Fire-and-forget: delivery failures (actor not receptive, mailbox
    /// closed) are logged and routed to the dead-letter channel, never
    /// propagated to the publisher.
    pub async fn publish(&self, channel: &str, payload: Payload, sender: Option<ActorHandle>) {
        let event = BusEvent::new(channel, payload, sender);
        let mut delivered = 0usize;

        if let Some(bucket) = self.subs.get(channel) {
            for sub in bucket.iter() {
                self.deliver(sub, &event).await;
                delivered += 1;
            }
        }

        for ancestor in ancestors(channel) {
            let key = format!("{ancestor}{WILDCARD_SUFFIX}");
            if let Some(bucket) = self.subs.get(&key) {
                for sub in bucket.iter() {
                    self.deliver(sub, &event).await;
                    delivered += 1;
                }
            }
        }

        if delivered == 0 && channel != DEAD_LETTERS_CHANNEL {
            trace!(channel, "publish had no local subscribers");
        }
    }

    async fn deliver(&self, sub: &Subscription, event: &BusEvent) {
        if !sub.pattern.matches(&event.channel) {
            return;
        }
        if let Err(e) = sub.handle.deliver_bus_event(event.clone()).await {
            warn!(actor = sub.handle.name(), channel = %event.channel, error = %e, "dropping publication: subscriber unreachable");
            if event.channel != DEAD_LETTERS_CHANNEL {
                self.publish_dead_letter(event.clone(), format!("{e}")).await;
            }
        }
    }

    async fn publish_dead_letter(&self, original: BusEvent, reason: String) {
        let dead_letter = Arc::new(DeadLetter {
            channel: original.channel,
            reason,
        });
        Box::pin(self.publish(DEAD_LETTERS_CHANNEL, dead_letter, original.sender))
            .await;
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        let mut count = self
            .subs
            .get(channel)
            .map(|b| b.len())
            .unwrap_or_default();
        for ancestor in ancestors(channel) {
            let key = format!("{ancestor}{WILDCARD_SUFFIX}");
            count += self.subs.get(&key).map(|b| b.len()).unwrap_or_default();
        }
        count
    }
}

/// Published on [`DEAD_LETTERS_CHANNEL`] whenever a publication could not be
/// delivered to a subscriber (supplemented feature, see `SPEC_FULL.md` §10).
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub channel: String,
    pub reason: String,
}

/// `channel` itself plus every path prefix above it, root first, so a
/// publish on `/airport/ksfo` also checks `/`, `/airport` and
/// `/airport/ksfo` against registered `/*` wildcard buckets -- a channel is
/// its own ancestor for prefix-subscription purposes (§4.2 "a publication on
/// `/airport` is visible to a subscriber of `/airport/*`").
fn ancestors(channel: &str) -> impl Iterator<Item = String> + '_ {
    let segments: Vec<&str> = channel.split('/').filter(|s| !s.is_empty()).collect();
    (0..=segments.len()).map(move |i| format!("/{}", segments[..i].join("/")))
}
