//! Two-actor publish/subscribe: a subscriber receives what a publisher
//! sends, in order (§8 "Invariants to verify").

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use race_kernel::actor::{spawn, Actor, ActorContext, LifecycleKind, MailboxPolicy};
use race_kernel::bus::{Bus, BusEvent};
use race_kernel::clock::Clock;
use race_kernel::error::ActorError;
use race_kernel::scheduler::Scheduler;
use race_kernel::testkit::ChannelProbe;

#[derive(Debug, Clone)]
struct Greeting(String);

struct Publisher;

#[async_trait]
impl Actor for Publisher {
    async fn on_start(&mut self, ctx: &mut ActorContext) -> Result<(), ActorError> {
        ctx.publish("/greetings", Greeting("hello".to_string())).await;
        ctx.publish("/greetings", Greeting("world".to_string())).await;
        Ok(())
    }

    async fn handle_message(&mut self, _ctx: &mut ActorContext, _event: BusEvent) -> Result<(), ActorError> {
        Ok(())
    }
}

async fn drive(handle: &race_kernel::actor::ActorHandle) {
    for kind in [LifecycleKind::Initialize, LifecycleKind::Start] {
        handle.send_lifecycle(kind, Duration::from_secs(1)).await.unwrap();
    }
}

#[tokio::test]
async fn subscriber_receives_publications_in_order() {
    let bus = Bus::new();
    let clock = Clock::real_time();
    let scheduler = Scheduler::new(clock.clone());

    let mut probe = ChannelProbe::subscribe(&bus, &clock, "/greetings").await;

    let publisher = spawn(
        "publisher",
        Publisher,
        bus.clone(),
        clock.clone(),
        scheduler,
        vec!["/greetings".to_string()],
        vec![],
        vec![],
        MailboxPolicy::default(),
        false,
    );
    drive(&publisher).await;

    assert!(
        probe
            .expect::<Greeting>(Duration::from_millis(500), |g| g.0 == "hello")
            .await
    );
    assert!(
        probe
            .expect::<Greeting>(Duration::from_millis(500), |g| g.0 == "world")
            .await
    );
}

#[tokio::test]
async fn late_subscriber_misses_earlier_publications() {
    let bus = Bus::new();
    let clock = Clock::real_time();

    bus.publish("/greetings", Arc::new(Greeting("missed".to_string())), None)
        .await;

    let mut probe = ChannelProbe::subscribe(&bus, &clock, "/greetings").await;
    assert!(probe.expect_none(Duration::from_millis(100)).await);
}
