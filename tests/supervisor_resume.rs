//! A panic or error in `handle_message` is logged and the actor resumes
//! processing later messages rather than being restarted or killed
//! (§4.1 "Supervision").

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use race_kernel::actor::{spawn, Actor, ActorContext, ActorState, LifecycleKind, MailboxPolicy};
use race_kernel::bus::{Bus, BusEvent};
use race_kernel::clock::Clock;
use race_kernel::error::ActorError;
use race_kernel::scheduler::Scheduler;

struct Flaky {
    handled: Arc<AtomicUsize>,
}

#[async_trait]
impl Actor for Flaky {
    async fn handle_message(&mut self, _ctx: &mut ActorContext, event: BusEvent) -> Result<(), ActorError> {
        self.handled.fetch_add(1, Ordering::SeqCst);
        if let Some(cmd) = event.downcast::<&'static str>() {
            match *cmd {
                "error" => return Err(ActorError::new("handler returned an error")),
                "panic" => panic!("handler panicked"),
                _ => {}
            }
        }
        Ok(())
    }
}

#[tokio::test]
async fn actor_resumes_after_handler_error_and_panic() {
    let bus = Bus::new();
    let clock = Clock::real_time();
    let scheduler = Scheduler::new(clock.clone());
    let handled = Arc::new(AtomicUsize::new(0));

    let handle = spawn(
        "flaky",
        Flaky { handled: handled.clone() },
        bus.clone(),
        clock,
        scheduler,
        vec![],
        vec!["/commands".to_string()],
        vec![],
        MailboxPolicy::default(),
        false,
    );
    bus.subscribe(&handle, "/commands");
    for kind in [LifecycleKind::Initialize, LifecycleKind::Start] {
        handle.send_lifecycle(kind, Duration::from_secs(1)).await.unwrap();
    }

    bus.publish("/commands", Arc::new("error"), None).await;
    bus.publish("/commands", Arc::new("panic"), None).await;
    bus.publish("/commands", Arc::new("ok"), None).await;

    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(handled.load(Ordering::SeqCst), 3);
    assert_eq!(handle.state(), ActorState::Running);
}

struct FailsOnStart;

#[async_trait]
impl Actor for FailsOnStart {
    async fn on_start(&mut self, _ctx: &mut ActorContext) -> Result<(), ActorError> {
        Err(ActorError::new("cannot start"))
    }

    async fn handle_message(&mut self, _ctx: &mut ActorContext, _event: BusEvent) -> Result<(), ActorError> {
        Ok(())
    }
}

#[tokio::test]
async fn lifecycle_hook_failure_marks_the_actor_failed() {
    let bus = Bus::new();
    let clock = Clock::real_time();
    let scheduler = Scheduler::new(clock.clone());

    let handle = spawn(
        "fails-on-start",
        FailsOnStart,
        bus,
        clock,
        scheduler,
        vec![],
        vec![],
        vec![],
        MailboxPolicy::default(),
        false,
    );
    handle
        .send_lifecycle(LifecycleKind::Initialize, Duration::from_secs(1))
        .await
        .unwrap();
    let err = handle.send_lifecycle(LifecycleKind::Start, Duration::from_secs(1)).await;
    assert!(err.is_err());
    assert_eq!(handle.state(), ActorState::Failed);
}
