//! Binding and running behaviours.
//!
//! Construction is two-phase: a behaviour is an ordinary value until
//! [`Bound::attach`] gives it an inbox, an owner and an execution context.
//! [`Bound::start`] consumes the bound value, so a behaviour can be started
//! at most once.
//!
//! Errors from hooks or the body end the behaviour's run without calling
//! `on_end`; the failure is logged, published as `BehaviourEvent::Failed`
//! and recorded as `ExitReason::Failed`. Sibling behaviours are unaffected.

use chrono::Utc;
use futures::FutureExt;
use spindle_core::Template;
use spindle_core::event::BehaviourEvent;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::behaviour::Behaviour;
use crate::context::{AgentLink, BehaviourContext};
use crate::handle::{BehaviourHandle, ExitReason};
use crate::runtime::ExecutionContext;

/// A behaviour bound to an agent and an execution context, not yet started.
pub struct Bound {
    behaviour: Box<dyn Behaviour>,
    ctx: BehaviourContext,
}

impl Bound {
    /// Allocate the inbox on `context` and record `agent` as the owner.
    pub fn attach<B: Behaviour>(behaviour: B, context: &ExecutionContext, agent: AgentLink) -> Self {
        Self::attach_boxed(Box::new(behaviour), context, agent)
    }

    pub fn attach_boxed(
        behaviour: Box<dyn Behaviour>,
        context: &ExecutionContext,
        agent: AgentLink,
    ) -> Self {
        let (inbox, queue) = context.queue();
        let handle = BehaviourHandle::new(behaviour.name().to_string(), inbox);
        debug!(
            behaviour = %handle.name(),
            agent = %agent.jid(),
            context = %context.name(),
            "Bound behaviour"
        );
        let ctx = BehaviourContext::new(handle, queue, agent, context.clone());
        Self { behaviour, ctx }
    }

    /// Restrict which messages the dispatch router hands to this behaviour.
    ///
    /// A template can be set once; later calls are ignored with a warning.
    pub fn with_template(self, template: impl Template + 'static) -> Self {
        self.with_shared_template(Arc::new(template))
    }

    pub fn with_shared_template(self, template: Arc<dyn Template>) -> Self {
        if !self.ctx.handle().set_template(template) {
            warn!(behaviour = %self.ctx.handle().name(), "Template already set, ignoring");
        }
        self
    }

    /// Handle usable before start, e.g. to enqueue messages early.
    pub fn handle(&self) -> &BehaviourHandle {
        self.ctx.handle()
    }

    /// Submit the behaviour's lifecycle to its execution context.
    pub fn start(self) -> BehaviourHandle {
        let handle = self.ctx.handle().clone();
        let context = self.ctx.execution_context().clone();
        // Armed before submit: a task dropped unpolled still reaches Done
        let guard = FinishGuard {
            handle: handle.clone(),
            armed: true,
        };
        handle.mark_running();
        context.submit(drive(self.behaviour, self.ctx, guard));
        handle
    }
}

/// Leaves the handle in `Done` even if the task is dropped mid-flight.
struct FinishGuard {
    handle: BehaviourHandle,
    armed: bool,
}

impl FinishGuard {
    fn finish(mut self, reason: ExitReason) {
        self.armed = false;
        self.handle.finish(reason);
    }
}

impl Drop for FinishGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let reason = if std::thread::panicking() {
            ExitReason::Panicked("task panicked".into())
        } else {
            debug!(behaviour = %self.handle.name(), "Behaviour task dropped before finishing");
            ExitReason::Cancelled
        };
        self.handle.finish(reason);
    }
}

async fn drive(mut behaviour: Box<dyn Behaviour>, mut ctx: BehaviourContext, guard: FinishGuard) {
    let handle = ctx.handle().clone();
    let agent = ctx.jid().to_string();
    let events = ctx.agent().events().clone();

    info!(behaviour = %handle.name(), agent = %agent, "Starting behaviour");
    events.publish(BehaviourEvent::Started {
        agent: agent.clone(),
        behaviour: handle.name().to_string(),
        timestamp: Utc::now(),
    });

    let outcome = AssertUnwindSafe(run_lifecycle(behaviour.as_mut(), &mut ctx))
        .catch_unwind()
        .await;
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(payload) => {
            let reason = panic_message(payload.as_ref());
            warn!(behaviour = %handle.name(), reason = %reason, "Behaviour panicked");
            events.publish(BehaviourEvent::Failed {
                agent,
                behaviour: handle.name().to_string(),
                error_message: format!("panicked: {reason}"),
                timestamp: Utc::now(),
            });
            drop(ctx);
            guard.finish(ExitReason::Panicked(reason));
            return;
        }
    };

    let reason = match outcome {
        Ok((ExitReason::Killed, iterations)) => {
            info!(behaviour = %handle.name(), iterations, "Behaviour killed");
            events.publish(BehaviourEvent::Killed {
                agent,
                behaviour: handle.name().to_string(),
                iterations,
                timestamp: Utc::now(),
            });
            ExitReason::Killed
        }
        Ok((reason, iterations)) => {
            info!(behaviour = %handle.name(), iterations, "Behaviour finished");
            events.publish(BehaviourEvent::Finished {
                agent,
                behaviour: handle.name().to_string(),
                iterations,
                timestamp: Utc::now(),
            });
            reason
        }
        Err(e) => {
            warn!(behaviour = %handle.name(), error = %e, "Behaviour failed");
            events.publish(BehaviourEvent::Failed {
                agent,
                behaviour: handle.name().to_string(),
                error_message: e.to_string(),
                timestamp: Utc::now(),
            });
            ExitReason::Failed(e.to_string())
        }
    };

    // Queue read side goes away with the context: late enqueues report Closed
    drop(ctx);
    guard.finish(reason);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}

async fn run_lifecycle(
    behaviour: &mut dyn Behaviour,
    ctx: &mut BehaviourContext,
) -> spindle_core::Result<(ExitReason, u64)> {
    behaviour.on_start(ctx).await?;

    let mut iterations: u64 = 0;
    let reason = loop {
        if behaviour.done() {
            break ExitReason::Completed;
        }
        if ctx.is_killed() {
            break ExitReason::Killed;
        }
        behaviour.step(ctx).await?;
        iterations += 1;
        // Let siblings on the same event loop run between iterations
        tokio::task::yield_now().await;
    };

    behaviour.on_end(ctx).await?;
    Ok((reason, iterations))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::BehaviourState;
    use crate::testing::{FailingTransport, RecordingTransport, agent_link, jid};
    use async_trait::async_trait;
    use spindle_core::error::{BehaviourError, TransportError};
    use spindle_core::{Error, Message, MessageTemplate};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Counts hook invocations; finishes after `limit` bodies if set.
    #[derive(Default, Clone)]
    struct Counters {
        starts: Arc<AtomicUsize>,
        runs: Arc<AtomicUsize>,
        ends: Arc<AtomicUsize>,
    }

    struct Counting {
        counters: Counters,
        limit: Option<usize>,
    }

    #[async_trait]
    impl Behaviour for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        async fn on_start(&mut self, _ctx: &mut BehaviourContext) -> spindle_core::Result<()> {
            self.counters.starts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn run(&mut self, _ctx: &mut BehaviourContext) -> spindle_core::Result<()> {
            self.counters.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(1)).await;
            Ok(())
        }

        fn done(&mut self) -> bool {
            self.limit
                .is_some_and(|l| self.counters.runs.load(Ordering::SeqCst) >= l)
        }

        async fn on_end(&mut self, _ctx: &mut BehaviourContext) -> spindle_core::Result<()> {
            self.counters.ends.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn lifecycle_runs_hooks_in_order() {
        let ctx = ExecutionContext::current().unwrap();
        let counters = Counters::default();
        let b = Counting {
            counters: counters.clone(),
            limit: Some(3),
        };
        let bound = Bound::attach(b, &ctx, agent_link("alice@localhost"));
        assert_eq!(bound.handle().state(), BehaviourState::Bound);

        let handle = bound.start();
        assert_eq!(handle.join().await.unwrap(), ExitReason::Completed);
        assert_eq!(handle.state(), BehaviourState::Done);
        assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
        assert_eq!(counters.runs.load(Ordering::SeqCst), 3);
        assert_eq!(counters.ends.load(Ordering::SeqCst), 1);
        assert!(!handle.is_killed());
    }

    #[tokio::test]
    async fn kill_stops_infinite_behaviour_after_in_flight_body() {
        let ctx = ExecutionContext::current().unwrap();
        let counters = Counters::default();
        let handle = Bound::attach(
            Counting {
                counters: counters.clone(),
                limit: None,
            },
            &ctx,
            agent_link("alice@localhost"),
        )
        .start();

        // Kill from another task once a few iterations went by
        let killer = handle.clone();
        let probe = counters.clone();
        ctx.submit(async move {
            while probe.runs.load(Ordering::SeqCst) < 3 {
                tokio::task::yield_now().await;
            }
            killer.kill();
        });

        assert_eq!(handle.join().await.unwrap(), ExitReason::Killed);
        assert!(handle.is_killed());
        assert!(counters.runs.load(Ordering::SeqCst) >= 3);
        assert_eq!(counters.ends.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn killed_before_start_never_runs_body() {
        let ctx = ExecutionContext::current().unwrap();
        let counters = Counters::default();
        let bound = Bound::attach(
            Counting {
                counters: counters.clone(),
                limit: None,
            },
            &ctx,
            agent_link("alice@localhost"),
        );
        bound.handle().kill();
        let handle = bound.start();
        assert_eq!(handle.join().await.unwrap(), ExitReason::Killed);
        assert_eq!(counters.starts.load(Ordering::SeqCst), 1);
        assert_eq!(counters.runs.load(Ordering::SeqCst), 0);
        assert_eq!(counters.ends.load(Ordering::SeqCst), 1);
    }

    struct FailsOnSecondRun {
        runs: usize,
        ended: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Behaviour for FailsOnSecondRun {
        async fn run(&mut self, _ctx: &mut BehaviourContext) -> spindle_core::Result<()> {
            self.runs += 1;
            if self.runs == 2 {
                return Err(BehaviourError::Failed("boom".into()).into());
            }
            Ok(())
        }

        async fn on_end(&mut self, _ctx: &mut BehaviourContext) -> spindle_core::Result<()> {
            self.ended.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn body_error_skips_on_end_and_reports_failure() {
        let ctx = ExecutionContext::current().unwrap();
        let link = agent_link("alice@localhost");
        let mut events = link.events().subscribe();
        let ended = Arc::new(AtomicBool::new(false));

        let handle = Bound::attach(
            FailsOnSecondRun {
                runs: 0,
                ended: ended.clone(),
            },
            &ctx,
            link,
        )
        .start();

        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, BehaviourError::Failed(ref m) if m.contains("boom")));
        assert!(matches!(handle.exit_reason(), Some(ExitReason::Failed(_))));
        assert!(handle.is_done());
        assert!(!ended.load(Ordering::SeqCst), "on_end must not run after a failure");

        let mut saw_failed = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event.as_ref(), BehaviourEvent::Failed { .. }) {
                saw_failed = true;
            }
        }
        assert!(saw_failed);
    }

    struct FailsOnStart {
        runs: Arc<AtomicUsize>,
        ended: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Behaviour for FailsOnStart {
        async fn on_start(&mut self, _ctx: &mut BehaviourContext) -> spindle_core::Result<()> {
            Err(BehaviourError::Failed("setup refused".into()).into())
        }

        async fn run(&mut self, _ctx: &mut BehaviourContext) -> spindle_core::Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn on_end(&mut self, _ctx: &mut BehaviourContext) -> spindle_core::Result<()> {
            self.ended.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn on_start_error_skips_body_and_on_end() {
        let ctx = ExecutionContext::current().unwrap();
        let link = agent_link("alice@localhost");
        let mut events = link.events().subscribe();
        let runs = Arc::new(AtomicUsize::new(0));
        let ended = Arc::new(AtomicBool::new(false));

        let handle = Bound::attach(
            FailsOnStart {
                runs: runs.clone(),
                ended: ended.clone(),
            },
            &ctx,
            link,
        )
        .start();

        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, BehaviourError::Failed(ref m) if m.contains("setup refused")));
        assert!(matches!(handle.exit_reason(), Some(ExitReason::Failed(_))));
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(!ended.load(Ordering::SeqCst));

        let mut saw_failed = false;
        while let Ok(event) = events.try_recv() {
            if matches!(event.as_ref(), BehaviourEvent::Failed { .. }) {
                saw_failed = true;
            }
        }
        assert!(saw_failed);
    }

    #[tokio::test]
    async fn failure_does_not_affect_siblings() {
        let ctx = ExecutionContext::current().unwrap();
        let counters = Counters::default();
        let failing = Bound::attach(
            FailsOnSecondRun {
                runs: 0,
                ended: Arc::new(AtomicBool::new(false)),
            },
            &ctx,
            agent_link("alice@localhost"),
        )
        .start();
        let healthy = Bound::attach(
            Counting {
                counters: counters.clone(),
                limit: Some(5),
            },
            &ctx,
            agent_link("alice@localhost"),
        )
        .start();

        assert!(failing.join().await.is_err());
        assert_eq!(healthy.join().await.unwrap(), ExitReason::Completed);
        assert_eq!(counters.runs.load(Ordering::SeqCst), 5);
    }

    struct Panics;

    #[async_trait]
    impl Behaviour for Panics {
        async fn run(&mut self, _ctx: &mut BehaviourContext) -> spindle_core::Result<()> {
            panic!("body exploded");
        }
    }

    #[tokio::test]
    async fn panic_is_reported_by_join() {
        let ctx = ExecutionContext::current().unwrap();
        let handle = Bound::attach(Panics, &ctx, agent_link("alice@localhost")).start();
        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, BehaviourError::Panicked { ref reason, .. } if reason == "body exploded"));
        assert_eq!(
            handle.exit_reason(),
            Some(ExitReason::Panicked("body exploded".into()))
        );
    }

    #[tokio::test]
    async fn start_on_stopped_loop_reports_cancelled() {
        let thread = crate::runtime::AgentThread::spawn("stopped").unwrap();
        let counters = Counters::default();
        let bound = Bound::attach(
            Counting {
                counters: counters.clone(),
                limit: None,
            },
            thread.context(),
            agent_link("alice@localhost"),
        );
        thread.shutdown();

        let handle = bound.start();
        let joined = tokio::time::timeout(Duration::from_secs(2), handle.join())
            .await
            .expect("join must not hang");
        assert!(matches!(joined, Err(BehaviourError::Cancelled(_))));
        assert_eq!(handle.state(), BehaviourState::Done);
        assert_eq!(handle.exit_reason(), Some(ExitReason::Cancelled));
        assert_eq!(counters.starts.load(Ordering::SeqCst), 0);
    }

    /// Sends one message then stops.
    struct SendOnce {
        message: Option<Message>,
        sent: Arc<std::sync::Mutex<Option<Message>>>,
    }

    #[async_trait]
    impl Behaviour for SendOnce {
        async fn run(&mut self, ctx: &mut BehaviourContext) -> spindle_core::Result<()> {
            if let Some(mut msg) = self.message.take() {
                ctx.send(&mut msg).await?;
                *self.sent.lock().unwrap() = Some(msg);
            }
            Ok(())
        }

        fn done(&mut self) -> bool {
            self.message.is_none()
        }
    }

    #[tokio::test]
    async fn send_injects_sender_when_absent() {
        let ctx = ExecutionContext::current().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let link = crate::testing::agent_link_with("alice@localhost", transport.clone());
        let sent = Arc::new(std::sync::Mutex::new(None));

        let handle = Bound::attach(
            SendOnce {
                message: Some(Message::new(jid("bob@localhost")).with_body("hi")),
                sent: sent.clone(),
            },
            &ctx,
            link,
        )
        .start();
        handle.join().await.unwrap();

        let msg = sent.lock().unwrap().clone().unwrap();
        assert_eq!(msg.sender, Some(jid("alice@localhost")));
        let stanzas = transport.sent();
        assert_eq!(stanzas.len(), 1);
        assert_eq!(stanzas[0].from, Some(jid("alice@localhost")));
        assert_eq!(stanzas[0].body, "hi");
    }

    #[tokio::test]
    async fn send_keeps_existing_sender() {
        let ctx = ExecutionContext::current().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let link = crate::testing::agent_link_with("alice@localhost", transport.clone());
        let sent = Arc::new(std::sync::Mutex::new(None));

        let original = Message::new(jid("bob@localhost")).with_sender(jid("alice@localhost/desk"));
        Bound::attach(
            SendOnce {
                message: Some(original),
                sent: sent.clone(),
            },
            &ctx,
            link,
        )
        .start()
        .join()
        .await
        .unwrap();

        let msg = sent.lock().unwrap().clone().unwrap();
        assert_eq!(msg.sender, Some(jid("alice@localhost/desk")));
        assert_eq!(transport.sent()[0].from, Some(jid("alice@localhost/desk")));
    }

    #[tokio::test]
    async fn send_propagates_transport_failure() {
        let ctx = ExecutionContext::current().unwrap();
        let link = crate::testing::agent_link_with("alice@localhost", Arc::new(FailingTransport));
        let handle = Bound::attach(
            SendOnce {
                message: Some(Message::new(jid("bob@localhost"))),
                sent: Arc::new(std::sync::Mutex::new(None)),
            },
            &ctx,
            link,
        )
        .start();
        let err = handle.join().await.unwrap_err();
        assert!(matches!(err, BehaviourError::Failed(ref m) if m.contains("link down")));
    }

    /// Drains its inbox into a shared log, four non-blocking receives per body.
    struct Drain {
        log: Arc<std::sync::Mutex<Vec<Option<String>>>>,
    }

    #[async_trait]
    impl Behaviour for Drain {
        async fn run(&mut self, ctx: &mut BehaviourContext) -> spindle_core::Result<()> {
            for _ in 0..4 {
                let got = ctx.receive(None).await.map(|m| m.body);
                self.log.lock().unwrap().push(got);
            }
            Ok(())
        }

        fn done(&mut self) -> bool {
            !self.log.lock().unwrap().is_empty()
        }
    }

    #[tokio::test]
    async fn messages_enqueued_before_start_are_received_in_order() {
        let ctx = ExecutionContext::current().unwrap();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let bound = Bound::attach(Drain { log: log.clone() }, &ctx, agent_link("alice@localhost"));
        for body in ["A", "B", "C"] {
            bound
                .handle()
                .enqueue(Message::default().with_body(body))
                .unwrap();
        }
        bound.start().join().await.unwrap();

        let log = log.lock().unwrap().clone();
        assert_eq!(
            log,
            vec![Some("A".into()), Some("B".into()), Some("C".into()), None]
        );
    }

    #[tokio::test]
    async fn enqueue_after_done_is_rejected() {
        let ctx = ExecutionContext::current().unwrap();
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let handle = Bound::attach(Drain { log }, &ctx, agent_link("alice@localhost")).start();
        handle.join().await.unwrap();
        assert!(matches!(
            handle.enqueue(Message::default()),
            Err(BehaviourError::Closed(_))
        ));
    }

    #[tokio::test]
    async fn template_is_attached_before_start() {
        let ctx = ExecutionContext::current().unwrap();
        let bound = Bound::attach(
            Drain {
                log: Arc::new(std::sync::Mutex::new(Vec::new())),
            },
            &ctx,
            agent_link("alice@localhost"),
        )
        .with_template(MessageTemplate::new().body("ping"))
        .with_template(MessageTemplate::new().body("ignored"));

        let h = bound.handle().clone();
        assert!(h.matches(&Message::default().with_body("ping")));
        assert!(!h.matches(&Message::default().with_body("ignored")));
        bound.start().join().await.unwrap();
    }

    #[tokio::test]
    async fn transport_error_converts_into_domain_error() {
        let err: Error = TransportError::NoRecipient.into();
        assert!(err.to_string().contains("no recipient"));
    }
}
