//! `spindle demo` — Two agents playing ping/pong.
//!
//! Each agent gets its own `AgentThread` and a registration on a shared
//! in-memory network. `ping` sends numbered pings; `pong` answers each one
//! and keeps a periodic heartbeat count in its knowledge store.

use async_trait::async_trait;
use serde_json::json;
use spindle_agent::{Agent, InMemoryNetwork};
use spindle_behaviour::{AgentThread, Behaviour, BehaviourContext, ExitReason, Periodic};
use spindle_config::AppConfig;
use spindle_core::{FnTemplate, Jid, Message, MessageTemplate, get_as, set_as};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const PERFORMATIVE: &str = "performative";
const THREAD: &str = "ping-pong";
const HEARTBEATS: &str = "heartbeats";

/// Upper bound on how long a whole demo may take.
const DEMO_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends `rounds` pings to `peer`, one at a time, waiting for each pong.
struct Pinger {
    peer: Jid,
    rounds: u32,
    received: u32,
    timeout: Option<Duration>,
}

impl Pinger {
    async fn ping(&self, ctx: &BehaviourContext, n: u32) -> spindle_core::Result<()> {
        let mut msg = Message::new(self.peer.clone())
            .with_body(format!("ping {n}"))
            .with_thread(THREAD)
            .with_metadata(PERFORMATIVE, "ping");
        ctx.send(&mut msg).await?;
        Ok(())
    }
}

#[async_trait]
impl Behaviour for Pinger {
    fn name(&self) -> &str {
        "pinger"
    }

    async fn on_start(&mut self, ctx: &mut BehaviourContext) -> spindle_core::Result<()> {
        if self.rounds > 0 {
            self.ping(ctx, 1).await?;
        }
        Ok(())
    }

    async fn run(&mut self, ctx: &mut BehaviourContext) -> spindle_core::Result<()> {
        let Some(reply) = ctx.receive(self.timeout).await else {
            return Ok(());
        };
        self.received += 1;
        let from = reply.sender.as_ref().map(Jid::as_str).unwrap_or("?");
        println!("  {from}: {}", reply.body);
        if self.received < self.rounds {
            self.ping(ctx, self.received + 1).await?;
        }
        Ok(())
    }

    fn done(&mut self) -> bool {
        self.received >= self.rounds
    }

    async fn on_end(&mut self, ctx: &mut BehaviourContext) -> spindle_core::Result<()> {
        ctx.set("rounds_completed", json!(self.received)).await?;
        Ok(())
    }
}

/// Answers every ping with the matching pong.
struct Responder {
    timeout: Option<Duration>,
}

#[async_trait]
impl Behaviour for Responder {
    fn name(&self) -> &str {
        "responder"
    }

    async fn run(&mut self, ctx: &mut BehaviourContext) -> spindle_core::Result<()> {
        if let Some(ping) = ctx.receive(self.timeout).await {
            let mut pong = ping
                .make_reply()
                .with_body(ping.body.replacen("ping", "pong", 1))
                .with_metadata(PERFORMATIVE, "pong");
            ctx.send(&mut pong).await?;
        }
        Ok(())
    }
}

/// Counts its own ticks in the agent's knowledge store.
struct Heartbeat;

#[async_trait]
impl Behaviour for Heartbeat {
    fn name(&self) -> &str {
        "heartbeat"
    }

    async fn run(&mut self, ctx: &mut BehaviourContext) -> spindle_core::Result<()> {
        let store = ctx.agent().knowledge().as_ref();
        let beats: u64 = get_as(store, HEARTBEATS).await?.unwrap_or(0);
        set_as(store, HEARTBEATS, &(beats + 1)).await?;
        Ok(())
    }
}

pub async fn run(config: &AppConfig, rounds: u32) -> Result<(), Box<dyn std::error::Error>> {
    let timeout = config.behaviour.receive_timeout();
    let net = InMemoryNetwork::new();

    let ping_thread = AgentThread::spawn("ping")?;
    let pong_thread = AgentThread::spawn("pong")?;

    let ping = Arc::new(Agent::new(
        Jid::parse("ping@localhost/demo")?,
        Arc::new(net.clone()),
        ping_thread.context().clone(),
    ));
    let pong = Arc::new(Agent::new(
        Jid::parse("pong@localhost/demo")?,
        Arc::new(net.clone()),
        pong_thread.context().clone(),
    ));

    for agent in [&ping, &pong] {
        let inbox = net.register(agent.jid());
        let agent = Arc::clone(agent);
        agent.context().clone().submit(async move { agent.serve(inbox).await });
    }

    pong.add_behaviour(
        Responder { timeout },
        Some(Arc::new(MessageTemplate::new().metadata(PERFORMATIVE, "ping"))),
    );
    pong.add_behaviour(
        Periodic::new(Heartbeat, config.behaviour.period())?,
        Some(Arc::new(FnTemplate(|_: &Message| false))),
    );

    println!("Playing {rounds} round(s) of ping/pong");
    let pinger = ping.add_behaviour(
        Pinger {
            peer: pong.jid().bare(),
            rounds,
            received: 0,
            timeout,
        },
        Some(Arc::new(
            MessageTemplate::new()
                .thread(THREAD)
                .metadata(PERFORMATIVE, "pong"),
        )),
    );

    match tokio::time::timeout(DEMO_TIMEOUT, pinger.join()).await {
        Ok(Ok(ExitReason::Completed)) => info!("Pinger finished"),
        Ok(Ok(reason)) => warn!(?reason, "Pinger stopped early"),
        Ok(Err(e)) => warn!(error = %e, "Pinger failed"),
        Err(_) => {
            warn!(timeout_s = DEMO_TIMEOUT.as_secs(), "Demo timed out, stopping pinger");
            pinger.kill();
        }
    }

    ping.stop().await;
    pong.stop().await;

    let completed = ping.get("rounds_completed").await?.unwrap_or(json!(0));
    let beats = pong.get(HEARTBEATS).await?.unwrap_or(json!(0));
    println!();
    println!("  Rounds completed: {completed}");
    println!("  Pong heartbeats:  {beats}");

    // Joining the loop threads blocks, keep it off the async workers
    tokio::task::spawn_blocking(move || {
        ping_thread.shutdown();
        pong_thread.shutdown();
    })
    .await?;

    Ok(())
}
