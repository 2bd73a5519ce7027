//! Delayed run-once behaviour.

use async_trait::async_trait;
use spindle_core::Result;
use std::time::Duration;
use tokio::time::Instant;

use crate::behaviour::Behaviour;
use crate::context::BehaviourContext;

/// Runs the wrapped body once, at `start_at`.
pub struct Timeout<B> {
    inner: B,
    start_at: Instant,
    fired: bool,
}

impl<B: Behaviour> Timeout<B> {
    pub fn new(inner: B, start_at: Instant) -> Self {
        Self {
            inner,
            start_at,
            fired: false,
        }
    }

    /// Fire `delay` from now.
    pub fn after(inner: B, delay: Duration) -> Self {
        Self::new(inner, Instant::now() + delay)
    }
}

#[async_trait]
impl<B: Behaviour> Behaviour for Timeout<B> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn on_start(&mut self, ctx: &mut BehaviourContext) -> Result<()> {
        self.inner.on_start(ctx).await
    }

    async fn run(&mut self, ctx: &mut BehaviourContext) -> Result<()> {
        self.inner.run(ctx).await
    }

    async fn step(&mut self, ctx: &mut BehaviourContext) -> Result<()> {
        tokio::time::sleep_until(self.start_at).await;
        self.fired = true;
        self.inner.run(ctx).await
    }

    fn done(&mut self) -> bool {
        self.fired
    }

    async fn on_end(&mut self, ctx: &mut BehaviourContext) -> Result<()> {
        self.inner.on_end(ctx).await
    }
}
