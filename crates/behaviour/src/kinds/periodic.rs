//! Repeating behaviour on a fixed period.

use async_trait::async_trait;
use spindle_core::Result;
use spindle_core::error::BehaviourError;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::debug;

use crate::behaviour::Behaviour;
use crate::context::BehaviourContext;

/// Runs the wrapped body once per `period`.
///
/// The first run happens at `start_at` (default: as soon as the behaviour
/// starts). A body that overruns its period delays the next run instead of
/// causing a burst of catch-up runs. Completion is delegated to the body's
/// own `done()`; otherwise the behaviour runs until killed.
pub struct Periodic<B> {
    inner: B,
    period: Duration,
    start_at: Option<Instant>,
    interval: Option<Interval>,
}

impl<B: Behaviour> Periodic<B> {
    pub fn new(inner: B, period: Duration) -> std::result::Result<Self, BehaviourError> {
        if period.is_zero() {
            return Err(BehaviourError::InvalidPeriod);
        }
        Ok(Self {
            inner,
            period,
            start_at: None,
            interval: None,
        })
    }

    /// Delay the first run until `at`.
    pub fn starting_at(mut self, at: Instant) -> Self {
        self.start_at = Some(at);
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

#[async_trait]
impl<B: Behaviour> Behaviour for Periodic<B> {
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
        let period = self.period;
        let start_at = self.start_at.unwrap_or_else(Instant::now);
        let interval = self.interval.get_or_insert_with(|| {
            let mut interval = tokio::time::interval_at(start_at, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });
        interval.tick().await;
        debug!(behaviour = %self.inner.name(), period = ?period, "Periodic tick");
        self.inner.run(ctx).await
    }

    fn done(&mut self) -> bool {
        self.inner.done()
    }

    async fn on_end(&mut self, ctx: &mut BehaviourContext) -> Result<()> {
        self.inner.on_end(ctx).await
    }
}
