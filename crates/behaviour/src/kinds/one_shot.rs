//! Run-once behaviour.

use async_trait::async_trait;
use spindle_core::Result;

use crate::behaviour::Behaviour;
use crate::context::BehaviourContext;

/// Runs the wrapped body at most once.
///
/// `done()` answers `false` the first time it is asked and `true` ever after.
/// The flag flips on that first question, not on construction, so a one-shot
/// that was never started stays "not yet executed".
pub struct OneShot<B> {
    inner: B,
    already_executed: bool,
}

impl<B: Behaviour> OneShot<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            already_executed: false,
        }
    }
}

#[async_trait]
impl<B: Behaviour> Behaviour for OneShot<B> {
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
        self.inner.step(ctx).await
    }

    fn done(&mut self) -> bool {
        if !self.already_executed {
            self.already_executed = true;
            return false;
        }
        true
    }

    async fn on_end(&mut self, ctx: &mut BehaviourContext) -> Result<()> {
        self.inner.on_end(ctx).await
    }
}
