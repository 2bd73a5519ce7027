//! Behaviour trait — the unit of work an agent schedules.
//!
//! A behaviour is driven through a fixed lifecycle by [`crate::lifecycle`]:
//!
//! 1. `on_start` once
//! 2. while neither `done()` nor the kill flag holds: `step` (which calls `run`)
//! 3. `on_end` once
//!
//! Only [`run`](Behaviour::run) is required. The default `done()` never
//! reports completion, so a plain behaviour is cyclic: it runs until it is
//! killed or changes whatever state its own `done()` inspects. Specialised
//! kinds (see [`crate::kinds`]) wrap a body and override `done` and/or `step`.

use async_trait::async_trait;
use spindle_core::Result;

use crate::context::BehaviourContext;

#[async_trait]
pub trait Behaviour: Send + 'static {
    /// Name used in logs and events.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called once before the first iteration.
    async fn on_start(&mut self, _ctx: &mut BehaviourContext) -> Result<()> {
        Ok(())
    }

    /// The body of the behaviour.
    async fn run(&mut self, ctx: &mut BehaviourContext) -> Result<()>;

    /// One loop iteration. Kinds that need to wait before or between bodies
    /// override this; the default runs the body exactly once.
    async fn step(&mut self, ctx: &mut BehaviourContext) -> Result<()> {
        self.run(ctx).await
    }

    /// Whether the behaviour has finished. Consulted at the top of every iteration.
    fn done(&mut self) -> bool {
        false
    }

    /// Called once after the loop exits through completion or kill.
    async fn on_end(&mut self, _ctx: &mut BehaviourContext) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl Behaviour for Box<dyn Behaviour> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn on_start(&mut self, ctx: &mut BehaviourContext) -> Result<()> {
        (**self).on_start(ctx).await
    }

    async fn run(&mut self, ctx: &mut BehaviourContext) -> Result<()> {
        (**self).run(ctx).await
    }

    async fn step(&mut self, ctx: &mut BehaviourContext) -> Result<()> {
        (**self).step(ctx).await
    }

    fn done(&mut self) -> bool {
        (**self).done()
    }

    async fn on_end(&mut self, ctx: &mut BehaviourContext) -> Result<()> {
        (**self).on_end(ctx).await
    }
}
