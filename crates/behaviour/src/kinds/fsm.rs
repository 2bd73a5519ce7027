//! Finite-state-machine behaviour.
//!
//! Each state is a small behaviour of its own: its `run` returns the name of
//! the next state, or `None` to finish the machine. Only transitions that
//! were registered up front may be taken.

use async_trait::async_trait;
use spindle_core::Result;
use spindle_core::error::BehaviourError;
use std::collections::{HashMap, HashSet};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::behaviour::Behaviour;
use crate::context::BehaviourContext;

/// One state of an [`Fsm`].
#[async_trait]
pub trait FsmState: Send + 'static {
    async fn on_start(&mut self, _ctx: &mut BehaviourContext) -> Result<()> {
        Ok(())
    }

    /// Do the state's work and name the next state. `None` ends the machine.
    async fn run(&mut self, ctx: &mut BehaviourContext) -> Result<Option<String>>;

    async fn on_end(&mut self, _ctx: &mut BehaviourContext) -> Result<()> {
        Ok(())
    }
}

pub struct Fsm {
    name: String,
    states: HashMap<String, Box<dyn FsmState>>,
    transitions: HashSet<(String, String)>,
    initial: Option<String>,
    current: Option<String>,
    finished: bool,
    current_tx: watch::Sender<Option<String>>,
}

impl Fsm {
    pub fn new(name: impl Into<String>) -> Self {
        let (current_tx, _) = watch::channel(None);
        Self {
            name: name.into(),
            states: HashMap::new(),
            transitions: HashSet::new(),
            initial: None,
            current: None,
            finished: false,
            current_tx,
        }
    }

    pub fn add_state(mut self, name: impl Into<String>, state: impl FsmState) -> Self {
        self.states.insert(name.into(), Box::new(state));
        self
    }

    /// Register `name` and make it the initial state.
    pub fn with_initial(mut self, name: impl Into<String>, state: impl FsmState) -> Self {
        let name = name.into();
        self.initial = Some(name.clone());
        self.add_state(name, state)
    }

    pub fn set_initial(mut self, name: impl Into<String>) -> Self {
        self.initial = Some(name.into());
        self
    }

    pub fn add_transition(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.transitions.insert((from.into(), to.into()));
        self
    }

    /// Follow the machine's current state from outside, e.g. after it was started.
    pub fn watch(&self) -> watch::Receiver<Option<String>> {
        self.current_tx.subscribe()
    }

    fn validate(&self) -> std::result::Result<String, BehaviourError> {
        let initial = self.initial.clone().ok_or(BehaviourError::NoInitialState)?;
        if !self.states.contains_key(&initial) {
            return Err(BehaviourError::UnknownState(initial));
        }
        for (from, to) in &self.transitions {
            for end in [from, to] {
                if !self.states.contains_key(end) {
                    return Err(BehaviourError::UnknownState(end.clone()));
                }
            }
        }
        Ok(initial)
    }

    fn enter(&mut self, state: String) {
        self.current = Some(state.clone());
        self.current_tx.send_replace(Some(state));
    }
}

#[async_trait]
impl Behaviour for Fsm {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_start(&mut self, _ctx: &mut BehaviourContext) -> Result<()> {
        let initial = self.validate()?;
        info!(behaviour = %self.name, initial = %initial, "Starting state machine");
        self.enter(initial);
        Ok(())
    }

    async fn run(&mut self, ctx: &mut BehaviourContext) -> Result<()> {
        let current = self.current.clone().ok_or(BehaviourError::NoInitialState)?;
        let state = self
            .states
            .get_mut(&current)
            .ok_or_else(|| BehaviourError::UnknownState(current.clone()))?;

        state.on_start(ctx).await?;
        let next = state.run(ctx).await?;
        state.on_end(ctx).await?;

        match next {
            None => {
                debug!(behaviour = %self.name, state = %current, "Final state reached");
                self.finished = true;
            }
            Some(next) => {
                if !self.transitions.contains(&(current.clone(), next.clone())) {
                    return Err(BehaviourError::InvalidTransition {
                        from: current,
                        to: next,
                    }
                    .into());
                }
                debug!(behaviour = %self.name, from = %current, to = %next, "State transition");
                self.enter(next);
            }
        }
        Ok(())
    }

    fn done(&mut self) -> bool {
        self.finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::ExitReason;
    use crate::lifecycle::Bound;
    use crate::runtime::ExecutionContext;
    use crate::testing::agent_link;
    use std::sync::{Arc, Mutex};

    /// Logs its visits and moves on to `next`.
    struct Step {
        label: &'static str,
        next: Option<&'static str>,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl FsmState for Step {
        async fn on_start(&mut self, _ctx: &mut BehaviourContext) -> Result<()> {
            self.log.lock().unwrap().push(format!("enter {}", self.label));
            Ok(())
        }

        async fn run(&mut self, _ctx: &mut BehaviourContext) -> Result<Option<String>> {
            Ok(self.next.map(String::from))
        }

        async fn on_end(&mut self, _ctx: &mut BehaviourContext) -> Result<()> {
            self.log.lock().unwrap().push(format!("leave {}", self.label));
            Ok(())
        }
    }

    fn step(
        label: &'static str,
        next: Option<&'static str>,
        log: &Arc<Mutex<Vec<String>>>,
    ) -> Step {
        Step {
            label,
            next,
            log: log.clone(),
        }
    }

    #[tokio::test]
    async fn walks_registered_transitions_until_final_state() {
        let ctx = ExecutionContext::current().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let fsm = Fsm::new("door")
            .with_initial("closed", step("closed", Some("open"), &log))
            .add_state("open", step("open", Some("locked"), &log))
            .add_state("locked", step("locked", None, &log))
            .add_transition("closed", "open")
            .add_transition("open", "locked");
        let watch = fsm.watch();

        let handle = Bound::attach(fsm, &ctx, agent_link("alice@localhost")).start();
        assert_eq!(handle.join().await.unwrap(), ExitReason::Completed);
        assert_eq!(handle.name(), "door");
        assert_eq!(watch.borrow().as_deref(), Some("locked"));
        assert_eq!(
            log.lock().unwrap().clone(),
            vec![
                "enter closed",
                "leave closed",
                "enter open",
                "leave open",
                "enter locked",
                "leave locked"
            ]
        );
    }

    #[tokio::test]
    async fn unregistered_transition_fails_the_behaviour() {
        let ctx = ExecutionContext::current().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let fsm = Fsm::new("door")
            .with_initial("closed", step("closed", Some("locked"), &log))
            .add_state("locked", step("locked", None, &log));

        let handle = Bound::attach(fsm, &ctx, agent_link("alice@localhost")).start();
        let err = handle.join().await.unwrap_err();
        assert!(err.to_string().contains("closed -> locked"));
        assert!(matches!(handle.exit_reason(), Some(ExitReason::Failed(_))));
    }

    #[tokio::test]
    async fn missing_initial_state_fails_on_start() {
        let ctx = ExecutionContext::current().unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let fsm = Fsm::new("door").add_state("closed", step("closed", None, &log));

        let handle = Bound::attach(fsm, &ctx, agent_link("alice@localhost")).start();
        assert!(handle.join().await.is_err());
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn validate_rejects_dangling_states() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let fsm = Fsm::new("door")
            .set_initial("ghost")
            .add_state("closed", step("closed", None, &log));
        assert!(matches!(fsm.validate(), Err(BehaviourError::UnknownState(s)) if s == "ghost"));

        let fsm = Fsm::new("door")
            .with_initial("closed", step("closed", None, &log))
            .add_transition("closed", "nowhere");
        assert!(matches!(fsm.validate(), Err(BehaviourError::UnknownState(s)) if s == "nowhere"));

        let fsm = Fsm::new("door");
        assert!(matches!(fsm.validate(), Err(BehaviourError::NoInitialState)));
    }

    #[test]
    fn current_state_is_none_before_start() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let fsm = Fsm::new("door").with_initial("closed", step("closed", None, &log));
        assert_eq!(*fsm.watch().borrow(), None);
    }
}
