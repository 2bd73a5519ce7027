//! Template trait — predicates deciding which behaviour receives a message.
//!
//! The agent's dispatch router asks every live behaviour whether its template
//! accepts an inbound message and enqueues the message into the inboxes of
//! those that do. Templates are stateless and may be shared across behaviours.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::jid::Jid;
use crate::message::Message;

/// A message predicate.
pub trait Template: Send + Sync {
    /// Whether `message` is accepted.
    fn matches(&self, message: &Message) -> bool;
}

impl<T: Template + ?Sized> Template for Arc<T> {
    fn matches(&self, message: &Message) -> bool {
        (**self).matches(message)
    }
}

impl<T: Template + ?Sized> Template for Box<T> {
    fn matches(&self, message: &Message) -> bool {
        (**self).matches(message)
    }
}

/// Field-by-field template. Unset fields are wildcards; every set field must
/// be equal to the message's.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageTemplate {
    pub to: Option<Jid>,
    pub sender: Option<Jid>,
    pub body: Option<String>,
    pub thread: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl MessageTemplate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn to(mut self, to: Jid) -> Self {
        self.to = Some(to);
        self
    }

    pub fn sender(mut self, sender: Jid) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn thread(mut self, thread: impl Into<String>) -> Self {
        self.thread = Some(thread.into());
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl Template for MessageTemplate {
    fn matches(&self, message: &Message) -> bool {
        fn field<T: PartialEq>(want: &Option<T>, have: &Option<T>) -> bool {
            match want {
                Some(w) => have.as_ref() == Some(w),
                None => true,
            }
        }

        field(&self.to, &message.to)
            && field(&self.sender, &message.sender)
            && self.body.as_ref().is_none_or(|b| *b == message.body)
            && field(&self.thread, &message.thread)
            && self
                .metadata
                .iter()
                .all(|(k, v)| message.metadata.get(k) == Some(v))
    }
}

/// Template backed by a closure.
pub struct FnTemplate<F>(pub F);

impl<F> Template for FnTemplate<F>
where
    F: Fn(&Message) -> bool + Send + Sync,
{
    fn matches(&self, message: &Message) -> bool {
        (self.0)(message)
    }
}

/// Both templates accept.
pub struct And<A, B>(pub A, pub B);

/// Either template accepts.
pub struct Or<A, B>(pub A, pub B);

/// The inner template rejects.
pub struct Not<A>(pub A);

impl<A: Template, B: Template> Template for And<A, B> {
    fn matches(&self, message: &Message) -> bool {
        self.0.matches(message) && self.1.matches(message)
    }
}

impl<A: Template, B: Template> Template for Or<A, B> {
    fn matches(&self, message: &Message) -> bool {
        self.0.matches(message) || self.1.matches(message)
    }
}

impl<A: Template> Template for Not<A> {
    fn matches(&self, message: &Message) -> bool {
        !self.0.matches(message)
    }
}

/// Combinators for building one composite template out of several.
pub trait TemplateExt: Template + Sized {
    fn and<B: Template>(self, other: B) -> And<Self, B> {
        And(self, other)
    }

    fn or<B: Template>(self, other: B) -> Or<Self, B> {
        Or(self, other)
    }

    fn not(self) -> Not<Self> {
        Not(self)
    }
}

impl<T: Template + Sized> TemplateExt for T {}
