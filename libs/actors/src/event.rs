//! Events
//!
//! One-way operations delivered straight into the target's inbox, never
//! buffered and never answered. A fault raised by an event stays with the
//! target mailbox: its handler sees it, or it is logged there.

use crate::actor::ActorRef;
use crate::message::{EventMessage, Message};
use crate::mailbox::Mailbox;
use std::fmt;
use std::sync::Arc;

type EventOperation<A> = Arc<dyn Fn(&mut A, &Mailbox) -> anyhow::Result<()> + Send + Sync>;

/// Reusable one-way operation on actors of type `A`
pub struct Event<A> {
    operation: EventOperation<A>,
}

impl<A: Send + 'static> Event<A> {
    pub fn new<F>(operation: F) -> Self
    where
        F: Fn(&mut A, &Mailbox) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            operation: Arc::new(operation),
        }
    }

    /// Deliver the event to `target`
    pub fn signal(&self, target: &ActorRef<A>) {
        let operation = self.operation.clone();
        let cell = target.cell().clone();
        let message = Message::Event(EventMessage::new(move |mailbox| {
            cell.apply(|state| operation(state, mailbox))?
        }));

        let mailbox = target.mailbox();
        mailbox.unbuffered_add_message(message, mailbox.is_active_on_current_thread());
    }
}

impl<A> Clone for Event<A> {
    fn clone(&self) -> Self {
        Self {
            operation: self.operation.clone(),
        }
    }
}

impl<A> fmt::Debug for Event<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("type", &std::any::type_name::<A>())
            .finish()
    }
}
