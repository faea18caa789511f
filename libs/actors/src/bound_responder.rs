//! Bound Responders
//!
//! A [`BoundResponder`] wraps a processor that must run on one mailbox's turn
//! but can be completed from anywhere: a foreign thread, a callback of another
//! library, another facility. Each completion is delivered to the bound
//! mailbox as an event.

use crate::mailbox::Mailbox;
use crate::message::{EventMessage, Message};
use std::fmt;
use std::sync::Arc;

type Processor<T> = Arc<dyn Fn(T) -> anyhow::Result<()> + Send + Sync>;

pub struct BoundResponder<T> {
    mailbox: Mailbox,
    processor: Processor<T>,
}

impl<T: Send + 'static> BoundResponder<T> {
    pub fn new<F>(mailbox: &Mailbox, processor: F) -> Self
    where
        F: Fn(T) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            mailbox: mailbox.clone(),
            processor: Arc::new(processor),
        }
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    /// Hand `value` to the processor on the bound mailbox's turn. Safe to
    /// call from any thread.
    pub fn process_response(&self, value: T) {
        let processor = self.processor.clone();
        let message = Message::Event(EventMessage::new(move |_| processor(value)));
        self.mailbox
            .unbuffered_add_message(message, self.mailbox.is_active_on_current_thread());
    }
}

impl<T> Clone for BoundResponder<T> {
    fn clone(&self) -> Self {
        Self {
            mailbox: self.mailbox.clone(),
            processor: self.processor.clone(),
        }
    }
}

impl<T> fmt::Debug for BoundResponder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundResponder")
            .field("mailbox", &self.mailbox.id())
            .finish()
    }
}
