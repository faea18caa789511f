//! Actor Handles
//!
//! An [`ActorRef`] binds actor state to exactly one mailbox. The state is only
//! touched from messages evaluated on that mailbox, one at a time, so actor
//! logic is written as plain `&mut self` code. Several actors may share one
//! mailbox; they are then processed together, strictly one message at a time.

use crate::error::{ActorError, Result};
use crate::mailbox::Mailbox;
use crate::request::{Request, Transport};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

pub(crate) struct ActorCell<A> {
    mailbox: Mailbox,
    state: Mutex<A>,
}

impl<A> ActorCell<A> {
    /// Run `operation` against the state. Only called from the owning
    /// mailbox's turn, so the lock is only ever contended by a nested access
    /// from inside an operation that already holds it.
    pub(crate) fn apply<R>(&self, operation: impl FnOnce(&mut A) -> R) -> Result<R> {
        let mut state = self
            .state
            .try_lock()
            .ok_or_else(|| ActorError::state_borrowed(self.mailbox.id()))?;
        Ok(operation(&mut state))
    }
}

/// Cloneable handle to an actor
pub struct ActorRef<A> {
    inner: Arc<ActorCell<A>>,
}

impl<A: Send + 'static> ActorRef<A> {
    /// Bind `state` to `mailbox`
    pub fn new(mailbox: &Mailbox, state: A) -> Self {
        Self {
            inner: Arc::new(ActorCell {
                mailbox: mailbox.clone(),
                state: Mutex::new(state),
            }),
        }
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.inner.mailbox
    }

    /// Build a request evaluated against this actor's state
    pub fn request<T, F>(&self, operation: F) -> Request<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut A, &Mailbox, Transport<T>) -> anyhow::Result<()> + Send + 'static,
    {
        let cell = self.inner.clone();
        Request::new(&self.inner.mailbox, move |mailbox, transport| {
            cell.apply(|state| operation(state, mailbox, transport))?
        })
    }

    /// Deliver a one-way operation on this actor's state
    pub fn signal<F>(&self, operation: F)
    where
        F: FnOnce(&mut A, &Mailbox) -> anyhow::Result<()> + Send + 'static,
    {
        let cell = self.inner.clone();
        self.inner
            .mailbox
            .signal(move |mailbox| cell.apply(|state| operation(state, mailbox))?);
    }

    /// Access the state from the owning mailbox's current turn, e.g. inside a
    /// continuation. Nested inside another operation on the same actor this
    /// fails with [`ActorError::StateBorrowed`].
    pub fn with_state<R>(&self, operation: impl FnOnce(&mut A) -> R) -> Result<R> {
        if !self.inner.mailbox.is_active_on_current_thread() {
            return Err(ActorError::not_processing(self.inner.mailbox.id()));
        }
        self.inner.apply(operation)
    }

    pub(crate) fn cell(&self) -> &Arc<ActorCell<A>> {
        &self.inner
    }
}

impl<A> Clone for ActorRef<A> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<A> fmt::Debug for ActorRef<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("mailbox", &self.inner.mailbox.id())
            .field("type", &std::any::type_name::<A>())
            .finish()
    }
}
