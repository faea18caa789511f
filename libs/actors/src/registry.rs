//! Mailbox Registry
//!
//! Per-facility registry of live mailboxes, used to close every mailbox when
//! the facility shuts down. Entries are weak: the registry never keeps a
//! mailbox alive.

use crate::mailbox::{Mailbox, MailboxInner};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use uuid::Uuid;

/// Unique mailbox identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MailboxId {
    id: Uuid,
}

impl MailboxId {
    /// Create new mailbox ID
    pub fn new() -> Self {
        Self { id: Uuid::new_v4() }
    }
}

impl fmt::Display for MailboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mailbox-{}", self.id.simple())
    }
}

impl Default for MailboxId {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry of the mailboxes owned by one facility
#[derive(Debug, Default)]
pub(crate) struct MailboxRegistry {
    mailboxes: RwLock<HashMap<MailboxId, Weak<MailboxInner>>>,
}

impl MailboxRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a newly created mailbox
    pub(crate) fn register(&self, id: MailboxId, mailbox: &Arc<MailboxInner>) {
        tracing::trace!("Registering mailbox: {}", id);
        self.mailboxes.write().insert(id, Arc::downgrade(mailbox));
    }

    /// Unregister a mailbox being dropped
    pub(crate) fn unregister(&self, id: &MailboxId) {
        tracing::trace!("Unregistering mailbox: {}", id);
        self.mailboxes.write().remove(id);
    }

    /// All mailboxes still alive
    pub(crate) fn live_mailboxes(&self) -> Vec<Mailbox> {
        self.mailboxes
            .read()
            .values()
            .filter_map(Weak::upgrade)
            .map(Mailbox::from_inner)
            .collect()
    }

    /// Number of registered mailboxes
    pub(crate) fn len(&self) -> usize {
        self.mailboxes.read().len()
    }
}
