//! Facility
//!
//! Process-wide context shared by a group of mailboxes: configuration, the
//! scheduler running them, the registry of live mailboxes, and metrics.
//! Facilities are passed explicitly; there is no global instance. Closing a
//! facility closes every mailbox it owns, then stops its scheduler.

use crate::error::{ActorError, Result};
use crate::mailbox::{Mailbox, MailboxBuilder};
use crate::metrics::FacilityMetrics;
use crate::registry::MailboxRegistry;
use crate::scheduler::{Scheduler, ThreadPool};
use actors_config::FacilityConfig;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

struct FacilityInner {
    id: String,
    config: FacilityConfig,
    scheduler: Arc<dyn Scheduler>,
    registry: MailboxRegistry,
    closing: AtomicBool,
    metrics: FacilityMetrics,
}

/// Cloneable handle to a facility
#[derive(Clone)]
pub struct Facility {
    inner: Arc<FacilityInner>,
}

impl Facility {
    /// Create a facility backed by its own thread pool
    pub fn new(config: FacilityConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|e| ActorError::configuration(format!("{:#}", e)))?;
        let pool = ThreadPool::new(config.thread_count, &config.thread_name_prefix)?;
        Ok(Self::with_scheduler(config, Arc::new(pool)))
    }

    /// Create a facility with default settings and `thread_count` workers
    pub fn with_threads(thread_count: usize) -> Result<Self> {
        Self::new(FacilityConfig::default().with_thread_count(thread_count))
    }

    /// Create a facility whose mailboxes run on `scheduler`
    pub fn with_scheduler(config: FacilityConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        let id = format!("facility-{}", Uuid::new_v4().simple());
        info!(facility = %id, thread_count = config.thread_count, "Creating facility");
        Self {
            inner: Arc::new(FacilityInner {
                id,
                config,
                scheduler,
                registry: MailboxRegistry::new(),
                closing: AtomicBool::new(false),
                metrics: FacilityMetrics::default(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn config(&self) -> &FacilityConfig {
        &self.inner.config
    }

    pub fn metrics(&self) -> &FacilityMetrics {
        &self.inner.metrics
    }

    /// New mailbox with default policies
    pub fn mailbox(&self) -> Mailbox {
        self.mailbox_builder().build()
    }

    /// New mailbox processing one request at a time
    pub fn atomic_mailbox(&self) -> Mailbox {
        self.mailbox_builder().atomic().build()
    }

    pub fn mailbox_builder(&self) -> MailboxBuilder {
        MailboxBuilder::new(self.clone())
    }

    /// Number of live mailboxes
    pub fn mailbox_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_closing(&self) -> bool {
        self.inner.closing.load(Ordering::Acquire)
    }

    /// Close every mailbox, then stop the scheduler. Blocked callers of
    /// requests to this facility are released with an abandonment fault.
    pub fn close(&self) {
        if self.inner.closing.swap(true, Ordering::AcqRel) {
            return;
        }
        info!(facility = %self.inner.id, "Closing facility");

        let mailboxes = self.inner.registry.live_mailboxes();
        debug!(facility = %self.inner.id, count = mailboxes.len(), "Closing mailboxes");
        for mailbox in mailboxes {
            mailbox.close();
        }

        self.inner.scheduler.shutdown();
        info!(
            facility = %self.inner.id,
            metrics = ?self.inner.metrics.snapshot(),
            "Facility closed"
        );
    }

    /// True when both handles refer to the same facility
    pub fn same_as(&self, other: &Facility) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.inner.scheduler
    }

    pub(crate) fn registry(&self) -> &MailboxRegistry {
        &self.inner.registry
    }
}

impl fmt::Debug for Facility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Facility")
            .field("id", &self.inner.id)
            .field("closing", &self.is_closing())
            .field("mailboxes", &self.mailbox_count())
            .finish()
    }
}
