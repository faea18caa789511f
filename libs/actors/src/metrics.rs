//! Facility Metrics
//!
//! Lock-free counters recording what a facility's mailboxes did. Counters
//! use relaxed ordering; a snapshot is a consistent-enough view for
//! monitoring, not a synchronization point.

use crate::message::MessageKind;
use std::sync::atomic::{AtomicU64, Ordering};

/// Facility-wide counters
#[derive(Debug, Default)]
pub struct FacilityMetrics {
    pub mailboxes_created: AtomicU64,
    pub mailboxes_closed: AtomicU64,

    // Evaluation
    pub requests_evaluated: AtomicU64,
    pub responses_evaluated: AtomicU64,
    pub events_evaluated: AtomicU64,

    // Fault routing
    pub faults_handled: AtomicU64,
    pub faults_unhandled: AtomicU64,
    pub double_faults: AtomicU64,
    pub panics_caught: AtomicU64,

    // Shutdown
    pub messages_abandoned: AtomicU64,
    pub messages_dropped: AtomicU64,
}

impl FacilityMetrics {
    pub fn record_mailbox_created(&self) {
        self.mailboxes_created.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mailbox_closed(&self) {
        self.mailboxes_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message evaluation by kind
    pub fn record_evaluated(&self, kind: MessageKind) {
        let counter = match kind {
            MessageKind::Request => &self.requests_evaluated,
            MessageKind::Response => &self.responses_evaluated,
            MessageKind::Event => &self.events_evaluated,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fault_handled(&self) {
        self.faults_handled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fault_unhandled(&self) {
        self.faults_unhandled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_double_fault(&self) {
        self.double_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_panic(&self) {
        self.panics_caught.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a response-pending message closed on shutdown
    pub fn record_abandoned(&self) {
        self.messages_abandoned.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a message discarded without evaluation
    pub fn record_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Get metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests_evaluated.load(Ordering::Relaxed);
        let responses = self.responses_evaluated.load(Ordering::Relaxed);
        let events = self.events_evaluated.load(Ordering::Relaxed);

        MetricsSnapshot {
            mailboxes_created: self.mailboxes_created.load(Ordering::Relaxed),
            mailboxes_closed: self.mailboxes_closed.load(Ordering::Relaxed),
            requests_evaluated: requests,
            responses_evaluated: responses,
            events_evaluated: events,
            messages_evaluated: requests + responses + events,
            faults_handled: self.faults_handled.load(Ordering::Relaxed),
            faults_unhandled: self.faults_unhandled.load(Ordering::Relaxed),
            double_faults: self.double_faults.load(Ordering::Relaxed),
            panics_caught: self.panics_caught.load(Ordering::Relaxed),
            messages_abandoned: self.messages_abandoned.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`FacilityMetrics`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub mailboxes_created: u64,
    pub mailboxes_closed: u64,
    pub requests_evaluated: u64,
    pub responses_evaluated: u64,
    pub events_evaluated: u64,
    pub messages_evaluated: u64,
    pub faults_handled: u64,
    pub faults_unhandled: u64,
    pub double_faults: u64,
    pub panics_caught: u64,
    pub messages_abandoned: u64,
    pub messages_dropped: u64,
}
