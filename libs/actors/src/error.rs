//! Runtime Error Types
//!
//! Errors raised by the runtime itself: protocol misuse, abandonment and
//! scheduler failures. Application faults raised by actor logic travel as
//! [`anyhow::Error`] and only become an [`ActorError::Fault`] at the
//! synchronous `call` boundary.

use thiserror::Error;

/// Main runtime error type
#[derive(Error, Debug)]
pub enum ActorError {
    /// The target mailbox closed before the request was answered
    #[error("Request abandoned: target mailbox closed before responding")]
    Abandoned,

    /// An exception handler was installed while no message was being processed
    #[error("Exception handler set outside message context")]
    HandlerOutsideMessage,

    /// A blocking call was issued from a mailbox's own processing thread
    #[error("Synchronous call issued while processing a message on {mailbox}")]
    CallFromMailbox { mailbox: String },

    /// An operation that needs an active processing turn was issued outside one
    #[error("Mailbox {mailbox} is not processing a message on this thread")]
    NotProcessing { mailbox: String },

    /// Actor state accessed from inside an operation already holding it
    #[error("Actor state on {mailbox} is already borrowed by the running operation")]
    StateBorrowed { mailbox: String },

    /// A request was answered more than once
    #[error("Response already sent")]
    ResponseAlreadySent,

    /// Worker pool errors
    #[error("Scheduler error: {message}")]
    Scheduler { message: String },

    /// Invalid facility configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Fault raised by actor logic and returned to the caller
    #[error(transparent)]
    Fault(anyhow::Error),
}

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, ActorError>;

impl ActorError {
    /// Recover a runtime error carried as a fault, or wrap an application fault
    pub fn from_fault(fault: anyhow::Error) -> Self {
        match fault.downcast::<ActorError>() {
            Ok(error) => error,
            Err(fault) => ActorError::Fault(fault),
        }
    }

    /// Create a call-from-mailbox error
    pub fn call_from_mailbox(mailbox: impl ToString) -> Self {
        Self::CallFromMailbox {
            mailbox: mailbox.to_string(),
        }
    }

    /// Create a not-processing error
    pub fn not_processing(mailbox: impl ToString) -> Self {
        Self::NotProcessing {
            mailbox: mailbox.to_string(),
        }
    }

    /// Create a state-borrowed error
    pub fn state_borrowed(mailbox: impl ToString) -> Self {
        Self::StateBorrowed {
            mailbox: mailbox.to_string(),
        }
    }

    /// Create a scheduler error
    pub fn scheduler(message: impl Into<String>) -> Self {
        Self::Scheduler {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Check if the request was abandoned on shutdown
    pub fn is_abandoned(&self) -> bool {
        matches!(self, ActorError::Abandoned)
    }

    /// Check if this is a programming error in the use of the runtime
    pub fn is_protocol_misuse(&self) -> bool {
        matches!(
            self,
            ActorError::HandlerOutsideMessage
                | ActorError::CallFromMailbox { .. }
                | ActorError::NotProcessing { .. }
                | ActorError::StateBorrowed { .. }
                | ActorError::ResponseAlreadySent
        )
    }

    /// Application fault, if this error carries one
    pub fn fault(&self) -> Option<&anyhow::Error> {
        match self {
            ActorError::Fault(fault) => Some(fault),
            _ => None,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            ActorError::Abandoned => "abandonment",
            ActorError::HandlerOutsideMessage
            | ActorError::CallFromMailbox { .. }
            | ActorError::NotProcessing { .. }
            | ActorError::StateBorrowed { .. }
            | ActorError::ResponseAlreadySent => "protocol",
            ActorError::Scheduler { .. } => "scheduler",
            ActorError::Configuration { .. } => "configuration",
            ActorError::Fault(_) => "fault",
        }
    }
}
