//! Exception Handler Chain
//!
//! A mailbox holds one handler scope (`Frame`) for the message it is
//! evaluating: the installed exception handler, plus the request still owed a
//! response. Evaluating a request or event starts from an empty handler.
//! Sending a request captures the current frame; evaluating its response
//! restores it, so a fault re-raised by the response reaches the handler that
//! was active when the request was sent.
//!
//! Fault routing order:
//! 1. the installed handler, if any
//! 2. the pending request of the frame, whose caller receives the fault
//! 3. otherwise the fault is logged as unhandled
//!
//! A handler that itself fails is a double fault: both faults are logged and
//! the handler's fault answers the pending request, if there still is one.

use crate::mailbox::Mailbox;
use crate::message::MessageKind;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, warn};

/// Handler invoked with a fault raised during the current message's processing
pub type ExceptionHandler = Arc<dyn Fn(anyhow::Error) -> anyhow::Result<()> + Send + Sync>;

/// Type-erased view of a request still owed a response
pub(crate) trait PendingResponse: Send + Sync {
    /// Answer with a fault; hands the fault back if already answered
    fn fail(&self, fault: anyhow::Error) -> Result<(), anyhow::Error>;

    /// Release the caller with an abandonment fault
    fn abandon(&self);

    fn is_pending(&self) -> bool;
}

/// Handler scope of one message evaluation
#[derive(Clone, Default)]
pub(crate) struct Frame {
    pub(crate) handler: Option<ExceptionHandler>,
    pub(crate) sink: Option<Arc<dyn PendingResponse>>,
}

impl Frame {
    /// Scope of a freshly evaluated request: no handler, answered by `sink`
    pub(crate) fn for_request(sink: Arc<dyn PendingResponse>) -> Self {
        Self {
            handler: None,
            sink: Some(sink),
        }
    }
}

/// What a mailbox is doing on its current turn
#[derive(Default)]
pub(crate) struct Turn {
    pub(crate) current: Option<MessageKind>,
    pub(crate) frame: Frame,
}

/// Route a fault raised while `mailbox` evaluates a message
pub(crate) fn route_fault(mailbox: &Mailbox, fault: anyhow::Error) {
    let (handler, sink) = mailbox.frame_parts();
    let metrics = mailbox.facility().metrics();

    let Some(handler) = handler else {
        match sink {
            Some(sink) => {
                if let Err(fault) = sink.fail(fault) {
                    warn!(mailbox = %mailbox.id(), "Uncaught fault after response was sent: {:#}", fault);
                    metrics.record_fault_unhandled();
                }
            }
            None => {
                warn!(mailbox = %mailbox.id(), "Uncaught fault: {:#}", fault);
                metrics.record_fault_unhandled();
            }
        }
        return;
    };

    let original = format!("{:#}", fault);
    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| handler(fault))) {
        Ok(result) => result,
        Err(payload) => {
            metrics.record_panic();
            Err(anyhow::anyhow!(
                "exception handler panicked: {}",
                panic_message(payload.as_ref())
            ))
        }
    };

    match outcome {
        Ok(()) => metrics.record_fault_handled(),
        Err(handler_fault) => {
            metrics.record_double_fault();
            error!(
                mailbox = %mailbox.id(),
                fault = %original,
                handler_fault = %format!("{:#}", handler_fault),
                "Exception handler failed while handling fault"
            );
            if let Some(sink) = sink.filter(|sink| sink.is_pending()) {
                // Already logged above if the response went out meanwhile
                let _ = sink.fail(handler_fault);
            }
        }
    }
}

/// Best-effort description of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message_payloads() {
        let payload = panic::catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload = panic::catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "code 7");

        let payload = panic::catch_unwind(|| std::panic::panic_any(42u8)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }

    #[test]
    fn test_request_frame_starts_without_handler() {
        struct Answered;
        impl PendingResponse for Answered {
            fn fail(&self, fault: anyhow::Error) -> Result<(), anyhow::Error> {
                Err(fault)
            }
            fn abandon(&self) {}
            fn is_pending(&self) -> bool {
                false
            }
        }

        let frame = Frame::for_request(Arc::new(Answered));
        assert!(frame.handler.is_none());
        assert!(frame.sink.is_some());
        assert!(Frame::default().sink.is_none());
    }
}
