//! Status notifications sent to students after review decisions.

use crate::types::{RequestId, RequestKind, RequestStatus, SubjectId};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// What the student is told about their request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusNotice {
    /// Request the notice is about
    pub request_id: RequestId,
    /// Student to notify
    pub subject: SubjectId,
    /// Document request or enrollment
    pub kind: RequestKind,
    /// New status
    pub status: RequestStatus,
    /// Reason, for rejections
    pub rejection_reason: Option<String>,
    /// Assigned section, for enrollments
    pub section: Option<String>,
}

/// Delivery failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Notification delivery failed: {0}")]
pub struct NotifyError(pub String);

/// Boxed future returned by [`Notifier::notify`].
pub type NotifyFuture<'a> = Pin<Box<dyn Future<Output = Result<(), NotifyError>> + Send + 'a>>;

/// Delivers [`StatusNotice`]s (email, SMS, ...).
pub trait Notifier: Send + Sync {
    /// Deliver one notice.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] if delivery fails. Callers log the failure; the
    /// transition that produced the notice stays committed.
    fn notify(&self, notice: StatusNotice) -> NotifyFuture<'_>;
}

/// Notifier that writes notices to the log.
///
/// Used when no delivery channel is configured.
#[derive(Clone, Debug, Default)]
pub struct TracingNotifier;

impl TracingNotifier {
    /// Create a new tracing notifier.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Notifier for TracingNotifier {
    fn notify(&self, notice: StatusNotice) -> NotifyFuture<'_> {
        Box::pin(async move {
            tracing::info!(
                request_id = %notice.request_id,
                subject = %notice.subject,
                kind = %notice.kind,
                status = %notice.status,
                reason = notice.rejection_reason.as_deref(),
                section = notice.section.as_deref(),
                "Status notification"
            );
            Ok(())
        })
    }
}

/// Notifier that keeps every notice in memory, optionally failing delivery.
#[derive(Clone, Debug, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<StatusNotice>>>,
    fail: bool,
}

impl RecordingNotifier {
    /// Records and succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records and then fails every delivery.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            sent: Arc::default(),
            fail: true,
        }
    }

    /// Notices received so far.
    #[must_use]
    pub fn sent(&self) -> Vec<StatusNotice> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: StatusNotice) -> NotifyFuture<'_> {
        Box::pin(async move {
            if let Ok(mut sent) = self.sent.lock() {
                sent.push(notice);
            }
            if self.fail {
                return Err(NotifyError("recording notifier set to fail".to_string()));
            }
            Ok(())
        })
    }
}
