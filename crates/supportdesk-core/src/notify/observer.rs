//! The observer side of notification fan-out.
//!
//! An observer is whatever sits behind a connected admin console or guest
//! chat window. The hub only ever calls `notify`; it never inspects the
//! observer beyond that.

use supportdesk_types::chat::ChatNotice;
use supportdesk_types::error::ObserverError;
use tokio::sync::mpsc;

/// Receiver of change notices.
///
/// `notify` must not block: the hub calls it inline while fanning out to
/// every other observer.
pub trait Observer: Send + Sync {
    fn notify(&self, notice: &ChatNotice) -> Result<(), ObserverError>;
}

/// Bounded connection queue. A full queue is reported as `Lagged` rather than
/// awaited, so one slow connection cannot stall the others.
impl Observer for mpsc::Sender<ChatNotice> {
    fn notify(&self, notice: &ChatNotice) -> Result<(), ObserverError> {
        self.try_send(notice.clone()).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ObserverError::Lagged,
            mpsc::error::TrySendError::Closed(_) => ObserverError::Closed,
        })
    }
}

/// Adapts a closure into an [`Observer`].
pub struct FnObserver<F>(pub F);

impl<F> Observer for FnObserver<F>
where
    F: Fn(&ChatNotice) -> Result<(), ObserverError> + Send + Sync,
{
    fn notify(&self, notice: &ChatNotice) -> Result<(), ObserverError> {
        (self.0)(notice)
    }
}

impl<F> std::fmt::Debug for FnObserver<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FnObserver")
    }
}
