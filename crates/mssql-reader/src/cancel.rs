//! Out-of-band cancellation of reader operations.

use std::fmt;
use std::sync::Arc;

use crate::operation::OperationSlot;

/// Handle that cancels the outstanding asynchronous operation of a reader.
///
/// Obtained from [`DataReader::cancel_handle`](crate::DataReader::cancel_handle).
/// The handle can be moved to another task; cancelling when nothing is
/// pending does nothing.
#[derive(Clone)]
pub struct CancelHandle {
    slot: Arc<OperationSlot>,
}

impl CancelHandle {
    pub(crate) fn new(slot: Arc<OperationSlot>) -> Self {
        Self { slot }
    }

    /// Cancel the pending operation. Returns `false` if none was pending.
    ///
    /// The operation completes with [`Error::Cancelled`](crate::Error::Cancelled).
    /// If it was cancelled in the middle of a row the reader closes.
    pub fn cancel(&self) -> bool {
        let cancelled = self.slot.cancel();
        if cancelled {
            tracing::debug!("cancellation requested");
        }
        cancelled
    }

    /// Returns whether an operation is pending.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.slot.is_pending()
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHandle")
            .field("pending", &self.is_pending())
            .finish()
    }
}
