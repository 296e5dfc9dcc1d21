//! The single pending-operation slot of a reader.
//!
//! At most one asynchronous operation runs on a reader at a time. Starting
//! one claims the slot with a fresh cancellation token; the guard frees it
//! when the operation completes or is dropped.

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Slot recording the outstanding asynchronous operation.
#[derive(Debug, Default)]
pub struct OperationSlot {
    current: Mutex<Option<CancellationToken>>,
}

impl OperationSlot {
    /// Claim the slot for a new operation.
    ///
    /// The operation's token is a child of `parent`, so closing the reader
    /// cancels it too.
    pub fn try_begin(&self, parent: &CancellationToken) -> Result<OperationGuard<'_>> {
        if parent.is_cancelled() {
            return Err(Error::ReaderClosed);
        }
        let mut current = self.current.lock();
        if current.is_some() {
            return Err(Error::AsyncOperationPending);
        }
        let token = parent.child_token();
        *current = Some(token.clone());
        Ok(OperationGuard { slot: self, token })
    }

    /// Returns whether an operation is outstanding.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Cancel the outstanding operation. Returns `false` if there is none.
    pub fn cancel(&self) -> bool {
        match &*self.current.lock() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }
}

/// Claim on an [`OperationSlot`], released on drop.
#[derive(Debug)]
pub struct OperationGuard<'a> {
    slot: &'a OperationSlot,
    token: CancellationToken,
}

impl OperationGuard<'_> {
    /// Cancellation token of the claimed operation.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        *self.slot.current.lock() = None;
    }
}
