//! Per-connection state shared by the readers of one connection.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::snapshot::SnapshotCache;

/// Connection protocol state as seen by a reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProtocolState {
    /// No reader is bound.
    #[default]
    Ready,
    /// A reader is consuming a result.
    Busy,
    /// A fatal error left the stream out of step.
    Broken,
}

impl ProtocolState {
    /// Check if the connection is in a usable state.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !matches!(self, Self::Broken)
    }

    /// Check if a reader is bound.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Busy)
    }
}

/// State a connection shares with the readers bound to it.
#[derive(Debug, Default)]
pub struct ConnectionContext {
    snapshots: SnapshotCache,
    state: Mutex<ProtocolState>,
}

impl ConnectionContext {
    /// Create a context for a fresh connection.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The connection's snapshot cache.
    #[must_use]
    pub fn snapshots(&self) -> &SnapshotCache {
        &self.snapshots
    }

    /// Current protocol state.
    #[must_use]
    pub fn state(&self) -> ProtocolState {
        *self.state.lock()
    }

    /// Bind a reader to the connection.
    pub(crate) fn bind(&self) -> Result<()> {
        let mut state = self.state.lock();
        match *state {
            ProtocolState::Broken => Err(Error::ConnectionBroken),
            ProtocolState::Busy => Err(Error::ConnectionBusy),
            ProtocolState::Ready => {
                *state = ProtocolState::Busy;
                Ok(())
            }
        }
    }

    /// Unbind the reader after its result was drained.
    pub(crate) fn release(&self) {
        let mut state = self.state.lock();
        if *state == ProtocolState::Busy {
            *state = ProtocolState::Ready;
        }
    }

    /// Mark the connection unusable.
    pub fn mark_broken(&self) {
        let mut state = self.state.lock();
        if *state != ProtocolState::Broken {
            tracing::warn!("connection marked broken");
            *state = ProtocolState::Broken;
        }
    }

    /// Returns whether the connection is broken.
    #[must_use]
    pub fn is_broken(&self) -> bool {
        !self.state().is_usable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_and_release() {
        let ctx = ConnectionContext::new();
        assert_eq!(ctx.state(), ProtocolState::Ready);
        assert!(ctx.bind().is_ok());
        assert!(ctx.state().is_busy());
        assert!(matches!(ctx.bind(), Err(Error::ConnectionBusy)));
        ctx.release();
        assert_eq!(ctx.state(), ProtocolState::Ready);
    }

    #[test]
    fn test_broken_is_sticky() {
        let ctx = ConnectionContext::new();
        ctx.bind().ok();
        ctx.mark_broken();
        ctx.release();
        assert!(ctx.is_broken());
        assert!(matches!(ctx.bind(), Err(Error::ConnectionBroken)));
    }
}
