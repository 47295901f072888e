//! RAII holds on a [`ReaderWriterLatch`]

use crate::error::Result;

use super::reader_writer::ReaderWriterLatch;

/// Shared hold, released on drop
#[derive(Debug)]
#[must_use = "the latch is released as soon as the guard is dropped"]
pub struct SharedGuard<'a> {
    latch: &'a ReaderWriterLatch,
}

/// Exclusive hold, released on drop
#[derive(Debug)]
#[must_use = "the latch is released as soon as the guard is dropped"]
pub struct ExclusiveGuard<'a> {
    latch: &'a ReaderWriterLatch,
}

impl ReaderWriterLatch {
    /// Obtain shared and return a guard
    pub fn shared(&self) -> Result<SharedGuard<'_>> {
        self.obtain_shared()?;
        Ok(SharedGuard { latch: self })
    }

    /// Obtain exclusive and return a guard
    pub fn exclusive(&self) -> Result<ExclusiveGuard<'_>> {
        self.obtain_exclusive()?;
        Ok(ExclusiveGuard { latch: self })
    }

    pub fn try_shared(&self) -> Option<SharedGuard<'_>> {
        self.attempt_shared().then_some(SharedGuard { latch: self })
    }

    pub fn try_exclusive(&self) -> Option<ExclusiveGuard<'_>> {
        self.attempt_exclusive().then_some(ExclusiveGuard { latch: self })
    }
}

impl<'a> SharedGuard<'a> {
    pub fn latch(&self) -> &'a ReaderWriterLatch {
        self.latch
    }

    /// Upgrade to exclusive if this is the only sharer.
    ///
    /// On failure the shared hold is handed back unchanged.
    pub fn upgrade(self) -> std::result::Result<ExclusiveGuard<'a>, SharedGuard<'a>> {
        if self.latch.modify_to_exclusive() {
            let latch = self.latch;
            std::mem::forget(self);
            Ok(ExclusiveGuard { latch })
        } else {
            Err(self)
        }
    }
}

impl<'a> ExclusiveGuard<'a> {
    pub fn latch(&self) -> &'a ReaderWriterLatch {
        self.latch
    }

    /// Downgrade to a shared hold without releasing the latch
    pub fn downgrade(self) -> Result<SharedGuard<'a>> {
        let latch = self.latch;
        std::mem::forget(self);
        latch.modify_to_shared()?;
        Ok(SharedGuard { latch })
    }
}

impl Drop for SharedGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.latch.release_shared() {
            tracing::error!(error = %e, "shared guard release failed");
        }
    }
}

impl Drop for ExclusiveGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.latch.release_exclusive() {
            tracing::error!(error = %e, "exclusive guard release failed");
        }
    }
}
