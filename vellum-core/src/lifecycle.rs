//! Lifecycle state shared by stores.
//!
//! Instances move through `New → Hatching → Ready → Closing → Closed`.
//! Probes never fail; the `ensure_*` helpers turn the current state into the
//! error an operation should report.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::{DocumentStoreError, DocumentStoreResult};

/// Where an instance is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Lifecycle {
    New = 0,
    Hatching = 1,
    Ready = 2,
    Closing = 3,
    Closed = 4,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Lifecycle::New,
            1 => Lifecycle::Hatching,
            2 => Lifecycle::Ready,
            3 => Lifecycle::Closing,
            _ => Lifecycle::Closed,
        }
    }

    pub fn is_new_or_hatching(&self) -> bool {
        matches!(self, Lifecycle::New | Lifecycle::Hatching)
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Lifecycle::Ready)
    }

    pub fn is_closing_or_closed(&self) -> bool {
        matches!(self, Lifecycle::Closing | Lifecycle::Closed)
    }
}

/// Lock-free holder for a [`Lifecycle`].
#[derive(Debug)]
pub struct LifecycleCell(AtomicU8);

impl Default for LifecycleCell {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(Lifecycle::New as u8))
    }

    pub fn get(&self) -> Lifecycle {
        Lifecycle::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, lifecycle: Lifecycle) {
        self.0.store(lifecycle as u8, Ordering::Release);
    }

    /// Moves from `from` to `to` only if the current state is `from`.
    ///
    /// Returns the state observed before the attempt.
    pub fn transition(&self, from: Lifecycle, to: Lifecycle) -> Lifecycle {
        match self
            .0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(previous) | Err(previous) => Lifecycle::from_u8(previous),
        }
    }

    /// Fails unless the instance is ready for reads and writes.
    pub fn ensure_ready(&self) -> DocumentStoreResult<()> {
        match self.get() {
            Lifecycle::Ready => Ok(()),
            Lifecycle::New | Lifecycle::Hatching => Err(DocumentStoreError::NotReady),
            Lifecycle::Closing | Lifecycle::Closed => Err(DocumentStoreError::Closed),
        }
    }

    /// Fails once closing has begun.
    pub fn ensure_not_closed(&self) -> DocumentStoreResult<()> {
        if self.get().is_closing_or_closed() {
            Err(DocumentStoreError::Closed)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_ready_follows_the_state() {
        let cell = LifecycleCell::new();
        assert_eq!(cell.ensure_ready(), Err(DocumentStoreError::NotReady));

        cell.set(Lifecycle::Ready);
        assert_eq!(cell.ensure_ready(), Ok(()));

        cell.set(Lifecycle::Closed);
        assert_eq!(cell.ensure_ready(), Err(DocumentStoreError::Closed));
        assert_eq!(cell.ensure_not_closed(), Err(DocumentStoreError::Closed));
    }

    #[test]
    fn transition_only_from_expected_state() {
        let cell = LifecycleCell::new();

        assert_eq!(cell.transition(Lifecycle::New, Lifecycle::Hatching), Lifecycle::New);
        assert_eq!(cell.get(), Lifecycle::Hatching);

        assert_eq!(cell.transition(Lifecycle::New, Lifecycle::Hatching), Lifecycle::Hatching);
        assert_eq!(cell.get(), Lifecycle::Hatching);
    }
}
