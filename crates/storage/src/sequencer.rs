//! Global position assignment
//!
//! The sequencer is the only serialization point shared by all writers.
//! A position is handed out by increment-and-return under one mutex; the
//! caller's commit work runs inside the same critical section and the
//! committed watermark only advances once that work succeeded. A failed
//! commit therefore never burns a position and never leaves a hole.

use chronicle_core::{Error, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Assigns strictly increasing global positions starting at 1
#[derive(Debug, Default)]
pub struct GlobalSequencer {
    /// Last assigned position, held for the whole commit
    last: Mutex<u64>,
    /// Published watermark: every position <= this is fully committed
    committed: AtomicU64,
}

impl GlobalSequencer {
    /// Create a sequencer at position 0
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest fully committed position (0 when nothing was committed)
    #[inline]
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::Acquire)
    }

    /// Run `commit` with the next position
    ///
    /// The watermark advances only if `commit` returns `Ok`.
    pub fn sequence<T, F>(&self, commit: F) -> Result<T>
    where
        F: FnOnce(u64) -> Result<T>,
    {
        let mut last = self.last.lock();
        let next = last
            .checked_add(1)
            .ok_or_else(|| Error::storage("global position space exhausted"))?;
        let out = commit(next)?;
        *last = next;
        self.committed.store(next, Ordering::Release);
        Ok(out)
    }

    /// Re-apply a position read back from the WAL
    ///
    /// Positions must arrive in strictly increasing order.
    pub fn restore<T, F>(&self, position: u64, commit: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let mut last = self.last.lock();
        if position <= *last {
            return Err(Error::corruption(format!(
                "position {} replayed after {}",
                position, *last
            )));
        }
        let out = commit()?;
        *last = position;
        self.committed.store(position, Ordering::Release);
        Ok(out)
    }
}
