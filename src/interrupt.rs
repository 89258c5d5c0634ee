//! Cooperative cancellation for dispatch runs.
//!
//! The dispatcher checks for interruption between records only, so a record
//! is either fully processed or not touched at all.

use crate::error::{NotifyError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Something that can report whether it has been asked to stop.
pub trait Interruptee: Sync {
    fn was_interrupted(&self) -> bool;

    fn err_if_interrupted(&self) -> Result<()> {
        if self.was_interrupted() {
            Err(NotifyError::Interrupted)
        } else {
            Ok(())
        }
    }
}

/// Never interrupted. For library callers and tests.
pub struct NeverInterrupts;

impl Interruptee for NeverInterrupts {
    #[inline]
    fn was_interrupted(&self) -> bool {
        false
    }
}

/// A flag shared between a signal handler and the dispatch loop.
#[derive(Clone, Debug, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Safe to call from any thread, any number of times.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl Interruptee for ShutdownFlag {
    fn was_interrupted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
