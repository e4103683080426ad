use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, SpectraError};

/// Cooperative cancellation flag shared between a caller and a long-running sweep.
///
/// Sweeps check the flag between units of work (frames, grid points, wavelength
/// pairs) and return [`SpectraError::Cancelled`] once it is set.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    pub(crate) fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(SpectraError::Cancelled)
        } else {
            Ok(())
        }
    }
}
