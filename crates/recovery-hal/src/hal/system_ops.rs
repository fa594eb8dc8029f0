//! Whole-system operations trait.

use recovery_error::HalResult;

/// Trait for process-external system state changes.
pub trait SystemOps {
    /// Force buffered filesystem writes to storage.
    fn sync(&self) -> HalResult<()>;

    /// Reboot into the main system. On the real backend this does not return.
    fn reboot(&self) -> HalResult<()>;
}
