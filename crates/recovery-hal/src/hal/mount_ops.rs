//! Mount operations trait.

use recovery_error::HalResult;

/// Trait for mount-on-demand volume access.
///
/// Paths are resolved to the volume that covers them, so callers may pass
/// either a mount point (`/cache`) or a file underneath one
/// (`/cache/recovery/command`). Both operations are idempotent: mounting a
/// mounted volume and unmounting an unmounted one succeed without touching
/// the system.
pub trait MountOps {
    /// Mount the volume covering `path`, if it is not already mounted.
    fn ensure_mounted(&self, path: &str) -> HalResult<()>;

    /// Unmount the volume covering `path`, if it is mounted.
    fn ensure_unmounted(&self, path: &str) -> HalResult<()>;

    /// Check whether the volume covering `path` is currently mounted.
    fn is_mounted(&self, path: &str) -> HalResult<bool>;
}
