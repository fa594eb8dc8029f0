//! Format and filesystem-maintenance operations trait.

use recovery_error::HalResult;
use std::path::Path;

/// Trait for reformatting volumes and resizing filesystems in place.
pub trait FormatOps {
    /// Recreate the filesystem on a named volume. The volume must be
    /// unmounted; callers are expected to have gone through
    /// [`MountOps::ensure_unmounted`](super::MountOps::ensure_unmounted)
    /// first.
    fn format_volume(&self, volume: &str) -> HalResult<()>;

    /// Check a filesystem and grow it to fill its partition
    /// (e2fsck followed by resize2fs).
    fn check_and_resize(&self, device: &Path) -> HalResult<()>;
}
