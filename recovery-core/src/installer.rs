//! External installer contract.
//!
//! Package verification and extraction live outside this crate; the
//! controller only dispatches to them and folds their result into the
//! session status.

use std::path::Path;

/// Outcome of one dispatched action. `None` means no action was requested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InstallStatus {
    #[default]
    None,
    Success,
    Error,
    Corrupt,
}

impl InstallStatus {
    pub fn is_success(self) -> bool {
        self == InstallStatus::Success
    }
}

/// Capability interface over the external update machinery.
pub trait Installer {
    /// Verify and install an update package. The installer may request a
    /// cache wipe through `wipe_cache`; progress is appended to
    /// `install_log`.
    fn install_package(
        &self,
        package: &Path,
        wipe_cache: &mut bool,
        install_log: &Path,
    ) -> InstallStatus;

    /// Install a raw firmware image.
    fn install_image(&self, image: &Path) -> InstallStatus;

    /// Receive and install a package pushed over a direct transfer
    /// connection.
    fn sideload(&self, wipe_cache: &mut bool, install_log: &Path) -> InstallStatus;
}
