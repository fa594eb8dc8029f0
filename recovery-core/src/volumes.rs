//! Volume orchestration: erasing, backup restore, sideload staging.

use crate::config::RecoveryConfig;
use crate::session::RecoverySession;
use crate::ui::{BackgroundIcon, ProgressKind, RecoveryUi};
use anyhow::Context;
use recovery_error::StagingError;
use recovery_hal::{HalResult, RecoveryHal};
use std::fs;
use std::io;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

/// Name of the staged copy of a sideloaded package.
const SIDELOAD_PACKAGE: &str = "package.zip";

/// Unmount and reformat one volume.
///
/// Erasing the cache volume throws away the cumulative log together with
/// everything else, so the session's log copy offset starts over.
pub fn erase_volume(
    hal: &dyn RecoveryHal,
    ui: &mut dyn RecoveryUi,
    session: &mut RecoverySession,
    volume: &str,
) -> HalResult<()> {
    ui.set_background(BackgroundIcon::Erasing);
    ui.set_progress(ProgressKind::Indeterminate);
    ui.print(&format!("Formatting {}...\n", volume));

    if volume == session.paths.cache_root {
        session.tmplog_offset = 0;
    }

    // Best effort: a volume that will not unmount still gets reformatted.
    if let Err(e) = hal.ensure_unmounted(volume) {
        log::warn!("unmount of {} failed ({}); formatting anyway", volume, e);
    }
    hal.format_volume(volume)
}

/// Restore the data volume from its backup partition, erasing it instead
/// when no backup exists or the restore fails.
///
/// The backup partition is looked up before anything is touched, so a board
/// without one goes straight to the erase without a single write.
pub fn clone_or_erase_data(
    hal: &dyn RecoveryHal,
    ui: &mut dyn RecoveryUi,
    session: &mut RecoverySession,
) -> HalResult<()> {
    let data_volume = session.config.data_volume.clone();
    let data_partition = session.config.data_partition.clone();
    let backup = session.config.backup_partition.clone();
    match restore_from_backup(hal, &backup, &data_partition, &data_volume) {
        Ok(()) => {
            ui.print(&format!("Restored {} from backup.\n", data_volume));
            Ok(())
        }
        Err(e) => {
            log::info!(
                "no usable backup on {} ({}); erasing {}",
                backup,
                e,
                data_volume
            );
            erase_volume(hal, ui, session, &data_volume)
        }
    }
}

/// Restore one raw partition from a backup partition holding a sparse
/// image. `volume` is the mount point covering the target, unmounted
/// before the write.
pub fn restore_from_backup(
    hal: &dyn RecoveryHal,
    backup_partition: &str,
    target_partition: &str,
    volume: &str,
) -> HalResult<()> {
    let backup = hal.find_partition(backup_partition)?;
    let target = hal.find_partition(target_partition)?;
    let backup_device = hal.partition_device(&backup);
    let target_device = hal.partition_device(&target);

    hal.ensure_unmounted(volume)?;
    hal.restore_sparse_image(&backup_device, &target_device)?;
    hal.check_and_resize(&target_device)
}

/// Restore the FAT32 label of a freshly formatted media volume.
pub fn set_volume_label(hal: &dyn RecoveryHal, volume: &str, name: &str) -> anyhow::Result<()> {
    let device = hal
        .device_for_volume(volume)
        .with_context(|| format!("no device for {}", volume))?;
    crate::fat32::write_volume_label(&device, name)
        .with_context(|| format!("relabelling {}", device.display()))?;
    Ok(())
}

/// Copy a package from removable media into the staging directory before
/// installing, so the media can be pulled mid-install without corrupting
/// the read.
///
/// The staging directory must be a real directory (not a symlink), mode
/// 0700, owned by this process. Anything else aborts before the copy
/// starts.
pub fn copy_sideloaded_package(
    package: &Path,
    staging_dir: &Path,
) -> Result<PathBuf, StagingError> {
    if fs::symlink_metadata(staging_dir).is_err() {
        fs::create_dir_all(staging_dir)?;
        fs::set_permissions(staging_dir, fs::Permissions::from_mode(0o700))?;
    }

    let meta = fs::symlink_metadata(staging_dir)?;
    if !meta.is_dir() {
        return Err(StagingError::NotADirectory(staging_dir.to_path_buf()));
    }
    let mode = meta.mode() & 0o777;
    if mode != 0o700 {
        return Err(StagingError::BadMode {
            path: staging_dir.to_path_buf(),
            mode,
        });
    }
    let owner = meta.uid();
    if owner != nix::unistd::geteuid().as_raw() {
        return Err(StagingError::BadOwner {
            path: staging_dir.to_path_buf(),
            uid: owner,
        });
    }

    let target = staging_dir.join(SIDELOAD_PACKAGE);
    match fs::remove_file(&target) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let mut source = fs::File::open(package)?;
    let mut staged = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .custom_flags(nix::fcntl::OFlag::O_NOFOLLOW.bits())
        .open(&target)?;
    io::copy(&mut source, &mut staged)?;
    staged.sync_all()?;
    staged.set_permissions(fs::Permissions::from_mode(0o400))?;
    Ok(target)
}

/// Look for an unattended-update tag on the storage roots. Returns the
/// package to install when a tag and its package are both present.
pub fn discover_auto_update(hal: &dyn RecoveryHal, config: &RecoveryConfig) -> Option<PathBuf> {
    let mut roots = vec![config.external_storage.clone()];
    if let Some(internal) = &config.internal_storage {
        roots.push(internal.clone());
    }

    for root in roots {
        if let Err(e) = hal.ensure_mounted(&root) {
            log::info!("cannot mount {} for auto update probe ({})", root, e);
            continue;
        }
        let tag = Path::new(&root).join(&config.auto_update_tag);
        if !tag.exists() {
            continue;
        }
        let package = Path::new(&root).join(&config.auto_update_package);
        if package.exists() {
            log::info!("auto update tagged at {}", tag.display());
            return Some(package);
        }
        log::warn!(
            "auto update tag {} present but package missing",
            tag.display()
        );
    }
    None
}
