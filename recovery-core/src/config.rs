//! Platform description.
//!
//! Board-to-board differences (volume table, partition names, storage roots,
//! the finish-up control-block policy) come from an optional TOML file
//! instead of compile-time switches. A missing file means built-in defaults;
//! a malformed one is logged and ignored.

use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "/etc/recovery.toml";

/// One mountable volume. Mirrors `recovery_hal::VolumeEntry`; kept separate
/// so the HAL crate stays free of serde.
#[derive(Debug, Clone, Deserialize)]
pub struct VolumeSpec {
    pub mount_point: String,
    pub device: PathBuf,
    pub fstype: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Mountable volumes known to this board.
    pub volumes: Vec<VolumeSpec>,
    /// Mount point of the user-data volume wiped by a factory reset.
    pub data_volume: String,
    /// Raw partition backing the data volume.
    pub data_partition: String,
    /// Backup partition restored onto the data partition before falling
    /// back to a plain erase.
    pub backup_partition: String,
    /// Raw partition holding a pristine system image for menu-driven
    /// recovery, and the partition it is restored onto.
    pub system_partition: String,
    pub system_backup_partition: String,
    /// Internal storage volume erased on a full wipe, if the board has one.
    pub internal_storage: Option<String>,
    /// Removable media root probed for update packages.
    pub external_storage: String,
    /// Volumes checked and resized after a full wipe.
    pub resize_on_wipe_all: Vec<String>,
    /// Tag file (relative to the removable root) marking an auto update,
    /// and the package installed when the tag is present.
    pub auto_update_tag: String,
    pub auto_update_package: String,
    /// Skip clearing the control block when the session ends in an error,
    /// keeping the device in maintenance mode across the next boot. Some
    /// boards need this to avoid a reboot loop through a half-written
    /// system image.
    pub keep_control_block_on_error: bool,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            volumes: vec![
                VolumeSpec {
                    mount_point: "/cache".to_string(),
                    device: PathBuf::from("/dev/block/mtd/by-name/cache"),
                    fstype: Some("ext4".to_string()),
                },
                VolumeSpec {
                    mount_point: "/data".to_string(),
                    device: PathBuf::from("/dev/block/mtd/by-name/userdata"),
                    fstype: Some("ext4".to_string()),
                },
                VolumeSpec {
                    mount_point: "/system".to_string(),
                    device: PathBuf::from("/dev/block/mtd/by-name/system"),
                    fstype: Some("ext4".to_string()),
                },
                VolumeSpec {
                    mount_point: "/mnt/internal_sd".to_string(),
                    device: PathBuf::from("/dev/block/mtd/by-name/user"),
                    fstype: Some("vfat".to_string()),
                },
                VolumeSpec {
                    mount_point: "/mnt/external_sd".to_string(),
                    device: PathBuf::from("/dev/block/mmcblk0p1"),
                    fstype: Some("vfat".to_string()),
                },
            ],
            data_volume: "/data".to_string(),
            data_partition: "userdata".to_string(),
            backup_partition: "databk".to_string(),
            system_partition: "system".to_string(),
            system_backup_partition: "backup".to_string(),
            internal_storage: Some("/mnt/internal_sd".to_string()),
            external_storage: "/mnt/external_sd".to_string(),
            resize_on_wipe_all: vec!["/system".to_string()],
            auto_update_tag: "FirmwareUpdate/auto_update.tag".to_string(),
            auto_update_package: "FirmwareUpdate/update.img".to_string(),
            keep_control_block_on_error: false,
        }
    }
}

impl RecoveryConfig {
    /// Load the board description, falling back to defaults when the file is
    /// absent or unreadable. A parse failure is a configuration error: log
    /// it and keep going with defaults rather than refusing to boot.
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                log::info!(
                    "no board config at {} ({}); using defaults",
                    path.display(),
                    e
                );
                return Self::default();
            }
        };
        match toml::from_str(&content) {
            Ok(config) => config,
            Err(e) => {
                log::error!("malformed board config {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let config = RecoveryConfig::load(Path::new("/nonexistent/recovery.toml"));
        assert_eq!(config.data_partition, "userdata");
        assert_eq!(config.backup_partition, "databk");
        assert!(!config.keep_control_block_on_error);
    }

    #[test]
    fn partial_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "backup_partition = \"databackup\"").unwrap();
        writeln!(file, "keep_control_block_on_error = true").unwrap();

        let config = RecoveryConfig::load(file.path());
        assert_eq!(config.backup_partition, "databackup");
        assert!(config.keep_control_block_on_error);
        // Untouched fields keep their defaults.
        assert_eq!(config.data_volume, "/data");
    }

    #[test]
    fn malformed_file_yields_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "volumes = \"not a table\"").unwrap();

        let config = RecoveryConfig::load(file.path());
        assert_eq!(config.data_partition, "userdata");
    }
}
