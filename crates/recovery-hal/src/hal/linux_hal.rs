//! Linux HAL implementation using real system calls and external tools.

use super::{ControlBlockOps, FormatOps, MountOps, MtdPartition, PartitionOps, SystemOps};
use recovery_error::{HalError, HalResult};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use super::partition_ops::VolumeEntry;

const PROC_MTD: &str = "/proc/mtd";
const PROC_MOUNTS: &str = "/proc/mounts";
const MTD_BY_NAME_PREFIX: &str = "/dev/block/mtd/by-name/";

/// Real HAL implementation for Linux systems.
///
/// Holds the static volume table (mount point -> device) and the name of the
/// partition carrying the control-block slot.
#[derive(Debug, Clone)]
pub struct LinuxHal {
    volumes: Vec<VolumeEntry>,
    misc_partition: String,
}

impl LinuxHal {
    pub fn new(volumes: Vec<VolumeEntry>) -> Self {
        Self {
            volumes,
            misc_partition: "misc".to_string(),
        }
    }

    pub fn with_misc_partition(mut self, name: impl Into<String>) -> Self {
        self.misc_partition = name.into();
        self
    }

    /// Find the volume whose mount point covers `path` (longest prefix wins).
    fn volume_for_path(&self, path: &str) -> HalResult<&VolumeEntry> {
        self.volumes
            .iter()
            .filter(|v| covers(&v.mount_point, path))
            .max_by_key(|v| v.mount_point.len())
            .ok_or_else(|| HalError::UnknownVolume(path.to_string()))
    }

    fn misc_device(&self) -> HalResult<PathBuf> {
        let partition = self.find_partition(&self.misc_partition)?;
        Ok(mtdblock_device(partition.device_index))
    }
}

fn covers(mount_point: &str, path: &str) -> bool {
    path == mount_point || path.starts_with(&format!("{}/", mount_point))
}

fn mtdblock_device(index: u32) -> PathBuf {
    PathBuf::from(format!("/dev/block/mtdblock{}", index))
}

fn map_command_err(program: &str, err: std::io::Error) -> HalError {
    if err.kind() == std::io::ErrorKind::NotFound {
        return HalError::CommandNotFound(program.to_string());
    }
    HalError::Io(err)
}

/// Run an external tool to completion, mapping a non-zero exit into
/// `HalError::CommandFailed` with its captured stderr.
fn run_checked(program: &str, args: &[&str]) -> HalResult<()> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|e| map_command_err(program, e))?;
    if !output.status.success() {
        return Err(HalError::CommandFailed {
            program: program.to_string(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

/// Parse `/proc/mtd` content. The first line is a column header; every other
/// line reads `mtd<N>: <size-hex> <erasesize-hex> "<name>"`.
fn parse_mtd_table(content: &str) -> Vec<MtdPartition> {
    let mut partitions = Vec::new();
    for line in content.lines().skip(1) {
        let mut fields = line.split_whitespace();
        let (Some(dev), Some(size), Some(erase_size), Some(name)) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        ) else {
            continue;
        };
        let Some(index) = dev
            .strip_prefix("mtd")
            .and_then(|d| d.strip_suffix(':'))
            .and_then(|d| d.parse::<u32>().ok())
        else {
            continue;
        };
        let (Ok(size), Ok(erase_size)) = (
            u64::from_str_radix(size, 16),
            u64::from_str_radix(erase_size, 16),
        ) else {
            continue;
        };
        partitions.push(MtdPartition {
            device_index: index,
            size,
            erase_size,
            name: name.trim_matches('"').to_string(),
        });
    }
    partitions
}

fn proc_mounts_contains(content: &str, mount_point: &str) -> bool {
    content
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .any(|mp| mp == mount_point)
}

impl MountOps for LinuxHal {
    fn ensure_mounted(&self, path: &str) -> HalResult<()> {
        let volume = self.volume_for_path(path)?;
        if self.is_mounted(&volume.mount_point)? {
            return Ok(());
        }
        fs::create_dir_all(&volume.mount_point)?;
        log::info!("Mounting {} at {}", volume.device.display(), volume.mount_point);
        let device = volume.device.to_string_lossy().to_string();
        let mut args: Vec<&str> = Vec::new();
        if let Some(fstype) = volume.fstype.as_deref() {
            args.extend(["-t", fstype]);
        }
        args.extend([device.as_str(), volume.mount_point.as_str()]);
        run_checked("mount", &args)
            .map_err(|_| HalError::MountFailed(volume.mount_point.clone()))
    }

    fn ensure_unmounted(&self, path: &str) -> HalResult<()> {
        let volume = self.volume_for_path(path)?;
        if !self.is_mounted(&volume.mount_point)? {
            return Ok(());
        }
        log::info!("Unmounting {}", volume.mount_point);
        run_checked("umount", &[volume.mount_point.as_str()])
            .map_err(|_| HalError::UnmountFailed(volume.mount_point.clone()))
    }

    fn is_mounted(&self, path: &str) -> HalResult<bool> {
        let volume = self.volume_for_path(path)?;
        let mounts = fs::read_to_string(PROC_MOUNTS)?;
        Ok(proc_mounts_contains(&mounts, &volume.mount_point))
    }
}

impl FormatOps for LinuxHal {
    fn format_volume(&self, volume: &str) -> HalResult<()> {
        let entry = self.volume_for_path(volume)?;
        let device = self.device_for_volume(volume)?;
        let device = device.to_string_lossy().to_string();
        log::info!("Formatting {} ({})", entry.mount_point, device);
        let result = match entry.fstype.as_deref() {
            Some("ext4") => run_checked("mkfs.ext4", &["-F", &device]),
            Some("vfat") => run_checked("mkfs.vfat", &[device.as_str()]),
            other => Err(HalError::Other(format!(
                "don't know how to format {:?} on {}",
                other, entry.mount_point
            ))),
        };
        result.map_err(|e| {
            log::error!("format of {} failed: {}", entry.mount_point, e);
            HalError::FormatFailed(entry.mount_point.clone())
        })
    }

    fn check_and_resize(&self, device: &Path) -> HalResult<()> {
        let device = device.to_string_lossy().to_string();
        // -y answers yes to every question so e2fsck runs unattended.
        run_checked("e2fsck", &["-y", "-f", &device])?;
        run_checked("resize2fs", &[device.as_str()])?;
        Ok(())
    }
}

impl PartitionOps for LinuxHal {
    fn scan_partitions(&self) -> HalResult<Vec<MtdPartition>> {
        let content = fs::read_to_string(PROC_MTD)?;
        Ok(parse_mtd_table(&content))
    }

    fn device_for_volume(&self, volume: &str) -> HalResult<PathBuf> {
        let entry = self.volume_for_path(volume)?;
        let device = entry.device.to_string_lossy();
        // by-name links may not exist in the maintenance environment; resolve
        // them through the partition table instead.
        if let Some(name) = device.strip_prefix(MTD_BY_NAME_PREFIX) {
            let partition = self.find_partition(name)?;
            return Ok(mtdblock_device(partition.device_index));
        }
        Ok(entry.device.clone())
    }

    fn restore_sparse_image(&self, backup_device: &Path, data_device: &Path) -> HalResult<()> {
        log::info!(
            "Restoring {} onto {}",
            backup_device.display(),
            data_device.display()
        );
        run_checked(
            "simg2img",
            &[
                &backup_device.to_string_lossy(),
                &data_device.to_string_lossy(),
            ],
        )
    }
}

impl ControlBlockOps for LinuxHal {
    fn read_control_block(&self, len: usize) -> HalResult<Vec<u8>> {
        let device = self.misc_device()?;
        let mut file = File::open(&device)
            .map_err(|e| HalError::ControlBlock(format!("open {}: {}", device.display(), e)))?;
        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)
            .map_err(|e| HalError::ControlBlock(format!("read {}: {}", device.display(), e)))?;
        Ok(buf)
    }

    fn write_control_block(&self, bytes: &[u8]) -> HalResult<()> {
        let device = self.misc_device()?;
        let mut file = OpenOptions::new()
            .write(true)
            .open(&device)
            .map_err(|e| HalError::ControlBlock(format!("open {}: {}", device.display(), e)))?;
        file.write_all(bytes)
            .map_err(|e| HalError::ControlBlock(format!("write {}: {}", device.display(), e)))?;
        file.sync_all()?;
        Ok(())
    }
}

impl SystemOps for LinuxHal {
    fn sync(&self) -> HalResult<()> {
        nix::unistd::sync();
        Ok(())
    }

    fn reboot(&self) -> HalResult<()> {
        log::info!("Rebooting...");
        let _ = nix::sys::reboot::reboot(nix::sys::reboot::RebootMode::RB_AUTOBOOT)
            .map_err(HalError::Nix)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hal() -> LinuxHal {
        LinuxHal::new(vec![
            VolumeEntry {
                mount_point: "/cache".to_string(),
                device: PathBuf::from("/dev/block/mtd/by-name/cache"),
                fstype: Some("ext4".to_string()),
            },
            VolumeEntry {
                mount_point: "/cache/deeper".to_string(),
                device: PathBuf::from("/dev/block/mtdblock9"),
                fstype: Some("ext4".to_string()),
            },
        ])
    }

    #[test]
    fn volume_lookup_prefers_longest_prefix() {
        let hal = hal();
        let v = hal.volume_for_path("/cache/deeper/file").unwrap();
        assert_eq!(v.mount_point, "/cache/deeper");
        let v = hal.volume_for_path("/cache/recovery/command").unwrap();
        assert_eq!(v.mount_point, "/cache");
    }

    #[test]
    fn volume_lookup_rejects_siblings() {
        let hal = hal();
        // "/cachex" shares a string prefix but is not under the mount point.
        assert!(hal.volume_for_path("/cachex/file").is_err());
    }

    #[test]
    fn mtd_table_parses_quoted_names() {
        let table = "dev:    size   erasesize  name\n\
                     mtd0: 00400000 00020000 \"misc\"\n\
                     mtd1: 08000000 00020000 \"userdata\"\n\
                     bogus line\n";
        let partitions = parse_mtd_table(table);
        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions[0].name, "misc");
        assert_eq!(partitions[0].device_index, 0);
        assert_eq!(partitions[0].size, 0x0040_0000);
        assert_eq!(partitions[1].name, "userdata");
        assert_eq!(partitions[1].device_index, 1);
    }

    #[test]
    fn proc_mounts_matching_is_exact() {
        let mounts = "/dev/block/mtdblock4 /cache ext4 rw 0 0\n";
        assert!(proc_mounts_contains(mounts, "/cache"));
        assert!(!proc_mounts_contains(mounts, "/cach"));
        assert!(!proc_mounts_contains(mounts, "/data"));
    }
}
