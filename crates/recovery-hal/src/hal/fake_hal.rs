//! Fake HAL implementation for testing.
//!
//! Records every operation without executing it, models the mounted set, the
//! control-block slot and the partition table in memory, and lets tests
//! script failures per volume. CI-safe: no root, no real hardware.

use super::{ControlBlockOps, FormatOps, MountOps, MtdPartition, PartitionOps, SystemOps};
use recovery_error::{HalError, HalResult};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Operation records for testing and verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Mount { volume: String },
    Unmount { volume: String },
    Format { volume: String },
    CheckAndResize { device: PathBuf },
    RestoreSparseImage { backup: PathBuf, data: PathBuf },
    ReadControlBlock,
    WriteControlBlock,
    Sync,
    Reboot,
}

#[derive(Debug, Default)]
struct FakeHalState {
    operations: Vec<Operation>,
    mounted: HashSet<String>,
    control_block: Vec<u8>,
    partitions: Vec<MtdPartition>,
    /// mount point -> backing device handed out by `device_for_volume`
    volume_devices: HashMap<String, PathBuf>,
    fail_format: HashSet<String>,
    fail_mount: HashSet<String>,
    fail_unmount: HashSet<String>,
    fail_restore: bool,
    fail_control_block_read: bool,
}

/// Fake HAL implementation that records operations without executing them.
#[derive(Debug, Clone, Default)]
pub struct FakeHal {
    state: Arc<Mutex<FakeHalState>>,
}

impl FakeHal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a volume so mount/format/device lookups resolve. The device
    /// path may point at a plain file when a test wants raw-format routines
    /// to operate on it.
    pub fn add_volume(&self, mount_point: impl Into<String>, device: impl Into<PathBuf>) {
        self.state
            .lock()
            .unwrap()
            .volume_devices
            .insert(mount_point.into(), device.into());
    }

    /// Add a partition-table entry.
    pub fn add_partition(&self, name: impl Into<String>, device_index: u32) {
        self.state.lock().unwrap().partitions.push(MtdPartition {
            device_index,
            size: 0,
            erase_size: 0,
            name: name.into(),
        });
    }

    /// Make every format of `volume` fail.
    pub fn fail_format(&self, volume: impl Into<String>) {
        self.state.lock().unwrap().fail_format.insert(volume.into());
    }

    /// Make every mount of `volume` fail.
    pub fn fail_mount(&self, volume: impl Into<String>) {
        self.state.lock().unwrap().fail_mount.insert(volume.into());
    }

    /// Make every unmount of `volume` fail, as on a volume with open files.
    pub fn fail_unmount(&self, volume: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .fail_unmount
            .insert(volume.into());
    }

    /// Make sparse-image restoration fail.
    pub fn fail_restore(&self) {
        self.state.lock().unwrap().fail_restore = true;
    }

    /// Make control-block reads fail, as on firmware without a misc slot.
    pub fn fail_control_block_read(&self) {
        self.state.lock().unwrap().fail_control_block_read = true;
    }

    /// Current contents of the in-memory control-block slot.
    pub fn control_block(&self) -> Vec<u8> {
        self.state.lock().unwrap().control_block.clone()
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<Operation> {
        self.state.lock().unwrap().operations.clone()
    }

    /// Get the number of operations recorded.
    pub fn operation_count(&self) -> usize {
        self.state.lock().unwrap().operations.len()
    }

    /// Check if a specific operation was recorded.
    pub fn has_operation(&self, check: impl Fn(&Operation) -> bool) -> bool {
        self.state.lock().unwrap().operations.iter().any(check)
    }

    /// Clear all recorded operations (registered volumes survive).
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.operations.clear();
        state.mounted.clear();
    }

    fn record(&self, op: Operation) {
        self.state.lock().unwrap().operations.push(op);
    }

    /// Resolve a path to its registered covering volume; unregistered paths
    /// fall back to being their own volume, which keeps small tests terse.
    fn volume_root(&self, path: &str) -> String {
        let state = self.state.lock().unwrap();
        state
            .volume_devices
            .keys()
            .filter(|mp| path == mp.as_str() || path.starts_with(&format!("{}/", mp)))
            .max_by_key(|mp| mp.len())
            .cloned()
            .unwrap_or_else(|| path.to_string())
    }
}

impl MountOps for FakeHal {
    fn ensure_mounted(&self, path: &str) -> HalResult<()> {
        let volume = self.volume_root(path);
        if self.state.lock().unwrap().fail_mount.contains(&volume) {
            return Err(HalError::MountFailed(volume));
        }
        log::info!("FAKE HAL: mount {}", volume);
        self.record(Operation::Mount {
            volume: volume.clone(),
        });
        self.state.lock().unwrap().mounted.insert(volume);
        Ok(())
    }

    fn ensure_unmounted(&self, path: &str) -> HalResult<()> {
        let volume = self.volume_root(path);
        if self.state.lock().unwrap().fail_unmount.contains(&volume) {
            return Err(HalError::UnmountFailed(volume));
        }
        log::info!("FAKE HAL: unmount {}", volume);
        self.record(Operation::Unmount {
            volume: volume.clone(),
        });
        self.state.lock().unwrap().mounted.remove(&volume);
        Ok(())
    }

    fn is_mounted(&self, path: &str) -> HalResult<bool> {
        let volume = self.volume_root(path);
        Ok(self.state.lock().unwrap().mounted.contains(&volume))
    }
}

impl FormatOps for FakeHal {
    fn format_volume(&self, volume: &str) -> HalResult<()> {
        let volume = self.volume_root(volume);
        self.record(Operation::Format {
            volume: volume.clone(),
        });
        if self.state.lock().unwrap().fail_format.contains(&volume) {
            return Err(HalError::FormatFailed(volume));
        }
        Ok(())
    }

    fn check_and_resize(&self, device: &Path) -> HalResult<()> {
        self.record(Operation::CheckAndResize {
            device: device.to_path_buf(),
        });
        Ok(())
    }
}

impl PartitionOps for FakeHal {
    fn scan_partitions(&self) -> HalResult<Vec<MtdPartition>> {
        Ok(self.state.lock().unwrap().partitions.clone())
    }

    fn device_for_volume(&self, volume: &str) -> HalResult<PathBuf> {
        self.state
            .lock()
            .unwrap()
            .volume_devices
            .get(volume)
            .cloned()
            .ok_or_else(|| HalError::UnknownVolume(volume.to_string()))
    }

    fn restore_sparse_image(&self, backup_device: &Path, data_device: &Path) -> HalResult<()> {
        self.record(Operation::RestoreSparseImage {
            backup: backup_device.to_path_buf(),
            data: data_device.to_path_buf(),
        });
        if self.state.lock().unwrap().fail_restore {
            return Err(HalError::Other("sparse image conversion failed".into()));
        }
        Ok(())
    }
}

impl ControlBlockOps for FakeHal {
    fn read_control_block(&self, len: usize) -> HalResult<Vec<u8>> {
        self.record(Operation::ReadControlBlock);
        let state = self.state.lock().unwrap();
        if state.fail_control_block_read {
            return Err(HalError::ControlBlock("no misc slot".into()));
        }
        let mut bytes = state.control_block.clone();
        bytes.resize(len, 0);
        Ok(bytes)
    }

    fn write_control_block(&self, bytes: &[u8]) -> HalResult<()> {
        self.record(Operation::WriteControlBlock);
        self.state.lock().unwrap().control_block = bytes.to_vec();
        Ok(())
    }
}

impl SystemOps for FakeHal {
    fn sync(&self) -> HalResult<()> {
        self.record(Operation::Sync);
        Ok(())
    }

    fn reboot(&self) -> HalResult<()> {
        self.record(Operation::Reboot);
        Ok(())
    }
}
