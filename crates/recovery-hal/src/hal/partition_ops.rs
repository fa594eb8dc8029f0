//! Partition table and raw-device operations trait.

use recovery_error::{HalError, HalResult};
use std::path::{Path, PathBuf};

/// One entry of the platform's raw flash partition table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MtdPartition {
    pub device_index: u32,
    pub size: u64,
    pub erase_size: u64,
    pub name: String,
}

/// Static description of a mountable volume: where it lives in the tree and
/// which device backs it.
#[derive(Debug, Clone)]
pub struct VolumeEntry {
    pub mount_point: String,
    pub device: PathBuf,
    pub fstype: Option<String>,
}

/// Trait for partition-table lookups and partition-level data movement.
pub trait PartitionOps {
    /// Read the full raw partition table.
    fn scan_partitions(&self) -> HalResult<Vec<MtdPartition>>;

    /// Look up one partition by name.
    fn find_partition(&self, name: &str) -> HalResult<MtdPartition> {
        self.scan_partitions()?
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| HalError::PartitionNotFound(name.to_string()))
    }

    /// Device node for one raw partition.
    fn partition_device(&self, partition: &MtdPartition) -> PathBuf {
        PathBuf::from(format!("/dev/block/mtdblock{}", partition.device_index))
    }

    /// Resolve a volume mount point to the raw block device backing it.
    fn device_for_volume(&self, volume: &str) -> HalResult<PathBuf>;

    /// Restore a sparse-image backup partition onto a data partition,
    /// byte for byte.
    fn restore_sparse_image(&self, backup_device: &Path, data_device: &Path) -> HalResult<()>;
}
