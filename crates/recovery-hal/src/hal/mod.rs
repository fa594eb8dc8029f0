//! HAL trait definitions and implementations.
//!
//! This module defines the capability traits for platform operations and
//! provides both real (LinuxHal) and fake (FakeHal) implementations.

pub mod control_block_ops;
pub mod fake_hal;
pub mod format_ops;
pub mod linux_hal;
pub mod mount_ops;
pub mod partition_ops;
pub mod system_ops;

pub use control_block_ops::ControlBlockOps;
pub use fake_hal::{FakeHal, Operation};
pub use format_ops::FormatOps;
pub use linux_hal::LinuxHal;
pub use mount_ops::MountOps;
pub use partition_ops::{MtdPartition, PartitionOps, VolumeEntry};
pub use system_ops::SystemOps;

/// Complete HAL combining all platform operation traits.
pub trait RecoveryHal:
    MountOps + FormatOps + PartitionOps + ControlBlockOps + SystemOps
{
}

/// Automatically implement RecoveryHal for any type implementing all required traits.
impl<T> RecoveryHal for T where
    T: MountOps + FormatOps + PartitionOps + ControlBlockOps + SystemOps
{
}
