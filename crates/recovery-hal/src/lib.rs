//! Recovery platform abstraction layer.
//!
//! Everything the controller needs from the machine goes through the traits
//! in [`hal`]: mounting, formatting, the partition table, the persisted
//! control-block slot, and a couple of whole-system calls. `LinuxHal` is the
//! real backend; `FakeHal` records operations for CI-safe tests.

pub mod hal;

pub use hal::{
    ControlBlockOps, FakeHal, FormatOps, LinuxHal, MountOps, MtdPartition, Operation,
    PartitionOps, RecoveryHal, SystemOps, VolumeEntry,
};
pub use recovery_error::{HalError, HalResult};
