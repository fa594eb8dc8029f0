//! Control-block storage trait.

use recovery_error::HalResult;

/// Access to the fixed-size, reboot-surviving control-block slot.
///
/// The slot's encoding is owned by the core; this trait only moves raw bytes
/// to and from the reserved storage region.
pub trait ControlBlockOps {
    /// Read `len` bytes from the start of the control-block slot.
    fn read_control_block(&self, len: usize) -> HalResult<Vec<u8>>;

    /// Replace the start of the control-block slot with `bytes`.
    fn write_control_block(&self, bytes: &[u8]) -> HalResult<()>;
}
