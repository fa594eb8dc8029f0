//! Raw ext4 superblock reader.
//!
//! The full-wipe path has to size a freshly formatted filesystem before
//! handing it to resize2fs, and mounting it just to ask is not an option on
//! a volume that may be mid-repair. This reads the superblock straight off
//! the block device and derives the geometry from it.

use recovery_error::Ext4Error;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// The superblock lives at this byte offset on the device.
pub const SUPERBLOCK_OFFSET: u64 = 1024;
pub const SUPERBLOCK_LEN: usize = 1024;

const MAGIC: u16 = 0xEF53;
/// Cleanly-unmounted bit of `s_state`.
const STATE_VALID: u16 = 0x0001;
/// On-disk size of one block group descriptor.
const DESC_SIZE: u64 = 32;
/// A descriptor table larger than this is garbage, not a filesystem.
const MAX_DESC_TABLE_BYTES: u64 = 1 << 28;

/// Fields of the superblock the controller cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ext4Superblock {
    pub blocks_count: u64,
    pub first_data_block: u32,
    pub block_size: u64,
    pub blocks_per_group: u32,
    pub inodes_per_group: u32,
    pub inode_size: u16,
    pub state: u16,
    pub volume_name: String,
}

impl Ext4Superblock {
    /// Decode the 1024-byte superblock region.
    pub fn parse(buf: &[u8]) -> Result<Self, Ext4Error> {
        if buf.len() < SUPERBLOCK_LEN {
            return Err(Ext4Error::ShortRead { what: "superblock" });
        }
        if le16(buf, 56) != MAGIC {
            return Err(Ext4Error::BadMagic);
        }

        let log_block_size = le32(buf, 24);
        // 1 KiB through 64 KiB blocks; anything else is garbage.
        if log_block_size > 6 {
            return Err(Ext4Error::Geometry(format!(
                "log block size {}",
                log_block_size
            )));
        }
        let blocks_per_group = le32(buf, 32);
        if blocks_per_group == 0 {
            return Err(Ext4Error::Geometry("zero blocks per group".to_string()));
        }

        let mut volume_name = &buf[120..136];
        if let Some(nul) = volume_name.iter().position(|&b| b == 0) {
            volume_name = &volume_name[..nul];
        }

        let sb = Self {
            blocks_count: u64::from(le32(buf, 4)),
            first_data_block: le32(buf, 20),
            block_size: 1024u64 << log_block_size,
            blocks_per_group,
            inodes_per_group: le32(buf, 40),
            inode_size: le16(buf, 88),
            state: le16(buf, 58),
            volume_name: String::from_utf8_lossy(volume_name).into_owned(),
        };
        if sb.blocks_count <= u64::from(sb.first_data_block) {
            return Err(Ext4Error::Geometry(format!(
                "{} blocks with first data block {}",
                sb.blocks_count, sb.first_data_block
            )));
        }
        if sb.block_size * sb.descriptor_blocks() > MAX_DESC_TABLE_BYTES {
            return Err(Ext4Error::Geometry(format!(
                "descriptor table spans {} blocks",
                sb.descriptor_blocks()
            )));
        }
        Ok(sb)
    }

    /// Whether the filesystem was unmounted cleanly.
    pub fn is_clean(&self) -> bool {
        self.state & STATE_VALID != 0
    }

    pub fn group_count(&self) -> u64 {
        let data_blocks = self.blocks_count - u64::from(self.first_data_block);
        data_blocks.div_ceil(u64::from(self.blocks_per_group))
    }

    /// Blocks occupied by the group descriptor table.
    pub fn descriptor_blocks(&self) -> u64 {
        (self.group_count() * DESC_SIZE).div_ceil(self.block_size)
    }

    /// Byte offset of the group descriptor table.
    pub fn descriptor_table_offset(&self) -> u64 {
        self.block_size * (u64::from(self.first_data_block) + 1)
    }

    /// Total filesystem length in bytes.
    pub fn length_bytes(&self) -> u64 {
        self.blocks_count * self.block_size
    }
}

/// Read and decode the superblock from `device`.
pub fn read_superblock(device: &Path) -> Result<Ext4Superblock, Ext4Error> {
    let mut file = File::open(device)?;
    file.seek(SeekFrom::Start(SUPERBLOCK_OFFSET))?;
    let mut buf = [0u8; SUPERBLOCK_LEN];
    file.read_exact(&mut buf)
        .map_err(|_| Ext4Error::ShortRead { what: "superblock" })?;
    Ext4Superblock::parse(&buf)
}

/// Read the superblock and the full group descriptor table off any seekable
/// device, requiring a cleanly-unmounted filesystem. A table that cannot be
/// read in full fails the probe. Returns the superblock and the filesystem
/// length in bytes.
pub fn read_filesystem<R: Read + Seek>(device: &mut R) -> Result<(Ext4Superblock, u64), Ext4Error> {
    device.seek(SeekFrom::Start(SUPERBLOCK_OFFSET))?;
    let mut buf = [0u8; SUPERBLOCK_LEN];
    device
        .read_exact(&mut buf)
        .map_err(|_| Ext4Error::ShortRead { what: "superblock" })?;
    let sb = Ext4Superblock::parse(&buf)?;
    if !sb.is_clean() {
        return Err(Ext4Error::NotValid);
    }

    device.seek(SeekFrom::Start(sb.descriptor_table_offset()))?;
    let mut table = vec![0u8; (sb.block_size * sb.descriptor_blocks()) as usize];
    device
        .read_exact(&mut table)
        .map_err(|_| Ext4Error::ShortRead {
            what: "descriptor table",
        })?;
    let length = sb.length_bytes();
    Ok((sb, length))
}

/// [`read_filesystem`] against a block device path. Used to gate resizing
/// after a wipe.
pub fn probe_device(device: &Path) -> Result<(Ext4Superblock, u64), Ext4Error> {
    let mut file = File::open(device)?;
    read_filesystem(&mut file)
}

fn le16(buf: &[u8], off: usize) -> u16 {
    u16::from_le_bytes([buf[off], buf[off + 1]])
}

fn le32(buf: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}
