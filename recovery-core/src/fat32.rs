//! Raw FAT32 volume label writer.
//!
//! After a full wipe the freshly formatted media partitions get their label
//! restored by patching the volume-ID entry in the root directory directly
//! on the block device. The root directory is a cluster chain, so the
//! writer walks the FAT until it finds the existing label entry or a free
//! slot at the end of the directory.

use recovery_error::Fat32Error;
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

pub const LABEL_LEN: usize = 11;
const DIR_ENTRY_LEN: usize = 32;
const ATTR_VOLUME_ID: u8 = 0x08;
const ATTR_LONG_NAME: u8 = 0x0F;
/// Cluster numbers at or above this end a chain.
const END_OF_CHAIN: u32 = 0x0FFF_FFF8;

/// Geometry fields of the boot sector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fat32BootSector {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub fat_count: u8,
    pub total_sectors: u32,
    pub sectors_per_fat: u32,
    pub root_cluster: u32,
}

impl Fat32BootSector {
    /// Decode the first sector. Requires the FAT32 system identifier and
    /// the 0x55AA end marker.
    pub fn parse(buf: &[u8]) -> Result<Self, Fat32Error> {
        if buf.len() < 512 {
            return Err(Fat32Error::ShortRead { what: "boot sector" });
        }
        if &buf[0x52..0x52 + 5] != b"FAT32" {
            return Err(Fat32Error::BadSystemId);
        }
        if buf[510] != 0x55 || buf[511] != 0xAA {
            return Err(Fat32Error::BadEndMarker);
        }

        let sector = Self {
            bytes_per_sector: u16::from_le_bytes([buf[11], buf[12]]),
            sectors_per_cluster: buf[13],
            reserved_sectors: u16::from_le_bytes([buf[14], buf[15]]),
            fat_count: buf[16],
            total_sectors: u32::from_le_bytes([buf[32], buf[33], buf[34], buf[35]]),
            sectors_per_fat: u32::from_le_bytes([buf[36], buf[37], buf[38], buf[39]]),
            root_cluster: u32::from_le_bytes([buf[44], buf[45], buf[46], buf[47]]),
        };
        if sector.bytes_per_sector == 0 || sector.sectors_per_cluster == 0 {
            return Err(Fat32Error::BadSystemId);
        }
        // Cluster numbering starts at 2; a root below that cannot exist.
        if sector.root_cluster < 2 {
            return Err(Fat32Error::BadRootCluster(sector.root_cluster));
        }
        Ok(sector)
    }

    pub fn cluster_bytes(&self) -> u64 {
        u64::from(self.bytes_per_sector) * u64::from(self.sectors_per_cluster)
    }

    /// First sector of the data region.
    fn first_data_sector(&self) -> u64 {
        u64::from(self.reserved_sectors)
            + u64::from(self.fat_count) * u64::from(self.sectors_per_fat)
    }

    /// Byte offset of a data cluster. Cluster numbering starts at 2.
    pub fn cluster_offset(&self, cluster: u32) -> u64 {
        let sector = self.first_data_sector()
            + u64::from(cluster - 2) * u64::from(self.sectors_per_cluster);
        sector * u64::from(self.bytes_per_sector)
    }

    /// Byte offset of the FAT entry for `cluster` in the first FAT copy.
    pub fn fat_entry_offset(&self, cluster: u32) -> u64 {
        u64::from(self.reserved_sectors) * u64::from(self.bytes_per_sector)
            + u64::from(cluster) * 4
    }
}

/// Normalise a label to the on-disk form: upper case, truncated to eleven
/// bytes, space padded. An empty name is rejected before any device access.
pub fn format_label(name: &str) -> Result<[u8; LABEL_LEN], Fat32Error> {
    let name = name.trim();
    if name.is_empty() {
        return Err(Fat32Error::EmptyName);
    }
    let mut label = [b' '; LABEL_LEN];
    for (slot, byte) in label.iter_mut().zip(name.bytes()) {
        *slot = byte.to_ascii_uppercase();
    }
    Ok(label)
}

/// Set the volume label of the FAT32 filesystem on `device`.
///
/// Walks the root directory chain; an existing volume-ID entry is
/// overwritten in place, otherwise the label is appended at the first
/// end-of-directory slot. A root directory with neither is reported as
/// [`Fat32Error::NoVolumeEntry`].
pub fn write_volume_label(device: &Path, name: &str) -> Result<(), Fat32Error> {
    let label = format_label(name)?;

    let mut file = OpenOptions::new().read(true).write(true).open(device)?;
    let mut boot = [0u8; 512];
    file.read_exact(&mut boot)
        .map_err(|_| Fat32Error::ShortRead { what: "boot sector" })?;
    let boot = Fat32BootSector::parse(&boot)?;

    let cluster_bytes = boot.cluster_bytes() as usize;
    let mut cluster_buf = vec![0u8; cluster_bytes];
    let max_clusters = boot.total_sectors / u32::from(boot.sectors_per_cluster) + 2;

    let mut cluster = boot.root_cluster;
    for _ in 0..max_clusters {
        let base = boot.cluster_offset(cluster);
        file.seek(SeekFrom::Start(base))?;
        file.read_exact(&mut cluster_buf)
            .map_err(|_| Fat32Error::ShortRead { what: "root directory" })?;

        for (index, entry) in cluster_buf.chunks_exact(DIR_ENTRY_LEN).enumerate() {
            let entry_offset = base + (index * DIR_ENTRY_LEN) as u64;
            if entry[0] == 0x00 {
                // End of directory: append a fresh volume entry.
                let mut fresh = [0u8; DIR_ENTRY_LEN];
                fresh[..LABEL_LEN].copy_from_slice(&label);
                fresh[LABEL_LEN] = ATTR_VOLUME_ID;
                file.seek(SeekFrom::Start(entry_offset))?;
                file.write_all(&fresh)?;
                file.sync_all()?;
                return Ok(());
            }
            let attr = entry[11];
            if attr != ATTR_LONG_NAME && attr & ATTR_VOLUME_ID != 0 {
                file.seek(SeekFrom::Start(entry_offset))?;
                file.write_all(&label)?;
                file.sync_all()?;
                return Ok(());
            }
        }

        // Follow the chain.
        file.seek(SeekFrom::Start(boot.fat_entry_offset(cluster)))?;
        let mut raw = [0u8; 4];
        file.read_exact(&mut raw)
            .map_err(|_| Fat32Error::ShortRead { what: "FAT entry" })?;
        let next = u32::from_le_bytes(raw) & 0x0FFF_FFFF;
        // Entries below 2 are free or reserved; either way the chain ends.
        if next < 2 || next >= END_OF_CHAIN {
            break;
        }
        cluster = next;
    }

    Err(Fat32Error::NoVolumeEntry)
}
