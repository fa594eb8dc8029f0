use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type HalResult<T> = Result<T, HalError>;

/// Failures surfaced by platform operations (mount, format, partition table,
/// control-block storage). These are always resumable: callers convert them
/// into a session status and keep going.
#[derive(Error, Debug)]
pub enum HalError {
    #[error("Mount failed for {0}")]
    MountFailed(String),

    #[error("Unmount failed for {0}")]
    UnmountFailed(String),

    #[error("Format failed for {0}")]
    FormatFailed(String),

    #[error("Partition not found: {0}")]
    PartitionNotFound(String),

    #[error("No device known for volume {0}")]
    UnknownVolume(String),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    #[error("Command failed: {program} (exit={code:?}): {stderr}")]
    CommandFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Control block storage unavailable: {0}")]
    ControlBlock(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("nix errno: {0}")]
    Nix(#[from] nix::errno::Errno),

    #[error("{0}")]
    Other(String),
}

/// Ext4 superblock reader failures. One variant per cause so callers can
/// tell a malformed filesystem from a truncated device.
#[derive(Error, Debug)]
pub enum Ext4Error {
    #[error("superblock magic incorrect")]
    BadMagic,

    #[error("filesystem state not valid")]
    NotValid,

    #[error("short read of {what}")]
    ShortRead { what: &'static str },

    #[error("implausible superblock geometry: {0}")]
    Geometry(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// FAT32 label writer failures, mirroring the distinct abort reasons of the
/// boot-sector validation and the cluster-chain walk.
#[derive(Error, Debug)]
pub enum Fat32Error {
    #[error("volume name is empty")]
    EmptyName,

    #[error("bad system id in boot sector")]
    BadSystemId,

    #[error("bad end marker in boot sector")]
    BadEndMarker,

    #[error("root cluster {0} out of range")]
    BadRootCluster(u32),

    #[error("short read of {what}")]
    ShortRead { what: &'static str },

    #[error("no volume entry found")]
    NoVolumeEntry,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Sideload staging-area refusals. The copy never starts when one of these
/// fires.
#[derive(Error, Debug)]
pub enum StagingError {
    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("{path} has mode {mode:o}, expected 700")]
    BadMode { path: PathBuf, mode: u32 },

    #[error("{path} owned by unexpected uid {uid}")]
    BadOwner { path: PathBuf, uid: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
