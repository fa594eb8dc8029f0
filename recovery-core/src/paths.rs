//! Well-known file locations used to talk to the main system.
//!
//! The controller communicates with the main system through files on the
//! cache volume: the command file carries arguments in, the log and intent
//! files carry results out. Tests redirect the whole table into a temp
//! directory with [`Paths::under`].

use std::path::{Path, PathBuf};

/// Fallback destination for diagnostics before the log file is available.
pub const TEMPORARY_LOG_FILE: &str = "/tmp/recovery.log";

/// Resolved locations of every file the controller reads or writes.
#[derive(Debug, Clone)]
pub struct Paths {
    /// INPUT: command line for the session, one argument per line.
    pub command_file: PathBuf,
    /// OUTPUT: cumulative log across sessions.
    pub log_file: PathBuf,
    /// OUTPUT: log of the most recent session only.
    pub last_log_file: PathBuf,
    /// OUTPUT: result of the most recent install attempt.
    pub last_install_file: PathBuf,
    /// OUTPUT: intent string handed back to the main system.
    pub intent_file: PathBuf,
    /// OUTPUT: last-used locale, read back when no --locale is given.
    pub locale_file: PathBuf,
    /// OUTPUT: auto-update success marker with the installed path.
    pub flag_file: PathBuf,
    /// Mount point of the volume carrying all of the above.
    pub cache_root: String,
    /// Live log written during this session.
    pub temporary_log_file: PathBuf,
    /// Live install result written during this session.
    pub temporary_install_file: PathBuf,
    /// Staging directory for sideloaded packages.
    pub sideload_staging_dir: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            command_file: PathBuf::from("/cache/recovery/command"),
            log_file: PathBuf::from("/cache/recovery/log"),
            last_log_file: PathBuf::from("/cache/recovery/last_log"),
            last_install_file: PathBuf::from("/cache/recovery/last_install"),
            intent_file: PathBuf::from("/cache/recovery/intent"),
            locale_file: PathBuf::from("/cache/recovery/last_locale"),
            flag_file: PathBuf::from("/cache/recovery/last_flag"),
            cache_root: "/cache".to_string(),
            temporary_log_file: PathBuf::from(TEMPORARY_LOG_FILE),
            temporary_install_file: PathBuf::from("/tmp/last_install"),
            sideload_staging_dir: PathBuf::from("/tmp/sideload"),
        }
    }
}

impl Paths {
    /// Map the whole table under `root`. Used by tests to keep every write
    /// inside a temp directory.
    pub fn under(root: &Path) -> Self {
        let cache = root.join("cache");
        let tmp = root.join("tmp");
        Self {
            command_file: cache.join("recovery/command"),
            log_file: cache.join("recovery/log"),
            last_log_file: cache.join("recovery/last_log"),
            last_install_file: cache.join("recovery/last_install"),
            intent_file: cache.join("recovery/intent"),
            locale_file: cache.join("recovery/last_locale"),
            flag_file: cache.join("recovery/last_flag"),
            cache_root: cache.to_string_lossy().to_string(),
            temporary_log_file: tmp.join("recovery.log"),
            temporary_install_file: tmp.join("last_install"),
            sideload_staging_dir: tmp.join("sideload"),
        }
    }
}
