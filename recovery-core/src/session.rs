//! Session state.
//!
//! Everything the original kept in process-wide globals (locale, the log
//! copy offset, the pending-success flag, the control-block policy) lives in
//! one struct threaded through every call, so finish-up always sees the same
//! state the dispatcher produced.

use crate::cli::RecoveryOptions;
use crate::config::RecoveryConfig;
use crate::installer::InstallStatus;
use crate::paths::Paths;
use std::path::PathBuf;

#[derive(Debug)]
pub struct RecoverySession {
    pub options: RecoveryOptions,
    pub config: RecoveryConfig,
    pub paths: Paths,
    /// Aggregated outcome of the dispatched action.
    pub status: InstallStatus,
    /// How much of the temporary log has been flushed to the cumulative
    /// log. Reset to zero whenever the cache volume is erased.
    pub tmplog_offset: u64,
    /// Active locale, saved on finish for the next session.
    pub locale: Option<String>,
    /// Set when an update install succeeded; finish-up records the path in
    /// the success marker file.
    pub update_completed: Option<PathBuf>,
    /// Whether finish-up zeroes the control block. Cleared on error for
    /// boards configured to stay in maintenance mode.
    pub clear_control_block: bool,
}

impl RecoverySession {
    pub fn new(options: RecoveryOptions, config: RecoveryConfig, paths: Paths) -> Self {
        let locale = options.locale.clone();
        Self {
            options,
            config,
            paths,
            status: InstallStatus::Success,
            tmplog_offset: 0,
            locale,
            update_completed: None,
            clear_control_block: true,
        }
    }
}
