//! Finish-up: hand results back to the main system and disarm the restart
//! checkpoint.
//!
//! Every step is individually best-effort and safe to repeat, so the
//! sequence can run again after a mid-finish power loss without losing
//! anything: log copies are incremental via the session offset, the
//! control-block clear and command-file unlink are naturally idempotent.

use crate::bootmsg::BootloaderMessage;
use crate::session::RecoverySession;
use nix::unistd::{chown, Gid, Uid};
use recovery_hal::RecoveryHal;
use std::fs;
use std::io::{self, Read, Seek, SeekFrom};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Owner for the persisted logs, so the main system can read them.
const LOG_UID: u32 = 1000;
const LOG_GID: u32 = 1000;

/// Copy `source` onto `destination`, creating parent directories.
///
/// With `append` set, only bytes past the session's log offset are copied
/// and the offset advances, so repeated calls append each portion of the
/// live log exactly once.
pub fn copy_log_file(
    session: &mut RecoverySession,
    source: &Path,
    destination: &Path,
    append: bool,
) {
    let mut src = match fs::File::open(source) {
        Ok(src) => src,
        // Nothing logged yet; nothing to copy.
        Err(_) => return,
    };

    let result = (|| -> io::Result<()> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut dst = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(destination)?;
        if append {
            src.seek(SeekFrom::Start(session.tmplog_offset))?;
        }
        io::copy(&mut src, &mut dst)?;
        if append {
            session.tmplog_offset = src.stream_position()?;
        }
        Ok(())
    })();
    if let Err(e) = result {
        log::warn!("Can't copy {} to {}: {}", source.display(), destination.display(), e);
    }
}

/// Close out the session: publish the intent and logs, persist the locale,
/// record a completed update, and disarm the restart checkpoint.
pub fn finish_recovery(hal: &dyn RecoveryHal, session: &mut RecoverySession) {
    let paths = session.paths.clone();

    if let Err(e) = hal.ensure_mounted(&paths.cache_root) {
        log::warn!("Can't mount {} for finish ({})", paths.cache_root, e);
    }

    if let Some(intent) = session.options.send_intent.clone() {
        log::info!("Sending intent {:?}", intent);
        write_file(&paths.intent_file, intent.as_bytes());
    }

    if let Some(locale) = session.locale.clone() {
        log::info!("Saving locale {:?}", locale);
        write_file(&paths.locale_file, locale.as_bytes());
    }

    // Cumulative log grows by this session's portion; the last-session log
    // and install result are full snapshots.
    copy_log_file(session, &paths.temporary_log_file, &paths.log_file, true);
    copy_log_file(session, &paths.temporary_log_file, &paths.last_log_file, false);
    copy_log_file(
        session,
        &paths.temporary_install_file,
        &paths.last_install_file,
        false,
    );
    set_mode(&paths.log_file, 0o600);
    set_owner(&paths.log_file);
    set_mode(&paths.last_log_file, 0o640);
    set_owner(&paths.last_log_file);
    set_mode(&paths.last_install_file, 0o644);

    if let Some(package) = session.update_completed.clone() {
        write_file(
            &paths.flag_file,
            format!("success$path={}", package.display()).as_bytes(),
        );
    }

    if session.clear_control_block {
        if let Err(e) = hal.write_control_block(&BootloaderMessage::zeroed().encode()) {
            log::warn!("failed to clear control block: {}", e);
        }
    } else {
        log::info!("leaving control block armed");
    }

    match fs::remove_file(&paths.command_file) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => log::warn!(
            "Can't unlink {}: {}",
            paths.command_file.display(),
            e
        ),
    }

    if let Err(e) = hal.ensure_unmounted(&paths.cache_root) {
        log::warn!("Can't unmount {} ({})", paths.cache_root, e);
    }
    if let Err(e) = hal.sync() {
        log::warn!("sync failed: {}", e);
    }
}

/// Read back the locale persisted by a previous session.
pub fn load_saved_locale(paths: &crate::paths::Paths) -> Option<String> {
    let mut buf = String::new();
    fs::File::open(&paths.locale_file)
        .ok()?
        .read_to_string(&mut buf)
        .ok()?;
    let locale = buf.trim();
    if locale.is_empty() {
        None
    } else {
        Some(locale.to_string())
    }
}

fn write_file(path: &Path, content: &[u8]) {
    let result = (|| -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)
    })();
    if let Err(e) = result {
        log::warn!("Can't write {}: {}", path.display(), e);
    }
}

fn set_mode(path: &Path, mode: u32) {
    if let Err(e) = fs::set_permissions(path, fs::Permissions::from_mode(mode)) {
        log::debug!("chmod {} failed: {}", path.display(), e);
    }
}

fn set_owner(path: &Path) {
    let result = chown(
        path,
        Some(Uid::from_raw(LOG_UID)),
        Some(Gid::from_raw(LOG_GID)),
    );
    // Fails without privileges; the logs are still delivered.
    if let Err(e) = result {
        log::debug!("chown {} failed: {}", path.display(), e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::RecoveryOptions;
    use crate::config::RecoveryConfig;
    use crate::paths::Paths;
    use recovery_hal::{ControlBlockOps, FakeHal, Operation};
    use tempfile::TempDir;

    fn setup() -> (FakeHal, RecoverySession, TempDir) {
        let dir = TempDir::new().unwrap();
        let paths = Paths::under(dir.path());
        let hal = FakeHal::new();
        hal.add_volume(paths.cache_root.clone(), "/dev/block/mtdblock4");
        let session = RecoverySession::new(
            RecoveryOptions::default(),
            RecoveryConfig::default(),
            paths,
        );
        (hal, session, dir)
    }

    fn append_temp_log(session: &RecoverySession, text: &str) {
        fs::create_dir_all(session.paths.temporary_log_file.parent().unwrap()).unwrap();
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&session.paths.temporary_log_file)
            .unwrap();
        io::Write::write_all(&mut file, text.as_bytes()).unwrap();
    }

    #[test]
    fn logs_accumulate_without_duplication() {
        let (hal, mut session, _dir) = setup();

        append_temp_log(&session, "first pass\n");
        finish_recovery(&hal, &mut session);
        append_temp_log(&session, "second pass\n");
        finish_recovery(&hal, &mut session);

        let cumulative = fs::read_to_string(&session.paths.log_file).unwrap();
        assert_eq!(cumulative, "first pass\nsecond pass\n");
        // The last-session log is always the full snapshot.
        let last = fs::read_to_string(&session.paths.last_log_file).unwrap();
        assert_eq!(last, "first pass\nsecond pass\n");
    }

    #[test]
    fn clears_the_control_block_by_default() {
        let (hal, mut session, _dir) = setup();
        hal.write_control_block(b"boot-recovery").unwrap();

        finish_recovery(&hal, &mut session);

        let block = hal.read_control_block(crate::bootmsg::ENCODED_LEN).unwrap();
        let boot = BootloaderMessage::decode(&block).unwrap();
        assert!(boot.is_clear());
    }

    #[test]
    fn keeps_the_control_block_when_told_to() {
        let (hal, mut session, _dir) = setup();
        hal.write_control_block(b"boot-recovery").unwrap();
        hal.clear();
        session.clear_control_block = false;

        finish_recovery(&hal, &mut session);

        assert!(!hal.has_operation(|op| matches!(op, Operation::WriteControlBlock)));
        assert_eq!(&hal.control_block()[..13], b"boot-recovery");
    }

    #[test]
    fn removes_the_command_file_and_tolerates_its_absence() {
        let (hal, mut session, _dir) = setup();
        fs::create_dir_all(session.paths.command_file.parent().unwrap()).unwrap();
        fs::write(&session.paths.command_file, "--wipe_cache\n").unwrap();

        finish_recovery(&hal, &mut session);
        assert!(!session.paths.command_file.exists());

        // Second run with no command file is fine.
        finish_recovery(&hal, &mut session);
    }

    #[test]
    fn publishes_intent_and_locale() {
        let (hal, mut session, _dir) = setup();
        session.options.send_intent = Some("all done".to_string());
        session.locale = Some("en_GB".to_string());

        finish_recovery(&hal, &mut session);

        assert_eq!(
            fs::read_to_string(&session.paths.intent_file).unwrap(),
            "all done"
        );
        assert_eq!(load_saved_locale(&session.paths).as_deref(), Some("en_GB"));
    }

    #[test]
    fn records_a_completed_update() {
        let (hal, mut session, _dir) = setup();
        session.update_completed = Some("/mnt/external_sd/update.img".into());

        finish_recovery(&hal, &mut session);

        assert_eq!(
            fs::read_to_string(&session.paths.flag_file).unwrap(),
            "success$path=/mnt/external_sd/update.img"
        );
    }

    #[test]
    fn finish_unmounts_cache_and_syncs() {
        let (hal, mut session, _dir) = setup();
        finish_recovery(&hal, &mut session);

        let cache = session.paths.cache_root.clone();
        assert!(hal.has_operation(
            |op| matches!(op, Operation::Unmount { volume } if *volume == cache)
        ));
        assert!(hal.has_operation(|op| matches!(op, Operation::Sync)));
    }
}
