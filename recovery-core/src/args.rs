//! Three-tier argument resolution.
//!
//! Arguments come from, in decreasing precedence: the live command line, the
//! control block (one per line after the `recovery` sentinel), and the
//! command file (one per line). Whatever was resolved is written straight
//! back into the control block, so a power loss at any later point reboots
//! into the same action until finish-up clears it.

use crate::bootmsg::{BootloaderMessage, ENCODED_LEN, MAX_ARGS, MAX_ARG_LENGTH};
use crate::paths::Paths;
use recovery_hal::RecoveryHal;
use std::fs;

/// Resolve the effective arguments for this session and persist the
/// restart checkpoint. Index 0 of the result is the program name.
pub fn get_args(hal: &dyn RecoveryHal, paths: &Paths, live: Vec<String>) -> Vec<String> {
    let mut boot = read_control_block(hal);
    if boot.command_present() {
        log::info!("Boot command: {}", boot.command_str());
    }
    if boot.status_present() {
        log::info!("Boot status: {}", boot.status_str());
    }

    let mut args = live;
    if args.is_empty() {
        args.push("recovery".to_string());
    }

    // No explicit arguments: look in the control block.
    if args.len() <= 1 {
        match boot.parse_recovery_args() {
            Some(parsed) => {
                args = parsed;
                log::info!("Got arguments from boot message");
            }
            None if boot.recovery_present() => {
                let head: String = boot.recovery_str().chars().take(20).collect();
                log::warn!("Bad boot message {:?}", head);
            }
            None => {}
        }
    }

    // Still nothing: try the command file.
    if args.len() <= 1 {
        if let Some(lines) = read_command_file(hal, paths) {
            let program = args[0].clone();
            args = std::iter::once(program).chain(lines).collect();
            log::info!("Got arguments from {}", paths.command_file.display());
        }
    }

    // Write the arguments back into the control block: from here on, every
    // reboot resumes this same action until finish-up clears it.
    boot.set_command("boot-recovery");
    boot.set_recovery_args(&args[1..]);
    if let Err(e) = hal.write_control_block(&boot.encode()) {
        log::warn!("failed to persist control block: {}", e);
    }

    args
}

/// Rewrite the control block to resume a menu-driven install after a power
/// loss. `extra_arg` is the full option line, e.g.
/// `--update_package=/mnt/external_sd/update.zip`.
pub fn write_install_checkpoint(hal: &dyn RecoveryHal, extra_arg: Option<&str>) {
    let mut boot = BootloaderMessage::zeroed();
    boot.set_command("boot-recovery");
    match extra_arg {
        Some(arg) => boot.set_recovery_args(&[arg]),
        None => boot.set_recovery_args::<&str>(&[]),
    }
    if let Err(e) = hal.write_control_block(&boot.encode()) {
        log::warn!("failed to persist install checkpoint: {}", e);
    }
}

/// Read the control block, treating every failure as an empty block. A
/// device that cannot read its slot still has to reach a usable menu.
fn read_control_block(hal: &dyn RecoveryHal) -> BootloaderMessage {
    let bytes = match hal.read_control_block(ENCODED_LEN) {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("cannot read control block ({}); assuming empty", e);
            return BootloaderMessage::zeroed();
        }
    };
    BootloaderMessage::decode(&bytes).unwrap_or_else(|e| {
        log::warn!("cannot decode control block ({}); assuming empty", e);
        BootloaderMessage::zeroed()
    })
}

/// Read the command file, mounting its volume on demand. Returns one entry
/// per non-empty line, stripped of trailing CR, capped at the shared
/// argument limits.
fn read_command_file(hal: &dyn RecoveryHal, paths: &Paths) -> Option<Vec<String>> {
    let path = &paths.command_file;
    if let Err(e) = hal.ensure_mounted(&path.to_string_lossy()) {
        log::warn!("Can't mount {} ({})", path.display(), e);
        return None;
    }
    let content = fs::read_to_string(path).ok()?;

    let mut lines = Vec::new();
    for line in content.lines() {
        if lines.len() + 1 >= MAX_ARGS {
            break;
        }
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        let mut line = line.to_string();
        if line.len() > MAX_ARG_LENGTH {
            let mut cut = MAX_ARG_LENGTH;
            while !line.is_char_boundary(cut) {
                cut -= 1;
            }
            line.truncate(cut);
        }
        lines.push(line);
    }
    Some(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use recovery_hal::{ControlBlockOps, FakeHal};
    use tempfile::TempDir;

    fn setup() -> (FakeHal, Paths, TempDir) {
        let dir = TempDir::new().unwrap();
        let paths = Paths::under(dir.path());
        let hal = FakeHal::new();
        hal.add_volume(paths.cache_root.clone(), "/dev/block/mtdblock4");
        (hal, paths, dir)
    }

    fn seed_control_block(hal: &FakeHal, args: &[&str]) {
        let mut boot = BootloaderMessage::zeroed();
        boot.set_command("boot-recovery");
        boot.set_recovery_args(args);
        hal.write_control_block(&boot.encode()).unwrap();
    }

    fn stored_message(hal: &FakeHal) -> BootloaderMessage {
        BootloaderMessage::decode(&hal.control_block()).unwrap()
    }

    #[test]
    fn live_arguments_win_over_everything() {
        let (hal, paths, _dir) = setup();
        seed_control_block(&hal, &["--wipe_data"]);
        std::fs::create_dir_all(paths.command_file.parent().unwrap()).unwrap();
        std::fs::write(&paths.command_file, "--wipe_cache\n").unwrap();

        let live = vec!["recovery".to_string(), "--just_exit".to_string()];
        let args = get_args(&hal, &paths, live.clone());
        assert_eq!(args, live);
    }

    #[test]
    fn control_block_arguments_used_when_no_live_args() {
        let (hal, paths, _dir) = setup();
        seed_control_block(&hal, &["--wipe_data", "--wipe_cache"]);

        let args = get_args(&hal, &paths, vec!["recovery".to_string()]);
        assert_eq!(args[1..], ["--wipe_data", "--wipe_cache"]);
    }

    #[test]
    fn command_file_is_the_last_resort() {
        let (hal, paths, _dir) = setup();
        std::fs::create_dir_all(paths.command_file.parent().unwrap()).unwrap();
        std::fs::write(
            &paths.command_file,
            "--update_package=/cache/a.zip\r\n--wipe_cache\n",
        )
        .unwrap();

        let args = get_args(&hal, &paths, vec!["recovery".to_string()]);
        assert_eq!(args[0], "recovery");
        assert_eq!(args[1..], ["--update_package=/cache/a.zip", "--wipe_cache"]);
    }

    #[test]
    fn malformed_control_block_is_a_warning_not_an_error() {
        let (hal, paths, _dir) = setup();
        // A recovery field whose first line is not the sentinel.
        let mut raw = vec![0u8; ENCODED_LEN];
        raw[64..64 + 8].copy_from_slice(b"restore\n");
        hal.write_control_block(&raw).unwrap();

        let args = get_args(&hal, &paths, vec!["recovery".to_string()]);
        assert_eq!(args, vec!["recovery".to_string()]);
    }

    #[test]
    fn unreadable_control_block_behaves_as_empty() {
        let (hal, paths, _dir) = setup();
        hal.fail_control_block_read();

        let args = get_args(&hal, &paths, vec!["recovery".to_string()]);
        assert_eq!(args, vec!["recovery".to_string()]);
    }

    #[test]
    fn resolution_persists_the_restart_checkpoint() {
        let (hal, paths, _dir) = setup();
        let live = vec![
            "recovery".to_string(),
            "--wipe_data".to_string(),
            "--locale=en_GB".to_string(),
        ];
        get_args(&hal, &paths, live);

        let boot = stored_message(&hal);
        assert_eq!(boot.command_str(), "boot-recovery");
        let parsed = boot.parse_recovery_args().unwrap();
        assert_eq!(parsed[1..], ["--wipe_data", "--locale=en_GB"]);
    }

    #[test]
    fn install_checkpoint_round_trips() {
        let (hal, _paths, _dir) = setup();
        write_install_checkpoint(&hal, Some("--update_package=/mnt/external_sd/update.zip"));

        let boot = stored_message(&hal);
        assert_eq!(boot.command_str(), "boot-recovery");
        assert_eq!(
            boot.parse_recovery_args().unwrap()[1..],
            ["--update_package=/mnt/external_sd/update.zip"]
        );
    }
}
