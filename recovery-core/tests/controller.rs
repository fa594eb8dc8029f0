//! End-to-end controller scenarios over the fake HAL and surfaces.

use recovery_core::bootmsg::{BootloaderMessage, ENCODED_LEN};
use recovery_core::config::RecoveryConfig;
use recovery_core::controller::Recovery;
use recovery_core::fakes::{FakeInstaller, FakeUi, InstallCall, ScriptedDevice, KEY_DOWN, KEY_ENTER};
use recovery_core::paths::Paths;
use recovery_core::InstallStatus;
use recovery_hal::{ControlBlockOps, FakeHal, Operation};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

struct Fixture {
    hal: FakeHal,
    ui: FakeUi,
    device: ScriptedDevice,
    installer: FakeInstaller,
    config: RecoveryConfig,
    paths: Paths,
    _dir: TempDir,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let paths = Paths::under(dir.path());
    let hal = FakeHal::new();
    hal.add_volume(paths.cache_root.clone(), "/dev/block/mtdblock4");
    hal.add_volume("/data", "/dev/block/mtdblock5");
    Fixture {
        hal,
        ui: FakeUi::new(),
        device: ScriptedDevice::main_menu(),
        installer: FakeInstaller::new(),
        config: RecoveryConfig::default(),
        paths,
        _dir: dir,
    }
}

fn args(list: &[&str]) -> Vec<String> {
    std::iter::once("recovery")
        .chain(list.iter().copied())
        .map(String::from)
        .collect()
}

fn run(fx: &mut Fixture, list: &[&str]) -> recovery_core::RecoverySession {
    let mut recovery = Recovery::new(&fx.hal, &mut fx.ui, &fx.device, &fx.installer);
    recovery.run(args(list), fx.config.clone(), fx.paths.clone())
}

fn seed_control_block(hal: &FakeHal, block_args: &[&str]) {
    let mut boot = BootloaderMessage::zeroed();
    boot.set_command("boot-recovery");
    boot.set_recovery_args(block_args);
    hal.write_control_block(&boot.encode()).unwrap();
}

fn control_block(hal: &FakeHal) -> BootloaderMessage {
    BootloaderMessage::decode(&hal.read_control_block(ENCODED_LEN).unwrap()).unwrap()
}

#[test]
fn wipe_resumed_from_the_control_block() {
    let mut fx = fixture();
    seed_control_block(&fx.hal, &["--wipe_data"]);

    let session = run(&mut fx, &[]);

    assert_eq!(session.status, InstallStatus::Success);
    assert!(fx
        .hal
        .has_operation(|op| matches!(op, Operation::Format { volume } if volume == "/data")));
    let cache = fx.paths.cache_root.clone();
    assert!(fx
        .hal
        .has_operation(|op| matches!(op, Operation::Format { volume } if *volume == cache)));
    // The checkpoint is disarmed once everything succeeded.
    assert!(control_block(&fx.hal).is_clear());
}

#[test]
fn package_install_success_is_recorded_for_the_main_system() {
    let mut fx = fixture();

    let session = run(&mut fx, &["--update_package=CACHE:update.zip"]);

    assert_eq!(session.status, InstallStatus::Success);
    assert_eq!(
        fx.installer.calls(),
        vec![InstallCall::Package("/cache/update.zip".into())]
    );
    assert_eq!(
        fs::read_to_string(&fx.paths.flag_file).unwrap(),
        "success$path=/cache/update.zip"
    );
}

#[test]
fn installer_requested_cache_wipe_is_honoured() {
    let mut fx = fixture();
    fx.installer = FakeInstaller::new().requesting_cache_wipe();

    run(&mut fx, &["--update_package=/cache/update.zip"]);

    let cache = fx.paths.cache_root.clone();
    assert!(fx
        .hal
        .has_operation(|op| matches!(op, Operation::Format { volume } if *volume == cache)));
}

#[test]
fn failed_install_keeps_maintenance_mode_armed_when_configured() {
    let mut fx = fixture();
    fx.config.keep_control_block_on_error = true;
    fx.installer.script_status(InstallStatus::Error);

    let session = run(&mut fx, &["--update_package=/cache/update.zip"]);

    assert_eq!(session.status, InstallStatus::Error);
    assert!(fx
        .ui
        .backgrounds
        .contains(&recovery_core::ui::BackgroundIcon::Error));
    // Still armed: the next boot comes straight back here.
    let boot = control_block(&fx.hal);
    assert_eq!(boot.command_str(), "boot-recovery");
    assert!(!boot.is_clear());
}

#[test]
fn failed_install_disarms_by_default() {
    let mut fx = fixture();
    fx.installer.script_status(InstallStatus::Error);

    let session = run(&mut fx, &["--update_package=/cache/update.zip"]);

    assert_eq!(session.status, InstallStatus::Error);
    assert!(control_block(&fx.hal).is_clear());
}

#[test]
fn no_command_falls_through_to_the_menu() {
    let mut fx = fixture();

    // Empty key script: the menu times out unattended and defaults to the
    // reboot item.
    let session = run(&mut fx, &[]);

    assert_eq!(session.status, InstallStatus::None);
    assert!(fx
        .ui
        .backgrounds
        .contains(&recovery_core::ui::BackgroundIcon::NoCommand));
    assert!(fx.hal.has_operation(|op| matches!(op, Operation::Sync)));
}

#[test]
fn just_exit_skips_the_menu() {
    let mut fx = fixture();

    let session = run(&mut fx, &["--just_exit"]);

    assert_eq!(session.status, InstallStatus::Success);
    assert!(!fx
        .ui
        .backgrounds
        .contains(&recovery_core::ui::BackgroundIcon::NoCommand));
}

#[test]
fn unmountable_cache_is_reformatted() {
    let mut fx = fixture();
    fx.hal.fail_mount(fx.paths.cache_root.clone());

    run(&mut fx, &["--just_exit"]);

    let cache = fx.paths.cache_root.clone();
    assert!(fx
        .hal
        .has_operation(|op| matches!(op, Operation::Format { volume } if *volume == cache)));
}

#[test]
fn menu_wipe_requires_the_buried_confirmation() {
    let mut fx = fixture();
    // Main menu: down to item 5 (wipe data), invoke. Confirmation menu:
    // down to the single Yes at index 7, invoke. Back at the main menu,
    // invoke item 0 to reboot.
    fx.ui.script_keys(
        std::iter::repeat(Some(KEY_DOWN))
            .take(5)
            .chain([Some(KEY_ENTER)])
            .chain(std::iter::repeat(Some(KEY_DOWN)).take(7))
            .chain([Some(KEY_ENTER)])
            .chain([Some(KEY_ENTER)]),
    );

    let session = run(&mut fx, &["--show_text"]);

    assert_eq!(fx.device.wipe_calls(), 1);
    assert!(fx
        .hal
        .has_operation(|op| matches!(op, Operation::Format { volume } if volume == "/data")));
    assert_eq!(session.status, InstallStatus::Success);
}

#[test]
fn menu_wipe_backs_out_on_any_no() {
    let mut fx = fixture();
    // Pick wipe data, then confirm with index 3, which is one of the No
    // entries.
    fx.ui.script_keys(
        std::iter::repeat(Some(KEY_DOWN))
            .take(5)
            .chain([Some(KEY_ENTER)])
            .chain(std::iter::repeat(Some(KEY_DOWN)).take(3))
            .chain([Some(KEY_ENTER)])
            .chain([Some(KEY_ENTER)]),
    );

    run(&mut fx, &["--show_text"]);

    assert_eq!(fx.device.wipe_calls(), 0);
    assert!(!fx
        .hal
        .has_operation(|op| matches!(op, Operation::Format { volume } if volume == "/data")));
}

#[test]
fn menu_install_stages_the_package_from_external_storage() {
    let mut fx = fixture();
    let external = fx._dir.path().join("external_sd");
    fs::create_dir_all(&external).unwrap();
    fs::write(external.join("update.zip"), b"payload").unwrap();
    fx.config.external_storage = external.to_string_lossy().to_string();
    fx.hal
        .add_volume(fx.config.external_storage.clone(), "/dev/block/mmcblk0p1");

    // Item 1 is "apply update from external storage"; the browser shows
    // ["../", "update.zip"]. After the install succeeds with text visible,
    // reboot from the main menu.
    fx.ui.script_keys([
        Some(KEY_DOWN),
        Some(KEY_ENTER),
        Some(KEY_DOWN),
        Some(KEY_ENTER),
        Some(KEY_ENTER),
    ]);

    let session = run(&mut fx, &["--show_text"]);

    let staged = fx.paths.sideload_staging_dir.join("package.zip");
    assert_eq!(fx.installer.calls(), vec![InstallCall::Package(staged.clone())]);
    // The staged copy is removed after the install.
    assert!(!staged.exists());
    assert_eq!(
        session.update_completed.as_deref(),
        Some(external.join("update.zip").as_path())
    );
}

#[test]
fn auto_update_image_is_discovered_on_storage() {
    let mut fx = fixture();
    let external = fx._dir.path().join("external_sd");
    fs::create_dir_all(external.join("FirmwareUpdate")).unwrap();
    fs::write(external.join("FirmwareUpdate/auto_update.tag"), b"").unwrap();
    fs::write(external.join("FirmwareUpdate/update.img"), b"img").unwrap();
    fx.config.external_storage = external.to_string_lossy().to_string();
    fx.config.internal_storage = None;
    fx.hal
        .add_volume(fx.config.external_storage.clone(), "/dev/block/mmcblk0p1");

    let session = run(&mut fx, &[]);

    assert_eq!(session.status, InstallStatus::Success);
    let image = external.join("FirmwareUpdate/update.img");
    assert_eq!(fx.installer.calls(), vec![InstallCall::Image(image.clone())]);
    assert_eq!(
        fs::read_to_string(&fx.paths.flag_file).unwrap(),
        format!("success$path={}", image.display())
    );
}

#[test]
fn system_recovery_restores_from_the_backup_partition() {
    let mut fx = fixture();
    fx.hal.add_partition("system", 3);
    fx.hal.add_partition("backup", 9);

    // Item 7 is "recover system from backup"; then reboot.
    fx.ui.script_keys(
        std::iter::repeat(Some(KEY_DOWN))
            .take(7)
            .chain([Some(KEY_ENTER)])
            .chain([Some(KEY_ENTER)]),
    );

    run(&mut fx, &["--show_text"]);

    assert!(fx.hal.has_operation(|op| matches!(
        op,
        Operation::RestoreSparseImage { backup, data }
            if backup == Path::new("/dev/block/mtdblock9")
                && data == Path::new("/dev/block/mtdblock3")
    )));
}

#[test]
fn locale_round_trips_between_sessions() {
    let mut fx = fixture();

    run(&mut fx, &["--just_exit", "--locale=fr_FR"]);
    assert_eq!(fx.ui.locale.as_deref(), Some("fr_FR"));

    // Next session without an explicit locale picks up the saved one.
    let mut ui = FakeUi::new();
    let mut recovery = Recovery::new(&fx.hal, &mut ui, &fx.device, &fx.installer);
    let session = recovery.run(args(&["--just_exit"]), fx.config.clone(), fx.paths.clone());
    assert_eq!(session.locale.as_deref(), Some("fr_FR"));
    assert_eq!(ui.locale.as_deref(), Some("fr_FR"));
}
