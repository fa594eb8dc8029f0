//! Session controller: argument resolution, dispatch, and the prompt loop.

use crate::args;
use crate::cli;
use crate::config::RecoveryConfig;
use crate::device::{BuiltinAction, Device};
use crate::ext4;
use crate::finish;
use crate::installer::{InstallStatus, Installer};
use crate::menu;
use crate::paths::Paths;
use crate::session::RecoverySession;
use crate::ui::{BackgroundIcon, ProgressKind, RecoveryUi};
use crate::volumes;
use recovery_hal::RecoveryHal;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Attempts to mount removable media before giving up on it. Freshly
/// inserted cards can take a moment to settle.
const MEDIA_SETTLE_ATTEMPTS: u32 = 10;
const MEDIA_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// One maintenance-mode session over injected platform and UI surfaces.
pub struct Recovery<'a> {
    hal: &'a dyn RecoveryHal,
    ui: &'a mut dyn RecoveryUi,
    device: &'a dyn Device,
    installer: &'a dyn Installer,
}

impl<'a> Recovery<'a> {
    pub fn new(
        hal: &'a dyn RecoveryHal,
        ui: &'a mut dyn RecoveryUi,
        device: &'a dyn Device,
        installer: &'a dyn Installer,
    ) -> Self {
        Self {
            hal,
            ui,
            device,
            installer,
        }
    }

    /// Run one full session and return its final state. The caller owns
    /// what happens next (normally a reboot).
    pub fn run(&mut self, live_args: Vec<String>, config: RecoveryConfig, paths: Paths) -> RecoverySession {
        let argv = args::get_args(self.hal, &paths, live_args);
        log::info!("Command: {:?}", argv);

        let mut options = cli::parse_args(&argv);
        if let Some(package) = options.update_package.take() {
            options.update_package = Some(cli::normalize_package_path(&package));
        }
        let mut session = RecoverySession::new(options, config, paths);

        if session.locale.is_none() {
            session.locale = finish::load_saved_locale(&session.paths);
        }

        if let Err(e) = self.ui.init() {
            log::error!("UI init failed: {}", e);
        }
        if let Some(locale) = session.locale.clone() {
            self.ui.set_locale(&locale);
        }
        self.ui
            .print(&format!("Recovery system v{}\n", env!("CARGO_PKG_VERSION")));
        if session.options.show_text {
            self.ui.show_text(true);
        }

        self.device.start_recovery();
        self.repair_cache(&mut session);

        // Unattended update dropped on storage, only when nothing explicit
        // was asked for.
        if session.options.update_package.is_none()
            && session.options.update_image.is_none()
            && !session.options.wipe_data
            && !session.options.wipe_cache
            && !session.options.just_exit
        {
            if let Some(image) = volumes::discover_auto_update(self.hal, &session.config) {
                session.options.update_image = Some(image.to_string_lossy().to_string());
            }
        }

        session.status = self.dispatch(&mut session);

        if matches!(
            session.status,
            InstallStatus::Error | InstallStatus::Corrupt
        ) {
            self.ui.set_background(BackgroundIcon::Error);
            if session.config.keep_control_block_on_error {
                session.clear_control_block = false;
            }
        }
        if (session.status != InstallStatus::Success || self.ui.is_text_visible())
            && !session.options.just_exit
        {
            self.prompt_and_wait(&mut session);
        }

        finish::finish_recovery(self.hal, &mut session);
        session
    }

    /// Dispatch the single requested action.
    fn dispatch(&mut self, session: &mut RecoverySession) -> InstallStatus {
        if let Some(package) = session.options.update_package.clone() {
            let status = self.install_package_action(session, Path::new(&package));
            if !status.is_success() {
                self.ui.print("Installation aborted.\n");
            }
            return status;
        }
        if let Some(image) = session.options.update_image.clone() {
            if session.options.wipe_cache {
                // Image installs never honoured the cache wipe; surface it
                // instead of silently dropping the flag.
                log::warn!("cache wipe requested alongside an image install; ignoring");
            }
            let status = self.install_image_action(session, Path::new(&image));
            if !status.is_success() {
                self.ui.print("Installation aborted.\n");
            }
            return status;
        }
        if session.options.wipe_data {
            let status = self.wipe_data_action(session);
            if !status.is_success() {
                self.ui.print("Data wipe failed.\n");
            }
            return status;
        }
        if session.options.wipe_cache {
            let cache = session.paths.cache_root.clone();
            return match volumes::erase_volume(self.hal, self.ui, session, &cache) {
                Ok(()) => {
                    self.ui.print("Cache wipe complete.\n");
                    InstallStatus::Success
                }
                Err(e) => {
                    log::error!("cache wipe failed: {}", e);
                    self.ui.print("Cache wipe failed.\n");
                    InstallStatus::Error
                }
            };
        }
        if session.options.just_exit {
            return InstallStatus::Success;
        }

        // Nothing to do; drop into the menu.
        self.ui.set_background(BackgroundIcon::NoCommand);
        InstallStatus::None
    }

    /// The cache volume is the mailbox to the main system; a cache that no
    /// longer mounts gets reformatted so the session can still deliver its
    /// results.
    fn repair_cache(&mut self, session: &mut RecoverySession) {
        let cache = session.paths.cache_root.clone();
        if self.hal.ensure_mounted(&cache).is_ok() {
            return;
        }
        log::warn!("cache does not mount; reformatting it");
        if let Err(e) = volumes::erase_volume(self.hal, self.ui, session, &cache) {
            log::error!("cache reformat failed: {}", e);
            return;
        }
        if let Err(e) = self.hal.ensure_mounted(&cache) {
            log::error!("cache unusable even after reformat: {}", e);
        }
    }

    fn install_package_action(
        &mut self,
        session: &mut RecoverySession,
        package: &Path,
    ) -> InstallStatus {
        self.ui.set_background(BackgroundIcon::Installing);
        self.ui.set_progress(ProgressKind::Indeterminate);
        self.ui
            .print(&format!("Installing {}...\n", package.display()));

        let staged = match self.storage_root_of(session, package) {
            Some(root) => {
                if !self.mount_with_retries(&root) {
                    log::error!("storage {} never became available", root);
                    return InstallStatus::Error;
                }
                match volumes::copy_sideloaded_package(
                    package,
                    &session.paths.sideload_staging_dir,
                ) {
                    Ok(staged) => Some(staged),
                    Err(e) => {
                        log::error!("cannot stage {}: {}", package.display(), e);
                        return InstallStatus::Error;
                    }
                }
            }
            None => {
                // Cache-resident package; the volume is already repaired.
                None
            }
        };
        let source = staged.clone().unwrap_or_else(|| package.to_path_buf());

        let mut wipe_cache = false;
        let mut status = self.installer.install_package(
            &source,
            &mut wipe_cache,
            &session.paths.temporary_install_file,
        );

        if let Some(staged) = staged {
            if let Err(e) = std::fs::remove_file(&staged) {
                log::warn!("cannot remove staged package: {}", e);
            }
        }

        if status.is_success() {
            if wipe_cache {
                self.ui.print("\n-- Wiping cache (at package request)...\n");
                let cache = session.paths.cache_root.clone();
                if volumes::erase_volume(self.hal, self.ui, session, &cache).is_err() {
                    status = InstallStatus::Error;
                }
            }
        }
        if status.is_success() {
            session.update_completed = Some(package.to_path_buf());
        }
        status
    }

    fn install_image_action(
        &mut self,
        session: &mut RecoverySession,
        image: &Path,
    ) -> InstallStatus {
        self.ui.set_background(BackgroundIcon::Installing);
        self.ui.set_progress(ProgressKind::Indeterminate);
        self.ui
            .print(&format!("Installing image {}...\n", image.display()));

        if let Some(root) = self.storage_root_of(session, image) {
            if !self.mount_with_retries(&root) {
                log::error!("storage {} never became available", root);
                return InstallStatus::Error;
            }
        }

        let status = self.installer.install_image(image);
        if status.is_success() {
            session.update_completed = Some(image.to_path_buf());
        }
        status
    }

    fn sideload_action(&mut self, session: &mut RecoverySession) -> InstallStatus {
        self.ui.set_background(BackgroundIcon::Installing);
        self.ui.print("\n-- Waiting for a sideloaded package...\n");

        let mut wipe_cache = false;
        let mut status = self
            .installer
            .sideload(&mut wipe_cache, &session.paths.temporary_install_file);
        if status.is_success() && wipe_cache {
            let cache = session.paths.cache_root.clone();
            if volumes::erase_volume(self.hal, self.ui, session, &cache).is_err() {
                status = InstallStatus::Error;
            }
        }
        status
    }

    /// Full factory reset: device hook, data restore-or-erase, cache, and
    /// the extra media wipe plus resize of a complete wipe.
    fn wipe_data_action(&mut self, session: &mut RecoverySession) -> InstallStatus {
        self.ui.print("\n-- Wiping data...\n");

        if let Err(e) = self.device.wipe_data() {
            log::error!("device wipe hook failed: {}", e);
            return InstallStatus::Error;
        }
        if let Err(e) = volumes::clone_or_erase_data(self.hal, self.ui, session) {
            log::error!("data wipe failed: {}", e);
            return InstallStatus::Error;
        }
        let cache = session.paths.cache_root.clone();
        if let Err(e) = volumes::erase_volume(self.hal, self.ui, session, &cache) {
            log::error!("cache wipe failed: {}", e);
            return InstallStatus::Error;
        }

        if session.options.wipe_all {
            if let Some(internal) = session.config.internal_storage.clone() {
                if let Err(e) = volumes::erase_volume(self.hal, self.ui, session, &internal) {
                    log::error!("internal storage wipe failed: {}", e);
                    return InstallStatus::Error;
                }
                self.restore_media_label(&internal);
            }
            self.resize_wiped_volumes(session);
        }

        self.ui.print("Data wipe complete.\n");
        InstallStatus::Success
    }

    /// Formatting media drops its FAT label; put one back so the volume
    /// shows up with a name on the next boot.
    fn restore_media_label(&mut self, volume: &str) {
        let name = Path::new(volume)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "sdcard".to_string());
        if let Err(e) = volumes::set_volume_label(self.hal, volume, &name) {
            log::warn!("label restore on {} failed: {:#}", volume, e);
        }
    }

    /// Grow the configured volumes to fill their partitions, skipping any
    /// whose filesystem does not read back clean.
    fn resize_wiped_volumes(&mut self, session: &mut RecoverySession) {
        for volume in session.config.resize_on_wipe_all.clone() {
            let device = match self.hal.device_for_volume(&volume) {
                Ok(device) => device,
                Err(e) => {
                    log::warn!("no device for {} ({}); not resizing", volume, e);
                    continue;
                }
            };
            match ext4::probe_device(&device) {
                Ok((sb, length)) => {
                    log::info!(
                        "{}: {} blocks of {} ({} groups, {} bytes); resizing",
                        volume,
                        sb.blocks_count,
                        sb.block_size,
                        sb.group_count(),
                        length
                    );
                    if let Err(e) = self.hal.check_and_resize(&device) {
                        log::warn!("resize of {} failed: {}", volume, e);
                    }
                }
                Err(e) => log::warn!("{} not resizable ({}); leaving as formatted", volume, e),
            }
        }
    }

    /// Interactive menu loop. Returns when the user asks for a reboot or an
    /// unattended menu install succeeds with text hidden.
    pub fn prompt_and_wait(&mut self, session: &mut RecoverySession) {
        loop {
            // Results so far are delivered even if power is cut while the
            // menu sits open.
            finish::finish_recovery(self.hal, session);
            self.ui.set_progress(ProgressKind::Empty);

            let headers = self.device.menu_headers();
            let items = self.device.menu_items();
            let chosen = menu::get_menu_selection(self.ui, self.device, &headers, &items, false, 0);

            let action = match self.device.invoke_menu_item(chosen) {
                Some(action) => action,
                None => continue,
            };

            let status = match action {
                BuiltinAction::Reboot => return,
                BuiltinAction::WipeData => {
                    if !self.confirm_wipe() {
                        continue;
                    }
                    self.wipe_data_action(session)
                }
                BuiltinAction::WipeCache => {
                    let cache = session.paths.cache_root.clone();
                    self.ui.print("\n-- Wiping cache...\n");
                    let status =
                        match volumes::erase_volume(self.hal, self.ui, session, &cache) {
                            Ok(()) => InstallStatus::Success,
                            Err(_) => InstallStatus::Error,
                        };
                    self.ui.print("Cache wipe complete.\n");
                    status
                }
                BuiltinAction::ApplyExternal => {
                    let root = session.config.external_storage.clone();
                    self.menu_install_from(session, &root)
                }
                BuiltinAction::ApplyCache => {
                    let root = session.paths.cache_root.clone();
                    self.menu_install_from(session, &root)
                }
                BuiltinAction::ApplySideload => self.sideload_action(session),
                BuiltinAction::ApplyImage => {
                    let root = session.config.external_storage.clone();
                    let image = Path::new(&root).join(&session.config.auto_update_package);
                    args::write_install_checkpoint(
                        self.hal,
                        Some(&format!("--update_image={}", image.display())),
                    );
                    self.install_image_action(session, &image)
                }
                BuiltinAction::RecoverBackup => self.recover_system(session),
            };

            session.status = status;
            match status {
                InstallStatus::None => {}
                InstallStatus::Success => {
                    // Unattended flows reboot straight away; with the menu
                    // on screen, stay and let the user read the outcome.
                    if !self.ui.is_text_visible() {
                        return;
                    }
                    self.ui.print("\nInstall from menu complete.\n");
                }
                _ => {
                    self.ui.set_background(BackgroundIcon::Error);
                    self.ui.print("\nInstallation aborted.\n");
                }
            }
        }
    }

    /// Pick a package under `root` and install it, writing the restart
    /// checkpoint first so a power loss re-runs the same install.
    fn menu_install_from(&mut self, session: &mut RecoverySession, root: &str) -> InstallStatus {
        if !self.mount_with_retries(root) {
            self.ui.print(&format!("Can't mount {}.\n", root));
            return InstallStatus::Error;
        }
        let package = match menu::browse_for_package(self.ui, self.device, Path::new(root)) {
            Some(package) => package,
            None => return InstallStatus::None,
        };
        args::write_install_checkpoint(
            self.hal,
            Some(&format!("--update_package={}", package.display())),
        );
        self.install_package_action(session, &package)
    }

    /// Restore the system partition from its backup copy.
    fn recover_system(&mut self, session: &mut RecoverySession) -> InstallStatus {
        self.ui.print("\n-- Recovering system from backup...\n");
        let backup = match self.hal.find_partition(&session.config.system_backup_partition) {
            Ok(backup) => backup,
            Err(e) => {
                log::error!("no system backup: {}", e);
                return InstallStatus::Error;
            }
        };
        let target = match self.hal.find_partition(&session.config.system_partition) {
            Ok(target) => target,
            Err(e) => {
                log::error!("no system partition: {}", e);
                return InstallStatus::Error;
            }
        };
        let backup_device = self.hal.partition_device(&backup);
        let target_device = self.hal.partition_device(&target);
        match self
            .hal
            .restore_sparse_image(&backup_device, &target_device)
        {
            Ok(()) => {
                self.ui.print("System recovery complete.\n");
                InstallStatus::Success
            }
            Err(e) => {
                log::error!("system recovery failed: {}", e);
                InstallStatus::Error
            }
        }
    }

    /// Confirmation menu for a destructive wipe: a column of "No" with the
    /// single "Yes" buried at a fixed position, so held-down keys cannot
    /// land on it. Skipped entirely when no one is watching.
    fn confirm_wipe(&mut self) -> bool {
        if !self.ui.is_text_visible() {
            return true;
        }
        let headers = vec![
            "Confirm wipe of all user data?".to_string(),
            "  THIS CAN NOT BE UNDONE.".to_string(),
        ];
        let mut items = vec![" No".to_string(); 11];
        items[7] = " Yes -- delete all user data".to_string();

        let chosen = menu::get_menu_selection(self.ui, self.device, &headers, &items, true, 0);
        chosen == 7
    }

    /// Which configured storage root covers `path`, if any.
    fn storage_root_of(&self, session: &RecoverySession, path: &Path) -> Option<String> {
        let mut roots = vec![session.config.external_storage.clone()];
        if let Some(internal) = &session.config.internal_storage {
            roots.push(internal.clone());
        }
        roots
            .into_iter()
            .find(|root| path.starts_with(PathBuf::from(root)))
    }

    fn mount_with_retries(&self, root: &str) -> bool {
        for attempt in 1..=MEDIA_SETTLE_ATTEMPTS {
            match self.hal.ensure_mounted(root) {
                Ok(()) => return true,
                Err(e) => {
                    log::info!(
                        "mount {} failed (attempt {}/{}): {}",
                        root,
                        attempt,
                        MEDIA_SETTLE_ATTEMPTS,
                        e
                    );
                }
            }
            if attempt < MEDIA_SETTLE_ATTEMPTS {
                std::thread::sleep(MEDIA_SETTLE_DELAY);
            }
        }
        false
    }
}
