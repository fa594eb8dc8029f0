//! Maintenance-mode entrypoint: wire the Linux HAL, the headless surfaces
//! and the external updater together and run one session.

use anyhow::{anyhow, Result};
use recovery_core::config::{RecoveryConfig, DEFAULT_CONFIG_FILE};
use recovery_core::controller::Recovery;
use recovery_core::paths::Paths;
use recovery_hal::{LinuxHal, SystemOps, VolumeEntry};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::Command;

mod exec_installer;
mod headless;

/// Replacement process for the hidden transfer-daemon mode.
const TRANSFER_DAEMON: &str = "/sbin/transferd";
/// Replacement process for factory-mode hand-off.
const FACTORY_BINARY: &str = "/sbin/factory_test";

pub fn run() -> Result<()> {
    let argv: Vec<String> = std::env::args().collect();

    // The transfer daemon is this same binary re-invoked by init; replace
    // the process before touching any session state.
    if argv.get(1).map(String::as_str) == Some("--transfer-daemon") {
        let err = Command::new(TRANSFER_DAEMON).exec();
        return Err(anyhow!(err).context("launching transfer daemon"));
    }

    recovery_core::logging::init();
    log::info!("Maintenance mode starting, pid {}", std::process::id());

    let config = RecoveryConfig::load(Path::new(DEFAULT_CONFIG_FILE));
    let hal = LinuxHal::new(
        config
            .volumes
            .iter()
            .map(|v| VolumeEntry {
                mount_point: v.mount_point.clone(),
                device: v.device.clone(),
                fstype: v.fstype.clone(),
            })
            .collect(),
    );

    // Factory mode may be requested through any of the argument sources,
    // so resolve them before deciding on the hand-off. Resolution is
    // idempotent; the controller repeating it changes nothing.
    let paths = Paths::default();
    let argv = recovery_core::args::get_args(&hal, &paths, argv);
    if let Some(mode) = factory_mode_arg(&argv) {
        log::info!("factory hand-off ({})", mode);
        let err = Command::new(FACTORY_BINARY).arg(mode).exec();
        return Err(anyhow!(err).context("launching factory process"));
    }

    let mut ui = headless::LogUi::new();
    let device = headless::MainDevice;
    let installer = exec_installer::ExecInstaller::default();

    let mut recovery = Recovery::new(&hal, &mut ui, &device, &installer);
    let session = recovery.run(argv, config, paths);
    log::info!("session finished with status {:?}", session.status);

    hal.reboot()?;
    Ok(())
}

/// Pre-parse just the factory-mode option from the resolved arguments.
fn factory_mode_arg(argv: &[String]) -> Option<String> {
    let mut iter = argv.iter().skip(1);
    while let Some(arg) = iter.next() {
        if let Some(mode) = arg.strip_prefix("--factory_mode=") {
            return Some(mode.to_string());
        }
        if arg == "--factory_mode" {
            return iter.next().cloned();
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(list: &[&str]) -> Vec<String> {
        std::iter::once("recovery")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn factory_mode_is_found_in_either_form() {
        assert_eq!(
            factory_mode_arg(&argv(&["--factory_mode=pcba"])).as_deref(),
            Some("pcba")
        );
        assert_eq!(
            factory_mode_arg(&argv(&["--wipe_cache", "--factory_mode", "aging"])).as_deref(),
            Some("aging")
        );
        assert_eq!(factory_mode_arg(&argv(&["--wipe_data"])), None);
    }
}
