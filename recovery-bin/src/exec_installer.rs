//! Installer backed by the external updater tools.
//!
//! Package verification and extraction run in separate binaries; this
//! adapter maps their exit codes onto the session status and collects
//! their output into the install log. The updater asks for a cache wipe by
//! dropping a marker file before exiting.

use recovery_core::installer::{InstallStatus, Installer};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Exit code the updater uses for a package that failed verification.
const EXIT_CORRUPT: i32 = 2;

pub struct ExecInstaller {
    updater: PathBuf,
    image_writer: PathBuf,
    sideload_daemon: PathBuf,
    /// Dropped by the updater when the cache must be wiped afterwards.
    wipe_cache_marker: PathBuf,
    /// Where the sideload daemon leaves the received package.
    sideload_target: PathBuf,
}

impl Default for ExecInstaller {
    fn default() -> Self {
        Self {
            updater: PathBuf::from("/sbin/updater"),
            image_writer: PathBuf::from("/sbin/write_image"),
            sideload_daemon: PathBuf::from("/sbin/transferd"),
            wipe_cache_marker: PathBuf::from("/tmp/.wipe_cache"),
            sideload_target: PathBuf::from("/tmp/update.zip"),
        }
    }
}

impl ExecInstaller {
    /// Run one tool and fold its outcome into a status.
    fn run_tool(&self, program: &Path, arg: &Path, install_log: Option<&Path>) -> InstallStatus {
        let output = match Command::new(program).arg(arg).output() {
            Ok(output) => output,
            Err(e) => {
                log::error!("cannot run {}: {}", program.display(), e);
                return InstallStatus::Error;
            }
        };
        if let Some(install_log) = install_log {
            append_log(install_log, arg, &output.stdout, output.status.code());
        }
        match output.status.code() {
            Some(0) => InstallStatus::Success,
            Some(EXIT_CORRUPT) => InstallStatus::Corrupt,
            code => {
                log::error!(
                    "{} exited with {:?}: {}",
                    program.display(),
                    code,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
                InstallStatus::Error
            }
        }
    }

    fn take_wipe_cache_marker(&self) -> bool {
        if self.wipe_cache_marker.exists() {
            let _ = std::fs::remove_file(&self.wipe_cache_marker);
            return true;
        }
        false
    }
}

impl Installer for ExecInstaller {
    fn install_package(
        &self,
        package: &Path,
        wipe_cache: &mut bool,
        install_log: &Path,
    ) -> InstallStatus {
        let status = self.run_tool(&self.updater, package, Some(install_log));
        if self.take_wipe_cache_marker() {
            *wipe_cache = true;
        }
        status
    }

    fn install_image(&self, image: &Path) -> InstallStatus {
        self.run_tool(&self.image_writer, image, None)
    }

    fn sideload(&self, wipe_cache: &mut bool, install_log: &Path) -> InstallStatus {
        // The daemon blocks until a package has been received, then leaves
        // it at the agreed location.
        let status = self.run_tool(&self.sideload_daemon, &self.sideload_target, None);
        if !status.is_success() {
            return status;
        }
        let status = self.run_tool(&self.updater, &self.sideload_target, Some(install_log));
        if self.take_wipe_cache_marker() {
            *wipe_cache = true;
        }
        let _ = std::fs::remove_file(&self.sideload_target);
        status
    }
}

fn append_log(install_log: &Path, package: &Path, stdout: &[u8], code: Option<i32>) {
    let result = (|| -> std::io::Result<()> {
        if let Some(parent) = install_log.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(install_log)?;
        writeln!(file, "{}", package.display())?;
        file.write_all(stdout)?;
        writeln!(file, "result: {:?}", code)?;
        Ok(())
    })();
    if let Err(e) = result {
        log::warn!("cannot append to {}: {}", install_log.display(), e);
    }
}
