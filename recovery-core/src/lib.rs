//! Recovery controller core library.
//!
//! `recovery-core` holds everything the maintenance-mode controller needs to
//! decide and resume an action across reboots: the control-block codec, the
//! three-tier argument resolution, the restart-safe state machine, the menu
//! loop, volume orchestration, and the raw ext4/FAT32 routines. Platform
//! access goes through `recovery-hal`; rendering, input and package
//! verification stay behind the capability traits in [`ui`], [`device`] and
//! [`installer`].

pub mod args;
pub mod bootmsg;
pub mod cli;
pub mod config;
pub mod controller;
pub mod device;
pub mod ext4;
pub mod fakes;
pub mod fat32;
pub mod finish;
pub mod installer;
pub mod logging;
pub mod menu;
pub mod paths;
pub mod session;
pub mod ui;
pub mod volumes;

pub use installer::InstallStatus;
pub use session::RecoverySession;
