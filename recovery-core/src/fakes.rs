//! Scriptable doubles for the UI, device, and installer contracts.
//!
//! These drive the menu loop and controller in tests without a display or
//! real update machinery. Keys are a pre-loaded script; everything the code
//! under test does is recorded for assertions.

use crate::device::{BuiltinAction, Device, MenuInput};
use crate::installer::{InstallStatus, Installer};
use crate::ui::{BackgroundIcon, KeyCode, ProgressKind, RecoveryUi};
use anyhow::{bail, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const KEY_UP: KeyCode = 103;
pub const KEY_DOWN: KeyCode = 108;
pub const KEY_ENTER: KeyCode = 28;

/// UI double fed from a key script. `wait_key` pops the next entry; `None`
/// entries simulate a timeout, and an exhausted script times out forever.
pub struct FakeUi {
    keys: VecDeque<Option<KeyCode>>,
    pub printed: Vec<String>,
    pub backgrounds: Vec<BackgroundIcon>,
    pub progress: Vec<ProgressKind>,
    pub locale: Option<String>,
    menu_items: usize,
    selected: isize,
    menu_active: bool,
    text_visible: bool,
    text_ever_visible: bool,
}

impl FakeUi {
    pub fn new() -> Self {
        Self {
            keys: VecDeque::new(),
            printed: Vec::new(),
            backgrounds: Vec::new(),
            progress: Vec::new(),
            locale: None,
            menu_items: 0,
            selected: 0,
            menu_active: false,
            text_visible: false,
            text_ever_visible: false,
        }
    }

    /// Append keys to the script. `None` is a timeout.
    pub fn script_keys<I: IntoIterator<Item = Option<KeyCode>>>(&mut self, keys: I) {
        self.keys.extend(keys);
    }

    pub fn menu_is_active(&self) -> bool {
        self.menu_active
    }

    pub fn printed_contains(&self, needle: &str) -> bool {
        self.printed.iter().any(|line| line.contains(needle))
    }
}

impl Default for FakeUi {
    fn default() -> Self {
        Self::new()
    }
}

impl RecoveryUi for FakeUi {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn set_locale(&mut self, locale: &str) {
        self.locale = Some(locale.to_string());
    }

    fn print(&mut self, text: &str) {
        self.printed.push(text.to_string());
    }

    fn set_background(&mut self, icon: BackgroundIcon) {
        self.backgrounds.push(icon);
    }

    fn set_progress(&mut self, kind: ProgressKind) {
        self.progress.push(kind);
    }

    fn show_text(&mut self, visible: bool) {
        self.text_visible = visible;
        if visible {
            self.text_ever_visible = true;
        }
    }

    fn is_text_visible(&self) -> bool {
        self.text_visible
    }

    fn was_text_ever_visible(&self) -> bool {
        self.text_ever_visible
    }

    fn start_menu(&mut self, _headers: &[String], items: &[String], initial: isize) {
        self.menu_items = items.len();
        self.selected = initial.clamp(0, items.len().saturating_sub(1) as isize);
        self.menu_active = true;
    }

    fn select_menu(&mut self, selected: isize) -> isize {
        let last = self.menu_items.saturating_sub(1) as isize;
        self.selected = selected.clamp(0, last);
        self.selected
    }

    fn end_menu(&mut self) {
        self.menu_active = false;
    }

    fn flush_keys(&mut self) {}

    fn wait_key(&mut self) -> Option<KeyCode> {
        self.keys.pop_front().flatten()
    }
}

/// Device double with a fixed menu and a canned action table.
pub struct ScriptedDevice {
    headers: Vec<String>,
    items: Vec<String>,
    actions: Vec<Option<BuiltinAction>>,
    fail_wipe: bool,
    wipe_calls: Mutex<u32>,
}

impl ScriptedDevice {
    pub fn new(items: Vec<String>, actions: Vec<Option<BuiltinAction>>) -> Self {
        Self {
            headers: vec!["Recovery".to_string()],
            items,
            actions,
            fail_wipe: false,
            wipe_calls: Mutex::new(0),
        }
    }

    /// The stock main menu, one item per builtin action.
    pub fn main_menu() -> Self {
        let entries = [
            ("reboot system now", BuiltinAction::Reboot),
            ("apply update from external storage", BuiltinAction::ApplyExternal),
            ("apply update from cache", BuiltinAction::ApplyCache),
            ("apply update from ADB", BuiltinAction::ApplySideload),
            ("apply raw image", BuiltinAction::ApplyImage),
            ("wipe data/factory reset", BuiltinAction::WipeData),
            ("wipe cache partition", BuiltinAction::WipeCache),
            ("recover system from backup", BuiltinAction::RecoverBackup),
        ];
        Self::new(
            entries.iter().map(|(name, _)| name.to_string()).collect(),
            entries.iter().map(|(_, action)| Some(*action)).collect(),
        )
    }

    pub fn fail_wipe(mut self) -> Self {
        self.fail_wipe = true;
        self
    }

    pub fn wipe_calls(&self) -> u32 {
        *self.wipe_calls.lock().unwrap()
    }
}

impl Device for ScriptedDevice {
    fn menu_headers(&self) -> Vec<String> {
        self.headers.clone()
    }

    fn menu_items(&self) -> Vec<String> {
        self.items.clone()
    }

    fn handle_menu_key(&self, key: KeyCode, _text_visible: bool) -> MenuInput {
        match key {
            KEY_UP => MenuInput::HighlightUp,
            KEY_DOWN => MenuInput::HighlightDown,
            KEY_ENTER => MenuInput::InvokeItem,
            // Scripted absolute selection, used to exercise the
            // menu_only distinction.
            key if key >= 1000 => MenuInput::Select((key - 1000) as usize),
            _ => MenuInput::NoAction,
        }
    }

    fn invoke_menu_item(&self, item: usize) -> Option<BuiltinAction> {
        self.actions.get(item).copied().flatten()
    }

    fn wipe_data(&self) -> Result<()> {
        *self.wipe_calls.lock().unwrap() += 1;
        if self.fail_wipe {
            bail!("device wipe hook failed");
        }
        Ok(())
    }
}

/// What the fake installer was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallCall {
    Package(PathBuf),
    Image(PathBuf),
    Sideload,
}

/// Installer double returning scripted statuses (default: success).
pub struct FakeInstaller {
    calls: Mutex<Vec<InstallCall>>,
    statuses: Mutex<VecDeque<InstallStatus>>,
    request_cache_wipe: bool,
}

impl FakeInstaller {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            statuses: Mutex::new(VecDeque::new()),
            request_cache_wipe: false,
        }
    }

    /// Queue the status returned by the next call.
    pub fn script_status(&self, status: InstallStatus) {
        self.statuses.lock().unwrap().push_back(status);
    }

    /// Make package installs ask the controller for a cache wipe.
    pub fn requesting_cache_wipe(mut self) -> Self {
        self.request_cache_wipe = true;
        self
    }

    pub fn calls(&self) -> Vec<InstallCall> {
        self.calls.lock().unwrap().clone()
    }

    fn next_status(&self) -> InstallStatus {
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(InstallStatus::Success)
    }
}

impl Default for FakeInstaller {
    fn default() -> Self {
        Self::new()
    }
}

impl Installer for FakeInstaller {
    fn install_package(
        &self,
        package: &Path,
        wipe_cache: &mut bool,
        _install_log: &Path,
    ) -> InstallStatus {
        self.calls
            .lock()
            .unwrap()
            .push(InstallCall::Package(package.to_path_buf()));
        if self.request_cache_wipe {
            *wipe_cache = true;
        }
        self.next_status()
    }

    fn install_image(&self, image: &Path) -> InstallStatus {
        self.calls
            .lock()
            .unwrap()
            .push(InstallCall::Image(image.to_path_buf()));
        self.next_status()
    }

    fn sideload(&self, _wipe_cache: &mut bool, _install_log: &Path) -> InstallStatus {
        self.calls.lock().unwrap().push(InstallCall::Sideload);
        self.next_status()
    }
}
