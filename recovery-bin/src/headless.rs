//! Log-backed UI and the stock device table.
//!
//! Rendering hardware is board-specific and lives outside this tree; this
//! surface routes every print into the session log and never reports a key,
//! so unattended sessions ride the menu loop's timeout default (reboot).

use anyhow::Result;
use recovery_core::device::{BuiltinAction, Device, MenuInput};
use recovery_core::ui::{BackgroundIcon, KeyCode, ProgressKind, RecoveryUi};

const KEY_UP: KeyCode = 103;
const KEY_DOWN: KeyCode = 108;
const KEY_ENTER: KeyCode = 28;
const KEY_POWER: KeyCode = 116;

pub struct LogUi {
    items: usize,
    selected: isize,
    text_visible: bool,
    text_ever_visible: bool,
}

impl LogUi {
    pub fn new() -> Self {
        Self {
            items: 0,
            selected: 0,
            text_visible: false,
            text_ever_visible: false,
        }
    }
}

impl RecoveryUi for LogUi {
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn set_locale(&mut self, locale: &str) {
        log::info!("locale: {}", locale);
    }

    fn print(&mut self, text: &str) {
        for line in text.lines() {
            if !line.is_empty() {
                log::info!("{}", line);
            }
        }
    }

    fn set_background(&mut self, icon: BackgroundIcon) {
        log::debug!("background: {:?}", icon);
    }

    fn set_progress(&mut self, _kind: ProgressKind) {}

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

    fn start_menu(&mut self, headers: &[String], items: &[String], initial: isize) {
        for header in headers {
            log::info!("menu: {}", header);
        }
        for (index, item) in items.iter().enumerate() {
            log::info!("menu: {:2}  {}", index, item);
        }
        self.items = items.len();
        self.selected = initial.clamp(0, items.len().saturating_sub(1) as isize);
    }

    fn select_menu(&mut self, selected: isize) -> isize {
        self.selected = selected.clamp(0, self.items.saturating_sub(1) as isize);
        self.selected
    }

    fn end_menu(&mut self) {}

    fn flush_keys(&mut self) {}

    /// No input hardware is wired up; every wait is a timeout.
    fn wait_key(&mut self) -> Option<KeyCode> {
        None
    }
}

/// The stock main menu and key mapping.
pub struct MainDevice;

const MENU_ITEMS: [(&str, BuiltinAction); 8] = [
    ("reboot system now", BuiltinAction::Reboot),
    ("apply update from external storage", BuiltinAction::ApplyExternal),
    ("apply update from cache", BuiltinAction::ApplyCache),
    ("apply update from ADB", BuiltinAction::ApplySideload),
    ("apply raw image", BuiltinAction::ApplyImage),
    ("wipe data/factory reset", BuiltinAction::WipeData),
    ("wipe cache partition", BuiltinAction::WipeCache),
    ("recover system from backup", BuiltinAction::RecoverBackup),
];

impl Device for MainDevice {
    fn menu_headers(&self) -> Vec<String> {
        vec![
            "Maintenance mode".to_string(),
            "Use volume keys to highlight; power to select.".to_string(),
        ]
    }

    fn menu_items(&self) -> Vec<String> {
        MENU_ITEMS.iter().map(|(name, _)| name.to_string()).collect()
    }

    fn handle_menu_key(&self, key: KeyCode, _text_visible: bool) -> MenuInput {
        match key {
            KEY_UP => MenuInput::HighlightUp,
            KEY_DOWN => MenuInput::HighlightDown,
            KEY_ENTER | KEY_POWER => MenuInput::InvokeItem,
            _ => MenuInput::NoAction,
        }
    }

    fn invoke_menu_item(&self, item: usize) -> Option<BuiltinAction> {
        MENU_ITEMS.get(item).map(|(_, action)| *action)
    }

    fn wipe_data(&self) -> Result<()> {
        // No device-specific state beyond the partitions themselves.
        Ok(())
    }
}
