//! External device contract.
//!
//! Per-device behaviour (menu wiring, key mapping, the full-wipe hook) is
//! injected through this trait rather than compiled in.

use crate::ui::KeyCode;
use anyhow::Result;

/// What a key press means inside the menu loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuInput {
    HighlightUp,
    HighlightDown,
    InvokeItem,
    NoAction,
    /// Devices with global shortcuts may choose an absolute item directly.
    /// Honoured only when the caller did not restrict input to the menu.
    Select(usize),
}

/// Core actions a menu item can map to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinAction {
    Reboot,
    ApplyExternal,
    ApplyCache,
    ApplySideload,
    ApplyImage,
    WipeData,
    WipeCache,
    RecoverBackup,
}

pub trait Device {
    /// Header lines shown above the main menu.
    fn menu_headers(&self) -> Vec<String>;

    /// The main menu items, indexed by position.
    fn menu_items(&self) -> Vec<String>;

    /// Translate a key press into a menu signal.
    fn handle_menu_key(&self, key: KeyCode, text_visible: bool) -> MenuInput;

    /// Map a chosen menu index onto a core action. `None` means the device
    /// handled the item itself.
    fn invoke_menu_item(&self, item: usize) -> Option<BuiltinAction>;

    /// Device-specific full wipe of user data, run before the partition
    /// level wipe.
    fn wipe_data(&self) -> Result<()>;

    /// Hook announcing the start of a session.
    fn start_recovery(&self) {}
}
