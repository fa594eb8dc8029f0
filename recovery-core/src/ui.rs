//! External UI contract.
//!
//! Rendering and input polling are a separate surface; the controller only
//! needs these operations. The menu loop drives the highlight through
//! `select_menu` so the surface owns clamping and redraw.

use anyhow::Result;

/// Raw key identifier as delivered by the input layer.
pub type KeyCode = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackgroundIcon {
    None,
    NoCommand,
    Error,
    Erasing,
    Installing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressKind {
    Empty,
    Indeterminate,
}

pub trait RecoveryUi {
    fn init(&mut self) -> Result<()>;

    fn set_locale(&mut self, locale: &str);

    /// Show a line of status text. Also mirrored to the session log by
    /// implementations, so failures are never silent.
    fn print(&mut self, text: &str);

    fn set_background(&mut self, icon: BackgroundIcon);

    fn set_progress(&mut self, kind: ProgressKind);

    fn show_text(&mut self, visible: bool);

    fn is_text_visible(&self) -> bool;

    /// Whether status text has been shown at any point this session. Gates
    /// the menu loop's timeout-reboot.
    fn was_text_ever_visible(&self) -> bool;

    fn start_menu(&mut self, headers: &[String], items: &[String], initial: isize);

    /// Move the highlight to `selected`, returning the clamped position.
    fn select_menu(&mut self, selected: isize) -> isize;

    fn end_menu(&mut self);

    /// Discard queued input so stale keys cannot trigger menu items.
    fn flush_keys(&mut self);

    /// Block for the next key, `None` on timeout.
    fn wait_key(&mut self) -> Option<KeyCode>;
}
