//! Menu selection loop and the package browser.

use crate::device::{Device, MenuInput};
use crate::ui::RecoveryUi;
use std::path::{Path, PathBuf};

/// Run one menu until the user commits to an item and return its index.
///
/// Stale input is flushed before the menu opens. A timeout keeps waiting if
/// status text has ever been on screen; otherwise the session was fully
/// unattended and item 0 (reboot by convention) is returned so the device
/// does not hang in maintenance mode forever.
///
/// With `menu_only` set, device shortcuts that select an absolute item are
/// ignored and only highlight movement plus invoke are honoured.
pub fn get_menu_selection(
    ui: &mut dyn RecoveryUi,
    device: &dyn Device,
    headers: &[String],
    items: &[String],
    menu_only: bool,
    initial_selection: isize,
) -> usize {
    ui.flush_keys();
    ui.start_menu(headers, items, initial_selection);

    let mut selected = initial_selection;
    let chosen = loop {
        let key = match ui.wait_key() {
            Some(key) => key,
            None => {
                if ui.was_text_ever_visible() {
                    continue;
                }
                break 0;
            }
        };
        match device.handle_menu_key(key, ui.is_text_visible()) {
            MenuInput::HighlightUp => selected = ui.select_menu(selected - 1),
            MenuInput::HighlightDown => selected = ui.select_menu(selected + 1),
            MenuInput::InvokeItem => break selected.max(0) as usize,
            MenuInput::NoAction => {}
            MenuInput::Select(item) if !menu_only => break item,
            MenuInput::Select(_) => {}
        }
    };

    ui.end_menu();
    chosen
}

/// Interactively pick an update package under `root`.
///
/// Directories are listed first (with a trailing `/`), then `.zip` files,
/// each group sorted by name. Item 0 is always `../`; choosing it leaves
/// the directory, and leaving the root returns `None`.
pub fn browse_for_package(
    ui: &mut dyn RecoveryUi,
    device: &dyn Device,
    root: &Path,
) -> Option<PathBuf> {
    browse_directory(ui, device, root)
}

fn browse_directory(
    ui: &mut dyn RecoveryUi,
    device: &dyn Device,
    dir: &Path,
) -> Option<PathBuf> {
    let entries = match list_entries(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::error!("error listing {}: {}", dir.display(), e);
            return None;
        }
    };

    let headers = vec![
        "Choose a package to install:".to_string(),
        dir.display().to_string(),
    ];
    let mut items = vec!["../".to_string()];
    items.extend(entries.iter().cloned());

    let mut selected = 0;
    loop {
        let chosen = get_menu_selection(ui, device, &headers, &items, true, selected);
        if chosen == 0 {
            return None;
        }
        selected = chosen as isize;

        let name = &items[chosen];
        match name.strip_suffix('/') {
            Some(subdir) => {
                if let Some(package) = browse_directory(ui, device, &dir.join(subdir)) {
                    return Some(package);
                }
                // Came back up; redraw this level.
            }
            None => return Some(dir.join(name)),
        }
    }
}

/// Subdirectories (suffixed `/`) then `.zip` files, each sorted.
fn list_entries(dir: &Path) -> std::io::Result<Vec<String>> {
    let mut dirs = Vec::new();
    let mut zips = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            dirs.push(format!("{}/", name));
        } else if file_type.is_file() && name.to_ascii_lowercase().ends_with(".zip") {
            zips.push(name);
        }
    }
    dirs.sort();
    zips.sort();
    dirs.extend(zips);
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeUi, ScriptedDevice, KEY_DOWN, KEY_ENTER, KEY_UP};

    fn items(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn plain_device(count: usize) -> ScriptedDevice {
        ScriptedDevice::new(
            (0..count).map(|i| format!("item {}", i)).collect(),
            vec![None; count],
        )
    }

    #[test]
    fn highlight_moves_then_invokes() {
        let mut ui = FakeUi::new();
        ui.script_keys([Some(KEY_DOWN), Some(KEY_DOWN), Some(KEY_UP), Some(KEY_ENTER)]);
        let device = plain_device(4);

        let chosen = get_menu_selection(
            &mut ui,
            &device,
            &items(&["h"]),
            &device.menu_items(),
            true,
            0,
        );
        assert_eq!(chosen, 1);
        assert!(!ui.menu_is_active());
    }

    #[test]
    fn highlight_clamps_at_the_edges() {
        let mut ui = FakeUi::new();
        ui.script_keys([Some(KEY_UP), Some(KEY_UP), Some(KEY_ENTER)]);
        let device = plain_device(3);

        let chosen = get_menu_selection(
            &mut ui,
            &device,
            &items(&["h"]),
            &device.menu_items(),
            true,
            0,
        );
        assert_eq!(chosen, 0);
    }

    #[test]
    fn timeout_with_no_text_ever_visible_defaults_to_item_zero() {
        // Empty key script: the first wait times out, and since status text
        // was never on screen the loop falls back to item 0.
        let mut ui = FakeUi::new();
        let device = plain_device(3);

        let chosen = get_menu_selection(
            &mut ui,
            &device,
            &items(&["h"]),
            &device.menu_items(),
            true,
            1,
        );
        assert_eq!(chosen, 0);
        assert!(!ui.menu_is_active());
    }

    #[test]
    fn timeout_keeps_waiting_once_text_was_visible() {
        let mut ui = FakeUi::new();
        ui.show_text(true);
        ui.show_text(false);
        ui.script_keys([None, None, Some(KEY_ENTER)]);
        let device = plain_device(3);

        let chosen = get_menu_selection(
            &mut ui,
            &device,
            &items(&["h"]),
            &device.menu_items(),
            true,
            2,
        );
        assert_eq!(chosen, 2);
    }

    #[test]
    fn absolute_selection_honoured_only_outside_menu_only() {
        let device = plain_device(5);

        let mut ui = FakeUi::new();
        ui.script_keys([Some(1003)]);
        let chosen = get_menu_selection(
            &mut ui,
            &device,
            &items(&["h"]),
            &device.menu_items(),
            false,
            0,
        );
        assert_eq!(chosen, 3);

        let mut ui = FakeUi::new();
        ui.script_keys([Some(1003), Some(KEY_ENTER)]);
        let chosen = get_menu_selection(
            &mut ui,
            &device,
            &items(&["h"]),
            &device.menu_items(),
            true,
            0,
        );
        assert_eq!(chosen, 0);
    }

    #[test]
    fn browser_lists_directories_before_zips() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("images")).unwrap();
        std::fs::write(dir.path().join("b.zip"), b"").unwrap();
        std::fs::write(dir.path().join("a.ZIP"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let entries = list_entries(dir.path()).unwrap();
        assert_eq!(entries, vec!["images/", "a.ZIP", "b.zip"]);
    }

    #[test]
    fn browser_returns_the_chosen_zip() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("update.zip"), b"").unwrap();

        let mut ui = FakeUi::new();
        // Items: ["../", "update.zip"]; move down once and invoke.
        ui.script_keys([Some(KEY_DOWN), Some(KEY_ENTER)]);
        let device = plain_device(0);

        let package = browse_for_package(&mut ui, &device, dir.path());
        assert_eq!(package, Some(dir.path().join("update.zip")));
    }

    #[test]
    fn browser_descends_and_comes_back_up() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/inner.zip"), b"").unwrap();
        std::fs::write(dir.path().join("top.zip"), b"").unwrap();

        // Enter sub/, back out with ../, then pick top.zip.
        let mut ui = FakeUi::new();
        ui.script_keys([
            Some(KEY_DOWN),
            Some(KEY_ENTER), // into sub/
            Some(KEY_ENTER), // ../ back out
            Some(KEY_DOWN),
            Some(KEY_DOWN),
            Some(KEY_ENTER), // top.zip
        ]);
        let device = plain_device(0);

        let package = browse_for_package(&mut ui, &device, dir.path());
        assert_eq!(package, Some(dir.path().join("top.zip")));
    }

    #[test]
    fn browser_exits_on_up_from_the_root() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("update.zip"), b"").unwrap();

        let mut ui = FakeUi::new();
        ui.script_keys([Some(KEY_ENTER)]); // ../ at the root
        let device = plain_device(0);

        assert_eq!(browse_for_package(&mut ui, &device, dir.path()), None);
    }
}
