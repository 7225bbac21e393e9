use anyhow::Result;
use windows::Win32::UI::Input::KeyboardAndMouse::GetAsyncKeyState;

use super::KeystrokeSource;

/// Virtual keys that never produce character input on their own: modifiers,
/// lock keys and the mouse buttons that share the virtual-key range.
fn is_excluded(virtual_key: u16) -> bool {
    matches!(
        virtual_key,
        // Mouse buttons
        0x01..=0x06
        // Shift, Ctrl, Alt
        | 0x10..=0x12
        // Caps lock
        | 0x14
        // Left/right Windows keys
        | 0x5B | 0x5C
        // Num lock, scroll lock
        | 0x90 | 0x91
        // Left/right variants of shift, ctrl and alt
        | 0xA0..=0xA5
    )
}

/// Polls the global key state with `GetAsyncKeyState` and reports down
/// transitions. No hook installation is required, which also means there is
/// no permission gate on Windows.
pub struct WindowsKeystrokeSource {
    pressed: [bool; 256],
}

impl WindowsKeystrokeSource {
    pub fn new() -> Self {
        Self {
            pressed: [false; 256],
        }
    }
}

impl Default for WindowsKeystrokeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl KeystrokeSource for WindowsKeystrokeSource {
    fn poll_keys(&mut self) -> Result<usize> {
        let mut new_presses = 0;
        for virtual_key in 0x08u16..=0xFE {
            if is_excluded(virtual_key) {
                continue;
            }
            let down = unsafe { GetAsyncKeyState(virtual_key as i32) } as u16 & 0x8000 != 0;
            if down && !self.pressed[virtual_key as usize] {
                new_presses += 1;
            }
            self.pressed[virtual_key as usize] = down;
        }
        Ok(new_presses)
    }
}
