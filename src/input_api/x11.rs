use anyhow::Result;
use tracing::instrument;
use xcb::{x, Connection};

use super::KeystrokeSource;

/// Whether an X display is reachable at all.
pub fn can_connect() -> bool {
    Connection::connect(None).is_ok()
}

fn query_keymap(conn: &Connection) -> Result<[u8; 32]> {
    let reply = conn.wait_for_reply(conn.send_request(&x::QueryKeymap {}))?;
    let mut keys = [0u8; 32];
    keys.copy_from_slice(reply.keys());
    Ok(keys)
}

/// Keycodes currently mapped to a modifier, as a bitmap matching the
/// QueryKeymap layout.
fn modifier_bitmap(conn: &Connection) -> Result<[u8; 32]> {
    let reply = conn.wait_for_reply(conn.send_request(&x::GetModifierMapping {}))?;
    let mut bitmap = [0u8; 32];
    for keycode in reply.keycodes() {
        if *keycode != 0 {
            bitmap[(*keycode / 8) as usize] |= 1 << (*keycode % 8);
        }
    }
    Ok(bitmap)
}

/// Polls the server keymap bitmap and reports down transitions of
/// non-modifier keycodes. This reads key state only, no grab and no event
/// stream, so it cannot interfere with the focused client.
pub struct LinuxKeystrokeSource {
    connection: Connection,
    modifier_mask: [u8; 32],
    previous: [u8; 32],
}

impl LinuxKeystrokeSource {
    #[instrument]
    pub fn new() -> Result<Self> {
        let (connection, _preferred_screen) = Connection::connect(None)?;
        let modifier_mask = modifier_bitmap(&connection)?;
        let previous = query_keymap(&connection)?;
        Ok(Self {
            connection,
            modifier_mask,
            previous,
        })
    }
}

impl KeystrokeSource for LinuxKeystrokeSource {
    fn poll_keys(&mut self) -> Result<usize> {
        let current = query_keymap(&self.connection)?;
        let mut new_presses = 0usize;
        for (byte, state) in current.iter().enumerate() {
            let newly_down = state & !self.previous[byte] & !self.modifier_mask[byte];
            new_presses += newly_down.count_ones() as usize;
        }
        self.previous = current;
        Ok(new_presses)
    }
}
