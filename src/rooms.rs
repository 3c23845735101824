//! Client-side room state: which rooms exist, which one is shown, and the
//! messages each has received while this client was running.

use colored::Color;
use std::collections::HashMap;

use crate::message::Message;

/// Room every client starts in.
pub const DEFAULT_ROOM: &str = "lobby";

/// Rooms that exist before the user joins anything, in display order.
pub const STARTING_ROOMS: &[&str] = &[DEFAULT_ROOM, "rocket"];

/// Colours assigned to usernames by hash.
pub const USERNAME_COLORS: &[(u8, u8, u8)] = &[
    (0x58, 0xa6, 0xff),
    (0xf0, 0x88, 0x3e),
    (0xa3, 0x71, 0xf7),
    (0x3f, 0xb9, 0x50),
    (0xe3, 0xb3, 0x41),
    (0xf8, 0x51, 0x49),
];

/// A stored line of a room's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub username: String,
    pub message: String,
}

#[derive(Debug)]
pub struct RoomLog {
    current: String,
    order: Vec<String>,
    rooms: HashMap<String, Vec<Entry>>,
    connected: bool,
}

impl Default for RoomLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomLog {
    /// A log holding the [`STARTING_ROOMS`], with the default room current.
    pub fn new() -> Self {
        Self {
            current: DEFAULT_ROOM.to_string(),
            order: STARTING_ROOMS.iter().map(|r| r.to_string()).collect(),
            rooms: STARTING_ROOMS
                .iter()
                .map(|r| (r.to_string(), Vec::new()))
                .collect(),
            connected: false,
        }
    }

    pub fn current(&self) -> &str {
        &self.current
    }

    /// Room names in creation order.
    pub fn rooms(&self) -> &[String] {
        &self.order
    }

    pub fn messages(&self, room: &str) -> &[Entry] {
        self.rooms.get(room).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    /// Create `name` and switch to it. Returns `false` (and only switches)
    /// if the room already existed.
    pub fn add_room(&mut self, name: &str) -> bool {
        if self.rooms.contains_key(name) {
            self.change_room(name);
            return false;
        }
        self.rooms.insert(name.to_string(), Vec::new());
        self.order.push(name.to_string());
        self.change_room(name);
        true
    }

    /// Switch to an existing room. Returns whether the current room changed.
    pub fn change_room(&mut self, name: &str) -> bool {
        if self.current == name || !self.rooms.contains_key(name) {
            return false;
        }
        self.current = name.to_string();
        true
    }

    /// Record a message. When `push` is false the message is only reported
    /// for display and not kept, as for bulk-loaded history.
    ///
    /// Returns `true` when the message should be rendered now: its room is
    /// known and current.
    pub fn add_message(&mut self, msg: &Message, push: bool) -> bool {
        let Some(entries) = self.rooms.get_mut(&msg.room) else {
            return false;
        };
        if push {
            entries.push(Entry {
                username: msg.username.clone(),
                message: msg.message.clone(),
            });
        }
        self.current == msg.room
    }
}

/// Deterministic display colour for a username.
pub fn username_color(name: &str) -> Color {
    let mut hash: i32 = 0;
    for unit in name.encode_utf16() {
        hash = i32::from(unit).wrapping_add(hash.wrapping_shl(5).wrapping_sub(hash));
    }
    let idx = hash.rem_euclid(USERNAME_COLORS.len() as i32) as usize;
    let (r, g, b) = USERNAME_COLORS[idx];
    Color::TrueColor { r, g, b }
}
