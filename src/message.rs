//! The chat message type and its two wire encodings: form bodies on the write
//! path and JSON payloads on the event stream.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::ChatError;

/// Room names must be shorter than this many bytes.
pub const MAX_ROOM_LEN: usize = 30;
/// Usernames must be shorter than this many bytes.
pub const MAX_USERNAME_LEN: usize = 20;

/// One chat message posted to a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub room: String,
    pub username: String,
    pub message: String,
}

impl Message {
    pub fn new(
        room: impl Into<String>,
        username: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            room: room.into(),
            username: username.into(),
            message: message.into(),
        }
    }

    /// Check the field length limits accepted by the server.
    pub fn validate(&self) -> Result<(), ChatError> {
        if self.room.len() >= MAX_ROOM_LEN {
            return Err(ChatError::InvalidMessage(format!(
                "room must be shorter than {MAX_ROOM_LEN} bytes"
            )));
        }
        if self.username.len() >= MAX_USERNAME_LEN {
            return Err(ChatError::InvalidMessage(format!(
                "username must be shorter than {MAX_USERNAME_LEN} bytes"
            )));
        }
        Ok(())
    }

    /// Decode and validate an `application/x-www-form-urlencoded` body.
    pub fn from_form(body: &str) -> Result<Self, ChatError> {
        let mut fields = parse_form(body);
        let mut take = |name: &str| {
            fields
                .remove(name)
                .ok_or_else(|| ChatError::InvalidMessage(format!("missing field '{name}'")))
        };
        let msg = Message {
            room: take("room")?,
            username: take("username")?,
            message: take("message")?,
        };
        msg.validate()?;
        Ok(msg)
    }
}

#[derive(Deserialize)]
struct RawEvent {
    room: Option<String>,
    username: Option<String>,
    message: Option<String>,
}

/// Decode an event-stream payload into a [`Message`].
///
/// Returns `None` for invalid JSON, a non-object, or a missing or non-string
/// `room`, `username` or `message` field.
pub fn decode_event(data: &str) -> Option<Message> {
    let raw: RawEvent = serde_json::from_str(data).ok()?;
    Some(Message {
        room: raw.room?,
        username: raw.username?,
        message: raw.message?,
    })
}

/// Percent-decoding for form values (`+` is a space, `%XX` a byte).
///
/// Decoded bytes are reassembled as UTF-8; invalid sequences are replaced.
pub fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => out.push(b' '),
            b'%' => {
                let escaped = bytes
                    .get(i + 1..i + 3)
                    .filter(|hex| hex.iter().all(u8::is_ascii_hexdigit))
                    .and_then(|hex| std::str::from_utf8(hex).ok())
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                match escaped {
                    Some(byte) => {
                        out.push(byte);
                        i += 2;
                    }
                    None => out.push(b'%'),
                }
            }
            b => out.push(b),
        }
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Split a form body into key-value pairs. Later duplicates win.
pub fn parse_form(body: &str) -> HashMap<String, String> {
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let mut parts = pair.splitn(2, '=');
            let key = parts.next().unwrap_or("");
            let val = parts.next().unwrap_or("");
            (url_decode(key), url_decode(val))
        })
        .collect()
}
