//! Embedded world payload carried in the EXIF MakerNote.
//!
//! Some capture tools write a JSON document describing the virtual world a
//! screenshot was taken in. It arrives either HTML-escaped (`&quot;` for
//! quotes) or base64-encoded:
//!
//! ```json
//! {
//!   "room": {
//!     "world_id": "wrld_…",
//!     "world_name": "The Great Pug",
//!     "organizer": "usr_…",
//!     "permission": "friends"
//!   },
//!   "players": ["alice", "bob"]
//! }
//! ```

use base64::{Engine, prelude::BASE64_STANDARD};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("base64 decode failed: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("payload is not UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
    #[error("payload JSON invalid: {0}")]
    Json(#[from] serde_json::Error),
}

/// Visibility of the world instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Permission {
    #[serde(rename = "private")]
    Private,
    #[serde(rename = "private+")]
    PrivatePlus,
    #[serde(rename = "friends")]
    Friends,
    #[serde(rename = "hidden")]
    Hidden,
    #[serde(rename = "group")]
    Group,
    #[serde(rename = "public")]
    Public,
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Permission::Private => "private",
            Permission::PrivatePlus => "private+",
            Permission::Friends => "friends",
            Permission::Hidden => "hidden",
            Permission::Group => "group",
            Permission::Public => "public",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Room {
    pub world_id: String,
    pub world_name: String,
    pub organizer: Option<String>,
    pub permission: Option<Permission>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorldPayload {
    pub room: Room,
    #[serde(default)]
    pub players: Vec<String>,
}

impl WorldPayload {
    /// `world:<name>` followed by `player:<id>` for each distinct player,
    /// in first-seen order.
    pub fn tags(&self) -> Vec<String> {
        let mut tags = vec![format!("world:{}", self.room.world_name)];
        let mut seen: Vec<&str> = Vec::new();
        for player in &self.players {
            if !seen.contains(&player.as_str()) {
                seen.push(player);
                tags.push(format!("player:{player}"));
            }
        }
        tags
    }
}

/// Decode a MakerNote payload string.
pub fn decode_payload(raw: &str) -> Result<WorldPayload, PayloadError> {
    let json = if raw.contains("&quot;") {
        raw.replace("&quot;", "\"")
    } else {
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        String::from_utf8(BASE64_STANDARD.decode(compact)?)?
    };
    Ok(serde_json::from_str(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: &str = r#"{"room":{"world_id":"wrld_1","world_name":"Pug","organizer":"usr_9","permission":"private+"},"players":["alice","bob","alice"]}"#;

    #[test]
    fn decodes_html_escaped_payload() {
        let escaped = JSON.replace('"', "&quot;");
        let payload = decode_payload(&escaped).unwrap();
        assert_eq!(payload.room.world_id, "wrld_1");
        assert_eq!(payload.room.permission, Some(Permission::PrivatePlus));
    }

    #[test]
    fn decodes_base64_payload() {
        let encoded = BASE64_STANDARD.encode(JSON);
        let payload = decode_payload(&encoded).unwrap();
        assert_eq!(payload.room.world_name, "Pug");
        assert_eq!(payload.room.organizer.as_deref(), Some("usr_9"));
    }

    #[test]
    fn tags_dedupe_players_in_order() {
        let payload = decode_payload(&BASE64_STANDARD.encode(JSON)).unwrap();
        assert_eq!(
            payload.tags(),
            vec!["world:Pug", "player:alice", "player:bob"]
        );
    }

    #[test]
    fn bad_base64_is_reported() {
        assert!(matches!(
            decode_payload("not base64 at all!"),
            Err(PayloadError::Base64(_))
        ));
    }

    #[test]
    fn malformed_json_is_reported() {
        let encoded = BASE64_STANDARD.encode(r#"{"room": {}}"#);
        assert!(matches!(decode_payload(&encoded), Err(PayloadError::Json(_))));
    }

    #[test]
    fn unknown_permission_is_rejected() {
        let escaped = JSON.replace("private+", "secret").replace('"', "&quot;");
        assert!(matches!(decode_payload(&escaped), Err(PayloadError::Json(_))));
    }
}
