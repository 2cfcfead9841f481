//! Server list status document.
//!
//! Serialized to JSON and carried in [`crate::StatusResponse`]. Field names
//! follow the wire format, so a vanilla client can render the result.

use serde::{Deserialize, Serialize};

use crate::{MINECRAFT_VERSION, PROTOCOL_VERSION, errors::Result};

/// Status document returned for a status request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerStatus {
    /// Version advertised by the server
    pub version: StatusVersion,
    /// Player counts
    pub players: StatusPlayers,
    /// Message of the day
    pub description: StatusDescription,
    /// Base64 PNG data URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

/// Advertised version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusVersion {
    /// Game version name
    pub name: String,
    /// Protocol number
    pub protocol: i32,
}

impl Default for StatusVersion {
    fn default() -> Self {
        Self { name: MINECRAFT_VERSION.to_string(), protocol: PROTOCOL_VERSION }
    }
}

/// Player counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusPlayers {
    /// Capacity
    pub max: u32,
    /// Currently logged in
    pub online: u32,
    /// Sample of online players
    #[serde(default)]
    pub sample: Vec<StatusSample>,
}

/// One entry in the player sample.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSample {
    /// Player name
    pub name: String,
    /// Player uuid
    pub id: String,
}

/// Message of the day as a text component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDescription {
    /// Plain text
    pub text: String,
}

impl ServerStatus {
    /// Status for the current protocol version with an empty player sample.
    pub fn new(motd: impl Into<String>, online: u32, max: u32, favicon: Option<String>) -> Self {
        Self {
            version: StatusVersion::default(),
            players: StatusPlayers { max, online, sample: Vec::new() },
            description: StatusDescription { text: motd.into() },
            favicon,
        }
    }

    /// Serialize to the JSON string sent on the wire.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a status document received from a server.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_document_uses_wire_field_names() {
        let status = ServerStatus::new("A Minecraft server", 3, 20, None);
        let value: serde_json::Value =
            serde_json::from_str(&status.to_json().unwrap()).unwrap();

        assert_eq!(value["version"]["name"], MINECRAFT_VERSION);
        assert_eq!(value["version"]["protocol"], PROTOCOL_VERSION);
        assert_eq!(value["players"]["max"], 20);
        assert_eq!(value["players"]["online"], 3);
        assert_eq!(value["players"]["sample"], serde_json::json!([]));
        assert_eq!(value["description"]["text"], "A Minecraft server");
        assert!(value.get("favicon").is_none());
    }

    #[test]
    fn favicon_is_included_when_set() {
        let favicon = "data:image/png;base64,AAAA".to_string();
        let status = ServerStatus::new("motd", 0, 1, Some(favicon.clone()));
        let parsed = ServerStatus::from_json(&status.to_json().unwrap()).unwrap();
        assert_eq!(parsed.favicon, Some(favicon));
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(ServerStatus::from_json("not json").is_err());
        assert!(ServerStatus::from_json(r#"{"version": 1}"#).is_err());
    }
}
