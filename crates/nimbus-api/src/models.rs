// Wire types for the Nimbus cloud API.
//
// Only the envelope of each payload is typed. The appliance state tree
// and event `data` maps stay as `serde_json::Value`: their schema
// belongs to the appliance firmware, not to this client.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ── Authentication ───────────────────────────────────────────────────

/// `POST /api/v0/oauth/token` response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime in seconds from the moment of issue.
    pub expires_in: i64,
}

/// `POST /api/v0/client/user-devices` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingResponse {
    pub pairing_token: String,
}

/// Identity presented when pairing a new client device with an account.
#[derive(Debug, Clone)]
pub struct PairingRequest {
    pub username: String,
    pub password: secrecy::SecretString,
    pub client: String,
    pub device_name: String,
    pub device_unique_id: String,
}

// ── Systems ──────────────────────────────────────────────────────────

/// `GET /api/v0/client/ac-systems` response (HAL-style envelope).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemsResponse {
    #[serde(rename = "_embedded", default)]
    pub embedded: SystemsEmbedded,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SystemsEmbedded {
    #[serde(rename = "ac-system", default)]
    pub ac_systems: Vec<AcSystem>,
}

/// One appliance registered to the account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcSystem {
    pub serial: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "type", default)]
    pub system_type: Option<String>,
}

// ── Status ───────────────────────────────────────────────────────────

/// `GET /api/v0/client/ac-systems/status/latest` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub time_since_last_contact: Option<String>,
    /// Remote timestamp, e.g. `2025-03-07T16:35:07.3687629+00:00`.
    pub last_status_update: String,
    /// The complete appliance state tree.
    pub last_known_state: Value,
}

// ── Events ───────────────────────────────────────────────────────────

/// Direction of an event-page query relative to a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventMode {
    /// Most recent page; takes no cursor.
    Latest,
    /// Events strictly newer than the cursor.
    Newer,
    /// Events strictly older than the cursor.
    Older,
}

impl EventMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Latest => "latest",
            Self::Newer => "newer",
            Self::Older => "older",
        }
    }
}

impl std::fmt::Display for EventMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(Self::Latest),
            "newer" => Ok(Self::Newer),
            "older" => Ok(Self::Older),
            other => Err(format!("expected 'latest', 'newer', or 'older', got '{other}'")),
        }
    }
}

/// A page of change events. The remote returns them newest-first.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventPage {
    #[serde(default)]
    pub events: Vec<ChangeEvent>,
}

impl EventPage {
    /// Consume the page, returning events oldest-first.
    ///
    /// The sort is stable, so events sharing a timestamp keep the
    /// relative order the remote gave them.
    pub fn into_oldest_first(self) -> Vec<ChangeEvent> {
        let mut events = self.events;
        events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        events
    }
}

/// One entry in the remote event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub id: String,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

// ── Commands ─────────────────────────────────────────────────────────

/// A `set-settings` command: dotted-path keys mapped to new leaf values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsCommand {
    settings: Map<String, Value>,
}

impl SettingsCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one `path = value` pair.
    pub fn set(mut self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.settings.insert(path.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.settings.is_empty()
    }

    pub fn settings(&self) -> &Map<String, Value> {
        &self.settings
    }

    /// The body accepted by the command endpoint:
    /// `{"command": {"type": "set-settings", ...settings}}`.
    pub fn to_body(&self) -> Value {
        let mut command = Map::with_capacity(self.settings.len() + 1);
        command.insert("type".into(), Value::String("set-settings".into()));
        command.extend(self.settings.clone());
        serde_json::json!({ "command": command })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn event_page_sorts_oldest_first() {
        let page: EventPage = serde_json::from_value(json!({
            "events": [
                { "id": "3", "timestamp": "2025-03-07T16:35:09.1+00:00", "type": "status-change-broadcast", "data": {} },
                { "id": "1", "timestamp": "2025-03-07T16:35:07.3687629+00:00", "type": "full-status-broadcast", "data": {} },
                { "id": "2", "timestamp": "2025-03-07T16:35:08.52+00:00", "type": "status-change-broadcast", "data": {} }
            ]
        }))
        .unwrap();

        let ids: Vec<_> = page.into_oldest_first().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn settings_command_body_shape() {
        let cmd = SettingsCommand::new()
            .set("UserAirconSettings.isOn", true)
            .set("UserAirconSettings.Mode", "COOL");

        assert_eq!(
            cmd.to_body(),
            json!({
                "command": {
                    "type": "set-settings",
                    "UserAirconSettings.isOn": true,
                    "UserAirconSettings.Mode": "COOL"
                }
            })
        );
    }

    #[test]
    fn systems_envelope_parses() {
        let resp: SystemsResponse = serde_json::from_value(json!({
            "_embedded": {
                "ac-system": [
                    { "serial": "ABC123", "description": "Upstairs", "type": "aSystem" }
                ]
            }
        }))
        .unwrap();

        assert_eq!(resp.embedded.ac_systems.len(), 1);
        assert_eq!(resp.embedded.ac_systems[0].serial, "ABC123");
        assert_eq!(
            resp.embedded.ac_systems[0].description.as_deref(),
            Some("Upstairs")
        );
    }

    #[test]
    fn event_mode_round_trips_through_str() {
        for mode in [EventMode::Latest, EventMode::Newer, EventMode::Older] {
            assert_eq!(mode.as_str().parse::<EventMode>().unwrap(), mode);
        }
        assert!("sideways".parse::<EventMode>().is_err());
    }
}
