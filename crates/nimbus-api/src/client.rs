// Nimbus cloud API client
//
// Typed operations over the serialized `RequestExecutor`. Every
// authorized call first asks the `TokenManager` for a valid bearer token,
// then sends through the executor with an `Authorization` header.

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::models::{
    AcSystem, EventMode, EventPage, PairingRequest, PairingResponse, SettingsCommand,
    StatusSnapshot, SystemsResponse,
};
use crate::session::TokenManager;
use crate::transport::{ApiRequest, RequestExecutor, TransportConfig};

/// Production API root.
pub const DEFAULT_BASE_URL: &str = "https://nimbus.actronair.com.au";

/// Suffix the appliance uses to mark a continuous fan mode (e.g. `LOW+CONT`).
pub const CONTINUOUS_FAN_SUFFIX: &str = "+CONT";

/// Everything needed to construct a [`NimbusClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub pairing_token: SecretString,
    pub transport: TransportConfig,
}

impl ClientConfig {
    pub fn new(base_url: Url, pairing_token: SecretString) -> Self {
        Self {
            base_url,
            pairing_token,
            transport: TransportConfig::default(),
        }
    }
}

/// Async client for the Nimbus cloud API.
///
/// One client talks for one account; the executor lock it owns serializes
/// every call it makes, including token refreshes.
pub struct NimbusClient {
    base_url: Url,
    executor: RequestExecutor,
    tokens: TokenManager,
}

impl NimbusClient {
    // ── Constructors ─────────────────────────────────────────────────

    pub fn new(config: &ClientConfig) -> Result<Self, Error> {
        let executor = RequestExecutor::new(&config.transport)?;
        Self::with_executor(config.base_url.clone(), config.pairing_token.clone(), executor)
    }

    /// Build around a pre-configured executor (tests, custom HTTP stacks).
    pub fn with_executor(
        base_url: Url,
        pairing_token: SecretString,
        executor: RequestExecutor,
    ) -> Result<Self, Error> {
        let tokens = TokenManager::new(&base_url, pairing_token)?;
        Ok(Self {
            base_url,
            executor,
            tokens,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn tokens(&self) -> &TokenManager {
        &self.tokens
    }

    // ── URL builder ──────────────────────────────────────────────────

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, Error> {
        let mut url = self.base_url.join(path)?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    // ── Authorized request helpers ───────────────────────────────────

    async fn authorized<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, Error> {
        let token = self.tokens.ensure_valid(&self.executor).await?;

        let mut headers = HeaderMap::new();
        let mut bearer = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|e| Error::Authentication {
                message: format!("invalid access token header value: {e}"),
            })?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        match self.executor.execute(&request.with_headers(headers)).await {
            Ok(resp) => resp.json(),
            Err(e) => {
                // A rejected token will not recover by itself; force a
                // refresh on the next call.
                if e.is_auth_rejected() {
                    self.tokens.invalidate().await;
                }
                Err(e)
            }
        }
    }

    // ── Account ──────────────────────────────────────────────────────

    /// Pair a new client device with the account, returning the
    /// long-lived pairing token used for all subsequent token refreshes.
    ///
    /// This call is unauthenticated; it does not touch the token manager.
    pub async fn request_pairing_token(&self, pairing: &PairingRequest) -> Result<SecretString, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );

        let request = ApiRequest::post(self.url("/api/v0/client/user-devices", &[])?)
            .with_headers(headers)
            .form(vec![
                ("username".into(), pairing.username.clone()),
                ("password".into(), pairing.password.expose_secret().to_owned()),
                ("client".into(), pairing.client.clone()),
                ("deviceName".into(), pairing.device_name.clone()),
                ("deviceUniqueIdentifier".into(), pairing.device_unique_id.clone()),
            ]);

        let resp = self
            .executor
            .execute(&request)
            .await
            .map_err(|e| Error::Authentication {
                message: format!("pairing request failed: {e}"),
            })?;
        let payload: PairingResponse = resp.json()?;
        Ok(SecretString::from(payload.pairing_token))
    }

    /// List the appliances registered to the account.
    pub async fn list_systems(&self) -> Result<Vec<AcSystem>, Error> {
        let url = self.url("/api/v0/client/ac-systems", &[("includeNeo", "true")])?;
        let resp: SystemsResponse = self.authorized(ApiRequest::get(url)).await?;
        Ok(resp.embedded.ac_systems)
    }

    // ── State ────────────────────────────────────────────────────────

    /// Fetch the latest full status document for one appliance.
    pub async fn get_snapshot(&self, serial: &str) -> Result<StatusSnapshot, Error> {
        let url = self.url(
            "/api/v0/client/ac-systems/status/latest",
            &[("serial", serial)],
        )?;
        self.authorized(ApiRequest::get(url)).await
    }

    /// Fetch a page of change events.
    ///
    /// `Newer` and `Older` are anchored on `cursor` and fail with
    /// `Error::InvalidRequest` without one. The page is returned in the
    /// remote's order (newest-first); see [`EventPage::into_oldest_first`].
    pub async fn get_events(
        &self,
        serial: &str,
        mode: EventMode,
        cursor: Option<&str>,
    ) -> Result<EventPage, Error> {
        let url = match (mode, cursor) {
            (EventMode::Latest, _) => self.url(
                "/api/v0/client/ac-systems/events/latest",
                &[("serial", serial)],
            )?,
            (EventMode::Newer, Some(id)) => self.url(
                "/api/v0/client/ac-systems/events/newer",
                &[("serial", serial), ("newerThanEventId", id)],
            )?,
            (EventMode::Older, Some(id)) => self.url(
                "/api/v0/client/ac-systems/events/older",
                &[("serial", serial), ("olderThanEventId", id)],
            )?,
            (mode, None) => {
                return Err(Error::InvalidRequest(format!(
                    "'{mode}' event query requires a cursor"
                )));
            }
        };

        let page: EventPage = self.authorized(ApiRequest::get(url)).await?;
        debug!(serial, %mode, count = page.events.len(), "fetched event page");
        Ok(page)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Send a raw command body to one appliance.
    pub async fn send_command(&self, serial: &str, command: Value) -> Result<Value, Error> {
        let url = self.url(
            "/api/v0/client/ac-systems/cmds/send",
            &[("serial", serial)],
        )?;
        self.authorized(ApiRequest::new(Method::POST, url).json(command))
            .await
    }

    /// Send a `set-settings` command.
    pub async fn set_settings(&self, serial: &str, settings: &SettingsCommand) -> Result<Value, Error> {
        if settings.is_empty() {
            return Err(Error::InvalidRequest("no settings to send".into()));
        }
        debug!(serial, keys = ?settings.settings().keys().collect::<Vec<_>>(), "sending settings");
        self.send_command(serial, settings.to_body()).await
    }

    /// Switch power, operating mode, or both in one command.
    pub async fn set_system_mode(
        &self,
        serial: &str,
        mode: Option<&str>,
        is_on: Option<bool>,
    ) -> Result<Value, Error> {
        self.set_settings(serial, &system_mode_settings(mode, is_on))
            .await
    }

    /// Set the operating mode (`COOL`, `HEAT`, `AUTO`, `FAN_ONLY`, ...).
    pub async fn set_mode(&self, serial: &str, mode: &str) -> Result<Value, Error> {
        self.set_system_mode(serial, Some(mode), None).await
    }

    pub async fn turn_on(&self, serial: &str) -> Result<Value, Error> {
        self.set_system_mode(serial, None, Some(true)).await
    }

    pub async fn turn_off(&self, serial: &str) -> Result<Value, Error> {
        self.set_system_mode(serial, None, Some(false)).await
    }

    /// Set the fan speed, optionally in continuous mode.
    pub async fn set_fan_mode(&self, serial: &str, mode: &str, continuous: bool) -> Result<Value, Error> {
        self.set_settings(serial, &fan_mode_settings(mode, continuous))
            .await
    }

    /// Replace the per-zone enabled flags.
    pub async fn set_enabled_zones(&self, serial: &str, enabled: &[bool]) -> Result<Value, Error> {
        let settings =
            SettingsCommand::new().set("UserAirconSettings.EnabledZones", enabled.to_vec());
        self.set_settings(serial, &settings).await
    }

    /// Set cooling and/or heating setpoints, system-wide or for one zone.
    pub async fn set_temperature_setpoint(
        &self,
        serial: &str,
        cool: Option<f64>,
        heat: Option<f64>,
        zone: Option<usize>,
    ) -> Result<Value, Error> {
        self.set_settings(serial, &setpoint_settings(cool, heat, zone))
            .await
    }
}

// ── Settings builders ────────────────────────────────────────────────

fn system_mode_settings(mode: Option<&str>, is_on: Option<bool>) -> SettingsCommand {
    let mut settings = SettingsCommand::new();
    if let Some(on) = is_on {
        settings = settings.set("UserAirconSettings.isOn", on);
    }
    if let Some(mode) = mode {
        settings = settings.set("UserAirconSettings.Mode", mode);
    }
    settings
}

fn fan_mode_settings(mode: &str, continuous: bool) -> SettingsCommand {
    let mode = if continuous && !mode.ends_with(CONTINUOUS_FAN_SUFFIX) {
        format!("{mode}{CONTINUOUS_FAN_SUFFIX}")
    } else {
        mode.to_owned()
    };
    SettingsCommand::new().set("UserAirconSettings.FanMode", mode)
}

fn setpoint_settings(cool: Option<f64>, heat: Option<f64>, zone: Option<usize>) -> SettingsCommand {
    let prefix = zone.map_or_else(
        || "UserAirconSettings".to_owned(),
        |index| format!("RemoteZoneInfo[{index}]"),
    );

    let mut settings = SettingsCommand::new();
    if let Some(cool) = cool {
        settings = settings.set(format!("{prefix}.TemperatureSetpoint_Cool_oC"), cool);
    }
    if let Some(heat) = heat {
        settings = settings.set(format!("{prefix}.TemperatureSetpoint_Heat_oC"), heat);
    }
    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn zone_setpoint_addresses_remote_zone_info() {
        let settings = setpoint_settings(Some(22.5), None, Some(2));
        assert_eq!(
            Value::Object(settings.settings().clone()),
            json!({ "RemoteZoneInfo[2].TemperatureSetpoint_Cool_oC": 22.5 })
        );
    }

    #[test]
    fn system_setpoint_addresses_user_settings() {
        let settings = setpoint_settings(Some(24.0), Some(19.0), None);
        assert_eq!(
            Value::Object(settings.settings().clone()),
            json!({
                "UserAirconSettings.TemperatureSetpoint_Cool_oC": 24.0,
                "UserAirconSettings.TemperatureSetpoint_Heat_oC": 19.0
            })
        );
    }

    #[test]
    fn continuous_fan_suffix_added_once() {
        let settings = fan_mode_settings("LOW", true);
        assert_eq!(settings.settings()["UserAirconSettings.FanMode"], "LOW+CONT");

        let settings = fan_mode_settings("LOW+CONT", true);
        assert_eq!(settings.settings()["UserAirconSettings.FanMode"], "LOW+CONT");

        let settings = fan_mode_settings("HIGH", false);
        assert_eq!(settings.settings()["UserAirconSettings.FanMode"], "HIGH");
    }

    #[test]
    fn power_and_mode_combine() {
        assert!(system_mode_settings(None, None).is_empty());

        let settings = system_mode_settings(Some("HEAT"), Some(true));
        assert_eq!(
            Value::Object(settings.settings().clone()),
            json!({
                "UserAirconSettings.isOn": true,
                "UserAirconSettings.Mode": "HEAT"
            })
        );
    }
}
