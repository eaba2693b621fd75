// Bearer-token lifecycle.
//
// A long-lived pairing token is exchanged for a short-lived access token.
// The access token is refreshed proactively, `TOKEN_LEEWAY` before it
// expires, so an authorized call is never sent with a token that is about
// to lapse.

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::error::Error;
use crate::models::TokenResponse;
use crate::transport::{ApiRequest, RequestExecutor};

/// Safety margin subtracted from the expiry before a refresh is forced.
pub const TOKEN_LEEWAY: TimeDelta = TimeDelta::seconds(60);

const TOKEN_PATH: &str = "/api/v0/oauth/token";
const OAUTH_CLIENT_ID: &str = "app";

/// A short-lived bearer credential.
#[derive(Debug, Clone)]
pub struct AccessToken {
    token: SecretString,
    expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: SecretString, expires_at: DateTime<Utc>) -> Self {
        Self { token, expires_at }
    }

    pub fn secret(&self) -> &SecretString {
        &self.token
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// The instant from which this token must no longer be used.
    pub fn renew_at(&self) -> DateTime<Utc> {
        self.expires_at - TOKEN_LEEWAY
    }

    /// Whether a refresh is due at `now`.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now >= self.renew_at()
    }
}

/// Holds the pairing credential and the current access token.
///
/// The token slot is guarded by its own async mutex so that concurrent
/// callers arriving with an expired token trigger one refresh, not many.
pub struct TokenManager {
    token_url: Url,
    pairing_token: SecretString,
    current: Mutex<Option<AccessToken>>,
}

impl TokenManager {
    pub fn new(base_url: &Url, pairing_token: SecretString) -> Result<Self, Error> {
        Ok(Self {
            token_url: base_url.join(TOKEN_PATH)?,
            pairing_token,
            current: Mutex::new(None),
        })
    }

    /// Return a token with more than `TOKEN_LEEWAY` remaining, refreshing
    /// first if none has been obtained yet or the current one is due.
    pub async fn ensure_valid(&self, executor: &RequestExecutor) -> Result<SecretString, Error> {
        let mut slot = self.current.lock().await;
        let now = Utc::now();

        if let Some(token) = slot.as_ref() {
            let renew_at = token.renew_at();
            debug!(
                %renew_at,
                secs_until_renewal = (renew_at - now).num_seconds(),
                "access token renewal schedule"
            );
            if !token.needs_refresh(now) {
                return Ok(token.secret().clone());
            }
        }

        let fresh = self.refresh(executor).await?;
        let secret = fresh.secret().clone();
        *slot = Some(fresh);
        Ok(secret)
    }

    /// Exchange the pairing token for a new access token.
    ///
    /// Fails with `Error::Authentication` when the exchange does not
    /// produce a token.
    pub async fn refresh(&self, executor: &RequestExecutor) -> Result<AccessToken, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );

        let request = ApiRequest::post(self.token_url.clone())
            .with_headers(headers)
            .form(vec![
                ("grant_type".into(), "refresh_token".into()),
                (
                    "refresh_token".into(),
                    self.pairing_token.expose_secret().to_owned(),
                ),
                ("client_id".into(), OAUTH_CLIENT_ID.into()),
            ]);

        let resp = executor
            .execute(&request)
            .await
            .map_err(|e| Error::Authentication {
                message: format!("failed to refresh access token: {e}"),
            })?;
        let payload: TokenResponse = resp.json()?;

        let expires_at = expiry_after(Utc::now(), payload.expires_in)?;
        info!(
            %expires_at,
            expires_in = payload.expires_in,
            "access token refreshed"
        );

        Ok(AccessToken::new(
            SecretString::from(payload.access_token),
            expires_at,
        ))
    }

    /// Drop the current access token so the next call refreshes.
    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
    }

    /// Expiry of the current token, if one is held.
    pub async fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.current.lock().await.as_ref().map(AccessToken::expires_at)
    }
}

/// `now + expires_in` seconds; negative or unrepresentable lifetimes fail.
fn expiry_after(now: DateTime<Utc>, expires_in: i64) -> Result<DateTime<Utc>, Error> {
    if expires_in < 0 {
        return Err(Error::Authentication {
            message: format!("token endpoint returned negative expires_in {expires_in}"),
        });
    }
    TimeDelta::try_seconds(expires_in)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| Error::Authentication {
            message: format!("token endpoint returned out-of-range expires_in {expires_in}"),
        })
}
