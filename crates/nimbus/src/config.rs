//! CLI configuration: a thin wrapper around `nimbus_config` shared types.
//!
//! Adds resolution that respects `GlobalOpts` flag overrides
//! (--api-url, --pairing-token, --timeout, ...).

use chrono::{FixedOffset, Offset, Utc};
use secrecy::SecretString;

use nimbus_api::ClientConfig;
use nimbus_core::SyncConfig;

use crate::cli::{GlobalOpts, WatchArgs, WatchMode};
use crate::error::CliError;

// ── Re-exports from shared crate ────────────────────────────────────

pub use nimbus_config::{Config, Profile, config_path, load_config_or_default, save_config};

// ── CLI-specific helpers ────────────────────────────────────────────

/// Resolve the active profile name from CLI flags and config.
pub fn active_profile_name(global: &GlobalOpts, config: &Config) -> String {
    global
        .profile
        .clone()
        .unwrap_or_else(|| config.default_profile_name().to_owned())
}

/// The active profile with global flag overrides applied.
///
/// A missing profile is only an error when it was asked for by name and
/// other profiles exist; otherwise flags and defaults stand in for it.
pub fn effective_profile(global: &GlobalOpts, config: &Config) -> Result<(String, Profile), CliError> {
    let name = active_profile_name(global, config);
    let mut profile = match config.profiles.get(&name) {
        Some(profile) => profile.clone(),
        None if global.profile.is_some() && !config.profiles.is_empty() => {
            let mut available: Vec<_> = config.profiles.keys().cloned().collect();
            available.sort();
            return Err(CliError::ProfileNotFound {
                name,
                available: available.join(", "),
            });
        }
        None => Profile::default(),
    };

    if let Some(ref url) = global.api_url {
        profile.api_url = Some(url.clone());
    }
    if let Some(timeout) = global.timeout {
        profile.timeout = Some(timeout);
    }
    if let Some(attempts) = global.max_attempts {
        profile.max_attempts = Some(attempts);
    }
    Ok((name, profile))
}

/// Build the API client configuration.
///
/// `--pairing-token` wins over every source in the profile's chain.
pub fn resolve_client_config(global: &GlobalOpts, config: &Config) -> Result<ClientConfig, CliError> {
    let (name, profile) = effective_profile(global, config)?;
    let client = match global.pairing_token {
        Some(ref token) => nimbus_config::client_config_with_token(
            &profile,
            &config.defaults,
            SecretString::from(token.clone()),
        )?,
        None => nimbus_config::profile_to_client_config(&profile, &name, &config.defaults)?,
    };
    Ok(client)
}

/// Client configuration for calls that need no pairing token.
pub fn resolve_unauthenticated_client_config(
    global: &GlobalOpts,
    config: &Config,
) -> Result<ClientConfig, CliError> {
    let (_, profile) = effective_profile(global, config)?;
    Ok(nimbus_config::client_config_with_token(
        &profile,
        &config.defaults,
        SecretString::from(String::new()),
    )?)
}

/// Offset used when printing timestamps; UTC unless the profile sets one.
pub fn display_offset(global: &GlobalOpts, config: &Config) -> Result<FixedOffset, CliError> {
    let (_, profile) = effective_profile(global, config)?;
    match profile.utc_offset.as_deref() {
        Some(raw) => Ok(nimbus_config::parse_utc_offset(raw)?),
        None => Ok(Utc.fix()),
    }
}

/// Build the sync configuration for `nimbus watch`.
pub fn resolve_sync_config(
    global: &GlobalOpts,
    config: &Config,
    args: &WatchArgs,
) -> Result<SyncConfig, CliError> {
    let (_, mut profile) = effective_profile(global, config)?;

    if !args.serials.is_empty() {
        profile.serials.clone_from(&args.serials);
    }
    if let Some(mode) = args.mode {
        profile.mode = Some(
            match mode {
                WatchMode::Status => "status",
                WatchMode::Events => "events",
            }
            .into(),
        );
    }
    if let Some(interval) = args.interval {
        profile.interval_secs = Some(interval);
    }
    if let Some(tick_timeout) = args.tick_timeout {
        profile.tick_timeout_secs = Some(tick_timeout);
    }

    Ok(nimbus_config::profile_to_sync_config(
        &profile,
        &config.defaults,
    )?)
}
