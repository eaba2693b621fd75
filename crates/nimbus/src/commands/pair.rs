//! `nimbus pair`: exchange account credentials for a pairing token.

use secrecy::{ExposeSecret, SecretString};

use nimbus_api::{NimbusClient, PairingRequest};

use crate::cli::{GlobalOpts, PairArgs};
use crate::config::{self, Profile};
use crate::error::CliError;
use crate::output;

fn read_password() -> Result<SecretString, CliError> {
    if let Ok(password) = std::env::var("NIMBUS_PASSWORD") {
        return Ok(SecretString::from(password));
    }
    let password = rpassword::prompt_password("Nimbus password: ")?;
    if password.is_empty() {
        return Err(CliError::Validation {
            field: "password".into(),
            reason: "must not be empty".into(),
        });
    }
    Ok(SecretString::from(password))
}

pub async fn handle(
    client: &NimbusClient,
    args: PairArgs,
    profile_name: &str,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let request = PairingRequest {
        username: args.username,
        password: read_password()?,
        client: args.client,
        device_name: args.device_name,
        device_unique_id: args.device_id,
    };

    let token = client.request_pairing_token(&request).await?;
    tracing::info!(username = %request.username, "paired with Nimbus account");

    if !args.save {
        output::print_output(token.expose_secret(), global.quiet);
        return Ok(());
    }

    nimbus_config::store_pairing_token(profile_name, &token)?;

    let mut cfg = config::load_config_or_default();
    if !cfg.profiles.contains_key(profile_name) {
        cfg.profiles.insert(profile_name.to_owned(), Profile::default());
        config::save_config(&cfg)?;
    }

    if !global.quiet {
        eprintln!("Pairing token stored in the system keyring for profile '{profile_name}'");
    }
    Ok(())
}
