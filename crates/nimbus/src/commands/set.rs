//! `nimbus set` handlers.

use serde_json::Value;

use nimbus_api::NimbusClient;

use crate::cli::{GlobalOpts, OutputFormat, SetArgs, SetCommand};
use crate::error::CliError;
use crate::output;

pub async fn handle(client: &NimbusClient, args: SetArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let serial = args.serial.as_str();

    let (response, summary) = match args.command {
        SetCommand::Power { state } => {
            let response = if state.is_on() {
                client.turn_on(serial).await?
            } else {
                client.turn_off(serial).await?
            };
            let word = if state.is_on() { "on" } else { "off" };
            (response, format!("Power {word} sent to {serial}"))
        }

        SetCommand::Mode { mode, on } => {
            let is_on = on.then_some(true);
            let response = client
                .set_system_mode(serial, Some(mode.as_remote()), is_on)
                .await?;
            (
                response,
                format!("Mode {} sent to {serial}", mode.as_remote()),
            )
        }

        SetCommand::Fan { speed, continuous } => {
            let response = client
                .set_fan_mode(serial, speed.as_remote(), continuous)
                .await?;
            let suffix = if continuous { " (continuous)" } else { "" };
            (
                response,
                format!("Fan {}{suffix} sent to {serial}", speed.as_remote()),
            )
        }

        SetCommand::Zones { states } => {
            let enabled: Vec<bool> = states.iter().map(|s| s.is_on()).collect();
            let response = client.set_enabled_zones(serial, &enabled).await?;
            let count = enabled.iter().filter(|on| **on).count();
            (
                response,
                format!("Zones sent to {serial} ({count} of {} enabled)", enabled.len()),
            )
        }

        SetCommand::Temp { cool, heat, zone } => {
            for (field, value) in [("cool", cool), ("heat", heat)] {
                if value.is_some_and(|v| !v.is_finite()) {
                    return Err(CliError::Validation {
                        field: field.into(),
                        reason: "must be a finite number".into(),
                    });
                }
            }
            let response = client
                .set_temperature_setpoint(serial, cool, heat, zone)
                .await?;
            let target = zone.map_or_else(|| serial.to_owned(), |z| format!("{serial} zone {z}"));
            (response, format!("Setpoints sent to {target}"))
        }
    };

    report(&response, &summary, global)
}

/// JSON formats echo the service's reply; the rest confirm on stderr.
fn report(response: &Value, summary: &str, global: &GlobalOpts) -> Result<(), CliError> {
    match global.output {
        OutputFormat::Json => output::print_output(&output::render_json(response, false)?, global.quiet),
        OutputFormat::JsonCompact => {
            output::print_output(&output::render_json(response, true)?, global.quiet);
        }
        OutputFormat::Table | OutputFormat::Plain => {
            if !global.quiet {
                eprintln!("{summary}");
            }
        }
    }
    Ok(())
}
