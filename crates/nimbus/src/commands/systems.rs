//! `nimbus systems` handler.

use tabled::Tabled;

use nimbus_api::{AcSystem, NimbusClient};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct SystemRow {
    #[tabled(rename = "Serial")]
    serial: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Type")]
    system_type: String,
}

impl From<&AcSystem> for SystemRow {
    fn from(s: &AcSystem) -> Self {
        Self {
            serial: s.serial.clone(),
            description: s.description.clone().unwrap_or_default(),
            system_type: s.system_type.clone().unwrap_or_default(),
        }
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(client: &NimbusClient, global: &GlobalOpts) -> Result<(), CliError> {
    let systems = client.list_systems().await?;
    let out = output::render_list(&global.output, &systems, |s| SystemRow::from(s), |s| {
        s.serial.clone()
    })?;
    output::print_output(&out, global.quiet);
    Ok(())
}
