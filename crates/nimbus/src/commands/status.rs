//! `nimbus status` handler.

use std::fmt::Write as _;

use chrono::FixedOffset;
use serde_json::Value;
use tabled::Tabled;
use tabled::settings::Style;

use nimbus_api::{NimbusClient, StatusSnapshot};
use nimbus_core::{ApplianceView, Replica, display_in};

use crate::cli::{GlobalOpts, StatusArgs};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

// ── Zone rows ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ZoneRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Zone")]
    name: String,
    #[tabled(rename = "Enabled")]
    enabled: String,
    #[tabled(rename = "Temp °C")]
    temperature: String,
    #[tabled(rename = "Damper")]
    damper: String,
}

fn zone_rows(view: &ApplianceView<'_>, color: bool) -> Vec<ZoneRow> {
    let enabled = view.enabled_zones().unwrap_or_default();
    view.zones()
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(index, zone)| ZoneRow {
            index,
            name: zone
                .get("NV_Title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
            enabled: output::on_off(enabled.get(index).copied(), color),
            temperature: zone
                .get("LiveTemp_oC")
                .and_then(Value::as_f64)
                .map(|t| format!("{t:.1}"))
                .unwrap_or_default(),
            // Damper position is reported in steps of 5%
            damper: zone
                .get("ZonePosition")
                .and_then(Value::as_u64)
                .map(|p| format!("{}%", p * 5))
                .unwrap_or_default(),
        })
        .collect()
}

// ── Detail view ─────────────────────────────────────────────────────

fn celsius(value: Option<f64>) -> String {
    value.map_or_else(|| "-".into(), |v| format!("{v:.1} °C"))
}

fn detail(
    serial: &str,
    snapshot: &StatusSnapshot,
    replica: &Replica,
    offset: FixedOffset,
    color: bool,
) -> String {
    let view = replica.view();
    let mut out = String::new();

    let title = view.system_name().map_or_else(
        || serial.to_owned(),
        |name| format!("{name} ({serial})"),
    );
    let _ = writeln!(out, "{}", output::heading(&title, color));

    let online = if snapshot.is_online {
        "yes".to_owned()
    } else {
        output::warning("no", color)
    };
    let _ = writeln!(out, "  Online:       {online}");
    if let Some(at) = replica.last_observed_at() {
        let _ = writeln!(out, "  Last update:  {}", display_in(at, offset));
    }
    let _ = writeln!(out, "  Power:        {}", output::on_off(view.is_on(), color));
    let _ = writeln!(out, "  Mode:         {}", view.mode().unwrap_or("-"));
    if let Some(fan) = view.fan_mode() {
        let continuous = if fan.continuous { " (continuous)" } else { "" };
        let _ = writeln!(out, "  Fan:          {}{continuous}", fan.speed);
    }
    let _ = writeln!(out, "  Cool setpoint: {}", celsius(view.cool_setpoint()));
    let _ = writeln!(out, "  Heat setpoint: {}", celsius(view.heat_setpoint()));
    let _ = writeln!(out, "  Temperature:  {}", celsius(view.live_temperature()));
    if let Some(humidity) = view.live_humidity() {
        let _ = writeln!(out, "  Humidity:     {humidity:.0}%");
    }
    if view.clean_filter() == Some(true) {
        let _ = writeln!(out, "  {}", output::warning("Filter needs cleaning", color));
    }
    if view.defrosting() == Some(true) {
        let _ = writeln!(out, "  Defrosting");
    }

    let firmware = view.firmware();
    for (label, version) in [
        ("Wall controller", firmware.wall_controller),
        ("Indoor unit", firmware.indoor_unit),
        ("Outdoor unit", firmware.outdoor_unit),
    ] {
        if let Some(version) = version {
            let _ = writeln!(out, "  {label} firmware: {version}");
        }
    }

    if let Some(latest) = view.fault_records().into_iter().find(|r| r.is_fault()) {
        let _ = writeln!(
            out,
            "  {} {} {} ({})",
            output::warning("Last fault:", color),
            latest.code,
            latest.description,
            latest.time
        );
    }

    let zones = zone_rows(&view, color);
    if !zones.is_empty() {
        let table = tabled::Table::new(&zones).with(Style::rounded()).to_string();
        let _ = write!(out, "\n{table}");
    }

    out.trim_end().to_owned()
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    client: &NimbusClient,
    args: StatusArgs,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let offset = config::display_offset(global, cfg)?;
    let snapshot = client.get_snapshot(&args.serial).await?;

    let mut replica = Replica::new();
    replica.apply_snapshot(&snapshot)?;

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &snapshot,
        |s| detail(&args.serial, s, &replica, offset, color),
        |_| {
            output::on_off(replica.view().is_on(), false)
        },
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
