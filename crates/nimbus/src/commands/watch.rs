//! `nimbus watch`: run the sync loop in the foreground.
//!
//! Prints a line whenever a system's mirrored state changes and reports
//! new faults through a terminal alert sink. Stops on Ctrl-C.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{FixedOffset, Utc};
use owo_colors::OwoColorize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use nimbus_api::NimbusClient;
use nimbus_core::{Alert, AlertSink, Replica, Synchronizer, display_in};

use crate::cli::{GlobalOpts, OutputFormat, WatchArgs};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

// ── Alert sink ──────────────────────────────────────────────────────

/// Writes fault alerts to stderr.
struct TerminalSink {
    color: bool,
}

impl AlertSink for TerminalSink {
    fn deliver(&self, alert: &Alert) {
        if self.color {
            eprintln!("{} {}", alert.title.bold().red(), alert.message);
        } else {
            eprintln!("{} {}", alert.title, alert.message);
        }
    }
}

// ── Change lines ────────────────────────────────────────────────────

fn summary_line(serial: &str, replica: &Replica, offset: FixedOffset, color: bool) -> String {
    let view = replica.view();
    let mut parts = vec![output::on_off(view.is_on(), color)];
    if let Some(mode) = view.mode() {
        parts.push(mode.to_owned());
    }
    if let Some(fan) = view.fan_mode() {
        parts.push(format!("fan {}", fan.mode));
    }
    if let Some(temp) = view.live_temperature() {
        parts.push(format!("{temp:.1}°C"));
    }
    if let Some(cool) = view.cool_setpoint() {
        parts.push(format!("cool→{cool:.1}"));
    }
    if let Some(heat) = view.heat_setpoint() {
        parts.push(format!("heat→{heat:.1}"));
    }
    let at = replica
        .last_observed_at()
        .unwrap_or_else(Utc::now);
    format!(
        "{}  {}  {}",
        display_in(at, offset),
        output::heading(serial, color),
        parts.join("  ")
    )
}

/// Print every replica whose document changed since the last call.
fn print_changes(
    sync: &Synchronizer,
    seen: &mut HashMap<String, Arc<Value>>,
    offset: FixedOffset,
    global: &GlobalOpts,
    color: bool,
) -> Result<(), CliError> {
    let replicas = sync.replicas();
    let mut serials: Vec<&String> = replicas.keys().collect();
    serials.sort();

    for serial in serials {
        let Some(replica) = replicas.get(serial) else {
            continue;
        };
        let document = replica.document();
        if seen
            .get(serial)
            .is_some_and(|prev| Arc::ptr_eq(prev, &document) || **prev == *document)
        {
            continue;
        }

        let line = match global.output {
            OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(
                &json!({ "serial": serial, "state": document.as_ref() }),
                true,
            )?,
            OutputFormat::Plain => serial.clone(),
            OutputFormat::Table => summary_line(serial, replica, offset, color),
        };
        output::print_output(&line, global.quiet);
        seen.insert(serial.clone(), document);
    }
    Ok(())
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    client: NimbusClient,
    args: WatchArgs,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let sync_config = config::resolve_sync_config(global, cfg, &args)?;
    let offset = sync_config.display_offset;
    let color = output::should_color(&global.color);

    let sink = Arc::new(TerminalSink { color });
    let sync = Arc::new(Synchronizer::new(Arc::new(client), sync_config, sink)?);
    let mut status = sync.subscribe_status();

    let cancel = CancellationToken::new();
    let runner = {
        let sync = Arc::clone(&sync);
        let cancel = cancel.clone();
        tokio::spawn(async move { sync.run(cancel).await })
    };

    let mut seen = HashMap::new();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                break;
            }
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = status.borrow_and_update().clone();
                if current.consecutive_failures > 0 {
                    if let Some(ref error) = current.last_error {
                        let msg = format!(
                            "sync failed ({} in a row): {error}",
                            current.consecutive_failures
                        );
                        eprintln!("{}", output::warning(&msg, color));
                    }
                    continue;
                }
                if let Err(e) = print_changes(&sync, &mut seen, offset, global, color) {
                    cancel.cancel();
                    return Err(e);
                }
            }
        }
    }

    // The loop exits at its next cancellation point
    if let Err(e) = runner.await {
        tracing::warn!(error = %e, "sync task ended abnormally");
    }
    Ok(())
}
