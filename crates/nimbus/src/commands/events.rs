//! `nimbus events` handler: one page, or a cursor-following stream.

use std::time::Duration;

use chrono::FixedOffset;
use tabled::Tabled;
use tokio_util::sync::CancellationToken;

use nimbus_api::{ChangeEvent, EventMode, EventStream, NimbusClient};
use nimbus_core::{display_in, parse_timestamp};

use crate::cli::{EventDirection, EventsArgs, GlobalOpts, OutputFormat};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct EventRow {
    #[tabled(rename = "Time")]
    time: String,
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Fields")]
    fields: String,
}

fn event_time(event: &ChangeEvent, offset: FixedOffset) -> String {
    parse_timestamp(&event.timestamp)
        .map_or_else(|_| event.timestamp.clone(), |at| display_in(at, offset))
}

/// Changed paths, shortened for a table cell.
fn field_summary(event: &ChangeEvent) -> String {
    const SHOWN: usize = 3;
    let keys: Vec<&str> = event
        .data
        .keys()
        .map(String::as_str)
        .filter(|k| !k.starts_with('@'))
        .collect();
    match keys.len() {
        0 => String::new(),
        n if n <= SHOWN => keys.join(", "),
        n => format!("{}, +{} more", keys[..SHOWN].join(", "), n - SHOWN),
    }
}

fn row(event: &ChangeEvent, offset: FixedOffset) -> EventRow {
    EventRow {
        time: event_time(event, offset),
        id: event.id.clone(),
        kind: event.kind.clone(),
        fields: field_summary(event),
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(
    client: &NimbusClient,
    args: EventsArgs,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let offset = config::display_offset(global, cfg)?;

    if args.follow {
        return follow(client, args, offset, global).await;
    }

    let mode = match args.mode {
        EventDirection::Latest => EventMode::Latest,
        EventDirection::Newer => EventMode::Newer,
        EventDirection::Older => EventMode::Older,
    };
    let events = client
        .get_events(&args.serial, mode, args.cursor.as_deref())
        .await?
        .into_oldest_first();

    let out = output::render_list(
        &global.output,
        &events,
        |e| row(e, offset),
        |e| e.id.clone(),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}

async fn follow(
    client: &NimbusClient,
    args: EventsArgs,
    offset: FixedOffset,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let mut stream = EventStream::new(client, args.serial)
        .poll_interval(Duration::from_secs(args.poll_interval.max(1)));
    if let Some(cursor) = args.cursor {
        stream = stream.resume_after(cursor);
    }

    let format = global.output.clone();
    let quiet = global.quiet;
    let mut encode_error = None;
    stream
        .run(cancel.clone(), |event| {
            let line = match format {
                OutputFormat::Json | OutputFormat::JsonCompact => {
                    match output::render_json(&event, true) {
                        Ok(line) => line,
                        Err(e) => {
                            encode_error = Some(e);
                            cancel.cancel();
                            return;
                        }
                    }
                }
                OutputFormat::Plain => event.id.clone(),
                OutputFormat::Table => {
                    let r = row(&event, offset);
                    format!("{}  {}  {}  {}", r.time, r.id, r.kind, r.fields)
                }
            };
            output::print_output(&line, quiet);
        })
        .await?;

    encode_error.map_or(Ok(()), Err)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(data: serde_json::Value) -> ChangeEvent {
        serde_json::from_value(json!({
            "id": "e1",
            "timestamp": "2025-03-07T16:35:07.3687629+00:00",
            "type": "status-change-broadcast",
            "data": data
        }))
        .unwrap()
    }

    #[test]
    fn summary_skips_metadata_and_truncates() {
        let e = event(json!({
            "@metadata": {},
            "a": 1, "b": 2, "c": 3, "d": 4, "e": 5
        }));
        let summary = field_summary(&e);
        assert!(!summary.contains('@'));
        assert!(summary.ends_with("+2 more"));
    }

    #[test]
    fn time_uses_display_offset() {
        let e = event(json!({}));
        let offset = FixedOffset::east_opt(10 * 3600).unwrap();
        assert_eq!(event_time(&e, offset), "2025-03-08 02:35:07 +10:00");
    }
}
