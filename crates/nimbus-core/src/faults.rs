// ── Fault history alerts ──
//
// Each appliance keeps a newest-first fault history under
// `Servicing.NV_ErrorHistory`. After every tick the tracker compares the
// current history against the one seen on the previous tick and raises
// an alert for each record that is new since then.
//
// The baseline starts out unknown, not empty: the first history seen by
// this process is recorded silently so a restart does not replay
// historical faults.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

/// Severity value that marks a placeholder record rather than a fault.
pub const NO_ERROR_SEVERITY: &str = "No Error";

/// One decoded fault history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultRecord {
    #[serde(alias = "Code", default)]
    pub code: String,
    #[serde(alias = "Description", default)]
    pub description: String,
    #[serde(alias = "Severity", default)]
    pub severity: String,
    #[serde(alias = "Time", default)]
    pub time: String,
}

impl FaultRecord {
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        Self::deserialize(value).ok()
    }

    pub fn is_fault(&self) -> bool {
        self.severity != NO_ERROR_SEVERITY
    }
}

/// A user-visible notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub title: String,
    pub message: String,
}

impl Alert {
    pub fn for_fault(serial: &str, record: &FaultRecord) -> Self {
        let title = match record.code.as_str() {
            "" => format!("Nimbus {serial}: new fault"),
            code => format!("Nimbus {serial}: fault {code}"),
        };
        let mut message = if record.description.is_empty() {
            "A new fault was recorded".to_owned()
        } else {
            record.description.clone()
        };
        if !record.severity.is_empty() {
            message.push_str(&format!(" (severity: {})", record.severity));
        }
        if !record.time.is_empty() {
            message.push_str(&format!(" at {}", record.time));
        }
        Self { title, message }
    }
}

// ── Sinks ────────────────────────────────────────────────────────────

/// Receives alerts once the tick that produced them has been published.
pub trait AlertSink: Send + Sync {
    fn deliver(&self, alert: &Alert);
}

/// Drops every alert.
#[derive(Debug, Default)]
pub struct NullSink;

impl AlertSink for NullSink {
    fn deliver(&self, _alert: &Alert) {}
}

/// Keeps every alert in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    alerts: Mutex<Vec<Alert>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything delivered so far.
    pub fn drain(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .map(|mut alerts| std::mem::take(&mut *alerts))
            .unwrap_or_default()
    }
}

impl AlertSink for CollectingSink {
    fn deliver(&self, alert: &Alert) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert.clone());
        }
    }
}

// ── Dedup ────────────────────────────────────────────────────────────

/// Records in `current` that are new relative to `previous`: everything
/// ahead of the first entry that also appears in `previous`.
pub fn new_since<'a>(current: &'a [Value], previous: &[Value]) -> &'a [Value] {
    let boundary = current
        .iter()
        .position(|record| previous.contains(record))
        .unwrap_or(current.len());
    &current[..boundary]
}

/// Per-appliance fault history baselines for this process.
#[derive(Debug, Default)]
pub struct FaultTracker {
    baselines: HashMap<String, Vec<Value>>,
}

impl FaultTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a baseline has been recorded for `serial`.
    pub fn has_baseline(&self, serial: &str) -> bool {
        self.baselines.contains_key(serial)
    }

    /// Compare `history` against the stored baseline, store it as the new
    /// baseline, and return alerts for new fault records.
    pub fn observe(&mut self, serial: &str, history: &[Value]) -> Vec<Alert> {
        let alerts = match self.baselines.get(serial) {
            None => {
                debug!(serial, records = history.len(), "recorded initial fault baseline");
                Vec::new()
            }
            Some(previous) => new_since(history, previous)
                .iter()
                .filter_map(FaultRecord::from_value)
                .filter(FaultRecord::is_fault)
                .map(|record| Alert::for_fault(serial, &record))
                .collect(),
        };

        if !alerts.is_empty() {
            info!(serial, count = alerts.len(), "new faults recorded");
        }
        self.baselines.insert(serial.to_owned(), history.to_vec());
        alerts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record(code: &str, severity: &str, time: &str) -> Value {
        json!({ "Code": code, "Description": "Indoor fan fault", "Severity": severity, "Time": time })
    }

    #[test]
    fn first_history_is_silent_then_only_new_faults_alert() {
        let e00 = record("E00", NO_ERROR_SEVERITY, "2025-01-01T00:00:00");
        let e06_old = record("E06", "Error", "2025-03-01T10:00:00");
        let e06_new = record("E06", "Error", "2025-03-07T16:00:00");

        let mut tracker = FaultTracker::new();
        assert!(!tracker.has_baseline("ABC"));

        let first = tracker.observe("ABC", &[e06_old.clone(), e00.clone()]);
        assert!(first.is_empty());
        assert!(tracker.has_baseline("ABC"));

        let second = tracker.observe("ABC", &[e06_new, e06_old, e00]);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].title, "Nimbus ABC: fault E06");
        assert!(second[0].message.contains("2025-03-07T16:00:00"));
    }

    #[test]
    fn unchanged_history_raises_nothing() {
        let history = vec![record("E06", "Error", "t1")];
        let mut tracker = FaultTracker::new();
        tracker.observe("ABC", &history);
        assert!(tracker.observe("ABC", &history).is_empty());
    }

    #[test]
    fn no_error_records_never_alert() {
        let mut tracker = FaultTracker::new();
        tracker.observe("ABC", &[]);
        let alerts = tracker.observe("ABC", &[record("E00", NO_ERROR_SEVERITY, "t2")]);
        assert!(alerts.is_empty());
    }

    #[test]
    fn empty_baseline_is_not_unknown() {
        let mut tracker = FaultTracker::new();
        tracker.observe("ABC", &[]);
        let alerts = tracker.observe("ABC", &[record("E06", "Error", "t1")]);
        assert_eq!(alerts.len(), 1);
    }

    #[test]
    fn baselines_are_per_appliance() {
        let mut tracker = FaultTracker::new();
        tracker.observe("ABC", &[]);
        let alerts = tracker.observe("XYZ", &[record("E06", "Error", "t1")]);
        assert!(alerts.is_empty());
    }

    #[test]
    fn scan_stops_at_first_known_record() {
        let a = record("E01", "Error", "t3");
        let b = record("E02", "Error", "t2");
        let c = record("E03", "Error", "t1");
        // `a` is behind a known record, so it is treated as already seen.
        let current = [b.clone(), c.clone(), a.clone()];
        let fresh = new_since(&current, &[c, a]);
        assert_eq!(fresh, &[b]);
    }

    #[test]
    fn collecting_sink_drains() {
        let sink = CollectingSink::new();
        sink.deliver(&Alert {
            title: "t".into(),
            message: "m".into(),
        });
        assert_eq!(sink.drain().len(), 1);
        assert!(sink.drain().is_empty());
    }
}
