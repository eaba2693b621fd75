// ── State replica ──
//
// The local mirror of one appliance's state document. The document is
// only ever replaced wholesale (snapshot, full broadcast) or patched
// through `merge_patch`; both publish a new `Arc<Value>` so readers
// holding the previous one keep a consistent view.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use nimbus_api::{ChangeEvent, StatusSnapshot};
use serde_json::{Map, Value};
use tracing::{debug, trace};

use crate::error::CoreError;
use crate::path::{PatchPath, PathSegment};
use crate::timestamp::{event_age, parse_timestamp};
use crate::view::ApplianceView;

/// Event type carrying the complete document.
pub const FULL_STATUS_BROADCAST: &str = "full-status-broadcast";
/// Event type carrying dotted-path leaf updates.
pub const STATUS_CHANGE_BROADCAST: &str = "status-change-broadcast";

/// Keys with this prefix in event data are metadata, not state.
const METADATA_PREFIX: char = '@';

// ── Change reporting ─────────────────────────────────────────────────

/// One leaf whose value differed before and after a patch.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
    pub path: String,
    pub before: Value,
    pub after: Value,
}

/// What applying an event did to the replica.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// Unknown event type, or a patch arriving before any full state.
    Ignored,
    /// The document was replaced by a full broadcast.
    Replaced,
    /// Leaves were patched; only differing values are listed.
    Patched(Vec<FieldChange>),
}

impl ApplyOutcome {
    pub fn changes(&self) -> &[FieldChange] {
        match self {
            Self::Patched(changes) => changes,
            Self::Ignored | Self::Replaced => &[],
        }
    }
}

/// Where a replica stands in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Uninitialized,
    SnapshotSynced,
    EventSynced,
}

// ── Replica ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Replica {
    document: Arc<Value>,
    last_event_id: Option<String>,
    last_observed_at: Option<DateTime<Utc>>,
}

impl Default for Replica {
    fn default() -> Self {
        Self {
            document: Arc::new(Value::Object(Map::new())),
            last_event_id: None,
            last_observed_at: None,
        }
    }
}

impl Replica {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point-in-time reference to the document.
    pub fn document(&self) -> Arc<Value> {
        Arc::clone(&self.document)
    }

    pub fn view(&self) -> ApplianceView<'_> {
        ApplianceView::new(&self.document)
    }

    /// Cursor into the remote event log; `None` until an event is applied.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    pub fn last_observed_at(&self) -> Option<DateTime<Utc>> {
        self.last_observed_at
    }

    pub fn is_empty(&self) -> bool {
        match self.document.as_ref() {
            Value::Null => true,
            Value::Object(map) => map.is_empty(),
            Value::Array(items) => items.is_empty(),
            _ => false,
        }
    }

    pub fn sync_state(&self) -> SyncState {
        if self.last_event_id.is_some() {
            SyncState::EventSynced
        } else if self.last_observed_at.is_some() {
            SyncState::SnapshotSynced
        } else {
            SyncState::Uninitialized
        }
    }

    // ── Snapshot mode ────────────────────────────────────────────────

    /// Replace the document with a full status snapshot.
    ///
    /// The event cursor is left alone: a snapshot says nothing about
    /// which events have been seen.
    pub fn apply_snapshot(&mut self, snapshot: &StatusSnapshot) -> Result<(), CoreError> {
        let observed_at = parse_timestamp(&snapshot.last_status_update)?;
        self.document = Arc::new(snapshot.last_known_state.clone());
        self.last_observed_at = Some(observed_at);
        debug!(%observed_at, online = snapshot.is_online, "applied status snapshot");
        Ok(())
    }

    // ── Event mode ───────────────────────────────────────────────────

    /// Apply one change event.
    ///
    /// A patch is all-or-nothing: it is merged into a copy and the copy
    /// replaces the document only once every key has been applied. On
    /// error the replica is unchanged.
    pub fn apply_event(&mut self, event: &ChangeEvent) -> Result<ApplyOutcome, CoreError> {
        match event.kind.as_str() {
            FULL_STATUS_BROADCAST => {
                let observed_at = parse_timestamp(&event.timestamp)?;
                debug!(
                    event_id = %event.id,
                    %observed_at,
                    age_secs = event_age(observed_at, Utc::now()).as_secs(),
                    "full status broadcast"
                );
                self.document = Arc::new(Value::Object(event.data.clone()));
                self.record_event(event, observed_at);
                Ok(ApplyOutcome::Replaced)
            }
            STATUS_CHANGE_BROADCAST => {
                if self.is_empty() {
                    trace!(event_id = %event.id, "patch before full state, ignored");
                    return Ok(ApplyOutcome::Ignored);
                }
                let observed_at = parse_timestamp(&event.timestamp)?;
                debug!(
                    event_id = %event.id,
                    %observed_at,
                    age_secs = event_age(observed_at, Utc::now()).as_secs(),
                    keys = event.data.len(),
                    "merging status change"
                );

                let mut working = self.document.as_ref().clone();
                let changes = merge_patch(&mut working, &event.data)?;
                self.document = Arc::new(working);
                self.record_event(event, observed_at);
                Ok(ApplyOutcome::Patched(changes))
            }
            other => {
                trace!(event_id = %event.id, kind = other, "ignoring event type");
                Ok(ApplyOutcome::Ignored)
            }
        }
    }

    fn record_event(&mut self, event: &ChangeEvent, observed_at: DateTime<Utc>) {
        self.last_event_id = Some(event.id.clone());
        self.last_observed_at = Some(observed_at);
    }
}

// ── Merge primitive ──────────────────────────────────────────────────

/// Apply every non-metadata `path -> value` pair of `patch` to `document`
/// in place, returning the leaves whose value changed.
///
/// Stops at the first path that does not fit the document; the caller
/// owns atomicity by passing a working copy.
pub fn merge_patch(
    document: &mut Value,
    patch: &Map<String, Value>,
) -> Result<Vec<FieldChange>, CoreError> {
    let mut changes = Vec::new();

    for (key, value) in patch {
        if key.starts_with(METADATA_PREFIX) {
            continue;
        }
        let path = PatchPath::parse(key)?;
        let before = replace_leaf(document, &path, value.clone())?;
        if before != *value {
            trace!(path = %path, %before, after = %value, "leaf changed");
            changes.push(FieldChange {
                path: path.as_str().to_owned(),
                before,
                after: value.clone(),
            });
        }
    }

    Ok(changes)
}

/// Walk to the parent of the terminal segment and swap in `value`,
/// returning the previous leaf.
fn replace_leaf(document: &mut Value, path: &PatchPath, value: Value) -> Result<Value, CoreError> {
    let Some((last, parents)) = path.segments().split_last() else {
        return Err(CoreError::InvalidPath {
            path: path.to_string(),
            reason: "no segments".into(),
        });
    };

    let mut node = document;
    for segment in parents {
        node = step(node, segment, path)?;
    }
    let slot = step(node, last, path)?;
    Ok(std::mem::replace(slot, value))
}

fn step<'a>(
    node: &'a mut Value,
    segment: &PathSegment,
    path: &PatchPath,
) -> Result<&'a mut Value, CoreError> {
    let inconsistency = |reason: String| CoreError::MergeInconsistency {
        path: path.to_string(),
        reason,
    };

    match (segment, node) {
        (PathSegment::Key(key), Value::Object(map)) => map
            .get_mut(key)
            .ok_or_else(|| inconsistency(format!("key '{key}' not found"))),
        (PathSegment::Index(index), Value::Array(items)) => {
            let len = items.len();
            items
                .get_mut(*index)
                .ok_or_else(|| inconsistency(format!("index {index} out of bounds (len {len})")))
        }
        (segment, other) => Err(inconsistency(format!(
            "cannot step into {} with '{segment}'",
            kind_of(other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a sequence",
        Value::Object(_) => "a mapping",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn event(id: &str, timestamp: &str, kind: &str, data: Value) -> ChangeEvent {
        ChangeEvent {
            id: id.into(),
            timestamp: timestamp.into(),
            kind: kind.into(),
            data: object(data),
        }
    }

    fn full_state() -> Value {
        json!({
            "UserAirconSettings": {
                "isOn": false,
                "Mode": "COOL",
                "EnabledZones": [true, false, true]
            },
            "RemoteZoneInfo": [
                { "TemperatureSetpoint_Cool_oC": 24.0 },
                { "TemperatureSetpoint_Cool_oC": 23.0 },
                { "TemperatureSetpoint_Cool_oC": 22.0 }
            ]
        })
    }

    fn seeded() -> Replica {
        let mut replica = Replica::new();
        replica
            .apply_event(&event(
                "e0",
                "2025-03-07T16:35:00.1+00:00",
                FULL_STATUS_BROADCAST,
                full_state(),
            ))
            .unwrap();
        replica
    }

    fn patch(id: &str, data: Value) -> ChangeEvent {
        event(id, "2025-03-07T16:35:07.3687629+00:00", STATUS_CHANGE_BROADCAST, data)
    }

    #[test]
    fn patch_reports_only_changed_leaves() {
        let mut replica = seeded();
        let outcome = replica
            .apply_event(&patch(
                "e1",
                json!({
                    "@metadata": { "connectionId": "abc" },
                    "UserAirconSettings.isOn": true,
                    "UserAirconSettings.Mode": "COOL",
                    "RemoteZoneInfo[2].TemperatureSetpoint_Cool_oC": 21.5
                }),
            ))
            .unwrap();

        let mut changes = outcome.changes().to_vec();
        changes.sort_by(|a, b| a.path.cmp(&b.path));
        assert_eq!(
            changes,
            vec![
                FieldChange {
                    path: "RemoteZoneInfo[2].TemperatureSetpoint_Cool_oC".into(),
                    before: json!(22.0),
                    after: json!(21.5),
                },
                FieldChange {
                    path: "UserAirconSettings.isOn".into(),
                    before: json!(false),
                    after: json!(true),
                },
            ]
        );
        assert_eq!(replica.view().is_on(), Some(true));
        assert_eq!(replica.last_event_id(), Some("e1"));
        assert!(replica.document().get("@metadata").is_none());
    }

    #[test]
    fn applying_same_patch_twice_is_idempotent() {
        let mut replica = seeded();
        let e = patch("e1", json!({ "UserAirconSettings.EnabledZones[1]": true }));

        let first = replica.apply_event(&e).unwrap();
        let after_first = replica.document();
        let second = replica.apply_event(&e).unwrap();

        assert_eq!(first.changes().len(), 1);
        assert_eq!(second, ApplyOutcome::Patched(Vec::new()));
        assert_eq!(replica.document(), after_first);
    }

    #[test]
    fn overlapping_patches_are_order_sensitive() {
        let a = patch("a", json!({ "UserAirconSettings.Mode": "HEAT" }));
        let b = patch("b", json!({ "UserAirconSettings.Mode": "AUTO" }));

        let mut ab = seeded();
        ab.apply_event(&a).unwrap();
        ab.apply_event(&b).unwrap();

        let mut ba = seeded();
        ba.apply_event(&b).unwrap();
        ba.apply_event(&a).unwrap();

        assert_eq!(ab.view().mode(), Some("AUTO"));
        assert_eq!(ba.view().mode(), Some("HEAT"));
    }

    #[test]
    fn snapshot_supersedes_and_keeps_cursor() {
        let mut replica = seeded();
        replica
            .apply_event(&patch("e1", json!({ "UserAirconSettings.Mode": "HEAT" })))
            .unwrap();

        let snapshot: StatusSnapshot = serde_json::from_value(json!({
            "isOnline": true,
            "lastStatusUpdate": "2025-03-07T17:00:00.5+00:00",
            "lastKnownState": { "UserAirconSettings": { "isOn": true, "Mode": "FAN" } }
        }))
        .unwrap();
        replica.apply_snapshot(&snapshot).unwrap();

        assert_eq!(
            replica.document().as_ref(),
            &json!({ "UserAirconSettings": { "isOn": true, "Mode": "FAN" } })
        );
        assert_eq!(replica.last_event_id(), Some("e1"));
        assert_eq!(
            replica.last_observed_at().unwrap().to_rfc3339(),
            "2025-03-07T17:00:00+00:00"
        );
        assert_eq!(replica.sync_state(), SyncState::EventSynced);
    }

    #[test]
    fn patch_on_empty_document_is_ignored() {
        let mut replica = Replica::new();
        let outcome = replica
            .apply_event(&patch("e1", json!({ "UserAirconSettings.isOn": true })))
            .unwrap();

        assert_eq!(outcome, ApplyOutcome::Ignored);
        assert!(replica.is_empty());
        assert_eq!(replica.last_event_id(), None);
        assert_eq!(replica.sync_state(), SyncState::Uninitialized);
    }

    #[test]
    fn unknown_event_type_is_ignored() {
        let mut replica = seeded();
        let before = replica.document();
        let outcome = replica
            .apply_event(&event(
                "e9",
                "2025-03-07T16:40:00+00:00",
                "cmd-acknowledged",
                json!({ "UserAirconSettings.isOn": true }),
            ))
            .unwrap();

        assert_eq!(outcome, ApplyOutcome::Ignored);
        assert_eq!(replica.document(), before);
        assert_eq!(replica.last_event_id(), Some("e0"));
    }

    #[test]
    fn malformed_path_leaves_replica_untouched() {
        let mut replica = seeded();
        let before = replica.document();

        let err = replica
            .apply_event(&patch(
                "e1",
                json!({
                    "UserAirconSettings.isOn": true,
                    "RemoteZoneInfo[7].TemperatureSetpoint_Cool_oC": 20.0
                }),
            ))
            .unwrap_err();

        assert!(matches!(err, CoreError::MergeInconsistency { .. }), "{err:?}");
        assert_eq!(replica.document(), before);
        assert_eq!(replica.last_event_id(), Some("e0"));
    }

    #[test]
    fn missing_intermediate_key_fails() {
        let mut doc = full_state();
        let err = merge_patch(&mut doc, &object(json!({ "LiveAircon.FanRPM": 900 }))).unwrap_err();
        assert!(matches!(err, CoreError::MergeInconsistency { .. }));
    }

    #[test]
    fn index_into_mapping_fails() {
        let mut doc = full_state();
        let err =
            merge_patch(&mut doc, &object(json!({ "UserAirconSettings[0]": 1 }))).unwrap_err();
        assert!(matches!(err, CoreError::MergeInconsistency { .. }));
    }

    #[test]
    fn full_broadcast_replaces_document() {
        let mut replica = seeded();
        let outcome = replica
            .apply_event(&event(
                "e5",
                "2025-03-07T18:00:00+00:00",
                FULL_STATUS_BROADCAST,
                json!({ "UserAirconSettings": { "isOn": true } }),
            ))
            .unwrap();

        assert_eq!(outcome, ApplyOutcome::Replaced);
        assert_eq!(
            replica.document().as_ref(),
            &json!({ "UserAirconSettings": { "isOn": true } })
        );
        assert_eq!(replica.last_event_id(), Some("e5"));
    }

    #[test]
    fn readers_keep_their_reference_across_patches() {
        let mut replica = seeded();
        let held = replica.document();
        replica
            .apply_event(&patch("e1", json!({ "UserAirconSettings.isOn": true })))
            .unwrap();

        assert_eq!(held["UserAirconSettings"]["isOn"], json!(false));
        assert_eq!(replica.document()["UserAirconSettings"]["isOn"], json!(true));
    }
}
