// nimbus-core: Local state mirror and synchronization loop for Nimbus appliances.

pub mod config;
pub mod error;
pub mod faults;
pub mod path;
pub mod replica;
pub mod sync;
pub mod timestamp;
pub mod view;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::{SyncConfig, SyncMode};
pub use error::CoreError;
pub use faults::{Alert, AlertSink, CollectingSink, FaultRecord, FaultTracker, NullSink};
pub use path::{PatchPath, PathSegment};
pub use replica::{ApplyOutcome, FieldChange, Replica, SyncState, merge_patch};
pub use sync::{ReplicaMap, SyncStatus, Synchronizer, TickReport};
pub use timestamp::{display_in, event_age, parse_timestamp};
pub use view::{ApplianceView, FanMode, Firmware, QuietMode, SetpointLimits, TurboMode};
