use serde::{Deserialize, Serialize};

/// Counter key shared by every event type.
pub const TYPE_GLOBAL: &str = "TYPE_GLOBAL";

/// Identity issued to an event by the cross-process sequencer.
///
/// Both halves are the counter values *before* the increment that issued
/// them. Counters start at 1; `0` means "not sequenced".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequenceId {
    pub global_id: i64,
    pub per_type_id: i64,
}
