//! The recoverable error taxonomy. Internal invariant
//! violations are not represented here — they are programmer errors and
//! are surfaced via `debug_assert!`/`panic!` at the detection site instead
//! of being threaded through `Result`.

use crate::ids::{DeviceId, EventQueueEntryId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    ConfigSemantic(String),

    #[error("virtual HID device is not ready")]
    VirtualHidUnavailable,

    #[error("device {0:?} was ungrabbed mid-activation")]
    DeviceUngrabbed(DeviceId),

    #[error("timer fired for a stale activation (entry {0:?})")]
    TimerFireOnStaleActivation(EventQueueEntryId),
}
