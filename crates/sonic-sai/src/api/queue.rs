//! SAI queue API surface.

use std::fmt;

use crate::error::SaiResult;
use crate::types::{BufferProfileOid, QueueOid};

/// Queue statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueStat {
    Packets,
    DroppedPackets,
    CurrOccupancyBytes,
}

impl QueueStat {
    pub fn sai_name(&self) -> &'static str {
        match self {
            QueueStat::Packets => "SAI_QUEUE_STAT_PACKETS",
            QueueStat::DroppedPackets => "SAI_QUEUE_STAT_DROPPED_PACKETS",
            QueueStat::CurrOccupancyBytes => "SAI_QUEUE_STAT_CURR_OCCUPANCY_BYTES",
        }
    }
}

impl fmt::Display for QueueStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sai_name())
    }
}

/// Queue attributes polled alongside statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueAttr {
    /// Whether the queue is currently paused by PFC.
    PauseStatus,
}

impl QueueAttr {
    pub fn sai_name(&self) -> &'static str {
        match self {
            QueueAttr::PauseStatus => "SAI_QUEUE_ATTR_PAUSE_STATUS",
        }
    }
}

impl fmt::Display for QueueAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sai_name())
    }
}

/// Queue attribute and statistics access.
pub trait QueueApi: Send + Sync {
    /// Reads SAI_QUEUE_ATTR_BUFFER_PROFILE_ID. A null id means no profile.
    fn get_queue_buffer_profile(&self, queue: QueueOid) -> SaiResult<BufferProfileOid>;

    /// Writes SAI_QUEUE_ATTR_BUFFER_PROFILE_ID.
    fn set_queue_buffer_profile(&self, queue: QueueOid, profile: BufferProfileOid)
        -> SaiResult<()>;

    /// Reads the requested statistics, in request order.
    fn get_queue_stats(&self, queue: QueueOid, stats: &[QueueStat]) -> SaiResult<Vec<u64>>;
}
