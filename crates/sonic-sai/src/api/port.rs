//! SAI port API surface: the PFC enable mask.

use std::fmt;

use crate::error::SaiResult;
use crate::types::PortOid;

/// Port statistics the watchdog polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortStat {
    /// PFC frames received for one priority (0..=7).
    PfcRxPkts(u8),
}

impl PortStat {
    /// Returns the SAI counter id name.
    pub fn sai_name(&self) -> String {
        match self {
            PortStat::PfcRxPkts(tc) => format!("SAI_PORT_STAT_PFC_{}_RX_PKTS", tc),
        }
    }
}

impl fmt::Display for PortStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sai_name())
    }
}

/// Port attribute access.
pub trait PortApi: Send + Sync {
    /// Reads SAI_PORT_ATTR_PRIORITY_FLOW_CONTROL; bit n enables PFC on priority n.
    fn get_pfc_mask(&self, port: PortOid) -> SaiResult<u8>;

    /// Writes SAI_PORT_ATTR_PRIORITY_FLOW_CONTROL.
    fn set_pfc_mask(&self, port: PortOid, mask: u8) -> SaiResult<()>;
}
