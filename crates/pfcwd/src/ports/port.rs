//! Port struct and the inventory lookup interface.

use serde::Deserialize;
use sonic_sai::{IngressPriorityGroupOid, PortOid, QueueOid};
use std::fmt;

/// Port type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PortType {
    /// Physical port (front-panel port).
    #[default]
    Phy,
    /// CPU port (for control plane traffic).
    Cpu,
    /// VLAN port (SVI).
    Vlan,
    /// LAG (Link Aggregation Group) port.
    Lag,
    /// Subport (VLAN subinterface).
    Subport,
    /// System port (for VOQ/distributed systems).
    System,
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Phy => write!(f, "PHY"),
            Self::Cpu => write!(f, "CPU"),
            Self::Vlan => write!(f, "VLAN"),
            Self::Lag => write!(f, "LAG"),
            Self::Subport => write!(f, "SUBPORT"),
            Self::System => write!(f, "SYSTEM"),
        }
    }
}

impl std::str::FromStr for PortType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PHY" => Ok(Self::Phy),
            "CPU" => Ok(Self::Cpu),
            "VLAN" => Ok(Self::Vlan),
            "LAG" => Ok(Self::Lag),
            "SUBPORT" => Ok(Self::Subport),
            "SYSTEM" => Ok(Self::System),
            _ => Err(format!("Unknown port type: {}", s)),
        }
    }
}

/// A port and the per-traffic-class objects hanging off it.
///
/// `queue_ids[tc]` and `pg_ids[tc]` are the unicast queue and ingress
/// priority group of traffic class `tc`. Either list may be shorter than
/// eight on platforms with fewer objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    pub alias: String,
    pub port_type: PortType,
    pub port_id: PortOid,
    pub queue_ids: Vec<QueueOid>,
    pub pg_ids: Vec<IngressPriorityGroupOid>,
}

impl Port {
    pub fn new(alias: impl Into<String>, port_type: PortType, port_id: PortOid) -> Self {
        Self {
            alias: alias.into(),
            port_type,
            port_id,
            queue_ids: Vec::new(),
            pg_ids: Vec::new(),
        }
    }

    pub fn is_physical(&self) -> bool {
        self.port_type == PortType::Phy
    }

    /// Returns the queue of a traffic class, if the port has one.
    pub fn queue_id(&self, tc: u8) -> Option<QueueOid> {
        self.queue_ids.get(usize::from(tc)).copied()
    }

    /// Returns the ingress priority group of a traffic class.
    pub fn pg_id(&self, tc: u8) -> Option<IngressPriorityGroupOid> {
        self.pg_ids.get(usize::from(tc)).copied()
    }
}

/// Port lookup provided by the port orchestrator.
pub trait PortInventory: Send + Sync {
    /// Returns true once every configured port has been created.
    fn is_init_done(&self) -> bool;

    /// Resolves an alias such as `Ethernet0`.
    fn get_port(&self, alias: &str) -> Option<Port>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_type_parse() {
        assert_eq!("PHY".parse::<PortType>().unwrap(), PortType::Phy);
        assert_eq!("lag".parse::<PortType>().unwrap(), PortType::Lag);
        assert!("TUNNEL".parse::<PortType>().is_err());
        assert_eq!(PortType::Cpu.to_string(), "CPU");
    }

    #[test]
    fn test_per_tc_lookup_is_bounds_checked() {
        let mut port = Port::new("Ethernet0", PortType::Phy, PortOid::from_raw_unchecked(0x1000));
        port.queue_ids = vec![QueueOid::from_raw_unchecked(0x15000), QueueOid::from_raw_unchecked(0x15001)];

        assert!(port.is_physical());
        assert_eq!(port.queue_id(1), Some(QueueOid::from_raw_unchecked(0x15001)));
        assert_eq!(port.queue_id(2), None);
        assert_eq!(port.pg_id(0), None);
    }
}
