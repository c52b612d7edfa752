//! Virtual switch.
//!
//! An in-memory stand-in for the ASIC that implements every SAI interface
//! the watchdog uses plus the port inventory. It backs the daemon when no
//! hardware is present and is the fixture for tests. Any API call can be
//! made to fail with [`VirtualSwitch::fail`].
//!
//! Object ids follow the sairedis layout: the SAI object type in the top
//! 16 bits and a running index below.

use crate::ports::{Port, PortInventory, PortType};
use serde::Deserialize;
use sonic_sai::{
    AclApi, AclEntryConfig, AclEntryOid, AclTableConfig, AclTableOid, BufferApi,
    BufferPoolConfig, BufferPoolOid, BufferProfileConfig, BufferProfileOid,
    IngressPriorityGroupOid, PortApi, PortOid, QueueApi, QueueOid, QueueStat, RawSaiObjectId,
    SaiError, SaiObjectId, SaiObjectKind, SaiResult,
};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info};

const OBJECT_TYPE_PORT: RawSaiObjectId = 0x01;
const OBJECT_TYPE_ACL_TABLE: RawSaiObjectId = 0x07;
const OBJECT_TYPE_ACL_ENTRY: RawSaiObjectId = 0x08;
const OBJECT_TYPE_QUEUE: RawSaiObjectId = 0x15;
const OBJECT_TYPE_BUFFER_POOL: RawSaiObjectId = 0x18;
const OBJECT_TYPE_BUFFER_PROFILE: RawSaiObjectId = 0x19;
const OBJECT_TYPE_INGRESS_PRIORITY_GROUP: RawSaiObjectId = 0x1a;

/// Virtual switch API calls that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VsOp {
    GetPfcMask,
    SetPfcMask,
    GetQueueBufferProfile,
    SetQueueBufferProfile,
    GetQueueStats,
    CreateBufferPool,
    RemoveBufferPool,
    CreateBufferProfile,
    RemoveBufferProfile,
    GetPgBufferProfile,
    SetPgBufferProfile,
    CreateAclTable,
    RemoveAclTable,
    CreateAclEntry,
    RemoveAclEntry,
    BindAclTable,
    UnbindAclTable,
}

#[derive(Debug, Error)]
pub enum VsError {
    #[error("Failed to read inventory {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse inventory {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Duplicate port {0}")]
    DuplicatePort(String),
}

fn default_pfc_mask() -> u8 {
    0b0001_1000
}

fn default_tc_count() -> u8 {
    8
}

fn default_true() -> bool {
    true
}

/// A port to create on the virtual switch.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PortSpec {
    pub alias: String,
    #[serde(default)]
    pub port_type: PortType,
    /// Initial PFC enable mask; defaults to traffic classes 3 and 4.
    #[serde(default = "default_pfc_mask")]
    pub pfc_mask: u8,
    /// Number of queues and priority groups.
    #[serde(default = "default_tc_count")]
    pub queues: u8,
}

impl PortSpec {
    pub fn new(alias: impl Into<String>, pfc_mask: u8) -> Self {
        Self {
            alias: alias.into(),
            port_type: PortType::Phy,
            pfc_mask,
            queues: default_tc_count(),
        }
    }

    pub fn with_type(mut self, port_type: PortType) -> Self {
        self.port_type = port_type;
        self
    }

    pub fn with_queues(mut self, queues: u8) -> Self {
        self.queues = queues;
        self
    }
}

/// JSON inventory file.
///
/// ```json
/// { "ports": [ { "alias": "Ethernet0", "pfc_mask": 24 } ] }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct InventoryFile {
    #[serde(default = "default_true")]
    pub init_done: bool,
    pub ports: Vec<PortSpec>,
}

#[derive(Debug)]
struct VsAclTable {
    config: AclTableConfig,
    bound: BTreeSet<PortOid>,
}

#[derive(Debug, Default)]
struct VsState {
    next_index: RawSaiObjectId,
    init_done: bool,
    ports: BTreeMap<String, Port>,
    pfc_masks: HashMap<PortOid, u8>,
    queue_profiles: HashMap<QueueOid, BufferProfileOid>,
    queue_stats: HashMap<QueueOid, (u64, u64)>,
    pg_profiles: HashMap<IngressPriorityGroupOid, BufferProfileOid>,
    pools: BTreeMap<BufferPoolOid, BufferPoolConfig>,
    profiles: BTreeMap<BufferProfileOid, BufferProfileConfig>,
    acl_tables: BTreeMap<AclTableOid, VsAclTable>,
    acl_entries: BTreeMap<AclEntryOid, AclEntryConfig>,
    failures: HashSet<VsOp>,
}

impl VsState {
    fn alloc<T: SaiObjectKind>(&mut self, object_type: RawSaiObjectId) -> SaiObjectId<T> {
        self.next_index += 1;
        SaiObjectId::from_raw_unchecked((object_type << 48) | self.next_index)
    }

    fn check(&self, op: VsOp) -> SaiResult<()> {
        if self.failures.contains(&op) {
            Err(SaiError::internal(format!("injected failure for {:?}", op)))
        } else {
            Ok(())
        }
    }
}

/// In-memory switch.
#[derive(Debug)]
pub struct VirtualSwitch {
    state: Mutex<VsState>,
}

impl Default for VirtualSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualSwitch {
    /// Creates an empty switch that reports its ports as ready.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(VsState {
                init_done: true,
                ..Default::default()
            }),
        }
    }

    /// Builds a switch from a parsed inventory.
    pub fn from_inventory(inventory: InventoryFile) -> Result<Self, VsError> {
        let vs = Self::new();
        for spec in inventory.ports {
            vs.add_port(spec)?;
        }
        vs.set_init_done(inventory.init_done);
        Ok(vs)
    }

    /// Reads a JSON inventory file.
    pub fn load_inventory(path: &Path) -> Result<Self, VsError> {
        let content = std::fs::read_to_string(path).map_err(|source| VsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let inventory: InventoryFile =
            serde_json::from_str(&content).map_err(|source| VsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        info!(path = %path.display(), ports = inventory.ports.len(), "Loaded port inventory");
        Self::from_inventory(inventory)
    }

    fn state(&self) -> MutexGuard<'_, VsState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Creates a port with one queue and one priority group per traffic
    /// class, each holding its own buffer profile reference.
    pub fn add_port(&self, spec: PortSpec) -> Result<Port, VsError> {
        let mut state = self.state();
        if state.ports.contains_key(&spec.alias) {
            return Err(VsError::DuplicatePort(spec.alias));
        }

        let mut port = Port::new(spec.alias.clone(), spec.port_type, state.alloc(OBJECT_TYPE_PORT));
        for _ in 0..spec.queues {
            let queue: QueueOid = state.alloc(OBJECT_TYPE_QUEUE);
            let queue_profile: BufferProfileOid = state.alloc(OBJECT_TYPE_BUFFER_PROFILE);
            state.queue_profiles.insert(queue, queue_profile);
            port.queue_ids.push(queue);

            let pg: IngressPriorityGroupOid = state.alloc(OBJECT_TYPE_INGRESS_PRIORITY_GROUP);
            let pg_profile: BufferProfileOid = state.alloc(OBJECT_TYPE_BUFFER_PROFILE);
            state.pg_profiles.insert(pg, pg_profile);
            port.pg_ids.push(pg);
        }

        state.pfc_masks.insert(port.port_id, spec.pfc_mask);
        state.ports.insert(spec.alias, port.clone());
        debug!(port = %port.alias, port_id = %port.port_id.to_sai_string(), "Created virtual port");
        Ok(port)
    }

    pub fn set_init_done(&self, done: bool) {
        self.state().init_done = done;
    }

    /// Makes every later call of `op` fail until [`clear_failures`](Self::clear_failures).
    pub fn fail(&self, op: VsOp) {
        self.state().failures.insert(op);
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    pub fn pfc_mask(&self, port: PortOid) -> Option<u8> {
        self.state().pfc_masks.get(&port).copied()
    }

    pub fn queue_profile(&self, queue: QueueOid) -> Option<BufferProfileOid> {
        self.state().queue_profiles.get(&queue).copied()
    }

    pub fn pg_profile(&self, pg: IngressPriorityGroupOid) -> Option<BufferProfileOid> {
        self.state().pg_profiles.get(&pg).copied()
    }

    /// Sets the hardware tx and dropped packet counters of a queue.
    pub fn set_queue_stats(&self, queue: QueueOid, packets: u64, dropped: u64) {
        self.state().queue_stats.insert(queue, (packets, dropped));
    }

    pub fn buffer_pool_count(&self) -> usize {
        self.state().pools.len()
    }

    /// Profiles created through the buffer API; per-queue defaults excluded.
    pub fn buffer_profile_count(&self) -> usize {
        self.state().profiles.len()
    }

    pub fn acl_table_count(&self) -> usize {
        self.state().acl_tables.len()
    }

    pub fn acl_entry_count(&self) -> usize {
        self.state().acl_entries.len()
    }

    /// Ports bound to the ACL table with the given name.
    pub fn acl_bindings(&self, name: &str) -> Option<BTreeSet<PortOid>> {
        self.state()
            .acl_tables
            .values()
            .find(|t| t.config.name == name)
            .map(|t| t.bound.clone())
    }

    /// Entries of the ACL table with the given name.
    pub fn acl_rules(&self, name: &str) -> Vec<AclEntryConfig> {
        let state = self.state();
        let Some((table_id, _)) = state.acl_tables.iter().find(|(_, t)| t.config.name == name)
        else {
            return Vec::new();
        };
        state
            .acl_entries
            .values()
            .filter(|e| e.table == *table_id)
            .cloned()
            .collect()
    }
}

impl PortInventory for VirtualSwitch {
    fn is_init_done(&self) -> bool {
        self.state().init_done
    }

    fn get_port(&self, alias: &str) -> Option<Port> {
        self.state().ports.get(alias).cloned()
    }
}

impl PortApi for VirtualSwitch {
    fn get_pfc_mask(&self, port: PortOid) -> SaiResult<u8> {
        let state = self.state();
        state.check(VsOp::GetPfcMask)?;
        state
            .pfc_masks
            .get(&port)
            .copied()
            .ok_or_else(|| SaiError::not_found(port.to_sai_string()))
    }

    fn set_pfc_mask(&self, port: PortOid, mask: u8) -> SaiResult<()> {
        let mut state = self.state();
        state.check(VsOp::SetPfcMask)?;
        let current = state
            .pfc_masks
            .get_mut(&port)
            .ok_or_else(|| SaiError::not_found(port.to_sai_string()))?;
        *current = mask;
        Ok(())
    }
}

impl QueueApi for VirtualSwitch {
    fn get_queue_buffer_profile(&self, queue: QueueOid) -> SaiResult<BufferProfileOid> {
        let state = self.state();
        state.check(VsOp::GetQueueBufferProfile)?;
        state
            .queue_profiles
            .get(&queue)
            .copied()
            .ok_or_else(|| SaiError::not_found(queue.to_sai_string()))
    }

    fn set_queue_buffer_profile(&self, queue: QueueOid, profile: BufferProfileOid) -> SaiResult<()> {
        let mut state = self.state();
        state.check(VsOp::SetQueueBufferProfile)?;
        let current = state
            .queue_profiles
            .get_mut(&queue)
            .ok_or_else(|| SaiError::not_found(queue.to_sai_string()))?;
        *current = profile;
        Ok(())
    }

    fn get_queue_stats(&self, queue: QueueOid, stats: &[QueueStat]) -> SaiResult<Vec<u64>> {
        let state = self.state();
        state.check(VsOp::GetQueueStats)?;
        if !state.queue_profiles.contains_key(&queue) {
            return Err(SaiError::not_found(queue.to_sai_string()));
        }
        let (packets, dropped) = state.queue_stats.get(&queue).copied().unwrap_or_default();
        Ok(stats
            .iter()
            .map(|stat| match stat {
                QueueStat::Packets => packets,
                QueueStat::DroppedPackets => dropped,
                QueueStat::CurrOccupancyBytes => 0,
            })
            .collect())
    }
}

impl BufferApi for VirtualSwitch {
    fn create_buffer_pool(&self, config: &BufferPoolConfig) -> SaiResult<BufferPoolOid> {
        let mut state = self.state();
        state.check(VsOp::CreateBufferPool)?;
        let pool = state.alloc(OBJECT_TYPE_BUFFER_POOL);
        state.pools.insert(pool, config.clone());
        Ok(pool)
    }

    fn remove_buffer_pool(&self, pool: BufferPoolOid) -> SaiResult<()> {
        let mut state = self.state();
        state.check(VsOp::RemoveBufferPool)?;
        if state.profiles.values().any(|p| p.pool == pool) {
            return Err(SaiError::object_in_use(pool.to_sai_string()));
        }
        state
            .pools
            .remove(&pool)
            .map(|_| ())
            .ok_or_else(|| SaiError::not_found(pool.to_sai_string()))
    }

    fn create_buffer_profile(&self, config: &BufferProfileConfig) -> SaiResult<BufferProfileOid> {
        let mut state = self.state();
        state.check(VsOp::CreateBufferProfile)?;
        if !state.pools.contains_key(&config.pool) {
            return Err(SaiError::invalid_parameter(format!(
                "unknown pool {}",
                config.pool.to_sai_string()
            )));
        }
        let profile = state.alloc(OBJECT_TYPE_BUFFER_PROFILE);
        state.profiles.insert(profile, config.clone());
        Ok(profile)
    }

    fn remove_buffer_profile(&self, profile: BufferProfileOid) -> SaiResult<()> {
        let mut state = self.state();
        state.check(VsOp::RemoveBufferProfile)?;
        if state.queue_profiles.values().any(|p| *p == profile)
            || state.pg_profiles.values().any(|p| *p == profile)
        {
            return Err(SaiError::object_in_use(profile.to_sai_string()));
        }
        state
            .profiles
            .remove(&profile)
            .map(|_| ())
            .ok_or_else(|| SaiError::not_found(profile.to_sai_string()))
    }

    fn get_pg_buffer_profile(&self, pg: IngressPriorityGroupOid) -> SaiResult<BufferProfileOid> {
        let state = self.state();
        state.check(VsOp::GetPgBufferProfile)?;
        state
            .pg_profiles
            .get(&pg)
            .copied()
            .ok_or_else(|| SaiError::not_found(pg.to_sai_string()))
    }

    fn set_pg_buffer_profile(
        &self,
        pg: IngressPriorityGroupOid,
        profile: BufferProfileOid,
    ) -> SaiResult<()> {
        let mut state = self.state();
        state.check(VsOp::SetPgBufferProfile)?;
        let current = state
            .pg_profiles
            .get_mut(&pg)
            .ok_or_else(|| SaiError::not_found(pg.to_sai_string()))?;
        *current = profile;
        Ok(())
    }
}

impl AclApi for VirtualSwitch {
    fn create_acl_table(&self, config: &AclTableConfig) -> SaiResult<AclTableOid> {
        let mut state = self.state();
        state.check(VsOp::CreateAclTable)?;
        if state.acl_tables.values().any(|t| t.config.name == config.name) {
            return Err(SaiError::already_exists(config.name.clone()));
        }
        let table = state.alloc(OBJECT_TYPE_ACL_TABLE);
        state.acl_tables.insert(
            table,
            VsAclTable {
                config: config.clone(),
                bound: config.ports.iter().copied().collect(),
            },
        );
        Ok(table)
    }

    fn remove_acl_table(&self, table: AclTableOid) -> SaiResult<()> {
        let mut state = self.state();
        state.check(VsOp::RemoveAclTable)?;
        if state.acl_entries.values().any(|e| e.table == table) {
            return Err(SaiError::object_in_use(table.to_sai_string()));
        }
        state
            .acl_tables
            .remove(&table)
            .map(|_| ())
            .ok_or_else(|| SaiError::not_found(table.to_sai_string()))
    }

    fn create_acl_entry(&self, config: &AclEntryConfig) -> SaiResult<AclEntryOid> {
        let mut state = self.state();
        state.check(VsOp::CreateAclEntry)?;
        if !state.acl_tables.contains_key(&config.table) {
            return Err(SaiError::invalid_parameter(format!(
                "unknown ACL table {}",
                config.table.to_sai_string()
            )));
        }
        let entry = state.alloc(OBJECT_TYPE_ACL_ENTRY);
        state.acl_entries.insert(entry, config.clone());
        Ok(entry)
    }

    fn remove_acl_entry(&self, entry: AclEntryOid) -> SaiResult<()> {
        let mut state = self.state();
        state.check(VsOp::RemoveAclEntry)?;
        state
            .acl_entries
            .remove(&entry)
            .map(|_| ())
            .ok_or_else(|| SaiError::not_found(entry.to_sai_string()))
    }

    fn bind_acl_table(&self, table: AclTableOid, port: PortOid) -> SaiResult<()> {
        let mut state = self.state();
        state.check(VsOp::BindAclTable)?;
        let entry = state
            .acl_tables
            .get_mut(&table)
            .ok_or_else(|| SaiError::not_found(table.to_sai_string()))?;
        entry.bound.insert(port);
        Ok(())
    }

    fn unbind_acl_table(&self, table: AclTableOid, port: PortOid) -> SaiResult<()> {
        let mut state = self.state();
        state.check(VsOp::UnbindAclTable)?;
        let entry = state
            .acl_tables
            .get_mut(&table)
            .ok_or_else(|| SaiError::not_found(table.to_sai_string()))?;
        if entry.bound.remove(&port) {
            Ok(())
        } else {
            Err(SaiError::not_found(port.to_sai_string()))
        }
    }
}
