//! Type-safe SAI object ID wrappers.
//!
//! Object ids of different kinds cannot be mixed: a queue id cannot be passed
//! where a port id is expected. Ids cross process boundaries (counters DB,
//! notification channels) in the sairedis text form `oid:0x<hex>`.

use std::fmt;
use std::hash::Hash;
use std::marker::PhantomData;
use std::str::FromStr;

use crate::error::SaiError;

/// Raw SAI object ID type (matches sai_object_id_t in C).
pub type RawSaiObjectId = u64;

/// Prefix of the serialized object id form.
const OID_PREFIX: &str = "oid:0x";

/// Marker trait for SAI object kinds.
pub trait SaiObjectKind: Send + Sync + 'static {
    /// Returns the SAI object type name for debugging.
    fn type_name() -> &'static str;
}

/// A type-safe SAI object ID.
///
/// # Examples
///
/// ```
/// use sonic_sai::{QueueOid, SaiObjectId};
///
/// let queue = QueueOid::from_raw(0x15000000000a1).unwrap();
/// assert_eq!(queue.to_sai_string(), "oid:0x15000000000a1");
/// assert_eq!("oid:0x15000000000a1".parse::<QueueOid>().unwrap(), queue);
/// ```
pub struct SaiObjectId<T: SaiObjectKind> {
    raw: RawSaiObjectId,
    _marker: PhantomData<T>,
}

impl<T: SaiObjectKind> SaiObjectId<T> {
    /// The null object ID (SAI_NULL_OBJECT_ID).
    pub const NULL: Self = Self {
        raw: 0,
        _marker: PhantomData,
    };

    /// Creates an object ID from a raw value; `None` for the null id.
    pub fn from_raw(raw: RawSaiObjectId) -> Option<Self> {
        if raw == 0 {
            None
        } else {
            Some(Self::from_raw_unchecked(raw))
        }
    }

    /// Creates an object ID from a raw value, including null.
    pub const fn from_raw_unchecked(raw: RawSaiObjectId) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Returns the raw object ID value.
    pub const fn as_raw(&self) -> RawSaiObjectId {
        self.raw
    }

    /// Returns true if this is the null object ID.
    pub const fn is_null(&self) -> bool {
        self.raw == 0
    }

    /// Returns true if this is a valid (non-null) object ID.
    pub const fn is_valid(&self) -> bool {
        self.raw != 0
    }

    /// Serializes the id the way sairedis does (`oid:0x` + lowercase hex).
    pub fn to_sai_string(&self) -> String {
        format!("{}{:x}", OID_PREFIX, self.raw)
    }
}

// Manual impls: deriving would put bounds on the marker type.
impl<T: SaiObjectKind> Clone for SaiObjectId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: SaiObjectKind> Copy for SaiObjectId<T> {}

impl<T: SaiObjectKind> fmt::Debug for SaiObjectId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:016x})", T::type_name(), self.raw)
    }
}

impl<T: SaiObjectKind> fmt::Display for SaiObjectId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.raw)
    }
}

impl<T: SaiObjectKind> PartialEq for SaiObjectId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T: SaiObjectKind> Eq for SaiObjectId<T> {}

impl<T: SaiObjectKind> PartialOrd for SaiObjectId<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: SaiObjectKind> Ord for SaiObjectId<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.raw.cmp(&other.raw)
    }
}

impl<T: SaiObjectKind> Hash for SaiObjectId<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T: SaiObjectKind> Default for SaiObjectId<T> {
    fn default() -> Self {
        Self::NULL
    }
}

impl<T: SaiObjectKind> FromStr for SaiObjectId<T> {
    type Err = SaiError;

    /// Parses the `oid:0x<hex>` form. The null id (`oid:0x0`) is accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.strip_prefix(OID_PREFIX).ok_or_else(|| {
            SaiError::invalid_parameter(format!("{} id '{}' lacks the oid:0x prefix", T::type_name(), s))
        })?;
        RawSaiObjectId::from_str_radix(hex, 16)
            .map(Self::from_raw_unchecked)
            .map_err(|e| {
                SaiError::invalid_parameter(format!("{} id '{}': {}", T::type_name(), s, e))
            })
    }
}

// ============================================================================
// Object Kind Markers
// ============================================================================

macro_rules! define_object_kind {
    ($name:ident, $type_name:literal, $oid_alias:ident) => {
        #[doc = concat!("Marker type for SAI ", $type_name, " objects.")]
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl SaiObjectKind for $name {
            fn type_name() -> &'static str {
                $type_name
            }
        }

        #[doc = concat!("Type alias for ", $type_name, " object IDs.")]
        pub type $oid_alias = SaiObjectId<$name>;
    };
}

define_object_kind!(SwitchKind, "Switch", SwitchOid);
define_object_kind!(PortKind, "Port", PortOid);
define_object_kind!(QueueKind, "Queue", QueueOid);
define_object_kind!(IngressPriorityGroupKind, "IngressPriorityGroup", IngressPriorityGroupOid);
define_object_kind!(BufferPoolKind, "BufferPool", BufferPoolOid);
define_object_kind!(BufferProfileKind, "BufferProfile", BufferProfileOid);
define_object_kind!(AclTableKind, "AclTable", AclTableOid);
define_object_kind!(AclEntryKind, "AclEntry", AclEntryOid);
