//! Domain Ports - trait boundaries to the external storage machinery
//!
//! The pool manager never touches disks itself. Three ports cover the
//! collaborators it drives: a partition-table service, a RAID management
//! service, and a volume (LVM) management service. Adapters in
//! [`crate::services`] implement these against the real system tools.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

// =============================================================================
// Query Outcome
// =============================================================================

/// Outcome of an informational query.
///
/// The backing tools report "no such entity" by exiting non-zero, which is a
/// normal answer, not a transport failure. Adapters map that exit to
/// [`Query::Absent`]; an `Err` from a query method always means the tool
/// itself could not be run or its output could not be understood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query<T> {
    Found(T),
    Absent,
}

impl<T> Query<T> {
    /// Convert to an `Option`, discarding the found/absent distinction.
    pub fn found(self) -> Option<T> {
        match self {
            Query::Found(v) => Some(v),
            Query::Absent => None,
        }
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Query::Absent)
    }
}

// =============================================================================
// Partition Table Types
// =============================================================================

/// Role of a partition within the pool's on-disk scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionKind {
    /// The extended container created at init time
    Extended,
    /// A logical partition typed as Linux raid autodetect
    RaidMember,
    /// Anything else (forces the drive to count as non-empty)
    Other,
}

/// One row of a reported partition table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionInfo {
    /// Device node, e.g. /dev/sda5
    pub path: String,
    /// Partition slot number (logical partitions start at 5)
    pub slot: u32,
    /// Size in 1 KiB blocks
    pub blocks: u64,
    pub kind: PartitionKind,
}

/// Reported partition table for one device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionTable {
    /// Raw device size in bytes
    pub size_bytes: u64,
    /// Partitions ordered by slot
    pub partitions: Vec<PartitionInfo>,
}

impl PartitionTable {
    /// A drive is empty when it carries no partitions at all.
    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }
}

/// Result of a successful partition creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedPartition {
    pub path: String,
    pub slot: u32,
    pub blocks: u64,
}

// =============================================================================
// RAID Array Types
// =============================================================================

/// Health state of a RAID array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArrayState {
    /// Fully redundant, no in-progress operation
    Clean,
    /// Degraded and actively rebuilding a member
    Recovering,
    /// Member count is changing
    Reshaping,
    /// Anything the pool manager has no model for (raw state text kept
    /// for the error message)
    Unknown(String),
}

impl std::fmt::Display for ArrayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArrayState::Clean => write!(f, "clean"),
            ArrayState::Recovering => write!(f, "recovering"),
            ArrayState::Reshaping => write!(f, "reshaping"),
            ArrayState::Unknown(raw) => write!(f, "unknown ({raw})"),
        }
    }
}

impl ArrayState {
    /// Map the state line reported by the RAID tooling onto the model.
    pub fn from_report(raw: &str) -> Self {
        match raw.trim() {
            "clean" | "active" => ArrayState::Clean,
            "clean, degraded, recovering" | "active, degraded, recovering" => {
                ArrayState::Recovering
            }
            "clean, reshaping" | "active, reshaping" => ArrayState::Reshaping,
            other => ArrayState::Unknown(other.to_string()),
        }
    }
}

/// Detail report for one RAID array
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayDetail {
    /// Active member partitions (device paths)
    pub members: Vec<String>,
    /// Configured array width; more than `members.len()` means degraded
    pub raid_devices: u32,
    pub state: ArrayState,
    /// Percent complete for a recovery or reshape in progress
    pub rebuild_percent: Option<u8>,
}

// =============================================================================
// Volume Types
// =============================================================================

/// Detail report for a logical volume
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LvDetail {
    /// Owning volume group
    pub vg_name: String,
    /// Size in gigabytes
    pub size_gb: f64,
}

// =============================================================================
// Partition Table Service Port
// =============================================================================

/// Port to the partitioning tool
#[async_trait]
pub trait PartitionService: Send + Sync {
    /// Report the partition table of a device, or `Absent` when the device
    /// node cannot be opened.
    async fn partition_table(&self, device: &str) -> Result<Query<PartitionTable>>;

    /// One-time setup of the extended partition container on an empty drive.
    async fn init_partitions(&self, device: &str) -> Result<()>;

    /// Create a logical partition of `size_bytes`. Returns `None` when the
    /// device has insufficient space - a normal stopping condition, not an
    /// error.
    async fn create_partition(
        &self,
        device: &str,
        size_bytes: u64,
    ) -> Result<Option<CreatedPartition>>;
}

// =============================================================================
// RAID Management Service Port
// =============================================================================

/// Port to the redundant-array tool
#[async_trait]
pub trait RaidService: Send + Sync {
    /// Create a RAID5 array from the given member partitions. The service
    /// allocates and returns the array identifier. Resync starts in the
    /// background.
    async fn create_array(&self, members: &[String]) -> Result<String>;

    /// Report array detail, or `Absent` when no such array exists yet.
    async fn detail(&self, array: &str) -> Result<Query<ArrayDetail>>;

    /// Which array a partition belongs to, if any.
    async fn examine_member(&self, partition: &str) -> Result<Query<String>>;

    /// Add a partition to an array. On a degraded array this starts a
    /// rebuild; on a clean array it becomes a spare until grown.
    async fn add_member(&self, array: &str, partition: &str) -> Result<()>;

    /// Reshape the array to the given width. `backup_file` must live on a
    /// device outside the array.
    async fn grow_array(&self, array: &str, raid_devices: u32, backup_file: &Path) -> Result<()>;

    /// Mark a member faulty and remove it, leaving the array degraded.
    async fn fail_and_remove(&self, array: &str, partition: &str) -> Result<()>;
}

// =============================================================================
// Volume Management Service Port
// =============================================================================

/// Port to the volume-management (LVM) tool
#[async_trait]
pub trait VolumeService: Send + Sync {
    async fn create_pv(&self, name: &str) -> Result<()>;

    /// Resize the PV to match its grown backing device.
    async fn grow_pv(&self, name: &str) -> Result<()>;

    async fn create_vg(&self, name: &str, pvs: &[String]) -> Result<()>;

    async fn extend_vg(&self, name: &str, pv: &str) -> Result<()>;

    /// Create an LV consuming 100% of the VG's free space.
    async fn create_lv(&self, name: &str, vg: &str) -> Result<()>;

    /// Extend the LV over all free space on its VG.
    async fn extend_lv(&self, name: &str) -> Result<()>;

    /// PV names belonging to a VG, or `Absent` when the VG does not exist.
    async fn vg_pvs(&self, vg: &str) -> Result<Query<Vec<String>>>;

    /// LV detail, or `Absent` when the LV does not exist.
    async fn lv_detail(&self, lv: &str) -> Result<Query<LvDetail>>;
}

// =============================================================================
// Type Aliases for Arc'd Traits
// =============================================================================

pub type PartitionServiceRef = Arc<dyn PartitionService>;
pub type RaidServiceRef = Arc<dyn RaidService>;
pub type VolumeServiceRef = Arc<dyn VolumeService>;
