//! Physical drives and their partitions
//!
//! Capacity arithmetic is deliberately lossy: drive capacities round *down*
//! (never claim more space than exists) and partition sizes truncate to the
//! same reporting granularity, so two partitions created for one tier report
//! identical sizes even when per-drive alignment pads them by a few blocks.
//! This keeps size negotiation safe when nominally identical drives report
//! slightly different raw sizes.

use serde::Serialize;
use std::collections::BTreeMap;

/// Safety margin subtracted from the raw drive size before rounding, so
/// partition-size arithmetic never requests space right at the edge of the
/// device.
pub const CAPACITY_MARGIN_BYTES: u64 = 16 * 1024 * 1024;

/// Partition block size reported by the partition table (1 KiB blocks).
pub const BLOCK_BYTES: u64 = 1024;

/// First logical partition slot in the MS-DOS extended container scheme.
pub const FIRST_LOGICAL_SLOT: u32 = 5;

// =============================================================================
// Rounding
// =============================================================================

/// Truncate `n` to two significant figures.
pub fn round_down_sf2(n: u64) -> u64 {
    let unit = sf2_unit(n);
    n / unit * unit
}

/// Granularity unit such that `n / unit` has at most two digits.
fn sf2_unit(n: u64) -> u64 {
    let mut unit = 1u64;
    while n / unit >= 100 {
        unit *= 10;
    }
    unit
}

// =============================================================================
// Drive
// =============================================================================

/// A physical hard drive
#[derive(Debug, Clone, Serialize)]
pub struct Drive {
    /// Device path, e.g. /dev/sda
    pub path: String,
    /// Raw size reported by the device, in bytes
    pub size_bytes: u64,
    /// True when the drive carries no partitions at all
    pub empty: bool,
    /// True once the extended container partition exists
    pub initialized: bool,
    /// RAID-member partitions, keyed by slot number (paths resolve through
    /// the topology context)
    pub partitions: BTreeMap<u32, String>,
}

impl Drive {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            size_bytes: 0,
            empty: false,
            initialized: false,
            partitions: BTreeMap::new(),
        }
    }

    /// Usable capacity: raw size minus a fixed safety margin, truncated to
    /// two significant figures. Always at or below the raw size.
    pub fn capacity(&self) -> u64 {
        round_down_sf2(self.size_bytes.saturating_sub(CAPACITY_MARGIN_BYTES))
    }
}

// =============================================================================
// Partition
// =============================================================================

/// A partition, hung off both a drive and (optionally) an array
#[derive(Debug, Clone, Serialize)]
pub struct Partition {
    /// Device path, e.g. /dev/sda5
    pub path: String,
    /// Slot number within the owning drive's table
    pub slot: u32,
    /// Reported size in 1 KiB blocks
    pub num_blocks: u64,
    /// Owning drive path
    pub drive: String,
    /// Array this partition is a member of, if any
    pub array: Option<String>,
}

impl Partition {
    pub fn new(path: impl Into<String>, drive: impl Into<String>, slot: u32) -> Self {
        Self {
            path: path.into(),
            slot,
            num_blocks: 0,
            drive: drive.into(),
            array: None,
        }
    }

    /// Reported size, truncated to the two-significant-figure granularity.
    /// The block count is already the allocation-unit ceiling of the
    /// requested size; truncating absorbs per-drive alignment padding so
    /// partitions created for the same tier report identical sizes.
    pub fn size(&self) -> u64 {
        round_down_sf2(self.num_blocks * BLOCK_BYTES)
    }
}
