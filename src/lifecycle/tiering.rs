//! Capacity tiering
//!
//! Drives of mixed capacity are carved into size-matched tiers: each
//! distinct capacity (ascending) contributes an increment equal to its
//! difference from the previous capacity, every drive large enough takes a
//! partition of that increment, and each tier with at least two members
//! becomes one RAID5 array. Three drives of 1, 2 and 2 units thus yield
//! increments [1, 1]: a 3-member array of size 1 and a 2-member array of
//! size 1, instead of wasting the larger drives' extra capacity.

use std::collections::BTreeMap;
use tracing::debug;

/// One capacity tier with the drives that contribute a partition to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    /// Position within the per-drive partition schedule
    pub index: usize,
    /// Size of each member partition
    pub partition_size: u64,
    /// Contributing drives, in input order
    pub drives: Vec<String>,
}

/// Partitioning plan for a set of drives
#[derive(Debug, Clone)]
pub struct TierPlan {
    /// Tier increments, ascending
    pub increments: Vec<u64>,
    /// Partition sizes per drive, in creation order
    pub per_drive: BTreeMap<String, Vec<u64>>,
    /// Tiers retained for array creation (at least two members each)
    pub tiers: Vec<Tier>,
}

/// Compute the tier plan for `(drive, capacity)` pairs.
pub fn plan(drives: &[(String, u64)]) -> TierPlan {
    let mut capacities: Vec<u64> = drives.iter().map(|(_, c)| *c).collect();
    capacities.sort_unstable();
    capacities.dedup();

    let mut increments = Vec::with_capacity(capacities.len());
    let mut prev = 0u64;
    for capacity in capacities {
        increments.push(capacity - prev);
        prev = capacity;
    }
    debug!(?increments, "computed tier increments");

    let mut per_drive = BTreeMap::new();
    for (drive, capacity) in drives {
        let mut schedule = Vec::new();
        let mut remaining = *capacity;
        for &increment in &increments {
            if remaining < increment {
                // Out of room on this drive; stop, do not error.
                break;
            }
            schedule.push(increment);
            remaining -= increment;
        }
        per_drive.insert(drive.clone(), schedule);
    }

    let mut tiers = Vec::new();
    for (index, &partition_size) in increments.iter().enumerate() {
        let members: Vec<String> = drives
            .iter()
            .filter(|(drive, _)| per_drive[drive].len() > index)
            .map(|(drive, _)| drive.clone())
            .collect();
        // Redundancy needs two distinct drives; thinner tiers are dropped.
        if members.len() >= 2 {
            tiers.push(Tier {
                index,
                partition_size,
                drives: members,
            });
        }
    }

    TierPlan {
        increments,
        per_drive,
        tiers,
    }
}
