//! RAID arrays and their health state

use crate::domain::ports::ArrayState;
use serde::Serialize;
use std::collections::BTreeSet;

/// A RAID5 array built from one partition per member drive
#[derive(Debug, Clone, Serialize)]
pub struct RaidArray {
    /// Array identifier, e.g. /dev/md0
    pub id: String,
    /// Active member partitions (paths resolve through the topology context)
    pub members: BTreeSet<String>,
    /// Configured array width; more than `members.len()` means a member is
    /// missing
    pub raid_devices: u32,
    pub state: ArrayState,
    /// Percent complete while recovering or reshaping
    pub rebuild_percent: Option<u8>,
    /// The physical volume carved on top of this array, once created
    pub pv: Option<String>,
}

impl RaidArray {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            members: BTreeSet::new(),
            raid_devices: 0,
            state: ArrayState::Unknown(String::from("absent")),
            rebuild_percent: None,
            pv: None,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.state == ArrayState::Clean
    }

    /// A member is missing. Recovering arrays count as degraded until the
    /// rebuild finishes and the state returns to clean.
    pub fn is_degraded(&self) -> bool {
        (self.members.len() as u32) < self.raid_devices
    }
}
