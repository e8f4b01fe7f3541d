//! LVM-layer entities: physical volumes, volume groups, logical volumes

use serde::Serialize;
use std::collections::BTreeSet;

/// A physical volume, 1:1 with the RAID array it sits on
#[derive(Debug, Clone, Serialize)]
pub struct PhysicalVolume {
    /// PV name; by construction this equals the backing array id
    pub name: String,
    /// Backing array id
    pub array: String,
}

impl PhysicalVolume {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        // The PV is always carved directly on the array device node.
        let array = name.clone();
        Self { name, array }
    }
}

/// A volume group aggregating one PV per capacity tier
#[derive(Debug, Clone, Serialize)]
pub struct VolumeGroup {
    pub name: String,
    /// Member PV names
    pub pvs: BTreeSet<String>,
}

impl VolumeGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pvs: BTreeSet::new(),
        }
    }
}

/// The single logical volume consuming all space in its VG
#[derive(Debug, Clone, Serialize)]
pub struct LogicalVolume {
    /// Full LV name, e.g. lvmraid_vg0/lvol0
    pub name: String,
    /// Owning VG, once the LV exists
    pub vg: Option<String>,
    /// Reported size in gigabytes
    pub size_gb: Option<f64>,
}

impl LogicalVolume {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vg: None,
            size_gb: None,
        }
    }
}
