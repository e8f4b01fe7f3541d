//! In-memory fake of all three service ports for tests
//!
//! Mirrors the observable behavior of the real tools: partition tables with
//! the extended-container slot scheme, arrays that resync for a scripted
//! number of detail polls before going clean, and a volume layer that
//! reports LV size as the sum of usable (width minus one) array capacity.

use crate::domain::ports::{
    ArrayDetail, ArrayState, CreatedPartition, LvDetail, PartitionInfo, PartitionKind,
    PartitionService, PartitionTable, Query, RaidService, VolumeService,
};
use crate::error::{Error, Result};
use crate::services::Services;
use crate::topology::drive::FIRST_LOGICAL_SLOT;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Default)]
struct MockDisk {
    size_bytes: u64,
    initialized: bool,
    /// slot -> size in 1 KiB blocks
    parts: BTreeMap<u32, u64>,
}

#[derive(Debug)]
struct MockArray {
    members: Vec<String>,
    raid_devices: u32,
    /// Detail polls remaining before the in-progress operation completes
    countdown: u32,
    reshaping: bool,
}

#[derive(Default)]
struct MockState {
    disks: BTreeMap<String, MockDisk>,
    arrays: BTreeMap<String, MockArray>,
    pvs: BTreeSet<String>,
    vgs: BTreeMap<String, Vec<String>>,
    /// lv name -> owning vg
    lvs: BTreeMap<String, String>,
    next_md: u32,
    /// Polls a new resync/reshape takes to complete
    resync_polls: u32,
    table_queries: u64,
    detail_queries: u64,
    mutations: u64,
    lv_extends: BTreeMap<String, u32>,
}

/// Shared-state fake backend; clone it and hand the clones to [`Services`].
#[derive(Clone)]
pub struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            partition: Arc::new(self.clone()),
            raid: Arc::new(self.clone()),
            volume: Arc::new(self.clone()),
        }
    }

    pub fn add_disk(&self, path: &str, size_bytes: u64) {
        self.state.lock().disks.insert(
            path.to_string(),
            MockDisk {
                size_bytes,
                ..Default::default()
            },
        );
    }

    /// Number of detail polls a freshly started resync or reshape takes.
    pub fn set_resync_polls(&self, polls: u32) {
        self.state.lock().resync_polls = polls;
    }

    /// Drop a member from an array without starting a rebuild, as an
    /// externally failed drive would.
    pub fn degrade_array(&self, id: &str, member: &str) {
        let mut state = self.state.lock();
        if let Some(array) = state.arrays.get_mut(id) {
            array.members.retain(|m| m != member);
            array.countdown = 0;
        }
    }

    pub fn partition_table_queries(&self) -> u64 {
        self.state.lock().table_queries
    }

    pub fn detail_queries(&self) -> u64 {
        self.state.lock().detail_queries
    }

    pub fn mutations(&self) -> u64 {
        self.state.lock().mutations
    }

    pub fn array_ids(&self) -> Vec<String> {
        self.state.lock().arrays.keys().cloned().collect()
    }

    pub fn array_width(&self, id: &str) -> u32 {
        self.state.lock().arrays[id].raid_devices
    }

    pub fn array_members(&self, id: &str) -> Vec<String> {
        self.state.lock().arrays[id].members.clone()
    }

    pub fn vg_names(&self) -> Vec<String> {
        self.state.lock().vgs.keys().cloned().collect()
    }

    pub fn lv_extend_count(&self, lv: &str) -> u32 {
        self.state
            .lock()
            .lv_extends
            .get(lv)
            .copied()
            .unwrap_or(0)
    }

    pub fn disk_partition_count(&self, path: &str) -> usize {
        self.state
            .lock()
            .disks
            .get(path)
            .map(|d| d.parts.len())
            .unwrap_or(0)
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PartitionService for MockBackend {
    async fn partition_table(&self, device: &str) -> Result<Query<PartitionTable>> {
        let mut state = self.state.lock();
        state.table_queries += 1;
        let disk = match state.disks.get(device) {
            Some(d) => d,
            None => return Ok(Query::Absent),
        };

        let mut partitions = Vec::new();
        if disk.initialized {
            partitions.push(PartitionInfo {
                path: format!("{device}1"),
                slot: 1,
                blocks: disk.size_bytes / 1024,
                kind: PartitionKind::Extended,
            });
        }
        for (&slot, &blocks) in &disk.parts {
            partitions.push(PartitionInfo {
                path: format!("{device}{slot}"),
                slot,
                blocks,
                kind: PartitionKind::RaidMember,
            });
        }
        Ok(Query::Found(PartitionTable {
            size_bytes: disk.size_bytes,
            partitions,
        }))
    }

    async fn init_partitions(&self, device: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.mutations += 1;
        let disk = state
            .disks
            .get_mut(device)
            .ok_or_else(|| Error::DeviceNotFound {
                device: device.to_string(),
            })?;
        disk.initialized = true;
        Ok(())
    }

    async fn create_partition(
        &self,
        device: &str,
        size_bytes: u64,
    ) -> Result<Option<CreatedPartition>> {
        let mut state = self.state.lock();
        state.mutations += 1;
        let disk = state
            .disks
            .get_mut(device)
            .ok_or_else(|| Error::DeviceNotFound {
                device: device.to_string(),
            })?;
        if !disk.initialized {
            return Err(Error::Internal(format!(
                "{device} has no extended container"
            )));
        }
        let used: u64 = disk.parts.values().map(|b| b * 1024).sum();
        if used + size_bytes > disk.size_bytes {
            return Ok(None);
        }
        let slot = disk
            .parts
            .keys()
            .max()
            .map(|m| m + 1)
            .unwrap_or(FIRST_LOGICAL_SLOT);
        let blocks = size_bytes.div_ceil(1024);
        disk.parts.insert(slot, blocks);
        Ok(Some(CreatedPartition {
            path: format!("{device}{slot}"),
            slot,
            blocks,
        }))
    }
}

#[async_trait]
impl RaidService for MockBackend {
    async fn create_array(&self, members: &[String]) -> Result<String> {
        let mut state = self.state.lock();
        state.mutations += 1;
        let id = format!("/dev/md{}", state.next_md);
        state.next_md += 1;
        let countdown = state.resync_polls;
        state.arrays.insert(
            id.clone(),
            MockArray {
                members: members.to_vec(),
                raid_devices: members.len() as u32,
                countdown,
                reshaping: false,
            },
        );
        Ok(id)
    }

    async fn detail(&self, array: &str) -> Result<Query<ArrayDetail>> {
        let mut state = self.state.lock();
        state.detail_queries += 1;
        let entry = match state.arrays.get_mut(array) {
            Some(a) => a,
            None => return Ok(Query::Absent),
        };

        let detail = if entry.countdown > 0 {
            let state_now = if entry.reshaping {
                ArrayState::Reshaping
            } else {
                ArrayState::Recovering
            };
            let percent = 100u32.saturating_sub(entry.countdown * 10).min(99) as u8;
            entry.countdown -= 1;
            ArrayDetail {
                members: entry.members.clone(),
                raid_devices: entry.raid_devices,
                state: state_now,
                rebuild_percent: Some(percent),
            }
        } else {
            entry.reshaping = false;
            let state_now = if (entry.members.len() as u32) < entry.raid_devices {
                ArrayState::Unknown(String::from("clean, degraded"))
            } else {
                ArrayState::Clean
            };
            ArrayDetail {
                members: entry.members.clone(),
                raid_devices: entry.raid_devices,
                state: state_now,
                rebuild_percent: None,
            }
        };
        Ok(Query::Found(detail))
    }

    async fn examine_member(&self, partition: &str) -> Result<Query<String>> {
        let state = self.state.lock();
        for (id, array) in &state.arrays {
            if array.members.iter().any(|m| m == partition) {
                return Ok(Query::Found(id.clone()));
            }
        }
        Ok(Query::Absent)
    }

    async fn add_member(&self, array: &str, partition: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.mutations += 1;
        let polls = state.resync_polls;
        let entry = state
            .arrays
            .get_mut(array)
            .ok_or_else(|| Error::EntityAbsent {
                kind: "array",
                name: array.to_string(),
            })?;
        let was_degraded = (entry.members.len() as u32) < entry.raid_devices;
        entry.members.push(partition.to_string());
        if was_degraded {
            entry.countdown = polls;
        }
        Ok(())
    }

    async fn grow_array(&self, array: &str, raid_devices: u32, _backup: &Path) -> Result<()> {
        let mut state = self.state.lock();
        state.mutations += 1;
        let polls = state.resync_polls;
        let entry = state
            .arrays
            .get_mut(array)
            .ok_or_else(|| Error::EntityAbsent {
                kind: "array",
                name: array.to_string(),
            })?;
        entry.raid_devices = raid_devices;
        entry.reshaping = true;
        entry.countdown = polls;
        Ok(())
    }

    async fn fail_and_remove(&self, array: &str, partition: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.mutations += 1;
        let entry = state
            .arrays
            .get_mut(array)
            .ok_or_else(|| Error::EntityAbsent {
                kind: "array",
                name: array.to_string(),
            })?;
        entry.members.retain(|m| m != partition);
        Ok(())
    }
}

#[async_trait]
impl VolumeService for MockBackend {
    async fn create_pv(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.mutations += 1;
        state.pvs.insert(name.to_string());
        Ok(())
    }

    async fn grow_pv(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.mutations += 1;
        if !state.pvs.contains(name) {
            return Err(Error::EntityAbsent {
                kind: "physical volume",
                name: name.to_string(),
            });
        }
        Ok(())
    }

    async fn create_vg(&self, name: &str, pvs: &[String]) -> Result<()> {
        let mut state = self.state.lock();
        state.mutations += 1;
        state.vgs.insert(name.to_string(), pvs.to_vec());
        Ok(())
    }

    async fn extend_vg(&self, name: &str, pv: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.mutations += 1;
        let vg = state
            .vgs
            .get_mut(name)
            .ok_or_else(|| Error::EntityAbsent {
                kind: "volume group",
                name: name.to_string(),
            })?;
        vg.push(pv.to_string());
        Ok(())
    }

    async fn create_lv(&self, name: &str, vg: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.mutations += 1;
        if !state.vgs.contains_key(vg) {
            return Err(Error::EntityAbsent {
                kind: "volume group",
                name: vg.to_string(),
            });
        }
        state.lvs.insert(name.to_string(), vg.to_string());
        Ok(())
    }

    async fn extend_lv(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.mutations += 1;
        if !state.lvs.contains_key(name) {
            return Err(Error::EntityAbsent {
                kind: "logical volume",
                name: name.to_string(),
            });
        }
        *state.lv_extends.entry(name.to_string()).or_insert(0) += 1;
        Ok(())
    }

    async fn vg_pvs(&self, vg: &str) -> Result<Query<Vec<String>>> {
        let state = self.state.lock();
        Ok(match state.vgs.get(vg) {
            Some(pvs) => Query::Found(pvs.clone()),
            None => Query::Absent,
        })
    }

    async fn lv_detail(&self, lv: &str) -> Result<Query<LvDetail>> {
        let state = self.state.lock();
        let vg_name = match state.lvs.get(lv) {
            Some(vg) => vg.clone(),
            None => return Ok(Query::Absent),
        };

        // Usable capacity: (width - 1) x member size per array.
        let mut bytes = 0u64;
        if let Some(pvs) = state.vgs.get(&vg_name) {
            for pv in pvs {
                if let Some(array) = state.arrays.get(pv) {
                    let member_blocks = array
                        .members
                        .first()
                        .and_then(|m| member_blocks(&state, m))
                        .unwrap_or(0);
                    bytes += u64::from(array.raid_devices.saturating_sub(1))
                        * member_blocks
                        * 1024;
                }
            }
        }
        Ok(Query::Found(LvDetail {
            vg_name,
            size_gb: bytes as f64 / 1e9,
        }))
    }
}

/// Block count of a partition path, resolved through the owning mock disk.
fn member_blocks(state: &MockState, partition: &str) -> Option<u64> {
    for (disk_path, disk) in &state.disks {
        if let Some(rest) = partition.strip_prefix(disk_path.as_str()) {
            if let Ok(slot) = rest.parse::<u32>() {
                return disk.parts.get(&slot).copied();
            }
        }
    }
    None
}
