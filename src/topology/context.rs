//! Topology context - the per-invocation entity registry
//!
//! `Topology` owns one map per entity kind and the handle to the external
//! services. Every entity is created on first reference and refreshed from
//! its backing service exactly once before being returned; later lookups hit
//! the cache. Callers never construct entities directly, so there is at most
//! one live object per (kind, name) for the lifetime of an invocation.
//!
//! Entities that do not exist externally yet are legitimate: an
//! informational refresh that comes back [`Query::Absent`] leaves the entity
//! in its default state. Every mutating call re-queries the affected entity
//! before returning, giving strict read-after-write ordering.

use crate::domain::ports::{ArrayState, PartitionKind, Query};
use crate::error::{Error, Result};
use crate::services::Services;
use crate::topology::array::RaidArray;
use crate::topology::drive::{Drive, Partition};
use crate::topology::volume::{LogicalVolume, PhysicalVolume, VolumeGroup};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tracing::{debug, info};

/// Fraction of capacity above which a drive counts as fully allocated;
/// anything left is rounding noise, not usable space.
const FULLY_ALLOCATED_PERCENT: u64 = 95;

/// Per-invocation registry of storage entities
pub struct Topology {
    services: Services,
    drives: BTreeMap<String, Drive>,
    partitions: BTreeMap<String, Partition>,
    arrays: BTreeMap<String, RaidArray>,
    pvs: BTreeMap<String, PhysicalVolume>,
    vgs: BTreeMap<String, VolumeGroup>,
    lvs: BTreeMap<String, LogicalVolume>,
}

impl Topology {
    pub fn new(services: Services) -> Self {
        Self {
            services,
            drives: BTreeMap::new(),
            partitions: BTreeMap::new(),
            arrays: BTreeMap::new(),
            pvs: BTreeMap::new(),
            vgs: BTreeMap::new(),
            lvs: BTreeMap::new(),
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    // =========================================================================
    // Find-or-create accessors
    // =========================================================================

    /// Drive for `path`, refreshed on first reference. A missing device node
    /// is an error: drives must physically exist.
    pub async fn drive(&mut self, path: &str) -> Result<&Drive> {
        if !self.drives.contains_key(path) {
            debug!(kind = "drive", name = path, "creating entity");
            self.drives.insert(path.to_string(), Drive::new(path));
            self.refresh_drive(path).await?;
        }
        Ok(&self.drives[path])
    }

    /// Array for `id`, refreshed on first reference. An array that does not
    /// exist externally yet stays in its default state.
    pub async fn array(&mut self, id: &str) -> Result<&RaidArray> {
        if !self.arrays.contains_key(id) {
            debug!(kind = "array", name = id, "creating entity");
            self.arrays.insert(id.to_string(), RaidArray::new(id));
            self.refresh_array(id).await?;
        }
        Ok(&self.arrays[id])
    }

    /// Volume group for `name`, refreshed on first reference.
    pub async fn volume_group(&mut self, name: &str) -> Result<&VolumeGroup> {
        if !self.vgs.contains_key(name) {
            debug!(kind = "vg", name, "creating entity");
            self.vgs.insert(name.to_string(), VolumeGroup::new(name));
            self.refresh_vg(name).await?;
        }
        Ok(&self.vgs[name])
    }

    /// Logical volume for `name`, refreshed on first reference.
    pub async fn logical_volume(&mut self, name: &str) -> Result<&LogicalVolume> {
        if !self.lvs.contains_key(name) {
            debug!(kind = "lv", name, "creating entity");
            self.lvs.insert(name.to_string(), LogicalVolume::new(name));
            self.refresh_lv(name).await?;
        }
        Ok(&self.lvs[name])
    }

    // =========================================================================
    // Cached lookups
    // =========================================================================

    pub fn get_drive(&self, path: &str) -> Result<&Drive> {
        self.drives.get(path).ok_or_else(|| Error::EntityAbsent {
            kind: "drive",
            name: path.to_string(),
        })
    }

    pub fn get_partition(&self, path: &str) -> Result<&Partition> {
        self.partitions
            .get(path)
            .ok_or_else(|| Error::EntityAbsent {
                kind: "partition",
                name: path.to_string(),
            })
    }

    pub fn get_array(&self, id: &str) -> Result<&RaidArray> {
        self.arrays.get(id).ok_or_else(|| Error::EntityAbsent {
            kind: "array",
            name: id.to_string(),
        })
    }

    pub fn get_volume_group(&self, name: &str) -> Result<&VolumeGroup> {
        self.vgs.get(name).ok_or_else(|| Error::EntityAbsent {
            kind: "volume group",
            name: name.to_string(),
        })
    }

    pub fn get_logical_volume(&self, name: &str) -> Result<&LogicalVolume> {
        self.lvs.get(name).ok_or_else(|| Error::EntityAbsent {
            kind: "logical volume",
            name: name.to_string(),
        })
    }

    // =========================================================================
    // Refresh (read-after-write)
    // =========================================================================

    /// Re-read a drive's partition table and rebuild its partition entities.
    pub async fn refresh_drive(&mut self, path: &str) -> Result<()> {
        debug!(kind = "drive", name = path, "refreshing");
        let table = match self.services.partition.partition_table(path).await? {
            Query::Found(t) => t,
            Query::Absent => {
                return Err(Error::DeviceNotFound {
                    device: path.to_string(),
                })
            }
        };

        let mut raid_parts = Vec::new();
        let mut initialized = false;
        for info in &table.partitions {
            match info.kind {
                PartitionKind::Extended => initialized = true,
                PartitionKind::RaidMember => raid_parts.push(info.clone()),
                PartitionKind::Other => {}
            }
        }

        {
            let drive = self
                .drives
                .get_mut(path)
                .ok_or_else(|| Error::EntityAbsent {
                    kind: "drive",
                    name: path.to_string(),
                })?;
            drive.size_bytes = table.size_bytes;
            drive.empty = table.is_empty();
            drive.initialized = initialized;
            drive.partitions.clear();
            for info in &raid_parts {
                drive.partitions.insert(info.slot, info.path.clone());
            }
        }

        // Build partition entities, querying array membership once for new
        // ones (the find-or-create contract).
        for info in raid_parts {
            let is_new = !self.partitions.contains_key(&info.path);
            let part = self
                .partitions
                .entry(info.path.clone())
                .or_insert_with(|| Partition::new(&info.path, path, info.slot));
            part.num_blocks = info.blocks;
            part.slot = info.slot;
            part.drive = path.to_string();
            if is_new {
                self.refresh_partition(&info.path).await?;
            }
        }

        Ok(())
    }

    /// Re-check which array a partition belongs to.
    pub async fn refresh_partition(&mut self, path: &str) -> Result<()> {
        let owner = self.services.raid.examine_member(path).await?.found();
        let part = self
            .partitions
            .get_mut(path)
            .ok_or_else(|| Error::EntityAbsent {
                kind: "partition",
                name: path.to_string(),
            })?;
        part.array = owner;
        Ok(())
    }

    /// Re-read an array's detail. Absence is normal for an array that has
    /// not been created yet.
    pub async fn refresh_array(&mut self, id: &str) -> Result<()> {
        debug!(kind = "array", name = id, "refreshing");
        let detail = self.services.raid.detail(id).await?;

        let (members, raid_devices, state, percent) = match detail {
            Query::Found(d) => (d.members, d.raid_devices, d.state, d.rebuild_percent),
            Query::Absent => (
                Vec::new(),
                0,
                ArrayState::Unknown(String::from("absent")),
                None,
            ),
        };

        // Member partitions may not have been seen through a drive refresh
        // yet; register them from their path alone.
        for member in &members {
            if !self.partitions.contains_key(member) {
                if let Some((drive, slot)) = split_partition_path(member) {
                    self.partitions
                        .insert(member.clone(), Partition::new(member, drive, slot));
                }
            }
            if let Some(part) = self.partitions.get_mut(member) {
                part.array = Some(id.to_string());
            }
        }

        let array = self.arrays.get_mut(id).ok_or_else(|| Error::EntityAbsent {
            kind: "array",
            name: id.to_string(),
        })?;
        array.members = members.into_iter().collect();
        array.raid_devices = raid_devices;
        array.state = state;
        array.rebuild_percent = percent;
        Ok(())
    }

    /// Re-read a VG's PV membership, pulling the PV and array entities
    /// underneath it into the cache.
    pub async fn refresh_vg(&mut self, name: &str) -> Result<()> {
        debug!(kind = "vg", name, "refreshing");
        let pv_names = match self.services.volume.vg_pvs(name).await? {
            Query::Found(pvs) => pvs,
            Query::Absent => return Ok(()),
        };

        for pv_name in &pv_names {
            self.pvs
                .entry(pv_name.clone())
                .or_insert_with(|| PhysicalVolume::new(pv_name));
            // One array per PV; make sure it is cached and linked.
            self.array(pv_name).await?;
            if let Some(array) = self.arrays.get_mut(pv_name) {
                array.pv = Some(pv_name.clone());
            }
        }

        let vg = self.vgs.get_mut(name).ok_or_else(|| Error::EntityAbsent {
            kind: "volume group",
            name: name.to_string(),
        })?;
        vg.pvs = pv_names.into_iter().collect();
        Ok(())
    }

    /// Re-read LV detail and pull in the owning VG.
    pub async fn refresh_lv(&mut self, name: &str) -> Result<()> {
        debug!(kind = "lv", name, "refreshing");
        let detail = match self.services.volume.lv_detail(name).await? {
            Query::Found(d) => d,
            Query::Absent => return Ok(()),
        };

        let vg_name = detail.vg_name.clone();
        {
            let lv = self.lvs.get_mut(name).ok_or_else(|| Error::EntityAbsent {
                kind: "logical volume",
                name: name.to_string(),
            })?;
            lv.vg = Some(vg_name.clone());
            lv.size_gb = Some(detail.size_gb);
        }
        self.volume_group(&vg_name).await?;
        Ok(())
    }

    // =========================================================================
    // Graph queries
    // =========================================================================

    /// Unallocated space on a drive. Allocation beyond the rounding-noise
    /// threshold counts as full.
    pub fn drive_unallocated(&self, path: &str) -> Result<u64> {
        let drive = self.get_drive(path)?;
        let capacity = drive.capacity();
        let mut used = 0u64;
        for part_path in drive.partitions.values() {
            used += self.get_partition(part_path)?.size();
        }
        if used * 100 > capacity * FULLY_ALLOCATED_PERCENT {
            return Ok(0);
        }
        Ok(capacity - used)
    }

    /// Common member size of an array. All members must report the same
    /// size; a mismatch is a topology bug and fails loudly.
    pub fn array_members_size(&self, id: &str) -> Result<u64> {
        let array = self.get_array(id)?;
        let mut size: Option<u64> = None;
        for member in &array.members {
            let member_size = self.get_partition(member)?.size();
            match size {
                None => size = Some(member_size),
                Some(expected) if expected != member_size => {
                    return Err(Error::MemberSizeMismatch {
                        array: id.to_string(),
                        expected,
                        found: member_size,
                    });
                }
                Some(_) => {}
            }
        }
        size.ok_or_else(|| Error::Internal(format!("array {id} has no members")))
    }

    /// All drives contributing to a VG, duplicate-free.
    pub fn vg_drives(&self, vg: &str) -> Result<BTreeSet<String>> {
        let vg = self.get_volume_group(vg)?;
        let mut drives = BTreeSet::new();
        for pv_name in &vg.pvs {
            let pv = self.pvs.get(pv_name).ok_or_else(|| Error::EntityAbsent {
                kind: "physical volume",
                name: pv_name.clone(),
            })?;
            let array = self.get_array(&pv.array)?;
            for member in &array.members {
                drives.insert(self.get_partition(member)?.drive.clone());
            }
        }
        Ok(drives)
    }

    /// The array ids backing an LV, via its VG's PVs.
    pub fn lv_arrays(&self, lv: &str) -> Result<Vec<String>> {
        let lv = self.get_logical_volume(lv)?;
        let vg_name = lv.vg.as_ref().ok_or_else(|| Error::EntityAbsent {
            kind: "logical volume",
            name: lv.name.clone(),
        })?;
        let vg = self.get_volume_group(vg_name)?;
        let mut arrays = Vec::new();
        for pv_name in &vg.pvs {
            let pv = self.pvs.get(pv_name).ok_or_else(|| Error::EntityAbsent {
                kind: "physical volume",
                name: pv_name.clone(),
            })?;
            arrays.push(pv.array.clone());
        }
        Ok(arrays)
    }

    // =========================================================================
    // Mutations (each followed by a refresh of the affected entity)
    // =========================================================================

    /// Set up the extended partition container on an empty drive.
    pub async fn init_drive_partitions(&mut self, path: &str) -> Result<()> {
        info!(kind = "drive", name = path, "initialising partition table");
        self.services.partition.init_partitions(path).await?;
        self.refresh_drive(path).await
    }

    /// Create one partition. With `allow_shortfall`, running out of space
    /// returns `Ok(None)` instead of failing - the orchestrator's normal
    /// early-stop signal.
    pub async fn create_drive_partition(
        &mut self,
        path: &str,
        size_bytes: u64,
        allow_shortfall: bool,
    ) -> Result<Option<String>> {
        info!(
            kind = "drive",
            name = path, size_bytes, "creating partition"
        );
        let created = self
            .services
            .partition
            .create_partition(path, size_bytes)
            .await?;
        let created = match created {
            Some(c) => c,
            None if allow_shortfall => return Ok(None),
            None => {
                return Err(Error::PartitionCreateFailed {
                    device: path.to_string(),
                    requested: size_bytes,
                })
            }
        };
        self.refresh_drive(path).await?;
        Ok(Some(created.path))
    }

    /// Create a RAID5 array; the service allocates the id.
    pub async fn create_array(&mut self, members: &[String]) -> Result<String> {
        info!(?members, "creating RAID5 array");
        let id = self.services.raid.create_array(members).await?;
        self.arrays.entry(id.clone()).or_insert_with(|| RaidArray::new(&id));
        self.refresh_array(&id).await?;
        Ok(id)
    }

    pub async fn add_array_member(&mut self, array: &str, partition: &str) -> Result<()> {
        info!(kind = "array", name = array, partition, "adding member");
        self.services.raid.add_member(array, partition).await?;
        self.refresh_array(array).await
    }

    pub async fn grow_array(
        &mut self,
        array: &str,
        raid_devices: u32,
        backup_file: &Path,
    ) -> Result<()> {
        info!(
            kind = "array",
            name = array, raid_devices, "growing array width"
        );
        self.services
            .raid
            .grow_array(array, raid_devices, backup_file)
            .await?;
        self.refresh_array(array).await
    }

    /// Fail and remove a member, leaving the array degraded.
    pub async fn remove_array_member(&mut self, array: &str, partition: &str) -> Result<()> {
        info!(kind = "array", name = array, partition, "removing member");
        self.services.raid.fail_and_remove(array, partition).await?;
        if let Some(part) = self.partitions.get_mut(partition) {
            part.array = None;
        }
        self.refresh_array(array).await
    }

    pub async fn create_pv(&mut self, name: &str) -> Result<()> {
        info!(kind = "pv", name, "creating physical volume");
        self.services.volume.create_pv(name).await?;
        self.pvs
            .entry(name.to_string())
            .or_insert_with(|| PhysicalVolume::new(name));
        if let Some(array) = self.arrays.get_mut(name) {
            array.pv = Some(name.to_string());
        }
        Ok(())
    }

    pub async fn grow_pv(&mut self, name: &str) -> Result<()> {
        info!(kind = "pv", name, "resizing physical volume");
        self.services.volume.grow_pv(name).await
    }

    pub async fn create_vg(&mut self, name: &str, pvs: &[String]) -> Result<()> {
        info!(kind = "vg", name, ?pvs, "creating volume group");
        self.services.volume.create_vg(name, pvs).await?;
        self.vgs
            .entry(name.to_string())
            .or_insert_with(|| VolumeGroup::new(name));
        self.refresh_vg(name).await
    }

    pub async fn extend_vg(&mut self, name: &str, pv: &str) -> Result<()> {
        info!(kind = "vg", name, pv, "extending volume group");
        self.services.volume.extend_vg(name, pv).await?;
        self.refresh_vg(name).await
    }

    pub async fn create_lv(&mut self, name: &str, vg: &str) -> Result<()> {
        info!(kind = "lv", name, vg, "creating logical volume");
        self.services.volume.create_lv(name, vg).await?;
        self.lvs
            .entry(name.to_string())
            .or_insert_with(|| LogicalVolume::new(name));
        self.refresh_lv(name).await
    }

    pub async fn extend_lv(&mut self, name: &str) -> Result<()> {
        info!(kind = "lv", name, "extending logical volume");
        self.services.volume.extend_lv(name).await?;
        self.refresh_lv(name).await
    }
}

/// Split a partition path into its drive path and slot number
/// (`/dev/sda5` -> (`/dev/sda`, 5)).
pub fn split_partition_path(path: &str) -> Option<(String, u32)> {
    let digits = path
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .count();
    if digits == 0 || digits == path.len() {
        return None;
    }
    let (drive, slot) = path.split_at(path.len() - digits);
    Some((drive.to_string(), slot.parse().ok()?))
}
