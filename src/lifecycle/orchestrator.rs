//! Sequencing of pool lifecycle operations
//!
//! One `Orchestrator` per invocation: it owns the topology context and runs
//! exactly one operation against it. Every operation front-loads its
//! precondition checks so a refused request leaves the machine untouched,
//! then mutates strictly through the topology layer.

use crate::error::{Error, Result};
use crate::lifecycle::resync::{self, WaitPolicy};
use crate::lifecycle::tiering;
use crate::services::Services;
use crate::topology::drive::FIRST_LOGICAL_SLOT;
use crate::topology::Topology;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

/// Default reshape backup file handed to the RAID layer.
pub const DEFAULT_BACKUP_FILE: &str = "/tmp/raidtier_mdadm_backup";

/// Prefix for auto-allocated volume group names.
pub const DEFAULT_VG_PREFIX: &str = "lvmraid_vg";

/// Minimum drives for a redundant pool.
const MIN_POOL_DRIVES: usize = 2;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Bounds for resync waits
    pub wait: WaitPolicy,
    /// Backup file for array reshapes
    pub backup_file: PathBuf,
    /// Prompt on stdin before each destructive step
    pub interactive: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            wait: WaitPolicy::default(),
            backup_file: PathBuf::from(DEFAULT_BACKUP_FILE),
            interactive: false,
        }
    }
}

pub struct Orchestrator {
    topology: Topology,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(services: Services, config: OrchestratorConfig) -> Self {
        Self {
            topology: Topology::new(services),
            config,
        }
    }

    // =========================================================================
    // create
    // =========================================================================

    /// Build a tiered pool from empty drives: partition each drive per the
    /// tier plan, one RAID5 array per tier, one PV per array, all PVs in a
    /// fresh VG carrying a single LV spanning it. Returns the LV name.
    ///
    /// Arrays resync in the background; create does not wait for them.
    pub async fn create(&mut self, drives: &[String], vg_name: Option<&str>) -> Result<String> {
        if drives.len() < MIN_POOL_DRIVES {
            return Err(Error::TooFewDrives {
                supplied: drives.len(),
                required: MIN_POOL_DRIVES,
            });
        }
        // Redundancy requires every array member to live on a distinct
        // drive; a repeated path would pair an array with itself.
        let mut seen = BTreeSet::new();
        for path in drives {
            if !seen.insert(path.as_str()) {
                return Err(Error::DuplicateDrive {
                    device: path.clone(),
                });
            }
        }

        let mut sized = Vec::new();
        for path in drives {
            let drive = self.topology.drive(path).await?;
            if !drive.empty {
                return Err(Error::DriveNotEmpty {
                    device: path.clone(),
                });
            }
            sized.push((path.clone(), drive.capacity()));
        }

        let plan = tiering::plan(&sized);
        info!(
            increments = ?plan.increments,
            tiers = plan.tiers.len(),
            "planned tiered layout"
        );
        self.confirm(&format!(
            "partition {} drives and create {} RAID5 arrays",
            drives.len(),
            plan.tiers.len()
        ))
        .await?;

        for (path, _) in &sized {
            self.topology.init_drive_partitions(path).await?;
            for &size in &plan.per_drive[path] {
                if self
                    .topology
                    .create_drive_partition(path, size, true)
                    .await?
                    .is_none()
                {
                    break;
                }
            }
        }

        // Partitions at the same slot across drives form one tier.
        let mut pvs = Vec::new();
        let mut slot = FIRST_LOGICAL_SLOT;
        loop {
            let mut members = Vec::new();
            for (path, _) in &sized {
                if let Some(part) = self.topology.get_drive(path)?.partitions.get(&slot) {
                    members.push(part.clone());
                }
            }
            if members.len() < MIN_POOL_DRIVES {
                break;
            }
            let id = self.topology.create_array(&members).await?;
            self.topology.create_pv(&id).await?;
            pvs.push(id);
            slot += 1;
        }
        if pvs.is_empty() {
            return Err(Error::Internal(String::from(
                "no tier produced an array",
            )));
        }

        let vg = match vg_name {
            Some(name) => name.to_string(),
            None => self.next_free_vg_name().await?,
        };
        self.topology.create_vg(&vg, &pvs).await?;
        let lv = format!("{vg}/lvol0");
        self.topology.create_lv(&lv, &vg).await?;
        info!(
            lv,
            vg,
            arrays = pvs.len(),
            "pool created; arrays resync in the background"
        );
        Ok(lv)
    }

    // =========================================================================
    // add / replace
    // =========================================================================

    /// Join an empty drive to an existing pool. With `grow` the pool must be
    /// fully clean and every reached array is widened by one member; without
    /// it the drive replaces the missing members of degraded arrays.
    ///
    /// Either way the drive is partitioned tier by tier, largest array
    /// first, and each array's state immediately before the add decides the
    /// move: clean arrays grow, degraded arrays take the partition as their
    /// rebuild target.
    pub async fn add_or_replace(&mut self, lv: &str, new_drive: &str, grow: bool) -> Result<()> {
        let arrays = self.load_lv(lv).await?;
        let policy = self.config.wait.clone();

        let drive = self.topology.drive(new_drive).await?;
        if !drive.empty {
            return Err(Error::DriveNotEmpty {
                device: new_drive.to_string(),
            });
        }
        let capacity = drive.capacity();

        // The drive must land exactly on a cumulative tier boundary, or
        // cover every tier; anything else would leave a mis-sized member.
        let mut sizes = Vec::new();
        for id in &arrays {
            sizes.push(self.topology.array_members_size(id)?);
        }
        let mut boundaries = Vec::new();
        let mut total = 0u64;
        for &size in &sizes {
            total += size;
            boundaries.push(total);
        }
        if capacity < total && !boundaries.contains(&capacity) {
            return Err(Error::SizeBoundaryMismatch {
                capacity,
                boundaries,
            });
        }

        if grow {
            resync::wait_for_lv_clean(&mut self.topology, lv, &policy).await?;
        } else {
            let mut degraded_total = 0u64;
            for (id, &size) in arrays.iter().zip(&sizes) {
                if self.topology.get_array(id)?.is_degraded() {
                    degraded_total += size;
                }
            }
            if degraded_total == 0 {
                return Err(Error::NothingToReplace { lv: lv.to_string() });
            }
            if degraded_total > capacity {
                return Err(Error::ReplacementTooSmall {
                    required: degraded_total,
                    available: capacity,
                });
            }
        }

        self.confirm(&format!("partition {new_drive} and join it to {lv}"))
            .await?;
        self.topology.init_drive_partitions(new_drive).await?;

        let mut grew_any = false;
        for (id, &size) in arrays.iter().zip(&sizes) {
            let part = match self
                .topology
                .create_drive_partition(new_drive, size, true)
                .await?
            {
                Some(p) => p,
                None => break,
            };
            self.topology.refresh_array(id).await?;
            let was_clean = self.topology.get_array(id)?.is_clean();
            self.topology.add_array_member(id, &part).await?;
            if was_clean {
                let width = self.topology.get_array(id)?.raid_devices + 1;
                let backup = self.config.backup_file.clone();
                self.topology.grow_array(id, width, &backup).await?;
                resync::wait_for_array_clean(&mut self.topology, id, &policy).await?;
                self.topology.grow_pv(id).await?;
                grew_any = true;
            } else {
                info!(
                    array = %id,
                    partition = %part,
                    "rebuilding degraded array onto new member"
                );
            }
        }

        let added_array = self.create_leftover_array(lv, new_drive).await?;

        if grew_any || added_array {
            self.topology.extend_lv(lv).await?;
        }
        Ok(())
    }

    /// Pair leftover capacity on the new drive with the single other pool
    /// drive that also has some, forming an extra 2-member array. Returns
    /// whether an array was added.
    async fn create_leftover_array(&mut self, lv: &str, new_drive: &str) -> Result<bool> {
        let leftover = self.topology.drive_unallocated(new_drive)?;
        if leftover == 0 {
            return Ok(false);
        }
        let vg_name = self.lv_vg(lv)?;

        let mut partners = Vec::new();
        for other in self.topology.vg_drives(&vg_name)? {
            if other != new_drive && self.topology.drive_unallocated(&other)? > 0 {
                partners.push(other);
            }
        }
        let partner = match partners.as_slice() {
            [] => {
                info!(
                    drive = new_drive,
                    leftover, "leftover capacity has no partner drive; leaving it unused"
                );
                return Ok(false);
            }
            [partner] => partner.clone(),
            _ => {
                // Tier allocation fills every drive to a shared boundary, so
                // at most one prior drive can carry leftover space.
                return Err(Error::Internal(format!(
                    "multiple drives with leftover capacity in {vg_name}: {partners:?}"
                )));
            }
        };

        let size = leftover.min(self.topology.drive_unallocated(&partner)?);
        self.confirm(&format!(
            "create an extra array from leftover space on {new_drive} and {partner}"
        ))
        .await?;

        if !self.topology.get_drive(&partner)?.initialized {
            self.topology.init_drive_partitions(&partner).await?;
        }
        let mut members = Vec::new();
        for path in [new_drive, partner.as_str()] {
            let part = self
                .topology
                .create_drive_partition(path, size, false)
                .await?
                .ok_or_else(|| {
                    Error::Internal(format!("partition creation on {path} reported nothing"))
                })?;
            members.push(part);
        }
        let id = self.topology.create_array(&members).await?;
        self.topology.create_pv(&id).await?;
        self.topology.extend_vg(&vg_name, &id).await?;
        info!(array = %id, size, "created leftover array");
        Ok(true)
    }

    // =========================================================================
    // remove
    // =========================================================================

    /// Release a drive from the pool: once every array is clean, fail and
    /// remove each of the drive's partitions from its array. The arrays are
    /// left degraded until a replacement drive arrives.
    pub async fn remove(&mut self, lv: &str, drive: &str) -> Result<()> {
        self.load_lv(lv).await?;
        let policy = self.config.wait.clone();
        resync::wait_for_lv_clean(&mut self.topology, lv, &policy).await?;

        let parts: Vec<String> = self
            .topology
            .drive(drive)
            .await?
            .partitions
            .values()
            .cloned()
            .collect();
        if parts.is_empty() {
            warn!(drive, "no partitions to remove");
            return Ok(());
        }

        self.confirm(&format!(
            "fail and remove {} partitions of {drive} from their arrays",
            parts.len()
        ))
        .await?;
        for part in parts {
            if let Some(array) = self.topology.get_partition(&part)?.array.clone() {
                self.topology.remove_array_member(&array, &part).await?;
            }
        }
        info!(drive, "drive released; arrays stay degraded until replaced");
        Ok(())
    }

    // =========================================================================
    // examine
    // =========================================================================

    /// Read-only report of an LV and the arrays underneath it.
    pub async fn examine(&mut self, lv: &str) -> Result<ExamineReport> {
        let arrays = self.load_lv(lv).await?;
        let vg = self.lv_vg(lv)?;
        let size_gb = self.topology.get_logical_volume(lv)?.size_gb;

        let mut reports = Vec::new();
        for id in arrays {
            let array = self.topology.get_array(&id)?;
            reports.push(ArrayReport {
                state: array.state.to_string(),
                width: array.raid_devices,
                members: array.members.iter().cloned().collect(),
                member_size: self.topology.array_members_size(&id)?,
                id,
            });
        }
        Ok(ExamineReport {
            lv: lv.to_string(),
            vg,
            size_gb,
            arrays: reports,
        })
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Pull an LV and everything underneath it into the topology. Returns
    /// its array ids, largest first (member count, then member size, then
    /// id for a stable order).
    async fn load_lv(&mut self, lv: &str) -> Result<Vec<String>> {
        let entity = self.topology.logical_volume(lv).await?;
        if entity.vg.is_none() {
            return Err(Error::EntityAbsent {
                kind: "logical volume",
                name: lv.to_string(),
            });
        }
        let arrays = self.topology.lv_arrays(lv)?;

        // Array detail names the member partitions; sizing them needs the
        // owning drives' partition tables as well.
        let mut drive_paths = BTreeSet::new();
        for id in &arrays {
            for member in self.topology.get_array(id)?.members.clone() {
                drive_paths.insert(self.topology.get_partition(&member)?.drive.clone());
            }
        }
        for path in drive_paths {
            self.topology.drive(&path).await?;
        }

        let mut ordered = Vec::new();
        for id in arrays {
            let count = self.topology.get_array(&id)?.members.len();
            let size = self.topology.array_members_size(&id)?;
            ordered.push((count, size, id));
        }
        ordered.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)).then(a.2.cmp(&b.2)));
        Ok(ordered.into_iter().map(|(_, _, id)| id).collect())
    }

    fn lv_vg(&self, lv: &str) -> Result<String> {
        self.topology
            .get_logical_volume(lv)?
            .vg
            .clone()
            .ok_or_else(|| Error::EntityAbsent {
                kind: "logical volume",
                name: lv.to_string(),
            })
    }

    /// First unused name in the `lvmraid_vgN` scheme.
    async fn next_free_vg_name(&mut self) -> Result<String> {
        let mut n = 0u32;
        loop {
            let name = format!("{DEFAULT_VG_PREFIX}{n}");
            if self.topology.volume_group(&name).await?.pvs.is_empty() {
                return Ok(name);
            }
            n += 1;
        }
    }

    /// Operator gate before destructive steps.
    async fn confirm(&self, action: &str) -> Result<()> {
        if !self.config.interactive {
            return Ok(());
        }
        eprint!("About to {action}. Proceed? [y/N] ");
        let mut line = String::new();
        BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await?;
        match line.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Ok(()),
            _ => Err(Error::Aborted),
        }
    }
}

// =============================================================================
// Examine report
// =============================================================================

#[derive(Debug, Serialize)]
pub struct ExamineReport {
    pub lv: String,
    pub vg: String,
    pub size_gb: Option<f64>,
    pub arrays: Vec<ArrayReport>,
}

#[derive(Debug, Serialize)]
pub struct ArrayReport {
    pub id: String,
    pub state: String,
    pub width: u32,
    pub member_size: u64,
    pub members: Vec<String>,
}

impl fmt::Display for ExamineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} (vg {})", self.lv, self.vg)?;
        if let Some(size) = self.size_gb {
            writeln!(f, "  size: {size:.1} GB")?;
        }
        for array in &self.arrays {
            writeln!(
                f,
                "  {} [{} wide, member size {}] {}",
                array.id, array.width, array.member_size, array.state
            )?;
            for member in &array.members {
                writeln!(f, "    {member}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mock::MockBackend;
    use assert_matches::assert_matches;

    fn orchestrator(backend: &MockBackend) -> Orchestrator {
        let config = OrchestratorConfig {
            wait: WaitPolicy::immediate(),
            ..Default::default()
        };
        Orchestrator::new(backend.services(), config)
    }

    fn paths(p: &[&str]) -> Vec<String> {
        p.iter().map(|s| s.to_string()).collect()
    }

    /// 1 TB + 2 TB + 2 TB pool: two tiers, a 3-wide and a 2-wide array.
    async fn tiered_pool(backend: &MockBackend) -> String {
        backend.add_disk("/dev/sda", 1_000_000_000_000);
        backend.add_disk("/dev/sdb", 2_000_000_000_000);
        backend.add_disk("/dev/sdc", 2_000_000_000_000);
        orchestrator(backend)
            .create(&paths(&["/dev/sda", "/dev/sdb", "/dev/sdc"]), Some("vg0"))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_builds_tiered_pool() {
        let backend = MockBackend::new();
        let lv = tiered_pool(&backend).await;

        assert_eq!(lv, "vg0/lvol0");
        assert_eq!(backend.vg_names(), vec!["vg0"]);
        assert_eq!(backend.array_ids(), vec!["/dev/md0", "/dev/md1"]);
        // First tier spans all three drives, second only the larger two.
        assert_eq!(backend.array_width("/dev/md0"), 3);
        assert_eq!(backend.array_width("/dev/md1"), 2);
        assert_eq!(
            backend.array_members("/dev/md0"),
            vec!["/dev/sda5", "/dev/sdb5", "/dev/sdc5"]
        );
        assert_eq!(
            backend.array_members("/dev/md1"),
            vec!["/dev/sdb6", "/dev/sdc6"]
        );
    }

    #[tokio::test]
    async fn test_create_reports_usable_size() {
        let backend = MockBackend::new();
        let lv = tiered_pool(&backend).await;

        let report = orchestrator(&backend).examine(&lv).await.unwrap();
        assert_eq!(report.vg, "vg0");
        assert_eq!(report.arrays.len(), 2);
        assert_eq!(report.arrays[0].member_size, 990_000_000_000);
        assert_eq!(report.arrays[1].member_size, 910_000_000_000);
        // 2 x 990 GB + 1 x 910 GB usable.
        let size = report.size_gb.unwrap();
        assert!((size - 2890.0).abs() < 1.0, "unexpected size {size}");
    }

    #[tokio::test]
    async fn test_create_allocates_default_vg_name() {
        let backend = MockBackend::new();
        backend.add_disk("/dev/sda", 1_000_000_000_000);
        backend.add_disk("/dev/sdb", 1_000_000_000_000);

        let lv = orchestrator(&backend)
            .create(&paths(&["/dev/sda", "/dev/sdb"]), None)
            .await
            .unwrap();
        assert_eq!(lv, "lvmraid_vg0/lvol0");
        assert_eq!(backend.vg_names(), vec!["lvmraid_vg0"]);
    }

    #[tokio::test]
    async fn test_create_needs_two_drives() {
        let backend = MockBackend::new();
        backend.add_disk("/dev/sda", 1_000_000_000_000);

        let err = orchestrator(&backend)
            .create(&paths(&["/dev/sda"]), None)
            .await
            .unwrap_err();
        assert_matches!(err, Error::TooFewDrives { supplied: 1, .. });
        assert_eq!(backend.mutations(), 0);
    }

    #[tokio::test]
    async fn test_create_rejects_repeated_drive() {
        let backend = MockBackend::new();
        backend.add_disk("/dev/sda", 1_000_000_000_000);
        backend.add_disk("/dev/sdb", 1_000_000_000_000);

        // The same drive twice would build an "array" with two members on
        // one spindle and no real redundancy.
        let err = orchestrator(&backend)
            .create(&paths(&["/dev/sda", "/dev/sda", "/dev/sdb"]), None)
            .await
            .unwrap_err();
        assert_matches!(err, Error::DuplicateDrive { ref device } if device == "/dev/sda");
        assert!(err.is_precondition());
        assert_eq!(backend.mutations(), 0);
        assert!(backend.array_ids().is_empty());
    }

    #[tokio::test]
    async fn test_create_refuses_non_empty_drive() {
        let backend = MockBackend::new();
        backend.add_disk("/dev/sda", 1_000_000_000_000);
        backend.add_disk("/dev/sdb", 1_000_000_000_000);
        // Pre-existing partitioning on sdb.
        let services = backend.services();
        services.partition.init_partitions("/dev/sdb").await.unwrap();
        let before = backend.mutations();

        let err = orchestrator(&backend)
            .create(&paths(&["/dev/sda", "/dev/sdb"]), None)
            .await
            .unwrap_err();
        assert_matches!(err, Error::DriveNotEmpty { .. });
        assert_eq!(backend.mutations(), before);
    }

    #[tokio::test]
    async fn test_add_widens_every_array() {
        let backend = MockBackend::new();
        let lv = tiered_pool(&backend).await;
        backend.add_disk("/dev/sdd", 3_000_000_000_000);

        orchestrator(&backend)
            .add_or_replace(&lv, "/dev/sdd", true)
            .await
            .unwrap();

        assert_eq!(backend.array_width("/dev/md0"), 4);
        assert_eq!(backend.array_width("/dev/md1"), 3);
        // The 1 TB of leftover on sdd has no partner drive, so no third
        // array appears.
        assert_eq!(backend.array_ids().len(), 2);
        assert_eq!(backend.lv_extend_count(&lv), 1);

        let report = orchestrator(&backend).examine(&lv).await.unwrap();
        let size = report.size_gb.unwrap();
        assert!((size - 4790.0).abs() < 1.0, "unexpected size {size}");
    }

    #[tokio::test]
    async fn test_add_rejects_off_boundary_capacity() {
        let backend = MockBackend::new();
        let lv = tiered_pool(&backend).await;
        // 1.4 TB usable: above the first boundary (990 GB), below the
        // second (1.9 TB).
        backend.add_disk("/dev/sdd", 1_500_000_000_000);
        let before = backend.mutations();

        let err = orchestrator(&backend)
            .add_or_replace(&lv, "/dev/sdd", true)
            .await
            .unwrap_err();
        assert_matches!(err, Error::SizeBoundaryMismatch { .. });
        assert!(err.is_precondition());
        assert_eq!(backend.mutations(), before);
    }

    #[tokio::test]
    async fn test_add_on_degraded_pool_fails_before_mutating() {
        let backend = MockBackend::new();
        let lv = tiered_pool(&backend).await;
        backend.degrade_array("/dev/md0", "/dev/sdc5");
        backend.add_disk("/dev/sdd", 3_000_000_000_000);
        let before = backend.mutations();

        let err = orchestrator(&backend)
            .add_or_replace(&lv, "/dev/sdd", true)
            .await
            .unwrap_err();
        assert_matches!(err, Error::UnexpectedArrayState { .. });
        assert_eq!(backend.mutations(), before);
        assert_eq!(backend.disk_partition_count("/dev/sdd"), 0);
    }

    #[tokio::test]
    async fn test_replace_rebuilds_degraded_array() {
        let backend = MockBackend::new();
        backend.add_disk("/dev/sda", 2_000_000_000_000);
        backend.add_disk("/dev/sdb", 2_000_000_000_000);
        backend.add_disk("/dev/sdc", 2_000_000_000_000);
        let lv = orchestrator(&backend)
            .create(&paths(&["/dev/sda", "/dev/sdb", "/dev/sdc"]), None)
            .await
            .unwrap();
        backend.degrade_array("/dev/md0", "/dev/sdc5");
        backend.add_disk("/dev/sdd", 2_000_000_000_000);

        orchestrator(&backend)
            .add_or_replace(&lv, "/dev/sdd", false)
            .await
            .unwrap();

        assert_eq!(
            backend.array_members("/dev/md0"),
            vec!["/dev/sda5", "/dev/sdb5", "/dev/sdd5"]
        );
        // Replacement restores the original width and size; no LV growth.
        assert_eq!(backend.array_width("/dev/md0"), 3);
        assert_eq!(backend.lv_extend_count(&lv), 0);
    }

    #[tokio::test]
    async fn test_replace_on_clean_pool_fails() {
        let backend = MockBackend::new();
        let lv = tiered_pool(&backend).await;
        backend.add_disk("/dev/sdd", 3_000_000_000_000);
        let before = backend.mutations();

        let err = orchestrator(&backend)
            .add_or_replace(&lv, "/dev/sdd", false)
            .await
            .unwrap_err();
        assert_matches!(err, Error::NothingToReplace { .. });
        assert!(err.is_precondition());
        assert_eq!(backend.mutations(), before);
    }

    #[tokio::test]
    async fn test_replace_drive_must_cover_degraded_arrays() {
        let backend = MockBackend::new();
        let lv = tiered_pool(&backend).await;
        backend.degrade_array("/dev/md0", "/dev/sdc5");
        backend.degrade_array("/dev/md1", "/dev/sdc6");
        // 990 GB usable covers only the first tier; both are degraded.
        backend.add_disk("/dev/sdd", 1_000_000_000_000);
        let before = backend.mutations();

        let err = orchestrator(&backend)
            .add_or_replace(&lv, "/dev/sdd", false)
            .await
            .unwrap_err();
        assert_matches!(
            err,
            Error::ReplacementTooSmall {
                required: 1_900_000_000_000,
                available: 990_000_000_000,
            }
        );
        assert_eq!(backend.mutations(), before);
    }

    #[tokio::test]
    async fn test_remove_releases_every_partition() {
        let backend = MockBackend::new();
        let lv = tiered_pool(&backend).await;

        orchestrator(&backend)
            .remove(&lv, "/dev/sdc")
            .await
            .unwrap();

        assert_eq!(
            backend.array_members("/dev/md0"),
            vec!["/dev/sda5", "/dev/sdb5"]
        );
        assert_eq!(backend.array_members("/dev/md1"), vec!["/dev/sdb6"]);
        // Widths are untouched; the arrays run degraded.
        assert_eq!(backend.array_width("/dev/md0"), 3);
        assert_eq!(backend.array_width("/dev/md1"), 2);
    }

    #[tokio::test]
    async fn test_remove_refuses_degraded_pool() {
        let backend = MockBackend::new();
        let lv = tiered_pool(&backend).await;
        backend.degrade_array("/dev/md0", "/dev/sdc5");
        let before = backend.mutations();

        let err = orchestrator(&backend)
            .remove(&lv, "/dev/sdb")
            .await
            .unwrap_err();
        assert_matches!(err, Error::UnexpectedArrayState { .. });
        assert_eq!(backend.mutations(), before);
    }

    #[tokio::test]
    async fn test_examine_orders_arrays_largest_first() {
        let backend = MockBackend::new();
        let lv = tiered_pool(&backend).await;

        let report = orchestrator(&backend).examine(&lv).await.unwrap();
        assert_eq!(report.lv, lv);
        assert_eq!(report.arrays[0].id, "/dev/md0");
        assert_eq!(report.arrays[0].width, 3);
        assert_eq!(report.arrays[1].id, "/dev/md1");
        assert_eq!(report.arrays[1].width, 2);
        let text = report.to_string();
        assert!(text.contains("/dev/md0"));
        assert!(text.contains("/dev/sdb6"));
    }
}
