//! Partition table adapter backed by sfdisk
//!
//! The original-tool interaction is fully scripted: `sfdisk --json` for
//! reads, sfdisk script lines on stdin for writes. The pool's on-disk scheme
//! is an MS-DOS label with one extended container holding the tier
//! partitions as logical partitions (type `fd`, Linux raid autodetect).

use crate::domain::ports::{
    CreatedPartition, PartitionInfo, PartitionKind, PartitionService, PartitionTable, Query,
};
use crate::error::{Error, Result};
use crate::services::{run, run_query, run_with_stdin};
use crate::topology::context::split_partition_path;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

/// MBR partition type for the extended container
const TYPE_EXTENDED: &[&str] = &["5", "f"];
/// MBR partition type for Linux raid autodetect
const TYPE_RAID: &str = "fd";

// =============================================================================
// sfdisk JSON schema
// =============================================================================

#[derive(Debug, Deserialize)]
struct SfdiskReport {
    partitiontable: SfdiskTable,
}

#[derive(Debug, Deserialize)]
struct SfdiskTable {
    #[serde(default)]
    partitions: Vec<SfdiskPartition>,
}

#[derive(Debug, Deserialize)]
struct SfdiskPartition {
    node: String,
    /// Size in 512-byte sectors
    size: u64,
    #[serde(rename = "type")]
    type_id: String,
}

// =============================================================================
// Adapter
// =============================================================================

pub struct SfdiskPartitioner;

impl SfdiskPartitioner {
    pub fn new() -> Self {
        Self
    }

    /// Raw device size, or `Absent` when the device node is missing.
    async fn device_size(&self, device: &str) -> Result<Query<u64>> {
        let out = match run_query("blockdev", &["--getsize64", device]).await? {
            Query::Found(out) => out,
            Query::Absent => return Ok(Query::Absent),
        };
        let size = out
            .trim()
            .parse::<u64>()
            .map_err(|_| Error::CommandOutput {
                program: "blockdev".into(),
                reason: format!("bad size {:?} for {device}", out.trim()),
            })?;
        Ok(Query::Found(size))
    }

    /// The kernel sometimes misses a freshly written table; partprobe makes
    /// the new nodes appear.
    async fn settle(&self, device: &str) -> Result<()> {
        run("partprobe", &[device]).await.map(|_| ())
    }
}

impl Default for SfdiskPartitioner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PartitionService for SfdiskPartitioner {
    async fn partition_table(&self, device: &str) -> Result<Query<PartitionTable>> {
        let size_bytes = match self.device_size(device).await? {
            Query::Found(s) => s,
            Query::Absent => return Ok(Query::Absent),
        };

        // A device with no recognised label makes sfdisk exit non-zero;
        // that is an empty table, not a missing device.
        let raw = match run_query("sfdisk", &["--json", device]).await? {
            Query::Found(raw) => raw,
            Query::Absent => {
                return Ok(Query::Found(PartitionTable {
                    size_bytes,
                    partitions: Vec::new(),
                }))
            }
        };

        let report: SfdiskReport = serde_json::from_str(&raw)?;
        let mut partitions = Vec::new();
        for part in report.partitiontable.partitions {
            let kind = if TYPE_EXTENDED.contains(&part.type_id.as_str()) {
                PartitionKind::Extended
            } else if part.type_id == TYPE_RAID {
                PartitionKind::RaidMember
            } else {
                PartitionKind::Other
            };
            let slot = split_partition_path(&part.node)
                .map(|(_, slot)| slot)
                .ok_or_else(|| Error::CommandOutput {
                    program: "sfdisk".into(),
                    reason: format!("unnumbered partition node {}", part.node),
                })?;
            partitions.push(PartitionInfo {
                path: part.node,
                slot,
                blocks: part.size * 512 / 1024,
                kind,
            });
        }
        partitions.sort_by_key(|p| p.slot);
        Ok(Query::Found(PartitionTable {
            size_bytes,
            partitions,
        }))
    }

    async fn init_partitions(&self, device: &str) -> Result<()> {
        // Fresh dos label with a single extended partition spanning the disk.
        run_with_stdin("sfdisk", &[device], Some("label: dos\n,,E\n")).await?;
        self.settle(device).await
    }

    async fn create_partition(
        &self,
        device: &str,
        size_bytes: u64,
    ) -> Result<Option<CreatedPartition>> {
        let script = format!(",{}KiB,{}\n", size_bytes / 1024, TYPE_RAID);
        match run_with_stdin("sfdisk", &["--append", device], Some(&script)).await {
            Ok(_) => {}
            Err(Error::CommandFailed { stderr, .. })
                if stderr.contains("exceeds") || stderr.contains("no free") =>
            {
                // Out of space on this drive - a normal stopping condition.
                debug!(device, size_bytes, "partition does not fit");
                return Ok(None);
            }
            Err(e) => return Err(e),
        }
        self.settle(device).await?;

        // Re-read the table; the new partition has the highest slot.
        let table = match self.partition_table(device).await? {
            Query::Found(t) => t,
            Query::Absent => {
                return Err(Error::DeviceNotFound {
                    device: device.to_string(),
                })
            }
        };
        let created = table
            .partitions
            .iter()
            .filter(|p| p.kind == PartitionKind::RaidMember)
            .max_by_key(|p| p.slot)
            .ok_or_else(|| Error::CommandOutput {
                program: "sfdisk".into(),
                reason: format!("created partition missing from {device} table"),
            })?;
        Ok(Some(CreatedPartition {
            path: created.path.clone(),
            slot: created.slot,
            blocks: created.blocks,
        }))
    }
}
