//! External service adapters
//!
//! The pool manager drives three collaborators through the ports in
//! [`crate::domain::ports`]: the partitioning tool (`sfdisk`), the RAID
//! manager (`mdadm`) and the LVM tools. [`Services`] bundles one adapter per
//! port; tests swap in the in-memory [`mock`] backend.

pub mod lvm;
pub mod mdadm;
pub mod sfdisk;

#[cfg(test)]
pub mod mock;

use crate::domain::ports::{PartitionServiceRef, Query, RaidServiceRef, VolumeServiceRef};
use crate::error::{Error, Result};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

// =============================================================================
// Service Bundle
// =============================================================================

/// One adapter per external collaborator
#[derive(Clone)]
pub struct Services {
    pub partition: PartitionServiceRef,
    pub raid: RaidServiceRef,
    pub volume: VolumeServiceRef,
}

impl Services {
    /// Adapters wired to the real system tools.
    pub fn system() -> Self {
        Self {
            partition: Arc::new(sfdisk::SfdiskPartitioner::new()),
            raid: Arc::new(mdadm::MdadmRaid::new()),
            volume: Arc::new(lvm::LvmVolumes::new()),
        }
    }
}

// =============================================================================
// Command Runner
// =============================================================================

/// Run a mutating command; any failure is fatal.
pub(crate) async fn run(program: &str, args: &[&str]) -> Result<String> {
    run_with_stdin(program, args, None).await
}

/// Run a mutating command, optionally feeding a script on stdin.
pub(crate) async fn run_with_stdin(
    program: &str,
    args: &[&str],
    stdin: Option<&str>,
) -> Result<String> {
    debug!(program, ?args, "running command");
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let mut child = cmd.spawn().map_err(|source| Error::CommandSpawn {
        program: program.to_string(),
        source,
    })?;

    if let Some(input) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(input.as_bytes()).await?;
        }
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|source| Error::CommandSpawn {
            program: program.to_string(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        debug!(program, ?args, %stderr, "command failed");
        return Err(Error::CommandFailed {
            program: program.to_string(),
            status: output.status.code().unwrap_or(-1),
            stderr: stderr.trim().to_string(),
        });
    }
    Ok(stdout)
}

/// Run an informational query. A non-zero exit is the tool's way of saying
/// "no such entity" and maps to [`Query::Absent`]; only a spawn failure is
/// an error.
pub(crate) async fn run_query(program: &str, args: &[&str]) -> Result<Query<String>> {
    match run(program, args).await {
        Ok(stdout) => Ok(Query::Found(stdout)),
        Err(Error::CommandFailed { .. }) => Ok(Query::Absent),
        Err(e) => Err(e),
    }
}

// =============================================================================
// Preflight
// =============================================================================

/// Verify the wrapped tools are present before attempting anything.
pub async fn preflight() -> Result<()> {
    for (program, args) in [
        ("sfdisk", ["--version"].as_slice()),
        ("partprobe", ["--version"].as_slice()),
        ("mdadm", ["--version"].as_slice()),
        ("lvm", ["version"].as_slice()),
    ] {
        if run(program, args).await.is_err() {
            return Err(Error::MissingDependency {
                program: program.to_string(),
            });
        }
    }
    Ok(())
}
