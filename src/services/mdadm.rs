//! RAID management adapter backed by mdadm

use crate::domain::ports::{ArrayDetail, ArrayState, Query, RaidService};
use crate::error::{Error, Result};
use crate::services::{run, run_query};
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

pub struct MdadmRaid;

impl MdadmRaid {
    pub fn new() -> Self {
        Self
    }

    /// Next unused name in the /dev/mdN scheme.
    fn next_free_name(&self) -> String {
        let mut n = 0u32;
        loop {
            let name = format!("/dev/md{n}");
            if !Path::new(&name).exists() {
                return name;
            }
            n += 1;
        }
    }
}

impl Default for MdadmRaid {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RaidService for MdadmRaid {
    async fn create_array(&self, members: &[String]) -> Result<String> {
        let id = self.next_free_name();
        let devices = format!("--raid-devices={}", members.len());
        let mut args = vec![
            "--create",
            id.as_str(),
            "--level=5",
            devices.as_str(),
            "--run",
        ];
        args.extend(members.iter().map(String::as_str));
        run("mdadm", &args).await?;
        Ok(id)
    }

    async fn detail(&self, array: &str) -> Result<Query<ArrayDetail>> {
        let out = match run_query("mdadm", &["--detail", array]).await? {
            Query::Found(out) => out,
            Query::Absent => return Ok(Query::Absent),
        };
        Ok(Query::Found(parse_detail(array, &out)?))
    }

    async fn examine_member(&self, partition: &str) -> Result<Query<String>> {
        // `mdadm --query` names the owning array in prose:
        //   "... device 2 in 4 device active raid5 /dev/md0. ..."
        let out = match run_query("mdadm", &["--query", partition]).await? {
            Query::Found(out) => out,
            Query::Absent => return Ok(Query::Absent),
        };
        for token in out.split_whitespace() {
            let token = token.trim_end_matches(['.', ',']);
            if token.starts_with("/dev/md") {
                return Ok(Query::Found(token.to_string()));
            }
        }
        Ok(Query::Absent)
    }

    async fn add_member(&self, array: &str, partition: &str) -> Result<()> {
        run("mdadm", &[array, "--add", partition]).await.map(|_| ())
    }

    async fn grow_array(&self, array: &str, raid_devices: u32, backup_file: &Path) -> Result<()> {
        let devices = format!("--raid-devices={raid_devices}");
        let backup = format!("--backup-file={}", backup_file.display());
        run(
            "mdadm",
            &["--grow", array, devices.as_str(), backup.as_str()],
        )
        .await
        .map(|_| ())
    }

    async fn fail_and_remove(&self, array: &str, partition: &str) -> Result<()> {
        run("mdadm", &[array, "--fail", partition]).await?;
        run("mdadm", &[array, "--remove", partition]).await?;
        Ok(())
    }
}

/// Parse `mdadm --detail` output into an [`ArrayDetail`].
fn parse_detail(array: &str, out: &str) -> Result<ArrayDetail> {
    let mut raid_devices = 0u32;
    let mut state = ArrayState::Unknown(String::from("missing state line"));
    let mut rebuild_percent = None;
    let mut members = Vec::new();

    for line in out.lines() {
        let line = line.trim();
        if let Some((key, value)) = line.split_once(':') {
            let key = key.trim();
            let value = value.trim();
            match key {
                "Raid Devices" => {
                    raid_devices = value.parse().map_err(|_| Error::CommandOutput {
                        program: "mdadm".into(),
                        reason: format!("bad raid-devices {value:?} for {array}"),
                    })?;
                }
                "State" => state = ArrayState::from_report(value),
                "Rebuild Status" | "Reshape Status" => {
                    rebuild_percent = value
                        .split('%')
                        .next()
                        .and_then(|n| n.trim().parse::<u8>().ok());
                }
                _ => {}
            }
        }
        // Member table rows end in the device path; only active members
        // count (faulty and spare devices are not array members).
        if line.contains("active sync") {
            if let Some(dev) = line.split_whitespace().last() {
                if dev.starts_with("/dev/") {
                    members.push(dev.to_string());
                }
            }
        }
    }

    debug!(array, ?state, members = members.len(), "parsed array detail");
    Ok(ArrayDetail {
        members,
        raid_devices,
        state,
        rebuild_percent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL_RECOVERING: &str = "\
/dev/md0:
           Version : 1.2
        Raid Level : raid5
      Raid Devices : 3
             State : clean, degraded, recovering
    Rebuild Status : 47% complete

    Number   Major   Minor   RaidDevice State
       0       8        5        0      active sync   /dev/sda5
       1       8       21        1      active sync   /dev/sdb5
       3       8       37        2      spare rebuilding   /dev/sdc5
";

    #[test]
    fn test_parse_detail_recovering() {
        let detail = parse_detail("/dev/md0", DETAIL_RECOVERING).unwrap();
        assert_eq!(detail.raid_devices, 3);
        assert_eq!(detail.state, ArrayState::Recovering);
        assert_eq!(detail.rebuild_percent, Some(47));
        assert_eq!(detail.members, vec!["/dev/sda5", "/dev/sdb5"]);
    }

    #[test]
    fn test_parse_detail_clean() {
        let out = "\
/dev/md1:
      Raid Devices : 2
             State : clean

    Number   Major   Minor   RaidDevice State
       0       8        6        0      active sync   /dev/sda6
       1       8       22        1      active sync   /dev/sdb6
";
        let detail = parse_detail("/dev/md1", out).unwrap();
        assert_eq!(detail.state, ArrayState::Clean);
        assert_eq!(detail.rebuild_percent, None);
        assert_eq!(detail.members.len(), 2);
    }
}
