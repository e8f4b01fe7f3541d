//! Volume management adapter backed by the LVM tools

use crate::domain::ports::{LvDetail, Query, VolumeService};
use crate::error::{Error, Result};
use crate::services::{run, run_query};
use async_trait::async_trait;

pub struct LvmVolumes;

impl LvmVolumes {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LvmVolumes {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VolumeService for LvmVolumes {
    async fn create_pv(&self, name: &str) -> Result<()> {
        run("pvcreate", &[name]).await.map(|_| ())
    }

    async fn grow_pv(&self, name: &str) -> Result<()> {
        run("pvresize", &[name]).await.map(|_| ())
    }

    async fn create_vg(&self, name: &str, pvs: &[String]) -> Result<()> {
        let mut args = vec![name];
        args.extend(pvs.iter().map(String::as_str));
        run("vgcreate", &args).await.map(|_| ())
    }

    async fn extend_vg(&self, name: &str, pv: &str) -> Result<()> {
        run("vgextend", &[name, pv]).await.map(|_| ())
    }

    async fn create_lv(&self, name: &str, vg: &str) -> Result<()> {
        // The LV name arrives fully qualified (vg/lvol0); lvcreate wants the
        // bare name plus the VG.
        let bare = name.rsplit('/').next().unwrap_or(name);
        run(
            "lvcreate",
            &["--name", bare, "--extents", "100%FREE", vg],
        )
        .await
        .map(|_| ())
    }

    async fn extend_lv(&self, name: &str) -> Result<()> {
        run("lvextend", &["-l", "+100%FREE", name]).await.map(|_| ())
    }

    async fn vg_pvs(&self, vg: &str) -> Result<Query<Vec<String>>> {
        let select = format!("vg_name={vg}");
        let out = match run_query(
            "pvs",
            &["--noheadings", "-o", "pv_name", "--select", select.as_str()],
        )
        .await?
        {
            Query::Found(out) => out,
            Query::Absent => return Ok(Query::Absent),
        };
        let pvs: Vec<String> = out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();
        // pvs exits zero even when the filter matches nothing; an empty
        // report means the VG does not exist.
        if pvs.is_empty() {
            return Ok(Query::Absent);
        }
        Ok(Query::Found(pvs))
    }

    async fn lv_detail(&self, lv: &str) -> Result<Query<LvDetail>> {
        let out = match run_query(
            "lvs",
            &[
                "--noheadings",
                "--units",
                "g",
                "--nosuffix",
                "-o",
                "vg_name,lv_size",
                lv,
            ],
        )
        .await?
        {
            Query::Found(out) => out,
            Query::Absent => return Ok(Query::Absent),
        };
        let line = out.trim();
        let mut fields = line.split_whitespace();
        let (vg_name, size) = match (fields.next(), fields.next()) {
            (Some(vg), Some(size)) => (vg.to_string(), size),
            _ => {
                return Err(Error::CommandOutput {
                    program: "lvs".into(),
                    reason: format!("unexpected report {line:?} for {lv}"),
                })
            }
        };
        let size_gb = size.parse::<f64>().map_err(|_| Error::CommandOutput {
            program: "lvs".into(),
            reason: format!("bad size {size:?} for {lv}"),
        })?;
        Ok(Query::Found(LvDetail { vg_name, size_gb }))
    }
}
