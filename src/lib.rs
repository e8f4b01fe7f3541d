//! raidtier - Tiered RAID5 Storage Pool Manager
//!
//! Aggregates a set of hard drives of mixed capacities into a single LVM
//! logical volume with single-drive-failure redundancy, wasting as little
//! capacity as possible. Drives are carved into capacity tiers, each tier
//! backs one RAID5 array, each array becomes an LVM physical volume, and
//! one volume group with a single logical volume spans them all.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Lifecycle Orchestrator                    │
//! │        create / add / replace / remove / examine             │
//! ├──────────────────┬──────────────────┬────────────────────────┤
//! │   Tier Planner   │   Resync Waits   │    Topology Context    │
//! │   (pure layout)  │   (bounded)      │  (find-or-create map)  │
//! ├──────────────────┴──────────────────┴────────────────────────┤
//! │                       Service Ports                          │
//! │   PartitionService    RaidService       VolumeService        │
//! ├──────────────────┬──────────────────┬────────────────────────┤
//! │      sfdisk      │      mdadm       │   pv/vg/lv tools       │
//! └──────────────────┴──────────────────┴────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`lifecycle`]: Operation sequencing, tier planning, resync waits
//! - [`topology`]: Storage entity graph and per-invocation cache
//! - [`services`]: Adapters for the wrapped system tools
//! - [`domain`]: Service ports and wire-level report types
//! - [`error`]: Error types and exit-code mapping

pub mod domain;
pub mod error;
pub mod lifecycle;
pub mod services;
pub mod topology;

// Re-export commonly used types
pub use error::{Error, Result};
pub use lifecycle::{Orchestrator, OrchestratorConfig, WaitPolicy};
pub use services::Services;
pub use topology::Topology;

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name from Cargo.toml
pub const NAME: &str = env!("CARGO_PKG_NAME");
