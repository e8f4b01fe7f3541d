//! Storage topology model
//!
//! Entities are plain data keyed by their stable external identifier (device
//! path or volume name). Relationships are identifier lookups through the
//! [`Topology`] context rather than embedded references, so the
//! drive/partition/array graph carries no cycles.

pub mod array;
pub mod context;
pub mod drive;
pub mod volume;

pub use array::RaidArray;
pub use context::Topology;
pub use drive::{Drive, Partition};
pub use volume::{LogicalVolume, PhysicalVolume, VolumeGroup};
