//! Core domain types and service ports

pub mod ports;

pub use ports::{
    ArrayDetail, ArrayState, CreatedPartition, LvDetail, PartitionInfo, PartitionKind,
    PartitionService, PartitionTable, Query, RaidService, VolumeService,
};
