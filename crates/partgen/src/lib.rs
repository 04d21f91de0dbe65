//! partgen
//!
//! Deterministic partition-table generation for firmware and bootloader
//! image builds: a declarative list of partition requests goes in, and the
//! binary MBR/GPT structures come out at exact byte offsets in one or more
//! output image files.
//!
//! The pipeline is [`layout::plan`] -> [`encode::encode`] ->
//! [`writer::write_images`]; each stage is pure except the final write. A
//! run either completes deterministically or fails with a typed error; no
//! partially-successful mode exists.

pub use chs::{Chs, Geometry};
pub use encode::{GptImages, TableImages, encode};
pub use gpt::{
    GPT_ENTRY_MAX, GPT_ENTRY_NAME_UNITS, GPT_ENTRY_SIZE, GPT_FIRST_ENTRY_SECTOR, GPT_HEADER_SECTOR,
    GPT_HEADER_SIZE, GPT_TABLE_SECTORS, GptAttributes, GptEntry, GptHeader,
};
pub use guid::{GptPartType, Guid, legacy_type_to_gpt};
pub use layout::{
    DiskLayout, DiskParameters, GptWindow, PartitionPlan, PartitionRequest, TableMode, plan,
};
pub use mbr::{MBR_ENTRY_MAX, MbrPartitionEntry, MbrPartitionTable};
pub use name::FixedUtf16Name;
pub use writer::write_images;

pub mod chs;
pub mod crc;
pub mod encode;
pub mod endian;
pub mod gpt;
pub mod guid;
pub mod layout;
pub mod mbr;
pub mod name;
pub mod writer;

/// Logical sector size all offsets are expressed in.
pub const SECTOR_SIZE: u64 = 512;

/// Errors produced by planning, encoding, and writing.
///
/// All are fatal to the run: planning and encoding failures produce no
/// output file, and a write failure stops immediately instead of patching
/// up a half-written image. None are transient, so nothing is retried.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A zero-sized partition without the ignore-null policy.
    #[error("invalid size in partition {slot}")]
    InvalidPartitionSize { slot: usize },

    /// An explicit start sector earlier than the layout cursor. Requests
    /// are never reordered to resolve conflicts.
    #[error("invalid start {requested} for partition {slot}: overlaps previous end {cursor}")]
    StartOverlapsPrevious {
        slot: usize,
        requested: u64,
        cursor: u64,
    },

    /// A partition runs past the configured last usable sector.
    #[error("partition {slot} ends at sector {end}, after last usable sector {last_usable}")]
    ExceedsUsableWindow {
        slot: usize,
        end: u64,
        last_usable: u64,
    },

    /// A symbolic GPT partition type name not present in the registry.
    /// Silently defaulting would corrupt boot semantics, so this aborts
    /// the run.
    #[error("unknown GPT partition type {0:?}")]
    UnknownPartitionType(String),

    /// A disk GUID string that is not the canonical 36-character form.
    #[error("malformed GUID string {0:?}")]
    MalformedGuid(String),

    /// An open, seek, or write failure, including short writes.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
